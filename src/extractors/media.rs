//! Media messages: saved files, emoji bitmaps and voice transcripts.

use super::MessageContent;
use crate::automation::ChatAutomation;
use crate::types::{ListenError, MessageHandle, WindowRef};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Save an image, video or file into `dir`, creating it on first use
pub async fn save(
    automation: &dyn ChatAutomation,
    window: &WindowRef,
    handle: &MessageHandle,
    dir: &Path,
    is_video: bool,
) -> Result<MessageContent, ListenError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = automation.save_as(window, handle, dir, is_video).await?;
    debug!("Saved {:?} to {:?}", handle.label, path);
    Ok(MessageContent::SavedFile(path))
}

/// Capture an emoji bubble and encode it as base64 PNG
pub async fn emoji(
    automation: &dyn ChatAutomation,
    handle: &MessageHandle,
) -> Result<MessageContent, ListenError> {
    let bitmap = automation.capture_element(handle).await?;
    let encoded = tokio::task::spawn_blocking(move || encode_png_base64(&bitmap))
        .await
        .map_err(|e| ListenError::Automation(format!("emoji encoder task failed: {}", e)))??;
    Ok(MessageContent::Emoji(encoded))
}

pub fn encode_png_base64(bitmap: &DynamicImage) -> Result<String, ListenError> {
    let mut png = Vec::new();
    bitmap.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(STANDARD.encode(png))
}

pub async fn transcribe(
    automation: &dyn ChatAutomation,
    window: &WindowRef,
    handle: &MessageHandle,
) -> Result<MessageContent, ListenError> {
    let transcript = automation.transcribe_voice(window, handle).await?;
    Ok(MessageContent::Voice(transcript))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_encode_png_base64() {
        let bitmap = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([255, 200, 0, 255])));
        let encoded = encode_png_base64(&bitmap).unwrap();

        let bytes = STANDARD.decode(encoded).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
        assert_eq!(decoded.width(), 4);
        assert_eq!(decoded.height(), 4);
    }
}
