//! Per-kind content extraction.
//!
//! Every [`MessageKind`] maps to exactly one strategy:
//! - media: save-as for images, videos and files, bitmap capture for emoji,
//!   voice-to-text for voice messages
//! - card: mini-program cards, transfers and quotes, read from sub-elements
//! - forward: forwarded chat histories, unpacked and rendered line by line

pub mod card;
pub mod forward;
pub mod media;

use crate::automation::{ChatAutomation, Selector};
use crate::types::{ListenError, MessageHandle, MessageKind, WindowRef};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Typed payload of a message, before flattening into `Message::content`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageContent {
    Text(String),
    /// Where an image, video or file was saved
    SavedFile(PathBuf),
    /// Base64 of the PNG-encoded bitmap
    Emoji(String),
    MiniProgram { title: String, body: String },
    MergeForward(Vec<String>),
    Voice(String),
    Transfer { amount: String },
    Quote {
        body: String,
        quoted_body: String,
        quoted_sender: String,
    },
}

impl MessageContent {
    /// Flatten into the ordered content list of a message
    pub fn into_lines(self) -> Vec<String> {
        match self {
            MessageContent::Text(text) | MessageContent::Voice(text) => vec![text],
            MessageContent::SavedFile(path) => vec![path.to_string_lossy().into_owned()],
            MessageContent::Emoji(png_base64) => vec![png_base64],
            MessageContent::MiniProgram { title, body } => vec![title, body],
            MessageContent::MergeForward(lines) => lines,
            MessageContent::Transfer { amount } => vec![amount],
            MessageContent::Quote {
                body,
                quoted_body,
                quoted_sender,
            } => vec![body, quoted_body, quoted_sender],
        }
    }
}

/// Dispatches a classified message to its extraction strategy
pub struct ContentExtractor {
    automation: Arc<dyn ChatAutomation>,
    save_dir: PathBuf,
}

impl ContentExtractor {
    pub fn new(automation: Arc<dyn ChatAutomation>, save_dir: PathBuf) -> Self {
        Self {
            automation,
            save_dir,
        }
    }

    pub fn save_dir(&self) -> &PathBuf {
        &self.save_dir
    }

    pub async fn extract(
        &self,
        window: &WindowRef,
        handle: &MessageHandle,
        kind: MessageKind,
    ) -> Result<MessageContent, ListenError> {
        let automation = self.automation.as_ref();
        let content = match kind {
            MessageKind::Text => Ok(MessageContent::Text(handle.label.clone())),
            MessageKind::Image | MessageKind::File => {
                media::save(automation, window, handle, &self.save_dir, false).await
            }
            MessageKind::Video => {
                media::save(automation, window, handle, &self.save_dir, true).await
            }
            MessageKind::Emoji => media::emoji(automation, handle).await,
            MessageKind::Voice => media::transcribe(automation, window, handle).await,
            MessageKind::MiniProgramCard => card::mini_program(automation, handle).await,
            MessageKind::Transfer => card::transfer(automation, handle).await,
            MessageKind::Quote => card::quote(automation, handle).await,
            MessageKind::MergeForward => forward::unpack(automation, handle).await,
        };
        // A failed save only loses this message
        content.map_err(|e| match e {
            ListenError::Io(source) => ListenError::ExtractionIo {
                label: handle.label.clone(),
                source,
            },
            other => other,
        })
    }

    /// Text of a system item: its label, or the notice below it when the
    /// label is empty
    pub async fn system_notice(&self, handle: &MessageHandle) -> Result<String, ListenError> {
        if !handle.label.is_empty() {
            return Ok(handle.label.clone());
        }
        self.automation
            .resolve(handle, Selector::SystemNotice)
            .await
            .map(|notice| notice.name)
            .ok_or_else(|| ListenError::missing(Selector::SystemNotice, handle))
    }
}
