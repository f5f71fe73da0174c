//! Forwarded chat histories.
//!
//! Each child item of the opened history is rendered as one line. Text items
//! carry their text element, which splits the label into sender name and
//! time. Other items are recognised by a bracketed tag such as `[图片]`.
//! Items matching neither are skipped.

use super::MessageContent;
use crate::automation::{ChatAutomation, ForwardedItem};
use crate::types::{ListenError, MessageHandle};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref BRACKET_TAG: Regex = Regex::new(r"\[(.*?)\]").unwrap();
}

pub async fn unpack(
    automation: &dyn ChatAutomation,
    handle: &MessageHandle,
) -> Result<MessageContent, ListenError> {
    let items = automation.unpack_merge_forward(handle).await?;
    let total = items.len();
    let lines: Vec<String> = items.iter().filter_map(render_item).collect();
    if lines.len() < total {
        debug!("Skipped {} unrecognised forwarded item(s)", total - lines.len());
    }
    Ok(MessageContent::MergeForward(lines))
}

/// Label split around its content: (sender name, time)
fn around<'a>(label: &'a str, content: &str) -> (&'a str, &'a str) {
    let mut parts = label.split(content);
    let name = parts.next().unwrap_or_default();
    let time = parts.next().unwrap_or_default();
    (name.trim(), time.trim())
}

pub fn render_item(item: &ForwardedItem) -> Option<String> {
    if let Some(text) = item.text.as_deref().filter(|t| !t.is_empty()) {
        let (name, time) = around(&item.label, text);
        return Some(format!("user [{}] at [{}] said: {}", name, time, text));
    }

    let tag = BRACKET_TAG.find(&item.label)?.as_str();
    let (name, time) = around(&item.label, tag);
    Some(format!("user [{}] at [{}] sent: {}", name, time, tag))
}
