//! Card-shaped messages whose content sits in fixed sub-elements.

use super::MessageContent;
use crate::automation::{ChatAutomation, Selector, Side};
use crate::types::{ListenError, MessageHandle};
use lazy_static::lazy_static;
use regex::Regex;

/// Separator between a reply and the message it quotes
pub const QUOTE_DELIMITER: &str = "\n引用  的消息 : ";

lazy_static! {
    /// Same separator with the quoted sender's name filled in
    static ref QUOTE_SEPARATOR: Regex = Regex::new(r"\n引用.*?的消息 : ").unwrap();
}

async fn required_text(
    automation: &dyn ChatAutomation,
    handle: &MessageHandle,
    probe: fn(Side) -> Selector,
) -> Result<String, ListenError> {
    automation
        .resolve_either(handle, probe)
        .await
        .map(|element| element.name)
        .ok_or_else(|| ListenError::missing(probe(Side::Other), handle))
}

pub async fn mini_program(
    automation: &dyn ChatAutomation,
    handle: &MessageHandle,
) -> Result<MessageContent, ListenError> {
    let title = required_text(automation, handle, Selector::MiniProgramTitle).await?;
    let body = required_text(automation, handle, Selector::MiniProgramBody).await?;
    Ok(MessageContent::MiniProgram { title, body })
}

pub async fn transfer(
    automation: &dyn ChatAutomation,
    handle: &MessageHandle,
) -> Result<MessageContent, ListenError> {
    let amount = required_text(automation, handle, Selector::TransferAmount).await?;
    Ok(MessageContent::Transfer { amount })
}

pub async fn quote(
    automation: &dyn ChatAutomation,
    handle: &MessageHandle,
) -> Result<MessageContent, ListenError> {
    let sender_line = automation
        .resolve(handle, Selector::QuoteSender)
        .await
        .ok_or_else(|| ListenError::missing(Selector::QuoteSender, handle))?;
    let quoted_sender = quoted_sender_name(&sender_line.name).to_string();
    let (body, quoted_body) = split_quote(&handle.label);

    Ok(MessageContent::Quote {
        body: body.to_string(),
        quoted_body: quoted_body.to_string(),
        quoted_sender,
    })
}

/// "name : text" -> "name"
pub fn quoted_sender_name(line: &str) -> &str {
    line.split(" : ").next().unwrap_or(line)
}

/// Split a quote label into the reply and the quoted text
pub fn split_quote(label: &str) -> (&str, &str) {
    if let Some((body, quoted)) = label.split_once(QUOTE_DELIMITER) {
        return (body, quoted);
    }
    match QUOTE_SEPARATOR.find(label) {
        Some(separator) => (&label[..separator.start()], &label[separator.end()..]),
        None => (label, ""),
    }
}
