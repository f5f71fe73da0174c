//! Message classification.
//!
//! Two independent questions are answered per message item:
//!
//! - the envelope (who produced it, from which side, in which kind of chat),
//!   derived from the sender avatar and the window geometry;
//! - the [`MessageKind`], derived from an ordered cascade over the item label
//!   and a handful of structural probes.
//!
//! The cascade itself is a pure function over [`Probes`] so it can be tested
//! without an automation backend.

use crate::automation::{ChatAutomation, Selector};
use crate::types::{
    Element, ListenError, MessageHandle, MessageKind, OriginKind, SenderKind, SourceKind,
    WindowRef,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

pub const IMAGE_LABEL: &str = "[图片]";
pub const VIDEO_LABEL: &str = "[视频]";
pub const EMOJI_LABEL: &str = "[动画表情]";
pub const FILE_LABEL: &str = "[文件]";
pub const MERGE_FORWARD_LABEL: &str = "[聊天记录]";
pub const VOICE_MARKER: &str = "[语音]";
/// Label of a transfer card, which otherwise looks like a mini-program card
pub const TRANSFER_LABEL: &str = "微信转账";

lazy_static! {
    /// Line break followed by the "quoted X's message" marker
    static ref QUOTE_PATTERN: Regex = Regex::new(r"\n引用.*的消息").unwrap();
}

/// Outcome of one structural probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Present(String),
    Absent,
}

impl Signal {
    pub fn is_present(&self) -> bool {
        matches!(self, Signal::Present(_))
    }

    /// Present with non-empty text
    pub fn has_text(&self) -> bool {
        matches!(self, Signal::Present(text) if !text.is_empty())
    }
}

impl From<Option<Element>> for Signal {
    fn from(element: Option<Element>) -> Self {
        match element {
            Some(element) => Signal::Present(element.name),
            None => Signal::Absent,
        }
    }
}

/// Structural probes consulted by the cascade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probes {
    pub text: Signal,
    pub mini_program_sign: Signal,
    pub transfer_sign: Signal,
}

impl Probes {
    /// No structural children found
    pub fn absent() -> Self {
        Self {
            text: Signal::Absent,
            mini_program_sign: Signal::Absent,
            transfer_sign: Signal::Absent,
        }
    }
}

/// Kinds the host announces through the label alone
fn label_kind(label: &str) -> Option<MessageKind> {
    match label {
        IMAGE_LABEL => Some(MessageKind::Image),
        VIDEO_LABEL => Some(MessageKind::Video),
        EMOJI_LABEL => Some(MessageKind::Emoji),
        FILE_LABEL => Some(MessageKind::File),
        MERGE_FORWARD_LABEL => Some(MessageKind::MergeForward),
        _ if label.contains(VOICE_MARKER) => Some(MessageKind::Voice),
        _ => None,
    }
}

fn is_mini_program(label: &str, probes: &Probes) -> bool {
    probes.mini_program_sign.has_text() && label != TRANSFER_LABEL
}

/// Ordered cascade; the first matching rule wins
pub fn classify_label(label: &str, probes: &Probes) -> Result<MessageKind, ListenError> {
    if probes.text.is_present() {
        return Ok(MessageKind::Text);
    }

    if let Some(kind) = label_kind(label) {
        return Ok(kind);
    }

    if is_mini_program(label, probes) {
        return Ok(MessageKind::MiniProgramCard);
    }

    if probes.transfer_sign.is_present() {
        return Ok(MessageKind::Transfer);
    }

    if QUOTE_PATTERN.is_match(label) {
        return Ok(MessageKind::Quote);
    }

    Err(ListenError::UnclassifiableMessage {
        label: label.to_string(),
    })
}

/// Classify a live message item.
///
/// Probes are resolved in cascade order and only until one decides.
pub async fn classify(
    automation: &dyn ChatAutomation,
    handle: &MessageHandle,
) -> Result<MessageKind, ListenError> {
    let label = handle.label.as_str();
    let mut probes = Probes::absent();

    probes.text = automation.resolve_either(handle, Selector::Text).await.into();
    if !probes.text.is_present() && label_kind(label).is_none() {
        probes.mini_program_sign = automation
            .resolve_either(handle, Selector::MiniProgramSign)
            .await
            .into();
        if !is_mini_program(label, &probes) {
            probes.transfer_sign = automation
                .resolve_either(handle, Selector::TransferSign)
                .await
                .into();
        }
    }

    let kind = classify_label(label, &probes)?;
    trace!("Classified {:?} as {}", handle.label, kind.as_str());
    Ok(kind)
}

/// Who produced a message and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub source: SourceKind,
    pub sender: SenderKind,
    pub origin: OriginKind,
    /// Display name on the avatar; empty for system items
    pub sender_name: String,
}

impl Envelope {
    pub fn system() -> Self {
        Self {
            source: SourceKind::System,
            sender: SenderKind::Myself,
            origin: OriginKind::Single,
            sender_name: String::new(),
        }
    }
}

/// Classify the envelope of a message item.
///
/// Items without an avatar are produced by the host application. For the
/// others, a friend's avatar sits exactly `friend_avatar_offset` pixels right
/// of the window's left edge.
///
/// A chat is single when the avatar's display name equals the window title.
/// The item label is not used here: it is the message text, so comparing it
/// with the title would mark nearly every chat as a group.
pub async fn envelope(
    automation: &dyn ChatAutomation,
    window: &WindowRef,
    handle: &MessageHandle,
    friend_avatar_offset: i32,
) -> Result<Envelope, ListenError> {
    let avatar = match automation.resolve(handle, Selector::Avatar).await {
        Some(avatar) => avatar,
        None => return Ok(Envelope::system()),
    };

    let bounds = automation.window_bounds(window).await?;
    let sender = if avatar.bounds.x - bounds.x == friend_avatar_offset {
        SenderKind::Friend
    } else {
        SenderKind::Myself
    };
    let origin = if avatar.name == window.title {
        OriginKind::Single
    } else {
        OriginKind::Group
    };

    Ok(Envelope {
        source: SourceKind::Human,
        sender,
        origin,
        sender_name: avatar.name,
    })
}
