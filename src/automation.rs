//! Contract with the host UI-automation layer.
//!
//! The listener never touches the host application directly. Window focus,
//! snapshots, structural lookups and the side-effecting operations (save-as,
//! voice transcription, forwarded-chat unpacking, element capture) all go
//! through [`ChatAutomation`], which the platform glue implements.

use crate::types::{Element, ListenError, MessageHandle, WindowBounds, WindowRef};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which side of the conversation a message bubble is laid out on.
///
/// The host renders own and other messages under different structural
/// branches, so most probes exist in both variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Own,
    Other,
}

/// Structural children of a message item that the core knows how to ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    /// Sender avatar button; present on every human message
    Avatar,
    /// Plain text bubble
    Text(Side),
    /// Auxiliary text that identifies a mini-program card
    MiniProgramSign(Side),
    MiniProgramTitle(Side),
    MiniProgramBody(Side),
    /// Auxiliary text that identifies a transfer card
    TransferSign(Side),
    TransferAmount(Side),
    /// "name : text" line inside a quote bubble
    QuoteSender,
    /// Area that accepts clicks for save-as on media bubbles
    ClickBox(Side),
    /// Area that accepts the voice context menu
    VoiceBox(Side),
    /// Transcript shown under a voice bubble after voice-to-text
    VoiceTranscript(Side),
    /// Notice text of a system item with an empty label (e.g. "pat")
    SystemNotice,
}

impl Selector {
    /// Default structural path of the element, relative to the message item.
    ///
    /// Platform glue may use these or its own locator strategy.
    pub fn xpath(&self) -> &'static str {
        match self {
            Selector::Avatar => "/Pane/Button",
            Selector::Text(Side::Own) => "/Pane/Pane[2]/Pane/Pane/Pane/Text",
            Selector::Text(Side::Other) => "/Pane/Pane[1]/Pane/Pane/Pane/Text",
            Selector::MiniProgramSign(Side::Own) => "/Pane/Pane[2]/Pane/Pane/Pane/Pane/Pane[2]/Text[2]",
            Selector::MiniProgramSign(Side::Other) => "/Pane/Pane[1]/Pane/Pane/Pane/Pane/Pane[2]/Text[2]",
            Selector::MiniProgramTitle(Side::Own) => "/Pane/Pane[2]/Pane/Pane/Pane/Pane/Pane[1]/Text",
            Selector::MiniProgramTitle(Side::Other) => "/Pane/Pane[1]/Pane/Pane/Pane/Pane/Pane[1]/Text",
            Selector::MiniProgramBody(Side::Own) => "/Pane/Pane[2]/Pane/Pane/Pane/Pane/Text",
            Selector::MiniProgramBody(Side::Other) => "/Pane/Pane[1]/Pane/Pane/Pane/Pane/Text",
            Selector::TransferSign(Side::Own) => "/Pane/Pane[2]/Pane/Pane/Pane/Pane/Pane[2]/Text[1]",
            Selector::TransferSign(Side::Other) => "/Pane/Pane[1]/Pane/Pane/Pane/Pane/Pane[2]/Text[1]",
            Selector::TransferAmount(Side::Own) => "/Pane/Pane[2]/Pane/Pane/Pane/Pane/Pane[1]/Pane/Text[2]",
            Selector::TransferAmount(Side::Other) => "/Pane/Pane[1]/Pane/Pane/Pane/Pane/Pane[1]/Pane/Text[2]",
            Selector::QuoteSender => "/Pane/Pane[2]/Pane/Pane/Pane[2]/Pane/Pane/Pane/Pane/Text",
            Selector::ClickBox(Side::Own) => "/Pane/Pane[2]/Pane/Pane/Pane",
            Selector::ClickBox(Side::Other) => "/Pane/Pane[1]/Pane/Pane/Pane",
            Selector::VoiceBox(Side::Own) => "/Pane/Pane[2]/Pane/Pane[2]/Pane",
            Selector::VoiceBox(Side::Other) => "/Pane/Pane[1]/Pane/Pane[1]/Pane",
            Selector::VoiceTranscript(Side::Own) => "/Pane/Pane[2]/Pane/Pane[2]/Pane/Pane[2]/Pane[2]/Text",
            Selector::VoiceTranscript(Side::Other) => "/Pane/Pane[1]/Pane/Pane[1]/Pane/Pane[2]/Pane[2]/Text",
            Selector::SystemNotice => "/Pane/Pane[2]/Pane/ListItem",
        }
    }
}

/// One child item of an opened forwarded-chat window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardedItem {
    /// Full label of the item (sender name, content and time run together)
    pub label: String,
    /// Text of the content element, when the item is a text message
    #[serde(default)]
    pub text: Option<String>,
}

/// Host UI-automation collaborator.
///
/// Lookups never fail on absence: [`ChatAutomation::resolve`] returns `None`.
/// Operations on a window that no longer exists fail with
/// [`ListenError::WindowUnavailable`].
#[async_trait::async_trait]
pub trait ChatAutomation: Send + Sync {
    /// Bring the window to the front
    async fn focus(&self, window: &WindowRef) -> Result<(), ListenError>;

    /// Message items currently visible, in on-screen top-to-bottom order
    async fn snapshot(&self, window: &WindowRef) -> Result<Vec<MessageHandle>, ListenError>;

    /// Current screen bounds of the window
    async fn window_bounds(&self, window: &WindowRef) -> Result<WindowBounds, ListenError>;

    /// Look up a structural child of a message item
    async fn resolve(&self, handle: &MessageHandle, selector: Selector) -> Option<Element>;

    /// Save the media behind a message into `dir`, returning the saved path.
    ///
    /// Videos must be clicked to trigger their download before saving.
    async fn save_as(
        &self,
        window: &WindowRef,
        handle: &MessageHandle,
        dir: &Path,
        is_video: bool,
    ) -> Result<PathBuf, ListenError>;

    /// Run voice-to-text on a voice message. May wait indefinitely.
    async fn transcribe_voice(
        &self,
        window: &WindowRef,
        handle: &MessageHandle,
    ) -> Result<String, ListenError>;

    /// Open a forwarded chat history, read its items and close it again
    async fn unpack_merge_forward(
        &self,
        handle: &MessageHandle,
    ) -> Result<Vec<ForwardedItem>, ListenError>;

    /// Capture the on-screen bitmap of a message item
    async fn capture_element(&self, handle: &MessageHandle) -> Result<DynamicImage, ListenError>;

    /// Resolve a sided selector, trying the own-side layout first
    async fn resolve_either(
        &self,
        handle: &MessageHandle,
        probe: fn(Side) -> Selector,
    ) -> Option<Element> {
        match self.resolve(handle, probe(Side::Own)).await {
            Some(element) => Some(element),
            None => self.resolve(handle, probe(Side::Other)).await,
        }
    }
}
