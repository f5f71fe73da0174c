//! Core types used throughout the chat listener.
//!
//! This module defines the references handed over by the automation layer
//! (windows, UI elements, message handles), the published message record and
//! the error taxonomy shared by every stage of the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a node in the host UI tree
pub type ElementId = u64;

/// A chat window that can be registered for listening
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowRef {
    /// Window title, unique among monitored windows
    pub title: String,
    /// Automation-side identifier of the window node
    pub id: ElementId,
}

impl WindowRef {
    pub fn new(title: impl Into<String>, id: ElementId) -> Self {
        Self {
            title: title.into(),
            id,
        }
    }
}

/// Element position and size in screen coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowBounds {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// A structural sub-element resolved below a message item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    /// Display text of the element (may be empty)
    pub name: String,
    pub bounds: WindowBounds,
}

/// One rendered message item in the current view of a chat window.
///
/// Handles are only valid for the poll that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHandle {
    /// Automation-side identifier of the list item
    pub element: ElementId,
    /// Display label; the only identity signal used for diffing
    pub label: String,
    /// 0-based index within the snapshot
    pub position: usize,
}

impl MessageHandle {
    pub fn new(element: ElementId, label: impl Into<String>, position: usize) -> Self {
        Self {
            element,
            label: label.into(),
            position,
        }
    }
}

/// Closed classification of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Emoji,
    File,
    MiniProgramCard,
    MergeForward,
    Voice,
    Transfer,
    Quote,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::Emoji => "emoji",
            MessageKind::File => "file",
            MessageKind::MiniProgramCard => "mini_program_card",
            MessageKind::MergeForward => "merge_forward",
            MessageKind::Voice => "voice",
            MessageKind::Transfer => "transfer",
            MessageKind::Quote => "quote",
        }
    }
}

/// Whether a person or the host application produced the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Human,
    System,
}

/// Who sent the message, relative to the logged-in account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SenderKind {
    /// Authored by the logged-in account
    #[serde(rename = "self")]
    Myself,
    /// Anyone else (contact or group member)
    Friend,
}

/// Private chat or group chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OriginKind {
    Single,
    Group,
}

/// Display name used for messages produced by the host application
pub const SYSTEM_SENDER_NAME: &str = "System";

/// A fully classified message, as delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub source_kind: SourceKind,
    pub sender_kind: SenderKind,
    pub origin_kind: OriginKind,
    /// Ordered content; meaning depends on `kind`
    pub content: Vec<String>,
    pub sender_name: String,
    /// Title of the window the message was observed in
    pub origin_window: String,
    pub received_at: DateTime<Utc>,
}

impl Message {
    /// Whether the logged-in account authored this message
    pub fn is_self(&self) -> bool {
        self.sender_kind == SenderKind::Myself
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{:?}|{:?}|{:?}|{}|{}|{}",
            self.kind.as_str(),
            self.source_kind,
            self.sender_kind,
            self.origin_kind,
            self.content.join(";"),
            self.sender_name,
            self.origin_window
        )
    }
}

/// Errors that can occur while listening
#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error("Window unavailable: {0}")]
    WindowUnavailable(String),

    #[error("Unclassifiable message: {label:?}")]
    UnclassifiableMessage { label: String },

    #[error("Missing expected element {selector} in message {label:?}")]
    MissingExpectedElement { selector: String, label: String },

    #[error("Timed out waiting for {0}")]
    OperationTimeout(String),

    #[error("Snapshot of {window} no longer contains the previous tail {last_label:?}")]
    SnapshotDiverged { window: String, last_label: String },

    #[error("Automation failed: {0}")]
    Automation(String),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error while extracting {label:?}: {source}")]
    ExtractionIo {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ListenError {
    /// Errors scoped to a single message item.
    ///
    /// These skip the offending item and leave the rest of the window's cycle
    /// and its bookkeeping intact. Everything else halts the worker.
    pub fn is_per_message(&self) -> bool {
        matches!(
            self,
            ListenError::UnclassifiableMessage { .. }
                | ListenError::MissingExpectedElement { .. }
                | ListenError::OperationTimeout(_)
                | ListenError::Automation(_)
                | ListenError::Image(_)
                | ListenError::ExtractionIo { .. }
        )
    }

    pub(crate) fn missing(selector: impl fmt::Debug, handle: &MessageHandle) -> Self {
        ListenError::MissingExpectedElement {
            selector: format!("{:?}", selector),
            label: handle.label.clone(),
        }
    }
}
