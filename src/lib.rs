//! Chat Listener - incremental message listener for desktop chat windows
//!
//! This crate turns periodic snapshots of chat windows into a typed stream of
//! message events:
//!
//! - **Differencing**: works out which visible items are new, using display
//!   labels only, including runs of identical messages
//! - **Classification**: maps each item onto a closed set of message kinds
//!   and reads who sent it from where
//! - **Extraction**: produces the content of each kind, driving save-as,
//!   voice-to-text and forwarded-chat unpacking where needed
//! - **Publishing**: fans messages out to subscribers, optionally filtering
//!   out the logged-in account's own messages
//!
//! # Architecture
//!
//! A single background worker polls every monitored window in turn and is the
//! only writer of per-window state. All access to the host application goes
//! through the [`ChatAutomation`] trait; [`ScriptedAutomation`] replays
//! recorded sessions from JSON.

pub mod automation;
pub mod classifier;
pub mod config;
pub mod extractors;
pub mod listener;
pub mod pause;
pub mod publisher;
pub mod replay;
pub mod snapshot_diff;
pub mod types;
pub mod wait;

// Re-export commonly used types
pub use automation::{ChatAutomation, ForwardedItem, Selector, Side};
pub use classifier::{classify, classify_label, envelope, Envelope, Probes, Signal};
pub use config::Config;
pub use extractors::{ContentExtractor, MessageContent};
pub use listener::{Listener, ListenerStatus};
pub use pause::{PauseControl, PauseGuard, RunState, WorkerState};
pub use publisher::{EventPublisher, MessageHandler};
pub use replay::{ReplayScript, ScriptedAutomation, ScriptedMessage, ScriptedWindow};
pub use snapshot_diff::{consecutive_runs, diff_labels, DiffOutcome, MonitoredWindow};
pub use types::{
    Element, ElementId, ListenError, Message, MessageHandle, MessageKind, OriginKind,
    SenderKind, SourceKind, WindowBounds, WindowRef,
};
pub use wait::wait_until;
