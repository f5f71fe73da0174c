//! Scripted automation backend.
//!
//! Replays recorded snapshots of chat windows from a JSON script instead of
//! driving a live host application. Each window carries a list of frames; every
//! `snapshot` call serves the next frame and the last frame repeats forever.
//! The first frame is consumed by registration and becomes the baseline.
//!
//! ```json
//! {
//!   "windows": [{
//!     "title": "Alice",
//!     "bounds": { "x": 100, "y": 100, "width": 800, "height": 600 },
//!     "frames": [
//!       [{ "label": "hello", "avatar": { "name": "Alice" },
//!          "children": [{ "selector": { "Text": "Other" }, "text": "hello" }] }],
//!       [{ "label": "hello" }, { "label": "[图片]", "avatar": { "name": "Alice" } }]
//!     ]
//!   }]
//! }
//! ```

use crate::automation::{ChatAutomation, ForwardedItem, Selector, Side};
use crate::config::TimingConfig;
use crate::types::{
    Element, ElementId, ListenError, MessageHandle, WindowBounds, WindowRef,
};
use crate::wait::wait_until;
use image::{DynamicImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Avatar offset used for messages from the logged-in account
const OWN_AVATAR_OFFSET: i32 = 740;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub windows: Vec<ScriptedWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedWindow {
    pub title: String,
    #[serde(default)]
    pub bounds: WindowBounds,
    #[serde(default)]
    pub frames: Vec<Vec<ScriptedMessage>>,
    /// Number of snapshots served before the window disappears
    #[serde(default)]
    pub closes_after: Option<usize>,
}

impl ScriptedWindow {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            bounds: WindowBounds::default(),
            frames: Vec::new(),
            closes_after: None,
        }
    }

    pub fn frame(mut self, messages: Vec<ScriptedMessage>) -> Self {
        self.frames.push(messages);
        self
    }

    pub fn closes_after(mut self, snapshots: usize) -> Self {
        self.closes_after = Some(snapshots);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedAvatar {
    pub name: String,
    /// Left edge relative to the window's left edge
    #[serde(default = "default_friend_offset")]
    pub offset: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedChild {
    pub selector: Selector,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedMessage {
    pub label: String,
    /// Absent for system items
    #[serde(default)]
    pub avatar: Option<ScriptedAvatar>,
    #[serde(default)]
    pub children: Vec<ScriptedChild>,
    /// File name the save-as operation stores the media under
    #[serde(default)]
    pub file_name: Option<String>,
    /// Whether the save-as dialog shows up
    #[serde(default = "default_true")]
    pub save_dialog: bool,
    #[serde(default)]
    pub transcript: Option<String>,
    /// Polls before the transcript appears
    #[serde(default)]
    pub transcript_delay_polls: u32,
    #[serde(default)]
    pub forwarded: Vec<ForwardedItem>,
}

fn default_true() -> bool {
    true
}

fn default_friend_offset() -> i32 {
    30
}

impl ScriptedMessage {
    /// Bare item with no avatar, as the host renders system notices
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            avatar: None,
            children: Vec::new(),
            file_name: None,
            save_dialog: true,
            transcript: None,
            transcript_delay_polls: 0,
            forwarded: Vec::new(),
        }
    }

    /// Plain text bubble from a friend
    pub fn text_from(label: impl Into<String>, sender: &str) -> Self {
        let label = label.into();
        Self::new(label.clone())
            .from_friend(sender)
            .with_child(Selector::Text(Side::Other), label)
    }

    /// Plain text bubble from the logged-in account
    pub fn own_text(label: impl Into<String>, name: &str) -> Self {
        let label = label.into();
        Self::new(label.clone())
            .from_self(name)
            .with_child(Selector::Text(Side::Own), label)
    }

    pub fn from_friend(mut self, name: &str) -> Self {
        self.avatar = Some(ScriptedAvatar {
            name: name.to_string(),
            offset: default_friend_offset(),
        });
        self
    }

    pub fn from_self(mut self, name: &str) -> Self {
        self.avatar = Some(ScriptedAvatar {
            name: name.to_string(),
            offset: OWN_AVATAR_OFFSET,
        });
        self
    }

    pub fn with_child(mut self, selector: Selector, text: impl Into<String>) -> Self {
        self.children.push(ScriptedChild {
            selector,
            text: text.into(),
        });
        self
    }

    pub fn with_file(mut self, file_name: &str) -> Self {
        self.file_name = Some(file_name.to_string());
        self
    }

    pub fn without_save_dialog(mut self) -> Self {
        self.save_dialog = false;
        self
    }

    pub fn with_transcript(mut self, transcript: &str, delay_polls: u32) -> Self {
        self.transcript = Some(transcript.to_string());
        self.transcript_delay_polls = delay_polls;
        self
    }

    pub fn with_forwarded(mut self, items: Vec<ForwardedItem>) -> Self {
        self.forwarded = items;
        self
    }
}

/// Frames per window and items per frame that fit in a packed element id
const ID_FIELD_LIMIT: usize = 1 << 20;

/// Element ids pack (window, frame, position) so a handle finds its item
fn encode_id(window: usize, frame: usize, position: usize) -> Option<ElementId> {
    if frame >= ID_FIELD_LIMIT || position >= ID_FIELD_LIMIT || window >= 1 << 24 {
        return None;
    }
    Some(((window as u64) << 40) | ((frame as u64) << 20) | position as u64)
}

fn decode_id(id: ElementId) -> (usize, usize, usize) {
    (
        (id >> 40) as usize,
        ((id >> 20) & 0xF_FFFF) as usize,
        (id & 0xF_FFFF) as usize,
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ScriptedAutomation {
    script: ReplayScript,
    retry_interval: Duration,
    save_dialog_timeout: Duration,
    /// Snapshots served per window index
    served: Mutex<HashMap<usize, usize>>,
    transcript_polls: Mutex<HashMap<ElementId, u32>>,
    focus_log: Mutex<Vec<String>>,
    resolve_log: Mutex<Vec<Selector>>,
}

impl ScriptedAutomation {
    pub fn new(script: ReplayScript, timing: &TimingConfig) -> Self {
        Self {
            script,
            retry_interval: timing.retry_interval(),
            save_dialog_timeout: timing.save_dialog_timeout(),
            served: Mutex::new(HashMap::new()),
            transcript_polls: Mutex::new(HashMap::new()),
            focus_log: Mutex::new(Vec::new()),
            resolve_log: Mutex::new(Vec::new()),
        }
    }

    /// Load a script from a JSON file
    pub fn from_path(path: &Path, timing: &TimingConfig) -> Result<Self, ListenError> {
        let contents = std::fs::read_to_string(path)?;
        let script: ReplayScript = serde_json::from_str(&contents)
            .map_err(|e| ListenError::Config(format!("invalid replay script {:?}: {}", path, e)))?;
        info!(
            "Loaded replay script {:?} with {} window(s)",
            path,
            script.windows.len()
        );
        Ok(Self::new(script, timing))
    }

    /// References to every scripted window
    pub fn window_refs(&self) -> Vec<WindowRef> {
        self.script
            .windows
            .iter()
            .enumerate()
            .map(|(index, window)| WindowRef::new(window.title.clone(), index as ElementId))
            .collect()
    }

    /// Titles of focused windows, oldest first
    pub fn focus_log(&self) -> Vec<String> {
        lock(&self.focus_log).clone()
    }

    /// Selectors looked up so far, oldest first
    pub fn resolve_log(&self) -> Vec<Selector> {
        lock(&self.resolve_log).clone()
    }

    fn find_window(&self, window: &WindowRef) -> Result<usize, ListenError> {
        self.script
            .windows
            .iter()
            .position(|w| w.title == window.title)
            .ok_or_else(|| ListenError::WindowUnavailable(window.title.clone()))
    }

    /// A closed window disappears on the next focus or snapshot
    fn window_index(&self, window: &WindowRef) -> Result<usize, ListenError> {
        let index = self.find_window(window)?;

        let closes_after = self.script.windows[index].closes_after;
        let served = lock(&self.served).get(&index).copied().unwrap_or(0);
        if closes_after.map_or(false, |limit| served >= limit) {
            return Err(ListenError::WindowUnavailable(window.title.clone()));
        }
        Ok(index)
    }

    fn message(&self, handle: &MessageHandle) -> Option<(&ScriptedWindow, &ScriptedMessage)> {
        let (window, frame, position) = decode_id(handle.element);
        let scripted = self.script.windows.get(window)?;
        let message = scripted.frames.get(frame)?.get(position)?;
        Some((scripted, message))
    }

    fn require(&self, handle: &MessageHandle) -> Result<&ScriptedMessage, ListenError> {
        self.message(handle)
            .map(|(_, message)| message)
            .ok_or_else(|| ListenError::Automation(format!("stale handle {}", handle.element)))
    }

    fn poll_transcript(&self, handle: &MessageHandle) -> Result<Option<String>, ListenError> {
        let message = self.require(handle)?;
        let transcript = message
            .transcript
            .as_ref()
            .ok_or_else(|| ListenError::Automation("voice-to-text is not offered".to_string()))?;

        let mut polls = lock(&self.transcript_polls);
        let count = polls.entry(handle.element).or_insert(0);
        *count += 1;
        Ok((*count > message.transcript_delay_polls).then(|| transcript.clone()))
    }
}

#[async_trait::async_trait]
impl ChatAutomation for ScriptedAutomation {
    async fn focus(&self, window: &WindowRef) -> Result<(), ListenError> {
        self.window_index(window)?;
        lock(&self.focus_log).push(window.title.clone());
        Ok(())
    }

    async fn snapshot(&self, window: &WindowRef) -> Result<Vec<MessageHandle>, ListenError> {
        let index = self.window_index(window)?;
        let scripted = &self.script.windows[index];

        let served = {
            let mut served = lock(&self.served);
            let count = served.entry(index).or_insert(0);
            let current = *count;
            *count += 1;
            current
        };

        let frame = match scripted.frames.len() {
            0 => return Ok(Vec::new()),
            len => served.min(len - 1),
        };

        scripted.frames[frame]
            .iter()
            .enumerate()
            .map(|(position, message)| {
                let id = encode_id(index, frame, position).ok_or_else(|| {
                    ListenError::Config(format!(
                        "replay window {} exceeds {} frames or items per frame",
                        scripted.title, ID_FIELD_LIMIT
                    ))
                })?;
                Ok(MessageHandle::new(id, message.label.clone(), position))
            })
            .collect()
    }

    async fn window_bounds(&self, window: &WindowRef) -> Result<WindowBounds, ListenError> {
        let index = self.find_window(window)?;
        Ok(self.script.windows[index].bounds)
    }

    async fn resolve(&self, handle: &MessageHandle, selector: Selector) -> Option<Element> {
        lock(&self.resolve_log).push(selector);
        let (window, message) = self.message(handle)?;

        if selector == Selector::Avatar {
            return message.avatar.as_ref().map(|avatar| Element {
                id: handle.element,
                name: avatar.name.clone(),
                bounds: WindowBounds::new(window.bounds.x + avatar.offset, 0, 36, 36),
            });
        }

        message
            .children
            .iter()
            .find(|child| child.selector == selector)
            .map(|child| Element {
                id: handle.element,
                name: child.text.clone(),
                bounds: WindowBounds::default(),
            })
    }

    async fn save_as(
        &self,
        _window: &WindowRef,
        handle: &MessageHandle,
        dir: &Path,
        is_video: bool,
    ) -> Result<PathBuf, ListenError> {
        let message = self.require(handle)?;
        if is_video {
            debug!("Triggering video download before save-as");
        }

        let dialog = message.save_dialog;
        wait_until(
            "save-as dialog",
            || std::future::ready(Ok(dialog.then_some(()))),
            self.retry_interval,
            Some(self.save_dialog_timeout),
        )
        .await?;

        let file_name = message
            .file_name
            .clone()
            .unwrap_or_else(|| format!("message-{}", handle.element));
        let path = dir.join(file_name);
        tokio::fs::write(&path, message.label.as_bytes()).await?;
        Ok(path)
    }

    async fn transcribe_voice(
        &self,
        _window: &WindowRef,
        handle: &MessageHandle,
    ) -> Result<String, ListenError> {
        wait_until(
            "voice transcript",
            || std::future::ready(self.poll_transcript(handle)),
            self.retry_interval,
            None,
        )
        .await
    }

    async fn unpack_merge_forward(
        &self,
        handle: &MessageHandle,
    ) -> Result<Vec<ForwardedItem>, ListenError> {
        Ok(self.require(handle)?.forwarded.clone())
    }

    async fn capture_element(&self, handle: &MessageHandle) -> Result<DynamicImage, ListenError> {
        self.require(handle)?;
        Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            24,
            24,
            Rgba([250, 204, 21, 255]),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fast_timing() -> TimingConfig {
        TimingConfig {
            settle_delay_ms: 0,
            cycle_interval_ms: 0,
            retry_interval_ms: 1,
            save_dialog_timeout_ms: 20,
        }
    }

    fn labels(handles: &[MessageHandle]) -> Vec<String> {
        handles.iter().map(|h| h.label.clone()).collect()
    }

    #[test]
    fn test_id_roundtrip() {
        assert_eq!(decode_id(encode_id(3, 17, 250).unwrap()), (3, 17, 250));
        let last = ID_FIELD_LIMIT - 1;
        assert_eq!(decode_id(encode_id(0, last, last).unwrap()), (0, last, last));
    }

    #[test]
    fn test_id_fields_out_of_range_are_rejected() {
        // Would otherwise alias (0, 1, 0)
        assert_eq!(encode_id(0, 0, ID_FIELD_LIMIT), None);
        assert_eq!(encode_id(0, ID_FIELD_LIMIT, 0), None);
        assert_eq!(encode_id(1 << 24, 0, 0), None);
    }

    #[tokio::test]
    async fn test_frames_advance_and_last_repeats() {
        let script = ReplayScript {
            windows: vec![ScriptedWindow::new("Alice")
                .frame(vec![ScriptedMessage::new("a")])
                .frame(vec![ScriptedMessage::new("a"), ScriptedMessage::new("b")])],
        };
        let automation = ScriptedAutomation::new(script, &fast_timing());
        let window = automation.window_refs().remove(0);

        assert_eq!(labels(&automation.snapshot(&window).await.unwrap()), vec!["a"]);
        assert_eq!(labels(&automation.snapshot(&window).await.unwrap()), vec!["a", "b"]);
        assert_eq!(labels(&automation.snapshot(&window).await.unwrap()), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_window_closes() {
        let script = ReplayScript {
            windows: vec![ScriptedWindow::new("Alice")
                .frame(vec![ScriptedMessage::new("a")])
                .closes_after(1)],
        };
        let automation = ScriptedAutomation::new(script, &fast_timing());
        let window = automation.window_refs().remove(0);

        automation.snapshot(&window).await.unwrap();
        // Items of the last snapshot can still be read
        assert!(automation.window_bounds(&window).await.is_ok());
        assert!(matches!(
            automation.focus(&window).await,
            Err(ListenError::WindowUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_avatar_and_children() {
        let script = ReplayScript {
            windows: vec![ScriptedWindow {
                bounds: WindowBounds::new(100, 50, 800, 600),
                ..ScriptedWindow::new("Alice").frame(vec![ScriptedMessage::text_from("hi", "Alice")])
            }],
        };
        let automation = ScriptedAutomation::new(script, &fast_timing());
        let window = automation.window_refs().remove(0);
        let handle = automation.snapshot(&window).await.unwrap().remove(0);

        let avatar = automation.resolve(&handle, Selector::Avatar).await.unwrap();
        assert_eq!(avatar.name, "Alice");
        assert_eq!(avatar.bounds.x, 130);

        let text = automation.resolve(&handle, Selector::Text(Side::Other)).await.unwrap();
        assert_eq!(text.name, "hi");
        assert!(automation.resolve(&handle, Selector::Text(Side::Own)).await.is_none());
    }

    #[tokio::test]
    async fn test_transcript_waits_for_delay() {
        let script = ReplayScript {
            windows: vec![ScriptedWindow::new("Alice").frame(vec![
                ScriptedMessage::new("[语音]2\"").with_transcript("on my way", 3),
            ])],
        };
        let automation = ScriptedAutomation::new(script, &fast_timing());
        let window = automation.window_refs().remove(0);
        let handle = automation.snapshot(&window).await.unwrap().remove(0);

        let transcript = automation.transcribe_voice(&window, &handle).await.unwrap();
        assert_eq!(transcript, "on my way");
        assert_eq!(lock(&automation.transcript_polls)[&handle.element], 4);
    }

    #[tokio::test]
    async fn test_save_as_times_out_without_dialog() {
        let dir = tempfile::tempdir().unwrap();
        let script = ReplayScript {
            windows: vec![ScriptedWindow::new("Alice").frame(vec![
                ScriptedMessage::new("[文件]").without_save_dialog(),
            ])],
        };
        let automation = ScriptedAutomation::new(script, &fast_timing());
        let window = automation.window_refs().remove(0);
        let handle = automation.snapshot(&window).await.unwrap().remove(0);

        let result = automation.save_as(&window, &handle, dir.path(), false).await;
        assert!(matches!(result, Err(ListenError::OperationTimeout(_))));
    }

    #[test]
    fn test_parse_script() {
        let json = r#"{
            "windows": [{
                "title": "Alice",
                "frames": [[
                    { "label": "hi", "avatar": { "name": "Alice" },
                      "children": [{ "selector": { "Text": "Other" }, "text": "hi" }] },
                    { "label": "" , "children": [{ "selector": "SystemNotice", "text": "Alice patted you" }] }
                ]]
            }]
        }"#;
        let script: ReplayScript = serde_json::from_str(json).unwrap();
        let message = &script.windows[0].frames[0][0];
        assert_eq!(message.avatar.as_ref().unwrap().offset, 30);
        assert_eq!(message.children[0].selector, Selector::Text(Side::Other));
        assert!(message.save_dialog);
        assert_eq!(script.windows[0].frames[0][1].children[0].selector, Selector::SystemNotice);
    }
}
