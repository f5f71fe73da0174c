//! Poll scheduler for the chat listener.
//!
//! A single background worker walks the monitored windows in registration
//! order. For each window it focuses the window, snapshots the message list,
//! works out which items are new and turns each of them into a [`Message`]
//! that is handed to the [`EventPublisher`]. Between windows it passes the
//! pause checkpoint so other tasks can borrow the UI safely.

use crate::automation::ChatAutomation;
use crate::classifier;
use crate::config::Config;
use crate::extractors::ContentExtractor;
use crate::pause::{PauseControl, RunState, WorkerState};
use crate::publisher::EventPublisher;
use crate::snapshot_diff::MonitoredWindow;
use crate::types::{
    ListenError, Message, MessageHandle, MessageKind, OriginKind, SenderKind, SourceKind,
    WindowRef, SYSTEM_SENDER_NAME,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Listener status information
#[derive(Debug, Clone, Serialize)]
pub struct ListenerStatus {
    pub state: RunState,
    pub worker: WorkerState,
    pub windows: usize,
    pub delivered_total: u64,
    pub skipped_total: u64,
}

pub struct Listener {
    config: Config,
    automation: Arc<dyn ChatAutomation>,
    publisher: Arc<EventPublisher>,
    extractor: ContentExtractor,
    /// Monitored windows in registration order
    windows: Mutex<Vec<MonitoredWindow>>,
    pause: PauseControl,
    worker: StdMutex<Option<JoinHandle<Result<(), ListenError>>>>,
    /// Messages dropped by per-message failures
    skipped: AtomicU64,
}

impl Listener {
    pub fn new(
        config: Config,
        automation: Arc<dyn ChatAutomation>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        let extractor = ContentExtractor::new(Arc::clone(&automation), config.storage.save_dir.clone());
        Self {
            config,
            automation,
            publisher,
            extractor,
            windows: Mutex::new(Vec::new()),
            pause: PauseControl::new(),
            worker: StdMutex::new(None),
            skipped: AtomicU64::new(0),
        }
    }

    /// Register windows and start the worker if it is not running yet.
    ///
    /// Windows already registered are ignored. New windows join from the
    /// worker's next pass.
    pub async fn init_listen(self: &Arc<Self>, windows: Vec<WindowRef>) -> Result<(), ListenError> {
        self.register(windows).await?;
        self.start_worker();
        Ok(())
    }

    /// Register windows without starting the worker.
    ///
    /// Each window's currently visible messages become its baseline and are
    /// never delivered. A running worker is held at its checkpoint while the
    /// baselines are taken.
    pub async fn register(&self, windows: Vec<WindowRef>) -> Result<(), ListenError> {
        let _hold = self.pause.hold().await;
        for window in windows {
            if self.is_registered(&window.title).await {
                debug!("Window {} already registered", window.title);
                continue;
            }

            let baseline = self.automation.snapshot(&window).await?;
            info!("window: {}, baseline messages: {}", window.title, baseline.len());

            let mut registry = self.windows.lock().await;
            if registry.iter().any(|w| w.title() == window.title) {
                continue;
            }
            registry.push(MonitoredWindow::with_baseline(window, &baseline));
        }
        Ok(())
    }

    async fn is_registered(&self, title: &str) -> bool {
        self.windows.lock().await.iter().any(|w| w.title() == title)
    }

    fn start_worker(self: &Arc<Self>) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return;
        }

        let listener = Arc::clone(self);
        *worker = Some(tokio::spawn(async move { listener.run().await }));
        info!("✅ Listener worker started");
    }

    /// Take the worker's handle, e.g. to await its exit
    pub fn take_worker(&self) -> Option<JoinHandle<Result<(), ListenError>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    async fn run(&self) -> Result<(), ListenError> {
        let result = self.poll_forever().await;
        self.pause.mark_stopped();
        if let Err(e) = &result {
            error!("Listener worker halted: {}", e);
        }
        result
    }

    async fn poll_forever(&self) -> Result<(), ListenError> {
        loop {
            self.poll_cycle().await?;
            tokio::time::sleep(self.config.timing.cycle_interval()).await;
        }
    }

    /// One pass over every monitored window
    pub async fn poll_cycle(&self) -> Result<(), ListenError> {
        let titles: Vec<String> = self
            .windows
            .lock()
            .await
            .iter()
            .map(|w| w.title().to_string())
            .collect();

        for title in titles {
            self.pause.checkpoint().await;
            let result = self.poll_window(&title).await;
            self.pause.leave();

            match result {
                Ok(()) => {}
                Err(ListenError::WindowUnavailable(_)) if self.config.listen.drop_unavailable_windows => {
                    warn!("⚠️  Window {} is gone, no longer listening to it", title);
                    self.windows.lock().await.retain(|w| w.title() != title);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn poll_window(&self, title: &str) -> Result<(), ListenError> {
        let state = match self.windows.lock().await.iter().find(|w| w.title() == title) {
            Some(state) => state.clone(),
            None => return Ok(()),
        };
        let window = &state.window;

        self.automation.focus(window).await?;
        tokio::time::sleep(self.config.timing.settle_delay()).await;

        let snapshot = self.automation.snapshot(window).await?;
        let outcome = state.diff(&snapshot)?;
        if outcome.is_empty() {
            return Ok(());
        }

        for handle in &snapshot[outcome.fresh.clone()] {
            match self.build_message(window, handle).await {
                Ok(message) => {
                    info!("📥 {}: {} from {}", window.title, message.kind.as_str(), message.sender_name);
                    self.publisher.publish(&message, window);
                }
                Err(e) if e.is_per_message() => {
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                    warn!("Skipping message {:?} in {}: {}", handle.label, window.title, e);
                }
                Err(e) => return Err(e),
            }
        }

        let mut registry = self.windows.lock().await;
        if let Some(stored) = registry.iter_mut().find(|w| w.title() == title) {
            stored.commit(&snapshot, &outcome);
        }
        Ok(())
    }

    /// Classify and extract one new message item
    pub async fn build_message(
        &self,
        window: &WindowRef,
        handle: &MessageHandle,
    ) -> Result<Message, ListenError> {
        let automation = self.automation.as_ref();
        let envelope = classifier::envelope(
            automation,
            window,
            handle,
            self.config.classification.friend_avatar_offset,
        )
        .await?;

        if envelope.source == SourceKind::System {
            let notice = self.extractor.system_notice(handle).await?;
            trace!("System notice in {}: {}", window.title, notice);
            return Ok(Message {
                kind: MessageKind::Text,
                source_kind: SourceKind::System,
                sender_kind: SenderKind::Myself,
                origin_kind: OriginKind::Single,
                content: vec![notice],
                sender_name: SYSTEM_SENDER_NAME.to_string(),
                origin_window: window.title.clone(),
                received_at: Utc::now(),
            });
        }

        let kind = classifier::classify(automation, handle).await?;
        let content = self.extractor.extract(window, handle, kind).await?;

        Ok(Message {
            kind,
            source_kind: envelope.source,
            sender_kind: envelope.sender,
            origin_kind: envelope.origin,
            content: content.into_lines(),
            sender_name: envelope.sender_name,
            origin_window: window.title.clone(),
            received_at: Utc::now(),
        })
    }

    /// Pause the worker and wait until it is outside every window
    pub async fn pause(&self) {
        self.pause.pause().await;
    }

    pub fn resume(&self) {
        self.pause.resume();
    }

    /// Handle on the pause control, for callers that outlive a borrow
    pub fn pause_control(&self) -> PauseControl {
        self.pause.clone()
    }

    pub fn publisher(&self) -> &Arc<EventPublisher> {
        &self.publisher
    }

    /// Titles of the monitored windows, in registration order
    pub async fn windows(&self) -> Vec<String> {
        self.windows
            .lock()
            .await
            .iter()
            .map(|w| w.title().to_string())
            .collect()
    }

    /// Labels recorded for a window after its last productive poll
    pub async fn last_snapshot(&self, title: &str) -> Option<Vec<String>> {
        self.windows
            .lock()
            .await
            .iter()
            .find(|w| w.title() == title)
            .map(|w| w.last_snapshot().to_vec())
    }

    pub async fn status(&self) -> ListenerStatus {
        ListenerStatus {
            state: self.pause.state(),
            worker: self.pause.worker_state(),
            windows: self.windows.lock().await.len(),
            delivered_total: self.publisher.published_count(),
            skipped_total: self.skipped.load(Ordering::Relaxed),
        }
    }
}
