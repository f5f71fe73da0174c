//! Fan-out of delivered messages to subscribers.
//!
//! One publisher is built at startup and shared by `Arc`. Handlers run
//! synchronously on the poll task, in registration order: every "all
//! messages" handler first, then (for messages not sent by the logged-in
//! account) every "excluding self" handler.

use crate::types::{Message, WindowRef};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Callback invoked with each delivered message and the window it came from
pub type MessageHandler = Arc<dyn Fn(&Message, &WindowRef) + Send + Sync>;

#[derive(Default)]
pub struct EventPublisher {
    all: RwLock<Vec<MessageHandler>>,
    without_self: RwLock<Vec<MessageHandler>>,
    published: AtomicU64,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every message
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&Message, &WindowRef) + Send + Sync + 'static,
    {
        self.all
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    /// Subscribe to messages not sent by the logged-in account
    pub fn on_message_without_self<F>(&self, handler: F)
    where
        F: Fn(&Message, &WindowRef) + Send + Sync + 'static,
    {
        self.without_self
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    /// Forward messages into a channel instead of a callback
    pub fn subscribe_channel(
        &self,
        include_self: bool,
    ) -> mpsc::UnboundedReceiver<(Message, WindowRef)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let forward = move |message: &Message, window: &WindowRef| {
            if tx.send((message.clone(), window.clone())).is_err() {
                trace!("Message channel closed, dropping {}", message.kind.as_str());
            }
        };
        if include_self {
            self.on_message(forward);
        } else {
            self.on_message_without_self(forward);
        }
        rx
    }

    pub fn publish(&self, message: &Message, window: &WindowRef) {
        // Handlers may subscribe further handlers, so never call them under the lock
        let all = snapshot(&self.all);
        for handler in &all {
            handler(message, window);
        }

        if !message.is_self() {
            let others = snapshot(&self.without_self);
            for handler in &others {
                handler(message, window);
            }
        }

        let total = self.published.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "Published {} from {} (#{})",
            message.kind.as_str(),
            window.title,
            total
        );
    }

    /// Messages published since startup
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        snapshot(&self.all).len() + snapshot(&self.without_self).len()
    }
}

fn snapshot(handlers: &RwLock<Vec<MessageHandler>>) -> Vec<MessageHandler> {
    handlers
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
