//! Cooperative pause control for the poll worker.
//!
//! Callers that need the chat windows for themselves (sending a reply, for
//! example) ask the worker to pause and wait until it has actually parked at
//! its checkpoint between windows. Request and worker state live in a single
//! watch channel so the checkpoint transition and a pause request can never
//! interleave. Pause requests are counted: the worker stays parked until the
//! last holder lets go.

use crate::types::ListenError;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Requested run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Active,
    Paused,
}

/// What the worker is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    /// Not inside any window's step chain (also: no worker yet)
    Idle,
    /// Working on a window
    Polling,
    /// Parked at the checkpoint
    Suspended,
    /// Worker has exited
    Stopped,
}

#[derive(Debug, Clone, Copy)]
struct Gate {
    /// Outstanding pause requests
    holders: usize,
    worker: WorkerState,
}

impl Gate {
    fn requested(&self) -> RunState {
        if self.holders == 0 {
            RunState::Active
        } else {
            RunState::Paused
        }
    }
}

#[derive(Clone)]
pub struct PauseControl {
    gate: Arc<watch::Sender<Gate>>,
}

impl Default for PauseControl {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseControl {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(Gate {
            holders: 0,
            worker: WorkerState::Idle,
        });
        Self {
            gate: Arc::new(gate),
        }
    }

    pub fn state(&self) -> RunState {
        self.gate.borrow().requested()
    }

    /// Number of pause requests not yet released
    pub fn holders(&self) -> usize {
        self.gate.borrow().holders
    }

    pub fn worker_state(&self) -> WorkerState {
        self.gate.borrow().worker
    }

    /// Request a pause and wait until the worker is outside every window.
    ///
    /// Returns immediately when no worker is mid-window. Every call must be
    /// matched by a [`resume`](Self::resume).
    pub async fn pause(&self) {
        let mut rx = self.gate.subscribe();
        self.gate.send_modify(|gate| gate.holders += 1);
        info!("⏸️  Listener pause requested");
        // The sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|gate| gate.worker != WorkerState::Polling).await;
        debug!("Pause acknowledged");
    }

    /// Pause until the returned guard is dropped
    pub async fn hold(&self) -> PauseGuard {
        // Built before the wait so a cancelled caller still releases its hold
        let guard = PauseGuard {
            control: self.clone(),
        };
        let mut rx = self.gate.subscribe();
        self.gate.send_modify(|gate| gate.holders += 1);
        debug!("Pause hold taken");
        let _ = rx.wait_for(|gate| gate.worker != WorkerState::Polling).await;
        guard
    }

    /// Like [`pause`](Self::pause) but gives up after `limit`.
    ///
    /// The pause request stays in place on timeout.
    pub async fn pause_within(&self, limit: Duration) -> Result<(), ListenError> {
        tokio::time::timeout(limit, self.pause())
            .await
            .map_err(|_| ListenError::OperationTimeout(format!("pause acknowledgement after {:?}", limit)))
    }

    /// Release one pause request; the worker runs again once none are left
    pub fn resume(&self) {
        let mut remaining = 0;
        self.gate.send_modify(|gate| {
            gate.holders = gate.holders.saturating_sub(1);
            remaining = gate.holders;
        });
        if remaining == 0 {
            info!("▶️  Listener resumed");
        } else {
            debug!("Pause released, {} holder(s) left", remaining);
        }
    }

    /// Run `action` while the worker is held paused
    pub async fn while_paused<F>(&self, action: F) -> F::Output
    where
        F: Future,
    {
        let _guard = self.hold().await;
        action.await
    }

    /// Worker side: block while paused, then mark the worker busy
    pub(crate) async fn checkpoint(&self) {
        let mut rx = self.gate.subscribe();
        loop {
            let mut admitted = false;
            self.gate.send_modify(|gate| {
                if gate.holders == 0 {
                    gate.worker = WorkerState::Polling;
                    admitted = true;
                } else {
                    gate.worker = WorkerState::Suspended;
                }
            });
            if admitted {
                return;
            }
            debug!("Worker suspended at checkpoint");
            let _ = rx.wait_for(|gate| gate.holders == 0).await;
        }
    }

    /// Worker side: finished with the current window
    pub(crate) fn leave(&self) {
        self.set_worker(WorkerState::Idle);
    }

    pub(crate) fn mark_stopped(&self) {
        self.set_worker(WorkerState::Stopped);
    }

    fn set_worker(&self, state: WorkerState) {
        self.gate.send_modify(|gate| gate.worker = state);
    }
}

/// An outstanding pause request, released on drop
pub struct PauseGuard {
    control: PauseControl,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.control.resume();
    }
}
