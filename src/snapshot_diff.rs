//! Incremental differencing of message-list snapshots.
//!
//! The host UI exposes no stable message identifiers, only display labels, so
//! "what is new" is inferred from the previous tail label. The new messages are
//! always a suffix of the new snapshot. When the tail label repeats (the same
//! text sent twice in a row) a duplicate guard remembers the last position
//! already consumed so a run of identical labels is emitted only once.

use crate::types::{ListenError, MessageHandle, WindowRef};
use std::ops::Range;
use tracing::{debug, trace};

/// Result of comparing two snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOutcome {
    /// Positions in the new snapshot that hold new messages
    pub fresh: Range<usize>,
    /// Duplicate guard to carry into the next cycle
    pub guard: Option<usize>,
}

impl DiffOutcome {
    pub fn is_empty(&self) -> bool {
        self.fresh.is_empty()
    }
}

/// Split ascending positions into maximal runs of consecutive integers
pub fn consecutive_runs(positions: &[usize]) -> Vec<Vec<usize>> {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();

    let mut runs: Vec<Vec<usize>> = Vec::new();
    for position in sorted {
        match runs.last_mut() {
            Some(run) if run.last().map_or(false, |&last| last + 1 == position) => {
                run.push(position)
            }
            _ => runs.push(vec![position]),
        }
    }
    runs
}

/// Compare label sequences.
///
/// Returns `None` when `old` is non-empty and its last label is nowhere in
/// `new`: the boundary between seen and unseen messages is lost.
pub fn diff_labels<A, B>(old: &[A], new: &[B], guard: Option<usize>) -> Option<DiffOutcome>
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let last = match old.last() {
        Some(last) => last.as_ref(),
        None => {
            return Some(DiffOutcome {
                fresh: 0..new.len(),
                guard,
            })
        }
    };

    let positions: Vec<usize> = new
        .iter()
        .enumerate()
        .filter(|(_, label)| label.as_ref() == last)
        .map(|(position, _)| position)
        .collect();
    let boundary = *positions.last()?;

    if boundary + 1 < new.len() {
        return Some(DiffOutcome {
            fresh: boundary + 1..new.len(),
            guard,
        });
    }

    // The previous tail is still the tail. Either nothing arrived, or a copy
    // of the tail label was appended and shows up as a longer duplicate run.
    let runs = consecutive_runs(&positions);
    if let Some(run) = runs.last() {
        if let Some(&run_end) = run.last() {
            let unseen = guard.map_or(true, |consumed| run_end > consumed);
            if positions.len() > 1 && run.len() > 1 && unseen {
                return Some(DiffOutcome {
                    fresh: run_end..new.len(),
                    guard: Some(run_end),
                });
            }
        }
    }

    Some(DiffOutcome {
        fresh: new.len()..new.len(),
        guard,
    })
}

/// Per-window listening state, owned by the poll scheduler
#[derive(Debug, Clone)]
pub struct MonitoredWindow {
    pub window: WindowRef,
    last_snapshot: Vec<String>,
    duplicate_guard: Option<usize>,
}

impl MonitoredWindow {
    /// Start tracking a window from its currently visible messages
    pub fn with_baseline(window: WindowRef, baseline: &[MessageHandle]) -> Self {
        Self {
            window,
            last_snapshot: baseline.iter().map(|h| h.label.clone()).collect(),
            duplicate_guard: baseline.len().checked_sub(1),
        }
    }

    pub fn title(&self) -> &str {
        &self.window.title
    }

    pub fn last_snapshot(&self) -> &[String] {
        &self.last_snapshot
    }

    pub fn duplicate_guard(&self) -> Option<usize> {
        self.duplicate_guard
    }

    /// Work out which handles of `snapshot` are new since the last commit
    pub fn diff(&self, snapshot: &[MessageHandle]) -> Result<DiffOutcome, ListenError> {
        let labels: Vec<&str> = snapshot.iter().map(|h| h.label.as_str()).collect();
        let outcome = diff_labels(&self.last_snapshot, &labels, self.duplicate_guard)
            .ok_or_else(|| ListenError::SnapshotDiverged {
                window: self.window.title.clone(),
                last_label: self.last_snapshot.last().cloned().unwrap_or_default(),
            })?;

        if outcome.is_empty() {
            trace!("{}: no new messages", self.window.title);
        } else {
            debug!(
                "{}: {} new message(s) at {:?}, guard {:?}",
                self.window.title,
                outcome.fresh.len(),
                outcome.fresh,
                outcome.guard
            );
        }
        Ok(outcome)
    }

    /// Record a fully processed snapshot
    pub fn commit(&mut self, snapshot: &[MessageHandle], outcome: &DiffOutcome) {
        self.last_snapshot = snapshot.iter().map(|h| h.label.clone()).collect();
        self.duplicate_guard = self.duplicate_guard.max(outcome.guard);
    }
}
