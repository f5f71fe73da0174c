//! Condition waits for side-effecting UI operations.

use crate::types::ListenError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Poll `probe` every `interval` until it yields a value.
///
/// With a `deadline` the wait fails with [`ListenError::OperationTimeout`] once
/// it has elapsed; without one the wait is unbounded. An error from the probe
/// ends the wait and is returned unchanged.
pub async fn wait_until<T, F, Fut>(
    what: &str,
    mut probe: F,
    interval: Duration,
    deadline: Option<Duration>,
) -> Result<T, ListenError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ListenError>>,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        if let Some(value) = probe().await? {
            trace!("{} observed after {} attempt(s)", what, attempts);
            return Ok(value);
        }

        if let Some(limit) = deadline {
            if started.elapsed() >= limit {
                return Err(ListenError::OperationTimeout(format!(
                    "{} after {:?}",
                    what, limit
                )));
            }
        }

        tokio::time::sleep(interval).await;
    }
}
