//! Fixed-interval retry wrapper
//!
//! `max_attempts` counts total invocations, not additional ones. The delay
//! between attempts is constant - flaky registry pushes and health probes
//! get a handful of evenly spaced tries, nothing adaptive.

use crate::exec::cancel::CancelSignal;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Re-invoke `op` until it succeeds or `max_attempts` invocations are
/// exhausted, sleeping `delay` between attempts. The first success returns
/// immediately; the last failure is surfaced once attempts run out. The
/// inter-attempt sleep is cut short by `cancel`, in which case the most
/// recent failure is returned without further attempts.
pub async fn with_retry<T, E, F, Fut>(
    max_attempts: usize,
    delay: Duration,
    cancel: &CancelSignal,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let total = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= total || cancel.is_cancelled() => return Err(err),
            Err(err) => {
                warn!(
                    "attempt {}/{} failed: {} (retrying in {:?})",
                    attempt, total, err, delay
                );
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(err),
                }
            }
        }
    }
}
