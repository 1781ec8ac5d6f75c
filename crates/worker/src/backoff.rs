//! Capped exponential backoff for startup connections.

use std::future::Future;
use std::time::Duration;
use sync_core::{Error, Result};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    /// Delay before attempt `attempt + 1`, doubling from `initial` up to `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Run `op` until it succeeds, attempts run out, or shutdown is requested.
pub async fn retry_with_backoff<T, F, Fut>(
    what: &str,
    policy: BackoffPolicy,
    shutdown: &mut watch::Receiver<bool>,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(what = what, attempt = attempt, "Connected after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= policy.max_attempts => {
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay(attempt);
                warn!(
                    what = what,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Startup connection failed, backing off"
                );
                if *shutdown.borrow() {
                    return Err(Error::internal(format!("{}: shutdown requested", what)));
                }
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {
                        return Err(Error::internal(format!("{}: shutdown requested", what)));
                    }
                }
            }
        }
    }
}
