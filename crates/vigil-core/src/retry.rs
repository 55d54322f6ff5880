// ── Exponential backoff ──

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::CoreError;

/// Capped exponential backoff without jitter, so successive delays are
/// exact and monotone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay after the `failure`-th consecutive failure (1-based):
    /// `min(base * 2^(failure - 1), cap)`.
    pub fn delay(&self, failure: u32) -> Duration {
        let exponent = failure.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |d| d.min(self.cap))
    }
}

/// Run `op` up to `max_attempts` times, sleeping with `backoff` between
/// attempts. Only transient errors are retried.
pub async fn retry_with_backoff<T, F, Fut>(
    what: &str,
    backoff: Backoff,
    max_attempts: u32,
    mut op: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = backoff.delay(attempt);
                debug!(
                    what,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(what, attempt, error = %e, "giving up");
                return Err(e);
            }
        }
    }
}
