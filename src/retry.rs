//! Bounded fixed-delay retry for the chapter-listing boundary.
//!
//! The listing request is the only retried operation in the acquisition path:
//! it is a single request whose failure costs a whole chapter, while image
//! fetches are high-volume and individually cheap to lose. The helper here is
//! deliberately simpler than exponential-backoff schemes; a fixed delay is
//! all the listing boundary needs.

use std::time::Duration;

use tracing::{debug, warn};

/// Default number of listing attempts (including the initial attempt).
pub const DEFAULT_LISTING_ATTEMPTS: u32 = 3;

/// Default delay between listing attempts.
pub const DEFAULT_LISTING_DELAY: Duration = Duration::from_secs(2);

/// A bounded retry plan: how many attempts, with a fixed delay between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPlan {
    /// Maximum attempts, including the first (clamped to at least 1).
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPlan {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_LISTING_ATTEMPTS,
            delay: DEFAULT_LISTING_DELAY,
        }
    }
}

impl RetryPlan {
    /// Creates a retry plan with the given attempt count and delay.
    #[must_use]
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

/// Runs `operation` up to `plan.attempts` times, sleeping `plan.delay` between
/// attempts, as long as `is_transient` classifies the failure as retryable.
///
/// Non-transient failures and the final attempt's failure are returned to the
/// caller unchanged.
///
/// # Errors
///
/// Returns the last error produced by `operation`.
pub async fn with_fixed_delay<T, E, F, Fut>(
    plan: RetryPlan,
    is_transient: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = plan.attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < attempts && is_transient(&error) => {
                warn!(
                    attempt,
                    max_attempts = attempts,
                    delay_ms = plan.delay.as_millis(),
                    error = %error,
                    "attempt failed, retrying after delay"
                );
                tokio::time::sleep(plan.delay).await;
            }
            Err(error) => {
                debug!(attempt, error = %error, "giving up");
                return Err(error);
            }
        }
    }
}
