//! Request pacing for the extraction client.
//!
//! The provider quota is per-account, so a single shared pacer serializes all
//! live requests: before each issue, the pacer sleeps out the remainder of the
//! minimum inter-request interval measured from the previous issue. Cache hits
//! never touch it.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

/// Shared minimum-interval request pacer.
///
/// Owned explicitly by the pipeline and passed by handle, so tests can inject
/// [`Pacer::unlimited`] instead of hidden process-wide state.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    last_issued: Mutex<Option<Instant>>,
}

impl Pacer {
    /// Create a pacer enforcing the given minimum interval between requests.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_issued: Mutex::new(None),
        }
    }

    /// A pacer that never waits. For tests and cache-only runs.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Wait until the interval has elapsed, then mark a request as issued.
    ///
    /// The slot lock is held across the sleep so concurrent callers serialize:
    /// at most one request is admitted per interval window.
    pub async fn acquire(&self) {
        let mut last = self.last_issued.lock().await;
        if let Some(issued) = *last {
            let elapsed = issued.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!("Rate limiting: waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Exponential backoff delay for the given retry number (0-based).
///
/// Doubles per retry from the base interval, capped at 30s.
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    const MAX_BACKOFF: Duration = Duration::from_secs(30);
    let factor = 2u32.saturating_pow(retry);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}
