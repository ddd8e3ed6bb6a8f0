use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use crate::errors::{AppError, AppResult};

// Floor on the refill cadence so high rates do not spin the filler task.
const MIN_SLEEP: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Leaky-bucket admission gate: a small token bucket kept topped up by a
/// background filler task, so sustained throughput tracks `rate_limit`
/// requests per second no matter how many callers are waiting.
pub struct RateLimiter {
    bucket: Arc<Semaphore>,
    filler: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(rate_limit: f64) -> AppResult<Self> {
        if !rate_limit.is_finite() || rate_limit <= 0.0 {
            return Err(AppError::Config(format!(
                "rate limit must be positive, got {rate_limit}"
            )));
        }

        let capacity = bucket_capacity(rate_limit);
        let bucket = Arc::new(Semaphore::new(capacity));
        let filler = tokio::spawn(refill_loop(Arc::clone(&bucket), rate_limit, capacity));
        Ok(Self {
            bucket,
            filler: Mutex::new(Some(filler)),
        })
    }

    /// Blocks until a token is available and consumes it. Fails instead of
    /// hanging once the limiter has been closed.
    pub async fn acquire(&self) -> AppResult<()> {
        let permit = self
            .bucket
            .acquire()
            .await
            .map_err(|_| AppError::ThrottleClosed)?;
        permit.forget();
        Ok(())
    }

    /// Stops the filler task and fails all pending and future `acquire`
    /// calls. Waits a short grace period for the task to wind down.
    pub async fn close(&self) {
        self.bucket.close();
        let handle = self.filler.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = timeout(SHUTDOWN_GRACE, handle).await;
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Some(handle) = self.filler.lock().take() {
            handle.abort();
        }
    }
}

// Capacity stays tiny on purpose: the limiter is meant to hold a steady
// rate, not to bank up a burst allowance.
fn bucket_capacity(rate_limit: f64) -> usize {
    (rate_limit.floor() as usize + 1).min(2)
}

fn refill_cadence(rate_limit: f64) -> Duration {
    Duration::from_secs_f64((1.0 / rate_limit).max(MIN_SLEEP.as_secs_f64()))
}

async fn refill_loop(bucket: Arc<Semaphore>, rate_limit: f64, capacity: usize) {
    let cadence = refill_cadence(rate_limit);
    let mut last_refill = Instant::now();
    // Carries the sub-token remainder between ticks so slow rates are not
    // rounded down to zero forever.
    let mut carry = 0.0_f64;
    loop {
        if bucket.available_permits() < capacity {
            let now = Instant::now();
            let grown = rate_limit * now.duration_since(last_refill).as_secs_f64() + carry;
            let whole = grown.floor();
            carry = grown - whole;
            let space = capacity - bucket.available_permits();
            bucket.add_permits((whole as usize).min(space));
            last_refill = now;
        }
        sleep(cadence).await;
    }
}
