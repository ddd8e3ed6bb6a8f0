use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::candidate::flatten_suggestions;
use crate::config::AppConfig;
use crate::diagnostics::{DiagnosticsSink, FailureStage};
use crate::errors::AppError;
use crate::lookup::LookupService;
use crate::normalize::strip_floor;
use crate::output::OutputRecord;
use crate::scoring::select_best;
use crate::throttle::RateLimiter;

/// Drives a batch of free-text addresses through lookup, retry, scoring
/// and extraction. Failed addresses resolve to `None` and leave a trail in
/// the diagnostics sink instead of failing the batch.
pub struct AddressResolver {
    lookup: LookupService,
    throttle: Arc<RateLimiter>,
    in_flight: Arc<Semaphore>,
    diag: DiagnosticsSink,
    max_retries: u32,
    sleep_multiplier: u32,
    retry_base: Duration,
}

impl AddressResolver {
    pub fn new(
        lookup: LookupService,
        throttle: Arc<RateLimiter>,
        diag: DiagnosticsSink,
        config: &AppConfig,
    ) -> Self {
        let base_secs = config.retry_base_secs;
        let retry_base = if base_secs.is_finite() && base_secs >= 0.0 {
            Duration::from_secs_f64(base_secs)
        } else {
            Duration::from_secs(1)
        };

        Self {
            lookup,
            throttle,
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            diag,
            max_retries: config.max_retries,
            sleep_multiplier: config.sleep_multiplier,
            retry_base,
        }
    }

    /// Resolves every address concurrently, bounded by the in-flight cap
    /// and the rate limiter. The output keeps the input order, one slot
    /// per address.
    pub async fn resolve_batch(&self, addresses: &[String]) -> Vec<Option<OutputRecord>> {
        join_all(addresses.iter().map(|address| self.resolve_one(address))).await
    }

    pub async fn resolve_one(&self, address: &str) -> Option<OutputRecord> {
        // The query drops floor-level noise, but scoring and the output
        // both see the address as given.
        let query = strip_floor(address);
        let items = self.fetch_with_retry(&query, address).await?;

        let candidates = match flatten_suggestions(&items) {
            Ok(candidates) => candidates,
            Err(err) => {
                self.report(FailureStage::Flatten, address, None, err.to_string());
                return None;
            }
        };

        match select_best(candidates, address) {
            Ok((best, similarity)) => {
                debug!(
                    address,
                    score = similarity.score,
                    rank = best.rank,
                    "resolved address"
                );
                Some(OutputRecord::from_candidate(address, &best))
            }
            Err(err) => {
                self.report(FailureStage::Scoring, address, None, err.to_string());
                None
            }
        }
    }

    async fn fetch_with_retry(&self, query: &str, address: &str) -> Option<Vec<Value>> {
        let mut failures = 0;
        while failures < self.max_retries {
            // Hold the concurrency slot and a rate token only for the
            // request itself, never across a backoff sleep.
            let outcome = match self.in_flight.acquire().await {
                Ok(_slot) => match self.throttle.acquire().await {
                    Ok(()) => self.lookup.lookup(query).await,
                    Err(err) => Err(err),
                },
                Err(_) => Err(AppError::ThrottleClosed),
            };

            match outcome {
                Ok(items) if items.is_empty() => {
                    self.report(
                        FailureStage::NoSuggestions,
                        address,
                        None,
                        "no suggestions for query".to_string(),
                    );
                    return None;
                }
                Ok(items) => return Some(items),
                Err(err) => {
                    failures += 1;
                    warn!(?err, address, attempt = failures, "lookup attempt failed");
                    self.report(FailureStage::Fetch, address, Some(failures), err.to_string());
                    if failures < self.max_retries {
                        sleep(self.backoff(failures)).await;
                    }
                }
            }
        }

        self.report(
            FailureStage::RetryExhausted,
            address,
            Some(self.max_retries),
            "max retries exceeded".to_string(),
        );
        None
    }

    fn backoff(&self, failures: u32) -> Duration {
        if failures <= 1 {
            self.retry_base
        } else {
            self.retry_base
                .mul_f64(f64::from(self.sleep_multiplier) * f64::from(failures - 1))
        }
    }

    fn report(&self, stage: FailureStage, address: &str, attempt: Option<u32>, detail: String) {
        if let Err(err) = self.diag.record(stage, address, attempt, detail) {
            warn!(?err, stage = stage.as_str(), "failed to record diagnostics");
        }
    }
}
