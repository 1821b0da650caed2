//! Rate-limit-aware execution of outbound requests.
//!
//! Every request is spaced by the shared [`RateLimiter`], and HTTP 429
//! responses are retried with a growing delay. Each outcome is broadcast as a
//! [`RateLimitState`] so a front end can show a "rate limited" indicator.

use super::rate_limiter::RateLimiter;
use shared::config::{ApiConfig, RetryConfig};
use shared::RateLimitState;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Buffered rate limit states per subscriber before it starts lagging
const NOTIFY_CAPACITY: usize = 16;

/// Errors the pipeline knows how to classify
pub trait RetryableError {
    /// Whether the server rejected the request for exceeding its rate limit
    fn is_rate_limited(&self) -> bool;
}

/// Bounds for retrying rate-limited requests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Wait before the first retry
    pub initial_delay: Duration,
    /// Factor applied to the wait after each retry
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(2000),
            multiplier: 1.5,
        }
    }
}

impl RetryPolicy {
    /// Create a policy; a multiplier below 1.0 (or not finite) is treated as 1.0
    pub fn new(max_retries: u32, initial_delay: Duration, multiplier: f64) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };

        Self {
            max_retries,
            initial_delay,
            multiplier,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.initial_delay_ms),
            config.backoff_multiplier,
        )
    }

    /// Waits before each retry, in order
    pub fn delays(&self) -> Backoff {
        Backoff {
            next: self.initial_delay,
            multiplier: self.multiplier,
            remaining: self.max_retries,
        }
    }
}

/// Backoff schedule of a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    multiplier: f64,
    remaining: u32,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let current = self.next;
        self.next = Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .unwrap_or(Duration::MAX);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Backoff {}

/// Throttle, retry and notification stage shared by every request of a client
///
/// Share it behind an `Arc` so that all callers are spaced by the same limiter.
#[derive(Debug)]
pub struct RequestPipeline {
    limiter: RateLimiter,
    notifier: broadcast::Sender<RateLimitState>,
    policy: RetryPolicy,
}

impl RequestPipeline {
    pub fn new(limiter: RateLimiter, policy: RetryPolicy) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            limiter,
            notifier,
            policy,
        }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(
            RateLimiter::from_config(&config.rate_limit),
            RetryPolicy::from_config(&config.retry),
        )
    }

    /// Receive every rate limit state published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RateLimitState> {
        self.notifier.subscribe()
    }

    /// Policy used by [`execute_with_retry`](Self::execute_with_retry)
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Dispatches in the trailing minute (only tracked with a per-minute cap)
    pub fn dispatches_last_minute(&self) -> usize {
        self.limiter.current_minute_count()
    }

    /// Run `operation` with this pipeline's retry policy
    pub async fn execute_with_retry<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + Display,
    {
        let policy = self.policy;
        self.execute_with(&policy, operation).await
    }

    /// Run `operation` once per attempt until it succeeds, fails with
    /// something other than a rate limit, or `policy` runs out of retries
    ///
    /// The error of the last attempt is returned as is.
    pub async fn execute_with<T, E, F, Fut>(
        &self,
        policy: &RetryPolicy,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + Display,
    {
        let mut delays = policy.delays();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.limiter.acquire().await;

            debug!(attempt = attempt, "Dispatching request");

            match operation().await {
                Ok(value) => {
                    self.notify(RateLimitState::cleared());
                    return Ok(value);
                }
                Err(e) if e.is_rate_limited() => match delays.next() {
                    Some(delay) => {
                        warn!(
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Rate limited by server, waiting before retry"
                        );
                        self.notify(RateLimitState::limited(delay));
                        sleep(delay).await;
                    }
                    None => {
                        warn!(attempts = attempt, error = %e, "Rate limited, retries exhausted");
                        self.notify(RateLimitState::cleared());
                        return Err(e);
                    }
                },
                Err(e) => {
                    debug!(attempt = attempt, error = %e, "Request failed, not retrying");
                    self.notify(RateLimitState::cleared());
                    return Err(e);
                }
            }
        }
    }

    fn notify(&self, state: RateLimitState) {
        // No subscribers is fine
        let _ = self.notifier.send(state);
    }
}

impl Default for RequestPipeline {
    fn default() -> Self {
        Self::new(
            RateLimiter::new(Duration::from_millis(1000), None),
            RetryPolicy::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use thiserror::Error;
    use tokio::time::Instant;

    #[derive(Error, Debug, PartialEq)]
    enum TestError {
        #[error("429 on attempt {0}")]
        TooManyRequests(u32),
        #[error("500 on attempt {0}")]
        Server(u32),
    }

    impl RetryableError for TestError {
        fn is_rate_limited(&self) -> bool {
            matches!(self, TestError::TooManyRequests(_))
        }
    }

    fn assert_near(actual: Duration, expected_ms: u64) {
        let expected = Duration::from_millis(expected_ms);
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    fn drain(receiver: &mut broadcast::Receiver<RateLimitState>) -> Vec<RateLimitState> {
        let mut states = Vec::new();
        while let Ok(state) = receiver.try_recv() {
            states.push(state);
        }
        states
    }

    #[test]
    fn test_default_backoff_schedule() {
        let delays: Vec<u128> = RetryPolicy::default()
            .delays()
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(delays, vec![2000, 3000, 4500]);
    }

    #[test]
    fn test_backoff_length_matches_retries() {
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1), 2.0).delays().count(), 0);
        assert_eq!(RetryPolicy::new(5, Duration::from_secs(1), 2.0).delays().len(), 5);

        // Shrinking multipliers are not allowed
        let flat: Vec<Duration> = RetryPolicy::new(2, Duration::from_secs(1), 0.5).delays().collect();
        assert_eq!(flat, vec![Duration::from_secs(1), Duration::from_secs(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rate_limited_then_succeeds() {
        let pipeline = RequestPipeline::default();
        let mut states = pipeline.subscribe();
        let calls = AtomicU32::new(0);

        let start = Instant::now();
        let result = pipeline
            .execute_with_retry(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n <= 2 {
                        Err(TestError::TooManyRequests(n))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2000 ms + 3000 ms of backoff, the limiter never adds to it
        assert_near(start.elapsed(), 5000);

        assert_eq!(
            drain(&mut states),
            vec![
                RateLimitState {
                    is_limited: true,
                    retry_in_seconds: 2
                },
                RateLimitState {
                    is_limited: true,
                    retry_in_seconds: 3
                },
                RateLimitState::cleared(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_prior_request_delays_first_attempt() {
        let pipeline = RequestPipeline::default();
        pipeline
            .execute_with_retry(|| async { Ok::<_, TestError>(()) })
            .await
            .unwrap();

        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result = pipeline
            .execute_with_retry(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n <= 2 {
                        Err(TestError::TooManyRequests(n))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_near(start.elapsed(), 6000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error() {
        let pipeline = RequestPipeline::default();
        let policy = RetryPolicy::new(1, Duration::from_millis(2000), 1.5);
        let mut states = pipeline.subscribe();
        let calls = AtomicU32::new(0);

        let start = Instant::now();
        let result: Result<(), TestError> = pipeline
            .execute_with(&policy, || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(TestError::TooManyRequests(n)) }
            })
            .await;

        assert_eq!(result, Err(TestError::TooManyRequests(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_near(start.elapsed(), 2000);

        let states = drain(&mut states);
        assert_eq!(states.last(), Some(&RateLimitState::cleared()));
        assert!(states[0].is_limited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let pipeline = RequestPipeline::default();
        let mut states = pipeline.subscribe();
        let calls = AtomicU32::new(0);

        let result: Result<(), TestError> = pipeline
            .execute_with_retry(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(TestError::Server(n)) }
            })
            .await;

        assert_eq!(result, Err(TestError::Server(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(drain(&mut states), vec![RateLimitState::cleared()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_are_spaced() {
        let pipeline = Arc::new(RequestPipeline::default());
        let dispatched = Mutex::new(Vec::new());
        let log = &dispatched;

        let record = move || async move {
            log.lock().unwrap().push(Instant::now());
            Ok::<_, TestError>(())
        };

        let (a, b) = tokio::join!(
            pipeline.execute_with_retry(record),
            pipeline.execute_with_retry(record)
        );
        a.unwrap();
        b.unwrap();

        let mut times = dispatched.into_inner().unwrap();
        times.sort();
        assert!(times[1].duration_since(times[0]) >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_no_subscribers_is_fine() {
        let pipeline = RequestPipeline::new(RateLimiter::new(Duration::ZERO, None), RetryPolicy::default());
        let value = pipeline
            .execute_with_retry(|| async { Ok::<_, TestError>(42) })
            .await;
        assert_eq!(value, Ok(42));
    }
}
