//! Request spacing shared by every caller of one pipeline.
//!
//! Enforces a minimum interval between dispatches and, optionally, a ceiling
//! on dispatches in any trailing minute. Callers reserve a dispatch slot under
//! a short lock and then sleep until it, so concurrently started requests are
//! spaced out instead of racing on the last-dispatch timestamp.

use shared::config::RateLimitConfig;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

const MINUTE: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct DispatchLog {
    /// Most recently reserved slot
    last: Option<Instant>,
    /// Slots reserved in the trailing minute (only kept with a per-minute cap)
    recent: VecDeque<Instant>,
}

/// Rate limiter with a minimum spacing and an optional per-minute cap
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum time between two dispatches
    min_interval: Duration,
    /// Maximum dispatches in any trailing 60 seconds
    max_per_minute: Option<u32>,
    log: Mutex<DispatchLog>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(min_interval: Duration, max_per_minute: Option<u32>) -> Self {
        Self {
            min_interval,
            max_per_minute: max_per_minute.filter(|max| *max > 0),
            log: Mutex::new(DispatchLog::default()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_interval_ms),
            config.requests_per_minute,
        )
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a request may be dispatched, and record the dispatch
    pub async fn acquire(&self) {
        let slot = self.reserve();
        let now = Instant::now();

        if slot > now {
            tracing::debug!(
                wait_ms = (slot - now).as_millis() as u64,
                "Rate limit: waiting for dispatch slot"
            );
            sleep_until(slot).await;
        }
    }

    /// Claim the earliest dispatch slot allowed by both limits
    fn reserve(&self) -> Instant {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        let mut slot = match log.last {
            Some(last) => now.max(last + self.min_interval),
            None => now,
        };

        if let Some(max) = self.max_per_minute {
            let max = max as usize;

            // Dispatches a full minute before this slot no longer count against it
            while log
                .recent
                .front()
                .is_some_and(|oldest| slot.duration_since(*oldest) >= MINUTE)
            {
                log.recent.pop_front();
            }

            if log.recent.len() >= max {
                let blocking = log.recent[log.recent.len() - max];
                slot = slot.max(blocking + MINUTE);
            }

            log.recent.push_back(slot);
        }

        log.last = Some(slot);
        slot
    }

    /// Number of dispatches in the last minute (only tracked with a per-minute cap)
    pub fn current_minute_count(&self) -> usize {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        log.recent
            .iter()
            .filter(|slot| **slot <= now && now.duration_since(**slot) < MINUTE)
            .count()
    }
}
