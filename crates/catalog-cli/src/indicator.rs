//! Terminal rate limit indicator.

use shared::RateLimitState;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

const TICK: Duration = Duration::from_secs(1);

pub fn message(seconds: u64) -> String {
    format!("Rate limited - Retrying in {} seconds", seconds)
}

/// Print a countdown to stderr while requests are rate limited
pub fn spawn(states: broadcast::Receiver<RateLimitState>) -> JoinHandle<()> {
    tokio::spawn(run(states, |line| eprintln!("{}", line)))
}

/// Emit one line per second of a rate limit wait, until it runs out or a
/// newer state arrives
pub async fn run<F>(mut states: broadcast::Receiver<RateLimitState>, mut emit: F)
where
    F: FnMut(String),
{
    let mut remaining: u64 = 0;
    let mut next_tick = Instant::now();

    loop {
        tokio::select! {
            received = states.recv() => match received {
                Ok(state) if state.is_limited => {
                    remaining = state.retry_in_seconds;
                    if remaining > 0 {
                        emit(message(remaining));
                    }
                    next_tick = Instant::now() + TICK;
                }
                Ok(_) => remaining = 0,
                // Only the latest state matters
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = sleep_until(next_tick), if remaining > 1 => {
                remaining -= 1;
                emit(message(remaining));
                next_tick += TICK;
            }
        }
    }
}
