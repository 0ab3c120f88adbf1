//! Periodic task driver with failure tracking.
//!
//! Runs one iteration of a task on a fixed interval. Consecutive failures
//! back off exponentially and, past a threshold, abort the process: a
//! critical loop that cannot recover must not keep degrading silently.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    /// Pause between successful iterations.
    pub interval: Duration,
    /// Consecutive failures tolerated before the loop panics.
    pub max_consecutive_failures: u32,
    /// Cap for the failure backoff.
    pub max_backoff: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig {
            interval: Duration::from_secs(5),
            max_consecutive_failures: 10,
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Drive `task_fn` forever on `config.interval`.
///
/// # Panics
/// After `max_consecutive_failures` consecutive failures, to surface a
/// persistently broken critical loop instead of spinning on it.
pub async fn run_periodic<F, Fut>(task_name: &str, config: LoopConfig, mut task_fn: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let mut consecutive_failures: u32 = 0;
    let mut backoff = config.interval;

    loop {
        match task_fn().await {
            Ok(()) => {
                if consecutive_failures > 0 {
                    warn!(
                        "Task '{task_name}' recovered after {consecutive_failures} failure(s)"
                    );
                }
                consecutive_failures = 0;
                backoff = config.interval;
                sleep(config.interval).await;
            }
            Err(e) => {
                consecutive_failures += 1;
                error!(
                    "Task '{task_name}' failed ({consecutive_failures}/{}): {e}",
                    config.max_consecutive_failures
                );

                if consecutive_failures >= config.max_consecutive_failures {
                    panic!(
                        "FATAL: task '{task_name}' exceeded {} consecutive failures; \
                         last error: {e}",
                        config.max_consecutive_failures
                    );
                }

                backoff = std::cmp::min(backoff * 2, config.max_backoff);
                warn!("Task '{task_name}' retrying in {backoff:?}");
                sleep(backoff).await;
            }
        }
    }
}
