//! Batch orchestration configuration: polling, verification, and sessions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Timing and session settings for a conversion batch.
///
/// Defaults mirror observed engine latency: completion is polled every
/// 25 ms for up to 30 s, and a missing output artifact is re-checked five
/// times 200 ms apart.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchConfig {
    /// Interval between completion polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 1, max = 10_000))]
    pub poll_interval_ms: u64,

    /// Maximum time to wait for the completion signal, in milliseconds.
    #[serde(default = "default_poll_timeout_ms")]
    #[validate(range(min = 1, max = 3_600_000))]
    pub poll_timeout_ms: u64,

    /// Additional existence checks after the first one fails.
    #[serde(default = "default_verify_retries")]
    #[validate(range(max = 50))]
    pub verify_retries: u32,

    /// Delay between existence checks, in milliseconds.
    #[serde(default = "default_verify_delay_ms")]
    #[validate(range(max = 60_000))]
    pub verify_delay_ms: u64,

    /// Probe session health before every request.
    #[serde(default)]
    pub health_probe: bool,

    /// Number of independent engine sessions to run in parallel.
    #[serde(default = "default_sessions")]
    #[validate(range(min = 1, max = 8))]
    pub sessions: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
            verify_retries: default_verify_retries(),
            verify_delay_ms: default_verify_delay_ms(),
            health_probe: false,
            sessions: default_sessions(),
        }
    }
}

impl BatchConfig {
    /// Completion poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Completion poll bound.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Delay between output existence checks.
    pub fn verify_delay(&self) -> Duration {
        Duration::from_millis(self.verify_delay_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    25
}

fn default_poll_timeout_ms() -> u64 {
    30_000
}

fn default_verify_retries() -> u32 {
    5
}

fn default_verify_delay_ms() -> u64 {
    200
}

fn default_sessions() -> usize {
    1
}
