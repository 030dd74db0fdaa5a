//! Bounded wait for the engine's completion signal.

use std::time::Duration;

use dcm2stl_core::traits::engine::ConversionEngine;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, trace, warn};

use crate::session::EngineSession;

/// How a completion wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// The engine reported `finished`.
    Done {
        /// Number of `finished` reads performed.
        polls: u32,
    },
    /// The bound elapsed without a `finished` signal.
    TimedOut {
        /// Number of `finished` reads performed.
        polls: u32,
    },
}

impl PollResult {
    /// Number of `finished` reads performed.
    pub fn polls(&self) -> u32 {
        match self {
            Self::Done { polls } | Self::TimedOut { polls } => *polls,
        }
    }

    /// Whether the engine signalled completion.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Polls a session's `finished` flag at a fixed interval up to a bound.
#[derive(Debug, Clone, Copy)]
pub struct CompletionPoller {
    interval: Duration,
    max_wait: Duration,
}

impl CompletionPoller {
    /// Create a poller. A zero interval is raised to one millisecond so the
    /// loop always yields to the timer.
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            max_wait,
        }
    }

    /// Poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll bound.
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Wait until the engine reports completion or the bound elapses.
    ///
    /// The flag is read once immediately, then once per interval, and the
    /// call always returns within `max_wait + interval`. A read still
    /// outstanding at that point is abandoned and the session is marked
    /// detached, since the engine may answer it later. A failed read counts
    /// as "not finished yet".
    pub async fn await_completion<E: ConversionEngine>(
        &self,
        session: &mut EngineSession<E>,
    ) -> PollResult {
        let started = Instant::now();
        let deadline = started + self.max_wait;
        let hard_deadline = deadline + self.interval;
        let mut polls = 0u32;

        loop {
            polls += 1;
            let read = timeout_at(hard_deadline, session.engine_mut().is_finished()).await;
            match read {
                Ok(Ok(true)) => {
                    debug!(
                        polls,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Engine finished"
                    );
                    return PollResult::Done { polls };
                }
                Ok(Ok(false)) => {}
                Ok(Err(e)) => trace!(error = %e, polls, "Finished probe failed"),
                Err(_) => {
                    warn!(
                        polls,
                        max_wait_ms = self.max_wait.as_millis() as u64,
                        "Finished read did not return before the poll bound; abandoning session"
                    );
                    session.mark_detached();
                    return PollResult::TimedOut { polls };
                }
            }

            if Instant::now() >= deadline {
                debug!(
                    polls,
                    max_wait_ms = self.max_wait.as_millis() as u64,
                    "Completion poll timed out"
                );
                return PollResult::TimedOut { polls };
            }
            sleep(self.interval).await;
        }
    }
}
