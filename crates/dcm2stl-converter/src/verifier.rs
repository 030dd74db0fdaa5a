//! Confirms that a converted file became visible on storage.
//!
//! Network shares can surface a file some time after the engine reports
//! completion, so a miss on the first check is followed by a short, bounded
//! series of re-checks.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, trace, warn};

/// Existence check against some storage.
#[async_trait]
pub trait OutputProbe: Send + Sync + fmt::Debug {
    /// Whether `path` is currently observable. Errors count as absent.
    async fn exists(&self, path: &Path) -> bool;
}

/// Probe backed by the local filesystem (including mounted shares).
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

#[async_trait]
impl OutputProbe for FsProbe {
    async fn exists(&self, path: &Path) -> bool {
        match tokio::fs::try_exists(path).await {
            Ok(found) => found,
            Err(e) => {
                trace!(path = %path.display(), error = %e, "Existence check failed");
                false
            }
        }
    }
}

/// Result of an output confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyResult {
    /// Whether the file was observed.
    pub confirmed: bool,
    /// Existence checks performed, including the immediate one.
    pub checks: u32,
}

/// Time any single check may take when the re-check window is shorter.
const MIN_CHECK_TIME: Duration = Duration::from_millis(50);

/// Immediate existence check followed by up to `retries` delayed re-checks.
#[derive(Debug, Clone, Copy)]
pub struct OutputVerifier {
    retries: u32,
    delay: Duration,
}

impl OutputVerifier {
    /// Create a verifier.
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Upper bound on existence checks per confirmation.
    pub fn max_checks(&self) -> u32 {
        self.retries + 1
    }

    /// Time covered by the re-checks: `retries` delays.
    pub fn window(&self) -> Duration {
        self.delay * self.retries
    }

    /// Check for `path`, re-checking every `delay` until the window closes.
    ///
    /// Checks run on a fixed schedule from the first one, and none may run
    /// past the window (a check started at its very end still gets
    /// `delay`, at least 50 ms). A check that does not answer in time counts
    /// as absent and ends the confirmation, so a hung share costs at most the
    /// window plus that allowance.
    pub async fn confirm(&self, probe: &dyn OutputProbe, path: &Path) -> VerifyResult {
        let started = Instant::now();
        let deadline = started + self.window();
        let allowance = self.delay.max(MIN_CHECK_TIME);
        let mut checks = 0u32;

        loop {
            checks += 1;
            let check_deadline = deadline.max(Instant::now() + allowance);
            match timeout_at(check_deadline, probe.exists(path)).await {
                Ok(true) => {
                    debug!(path = %path.display(), checks, "Output confirmed");
                    return VerifyResult {
                        confirmed: true,
                        checks,
                    };
                }
                Ok(false) => {}
                Err(_) => {
                    warn!(path = %path.display(), checks, "Existence check did not answer in time");
                    return VerifyResult {
                        confirmed: false,
                        checks,
                    };
                }
            }

            if checks > self.retries || Instant::now() >= deadline {
                debug!(path = %path.display(), checks, "Output not observed");
                return VerifyResult {
                    confirmed: false,
                    checks,
                };
            }
            sleep_until(started + self.delay * checks).await;
        }
    }
}

impl Default for OutputVerifier {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(200))
    }
}
