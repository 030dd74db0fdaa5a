//! Batch metrics.
//!
//! Counters are atomics so parallel sessions can share one collector; request
//! durations are sampled behind a mutex for percentile reporting.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::models::{ConversionOutcome, ErrorKind};

/// Batch metrics collector.
#[derive(Debug)]
pub struct BatchMetrics {
    /// Requests handed to the engine (or attempted to be).
    pub requests_started: AtomicU64,
    /// Requests converted with output confirmed.
    pub converted: AtomicU64,
    /// Requests the engine accepted but whose output never appeared.
    pub not_observed: AtomicU64,
    /// Requests that failed, including poll timeouts.
    pub failed: AtomicU64,
    /// Requests whose completion signal never arrived.
    pub poll_timeouts: AtomicU64,
    /// Requests that needed a second execute after a detach.
    pub retried: AtomicU64,
    /// Successful attaches after the initial one.
    pub reattaches: AtomicU64,
    /// Attaches that failed mid-batch.
    pub reattach_failures: AtomicU64,
    duration_samples: Mutex<Vec<Duration>>,
}

/// Maximum number of duration samples to keep in memory.
const MAX_DURATION_SAMPLES: usize = 1000;

impl BatchMetrics {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self {
            requests_started: AtomicU64::new(0),
            converted: AtomicU64::new(0),
            not_observed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            poll_timeouts: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            reattaches: AtomicU64::new(0),
            reattach_failures: AtomicU64::new(0),
            duration_samples: Mutex::new(Vec::with_capacity(MAX_DURATION_SAMPLES)),
        }
    }

    /// Record that a request started.
    pub fn record_started(&self) {
        self.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a mid-batch attach attempt.
    pub fn record_reattach(&self, succeeded: bool) {
        if succeeded {
            self.reattaches.fetch_add(1, Ordering::Relaxed);
        } else {
            self.reattach_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a finished request.
    pub fn record_outcome(&self, outcome: &ConversionOutcome) {
        if outcome.retried {
            self.retried.fetch_add(1, Ordering::Relaxed);
        }
        match outcome.error_kind {
            None => {
                self.converted.fetch_add(1, Ordering::Relaxed);
            }
            Some(ErrorKind::OutputNotObserved) => {
                self.not_observed.fetch_add(1, Ordering::Relaxed);
            }
            Some(ErrorKind::PollTimeout) => {
                self.poll_timeouts.fetch_add(1, Ordering::Relaxed);
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            Some(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.add_duration_sample(outcome.elapsed);
    }

    /// Add a duration sample, evicting the oldest if at capacity.
    fn add_duration_sample(&self, duration: Duration) {
        if let Ok(mut samples) = self.duration_samples.lock() {
            if samples.len() >= MAX_DURATION_SAMPLES {
                samples.remove(0);
            }
            samples.push(duration);
        }
    }

    /// Point-in-time view of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let durations = self
            .duration_samples
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();

        let (p50, p95, p99) = Self::calculate_percentiles(&durations);

        MetricsSnapshot {
            requests_started: self.requests_started.load(Ordering::Relaxed),
            converted: self.converted.load(Ordering::Relaxed),
            not_observed: self.not_observed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            poll_timeouts: self.poll_timeouts.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            reattaches: self.reattaches.load(Ordering::Relaxed),
            reattach_failures: self.reattach_failures.load(Ordering::Relaxed),
            duration_p50: p50,
            duration_p95: p95,
            duration_p99: p99,
            sample_count: durations.len() as u64,
        }
    }

    fn calculate_percentiles(
        durations: &[Duration],
    ) -> (Option<Duration>, Option<Duration>, Option<Duration>) {
        if durations.is_empty() {
            return (None, None, None);
        }

        let mut sorted = durations.to_vec();
        sorted.sort();
        let len = sorted.len();

        let p50 = sorted.get(len * 50 / 100).copied();
        let p95 = sorted.get(len * 95 / 100).copied();
        let p99 = sorted.get(len.saturating_sub(1) * 99 / 100).copied();

        (p50, p95, p99)
    }
}

impl Default for BatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of batch metrics.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    /// Requests started.
    pub requests_started: u64,
    /// Requests converted and confirmed.
    pub converted: u64,
    /// Requests whose output was not observed.
    pub not_observed: u64,
    /// Requests that failed.
    pub failed: u64,
    /// Requests that timed out waiting for completion.
    pub poll_timeouts: u64,
    /// Requests retried after a detach.
    pub retried: u64,
    /// Successful mid-batch attaches.
    pub reattaches: u64,
    /// Failed mid-batch attaches.
    pub reattach_failures: u64,
    /// P50 request duration.
    #[serde(
        serialize_with = "serialize_opt_duration",
        deserialize_with = "deserialize_opt_duration"
    )]
    pub duration_p50: Option<Duration>,
    /// P95 request duration.
    #[serde(
        serialize_with = "serialize_opt_duration",
        deserialize_with = "deserialize_opt_duration"
    )]
    pub duration_p95: Option<Duration>,
    /// P99 request duration.
    #[serde(
        serialize_with = "serialize_opt_duration",
        deserialize_with = "deserialize_opt_duration"
    )]
    pub duration_p99: Option<Duration>,
    /// Number of duration samples collected.
    pub sample_count: u64,
}

fn serialize_opt_duration<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match duration {
        Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let millis: Option<u64> = serde::Deserialize::deserialize(deserializer)?;
    Ok(millis.map(Duration::from_millis))
}
