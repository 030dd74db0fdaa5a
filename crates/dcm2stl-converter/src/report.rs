//! Batch results: the ordered outcome ledger and its summary.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ConversionOutcome, ErrorKind};

/// Totals over a set of outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Outcomes counted.
    pub total: usize,
    /// Converted with output confirmed.
    pub converted: usize,
    /// Engine reported success but no output was observed.
    pub not_observed: usize,
    /// Failed for any other reason.
    pub failed: usize,
    /// Outcomes that needed a retry after a detach.
    pub retried: usize,
    /// Failure counts keyed by error kind.
    pub failed_by_kind: BTreeMap<String, usize>,
}

impl BatchSummary {
    /// Count a sequence of outcomes.
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a ConversionOutcome>) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.add(outcome);
        }
        summary
    }

    /// Add one outcome to the totals.
    pub fn add(&mut self, outcome: &ConversionOutcome) {
        self.total += 1;
        if outcome.retried {
            self.retried += 1;
        }
        match outcome.error_kind {
            None => self.converted += 1,
            Some(ErrorKind::OutputNotObserved) => self.not_observed += 1,
            Some(kind) => {
                self.failed += 1;
                *self.failed_by_kind.entry(kind.to_string()).or_insert(0) += 1;
            }
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} converted, {} not observed, {} failed ({} total)",
            self.converted, self.not_observed, self.failed, self.total
        )
    }
}

/// Result of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Batch identifier.
    pub batch_id: Uuid,
    /// When the first session was opened.
    pub started_at: DateTime<Utc>,
    /// When the last session was released.
    pub finished_at: DateTime<Utc>,
    /// Engine sessions used.
    pub sessions: usize,
    /// One outcome per processed request, in submission order.
    pub outcomes: Vec<ConversionOutcome>,
    /// Whether the batch stopped early on cancellation.
    pub cancelled: bool,
    /// Requests never started because of cancellation.
    pub skipped: usize,
    /// Totals over `outcomes`.
    pub summary: BatchSummary,
}

impl BatchReport {
    /// Build a report, computing the summary from `outcomes`.
    pub fn new(
        batch_id: Uuid,
        started_at: DateTime<Utc>,
        sessions: usize,
        outcomes: Vec<ConversionOutcome>,
        cancelled: bool,
        skipped: usize,
    ) -> Self {
        let summary = BatchSummary::from_outcomes(&outcomes);
        Self {
            batch_id,
            started_at,
            finished_at: Utc::now(),
            sessions,
            outcomes,
            cancelled,
            skipped,
            summary,
        }
    }

    /// Combine per-session reports into one, ordering outcomes by sequence.
    pub fn merge(batch_id: Uuid, started_at: DateTime<Utc>, parts: Vec<BatchReport>) -> Self {
        let sessions = parts.iter().map(|p| p.sessions).sum();
        let cancelled = parts.iter().any(|p| p.cancelled);
        let skipped = parts.iter().map(|p| p.skipped).sum();
        let mut outcomes: Vec<ConversionOutcome> =
            parts.into_iter().flat_map(|p| p.outcomes).collect();
        outcomes.sort_by_key(|o| o.sequence);
        Self::new(batch_id, started_at, sessions, outcomes, cancelled, skipped)
    }

    /// Whether every processed request converted with confirmed output.
    pub fn all_converted(&self) -> bool {
        self.summary.converted == self.summary.total
    }

    /// Wall-clock duration of the batch.
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
