//! Progress events published while a batch runs.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{ConversionOutcome, ConversionRequest};
use crate::report::BatchSummary;

/// Progress of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BatchEvent {
    /// A session was opened and the batch loop is starting.
    BatchStarted {
        /// Batch identifier.
        batch_id: Uuid,
        /// Requests assigned to this session.
        total: usize,
    },
    /// A request is about to be executed.
    RequestStarted {
        /// Position in the submitted batch.
        sequence: usize,
        /// The request.
        request: ConversionRequest,
    },
    /// The session was attached again mid-batch.
    Reattached {
        /// Request that triggered the attach.
        sequence: usize,
        /// Whether the attach succeeded.
        succeeded: bool,
    },
    /// A request reached its terminal outcome.
    RequestFinished {
        /// The outcome.
        outcome: ConversionOutcome,
    },
    /// The batch loop ended and the session was released.
    BatchFinished {
        /// Batch identifier.
        batch_id: Uuid,
        /// Totals for this session's share of the batch.
        summary: BatchSummary,
        /// Whether the batch stopped early on cancellation.
        cancelled: bool,
    },
}

/// Optional publisher for [`BatchEvent`]s.
///
/// Publishing never fails: a missing or closed receiver just drops events.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::Sender<BatchEvent>>,
}

impl EventSink {
    /// A sink that discards every event.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// A sink publishing to `sender`.
    pub fn new(sender: mpsc::Sender<BatchEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Publish an event, waiting for channel capacity.
    pub async fn publish(&self, event: BatchEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).await.is_err() {
                tracing::trace!("Batch event receiver dropped");
            }
        }
    }
}
