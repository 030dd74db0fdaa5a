//! Batch orchestration over one or more engine sessions.
//!
//! Each session processes its requests strictly one at a time. A request
//! moves through `Pending -> Executing -> (Retrying) -> Polling -> Verifying
//! -> Done`, and a detach reported by the engine earns exactly one more
//! execute after reattaching. Every failure past the initial attach is
//! recorded in that request's outcome and the batch moves on.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use dcm2stl_core::config::AppConfig;
use dcm2stl_core::config::batch::BatchConfig;
use dcm2stl_core::traits::engine::ConversionEngine;
use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, instrument, warn};
use uuid::Uuid;

use crate::catalog::StatusAction;
use crate::error::ConversionError;
use crate::events::{BatchEvent, EventSink};
use crate::executor::ConversionExecutor;
use crate::metrics::BatchMetrics;
use crate::models::{ConversionOutcome, ConversionRequest, ErrorKind, FormatPair};
use crate::poller::CompletionPoller;
use crate::report::{BatchReport, BatchSummary};
use crate::session::EngineSession;
use crate::verifier::{FsProbe, OutputProbe, OutputVerifier};

/// Execute calls allowed per request: the first plus one retry after a detach.
const MAX_EXECUTE_ATTEMPTS: u32 = 2;

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Pending,
    Executing { attempt: u32 },
    Retrying { next_attempt: u32 },
    Polling,
    Verifying,
    Done,
}

/// Facts collected while a request moves through its states.
#[derive(Debug, Default)]
struct Progress {
    status_code: Option<i32>,
    error_kind: Option<ErrorKind>,
    retried: bool,
    output_confirmed: bool,
    polls: u32,
    verify_checks: u32,
    note: Option<String>,
}

/// Drives batches of conversion requests through engine sessions.
#[derive(Debug, Clone)]
pub struct BatchDriver {
    config: BatchConfig,
    formats: FormatPair,
    executor: ConversionExecutor,
    poller: CompletionPoller,
    verifier: OutputVerifier,
    probe: Arc<dyn OutputProbe>,
    metrics: Arc<BatchMetrics>,
    events: EventSink,
}

impl BatchDriver {
    /// Create a driver that verifies outputs on the local filesystem.
    pub fn new(config: BatchConfig, formats: FormatPair) -> Self {
        Self {
            executor: ConversionExecutor::new(),
            poller: CompletionPoller::new(config.poll_interval(), config.poll_timeout()),
            verifier: OutputVerifier::new(config.verify_retries, config.verify_delay()),
            probe: Arc::new(FsProbe),
            metrics: Arc::new(BatchMetrics::new()),
            events: EventSink::disabled(),
            config,
            formats,
        }
    }

    /// Create a driver from the application configuration.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(
            config.batch.clone(),
            FormatPair::new(&config.engine.input_format, &config.engine.output_format),
        )
    }

    /// Use a different output existence probe.
    pub fn with_probe(mut self, probe: Arc<dyn OutputProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Publish progress events to `sender`.
    pub fn with_events(mut self, sender: mpsc::Sender<BatchEvent>) -> Self {
        self.events = EventSink::new(sender);
        self
    }

    /// Share a metrics collector with the caller.
    pub fn with_metrics(mut self, metrics: Arc<BatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The metrics collector.
    pub fn metrics(&self) -> &Arc<BatchMetrics> {
        &self.metrics
    }

    /// The batch configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Convert `requests` in order on a single session built from `engine`.
    ///
    /// Fails only if the engine cannot be attached at the start. The session
    /// is detached on every exit path, including a panic in the batch loop.
    /// Cancellation stops the batch after the current request is done.
    #[instrument(skip_all, fields(batch_id = tracing::field::Empty, total = requests.len()))]
    pub async fn run<E: ConversionEngine>(
        &self,
        engine: E,
        requests: Vec<ConversionRequest>,
        cancel: CancellationToken,
    ) -> Result<BatchReport, ConversionError> {
        let batch_id = Uuid::now_v7();
        tracing::Span::current().record("batch_id", tracing::field::display(batch_id));
        let started_at = Utc::now();

        let session = EngineSession::open(engine, self.formats.clone()).await?;
        let indexed = requests.into_iter().enumerate().collect();
        let report = self
            .drive(session, indexed, &cancel, batch_id, started_at)
            .await;

        info!(
            summary = %report.summary,
            cancelled = report.cancelled,
            skipped = report.skipped,
            "Batch finished"
        );
        Ok(report)
    }

    /// Convert `requests` over several independent sessions, one per engine.
    ///
    /// Requests are split into contiguous shards, one shard per session, and
    /// each shard runs in its own task. Outcomes come back in submission
    /// order. All sessions are attached before any request starts; if one
    /// cannot be attached, those already attached are released and the batch
    /// fails. If a session task panics, the remaining sessions still finish
    /// and detach before the panic is re-raised.
    #[instrument(
        skip_all,
        fields(batch_id = tracing::field::Empty, total = requests.len(), engines = engines.len())
    )]
    pub async fn run_parallel<E>(
        &self,
        engines: Vec<E>,
        requests: Vec<ConversionRequest>,
        cancel: CancellationToken,
    ) -> Result<BatchReport, ConversionError>
    where
        E: ConversionEngine + 'static,
    {
        let batch_id = Uuid::now_v7();
        tracing::Span::current().record("batch_id", tracing::field::display(batch_id));
        let started_at = Utc::now();

        if engines.is_empty() {
            return Err(ConversionError::EngineUnavailable {
                reason: "no engine sessions configured".to_string(),
            });
        }
        let shard_count = engines.len().min(requests.len()).max(1);
        if shard_count < engines.len() {
            debug!(
                unused = engines.len() - shard_count,
                "More engines than requests; extra engines stay unattached"
            );
        }

        let mut sessions = Vec::with_capacity(shard_count);
        for engine in engines.into_iter().take(shard_count) {
            match EngineSession::open(engine, self.formats.clone()).await {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    for session in &mut sessions {
                        session.detach().await;
                    }
                    return Err(e);
                }
            }
        }

        let shards = partition(requests, shard_count);
        let mut tasks = Vec::with_capacity(shard_count);
        for (index, (session, shard)) in sessions.into_iter().zip(shards).enumerate() {
            let driver = self.clone();
            let cancel = cancel.clone();
            let span = info_span!("engine_session", index, requests = shard.len());
            tasks.push(tokio::spawn(
                async move {
                    driver
                        .drive(session, shard, &cancel, batch_id, started_at)
                        .await
                }
                .instrument(span),
            ));
        }

        let mut parts = Vec::with_capacity(tasks.len());
        let mut failure = None;
        for joined in join_all(tasks).await {
            match joined {
                Ok(part) => parts.push(part),
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            let finished: usize = parts.iter().map(|p| p.outcomes.len()).sum();
            warn!(
                finished,
                surviving_shards = parts.len(),
                "Engine session task failed; other sessions ran to completion"
            );
            if e.is_panic() {
                std::panic::resume_unwind(e.into_panic());
            }
            return Err(e.into());
        }

        let report = BatchReport::merge(batch_id, started_at, parts);
        info!(
            summary = %report.summary,
            sessions = report.sessions,
            cancelled = report.cancelled,
            skipped = report.skipped,
            "Parallel batch finished"
        );
        Ok(report)
    }

    /// Run the batch loop on an open session and release it afterwards.
    async fn drive<E: ConversionEngine>(
        &self,
        mut session: EngineSession<E>,
        requests: Vec<(usize, ConversionRequest)>,
        cancel: &CancellationToken,
        batch_id: Uuid,
        started_at: chrono::DateTime<Utc>,
    ) -> BatchReport {
        self.events
            .publish(BatchEvent::BatchStarted {
                batch_id,
                total: requests.len(),
            })
            .await;

        let result = AssertUnwindSafe(self.process_all(&mut session, requests, cancel))
            .catch_unwind()
            .await;
        session.detach().await;

        let (outcomes, skipped) = match result {
            Ok(done) => done,
            Err(panic) => std::panic::resume_unwind(panic),
        };

        let report = BatchReport::new(batch_id, started_at, 1, outcomes, skipped > 0, skipped);
        self.events
            .publish(BatchEvent::BatchFinished {
                batch_id,
                summary: report.summary.clone(),
                cancelled: report.cancelled,
            })
            .await;
        report
    }

    /// Process requests in order; returns the outcomes and the number of
    /// requests skipped because of cancellation.
    async fn process_all<E: ConversionEngine>(
        &self,
        session: &mut EngineSession<E>,
        requests: Vec<(usize, ConversionRequest)>,
        cancel: &CancellationToken,
    ) -> (Vec<ConversionOutcome>, usize) {
        let total = requests.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut tally = BatchSummary::default();

        let mut pending = requests.into_iter();
        while let Some((sequence, request)) = pending.next() {
            if cancel.is_cancelled() {
                let skipped = pending.len() + 1;
                info!(skipped, "Batch cancelled; no further requests will be issued");
                return (outcomes, skipped);
            }

            let outcome = self.process_one(session, sequence, request).await;
            tally.add(&outcome);
            self.metrics.record_outcome(&outcome);

            info!(
                sequence,
                request = %outcome.request,
                outcome = %outcome.label(),
                status_code = ?outcome.status_code,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                converted = tally.converted,
                not_observed = tally.not_observed,
                failed = tally.failed,
                done = tally.total,
                total,
                "Request finished"
            );
            self.events
                .publish(BatchEvent::RequestFinished {
                    outcome: outcome.clone(),
                })
                .await;
            outcomes.push(outcome);
        }

        (outcomes, 0)
    }

    /// Take one request to its terminal outcome.
    async fn process_one<E: ConversionEngine>(
        &self,
        session: &mut EngineSession<E>,
        sequence: usize,
        request: ConversionRequest,
    ) -> ConversionOutcome {
        let started = Instant::now();
        self.metrics.record_started();
        self.events
            .publish(BatchEvent::RequestStarted {
                sequence,
                request: request.clone(),
            })
            .await;

        let mut progress = Progress::default();
        let mut state = RequestState::Pending;

        while state != RequestState::Done {
            state = match state {
                RequestState::Pending => match self.preflight(session, sequence).await {
                    Ok(()) => RequestState::Executing { attempt: 1 },
                    Err(e) => {
                        progress.error_kind = Some(ErrorKind::SessionDetached);
                        progress.note = Some(format!("session unavailable before execute: {e}"));
                        RequestState::Done
                    }
                },

                RequestState::Executing { attempt } => {
                    if attempt > 1 {
                        progress.retried = true;
                    }
                    match self.executor.execute(session, &request).await {
                        Ok(execution) => {
                            progress.status_code = execution.code;
                            progress.note = execution.transport_error;
                            match execution.status.action() {
                                StatusAction::Proceed => RequestState::Polling,
                                StatusAction::Reattach if attempt < MAX_EXECUTE_ATTEMPTS => {
                                    RequestState::Retrying {
                                        next_attempt: attempt + 1,
                                    }
                                }
                                StatusAction::Reattach | StatusAction::Fail => {
                                    progress.error_kind = ErrorKind::from_status(execution.status);
                                    RequestState::Done
                                }
                            }
                        }
                        Err(e) => {
                            progress.error_kind = Some(ErrorKind::SessionDetached);
                            progress.note = Some(e.to_string());
                            RequestState::Done
                        }
                    }
                }

                RequestState::Retrying { next_attempt } => {
                    warn!(
                        sequence,
                        request = %request,
                        attempt = next_attempt,
                        "Engine session detached; reattaching"
                    );
                    match self.reattach(session, sequence).await {
                        Ok(()) => RequestState::Executing {
                            attempt: next_attempt,
                        },
                        Err(e) => {
                            progress.error_kind = Some(ErrorKind::SessionDetached);
                            progress.note = Some(format!("reattach failed: {e}"));
                            RequestState::Done
                        }
                    }
                }

                RequestState::Polling => {
                    let result = self.poller.await_completion(session).await;
                    progress.polls = result.polls();
                    if result.is_done() {
                        RequestState::Verifying
                    } else {
                        progress.error_kind = Some(ErrorKind::PollTimeout);
                        RequestState::Done
                    }
                }

                RequestState::Verifying => {
                    let result = self
                        .verifier
                        .confirm(self.probe.as_ref(), request.output())
                        .await;
                    progress.verify_checks = result.checks;
                    progress.output_confirmed = result.confirmed;
                    if !result.confirmed {
                        progress.error_kind = Some(ErrorKind::OutputNotObserved);
                    }
                    RequestState::Done
                }

                RequestState::Done => RequestState::Done,
            };
        }

        ConversionOutcome {
            sequence,
            request,
            status_code: progress.status_code,
            error_kind: progress.error_kind,
            retried: progress.retried,
            output_confirmed: progress.output_confirmed,
            polls: progress.polls,
            verify_checks: progress.verify_checks,
            elapsed: started.elapsed(),
            note: progress.note,
        }
    }

    /// Make sure the session can take a request, attaching if needed.
    async fn preflight<E: ConversionEngine>(
        &self,
        session: &mut EngineSession<E>,
        sequence: usize,
    ) -> Result<(), ConversionError> {
        let needs_attach = if self.config.health_probe {
            !session.is_healthy().await
        } else {
            !session.is_attached()
        };
        if needs_attach {
            info!(sequence, state = %session.state(), "Attaching engine session before request");
            self.reattach(session, sequence).await?;
        }
        Ok(())
    }

    async fn reattach<E: ConversionEngine>(
        &self,
        session: &mut EngineSession<E>,
        sequence: usize,
    ) -> Result<(), ConversionError> {
        let result = session.attach().await;
        self.metrics.record_reattach(result.is_ok());
        self.events
            .publish(BatchEvent::Reattached {
                sequence,
                succeeded: result.is_ok(),
            })
            .await;
        result
    }
}

/// Split requests into `shards` contiguous runs whose sizes differ by at most
/// one, keeping each request's submission index.
fn partition(
    requests: Vec<ConversionRequest>,
    shards: usize,
) -> Vec<Vec<(usize, ConversionRequest)>> {
    let shards = shards.max(1);
    let base = requests.len() / shards;
    let extra = requests.len() % shards;
    let mut indexed = requests.into_iter().enumerate();
    (0..shards)
        .map(|i| {
            let size = base + usize::from(i < extra);
            indexed.by_ref().take(size).collect()
        })
        .collect()
}
