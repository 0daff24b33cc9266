//! Finalizer - drains deferred work, resolves precedence, issues the
//! terminal action once and publishes the outcome

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use super::config::CoordinatorConfig;
use super::metrics::MetricsCounters;
use super::queue::DeferredWork;
use super::record::InterceptionRecord;
use super::sink::{self, TerminalSink};
use super::types::{Disposition, EventId, Topic};

/// What happened during one effective finalize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeReport {
    #[serde(rename = "event-id")]
    pub event_id: EventId,
    pub disposition: Disposition,
    /// One entry per deferred item that failed, panicked or timed out
    #[serde(rename = "handler-faults")]
    pub handler_faults: Vec<String>,
    #[serde(rename = "sink-fault")]
    pub sink_fault: Option<String>,
    #[serde(rename = "listener-panics")]
    pub listener_panics: usize,
    #[serde(rename = "timed-out")]
    pub timed_out: bool,
    #[serde(rename = "elapsed-ms")]
    pub elapsed_ms: u64,
    #[serde(rename = "finalized-at")]
    pub finalized_at: DateTime<Utc>,
}

impl FinalizeReport {
    /// True when no handler, sink or listener misbehaved
    pub fn is_clean(&self) -> bool {
        self.handler_faults.is_empty() && self.sink_fault.is_none() && self.listener_panics == 0
    }
}

enum WorkOutcome {
    Done,
    Failed(String),
    TimedOut,
}

pub struct Finalizer {
    sink: Arc<dyn TerminalSink>,
    deferred_timeout: Option<Duration>,
    metrics: Arc<MetricsCounters>,
}

impl Finalizer {
    pub(crate) fn new(sink: Arc<dyn TerminalSink>, config: &CoordinatorConfig, metrics: Arc<MetricsCounters>) -> Self {
        debug!(deferred_timeout_ms = ?config.deferred_timeout_ms, "Finalizer::new: called");
        Self {
            sink,
            deferred_timeout: config.deferred_timeout(),
            metrics,
        }
    }

    /// Finalize a record; None if finalization had already started
    ///
    /// Handler and sink faults are contained and reported, never returned as
    /// errors. Safe to call concurrently: only the first caller proceeds.
    /// Once started, the sequence runs on its own task and completes even if
    /// the returned future is dropped.
    pub async fn finalize(&self, record: Arc<InterceptionRecord>) -> Option<FinalizeReport> {
        debug!(id = %record.id(), "Finalizer::finalize: called");

        let work = record.begin_finalizing()?;
        let task = tokio::spawn(run(
            self.sink.clone(),
            self.deferred_timeout,
            self.metrics.clone(),
            record.clone(),
            work,
        ));

        match task.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(id = %record.id(), error = %e, "Finalization task failed");
                record.mark_finalized();
                None
            }
        }
    }
}

async fn run(
    terminal: Arc<dyn TerminalSink>,
    deferred_timeout: Option<Duration>,
    metrics: Arc<MetricsCounters>,
    record: Arc<InterceptionRecord>,
    work: Vec<DeferredWork>,
) -> FinalizeReport {
    let id = record.id();
    let started = Instant::now();

    let outcomes = drain(id, deferred_timeout, work).await;
    let timed_out = outcomes.iter().any(|o| matches!(o, WorkOutcome::TimedOut));
    let handler_faults: Vec<String> = outcomes
        .into_iter()
        .filter_map(|outcome| match outcome {
            WorkOutcome::Done => None,
            WorkOutcome::Failed(msg) => Some(msg),
            WorkOutcome::TimedOut => Some("deferred work did not settle before the deadline".to_string()),
        })
        .collect();
    for fault in &handler_faults {
        warn!(%id, %fault, "Deferred handler fault");
    }

    let resolution = record.resolve();
    let disposition = resolution.disposition();
    debug!(%id, %disposition, "finalize: resolved");

    let sink_fault = match sink::execute(terminal.as_ref(), id, &resolution).await {
        Ok(()) => None,
        Err(e) => {
            warn!(%id, %disposition, error = %e, "Terminal action failed, not retrying");
            Some(format!("{:#}", e))
        }
    };

    let mut listener_panics = record.publish(disposition.topic(), disposition);
    listener_panics += record.publish(Topic::Finalized, disposition);
    record.mark_finalized();
    metrics.record_finalized(disposition, handler_faults.len(), sink_fault.is_some(), timed_out);

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let age_ms = (Utc::now() - record.created_at()).num_milliseconds();
    info!(%id, %disposition, elapsed_ms, age_ms, faults = handler_faults.len(), "Interception finalized");

    FinalizeReport {
        event_id: id.to_string(),
        disposition,
        handler_faults,
        sink_fault,
        listener_panics,
        timed_out,
        elapsed_ms,
        finalized_at: Utc::now(),
    }
}

/// Run every deferred item concurrently and wait for all to settle
async fn drain(id: &str, deferred_timeout: Option<Duration>, work: Vec<DeferredWork>) -> Vec<WorkOutcome> {
    if work.is_empty() {
        debug!(%id, "drain: nothing deferred");
        return Vec::new();
    }
    debug!(%id, count = work.len(), "drain: running deferred work");

    let deadline = deferred_timeout.map(|limit| tokio::time::Instant::now() + limit);
    let handles = work
        .into_iter()
        .map(|item| {
            tokio::spawn(async move {
                match deadline {
                    Some(deadline) => tokio::time::timeout_at(deadline, item()).await.ok(),
                    None => Some(item().await),
                }
            })
        })
        .collect::<Vec<_>>();

    join_all(handles)
        .await
        .into_iter()
        .map(|joined: Result<Option<eyre::Result<()>>, JoinError>| match joined {
            Ok(Some(Ok(()))) => WorkOutcome::Done,
            Ok(Some(Err(e))) => WorkOutcome::Failed(format!("{:#}", e)),
            Ok(None) => WorkOutcome::TimedOut,
            Err(e) if e.is_panic() => WorkOutcome::Failed("deferred work panicked".to_string()),
            Err(e) => WorkOutcome::Failed(format!("deferred work did not complete: {}", e)),
        })
        .collect()
}
