//! Terminal-action sink - the transport's one-shot disposition API

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{Result, eyre};
use tracing::{debug, info};

use super::types::{ContinueOverrides, Disposition, ErrorCode, EventId, Resolution, ResponsePayload};

/// The three terminal operations exposed by the transport
///
/// Implementations are assumed non-idempotent: the finalizer calls exactly
/// one of these, exactly once, per event.
#[async_trait]
pub trait TerminalSink: Send + Sync {
    /// Let the request proceed, optionally modified
    async fn continue_request(&self, id: &str, overrides: Option<&ContinueOverrides>) -> Result<()>;

    /// Answer the request with a synthesized response
    async fn respond(&self, id: &str, payload: &ResponsePayload) -> Result<()>;

    /// Fail the request with a network error code
    async fn abort(&self, id: &str, reason: ErrorCode) -> Result<()>;
}

/// Issue a resolution against a sink
pub async fn execute(sink: &dyn TerminalSink, id: &str, resolution: &Resolution) -> Result<()> {
    debug!(%id, disposition = %resolution.disposition(), "sink::execute: called");
    match resolution {
        Resolution::Continue(overrides) => sink.continue_request(id, overrides.as_ref()).await,
        Resolution::Respond(payload) => sink.respond(id, payload).await,
        Resolution::Abort(reason) => sink.abort(id, *reason).await,
    }
}

/// One recorded sink invocation
#[derive(Debug, Clone, PartialEq)]
pub struct SinkCall {
    pub event_id: EventId,
    pub resolution: Resolution,
    pub at: DateTime<Utc>,
}

/// In-memory sink that records every call
///
/// Used by the scenario runner and tests. Can be told to fail a given
/// disposition to exercise sink-fault handling.
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    fail_on: Option<Disposition>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records and then fails every call of one disposition
    pub fn failing_on(disposition: Disposition) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Some(disposition),
        }
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn calls_for(&self, id: &str) -> Vec<SinkCall> {
        self.calls().into_iter().filter(|call| call.event_id == id).collect()
    }

    fn record(&self, id: &str, resolution: Resolution) -> Result<()> {
        let disposition = resolution.disposition();
        info!(%id, %disposition, "Terminal action issued");
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SinkCall {
                event_id: id.to_string(),
                resolution,
                at: Utc::now(),
            });

        if self.fail_on == Some(disposition) {
            return Err(eyre!("Transport rejected {} for {}", disposition, id));
        }
        Ok(())
    }
}

#[async_trait]
impl TerminalSink for RecordingSink {
    async fn continue_request(&self, id: &str, overrides: Option<&ContinueOverrides>) -> Result<()> {
        self.record(id, Resolution::Continue(overrides.cloned()))
    }

    async fn respond(&self, id: &str, payload: &ResponsePayload) -> Result<()> {
        self.record(id, Resolution::Respond(payload.clone()))
    }

    async fn abort(&self, id: &str, reason: ErrorCode) -> Result<()> {
        self.record(id, Resolution::Abort(reason))
    }
}
