//! Outcome ledger - what observers have asked for
//!
//! Each category keeps its own last write. Precedence between categories is
//! applied only by [`OutcomeLedger::resolve`], never at request time.

use tracing::debug;

use super::types::{ContinueOverrides, Disposition, ErrorCode, Resolution, ResponsePayload};

#[derive(Debug, Default)]
pub struct OutcomeLedger {
    /// Most recently requested category (informational only)
    desired: Disposition,
    continue_overrides: Option<ContinueOverrides>,
    respond_payload: Option<ResponsePayload>,
    abort_reason: Option<ErrorCode>,
    sealed: bool,
}

impl OutcomeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_continue(&mut self, overrides: Option<ContinueOverrides>) {
        debug!(has_overrides = overrides.is_some(), "OutcomeLedger::request_continue: called");
        self.desired = Disposition::Continue;
        self.continue_overrides = overrides;
    }

    pub fn request_respond(&mut self, payload: ResponsePayload) {
        debug!(status = payload.status_code(), "OutcomeLedger::request_respond: called");
        self.desired = Disposition::Respond;
        self.respond_payload = Some(payload);
    }

    pub fn request_abort(&mut self, reason: ErrorCode) {
        debug!(%reason, "OutcomeLedger::request_abort: called");
        self.desired = Disposition::Abort;
        self.abort_reason = Some(reason);
    }

    /// Category of the most recent request, `Continue` if none
    pub fn desired(&self) -> Disposition {
        self.desired
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Seal the ledger and pick the terminal action by precedence
    ///
    /// Abort beats Respond beats Continue, regardless of request order.
    pub fn resolve(&mut self) -> Resolution {
        self.sealed = true;

        if let Some(reason) = self.abort_reason {
            debug!(%reason, "OutcomeLedger::resolve: abort wins");
            return Resolution::Abort(reason);
        }
        if let Some(payload) = self.respond_payload.clone() {
            debug!("OutcomeLedger::resolve: respond wins");
            return Resolution::Respond(payload);
        }
        debug!("OutcomeLedger::resolve: continue");
        Resolution::Continue(self.continue_overrides.clone())
    }
}
