//! RequestHandle - observer-facing interface for one event

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use super::error::CoordinatorError;
use super::hub::{Notification, SubscriptionHandle};
use super::metrics::MetricsCounters;
use super::queue::deferred;
use super::record::InterceptionRecord;
use super::types::{ContinueOverrides, Disposition, ErrorCode, FinalizationState, ResponsePayload, Topic};

/// Handle for observers to influence one intercepted request
///
/// This handle is cloneable and can be moved into deferred work. Requests
/// made through it are wishes: the executed action is decided by precedence
/// at finalization, so use the `on_*` subscriptions to learn the outcome.
#[derive(Clone, Debug)]
pub struct RequestHandle {
    record: Arc<InterceptionRecord>,
    metrics: Arc<MetricsCounters>,
}

impl RequestHandle {
    pub(crate) fn new(record: Arc<InterceptionRecord>, metrics: Arc<MetricsCounters>) -> Self {
        debug!(id = %record.id(), "RequestHandle::new: called");
        Self { record, metrics }
    }

    /// Get the event id this handle is bound to
    pub fn id(&self) -> &str {
        self.record.id()
    }

    pub fn state(&self) -> FinalizationState {
        self.record.state()
    }

    /// Most recently requested disposition, not necessarily the one that wins
    pub fn desired(&self) -> Disposition {
        self.record.desired()
    }

    /// Ask for the request to continue, optionally with overrides
    pub fn request_continue(&self, overrides: Option<ContinueOverrides>) -> Result<(), CoordinatorError> {
        let result = self.record.request_continue(overrides);
        self.track(result)
    }

    /// Ask for the request to be answered with a synthesized response
    pub fn request_respond(&self, payload: ResponsePayload) -> Result<(), CoordinatorError> {
        let result = self.record.request_respond(payload);
        self.track(result)
    }

    /// Ask for the request to be aborted
    pub fn request_abort(&self, reason: ErrorCode) -> Result<(), CoordinatorError> {
        let result = self.record.request_abort(reason);
        self.track(result)
    }

    /// Register async work that must settle before the terminal action
    pub fn defer<F, Fut>(&self, work: F) -> Result<(), CoordinatorError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        let result = self.record.defer(deferred(work));
        self.track(result)
    }

    /// Subscribe to an outcome topic
    pub fn subscribe<L>(&self, topic: Topic, listener: L) -> SubscriptionHandle
    where
        L: Fn(&Notification) + Send + Sync + 'static,
    {
        self.record.subscribe(topic, Arc::new(listener))
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.record.unsubscribe(handle)
    }

    pub fn on_aborted<L>(&self, listener: L) -> SubscriptionHandle
    where
        L: Fn(&Notification) + Send + Sync + 'static,
    {
        self.subscribe(Topic::Aborted, listener)
    }

    pub fn on_responded<L>(&self, listener: L) -> SubscriptionHandle
    where
        L: Fn(&Notification) + Send + Sync + 'static,
    {
        self.subscribe(Topic::Responded, listener)
    }

    pub fn on_continued<L>(&self, listener: L) -> SubscriptionHandle
    where
        L: Fn(&Notification) + Send + Sync + 'static,
    {
        self.subscribe(Topic::Continued, listener)
    }

    pub fn on_finalized<L>(&self, listener: L) -> SubscriptionHandle
    where
        L: Fn(&Notification) + Send + Sync + 'static,
    {
        self.subscribe(Topic::Finalized, listener)
    }

    pub(crate) fn record(&self) -> &Arc<InterceptionRecord> {
        &self.record
    }

    fn track(&self, result: Result<(), CoordinatorError>) -> Result<(), CoordinatorError> {
        if let Err(ref e) = result
            && e.is_late_mutation()
        {
            self.metrics.record_late_mutation();
        }
        result
    }
}
