//! Coordinator - registry, finalizer and metrics behind one facade

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

use super::config::CoordinatorConfig;
use super::error::CoordinatorError;
use super::finalizer::{FinalizeReport, Finalizer};
use super::handle::RequestHandle;
use super::hub::{Notification, SubscriptionHandle};
use super::metrics::{CoordinatorMetrics, MetricsCounters};
use super::registry::EventRegistry;
use super::sink::TerminalSink;
use super::types::{ContinueOverrides, ErrorCode, EventId, FinalizationState, ResponsePayload, Topic};

/// Coordinates cooperative interception for every in-flight event
///
/// The event source calls [`Coordinator::on_event_arrived`], observers act
/// through the returned [`RequestHandle`] (or the id-keyed methods here), and
/// the external trigger calls [`Coordinator::finalize`] followed by
/// [`Coordinator::evict`].
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: EventRegistry,
    finalizer: Finalizer,
    metrics: Arc<MetricsCounters>,
}

impl Coordinator {
    /// Create a new Coordinator issuing terminal actions to `sink`
    pub fn new(sink: Arc<dyn TerminalSink>, config: CoordinatorConfig) -> Self {
        debug!(?config, "Coordinator::new: called");
        let metrics = Arc::new(MetricsCounters::default());
        let finalizer = Finalizer::new(sink, &config, metrics.clone());
        Self {
            config,
            registry: EventRegistry::new(),
            finalizer,
            metrics,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Register a newly arrived event and return its handle
    pub fn on_event_arrived(&self, id: &str) -> Result<RequestHandle, CoordinatorError> {
        debug!(%id, "Coordinator::on_event_arrived: called");
        match self.registry.on_event_arrived(id) {
            Ok(record) => {
                self.metrics.record_arrival();
                Ok(RequestHandle::new(record, self.metrics.clone()))
            }
            Err(e) => {
                self.metrics.record_duplicate();
                Err(e)
            }
        }
    }

    /// Get a handle for a live event
    pub fn handle(&self, id: &str) -> Result<RequestHandle, CoordinatorError> {
        let record = self.registry.lookup(id)?;
        Ok(RequestHandle::new(record, self.metrics.clone()))
    }

    pub fn state(&self, id: &str) -> Result<FinalizationState, CoordinatorError> {
        Ok(self.registry.lookup(id)?.state())
    }

    pub fn request_continue(&self, id: &str, overrides: Option<ContinueOverrides>) -> Result<(), CoordinatorError> {
        self.handle(id)?.request_continue(overrides)
    }

    pub fn request_respond(&self, id: &str, payload: ResponsePayload) -> Result<(), CoordinatorError> {
        self.handle(id)?.request_respond(payload)
    }

    pub fn request_abort(&self, id: &str, reason: ErrorCode) -> Result<(), CoordinatorError> {
        self.handle(id)?.request_abort(reason)
    }

    pub fn defer<F, Fut>(&self, id: &str, work: F) -> Result<(), CoordinatorError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.handle(id)?.defer(work)
    }

    pub fn subscribe<L>(&self, id: &str, topic: Topic, listener: L) -> Result<SubscriptionHandle, CoordinatorError>
    where
        L: Fn(&Notification) + Send + Sync + 'static,
    {
        Ok(self.handle(id)?.subscribe(topic, listener))
    }

    pub fn unsubscribe(&self, id: &str, handle: SubscriptionHandle) -> Result<bool, CoordinatorError> {
        Ok(self.handle(id)?.unsubscribe(handle))
    }

    /// Finalize an event
    ///
    /// Returns `Ok(None)` when finalization was already started by an
    /// earlier or concurrent call. Only an unknown id is an error; faults in
    /// deferred work or the sink are reported in the [`FinalizeReport`].
    pub async fn finalize(&self, id: &str) -> Result<Option<FinalizeReport>, CoordinatorError> {
        debug!(%id, "Coordinator::finalize: called");
        let record = self.registry.lookup(id)?;

        let report = self.finalizer.finalize(record).await;
        if report.is_none() {
            debug!(%id, "finalize: already started elsewhere");
        }
        Ok(report)
    }

    /// Drop a finalized event from the registry
    pub fn evict(&self, id: &str) -> Result<(), CoordinatorError> {
        self.registry.evict(id)?;
        self.metrics.record_eviction();
        debug!(%id, live = self.registry.len(), "Coordinator::evict: removed");
        Ok(())
    }

    /// Finalize then evict, the usual external-trigger path
    ///
    /// Eviction is skipped when another caller owns the finalization.
    pub async fn finalize_and_evict(&self, id: &str) -> Result<Option<FinalizeReport>, CoordinatorError> {
        let report = self.finalize(id).await?;
        if report.is_some() {
            self.evict(id)?;
        }
        Ok(report)
    }

    pub fn live_events(&self) -> Vec<EventId> {
        self.registry.ids()
    }

    /// Get current coordinator metrics
    pub fn metrics(&self) -> CoordinatorMetrics {
        self.metrics.snapshot(self.registry.len())
    }

    /// Log a summary of current activity
    pub fn log_summary(&self) {
        let m = self.metrics();
        info!(
            live = m.live_records,
            finalized = m.finalized,
            continued = m.continued,
            responded = m.responded,
            aborted = m.aborted,
            handler_faults = m.handler_faults,
            sink_faults = m.sink_faults,
            "Coordinator summary"
        );
    }
}
