//! Observer dispatch - the event-source and external-trigger side
//!
//! Every registered [`RequestObserver`] is wrapped into deferred work for
//! each arriving request, so slow async observers are always awaited before
//! the terminal action goes out. Once the request event has been delivered
//! the dispatcher triggers finalization and (optionally) evicts the record.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::coordinator::{Coordinator, CoordinatorError, EventId, FinalizeReport, RequestHandle};

/// Request metadata delivered to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    #[serde(default = "new_event_id")]
    pub id: EventId,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(rename = "resource-type", default)]
    pub resource_type: Option<String>,
}

fn new_event_id() -> EventId {
    Uuid::now_v7().to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

impl RequestInfo {
    /// A GET request with a fresh id
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            id: new_event_id(),
            url: url.into(),
            method: default_method(),
            headers: HashMap::new(),
            resource_type: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<EventId>) -> Self {
        self.id = id.into();
        self
    }
}

/// Something that wants a say in how requests are handled
#[async_trait]
pub trait RequestObserver: Send + Sync {
    /// Observer name, used in logs
    fn name(&self) -> &str;

    /// Inspect a request and express wishes through the handle
    ///
    /// Runs as deferred work: the terminal action waits for this to return.
    async fn on_request(&self, request: &RequestInfo, handle: &RequestHandle) -> eyre::Result<()>;
}

pub struct Dispatcher {
    coordinator: Arc<Coordinator>,
    observers: Vec<Arc<dyn RequestObserver>>,
}

impl Dispatcher {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        debug!("Dispatcher::new: called");
        Self {
            coordinator,
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn RequestObserver>) {
        debug!(name = observer.name(), "Dispatcher::add_observer: called");
        self.observers.push(observer);
    }

    pub fn with_observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.add_observer(observer);
        self
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Deliver one request to all observers and finalize it
    ///
    /// `before_finalize` runs after observers were registered and before the
    /// trigger fires, so callers can attach listeners to the handle.
    pub async fn dispatch_with<F>(
        &self,
        request: RequestInfo,
        before_finalize: F,
    ) -> Result<Option<FinalizeReport>, CoordinatorError>
    where
        F: FnOnce(&RequestHandle),
    {
        debug!(id = %request.id, url = %request.url, observers = self.observer_count(), "Dispatcher::dispatch: called");
        let handle = self.coordinator.on_event_arrived(&request.id)?;
        let request = Arc::new(request);

        for observer in &self.observers {
            let observer = observer.clone();
            let request = request.clone();
            let observer_handle = handle.clone();
            handle.defer(move || async move {
                debug!(observer = observer.name(), id = %request.id, "Running observer");
                observer.on_request(&request, &observer_handle).await
            })?;
        }

        before_finalize(&handle);

        let report = if self.coordinator.config().evict_after_finalize {
            self.coordinator.finalize_and_evict(&request.id).await?
        } else {
            self.coordinator.finalize(&request.id).await?
        };

        if let Some(ref report) = report {
            info!(id = %report.event_id, url = %request.url, disposition = %report.disposition, "Request dispatched");
        }
        Ok(report)
    }

    pub async fn dispatch(&self, request: RequestInfo) -> Result<Option<FinalizeReport>, CoordinatorError> {
        self.dispatch_with(request, |_| {}).await
    }

    /// Dispatch many requests concurrently; results keep input order
    pub async fn dispatch_all(
        &self,
        requests: Vec<RequestInfo>,
    ) -> Vec<Result<Option<FinalizeReport>, CoordinatorError>> {
        debug!(count = requests.len(), "Dispatcher::dispatch_all: called");
        join_all(requests.into_iter().map(|request| self.dispatch(request))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{
        CoordinatorConfig, Disposition, ErrorCode, RecordingSink, Resolution, ResponsePayload, Topic,
    };
    use std::sync::Mutex;
    use std::time::Duration;

    struct Blocker;

    #[async_trait]
    impl RequestObserver for Blocker {
        fn name(&self) -> &str {
            "blocker"
        }

        async fn on_request(&self, request: &RequestInfo, handle: &RequestHandle) -> eyre::Result<()> {
            // Simulate a slow policy lookup
            tokio::time::sleep(Duration::from_millis(10)).await;
            if request.url.contains("ads") {
                handle.request_abort(ErrorCode::BlockedByClient)?;
            }
            Ok(())
        }
    }

    struct Responder;

    #[async_trait]
    impl RequestObserver for Responder {
        fn name(&self) -> &str {
            "responder"
        }

        async fn on_request(&self, _request: &RequestInfo, handle: &RequestHandle) -> eyre::Result<()> {
            handle.request_respond(ResponsePayload::new("console.log('hello world')"))?;
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl RequestObserver for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn on_request(&self, _request: &RequestInfo, _handle: &RequestHandle) -> eyre::Result<()> {
            Err(eyre::eyre!("policy store unavailable"))
        }
    }

    fn dispatcher(config: CoordinatorConfig) -> (Dispatcher, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let coord = Arc::new(Coordinator::new(sink.clone(), config));
        (Dispatcher::new(coord), sink)
    }

    #[tokio::test]
    async fn test_blocker_beats_responder() {
        let (dispatcher, sink) = dispatcher(CoordinatorConfig::default());
        let dispatcher = dispatcher
            .with_observer(Arc::new(Responder))
            .with_observer(Arc::new(Blocker));

        let request = RequestInfo::get("https://ads.example.com/tag.js").with_id("req-ads");
        let report = dispatcher.dispatch(request).await.unwrap().unwrap();

        assert_eq!(report.disposition, Disposition::Abort);
        assert_eq!(sink.calls()[0].resolution, Resolution::Abort(ErrorCode::BlockedByClient));
        assert!(dispatcher.coordinator().live_events().is_empty());
    }

    #[tokio::test]
    async fn test_responder_wins_when_not_blocked() {
        let (dispatcher, sink) = dispatcher(CoordinatorConfig::default());
        let dispatcher = dispatcher
            .with_observer(Arc::new(Responder))
            .with_observer(Arc::new(Blocker));

        let report = dispatcher
            .dispatch(RequestInfo::get("https://example.com/app.js"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.disposition, Disposition::Respond);
        assert_eq!(sink.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_broken_observer_does_not_fail_dispatch() {
        let (dispatcher, sink) = dispatcher(CoordinatorConfig::default());
        let dispatcher = dispatcher
            .with_observer(Arc::new(Broken))
            .with_observer(Arc::new(Responder));

        let report = dispatcher
            .dispatch(RequestInfo::get("https://example.com/"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.disposition, Disposition::Respond);
        assert_eq!(report.handler_faults.len(), 1);
        assert!(report.handler_faults[0].contains("policy store unavailable"));
        assert_eq!(sink.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_listeners_attached_before_finalize_fire() {
        let (dispatcher, _sink) = dispatcher(CoordinatorConfig::default());
        let dispatcher = dispatcher.with_observer(Arc::new(Blocker));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        dispatcher
            .dispatch_with(RequestInfo::get("https://ads.example.com/"), move |handle| {
                let s2 = s.clone();
                handle.on_aborted(move |n| s2.lock().unwrap().push(n.topic));
                handle.on_finalized(move |n| s.lock().unwrap().push(n.topic));
            })
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Topic::Aborted, Topic::Finalized]);
    }

    #[tokio::test]
    async fn test_dispatch_all_keeps_records_independent() {
        let (dispatcher, sink) = dispatcher(CoordinatorConfig {
            evict_after_finalize: false,
            ..Default::default()
        });
        let dispatcher = dispatcher.with_observer(Arc::new(Blocker));

        let requests = vec![
            RequestInfo::get("https://ads.example.com/1").with_id("a"),
            RequestInfo::get("https://example.com/2").with_id("b"),
            RequestInfo::get("https://ads.example.com/3").with_id("c"),
        ];
        let results = dispatcher.dispatch_all(requests).await;

        let dispositions = results
            .into_iter()
            .map(|r| r.unwrap().unwrap().disposition)
            .collect::<Vec<_>>();
        assert_eq!(
            dispositions,
            vec![Disposition::Abort, Disposition::Continue, Disposition::Abort]
        );
        assert_eq!(sink.calls().len(), 3);
        assert_eq!(dispatcher.coordinator().live_events().len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let (dispatcher, _sink) = dispatcher(CoordinatorConfig {
            evict_after_finalize: false,
            ..Default::default()
        });

        dispatcher
            .dispatch(RequestInfo::get("https://example.com/").with_id("same"))
            .await
            .unwrap();
        let err = dispatcher
            .dispatch(RequestInfo::get("https://example.com/").with_id("same"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::DuplicateEvent(_)));
    }

    #[test]
    fn test_request_info_yaml_defaults() {
        let info: RequestInfo = serde_yaml::from_str("url: https://example.com/\n").unwrap();
        assert_eq!(info.method, "GET");
        assert!(!info.id.is_empty());
        assert!(info.headers.is_empty());
    }
}
