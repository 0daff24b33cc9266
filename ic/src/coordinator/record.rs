//! Per-event interception record
//!
//! Ledger and queue share one lock so that the Pending -> Finalizing
//! transition and the queue seal happen atomically. The hub has its own lock
//! and listeners are always invoked with no lock held, so a listener may
//! subscribe or read state without deadlocking.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::error::CoordinatorError;
use super::hub::{Listener, Notification, NotificationHub, SubscriptionHandle, deliver};
use super::ledger::OutcomeLedger;
use super::queue::{DeferredQueue, DeferredWork};
use super::types::{
    ContinueOverrides, Disposition, ErrorCode, EventId, FinalizationState, Resolution, ResponsePayload, Topic,
};

#[derive(Debug)]
struct RecordState {
    state: FinalizationState,
    ledger: OutcomeLedger,
    queue: DeferredQueue,
}

/// Coordination record for one in-flight request event
#[derive(Debug)]
pub struct InterceptionRecord {
    id: EventId,
    inner: Mutex<RecordState>,
    hub: Mutex<NotificationHub>,
    created_at: DateTime<Utc>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InterceptionRecord {
    pub fn new(id: impl Into<EventId>) -> Self {
        let id = id.into();
        debug!(%id, "InterceptionRecord::new: called");
        Self {
            id,
            inner: Mutex::new(RecordState {
                state: FinalizationState::Pending,
                ledger: OutcomeLedger::new(),
                queue: DeferredQueue::new(),
            }),
            hub: Mutex::new(NotificationHub::new()),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> FinalizationState {
        lock(&self.inner).state
    }

    /// Most recently requested disposition (not necessarily the winner)
    pub fn desired(&self) -> Disposition {
        lock(&self.inner).ledger.desired()
    }

    pub fn pending_work(&self) -> usize {
        lock(&self.inner).queue.len()
    }

    // === Ledger ===

    pub fn request_continue(&self, overrides: Option<ContinueOverrides>) -> Result<(), CoordinatorError> {
        debug!(id = %self.id, "InterceptionRecord::request_continue: called");
        let mut inner = self.writable_ledger("continue")?;
        inner.ledger.request_continue(overrides);
        Ok(())
    }

    pub fn request_respond(&self, payload: ResponsePayload) -> Result<(), CoordinatorError> {
        debug!(id = %self.id, "InterceptionRecord::request_respond: called");
        let mut inner = self.writable_ledger("respond")?;
        inner.ledger.request_respond(payload);
        Ok(())
    }

    pub fn request_abort(&self, reason: ErrorCode) -> Result<(), CoordinatorError> {
        debug!(id = %self.id, %reason, "InterceptionRecord::request_abort: called");
        let mut inner = self.writable_ledger("abort")?;
        inner.ledger.request_abort(reason);
        Ok(())
    }

    fn writable_ledger(&self, operation: &'static str) -> Result<MutexGuard<'_, RecordState>, CoordinatorError> {
        let inner = lock(&self.inner);
        if inner.ledger.is_sealed() {
            debug!(id = %self.id, operation, "writable_ledger: ledger sealed");
            return Err(CoordinatorError::LateMutation {
                id: self.id.clone(),
                operation,
            });
        }
        Ok(inner)
    }

    // === Deferred work ===

    pub fn defer(&self, work: DeferredWork) -> Result<(), CoordinatorError> {
        debug!(id = %self.id, "InterceptionRecord::defer: called");
        let mut inner = lock(&self.inner);
        if inner.state != FinalizationState::Pending {
            debug!(id = %self.id, state = %inner.state, "defer: queue sealed");
            return Err(CoordinatorError::LateMutation {
                id: self.id.clone(),
                operation: "defer",
            });
        }
        inner.queue.push(work);
        Ok(())
    }

    // === Notifications ===

    /// Subscribe to a topic; always legal, may never fire if already published
    pub fn subscribe(&self, topic: Topic, listener: Listener) -> SubscriptionHandle {
        debug!(id = %self.id, %topic, "InterceptionRecord::subscribe: called");
        lock(&self.hub).subscribe(topic, listener)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        lock(&self.hub).unsubscribe(handle)
    }

    pub fn listener_count(&self, topic: Topic) -> usize {
        lock(&self.hub).listener_count(topic)
    }

    // === Finalizer hooks ===

    /// Move Pending -> Finalizing and take the queued work
    ///
    /// Returns None if finalization already started; only one caller ever
    /// gets Some.
    pub(crate) fn begin_finalizing(&self) -> Option<Vec<DeferredWork>> {
        let mut inner = lock(&self.inner);
        if inner.state != FinalizationState::Pending {
            debug!(id = %self.id, state = %inner.state, "begin_finalizing: already started");
            return None;
        }
        inner.state = FinalizationState::Finalizing;
        info!(id = %self.id, deferred = inner.queue.len(), "Interception finalizing");
        Some(inner.queue.drain())
    }

    /// Seal the ledger and resolve the terminal action
    pub(crate) fn resolve(&self) -> Resolution {
        lock(&self.inner).ledger.resolve()
    }

    /// Publish a topic to current listeners; returns how many panicked
    pub(crate) fn publish(&self, topic: Topic, disposition: Disposition) -> usize {
        let listeners = lock(&self.hub).take_for_publish(topic);
        let Some(listeners) = listeners else {
            return 0;
        };
        let notification = Notification {
            event_id: self.id.clone(),
            topic,
            disposition,
        };
        deliver(&listeners, &notification)
    }

    pub(crate) fn mark_finalized(&self) {
        let mut inner = lock(&self.inner);
        inner.state = FinalizationState::Finalized;
        debug!(id = %self.id, "InterceptionRecord::mark_finalized: done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::queue::deferred;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_new_record_is_pending() {
        let record = InterceptionRecord::new("req-1");
        assert_eq!(record.id(), "req-1");
        assert_eq!(record.state(), FinalizationState::Pending);
        assert_eq!(record.desired(), Disposition::Continue);
        assert_eq!(record.pending_work(), 0);
    }

    #[test]
    fn test_begin_finalizing_only_once() {
        let record = InterceptionRecord::new("req-1");
        record.defer(deferred(|| async { Ok(()) })).unwrap();

        let work = record.begin_finalizing().unwrap();
        assert_eq!(work.len(), 1);
        assert_eq!(record.state(), FinalizationState::Finalizing);
        assert!(record.begin_finalizing().is_none());
    }

    #[test]
    fn test_defer_rejected_after_finalizing_begins() {
        let record = InterceptionRecord::new("req-1");
        let _ = record.begin_finalizing();

        let err = record.defer(deferred(|| async { Ok(()) })).unwrap_err();
        assert!(err.is_late_mutation());
    }

    #[test]
    fn test_ledger_open_during_drain_sealed_after_resolve() {
        let record = InterceptionRecord::new("req-1");
        let _ = record.begin_finalizing();

        // Deferred work may still write the ledger while draining
        record.request_abort(ErrorCode::BlockedByClient).unwrap();
        assert_eq!(record.resolve(), Resolution::Abort(ErrorCode::BlockedByClient));

        let err = record.request_continue(None).unwrap_err();
        assert!(err.is_late_mutation());
        let err = record.request_respond(ResponsePayload::new("x")).unwrap_err();
        assert!(err.is_late_mutation());
    }

    #[test]
    fn test_publish_once_per_topic() {
        let record = InterceptionRecord::new("req-1");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        record.subscribe(
            Topic::Finalized,
            Arc::new(move |n: &Notification| {
                assert_eq!(n.event_id, "req-1");
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );

        record.publish(Topic::Finalized, Disposition::Continue);
        record.publish(Topic::Finalized, Disposition::Continue);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_subscribe_during_publish() {
        let record = Arc::new(InterceptionRecord::new("req-1"));
        let inner = record.clone();
        record.subscribe(
            Topic::Continued,
            Arc::new(move |_: &Notification| {
                inner.subscribe(Topic::Finalized, Arc::new(|_: &Notification| {}));
            }),
        );

        record.publish(Topic::Continued, Disposition::Continue);
        assert_eq!(record.listener_count(Topic::Finalized), 1);
    }
}
