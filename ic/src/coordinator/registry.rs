//! Event registry - event id to live interception record

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::error::CoordinatorError;
use super::record::InterceptionRecord;
use super::types::{EventId, FinalizationState};

#[derive(Debug, Default)]
pub struct EventRegistry {
    records: RwLock<HashMap<EventId, Arc<InterceptionRecord>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh record for a newly arrived event
    pub fn on_event_arrived(&self, id: &str) -> Result<Arc<InterceptionRecord>, CoordinatorError> {
        debug!(%id, "EventRegistry::on_event_arrived: called");
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(id) {
            debug!(%id, "on_event_arrived: duplicate");
            return Err(CoordinatorError::DuplicateEvent(id.to_string()));
        }
        let record = Arc::new(InterceptionRecord::new(id));
        records.insert(id.to_string(), record.clone());
        Ok(record)
    }

    pub fn lookup(&self, id: &str) -> Result<Arc<InterceptionRecord>, CoordinatorError> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| CoordinatorError::UnknownEvent(id.to_string()))
    }

    /// Remove a finalized record
    pub fn evict(&self, id: &str) -> Result<Arc<InterceptionRecord>, CoordinatorError> {
        debug!(%id, "EventRegistry::evict: called");
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let state = records
            .get(id)
            .map(|record| record.state())
            .ok_or_else(|| CoordinatorError::UnknownEvent(id.to_string()))?;

        if state != FinalizationState::Finalized {
            debug!(%id, %state, "evict: record not finalized");
            return Err(CoordinatorError::NotFinalized {
                id: id.to_string(),
                state,
            });
        }

        records
            .remove(id)
            .ok_or_else(|| CoordinatorError::UnknownEvent(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every live record
    pub fn ids(&self) -> Vec<EventId> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrive_and_lookup() {
        let registry = EventRegistry::new();
        assert!(registry.is_empty());

        let record = registry.on_event_arrived("req-1").unwrap();
        assert_eq!(record.id(), "req-1");
        assert!(registry.contains("req-1"));
        assert_eq!(registry.len(), 1);

        let found = registry.lookup("req-1").unwrap();
        assert!(Arc::ptr_eq(&record, &found));
    }

    #[test]
    fn test_duplicate_event() {
        let registry = EventRegistry::new();
        registry.on_event_arrived("req-1").unwrap();

        let err = registry.on_event_arrived("req-1").unwrap_err();
        assert!(matches!(err, CoordinatorError::DuplicateEvent(ref id) if id == "req-1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_event() {
        let registry = EventRegistry::new();
        let err = registry.lookup("missing").unwrap_err();
        assert!(matches!(err, CoordinatorError::UnknownEvent(_)));

        let err = registry.evict("missing").unwrap_err();
        assert!(matches!(err, CoordinatorError::UnknownEvent(_)));
    }

    #[test]
    fn test_evict_requires_finalized() {
        let registry = EventRegistry::new();
        let record = registry.on_event_arrived("req-1").unwrap();

        let err = registry.evict("req-1").unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::NotFinalized {
                state: FinalizationState::Pending,
                ..
            }
        ));

        let _ = record.begin_finalizing();
        record.mark_finalized();

        registry.evict("req-1").unwrap();
        assert!(!registry.contains("req-1"));

        // Id can be reused after eviction
        registry.on_event_arrived("req-1").unwrap();
        assert_eq!(registry.ids(), vec!["req-1".to_string()]);
    }
}
