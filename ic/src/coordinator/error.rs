//! Coordinator error types

use thiserror::Error;

use super::types::{EventId, FinalizationState};

/// Contract violations surfaced to callers of the coordinator
///
/// Handler and sink faults are not represented here: they are contained by
/// the finalizer and reported through [`super::FinalizeReport`].
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Cannot {operation} on event {id}: interception is already being finalized")]
    LateMutation { id: EventId, operation: &'static str },

    #[error("Event already registered: {0}")]
    DuplicateEvent(EventId),

    #[error("Unknown event: {0}")]
    UnknownEvent(EventId),

    #[error("Event {id} cannot be evicted while {state}")]
    NotFinalized { id: EventId, state: FinalizationState },
}

impl CoordinatorError {
    /// Check if this is a late ledger/queue mutation
    pub fn is_late_mutation(&self) -> bool {
        matches!(self, CoordinatorError::LateMutation { .. })
    }
}

/// Returned when parsing an unrecognized abort error code
#[derive(Debug, Error)]
#[error("Unknown error code: {0}")]
pub struct UnknownErrorCode(pub String);
