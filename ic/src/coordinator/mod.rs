//! Coordinator for cooperative request interception
//!
//! Many observers, one terminal action. For every intercepted request event
//! the coordinator keeps:
//! - **Ledger:** the last requested continue/respond/abort per category
//! - **Deferred queue:** async work that must settle before anything is sent
//! - **Hub:** listeners for the `aborted`, `responded`, `continued` and
//!   `finalized` topics
//!
//! Finalization runs deferred work concurrently, resolves the ledger by
//! precedence (abort > respond > continue), calls the transport's sink
//! exactly once and publishes the outcome exactly once.

mod config;
mod core;
mod error;
mod finalizer;
mod handle;
mod hub;
mod ledger;
mod metrics;
mod queue;
mod record;
mod registry;
mod sink;
mod types;

pub use config::CoordinatorConfig;
pub use core::Coordinator;
pub use error::{CoordinatorError, UnknownErrorCode};
pub use finalizer::FinalizeReport;
pub use handle::RequestHandle;
pub use hub::{Listener, Notification, NotificationHub, SubscriptionHandle};
pub use ledger::OutcomeLedger;
pub use metrics::CoordinatorMetrics;
pub use queue::{DeferredQueue, DeferredWork, deferred};
pub use record::InterceptionRecord;
pub use registry::EventRegistry;
pub use sink::{RecordingSink, SinkCall, TerminalSink};
pub use types::{
    ContinueOverrides, Disposition, ErrorCode, EventId, FinalizationState, Resolution, ResponsePayload, Topic,
};
