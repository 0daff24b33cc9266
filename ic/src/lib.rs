//! Interceptor - cooperative request interception
//!
//! Several independent observers look at the same intercepted network
//! request. Each may ask to continue it, answer it with a synthesized
//! response or abort it, and may register async work that has to settle
//! first. Exactly one terminal action reaches the transport, chosen by a
//! fixed precedence, and every observer learns which one it was.
//!
//! # Modules
//!
//! - [`coordinator`] - Per-event ledger, deferred queue, notifications and finalization
//! - [`dispatch`] - Observer trait and the dispatcher that feeds the coordinator
//! - [`scenario`] - YAML scenarios of requests and URL rules
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod scenario;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{
    ContinueOverrides, Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorMetrics, Disposition, ErrorCode,
    FinalizationState, FinalizeReport, Notification, RecordingSink, RequestHandle, Resolution, ResponsePayload,
    TerminalSink, Topic,
};
pub use dispatch::{Dispatcher, RequestInfo, RequestObserver};
pub use scenario::{Rule, RuleAction, RuleObserver, Scenario, ScenarioOutcome, ScenarioRun, run_scenario};
