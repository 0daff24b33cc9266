//! Coordinator counters
//!
//! Tracks, across all events:
//! - Arrivals, finalizations and evictions
//! - Which disposition was executed
//! - Contained faults (handler, sink, deferred timeouts) and late mutations

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::Disposition;

/// Point-in-time snapshot of coordinator activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorMetrics {
    pub live_records: usize,
    pub events_arrived: u64,
    pub duplicate_events: u64,
    pub finalized: u64,
    pub continued: u64,
    pub responded: u64,
    pub aborted: u64,
    pub handler_faults: u64,
    pub sink_faults: u64,
    pub deferred_timeouts: u64,
    pub late_mutations: u64,
    pub evicted: u64,
}

/// Thread-safe counters backing [`CoordinatorMetrics`]
#[derive(Debug, Default)]
pub(crate) struct MetricsCounters {
    events_arrived: AtomicU64,
    duplicate_events: AtomicU64,
    finalized: AtomicU64,
    continued: AtomicU64,
    responded: AtomicU64,
    aborted: AtomicU64,
    handler_faults: AtomicU64,
    sink_faults: AtomicU64,
    deferred_timeouts: AtomicU64,
    late_mutations: AtomicU64,
    evicted: AtomicU64,
}

impl MetricsCounters {
    pub fn record_arrival(&self) {
        self.events_arrived.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicate_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_late_mutation(&self) {
        self.late_mutations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finalized(&self, disposition: Disposition, handler_faults: usize, sink_fault: bool, timed_out: bool) {
        debug!(%disposition, handler_faults, sink_fault, timed_out, "MetricsCounters::record_finalized: called");
        self.finalized.fetch_add(1, Ordering::Relaxed);
        let counter = match disposition {
            Disposition::Continue => &self.continued,
            Disposition::Respond => &self.responded,
            Disposition::Abort => &self.aborted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.handler_faults.fetch_add(handler_faults as u64, Ordering::Relaxed);
        if sink_fault {
            self.sink_faults.fetch_add(1, Ordering::Relaxed);
        }
        if timed_out {
            self.deferred_timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, live_records: usize) -> CoordinatorMetrics {
        CoordinatorMetrics {
            live_records,
            events_arrived: self.events_arrived.load(Ordering::Relaxed),
            duplicate_events: self.duplicate_events.load(Ordering::Relaxed),
            finalized: self.finalized.load(Ordering::Relaxed),
            continued: self.continued.load(Ordering::Relaxed),
            responded: self.responded.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            handler_faults: self.handler_faults.load(Ordering::Relaxed),
            sink_faults: self.sink_faults.load(Ordering::Relaxed),
            deferred_timeouts: self.deferred_timeouts.load(Ordering::Relaxed),
            late_mutations: self.late_mutations.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}
