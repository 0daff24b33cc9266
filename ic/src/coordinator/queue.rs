//! Deferred work queue

use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;

/// A zero-argument async callback registered against an event
pub type DeferredWork = Box<dyn FnOnce() -> BoxFuture<'static, eyre::Result<()>> + Send>;

/// Box a closure returning a future into [`DeferredWork`]
pub fn deferred<F, Fut>(work: F) -> DeferredWork
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = eyre::Result<()>> + Send + 'static,
{
    Box::new(move || work().boxed())
}

/// Append-only collection of deferred work, drained once by the finalizer
#[derive(Default)]
pub struct DeferredQueue {
    work: Vec<DeferredWork>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, work: DeferredWork) {
        self.work.push(work);
        debug!(queued = self.work.len(), "DeferredQueue::push: appended");
    }

    pub fn len(&self) -> usize {
        self.work.len()
    }

    pub fn is_empty(&self) -> bool {
        self.work.is_empty()
    }

    /// Take every queued item, leaving the queue empty
    pub fn drain(&mut self) -> Vec<DeferredWork> {
        debug!(count = self.work.len(), "DeferredQueue::drain: called");
        std::mem::take(&mut self.work)
    }
}

impl fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredQueue").field("len", &self.work.len()).finish()
    }
}
