//! Notification hub - per-event outcome pub/sub
//!
//! Each of the four topics is published at most once. Listeners registered
//! before publication are invoked exactly once; listeners registered after
//! the topic fired are accepted and silently never invoked.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{Disposition, EventId, Topic};

/// Delivered to listeners when a topic is published
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "event-id")]
    pub event_id: EventId,
    pub topic: Topic,
    /// The disposition that was actually executed
    pub disposition: Disposition,
}

/// Listener callback
pub type Listener = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Returned by subscribe, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub topic: Topic,
    pub(crate) id: u64,
}

#[derive(Default)]
pub struct NotificationHub {
    listeners: HashMap<Topic, Vec<(u64, Listener)>>,
    published: HashSet<Topic>,
    next_id: u64,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for a topic
    ///
    /// If the topic was already published the listener is dropped and will
    /// never fire; the returned handle is still valid to pass to unsubscribe.
    pub fn subscribe(&mut self, topic: Topic, listener: Listener) -> SubscriptionHandle {
        let id = self.next_id;
        self.next_id += 1;

        if self.published.contains(&topic) {
            debug!(%topic, id, "NotificationHub::subscribe: topic already published, listener will not fire");
        } else {
            debug!(%topic, id, "NotificationHub::subscribe: registered");
            self.listeners.entry(topic).or_default().push((id, listener));
        }

        SubscriptionHandle { topic, id }
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        debug!(topic = %handle.topic, id = handle.id, "NotificationHub::unsubscribe: called");
        let Some(entries) = self.listeners.get_mut(&handle.topic) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(id, _)| *id != handle.id);
        entries.len() != before
    }

    pub fn listener_count(&self, topic: Topic) -> usize {
        self.listeners.get(&topic).map(Vec::len).unwrap_or(0)
    }

    pub fn is_published(&self, topic: Topic) -> bool {
        self.published.contains(&topic)
    }

    /// Mark a topic published and hand back its listeners
    ///
    /// Returns None if the topic was already published. The caller invokes
    /// the listeners with [`deliver`] after releasing any lock on the hub.
    pub fn take_for_publish(&mut self, topic: Topic) -> Option<Vec<Listener>> {
        if !self.published.insert(topic) {
            warn!(%topic, "NotificationHub::take_for_publish: topic already published");
            return None;
        }
        let listeners = self
            .listeners
            .remove(&topic)
            .unwrap_or_default()
            .into_iter()
            .map(|(_, listener)| listener)
            .collect::<Vec<_>>();
        debug!(%topic, count = listeners.len(), "NotificationHub::take_for_publish: publishing");
        Some(listeners)
    }
}

impl fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<Topic, usize> = self.listeners.iter().map(|(t, l)| (*t, l.len())).collect();
        f.debug_struct("NotificationHub")
            .field("listeners", &counts)
            .field("published", &self.published)
            .finish()
    }
}

/// Invoke listeners in registration order, containing panics
///
/// Returns the number of listeners that panicked.
pub fn deliver(listeners: &[Listener], notification: &Notification) -> usize {
    let mut panicked = 0;
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener(notification))).is_err() {
            warn!(
                event_id = %notification.event_id,
                topic = %notification.topic,
                "Listener panicked during notification"
            );
            panicked += 1;
        }
    }
    panicked
}
