//! In-process publish/subscribe for sync lifecycle notifications.
//!
//! Delivery is synchronous on the publishing task. Subscribers are invoked
//! from a snapshot of the subscriber list, so a handler may subscribe or
//! unsubscribe (itself included) while it runs.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

/// Notification kinds a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    ConnectivityChanged,
    SyncComplete,
    DataUpdated,
}

impl Topic {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectivityChanged => "connectivity-changed",
            Self::SyncComplete => "sync-complete",
            Self::DataUpdated => "data-updated",
        }
    }
}

/// Published notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SyncEvent {
    /// The monitor's online flag flipped
    ConnectivityChanged { online: bool },
    /// A push attempt finished (successfully or not)
    SyncComplete,
    /// A pull inserted or overwrote at least one local record
    DataUpdated,
}

impl SyncEvent {
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::ConnectivityChanged { .. } => Topic::ConnectivityChanged,
            Self::SyncComplete => Topic::SyncComplete,
            Self::DataUpdated => Topic::DataUpdated,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    topic: Topic,
    handler: Handler,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

/// Observer list shared by the sync engine and the connectivity monitor.
///
/// Cloning yields another handle to the same list.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers().len())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        // Handlers never run under this lock, so poisoning cannot leave it half-updated.
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for every event published on `topic`.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers().push(Subscriber {
            id,
            topic,
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers();
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        subscribers.len() != before
    }

    /// Number of handlers registered for `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers()
            .iter()
            .filter(|subscriber| subscriber.topic == topic)
            .count()
    }

    /// Deliver `event` to every current subscriber of its topic.
    pub fn publish(&self, event: SyncEvent) {
        let topic = event.topic();
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .subscribers()
            .iter()
            .filter(|subscriber| subscriber.topic == topic)
            .map(|subscriber| (subscriber.id, Arc::clone(&subscriber.handler)))
            .collect();

        if handlers.is_empty() {
            tracing::trace!(topic = topic.as_str(), "No subscribers");
            return;
        }

        for (id, handler) in handlers {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::error!(
                    topic = topic.as_str(),
                    subscription = id.0,
                    "Event subscriber panicked"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    fn counter(bus: &EventBus, topic: Topic) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        bus.subscribe(topic, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(SyncEvent::SyncComplete);
        assert_eq!(bus.subscriber_count(Topic::SyncComplete), 0);
    }

    #[test]
    fn delivers_only_to_matching_topic() {
        let bus = EventBus::new();
        let complete = counter(&bus, Topic::SyncComplete);
        let updated = counter(&bus, Topic::DataUpdated);

        bus.publish(SyncEvent::SyncComplete);
        bus.publish(SyncEvent::SyncComplete);

        assert_eq!(complete.load(Ordering::SeqCst), 2);
        assert_eq!(updated.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn connectivity_payload_reaches_handler() {
        let bus = EventBus::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        bus.subscribe(Topic::ConnectivityChanged, move |event| {
            sink.lock().unwrap().push(*event);
        });

        bus.publish(SyncEvent::ConnectivityChanged { online: false });
        assert_eq!(
            *received.lock().unwrap(),
            vec![SyncEvent::ConnectivityChanged { online: false }]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = bus.subscribe(Topic::DataUpdated, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(SyncEvent::DataUpdated);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(SyncEvent::DataUpdated);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        bus.subscribe(Topic::SyncComplete, |_| panic!("subscriber bug"));
        let after = counter(&bus, Topic::SyncComplete);

        bus.publish(SyncEvent::SyncComplete);
        bus.publish(SyncEvent::SyncComplete);

        assert_eq!(after.load(Ordering::SeqCst), 2);
        assert_eq!(bus.subscriber_count(Topic::SyncComplete), 2);
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let handle = bus.clone();
        let seen = Arc::clone(&count);
        let own_id = Arc::clone(&slot);
        let id = bus.subscribe(Topic::SyncComplete, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *own_id.lock().unwrap() {
                handle.unsubscribe(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        bus.publish(SyncEvent::SyncComplete);
        bus.publish(SyncEvent::SyncComplete);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
