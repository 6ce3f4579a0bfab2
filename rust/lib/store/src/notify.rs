//! Change notification fan-out.
//!
//! Both store backends publish every committed write through a
//! [`Dispatcher`]; subscribers register a path prefix and receive the
//! events whose path falls at or under it (or above it — an ancestor write
//! replaces the subscribed subtree). Subscriptions are cancellable handles:
//! dropping one unregisters it, mirroring the listener-handle lifecycle of
//! the remote store this models.

use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::path::Path;

/// A single committed write, as seen by subscribers.
///
/// `value` is the node content after the write; `None` means the node was
/// removed. Subscribers needing a wider view re-read the paths they care
/// about — events carry no cross-path snapshot.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: Path,
    pub value: Option<Value>,
}

struct Subscriber {
    id: u64,
    prefix: Path,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// Prefix-matched change fan-out shared by store backends.
#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for writes at, under, or above `prefix`.
    pub fn subscribe(&self, prefix: Path) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = self.registry.lock().unwrap();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.push(Subscriber { id, prefix, tx });
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver one committed write to every matching subscriber.
    /// Closed receivers are pruned as they are found.
    pub fn publish(&self, path: &Path, value: Option<&Value>) {
        let mut registry = self.registry.lock().unwrap();
        registry.subscribers.retain(|sub| {
            if !path.starts_with(&sub.prefix) && !sub.prefix.starts_with(path) {
                return true;
            }
            let event = ChangeEvent {
                path: path.clone(),
                value: value.cloned(),
            };
            sub.tx.send(event).is_ok()
        });
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.registry.lock().unwrap().subscribers.len()
    }
}

/// A live change subscription. Dropping the handle unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Wait for the next change. Returns None once the store is gone and
    /// all pending events were drained.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap();
            registry.subscribers.retain(|sub| sub.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn prefix_matching_both_directions() {
        let dispatcher = Dispatcher::new();
        let mut sub = dispatcher.subscribe(Path::new("batches/B-1"));

        // Descendant write reaches the subscriber.
        dispatcher.publish(&Path::new("batches/B-1/inRackCount"), Some(&json!(1)));
        // Ancestor write replaces the subscribed subtree — also delivered.
        dispatcher.publish(&Path::new("batches"), Some(&json!({})));
        // Sibling write does not.
        dispatcher.publish(&Path::new("batches/B-2"), Some(&json!(0)));

        let first = sub.recv().await.unwrap();
        assert_eq!(first.path, Path::new("batches/B-1/inRackCount"));
        let second = sub.recv().await.unwrap();
        assert_eq!(second.path, Path::new("batches"));

        // Nothing else pending.
        dispatcher.publish(&Path::new("batches/B-1"), None);
        let third = sub.recv().await.unwrap();
        assert!(third.value.is_none());
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let dispatcher = Dispatcher::new();
        let sub = dispatcher.subscribe(Path::new("sensors"));
        assert_eq!(dispatcher.subscriber_count(), 1);
        drop(sub);
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn per_path_order_is_preserved() {
        let dispatcher = Dispatcher::new();
        let mut sub = dispatcher.subscribe(Path::new("sensors/3/status"));
        for status in ["Active", "Complete", "Inactive"] {
            dispatcher.publish(&Path::new("sensors/3/status"), Some(&json!(status)));
        }
        for expected in ["Active", "Complete", "Inactive"] {
            let ev = sub.recv().await.unwrap();
            assert_eq!(ev.value, Some(json!(expected)));
        }
    }
}
