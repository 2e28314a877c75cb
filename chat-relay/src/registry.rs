//! The set of live streams the broadcaster fans out to.
//!
//! A stream is present exactly while its receiver task runs: the receiver
//! joins before it reads its first message and leaves after its last one.
//! Join, leave and iteration share one lock, so a broadcast always sees a
//! consistent membership. Joins and leaves wait for an in-flight broadcast.

use std::{
    collections::{HashMap, hash_map::Entry},
    future::Future,
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{error::SendError, message::ChatMessage};

/// Identity of one accepted stream, unique for the life of the server.
pub type StreamId = u64;

/// The outbound side of a live stream.
///
/// `send` is expected to finish in bounded time; the broadcaster holds the
/// registry lock while it runs.
#[async_trait]
pub trait Subscriber: Send + Sync {
    fn id(&self) -> StreamId;

    async fn send(&self, message: &ChatMessage) -> Result<(), SendError>;
}

pub type SubscriberRef = Arc<dyn Subscriber>;

#[derive(Default)]
pub struct Registry {
    subscribers: Mutex<HashMap<StreamId, SubscriberRef>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber. Returns false, leaving the set unchanged, if its id
    /// is already present.
    pub async fn join(&self, subscriber: SubscriberRef) -> bool {
        let mut subscribers = self.subscribers.lock().await;
        match subscribers.entry(subscriber.id()) {
            Entry::Vacant(slot) => {
                slot.insert(subscriber);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Removes a subscriber. Returns false if it was not present.
    pub async fn leave(&self, id: StreamId) -> bool {
        self.subscribers.lock().await.remove(&id).is_some()
    }

    /// Runs `action` for each subscriber in turn, holding the lock until the
    /// last one completes. Returns how many subscribers were visited.
    pub async fn for_each<F, Fut>(&self, mut action: F) -> usize
    where
        F: FnMut(SubscriberRef) -> Fut,
        Fut: Future<Output = ()>,
    {
        let subscribers = self.subscribers.lock().await;
        for subscriber in subscribers.values() {
            action(Arc::clone(subscriber)).await;
        }
        subscribers.len()
    }

    pub async fn contains(&self, id: StreamId) -> bool {
        self.subscribers.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support::RecordingSubscriber;

    #[tokio::test]
    async fn join_is_idempotent_per_stream() {
        let registry = Registry::new();
        let first = RecordingSubscriber::new(7);

        assert!(registry.join(first.clone()).await);
        assert!(!registry.join(RecordingSubscriber::new(7)).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn leave_of_unknown_stream_is_a_no_op() {
        let registry = Registry::new();
        registry.join(RecordingSubscriber::new(1)).await;

        assert!(!registry.leave(2).await);
        assert!(registry.leave(1).await);
        assert!(!registry.leave(1).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn for_each_visits_every_member_once() {
        let registry = Registry::new();
        let members: Vec<_> = (1..=3).map(RecordingSubscriber::new).collect();
        for member in &members {
            registry.join(member.clone()).await;
        }

        let message = ChatMessage::new("alice", "hi");
        let visited = registry
            .for_each(|subscriber| {
                let message = &message;
                async move {
                    let _ = subscriber.send(message).await;
                }
            })
            .await;

        assert_eq!(visited, 3);
        for member in &members {
            assert_eq!(member.received(), vec![message.clone()]);
        }
    }

    #[tokio::test]
    async fn join_waits_for_an_in_progress_iteration() {
        let registry = Arc::new(Registry::new());
        registry.join(RecordingSubscriber::new(1)).await;

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let iterating = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let mut started = Some(started_tx);
                registry
                    .for_each(|_| {
                        let started = started.take();
                        async move {
                            if let Some(started) = started {
                                let _ = started.send(());
                            }
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    })
                    .await
            })
        };

        started_rx.await.expect("iteration started");
        let late = RecordingSubscriber::new(2);
        registry.join(late.clone()).await;

        // The iteration began with one member and the late joiner was not visited.
        assert_eq!(iterating.await.expect("iteration task"), 1);
        assert!(late.received().is_empty());
        assert_eq!(registry.len().await, 2);
    }
}
