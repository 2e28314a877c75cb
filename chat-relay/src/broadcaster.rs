use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tracing::{debug, trace};

use crate::{
    ingress::IngressReceiver,
    message::ChatMessage,
    registry::Registry,
};

/// Outcome of fanning out a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// The single consumer of the ingress queue.
///
/// Each message is handed to every registered stream before the next one is
/// dequeued, which gives all subscribers the same per-message order. A failed
/// send is logged and skipped; removing the stream is left to its receiver.
pub struct Broadcaster {
    ingress: IngressReceiver,
    registry: Arc<Registry>,
}

impl Broadcaster {
    pub fn new(ingress: IngressReceiver, registry: Arc<Registry>) -> Self {
        Self { ingress, registry }
    }

    /// Runs until every ingress sender is dropped and the queue is empty.
    /// Returns how many messages were broadcast.
    pub async fn run(mut self) -> u64 {
        let mut broadcasts = 0;
        while let Some(message) = self.ingress.dequeue().await {
            let delivery = broadcast(&self.registry, &message).await;
            trace!(
                user = %message.user,
                delivered = delivery.delivered,
                failed = delivery.failed,
                "message broadcast"
            );
            broadcasts += 1;
        }
        debug!(broadcasts, "ingress closed, broadcaster stopping");
        broadcasts
    }
}

/// Sends `message` to every stream currently in `registry`.
pub async fn broadcast(registry: &Registry, message: &ChatMessage) -> Delivery {
    let failed = AtomicUsize::new(0);
    let visited = registry
        .for_each(|subscriber| {
            let failed = &failed;
            async move {
                if let Err(error) = subscriber.send(message).await {
                    failed.fetch_add(1, Ordering::Relaxed);
                    debug!(stream_id = subscriber.id(), %error, "dropping message for stream");
                }
            }
        })
        .await;

    let failed = failed.into_inner();
    Delivery {
        delivered: visited - failed,
        failed,
    }
}
