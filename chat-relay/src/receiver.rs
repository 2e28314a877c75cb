use std::io;

use futures::{Stream, StreamExt};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::StreamError,
    ingress::IngressSender,
    message::ChatMessage,
    registry::{Registry, SubscriberRef},
};

/// Pumps one stream's inbound messages into the ingress queue.
///
/// Joins `registry` before the first read and leaves it after the last
/// enqueue, so membership covers exactly the span in which this stream can
/// still produce. Returns the reason the loop stopped; a clean end of stream
/// is [`StreamError::Closed`].
pub async fn run_receiver<S>(
    subscriber: SubscriberRef,
    mut inbound: S,
    registry: &Registry,
    ingress: &IngressSender,
    cancel: &CancellationToken,
) -> StreamError
where
    S: Stream<Item = io::Result<ChatMessage>> + Unpin,
{
    let stream_id = subscriber.id();
    if !registry.join(subscriber).await {
        warn!(stream_id, "stream id already registered");
    }
    info!(stream_id, "stream joined");

    let exit = loop {
        let next = select! {
            biased;
            _ = cancel.cancelled() => break StreamError::Cancelled,
            next = inbound.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(error)) => break StreamError::Receive(error),
            None => break StreamError::Closed,
        };

        select! {
            biased;
            _ = cancel.cancelled() => break StreamError::Cancelled,
            enqueued = ingress.enqueue(message) => {
                if enqueued.is_err() {
                    break StreamError::IngressClosed;
                }
            }
        }
    };

    registry.leave(stream_id).await;
    debug!(stream_id, reason = %exit, "stream left");
    exit
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroUsize, sync::Arc, time::Duration};

    use futures::channel::mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::{
        ingress,
        test_support::{RecordingSubscriber, wait_until},
    };

    type Feed = mpsc::UnboundedSender<io::Result<ChatMessage>>;

    struct Harness {
        registry: Arc<Registry>,
        ingress: ingress::IngressReceiver,
        feed: Feed,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<StreamError>,
    }

    fn spawn_receiver(stream_id: u64) -> Harness {
        let registry = Arc::new(Registry::new());
        let (ingress_tx, ingress_rx) = ingress::channel(NonZeroUsize::new(16).unwrap());
        let (feed, inbound) = mpsc::unbounded();
        let cancel = CancellationToken::new();

        let task = {
            let registry = Arc::clone(&registry);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_receiver(
                    RecordingSubscriber::new(stream_id),
                    inbound,
                    &registry,
                    &ingress_tx,
                    &cancel,
                )
                .await
            })
        };

        Harness {
            registry,
            ingress: ingress_rx,
            feed,
            cancel,
            task,
        }
    }

    #[tokio::test]
    async fn membership_spans_the_receive_loop() {
        let mut harness = spawn_receiver(3);
        let registry = Arc::clone(&harness.registry);
        wait_until(|| {
            let registry = Arc::clone(&registry);
            async move { registry.contains(3).await }
        })
        .await;

        harness
            .feed
            .unbounded_send(Ok(ChatMessage::new("alice", "hi")))
            .unwrap();
        assert_eq!(
            harness.ingress.dequeue().await,
            Some(ChatMessage::new("alice", "hi"))
        );
        assert!(harness.registry.contains(3).await);

        harness.feed.close_channel();
        let exit = timeout(Duration::from_secs(1), harness.task)
            .await
            .expect("receiver exits on end of stream")
            .unwrap();
        assert!(matches!(exit, StreamError::Closed));
        assert!(!harness.registry.contains(3).await);
    }

    #[tokio::test]
    async fn receive_error_is_returned_and_the_stream_leaves() {
        let harness = spawn_receiver(4);
        harness
            .feed
            .unbounded_send(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
            .unwrap();

        let exit = harness.task.await.unwrap();
        match exit {
            StreamError::Receive(error) => assert_eq!(error.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("unexpected exit: {other:?}"),
        }
        assert!(harness.registry.is_empty().await);
    }

    #[tokio::test]
    async fn cancellation_stops_an_idle_receiver() {
        let harness = spawn_receiver(5);
        harness.cancel.cancel();

        let exit = harness.task.await.unwrap();
        assert!(matches!(exit, StreamError::Cancelled));
        assert!(exit.is_clean());
        assert!(harness.registry.is_empty().await);
    }

    #[tokio::test]
    async fn closed_ingress_ends_the_receiver() {
        let harness = spawn_receiver(6);
        drop(harness.ingress);
        harness
            .feed
            .unbounded_send(Ok(ChatMessage::new("alice", "lost")))
            .unwrap();

        let exit = harness.task.await.unwrap();
        assert!(matches!(exit, StreamError::IngressClosed));
        assert!(harness.registry.is_empty().await);
    }
}
