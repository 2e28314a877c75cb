//! Bounded FIFO between the per-stream receivers and the broadcaster.
//!
//! A full queue blocks the enqueuing receiver. That is the only backpressure
//! in the relay: a stalled broadcaster slows every producer alike, and no
//! message is ever dropped by the queue itself.

use std::num::NonZeroUsize;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::message::ChatMessage;

/// The broadcaster is gone, so nothing will ever dequeue again.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("ingress queue closed")]
pub struct IngressClosed;

pub fn channel(capacity: NonZeroUsize) -> (IngressSender, IngressReceiver) {
    let (tx, rx) = mpsc::channel(capacity.get());
    (IngressSender { tx }, IngressReceiver { rx })
}

/// Producer half; cloned once per receiver task.
#[derive(Clone)]
pub struct IngressSender {
    tx: mpsc::Sender<ChatMessage>,
}

impl IngressSender {
    /// Waits for a free slot, then appends `message`.
    pub async fn enqueue(&self, message: ChatMessage) -> Result<(), IngressClosed> {
        self.tx.send(message).await.map_err(|_| IngressClosed)
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

/// Consumer half, owned by the broadcaster.
pub struct IngressReceiver {
    rx: mpsc::Receiver<ChatMessage>,
}

impl IngressReceiver {
    /// Next message in arrival order. `None` once every sender is dropped and
    /// the queue has drained.
    pub async fn dequeue(&mut self) -> Option<ChatMessage> {
        self.rx.recv().await
    }
}
