use std::io;

use thiserror::Error;

/// Why delivering one message to one subscriber failed.
///
/// The broadcaster logs these and moves on; it never evicts on send failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("outbound buffer stayed full past the send timeout")]
    Timeout,
    #[error("stream writer is gone")]
    Closed,
}

/// Why a per-stream receiver stopped.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The peer ended the stream cleanly.
    #[error("stream closed")]
    Closed,
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),
    #[error("ingress queue closed")]
    IngressClosed,
    #[error("server shutting down")]
    Cancelled,
}

impl StreamError {
    /// True for exits that are part of normal operation rather than faults.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }
}
