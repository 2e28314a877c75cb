use std::{
    future::Future,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::SinkExt;
use tokio::{
    io::AsyncWrite,
    net::{TcpListener, TcpStream},
    select,
    sync::mpsc::{self, error::SendTimeoutError},
    task::{JoinError, JoinSet},
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};
use tracing::{debug, info, warn};

use crate::{
    broadcaster::Broadcaster,
    config::ServerConfig,
    error::SendError,
    ingress::{self, IngressSender},
    message::{ChatCodec, ChatMessage},
    receiver::run_receiver,
    registry::{Registry, StreamId, Subscriber, SubscriberRef},
};

/// Accepts streams and relays every message to every connected stream.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    registry: Arc<Registry>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("failed to bind {}", config.listen))?;
        Ok(Self {
            listener,
            config,
            registry: Arc::new(Registry::new()),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared view of the live streams.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Serves until `shutdown` resolves, then cancels every stream and lets
    /// the broadcaster drain what was already queued.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            config,
            registry,
        } = self;
        tokio::pin!(shutdown);

        let (ingress, ingress_rx) = ingress::channel(config.ingress_capacity);
        let broadcaster = tokio::spawn(Broadcaster::new(ingress_rx, Arc::clone(&registry)).run());

        let state = Arc::new(RelayState {
            registry,
            ingress,
            config,
            cancel: CancellationToken::new(),
            next_id: AtomicU64::new(1),
        });
        let mut streams = JoinSet::new();

        loop {
            select! {
                _ = &mut shutdown => break,
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &state, &mut streams);
                }
                Some(joined) = streams.join_next(), if !streams.is_empty() => {
                    log_join_error(joined);
                }
            }
        }

        info!("server shutting down");
        drop(listener);
        state.cancel.cancel();
        while let Some(joined) = streams.join_next().await {
            log_join_error(joined);
        }

        // The last ingress sender goes with the state, which lets the broadcaster finish.
        drop(state);
        let broadcasts = broadcaster.await.context("broadcaster task failed")?;
        info!(broadcasts, "broadcaster drained");
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

struct RelayState {
    registry: Arc<Registry>,
    ingress: IngressSender,
    config: ServerConfig,
    cancel: CancellationToken,
    next_id: AtomicU64,
}

impl RelayState {
    fn next_id(&self) -> StreamId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    state: &Arc<RelayState>,
    streams: &mut JoinSet<()>,
) {
    match result {
        Ok((stream, peer)) => {
            let state = Arc::clone(state);
            streams.spawn(handle_stream(stream, peer, state));
        }
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn log_join_error(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        warn!(error = ?err, "stream task failed");
    }
}

async fn handle_stream(stream: TcpStream, peer: SocketAddr, state: Arc<RelayState>) {
    let stream_id = state.next_id();
    if let Err(err) = stream.set_nodelay(true) {
        debug!(stream_id, error = ?err, "failed to set TCP_NODELAY");
    }

    let (reader, writer) = stream.into_split();
    let inbound = FramedRead::new(reader, ChatCodec::new(state.config.max_frame_length));
    let outbound = FramedWrite::new(writer, ChatCodec::new(state.config.max_frame_length));

    let (outbound_tx, outbound_rx) = mpsc::channel(state.config.outbound_capacity.get());
    tokio::spawn(run_writer(stream_id, outbound_rx, outbound));

    let handle: SubscriberRef = Arc::new(StreamHandle {
        id: stream_id,
        outbound: outbound_tx,
        send_timeout: state.config.send_timeout,
    });
    debug!(stream_id, %peer, "stream accepted");

    let exit = run_receiver(handle, inbound, &state.registry, &state.ingress, &state.cancel).await;
    if exit.is_clean() {
        info!(stream_id, %peer, reason = %exit, "stream ended");
    } else {
        warn!(stream_id, %peer, error = %exit, "stream failed");
    }
}

/// Drains a stream's outbound buffer onto the socket. Ends when every handle
/// is dropped or a write fails; the latter makes later sends report `Closed`.
async fn run_writer<W>(
    stream_id: StreamId,
    mut outbound: mpsc::Receiver<ChatMessage>,
    mut sink: FramedWrite<W, ChatCodec>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        if let Err(err) = sink.send(message).await {
            debug!(stream_id, error = ?err, "write to stream failed");
            return;
        }
    }

    if let Err(err) = sink.close().await {
        debug!(stream_id, error = ?err, "failed to close stream writer cleanly");
    }
}

/// The broadcaster's view of one accepted stream.
struct StreamHandle {
    id: StreamId,
    outbound: mpsc::Sender<ChatMessage>,
    send_timeout: Duration,
}

#[async_trait]
impl Subscriber for StreamHandle {
    fn id(&self) -> StreamId {
        self.id
    }

    async fn send(&self, message: &ChatMessage) -> Result<(), SendError> {
        self.outbound
            .send_timeout(message.clone(), self.send_timeout)
            .await
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => SendError::Timeout,
                SendTimeoutError::Closed(_) => SendError::Closed,
            })
    }
}
