use std::{
    net::{Ipv4Addr, SocketAddr},
    num::NonZeroUsize,
    time::Duration,
};

use crate::message::DEFAULT_MAX_FRAME_LENGTH;

pub const DEFAULT_INGRESS_CAPACITY: NonZeroUsize = NonZeroUsize::new(100).unwrap();
pub const DEFAULT_OUTBOUND_CAPACITY: NonZeroUsize = NonZeroUsize::new(64).unwrap();
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Runtime settings for [`crate::server::Server`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind. Port 0 lets the OS pick one.
    pub listen: SocketAddr,
    /// Messages the ingress queue holds before receivers block.
    pub ingress_capacity: NonZeroUsize,
    /// Messages buffered per stream between the broadcaster and the socket writer.
    pub outbound_capacity: NonZeroUsize,
    /// Upper bound on one send into a stream's outbound buffer.
    pub send_timeout: Duration,
    pub max_frame_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            ingress_capacity: DEFAULT_INGRESS_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}
