use std::{net::SocketAddr, num::NonZeroUsize, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{
    config::{
        DEFAULT_INGRESS_CAPACITY, DEFAULT_OUTBOUND_CAPACITY, DEFAULT_SEND_TIMEOUT, ServerConfig,
    },
    message::DEFAULT_MAX_FRAME_LENGTH,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay, rebroadcasting every message to every connected client.
    Server(ServerArgs),
    /// Connect to a relay and chat from standard input.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address to bind. Port 0 picks a free port.
    #[arg(long, default_value = "127.0.0.1:0")]
    pub listen: SocketAddr,

    /// Messages queued for the broadcaster before receivers block.
    #[arg(long, default_value_t = DEFAULT_INGRESS_CAPACITY)]
    pub ingress_capacity: NonZeroUsize,

    /// Messages buffered per client ahead of its socket.
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_CAPACITY)]
    pub outbound_capacity: NonZeroUsize,

    /// Longest a single delivery may wait on a full client buffer.
    #[arg(
        long,
        default_value_t = DEFAULT_SEND_TIMEOUT.as_millis() as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub send_timeout_ms: u64,

    /// Largest accepted frame payload, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LENGTH)]
    pub max_frame_length: usize,
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        Self {
            listen: args.listen,
            ingress_capacity: args.ingress_capacity,
            outbound_capacity: args.outbound_capacity,
            send_timeout: Duration::from_millis(args.send_timeout_ms),
            max_frame_length: args.max_frame_length,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Relay address in the form host:port.
    #[arg(
        long = "server_addr",
        visible_alias = "server-addr",
        default_value = "127.0.0.1:1000"
    )]
    pub server_addr: String,
}
