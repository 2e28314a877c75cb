//! Multi-user chat relay over length-prefixed protobuf frames.
//!
//! See `README.md` for usage and `proto/chat.proto` for the wire schema.
//! Every message received on any stream is rebroadcast to every stream that
//! is connected at that moment, the sender included.
//!
//! Data flows wire → [`receiver`] → [`ingress`] → [`broadcaster`] → wire:
//!
//! - [`server`] accepts TCP streams and spawns one receiver and one socket
//!   writer per stream.
//! - [`receiver`] joins the [`registry`], pushes each inbound message into the
//!   ingress queue, and leaves the registry when its stream ends.
//! - [`ingress`] is the bounded FIFO that blocks receivers when the
//!   broadcaster falls behind.
//! - [`broadcaster`] drains the queue and hands each message to every
//!   registered stream.
//! - [`client`] is the terminal front end: prompt for a name, send stdin
//!   lines, print everyone else's messages.
//! - [`message`] defines the record and its frame codec; [`cli`] and
//!   [`config`] cover the command line and server settings.

pub mod broadcaster;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod ingress;
pub mod message;
pub mod receiver;
pub mod registry;
pub mod server;
