//! Byte-sink contract used by exchanges.
//!
//! A [`Connection`] is owned by the transport layer. Exchanges borrow it for
//! the duration of one request/response cycle: they query whether it is still
//! active, write framed objects through it and subscribe to its termination.
//! [`ChannelConnection`] is the in-memory implementation backing
//! non-multiplexed transports; bridged HTTP/2 streams implement the same trait
//! in [`crate::bridge`].

mod channel;
mod id;

use std::io;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use self::{channel::ChannelConnection, id::ConnectionId};
use crate::{message::Outbound, pipeline::SharedPipeline};

/// An active channel as seen by an exchange.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Identity of the channel.
    fn id(&self) -> ConnectionId;

    /// Returns `true` while writes can still reach the peer.
    fn is_active(&self) -> bool;

    /// Write `message` and resolve once the transport acknowledged it.
    ///
    /// A connection with nothing to write completes immediately with `Ok`.
    async fn write_and_flush(&self, message: Outbound) -> io::Result<()>;

    /// Token cancelled when the connection terminates.
    fn termination(&self) -> CancellationToken;

    /// Processing chain of the channel.
    fn pipeline(&self) -> &SharedPipeline;

    /// Next value of the per-connection exchange counter, starting at 1.
    fn next_exchange_seq(&self) -> u64;

    /// Returns `true` if the channel outlives a single exchange.
    fn is_persistent(&self) -> bool { true }
}

pub(crate) fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "connection closed")
}
