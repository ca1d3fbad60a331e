//! In-memory connection backed by a bounded channel.

use std::{
    io,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Connection, ConnectionId, closed_error};
use crate::{
    message::{HttpObject, Outbound},
    pipeline::SharedPipeline,
};

/// Non-multiplexed connection delivering framed objects to a receiver.
///
/// The receiver plays the role of the HTTP/1 object encoder: raw payloads are
/// framed as content before they reach it. A write is acknowledged once the
/// object is queued, so a full queue applies backpressure to the exchange.
pub struct ChannelConnection {
    id: ConnectionId,
    tx: mpsc::Sender<HttpObject>,
    shutdown: CancellationToken,
    pipeline: SharedPipeline,
    exchanges: AtomicU64,
    persistent: bool,
}

impl ChannelConnection {
    /// Create a connection whose writes are queued on a channel of `capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<HttpObject>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: ConnectionId::next(),
            tx,
            shutdown: CancellationToken::new(),
            pipeline: SharedPipeline::new(),
            exchanges: AtomicU64::new(0),
            persistent: true,
        };
        (connection, rx)
    }

    /// Mark the connection as closing after a single exchange.
    #[must_use]
    pub fn non_persistent(mut self) -> Self {
        self.persistent = false;
        self
    }

    /// Terminate the connection. Subsequent writes fail.
    pub fn close(&self) { self.shutdown.cancel(); }
}

#[async_trait]
impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId { self.id }

    fn is_active(&self) -> bool { !self.shutdown.is_cancelled() && !self.tx.is_closed() }

    async fn write_and_flush(&self, message: Outbound) -> io::Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(closed_error());
        }
        let object = match message {
            Outbound::Payload(payload) => HttpObject::Content(payload),
            Outbound::Object(object) => object,
        };
        self.tx.send(object).await.map_err(|_| closed_error())
    }

    fn termination(&self) -> CancellationToken { self.shutdown.clone() }

    fn pipeline(&self) -> &SharedPipeline { &self.pipeline }

    fn next_exchange_seq(&self) -> u64 { self.exchanges.fetch_add(1, Ordering::Relaxed) + 1 }

    fn is_persistent(&self) -> bool { self.persistent }
}
