//! A single multiplexed stream presented as a [`Connection`].

use std::{
    io,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ParentConnection, ReadDemand, StreamId};
use crate::{
    config::StreamConfig,
    connection::{Connection, ConnectionId, closed_error},
    message::{HttpObject, Outbound},
    pipeline::SharedPipeline,
};

/// Stream-scoped connection handed to exchanges created by the bridge.
///
/// Outbound objects are queued towards the HTTP/2 stream codec. Writing the
/// last object of a response clears the pending marker, re-arms read demand
/// and then tears down the stream's bookkeeping whether or not the write
/// succeeded.
pub struct StreamChannel {
    id: ConnectionId,
    stream_id: StreamId,
    parent: Arc<ParentConnection>,
    outbound: mpsc::Sender<HttpObject>,
    pending: AtomicBool,
    demand: ReadDemand,
    shutdown: CancellationToken,
    pipeline: SharedPipeline,
    exchanges: AtomicU64,
    bound: Mutex<Option<CancellationToken>>,
}

impl StreamChannel {
    /// Open stream `stream_id` on `parent` and register it.
    ///
    /// The receiver yields the objects written to the stream, in order.
    #[must_use]
    pub fn new(
        parent: &Arc<ParentConnection>,
        stream_id: StreamId,
        config: &StreamConfig,
    ) -> (Arc<Self>, mpsc::Receiver<HttpObject>) {
        let (tx, rx) = mpsc::channel(config.outbound_capacity.max(1));
        let stream = Arc::new(Self {
            id: ConnectionId::next(),
            stream_id,
            parent: Arc::clone(parent),
            outbound: tx,
            pending: AtomicBool::new(false),
            demand: ReadDemand::new(),
            shutdown: parent.termination().child_token(),
            pipeline: SharedPipeline::new(),
            exchanges: AtomicU64::new(0),
            bound: Mutex::new(None),
        });
        parent.register(stream_id, &stream);
        (stream, rx)
    }

    /// Identifier of the stream within its parent.
    #[must_use]
    pub fn stream_id(&self) -> StreamId { self.stream_id }

    /// Connection the stream is multiplexed on.
    #[must_use]
    pub fn parent(&self) -> &Arc<ParentConnection> { &self.parent }

    /// Returns `true` while a request awaits its complete response.
    #[must_use]
    pub fn is_pending(&self) -> bool { self.pending.load(Ordering::Acquire) }

    /// Read pacing of the stream.
    #[must_use]
    pub fn demand(&self) -> &ReadDemand { &self.demand }

    /// Set the pending marker. Returns `false` if it was already set.
    pub(super) fn mark_pending(&self) -> bool {
        self.pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(super) fn clear_pending(&self) { self.pending.store(false, Ordering::Release); }

    /// Tie the lifetime of the current exchange to this stream.
    pub(super) fn bind_exchange(&self, termination: CancellationToken) {
        *self.bound.lock().unwrap_or_else(PoisonError::into_inner) = Some(termination);
    }

    /// Close the stream. Pending writes fail and the bridge driver stops.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.terminate();
    }

    fn terminate(&self) {
        let bound = self.bound.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(token) = bound {
            token.cancel();
        }
        self.parent.deregister(self.stream_id);
    }

    async fn queue(&self, object: HttpObject) -> io::Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(closed_error());
        }
        self.outbound.send(object).await.map_err(|_| closed_error())
    }
}

#[async_trait]
impl Connection for StreamChannel {
    fn id(&self) -> ConnectionId { self.id }

    fn is_active(&self) -> bool { !self.shutdown.is_cancelled() && !self.outbound.is_closed() }

    async fn write_and_flush(&self, message: Outbound) -> io::Result<()> {
        let object = match message {
            Outbound::Payload(payload) => HttpObject::Content(payload),
            Outbound::Object(object) => object,
        };
        if !object.is_last() {
            return self.queue(object).await;
        }
        self.clear_pending();
        self.demand.request();
        let result = self.queue(object).await;
        match &result {
            Ok(()) => debug!(
                "Last HTTP packet was sent, terminating the channel: stream={}",
                self.stream_id
            ),
            Err(e) => debug!(
                "Sending last HTTP packet was not successful, terminating the channel: stream={} \
                 error={e}",
                self.stream_id
            ),
        }
        self.terminate();
        result
    }

    fn termination(&self) -> CancellationToken { self.shutdown.clone() }

    fn pipeline(&self) -> &SharedPipeline { &self.pipeline }

    fn next_exchange_seq(&self) -> u64 { self.exchanges.fetch_add(1, Ordering::Relaxed) + 1 }
}

impl std::fmt::Debug for StreamChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamChannel")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}
