//! The multiplexed connection carrying bridged streams.
//!
//! `ParentConnection` caches the per-connection facts every stream needs (the
//! secured flag and the resolved remote address) and keeps a registry of live
//! streams. The registry stores weak references so a finished stream is freed
//! even if nobody deregisters it; dead entries are pruned at lookup time.

use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock, Weak},
};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::StreamChannel;
use crate::{
    connection::ConnectionId,
    pipeline::{HandlerRole, SharedPipeline},
};

/// Identifier of a stream within its parent connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u32);

impl StreamId {
    /// Wrap a raw stream identifier.
    #[must_use]
    pub fn new(id: u32) -> Self { Self(id) }

    /// Raw identifier.
    #[must_use]
    pub fn as_u32(&self) -> u32 { self.0 }
}

impl From<u32> for StreamId {
    fn from(value: u32) -> Self { Self(value) }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

/// Recovers the client address from a proxy-protocol preamble.
pub trait ProxyProtocolResolver: Send + Sync + 'static {
    /// Address announced by the proxy for `parent`, if any.
    fn resolve_remote_address(&self, parent: &ParentConnection) -> Option<SocketAddr>;
}

impl<F> ProxyProtocolResolver for F
where
    F: Fn(&ParentConnection) -> Option<SocketAddr> + Send + Sync + 'static,
{
    fn resolve_remote_address(&self, parent: &ParentConnection) -> Option<SocketAddr> { self(parent) }
}

/// Resolver returning the address recorded by the preamble decoder.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreambleResolver;

impl ProxyProtocolResolver for PreambleResolver {
    fn resolve_remote_address(&self, parent: &ParentConnection) -> Option<SocketAddr> {
        parent.proxied_address()
    }
}

/// Underlying connection shared by every stream bridged from it.
pub struct ParentConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    proxied_addr: Option<SocketAddr>,
    pipeline: SharedPipeline,
    secured: OnceLock<bool>,
    remote: OnceLock<SocketAddr>,
    streams: DashMap<StreamId, Weak<StreamChannel>>,
    shutdown: CancellationToken,
}

impl ParentConnection {
    /// A connection to `peer_addr` with an empty pipeline.
    #[must_use]
    pub fn new(peer_addr: SocketAddr) -> Self {
        Self {
            id: ConnectionId::next(),
            peer_addr,
            proxied_addr: None,
            pipeline: SharedPipeline::new(),
            secured: OnceLock::new(),
            remote: OnceLock::new(),
            streams: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Use `pipeline` as the connection's processing chain.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: SharedPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Record the client address decoded from a proxy-protocol preamble.
    #[must_use]
    pub fn with_proxied_address(mut self, addr: SocketAddr) -> Self {
        self.proxied_addr = Some(addr);
        self
    }

    /// Identity of the connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    /// Peer address reported by the transport.
    #[must_use]
    pub fn peer_address(&self) -> SocketAddr { self.peer_addr }

    /// Address announced by a proxy-protocol preamble, if one was decoded.
    #[must_use]
    pub fn proxied_address(&self) -> Option<SocketAddr> { self.proxied_addr }

    /// Processing chain of the connection.
    #[must_use]
    pub fn pipeline(&self) -> &SharedPipeline { &self.pipeline }

    /// Returns `true` if the pipeline terminates TLS.
    ///
    /// Evaluated on first use and cached for the connection's lifetime.
    pub fn is_secured(&self) -> bool {
        *self
            .secured
            .get_or_init(|| self.pipeline.lock().contains_role(HandlerRole::Tls))
    }

    /// Remote address of the client, resolved once per connection.
    ///
    /// `resolver` runs at most once; when it yields nothing the transport's
    /// peer address is used.
    pub fn remote_address(&self, resolver: &dyn ProxyProtocolResolver) -> SocketAddr {
        *self
            .remote
            .get_or_init(|| resolver.resolve_remote_address(self).unwrap_or(self.peer_addr))
    }

    /// Live stream registered under `id`.
    pub fn stream(&self, id: StreamId) -> Option<Arc<StreamChannel>> {
        let guard = self.streams.get(&id);
        let stream = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        if stream.is_none() {
            self.streams.remove_if(&id, |_, weak| weak.strong_count() == 0);
        }
        stream
    }

    pub(super) fn register(&self, id: StreamId, stream: &Arc<StreamChannel>) {
        self.streams.insert(id, Arc::downgrade(stream));
    }

    pub(super) fn deregister(&self, id: StreamId) { self.streams.remove(&id); }

    /// Prune dead entries, then return the identifiers of live streams.
    #[must_use]
    pub fn active_streams(&self) -> Vec<StreamId> {
        let mut ids = Vec::with_capacity(self.streams.len());
        self.streams.retain(|id, weak| {
            if weak.strong_count() > 0 {
                ids.push(*id);
                true
            } else {
                false
            }
        });
        ids.sort_unstable();
        ids
    }

    /// Token cancelled when the connection closes.
    #[must_use]
    pub fn termination(&self) -> CancellationToken { self.shutdown.clone() }

    /// Close the connection and every stream bridged from it.
    pub fn close(&self) { self.shutdown.cancel(); }
}

impl std::fmt::Debug for ParentConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParentConnection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("streams", &self.streams.len())
            .finish_non_exhaustive()
    }
}
