//! Selector for the portable back end.

use std::sync::Arc;

use tracing::debug;

use super::{
    AddressFamily,
    Backend,
    BackendChannel,
    ChannelKind,
    EventLoop,
    EventLoopGroup,
    ThreadFactory,
    TransportSelector,
    open_channel,
};
use crate::error::TransportError;

/// Opens portable channels on loops owned by someone else.
///
/// The portable back end never starts its own loops and has no Unix-domain
/// datagram support.
#[derive(Clone, Copy, Debug, Default)]
pub struct PortableSelector;

impl TransportSelector for PortableSelector {
    fn name(&self) -> &'static str { "portable" }

    fn backend(&self) -> Backend { Backend::Portable }

    fn channel(
        &self,
        kind: ChannelKind,
        event_loop: &dyn EventLoop,
        family: AddressFamily,
    ) -> Result<Option<BackendChannel>, TransportError> {
        match kind {
            ChannelKind::ClientSocket => open_channel(Backend::Portable, kind, family, event_loop, None),
            ChannelKind::Datagram if family == AddressFamily::Unix => {
                debug!(%kind, "portable datagram channels do not support unix domain sockets");
                Ok(None)
            }
            ChannelKind::Datagram => open_channel(Backend::Portable, kind, family, event_loop, None),
            ChannelKind::ServerSocket => Err(TransportError::UnsupportedChannelType(kind)),
        }
    }

    fn server_channel(
        &self,
        kind: ChannelKind,
        event_loop: &dyn EventLoop,
        child_group: Option<Arc<EventLoopGroup>>,
        family: AddressFamily,
    ) -> Result<Option<BackendChannel>, TransportError> {
        if kind != ChannelKind::ServerSocket {
            return Err(TransportError::UnsupportedChannelType(kind));
        }
        open_channel(Backend::Portable, kind, family, event_loop, child_group)
    }

    fn new_event_loop_group(
        &self,
        _threads: usize,
        _factory: ThreadFactory,
    ) -> Result<EventLoopGroup, TransportError> {
        Err(TransportError::MissingNativeBackend)
    }
}
