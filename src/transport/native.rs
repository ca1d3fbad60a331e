//! Selector for the platform's native back end.

use std::sync::Arc;

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

/// Opens channels for `epoll` or `kqueue` and starts loop groups for them.
#[derive(Clone, Copy, Debug)]
pub struct NativeSelector {
    backend: Backend,
}

impl NativeSelector {
    /// Selector for the current platform's native back end, if any.
    #[must_use]
    pub fn detect() -> Option<Self> { Backend::native().map(|backend| Self { backend }) }
}

impl TransportSelector for NativeSelector {
    fn name(&self) -> &'static str { self.backend.name() }

    fn backend(&self) -> Backend { self.backend }

    fn channel(
        &self,
        kind: ChannelKind,
        event_loop: &dyn EventLoop,
        family: AddressFamily,
    ) -> Result<Option<BackendChannel>, TransportError> {
        match kind {
            ChannelKind::ClientSocket | ChannelKind::Datagram => {
                open_channel(self.backend, kind, family, event_loop, None)
            }
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
        open_channel(self.backend, kind, family, event_loop, child_group)
    }

    fn new_event_loop_group(
        &self,
        threads: usize,
        factory: ThreadFactory,
    ) -> Result<EventLoopGroup, TransportError> {
        EventLoopGroup::start(threads, factory, self.backend)
    }
}
