//! Transport back-end selection.
//!
//! A [`TransportSelector`] maps a requested channel capability and address
//! family to a socket opened for a concrete I/O back end. Three outcomes are
//! kept apart:
//!
//! - `Ok(Some(channel))`: the combination is served.
//! - `Ok(None)`: the combination is valid but not available here; callers
//!   fall back to another selector.
//! - `Err(TransportError::UnsupportedChannelType)`: the capability was asked
//!   of the wrong entry point, a programming error.

mod native;
mod portable;

use std::{
    fmt,
    io,
    sync::{
        Arc,
        LazyLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use socket2::{Domain, Socket, Type};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

pub use self::{native::NativeSelector, portable::PortableSelector};
use crate::error::TransportError;

/// Capability a channel must provide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Outbound stream socket.
    ClientSocket,
    /// Listening stream socket.
    ServerSocket,
    /// Connectionless datagram socket.
    Datagram,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ClientSocket => "client-socket",
            Self::ServerSocket => "server-socket",
            Self::Datagram => "datagram",
        })
    }
}

/// Address family of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// IPv4.
    Inet,
    /// IPv6.
    Inet6,
    /// Unix domain sockets.
    Unix,
}

/// I/O back end driving a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Readiness polling available on every platform.
    Portable,
    /// Linux `epoll`.
    Epoll,
    /// BSD and macOS `kqueue`.
    KQueue,
}

impl Backend {
    /// Native back end of the current platform, if there is one.
    #[must_use]
    pub fn native() -> Option<Self> {
        if cfg!(any(target_os = "linux", target_os = "android")) {
            Some(Self::Epoll)
        } else if cfg!(any(
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "netbsd",
            target_os = "openbsd",
            target_os = "dragonfly"
        )) {
            Some(Self::KQueue)
        } else {
            None
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Portable => "portable",
            Self::Epoll => "epoll",
            Self::KQueue => "kqueue",
        }
    }
}

/// An event loop channels can be registered with.
pub trait EventLoop: Send + Sync {
    /// Returns `true` if channels of `backend` can run on this loop.
    fn is_compatible(&self, backend: Backend) -> bool;
}

/// Event loop backed by a tokio runtime.
///
/// A loop created by a native selector runs both native and portable
/// channels; a portable loop runs portable channels only.
#[derive(Clone, Debug)]
pub struct TokioEventLoop {
    handle: Handle,
    backend: Backend,
}

impl TokioEventLoop {
    /// Wrap `handle` as a loop of `backend`.
    #[must_use]
    pub fn new(handle: Handle, backend: Backend) -> Self { Self { handle, backend } }

    /// The loop of the runtime the caller is running on.
    #[must_use]
    pub fn current(backend: Backend) -> Option<Self> {
        Handle::try_current().ok().map(|handle| Self::new(handle, backend))
    }

    /// Runtime handle of the loop.
    #[must_use]
    pub fn handle(&self) -> &Handle { &self.handle }

    /// Back end the loop was created for.
    #[must_use]
    pub fn backend(&self) -> Backend { self.backend }
}

impl EventLoop for TokioEventLoop {
    fn is_compatible(&self, backend: Backend) -> bool {
        backend == self.backend || backend == Backend::Portable
    }
}

/// Names worker threads by index.
pub type ThreadFactory = Arc<dyn Fn(usize) -> String + Send + Sync>;

/// Pool of worker threads running event loops.
pub struct EventLoopGroup {
    runtime: Runtime,
    backend: Backend,
    threads: usize,
}

impl EventLoopGroup {
    fn start(threads: usize, factory: ThreadFactory, backend: Backend) -> Result<Self, TransportError> {
        let threads = threads.max(1);
        let counter = AtomicUsize::new(0);
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name_fn(move || factory(counter.fetch_add(1, Ordering::Relaxed)))
            .enable_all()
            .build()
            .map_err(TransportError::Runtime)?;
        debug!(backend = backend.name(), threads, "event loop group started");
        Ok(Self {
            runtime,
            backend,
            threads,
        })
    }

    /// An event loop running on this group.
    #[must_use]
    pub fn event_loop(&self) -> TokioEventLoop {
        TokioEventLoop::new(self.runtime.handle().clone(), self.backend)
    }

    /// Runtime handle of the group.
    #[must_use]
    pub fn handle(&self) -> &Handle { self.runtime.handle() }

    /// Number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize { self.threads }

    /// Back end the group serves.
    #[must_use]
    pub fn backend(&self) -> Backend { self.backend }

    /// Stop the group without waiting for running tasks.
    pub fn shutdown(self) { self.runtime.shutdown_background(); }
}

impl fmt::Debug for EventLoopGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoopGroup")
            .field("backend", &self.backend)
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}

/// A capability request resolved by [`TransportSelector::resolve`].
#[derive(Clone, Debug)]
pub struct ChannelRequest {
    /// Requested capability.
    pub kind: ChannelKind,
    /// Preferred address family.
    pub family: AddressFamily,
    /// Group running the children accepted by a server socket.
    pub child_group: Option<Arc<EventLoopGroup>>,
}

impl ChannelRequest {
    /// A request for `kind` over `family`.
    #[must_use]
    pub fn new(kind: ChannelKind, family: AddressFamily) -> Self {
        Self {
            kind,
            family,
            child_group: None,
        }
    }

    /// Run accepted children on `group`.
    #[must_use]
    pub fn with_child_group(mut self, group: Arc<EventLoopGroup>) -> Self {
        self.child_group = Some(group);
        self
    }
}

/// An unbound, non-blocking socket opened for a back end.
#[derive(Debug)]
pub struct BackendChannel {
    kind: ChannelKind,
    family: AddressFamily,
    backend: Backend,
    socket: Socket,
    child_group: Option<Arc<EventLoopGroup>>,
}

impl BackendChannel {
    /// Capability of the channel.
    #[must_use]
    pub fn kind(&self) -> ChannelKind { self.kind }

    /// Address family of the channel.
    #[must_use]
    pub fn family(&self) -> AddressFamily { self.family }

    /// Back end the channel was opened for.
    #[must_use]
    pub fn backend(&self) -> Backend { self.backend }

    /// The underlying socket.
    #[must_use]
    pub fn socket(&self) -> &Socket { &self.socket }

    /// Group running accepted children, for server sockets.
    #[must_use]
    pub fn child_group(&self) -> Option<&Arc<EventLoopGroup>> { self.child_group.as_ref() }

    /// Take ownership of the socket.
    #[must_use]
    pub fn into_socket(self) -> Socket { self.socket }
}

/// Resolves channel capabilities to back-end channels.
pub trait TransportSelector: Send + Sync {
    /// Short name of the selector.
    fn name(&self) -> &'static str;

    /// Back end whose channels the selector opens.
    fn backend(&self) -> Backend;

    /// Open a client or datagram channel on `event_loop`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnsupportedChannelType`] for server sockets
    /// and [`TransportError::Open`] if the socket cannot be created.
    fn channel(
        &self,
        kind: ChannelKind,
        event_loop: &dyn EventLoop,
        family: AddressFamily,
    ) -> Result<Option<BackendChannel>, TransportError>;

    /// Open a server channel on `event_loop`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnsupportedChannelType`] for anything but
    /// server sockets and [`TransportError::Open`] if the socket cannot be
    /// created.
    fn server_channel(
        &self,
        kind: ChannelKind,
        event_loop: &dyn EventLoop,
        child_group: Option<Arc<EventLoopGroup>>,
        family: AddressFamily,
    ) -> Result<Option<BackendChannel>, TransportError>;

    /// Start a group of `threads` event loops named by `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MissingNativeBackend`] if the selector cannot
    /// run its own loops, or [`TransportError::Runtime`] if starting failed.
    fn new_event_loop_group(
        &self,
        threads: usize,
        factory: ThreadFactory,
    ) -> Result<EventLoopGroup, TransportError>;

    /// Dispatch `request` to [`TransportSelector::channel`] or
    /// [`TransportSelector::server_channel`].
    ///
    /// # Errors
    ///
    /// See the two entry points.
    fn resolve(
        &self,
        request: &ChannelRequest,
        event_loop: &dyn EventLoop,
    ) -> Result<Option<BackendChannel>, TransportError> {
        match request.kind {
            ChannelKind::ServerSocket => self.server_channel(
                request.kind,
                event_loop,
                request.child_group.clone(),
                request.family,
            ),
            ChannelKind::ClientSocket | ChannelKind::Datagram => {
                self.channel(request.kind, event_loop, request.family)
            }
        }
    }
}

/// Open a channel for `backend` if `event_loop` can run it.
fn open_channel(
    backend: Backend,
    kind: ChannelKind,
    family: AddressFamily,
    event_loop: &dyn EventLoop,
    child_group: Option<Arc<EventLoopGroup>>,
) -> Result<Option<BackendChannel>, TransportError> {
    if !event_loop.is_compatible(backend) {
        debug!(backend = backend.name(), %kind, "event loop incompatible");
        return Ok(None);
    }
    let socket = open_socket(kind, family).map_err(|source| TransportError::Open { kind, source })?;
    debug!(backend = backend.name(), %kind, ?family, "channel opened");
    Ok(Some(BackendChannel {
        kind,
        family,
        backend,
        socket,
        child_group,
    }))
}

fn open_socket(kind: ChannelKind, family: AddressFamily) -> io::Result<Socket> {
    let domain = match family {
        AddressFamily::Inet => Domain::IPV4,
        AddressFamily::Inet6 => Domain::IPV6,
        #[cfg(unix)]
        AddressFamily::Unix => Domain::UNIX,
        #[cfg(not(unix))]
        AddressFamily::Unix => {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix domain sockets are not available",
            ));
        }
    };
    let ty = match kind {
        ChannelKind::Datagram => Type::DGRAM,
        ChannelKind::ClientSocket | ChannelKind::ServerSocket => Type::STREAM,
    };
    let socket = Socket::new(domain, ty, None)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

static DEFAULT_SELECTOR: LazyLock<Arc<dyn TransportSelector>> =
    LazyLock::new(|| -> Arc<dyn TransportSelector> {
        match NativeSelector::detect() {
            Some(native) => Arc::new(native),
            None => Arc::new(PortableSelector),
        }
    });

/// Process-wide selector: the native one where available, else portable.
#[must_use]
pub fn default_selector() -> Arc<dyn TransportSelector> { Arc::clone(&DEFAULT_SELECTOR) }
