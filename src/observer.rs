//! Connection lifecycle notifications.
//!
//! Listeners receive a [`LifecycleEvent`] for every state change of a
//! connection or exchange. The event is a closed set: matching on it
//! exhaustively documents every state a connection can occupy.

use std::sync::{Arc, LazyLock};

use crate::{connection::Connection, exchange::Exchange};

/// Symbolic lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// The channel is connected.
    Connected,
    /// The channel was acquired from a pool.
    Acquired,
    /// An exchange is ready for application logic.
    Configured,
    /// An inbound request could not be decoded and was answered with an error.
    RequestDecodingFailed,
    /// The channel was released back to its pool.
    Released,
    /// The channel is disconnecting.
    Disconnecting,
}

/// A state change together with its subject.
pub enum LifecycleEvent<C: Connection> {
    /// The channel is connected.
    Connected(Arc<C>),
    /// The channel was acquired from a pool.
    Acquired(Arc<C>),
    /// An exchange was constructed and bound to the channel.
    Configured(Arc<Exchange<C>>),
    /// An inbound request failed to decode on the channel.
    RequestDecodingFailed(Arc<C>),
    /// The channel was released back to its pool.
    Released(Arc<C>),
    /// The channel is disconnecting.
    Disconnecting(Arc<C>),
}

impl<C: Connection> LifecycleEvent<C> {
    /// Symbolic state of this event.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match self {
            Self::Connected(_) => ConnectionState::Connected,
            Self::Acquired(_) => ConnectionState::Acquired,
            Self::Configured(_) => ConnectionState::Configured,
            Self::RequestDecodingFailed(_) => ConnectionState::RequestDecodingFailed,
            Self::Released(_) => ConnectionState::Released,
            Self::Disconnecting(_) => ConnectionState::Disconnecting,
        }
    }

    /// Connection the event refers to.
    #[must_use]
    pub fn connection(&self) -> &Arc<C> {
        match self {
            Self::Configured(exchange) => exchange.connection(),
            Self::Connected(c)
            | Self::Acquired(c)
            | Self::RequestDecodingFailed(c)
            | Self::Released(c)
            | Self::Disconnecting(c) => c,
        }
    }
}

impl<C: Connection> Clone for LifecycleEvent<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Connected(c) => Self::Connected(Arc::clone(c)),
            Self::Acquired(c) => Self::Acquired(Arc::clone(c)),
            Self::Configured(e) => Self::Configured(Arc::clone(e)),
            Self::RequestDecodingFailed(c) => Self::RequestDecodingFailed(Arc::clone(c)),
            Self::Released(c) => Self::Released(Arc::clone(c)),
            Self::Disconnecting(c) => Self::Disconnecting(Arc::clone(c)),
        }
    }
}

impl<C: Connection> std::fmt::Debug for LifecycleEvent<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LifecycleEvent")
            .field(&self.state())
            .field(&self.connection().id())
            .finish()
    }
}

/// Receives lifecycle notifications.
pub trait ConnectionObserver<C: Connection>: Send + Sync + 'static {
    /// Called for every state change.
    fn on_state_change(&self, event: LifecycleEvent<C>);
}

impl<C, F> ConnectionObserver<C> for F
where
    C: Connection,
    F: Fn(LifecycleEvent<C>) + Send + Sync + 'static,
{
    fn on_state_change(&self, event: LifecycleEvent<C>) { self(event); }
}

/// Observer that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyObserver;

impl<C: Connection> ConnectionObserver<C> for EmptyObserver {
    fn on_state_change(&self, _event: LifecycleEvent<C>) {}
}

static EMPTY_OBSERVER: LazyLock<Arc<EmptyObserver>> = LazyLock::new(|| Arc::new(EmptyObserver));

/// Shared observer that ignores every event.
#[must_use]
pub fn empty_observer() -> Arc<EmptyObserver> { Arc::clone(&EMPTY_OBSERVER) }

/// Two observers notified in sequence.
pub struct Then<A, B> {
    first: A,
    second: B,
}

impl<C, A, B> ConnectionObserver<C> for Then<A, B>
where
    C: Connection,
    A: ConnectionObserver<C>,
    B: ConnectionObserver<C>,
{
    fn on_state_change(&self, event: LifecycleEvent<C>) {
        self.first.on_state_change(event.clone());
        self.second.on_state_change(event);
    }
}

/// Composition helpers for observers.
pub trait ObserverExt<C: Connection>: ConnectionObserver<C> + Sized {
    /// Notify `self`, then `next`.
    fn then<B: ConnectionObserver<C>>(self, next: B) -> Then<Self, B> {
        Then {
            first: self,
            second: next,
        }
    }
}

impl<C: Connection, T: ConnectionObserver<C>> ObserverExt<C> for T {}
