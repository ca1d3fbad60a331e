//! Hooks run around header emission.
//!
//! [`ExchangeHooks`] stores the optional callbacks an exchange invokes, while
//! [`ExchangeProtocol`] is the trait applications implement to supply them.

use std::sync::Arc;

use super::ExchangeId;
use crate::{error::HookError, message::MessageHead};

/// Protocol-specific behaviour around header emission.
pub trait ExchangeProtocol: Send + Sync + 'static {
    /// Called once, on the sender that won the right to emit headers, before
    /// any byte reaches the connection. This is the last point at which the
    /// outbound head may be changed.
    ///
    /// Returning an error aborts the send: buffered body data is disposed and
    /// nothing is written.
    fn before_headers(&self, _head: &mut MessageHead) -> Result<(), HookError> { Ok(()) }

    /// Called once after the connection acknowledged the header frame.
    fn on_headers_sent(&self, _id: &ExchangeId) {}
}

/// Type alias for the `before_headers` callback.
type BeforeHeadersHook =
    Box<dyn FnMut(&mut MessageHead) -> Result<(), HookError> + Send + 'static>;

/// Type alias for the `on_headers_sent` callback.
type HeadersSentHook = Box<dyn FnMut(&ExchangeId) + Send + 'static>;

/// Callbacks used by an exchange.
#[derive(Default)]
pub struct ExchangeHooks {
    /// Invoked before headers are written.
    pub before_headers: Option<BeforeHeadersHook>,
    /// Invoked once headers were acknowledged.
    pub on_headers_sent: Option<HeadersSentHook>,
}

impl ExchangeHooks {
    /// Run the `before_headers` hook if registered.
    ///
    /// # Errors
    ///
    /// Propagates the hook's error.
    pub fn before_headers(&mut self, head: &mut MessageHead) -> Result<(), HookError> {
        match &mut self.before_headers {
            Some(hook) => hook(head),
            None => Ok(()),
        }
    }

    /// Run the `on_headers_sent` hook if registered.
    pub fn on_headers_sent(&mut self, id: &ExchangeId) {
        if let Some(hook) = &mut self.on_headers_sent {
            hook(id);
        }
    }

    /// Construct hooks from an [`ExchangeProtocol`] implementation.
    pub fn from_protocol<P>(protocol: &Arc<P>) -> Self
    where
        P: ExchangeProtocol + ?Sized,
    {
        let protocol_before = Arc::clone(protocol);
        let before = Box::new(move |head: &mut MessageHead| protocol_before.before_headers(head))
            as BeforeHeadersHook;

        let protocol_sent = Arc::clone(protocol);
        let sent = Box::new(move |id: &ExchangeId| protocol_sent.on_headers_sent(id))
            as HeadersSentHook;

        Self {
            before_headers: Some(before),
            on_headers_sent: Some(sent),
        }
    }
}

impl std::fmt::Debug for ExchangeHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeHooks")
            .field("before_headers", &self.before_headers.is_some())
            .field("on_headers_sent", &self.on_headers_sent.is_some())
            .finish()
    }
}
