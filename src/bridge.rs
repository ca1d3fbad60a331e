//! HTTP/2 stream bridge.
//!
//! Each multiplexed stream is presented as a [`StreamChannel`], a
//! [`Connection`] of its own, so the exchange machinery written for HTTP/1
//! serves HTTP/2 unchanged. A [`StreamBridge`] sits on the inbound side of a
//! stream: it creates one exchange per request frame, keeps at most one
//! exchange pending per stream and paces reads so that a new request is only
//! read once the previous response completed.

mod demand;
mod factory;
mod info;
mod parent;
mod stream;

use std::{pin::pin, sync::Arc};

use futures::{Stream, StreamExt};
use log::debug;
use tokio::{sync::mpsc, task::JoinHandle};

pub use self::{
    demand::ReadDemand,
    factory::{
        DecodingFailureResponder,
        ExchangeFactory,
        ServerExchangeFactory,
        StatusResponder,
        default_factory,
        default_responder,
    },
    info::ConnectionInfo,
    parent::{ParentConnection, PreambleResolver, ProxyProtocolResolver, StreamId},
    stream::StreamChannel,
};
use crate::{
    config::StreamConfig,
    connection::Connection,
    message::HttpObject,
    observer::{ConnectionObserver, LifecycleEvent},
};

/// Inbound adapter for one bridged stream.
pub struct StreamBridge<O> {
    stream: Arc<StreamChannel>,
    observer: Arc<O>,
    factory: Arc<dyn ExchangeFactory>,
    responder: Arc<dyn DecodingFailureResponder>,
    resolver: Arc<dyn ProxyProtocolResolver>,
}

impl<O: ConnectionObserver<StreamChannel>> StreamBridge<O> {
    /// Install a bridge on `stream`, granting read demand for the first frame.
    pub fn new(stream: Arc<StreamChannel>, observer: Arc<O>) -> Self {
        debug!("New HTTP/2 stream: stream={} parent={}", stream.stream_id(), stream.parent().id());
        stream.demand().request();
        Self {
            stream,
            observer,
            factory: default_factory(),
            responder: default_responder(),
            resolver: Arc::new(PreambleResolver),
        }
    }

    /// Use `factory` to build exchanges.
    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn ExchangeFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Use `responder` for requests that fail to decode.
    #[must_use]
    pub fn with_responder(mut self, responder: Arc<dyn DecodingFailureResponder>) -> Self {
        self.responder = responder;
        self
    }

    /// Use `resolver` to recover proxied client addresses.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ProxyProtocolResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Stream this bridge serves.
    #[must_use]
    pub fn stream(&self) -> &Arc<StreamChannel> { &self.stream }

    /// Process one inbound frame.
    ///
    /// Returns the frame to forward downstream, or `None` if it was consumed.
    /// A request frame on an idle stream creates an exchange and notifies the
    /// observer with [`LifecycleEvent::Configured`]; one that fails to decode
    /// is answered by the decoding-failure responder instead. A request frame
    /// on a pending stream is dropped. Any other frame is forwarded while a
    /// request is pending and dropped otherwise.
    pub async fn handle_inbound(&self, frame: HttpObject) -> Option<HttpObject> {
        let Some(request) = frame.request_head() else {
            if self.stream.is_pending() {
                return Some(frame);
            }
            debug!(
                "Dropped HTTP content, since response has been sent already: stream={}",
                self.stream.stream_id()
            );
            drop(frame);
            self.stream.demand().request();
            return None;
        };
        if !self.stream.mark_pending() {
            debug!(
                "request dropped, previous exchange still pending: stream={}",
                self.stream.stream_id()
            );
            return None;
        }
        let parent = self.stream.parent();
        let secured = parent.is_secured();
        let info = ConnectionInfo::from_request(
            request,
            parent.remote_address(self.resolver.as_ref()),
            secured,
        );
        match self.factory.create(&self.stream, request, info) {
            Ok(exchange) => {
                let exchange = Arc::new(exchange);
                self.stream.bind_exchange(exchange.termination());
                self.observer.on_state_change(LifecycleEvent::Configured(exchange));
                Some(frame)
            }
            Err(failure) => {
                self.stream.clear_pending();
                self.responder
                    .respond(&self.stream, self.observer.as_ref(), secured, failure, frame)
                    .await;
                None
            }
        }
    }

    /// Drive the bridge until `frames` ends, the stream closes or
    /// `downstream` is dropped.
    ///
    /// While no request is pending the next frame is read only once read
    /// demand was granted.
    pub async fn run<S>(self, frames: S, downstream: mpsc::Sender<HttpObject>)
    where
        S: Stream<Item = HttpObject> + Send,
    {
        let shutdown = self.stream.termination();
        let mut frames = pin!(frames);
        loop {
            if !self.stream.is_pending() {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    () = self.stream.demand().acquire() => {}
                }
            }
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                next = frames.next() => next,
            };
            let Some(frame) = next else { break };
            if let Some(frame) = self.handle_inbound(frame).await
                && downstream.send(frame).await.is_err()
            {
                debug!("downstream closed: stream={}", self.stream.stream_id());
                break;
            }
        }
        debug!("bridge stopped: stream={}", self.stream.stream_id());
    }

    /// Spawn [`StreamBridge::run`] on the current runtime.
    ///
    /// Returns the receiving end of a downstream channel holding up to
    /// `config.downstream_capacity` frames, and the driver's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn<S>(self, frames: S, config: &StreamConfig) -> (mpsc::Receiver<HttpObject>, JoinHandle<()>)
    where
        S: Stream<Item = HttpObject> + Send + 'static,
    {
        let (downstream, rx) = mpsc::channel(config.downstream_capacity.max(1));
        (rx, tokio::spawn(self.run(frames, downstream)))
    }
}

#[cfg(all(test, not(loom)))]
mod tests;
