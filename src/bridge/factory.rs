//! Exchange construction and decoding-failure responses for bridged streams.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use http::{StatusCode, Version};
use log::debug;

use super::{ConnectionInfo, StreamChannel};
use crate::{
    config::ExchangeConfig,
    connection::Connection,
    error::DecodeFailure,
    exchange::{Exchange, ExchangeHooks, ExchangeProtocol},
    message::{HttpObject, RequestHead, ResponseHead, set_content_length},
    observer::{ConnectionObserver, LifecycleEvent},
    payload::Payload,
};

/// Builds the exchange answering an inbound request.
pub trait ExchangeFactory: Send + Sync + 'static {
    /// Create the exchange for `request` on `stream`.
    ///
    /// # Errors
    ///
    /// Returns the [`DecodeFailure`] that makes `request` unanswerable.
    fn create(
        &self,
        stream: &Arc<StreamChannel>,
        request: &RequestHead,
        info: ConnectionInfo,
    ) -> Result<Exchange<StreamChannel>, DecodeFailure>;
}

/// Default factory: a `200 OK` response head in the request's version.
#[derive(Clone, Default)]
pub struct ServerExchangeFactory {
    protocol: Option<Arc<dyn ExchangeProtocol>>,
    config: ExchangeConfig,
}

impl ServerExchangeFactory {
    /// A factory producing exchanges without hooks.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Install hooks from `protocol` on every exchange.
    #[must_use]
    pub fn with_protocol(mut self, protocol: Arc<dyn ExchangeProtocol>) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Configuration applied to every exchange.
    #[must_use]
    pub fn with_config(mut self, config: ExchangeConfig) -> Self {
        self.config = config;
        self
    }
}

impl ExchangeFactory for ServerExchangeFactory {
    fn create(
        &self,
        stream: &Arc<StreamChannel>,
        request: &RequestHead,
        info: ConnectionInfo,
    ) -> Result<Exchange<StreamChannel>, DecodeFailure> {
        request.decode_result()?;
        let hooks = self
            .protocol
            .as_ref()
            .map_or_else(ExchangeHooks::default, ExchangeHooks::from_protocol);
        let head = ResponseHead::new(StatusCode::OK, request.version);
        Ok(Exchange::with_hooks(Arc::clone(stream), head, hooks)
            .with_request(request.clone(), info)
            .with_config(self.config))
    }
}

impl std::fmt::Debug for ServerExchangeFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerExchangeFactory")
            .field("protocol", &self.protocol.is_some())
            .field("config", &self.config)
            .finish()
    }
}

/// Answers requests that could not be turned into an exchange.
#[async_trait]
pub trait DecodingFailureResponder: Send + Sync + 'static {
    /// Send an error response for `frame` on `stream` and notify `observer`.
    async fn respond(
        &self,
        stream: &Arc<StreamChannel>,
        observer: &dyn ConnectionObserver<StreamChannel>,
        secured: bool,
        failure: DecodeFailure,
        frame: HttpObject,
    );
}

/// Responds with an empty message carrying the failure's status code.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusResponder;

#[async_trait]
impl DecodingFailureResponder for StatusResponder {
    async fn respond(
        &self,
        stream: &Arc<StreamChannel>,
        observer: &dyn ConnectionObserver<StreamChannel>,
        secured: bool,
        failure: DecodeFailure,
        frame: HttpObject,
    ) {
        let version = frame.request_head().map_or(Version::HTTP_2, |head| head.version);
        drop(frame);
        let status = failure.status();
        let mut head = ResponseHead::new(status, version);
        set_content_length(&mut head.headers, 0);
        let response = HttpObject::Full(head.into(), Payload::empty());
        match stream.write_and_flush(response.into()).await {
            Ok(()) => debug!(
                "decoding failure answered: stream={} status={status} secured={secured} \
                 failure={failure}",
                stream.stream_id()
            ),
            Err(e) => debug!(
                "decoding failure response not sent: stream={} status={status} error={e}",
                stream.stream_id()
            ),
        }
        observer.on_state_change(LifecycleEvent::RequestDecodingFailed(Arc::clone(stream)));
    }
}

static DEFAULT_FACTORY: LazyLock<Arc<ServerExchangeFactory>> =
    LazyLock::new(|| Arc::new(ServerExchangeFactory::new()));
static DEFAULT_RESPONDER: LazyLock<Arc<StatusResponder>> =
    LazyLock::new(|| Arc::new(StatusResponder));

/// Shared default factory.
#[must_use]
pub fn default_factory() -> Arc<dyn ExchangeFactory> {
    let factory: Arc<ServerExchangeFactory> = Arc::clone(&DEFAULT_FACTORY);
    factory
}

/// Shared default decoding-failure responder.
#[must_use]
pub fn default_responder() -> Arc<dyn DecodingFailureResponder> {
    let responder: Arc<StatusResponder> = Arc::clone(&DEFAULT_RESPONDER);
    responder
}
