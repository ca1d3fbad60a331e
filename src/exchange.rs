//! One request/response cycle bound to a connection.
//!
//! An [`Exchange`] owns the outbound header container of a message and the
//! [`SendState`] that gates its emission. Senders race through a single
//! compare-and-set out of [`SendState::Ready`]; the winner settles the framing
//! (full message, streamed content or empty body), runs the pre-send hook and
//! writes the header frame. Every loser either appends content to a message
//! whose headers are already out or gets [`SendError::AlreadySent`]. The
//! winner holds an emission lock until its header frame is written, so late
//! content never overtakes the headers on the wire.

mod hooks;
mod state;

use std::{
    fmt,
    io,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::StreamExt;
use http::{HeaderMap, header::TRANSFER_ENCODING};
use log::debug;
use tokio_util::sync::CancellationToken;

pub use self::{
    hooks::{ExchangeHooks, ExchangeProtocol},
    state::{SendState, SendStateCell},
};
use crate::{
    body::{Body, BodyStream},
    bridge::ConnectionInfo,
    config::ExchangeConfig,
    connection::{Connection, closed_error},
    error::{BodyError, PipelineError, SendError},
    message::{
        HttpObject,
        MessageHead,
        Outbound,
        RequestHead,
        content_length,
        is_chunked,
        is_content_length_set,
        set_chunked,
        set_content_length,
    },
    payload::Payload,
    pipeline::{self, Handler, Position},
};

/// Short identifier of an exchange: connection short text and a
/// per-connection counter joined by `-`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExchangeId(String);

impl ExchangeId {
    fn for_connection<C: Connection + ?Sized>(connection: &C) -> Self {
        Self(format!(
            "{}-{}",
            connection.id().short_text(),
            connection.next_exchange_seq()
        ))
    }

    /// Identifier suitable for correlating log lines of one request.
    #[must_use]
    pub fn request_id(&self) -> &str { &self.0 }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Send lifecycle of one outbound message.
pub struct Exchange<C: Connection> {
    connection: Arc<C>,
    id: ExchangeId,
    state: SendStateCell,
    outbound: Mutex<MessageHead>,
    hooks: Mutex<ExchangeHooks>,
    // Held from claiming the headers until their frame is written.
    emission: tokio::sync::Mutex<()>,
    request: Option<RequestHead>,
    info: Option<ConnectionInfo>,
    config: ExchangeConfig,
    termination: CancellationToken,
}

impl<C: Connection> Exchange<C> {
    /// Create an exchange that will send `head` over `connection`.
    pub fn new(connection: Arc<C>, head: impl Into<MessageHead>) -> Self {
        Self::with_hooks(connection, head, ExchangeHooks::default())
    }

    /// Create an exchange with the given hooks.
    pub fn with_hooks(connection: Arc<C>, head: impl Into<MessageHead>, hooks: ExchangeHooks) -> Self {
        let id = ExchangeId::for_connection(connection.as_ref());
        let termination = connection.termination().child_token();
        Self {
            connection,
            id,
            state: SendStateCell::new(),
            outbound: Mutex::new(head.into()),
            hooks: Mutex::new(hooks),
            emission: tokio::sync::Mutex::new(()),
            request: None,
            info: None,
            config: ExchangeConfig::default(),
            termination,
        }
    }

    /// Attach the inbound request this exchange answers.
    #[must_use]
    pub fn with_request(mut self, request: RequestHead, info: ConnectionInfo) -> Self {
        self.request = Some(request);
        self.info = Some(info);
        self
    }

    /// Override the default [`ExchangeConfig`].
    #[must_use]
    pub fn with_config(mut self, config: ExchangeConfig) -> Self {
        self.config = config;
        self
    }

    /// Connection the exchange writes to.
    #[must_use]
    pub fn connection(&self) -> &Arc<C> { &self.connection }

    /// Identifier of this exchange.
    #[must_use]
    pub fn id(&self) -> &ExchangeId { &self.id }

    /// Current send state.
    #[must_use]
    pub fn state(&self) -> SendState { self.state.load() }

    /// Returns `true` once the exchange left [`SendState::Ready`].
    #[must_use]
    pub fn has_sent_headers(&self) -> bool { self.state() != SendState::Ready }

    /// Inbound request answered by this exchange, if any.
    #[must_use]
    pub fn request(&self) -> Option<&RequestHead> { self.request.as_ref() }

    /// Address and scheme details captured when the exchange was created.
    #[must_use]
    pub fn connection_info(&self) -> Option<&ConnectionInfo> { self.info.as_ref() }

    /// Snapshot of the outbound headers.
    #[must_use]
    pub fn headers(&self) -> HeaderMap { lock(&self.outbound).headers().clone() }

    /// Mutate the outbound head while the exchange is still ready.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::HeadersSent`] once a sender claimed the headers.
    pub fn with_headers<R>(&self, f: impl FnOnce(&mut MessageHead) -> R) -> Result<R, SendError> {
        let mut head = lock(&self.outbound);
        if self.has_sent_headers() {
            return Err(SendError::HeadersSent);
        }
        Ok(f(&mut head))
    }

    /// Token cancelled when this exchange or its connection terminates.
    #[must_use]
    pub fn termination(&self) -> CancellationToken { self.termination.clone() }

    /// Terminate the exchange. An in-flight streamed body is cancelled.
    pub fn terminate(&self) { self.termination.cancel(); }

    /// Add `handler` at the front of the connection pipeline.
    ///
    /// Returns `true` if an extractor was placed ahead of it. Adding a name
    /// that is already installed does nothing and returns `false`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the stage could not be placed.
    pub fn add_handler_first(&self, name: &str, handler: impl Handler) -> Result<bool, PipelineError> {
        self.add_handler(Position::First, name, Box::new(handler))
    }

    /// Add `handler` at the back of the connection pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the stage could not be placed.
    pub fn add_handler_last(&self, name: &str, handler: impl Handler) -> Result<bool, PipelineError> {
        self.add_handler(Position::Last, name, Box::new(handler))
    }

    fn add_handler(
        &self,
        position: Position,
        name: &str,
        handler: Box<dyn Handler>,
    ) -> Result<bool, PipelineError> {
        // Persistent channels outlive the exchange; scope the stage to it.
        let owner = if self.connection.is_persistent() {
            self.termination.clone()
        } else {
            self.connection.termination()
        };
        pipeline::install(self.connection.pipeline(), position, name, handler, Some(&owner))
    }

    /// Send the headers followed by `body`.
    ///
    /// # Errors
    ///
    /// See [`Exchange::send_full`], [`Exchange::send_stream`] and
    /// [`Exchange::send_empty`].
    pub async fn send(&self, body: Body) -> Result<(), SendError> {
        match body {
            Body::Empty => self.send_empty().await,
            Body::Full(payload) => self.send_full(payload).await,
            Body::Stream(stream) => self.send_stream(stream).await,
        }
    }

    /// Send the headers and a fully buffered body as one frame.
    ///
    /// The transfer-encoding header is dropped and content-length is set to
    /// the body length unless already present. A declared content-length of
    /// zero discards the payload. If another sender already emitted the
    /// headers the payload is written as a content chunk.
    ///
    /// # Errors
    ///
    /// - [`SendError::AbortedBeforeSend`] if the connection is inactive.
    /// - [`SendError::AlreadySent`] if the body was already sent.
    /// - [`SendError::HeaderHook`] if the pre-send hook failed.
    /// - [`SendError::Write`] if the connection rejected the frame.
    ///
    /// The payload is disposed on every error path.
    pub async fn send_full(&self, mut payload: Payload) -> Result<(), SendError> {
        if !self.connection.is_active() {
            payload.close();
            return Err(SendError::AbortedBeforeSend);
        }
        let emission = self.emission.lock().await;
        if !self.state.transition(SendState::Ready, SendState::BodySent) {
            drop(emission);
            return self.write_content(payload).await;
        }
        let length = u64::try_from(payload.len()).unwrap_or(u64::MAX);
        let prepared = self.prepare_head(|headers| {
            headers.remove(TRANSFER_ENCODING);
            if content_length(headers) == Some(0) {
                return true;
            }
            if !is_content_length_set(headers) {
                set_content_length(headers, length);
            }
            false
        });
        let (head, discard) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                payload.close();
                return Err(e);
            }
        };
        if discard {
            debug!("Dropped HTTP content, since response has Content-Length: 0: exchange={}", self.id);
            payload.close();
            payload = Payload::empty();
        }
        self.write(HttpObject::Full(head, payload)).await?;
        self.headers_sent();
        Ok(())
    }

    /// Send the headers followed by a lazily produced body.
    ///
    /// A declared content-length of zero sends a complete empty message and
    /// drops `stream` without polling it. A fixed nonzero content-length
    /// suppresses transfer-encoding; otherwise chunked encoding is used. Each
    /// chunk is pulled only after the previous write was acknowledged. A
    /// stream that ends short of a declared content-length leaves the message
    /// open and fails.
    ///
    /// # Errors
    ///
    /// - [`SendError::AbortedBeforeSend`] if the connection is inactive.
    /// - [`SendError::AlreadySent`] if the body was already sent, including
    ///   when another sender completed it while this stream was pumping.
    /// - [`SendError::HeaderHook`] if the pre-send hook failed.
    /// - [`SendError::Body`] if the stream reported an error or ended short.
    /// - [`SendError::Write`] if a write failed or the exchange terminated.
    pub async fn send_stream(&self, stream: BodyStream) -> Result<(), SendError> {
        if !self.connection.is_active() {
            return Err(SendError::AbortedBeforeSend);
        }
        let emission = self.emission.lock().await;
        if !self.state.transition(SendState::Ready, SendState::HeadersSent) {
            drop(emission);
            return match self.state() {
                SendState::HeadersSent => self.pump(stream).await.map(drop),
                _ => Err(SendError::AlreadySent),
            };
        }
        let (head, empty) = self.prepare_head(open_framing)?;
        if empty {
            self.state.transition(SendState::HeadersSent, SendState::BodySent);
            drop(stream);
            debug!("Dropped HTTP content, since response has Content-Length: 0: exchange={}", self.id);
            self.write(HttpObject::Full(head, Payload::empty())).await?;
            self.headers_sent();
            return Ok(());
        }
        let declared = content_length(head.headers());
        self.write(HttpObject::Head(head)).await?;
        self.headers_sent();
        drop(emission);
        let sent = self.pump(stream).await?;
        if let Some(declared) = declared
            && sent < declared
        {
            return Err(short_body(sent, declared));
        }
        self.finish().await
    }

    /// Complete the message without a body.
    ///
    /// Transfer-encoding is removed and content-length set to zero unless
    /// one was declared. Does nothing if headers were already sent.
    ///
    /// # Errors
    ///
    /// - [`SendError::AbortedBeforeSend`] if the connection is inactive.
    /// - [`SendError::HeaderHook`] if the pre-send hook failed.
    /// - [`SendError::Write`] if the connection rejected the frame.
    pub async fn send_empty(&self) -> Result<(), SendError> {
        if !self.connection.is_active() {
            return Err(SendError::AbortedBeforeSend);
        }
        let _emission = self.emission.lock().await;
        if !self.state.transition(SendState::Ready, SendState::BodySent) {
            return Ok(());
        }
        let (head, ()) = self.prepare_head(|headers| {
            headers.remove(TRANSFER_ENCODING);
            if !is_content_length_set(headers) {
                set_content_length(headers, 0);
            }
        })?;
        self.write(HttpObject::Full(head, Payload::empty())).await?;
        self.headers_sent();
        Ok(())
    }

    /// Send only the headers, leaving the body open.
    ///
    /// A declared content-length of zero completes the message instead.
    ///
    /// # Errors
    ///
    /// - [`SendError::AbortedBeforeSend`] if the connection is inactive.
    /// - [`SendError::HeaderHook`] if the pre-send hook failed.
    /// - [`SendError::Write`] if the connection rejected the frame.
    pub async fn send_headers(&self) -> Result<(), SendError> {
        if !self.connection.is_active() {
            return Err(SendError::AbortedBeforeSend);
        }
        let _emission = self.emission.lock().await;
        if !self.state.transition(SendState::Ready, SendState::HeadersSent) {
            return Ok(());
        }
        let (head, complete) = self.prepare_head(open_framing)?;
        let object = if complete {
            self.state.transition(SendState::HeadersSent, SendState::BodySent);
            HttpObject::Full(head, Payload::empty())
        } else {
            HttpObject::Head(head)
        };
        self.write(object).await?;
        self.headers_sent();
        Ok(())
    }

    /// Write the last-content marker of a message whose headers are out.
    ///
    /// Falls back to [`Exchange::send_empty`] when nothing was sent yet and
    /// does nothing once the body is complete.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Write`] if the marker could not be written, or
    /// any error of [`Exchange::send_empty`].
    pub async fn finish(&self) -> Result<(), SendError> {
        match self.state() {
            SendState::Ready => self.send_empty().await,
            SendState::HeadersSent => {
                let _emission = self.emission.lock().await;
                if self.state.transition(SendState::HeadersSent, SendState::BodySent) {
                    self.write(HttpObject::empty_last()).await
                } else {
                    Ok(())
                }
            }
            SendState::BodySent => Ok(()),
        }
    }

    /// Stream `length` bytes of the file at `path`, starting at `offset`.
    ///
    /// While headers are unsent, a message with neither content-length nor
    /// chunked encoding gets `length` as its content-length if it fits a
    /// 32-bit count; otherwise chunked encoding replaces any content-length.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Body`] if the file cannot be opened or holds
    /// fewer than `length` bytes past `offset`, or any error of
    /// [`Exchange::send_stream`].
    pub async fn send_file(&self, path: &Path, offset: u64, length: u64) -> Result<(), SendError> {
        if !self.has_sent_headers() {
            // Losing this race only means the framing is left to the winner.
            let _ = self.with_headers(|head| {
                let headers = head.headers_mut();
                let fits = length < u64::from(i32::MAX.unsigned_abs());
                if fits && !is_chunked(headers) && !is_content_length_set(headers) {
                    set_content_length(headers, length);
                } else if !is_content_length_set(headers) {
                    set_chunked(headers);
                }
            });
        }
        let body = Body::file_region(path, offset, length, self.config.file_chunk_size)
            .await
            .map_err(|e| SendError::Body(BodyError::Io(e)))?;
        self.send(body).await
    }

    fn prepare_head<R>(&self, policy: impl FnOnce(&mut HeaderMap) -> R) -> Result<(MessageHead, R), SendError> {
        let mut head = lock(&self.outbound);
        let outcome = policy(head.headers_mut());
        lock(&self.hooks).before_headers(&mut head).map_err(SendError::HeaderHook)?;
        Ok((head.clone(), outcome))
    }

    fn headers_sent(&self) { lock(&self.hooks).on_headers_sent(&self.id); }

    async fn write(&self, object: HttpObject) -> Result<(), SendError> {
        self.connection
            .write_and_flush(object.into())
            .await
            .map_err(SendError::Write)
    }

    /// Append a content chunk to a message whose headers are out.
    async fn write_content(&self, mut payload: Payload) -> Result<(), SendError> {
        let _emission = self.emission.lock().await;
        if self.state() != SendState::HeadersSent {
            payload.close();
            return Err(SendError::AlreadySent);
        }
        self.connection
            .write_and_flush(Outbound::Payload(payload))
            .await
            .map_err(SendError::Write)
    }

    /// Write every chunk of `stream`, returning the number of bytes sent.
    async fn pump(&self, mut stream: BodyStream) -> Result<u64, SendError> {
        let mut sent = 0_u64;
        loop {
            let next = tokio::select! {
                biased;
                () = self.termination.cancelled() => return Err(SendError::Write(closed_error())),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { return Ok(sent) };
            let payload = chunk.map_err(SendError::Body)?;
            let len = u64::try_from(payload.len()).unwrap_or(u64::MAX);
            self.write_content(payload).await?;
            sent = sent.saturating_add(len);
        }
    }
}

fn short_body(sent: u64, declared: u64) -> SendError {
    SendError::Body(BodyError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("body ended after {sent} of {declared} declared bytes"),
    )))
}

/// Framing for a message whose body follows the headers. Returns `true` if a
/// declared content-length of zero leaves nothing to follow.
fn open_framing(headers: &mut HeaderMap) -> bool {
    if is_content_length_set(headers) {
        headers.remove(TRANSFER_ENCODING);
        content_length(headers) == Some(0)
    } else {
        set_chunked(headers);
        false
    }
}

impl<C: Connection> fmt::Debug for Exchange<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, not(loom)))]
mod tests;
