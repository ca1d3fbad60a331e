//! In-memory connections and frame capture.

use std::{sync::Arc, time::Duration};

use http::{Method, StatusCode, Uri, Version};
use httpframe::{
    ChannelConnection,
    Exchange,
    HttpObject,
    RequestHead,
    ResponseHead,
};
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Default capacity of a [`Wire`]'s frame queue.
pub const DEFAULT_WIRE_CAPACITY: usize = 16;

/// A [`ChannelConnection`] together with the receiver of its frames.
pub struct Wire {
    connection: Arc<ChannelConnection>,
    rx: mpsc::Receiver<HttpObject>,
}

impl Wire {
    /// Create a persistent connection queueing up to
    /// [`DEFAULT_WIRE_CAPACITY`] frames.
    #[must_use]
    pub fn new() -> Self { Self::with_capacity(DEFAULT_WIRE_CAPACITY) }

    /// Create a persistent connection queueing up to `capacity` frames.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (connection, rx) = ChannelConnection::new(capacity);
        Self {
            connection: Arc::new(connection),
            rx,
        }
    }

    /// Create a connection that closes after one exchange.
    #[must_use]
    pub fn non_persistent() -> Self {
        let (connection, rx) = ChannelConnection::new(DEFAULT_WIRE_CAPACITY);
        Self {
            connection: Arc::new(connection.non_persistent()),
            rx,
        }
    }

    /// The connection side.
    #[must_use]
    pub fn connection(&self) -> &Arc<ChannelConnection> { &self.connection }

    /// Frames written so far, without waiting.
    pub fn drain(&mut self) -> Vec<HttpObject> { drain(&mut self.rx) }

    /// Next written frame, waiting at most one second.
    pub async fn recv(&mut self) -> Option<HttpObject> {
        recv_within(&mut self.rx, Duration::from_secs(1)).await
    }
}

impl Default for Wire {
    fn default() -> Self { Self::new() }
}

/// Collect every frame currently queued on `rx`.
pub fn drain(rx: &mut mpsc::Receiver<HttpObject>) -> Vec<HttpObject> {
    let mut frames = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(frame) => frames.push(frame),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => return frames,
        }
    }
}

/// Receive one frame, giving up after `timeout`.
pub async fn recv_within(
    rx: &mut mpsc::Receiver<HttpObject>,
    timeout: Duration,
) -> Option<HttpObject> {
    tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
}

/// Short names of the frame shapes in `frames`, for sequence assertions.
#[must_use]
pub fn frame_kinds(frames: &[HttpObject]) -> Vec<&'static str> {
    frames
        .iter()
        .map(|frame| match frame {
            HttpObject::Head(_) => "head",
            HttpObject::Content(_) => "content",
            HttpObject::LastContent(_) => "last",
            HttpObject::Full(..) => "full",
        })
        .collect()
}

/// A `200 OK` HTTP/1.1 response head with no headers.
#[must_use]
pub fn ok_response() -> ResponseHead { ResponseHead::new(StatusCode::OK, Version::HTTP_11) }

/// An HTTP/2 `GET` request head for `uri`.
#[must_use]
pub fn get_request(uri: &'static str) -> RequestHead {
    RequestHead::new(Method::GET, Uri::from_static(uri), Version::HTTP_2)
}

/// An exchange answering on `wire` with [`ok_response`].
#[must_use]
pub fn response_exchange(wire: &Wire) -> Exchange<ChannelConnection> {
    Exchange::new(Arc::clone(wire.connection()), ok_response())
}
