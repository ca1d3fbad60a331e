//! HTTP object shapes exchanged with the external codecs.
//!
//! The HTTP/1 and HTTP/2 codecs that sit below this crate produce and consume
//! exactly three kinds of object: a header message, a content chunk and a
//! last-content marker. A full message carrying its own body is a fourth,
//! combined shape. [`HttpObject`] models these; [`Outbound`] additionally
//! allows a raw [`Payload`] to be written, leaving it to the connection to
//! frame it as content.

mod headers;

use http::{HeaderMap, Method, StatusCode, Uri, Version};

pub use self::headers::{
    content_length,
    is_chunked,
    is_content_length_set,
    set_chunked,
    set_content_length,
};
use crate::{error::DecodeFailure, payload::Payload};

/// Head of an inbound or outbound request.
#[derive(Clone, Debug)]
pub struct RequestHead {
    /// Request method.
    pub method: Method,
    /// Request target.
    pub uri: Uri,
    /// Protocol version.
    pub version: Version,
    /// Request headers.
    pub headers: HeaderMap,
    decode_result: Result<(), DecodeFailure>,
}

impl RequestHead {
    /// Create a request head with no headers.
    #[must_use]
    pub fn new(method: Method, uri: Uri, version: Version) -> Self {
        Self {
            method,
            uri,
            version,
            headers: HeaderMap::new(),
            decode_result: Ok(()),
        }
    }

    /// Mark this head as the product of a failed decode.
    #[must_use]
    pub fn with_decode_failure(mut self, failure: DecodeFailure) -> Self {
        self.decode_result = Err(failure);
        self
    }

    /// Outcome reported by the codec that decoded this head.
    ///
    /// # Errors
    ///
    /// Returns the [`DecodeFailure`] recorded by the codec, if any.
    pub fn decode_result(&self) -> Result<(), DecodeFailure> { self.decode_result.clone() }
}

/// Head of an inbound or outbound response.
#[derive(Clone, Debug)]
pub struct ResponseHead {
    /// Response status.
    pub status: StatusCode,
    /// Protocol version.
    pub version: Version,
    /// Response headers.
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// Create a response head with no headers.
    #[must_use]
    pub fn new(status: StatusCode, version: Version) -> Self {
        Self {
            status,
            version,
            headers: HeaderMap::new(),
        }
    }
}

/// Either side's header message.
#[derive(Clone, Debug)]
pub enum MessageHead {
    /// A request head.
    Request(RequestHead),
    /// A response head.
    Response(ResponseHead),
}

impl MessageHead {
    /// Borrow the header container.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        match self {
            Self::Request(head) => &head.headers,
            Self::Response(head) => &head.headers,
        }
    }

    /// Mutably borrow the header container.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        match self {
            Self::Request(head) => &mut head.headers,
            Self::Response(head) => &mut head.headers,
        }
    }

    /// Protocol version of the message.
    #[must_use]
    pub fn version(&self) -> Version {
        match self {
            Self::Request(head) => head.version,
            Self::Response(head) => head.version,
        }
    }

    /// Borrow the request head, if this is a request.
    #[must_use]
    pub fn as_request(&self) -> Option<&RequestHead> {
        match self {
            Self::Request(head) => Some(head),
            Self::Response(_) => None,
        }
    }

    /// Borrow the response head, if this is a response.
    #[must_use]
    pub fn as_response(&self) -> Option<&ResponseHead> {
        match self {
            Self::Response(head) => Some(head),
            Self::Request(_) => None,
        }
    }
}

impl From<RequestHead> for MessageHead {
    fn from(head: RequestHead) -> Self { Self::Request(head) }
}

impl From<ResponseHead> for MessageHead {
    fn from(head: ResponseHead) -> Self { Self::Response(head) }
}

/// Framed protocol object as produced or consumed by an HTTP codec.
#[derive(Debug)]
pub enum HttpObject {
    /// Header message without body.
    Head(MessageHead),
    /// One chunk of body content.
    Content(Payload),
    /// Final chunk of body content; marks the message boundary.
    LastContent(Payload),
    /// Header message with its complete body.
    Full(MessageHead, Payload),
}

impl HttpObject {
    /// Returns `true` if this object ends a message.
    #[must_use]
    pub fn is_last(&self) -> bool { matches!(self, Self::LastContent(_) | Self::Full(..)) }

    /// An empty last-content marker.
    #[must_use]
    pub fn empty_last() -> Self { Self::LastContent(Payload::empty()) }

    /// Borrow the header message carried by this object, if any.
    #[must_use]
    pub fn head(&self) -> Option<&MessageHead> {
        match self {
            Self::Head(head) | Self::Full(head, _) => Some(head),
            Self::Content(_) | Self::LastContent(_) => None,
        }
    }

    /// Borrow the request head if this object starts a request.
    #[must_use]
    pub fn request_head(&self) -> Option<&RequestHead> { self.head().and_then(MessageHead::as_request) }
}

/// Message handed to a connection for writing.
#[derive(Debug)]
pub enum Outbound {
    /// Raw body bytes; the connection frames them as content.
    Payload(Payload),
    /// An already framed protocol object.
    Object(HttpObject),
}

impl From<HttpObject> for Outbound {
    fn from(object: HttpObject) -> Self { Self::Object(object) }
}

impl From<Payload> for Outbound {
    fn from(payload: Payload) -> Self { Self::Payload(payload) }
}
