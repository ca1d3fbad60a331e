//! Error types shared across the exchange, bridge, pipeline and transport
//! layers.
//!
//! Each failure kind a caller must tell apart gets its own variant: an
//! exchange that was aborted before sending is not the same as one whose
//! pre-send hook failed, and a transport combination that is merely not
//! available is never reported through [`TransportError`].

use std::io;

use http::StatusCode;
use thiserror::Error;

use crate::transport::ChannelKind;

/// Error raised by a user-supplied exchange hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while sending an exchange's headers or body.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SendError {
    /// The connection was no longer active when the send was attempted.
    #[error("connection closed before the exchange could send")]
    AbortedBeforeSend,
    /// The body was already sent; no further writes are accepted.
    #[error("exchange body already sent")]
    AlreadySent,
    /// Headers were already sent and can no longer be modified.
    #[error("exchange headers already sent")]
    HeadersSent,
    /// The pre-send header hook failed.
    #[error("header hook failed: {0}")]
    HeaderHook(#[source] HookError),
    /// The body source reported an error instead of a chunk.
    #[error("body source failed: {0}")]
    Body(#[source] BodyError),
    /// The connection rejected a write.
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

/// Errors reported by a lazy body source.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BodyError {
    /// Reading the underlying resource failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The source produced an application-defined error.
    #[error("{0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl BodyError {
    /// Wrap an arbitrary error raised by a body producer.
    pub fn other<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Source(error.into())
    }
}

/// Reasons an inbound request could not be turned into an exchange.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeFailure {
    /// The request line exceeded the decoder's limit.
    #[error("request line too long")]
    TooLongLine,
    /// The request headers exceeded the decoder's limit.
    #[error("request headers too large")]
    TooLongHeaders,
    /// The request could not be decoded.
    #[error("malformed request: {0}")]
    Malformed(String),
}

impl DecodeFailure {
    /// Status code of the error response synthesised for this failure.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::TooLongLine => StatusCode::URI_TOO_LONG,
            Self::TooLongHeaders => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Errors produced when mutating a processing pipeline.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum PipelineError {
    /// A stage with the same key is already installed.
    #[error("stage {0} is already installed")]
    DuplicateName(String),
    /// The referenced stage does not exist.
    #[error("no stage named {0}")]
    NoSuchStage(String),
}

/// Errors produced by transport selection.
///
/// A combination that is compatible in principle but unsupported is reported
/// as `Ok(None)` by the selector and never through this type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The requested capability is not handled by this entry point.
    #[error("unsupported channel type: {0}")]
    UnsupportedChannelType(ChannelKind),
    /// The selector cannot create its own event loops.
    #[error("missing native transport backend on current system")]
    MissingNativeBackend,
    /// The operating system refused to open the socket.
    #[error("failed to open {kind} socket: {source}")]
    Open {
        /// Capability being opened.
        kind: ChannelKind,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Building the runtime behind an event loop group failed.
    #[error("failed to start event loop group: {0}")]
    Runtime(#[source] io::Error),
}
