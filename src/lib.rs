#![doc(html_root_url = "https://docs.rs/httpframe/latest")]
//! Public API for the `httpframe` library.
//!
//! This crate provides the message-lifecycle core of an asynchronous HTTP
//! transport: the per-exchange send state machine, the bridge presenting
//! HTTP/2 streams as single-exchange connections, pipeline instrumentation
//! for handlers added after the fact, and transport back-end selection.

pub mod body;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod exchange;
pub mod message;
pub mod observer;
pub mod payload;
pub mod pipeline;
pub mod transport;

pub use body::{Body, BodyStream};
pub use bridge::{ParentConnection, StreamBridge, StreamChannel, StreamId};
pub use config::{ExchangeConfig, StreamConfig};
pub use connection::{ChannelConnection, Connection, ConnectionId};
pub use error::{BodyError, DecodeFailure, PipelineError, SendError, TransportError};
pub use exchange::{Exchange, ExchangeHooks, ExchangeId, ExchangeProtocol, SendState};
pub use message::{HttpObject, MessageHead, Outbound, RequestHead, ResponseHead};
pub use observer::{ConnectionObserver, ConnectionState, LifecycleEvent};
pub use payload::Payload;
pub use transport::{ChannelKind, TransportSelector};
