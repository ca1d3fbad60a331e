//! Utilities for exercising `httpframe` exchanges and bridged streams in
//! tests.
//!
//! The helpers build in-memory connections whose written frames are captured
//! on a channel, so tests can assert on the exact object sequence an exchange
//! emitted.
//!
//! ```rust
//! use httpframe::Body;
//! use httpframe_testing::{Wire, response_exchange};
//!
//! # async fn example() {
//! let mut wire = Wire::new();
//! let exchange = response_exchange(&wire);
//! exchange.send(Body::Empty).await.unwrap();
//! assert_eq!(wire.drain().len(), 1);
//! # }
//! ```

pub mod frames;
pub mod logging;
pub mod observer;

pub use frames::{
    Wire,
    drain,
    frame_kinds,
    get_request,
    ok_response,
    recv_within,
    response_exchange,
};
pub use logging::{LoggerHandle, logger};
pub use observer::RecordingObserver;

/// Result type used by integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
