//! Shared utilities for integration tests.
//!
//! Provides runtime and stream fixtures so individual test binaries stay
//! focused on the behaviour they check.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use httpframe::{HttpObject, ParentConnection, StreamChannel, StreamConfig, StreamId};
use rstest::fixture;
use tokio::{runtime::Runtime, sync::mpsc};

pub use httpframe_testing::TestResult;

/// Peer address used by parent connections in tests.
pub fn peer() -> SocketAddr { SocketAddr::new(Ipv4Addr::new(192, 0, 2, 7).into(), 50_000) }

/// Builds a single-thread [`Runtime`] for tests that hold the log capture.
#[fixture]
pub fn rt() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build test runtime")
}

#[expect(
    unused_braces,
    reason = "rustc false positive for single-line rstest fixtures"
)]
// allow(unfulfilled_lint_expectations): rustc occasionally fails to emit the expected
// lint for single-line rstest fixtures on stable.
#[allow(unfulfilled_lint_expectations)]
#[fixture]
pub fn parent() -> Arc<ParentConnection> { Arc::new(ParentConnection::new(peer())) }

/// Open stream `id` on `parent` with default settings.
pub fn open_stream(
    parent: &Arc<ParentConnection>,
    id: u32,
) -> (Arc<StreamChannel>, mpsc::Receiver<HttpObject>) {
    StreamChannel::new(parent, StreamId::new(id), &StreamConfig::default())
}
