//! Tunables for exchanges and bridged streams.
//!
//! Both structs deserialize from any serde format so applications can embed
//! them in their own configuration files; missing fields fall back to the
//! defaults below.

use serde::{Deserialize, Serialize};

/// Default read size used when streaming a file region.
pub const DEFAULT_FILE_CHUNK_SIZE: usize = 8 * 1024;
/// Default bound of the per-stream outbound and downstream channels.
pub const DEFAULT_STREAM_CAPACITY: usize = 16;

/// Settings applied to every exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Size of each chunk read by [`crate::Exchange::send_file`].
    pub file_chunk_size: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            file_chunk_size: DEFAULT_FILE_CHUNK_SIZE,
        }
    }
}

/// Settings for one bridged HTTP/2 stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frames buffered towards the stream codec before writes wait.
    pub outbound_capacity: usize,
    /// Frames buffered towards the application before reads wait. Sizes the
    /// channel created by [`crate::StreamBridge::spawn`].
    pub downstream_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_STREAM_CAPACITY,
            downstream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }
}
