//! Owned byte chunks with explicit, idempotent disposal.
//!
//! A [`Payload`] is the unit of body data moved between a body source, an
//! exchange and a connection. Disposing a payload releases its bytes exactly
//! once: [`Payload::close`] may be called any number of times and dropping an
//! accessible payload closes it. Handing the bytes over with
//! [`Payload::into_bytes`] transfers ownership without counting as disposal.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use bytes::Bytes;

/// Counter observing how many tracked payloads were disposed.
///
/// Probes are cheap to clone; all clones share the same counter.
#[derive(Clone, Debug, Default)]
pub struct ReleaseProbe(Arc<AtomicUsize>);

impl ReleaseProbe {
    /// Create a probe with a zero count.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of disposals recorded so far.
    #[must_use]
    pub fn released(&self) -> usize { self.0.load(Ordering::Acquire) }

    fn record(&self) { self.0.fetch_add(1, Ordering::AcqRel); }
}

/// A chunk of body bytes that can be disposed at most once.
pub struct Payload {
    bytes: Option<Bytes>,
    probe: Option<ReleaseProbe>,
}

impl Payload {
    /// Wrap `bytes` in a new accessible payload.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: Some(bytes.into()),
            probe: None,
        }
    }

    /// An accessible payload holding no bytes.
    #[must_use]
    pub fn empty() -> Self { Self::new(Bytes::new()) }

    /// Wrap `bytes` and report its disposal to `probe`.
    pub fn tracked(bytes: impl Into<Bytes>, probe: &ReleaseProbe) -> Self {
        Self {
            bytes: Some(bytes.into()),
            probe: Some(probe.clone()),
        }
    }

    /// Returns `true` until the payload is closed or its bytes handed over.
    #[must_use]
    pub fn is_accessible(&self) -> bool { self.bytes.is_some() }

    /// Number of readable bytes; zero once the payload is no longer accessible.
    #[must_use]
    pub fn len(&self) -> usize { self.bytes.as_ref().map_or(0, Bytes::len) }

    /// Returns `true` if no bytes are readable.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Borrow the readable bytes. Closed payloads read as empty.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] { self.bytes.as_deref().unwrap_or_default() }

    /// Release the bytes. Closing an inaccessible payload is a no-op.
    pub fn close(&mut self) {
        if self.bytes.take().is_some()
            && let Some(probe) = &self.probe
        {
            probe.record();
        }
    }

    /// Hand the bytes to a new owner without disposing them.
    #[must_use]
    pub fn into_bytes(mut self) -> Bytes { self.bytes.take().unwrap_or_default() }
}

impl Drop for Payload {
    fn drop(&mut self) { self.close(); }
}

impl Default for Payload {
    fn default() -> Self { Self::empty() }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self { Self::new(bytes) }
}

impl From<&'static str> for Payload {
    fn from(text: &'static str) -> Self { Self::new(Bytes::from_static(text.as_bytes())) }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self { Self::new(bytes) }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bytes {
            Some(bytes) => f.debug_tuple("Payload").field(&bytes.len()).finish(),
            None => f.write_str("Payload(closed)"),
        }
    }
}
