//! Address and scheme details of an inbound request.

use std::net::SocketAddr;

use http::header::HOST;

use crate::message::RequestHead;

/// Connection details captured when an exchange is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    remote_address: SocketAddr,
    host: Option<String>,
    secured: bool,
}

impl ConnectionInfo {
    /// Collect details for `request`.
    ///
    /// The host comes from the request target's authority, falling back to
    /// the `Host` header.
    #[must_use]
    pub fn from_request(request: &RequestHead, remote_address: SocketAddr, secured: bool) -> Self {
        let host = request
            .uri
            .authority()
            .map(|authority| authority.as_str().to_owned())
            .or_else(|| {
                request
                    .headers
                    .get(HOST)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned)
            });
        Self {
            remote_address,
            host,
            secured,
        }
    }

    /// Address of the remote peer, as resolved for this connection.
    #[must_use]
    pub fn remote_address(&self) -> SocketAddr { self.remote_address }

    /// Host the request was addressed to.
    #[must_use]
    pub fn host(&self) -> Option<&str> { self.host.as_deref() }

    /// Returns `true` if the connection is TLS-protected.
    #[must_use]
    pub fn is_secured(&self) -> bool { self.secured }

    /// `https` for secured connections, `http` otherwise.
    #[must_use]
    pub fn scheme(&self) -> &'static str { if self.secured { "https" } else { "http" } }
}
