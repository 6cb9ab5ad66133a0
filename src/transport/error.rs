/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use thiserror::Error;

/// Failure to establish the transport.
///
/// Reported before any data is exchanged on the connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Name resolution or TCP connection failed.
    #[error("cannot connect: {0}")]
    Io(#[source] std::io::Error),

    #[error("'{0}' is not a valid TLS server name")]
    InvalidServerName(String),

    /// The TLS client configuration could not be built.
    #[cfg(feature = "tls")]
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("TLS support is not enabled")]
    TlsUnavailable,
}

pub(super) mod description {
    pub(in super::super) const PEER_CLOSED: &str = "connection closed by peer";
    pub(in super::super) const NOT_CONNECTED: &str = "connection is closed";
    pub(in super::super) const WRITE_FAILED: &str = "write failed";
}
