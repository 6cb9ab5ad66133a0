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

use super::ConnectionState;

/// Errors returned synchronously from client calls.
///
/// Connection and parse failures are never returned here; they arrive
/// as [ClientEvent](super::ClientEvent)s.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no Tokio runtime is running")]
    NoRuntime,

    /// The call is not valid in the current connection state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("not connected")]
    NotConnected,

    #[error("cannot queue data: {0}")]
    Io(#[from] std::io::Error),
}
