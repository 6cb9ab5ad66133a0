/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Display;
use std::io;

use super::ProtocolClient;
use crate::ConnectError;
use crate::ParseError;
use crate::element::Element;
use crate::stream::StreamEvent;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Our end of the stream is closed, waiting for the peer to close its end.
    Closing,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Notifications delivered to the attached handlers.
#[derive(Debug)]
pub enum ClientEvent<'a> {
    /// Transport is up and the stream header has been sent.
    Connected,

    /// The connection attempt failed. No other event follows for it.
    ConnectFailed(&'a ConnectError),

    /// Connection was lost while connected. The client is already
    /// disconnected when this fires.
    UnexpectedClose(&'a io::Error),

    /// Both ends closed the stream after [close_stream()](ProtocolClient::close_stream).
    Closed,

    DocumentStart(&'a Element),

    ElementComplete(&'a Element),

    DocumentEnd(&'a Element),

    /// Inbound data was not well-formed. The connection stays open.
    ParseError(&'a ParseError),
}

impl<'a> From<StreamEvent<'a>> for ClientEvent<'a> {
    fn from(event: StreamEvent<'a>) -> Self {
        match event {
            StreamEvent::DocumentStart(element) => ClientEvent::DocumentStart(element),
            StreamEvent::ElementComplete(element) => ClientEvent::ElementComplete(element),
            StreamEvent::DocumentEnd(element) => ClientEvent::DocumentEnd(element),
        }
    }
}

/// Receives client events.
///
/// Handlers are called synchronously from the session task, in the order
/// they were added to the [ClientBuilder](super::ClientBuilder).
pub trait ClientHandler: Send + Sync {
    fn handle_event(&self, client: &ProtocolClient, event: &ClientEvent<'_>);
}

impl<F> ClientHandler for F
where
    F: Fn(&ProtocolClient, &ClientEvent<'_>) + Send + Sync,
{
    fn handle_event(&self, client: &ProtocolClient, event: &ClientEvent<'_>) {
        self(client, event)
    }
}
