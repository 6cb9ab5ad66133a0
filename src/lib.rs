/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod client;
pub mod constants;
mod element;
mod entities;
mod parser;
mod registry;
mod sasl;
mod stream;
mod transport;

pub use parser::Location;
pub use parser::SaxElement;
pub use parser::SaxError;
pub use parser::SaxHandler;
pub use parser::SaxParser;

pub use element::Auth;
pub use element::Element;
pub use element::ElementKind;
pub use element::Failure;
pub use element::Features;
pub use element::Mechanism;
pub use element::Mechanisms;
pub use element::QName;
pub use element::Stream;
pub use element::Success;

pub use registry::ElementFactory;
pub use registry::ElementRegistry;
pub use registry::register_builtins;

pub use stream::ParseError;
pub use stream::StreamEvent;
pub use stream::StreamHandler;
pub use stream::StreamParser;

pub use transport::ConnectError;
pub use transport::Connection;
pub use transport::ReceiveOutcome;
pub use transport::TransportConfig;
pub use transport::TransportReader;
pub use transport::TransportSocket;
pub use transport::TransportWriter;
#[cfg(feature = "tls")]
pub use transport::default_tls_config;

pub use client::ClientBuilder;
pub use client::ClientError;
pub use client::ClientEvent;
pub use client::ClientHandler;
pub use client::ConnectionState;
pub use client::ProtocolClient;

pub use sasl::AuthEvent;
pub use sasl::AuthState;
pub use sasl::SaslAuthenticator;
pub use sasl::plain_credential;
