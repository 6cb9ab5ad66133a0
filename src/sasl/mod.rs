/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::Auth;
use crate::ClientEvent;
use crate::ClientHandler;
use crate::ElementKind;
use crate::Features;
use crate::ProtocolClient;
use crate::element::Element;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthState {
    AwaitingFeatures,
    MechanismSent,
    Authenticated,
    Failed,
}

/// Outcome notifications of the authenticator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthEvent {
    /// Server accepted the credential sent for the mechanism.
    Succeeded(String),

    Failed {
        mechanism: String,
        /// Defined failure condition such as `not-authorized`.
        condition: Option<String>,
    },

    /// None of the offered mechanisms has a configured credential.
    NoUsableMechanism { offered: Vec<String> },
}

type Subscriber = Box<dyn Fn(&AuthEvent) + Send + Sync>;

struct Progress {
    state: AuthState,
    mechanism: Option<String>,
}

/// SASL mechanism negotiation driven by the stream features.
///
/// Attach it to a client with [ClientBuilder::handler()](crate::ClientBuilder::handler).
/// When the server advertises its mechanisms, the first one in the
/// advertised order with a configured credential is selected and an
/// `auth` element carrying the credential is sent.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ikstream::{AuthState, ProtocolClient, SaslAuthenticator, plain_credential};
///
/// let sasl = Arc::new(
///     SaslAuthenticator::new()
///         .credential("PLAIN", plain_credential("", "user", "secret")),
/// );
/// sasl.subscribe(|event| println!("{:?}", event));
/// let client = ProtocolClient::build("xmpp.example.com")
///     .handler(sasl.clone())
///     .build();
/// assert_eq!(sasl.state(), AuthState::AwaitingFeatures);
/// ```
pub struct SaslAuthenticator {
    credentials: Vec<(String, String)>,
    progress: Mutex<Progress>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl SaslAuthenticator {
    pub fn new() -> Self {
        SaslAuthenticator {
            credentials: Vec::new(),
            progress: Mutex::new(Progress {
                state: AuthState::AwaitingFeatures,
                mechanism: None,
            }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Adds the payload to send for a mechanism.
    ///
    /// Mechanism names are compared case-insensitively, a later credential
    /// for the same mechanism replaces the earlier one.
    pub fn credential(mut self, mechanism: impl Into<String>, payload: impl Into<String>) -> Self {
        let mechanism = mechanism.into();
        let payload = payload.into();
        match self
            .credentials
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&mechanism))
        {
            Some((_, old)) => *old = payload,
            None => self.credentials.push((mechanism, payload)),
        }
        self
    }

    pub fn state(&self) -> AuthState {
        self.progress.lock().state
    }

    /// The mechanism selected for the current session, if any.
    pub fn mechanism(&self) -> Option<String> {
        self.progress.lock().mechanism.clone()
    }

    /// Registers a callback for the outcome events.
    ///
    /// Callbacks run on the client's session task and must not subscribe
    /// further callbacks themselves.
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.subscribers.lock().push(Box::new(subscriber));
    }

    fn lookup(&self, mechanism: &str) -> Option<&str> {
        self.credentials
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(mechanism))
            .map(|(_, payload)| payload.as_str())
    }

    fn notify(&self, event: &AuthEvent) {
        for subscriber in self.subscribers.lock().iter() {
            subscriber(event);
        }
    }

    fn reset(&self) {
        let mut progress = self.progress.lock();
        progress.state = AuthState::AwaitingFeatures;
        progress.mechanism = None;
    }

    fn on_features(&self, client: &ProtocolClient, features: Features<'_>) {
        let Some(mechanisms) = features.mechanisms() else {
            return;
        };
        if self.state() != AuthState::AwaitingFeatures {
            debug!("ignoring mechanisms offered after negotiation");
            return;
        }

        let offered = mechanisms.names();
        let selected = offered
            .iter()
            .find_map(|name| self.lookup(name).map(|payload| (*name, payload)));
        let Some((mechanism, payload)) = selected else {
            warn!(?offered, "no usable SASL mechanism");
            let offered = offered.iter().map(|name| name.to_string()).collect();
            self.notify(&AuthEvent::NoUsableMechanism { offered });
            return;
        };

        {
            let mut progress = self.progress.lock();
            progress.state = AuthState::MechanismSent;
            progress.mechanism = Some(mechanism.to_string());
        }
        info!(mechanism, "authenticating");
        if let Err(error) = client.send(&Auth::build(mechanism, payload)) {
            warn!(%error, "cannot send auth");
        }
    }

    fn on_outcome(&self, element: &Element) {
        let event = {
            let mut progress = self.progress.lock();
            if progress.state != AuthState::MechanismSent {
                debug!(name = %element.name(), "unexpected SASL outcome");
                return;
            }
            let mechanism = progress.mechanism.clone().unwrap_or_default();
            match element.as_failure() {
                Some(failure) => {
                    progress.state = AuthState::Failed;
                    AuthEvent::Failed {
                        mechanism,
                        condition: failure.condition().map(str::to_string),
                    }
                }
                None => {
                    progress.state = AuthState::Authenticated;
                    AuthEvent::Succeeded(mechanism)
                }
            }
        };
        match &event {
            AuthEvent::Succeeded(mechanism) => info!(%mechanism, "authenticated"),
            _ => warn!(?event, "authentication failed"),
        }
        self.notify(&event);
    }
}

impl Default for SaslAuthenticator {
    fn default() -> Self {
        SaslAuthenticator::new()
    }
}

impl ClientHandler for SaslAuthenticator {
    fn handle_event(&self, client: &ProtocolClient, event: &ClientEvent<'_>) {
        match event {
            ClientEvent::Connected => self.reset(),
            ClientEvent::ElementComplete(element) => match element.kind() {
                ElementKind::Features => {
                    if let Some(features) = element.as_features() {
                        self.on_features(client, features);
                    }
                }
                ElementKind::Success | ElementKind::Failure => self.on_outcome(element),
                _ => (),
            },
            _ => (),
        }
    }
}

/// Builds the payload of the PLAIN mechanism.
pub fn plain_credential(authzid: &str, authcid: &str, password: &str) -> String {
    let mut message = Vec::with_capacity(authzid.len() + authcid.len() + password.len() + 2);
    message.extend_from_slice(authzid.as_bytes());
    message.push(0);
    message.extend_from_slice(authcid.as_bytes());
    message.push(0);
    message.extend_from_slice(password.as_bytes());
    STANDARD.encode(message)
}
