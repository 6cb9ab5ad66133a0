/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod error;
mod events;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
#[cfg(feature = "tls")]
use rustls::ClientConfig;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

pub use error::ClientError;
pub use events::ClientEvent;
pub use events::ClientHandler;
pub use events::ConnectionState;

use crate::ElementKind;
use crate::ElementRegistry;
use crate::Stream;
use crate::constants::CLIENT_NS;
use crate::constants::CLIENT_PORT;
use crate::constants::STREAM_CLOSE;
use crate::constants::STREAM_VERSION;
use crate::constants::XML_DECLARATION;
use crate::element::Element;
use crate::stream::StreamEvent;
use crate::stream::StreamHandler;
use crate::stream::StreamParser;
use crate::transport::ReceiveOutcome;
use crate::transport::TransportConfig;
use crate::transport::TransportSocket;
use crate::transport::TransportWriter;

pub struct ClientBuilder {
    transport: TransportConfig,
    stream_to: Option<String>,
    content_namespace: String,
    registry: Option<Arc<ElementRegistry>>,
    handlers: Vec<Arc<dyn ClientHandler>>,
}

impl ClientBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        ClientBuilder {
            transport: TransportConfig::new(host, CLIENT_PORT),
            stream_to: None,
            content_namespace: CLIENT_NS.to_string(),
            registry: None,
            handlers: Vec::new(),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.transport = self.transport.host(host);
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.transport = self.transport.port(port);
        self
    }

    pub fn tls(mut self, tls: bool) -> Self {
        self.transport = self.transport.tls(tls);
        self
    }

    #[cfg(feature = "tls")]
    pub fn tls_config(mut self, config: Arc<ClientConfig>) -> Self {
        self.transport = self.transport.tls_config(config);
        self
    }

    /// Value of the `to` attribute of the stream header, the host by default.
    pub fn stream_to(mut self, domain: impl Into<String>) -> Self {
        self.stream_to = Some(domain.into());
        self
    }

    /// Default namespace declared on the stream header.
    pub fn content_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.content_namespace = namespace.into();
        self
    }

    pub fn registry(mut self, registry: Arc<ElementRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Attaches an event handler. Handlers are called in the order added.
    pub fn handler<H: ClientHandler + 'static>(mut self, handler: Arc<H>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.transport = self.transport.read_buffer_size(size);
        self
    }

    pub fn build(self) -> ProtocolClient {
        let stream_to = self
            .stream_to
            .unwrap_or_else(|| self.transport.host_name().to_string());
        ProtocolClient {
            shared: Arc::new(Shared {
                transport: self.transport,
                stream_to,
                content_namespace: self.content_namespace,
                registry: self.registry.unwrap_or_else(ElementRegistry::builtin),
                handlers: self.handlers,
                session: Mutex::new(Session {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    cancel: None,
                    writer: None,
                }),
                restart: AtomicBool::new(false),
            }),
        }
    }
}

struct Session {
    state: ConnectionState,
    // Bumped on every connect, events of older attempts are dropped
    generation: u64,
    cancel: Option<CancellationToken>,
    writer: Option<TransportWriter>,
}

struct Shared {
    transport: TransportConfig,
    stream_to: String,
    content_namespace: String,
    registry: Arc<ElementRegistry>,
    handlers: Vec<Arc<dyn ClientHandler>>,
    session: Mutex<Session>,
    restart: AtomicBool,
}

/// Client side of a streaming XML session.
///
/// Connects the transport, sends the stream header, parses the inbound
/// stream and re-exposes everything as [ClientEvent]s to the attached
/// handlers. Clones refer to the same session.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use ikstream::{ClientEvent, ProtocolClient};
///
/// # async fn run() -> Result<(), ikstream::ClientError> {
/// let client = ProtocolClient::build("xmpp.example.com")
///     .tls(true)
///     .handler(Arc::new(|_: &ProtocolClient, event: &ClientEvent<'_>| {
///         if let ClientEvent::ElementComplete(element) = event {
///             println!("{}", element);
///         }
///     }))
///     .build();
/// client.connect()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ProtocolClient {
    shared: Arc<Shared>,
}

impl ProtocolClient {
    pub fn build(host: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(host)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.session.lock().state
    }

    pub fn registry(&self) -> &Arc<ElementRegistry> {
        &self.shared.registry
    }

    /// Starts connecting in the background.
    ///
    /// Only valid while disconnected. The outcome is reported with either
    /// a [Connected](ClientEvent::Connected) or a
    /// [ConnectFailed](ClientEvent::ConnectFailed) event.
    pub fn connect(&self) -> Result<(), ClientError> {
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        let (generation, cancel) = {
            let mut session = self.shared.session.lock();
            if session.state != ConnectionState::Disconnected {
                return Err(ClientError::InvalidState {
                    operation: "connect",
                    state: session.state,
                });
            }
            session.state = ConnectionState::Connecting;
            session.generation += 1;
            let cancel = CancellationToken::new();
            session.cancel = Some(cancel.clone());
            session.writer = None;
            (session.generation, cancel)
        };
        self.shared.restart.store(false, Ordering::SeqCst);
        info!(
            host = %self.shared.transport.host_name(),
            port = self.shared.transport.port_number(),
            "connecting"
        );
        runtime.spawn(self.clone().run_session(generation, cancel));
        Ok(())
    }

    /// Serializes the element and queues it for sending.
    pub fn send(&self, element: &Element) -> Result<(), ClientError> {
        trace!(element = %element, "send");
        self.send_bytes(element.to_bytes())
    }

    /// Queues raw bytes, no validation is performed.
    pub fn send_bytes(&self, bytes: Vec<u8>) -> Result<(), ClientError> {
        let session = self.shared.session.lock();
        match (&session.state, &session.writer) {
            (ConnectionState::Connected, Some(writer)) => Ok(writer.send(bytes)?),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Starts a new stream on the same connection.
    ///
    /// The parser is reset before the next received chunk and a new
    /// stream header is sent, as needed after a successful
    /// authentication.
    pub fn restart_stream(&self) -> Result<(), ClientError> {
        let session = self.shared.session.lock();
        match (&session.state, &session.writer) {
            (ConnectionState::Connected, Some(writer)) => {
                debug!("restarting stream");
                self.shared.restart.store(true, Ordering::SeqCst);
                Ok(writer.send(self.stream_header())?)
            }
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Closes our end of the stream.
    ///
    /// The session ends with a [Closed](ClientEvent::Closed) event when the
    /// peer closes its end of the stream or the connection.
    pub fn close_stream(&self) -> Result<(), ClientError> {
        let mut session = self.shared.session.lock();
        let Some(writer) = session.writer.clone() else {
            return Err(ClientError::NotConnected);
        };
        if session.state != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        debug!("closing stream");
        session.state = ConnectionState::Closing;
        Ok(writer.send(STREAM_CLOSE.as_bytes().to_vec())?)
    }

    /// Tears the connection down.
    ///
    /// No events are delivered afterwards. Safe to call from any thread
    /// and more than once.
    pub fn disconnect(&self) {
        let mut session = self.shared.session.lock();
        if session.state == ConnectionState::Disconnected {
            return;
        }
        info!("disconnecting");
        Self::stop(&mut session);
    }

    fn stop(session: &mut Session) {
        session.state = ConnectionState::Disconnected;
        if let Some(writer) = session.writer.take() {
            writer.disconnect();
        }
        if let Some(cancel) = session.cancel.take() {
            cancel.cancel();
        }
    }

    fn stream_header(&self) -> Vec<u8> {
        let stream = Stream::build(&self.shared.stream_to, STREAM_VERSION);
        let mut header = XML_DECLARATION.to_string();
        header.push_str(&stream.open_tag(&self.shared.content_namespace));
        header.into_bytes()
    }

    fn is_live(&self, generation: u64) -> bool {
        let session = self.shared.session.lock();
        session.generation == generation && session.state != ConnectionState::Disconnected
    }

    /// Ends the attempt if it is still the current one.
    ///
    /// Returns the state it was in.
    fn finish_attempt(&self, generation: u64) -> Option<ConnectionState> {
        let mut session = self.shared.session.lock();
        if session.generation != generation || session.state == ConnectionState::Disconnected {
            return None;
        }
        let state = session.state;
        Self::stop(&mut session);
        Some(state)
    }

    fn dispatch(&self, event: &ClientEvent<'_>) {
        for handler in &self.shared.handlers {
            handler.handle_event(self, event);
        }
    }

    fn dispatch_live(&self, generation: u64, event: &ClientEvent<'_>) {
        if self.is_live(generation) {
            self.dispatch(event);
        }
    }

    async fn run_session(self, generation: u64, cancel: CancellationToken) {
        let socket = TransportSocket::new(self.shared.transport.clone());
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = socket.connect() => result,
        };
        let connection = match result {
            Ok(connection) => connection,
            Err(error) => {
                warn!(%error, "connect failed");
                if self.finish_attempt(generation).is_some() {
                    self.dispatch(&ClientEvent::ConnectFailed(&error));
                }
                return;
            }
        };

        let (mut reader, writer) = connection.into_split();
        {
            let mut session = self.shared.session.lock();
            if session.generation != generation || session.state != ConnectionState::Connecting {
                writer.disconnect();
                return;
            }
            session.state = ConnectionState::Connected;
            session.writer = Some(writer.clone());
        }
        if let Err(error) = writer.send(self.stream_header()) {
            debug!(%error, "cannot send stream header");
        }
        self.dispatch_live(generation, &ClientEvent::Connected);

        let mut parser = StreamParser::new(self.shared.registry.clone()).discard_stanzas();
        let outcome = reader
            .run(&cancel, |bytes| self.receive(generation, &mut parser, bytes))
            .await;
        match outcome {
            ReceiveOutcome::Cancelled => debug!("session stopped"),
            ReceiveOutcome::Failed(error) => match self.finish_attempt(generation) {
                Some(ConnectionState::Closing) => {
                    info!("stream closed");
                    self.dispatch(&ClientEvent::Closed);
                }
                Some(_) => self.dispatch(&ClientEvent::UnexpectedClose(&error)),
                None => (),
            },
        }
    }

    fn receive(&self, generation: u64, parser: &mut StreamParser, bytes: &[u8]) {
        if self.shared.restart.swap(false, Ordering::SeqCst) {
            parser.reset();
        }
        let mut dispatcher = Dispatcher {
            client: self,
            generation,
        };
        if let Err(error) = parser.feed(bytes, &mut dispatcher) {
            warn!(%error, "parse error");
            self.dispatch_live(generation, &ClientEvent::ParseError(&error));
        }
    }

    fn peer_closed_stream(&self, generation: u64) {
        let state = {
            let session = self.shared.session.lock();
            if session.generation != generation {
                return;
            }
            session.state
        };
        match state {
            ConnectionState::Connected => {
                debug!("peer closed the stream");
                if let Err(error) = self.close_stream() {
                    debug!(%error, "cannot close stream");
                }
            }
            ConnectionState::Closing => {
                if self.finish_attempt(generation).is_some() {
                    info!("stream closed");
                    self.dispatch(&ClientEvent::Closed);
                }
            }
            _ => (),
        }
    }
}

/// Forwards parser events of one session to the client handlers.
struct Dispatcher<'a> {
    client: &'a ProtocolClient,
    generation: u64,
}

impl StreamHandler for Dispatcher<'_> {
    fn handle_event(&mut self, event: StreamEvent<'_>) {
        if let StreamEvent::ElementComplete(element) = event {
            trace!(name = %element.name(), "element complete");
        }
        self.client
            .dispatch_live(self.generation, &ClientEvent::from(event));
        // After a parse error any stanza can end up as a root of its own
        if let StreamEvent::DocumentEnd(element) = event {
            if element.kind() == ElementKind::Stream {
                self.client.peer_closed_stream(self.generation);
            }
        }
    }
}
