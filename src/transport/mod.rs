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

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
#[cfg(feature = "tls")]
use rustls::ClientConfig;
#[cfg(feature = "tls")]
use rustls::RootCertStore;
#[cfg(feature = "tls")]
use rustls::SupportedProtocolVersion;
#[cfg(feature = "tls")]
use rustls::pki_types::ServerName;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::ReadHalf;
use tokio::io::WriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
#[cfg(feature = "tls")]
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

pub use error::ConnectError;
use error::description;

use crate::constants::CLIENT_PORT;
use crate::constants::DEFAULT_READ_BUFFER_SIZE;

trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

type BoxedStream = Box<dyn ByteStream>;

/// Where and how to connect.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    host: String,
    port: u16,
    tls: bool,
    #[cfg(feature = "tls")]
    tls_config: Option<Arc<ClientConfig>>,
    #[cfg(feature = "tls")]
    tls_versions: Vec<&'static SupportedProtocolVersion>,
    read_buffer_size: usize,
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        TransportConfig {
            host: host.into(),
            port,
            tls: false,
            #[cfg(feature = "tls")]
            tls_config: None,
            #[cfg(feature = "tls")]
            tls_versions: rustls::ALL_VERSIONS.to_vec(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Upgrades the connection to TLS right after the TCP connect.
    pub fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Replaces the default configuration, and with it the certificate
    /// validation policy.
    #[cfg(feature = "tls")]
    pub fn tls_config(mut self, config: Arc<ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Protocol versions offered by the default configuration.
    #[cfg(feature = "tls")]
    pub fn tls_versions(mut self, versions: &[&'static SupportedProtocolVersion]) -> Self {
        self.tls_versions = versions.to_vec();
        self
    }

    /// Upper limit of the chunks passed to the receive consumer.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn host_name(&self) -> &str {
        &self.host
    }

    pub fn port_number(&self) -> u16 {
        self.port
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::new("localhost", CLIENT_PORT)
    }
}

/// Builds the client configuration used when none is given, trusting
/// the Mozilla root certificates.
#[cfg(feature = "tls")]
pub fn default_tls_config(
    versions: &[&'static SupportedProtocolVersion],
) -> Result<Arc<ClientConfig>, ConnectError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(versions)?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Asynchronous byte-stream connection to a single endpoint.
pub struct TransportSocket {
    config: TransportConfig,
}

impl TransportSocket {
    pub fn new(config: TransportConfig) -> Self {
        TransportSocket { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Connects, performing the TLS handshake if enabled.
    ///
    /// Must be called within a Tokio runtime, the returned connection has
    /// its writer task already running.
    pub async fn connect(&self) -> Result<Connection, ConnectError> {
        let config = &self.config;
        debug!(host = %config.host, port = config.port, tls = config.tls, "connecting");
        let tcp = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(ConnectError::Io)?;
        if let Err(error) = tcp.set_nodelay(true) {
            debug!(%error, "cannot disable Nagle algorithm");
        }

        let stream = if config.tls {
            self.upgrade(tcp).await?
        } else {
            Box::new(tcp) as BoxedStream
        };
        info!(host = %config.host, port = config.port, tls = config.tls, "connected");

        let (read_half, write_half) = tokio::io::split(stream);
        let writer = TransportWriter::spawn(write_half);
        let reader = TransportReader {
            half: read_half,
            buffer: vec![0; config.read_buffer_size],
            writer: writer.clone(),
        };
        Ok(Connection { reader, writer })
    }

    #[cfg(feature = "tls")]
    async fn upgrade(&self, tcp: TcpStream) -> Result<BoxedStream, ConnectError> {
        let config = &self.config;
        let tls_config = match &config.tls_config {
            Some(tls_config) => tls_config.clone(),
            None => default_tls_config(&config.tls_versions)?,
        };
        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|_| ConnectError::InvalidServerName(config.host.clone()))?;
        let stream = TlsConnector::from(tls_config)
            .connect(server_name, tcp)
            .await
            .map_err(ConnectError::Handshake)?;
        debug!(host = %config.host, "TLS handshake complete");
        Ok(Box::new(stream))
    }

    #[cfg(not(feature = "tls"))]
    async fn upgrade(&self, _tcp: TcpStream) -> Result<BoxedStream, ConnectError> {
        Err(ConnectError::TlsUnavailable)
    }
}

/// An established connection, split into its two directions.
pub struct Connection {
    pub reader: TransportReader,
    pub writer: TransportWriter,
}

impl Connection {
    pub fn into_split(self) -> (TransportReader, TransportWriter) {
        (self.reader, self.writer)
    }
}

/// Why the receive loop stopped.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// The cancellation token was triggered.
    Cancelled,

    /// The connection broke or was closed by the peer.
    ///
    /// The writer is already disconnected when this is returned.
    Failed(io::Error),
}

/// Receiving side of a connection.
pub struct TransportReader {
    half: ReadHalf<BoxedStream>,
    buffer: Vec<u8>,
    writer: TransportWriter,
}

enum Step {
    Cancelled,
    WriteFailed,
    Read(io::Result<usize>),
}

impl TransportReader {
    /// Delivers received chunks to the consumer until the connection
    /// closes or the token is cancelled.
    ///
    /// No chunk is delivered after cancellation is observed.
    pub async fn run<F>(&mut self, cancel: &CancellationToken, mut consumer: F) -> ReceiveOutcome
    where
        F: FnMut(&[u8]),
    {
        let write_failed = self.writer.inner.failed.clone();
        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                _ = write_failed.cancelled() => Step::WriteFailed,
                read = self.half.read(&mut self.buffer) => Step::Read(read),
            };
            let error = match step {
                Step::Cancelled => return ReceiveOutcome::Cancelled,
                Step::WriteFailed => self
                    .writer
                    .take_error()
                    .unwrap_or_else(|| io::Error::other(description::WRITE_FAILED)),
                Step::Read(Ok(0)) => {
                    io::Error::new(io::ErrorKind::UnexpectedEof, description::PEER_CLOSED)
                }
                Step::Read(Ok(size)) => {
                    trace!(bytes = %String::from_utf8_lossy(&self.buffer[..size]), "received");
                    consumer(&self.buffer[..size]);
                    continue;
                }
                Step::Read(Err(error)) => error,
            };
            warn!(%error, "connection lost");
            self.writer.disconnect();
            return ReceiveOutcome::Failed(error);
        }
    }
}

struct WriterShared {
    queue: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    error: Mutex<Option<io::Error>>,
    failed: CancellationToken,
}

/// Sending side of a connection.
///
/// Clones share the same queue. Writes are performed by a background task
/// in the order they were queued.
#[derive(Clone)]
pub struct TransportWriter {
    inner: Arc<WriterShared>,
}

impl TransportWriter {
    fn spawn(half: WriteHalf<BoxedStream>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let writer = TransportWriter {
            inner: Arc::new(WriterShared {
                queue: Mutex::new(Some(sender)),
                error: Mutex::new(None),
                failed: CancellationToken::new(),
            }),
        };
        tokio::spawn(write_loop(half, receiver, writer.inner.clone()));
        writer
    }

    /// Queues bytes for sending.
    pub fn send(&self, bytes: Vec<u8>) -> io::Result<()> {
        let queue = self.inner.queue.lock();
        let Some(sender) = queue.as_ref() else {
            return Err(not_connected());
        };
        sender.send(bytes).map_err(|_| not_connected())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.queue.lock().is_some()
    }

    /// Flushes the queued writes and shuts the connection down.
    ///
    /// Calling this again has no effect.
    pub fn disconnect(&self) {
        if self.inner.queue.lock().take().is_some() {
            debug!("disconnecting");
        }
    }

    fn take_error(&self) -> Option<io::Error> {
        self.inner.error.lock().take()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, description::NOT_CONNECTED)
}

async fn write_loop(
    mut half: WriteHalf<BoxedStream>,
    mut queue: mpsc::UnboundedReceiver<Vec<u8>>,
    shared: Arc<WriterShared>,
) {
    while let Some(bytes) = queue.recv().await {
        trace!(bytes = %String::from_utf8_lossy(&bytes), "sending");
        let result = match half.write_all(&bytes).await {
            Ok(()) => half.flush().await,
            Err(error) => Err(error),
        };
        if let Err(error) = result {
            warn!(%error, "write failed");
            *shared.error.lock() = Some(error);
            shared.queue.lock().take();
            shared.failed.cancel();
            return;
        }
    }
    if let Err(error) = half.shutdown().await {
        debug!(%error, "shutdown failed");
    }
}

#[cfg(test)]
mod tests;
