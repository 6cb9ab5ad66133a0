/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;

use super::*;

const WAIT: Duration = Duration::from_secs(5);

async fn listener() -> (TcpListener, TransportConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, TransportConfig::new("127.0.0.1", port))
}

#[tokio::test]
async fn send_and_receive() {
    let (listener, config) = listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 5];
        socket.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        socket.write_all(b"world").await.unwrap();
    });

    let connection = TransportSocket::new(config).connect().await.unwrap();
    let (mut reader, writer) = connection.into_split();
    writer.send(b"hel".to_vec()).unwrap();
    writer.send(b"lo".to_vec()).unwrap();

    let mut received = Vec::new();
    let cancel = CancellationToken::new();
    let outcome = timeout(WAIT, reader.run(&cancel, |bytes| received.extend_from_slice(bytes)))
        .await
        .unwrap();
    server.await.unwrap();

    assert_eq!(received, b"world");
    match outcome {
        ReceiveOutcome::Failed(error) => assert_eq!(error.kind(), io::ErrorKind::UnexpectedEof),
        other => panic!("unexpected outcome {:?}", other),
    }
    // Failure disconnects the writer
    assert!(!writer.is_connected());
    assert_eq!(
        writer.send(b"late".to_vec()).unwrap_err().kind(),
        io::ErrorKind::NotConnected
    );
}

#[tokio::test]
async fn chunks_fit_the_buffer() {
    let (listener, config) = listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"abcdefghij").await.unwrap();
    });

    let connection = TransportSocket::new(config.read_buffer_size(4))
        .connect()
        .await
        .unwrap();
    let (mut reader, _writer) = connection.into_split();
    let mut chunks = Vec::new();
    let cancel = CancellationToken::new();
    timeout(WAIT, reader.run(&cancel, |bytes| chunks.push(bytes.to_vec())))
        .await
        .unwrap();
    server.await.unwrap();

    assert!(chunks.iter().all(|chunk| !chunk.is_empty() && chunk.len() <= 4));
    assert_eq!(chunks.concat(), b"abcdefghij");
}

#[tokio::test]
async fn disconnect_flushes_and_closes() {
    let (listener, config) = listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut all = Vec::new();
        socket.read_to_end(&mut all).await.unwrap();
        all
    });

    let connection = TransportSocket::new(config).connect().await.unwrap();
    connection.writer.send(b"<a>".to_vec()).unwrap();
    connection.writer.send(b"</a>".to_vec()).unwrap();
    connection.writer.disconnect();
    connection.writer.disconnect();

    let all = timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(all, b"<a></a>");
}

#[tokio::test]
async fn cancel_stops_receiving() {
    let (listener, config) = listener().await;
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        // Keep the socket open until the client is done
        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(socket);
    });

    let connection = TransportSocket::new(config).connect().await.unwrap();
    let (mut reader, writer) = connection.into_split();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut called = false;
    let outcome = timeout(WAIT, reader.run(&cancel, |_| called = true))
        .await
        .unwrap();
    assert!(matches!(outcome, ReceiveOutcome::Cancelled));
    assert!(!called);
    // Cancelling the receive side leaves the writer alone
    assert!(writer.is_connected());
    server.await.unwrap();
}

#[tokio::test]
async fn write_failure_stops_receiving() {
    let (listener, config) = listener().await;
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
    });

    let connection = TransportSocket::new(config).connect().await.unwrap();
    let (mut reader, writer) = connection.into_split();
    server.await.unwrap();

    // Data sent to the closed peer is answered with a reset
    timeout(WAIT, async {
        while writer.is_connected() {
            let _ = writer.send(vec![b'x'; 1024]);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let cancel = CancellationToken::new();
    let mut called = false;
    let outcome = timeout(WAIT, reader.run(&cancel, |_| called = true))
        .await
        .unwrap();
    match outcome {
        ReceiveOutcome::Failed(error) => assert!(
            matches!(
                error.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe
            ),
            "{:?}",
            error
        ),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(!called);
    assert!(!writer.is_connected());
    assert_eq!(
        writer.send(b"late".to_vec()).unwrap_err().kind(),
        io::ErrorKind::NotConnected
    );
}

#[tokio::test]
async fn connect_refused() {
    let (listener, config) = listener().await;
    drop(listener);
    let result = TransportSocket::new(config).connect().await;
    assert!(matches!(result, Err(ConnectError::Io(_))));
}

#[cfg(feature = "tls")]
#[tokio::test]
async fn tls_handshake_failure() {
    let (listener, config) = listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 16];
        let _ = socket.read(&mut buf).await;
        let _ = socket.write_all(b"HTTP/1.0 400 Bad Request\r\n\r\n").await;
    });

    let result = timeout(WAIT, TransportSocket::new(config.tls(true)).connect())
        .await
        .unwrap();
    assert!(matches!(result, Err(ConnectError::Handshake(_))));
    server.await.unwrap();
}

#[cfg(feature = "tls")]
#[test]
fn tls_configs() {
    assert!(default_tls_config(rustls::ALL_VERSIONS).is_ok());
    assert!(default_tls_config(&[&rustls::version::TLS13]).is_ok());
    assert!(matches!(default_tls_config(&[]), Err(ConnectError::Tls(_))));
}

#[test]
fn config_builder() {
    let config = TransportConfig::default();
    assert_eq!(config.host_name(), "localhost");
    assert_eq!(config.port_number(), 5222);
    assert!(!config.is_tls());

    let config = config.host("example.com").port(5223).tls(true).read_buffer_size(0);
    assert_eq!(config.host_name(), "example.com");
    assert_eq!(config.port_number(), 5223);
    assert!(config.is_tls());
    assert_eq!(config.read_buffer_size, 1);
}
