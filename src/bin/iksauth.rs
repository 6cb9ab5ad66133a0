/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use ikstream::AuthEvent;
use ikstream::ClientEvent;
use ikstream::ProtocolClient;
use ikstream::SaslAuthenticator;
use ikstream::constants::CLIENT_PORT;
use ikstream::plain_credential;

/// This tool authenticates to an XMPP server.
#[derive(Parser, Debug)]
#[command(
    version,
    about,
    after_help = "Report issues at https://github.com/meduketto/iksemel-rust/issues"
)]
struct Args {
    /// Server host name or address
    #[arg(long)]
    host: String,

    #[arg(long, default_value_t = CLIENT_PORT)]
    port: u16,

    /// Use TLS from the start of the connection
    #[arg(long)]
    tls: bool,

    /// Domain put in the stream header (default: host)
    #[arg(long)]
    domain: Option<String>,

    #[arg(long)]
    user: String,

    /// Prompted for when not given
    #[arg(long)]
    password: Option<String>,

    #[arg(long, default_value = "PLAIN")]
    mechanism: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let password = match args.password {
        Some(password) => password,
        None => match rpassword::prompt_password("Password: ") {
            Ok(password) => password,
            Err(err) => {
                eprintln!("Error: cannot read password: {}", err);
                return ExitCode::FAILURE;
            }
        },
    };

    let (done, mut outcome) = mpsc::unbounded_channel::<bool>();

    let sasl = Arc::new(
        SaslAuthenticator::new().credential(
            args.mechanism.as_str(),
            plain_credential("", &args.user, &password),
        ),
    );
    let auth_done = done.clone();
    sasl.subscribe(move |event| {
        match event {
            AuthEvent::Succeeded(mechanism) => println!("Authenticated with {}", mechanism),
            AuthEvent::Failed {
                mechanism,
                condition,
            } => println!(
                "Authentication with {} failed: {}",
                mechanism,
                condition.as_deref().unwrap_or("unknown reason")
            ),
            AuthEvent::NoUsableMechanism { offered } => {
                println!("Server does not offer {} ({})", args.mechanism, offered.join(", "))
            }
        }
        let _ = auth_done.send(matches!(event, AuthEvent::Succeeded(_)));
    });

    let mut builder = ProtocolClient::build(args.host)
        .port(args.port)
        .tls(args.tls)
        .handler(sasl);
    if let Some(domain) = args.domain {
        builder = builder.stream_to(domain);
    }
    let client = builder
        .handler(Arc::new(
            move |_: &ProtocolClient, event: &ClientEvent<'_>| match event {
                ClientEvent::ConnectFailed(err) => {
                    eprintln!("Error: cannot connect: {}", err);
                    let _ = done.send(false);
                }
                ClientEvent::UnexpectedClose(err) => {
                    eprintln!("Error: connection lost: {}", err);
                    let _ = done.send(false);
                }
                ClientEvent::ParseError(err) => eprintln!("Error: bad stream data: {}", err),
                ClientEvent::DocumentEnd(_) => {
                    eprintln!("Error: server closed the stream");
                    let _ = done.send(false);
                }
                _ => (),
            },
        ))
        .build();

    if let Err(err) = client.connect() {
        eprintln!("Error: {}", err);
        return ExitCode::FAILURE;
    }
    let success = outcome.recv().await.unwrap_or(false);
    client.disconnect();
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
