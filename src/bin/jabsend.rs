/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use xmppwire::Connection;
use xmppwire::ConnectionOptions;
use xmppwire::DigestMd5Authentication;
use xmppwire::PlainAuthentication;
use xmppwire::ScramAuthentication;
use xmppwire::ScramMechanism;
use xmppwire::SocketClient;
use xmppwire::Transport;
use xmppwire::XmppError;
use xmppwire::constants::TLS_SCHEME;

#[derive(Debug, Parser)]
#[command(
    name = "jabsend",
    version = xmppwire::VERSION,
    about = "Log in to an XMPP server and optionally send a raw stanza",
    after_help = "Report issues at https://github.com/meduketto/iksemel-rust/issues"
)]
struct Args {
    /// Jabber ID to log in with (example: juliet@example.com)
    #[arg(short, long)]
    jid: String,
    /// Password, prompted for if not given
    #[arg(short, long)]
    password: Option<String>,
    /// Server address, tcp://host[:port] or tls://host[:port]; defaults to the JID domain
    #[arg(short, long)]
    address: Option<String>,
    /// SASL mechanism: SCRAM-SHA-1, SCRAM-SHA-256, SCRAM-SHA-512, DIGEST-MD5 or PLAIN
    #[arg(short, long, default_value = "SCRAM-SHA-256")]
    mechanism: String,
    /// Raw XML stanza to send after logging in
    #[arg(short, long)]
    stanza: Option<String>,
    /// Connection timeout in seconds
    #[arg(short, long, default_value_t = 30)]
    timeout: u64,
    /// Print the protocol traffic
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn authenticate(
    conn: &mut Connection<SocketClient>,
    mechanism: &str,
    username: &str,
    password: &str,
) -> Result<(), XmppError> {
    if mechanism == "PLAIN" {
        if !conn.transport().address().starts_with(TLS_SCHEME) {
            tracing::warn!("sending a PLAIN password over an unencrypted connection");
        }
        let plain = Rc::new(PlainAuthentication::new());
        conn.add_listener(plain.clone());
        return plain.authenticate(conn, username, password);
    }
    if mechanism == "DIGEST-MD5" {
        let digest = Rc::new(DigestMd5Authentication::new());
        conn.add_listener(digest.clone());
        return digest.authenticate(conn, username, password);
    }
    let Some(mechanism) = ScramMechanism::from_name(mechanism) else {
        return Err(XmppError::InvalidArgument(format!(
            "unsupported SASL mechanism {}",
            mechanism
        )));
    };
    let scram = Rc::new(ScramAuthentication::new(mechanism));
    conn.add_listener(scram.clone());
    scram.authenticate(conn, username, password)
}

fn run(args: Args) -> Result<(), XmppError> {
    let Some((username, domain)) = args.jid.split_once('@') else {
        return Err(XmppError::InvalidArgument(format!(
            "{} is not a bare JID",
            args.jid
        )));
    };
    let domain = domain.split_once('/').map_or(domain, |(domain, _)| domain);
    let password = match args.password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ")?,
    };

    let address = args.address.as_deref().unwrap_or(domain);
    let options =
        ConnectionOptions::new(domain).connection_timeout(Duration::from_secs(args.timeout));
    let mut conn = Connection::new(SocketClient::new(address), options);

    conn.connect()?;
    authenticate(&mut conn, &args.mechanism, username, &password)?;
    tracing::info!(jid = %args.jid, "authenticated");

    conn.reset_streams();
    conn.connect()?;
    conn.set_ready(true);

    if let Some(stanza) = &args.stanza {
        conn.send(stanza)?;
    }
    conn.disconnect()
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
