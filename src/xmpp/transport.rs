/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::io;
use std::io::Read;
use std::io::Write;
use std::net::Shutdown;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use rustls::ClientConnection;
use rustls::RootCertStore;
use rustls::StreamOwned;
use rustls::SupportedProtocolVersion;
use rustls::pki_types::ServerName;
use tracing::debug;
use tracing::info;

use super::constants::CLIENT_PORT;
use super::constants::TCP_SCHEME;
use super::constants::TLS_SCHEME;
use crate::XmppError;

/// TLS protocol versions allowed by [Transport::enable_encryption].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CryptoMethod {
    Tls12,
    Tls13,
    #[default]
    Any,
}

static TLS12_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS12];

static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

impl CryptoMethod {
    fn versions(self) -> &'static [&'static SupportedProtocolVersion] {
        match self {
            CryptoMethod::Tls12 => TLS12_ONLY,
            CryptoMethod::Tls13 => TLS13_ONLY,
            CryptoMethod::Any => rustls::DEFAULT_VERSIONS,
        }
    }
}

/// Byte pipe under a [Connection](crate::Connection).
pub trait Transport {
    /// Current address, `tcp://host[:port]` or `tls://host[:port]`.
    fn address(&self) -> &str;

    /// Changes the address used by the next [connect](Transport::connect).
    fn set_address(&mut self, address: &str);

    fn connect(&mut self, timeout: Duration) -> Result<(), XmppError>;

    /// Reads at most `max` bytes. An empty result means nothing arrived
    /// within the read timeout.
    fn read(&mut self, max: usize) -> Result<Vec<u8>, XmppError>;

    fn write(&mut self, bytes: &[u8]) -> Result<usize, XmppError>;

    fn close(&mut self) -> Result<(), XmppError>;

    fn set_blocking(&mut self, blocking: bool) -> Result<(), XmppError>;

    fn enable_encryption(&mut self, enable: bool, method: CryptoMethod) -> Result<(), XmppError>;
}

enum Socket {
    Tcp(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Socket {
    fn tcp(&self) -> &TcpStream {
        match self {
            Socket::Tcp(tcp) => tcp,
            Socket::Tls(tls) => &tls.sock,
        }
    }
}

// Rust resolver does require a port number but does NOT provide
// a way to provide a default one :(
fn need_port(host: &str) -> bool {
    let column_pos = host.rfind(':');
    let bracket_pos = host.rfind(']');
    match (column_pos, bracket_pos) {
        (None, None) | (None, Some(_)) => true,
        (Some(_), None) => host.find(':') != column_pos,
        (Some(column), Some(bracket)) => column < bracket,
    }
}

fn host_name(host: &str) -> &str {
    let name = if need_port(host) {
        host
    } else {
        host.rsplit_once(':').map_or(host, |(name, _)| name)
    };
    name.trim_start_matches('[').trim_end_matches(']')
}

/// Splits an address into its TLS flag and `host[:port]` part.
fn split_address(address: &str) -> (bool, &str) {
    if let Some(host) = address.strip_prefix(TLS_SCHEME) {
        (true, host)
    } else if let Some(host) = address.strip_prefix(TCP_SCHEME) {
        (false, host)
    } else {
        (false, address)
    }
}

fn resolve(host: &str) -> io::Result<Vec<SocketAddr>> {
    let addrs = if need_port(host) {
        (host_name(host), CLIENT_PORT).to_socket_addrs()?
    } else {
        host.to_socket_addrs()?
    };
    Ok(addrs.collect())
}

fn start_tls(
    host: &str,
    tcp: TcpStream,
    method: CryptoMethod,
) -> Result<Box<StreamOwned<ClientConnection, TcpStream>>, XmppError> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = ClientConfig::builder_with_protocol_versions(method.versions())
        .with_root_certificates(roots)
        .with_no_client_auth();
    let name = ServerName::try_from(host_name(host).to_string())
        .map_err(|err| XmppError::InvalidArgument(format!("{}: {}", host, err)))?;
    let connection = ClientConnection::new(Arc::new(config), name)?;
    Ok(Box::new(StreamOwned::new(connection, tcp)))
}

fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

fn not_connected() -> XmppError {
    io::Error::from(io::ErrorKind::NotConnected).into()
}

/// TCP socket client with optional TLS.
///
/// A bare `host[:port]` address is taken as `tcp://host[:port]`. The
/// port defaults to 5222. Reads return after the connection timeout
/// with an empty buffer if nothing arrived.
pub struct SocketClient {
    address: String,
    socket: Option<Socket>,
}

impl SocketClient {
    pub fn new(address: &str) -> SocketClient {
        let address = if address.starts_with(TLS_SCHEME) || address.starts_with(TCP_SCHEME) {
            address.to_string()
        } else {
            format!("{}{}", TCP_SCHEME, address)
        };
        SocketClient {
            address,
            socket: None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.socket, Some(Socket::Tls(_)))
    }
}

impl Transport for SocketClient {
    fn address(&self) -> &str {
        &self.address
    }

    fn set_address(&mut self, address: &str) {
        self.address = address.to_string();
    }

    fn connect(&mut self, timeout: Duration) -> Result<(), XmppError> {
        let (secure, host) = split_address(&self.address);
        let mut last_error = io::Error::new(
            io::ErrorKind::NotFound,
            format!("no address found for {}", host),
        );
        let mut tcp = None;
        for addr in resolve(host)? {
            debug!(%addr, "trying");
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    tcp = Some(stream);
                    break;
                }
                Err(err) => last_error = err,
            }
        }
        let Some(tcp) = tcp else {
            return Err(last_error.into());
        };
        // a zero duration is rejected by the socket layer
        tcp.set_read_timeout(Some(timeout).filter(|t| !t.is_zero()))?;

        self.socket = Some(if secure {
            Socket::Tls(start_tls(host, tcp, CryptoMethod::Any)?)
        } else {
            Socket::Tcp(tcp)
        });
        info!(address = %self.address, "connected");
        Ok(())
    }

    fn read(&mut self, max: usize) -> Result<Vec<u8>, XmppError> {
        let mut buffer = vec![0u8; max];
        let result = match self.socket.as_mut() {
            Some(Socket::Tcp(tcp)) => tcp.read(&mut buffer),
            Some(Socket::Tls(tls)) => tls.read(&mut buffer),
            None => return Err(not_connected()),
        };
        match result {
            Ok(0) => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(nr_read) => {
                buffer.truncate(nr_read);
                Ok(buffer)
            }
            Err(err) if is_idle(&err) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, XmppError> {
        let written = match self.socket.as_mut() {
            Some(Socket::Tcp(tcp)) => tcp.write(bytes)?,
            Some(Socket::Tls(tls)) => {
                let written = tls.write(bytes)?;
                tls.flush()?;
                written
            }
            None => return Err(not_connected()),
        };
        Ok(written)
    }

    fn close(&mut self) -> Result<(), XmppError> {
        let Some(socket) = self.socket.take() else {
            return Ok(());
        };
        match socket {
            Socket::Tls(mut tls) => {
                tls.conn.send_close_notify();
                let _ = tls.conn.complete_io(&mut tls.sock);
                let _ = tls.sock.shutdown(Shutdown::Both);
            }
            Socket::Tcp(tcp) => {
                let _ = tcp.shutdown(Shutdown::Both);
            }
        }
        info!(address = %self.address, "closed");
        Ok(())
    }

    fn set_blocking(&mut self, blocking: bool) -> Result<(), XmppError> {
        match self.socket.as_ref() {
            Some(socket) => Ok(socket.tcp().set_nonblocking(!blocking)?),
            None => Err(not_connected()),
        }
    }

    fn enable_encryption(&mut self, enable: bool, method: CryptoMethod) -> Result<(), XmppError> {
        let socket = match self.socket.take() {
            Some(socket) => socket,
            None => return Err(not_connected()),
        };
        let socket = match (enable, socket) {
            (true, Socket::Tcp(tcp)) => {
                let (_, host) = split_address(&self.address);
                debug!(?method, "starting TLS");
                Socket::Tls(start_tls(host, tcp, method)?)
            }
            (false, Socket::Tls(mut tls)) => {
                tls.conn.send_close_notify();
                tls.conn.complete_io(&mut tls.sock)?;
                Socket::Tcp(tls.sock)
            }
            (_, socket) => socket,
        };
        self.socket = Some(socket);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports() {
        assert!(need_port("example.com"));
        assert!(!need_port("example.com:5223"));
        assert!(need_port("[::1]"));
        assert!(!need_port("[::1]:5223"));
        assert!(!need_port("127.0.0.1:5222"));
    }

    #[test]
    fn host_names() {
        assert_eq!(host_name("example.com"), "example.com");
        assert_eq!(host_name("example.com:5223"), "example.com");
        assert_eq!(host_name("[::1]:5223"), "::1");
        assert_eq!(host_name("[::1]"), "::1");
    }

    #[test]
    fn addresses() {
        assert_eq!(split_address("tls://jabber.org"), (true, "jabber.org"));
        assert_eq!(split_address("tcp://jabber.org:5222"), (false, "jabber.org:5222"));
        assert_eq!(split_address("jabber.org"), (false, "jabber.org"));
        assert_eq!(SocketClient::new("jabber.org").address(), "tcp://jabber.org");
        assert_eq!(SocketClient::new("tls://jabber.org").address(), "tls://jabber.org");
    }

    #[test]
    fn resolve_literal() {
        let addrs = resolve("127.0.0.1").unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:5222".parse::<SocketAddr>().unwrap()]);
        let addrs = resolve("[::1]:5223").unwrap();
        assert_eq!(addrs, vec!["[::1]:5223".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn unconnected() {
        let mut client = SocketClient::new("localhost");
        assert!(matches!(client.read(16), Err(XmppError::Transport(_))));
        assert!(client.close().is_ok());
        assert!(!client.is_encrypted());
    }
}
