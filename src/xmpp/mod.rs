/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod auth;
mod connection;
pub mod constants;
mod listener;
mod options;
mod transport;

pub use auth::DigestMd5Authentication;
pub use auth::DigestMd5Session;
pub use auth::PlainAuthentication;
pub use auth::ScramAuthentication;
pub use auth::ScramMechanism;
pub use auth::ScramSession;
pub use auth::parse_challenge;
pub use connection::Connection;
pub use listener::EventListener;
pub use listener::ListenerContext;
pub use listener::Outbox;
pub use options::ConnectionOptions;
pub use transport::CryptoMethod;
pub use transport::SocketClient;
pub use transport::Transport;
