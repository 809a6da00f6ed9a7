/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod entities;
mod error;
mod event;
mod parser;
mod stream;
#[cfg(feature = "xmpp")]
mod xmpp;

pub use entities::escape;

pub use error::XmppError;

pub use event::Event;
pub use event::EventHandler;
pub use event::EventManager;
pub use event::Parameter;
pub use event::WILDCARD;

pub use parser::ParseError;
pub use parser::SaxElement;
pub use parser::SaxHandler;
pub use parser::SaxParser;

pub use stream::Document;
pub use stream::Element;
pub use stream::Node;
pub use stream::XmlStream;
pub use stream::STREAM_NS;

#[cfg(feature = "xmpp")]
pub use xmpp::constants;
#[cfg(feature = "xmpp")]
pub use xmpp::CryptoMethod;
#[cfg(feature = "xmpp")]
pub use xmpp::Connection;
#[cfg(feature = "xmpp")]
pub use xmpp::ConnectionOptions;
#[cfg(feature = "xmpp")]
pub use xmpp::DigestMd5Authentication;
#[cfg(feature = "xmpp")]
pub use xmpp::DigestMd5Session;
#[cfg(feature = "xmpp")]
pub use xmpp::EventListener;
#[cfg(feature = "xmpp")]
pub use xmpp::ListenerContext;
#[cfg(feature = "xmpp")]
pub use xmpp::Outbox;
#[cfg(feature = "xmpp")]
pub use xmpp::PlainAuthentication;
#[cfg(feature = "xmpp")]
pub use xmpp::ScramAuthentication;
#[cfg(feature = "xmpp")]
pub use xmpp::ScramMechanism;
#[cfg(feature = "xmpp")]
pub use xmpp::ScramSession;
#[cfg(feature = "xmpp")]
pub use xmpp::SocketClient;
#[cfg(feature = "xmpp")]
pub use xmpp::parse_challenge;
#[cfg(feature = "xmpp")]
pub use xmpp::Transport;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
