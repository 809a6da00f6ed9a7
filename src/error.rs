/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::borrow::Cow;
use std::time::Duration;

use crate::ParseError;

/// Errors surfaced by the event bus, the stream parser and the connection.
///
/// Nothing is retried automatically except the single plaintext to TLS
/// reconnect of [Connection](crate::Connection). Every other error
/// propagates synchronously to the caller of `send`, `receive` or
/// `authenticate`.
#[derive(Debug, thiserror::Error)]
pub enum XmppError {
    /// Socket level I/O failure.
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    #[cfg(feature = "xmpp")]
    #[error("TLS failure: {0}")]
    Tls(#[from] rustls::Error),

    /// Nothing was received within the configured window.
    #[error("connection timed out after ({}) seconds", .0.as_secs())]
    Timeout(Duration),

    /// Structurally invalid XML. Never absorbed silently.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Nonce or server signature mismatch, or a server side rejection.
    ///
    /// A mismatch usually means an active attacker sits between the
    /// client and the server, so the attempt is aborted for good.
    #[error("authentication failed: {0}")]
    Authentication(Cow<'static, str>),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("the offset {0} is out of range")]
    OutOfRange(usize),
}

impl XmppError {
    pub(crate) fn authentication(reason: impl Into<Cow<'static, str>>) -> Self {
        XmppError::Authentication(reason.into())
    }
}
