/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

pub const CLIENT_PORT: u16 = 5222;

pub const STREAM_NS: &str = crate::STREAM_NS;

pub const CLIENT_NS: &str = "jabber:client";

pub const SASL_NS: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

pub const STREAM_END: &str = "</stream:stream>";

pub const TCP_SCHEME: &str = "tcp://";

pub const TLS_SCHEME: &str = "tls://";

/// Opening header of a client stream addressed to `to`.
pub fn stream_start(to: &str) -> String {
    format!(
        "{}\n<stream:stream to=\"{}\" xmlns:stream=\"{}\" xmlns=\"{}\" version=\"1.0\">",
        XML_DECLARATION,
        crate::escape(to),
        STREAM_NS,
        CLIENT_NS
    )
}
