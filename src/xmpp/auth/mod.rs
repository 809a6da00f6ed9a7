/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod digest_md5;
mod plain;
mod scram;

pub use digest_md5::DigestMd5Authentication;
pub use digest_md5::DigestMd5Session;
pub use plain::PlainAuthentication;
pub use scram::ScramAuthentication;
pub use scram::ScramMechanism;
pub use scram::ScramSession;
pub use scram::parse_challenge;

use base64::prelude::*;
use rand::Rng;

use crate::Element;
use crate::Node;
use crate::XmppError;
use crate::constants::SASL_NS;

const NONCE_SIZE: usize = 32;

/// Random client nonce, hex encoded.
fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_SIZE];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Event name of a SASL element.
fn sasl_event(name: &str) -> String {
    format!("{{{}}}{}", SASL_NS, name)
}

fn auth_stanza(mechanism: &str, payload: &[u8]) -> String {
    format!(
        "<auth xmlns=\"{}\" mechanism=\"{}\">{}</auth>",
        SASL_NS,
        mechanism,
        BASE64_STANDARD.encode(payload)
    )
}

/// Decodes the base64 text of a SASL element. A lone `=` stands for an
/// empty payload.
fn decode_payload(text: &str) -> Result<String, XmppError> {
    let text = text.trim();
    if text.is_empty() || text == "=" {
        return Ok(String::new());
    }
    let bytes = BASE64_STANDARD
        .decode(text)
        .map_err(|_| XmppError::authentication("invalid base64 payload"))?;
    String::from_utf8(bytes).map_err(|_| XmppError::authentication("payload is not UTF-8"))
}

/// Error for a `<failure/>` element, named after its condition child.
fn failure(element: &Element) -> XmppError {
    let condition = element.children().iter().find_map(|node| match node {
        Node::Element(child) => Some(child.name().to_string()),
        Node::Text(_) => None,
    });
    match condition {
        Some(condition) => XmppError::authentication(format!("server replied {}", condition)),
        None => XmppError::authentication("server replied failure"),
    }
}
