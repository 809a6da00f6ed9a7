/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;

use base64::prelude::*;
use hmac::digest::InvalidLength;
use regex::Regex;
use tracing::debug;

use super::auth_stanza;
use super::decode_payload;
use super::failure;
use super::generate_nonce;
use super::sasl_event;
use crate::Connection;
use crate::Event;
use crate::EventListener;
use crate::ListenerContext;
use crate::Outbox;
use crate::Transport;
use crate::XmppError;
use crate::constants::SASL_NS;

/// GS2 header "n,," in base64, no channel binding.
const CHANNEL_BINDING: &str = "biws";

macro_rules! scram_hash {
    ($module:ident, $hash:ty) => {
        mod $module {
            use ::hmac::Hmac;
            use ::hmac::Mac;
            use ::hmac::digest::InvalidLength;
            use ::sha2::Digest;

            pub(super) fn digest(data: &[u8]) -> Vec<u8> {
                <$hash as Digest>::digest(data).to_vec()
            }

            pub(super) fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, InvalidLength> {
                let mut mac = <Hmac<$hash> as Mac>::new_from_slice(key)?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }

            pub(super) fn pbkdf2(password: &[u8], salt: &[u8], rounds: u32) -> Vec<u8> {
                let mut salted = vec![0u8; <$hash as Digest>::output_size()];
                ::pbkdf2::pbkdf2_hmac::<$hash>(password, salt, rounds, &mut salted);
                salted
            }
        }
    };
}

scram_hash!(sha_1, sha1::Sha1);
scram_hash!(sha_256, sha2::Sha256);
scram_hash!(sha_512, sha2::Sha512);

#[derive(Clone, Copy)]
struct HashFunction {
    digest: fn(&[u8]) -> Vec<u8>,
    hmac: fn(&[u8], &[u8]) -> Result<Vec<u8>, InvalidLength>,
    pbkdf2: fn(&[u8], &[u8], u32) -> Vec<u8>,
}

/// A SCRAM variant: the SASL mechanism name and its hash function.
#[derive(Clone, Copy)]
pub struct ScramMechanism {
    name: &'static str,
    hash: HashFunction,
}

impl ScramMechanism {
    pub const SHA_1: ScramMechanism = ScramMechanism {
        name: "SCRAM-SHA-1",
        hash: HashFunction {
            digest: sha_1::digest,
            hmac: sha_1::hmac,
            pbkdf2: sha_1::pbkdf2,
        },
    };

    pub const SHA_256: ScramMechanism = ScramMechanism {
        name: "SCRAM-SHA-256",
        hash: HashFunction {
            digest: sha_256::digest,
            hmac: sha_256::hmac,
            pbkdf2: sha_256::pbkdf2,
        },
    };

    pub const SHA_512: ScramMechanism = ScramMechanism {
        name: "SCRAM-SHA-512",
        hash: HashFunction {
            digest: sha_512::digest,
            hmac: sha_512::hmac,
            pbkdf2: sha_512::pbkdf2,
        },
    };

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Looks up a variant by its SASL mechanism name.
    pub fn from_name(name: &str) -> Option<ScramMechanism> {
        [Self::SHA_1, Self::SHA_256, Self::SHA_512]
            .into_iter()
            .find(|mechanism| mechanism.name == name)
    }

    fn hmac(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, XmppError> {
        (self.hash.hmac)(key, data).map_err(|_| XmppError::authentication("invalid HMAC key"))
    }
}

impl fmt::Debug for ScramMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScramMechanism").field(&self.name).finish()
    }
}

fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(\w+)=(?:"([^"]+)"|([^,]+))"#).expect("SCRAM attribute regex is valid")
    })
}

/// Parses a SCRAM message into its attributes.
///
/// Values are either double quoted or run up to the next comma. An
/// unquoted value replaces a quoted one with the same name.
pub fn parse_challenge(challenge: &str) -> HashMap<String, String> {
    let mut quoted = HashMap::new();
    let mut unquoted = HashMap::new();
    for captures in attribute_regex().captures_iter(challenge) {
        let name = captures[1].to_string();
        if let Some(value) = captures.get(3) {
            unquoted.insert(name, value.as_str().to_string());
        } else if let Some(value) = captures.get(2) {
            quoted.insert(name, value.as_str().to_string());
        }
    }
    quoted.extend(unquoted);
    quoted
}

/// State of one SCRAM exchange.
pub struct ScramSession {
    mechanism: ScramMechanism,
    password: String,
    client_nonce: String,
    first_message_bare: String,
    server_signature: Option<String>,
}

impl ScramSession {
    /// Starts an exchange with a fresh random client nonce.
    pub fn new(mechanism: ScramMechanism, username: &str, password: &str) -> ScramSession {
        ScramSession::with_nonce(mechanism, username, password, &generate_nonce())
    }

    pub fn with_nonce(
        mechanism: ScramMechanism,
        username: &str,
        password: &str,
        nonce: &str,
    ) -> ScramSession {
        ScramSession {
            mechanism,
            password: password.to_string(),
            client_nonce: nonce.to_string(),
            first_message_bare: format!("n={},r={}", escape_username(username), nonce),
            server_signature: None,
        }
    }

    pub fn mechanism(&self) -> ScramMechanism {
        self.mechanism
    }

    pub fn client_nonce(&self) -> &str {
        &self.client_nonce
    }

    /// The client-first message, sent inside `<auth/>`.
    pub fn initial_message(&self) -> String {
        format!("n,,{}", self.first_message_bare)
    }

    /// Computes the client-final message for the decoded server-first
    /// message, and remembers the server signature to expect.
    ///
    /// # Errors
    ///
    /// [XmppError::Authentication] if the server nonce does not extend the
    /// client nonce, or the salt or iteration count is unusable.
    pub fn client_final_message(&mut self, challenge: &str) -> Result<String, XmppError> {
        let values = parse_challenge(challenge);
        let server_nonce = values.get("r").map_or("", String::as_str);
        if !server_nonce.starts_with(&self.client_nonce) {
            return Err(XmppError::authentication(
                "server nonce does not start with the client nonce, probably a MitM attack",
            ));
        }
        let salt = BASE64_STANDARD
            .decode(values.get("s").map_or("", String::as_str))
            .map_err(|_| XmppError::authentication("invalid salt"))?;
        let iterations = values
            .get("i")
            .and_then(|i| i.parse::<u32>().ok())
            .filter(|i| *i > 0)
            .ok_or_else(|| XmppError::authentication("invalid iteration count"))?;

        let hash = self.mechanism.hash;
        let final_message = format!("c={},r={}", CHANNEL_BINDING, server_nonce);
        let salted_password = (hash.pbkdf2)(self.password.as_bytes(), &salt, iterations);
        let client_key = self.mechanism.hmac(&salted_password, b"Client Key")?;
        let stored_key = (hash.digest)(&client_key);
        let auth_message = format!("{},{},{}", self.first_message_bare, challenge, final_message);
        let client_signature = self.mechanism.hmac(&stored_key, auth_message.as_bytes())?;
        let client_proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(key, signature)| key ^ signature)
            .collect();
        let server_key = self.mechanism.hmac(&salted_password, b"Server Key")?;
        let server_signature = self.mechanism.hmac(&server_key, auth_message.as_bytes())?;
        self.server_signature = Some(BASE64_STANDARD.encode(server_signature));

        Ok(format!(
            "{},p={}",
            final_message,
            BASE64_STANDARD.encode(client_proof)
        ))
    }

    /// Checks the `v` attribute of the decoded server-final message.
    pub fn verify_server_final(&self, message: &str) -> Result<(), XmppError> {
        let values = parse_challenge(message);
        if let Some(error) = values.get("e") {
            return Err(XmppError::authentication(format!("server error: {}", error)));
        }
        match (values.get("v"), &self.server_signature) {
            (Some(received), Some(expected)) if received == expected => Ok(()),
            _ => Err(XmppError::authentication(
                "server signature does not match, probably a MitM attack",
            )),
        }
    }
}

/// SASL SCRAM listener.
///
/// Blocks the connection from its own `<auth/>` until the server
/// answers with `<success/>` or `<failure/>`.
pub struct ScramAuthentication {
    mechanism: ScramMechanism,
    blocking: Cell<bool>,
    session: RefCell<Option<ScramSession>>,
}

impl ScramAuthentication {
    pub fn new(mechanism: ScramMechanism) -> ScramAuthentication {
        ScramAuthentication {
            mechanism,
            blocking: Cell::new(false),
            session: RefCell::new(None),
        }
    }

    /// Runs the whole exchange. Returns once the server accepted the
    /// credentials and proved its own knowledge of them.
    pub fn authenticate<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        username: &str,
        password: &str,
    ) -> Result<(), XmppError> {
        let session = ScramSession::new(self.mechanism, username, password);
        let stanza = auth_stanza(self.mechanism.name, session.initial_message().as_bytes());
        *self.session.borrow_mut() = Some(session);
        connection.send(&stanza)
    }

    /// Starts an exchange with a known session, e.g. a fixed nonce.
    pub fn authenticate_with<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        session: ScramSession,
    ) -> Result<(), XmppError> {
        let stanza = auth_stanza(self.mechanism.name, session.initial_message().as_bytes());
        *self.session.borrow_mut() = Some(session);
        connection.send(&stanza)
    }

    fn fail(&self, err: XmppError) -> Result<(), XmppError> {
        self.blocking.set(false);
        self.session.borrow_mut().take();
        Err(err)
    }

    fn on_auth(&self, event: &Event) -> Result<(), XmppError> {
        if event.is_start_tag() && event.element()?.attribute("mechanism") == Some(self.mechanism.name)
        {
            self.blocking.set(true);
        }
        Ok(())
    }

    fn on_challenge(&self, event: &Event, outbox: &Outbox) -> Result<(), XmppError> {
        if !event.is_end_tag() || !self.blocking.get() {
            return Ok(());
        }
        let challenge = decode_payload(&event.element()?.text())?;
        let response = match self.session.borrow_mut().as_mut() {
            Some(session) => session.client_final_message(&challenge),
            None => Err(XmppError::authentication("challenge without authentication")),
        };
        match response {
            Ok(response) => {
                debug!(mechanism = self.mechanism.name, "answering challenge");
                outbox.push(format!(
                    "<response xmlns=\"{}\">{}</response>",
                    SASL_NS,
                    BASE64_STANDARD.encode(response)
                ));
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    fn on_success(&self, event: &Event) -> Result<(), XmppError> {
        if !event.is_end_tag() || !self.blocking.get() {
            return Ok(());
        }
        let message = decode_payload(&event.element()?.text())?;
        let verified = match self.session.borrow().as_ref() {
            Some(session) => session.verify_server_final(&message),
            None => Err(XmppError::authentication("success without authentication")),
        };
        match verified {
            Ok(()) => {
                self.blocking.set(false);
                self.session.borrow_mut().take();
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    fn on_failure(&self, event: &Event) -> Result<(), XmppError> {
        if !event.is_end_tag() || !self.blocking.get() {
            return Ok(());
        }
        self.fail(failure(event.element()?))
    }
}

impl EventListener for ScramAuthentication {
    fn name(&self) -> &'static str {
        self.mechanism.name
    }

    fn attach_events(self: Rc<Self>, ctx: &mut ListenerContext<'_>) {
        let listener = self.clone();
        ctx.output
            .attach_fn(&sasl_event("auth"), move |event: &Event| listener.on_auth(event));

        let listener = self.clone();
        let outbox = ctx.outbox.clone();
        ctx.input
            .attach_fn(&sasl_event("challenge"), move |event: &Event| {
                listener.on_challenge(event, &outbox)
            });

        let listener = self.clone();
        ctx.input
            .attach_fn(&sasl_event("success"), move |event: &Event| listener.on_success(event));

        let listener = self;
        ctx.input
            .attach_fn(&sasl_event("failure"), move |event: &Event| listener.on_failure(event));
    }

    fn is_blocking(&self) -> bool {
        self.blocking.get()
    }
}
