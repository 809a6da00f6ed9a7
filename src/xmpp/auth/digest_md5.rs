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
use std::rc::Rc;

use base64::prelude::*;
use md5::Digest;
use md5::Md5;
use tracing::debug;

use super::decode_payload;
use super::failure;
use super::generate_nonce;
use super::parse_challenge;
use super::sasl_event;
use crate::Connection;
use crate::Event;
use crate::EventListener;
use crate::ListenerContext;
use crate::Outbox;
use crate::Transport;
use crate::XmppError;
use crate::constants::SASL_NS;

const MECHANISM: &str = "DIGEST-MD5";

const NONCE_COUNT: &str = "00000001";

const QOP: &str = "auth";

/// The `response` value of a DIGEST-MD5 exchange, without `authzid`.
pub(super) fn response_digest(
    username: &str,
    realm: &str,
    password: &str,
    nonce: &str,
    cnonce: &str,
    digest_uri: &str,
) -> String {
    let mut a1 = Md5::digest(format!("{}:{}:{}", username, realm, password)).to_vec();
    a1.extend_from_slice(format!(":{}:{}", nonce, cnonce).as_bytes());
    let ha1 = hex::encode(Md5::digest(&a1));
    let ha2 = hex::encode(Md5::digest(format!("AUTHENTICATE:{}", digest_uri)));
    hex::encode(Md5::digest(format!(
        "{}:{}:{}:{}:{}:{}",
        ha1, nonce, NONCE_COUNT, cnonce, QOP, ha2
    )))
}

/// Credentials and client nonce of one DIGEST-MD5 exchange.
pub struct DigestMd5Session {
    username: String,
    password: String,
    host: String,
    cnonce: String,
}

impl DigestMd5Session {
    pub fn new(username: &str, password: &str, host: &str) -> DigestMd5Session {
        DigestMd5Session::with_cnonce(username, password, host, &generate_nonce())
    }

    pub fn with_cnonce(
        username: &str,
        password: &str,
        host: &str,
        cnonce: &str,
    ) -> DigestMd5Session {
        DigestMd5Session {
            username: username.to_string(),
            password: password.to_string(),
            host: host.to_string(),
            cnonce: cnonce.to_string(),
        }
    }

    /// Answers a decoded challenge.
    ///
    /// Returns `None` for the final `rspauth` challenge, which takes an
    /// empty response.
    ///
    /// # Errors
    ///
    /// [XmppError::Authentication] on an empty challenge or one without a
    /// nonce.
    pub fn response(&self, challenge: &str) -> Result<Option<String>, XmppError> {
        if challenge.is_empty() {
            return Err(XmppError::authentication(format!(
                "error when receiving challenge: \"{}\"",
                challenge
            )));
        }
        let values = parse_challenge(challenge);
        if values.contains_key("rspauth") {
            return Ok(None);
        }
        let Some(nonce) = values.get("nonce") else {
            return Err(XmppError::authentication("challenge without nonce"));
        };
        let realm = values.get("realm").map_or(self.host.as_str(), String::as_str);
        let digest_uri = format!("xmpp/{}", self.host);
        let response = response_digest(
            &self.username,
            realm,
            &self.password,
            nonce,
            &self.cnonce,
            &digest_uri,
        );
        Ok(Some(format!(
            "username=\"{}\",realm=\"{}\",nonce=\"{}\",cnonce=\"{}\",nc={},qop={},\
             digest-uri=\"{}\",response={},charset=utf-8",
            self.username, realm, nonce, self.cnonce, NONCE_COUNT, QOP, digest_uri, response
        )))
    }
}

/// SASL DIGEST-MD5 listener, for servers without SCRAM.
///
/// Unlike SCRAM, an empty challenge is an immediate error.
#[derive(Default)]
pub struct DigestMd5Authentication {
    blocking: Cell<bool>,
    session: RefCell<Option<DigestMd5Session>>,
}

impl DigestMd5Authentication {
    pub fn new() -> DigestMd5Authentication {
        DigestMd5Authentication::default()
    }

    /// Runs the whole exchange against the `to` domain of the connection.
    pub fn authenticate<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        username: &str,
        password: &str,
    ) -> Result<(), XmppError> {
        let session = DigestMd5Session::new(username, password, connection.options().to());
        self.authenticate_with(connection, session)
    }

    pub fn authenticate_with<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        session: DigestMd5Session,
    ) -> Result<(), XmppError> {
        *self.session.borrow_mut() = Some(session);
        connection.send(&format!(
            "<auth xmlns=\"{}\" mechanism=\"{}\"/>",
            SASL_NS, MECHANISM
        ))
    }

    fn fail(&self, err: XmppError) -> Result<(), XmppError> {
        self.blocking.set(false);
        self.session.borrow_mut().take();
        Err(err)
    }

    fn on_auth(&self, event: &Event) -> Result<(), XmppError> {
        if event.is_start_tag() && event.element()?.attribute("mechanism") == Some(MECHANISM) {
            self.blocking.set(true);
        }
        Ok(())
    }

    fn on_challenge(&self, event: &Event, outbox: &Outbox) -> Result<(), XmppError> {
        if !event.is_end_tag() || !self.blocking.get() {
            return Ok(());
        }
        let response = decode_payload(&event.element()?.text()).and_then(|challenge| {
            match self.session.borrow().as_ref() {
                Some(session) => session.response(&challenge),
                None => Err(XmppError::authentication("challenge without authentication")),
            }
        });
        match response {
            Ok(Some(response)) => {
                debug!(mechanism = MECHANISM, "answering challenge");
                outbox.push(format!(
                    "<response xmlns=\"{}\">{}</response>",
                    SASL_NS,
                    BASE64_STANDARD.encode(response)
                ));
                Ok(())
            }
            Ok(None) => {
                outbox.push(format!("<response xmlns=\"{}\"/>", SASL_NS));
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    fn on_success(&self, event: &Event) -> Result<(), XmppError> {
        if event.is_end_tag() && self.blocking.get() {
            self.blocking.set(false);
            self.session.borrow_mut().take();
        }
        Ok(())
    }

    fn on_failure(&self, event: &Event) -> Result<(), XmppError> {
        if !event.is_end_tag() || !self.blocking.get() {
            return Ok(());
        }
        self.fail(failure(event.element()?))
    }
}

impl EventListener for DigestMd5Authentication {
    fn name(&self) -> &'static str {
        MECHANISM
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
