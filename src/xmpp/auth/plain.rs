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
use std::rc::Rc;

use super::auth_stanza;
use super::failure;
use super::sasl_event;
use crate::Connection;
use crate::Event;
use crate::EventListener;
use crate::ListenerContext;
use crate::Transport;
use crate::XmppError;

const MECHANISM: &str = "PLAIN";

/// SASL PLAIN listener. Only use it over an encrypted transport.
#[derive(Default)]
pub struct PlainAuthentication {
    blocking: Cell<bool>,
}

impl PlainAuthentication {
    pub fn new() -> PlainAuthentication {
        PlainAuthentication::default()
    }

    pub fn authenticate<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        username: &str,
        password: &str,
    ) -> Result<(), XmppError> {
        let payload = format!("\0{}\0{}", username, password);
        connection.send(&auth_stanza(MECHANISM, payload.as_bytes()))
    }

    fn on_auth(&self, event: &Event) -> Result<(), XmppError> {
        if event.is_start_tag() && event.element()?.attribute("mechanism") == Some(MECHANISM) {
            self.blocking.set(true);
        }
        Ok(())
    }

    fn on_success(&self, event: &Event) -> Result<(), XmppError> {
        if event.is_end_tag() {
            self.blocking.set(false);
        }
        Ok(())
    }

    fn on_failure(&self, event: &Event) -> Result<(), XmppError> {
        if !event.is_end_tag() || !self.blocking.get() {
            return Ok(());
        }
        self.blocking.set(false);
        Err(failure(event.element()?))
    }
}

impl EventListener for PlainAuthentication {
    fn name(&self) -> &'static str {
        MECHANISM
    }

    fn attach_events(self: Rc<Self>, ctx: &mut ListenerContext<'_>) {
        let listener = self.clone();
        ctx.output
            .attach_fn(&sasl_event("auth"), move |event: &Event| listener.on_auth(event));

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
