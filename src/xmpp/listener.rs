/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::EventManager;

/// Stanzas queued by event handlers.
///
/// Handlers run while a parser is in the middle of a chunk, so they
/// cannot write to the connection themselves. The connection sends the
/// queued stanzas, in order, as soon as the current chunk is done.
#[derive(Clone, Debug, Default)]
pub struct Outbox {
    queue: Rc<RefCell<VecDeque<String>>>,
}

impl Outbox {
    pub fn push(&self, stanza: impl Into<String>) {
        self.queue.borrow_mut().push_back(stanza.into());
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    pub(crate) fn pop(&self) -> Option<String> {
        self.queue.borrow_mut().pop_front()
    }
}

/// What a listener can reach while attaching its handlers.
pub struct ListenerContext<'a> {
    /// Events of received elements.
    pub input: &'a mut EventManager,
    /// Events of sent elements.
    pub output: &'a mut EventManager,
    /// Connection level events: `send`, `receive` and `logger`.
    pub connection: &'a mut EventManager,
    pub outbox: &'a Outbox,
}

/// A protocol extension plugged into a [Connection](crate::Connection).
pub trait EventListener {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    fn attach_events(self: Rc<Self>, ctx: &mut ListenerContext<'_>);

    /// While any listener is blocking, `send` keeps reading from the
    /// transport before it returns.
    fn is_blocking(&self) -> bool {
        false
    }
}
