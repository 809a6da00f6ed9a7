/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::Element;
use crate::XmppError;

/// Handlers attached under this name receive every event.
pub const WILDCARD: &str = "*";

/// A value carried by an [Event].
#[derive(Clone, Debug)]
pub enum Parameter {
    Element(Rc<Element>),
    Text(String),
    Bytes(Rc<[u8]>),
    Flag(bool),
    Level(tracing::Level),
}

/// Receiver of events.
///
/// Any `Fn(&Event) -> Result<(), XmppError>` closure is a handler.
pub trait EventHandler {
    fn invoke(&self, event: &Event) -> Result<(), XmppError>;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> Result<(), XmppError>,
{
    fn invoke(&self, event: &Event) -> Result<(), XmppError> {
        self(event)
    }
}

fn same_handler(a: &Rc<dyn EventHandler>, b: &Rc<dyn EventHandler>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// Immutable snapshot of a dispatched event.
///
/// The dispatcher derives a fresh snapshot after every handler, with
/// that handler appended to the event stack. A snapshot already handed
/// to a handler never changes.
#[derive(Clone)]
pub struct Event {
    name: Rc<str>,
    target: &'static str,
    parameters: Rc<[Parameter]>,
    stack: Vec<Rc<dyn EventHandler>>,
}

impl Event {
    pub fn new(name: &str, target: &'static str, parameters: Vec<Parameter>) -> Event {
        Event {
            name: name.into(),
            target,
            parameters: parameters.into(),
            stack: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label of the component which triggered the event.
    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Returns the parameter at `index`.
    ///
    /// # Errors
    ///
    /// [XmppError::OutOfRange] if there is no such parameter.
    pub fn parameter(&self, index: usize) -> Result<&Parameter, XmppError> {
        self.parameters
            .get(index)
            .ok_or(XmppError::OutOfRange(index))
    }

    /// Handlers which already ran for this dispatch, in call order.
    pub fn event_stack(&self) -> &[Rc<dyn EventHandler>] {
        &self.stack
    }

    /// Derives the next snapshot with `handler` appended to the stack.
    pub fn with_stack(&self, handler: Rc<dyn EventHandler>) -> Event {
        let mut stack = self.stack.clone();
        stack.push(handler);
        Event {
            name: self.name.clone(),
            target: self.target,
            parameters: self.parameters.clone(),
            stack,
        }
    }

    /// The element of an element event.
    pub fn element(&self) -> Result<&Rc<Element>, XmppError> {
        self.parameters
            .iter()
            .find_map(|parameter| match parameter {
                Parameter::Element(element) => Some(element),
                _ => None,
            })
            .ok_or_else(|| {
                XmppError::InvalidArgument(format!("event {} carries no element", self.name))
            })
    }

    /// First text parameter, if any.
    pub fn text(&self) -> Option<&str> {
        self.parameters.iter().find_map(|parameter| match parameter {
            Parameter::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn is_start_tag(&self) -> bool {
        matches!(self.parameters.get(1), Some(Parameter::Flag(true)))
    }

    pub fn is_end_tag(&self) -> bool {
        matches!(self.parameters.get(1), Some(Parameter::Flag(false)))
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("parameters", &self.parameters)
            .field("stack", &self.stack.len())
            .finish()
    }
}

/// Named publish/subscribe registry.
///
/// Handlers are kept per event name in attach order. Handlers attached
/// under [WILDCARD] go into a separate bucket which is consulted after
/// the name specific one on every trigger.
#[derive(Default)]
pub struct EventManager {
    events: HashMap<String, Vec<Rc<dyn EventHandler>>>,
    wildcard: Vec<Rc<dyn EventHandler>>,
}

impl EventManager {
    pub fn new() -> EventManager {
        EventManager::default()
    }

    /// Appends `handler` to the list of `name`.
    ///
    /// Attaching the same handler instance twice under the same name is
    /// silently ignored.
    pub fn attach(&mut self, name: &str, handler: Rc<dyn EventHandler>) -> &mut Self {
        let handlers = if name == WILDCARD {
            &mut self.wildcard
        } else {
            self.events.entry(name.to_string()).or_default()
        };
        if !handlers.iter().any(|h| same_handler(h, &handler)) {
            handlers.push(handler);
        }
        self
    }

    /// Wraps a closure into a handler and attaches it.
    ///
    /// The returned handle identifies the handler in event stacks.
    pub fn attach_fn<F>(&mut self, name: &str, f: F) -> Rc<dyn EventHandler>
    where
        F: Fn(&Event) -> Result<(), XmppError> + 'static,
    {
        let handler: Rc<dyn EventHandler> = Rc::new(f);
        self.attach(name, handler.clone());
        handler
    }

    /// Handlers attached under exactly `name`.
    pub fn handlers(&self, name: &str) -> &[Rc<dyn EventHandler>] {
        if name == WILDCARD {
            return &self.wildcard;
        }
        self.events.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if a trigger of `name` would invoke anything.
    pub fn has_handlers(&self, name: &str) -> bool {
        !self.wildcard.is_empty() || !self.handlers(name).is_empty()
    }

    /// Dispatches an event synchronously.
    ///
    /// Name specific handlers run before the wildcard handlers, each
    /// group in attach order. The first failing handler stops the
    /// dispatch and its error is returned.
    pub fn trigger(
        &self,
        name: &str,
        target: &'static str,
        parameters: Vec<Parameter>,
    ) -> Result<(), XmppError> {
        let specific: &[Rc<dyn EventHandler>] = if name == WILDCARD {
            &[]
        } else {
            self.handlers(name)
        };
        if specific.is_empty() && self.wildcard.is_empty() {
            return Ok(());
        }

        let mut event = Event::new(name, target, parameters);
        for handler in specific.iter().chain(self.wildcard.iter()) {
            handler.invoke(&event)?;
            event = event.with_stack(handler.clone());
        }
        Ok(())
    }
}
