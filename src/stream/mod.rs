/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod element;

pub use element::Element;
pub use element::Node;

use std::collections::HashMap;
use std::rc::Rc;

use crate::event::EventManager;
use crate::event::Parameter;
use crate::parser::description;
use crate::ParseError;
use crate::SaxElement;
use crate::SaxHandler;
use crate::SaxParser;
use crate::XmppError;

pub const STREAM_NS: &str = "http://etherx.jabber.org/streams";

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

const EVENT_TARGET: &str = "xml-stream";

/// Elements completed by the last [XmlStream::parse] call.
#[derive(Debug, Default)]
pub struct Document {
    stream: Option<Rc<Element>>,
    elements: Vec<Rc<Element>>,
}

impl Document {
    /// The opening stream element, without children.
    pub fn stream_header(&self) -> Option<&Rc<Element>> {
        self.stream.as_ref()
    }

    /// Top level elements, or stanzas inside the stream, completed by the
    /// last parse call.
    pub fn elements(&self) -> &[Rc<Element>] {
        &self.elements
    }
}

struct PendingTag {
    name: String,
    attributes: Vec<(String, String)>,
}

type Scope = HashMap<Option<String>, String>;

struct StreamBuilder {
    events: EventManager,
    scopes: Vec<Scope>,
    open: Vec<Element>,
    pending: Option<PendingTag>,
    in_stream: bool,
    document: Document,
}

fn base_scope() -> Scope {
    let mut scope = Scope::new();
    scope.insert(Some("xml".to_string()), XML_NS.to_string());
    scope
}

fn unbound_prefix() -> XmppError {
    // the position is filled in by XmlStream which knows the byte offset
    XmppError::Parse(ParseError::BadXml {
        position: 0,
        description: description::NS_UNBOUND_PREFIX,
    })
}

impl StreamBuilder {
    fn new() -> StreamBuilder {
        StreamBuilder {
            events: EventManager::new(),
            scopes: vec![base_scope()],
            open: Vec::new(),
            pending: None,
            in_stream: false,
            document: Document::default(),
        }
    }

    fn reset(&mut self) {
        self.scopes.clear();
        self.scopes.push(base_scope());
        self.open.clear();
        self.pending = None;
        self.in_stream = false;
        self.document = Document::default();
    }

    fn resolve(&self, prefix: &Option<String>) -> Option<&String> {
        self.scopes.iter().rev().find_map(|scope| scope.get(prefix))
    }

    fn fire(&self, element: &Rc<Element>, is_start: bool) -> Result<(), XmppError> {
        let name = element.qualified_name();
        if !self.events.has_handlers(&name) {
            return Ok(());
        }
        self.events.trigger(
            &name,
            EVENT_TARGET,
            vec![Parameter::Element(element.clone()), Parameter::Flag(is_start)],
        )
    }

    fn start_element(&mut self) -> Result<(), XmppError> {
        let Some(tag) = self.pending.take() else {
            return Ok(());
        };

        let mut scope = Scope::new();
        for (key, value) in &tag.attributes {
            if key == "xmlns" {
                scope.insert(None, value.clone());
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.insert(Some(prefix.to_string()), value.clone());
            }
        }
        self.scopes.push(scope);

        let (prefix, name) = match tag.name.split_once(':') {
            Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
            None => (None, tag.name),
        };
        let namespace = match self.resolve(&prefix) {
            Some(uri) => uri.clone(),
            None if prefix.is_none() => String::new(),
            None => return Err(unbound_prefix()),
        };

        let element = Element {
            name,
            prefix,
            namespace,
            attributes: tag.attributes,
            children: Vec::new(),
        };
        let snapshot = Rc::new(element.clone());
        if self.open.is_empty() && element.namespace == STREAM_NS && element.name == "stream" {
            self.in_stream = true;
            self.document.stream = Some(snapshot.clone());
        }
        self.open.push(element);
        self.fire(&snapshot, true)
    }

    fn end_element(&mut self) -> Result<(), XmppError> {
        let Some(element) = self.open.pop() else {
            return Ok(());
        };
        self.scopes.pop();
        let element = Rc::new(element);

        if self.open.is_empty() {
            if self.in_stream {
                self.in_stream = false;
            } else {
                self.document.elements.push(element.clone());
            }
        } else if self.in_stream && self.open.len() == 1 {
            self.document.elements.push(element.clone());
        } else if let Some(parent) = self.open.last_mut() {
            parent.children.push(Node::Element(element.clone()));
        }

        self.fire(&element, false)
    }
}

impl SaxHandler for StreamBuilder {
    type Error = XmppError;

    fn handle_element(&mut self, element: &SaxElement) -> Result<(), XmppError> {
        match element {
            SaxElement::StartTag(name) => {
                self.pending = Some(PendingTag {
                    name: name.to_string(),
                    attributes: Vec::new(),
                });
            }
            SaxElement::Attribute(name, value) => {
                if let Some(tag) = self.pending.as_mut() {
                    tag.attributes.push((name.to_string(), value.to_string()));
                }
            }
            SaxElement::StartTagContent => self.start_element()?,
            SaxElement::StartTagEmpty => {
                self.start_element()?;
                self.end_element()?;
            }
            SaxElement::EndTag(_) => self.end_element()?,
            SaxElement::CData(text) => {
                // character data directly inside the stream is only keepalive whitespace
                if !(self.in_stream && self.open.len() == 1) {
                    if let Some(top) = self.open.last_mut() {
                        top.push_text(text);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Incremental namespace-aware XML stream parser.
///
/// Bytes go in as they arrive from the network, complete elements come
/// out as events named by their qualified name `{namespace}local`. Each
/// element fires twice: once when its start tag is complete (no children
/// yet, parameter `Flag(true)`) and once when it is closed with the full
/// content (`Flag(false)`).
///
/// Namespace bindings of open ancestors are kept between calls, so a
/// stanza resolves the default namespace declared once by the stream
/// header in a much earlier chunk.
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use xmppwire::{Event, XmlStream};
///
/// let names = Rc::new(RefCell::new(Vec::new()));
/// let mut stream = XmlStream::new();
/// let seen = names.clone();
/// stream.event_manager_mut().attach_fn("*", move |event: &Event| {
///     seen.borrow_mut().push(event.name().to_string());
///     Ok(())
/// });
/// stream.parse(b"<stream:stream xmlns='jabber:client' ").unwrap();
/// stream.parse(b"xmlns:stream='http://etherx.jabber.org/streams'>").unwrap();
/// let document = stream.parse(b"<message><body>hi</body></message>").unwrap();
/// assert_eq!(document.elements().len(), 1);
/// assert_eq!(document.elements()[0].qualified_name(), "{jabber:client}message");
/// ```
pub struct XmlStream {
    parser: SaxParser,
    builder: StreamBuilder,
}

impl XmlStream {
    pub fn new() -> XmlStream {
        XmlStream {
            parser: SaxParser::new(),
            builder: StreamBuilder::new(),
        }
    }

    /// Feeds the next chunk of the stream.
    ///
    /// Input ending in the middle of a construct is kept for the next
    /// call. Returns the elements completed by this chunk.
    ///
    /// # Errors
    ///
    /// [XmppError::Parse] if the input can never become well-formed,
    /// or whatever error an event handler returned.
    pub fn parse(&mut self, bytes: &[u8]) -> Result<&Document, XmppError> {
        self.builder.document.elements.clear();
        match self.parser.parse_bytes(&mut self.builder, bytes) {
            Ok(()) => Ok(&self.builder.document),
            Err(XmppError::Parse(ParseError::BadXml {
                position: _,
                description: reason,
            })) if reason == description::NS_UNBOUND_PREFIX => {
                Err(XmppError::Parse(ParseError::BadXml {
                    position: self.parser.nr_bytes(),
                    description: reason,
                }))
            }
            Err(err) => Err(err),
        }
    }

    /// Starts a new logical stream. Attached handlers are kept.
    pub fn reset(&mut self) {
        self.parser.reset();
        self.builder.reset();
    }

    /// Number of currently open elements, including the stream header.
    pub fn depth(&self) -> usize {
        self.builder.open.len()
    }

    pub fn event_manager(&self) -> &EventManager {
        &self.builder.events
    }

    pub fn event_manager_mut(&mut self) -> &mut EventManager {
        &mut self.builder.events
    }
}

impl Default for XmlStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
