/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt;
use std::rc::Rc;

use crate::entities::escape;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Node {
    Element(Rc<Element>),
    Text(String),
}

/// A namespace resolved XML element.
///
/// Attributes are kept as written, including the namespace
/// declarations, so that serializing gives back equivalent markup.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Element {
    pub(crate) name: String,
    pub(crate) prefix: Option<String>,
    pub(crate) namespace: String,
    pub(crate) attributes: Vec<(String, String)>,
    pub(crate) children: Vec<Node>,
}

impl Element {
    /// Local name without the prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Namespace URI, empty if none was in scope.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The `{namespace}name` dispatch key of the element.
    pub fn qualified_name(&self) -> String {
        format!("{{{}}}{}", self.namespace, self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// First child element with the given qualified name.
    pub fn child(&self, qualified_name: &str) -> Option<&Rc<Element>> {
        self.children.iter().find_map(|node| match node {
            Node::Element(element) if element.qualified_name() == qualified_name => Some(element),
            _ => None,
        })
    }

    /// Concatenated character data of the direct children.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for node in &self.children {
            if let Node::Text(s) = node {
                text.push_str(s);
            }
        }
        text
    }

    pub(crate) fn push_text(&mut self, s: &str) {
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(s);
        } else {
            self.children.push(Node::Text(s.to_string()));
        }
    }

    fn write_tag_name(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, "{}:", prefix)?;
        }
        f.write_str(&self.name)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<")?;
        self.write_tag_name(f)?;
        for (key, value) in &self.attributes {
            write!(f, " {}=\"{}\"", key, escape(value))?;
        }
        if self.children.is_empty() {
            return f.write_str("/>");
        }
        f.write_str(">")?;
        for node in &self.children {
            match node {
                Node::Element(element) => write!(f, "{}", element)?,
                Node::Text(text) => f.write_str(&escape(text))?,
            }
        }
        f.write_str("</")?;
        self.write_tag_name(f)?;
        f.write_str(">")
    }
}
