/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod error;

pub(crate) use error::description;
pub use error::ParseError;

/// A lexical XML construct reported by the [SaxParser].
#[derive(Debug, Eq, PartialEq)]
pub enum SaxElement<'a> {
    /// Name of a start tag or an empty element tag.
    ///
    /// Sent as soon as the name is complete, attributes follow.
    StartTag(&'a str),

    /// A tag attribute for the last StartTag.
    ///
    /// References in the value are already replaced with the actual characters.
    Attribute(&'a str, &'a str),

    /// The last StartTag is complete and has content.
    StartTagContent,

    /// The last StartTag was an empty element tag and is already closed.
    StartTagEmpty,

    /// An end tag. The name is verified to match the open start tag.
    EndTag(&'a str),

    /// Character data.
    ///
    /// A continuous run of text is reported once, when the next markup
    /// begins, no matter how many chunks it was split into.
    CData(&'a str),
}

pub trait SaxHandler {
    type Error: From<ParseError>;

    fn handle_element(&mut self, element: &SaxElement) -> Result<(), Self::Error>;
}

/// Incremental SAX tokenizer for XML streams.
///
/// Input can be given in arbitrary pieces, a chunk does not need to end
/// on a token boundary. Incomplete constructs are kept in the parser
/// until more bytes arrive. Only input which can never be completed into
/// well-formed XML produces an error.
///
/// Unlike a document parser, it accepts any number of top-level elements
/// one after another since an XMPP connection might observe stanzas with
/// or without the enclosing stream element.
///
/// ```
/// use xmppwire::{ParseError, SaxElement, SaxHandler, SaxParser};
///
/// struct Printer {}
/// impl SaxHandler for Printer {
///     type Error = ParseError;
///     fn handle_element(&mut self, element: &SaxElement) -> Result<(), ParseError> {
///         println!("{element:?}");
///         Ok(())
///     }
/// }
///
/// let mut parser = SaxParser::new();
/// parser.parse_bytes(&mut Printer {}, b"<message><bo").unwrap();
/// parser.parse_bytes(&mut Printer {}, b"dy>hi</body></message>").unwrap();
/// assert_eq!(parser.depth(), 0);
/// ```
pub struct SaxParser {
    state: State,
    uni_len: u32,
    uni_left: u32,
    uni_char: u32,
    is_end_tag: bool,
    is_quot_value: bool,
    is_value_ref: bool,
    value_pos: usize,
    buffer: Vec<u8>,
    ref_buffer: Vec<u8>,
    char_ref_value: u32,
    open_tags: Vec<String>,
    nr_bytes: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Outside,
    TagStart,
    PI,
    PIEnd,
    Markup,
    CDataSectionStart(usize),
    CDataSectionBody,
    CDataSectionMaybeEnd,
    CDataSectionMaybeEnd2,
    CommentStart,
    CommentBody,
    CommentMaybeEnd,
    CommentEnd,
    TagName,
    EndTagWhitespace,
    EmptyTagEnd,
    AttributeWhitespace,
    AttributeName,
    AttributeEq,
    AttributeValueStart,
    AttributeValue,
    CData,
    Reference,
    Entity,
    CharReference,
    CharReferenceBody,
    HexCharReference,
    Error,
}

const INITIAL_BUFFER_CAPACITY: usize = 128;

const REF_BUFFER_SIZE: usize = 8;

const CDATA_SECTION_START: &[u8] = b"CDATA[";

macro_rules! whitespace {
    () => {
        b' ' | b'\t' | b'\r' | b'\n'
    };
}

macro_rules! xml_error {
    ($self:ident, $a:ident) => {{
        $self.state = State::Error;
        return Err(ParseError::BadXml {
            position: $self.nr_bytes,
            description: description::$a,
        }
        .into());
    }};
}

fn is_valid_xml_char(c: u32) -> bool {
    matches!(
        c,
        0x09 | 0x0a | 0x0d | 0x20..=0xd7ff | 0xe000..=0xfffd | 0x10000..=0x10ffff
    )
}

fn buffer_str(buffer: &[u8], position: usize) -> Result<&str, ParseError> {
    std::str::from_utf8(buffer).map_err(|_| ParseError::BadXml {
        position,
        description: description::UTF8_INVALID_CONT_BYTE,
    })
}

impl SaxParser {
    /// Creates a new parser instance.
    ///
    /// The instance can be reused for a new stream with the [reset()](SaxParser::reset) method.
    pub fn new() -> SaxParser {
        SaxParser {
            state: State::Outside,
            uni_len: 0,
            uni_left: 0,
            uni_char: 0,
            is_end_tag: false,
            is_quot_value: false,
            is_value_ref: false,
            value_pos: 0,
            buffer: Vec::<u8>::with_capacity(INITIAL_BUFFER_CAPACITY),
            ref_buffer: Vec::<u8>::with_capacity(REF_BUFFER_SIZE),
            char_ref_value: 0,
            open_tags: Vec::new(),
            nr_bytes: 0,
        }
    }

    /// Discards all partial input and open tags.
    pub fn reset(&mut self) {
        self.state = State::Outside;
        self.uni_len = 0;
        self.uni_left = 0;
        self.uni_char = 0;
        self.is_end_tag = false;
        self.is_quot_value = false;
        self.is_value_ref = false;
        self.value_pos = 0;
        self.buffer.clear();
        self.ref_buffer.clear();
        self.char_ref_value = 0;
        self.open_tags.clear();
        self.nr_bytes = 0;
    }

    /// Number of currently open elements.
    pub fn depth(&self) -> usize {
        self.open_tags.len()
    }

    /// Number of bytes consumed since the last reset.
    pub fn nr_bytes(&self) -> usize {
        self.nr_bytes
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), ParseError> {
        if self.buffer.try_reserve(bytes.len()).is_err() {
            return Err(ParseError::NoMemory);
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    fn push_char_reference(&mut self) -> Result<(), ParseError> {
        let value = self.char_ref_value;
        let c = match char::from_u32(value) {
            Some(c) if is_valid_xml_char(value) => c,
            _ => {
                self.state = State::Error;
                return Err(ParseError::BadXml {
                    position: self.nr_bytes,
                    description: description::CHAR_INVALID,
                });
            }
        };
        let mut buf = [0u8; 4];
        self.push_bytes(c.encode_utf8(&mut buf).as_bytes())
    }

    fn flush_cdata<H: SaxHandler>(&mut self, handler: &mut H) -> Result<(), H::Error> {
        if !self.buffer.is_empty() {
            let text = buffer_str(&self.buffer, self.nr_bytes)?;
            handler.handle_element(&SaxElement::CData(text))?;
            self.buffer.clear();
        }
        Ok(())
    }

    fn after_close(&self) -> State {
        if self.open_tags.is_empty() {
            State::Outside
        } else {
            State::CData
        }
    }

    fn finish_end_tag<H: SaxHandler>(&mut self, handler: &mut H) -> Result<(), H::Error> {
        let name = buffer_str(&self.buffer, self.nr_bytes)?;
        match self.open_tags.last() {
            None => xml_error!(self, TAG_CLOSE_WITHOUT_OPEN),
            Some(open) if open != name => xml_error!(self, TAG_MISMATCH),
            Some(_) => (),
        }
        handler.handle_element(&SaxElement::EndTag(name))?;
        self.open_tags.pop();
        self.buffer.clear();
        Ok(())
    }

    /// Parses the next chunk of the stream.
    ///
    /// Returns Ok when the chunk was consumed, even if it ended in the
    /// middle of a token. After an error, including one returned by the
    /// handler, the parser must be [reset](SaxParser::reset) before it
    /// accepts more input.
    pub fn parse_bytes<H: SaxHandler>(
        &mut self,
        handler: &mut H,
        bytes: &[u8],
    ) -> Result<(), H::Error> {
        if self.state == State::Error {
            return Err(ParseError::BadXml {
                position: self.nr_bytes,
                description: description::PARSER_REUSE_WITHOUT_RESET,
            }
            .into());
        }

        let result = self.parse_chunk(handler, bytes);
        if result.is_err() {
            // a handler may have failed in the middle of a token
            self.state = State::Error;
        }
        result
    }

    fn parse_chunk<H: SaxHandler>(
        &mut self,
        handler: &mut H,
        bytes: &[u8],
    ) -> Result<(), H::Error> {
        let mut pos: usize = 0;
        let mut back: usize = 0;

        while pos < bytes.len() {
            let mut redo: bool = false;
            let c = bytes[pos];

            if self.uni_left > 0 {
                if c & 0xc0 != 0x80 {
                    xml_error!(self, UTF8_INVALID_CONT_BYTE);
                }
                self.uni_char <<= 6;
                self.uni_char += c as u32 & 0x3f;
                self.uni_left -= 1;
                if self.uni_left == 0 {
                    // Sequences longer than the actual character codepoint
                    // size are security hazards.
                    if (self.uni_len == 2 && self.uni_char <= 0x7f)
                        || (self.uni_len == 3 && self.uni_char <= 0x7ff)
                        || (self.uni_len == 4 && self.uni_char <= 0xffff)
                    {
                        xml_error!(self, UTF8_OVERLONG_SEQUENCE);
                    }
                    if !is_valid_xml_char(self.uni_char) {
                        xml_error!(self, CHAR_INVALID);
                    }
                }
            } else if c & 0x80 == 0x80 {
                if c & 0xe0 == 0xc0 {
                    self.uni_len = 2;
                    self.uni_left = 1;
                    self.uni_char = c as u32 & 0x1f;
                } else if c & 0xf0 == 0xe0 {
                    self.uni_len = 3;
                    self.uni_left = 2;
                    self.uni_char = c as u32 & 0x0f;
                } else if c & 0xf8 == 0xf0 {
                    self.uni_len = 4;
                    self.uni_left = 3;
                    self.uni_char = c as u32 & 0x07;
                } else {
                    xml_error!(self, UTF8_INVALID_PREFIX_BYTE);
                }
            } else if c < 0x20 && (c != 0x09 && c != 0x0a && c != 0x0d) {
                xml_error!(self, CHAR_INVALID);
            }

            match self.state {
                State::Outside => match c {
                    b'<' => self.state = State::TagStart,
                    whitespace!() => (),
                    _ => xml_error!(self, CDATA_WITHOUT_PARENT),
                },

                State::TagStart => match c {
                    b'!' => self.state = State::Markup,
                    b'?' => self.state = State::PI,
                    b'/' => {
                        if self.open_tags.is_empty() {
                            xml_error!(self, TAG_CLOSE_WITHOUT_OPEN);
                        }
                        back = pos + 1;
                        self.is_end_tag = true;
                        self.state = State::TagName;
                    }
                    whitespace!() => xml_error!(self, TAG_WHITESPACE_START),
                    b'>' => xml_error!(self, TAG_EMPTY_NAME),
                    _ => {
                        back = pos;
                        self.is_end_tag = false;
                        self.state = State::TagName;
                    }
                },

                State::Markup => match c {
                    b'-' => self.state = State::CommentStart,
                    b'[' => {
                        if self.open_tags.is_empty() {
                            xml_error!(self, MARKUP_CDATA_SECTION_OUTSIDE_ROOT);
                        }
                        self.state = State::CDataSectionStart(0);
                    }
                    b'D' => xml_error!(self, MARKUP_DOCTYPE),
                    _ => xml_error!(self, MARKUP_UNRECOGNIZED),
                },

                State::CDataSectionStart(index) => {
                    if c != CDATA_SECTION_START[index] {
                        xml_error!(self, MARKUP_CDATA_SECTION_BAD_START);
                    }
                    if index + 1 == CDATA_SECTION_START.len() {
                        back = pos + 1;
                        self.state = State::CDataSectionBody;
                    } else {
                        self.state = State::CDataSectionStart(index + 1);
                    }
                }

                State::CDataSectionBody => {
                    if c == b']' {
                        self.push_bytes(&bytes[back..pos])?;
                        self.state = State::CDataSectionMaybeEnd;
                    }
                }

                State::CDataSectionMaybeEnd => match c {
                    b']' => self.state = State::CDataSectionMaybeEnd2,
                    _ => {
                        self.push_bytes(b"]")?;
                        back = pos;
                        self.state = State::CDataSectionBody;
                    }
                },

                State::CDataSectionMaybeEnd2 => match c {
                    b'>' => {
                        back = pos + 1;
                        self.state = State::CData;
                    }
                    b']' => self.push_bytes(b"]")?,
                    _ => {
                        self.push_bytes(b"]]")?;
                        back = pos;
                        self.state = State::CDataSectionBody;
                    }
                },

                State::CommentStart => {
                    if c != b'-' {
                        xml_error!(self, COMMENT_MISSING_DASH);
                    }
                    self.state = State::CommentBody;
                }

                State::CommentBody => {
                    if c == b'-' {
                        self.state = State::CommentMaybeEnd;
                    }
                }

                State::CommentMaybeEnd => match c {
                    b'-' => self.state = State::CommentEnd,
                    _ => self.state = State::CommentBody,
                },

                State::CommentEnd => {
                    if c != b'>' {
                        xml_error!(self, COMMENT_MISSING_END);
                    }
                    back = pos + 1;
                    self.state = self.after_close();
                }

                State::PI => {
                    if c == b'?' {
                        self.state = State::PIEnd;
                    }
                }

                State::PIEnd => {
                    if c != b'>' {
                        xml_error!(self, PI_MISSING_END);
                    }
                    back = pos + 1;
                    self.state = self.after_close();
                }

                State::TagName => match c {
                    b'/' | b'>' | whitespace!() => {
                        self.push_bytes(&bytes[back..pos])?;
                        if self.buffer.is_empty() {
                            xml_error!(self, TAG_EMPTY_NAME);
                        }
                        if self.is_end_tag {
                            match c {
                                b'/' => xml_error!(self, TAG_DOUBLE_END),
                                b'>' => {
                                    self.finish_end_tag(handler)?;
                                    back = pos + 1;
                                    self.state = self.after_close();
                                }
                                _ => self.state = State::EndTagWhitespace,
                            }
                        } else {
                            let name = buffer_str(&self.buffer, self.nr_bytes)?;
                            handler.handle_element(&SaxElement::StartTag(name))?;
                            self.open_tags.push(name.to_string());
                            self.buffer.clear();
                            match c {
                                b'/' => self.state = State::EmptyTagEnd,
                                b'>' => {
                                    handler.handle_element(&SaxElement::StartTagContent)?;
                                    back = pos + 1;
                                    self.state = State::CData;
                                }
                                _ => self.state = State::AttributeWhitespace,
                            }
                        }
                    }
                    b'<' | b'=' | b'"' | b'\'' => xml_error!(self, TAG_BAD_NAME),
                    _ => (),
                },

                State::EmptyTagEnd => match c {
                    b'>' => {
                        handler.handle_element(&SaxElement::StartTagEmpty)?;
                        self.open_tags.pop();
                        back = pos + 1;
                        self.state = self.after_close();
                    }
                    _ => xml_error!(self, TAG_EMPTY_TAG_MISSING_END),
                },

                State::EndTagWhitespace => match c {
                    b'>' => {
                        self.finish_end_tag(handler)?;
                        back = pos + 1;
                        self.state = self.after_close();
                    }
                    whitespace!() => (),
                    _ => xml_error!(self, TAG_END_TAG_ATTRIBUTES),
                },

                State::AttributeWhitespace => match c {
                    whitespace!() => (),
                    b'/' => self.state = State::EmptyTagEnd,
                    b'>' => {
                        handler.handle_element(&SaxElement::StartTagContent)?;
                        back = pos + 1;
                        self.state = State::CData;
                    }
                    _ => {
                        back = pos;
                        self.state = State::AttributeName;
                        redo = true;
                    }
                },

                State::AttributeName => match c {
                    b'=' | whitespace!() => {
                        self.push_bytes(&bytes[back..pos])?;
                        if self.buffer.is_empty() {
                            xml_error!(self, TAG_ATTRIBUTE_BAD_NAME);
                        }
                        if c == b'=' {
                            self.state = State::AttributeValueStart;
                        } else {
                            self.state = State::AttributeEq;
                        }
                    }
                    b'/' | b'>' | b'<' => xml_error!(self, TAG_ATTRIBUTE_BAD_NAME),
                    _ => (),
                },

                State::AttributeEq => match c {
                    b'=' => self.state = State::AttributeValueStart,
                    whitespace!() => (),
                    _ => xml_error!(self, TAG_ATTRIBUTE_WITHOUT_EQUAL),
                },

                State::AttributeValueStart => match c {
                    b'"' | b'\'' => {
                        self.is_quot_value = c == b'\'';
                        self.value_pos = self.buffer.len();
                        back = pos + 1;
                        self.state = State::AttributeValue;
                    }
                    whitespace!() => (),
                    _ => xml_error!(self, TAG_ATTRIBUTE_WITHOUT_QUOTE),
                },

                State::AttributeValue => {
                    if (self.is_quot_value && c == b'\'') || (!self.is_quot_value && c == b'"') {
                        self.push_bytes(&bytes[back..pos])?;
                        let (name, value) = self.buffer.split_at(self.value_pos);
                        let name = buffer_str(name, self.nr_bytes)?;
                        let value = buffer_str(value, self.nr_bytes)?;
                        handler.handle_element(&SaxElement::Attribute(name, value))?;
                        self.buffer.clear();
                        self.state = State::AttributeWhitespace;
                    } else if c == b'&' {
                        self.push_bytes(&bytes[back..pos])?;
                        self.ref_buffer.clear();
                        self.is_value_ref = true;
                        self.state = State::Reference;
                    } else if c == b'<' {
                        xml_error!(self, TAG_ATTRIBUTE_BAD_VALUE);
                    }
                }

                State::CData => match c {
                    b'<' => {
                        self.push_bytes(&bytes[back..pos])?;
                        self.flush_cdata(handler)?;
                        self.state = State::TagStart;
                    }
                    b'&' => {
                        self.push_bytes(&bytes[back..pos])?;
                        self.ref_buffer.clear();
                        self.is_value_ref = false;
                        self.state = State::Reference;
                    }
                    _ => (),
                },

                State::Reference => match c {
                    b'#' => {
                        self.char_ref_value = 0;
                        self.state = State::CharReference;
                    }
                    b';' => xml_error!(self, REFERENCE_CUSTOM_ENTITY),
                    _ => {
                        self.ref_buffer.push(c);
                        self.state = State::Entity;
                    }
                },

                State::Entity => match c {
                    b';' => {
                        let entity: &[u8] = match self.ref_buffer.as_slice() {
                            b"amp" => b"&",
                            b"lt" => b"<",
                            b"gt" => b">",
                            b"quot" => b"\"",
                            b"apos" => b"'",
                            _ => xml_error!(self, REFERENCE_CUSTOM_ENTITY),
                        };
                        self.push_bytes(entity)?;
                        back = pos + 1;
                        self.state = if self.is_value_ref {
                            State::AttributeValue
                        } else {
                            State::CData
                        };
                    }
                    _ => {
                        if self.ref_buffer.len() >= REF_BUFFER_SIZE {
                            xml_error!(self, REFERENCE_CUSTOM_ENTITY);
                        }
                        self.ref_buffer.push(c);
                    }
                },

                State::CharReference => match c {
                    b'x' => self.state = State::HexCharReference,
                    b'0'..=b'9' => {
                        self.char_ref_value = (c - b'0') as u32;
                        self.state = State::CharReferenceBody;
                    }
                    _ => xml_error!(self, REFERENCE_INVALID_DECIMAL),
                },

                State::CharReferenceBody | State::HexCharReference => {
                    let radix = if self.state == State::HexCharReference {
                        16
                    } else {
                        10
                    };
                    if c == b';' {
                        self.push_char_reference()?;
                        back = pos + 1;
                        self.state = if self.is_value_ref {
                            State::AttributeValue
                        } else {
                            State::CData
                        };
                    } else {
                        match (c as char).to_digit(radix) {
                            Some(digit) => {
                                self.char_ref_value = self
                                    .char_ref_value
                                    .saturating_mul(radix)
                                    .saturating_add(digit);
                            }
                            None if radix == 16 => xml_error!(self, REFERENCE_INVALID_HEX),
                            None => xml_error!(self, REFERENCE_INVALID_DECIMAL),
                        }
                    }
                }

                State::Error => unreachable!(),
            }

            if !redo {
                pos += 1;
                self.nr_bytes += 1;
            }
        }

        if back < pos {
            match self.state {
                State::TagName
                | State::AttributeName
                | State::AttributeValue
                | State::CData
                | State::CDataSectionBody => self.push_bytes(&bytes[back..pos])?,
                _ => (),
            }
        }

        Ok(())
    }
}

impl Default for SaxParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
