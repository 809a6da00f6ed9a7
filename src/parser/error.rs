/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

/// Error raised while tokenizing the XML stream.
///
/// Running out of input in the middle of a construct is *not* an error,
/// the parser keeps its state and continues with the next chunk. This
/// type is only returned for input which can never become well-formed
/// no matter what bytes follow.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// Parser could not grow its buffers.
    #[error("not enough memory")]
    NoMemory,

    /// A syntax error is encountered in the XML input.
    ///
    /// `position` is the byte offset in the whole stream since the last
    /// reset.
    #[error("invalid XML syntax at byte {position}: {description}")]
    BadXml {
        position: usize,
        description: &'static str,
    },
}

pub(crate) mod description {
    pub(crate) const PARSER_REUSE_WITHOUT_RESET: &str =
        "cannot continue after an error without a reset";
    pub(crate) const UTF8_INVALID_CONT_BYTE: &str = "invalid UTF8 continuation byte";
    pub(crate) const UTF8_OVERLONG_SEQUENCE: &str = "overlong UTF8 sequence";
    pub(crate) const UTF8_INVALID_PREFIX_BYTE: &str = "invalid UTF8 prefix byte";
    pub(crate) const CHAR_INVALID: &str = "invalid XML character";
    pub(crate) const CDATA_WITHOUT_PARENT: &str =
        "character data is not allowed outside of an element";
    pub(crate) const TAG_CLOSE_WITHOUT_OPEN: &str = "close tag without open";
    pub(crate) const TAG_MISMATCH: &str = "start and end tags have different names";
    pub(crate) const TAG_WHITESPACE_START: &str = "tag cannot start with whitespace";
    pub(crate) const TAG_EMPTY_NAME: &str = "tag has no name";
    pub(crate) const TAG_BAD_NAME: &str = "tag names cannot contain '<', quotes or '='";
    pub(crate) const TAG_DOUBLE_END: &str = "end tag has standalone ending too";
    pub(crate) const TAG_END_TAG_ATTRIBUTES: &str = "end tag cannot have attributes";
    pub(crate) const TAG_EMPTY_TAG_MISSING_END: &str = "empty element tags must end after the '/'";
    pub(crate) const TAG_ATTRIBUTE_WITHOUT_EQUAL: &str =
        "tag attributes must have '=' before the value";
    pub(crate) const TAG_ATTRIBUTE_WITHOUT_QUOTE: &str =
        "tag attribute value must be in double or single quotes";
    pub(crate) const TAG_ATTRIBUTE_BAD_NAME: &str =
        "tag attribute names cannot have '/', '<' or '>'";
    pub(crate) const TAG_ATTRIBUTE_BAD_VALUE: &str =
        "tag attribute value cannot have '<' character without a reference";
    pub(crate) const REFERENCE_INVALID_DECIMAL: &str = "non digit in decimal character reference";
    pub(crate) const REFERENCE_INVALID_HEX: &str = "non hex digit in hexadecimal character reference";
    pub(crate) const REFERENCE_CUSTOM_ENTITY: &str =
        "non-predefined entity references are not supported";
    pub(crate) const COMMENT_MISSING_DASH: &str = "comment tag should start with double dash";
    pub(crate) const COMMENT_MISSING_END: &str = "comment tag should end after double dash";
    pub(crate) const MARKUP_CDATA_SECTION_BAD_START: &str =
        "character data sections must start with '[CDATA['";
    pub(crate) const MARKUP_CDATA_SECTION_OUTSIDE_ROOT: &str =
        "character data sections cannot be outside of an element";
    pub(crate) const MARKUP_DOCTYPE: &str =
        "document type declarations are not allowed in XML streams";
    pub(crate) const MARKUP_UNRECOGNIZED: &str =
        "markup is not a comment or a character data section";
    pub(crate) const PI_MISSING_END: &str = "processing instruction must end after closing the '?'";
    pub(crate) const NS_UNBOUND_PREFIX: &str = "element uses an undeclared namespace prefix";
}
