/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use super::*;

struct Tester<'a> {
    expected: &'a [SaxElement<'a>],
    current: usize,
}

impl<'a> Tester<'a> {
    fn new(expected: &'a [SaxElement]) -> Tester<'a> {
        Tester {
            expected,
            current: 0,
        }
    }

    fn check(&mut self, s: &str) {
        let mut parser = SaxParser::new();
        assert!(parser.parse_bytes(self, s.as_bytes()).is_ok());
        assert_eq!(self.current, self.expected.len());
        assert_eq!(parser.nr_bytes(), s.len());
        assert_eq!(parser.depth(), 0);

        // now try byte by byte
        parser.reset();
        self.current = 0;
        for i in 0..s.len() {
            assert!(parser.parse_bytes(self, &s.as_bytes()[i..i + 1]).is_ok());
        }
        assert_eq!(self.current, self.expected.len());
        assert_eq!(parser.nr_bytes(), s.len());
        assert_eq!(parser.depth(), 0);
    }
}

impl<'a> SaxHandler for Tester<'a> {
    type Error = ParseError;

    fn handle_element(&mut self, element: &SaxElement) -> Result<(), ParseError> {
        assert!(self.current < self.expected.len());
        assert_eq!(element, &self.expected[self.current]);
        self.current += 1;
        Ok(())
    }
}

struct BadTester {}

impl BadTester {
    fn check(s: &str, position: usize, description: &'static str) {
        BadTester::check_bytes(s.as_bytes(), position, description);
    }

    fn check_bytes(bytes: &[u8], position: usize, description: &'static str) {
        let mut parser = SaxParser::new();
        assert_eq!(
            parser.parse_bytes(&mut BadTester {}, bytes),
            Err(ParseError::BadXml {
                position,
                description
            })
        );
        assert_eq!(parser.nr_bytes(), position);
    }
}

impl SaxHandler for BadTester {
    type Error = ParseError;

    fn handle_element(&mut self, _element: &SaxElement) -> Result<(), ParseError> {
        Ok(())
    }
}

#[test]
fn tags() {
    Tester::new(&[SaxElement::StartTag("lonely"), SaxElement::StartTagEmpty]).check("<lonely/>");

    Tester::new(&[SaxElement::StartTag("lonely"), SaxElement::StartTagEmpty])
        .check("   <lonely/>    ");

    Tester::new(&[
        SaxElement::StartTag("a"),
        SaxElement::StartTagContent,
        SaxElement::StartTag("b"),
        SaxElement::StartTagEmpty,
        SaxElement::EndTag("a"),
    ])
    .check("<a><b/></a  >");

    Tester::new(&[
        SaxElement::StartTag("stream:features"),
        SaxElement::StartTagContent,
        SaxElement::EndTag("stream:features"),
    ])
    .check("<stream:features></stream:features>");
}

#[test]
fn sibling_top_level_elements() {
    Tester::new(&[
        SaxElement::StartTag("a"),
        SaxElement::StartTagEmpty,
        SaxElement::StartTag("b"),
        SaxElement::StartTagContent,
        SaxElement::EndTag("b"),
    ])
    .check("<a/>\n<b></b>\n");
}

#[test]
fn attributes() {
    Tester::new(&[
        SaxElement::StartTag("a"),
        SaxElement::Attribute("x", "1"),
        SaxElement::Attribute("y", "two words"),
        SaxElement::StartTagContent,
        SaxElement::EndTag("a"),
    ])
    .check("<a x='1' y = \"two words\"></a>");

    Tester::new(&[
        SaxElement::StartTag("a"),
        SaxElement::Attribute("href", "x&y"),
        SaxElement::Attribute("q", "\"'<>"),
        SaxElement::StartTagEmpty,
    ])
    .check("<a href=\"x&amp;y\" q='&quot;&apos;&lt;&gt;'/>");
}

#[test]
fn character_data() {
    Tester::new(&[
        SaxElement::StartTag("body"),
        SaxElement::StartTagContent,
        SaxElement::CData("hi & bye"),
        SaxElement::EndTag("body"),
    ])
    .check("<body>hi &amp; bye</body>");

    Tester::new(&[
        SaxElement::StartTag("a"),
        SaxElement::StartTagContent,
        SaxElement::CData("çok güzel"),
        SaxElement::EndTag("a"),
    ])
    .check("<a>çok güzel</a>");

    Tester::new(&[
        SaxElement::StartTag("a"),
        SaxElement::StartTagContent,
        SaxElement::CData("AB\u{1F600}"),
        SaxElement::EndTag("a"),
    ])
    .check("<a>&#65;&#x42;&#x1F600;</a>");
}

#[test]
fn cdata_sections() {
    Tester::new(&[
        SaxElement::StartTag("a"),
        SaxElement::StartTagContent,
        SaxElement::CData("x<y]]z"),
        SaxElement::EndTag("a"),
    ])
    .check("<a><![CDATA[x<y]]z]]></a>");

    Tester::new(&[
        SaxElement::StartTag("a"),
        SaxElement::StartTagContent,
        SaxElement::CData("pre"),
        SaxElement::CData("]post&amp;"),
        SaxElement::EndTag("a"),
    ])
    .check("<a>pre<![CDATA[]post&amp;]]></a>");
}

#[test]
fn comments_and_instructions() {
    Tester::new(&[
        SaxElement::StartTag("a"),
        SaxElement::StartTagContent,
        SaxElement::StartTag("b"),
        SaxElement::StartTagEmpty,
        SaxElement::EndTag("a"),
    ])
    .check("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a><!-- hi - there --><b/></a>");
}

#[test]
fn chunk_boundaries() {
    let mut parser = SaxParser::new();
    let mut tester = Tester::new(&[
        SaxElement::StartTag("features"),
        SaxElement::Attribute("xmlns", "test"),
        SaxElement::StartTagContent,
        SaxElement::EndTag("features"),
    ]);
    assert!(parser.parse_bytes(&mut tester, b"<").is_ok());
    assert_eq!(tester.current, 0);
    assert!(
        parser
            .parse_bytes(&mut tester, b"features xmlns=\"test\"></features>")
            .is_ok()
    );
    assert_eq!(tester.current, 4);
}

#[test]
fn bad_tags() {
    BadTester::check("hello", 0, description::CDATA_WITHOUT_PARENT);
    BadTester::check("</a>", 1, description::TAG_CLOSE_WITHOUT_OPEN);
    BadTester::check("<a></b>", 6, description::TAG_MISMATCH);
    BadTester::check("<tsst<>", 5, description::TAG_BAD_NAME);
    BadTester::check("< a/>", 1, description::TAG_WHITESPACE_START);
    BadTester::check("<a></a/>", 6, description::TAG_DOUBLE_END);
    BadTester::check("<a></a x='1'>", 7, description::TAG_END_TAG_ATTRIBUTES);
    BadTester::check("<a/ >", 3, description::TAG_EMPTY_TAG_MISSING_END);
    BadTester::check("<a x y='1'>", 5, description::TAG_ATTRIBUTE_WITHOUT_EQUAL);
    BadTester::check("<a x>", 4, description::TAG_ATTRIBUTE_BAD_NAME);
    BadTester::check("<a x=1>", 5, description::TAG_ATTRIBUTE_WITHOUT_QUOTE);
    BadTester::check("<a x='<'>", 6, description::TAG_ATTRIBUTE_BAD_VALUE);
}

#[test]
fn bad_markup() {
    BadTester::check("<!DOCTYPE a>", 2, description::MARKUP_DOCTYPE);
    BadTester::check("<![CDATA[x]]>", 2, description::MARKUP_CDATA_SECTION_OUTSIDE_ROOT);
    BadTester::check("<a><![CDTA[", 8, description::MARKUP_CDATA_SECTION_BAD_START);
    BadTester::check("<!-x", 3, description::COMMENT_MISSING_DASH);
    BadTester::check("<!-- a --x", 9, description::COMMENT_MISSING_END);
    BadTester::check("<?pi ?x", 6, description::PI_MISSING_END);
}

#[test]
fn bad_references() {
    BadTester::check("<a>&foo;</a>", 7, description::REFERENCE_CUSTOM_ENTITY);
    BadTester::check("<a>&#0;</a>", 6, description::CHAR_INVALID);
    BadTester::check("<a>&#1a;</a>", 6, description::REFERENCE_INVALID_DECIMAL);
    BadTester::check("<a>&#xfg;</a>", 7, description::REFERENCE_INVALID_HEX);
}

#[test]
fn bad_utf8() {
    BadTester::check_bytes(b"<a>\xff</a>", 3, description::UTF8_INVALID_PREFIX_BYTE);
    BadTester::check_bytes(b"<a>\xc0\x80</a>", 4, description::UTF8_OVERLONG_SEQUENCE);
    BadTester::check_bytes(b"<a>\xc3x</a>", 4, description::UTF8_INVALID_CONT_BYTE);
    BadTester::check_bytes(b"<a>\x01</a>", 3, description::CHAR_INVALID);
}

#[test]
fn reuse_after_error() {
    let mut parser = SaxParser::new();
    let mut tester = BadTester {};
    assert!(parser.parse_bytes(&mut tester, b"<a></b>").is_err());
    assert_eq!(
        parser.parse_bytes(&mut tester, b"<a/>"),
        Err(ParseError::BadXml {
            position: 6,
            description: description::PARSER_REUSE_WITHOUT_RESET
        })
    );
    parser.reset();
    assert!(parser.parse_bytes(&mut tester, b"<a/>").is_ok());
    assert_eq!(parser.depth(), 0);
}

struct Rejecter {}

impl SaxHandler for Rejecter {
    type Error = ParseError;

    fn handle_element(&mut self, element: &SaxElement) -> Result<(), ParseError> {
        match element {
            SaxElement::EndTag("b") => Err(ParseError::NoMemory),
            _ => Ok(()),
        }
    }
}

#[test]
fn handler_error_stops_parser() {
    let mut parser = SaxParser::new();
    let mut handler = Rejecter {};
    assert_eq!(
        parser.parse_bytes(&mut handler, b"<a><b></b>"),
        Err(ParseError::NoMemory)
    );
    assert!(matches!(
        parser.parse_bytes(&mut handler, b"<c/></a>"),
        Err(ParseError::BadXml {
            description: description::PARSER_REUSE_WITHOUT_RESET,
            ..
        })
    ));
    parser.reset();
    assert!(parser.parse_bytes(&mut handler, b"<a><c/></a>").is_ok());
    assert_eq!(parser.depth(), 0);
}
