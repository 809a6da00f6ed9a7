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

use super::*;
use crate::event::WILDCARD;
use crate::Event;

const HEADER: &str = "<?xml version='1.0' encoding='UTF-8'?>\
    <stream:stream xmlns:stream=\"http://etherx.jabber.org/streams\" \
    xmlns=\"jabber:client\" from=\"gamebox\" id=\"b9a85bbd\" xml:lang=\"en\" version=\"1.0\">";

fn record_all(stream: &mut XmlStream) -> Rc<RefCell<Vec<String>>> {
    let names = Rc::new(RefCell::new(Vec::new()));
    let seen = names.clone();
    stream
        .event_manager_mut()
        .attach_fn(WILDCARD, move |event: &Event| {
            let mark = if event.is_start_tag() { "+" } else { "-" };
            seen.borrow_mut().push(format!("{}{}", mark, event.name()));
            Ok(())
        });
    names
}

fn counter(stream: &mut XmlStream, name: &str) -> Rc<RefCell<usize>> {
    let count = Rc::new(RefCell::new(0));
    let c = count.clone();
    stream.event_manager_mut().attach_fn(name, move |_event: &Event| {
        *c.borrow_mut() += 1;
        Ok(())
    });
    count
}

#[test]
fn features() {
    let mut stream = XmlStream::new();
    let features = counter(&mut stream, "{http://etherx.jabber.org/streams}features");
    let mechanism = counter(&mut stream, "{urn:ietf:params:xml:ns:xmpp-sasl}mechanism");

    let xml = format!(
        "{}{}",
        HEADER,
        "<stream:features>\
         <test someattribute=\"test\" stream:anothertest=\"foo\"/>\
         <starttls xmlns=\"urn:ietf:params:xml:ns:xmpp-tls\"></starttls>\
         <mechanisms xmlns=\"urn:ietf:params:xml:ns:xmpp-sasl\">\
         <mechanism>DIGEST-MD5</mechanism>\
         <mechanism>PLAIN</mechanism>\
         <mechanism>ANONYMOUS</mechanism>\
         <mechanism>CRAM-MD5</mechanism>\
         </mechanisms>\
         </stream:features>"
    );
    let document = stream.parse(xml.as_bytes()).unwrap();

    let header = document.stream_header().unwrap();
    assert_eq!(header.qualified_name(), "{http://etherx.jabber.org/streams}stream");
    assert_eq!(header.attribute("id"), Some("b9a85bbd"));
    assert!(header.children().is_empty());

    assert_eq!(document.elements().len(), 1);
    assert_eq!(
        document.elements()[0].to_string(),
        "<stream:features>\
         <test someattribute=\"test\" stream:anothertest=\"foo\"/>\
         <starttls xmlns=\"urn:ietf:params:xml:ns:xmpp-tls\"/>\
         <mechanisms xmlns=\"urn:ietf:params:xml:ns:xmpp-sasl\">\
         <mechanism>DIGEST-MD5</mechanism>\
         <mechanism>PLAIN</mechanism>\
         <mechanism>ANONYMOUS</mechanism>\
         <mechanism>CRAM-MD5</mechanism>\
         </mechanisms>\
         </stream:features>"
    );
    assert_eq!(*features.borrow(), 2);
    assert_eq!(*mechanism.borrow(), 8);
    assert_eq!(stream.depth(), 1);
}

#[test]
fn final_end_tag() {
    let mut stream = XmlStream::new();
    let ended = Rc::new(RefCell::new(0));
    let e = ended.clone();
    stream.event_manager_mut().attach_fn(
        "{http://etherx.jabber.org/streams}stream",
        move |event: &Event| {
            if event.is_end_tag() {
                *e.borrow_mut() += 1;
            }
            Ok(())
        },
    );

    stream.parse(HEADER.as_bytes()).unwrap();
    assert_eq!(*ended.borrow(), 0);
    let document = stream.parse(b"</stream:stream>").unwrap();
    assert!(document.elements().is_empty());
    assert_eq!(*ended.borrow(), 1);
    assert_eq!(stream.depth(), 0);
}

#[test]
fn namespaces() {
    let mut stream = XmlStream::new();
    let names = record_all(&mut stream);

    stream
        .parse(
            b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
              <stream:stream xmlns:stream=\"http://etherx.jabber.org/streams\" xmlns=\"jabber:client\">\n\
              \x20   <stream:features></stream:features>\n\
              \x20   <iq>test</iq>\n\
              \x20   <iq xmlns=\"jabber:client\">testtwo</iq>\n\
              </stream:stream>",
        )
        .unwrap();

    assert_eq!(
        *names.borrow(),
        vec![
            "+{http://etherx.jabber.org/streams}stream",
            "+{http://etherx.jabber.org/streams}features",
            "-{http://etherx.jabber.org/streams}features",
            "+{jabber:client}iq",
            "-{jabber:client}iq",
            "+{jabber:client}iq",
            "-{jabber:client}iq",
            "-{http://etherx.jabber.org/streams}stream",
        ]
    );
}

#[test]
fn namespace_cache() {
    let mut stream = XmlStream::new();
    let features = counter(&mut stream, "{http://etherx.jabber.org/streams}features");
    let header = counter(&mut stream, "{http://etherx.jabber.org/streams}stream");
    let message = counter(&mut stream, "{jabber:client}message");

    stream.parse(HEADER.as_bytes()).unwrap();
    stream.parse(b"<stream:features></stream:features>").unwrap();
    let document = stream.parse(b"<message><body>hi</body></message>").unwrap();
    assert_eq!(document.elements()[0].qualified_name(), "{jabber:client}message");
    stream.parse(b"</stream:stream>").unwrap();

    assert_eq!(*features.borrow(), 2);
    assert_eq!(*header.borrow(), 2);
    assert_eq!(*message.borrow(), 2);
}

#[test]
fn split_matches_single_chunk() {
    let mut whole = XmlStream::new();
    let whole_names = record_all(&mut whole);
    whole.parse(b"<a xmlns='urn:test'><b></b></a>").unwrap();

    let mut split = XmlStream::new();
    let split_names = record_all(&mut split);
    split.parse(b"<a xmlns='urn:test'><b>").unwrap();
    split.parse(b"</b></a>").unwrap();

    assert_eq!(*whole_names.borrow(), *split_names.borrow());
    assert_eq!(
        *split_names.borrow(),
        vec!["+{urn:test}a", "+{urn:test}b", "-{urn:test}b", "-{urn:test}a"]
    );
}

#[test]
fn cut_input() {
    let mut stream = XmlStream::new();
    assert!(stream.parse(b"<").unwrap().elements().is_empty());
    let document = stream.parse(b"features xmlns=\"test\"></features>").unwrap();
    assert_eq!(document.elements().len(), 1);
    assert_eq!(document.elements()[0].qualified_name(), "{test}features");
}

#[test]
fn challenge_in_pieces() {
    let mut stream = XmlStream::new();
    let proceed = counter(&mut stream, "{urn:ietf:params:xml:ns:xmpp-tls}proceed");
    stream.parse(HEADER.as_bytes()).unwrap();
    stream.parse(b"<proceed ").unwrap();
    assert_eq!(*proceed.borrow(), 0);
    let document = stream
        .parse(b"xmlns=\"urn:ietf:params:xml:ns:xmpp-tls\"/>")
        .unwrap();
    assert_eq!(document.elements().len(), 1);
    assert_eq!(*proceed.borrow(), 2);
}

#[test]
fn content() {
    let mut stream = XmlStream::new();
    let start_children = Rc::new(RefCell::new(Vec::new()));
    let seen = start_children.clone();
    stream
        .event_manager_mut()
        .attach_fn("{jabber:client}message", move |event: &Event| {
            seen.borrow_mut().push(event.element()?.children().len());
            Ok(())
        });

    let document = stream
        .parse(
            b"<message xmlns='jabber:client' to='a@b'><body>a &amp; b</body>\
              <!-- note --><x xmlns='urn:x' attr=\"with&amp;in-val\"/></message>",
        )
        .unwrap();
    let message = &document.elements()[0];
    assert_eq!(message.attribute("to"), Some("a@b"));
    assert_eq!(message.child("{jabber:client}body").unwrap().text(), "a & b");
    let x = message.child("{urn:x}x").unwrap();
    assert_eq!(x.attribute("attr"), Some("with&in-val"));
    assert_eq!(*start_children.borrow(), vec![0, 2]);
}

#[test]
fn default_namespace_missing() {
    let mut stream = XmlStream::new();
    let document = stream.parse(b"<ping/>").unwrap();
    assert_eq!(document.elements()[0].qualified_name(), "{}ping");
    assert_eq!(document.elements()[0].namespace(), "");
}

#[test]
fn elements_not_retained() {
    let mut stream = XmlStream::new();
    stream.parse(HEADER.as_bytes()).unwrap();
    assert_eq!(stream.parse(b"<presence/>").unwrap().elements().len(), 1);
    assert!(stream.parse(b" ").unwrap().elements().is_empty());
}

#[test]
fn invalid_xml() {
    let mut stream = XmlStream::new();
    let result = stream.parse(b"<tsst<>");
    assert!(matches!(
        result,
        Err(XmppError::Parse(ParseError::BadXml { position: 5, .. }))
    ));
}

#[test]
fn unbound_prefix() {
    let mut stream = XmlStream::new();
    let result = stream.parse(b"<foo:bar/>");
    match result {
        Err(XmppError::Parse(ParseError::BadXml {
            position,
            description,
        })) => {
            assert_eq!(position, 9);
            assert_eq!(description, description::NS_UNBOUND_PREFIX);
        }
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
}

#[test]
fn handler_error_propagates() {
    let mut stream = XmlStream::new();
    stream
        .event_manager_mut()
        .attach_fn("{jabber:client}iq", |_event: &Event| {
            Err(XmppError::InvalidArgument("rejected".into()))
        });
    stream.parse(HEADER.as_bytes()).unwrap();
    assert!(matches!(
        stream.parse(b"<iq/>"),
        Err(XmppError::InvalidArgument(_))
    ));
}

#[test]
fn handler_error_needs_reset() {
    let mut stream = XmlStream::new();
    stream.event_manager_mut().attach_fn("{}b", |event: &Event| {
        if event.is_end_tag() {
            return Err(XmppError::InvalidArgument("rejected".into()));
        }
        Ok(())
    });
    assert!(matches!(
        stream.parse(b"<a><b></b>"),
        Err(XmppError::InvalidArgument(_))
    ));
    assert!(matches!(
        stream.parse(b"<c/></a>"),
        Err(XmppError::Parse(ParseError::BadXml {
            description: description::PARSER_REUSE_WITHOUT_RESET,
            ..
        }))
    ));

    stream.reset();
    assert_eq!(stream.depth(), 0);
    assert_eq!(stream.parse(b"<a><c/></a>").unwrap().elements().len(), 1);
}

#[test]
fn reset_keeps_handlers() {
    let mut stream = XmlStream::new();
    let names = record_all(&mut stream);
    stream.parse(b"<a xmlns='urn:one'><b>").unwrap();
    stream.reset();
    assert_eq!(stream.depth(), 0);
    names.borrow_mut().clear();

    stream.parse(b"<b/>").unwrap();
    assert_eq!(*names.borrow(), vec!["+{}b", "-{}b"]);
}
