/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use super::*;
use crate::Auth;
use crate::ElementKind;
use crate::QName;
use crate::Stream;
use crate::constants::CLIENT_NS;
use crate::constants::SASL_NS;
use crate::constants::STREAM_NS;

#[derive(Debug, Eq, PartialEq)]
enum Event {
    Start(String),
    Complete(String),
    End(String),
}

#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
    start: Option<Element>,
    completed: Vec<Element>,
    end: Option<Element>,
}

impl StreamHandler for Recorder {
    fn handle_event(&mut self, event: StreamEvent<'_>) {
        match event {
            StreamEvent::DocumentStart(element) => {
                self.events.push(Event::Start(element.name().to_string()));
                self.start = Some(element.clone());
            }
            StreamEvent::ElementComplete(element) => {
                self.events
                    .push(Event::Complete(element.name().to_string()));
                self.completed.push(element.clone());
            }
            StreamEvent::DocumentEnd(element) => {
                self.events.push(Event::End(element.name().to_string()));
                self.end = Some(element.clone());
            }
        }
    }
}

fn start(name: &str) -> Event {
    Event::Start(name.to_string())
}

fn complete(name: &str) -> Event {
    Event::Complete(name.to_string())
}

fn end(name: &str) -> Event {
    Event::End(name.to_string())
}

fn parse(input: &str) -> (Recorder, Result<(), ParseError>) {
    let mut recorder = Recorder::default();
    let mut parser = StreamParser::default();
    let result = parser.feed(input.as_bytes(), &mut recorder);
    (recorder, result)
}

fn parse_bytewise(input: &str) -> (Recorder, Result<(), ParseError>) {
    let mut recorder = Recorder::default();
    let mut parser = StreamParser::default();
    for byte in input.as_bytes() {
        let result = parser.feed(std::slice::from_ref(byte), &mut recorder);
        if result.is_err() {
            return (recorder, result);
        }
    }
    (recorder, Ok(()))
}

const SCENARIO: &str = "<Root xmlns=\"d\" xmlns:ns=\"r\" ns:Key=\"55\">\
    <ns:Child ns:Key=\"01\"><GrandChild/></ns:Child>\
    <Child Key=\"03\"/></Root>";

#[test]
fn scenario() {
    for (recorder, result) in [parse(SCENARIO), parse_bytewise(SCENARIO)] {
        assert_eq!(result, Ok(()));
        assert_eq!(
            recorder.events,
            [
                start("{d}Root"),
                complete("{d}GrandChild"),
                complete("{r}Child"),
                complete("{d}Child"),
                complete("{d}Root"),
                end("{d}Root"),
            ]
        );

        let root = recorder.end.unwrap();
        let attributes: Vec<(String, &str)> = root
            .attributes()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        assert_eq!(attributes, [("{r}Key".to_string(), "55")]);

        let first = &root.children()[0];
        assert_eq!(first.prefix(), Some("ns"));
        assert_eq!(first.attribute_ns("Key", "r"), Some("01"));
        assert_eq!(first.attribute("Key"), None);
        assert!(first.child("GrandChild", "d").is_some());

        let second = root.child("Child", "d").unwrap();
        assert_eq!(second.attribute("Key"), Some("03"));

        // The start event carries attributes but no children
        let started = recorder.start.unwrap();
        assert_eq!(started.attribute_ns("Key", "r"), Some("55"));
        assert!(started.children().is_empty());
    }
}

#[test]
fn finish() {
    let mut recorder = Recorder::default();
    let mut parser = StreamParser::default();
    parser.feed(SCENARIO.as_bytes(), &mut recorder).unwrap();
    assert_eq!(parser.finish(), Ok(()));

    // Parser is ready for the next document
    parser.feed(b"<x/>", &mut recorder).unwrap();
    assert_eq!(parser.finish(), Ok(()));
    assert_eq!(recorder.events.last(), Some(&end("x")));
}

#[test]
fn default_namespace_applies_to_own_tag() {
    let (recorder, result) = parse("<x:a xmlns:x='u' xmlns='v'><b/><x:c/></x:a>");
    assert_eq!(result, Ok(()));
    assert_eq!(
        recorder.events,
        [
            start("{u}a"),
            complete("{v}b"),
            complete("{u}c"),
            complete("{u}a"),
            end("{u}a"),
        ]
    );

    let (recorder, result) = parse("<a xmlns='u'><b xmlns=''><c/></b></a>");
    assert_eq!(result, Ok(()));
    assert_eq!(recorder.completed[0].name(), &QName::local("c"));
    assert_eq!(recorder.completed[1].name(), &QName::local("b"));
    assert_eq!(recorder.completed[2].name(), &QName::new("a", "u"));
}

#[test]
fn nested_declarations_shadow() {
    let (recorder, result) =
        parse("<p:a xmlns:p='one'><p:b xmlns:p='two'><p:c/></p:b><p:d/></p:a>");
    assert_eq!(result, Ok(()));
    assert_eq!(
        recorder.events,
        [
            start("{one}a"),
            complete("{two}c"),
            complete("{two}b"),
            complete("{one}d"),
            complete("{one}a"),
            end("{one}a"),
        ]
    );
}

#[test]
fn sibling_prefix_does_not_leak() {
    let (recorder, result) = parse("<a><b xmlns:p='y'><p:c/></b><p:c/></a>");
    assert_eq!(result, Err(ParseError::UnboundPrefix("p".to_string())));
    assert_eq!(
        recorder.events,
        [start("a"), complete("{y}c"), complete("b")]
    );

    let (_, result) = parse("<a p:k='1'/>");
    assert_eq!(result, Err(ParseError::UnboundPrefix("p".to_string())));
}

#[test]
fn xml_prefix_is_predeclared() {
    let (recorder, result) = parse("<a xml:lang='en'/>");
    assert_eq!(result, Ok(()));
    let root = recorder.end.unwrap();
    assert_eq!(
        root.attribute_ns("lang", "http://www.w3.org/XML/1998/namespace"),
        Some("en")
    );
}

#[test]
fn multiple_roots() {
    let input = "<a><b/></a><c/>";
    for (recorder, result) in [parse(input), parse_bytewise(input)] {
        assert_eq!(
            result,
            Err(ParseError::MultipleRoots {
                first: "a".to_string(),
                second: "c".to_string(),
            })
        );
        assert_eq!(
            recorder.events,
            [start("a"), complete("b"), complete("a"), end("a")]
        );
    }
}

#[test]
fn recovers_after_error() {
    let mut recorder = Recorder::default();
    let mut parser = StreamParser::default();
    let result = parser.feed(b"<a/><b/><c/>", &mut recorder);
    assert!(matches!(result, Err(ParseError::MultipleRoots { .. })));
    assert_eq!(parser.depth(), 0);

    // Rest of the failing chunk is dropped, next chunk is a new document
    parser.feed(b"<d><e/>", &mut recorder).unwrap();
    assert_eq!(parser.depth(), 1);
    assert_eq!(
        recorder.events,
        [
            start("a"),
            complete("a"),
            end("a"),
            start("d"),
            complete("e"),
        ]
    );
}

#[test]
fn tag_mismatch() {
    let (recorder, result) = parse("<a><b></a>");
    let error = result.unwrap_err();
    assert_eq!(
        error,
        ParseError::TagMismatch {
            open: "b".to_string(),
            close: "a".to_string(),
        }
    );
    let message = error.to_string();
    assert!(message.contains("<b>"));
    assert!(message.contains("</a>"));
    assert_eq!(recorder.events, [start("a")]);
    assert!(recorder.end.is_none());
}

#[test]
fn truncated() {
    let mut recorder = Recorder::default();
    let mut parser = StreamParser::default();
    parser
        .feed(b"<a><b/><c>text</c><d x='1'", &mut recorder)
        .unwrap();
    assert_eq!(
        recorder.events,
        [start("a"), complete("b"), complete("c")]
    );
    assert_eq!(parser.finish(), Err(ParseError::Truncated));
    assert!(recorder.end.is_none());

    assert_eq!(parser.finish(), Err(ParseError::Truncated));
}

#[test]
fn syntax_errors() {
    let (recorder, result) = parse("<a><b x=1/></a>");
    match result {
        Err(ParseError::Syntax { location, .. }) => assert_eq!(location.bytes, 8),
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(recorder.events, [start("a")]);

    let (_, result) = parse("<a>&custom;</a>");
    assert!(matches!(result, Err(ParseError::Syntax { .. })));
}

#[test]
fn duplicate_attributes() {
    let (_, result) = parse("<a x='1' x='2'/>");
    assert_eq!(result, Err(ParseError::DuplicateAttribute("x".to_string())));

    let (_, result) = parse("<a xmlns:p='u' xmlns:q='u' p:k='1' q:k='2'/>");
    assert_eq!(
        result,
        Err(ParseError::DuplicateAttribute("q:k".to_string()))
    );

    // Same local name in different namespaces is fine
    let (recorder, result) = parse("<a xmlns:p='u' k='1' p:k='2'/>");
    assert_eq!(result, Ok(()));
    let root = recorder.end.unwrap();
    assert_eq!(root.attribute("k"), Some("1"));
    assert_eq!(root.attribute_ns("k", "u"), Some("2"));
}

#[test]
fn text_content() {
    let (recorder, result) = parse("<a>\n  <b>x &amp; <![CDATA[<y>]]></b>\n</a>");
    assert_eq!(result, Ok(()));
    assert_eq!(recorder.completed[0].text(), Some("x & <y>"));
    assert_eq!(recorder.completed[1].text(), None);

    let (recorder, _) = parse_bytewise("<a>\u{e7}\u{11e}\u{20ac}</a>");
    assert_eq!(recorder.end.unwrap().text(), Some("\u{e7}\u{11e}\u{20ac}"));
}

const FEATURES: &str = "<?xml version='1.0'?>\
    <stream:stream xmlns:stream='http://etherx.jabber.org/streams' \
    xmlns='jabber:client' id='s1' from='example.com' version='1.0'>\
    <stream:features>\
    <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
    <mechanism>X-OAUTH2</mechanism>\
    <mechanism>X-GOOGLE-TOKEN</mechanism>\
    <mechanism>PLAIN</mechanism>\
    </mechanisms>\
    </stream:features>\
    <message to='a'>hi</message>";

#[test]
fn typed_elements() {
    for (recorder, result) in [parse(FEATURES), parse_bytewise(FEATURES)] {
        assert_eq!(result, Ok(()));

        let stream = recorder.start.unwrap();
        assert_eq!(stream.kind(), ElementKind::Stream);
        let view = stream.as_stream().unwrap();
        assert_eq!(view.id(), Some("s1"));
        assert_eq!(view.from(), Some("example.com"));
        assert_eq!(view.version(), Some("1.0"));

        let kinds: Vec<ElementKind> = recorder.completed.iter().map(Element::kind).collect();
        assert_eq!(
            kinds,
            [
                ElementKind::Mechanism,
                ElementKind::Mechanism,
                ElementKind::Mechanism,
                ElementKind::Mechanisms,
                ElementKind::Features,
                ElementKind::Generic,
            ]
        );

        let features = recorder.completed[4].as_features().unwrap();
        assert_eq!(
            features.mechanisms().unwrap().names(),
            ["X-OAUTH2", "X-GOOGLE-TOKEN", "PLAIN"]
        );
        assert!(features.is("features", STREAM_NS));
        assert!(recorder.completed[3].is("mechanisms", SASL_NS));

        let message = &recorder.completed[5];
        assert!(message.is("message", CLIENT_NS));
        assert_eq!(message.text(), Some("hi"));
    }
}

#[test]
fn stanzas_are_kept_by_default() {
    let input = format!("{}</stream:stream>", FEATURES);
    let (recorder, result) = parse(&input);
    assert_eq!(result, Ok(()));
    let root = recorder.end.unwrap();
    assert_eq!(root.children().len(), 2);
}

#[test]
fn discard_stanzas() {
    let mut recorder = Recorder::default();
    let mut parser = StreamParser::default().discard_stanzas();
    parser.feed(FEATURES.as_bytes(), &mut recorder).unwrap();
    parser
        .feed(b" stray text </stream:stream>", &mut recorder)
        .unwrap();

    // Stanzas still carry their own children
    assert_eq!(recorder.completed[4].children().len(), 1);
    let root = recorder.end.unwrap();
    assert!(root.children().is_empty());
    assert_eq!(root.text(), None);
    assert_eq!(root.kind(), ElementKind::Stream);
}

#[test]
fn custom_registry() {
    let mut registry = ElementRegistry::with_builtins();
    registry.register("ok", "urn:test", |name| {
        Element::with_kind(ElementKind::Success, name)
    });
    let mut recorder = Recorder::default();
    let mut parser = StreamParser::new(Arc::new(registry));
    parser
        .feed(b"<ok xmlns='urn:test'><no/></ok>", &mut recorder)
        .unwrap();
    assert_eq!(recorder.completed[0].kind(), ElementKind::Generic);
    assert_eq!(recorder.completed[1].kind(), ElementKind::Success);

    // Without the builtins, protocol elements are generic
    let mut recorder = Recorder::default();
    let mut parser = StreamParser::new(Arc::new(ElementRegistry::new()));
    parser
        .feed(b"<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>", &mut recorder)
        .unwrap();
    assert_eq!(recorder.completed[0].kind(), ElementKind::Generic);
}

#[test]
fn closure_handler() {
    let mut count = 0;
    let mut parser = StreamParser::default();
    parser
        .feed(SCENARIO.as_bytes(), &mut |event: StreamEvent<'_>| {
            if let StreamEvent::ElementComplete(_) = event {
                count += 1;
            }
        })
        .unwrap();
    assert_eq!(count, 4);
}

fn round_trip(element: &Element) -> Element {
    let mut recorder = Recorder::default();
    let mut parser = StreamParser::default();
    parser.feed(&element.to_bytes(), &mut recorder).unwrap();
    assert_eq!(parser.finish(), Ok(()));
    recorder.end.unwrap()
}

#[test]
fn round_trips() {
    let stream = Stream::build("gcm.googleapis.com", "1.0");
    let parsed = round_trip(&stream);
    assert_eq!(parsed, stream);
    assert_eq!(parsed.prefix(), Some("stream"));

    let auth = Auth::build("PLAIN", "AGEAYg==");
    assert_eq!(round_trip(&auth), auth);

    let mut root = Element::new(QName::new("Root", "d"));
    root.set_attribute(QName::new("Key", "r"), "55");
    let mut child = Element::new(QName::new("Child", "r"));
    child.set_prefix(Some("ns".to_string()));
    child.set_attribute(QName::new("Key", "r"), "0<1");
    child.push_child(Element::new(QName::new("GrandChild", "d")));
    root.push_child(child);
    let mut other = Element::new(QName::local("Child"));
    other.set_attribute(QName::local("Key"), "\"03\"");
    other.set_text("a & b");
    root.push_child(other);
    assert_eq!(round_trip(&root), root);
}
