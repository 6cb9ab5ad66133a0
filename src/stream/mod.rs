/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod builder;
mod error;
mod namespace;

use std::sync::Arc;

use builder::TreeBuilder;
pub use error::ParseError;
use error::description;

use crate::ElementRegistry;
use crate::SaxError;
use crate::SaxParser;
use crate::element::Element;

/// Structural events of the inbound document.
#[derive(Clone, Copy, Debug)]
pub enum StreamEvent<'a> {
    /// The start tag of the root element is complete.
    ///
    /// The element has its attributes, but no children yet.
    DocumentStart(&'a Element),

    /// An element, root included, was closed.
    ElementComplete(&'a Element),

    /// The root element was closed. Follows its ElementComplete event.
    DocumentEnd(&'a Element),
}

pub trait StreamHandler {
    fn handle_event(&mut self, event: StreamEvent<'_>);
}

impl<F> StreamHandler for F
where
    F: FnMut(StreamEvent<'_>),
{
    fn handle_event(&mut self, event: StreamEvent<'_>) {
        self(event)
    }
}

/// Incremental, namespace-aware XML stream parser.
///
/// Bytes are pushed in chunks of any size with [feed()](StreamParser::feed);
/// partially received tags, names and references are carried over to
/// the next call. Elements are constructed through the
/// [ElementRegistry], falling back to generic elements for unknown names.
///
/// Any error discards the in-flight tree and the rest of the failing
/// chunk, leaving the parser ready for a new document.
///
/// # Examples
///
/// ```
/// use ikstream::{StreamEvent, StreamParser};
///
/// let mut names = Vec::new();
/// let mut parser = StreamParser::default();
/// let mut handler = |event: StreamEvent<'_>| {
///     if let StreamEvent::ElementComplete(element) = event {
///         names.push(element.local_name().to_string());
///     }
/// };
/// parser.feed(b"<doc xmlns='urn:a'><it", &mut handler).unwrap();
/// parser.feed(b"em/></doc>", &mut handler).unwrap();
/// parser.finish().unwrap();
/// assert_eq!(names, ["item", "doc"]);
/// ```
pub struct StreamParser {
    sax: SaxParser,
    tree: TreeBuilder,
}

impl StreamParser {
    pub fn new(registry: Arc<ElementRegistry>) -> Self {
        StreamParser {
            sax: SaxParser::new(),
            tree: TreeBuilder::new(registry),
        }
    }

    /// Drops the children of the root element after their events.
    ///
    /// A session stream is a single document which never closes until
    /// the session ends. Without this, every stanza would be kept in the
    /// root element for the whole session.
    pub fn discard_stanzas(mut self) -> Self {
        self.tree.set_discard_stanzas(true);
        self
    }

    /// Number of currently open elements.
    pub fn depth(&self) -> usize {
        self.tree.depth()
    }

    /// Parses the next chunk of the input.
    ///
    /// Events are sent to the handler as soon as the constructs complete.
    pub fn feed(
        &mut self,
        bytes: &[u8],
        handler: &mut impl StreamHandler,
    ) -> Result<(), ParseError> {
        let mut sink = self.tree.with_handler(handler);
        let result = self.sax.parse_bytes(&mut sink, bytes);
        result.map_err(|error| {
            let error = self.convert(error);
            self.reset();
            error
        })
    }

    /// Checks that the document was complete, then resets the parser.
    pub fn finish(&mut self) -> Result<(), ParseError> {
        let result = self.sax.parse_finish();
        self.reset();
        result.map_err(|_| ParseError::Truncated)
    }

    /// Discards any partially parsed document.
    pub fn reset(&mut self) {
        self.sax.reset();
        self.tree.reset();
    }

    fn convert(&mut self, error: SaxError) -> ParseError {
        if let Some(error) = self.tree.take_error() {
            return error;
        }
        let location = self.sax.location();
        match error {
            SaxError::NoMemory => ParseError::NoMemory,
            SaxError::BadXml(description) => ParseError::Syntax {
                description,
                location,
            },
            SaxError::HandlerAbort => ParseError::Syntax {
                description: description::HANDLER_ABORT,
                location,
            },
        }
    }
}

impl Default for StreamParser {
    /// A parser using the built-in element types.
    fn default() -> Self {
        StreamParser::new(ElementRegistry::builtin())
    }
}

#[cfg(test)]
mod tests;
