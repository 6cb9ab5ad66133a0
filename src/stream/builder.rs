/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::sync::Arc;

use super::ParseError;
use super::StreamEvent;
use super::StreamHandler;
use super::namespace::Namespaces;
use super::namespace::split_name;
use crate::ElementRegistry;
use crate::SaxElement;
use crate::SaxError;
use crate::SaxHandler;
use crate::element::Element;
use crate::element::QName;

struct OpenElement {
    raw_name: String,
    element: Element,
    scope: usize,
}

#[derive(Default)]
struct PendingTag {
    raw_name: String,
    attributes: Vec<(String, String)>,
}

/// Builds the element tree out of tokenizer constructs.
///
/// Open elements live on an explicit stack rather than having parent
/// links; closing an element pops it and moves it into the new top.
pub(super) struct TreeBuilder {
    registry: Arc<ElementRegistry>,
    discard_stanzas: bool,
    namespaces: Namespaces,
    stack: Vec<OpenElement>,
    pending: Option<PendingTag>,
    root_name: Option<String>,
    error: Option<ParseError>,
}

impl TreeBuilder {
    pub(super) fn new(registry: Arc<ElementRegistry>) -> Self {
        TreeBuilder {
            registry,
            discard_stanzas: false,
            namespaces: Namespaces::default(),
            stack: Vec::new(),
            pending: None,
            root_name: None,
            error: None,
        }
    }

    pub(super) fn set_discard_stanzas(&mut self, discard: bool) {
        self.discard_stanzas = discard;
    }

    pub(super) fn reset(&mut self) {
        self.namespaces.clear();
        self.stack.clear();
        self.pending = None;
        self.root_name = None;
        self.error = None;
    }

    pub(super) fn depth(&self) -> usize {
        self.stack.len()
    }

    pub(super) fn take_error(&mut self) -> Option<ParseError> {
        self.error.take()
    }

    /// Binds the builder to the handler of a single feed call.
    pub(super) fn with_handler<'a, H: StreamHandler>(
        &'a mut self,
        handler: &'a mut H,
    ) -> Sink<'a, H> {
        Sink {
            tree: self,
            handler,
        }
    }

    fn start_tag(&mut self, raw_name: &str) -> Result<(), ParseError> {
        if self.stack.is_empty() {
            if let Some(first) = &self.root_name {
                return Err(ParseError::MultipleRoots {
                    first: first.clone(),
                    second: raw_name.to_string(),
                });
            }
        }
        self.pending = Some(PendingTag {
            raw_name: raw_name.to_string(),
            attributes: Vec::new(),
        });
        Ok(())
    }

    fn attribute(&mut self, name: &str, value: &str) {
        if let Some(pending) = &mut self.pending {
            pending
                .attributes
                .push((name.to_string(), value.to_string()));
        }
    }

    fn resolve(&self, prefix: Option<&str>) -> Result<String, ParseError> {
        match prefix {
            None => Ok(self.namespaces.resolve("").unwrap_or_default().to_string()),
            Some(prefix) => match self.namespaces.resolve(prefix) {
                Some(uri) => Ok(uri.to_string()),
                None => Err(ParseError::UnboundPrefix(prefix.to_string())),
            },
        }
    }

    fn open(&mut self, handler: &mut impl StreamHandler, empty: bool) -> Result<(), ParseError> {
        let pending = self.pending.take().unwrap_or_default();
        let scope = self.namespaces.mark();

        // Declarations first, they apply to the tag carrying them
        let mut attributes = Vec::with_capacity(pending.attributes.len());
        for (name, value) in pending.attributes {
            if !self.namespaces.declare(&name, &value) {
                attributes.push((name, value));
            }
        }

        let (prefix, local) = split_name(&pending.raw_name);
        let namespace = self.resolve(prefix)?;
        let mut element = self
            .registry
            .create(local, &namespace)
            .unwrap_or_else(|| Element::new(QName::new(local, namespace.as_str())));
        element.set_prefix(prefix.map(str::to_string));

        for (name, value) in attributes {
            let (prefix, local) = split_name(&name);
            let namespace = match prefix {
                // Unprefixed attributes are in no namespace
                None => String::new(),
                Some(_) => self.resolve(prefix)?,
            };
            if element.attribute_ns(local, &namespace).is_some() {
                return Err(ParseError::DuplicateAttribute(name));
            }
            element.set_attribute(QName::new(local, namespace), value);
        }

        self.stack.push(OpenElement {
            raw_name: pending.raw_name,
            element,
            scope,
        });
        if self.stack.len() == 1 {
            self.root_name = Some(self.stack[0].raw_name.clone());
            handler.handle_event(StreamEvent::DocumentStart(&self.stack[0].element));
        }

        if empty {
            self.close(handler);
        }
        Ok(())
    }

    fn end_tag(
        &mut self,
        handler: &mut impl StreamHandler,
        raw_name: &str,
    ) -> Result<(), ParseError> {
        let Some(top) = self.stack.last() else {
            // The tokenizer reports the stray end tag itself
            return Ok(());
        };
        if top.raw_name != raw_name {
            return Err(ParseError::TagMismatch {
                open: top.raw_name.clone(),
                close: raw_name.to_string(),
            });
        }
        self.close(handler);
        Ok(())
    }

    fn close(&mut self, handler: &mut impl StreamHandler) {
        let Some(open) = self.stack.pop() else {
            return;
        };
        self.namespaces.truncate(open.scope);

        let mut element = open.element;
        if let Some(text) = element.take_text() {
            if !text.trim().is_empty() {
                element.set_text(text);
            }
        }

        handler.handle_event(StreamEvent::ElementComplete(&element));

        let stanza = self.stack.len() == 1;
        match self.stack.last_mut() {
            None => handler.handle_event(StreamEvent::DocumentEnd(&element)),
            Some(_) if stanza && self.discard_stanzas => (),
            Some(parent) => parent.element.push_child(element),
        }
    }

    fn cdata(&mut self, text: &str) {
        let discard = self.discard_stanzas && self.stack.len() == 1;
        if let Some(top) = self.stack.last_mut() {
            if !discard {
                top.element.append_text(text);
            }
        }
    }
}

/// A [TreeBuilder] paired with the handler receiving its events.
pub(super) struct Sink<'a, H: StreamHandler> {
    tree: &'a mut TreeBuilder,
    handler: &'a mut H,
}

impl<H: StreamHandler> Sink<'_, H> {
    fn dispatch(&mut self, element: &SaxElement) -> Result<(), ParseError> {
        match element {
            SaxElement::StartTag(name) => self.tree.start_tag(name),
            SaxElement::Attribute(name, value) => {
                self.tree.attribute(name, value);
                Ok(())
            }
            SaxElement::StartTagContent => self.tree.open(&mut *self.handler, false),
            SaxElement::StartTagEmpty => self.tree.open(&mut *self.handler, true),
            SaxElement::EndTag(name) => self.tree.end_tag(&mut *self.handler, name),
            SaxElement::CData(text) => {
                self.tree.cdata(text);
                Ok(())
            }
        }
    }
}

impl<H: StreamHandler> SaxHandler for Sink<'_, H> {
    fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError> {
        self.dispatch(element).map_err(|error| {
            self.tree.error = Some(error);
            SaxError::HandlerAbort
        })
    }
}
