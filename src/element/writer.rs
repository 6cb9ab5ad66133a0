/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Write;

use super::Element;
use crate::constants::XML_NS;
use crate::entities::escape_fmt;

type Result<T> = std::result::Result<T, std::fmt::Error>;

const XML_PREFIX: &str = "xml";

/// Namespace-aware serializer.
///
/// Keeps the prefix bindings of the open tags, so declarations are only
/// written where the in-scope binding differs from what an element needs.
pub(super) struct XmlWriter<'a, W: Write> {
    out: &'a mut W,
    // (prefix, namespace) pairs, empty prefix is the default namespace
    bindings: Vec<(String, String)>,
    next_prefix: usize,
}

impl<'a, W: Write> XmlWriter<'a, W> {
    pub(super) fn new(out: &'a mut W) -> Self {
        XmlWriter {
            out,
            bindings: Vec::new(),
            next_prefix: 0,
        }
    }

    fn lookup(&self, prefix: &str) -> Option<&str> {
        if prefix == XML_PREFIX {
            return Some(XML_NS);
        }
        match self.bindings.iter().rev().find(|(p, _)| p == prefix) {
            Some((_, namespace)) => Some(namespace.as_str()),
            None if prefix.is_empty() => Some(""),
            None => None,
        }
    }

    fn bind(&mut self, prefix: &str, namespace: &str) {
        self.bindings.push((prefix.to_string(), namespace.to_string()));
    }

    fn element_prefix(&mut self, element: &Element) -> Option<String> {
        let namespace = element.namespace();
        if let Some(hint) = element.prefix() {
            if !hint.is_empty() && !namespace.is_empty() && hint != XML_PREFIX {
                if self.lookup(hint) != Some(namespace) {
                    self.bind(hint, namespace);
                }
                return Some(hint.to_string());
            }
        }
        if self.lookup("") != Some(namespace) {
            self.bind("", namespace);
        }
        None
    }

    fn attribute_prefix(&mut self, namespace: &str) -> String {
        if namespace == XML_NS {
            return XML_PREFIX.to_string();
        }
        let found = self
            .bindings
            .iter()
            .rev()
            .filter(|(p, ns)| !p.is_empty() && ns == namespace)
            .map(|(p, _)| p.clone())
            .find(|p| self.lookup(p) == Some(namespace));
        if let Some(prefix) = found {
            return prefix;
        }
        loop {
            let prefix = format!("ns{}", self.next_prefix);
            self.next_prefix += 1;
            if self.lookup(&prefix).is_none() {
                self.bind(&prefix, namespace);
                return prefix;
            }
        }
    }

    fn start(&mut self, element: &Element, default_namespace: &str) -> Result<String> {
        let mark = self.bindings.len();

        let prefix = self.element_prefix(element);
        if prefix.is_some()
            && !default_namespace.is_empty()
            && self.lookup("") != Some(default_namespace)
        {
            self.bind("", default_namespace);
        }

        let mut attributes = Vec::with_capacity(element.attributes.len());
        for (name, value) in &element.attributes {
            let qname = if name.namespace.is_empty() {
                name.local.clone()
            } else {
                let prefix = self.attribute_prefix(&name.namespace);
                format!("{}:{}", prefix, name.local)
            };
            attributes.push((qname, value.as_str()));
        }

        let qname = match prefix {
            Some(prefix) => format!("{}:{}", prefix, element.local_name()),
            None => element.local_name().to_string(),
        };
        write!(self.out, "<{}", qname)?;
        for (p, namespace) in &self.bindings[mark..] {
            if p.is_empty() {
                self.out.write_str(" xmlns=\"")?;
            } else {
                write!(self.out, " xmlns:{}=\"", p)?;
            }
            escape_fmt(namespace, &mut *self.out)?;
            self.out.write_char('"')?;
        }
        for (name, value) in attributes {
            write!(self.out, " {}=\"", name)?;
            escape_fmt(value, &mut *self.out)?;
            self.out.write_char('"')?;
        }
        Ok(qname)
    }

    /// Writes the start tag and leaves the element open.
    pub(super) fn start_tag(&mut self, element: &Element, default_namespace: &str) -> Result<()> {
        self.start(element, default_namespace)?;
        self.out.write_char('>')
    }

    /// Writes a whole element with its descendants.
    pub(super) fn element(&mut self, element: &Element) -> Result<()> {
        let mark = self.bindings.len();
        let qname = self.start(element, "")?;
        let text = element.text().filter(|text| !text.is_empty());
        if element.children().is_empty() && text.is_none() {
            self.bindings.truncate(mark);
            return self.out.write_str("/>");
        }
        self.out.write_char('>')?;
        if let Some(text) = text {
            escape_fmt(text, &mut *self.out)?;
        }
        for child in element.children() {
            self.element(child)?;
        }
        write!(self.out, "</{}>", qname)?;
        self.bindings.truncate(mark);
        Ok(())
    }
}
