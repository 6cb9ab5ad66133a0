/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use crate::constants::XML_NS;

const XML_PREFIX: &str = "xml";

const XMLNS: &str = "xmlns";

/// Prefix bindings of the currently open elements.
///
/// Each open element remembers the [mark()](Namespaces::mark) taken before
/// its own declarations and truncates back to it when it closes, so a
/// declaration never outlives its element.
#[derive(Debug, Default)]
pub(super) struct Namespaces {
    // (prefix, uri), empty prefix is the default namespace
    bindings: Vec<(String, String)>,
}

impl Namespaces {
    pub(super) fn mark(&self) -> usize {
        self.bindings.len()
    }

    pub(super) fn truncate(&mut self, mark: usize) {
        self.bindings.truncate(mark);
    }

    pub(super) fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Declares a binding if the attribute is a namespace declaration.
    ///
    /// Returns false for ordinary attributes.
    pub(super) fn declare(&mut self, attribute: &str, uri: &str) -> bool {
        let prefix = if attribute == XMLNS {
            ""
        } else if let Some(prefix) = attribute.strip_prefix("xmlns:") {
            prefix
        } else {
            return false;
        };
        self.bindings.push((prefix.to_string(), uri.to_string()));
        true
    }

    /// Namespace URI bound to the prefix, the empty prefix being the default.
    ///
    /// The default namespace resolves to an empty URI when undeclared or
    /// undeclared with `xmlns=""`.
    pub(super) fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == XML_PREFIX {
            return Some(XML_NS);
        }
        match self.bindings.iter().rev().find(|(p, _)| p == prefix) {
            Some((_, uri)) if prefix.is_empty() || !uri.is_empty() => Some(uri.as_str()),
            Some(_) => None,
            None if prefix.is_empty() => Some(""),
            None => None,
        }
    }
}

/// Splits a raw name into its optional prefix and local part.
pub(super) fn split_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes() {
        let mut ns = Namespaces::default();
        assert_eq!(ns.resolve(""), Some(""));
        assert_eq!(ns.resolve("xml"), Some(XML_NS));
        assert_eq!(ns.resolve("p"), None);

        let outer = ns.mark();
        assert!(ns.declare("xmlns", "d"));
        assert!(ns.declare("xmlns:p", "r"));
        assert!(!ns.declare("key", "v"));
        assert!(!ns.declare("xmlnsx", "v"));
        assert_eq!(ns.resolve(""), Some("d"));
        assert_eq!(ns.resolve("p"), Some("r"));

        let inner = ns.mark();
        ns.declare("xmlns:p", "s");
        ns.declare("xmlns", "");
        assert_eq!(ns.resolve("p"), Some("s"));
        assert_eq!(ns.resolve(""), Some(""));

        ns.truncate(inner);
        assert_eq!(ns.resolve("p"), Some("r"));
        assert_eq!(ns.resolve(""), Some("d"));

        ns.truncate(outer);
        assert_eq!(ns.resolve("p"), None);
    }

    #[test]
    fn empty_prefixed_binding_is_unbound() {
        let mut ns = Namespaces::default();
        ns.declare("xmlns:p", "");
        assert_eq!(ns.resolve("p"), None);
    }

    #[test]
    fn names() {
        assert_eq!(split_name("a"), (None, "a"));
        assert_eq!(split_name("ns:Child"), (Some("ns"), "Child"));
        assert_eq!(split_name("stream:stream"), (Some("stream"), "stream"));
    }
}
