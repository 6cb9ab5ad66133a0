/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod typed;
mod writer;

use std::fmt::Display;

pub use typed::Auth;
pub use typed::Failure;
pub use typed::Features;
pub use typed::Mechanism;
pub use typed::Mechanisms;
pub use typed::Stream;
pub use typed::Success;
use writer::XmlWriter;

/// A name paired with its resolved namespace URI.
///
/// An empty namespace means the name is not in any namespace.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct QName {
    pub local: String,
    pub namespace: String,
}

impl QName {
    pub fn new(local: impl Into<String>, namespace: impl Into<String>) -> Self {
        QName {
            local: local.into(),
            namespace: namespace.into(),
        }
    }

    /// A name without a namespace.
    pub fn local(local: impl Into<String>) -> Self {
        QName {
            local: local.into(),
            namespace: String::new(),
        }
    }

    pub fn is(&self, local: &str, namespace: &str) -> bool {
        self.local == local && self.namespace == namespace
    }
}

impl Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

/// The closed set of element variants known to the protocol layer.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ElementKind {
    Stream,
    Features,
    Mechanisms,
    Mechanism,
    Auth,
    Success,
    Failure,
    #[default]
    Generic,
}

/// A node of a parsed or constructed XML tree.
///
/// All variants share the same payload; the [kind](Element::kind) only
/// selects which typed view (see [as_features()](Element::as_features) and
/// friends) is meaningful. Text content of an element is kept as a single
/// string, concatenated in document order.
#[derive(Clone, Debug)]
pub struct Element {
    kind: ElementKind,
    name: QName,
    prefix: Option<String>,
    attributes: Vec<(QName, String)>,
    children: Vec<Element>,
    text: Option<String>,
}

impl Element {
    /// Creates a generic element.
    pub fn new(name: QName) -> Self {
        Element::with_kind(ElementKind::Generic, name)
    }

    pub fn with_kind(kind: ElementKind, name: QName) -> Self {
        Element {
            kind,
            name,
            prefix: None,
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn local_name(&self) -> &str {
        &self.name.local
    }

    pub fn namespace(&self) -> &str {
        &self.name.namespace
    }

    pub fn is(&self, local: &str, namespace: &str) -> bool {
        self.name.is(local, namespace)
    }

    /// Prefix the element was written with, if any.
    ///
    /// This is only a hint for serialization and does not take part in
    /// equality.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn set_prefix(&mut self, prefix: Option<String>) {
        self.prefix = prefix;
    }

    /// Looks up an attribute without a namespace.
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attribute_ns(local, "")
    }

    pub fn attribute_ns(&self, local: &str, namespace: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name.is(local, namespace))
            .map(|(_, value)| value.as_str())
    }

    /// Sets an attribute value, replacing the old value of the same name.
    ///
    /// New attributes are kept in insertion order.
    pub fn set_attribute(&mut self, name: QName, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(old, _)| *old == name) {
            Some((_, old_value)) => *old_value = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&QName, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name, value.as_str()))
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// First child with the given name in document order.
    pub fn child(&self, local: &str, namespace: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.is(local, namespace))
    }

    pub fn children_named<'a>(
        &'a self,
        local: &'a str,
        namespace: &'a str,
    ) -> impl Iterator<Item = &'a Element> {
        self.children
            .iter()
            .filter(move |child| child.is(local, namespace))
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    pub fn append_text(&mut self, text: &str) {
        match &mut self.text {
            Some(old) => old.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }

    pub(crate) fn take_text(&mut self) -> Option<String> {
        self.text.take()
    }

    /// Serialized form of the element and all of its descendants.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Serializes only the start tag, leaving the element open.
    ///
    /// A non-empty `default_namespace` is declared on the tag unless the
    /// element itself is in that namespace already. Children and text are
    /// not written.
    pub fn open_tag(&self, default_namespace: &str) -> String {
        OpenTag {
            element: self,
            default_namespace,
        }
        .to_string()
    }

    pub fn as_stream(&self) -> Option<Stream<'_>> {
        Stream::view(self)
    }

    pub fn as_features(&self) -> Option<Features<'_>> {
        Features::view(self)
    }

    pub fn as_mechanisms(&self) -> Option<Mechanisms<'_>> {
        Mechanisms::view(self)
    }

    pub fn as_mechanism(&self) -> Option<Mechanism<'_>> {
        Mechanism::view(self)
    }

    pub fn as_auth(&self) -> Option<Auth<'_>> {
        Auth::view(self)
    }

    pub fn as_success(&self) -> Option<Success<'_>> {
        Success::view(self)
    }

    pub fn as_failure(&self) -> Option<Failure<'_>> {
        Failure::view(self)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.name == other.name
            && self.attributes == other.attributes
            && self.children == other.children
            && self.text == other.text
    }
}

impl Eq for Element {}

impl Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        XmlWriter::new(f).element(self)
    }
}

struct OpenTag<'a> {
    element: &'a Element,
    default_namespace: &'a str,
}

impl Display for OpenTag<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        XmlWriter::new(f).start_tag(self.element, self.default_namespace)
    }
}
