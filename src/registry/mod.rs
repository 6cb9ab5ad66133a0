/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::OnceLock;

use crate::constants::SASL_NS;
use crate::constants::STREAM_NS;
use crate::constants::names;
use crate::element::Element;
use crate::element::ElementKind;
use crate::element::QName;

/// Constructs an element for the qualified name it was registered under.
pub type ElementFactory = Arc<dyn Fn(QName) -> Element + Send + Sync>;

/// Lookup table from qualified names to typed element constructors.
///
/// The registry is filled before the first parser or client is created
/// and then shared behind an [Arc], so lookups during parsing need no
/// locking.
///
/// # Examples
///
/// ```
/// use ikstream::{Element, ElementKind, ElementRegistry, QName};
///
/// let mut registry = ElementRegistry::with_builtins();
/// registry.register("ping", "urn:xmpp:ping", |name: QName| Element::new(name));
///
/// let features = registry
///     .create("features", "http://etherx.jabber.org/streams")
///     .unwrap();
/// assert_eq!(features.kind(), ElementKind::Features);
/// assert!(registry.create("ping", "urn:xmpp:ping").is_some());
/// assert!(registry.create("pong", "urn:xmpp:ping").is_none());
/// ```
#[derive(Clone, Default)]
pub struct ElementRegistry {
    // namespace -> local name -> factory
    factories: HashMap<String, HashMap<String, ElementFactory>>,
}

impl ElementRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        ElementRegistry::default()
    }

    /// Creates a registry with every built-in protocol element.
    pub fn with_builtins() -> Self {
        let mut registry = ElementRegistry::new();
        register_builtins(&mut registry);
        registry
    }

    /// Shared instance holding only the built-in elements.
    pub fn builtin() -> Arc<ElementRegistry> {
        static BUILTIN: OnceLock<Arc<ElementRegistry>> = OnceLock::new();
        BUILTIN
            .get_or_init(|| Arc::new(ElementRegistry::with_builtins()))
            .clone()
    }

    /// Associates a qualified name with a factory.
    ///
    /// A later registration for the same name replaces the earlier one.
    pub fn register<F>(&mut self, local: &str, namespace: &str, factory: F)
    where
        F: Fn(QName) -> Element + Send + Sync + 'static,
    {
        self.factories
            .entry(namespace.to_string())
            .or_default()
            .insert(local.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, local: &str, namespace: &str) -> bool {
        self.factory(local, namespace).is_some()
    }

    fn factory(&self, local: &str, namespace: &str) -> Option<&ElementFactory> {
        self.factories.get(namespace)?.get(local)
    }

    /// Constructs a fresh element, or returns None for unregistered names.
    pub fn create(&self, local: &str, namespace: &str) -> Option<Element> {
        self.factory(local, namespace)
            .map(|factory| factory(QName::new(local, namespace)))
    }

    pub fn len(&self) -> usize {
        self.factories.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for ElementRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self
            .factories
            .iter()
            .flat_map(|(namespace, locals)| {
                locals
                    .keys()
                    .map(move |local| QName::new(local.as_str(), namespace.as_str()).to_string())
            })
            .collect();
        names.sort();
        f.debug_struct("ElementRegistry")
            .field("names", &names)
            .finish()
    }
}

const BUILTINS: &[(&str, &str, ElementKind)] = &[
    (names::STREAM, STREAM_NS, ElementKind::Stream),
    (names::FEATURES, STREAM_NS, ElementKind::Features),
    (names::MECHANISMS, SASL_NS, ElementKind::Mechanisms),
    (names::MECHANISM, SASL_NS, ElementKind::Mechanism),
    (names::AUTH, SASL_NS, ElementKind::Auth),
    (names::SUCCESS, SASL_NS, ElementKind::Success),
    (names::FAILURE, SASL_NS, ElementKind::Failure),
];

/// Registers every built-in protocol element type.
pub fn register_builtins(registry: &mut ElementRegistry) {
    for &(local, namespace, kind) in BUILTINS {
        registry.register(local, namespace, move |name| Element::with_kind(kind, name));
    }
}
