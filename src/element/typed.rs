/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::ops::Deref;

use super::Element;
use super::ElementKind;
use super::QName;
use crate::constants::SASL_NS;
use crate::constants::STREAM_NS;
use crate::constants::STREAM_PREFIX;
use crate::constants::attributes;
use crate::constants::names;

macro_rules! typed_view {
    ($(#[$doc:meta])* $view:ident, $kind:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug)]
        pub struct $view<'a>(&'a Element);

        impl<'a> $view<'a> {
            pub(super) fn view(element: &'a Element) -> Option<Self> {
                match element.kind() {
                    ElementKind::$kind => Some($view(element)),
                    _ => None,
                }
            }

            pub fn element(&self) -> &'a Element {
                self.0
            }
        }

        impl Deref for $view<'_> {
            type Target = Element;

            fn deref(&self) -> &Element {
                self.0
            }
        }
    };
}

typed_view!(
    /// The stream header which frames the whole session.
    Stream,
    Stream
);

typed_view!(
    /// Stream features advertised by the server.
    Features,
    Features
);

typed_view!(Mechanisms, Mechanisms);

typed_view!(Mechanism, Mechanism);

typed_view!(
    /// Authentication request carrying the selected mechanism.
    Auth,
    Auth
);

typed_view!(Success, Success);

typed_view!(
    /// Authentication failure reported by the server.
    Failure,
    Failure
);

impl<'a> Stream<'a> {
    /// Builds a client stream header.
    ///
    /// The element carries the `stream` prefix hint, so it is written as
    /// `stream:stream` with the matching declaration.
    pub fn build(to: &str, version: &str) -> Element {
        let mut element = Element::with_kind(
            ElementKind::Stream,
            QName::new(names::STREAM, STREAM_NS),
        );
        element.set_prefix(Some(STREAM_PREFIX.to_string()));
        element.set_attribute(QName::local(attributes::TO), to);
        element.set_attribute(QName::local(attributes::VERSION), version);
        element
    }

    pub fn id(&self) -> Option<&'a str> {
        self.0.attribute(attributes::ID)
    }

    pub fn to(&self) -> Option<&'a str> {
        self.0.attribute(attributes::TO)
    }

    pub fn from(&self) -> Option<&'a str> {
        self.0.attribute(attributes::FROM)
    }

    pub fn version(&self) -> Option<&'a str> {
        self.0.attribute(attributes::VERSION)
    }
}

impl<'a> Features<'a> {
    /// The SASL mechanisms list, if the server offers authentication.
    pub fn mechanisms(&self) -> Option<Mechanisms<'a>> {
        self.0
            .child(names::MECHANISMS, SASL_NS)
            .and_then(Element::as_mechanisms)
    }
}

impl<'a> Mechanisms<'a> {
    /// Advertised mechanisms in document order.
    pub fn iter(self) -> impl Iterator<Item = Mechanism<'a>> {
        self.0.children().iter().filter_map(Element::as_mechanism)
    }

    pub fn names(self) -> Vec<&'a str> {
        self.iter().map(|mechanism| mechanism.name()).collect()
    }
}

impl<'a> Mechanism<'a> {
    pub fn name(&self) -> &'a str {
        self.0.text().map_or("", str::trim)
    }
}

impl<'a> Auth<'a> {
    pub fn build(mechanism: &str, payload: &str) -> Element {
        let mut element =
            Element::with_kind(ElementKind::Auth, QName::new(names::AUTH, SASL_NS));
        element.set_attribute(QName::local(attributes::MECHANISM), mechanism);
        if !payload.is_empty() {
            element.set_text(payload);
        }
        element
    }

    pub fn mechanism(&self) -> Option<&'a str> {
        self.0.attribute(attributes::MECHANISM)
    }

    pub fn payload(&self) -> &'a str {
        self.0.text().unwrap_or("")
    }
}

impl<'a> Success<'a> {
    /// Additional data sent with the outcome, usually empty.
    pub fn payload(&self) -> Option<&'a str> {
        self.0.text()
    }
}

impl<'a> Failure<'a> {
    /// Defined condition such as `not-authorized`.
    pub fn condition(&self) -> Option<&'a str> {
        self.0
            .children()
            .iter()
            .map(Element::local_name)
            .find(|name| *name != names::TEXT)
    }

    /// Human readable explanation of the failure.
    pub fn description(&self) -> Option<&'a str> {
        self.0.child(names::TEXT, SASL_NS).and_then(Element::text)
    }
}
