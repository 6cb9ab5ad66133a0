/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use thiserror::Error;

use crate::Location;

/// Structural or syntactic violation found in the inbound XML stream.
///
/// The parser discards its in-flight tree after any of these, so the
/// next fed bytes must start a new document.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ParseError {
    #[error("not enough memory")]
    NoMemory,

    /// Low level syntax error reported by the tokenizer.
    #[error("invalid XML syntax at {location}: {description}")]
    Syntax {
        description: &'static str,
        location: Location,
    },

    /// A second top-level element was opened.
    #[error("multiple root elements, <{second}> after <{first}>")]
    MultipleRoots { first: String, second: String },

    #[error("mismatched tags, <{open}> closed with </{close}>")]
    TagMismatch { open: String, close: String },

    #[error("namespace prefix '{0}' is not declared")]
    UnboundPrefix(String),

    #[error("attribute '{0}' is repeated")]
    DuplicateAttribute(String),

    /// Input ended before the root element was closed.
    #[error("document is not complete")]
    Truncated,
}

pub(super) mod description {
    pub(in super::super) const HANDLER_ABORT: &str = "tree builder stopped without an error";
}
