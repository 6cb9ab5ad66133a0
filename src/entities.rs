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

pub mod predefined {
    pub const LT: &str = "&lt;";
    pub const GT: &str = "&gt;";
    pub const AMP: &str = "&amp;";
    pub const APOS: &str = "&apos;";
    pub const QUOT: &str = "&quot;";
}

fn replacement(c: char) -> Option<&'static str> {
    match c {
        '<' => Some(predefined::LT),
        '>' => Some(predefined::GT),
        '&' => Some(predefined::AMP),
        '\'' => Some(predefined::APOS),
        '"' => Some(predefined::QUOT),
        _ => None,
    }
}

/// Writes the text with the XML special characters replaced by references.
pub fn escape_fmt(s: &str, out: &mut impl Write) -> std::fmt::Result {
    let mut back = 0;
    for (pos, c) in s.char_indices() {
        if let Some(entity) = replacement(c) {
            out.write_str(&s[back..pos])?;
            out.write_str(entity)?;
            back = pos + c.len_utf8();
        }
    }
    out.write_str(&s[back..])
}
