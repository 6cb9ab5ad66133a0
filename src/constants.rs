/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

pub const CLIENT_PORT: u16 = 5222;

pub const STREAM_NS: &str = "http://etherx.jabber.org/streams";

pub const SASL_NS: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

pub const CLIENT_NS: &str = "jabber:client";

/// Bound to the `xml` prefix in every document.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

pub const STREAM_PREFIX: &str = "stream";

pub const STREAM_VERSION: &str = "1.0";

pub const XML_DECLARATION: &str = "<?xml version='1.0'?>";

pub const STREAM_CLOSE: &str = "</stream:stream>";

pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

pub mod names {
    pub const STREAM: &str = "stream";
    pub const FEATURES: &str = "features";
    pub const MECHANISMS: &str = "mechanisms";
    pub const MECHANISM: &str = "mechanism";
    pub const AUTH: &str = "auth";
    pub const SUCCESS: &str = "success";
    pub const FAILURE: &str = "failure";
    pub const TEXT: &str = "text";
}

pub mod attributes {
    pub const ID: &str = "id";
    pub const TO: &str = "to";
    pub const FROM: &str = "from";
    pub const VERSION: &str = "version";
    pub const MECHANISM: &str = "mechanism";
}
