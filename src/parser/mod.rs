/*
** This file is a part of Ikstream (streaming XMPP client for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Ikstream is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod error;
mod location;

pub use error::SaxError;
use error::description;
pub use location::Location;

/// An XML construct returned from the parser.
#[derive(Debug, Eq, PartialEq)]
pub enum SaxElement<'a> {
    /// A start tag or empty element tag.
    ///
    /// The argument is the full name of the tag including any prefix. This element is
    /// sent to the handler as soon as the name is parsed, before the attributes.
    StartTag(&'a str),

    /// A tag attribute for the last StartTag.
    ///
    /// First argument is the attribute name and the second argument is the attribute value.
    /// All references in the attribute value are replaced with the actual characters.
    Attribute(&'a str, &'a str),

    /// The last StartTag is closed with '>' and its content follows.
    StartTagContent,

    /// The last StartTag was an empty element tag and will have no content.
    ///
    /// No EndTag is sent for empty element tags.
    StartTagEmpty,

    /// An end tag element.
    ///
    /// The argument is the full name of the end tag.
    EndTag(&'a str),

    /// A character data element.
    ///
    /// You might get this element several times with different parts of the content for
    /// a single continuous block of text. Parts are split at chunk boundaries and at
    /// references, but never inside a multi-byte character.
    CData(&'a str),
}

pub trait SaxHandler {
    fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError>;
}

/// SAX (Simple API for XML) based push parser.
///
/// This struct processes the incoming bytes as they arrive and invokes a
/// handler function for each encountered XML construct. All the state
/// needed to continue a construct split over multiple
/// [parse_bytes()](SaxParser::parse_bytes) calls is kept inside the
/// parser, so the input can be fed in chunks of any size.
///
/// # Examples
///
/// ```
/// use ikstream::{SaxElement, SaxError, SaxHandler, SaxParser};
///
/// struct Counter {
///     tags: usize,
/// }
///
/// impl SaxHandler for Counter {
///     fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError> {
///         if let SaxElement::StartTag(_) = element {
///             self.tags += 1;
///         }
///         Ok(())
///     }
/// }
///
/// let mut counter = Counter { tags: 0 };
/// let mut parser = SaxParser::new();
/// parser.parse_bytes(&mut counter, b"<doc><a/>").unwrap();
/// parser.parse_bytes(&mut counter, b"<b>text</b></doc>").unwrap();
/// parser.parse_finish().unwrap();
/// assert_eq!(counter.tags, 3);
/// ```
pub struct SaxParser {
    state: State,
    utf8: Utf8Sequence,
    depth: usize,
    is_end_tag: bool,
    seen_root: bool,
    quote: u8,
    value_pos: usize,
    buffer: Vec<u8>,
    ref_buffer: Vec<u8>,
    char_ref: u32,
    ref_in_value: bool,
    text_tail: Vec<u8>,
    location: Location,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Prolog,
    TagStart,
    ProcessingInstruction,
    ProcessingInstructionEnd,
    Markup,
    CDataSectionKeyword(usize),
    CDataSectionBody,
    CDataSectionBracket,
    CDataSectionBracket2,
    CommentStart,
    CommentBody,
    CommentDash,
    CommentEnd,
    TagName,
    EndTagWhitespace,
    EmptyTagEnd,
    AttributeWhitespace,
    AttributeName,
    AttributeEq,
    AttributeValueStart,
    AttributeValue,
    AttributeValueEnd,
    CData,
    Reference,
    EntityName,
    CharReference,
    DecimalReference,
    HexReference,
    Epilog,
}

/// Decoder state of the multi-byte UTF-8 sequence being parsed.
#[derive(Clone, Copy, Default)]
struct Utf8Sequence {
    len: u32,
    left: u32,
    value: u32,
}

const INITIAL_BUFFER_CAPACITY: usize = 128;

const REF_BUFFER_SIZE: usize = 8;

const CDATA_KEYWORD: &[u8] = b"CDATA[";

macro_rules! whitespace {
    () => {
        b' ' | b'\t' | b'\r' | b'\n'
    };
}

macro_rules! xml_error {
    ($a:ident) => {
        return Err(SaxError::BadXml(description::$a))
    };
}

fn is_valid_xml_char(c: u32) -> bool {
    matches!(
        c,
        0x09 | 0x0a | 0x0d | 0x20..=0xd7ff | 0xe000..=0xfffd | 0x10000..=0x10ffff
    )
}

fn as_str(bytes: &[u8]) -> Result<&str, SaxError> {
    std::str::from_utf8(bytes).map_err(|_| SaxError::BadXml(description::UTF8_INCOMPLETE))
}

impl Utf8Sequence {
    /// Number of bytes consumed so far from an unfinished sequence.
    fn pending(&self) -> usize {
        if self.left > 0 {
            (self.len - self.left) as usize
        } else {
            0
        }
    }

    fn decode(&mut self, c: u8) -> Result<(), SaxError> {
        if self.left > 0 {
            if c & 0xc0 != 0x80 {
                xml_error!(UTF8_INVALID_CONT_BYTE);
            }
            self.value = (self.value << 6) | (c as u32 & 0x3f);
            self.left -= 1;
            if self.left == 0 {
                // Sequences longer than the actual character codepoint
                // size are security hazards.
                let overlong = match self.len {
                    2 => self.value <= 0x7f,
                    3 => self.value <= 0x7ff,
                    _ => self.value <= 0xffff,
                };
                if overlong {
                    xml_error!(UTF8_OVERLONG_SEQUENCE);
                }
                if !is_valid_xml_char(self.value) {
                    xml_error!(CHAR_INVALID);
                }
            }
        } else if c & 0x80 == 0x80 {
            let (len, value) = if c & 0xe0 == 0xc0 {
                (2, c & 0x1f)
            } else if c & 0xf0 == 0xe0 {
                (3, c & 0x0f)
            } else if c & 0xf8 == 0xf0 {
                (4, c & 0x07)
            } else {
                xml_error!(UTF8_INVALID_PREFIX_BYTE);
            };
            self.len = len;
            self.left = len - 1;
            self.value = value as u32;
        } else if !is_valid_xml_char(c as u32) {
            xml_error!(CHAR_INVALID);
        }
        Ok(())
    }
}

impl SaxParser {
    /// Creates a new SAX parser instance.
    ///
    /// The instance can be reused for multiple documents with the [reset()](SaxParser::reset) method.
    pub fn new() -> SaxParser {
        SaxParser {
            state: State::Prolog,
            utf8: Utf8Sequence::default(),
            depth: 0,
            is_end_tag: false,
            seen_root: false,
            quote: b'"',
            value_pos: 0,
            buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
            ref_buffer: Vec::with_capacity(REF_BUFFER_SIZE),
            char_ref: 0,
            ref_in_value: false,
            text_tail: Vec::new(),
            location: Location::new(),
        }
    }

    /// Resets the parser into a clean state.
    ///
    /// Allocated buffers are kept for reuse.
    pub fn reset(&mut self) {
        self.state = State::Prolog;
        self.utf8 = Utf8Sequence::default();
        self.depth = 0;
        self.is_end_tag = false;
        self.seen_root = false;
        self.quote = b'"';
        self.value_pos = 0;
        self.buffer.clear();
        self.ref_buffer.clear();
        self.char_ref = 0;
        self.ref_in_value = false;
        self.text_tail.clear();
        self.location = Location::new();
    }

    /// Current nesting depth of open tags.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Position of the last parsed byte.
    pub fn location(&self) -> Location {
        self.location
    }

    /// Checks if the document is complete.
    ///
    /// A completed document should have a root tag and should not have any
    /// unfinished XML constructs, such as open tags, comments and markup.
    pub fn parse_finish(&mut self) -> Result<(), SaxError> {
        if !self.seen_root {
            xml_error!(DOC_NO_CONTENT);
        }
        if self.depth > 0 {
            xml_error!(DOC_OPEN_TAGS);
        }
        if self.state != State::Epilog {
            xml_error!(DOC_OPEN_MARKUP);
        }
        if self.utf8.left > 0 {
            xml_error!(UTF8_INCOMPLETE);
        }
        Ok(())
    }

    /// Parses given XML bytes and checks if the document is complete.
    ///
    /// This is a convenience function which calls [parse_bytes()](SaxParser::parse_bytes)
    /// and [parse_finish()](SaxParser::parse_finish) methods for you.
    pub fn parse_bytes_finish(
        &mut self,
        handler: &mut impl SaxHandler,
        bytes: &[u8],
    ) -> Result<(), SaxError> {
        self.parse_bytes(handler, bytes)?;
        self.parse_finish()
    }

    fn push_buffer(&mut self, bytes: &[u8]) -> Result<(), SaxError> {
        if bytes.is_empty() {
            return Ok(());
        }
        if self.buffer.try_reserve(bytes.len()).is_err() {
            return Err(SaxError::NoMemory);
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    fn after_markup(&self) -> State {
        if self.depth > 0 {
            State::CData
        } else if self.seen_root {
            State::Epilog
        } else {
            State::Prolog
        }
    }

    fn after_reference(&self) -> State {
        if self.ref_in_value {
            State::AttributeValue
        } else {
            State::CData
        }
    }

    fn leave_tag(&mut self) -> Result<State, SaxError> {
        if self.depth == 0 {
            xml_error!(TAG_CLOSE_WITHOUT_OPEN);
        }
        self.depth -= 1;
        if self.depth == 0 {
            Ok(State::Epilog)
        } else {
            Ok(State::CData)
        }
    }

    fn finish_tag_name(&mut self, handler: &mut impl SaxHandler, c: u8) -> Result<(), SaxError> {
        if self.buffer.is_empty() {
            xml_error!(TAG_EMPTY_NAME);
        }
        if self.is_end_tag {
            if c == b'/' {
                xml_error!(TAG_DOUBLE_END);
            }
            handler.handle_element(&SaxElement::EndTag(as_str(&self.buffer)?))?;
        } else {
            // The handler sees the second root's name before the error, so
            // it can report both names.
            handler.handle_element(&SaxElement::StartTag(as_str(&self.buffer)?))?;
            if self.depth == 1 {
                if self.seen_root {
                    xml_error!(TAG_OUTSIDE_ROOT);
                }
                self.seen_root = true;
            }
        }
        self.buffer.clear();
        Ok(())
    }

    fn finish_attribute(&mut self, handler: &mut impl SaxHandler) -> Result<(), SaxError> {
        let (name, value) = self.buffer.split_at(self.value_pos);
        handler.handle_element(&SaxElement::Attribute(as_str(name)?, as_str(value)?))?;
        self.buffer.clear();
        Ok(())
    }

    fn send_reference_text(
        &mut self,
        handler: &mut impl SaxHandler,
        text: &str,
    ) -> Result<(), SaxError> {
        if self.ref_in_value {
            self.push_buffer(text.as_bytes())
        } else {
            handler.handle_element(&SaxElement::CData(text))
        }
    }

    fn send_char_reference(&mut self, handler: &mut impl SaxHandler) -> Result<(), SaxError> {
        if !is_valid_xml_char(self.char_ref) {
            xml_error!(CHAR_INVALID);
        }
        let Some(c) = char::from_u32(self.char_ref) else {
            xml_error!(CHAR_INVALID);
        };
        let mut buf = [0u8; 4];
        let text = c.encode_utf8(&mut buf);
        self.send_reference_text(handler, text)
    }

    /// Parses given XML bytes.
    ///
    /// The handler is invoked for every construct completed within these bytes.
    /// Any error leaves the parser in an undefined state; call
    /// [reset()](SaxParser::reset) before reusing it.
    pub fn parse_bytes(
        &mut self,
        handler: &mut impl SaxHandler,
        bytes: &[u8],
    ) -> Result<(), SaxError> {
        let mut pos: usize = 0;
        let mut back: usize = 0;

        while pos < bytes.len() {
            let c = bytes[pos];
            self.utf8.decode(c)?;

            if !self.text_tail.is_empty() {
                // Rest of a character split at the previous chunk boundary.
                if self.utf8.left == 0 {
                    self.text_tail.extend_from_slice(&bytes[back..=pos]);
                    handler.handle_element(&SaxElement::CData(as_str(&self.text_tail)?))?;
                    self.text_tail.clear();
                    back = pos + 1;
                }
                self.location.advance(c);
                pos += 1;
                continue;
            }

            match self.state {
                State::Prolog => match c {
                    b'<' => self.state = State::TagStart,
                    whitespace!() => (),
                    _ => xml_error!(DOC_CDATA_WITHOUT_PARENT),
                },

                State::TagStart => match c {
                    b'!' => self.state = State::Markup,
                    b'?' => self.state = State::ProcessingInstruction,
                    b'/' => {
                        if self.depth == 0 {
                            xml_error!(TAG_CLOSE_WITHOUT_OPEN);
                        }
                        back = pos + 1;
                        self.is_end_tag = true;
                        self.state = State::TagName;
                    }
                    whitespace!() => xml_error!(TAG_WHITESPACE_START),
                    b'>' => xml_error!(TAG_EMPTY_NAME),
                    _ => {
                        self.depth += 1;
                        back = pos;
                        self.is_end_tag = false;
                        self.state = State::TagName;
                    }
                },

                State::Markup => match c {
                    b'-' => self.state = State::CommentStart,
                    b'[' => {
                        if self.depth == 0 {
                            xml_error!(MARKUP_CDATA_SECTION_OUTSIDE_ROOT);
                        }
                        self.state = State::CDataSectionKeyword(0);
                    }
                    b'D' => xml_error!(MARKUP_DOCTYPE_NOT_ALLOWED),
                    _ => xml_error!(MARKUP_UNRECOGNIZED),
                },

                State::CDataSectionKeyword(index) => {
                    if c != CDATA_KEYWORD[index] {
                        xml_error!(MARKUP_CDATA_SECTION_BAD_START);
                    }
                    if index + 1 == CDATA_KEYWORD.len() {
                        back = pos + 1;
                        self.state = State::CDataSectionBody;
                    } else {
                        self.state = State::CDataSectionKeyword(index + 1);
                    }
                }

                State::CDataSectionBody => {
                    if c == b']' {
                        if back < pos {
                            handler.handle_element(&SaxElement::CData(as_str(&bytes[back..pos])?))?;
                        }
                        self.state = State::CDataSectionBracket;
                    }
                }

                State::CDataSectionBracket => match c {
                    b']' => self.state = State::CDataSectionBracket2,
                    _ => {
                        handler.handle_element(&SaxElement::CData("]"))?;
                        back = pos;
                        self.state = State::CDataSectionBody;
                    }
                },

                State::CDataSectionBracket2 => match c {
                    b'>' => {
                        back = pos + 1;
                        self.state = State::CData;
                    }
                    b']' => handler.handle_element(&SaxElement::CData("]"))?,
                    _ => {
                        handler.handle_element(&SaxElement::CData("]]"))?;
                        back = pos;
                        self.state = State::CDataSectionBody;
                    }
                },

                State::CommentStart => {
                    if c != b'-' {
                        xml_error!(COMMENT_MISSING_DASH);
                    }
                    self.state = State::CommentBody;
                }

                State::CommentBody => {
                    if c == b'-' {
                        self.state = State::CommentDash;
                    }
                }

                State::CommentDash => match c {
                    b'-' => self.state = State::CommentEnd,
                    _ => self.state = State::CommentBody,
                },

                State::CommentEnd => {
                    if c != b'>' {
                        xml_error!(COMMENT_MISSING_END);
                    }
                    back = pos + 1;
                    self.state = self.after_markup();
                }

                State::ProcessingInstruction => {
                    if c == b'?' {
                        self.state = State::ProcessingInstructionEnd;
                    }
                }

                State::ProcessingInstructionEnd => match c {
                    b'>' => {
                        back = pos + 1;
                        self.state = self.after_markup();
                    }
                    b'?' => (),
                    _ => self.state = State::ProcessingInstruction,
                },

                State::TagName => match c {
                    b'/' | b'>' | whitespace!() => {
                        self.push_buffer(&bytes[back..pos])?;
                        self.finish_tag_name(handler, c)?;
                        match c {
                            b'/' => self.state = State::EmptyTagEnd,
                            b'>' => {
                                if self.is_end_tag {
                                    self.state = self.leave_tag()?;
                                } else {
                                    handler.handle_element(&SaxElement::StartTagContent)?;
                                    self.state = State::CData;
                                }
                                back = pos + 1;
                            }
                            _ => {
                                self.state = if self.is_end_tag {
                                    State::EndTagWhitespace
                                } else {
                                    State::AttributeWhitespace
                                };
                            }
                        }
                    }
                    _ => (),
                },

                State::EmptyTagEnd => match c {
                    b'>' => {
                        handler.handle_element(&SaxElement::StartTagEmpty)?;
                        self.state = self.leave_tag()?;
                        back = pos + 1;
                    }
                    _ => xml_error!(TAG_EMPTY_TAG_MISSING_END),
                },

                State::EndTagWhitespace => match c {
                    b'>' => {
                        self.state = self.leave_tag()?;
                        back = pos + 1;
                    }
                    whitespace!() => (),
                    _ => xml_error!(TAG_END_TAG_ATTRIBUTES),
                },

                State::AttributeWhitespace => match c {
                    whitespace!() => (),
                    b'/' => self.state = State::EmptyTagEnd,
                    b'>' => {
                        handler.handle_element(&SaxElement::StartTagContent)?;
                        back = pos + 1;
                        self.state = State::CData;
                    }
                    b'=' | b'<' => xml_error!(TAG_ATTRIBUTE_BAD_NAME),
                    _ => {
                        back = pos;
                        self.state = State::AttributeName;
                    }
                },

                State::AttributeName => match c {
                    b'=' | whitespace!() => {
                        self.push_buffer(&bytes[back..pos])?;
                        if c == b'=' {
                            self.state = State::AttributeValueStart;
                        } else {
                            self.state = State::AttributeEq;
                        }
                    }
                    b'/' | b'>' | b'<' => xml_error!(TAG_ATTRIBUTE_BAD_NAME),
                    _ => (),
                },

                State::AttributeEq => match c {
                    b'=' => self.state = State::AttributeValueStart,
                    whitespace!() => (),
                    _ => xml_error!(TAG_ATTRIBUTE_WITHOUT_EQUAL),
                },

                State::AttributeValueStart => match c {
                    b'"' | b'\'' => {
                        self.quote = c;
                        self.value_pos = self.buffer.len();
                        back = pos + 1;
                        self.state = State::AttributeValue;
                    }
                    whitespace!() => (),
                    _ => xml_error!(TAG_ATTRIBUTE_WITHOUT_QUOTE),
                },

                State::AttributeValue => {
                    if c == self.quote {
                        self.push_buffer(&bytes[back..pos])?;
                        self.finish_attribute(handler)?;
                        self.state = State::AttributeValueEnd;
                    } else if c == b'&' {
                        self.push_buffer(&bytes[back..pos])?;
                        self.ref_buffer.clear();
                        self.ref_in_value = true;
                        self.state = State::Reference;
                    } else if c == b'<' {
                        xml_error!(TAG_ATTRIBUTE_BAD_VALUE);
                    }
                }

                State::AttributeValueEnd => match c {
                    whitespace!() => self.state = State::AttributeWhitespace,
                    b'/' => self.state = State::EmptyTagEnd,
                    b'>' => {
                        handler.handle_element(&SaxElement::StartTagContent)?;
                        back = pos + 1;
                        self.state = State::CData;
                    }
                    _ => xml_error!(TAG_ATTRIBUTE_MISSING_SPACE),
                },

                State::CData => match c {
                    b'<' | b'&' => {
                        if back < pos {
                            handler.handle_element(&SaxElement::CData(as_str(&bytes[back..pos])?))?;
                        }
                        if c == b'<' {
                            back = pos + 1;
                            self.state = State::TagStart;
                        } else {
                            self.ref_buffer.clear();
                            self.ref_in_value = false;
                            self.state = State::Reference;
                        }
                    }
                    _ => (),
                },

                State::Reference => match c {
                    b'#' => self.state = State::CharReference,
                    b';' => xml_error!(REFERENCE_CUSTOM_ENTITY),
                    _ => {
                        self.ref_buffer.push(c);
                        self.state = State::EntityName;
                    }
                },

                State::EntityName => match c {
                    b';' => {
                        let text = match self.ref_buffer.as_slice() {
                            b"amp" => "&",
                            b"lt" => "<",
                            b"gt" => ">",
                            b"quot" => "\"",
                            b"apos" => "'",
                            _ => xml_error!(REFERENCE_CUSTOM_ENTITY),
                        };
                        self.send_reference_text(handler, text)?;
                        back = pos + 1;
                        self.state = self.after_reference();
                    }
                    _ => {
                        if self.ref_buffer.len() >= REF_BUFFER_SIZE {
                            xml_error!(REFERENCE_CUSTOM_ENTITY);
                        }
                        self.ref_buffer.push(c);
                    }
                },

                State::CharReference => match c {
                    b'x' => {
                        self.char_ref = 0;
                        self.state = State::HexReference;
                    }
                    b'0'..=b'9' => {
                        self.char_ref = (c - b'0') as u32;
                        self.state = State::DecimalReference;
                    }
                    _ => xml_error!(REFERENCE_INVALID_DECIMAL),
                },

                State::DecimalReference => match c {
                    b';' => {
                        self.send_char_reference(handler)?;
                        back = pos + 1;
                        self.state = self.after_reference();
                    }
                    b'0'..=b'9' => {
                        // Saturated values are rejected as invalid characters.
                        self.char_ref = self
                            .char_ref
                            .saturating_mul(10)
                            .saturating_add((c - b'0') as u32);
                    }
                    _ => xml_error!(REFERENCE_INVALID_DECIMAL),
                },

                State::HexReference => match c {
                    b';' => {
                        self.send_char_reference(handler)?;
                        back = pos + 1;
                        self.state = self.after_reference();
                    }
                    _ => {
                        let Some(digit) = (c as char).to_digit(16) else {
                            xml_error!(REFERENCE_INVALID_HEX);
                        };
                        self.char_ref = self.char_ref.saturating_mul(16).saturating_add(digit);
                    }
                },

                State::Epilog => match c {
                    b'<' => self.state = State::TagStart,
                    whitespace!() => (),
                    _ => xml_error!(DOC_CDATA_WITHOUT_PARENT),
                },
            }

            self.location.advance(c);
            pos += 1;
        }

        if back < pos {
            match self.state {
                State::TagName | State::AttributeName | State::AttributeValue => {
                    self.push_buffer(&bytes[back..pos])?;
                }
                State::CData | State::CDataSectionBody => {
                    // Keep an unfinished character for the next chunk.
                    let split = pos.saturating_sub(self.utf8.pending()).max(back);
                    if back < split {
                        handler.handle_element(&SaxElement::CData(as_str(&bytes[back..split])?))?;
                    }
                    self.text_tail.extend_from_slice(&bytes[split..pos]);
                }
                _ => (),
            }
        }

        Ok(())
    }
}

impl Default for SaxParser {
    fn default() -> Self {
        Self::new()
    }
}
