// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! XML utilities for WebDAV/CalDAV processing.

use std::io::{BufRead, Cursor};

use quick_xml::events::{BytesEnd, BytesRef, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::CalDavError;

/// XML namespaces used in `CalDAV`.
pub mod ns {
    /// `WebDAV` namespace.
    pub const DAV: &str = "DAV:";

    /// `CalDAV` namespace.
    pub const CALDAV: &str = "urn:ietf:params:xml:ns:caldav";

    /// Apple iCal namespace, home of `calendar-color`.
    pub const APPLE_ICAL: &str = "http://apple.com/ns/ical/";

    /// Calendar server namespace, home of `getctag`.
    pub const CALENDAR_SERVER: &str = "http://calendarserver.org/ns/";
}

/// Thin wrapper over an indenting [`Writer`] for building request bodies.
pub struct XmlBuilder {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl std::fmt::Debug for XmlBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlBuilder").finish_non_exhaustive()
    }
}

impl XmlBuilder {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        }
    }

    /// Writes `<name attr="...">`.
    ///
    /// # Errors
    ///
    /// Returns an error if XML writing fails.
    pub fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), CalDavError> {
        let mut elem = BytesStart::new(name);
        for attr in attrs {
            elem.push_attribute(*attr);
        }
        self.writer.write_event(Event::Start(elem))?;
        Ok(())
    }

    /// Writes `</name>`.
    ///
    /// # Errors
    ///
    /// Returns an error if XML writing fails.
    pub fn end(&mut self, name: &str) -> Result<(), CalDavError> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    /// Writes `<name attr="..."/>`.
    ///
    /// # Errors
    ///
    /// Returns an error if XML writing fails.
    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), CalDavError> {
        let mut elem = BytesStart::new(name);
        for attr in attrs {
            elem.push_attribute(*attr);
        }
        self.writer.write_event(Event::Empty(elem))?;
        Ok(())
    }

    /// Writes `<name>text</name>`, escaping the text.
    ///
    /// # Errors
    ///
    /// Returns an error if XML writing fails.
    pub fn text_element(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> Result<(), CalDavError> {
        self.start(name, attrs)?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    /// Returns the document as a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the output is not valid UTF-8.
    pub fn finish(self) -> Result<String, CalDavError> {
        let bytes = self.writer.into_inner().into_inner();
        String::from_utf8(bytes).map_err(|e| CalDavError::Xml(format!("UTF-8 error: {e}")))
    }
}

impl Default for XmlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Local name of an element, without its namespace prefix.
pub fn local_name(elem: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(elem.name().local_name().into_inner()).into_owned()
}

/// Reads the text content of the element whose start tag was just consumed.
///
/// Text of nested elements is concatenated; `CDATA` sections and entity
/// references are resolved.
///
/// # Errors
///
/// Returns an error if XML parsing fails or the document ends early.
pub fn read_element_text<R: BufRead>(reader: &mut Reader<R>) -> Result<String, CalDavError> {
    let mut text = String::new();
    let mut depth = 1;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Text(e) => {
                let unescaped = e.decode().map_err(quick_xml::Error::from)?;
                text.push_str(unescaped.as_ref());
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                text.push_str(&String::from_utf8_lossy(&raw));
            }
            Event::GeneralRef(e) => push_entity(&mut text, &e)?,
            Event::Eof => return Err(CalDavError::Xml("Unexpected EOF".to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

fn push_entity(text: &mut String, entity: &BytesRef<'_>) -> Result<(), CalDavError> {
    if let Some(ch) = entity.resolve_char_ref()? {
        text.push(ch);
        return Ok(());
    }
    let name = entity
        .decode()
        .map_err(|e| CalDavError::Xml(format!("Invalid entity: {e}")))?;
    match name.as_ref() {
        "amp" => text.push('&'),
        "lt" => text.push('<'),
        "gt" => text.push('>'),
        "quot" => text.push('"'),
        "apos" => text.push('\''),
        other => return Err(CalDavError::Xml(format!("Unknown entity: &{other};"))),
    }
    Ok(())
}

/// Reads the text content of the element whose start tag was just consumed,
/// with surrounding whitespace removed.
///
/// # Errors
///
/// See [`read_element_text`].
pub fn read_trimmed_text<R: BufRead>(reader: &mut Reader<R>) -> Result<String, CalDavError> {
    let text = read_element_text(reader)?;
    Ok(text.trim().to_string())
}

/// Skips the content of `elem`, whose start tag was just consumed.
///
/// # Errors
///
/// Returns an error if XML parsing fails or the document ends early.
pub fn skip_element<R: BufRead>(
    reader: &mut Reader<R>,
    elem: &BytesStart<'_>,
) -> Result<(), CalDavError> {
    let mut buf = Vec::new();
    reader.read_to_end_into(elem.name(), &mut buf)?;
    Ok(())
}

/// Walks the children of the element whose start tag was just consumed,
/// calling `visit` for every descendant start or empty tag.
///
/// `visit` receives the tag and the reader, and returns whether it consumed
/// the element's content itself (e.g. by calling [`read_element_text`]).
///
/// # Errors
///
/// Returns an error if XML parsing fails, the document ends early, or
/// `visit` fails.
pub fn walk_children<R, F>(reader: &mut Reader<R>, mut visit: F) -> Result<(), CalDavError>
where
    R: BufRead,
    F: FnMut(&BytesStart<'_>, bool, &mut Reader<R>) -> Result<bool, CalDavError>,
{
    let mut depth = 1;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let elem = e.into_owned();
                if !visit(&elem, false, reader)? {
                    depth += 1;
                }
            }
            Event::Empty(e) => {
                let elem = e.into_owned();
                visit(&elem, true, reader)?;
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => return Err(CalDavError::Xml("Unexpected EOF".to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_builder_escapes_text() {
        let mut xml = XmlBuilder::new();
        xml.text_element("D:href", &[], "/cal/a&b.ics").unwrap();
        let out = xml.finish().unwrap();
        assert!(out.contains("<D:href>/cal/a&amp;b.ics</D:href>"));
    }

    #[test]
    fn xml_read_element_text_resolves_entities_and_cdata() {
        let mut reader =
            Reader::from_str("<a>R&amp;D <![CDATA[<raw>]]> &#65;<b>x</b></a><next/>");
        let mut buf = Vec::new();
        let first = reader.read_event_into(&mut buf).unwrap();
        assert!(matches!(first, Event::Start(_)));
        drop(first);

        let text = read_element_text(&mut reader).unwrap();
        assert_eq!(text, "R&D <raw> Ax");
    }

    #[test]
    fn xml_walk_children_visits_empty_and_nested() {
        let mut reader = Reader::from_str(
            "<resourcetype><collection/><C:calendar></C:calendar></resourcetype>",
        );
        let mut buf = Vec::new();
        reader.read_event_into(&mut buf).unwrap();

        let mut names = Vec::new();
        walk_children(&mut reader, |elem, _, _| {
            names.push(local_name(elem));
            Ok(false)
        })
        .unwrap();
        assert_eq!(names, vec!["collection", "calendar"]);
    }
}
