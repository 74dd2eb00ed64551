// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Response parsers for WebDAV/CalDAV operations.

use std::io::BufRead;

use jiff::Timestamp;
use jiff::fmt::rfc2822::DateTimeParser;
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::CalDavError;
use crate::types::{CalendarCollection, CalendarObject, ETag, Href};
use crate::xml::{local_name, read_element_text, read_trimmed_text, skip_element, walk_children};

static HTTP_DATE: DateTimeParser = DateTimeParser::new();

/// `WebDAV` multistatus response.
#[derive(Debug, Clone, Default)]
pub struct MultiStatusResponse {
    /// The response items.
    pub responses: Vec<ResponseItem>,
    /// Top-level sync token of a sync-collection report.
    pub sync_token: Option<String>,
}

/// Individual response in multistatus.
#[derive(Debug, Clone, Default)]
pub struct ResponseItem {
    /// Path of the resource.
    pub href: Href,
    /// Response-level status line, set for members without properties.
    pub status: Option<String>,
    /// Property groups with their status.
    pub prop_stats: Vec<PropStat>,
}

/// Property stat with status and value.
#[derive(Debug, Clone, Default)]
pub struct PropStat {
    /// Properties sharing `status`.
    pub props: Properties,
    /// Status line, e.g. `HTTP/1.1 200 OK`.
    pub status: String,
}

/// WebDAV/CalDAV properties.
///
/// Dates and numbers are kept as sent and validated when converted.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    /// `DAV:displayname`.
    pub display_name: Option<String>,
    /// Local names inside `DAV:resourcetype`.
    pub resource_type: Option<Vec<String>>,
    /// `DAV:getetag`.
    pub get_etag: Option<ETag>,
    /// `DAV:getlastmodified`, an HTTP date.
    pub get_last_modified: Option<String>,
    /// `DAV:getcontentlength`.
    pub get_content_length: Option<String>,
    /// `DAV:getcontenttype`.
    pub get_content_type: Option<String>,
    /// `C:calendar-data`.
    pub calendar_data: Option<String>,
    /// `C:calendar-home-set`.
    pub calendar_home_set: Option<Href>,
    /// `DAV:current-user-principal`.
    pub current_user_principal: Option<Href>,
    /// Whether `DAV:current-user-principal` was `unauthenticated`.
    pub unauthenticated: bool,
    /// `C:supported-calendar-component-set`.
    pub supported_calendar_components: Option<Vec<String>>,
    /// `C:calendar-description`.
    pub calendar_description: Option<String>,
    /// `C:calendar-timezone`.
    pub calendar_timezone: Option<String>,
    /// Apple `calendar-color`.
    pub calendar_color: Option<String>,
    /// `C:max-resource-size`.
    pub max_resource_size: Option<String>,
    /// `DAV:sync-token`.
    pub sync_token: Option<String>,
    /// Privilege names inside `DAV:current-user-privilege-set`.
    pub current_user_privileges: Option<Vec<String>>,
    /// Calendar server `getctag`.
    pub ctag: Option<ETag>,
}

impl Properties {
    /// Fills properties missing here from `other`.
    fn merge(&mut self, other: Self) {
        self.display_name = self.display_name.take().or(other.display_name);
        self.resource_type = self.resource_type.take().or(other.resource_type);
        self.get_etag = self.get_etag.take().or(other.get_etag);
        self.get_last_modified = self.get_last_modified.take().or(other.get_last_modified);
        self.get_content_length = self.get_content_length.take().or(other.get_content_length);
        self.get_content_type = self.get_content_type.take().or(other.get_content_type);
        self.calendar_data = self.calendar_data.take().or(other.calendar_data);
        self.calendar_home_set = self.calendar_home_set.take().or(other.calendar_home_set);
        self.current_user_principal = self
            .current_user_principal
            .take()
            .or(other.current_user_principal);
        self.unauthenticated |= other.unauthenticated;
        self.supported_calendar_components = self
            .supported_calendar_components
            .take()
            .or(other.supported_calendar_components);
        self.calendar_description = self
            .calendar_description
            .take()
            .or(other.calendar_description);
        self.calendar_timezone = self.calendar_timezone.take().or(other.calendar_timezone);
        self.calendar_color = self.calendar_color.take().or(other.calendar_color);
        self.max_resource_size = self.max_resource_size.take().or(other.max_resource_size);
        self.sync_token = self.sync_token.take().or(other.sync_token);
        self.current_user_privileges = self
            .current_user_privileges
            .take()
            .or(other.current_user_privileges);
        self.ctag = self.ctag.take().or(other.ctag);
    }
}

/// Extracts the numeric code from a status line such as `HTTP/1.1 404 Not Found`.
fn status_code(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1)?.parse().ok()
}

impl PropStat {
    /// Whether the properties in this group were returned successfully.
    ///
    /// A missing status line is treated as success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.trim().is_empty()
            || status_code(&self.status).is_some_and(|code| (200..300).contains(&code))
    }
}

impl MultiStatusResponse {
    /// Parses multistatus response from XML.
    ///
    /// # Errors
    ///
    /// Returns an error if XML parsing fails or the document is not a
    /// multistatus.
    pub fn from_xml(xml: &str) -> Result<Self, CalDavError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().check_end_names = true;

        let mut multistatus = Self::default();
        let mut seen_root = false;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => match local_name(&e).as_str() {
                    "multistatus" => seen_root = true,
                    "response" if seen_root => {
                        multistatus.responses.push(parse_response(&mut reader)?);
                    }
                    "sync-token" if seen_root => {
                        multistatus.sync_token = Some(read_trimmed_text(&mut reader)?);
                    }
                    _ => {}
                },
                Event::Empty(e) if local_name(&e) == "multistatus" => seen_root = true,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !seen_root {
            return Err(CalDavError::InvalidResponse(
                "expected a DAV:multistatus document".to_string(),
            ));
        }
        Ok(multistatus)
    }
}

fn parse_response<R: BufRead>(reader: &mut Reader<R>) -> Result<ResponseItem, CalDavError> {
    let mut item = ResponseItem::default();
    walk_children(reader, |elem, is_empty, reader| {
        if is_empty {
            return Ok(false);
        }
        match local_name(elem).as_str() {
            "href" => {
                let href = read_trimmed_text(reader)?;
                if item.href.is_empty() {
                    item.href = Href::from_server(&href);
                }
            }
            "status" => item.status = Some(read_trimmed_text(reader)?),
            "propstat" => item.prop_stats.push(parse_propstat(reader)?),
            _ => skip_element(reader, elem)?,
        }
        Ok(true)
    })?;
    Ok(item)
}

fn parse_propstat<R: BufRead>(reader: &mut Reader<R>) -> Result<PropStat, CalDavError> {
    let mut prop_stat = PropStat::default();
    walk_children(reader, |elem, is_empty, reader| {
        if is_empty {
            return Ok(false);
        }
        match local_name(elem).as_str() {
            "prop" => prop_stat.props = parse_prop(reader)?,
            "status" => prop_stat.status = read_trimmed_text(reader)?,
            _ => skip_element(reader, elem)?,
        }
        Ok(true)
    })?;
    Ok(prop_stat)
}

fn parse_prop<R: BufRead>(reader: &mut Reader<R>) -> Result<Properties, CalDavError> {
    let mut props = Properties::default();
    walk_children(reader, |elem, is_empty, reader| {
        let name = local_name(elem);
        if is_empty {
            match name.as_str() {
                "resourcetype" => props.resource_type = Some(Vec::new()),
                "supported-calendar-component-set" => {
                    props.supported_calendar_components = Some(Vec::new());
                }
                "current-user-privilege-set" => props.current_user_privileges = Some(Vec::new()),
                _ => {}
            }
            return Ok(false);
        }

        match name.as_str() {
            "displayname" => props.display_name = Some(read_trimmed_text(reader)?),
            "resourcetype" => props.resource_type = Some(child_names(reader)?),
            "getetag" => props.get_etag = Some(ETag::from_header(&read_element_text(reader)?)),
            "getlastmodified" => props.get_last_modified = Some(read_trimmed_text(reader)?),
            "getcontentlength" => props.get_content_length = Some(read_trimmed_text(reader)?),
            "getcontenttype" => props.get_content_type = Some(read_trimmed_text(reader)?),
            "calendar-data" => props.calendar_data = Some(read_element_text(reader)?),
            "calendar-home-set" => props.calendar_home_set = first_href(reader)?.0,
            "current-user-principal" => {
                let (href, unauthenticated) = first_href(reader)?;
                props.current_user_principal = href;
                props.unauthenticated = unauthenticated;
            }
            "supported-calendar-component-set" => {
                props.supported_calendar_components = Some(component_names(reader)?);
            }
            "calendar-description" => props.calendar_description = Some(read_element_text(reader)?),
            "calendar-timezone" => props.calendar_timezone = Some(read_element_text(reader)?),
            "calendar-color" => props.calendar_color = Some(read_trimmed_text(reader)?),
            "max-resource-size" => props.max_resource_size = Some(read_trimmed_text(reader)?),
            "sync-token" => props.sync_token = Some(read_trimmed_text(reader)?),
            "current-user-privilege-set" => {
                props.current_user_privileges = Some(privilege_names(reader)?);
            }
            "getctag" => props.ctag = Some(ETag::from_header(&read_element_text(reader)?)),
            _ => skip_element(reader, elem)?,
        }
        Ok(true)
    })?;
    Ok(props)
}

/// Local names of the direct children, e.g. `collection` and `calendar`.
fn child_names<R: BufRead>(reader: &mut Reader<R>) -> Result<Vec<String>, CalDavError> {
    let mut names = Vec::new();
    walk_children(reader, |elem, is_empty, reader| {
        names.push(local_name(elem));
        if !is_empty {
            skip_element(reader, elem)?;
        }
        Ok(true)
    })?;
    Ok(names)
}

/// First `DAV:href` inside the element, and whether `DAV:unauthenticated`
/// was present.
fn first_href<R: BufRead>(reader: &mut Reader<R>) -> Result<(Option<Href>, bool), CalDavError> {
    let mut href = None;
    let mut unauthenticated = false;
    walk_children(reader, |elem, is_empty, reader| {
        match (local_name(elem).as_str(), is_empty) {
            ("href", false) => {
                let text = read_trimmed_text(reader)?;
                if href.is_none() {
                    href = Some(Href::from_server(&text));
                }
                Ok(true)
            }
            ("unauthenticated", _) => {
                unauthenticated = true;
                Ok(false)
            }
            _ => Ok(false),
        }
    })?;
    Ok((href, unauthenticated))
}

fn component_names<R: BufRead>(reader: &mut Reader<R>) -> Result<Vec<String>, CalDavError> {
    let mut names = Vec::new();
    walk_children(reader, |elem, _, _| {
        if local_name(elem) == "comp" {
            let attr = elem
                .try_get_attribute("name")
                .map_err(|e| CalDavError::Xml(format!("Invalid attribute: {e}")))?;
            if let Some(attr) = attr {
                let name = std::str::from_utf8(&attr.value)
                    .map_err(|e| CalDavError::Xml(format!("UTF-8 error: {e}")))?;
                names.push(name.to_string());
            }
        }
        Ok(false)
    })?;
    Ok(names)
}

fn privilege_names<R: BufRead>(reader: &mut Reader<R>) -> Result<Vec<String>, CalDavError> {
    let mut names = Vec::new();
    walk_children(reader, |elem, is_empty, reader| {
        if local_name(elem) == "privilege" && !is_empty {
            names.extend(child_names(reader)?);
            return Ok(true);
        }
        Ok(false)
    })?;
    Ok(names)
}

impl ResponseItem {
    /// Numeric response-level status, if the server sent one.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.status.as_deref().and_then(status_code)
    }

    /// Whether the server reported this member as gone.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Returns the path of a member that was returned successfully.
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::NotFound`] for a 404 member, another error for
    /// any other failed member or a missing href.
    pub fn path(&self) -> Result<&Href, CalDavError> {
        if self.href.is_empty() {
            return Err(CalDavError::InvalidResponse(
                "response without href".to_string(),
            ));
        }
        match self.status_code() {
            Some(404) => Err(CalDavError::NotFound(self.href.clone())),
            Some(code) if !(200..300).contains(&code) => Err(CalDavError::Status {
                status: code,
                body: format!("{} for {}", self.status.as_deref().unwrap_or_default(), self.href),
            }),
            _ => Ok(&self.href),
        }
    }

    /// Properties of every successful propstat, merged.
    #[must_use]
    pub fn props(&self) -> Properties {
        let mut merged = Properties::default();
        for prop_stat in self.prop_stats.iter().filter(|p| p.is_success()) {
            merged.merge(prop_stat.props.clone());
        }
        merged
    }

    /// Decodes the member as a calendar object stored at `href`.
    ///
    /// Missing properties stay unset; `calendar-data` in particular may be
    /// withheld by servers answering a sync-collection report.
    ///
    /// # Errors
    ///
    /// Returns an error if a date or length property is malformed.
    pub fn to_calendar_object(&self, href: Href) -> Result<CalendarObject, CalDavError> {
        let props = self.props();
        Ok(CalendarObject {
            href,
            last_modified: props
                .get_last_modified
                .as_deref()
                .map(parse_http_date)
                .transpose()?,
            content_length: props
                .get_content_length
                .as_deref()
                .map(|len| {
                    len.parse::<u64>().map_err(|e| {
                        CalDavError::InvalidResponse(format!("invalid getcontentlength {len:?}: {e}"))
                    })
                })
                .transpose()?,
            etag: props.get_etag,
            data: props.calendar_data,
        })
    }

    /// Decodes the member as a calendar collection stored at `href`.
    ///
    /// Returns `None` when the member's resource type is known and is not a
    /// calendar. A member without resource type is taken to be a calendar,
    /// since some servers omit it from sync responses.
    ///
    /// # Errors
    ///
    /// Returns an error if `max-resource-size` is malformed or negative.
    pub fn to_calendar_collection(
        &self,
        href: Href,
    ) -> Result<Option<CalendarCollection>, CalDavError> {
        let props = self.props();
        if props
            .resource_type
            .as_ref()
            .is_some_and(|types| !types.iter().any(|t| t == "calendar"))
        {
            return Ok(None);
        }

        let max_resource_size = props
            .max_resource_size
            .as_deref()
            .map(|size| {
                let size: i64 = size.parse().map_err(|e| {
                    CalDavError::InvalidResponse(format!("invalid max-resource-size {size:?}: {e}"))
                })?;
                u64::try_from(size).map_err(|_| {
                    CalDavError::InvalidResponse(format!(
                        "max-resource-size must be a positive integer, got {size}"
                    ))
                })
            })
            .transpose()?;

        Ok(Some(CalendarCollection {
            href,
            display_name: props.display_name,
            description: props.calendar_description,
            max_resource_size,
            supported_components: props.supported_calendar_components.unwrap_or_default(),
            color: props.calendar_color,
            timezone: props.calendar_timezone,
            sync_token: props.sync_token,
            current_user_privileges: props.current_user_privileges.unwrap_or_default(),
            ctag: props.ctag,
        }))
    }
}

/// Parses an HTTP date (`Mon, 02 Oct 2023 10:00:00 GMT`).
pub(crate) fn parse_http_date(value: &str) -> Result<Timestamp, CalDavError> {
    HTTP_DATE
        .parse_timestamp(value.trim())
        .map_err(|e| CalDavError::InvalidResponse(format!("invalid HTTP date {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_status_code_from_line() {
        assert_eq!(status_code("HTTP/1.1 404 Not Found"), Some(404));
        assert_eq!(status_code("HTTP/1.1 200 OK"), Some(200));
        assert_eq!(status_code("garbage"), None);
    }

    #[test]
    fn response_parse_http_date_gmt() {
        let ts = parse_http_date("Mon, 02 Oct 2023 10:00:00 GMT").unwrap();
        assert_eq!(ts, "2023-10-02T10:00:00Z".parse::<Timestamp>().unwrap());
        assert!(parse_http_date("yesterday").is_err());
    }

    #[test]
    fn response_merge_keeps_first_value() {
        let mut props = Properties {
            display_name: Some("first".to_string()),
            ..Default::default()
        };
        props.merge(Properties {
            display_name: Some("second".to_string()),
            calendar_color: Some("#ff0000".to_string()),
            ..Default::default()
        });
        assert_eq!(props.display_name.as_deref(), Some("first"));
        assert_eq!(props.calendar_color.as_deref(), Some("#ff0000"));
    }
}
