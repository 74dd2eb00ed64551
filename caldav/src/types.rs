// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::ops::Deref;

use jiff::Timestamp;

/// Calendar resource href (path).
///
/// A `Href` represents the path to a calendar resource on a `CalDAV` server,
/// such as `/calendars/user/event1.ics`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Href(String);

impl Href {
    /// Creates a new `Href` from a string.
    #[must_use]
    pub const fn new(href: String) -> Self {
        Self(href)
    }

    /// Builds an href from a value reported by the server.
    ///
    /// Servers may answer with absolute URLs; only their path is kept so
    /// that hrefs compare equal to the paths the client sent.
    #[must_use]
    pub fn from_server(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            if let Ok(url) = reqwest::Url::parse(raw) {
                return Self(url.path().to_string());
            }
        }
        Self(raw.to_string())
    }

    /// Generates a fresh object href inside a calendar collection.
    #[must_use]
    pub fn new_object_in(calendar: &Self) -> Self {
        let base = calendar.0.trim_end_matches('/');
        Self(format!("{base}/{}.ics", uuid::Uuid::new_v4()))
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the parent collection of this href, keeping the trailing slash.
    #[must_use]
    pub fn parent(&self) -> Self {
        self.0
            .trim_end_matches('/')
            .rfind('/')
            .filter(|idx| *idx > 0)
            .and_then(|idx| self.0.get(..=idx))
            .map_or_else(|| Self("/".to_string()), |parent| Self(parent.to_string()))
    }

    /// Whether both hrefs name the same collection.
    ///
    /// Trailing slashes are ignored, except that `""` and `"/"` are kept
    /// distinct.
    #[must_use]
    pub fn same_collection(&self, other: &Self) -> bool {
        same_collection_path(&self.0, &other.0)
    }
}

impl Deref for Href {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Href {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Href {
    fn from(href: String) -> Self {
        Self(href)
    }
}

impl From<&str> for Href {
    fn from(href: &str) -> Self {
        Self(href.to_string())
    }
}

fn same_collection_path(a: &str, b: &str) -> bool {
    a == b || normalize_collection_path(a) == normalize_collection_path(b)
}

fn normalize_collection_path(p: &str) -> &str {
    if p.is_empty() || p == "/" {
        return p;
    }
    p.trim_end_matches('/')
}

/// Entity tag for change detection.
///
/// Stored without the surrounding quotes; [`ETag::to_header`] adds them back
/// for conditional requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ETag(String);

impl ETag {
    /// Creates a new `ETag` from an unquoted string.
    #[must_use]
    pub const fn new(etag: String) -> Self {
        Self(etag)
    }

    /// Parses an `ETag` as sent on the wire, stripping quotes and the weak
    /// validator prefix.
    #[must_use]
    pub fn from_header(raw: &str) -> Self {
        let raw = raw.trim();
        let raw = raw.strip_prefix("W/").unwrap_or(raw);
        let unquoted = raw
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(raw);
        Self(unquoted.to_string())
    }

    /// Returns the quoted form used in `If-Match` / `If-None-Match` headers.
    #[must_use]
    pub fn to_header(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ETag {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ETag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ETag {
    fn from(etag: String) -> Self {
        Self(etag)
    }
}

impl From<&str> for ETag {
    fn from(etag: &str) -> Self {
        Self(etag.to_string())
    }
}

/// A calendar object resource.
///
/// Represents a calendar object (event, todo, etc.) stored on a `CalDAV`
/// server. The payload is kept as raw iCalendar text; `None` means the server
/// did not send it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarObject {
    /// The href of the resource.
    pub href: Href,
    /// Last modification time reported by the server.
    pub last_modified: Option<Timestamp>,
    /// Content length in bytes.
    pub content_length: Option<u64>,
    /// The entity tag of the resource.
    pub etag: Option<ETag>,
    /// The raw iCalendar data.
    pub data: Option<String>,
}

impl CalendarObject {
    /// Creates an object that only knows its href.
    #[must_use]
    pub const fn new(href: Href) -> Self {
        Self {
            href,
            last_modified: None,
            content_length: None,
            etag: None,
            data: None,
        }
    }

    /// Whether the payload is missing or empty.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.data.as_deref().is_some_and(|d| !d.is_empty())
    }

    /// Takes the payload of `fetched`, and its metadata where it has any.
    pub fn absorb(&mut self, fetched: Self) {
        self.data = fetched.data;
        if fetched.last_modified.is_some() {
            self.last_modified = fetched.last_modified;
        }
        if fetched.content_length.is_some_and(|len| len != 0) {
            self.content_length = fetched.content_length;
        }
        if fetched.etag.as_ref().is_some_and(|etag| !etag.is_empty()) {
            self.etag = fetched.etag;
        }
    }
}

/// Calendar collection metadata.
///
/// Represents a calendar collection on a `CalDAV` server, containing
/// metadata about the calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarCollection {
    /// The href of the calendar collection.
    pub href: Href,
    /// The display name of the calendar.
    pub display_name: Option<String>,
    /// The description of the calendar.
    pub description: Option<String>,
    /// Largest object the server accepts, in bytes.
    pub max_resource_size: Option<u64>,
    /// Supported component types (VEVENT, VTODO, etc.).
    pub supported_components: Vec<String>,
    /// Display color, usually `#RRGGBB` or `#RRGGBBAA`.
    pub color: Option<String>,
    /// The `VTIMEZONE` text or identifier of the calendar.
    pub timezone: Option<String>,
    /// RFC 6578 sync token of the collection.
    pub sync_token: Option<String>,
    /// Privileges held by the current principal (`read`, `write`, ...).
    pub current_user_privileges: Vec<String>,
    /// The collection tag (`CTag`) for change detection.
    pub ctag: Option<ETag>,
}

impl CalendarCollection {
    /// Creates a new `CalendarCollection`.
    #[must_use]
    pub fn new(href: Href) -> Self {
        Self {
            href,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_normalize_collection_path() {
        let cases = [
            ("", ""),
            ("/", "/"),
            ("/cal", "/cal"),
            ("/cal/", "/cal"),
            ("/cal////", "/cal"),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize_collection_path(input), expected, "{input:?}");
        }
    }

    #[test]
    fn types_same_collection_path() {
        let cases = [
            ("/cal", "/cal", true),
            ("/cal/", "/cal", true),
            ("/cal", "/cal///", true),
            ("/", "/", true),
            ("", "/", false),
            ("/cal/a", "/cal/b", false),
        ];
        for (a, b, expected) in cases {
            assert_eq!(same_collection_path(a, b), expected, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn types_href_from_server_strips_origin() {
        let href = Href::from_server(" https://caldav.example.com/cal/a.ics ");
        assert_eq!(href.as_str(), "/cal/a.ics");
        assert_eq!(Href::from_server("/cal/b.ics").as_str(), "/cal/b.ics");
    }

    #[test]
    fn types_href_parent_and_new_object() {
        assert_eq!(Href::from("/cal/a.ics").parent().as_str(), "/cal/");
        assert_eq!(Href::from("/cal/sub/").parent().as_str(), "/cal/");
        assert_eq!(Href::from("/a.ics").parent().as_str(), "/");

        let href = Href::new_object_in(&Href::from("/cal/"));
        assert!(href.starts_with("/cal/"));
        assert!(href.ends_with(".ics"));
        assert_eq!(href.parent().as_str(), "/cal/");
    }

    #[test]
    fn types_etag_quoting() {
        assert_eq!(ETag::from_header("\"abc\"").as_str(), "abc");
        assert_eq!(ETag::from_header("W/\"weak\"").as_str(), "weak");
        assert_eq!(ETag::from_header("bare").as_str(), "bare");
        assert_eq!(ETag::from("abc").to_header(), "\"abc\"");
    }

    #[test]
    fn types_absorb_keeps_known_metadata() {
        let mut object = CalendarObject {
            href: Href::from("/cal/a.ics"),
            last_modified: Some(Timestamp::UNIX_EPOCH),
            content_length: Some(10),
            etag: Some(ETag::from("old")),
            data: None,
        };
        object.absorb(CalendarObject {
            data: Some("BEGIN:VCALENDAR".to_string()),
            content_length: Some(0),
            etag: Some(ETag::from("")),
            ..CalendarObject::new(Href::from("/cal/a.ics"))
        });

        assert_eq!(object.data.as_deref(), Some("BEGIN:VCALENDAR"));
        assert_eq!(object.last_modified, Some(Timestamp::UNIX_EPOCH));
        assert_eq!(object.content_length, Some(10));
        assert_eq!(object.etag, Some(ETag::from("old")));
    }
}
