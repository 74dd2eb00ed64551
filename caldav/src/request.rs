// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Request builders for `CalDAV` operations.

use jiff::Timestamp;

use crate::error::CalDavError;
use crate::filter::{CompFilter, encode_filter, format_utc};
use crate::types::Href;
use crate::xml::{XmlBuilder, ns};

/// Properties to request in PROPFIND and REPORT bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prop {
    /// Display name.
    DisplayName,
    /// Resource type.
    ResourceType,
    /// `ETag`.
    GetETag,
    /// Last modification time.
    GetLastModified,
    /// Content length.
    GetContentLength,
    /// Content type.
    GetContentType,
    /// Calendar data.
    CalendarData,
    /// Calendar home set.
    CalendarHomeSet,
    /// Principal of the authenticated user.
    CurrentUserPrincipal,
    /// Supported calendar components.
    SupportedCalendarComponents,
    /// Calendar description.
    CalendarDescription,
    /// Calendar timezone.
    CalendarTimezone,
    /// Calendar color (Apple extension).
    CalendarColor,
    /// Largest accepted object size.
    MaxResourceSize,
    /// RFC 6578 sync token.
    SyncToken,
    /// Privileges of the authenticated user.
    CurrentUserPrivilegeSet,
    /// Collection tag (calendar server extension).
    GetCTag,
}

/// Properties describing a calendar collection.
pub const CALENDAR_PROPS: &[Prop] = &[
    Prop::DisplayName,
    Prop::ResourceType,
    Prop::CalendarDescription,
    Prop::MaxResourceSize,
    Prop::SupportedCalendarComponents,
    Prop::CalendarColor,
    Prop::CalendarTimezone,
    Prop::SyncToken,
    Prop::CurrentUserPrivilegeSet,
    Prop::GetCTag,
];

impl Prop {
    const fn name(self) -> &'static str {
        match self {
            Self::DisplayName => "displayname",
            Self::ResourceType => "resourcetype",
            Self::GetETag => "getetag",
            Self::GetLastModified => "getlastmodified",
            Self::GetContentLength => "getcontentlength",
            Self::GetContentType => "getcontenttype",
            Self::CalendarData => "calendar-data",
            Self::CalendarHomeSet => "calendar-home-set",
            Self::CurrentUserPrincipal => "current-user-principal",
            Self::SupportedCalendarComponents => "supported-calendar-component-set",
            Self::CalendarDescription => "calendar-description",
            Self::CalendarTimezone => "calendar-timezone",
            Self::CalendarColor => "calendar-color",
            Self::MaxResourceSize => "max-resource-size",
            Self::SyncToken => "sync-token",
            Self::CurrentUserPrivilegeSet => "current-user-privilege-set",
            Self::GetCTag => "getctag",
        }
    }

    const fn prefix(self) -> &'static str {
        match self {
            Self::DisplayName
            | Self::ResourceType
            | Self::GetETag
            | Self::GetLastModified
            | Self::GetContentLength
            | Self::GetContentType
            | Self::CurrentUserPrincipal
            | Self::SyncToken
            | Self::CurrentUserPrivilegeSet => "D",
            Self::CalendarData
            | Self::CalendarHomeSet
            | Self::SupportedCalendarComponents
            | Self::CalendarDescription
            | Self::CalendarTimezone
            | Self::MaxResourceSize => "C",
            Self::CalendarColor => "I",
            Self::GetCTag => "CS",
        }
    }

    fn qualified_name(self) -> String {
        format!("{}:{}", self.prefix(), self.name())
    }
}

/// Namespace declarations for a root element; `DAV:` and `CalDAV` are always
/// declared, the vendor namespaces only when a property needs them.
fn namespace_attrs(props: &[Prop]) -> Vec<(&'static str, &'static str)> {
    let mut attrs = vec![("xmlns:D", ns::DAV), ("xmlns:C", ns::CALDAV)];
    if props.iter().any(|p| p.prefix() == "I") {
        attrs.push(("xmlns:I", ns::APPLE_ICAL));
    }
    if props.iter().any(|p| p.prefix() == "CS") {
        attrs.push(("xmlns:CS", ns::CALENDAR_SERVER));
    }
    attrs
}

fn write_prop_names(xml: &mut XmlBuilder, props: &[Prop]) -> Result<(), CalDavError> {
    xml.start("D:prop", &[])?;
    for prop in props {
        xml.empty(&prop.qualified_name(), &[])?;
    }
    xml.end("D:prop")
}

/// PROPFIND request builder.
#[derive(Debug)]
pub struct PropFindRequest {
    props: Vec<Prop>,
}

impl PropFindRequest {
    /// Creates a new PROPFIND request.
    #[must_use]
    pub fn new() -> Self {
        Self { props: Vec::new() }
    }

    /// Creates a PROPFIND request for the given properties.
    #[must_use]
    pub fn with_props(props: &[Prop]) -> Self {
        Self {
            props: props.to_vec(),
        }
    }

    /// Adds a property to the request.
    pub fn add_property(&mut self, prop: Prop) -> &mut Self {
        self.props.push(prop);
        self
    }

    /// Builds the XML body for the PROPFIND request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut xml = XmlBuilder::new();
        xml.start("D:propfind", &namespace_attrs(&self.props))?;
        write_prop_names(&mut xml, &self.props)?;
        xml.end("D:propfind")?;
        xml.finish()
    }
}

impl Default for PropFindRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Which components and properties `calendar-data` should return.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarCompRequest {
    /// Component name.
    pub name: String,
    /// Return every property of the component.
    pub all_props: bool,
    /// Properties to return when `all_props` is unset.
    pub props: Vec<String>,
    /// Return every subcomponent.
    pub all_comps: bool,
    /// Subcomponents to return when `all_comps` is unset.
    pub comps: Vec<CalendarCompRequest>,
}

impl CalendarCompRequest {
    /// `VCALENDAR` with all its properties and all `VEVENT` properties.
    #[must_use]
    pub fn standard_events() -> Self {
        Self {
            name: "VCALENDAR".to_string(),
            all_props: true,
            comps: vec![Self {
                name: "VEVENT".to_string(),
                all_props: true,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    /// The whole `VCALENDAR`.
    #[must_use]
    pub fn full() -> Self {
        Self {
            name: "VCALENDAR".to_string(),
            all_props: true,
            all_comps: true,
            ..Default::default()
        }
    }

    fn encode(&self, xml: &mut XmlBuilder) -> Result<(), CalDavError> {
        xml.start("C:comp", &[("name", self.name.as_str())])?;
        if self.all_props {
            xml.empty("C:allprop", &[])?;
        }
        for prop in &self.props {
            xml.empty("C:prop", &[("name", prop.as_str())])?;
        }
        if self.all_comps {
            xml.empty("C:allcomp", &[])?;
        }
        for comp in &self.comps {
            comp.encode(xml)?;
        }
        xml.end("C:comp")
    }
}

/// The `calendar-data` element of a REPORT, plus the object metadata that
/// always accompanies it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarDataRequest {
    /// Component selection; `None` returns the whole object.
    pub comp: Option<CalendarCompRequest>,
    /// Expand recurrences into instances within this range.
    pub expand: Option<(Timestamp, Timestamp)>,
}

impl CalendarDataRequest {
    /// Requests the given components without expansion.
    #[must_use]
    pub const fn new(comp: CalendarCompRequest) -> Self {
        Self {
            comp: Some(comp),
            expand: None,
        }
    }

    /// Expands recurring events over `[start, end)`.
    #[must_use]
    pub fn expand(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.expand = Some((start, end));
        self
    }

    fn encode_prop(&self, xml: &mut XmlBuilder) -> Result<(), CalDavError> {
        xml.start("D:prop", &[])?;
        xml.empty("D:getetag", &[])?;
        xml.empty("D:getlastmodified", &[])?;
        xml.empty("D:getcontentlength", &[])?;
        if self.comp.is_none() && self.expand.is_none() {
            xml.empty("C:calendar-data", &[])?;
        } else {
            xml.start("C:calendar-data", &[])?;
            if let Some(comp) = &self.comp {
                comp.encode(xml)?;
            }
            if let Some((start, end)) = self.expand {
                let start = format_utc(start);
                let end = format_utc(end);
                xml.empty(
                    "C:expand",
                    &[("start", start.as_str()), ("end", end.as_str())],
                )?;
            }
            xml.end("C:calendar-data")?;
        }
        xml.end("D:prop")
    }
}

/// Calendar query request builder.
#[derive(Debug, Clone)]
pub struct CalendarQueryRequest {
    /// What to return for each match.
    pub data: CalendarDataRequest,
    /// Root of the filter tree, normally a `VCALENDAR` comp-filter.
    pub filter: CompFilter,
}

impl CalendarQueryRequest {
    /// Creates a query returning whole objects.
    #[must_use]
    pub fn new(filter: CompFilter) -> Self {
        Self {
            data: CalendarDataRequest::default(),
            filter,
        }
    }

    /// Replaces the `calendar-data` request.
    #[must_use]
    pub fn with_data(mut self, data: CalendarDataRequest) -> Self {
        self.data = data;
        self
    }

    /// Builds the XML body for the calendar query request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut xml = XmlBuilder::new();
        xml.start("C:calendar-query", &namespace_attrs(&[]))?;
        self.data.encode_prop(&mut xml)?;
        encode_filter(&mut xml, &self.filter)?;
        xml.end("C:calendar-query")?;
        xml.finish()
    }
}

/// Calendar multiget request builder.
#[derive(Debug, Clone, Default)]
pub struct CalendarMultiGetRequest {
    hrefs: Vec<Href>,
    data: CalendarDataRequest,
}

impl CalendarMultiGetRequest {
    /// Creates a new calendar multiget request.
    #[must_use]
    pub fn new(data: CalendarDataRequest) -> Self {
        Self {
            hrefs: Vec::new(),
            data,
        }
    }

    /// Adds an href to the request.
    pub fn add_href(&mut self, href: Href) -> &mut Self {
        self.hrefs.push(href);
        self
    }

    /// Builds the XML body for the calendar multiget request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut xml = XmlBuilder::new();
        xml.start("C:calendar-multiget", &namespace_attrs(&[]))?;
        self.data.encode_prop(&mut xml)?;
        for href in &self.hrefs {
            xml.text_element("D:href", &[], href.as_str())?;
        }
        xml.end("C:calendar-multiget")?;
        xml.finish()
    }
}

/// What a sync-collection report returns for each changed member.
#[derive(Debug, Clone)]
pub enum SyncProps {
    /// Calendar objects, with their data.
    Objects(CalendarDataRequest),
    /// Plain properties, e.g. [`CALENDAR_PROPS`] when syncing a home set.
    Props(Vec<Prop>),
}

/// RFC 6578 sync-collection request builder.
#[derive(Debug, Clone)]
pub struct SyncCollectionRequest {
    /// Token from the previous sync; empty for an initial sync.
    pub sync_token: String,
    /// Upper bound on the number of members returned.
    pub limit: Option<u32>,
    /// What to return per member.
    pub props: SyncProps,
}

impl SyncCollectionRequest {
    /// Builds the XML body for the sync-collection request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let declared = match &self.props {
            SyncProps::Objects(_) => Vec::new(),
            SyncProps::Props(props) => props.clone(),
        };

        let mut xml = XmlBuilder::new();
        xml.start("D:sync-collection", &namespace_attrs(&declared))?;
        if self.sync_token.is_empty() {
            xml.empty("D:sync-token", &[])?;
        } else {
            xml.text_element("D:sync-token", &[], &self.sync_token)?;
        }
        xml.text_element("D:sync-level", &[], "1")?;
        if let Some(limit) = self.limit {
            xml.start("D:limit", &[])?;
            xml.text_element("D:nresults", &[], &limit.to_string())?;
            xml.end("D:limit")?;
        }
        match &self.props {
            SyncProps::Objects(data) => data.encode_prop(&mut xml)?,
            SyncProps::Props(props) => write_prop_names(&mut xml, props)?,
        }
        xml.end("D:sync-collection")?;
        xml.finish()
    }
}

/// Calendar properties to change with PROPPATCH; `None` leaves a property
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarUpdate {
    /// New display name.
    pub display_name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New color.
    pub color: Option<String>,
    /// New timezone (`VTIMEZONE` text).
    pub timezone: Option<String>,
}

impl CalendarUpdate {
    /// Whether no property is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.description.is_none()
            && self.color.is_none()
            && self.timezone.is_none()
    }

    /// Builds the XML body for the PROPPATCH request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut xml = XmlBuilder::new();
        xml.start("D:propertyupdate", &namespace_attrs(&[Prop::CalendarColor]))?;
        xml.start("D:set", &[])?;
        xml.start("D:prop", &[])?;
        if let Some(name) = &self.display_name {
            xml.text_element("D:displayname", &[], name)?;
        }
        if let Some(description) = &self.description {
            xml.text_element("C:calendar-description", &[], description)?;
        }
        if let Some(color) = &self.color {
            xml.text_element("I:calendar-color", &[], color)?;
        }
        if let Some(timezone) = &self.timezone {
            xml.text_element("C:calendar-timezone", &[], timezone)?;
        }
        xml.end("D:prop")?;
        xml.end("D:set")?;
        xml.end("D:propertyupdate")?;
        xml.finish()
    }
}

/// MKCALENDAR request builder.
#[derive(Debug, Clone, Default)]
pub struct MkCalendarRequest {
    /// Display name of the new calendar.
    pub display_name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Component types the calendar accepts; empty leaves it to the server.
    pub components: Vec<String>,
}

impl MkCalendarRequest {
    /// Builds the XML body for the MKCALENDAR request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut xml = XmlBuilder::new();
        xml.start("C:mkcalendar", &namespace_attrs(&[]))?;
        xml.start("D:set", &[])?;
        xml.start("D:prop", &[])?;
        xml.text_element("D:displayname", &[], &self.display_name)?;
        if let Some(description) = &self.description {
            xml.text_element("C:calendar-description", &[], description)?;
        }
        if !self.components.is_empty() {
            xml.start("C:supported-calendar-component-set", &[])?;
            for comp in &self.components {
                xml.empty("C:comp", &[("name", comp.as_str())])?;
            }
            xml.end("C:supported-calendar-component-set")?;
        }
        xml.end("D:prop")?;
        xml.end("D:set")?;
        xml.end("C:mkcalendar")?;
        xml.finish()
    }
}
