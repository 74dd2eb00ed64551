// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Declarative `calendar-query` filters (RFC 4791 section 9.7).

use jiff::Timestamp;

use crate::error::CalDavError;
use crate::xml::XmlBuilder;

/// Formats a timestamp the way `CalDAV` time ranges expect it.
pub(crate) fn format_utc(ts: Timestamp) -> String {
    ts.strftime("%Y%m%dT%H%M%SZ").to_string()
}

/// Half-open time range; either bound may be left open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive start.
    pub start: Option<Timestamp>,
    /// Exclusive end.
    pub end: Option<Timestamp>,
}

impl TimeRange {
    /// Creates a time range.
    #[must_use]
    pub const fn new(start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        Self { start, end }
    }

    /// Whether neither bound is set.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Text match for property and parameter filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextMatch {
    /// Text to search for.
    pub text: String,
    /// Collation to use, e.g. `i;ascii-casemap`.
    pub collation: Option<String>,
    /// Whether to negate the match.
    pub negate: bool,
}

impl TextMatch {
    /// Creates a text match with the server's default collation.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Component filter, the root of a filter tree.
///
/// A node either asks for the component to be absent (`is_not_defined`) or
/// carries constraints; setting both produces a request servers reject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompFilter {
    /// Component name (`VCALENDAR`, `VEVENT`, ...).
    pub name: String,
    /// Matches components that are absent.
    pub is_not_defined: bool,
    /// Time range the component must overlap.
    pub time_range: TimeRange,
    /// Property constraints.
    pub props: Vec<PropFilter>,
    /// Nested component constraints.
    pub comps: Vec<CompFilter>,
}

impl CompFilter {
    /// Creates a filter that only matches on the component name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the time range.
    #[must_use]
    pub fn time_range(mut self, start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        self.time_range = TimeRange::new(start, end);
        self
    }

    /// Adds a nested component filter.
    #[must_use]
    pub fn comp(mut self, comp: Self) -> Self {
        self.comps.push(comp);
        self
    }

    /// Adds a property filter.
    #[must_use]
    pub fn prop(mut self, prop: PropFilter) -> Self {
        self.props.push(prop);
        self
    }
}

/// Property filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropFilter {
    /// Property name (`UID`, `SUMMARY`, ...).
    pub name: String,
    /// Matches components without this property.
    pub is_not_defined: bool,
    /// Time range the property value must overlap.
    pub time_range: TimeRange,
    /// Text the property value must match.
    pub text_match: Option<TextMatch>,
    /// Parameter constraints.
    pub param_filters: Vec<ParamFilter>,
}

impl PropFilter {
    /// Creates a filter that only matches on the property name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the text match.
    #[must_use]
    pub fn text_match(mut self, text_match: TextMatch) -> Self {
        self.text_match = Some(text_match);
        self
    }
}

/// Parameter filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamFilter {
    /// Parameter name (`PARTSTAT`, `TZID`, ...).
    pub name: String,
    /// Matches properties without this parameter.
    pub is_not_defined: bool,
    /// Text the parameter value must match.
    pub text_match: Option<TextMatch>,
}

/// Writes `<C:filter>` with `root` inside.
///
/// # Errors
///
/// Returns an error if XML writing fails.
pub fn encode_filter(xml: &mut XmlBuilder, root: &CompFilter) -> Result<(), CalDavError> {
    xml.start("C:filter", &[])?;
    encode_comp_filter(xml, root)?;
    xml.end("C:filter")
}

fn encode_comp_filter(xml: &mut XmlBuilder, filter: &CompFilter) -> Result<(), CalDavError> {
    xml.start("C:comp-filter", &[("name", filter.name.as_str())])?;
    if filter.is_not_defined {
        xml.empty("C:is-not-defined", &[])?;
    }
    encode_time_range(xml, &filter.time_range)?;
    for prop in &filter.props {
        encode_prop_filter(xml, prop)?;
    }
    for comp in &filter.comps {
        encode_comp_filter(xml, comp)?;
    }
    xml.end("C:comp-filter")
}

fn encode_prop_filter(xml: &mut XmlBuilder, filter: &PropFilter) -> Result<(), CalDavError> {
    xml.start("C:prop-filter", &[("name", filter.name.as_str())])?;
    if filter.is_not_defined {
        xml.empty("C:is-not-defined", &[])?;
    }
    encode_time_range(xml, &filter.time_range)?;
    if let Some(text_match) = &filter.text_match {
        encode_text_match(xml, text_match)?;
    }
    for param in &filter.param_filters {
        encode_param_filter(xml, param)?;
    }
    xml.end("C:prop-filter")
}

fn encode_param_filter(xml: &mut XmlBuilder, filter: &ParamFilter) -> Result<(), CalDavError> {
    xml.start("C:param-filter", &[("name", filter.name.as_str())])?;
    if filter.is_not_defined {
        xml.empty("C:is-not-defined", &[])?;
    }
    if let Some(text_match) = &filter.text_match {
        encode_text_match(xml, text_match)?;
    }
    xml.end("C:param-filter")
}

fn encode_text_match(xml: &mut XmlBuilder, text_match: &TextMatch) -> Result<(), CalDavError> {
    let negate = if text_match.negate { "yes" } else { "no" };
    let mut attrs = vec![("negate-condition", negate)];
    if let Some(collation) = &text_match.collation {
        attrs.push(("collation", collation.as_str()));
    }
    xml.text_element("C:text-match", &attrs, &text_match.text)
}

/// Writes `<C:time-range>` with the bounds that are set; nothing when both
/// are open.
pub(crate) fn encode_time_range(
    xml: &mut XmlBuilder,
    range: &TimeRange,
) -> Result<(), CalDavError> {
    if range.is_unbounded() {
        return Ok(());
    }
    let start = range.start.map(format_utc);
    let end = range.end.map(format_utc);
    let mut attrs = Vec::with_capacity(2);
    if let Some(start) = &start {
        attrs.push(("start", start.as_str()));
    }
    if let Some(end) = &end {
        attrs.push(("end", end.as_str()));
    }
    xml.empty("C:time-range", &attrs)
}
