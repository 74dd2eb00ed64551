// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Minimal scan of iCalendar payloads for event bounds and recurrence.
//!
//! This is not an RFC 5545 parser: it only looks at `DTSTART`, `DTEND` and
//! `RRULE` of the first `VEVENT`, which is enough to tell whether an event can
//! still matter after a given instant.

use jiff::Timestamp;
use jiff::civil::DateTime;
use jiff::tz::TimeZone;

/// Why no metadata could be extracted from a payload.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    /// The payload is empty.
    #[error("empty event payload")]
    EmptyPayload,

    /// A non-recurring event has neither `DTSTART` nor `DTEND`.
    #[error("event metadata missing DTSTART/DTEND")]
    MissingBounds,
}

/// Bounds and recurrence of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventMetadata {
    /// `DTSTART`, if present and parseable.
    pub start: Option<Timestamp>,
    /// `DTEND`, if present and parseable.
    pub end: Option<Timestamp>,
    /// Whether the event has an `RRULE`.
    pub recurring: bool,
    /// `UNTIL` of the rule; `None` for rules without one.
    pub recurrence_end: Option<Timestamp>,
    /// Whether the rule has neither a parseable `UNTIL` nor a `COUNT`.
    pub recurrence_open: bool,
}

impl EventMetadata {
    /// Extracts metadata from the first `VEVENT` of `data`.
    ///
    /// Values that do not parse are ignored, leaving the field unset.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::EmptyPayload`] for an empty payload and
    /// [`MetadataError::MissingBounds`] for a non-recurring event without
    /// start or end.
    pub fn extract(data: &str) -> Result<Self, MetadataError> {
        if data.is_empty() {
            return Err(MetadataError::EmptyPayload);
        }

        let mut meta = Self::default();
        let mut in_event = false;
        for line in unfold_lines(data) {
            if line.eq_ignore_ascii_case("BEGIN:VEVENT") {
                in_event = true;
                continue;
            }
            if line.eq_ignore_ascii_case("END:VEVENT") {
                if in_event {
                    break;
                }
                continue;
            }
            if !in_event {
                continue;
            }

            let Some((name, value)) = split_property(&line) else {
                continue;
            };
            if name.eq_ignore_ascii_case("DTSTART") {
                if let Some(ts) = parse_ics_time(value) {
                    meta.start = Some(ts);
                }
            } else if name.eq_ignore_ascii_case("DTEND") {
                if let Some(ts) = parse_ics_time(value) {
                    meta.end = Some(ts);
                }
            } else if name.eq_ignore_ascii_case("RRULE") {
                meta.apply_rrule(value);
            }
        }

        if !meta.recurring && meta.start.is_none() && meta.end.is_none() {
            return Err(MetadataError::MissingBounds);
        }
        Ok(meta)
    }

    fn apply_rrule(&mut self, rule: &str) {
        self.recurring = true;
        self.recurrence_open = true;
        for part in rule.split(';') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if key.eq_ignore_ascii_case("UNTIL") {
                if let Some(until) = parse_ics_time(value) {
                    self.recurrence_end = Some(until);
                    self.recurrence_open = false;
                }
            } else if key.eq_ignore_ascii_case("COUNT") && value.parse::<i64>().is_ok() {
                self.recurrence_open = false;
            }
        }
    }
}

/// Splits a content line into its name (parameters dropped) and its trimmed
/// value; `None` when there is no value.
fn split_property(line: &str) -> Option<(&str, &str)> {
    let name_end = line.find([';', ':'])?;
    let (_, value) = line.split_once(':')?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    line.get(..name_end).map(|name| (name, value))
}

/// Splits `data` into logical lines.
///
/// Accepts `\r\n` and `\n` endings. A physical line starting with a space or
/// tab continues the previous one, minus that first character. Empty lines
/// are dropped.
#[must_use]
pub fn unfold_lines(data: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for line in data.lines() {
        if let Some(rest) = line.strip_prefix([' ', '\t']) {
            current.push_str(rest);
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

type TimeMatcher = fn(&str) -> Option<Timestamp>;

/// Tried in order, first match wins.
const ICS_TIME_MATCHERS: [TimeMatcher; 3] = [utc_date_time, floating_date_time, date_only];

/// Parses an iCalendar `DATE-TIME` or `DATE` value onto the UTC timeline.
///
/// `YYYYMMDDTHHMMSSZ` is UTC, `YYYYMMDDTHHMMSS` (floating) is read as UTC wall
/// clock, and `YYYYMMDD` is midnight UTC.
#[must_use]
pub fn parse_ics_time(value: &str) -> Option<Timestamp> {
    let value = value.trim();
    ICS_TIME_MATCHERS.iter().find_map(|matcher| matcher(value))
}

fn utc_date_time(value: &str) -> Option<Timestamp> {
    value.strip_suffix('Z').and_then(date_time)
}

fn floating_date_time(value: &str) -> Option<Timestamp> {
    if value.ends_with('Z') {
        return None;
    }
    date_time(value)
}

fn date_only(value: &str) -> Option<Timestamp> {
    if value.len() != 8 {
        return None;
    }
    to_timestamp(value, "000000")
}

fn date_time(value: &str) -> Option<Timestamp> {
    let (date, time) = value.split_once('T')?;
    if date.len() != 8 || time.len() != 6 {
        return None;
    }
    to_timestamp(date, time)
}

fn to_timestamp(date: &str, time: &str) -> Option<Timestamp> {
    let dt = DateTime::new(
        digits(date.get(0..4)?)?,
        digits(date.get(4..6)?)?,
        digits(date.get(6..8)?)?,
        digits(time.get(0..2)?)?,
        digits(time.get(2..4)?)?,
        digits(time.get(4..6)?)?,
        0,
    )
    .ok()?;
    dt.to_zoned(TimeZone::UTC).ok().map(|zdt| zdt.timestamp())
}

fn digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[test]
    fn ics_unfold_joins_continuation_lines() {
        let data = "BEGIN:VEVENT\r\nDESCRIPTION:long\r\n  text\r\n\tmore\r\nEND:VEVENT\r\n";
        assert_eq!(
            unfold_lines(data),
            vec!["BEGIN:VEVENT", "DESCRIPTION:long textmore", "END:VEVENT"]
        );
    }

    #[test]
    fn ics_unfold_accepts_bare_newlines() {
        let data = "BEGIN:VEVENT\nRRULE:FREQ=DAILY;UN\n TIL=20231231T000000Z\nEND:VEVENT";
        assert_eq!(
            unfold_lines(data),
            vec![
                "BEGIN:VEVENT",
                "RRULE:FREQ=DAILY;UNTIL=20231231T000000Z",
                "END:VEVENT"
            ]
        );
    }

    #[test]
    fn ics_parse_time_formats() {
        assert_eq!(
            parse_ics_time("20231002T100000Z"),
            Some(ts("2023-10-02T10:00:00Z"))
        );
        assert_eq!(
            parse_ics_time("20231002T100000"),
            Some(ts("2023-10-02T10:00:00Z"))
        );
        assert_eq!(parse_ics_time("20231002"), Some(ts("2023-10-02T00:00:00Z")));
        assert_eq!(parse_ics_time(" 20231002 "), Some(ts("2023-10-02T00:00:00Z")));
    }

    #[test]
    fn ics_parse_time_rejects_malformed() {
        for value in ["", "2023100", "20231002Z", "20231302", "20231002T1000Z", "2023-10-02"] {
            assert_eq!(parse_ics_time(value), None, "{value:?}");
        }
    }

    #[test]
    fn ics_extract_simple_event() {
        let data = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:1\r\n\
                    DTSTART;TZID=Europe/Paris:20231002T100000\r\n\
                    DTEND:20231002T110000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let meta = EventMetadata::extract(data).unwrap();
        assert_eq!(meta.start, Some(ts("2023-10-02T10:00:00Z")));
        assert_eq!(meta.end, Some(ts("2023-10-02T11:00:00Z")));
        assert!(!meta.recurring);
    }

    #[test]
    fn ics_extract_rrule_until_and_count() {
        let until = "BEGIN:VEVENT\nDTSTART:20230101T090000Z\n\
                     RRULE:FREQ=WEEKLY;UNTIL=20230601T000000Z\nEND:VEVENT";
        let meta = EventMetadata::extract(until).unwrap();
        assert!(meta.recurring);
        assert!(!meta.recurrence_open);
        assert_eq!(meta.recurrence_end, Some(ts("2023-06-01T00:00:00Z")));

        let count = "BEGIN:VEVENT\nRRULE:FREQ=DAILY;COUNT=5\nEND:VEVENT";
        let meta = EventMetadata::extract(count).unwrap();
        assert!(meta.recurring);
        assert!(!meta.recurrence_open);
        assert_eq!(meta.recurrence_end, None);

        let open = "BEGIN:VEVENT\nrrule:FREQ=DAILY;UNTIL=garbage\nEND:VEVENT";
        let meta = EventMetadata::extract(open).unwrap();
        assert!(meta.recurring);
        assert!(meta.recurrence_open);
    }

    #[test]
    fn ics_extract_only_reads_first_event() {
        let data = "BEGIN:VEVENT\nDTSTART:20230101\nEND:VEVENT\n\
                    BEGIN:VEVENT\nDTSTART:20240101\nRRULE:FREQ=DAILY\nEND:VEVENT";
        let meta = EventMetadata::extract(data).unwrap();
        assert_eq!(meta.start, Some(ts("2023-01-01T00:00:00Z")));
        assert!(!meta.recurring);
    }

    #[test]
    fn ics_extract_ignores_properties_outside_events() {
        let data = "BEGIN:VCALENDAR\nDTSTART:20230101\nBEGIN:VTODO\nDUE:20230101\nEND:VTODO\nEND:VCALENDAR";
        assert_eq!(
            EventMetadata::extract(data),
            Err(MetadataError::MissingBounds)
        );
    }

    #[test]
    fn ics_extract_errors() {
        assert_eq!(EventMetadata::extract(""), Err(MetadataError::EmptyPayload));
        assert_eq!(
            EventMetadata::extract("BEGIN:VEVENT\nDTSTART:nonsense\nEND:VEVENT"),
            Err(MetadataError::MissingBounds)
        );
    }

    #[test]
    fn ics_property_name_must_match_exactly() {
        let data = "BEGIN:VEVENT\nDTSTARTX:20230101\nDTEND:20230102\nEND:VEVENT";
        let meta = EventMetadata::extract(data).unwrap();
        assert_eq!(meta.start, None);
        assert_eq!(meta.end, Some(ts("2023-01-02T00:00:00Z")));
    }
}
