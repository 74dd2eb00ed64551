// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Time-range queries over long spans.
//!
//! Some servers cap the number of (expanded) results a single calendar-query
//! may return and answer `507 Insufficient Storage` beyond it. Long ranges are
//! therefore issued as consecutive windows, and a window the server refuses is
//! halved until it fits or reaches the minimum width.

use std::collections::HashMap;

use jiff::{SignedDuration, Timestamp};

use crate::client::CalDavClient;
use crate::error::{CalDavError, Phase};
use crate::filter::CompFilter;
use crate::request::{CalendarCompRequest, CalendarDataRequest, CalendarQueryRequest};
use crate::types::{CalendarObject, Href};

/// A bounded half-open query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Inclusive start.
    pub start: Timestamp,
    /// Exclusive end.
    pub end: Timestamp,
}

impl TimeWindow {
    /// Width of the window.
    #[must_use]
    pub fn width(&self) -> SignedDuration {
        self.end.duration_since(self.start)
    }

    /// Splits the window at its midpoint, or `None` when it cannot be split.
    #[must_use]
    pub fn bisect(&self) -> Option<(Self, Self)> {
        let mid = self.start.checked_add(self.width() / 2).ok()?;
        if mid <= self.start || mid >= self.end {
            return None;
        }
        Some((
            Self {
                start: self.start,
                end: mid,
            },
            Self {
                start: mid,
                end: self.end,
            },
        ))
    }
}

/// Splits `[start, end)` into consecutive windows of `width`, the last one
/// truncated to `end`.
#[must_use]
pub fn split_windows(start: Timestamp, end: Timestamp, width: SignedDuration) -> Vec<TimeWindow> {
    if start >= end {
        return Vec::new();
    }
    if !width.is_positive() {
        return vec![TimeWindow { start, end }];
    }

    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let window_end = cursor.checked_add(width).map_or(end, |e| e.min(end));
        windows.push(TimeWindow {
            start: cursor,
            end: window_end,
        });
        cursor = window_end;
    }
    windows
}

/// Objects in first-seen order; a repeated href replaces the earlier entry in
/// place.
#[derive(Debug, Default)]
pub(crate) struct MergedObjects {
    objects: Vec<CalendarObject>,
    index: HashMap<Href, usize>,
}

impl MergedObjects {
    pub(crate) fn push(&mut self, object: CalendarObject) {
        if let Some(slot) = self
            .index
            .get(&object.href)
            .and_then(|&idx| self.objects.get_mut(idx))
        {
            *slot = object;
            return;
        }
        self.index.insert(object.href.clone(), self.objects.len());
        self.objects.push(object);
    }

    pub(crate) fn into_vec(self) -> Vec<CalendarObject> {
        self.objects
    }
}

impl CalDavClient {
    /// Fetches the events of `calendar` overlapping `[start, end)`.
    ///
    /// With both bounds set, the range is queried window by window (see
    /// [`crate::QueryWindowConfig`]) and recurring events are expanded within
    /// each window. With one bound set, a single open-ended query is sent.
    /// Results are deduplicated by href.
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::InvalidInput`] without contacting the server if
    /// both bounds are missing or `start >= end`. Any other failure is tagged
    /// with [`Phase::WindowedQuery`].
    #[tracing::instrument(skip(self, calendar), fields(calendar = %calendar))]
    pub async fn query_range(
        &self,
        calendar: &Href,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> Result<Vec<CalendarObject>, CalDavError> {
        let result = match (start, end) {
            (None, None) => {
                return Err(CalDavError::InvalidInput(
                    "time range query requires a start or an end".to_string(),
                ));
            }
            (Some(start), Some(end)) if start >= end => {
                return Err(CalDavError::InvalidInput(format!(
                    "start {start} must be before end {end}"
                )));
            }
            (Some(start), Some(end)) => self.query_windows(calendar, start, end).await,
            _ => self.query_range_once(calendar, start, end).await,
        };
        result.map_err(|e| e.in_phase(Phase::WindowedQuery))
    }

    async fn query_windows(
        &self,
        calendar: &Href,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<CalendarObject>, CalDavError> {
        let window_config = self.config.query_window;
        let mut merged = MergedObjects::default();
        for window in split_windows(start, end, window_config.window()) {
            let objects = self
                .query_window(calendar, window, window_config.min_window())
                .await?;
            for object in objects {
                merged.push(object);
            }
        }
        Ok(merged.into_vec())
    }

    /// Queries one window, halving it depth-first while the server reports
    /// insufficient storage and the window is wider than `min_width`.
    async fn query_window(
        &self,
        calendar: &Href,
        window: TimeWindow,
        min_width: SignedDuration,
    ) -> Result<Vec<CalendarObject>, CalDavError> {
        let mut found = Vec::new();
        let mut pending = vec![window];
        while let Some(window) = pending.pop() {
            tracing::debug!(start = %window.start, end = %window.end, "querying window");
            match self
                .query_range_once(calendar, Some(window.start), Some(window.end))
                .await
            {
                Ok(objects) => found.extend(objects),
                Err(err @ CalDavError::InsufficientStorage(_)) => {
                    let halves = if window.width() > min_width {
                        window.bisect()
                    } else {
                        None
                    };
                    let Some((left, right)) = halves else {
                        tracing::warn!(
                            start = %window.start,
                            end = %window.end,
                            "server result limit exceeded at minimum window width"
                        );
                        return Err(err);
                    };
                    tracing::debug!(mid = %left.end, "bisecting window");
                    pending.push(right);
                    pending.push(left);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(found)
    }

    async fn query_range_once(
        &self,
        calendar: &Href,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> Result<Vec<CalendarObject>, CalDavError> {
        let filter =
            CompFilter::new("VCALENDAR").comp(CompFilter::new("VEVENT").time_range(start, end));
        let mut data = CalendarDataRequest::new(CalendarCompRequest::standard_events());
        if let (Some(start), Some(end)) = (start, end) {
            data = data.expand(start, end);
        }
        let request = CalendarQueryRequest::new(filter).with_data(data);
        self.query(calendar, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[test]
    fn range_split_windows_cover_range() {
        let start = ts("2024-01-01T00:00:00Z");
        let end = ts("2024-12-31T00:00:00Z");
        let width = SignedDuration::from_hours(90 * 24);

        let windows = split_windows(start, end, width);
        assert_eq!(windows.len(), 5);
        assert_eq!(windows.first().unwrap().start, start);
        assert_eq!(windows.last().unwrap().end, end);
        for pair in windows.windows(2) {
            let [a, b] = pair else { unreachable!() };
            assert_eq!(a.end, b.start);
        }
        assert!(windows.iter().all(|w| w.width() <= width && w.start < w.end));
    }

    #[test]
    fn range_split_windows_short_range_is_single_window() {
        let start = ts("2024-01-01T00:00:00Z");
        let end = ts("2024-01-02T00:00:00Z");
        let windows = split_windows(start, end, SignedDuration::from_hours(90 * 24));
        assert_eq!(windows, vec![TimeWindow { start, end }]);
    }

    #[test]
    fn range_bisect_halves_window() {
        let window = TimeWindow {
            start: ts("2024-01-01T00:00:00Z"),
            end: ts("2024-01-03T00:00:00Z"),
        };
        let (left, right) = window.bisect().unwrap();
        assert_eq!(left.end, ts("2024-01-02T00:00:00Z"));
        assert_eq!(right.start, left.end);
        assert_eq!(right.end, window.end);
        assert!(left.width() < window.width());
    }

    #[test]
    fn range_bisect_refuses_degenerate_window() {
        let start = ts("2024-01-01T00:00:00Z");
        let window = TimeWindow {
            start,
            end: start.checked_add(SignedDuration::from_nanos(1)).unwrap(),
        };
        assert!(window.bisect().is_none());
    }

    #[test]
    fn range_merged_objects_replace_in_place() {
        let mut merged = MergedObjects::default();
        merged.push(CalendarObject::new(Href::from("/cal/a.ics")));
        merged.push(CalendarObject::new(Href::from("/cal/b.ics")));
        merged.push(CalendarObject {
            data: Some("updated".to_string()),
            ..CalendarObject::new(Href::from("/cal/a.ics"))
        });

        let objects = merged.into_vec();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].href.as_str(), "/cal/a.ics");
        assert_eq!(objects[0].data.as_deref(), Some("updated"));
        assert_eq!(objects[1].href.as_str(), "/cal/b.ics");
    }
}
