// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! RFC 6578 collection synchronization.

use std::collections::HashMap;

use jiff::Timestamp;

use crate::client::CalDavClient;
use crate::error::{CalDavError, Phase};
use crate::http::Depth;
use crate::ics::EventMetadata;
use crate::request::{
    CALENDAR_PROPS, CalendarCompRequest, CalendarDataRequest, SyncCollectionRequest, SyncProps,
};
use crate::types::{CalendarCollection, CalendarObject, Href};

/// Parameters of a sync-collection request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncQuery {
    /// Token from the previous sync; empty for an initial sync.
    pub sync_token: String,
    /// Upper bound on the number of changed members returned.
    pub limit: Option<u32>,
    /// On an initial sync, drop events that ended before this instant.
    pub start_time: Option<Timestamp>,
}

impl SyncQuery {
    /// An initial sync returning everything.
    #[must_use]
    pub fn initial() -> Self {
        Self::default()
    }

    /// An incremental sync continuing from `token`.
    #[must_use]
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            sync_token: token.into(),
            ..Default::default()
        }
    }

    /// The cutoff in effect; only an initial sync honors `start_time`.
    #[must_use]
    pub fn cutoff(&self) -> Option<Timestamp> {
        if self.sync_token.is_empty() {
            self.start_time
        } else {
            None
        }
    }
}

/// Result of a sync-collection request.
#[derive(Debug, Clone, Default)]
pub struct SyncResponse {
    /// Token to pass to the next sync.
    pub sync_token: String,
    /// Collection metadata, if the server reported the collection itself.
    pub calendar: Option<CalendarCollection>,
    /// Objects created or changed since the previous token.
    pub updated: Vec<CalendarObject>,
    /// Hrefs of objects removed since the previous token.
    pub deleted: Vec<Href>,
}

/// Changes to the calendars of a home set.
#[derive(Debug, Clone, Default)]
pub struct CalendarListSync {
    /// Token to pass to the next sync.
    pub sync_token: String,
    /// Calendars created or changed since the previous token.
    pub updated: Vec<CalendarCollection>,
    /// Hrefs of calendars removed since the previous token.
    pub deleted: Vec<Href>,
}

/// Whether `object` may still matter at `cutoff`.
///
/// Unbounded recurring events always do; bounded ones do while their
/// recurrence has not ended. Other events are judged by their end, or their
/// start if they have no end. Payloads that cannot be read fall back to the
/// modification time, and are kept when that is unknown too.
#[must_use]
pub fn include_for_cutoff(object: &CalendarObject, cutoff: Timestamp) -> bool {
    let data = object.data.as_deref().unwrap_or_default();
    if let Ok(meta) = EventMetadata::extract(data) {
        if meta.recurring {
            return meta.recurrence_end.is_none_or(|until| until >= cutoff);
        }
        if let Some(end) = meta.end {
            return end >= cutoff;
        }
        if let Some(start) = meta.start {
            return start >= cutoff;
        }
    }
    object.last_modified.is_none_or(|modified| modified >= cutoff)
}

impl CalDavClient {
    /// Synchronizes `calendar` (RFC 6578).
    ///
    /// On an initial sync with [`SyncQuery::start_time`] set, objects are
    /// filtered with [`include_for_cutoff`]; objects whose payload the server
    /// withheld are fetched with one multiget first. Objects the multiget no
    /// longer finds are reported as deleted.
    ///
    /// # Errors
    ///
    /// Returns an error tagged with [`Phase::Sync`] if the report fails or a
    /// member cannot be decoded, or with [`Phase::Backfill`] if the multiget
    /// fails. No token is returned on failure.
    #[tracing::instrument(
        skip(self, calendar, query),
        fields(calendar = %calendar, initial = query.sync_token.is_empty())
    )]
    pub async fn sync_calendar(
        &self,
        calendar: &Href,
        query: &SyncQuery,
    ) -> Result<SyncResponse, CalDavError> {
        let cutoff = query.cutoff();
        let (mut response, pending) = self
            .sync_pass(calendar, query, cutoff)
            .await
            .map_err(|e| e.in_phase(Phase::Sync))?;

        if let Some(cutoff) = cutoff {
            if !pending.is_empty() {
                self.backfill(&mut response, pending, cutoff)
                    .await
                    .map_err(|e| e.in_phase(Phase::Backfill))?;
            }
        }

        tracing::debug!(
            updated = response.updated.len(),
            deleted = response.deleted.len(),
            "sync finished"
        );
        Ok(response)
    }

    /// Synchronizes the list of calendars inside `home` (RFC 6578).
    ///
    /// Members that are not calendars, or that the server failed to report,
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error tagged with [`Phase::Sync`] if the report fails or a
    /// calendar carries a malformed `max-resource-size`.
    #[tracing::instrument(skip(self, home, sync_token), fields(home = %home))]
    pub async fn sync_calendar_list(
        &self,
        home: &Href,
        sync_token: &str,
        limit: Option<u32>,
    ) -> Result<CalendarListSync, CalDavError> {
        self.sync_calendar_list_inner(home, sync_token, limit)
            .await
            .map_err(|e| e.in_phase(Phase::Sync))
    }

    async fn sync_calendar_list_inner(
        &self,
        home: &Href,
        sync_token: &str,
        limit: Option<u32>,
    ) -> Result<CalendarListSync, CalDavError> {
        let request = SyncCollectionRequest {
            sync_token: sync_token.to_string(),
            limit: limit.filter(|&limit| limit > 0),
            props: SyncProps::Props(CALENDAR_PROPS.to_vec()),
        };
        let multistatus = self
            .http
            .report(&self.full_url(home), Depth::Zero, request.build()?, &self.cancel)
            .await?;

        let mut changes = CalendarListSync {
            sync_token: multistatus.sync_token.unwrap_or_default(),
            ..Default::default()
        };
        let home_path = Href::from_server(home);
        for item in multistatus.responses {
            if item.href.same_collection(&home_path) {
                continue;
            }
            let href = match item.path() {
                Ok(href) => href.clone(),
                Err(err) if err.is_not_found() => {
                    changes.deleted.push(item.href);
                    continue;
                }
                Err(err) => {
                    tracing::debug!(href = %item.href, error = %err, "skipping member");
                    continue;
                }
            };
            if let Some(calendar) = item.to_calendar_collection(href)? {
                changes.updated.push(calendar);
            }
        }
        Ok(changes)
    }

    /// Runs the sync-collection report and classifies its members. Returns
    /// the objects whose inclusion must wait for their payload.
    async fn sync_pass(
        &self,
        calendar: &Href,
        query: &SyncQuery,
        cutoff: Option<Timestamp>,
    ) -> Result<(SyncResponse, Vec<CalendarObject>), CalDavError> {
        let request = SyncCollectionRequest {
            sync_token: query.sync_token.clone(),
            limit: query.limit.filter(|&limit| limit > 0),
            props: SyncProps::Objects(CalendarDataRequest::new(
                CalendarCompRequest::standard_events(),
            )),
        };
        let url = self.full_url(calendar);
        let multistatus = self
            .http
            .report(&url, Depth::Zero, request.build()?, &self.cancel)
            .await?;

        let mut response = SyncResponse {
            sync_token: multistatus.sync_token.unwrap_or_default(),
            ..Default::default()
        };
        let mut pending = Vec::new();
        let calendar_path = Href::from_server(calendar);

        for item in multistatus.responses {
            let href = match item.path() {
                Ok(href) => href.clone(),
                Err(err) if err.is_not_found() => {
                    response.deleted.push(item.href);
                    continue;
                }
                Err(err) => return Err(err),
            };

            if href.same_collection(&calendar_path) {
                if let Some(collection) = item.to_calendar_collection(href)? {
                    response.calendar = Some(collection);
                }
                continue;
            }

            let object = item.to_calendar_object(href)?;
            match cutoff {
                Some(_) if !object.has_data() => pending.push(object),
                Some(cutoff) if !include_for_cutoff(&object, cutoff) => {}
                _ => response.updated.push(object),
            }
        }

        tracing::debug!(
            members = response.updated.len() + response.deleted.len() + pending.len(),
            deferred = pending.len(),
            "sync pass done"
        );
        Ok((response, pending))
    }

    /// Fetches the payloads of `pending`, then applies the cutoff to them.
    async fn backfill(
        &self,
        response: &mut SyncResponse,
        pending: Vec<CalendarObject>,
        cutoff: Timestamp,
    ) -> Result<(), CalDavError> {
        let hrefs: Vec<Href> = pending.iter().map(|object| object.href.clone()).collect();
        tracing::debug!(count = hrefs.len(), "fetching withheld payloads");

        let multistatus = self
            .multiget_report(&hrefs, CalendarCompRequest::standard_events())
            .await?;

        let mut fetched = HashMap::with_capacity(multistatus.responses.len());
        for item in multistatus.responses {
            if item.is_not_found() {
                fetched.insert(item.href.clone(), None);
                continue;
            }
            let href = item.path()?.clone();
            let object = item.to_calendar_object(href.clone())?;
            fetched.insert(href, Some(object));
        }

        for mut object in pending {
            match fetched.remove(&object.href) {
                Some(None) => {
                    response.deleted.push(object.href);
                    continue;
                }
                Some(Some(found)) => object.absorb(found),
                None => {}
            }
            if include_for_cutoff(&object, cutoff) {
                response.updated.push(object);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    fn event(data: &str) -> CalendarObject {
        CalendarObject {
            data: Some(data.to_string()),
            ..CalendarObject::new(Href::from("/cal/a.ics"))
        }
    }

    #[test]
    fn sync_cutoff_only_for_initial_sync() {
        let mut query = SyncQuery {
            start_time: Some(ts("2023-10-02T12:00:00Z")),
            ..SyncQuery::initial()
        };
        assert!(query.cutoff().is_some());

        query.sync_token = "token-1".to_string();
        assert_eq!(query.cutoff(), None);
    }

    #[test]
    fn sync_include_single_event_by_end_then_start() {
        let cutoff = ts("2023-10-02T12:00:00Z");

        let ended = event("BEGIN:VEVENT\nDTSTART:20231001T100000Z\nDTEND:20231001T110000Z\nEND:VEVENT");
        assert!(!include_for_cutoff(&ended, cutoff));

        let ends_at_cutoff =
            event("BEGIN:VEVENT\nDTSTART:20231002T100000Z\nDTEND:20231002T120000Z\nEND:VEVENT");
        assert!(include_for_cutoff(&ends_at_cutoff, cutoff));

        let starts_later = event("BEGIN:VEVENT\nDTSTART:20231003\nEND:VEVENT");
        assert!(include_for_cutoff(&starts_later, cutoff));

        let started_before = event("BEGIN:VEVENT\nDTSTART:20231001\nEND:VEVENT");
        assert!(!include_for_cutoff(&started_before, cutoff));
    }

    #[test]
    fn sync_include_recurring_events() {
        let cutoff = ts("2023-10-02T12:00:00Z");

        let open = event("BEGIN:VEVENT\nDTSTART:20200101T090000Z\nRRULE:FREQ=DAILY\nEND:VEVENT");
        assert!(include_for_cutoff(&open, cutoff));

        let counted =
            event("BEGIN:VEVENT\nDTSTART:20200101T090000Z\nRRULE:FREQ=DAILY;COUNT=3\nEND:VEVENT");
        assert!(include_for_cutoff(&counted, cutoff));

        let finished = event(
            "BEGIN:VEVENT\nDTSTART:20200101T090000Z\nRRULE:FREQ=DAILY;UNTIL=20230101T000000Z\nEND:VEVENT",
        );
        assert!(!include_for_cutoff(&finished, cutoff));

        let running = event(
            "BEGIN:VEVENT\nDTSTART:20200101T090000Z\nRRULE:FREQ=DAILY;UNTIL=20240101T000000Z\nEND:VEVENT",
        );
        assert!(include_for_cutoff(&running, cutoff));
    }

    #[test]
    fn sync_include_falls_back_to_modification_time() {
        let cutoff = ts("2023-10-02T12:00:00Z");
        let mut object = event("not an event");
        assert!(include_for_cutoff(&object, cutoff));

        object.last_modified = Some(ts("2023-10-02T10:00:00Z"));
        assert!(!include_for_cutoff(&object, cutoff));

        object.last_modified = Some(ts("2023-10-02T14:00:00Z"));
        assert!(include_for_cutoff(&object, cutoff));

        object.data = None;
        assert!(include_for_cutoff(&object, cutoff));
    }
}
