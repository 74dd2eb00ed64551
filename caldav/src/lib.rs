// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `CalDAV` client core for keeping a local mirror of remote calendars (RFC 4791).
//!
//! Besides the usual discovery and CRUD operations, the client offers:
//!
//! - [`CalDavClient::sync_calendar`]: RFC 6578 collection sync, optionally
//!   dropping events that ended before a cutoff on the initial sync;
//! - [`CalDavClient::query_range`]: time-range queries split into windows
//!   that are bisected when the server reports `507 Insufficient Storage`;
//! - [`EventMetadata::extract`]: a light scan of event bounds and recurrence.

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    clippy::dbg_macro,
    clippy::indexing_slicing,
    clippy::pedantic
)]
// Allow certain clippy lints that are too restrictive for this crate
#![allow(
    clippy::option_option,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::match_bool
)]

mod cancel;
mod client;
mod config;
mod error;
mod filter;
mod http;
mod ics;
mod range;
mod request;
mod response;
mod sync;
mod types;
mod xml;

pub use crate::cancel::{CancelHandle, CancelSignal};
pub use crate::client::{CalDavClient, DeleteOptions, DiscoverResult, PutOptions};
pub use crate::config::{AuthMethod, CalDavConfig, QueryWindowConfig};
pub use crate::error::{CalDavError, Phase};
pub use crate::filter::{CompFilter, ParamFilter, PropFilter, TextMatch, TimeRange};
pub use crate::ics::{EventMetadata, MetadataError, parse_ics_time, unfold_lines};
pub use crate::range::{TimeWindow, split_windows};
pub use crate::request::{
    CALENDAR_PROPS, CalendarCompRequest, CalendarDataRequest, CalendarMultiGetRequest,
    CalendarQueryRequest, CalendarUpdate, MkCalendarRequest, Prop, PropFindRequest,
    SyncCollectionRequest, SyncProps,
};
pub use crate::response::{MultiStatusResponse, PropStat, Properties, ResponseItem};
pub use crate::sync::{CalendarListSync, SyncQuery, SyncResponse, include_for_cutoff};
pub use crate::types::{CalendarCollection, CalendarObject, ETag, Href};
