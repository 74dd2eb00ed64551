// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `CalDAV` client for calendar operations.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::{Method, Response};

use crate::cancel::CancelSignal;
use crate::config::CalDavConfig;
use crate::error::{CalDavError, Phase};
use crate::http::{Depth, HttpClient};
use crate::request::{
    CALENDAR_PROPS, CalendarCompRequest, CalendarDataRequest, CalendarMultiGetRequest,
    CalendarQueryRequest, CalendarUpdate, MkCalendarRequest, Prop, PropFindRequest,
};
use crate::response::{MultiStatusResponse, Properties, parse_http_date};
use crate::types::{CalendarCollection, CalendarObject, ETag, Href};

/// `CalDAV` client for accessing and managing calendars on `CalDAV` servers.
///
/// # Example
///
/// ```ignore
/// use calsync_caldav::{AuthMethod, CalDavClient, CalDavConfig, SyncQuery};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CalDavConfig {
///     base_url: "https://caldav.example.com".to_string(),
///     calendar_home: "/dav/calendars/user/".to_string(),
///     auth: AuthMethod::Basic {
///         username: "user".to_string(),
///         password: "pass".to_string(),
///     },
///     ..Default::default()
/// };
///
/// let client = CalDavClient::new(config)?;
/// let home = client.discover().await?.calendar_home;
/// for calendar in client.list_calendars(&home).await? {
///     let changes = client.sync_calendar(&calendar.href, &SyncQuery::initial()).await?;
///     println!("{}: {} objects", calendar.href, changes.updated.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CalDavClient {
    pub(crate) http: Arc<HttpClient>,
    pub(crate) config: CalDavConfig,
    pub(crate) cancel: CancelSignal,
}

impl CalDavClient {
    /// Creates a new `CalDAV` client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or HTTP client
    /// initialization fails.
    pub fn new(config: CalDavConfig) -> Result<Self, CalDavError> {
        config.validate()?;
        let http = HttpClient::new(config.clone())?;
        Ok(Self {
            http: Arc::new(http),
            config,
            cancel: CancelSignal::default(),
        })
    }

    /// Returns a client sharing this one's connection pool whose requests
    /// are bound to `cancel`.
    #[must_use]
    pub fn with_cancel(&self, cancel: CancelSignal) -> Self {
        Self {
            http: Arc::clone(&self.http),
            config: self.config.clone(),
            cancel,
        }
    }

    /// The configuration this client was built from.
    #[must_use]
    pub const fn config(&self) -> &CalDavConfig {
        &self.config
    }

    /// Discovers `CalDAV` support, the current principal and its calendar
    /// home set.
    ///
    /// The configured `calendar_home` is used when the server does not
    /// advertise a home set.
    ///
    /// # Errors
    ///
    /// Returns an error tagged with [`Phase::Discovery`] if a request fails
    /// for a reason other than a missing property.
    #[tracing::instrument(skip(self))]
    pub async fn discover(&self) -> Result<DiscoverResult, CalDavError> {
        self.discover_inner()
            .await
            .map_err(|e| e.in_phase(Phase::Discovery))
    }

    async fn discover_inner(&self) -> Result<DiscoverResult, CalDavError> {
        let fallback_home = Href::new(self.config.calendar_home.clone());

        let url = self.full_url(&fallback_home);
        let resp = self
            .http
            .execute(self.http.build_request(Method::OPTIONS, &url), &self.cancel)
            .await?;
        let supports_calendars = header_str(&resp, "DAV")
            .is_some_and(|dav| dav.split(',').any(|c| c.trim() == "calendar-access"));

        let current_user_principal = match self.find_current_user_principal().await {
            Ok(principal) => Some(principal),
            Err(err) if recoverable_in_discovery(&err) => {
                tracing::debug!(error = %err, "no current-user-principal");
                None
            }
            Err(err) => return Err(err),
        };

        let home_owner = current_user_principal
            .clone()
            .unwrap_or_else(|| fallback_home.clone());
        let calendar_home = match self.find_calendar_home_set(&home_owner).await {
            Ok(home) => home,
            Err(err) if recoverable_in_discovery(&err) => {
                tracing::debug!(error = %err, "falling back to the configured calendar home");
                fallback_home
            }
            Err(err) => return Err(err),
        };

        Ok(DiscoverResult {
            supports_calendars,
            current_user_principal,
            calendar_home,
        })
    }

    /// Finds the principal of the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::Auth`] if the server reports the request as
    /// unauthenticated, and [`CalDavError::InvalidResponse`] if the property
    /// is missing.
    pub async fn find_current_user_principal(&self) -> Result<Href, CalDavError> {
        let props = self
            .propfind_single(&Href::default(), &[Prop::CurrentUserPrincipal])
            .await?;
        if props.unauthenticated {
            return Err(CalDavError::Auth(
                "current-user-principal is unauthenticated".to_string(),
            ));
        }
        props.current_user_principal.ok_or_else(|| {
            CalDavError::InvalidResponse("missing current-user-principal".to_string())
        })
    }

    /// Finds the calendar home set of `principal`.
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::InvalidResponse`] if the property is missing.
    pub async fn find_calendar_home_set(&self, principal: &Href) -> Result<Href, CalDavError> {
        self.propfind_single(principal, &[Prop::CalendarHomeSet])
            .await?
            .calendar_home_set
            .ok_or_else(|| CalDavError::InvalidResponse("missing calendar-home-set".to_string()))
    }

    /// Lists the calendar collections inside `home`.
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails or a member is malformed.
    pub async fn list_calendars(&self, home: &Href) -> Result<Vec<CalendarCollection>, CalDavError> {
        let body = PropFindRequest::with_props(CALENDAR_PROPS).build()?;
        let multistatus = self
            .http
            .propfind(&self.full_url(home), Depth::One, body, &self.cancel)
            .await?;

        let home_path = Href::from_server(home);
        let mut calendars = Vec::new();
        for item in multistatus.responses {
            let href = item.path()?;
            if href.same_collection(&home_path) {
                continue;
            }
            if let Some(calendar) = item.to_calendar_collection(href.clone())? {
                calendars.push(calendar);
            }
        }
        Ok(calendars)
    }

    /// Fetches the metadata of one calendar collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails or `href` is not a calendar.
    pub async fn get_calendar(&self, href: &Href) -> Result<CalendarCollection, CalDavError> {
        let body = PropFindRequest::with_props(CALENDAR_PROPS).build()?;
        let multistatus = self
            .http
            .propfind(&self.full_url(href), Depth::Zero, body, &self.cancel)
            .await?;
        let item = multistatus.responses.first().ok_or_else(|| {
            CalDavError::InvalidResponse(format!("empty PROPFIND response for {href}"))
        })?;
        let path = item.path()?.clone();
        item.to_calendar_collection(path)?
            .ok_or_else(|| CalDavError::InvalidResponse(format!("{href} is not a calendar")))
    }

    /// Updates properties of a calendar collection and returns its new state.
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::InvalidInput`] if `update` sets nothing, and an
    /// error if the server rejects any of the properties.
    pub async fn update_calendar(
        &self,
        href: &Href,
        update: &CalendarUpdate,
    ) -> Result<CalendarCollection, CalDavError> {
        if update.is_empty() {
            return Err(CalDavError::InvalidInput(
                "calendar update sets no property".to_string(),
            ));
        }

        let multistatus = self
            .http
            .proppatch(&self.full_url(href), update.build()?, &self.cancel)
            .await?;
        let [item] = multistatus.responses.as_slice() else {
            return Err(CalDavError::InvalidResponse(format!(
                "expected one PROPPATCH response for {href}, got {}",
                multistatus.responses.len()
            )));
        };
        item.path()?;
        if let Some(failed) = item.prop_stats.iter().find(|p| !p.is_success()) {
            return Err(CalDavError::InvalidResponse(format!(
                "PROPPATCH of {href} failed: {}",
                failed.status
            )));
        }

        self.get_calendar(href).await
    }

    /// Creates a calendar collection.
    ///
    /// # Errors
    ///
    /// Returns an error if MKCALENDAR fails.
    pub async fn mkcalendar(
        &self,
        href: &Href,
        request: &MkCalendarRequest,
    ) -> Result<(), CalDavError> {
        let method = Method::from_bytes(b"MKCALENDAR")
            .map_err(|e| CalDavError::Http(format!("Invalid method: {e}")))?;
        let req = self
            .http
            .build_request(method, &self.full_url(href))
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(request.build()?);
        self.http.execute(req, &self.cancel).await?;
        Ok(())
    }

    /// Gets a single calendar object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist or the server answers
    /// with something other than `text/calendar`.
    pub async fn get_object(&self, href: &Href) -> Result<CalendarObject, CalDavError> {
        let req = self
            .http
            .build_request(Method::GET, &self.full_url(href))
            .header("Accept", "text/calendar");
        let resp = self.http.execute(req, &self.cancel).await?;

        let content_type = header_str(&resp, "Content-Type").unwrap_or_default();
        if !is_calendar_media_type(content_type) {
            return Err(CalDavError::InvalidResponse(format!(
                "unexpected content type {content_type:?} for {href}"
            )));
        }

        let mut object = object_from_headers(href, &resp)?;
        object.data = Some(HttpClient::text(resp, &self.cancel).await?);
        Ok(object)
    }

    /// Stores a calendar object, creating or replacing it.
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::PreconditionFailed`] if a condition in
    /// `options` does not hold, or another error if the PUT fails.
    pub async fn put_object(
        &self,
        href: &Href,
        data: &str,
        options: &PutOptions,
    ) -> Result<CalendarObject, CalDavError> {
        let mut req = self
            .http
            .build_request(Method::PUT, &self.full_url(href))
            .header("Content-Type", "text/calendar; charset=utf-8")
            .body(data.to_string());
        if let Some(etag) = &options.if_match {
            req = HttpClient::if_match(req, etag);
        }
        if let Some(etag) = &options.if_none_match {
            req = HttpClient::if_none_match(req, etag);
        }

        let resp = self.http.execute(req, &self.cancel).await?;
        let mut object = object_from_headers(href, &resp)?;
        object.content_length = u64::try_from(data.len()).ok();
        object.data = Some(data.to_string());
        Ok(object)
    }

    /// Deletes a calendar object.
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::NotFound`] if the object does not exist,
    /// [`CalDavError::PreconditionFailed`] if its `ETag` does not match.
    pub async fn delete_object(
        &self,
        href: &Href,
        options: &DeleteOptions,
    ) -> Result<(), CalDavError> {
        let mut req = self.http.build_request(Method::DELETE, &self.full_url(href));
        if let Some(etag) = &options.if_match {
            req = HttpClient::if_match(req, etag);
        }
        self.http.execute(req, &self.cancel).await?;
        Ok(())
    }

    /// Runs a calendar-query REPORT against `calendar`.
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::InsufficientStorage`] if the server refuses to
    /// return that many results, or another error if the query fails.
    pub async fn query(
        &self,
        calendar: &Href,
        request: &CalendarQueryRequest,
    ) -> Result<Vec<CalendarObject>, CalDavError> {
        let multistatus = self
            .http
            .report(&self.full_url(calendar), Depth::One, request.build()?, &self.cancel)
            .await?;
        decode_objects(multistatus)
    }

    /// Retrieves several calendar objects of one collection by href.
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::NotFound`] if any of the objects is gone, or
    /// another error if the multiget fails.
    pub async fn multiget(
        &self,
        hrefs: &[Href],
        comp: CalendarCompRequest,
    ) -> Result<Vec<CalendarObject>, CalDavError> {
        if hrefs.is_empty() {
            return Ok(Vec::new());
        }
        let multistatus = self.multiget_report(hrefs, comp).await?;
        decode_objects(multistatus)
    }

    /// Sends a calendar-multiget REPORT to the collection of the first href.
    pub(crate) async fn multiget_report(
        &self,
        hrefs: &[Href],
        comp: CalendarCompRequest,
    ) -> Result<MultiStatusResponse, CalDavError> {
        let first = hrefs.first().ok_or_else(|| {
            CalDavError::InvalidInput("multiget requires at least one href".to_string())
        })?;

        let mut request = CalendarMultiGetRequest::new(CalendarDataRequest::new(comp));
        for href in hrefs {
            request.add_href(href.clone());
        }
        self.http
            .report(
                &self.full_url(&first.parent()),
                Depth::One,
                request.build()?,
                &self.cancel,
            )
            .await
    }

    /// Lists the objects of a calendar.
    ///
    /// Without `fetch_data` only metadata is returned; with it the payloads
    /// are fetched with one multiget.
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND or the multiget fails.
    pub async fn list_objects(
        &self,
        calendar: &Href,
        fetch_data: bool,
    ) -> Result<Vec<CalendarObject>, CalDavError> {
        let body = PropFindRequest::with_props(&[
            Prop::ResourceType,
            Prop::GetETag,
            Prop::GetLastModified,
            Prop::GetContentLength,
        ])
        .build()?;
        let multistatus = self
            .http
            .propfind(&self.full_url(calendar), Depth::One, body, &self.cancel)
            .await?;

        let calendar_path = Href::from_server(calendar);
        let mut objects = Vec::new();
        for item in multistatus.responses {
            let href = item.path()?;
            if href.same_collection(&calendar_path) {
                continue;
            }
            let is_collection = item
                .props()
                .resource_type
                .is_some_and(|types| !types.is_empty());
            if is_collection {
                continue;
            }
            objects.push(item.to_calendar_object(href.clone())?);
        }

        if fetch_data && !objects.is_empty() {
            let hrefs: Vec<Href> = objects.iter().map(|o| o.href.clone()).collect();
            let mut fetched: HashMap<Href, CalendarObject> = self
                .multiget(&hrefs, CalendarCompRequest::full())
                .await?
                .into_iter()
                .map(|o| (o.href.clone(), o))
                .collect();
            for object in &mut objects {
                if let Some(found) = fetched.remove(&object.href) {
                    object.absorb(found);
                }
            }
        }

        tracing::debug!(calendar = %calendar, count = objects.len(), "listed objects");
        Ok(objects)
    }

    /// Builds full URL from href. Absolute URLs are used as is.
    pub(crate) fn full_url(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            return href.to_string();
        }
        format!("{}{}", self.config.base_url.trim_end_matches('/'), href)
    }

    async fn propfind_single(&self, href: &Href, props: &[Prop]) -> Result<Properties, CalDavError> {
        let body = PropFindRequest::with_props(props).build()?;
        let multistatus = self
            .http
            .propfind(&self.full_url(href), Depth::Zero, body, &self.cancel)
            .await?;
        let item = multistatus.responses.first().ok_or_else(|| {
            CalDavError::InvalidResponse(format!("empty PROPFIND response for {href:?}"))
        })?;
        item.path()?;
        Ok(item.props())
    }
}

/// Result of `CalDAV` server discovery.
#[derive(Debug, Clone)]
pub struct DiscoverResult {
    /// Whether the server advertises `calendar-access`.
    pub supports_calendars: bool,
    /// The principal of the authenticated user, if the server reports one.
    pub current_user_principal: Option<Href>,
    /// The calendar home set href.
    pub calendar_home: Href,
}

/// Conditions for [`CalDavClient::put_object`].
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Only replace the object if its current `ETag` matches.
    pub if_match: Option<ETag>,
    /// Only store the object if no current `ETag` matches; `*` means "only
    /// create".
    pub if_none_match: Option<String>,
}

impl PutOptions {
    /// Options that only create a new object.
    #[must_use]
    pub fn create_only() -> Self {
        Self {
            if_match: None,
            if_none_match: Some("*".to_string()),
        }
    }

    /// Options that only replace the object at `etag`.
    #[must_use]
    pub const fn replace(etag: ETag) -> Self {
        Self {
            if_match: Some(etag),
            if_none_match: None,
        }
    }
}

/// Conditions for [`CalDavClient::delete_object`].
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Only delete the object if its current `ETag` matches.
    pub if_match: Option<ETag>,
}

fn recoverable_in_discovery(err: &CalDavError) -> bool {
    matches!(
        err,
        CalDavError::NotFound(_) | CalDavError::InvalidResponse(_) | CalDavError::Status { .. }
    )
}

fn decode_objects(multistatus: MultiStatusResponse) -> Result<Vec<CalendarObject>, CalDavError> {
    multistatus
        .responses
        .iter()
        .map(|item| {
            let href = item.path()?.clone();
            item.to_calendar_object(href)
        })
        .collect()
}

fn header_str<'a>(resp: &'a Response, name: &str) -> Option<&'a str> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn is_calendar_media_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("text/calendar"))
}

/// Reads object metadata from response headers. `Location` overrides `href`.
fn object_from_headers(href: &Href, resp: &Response) -> Result<CalendarObject, CalDavError> {
    let href = header_str(resp, "Location").map_or_else(|| href.clone(), Href::from_server);
    let content_length = header_str(resp, "Content-Length")
        .map(|len| {
            len.parse::<u64>().map_err(|e| {
                CalDavError::InvalidResponse(format!("invalid Content-Length {len:?}: {e}"))
            })
        })
        .transpose()?;
    let last_modified = header_str(resp, "Last-Modified")
        .map(parse_http_date)
        .transpose()?;
    Ok(CalendarObject {
        href,
        last_modified,
        content_length,
        etag: HttpClient::extract_etag(resp),
        data: None,
    })
}
