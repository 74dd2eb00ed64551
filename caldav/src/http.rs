// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP client wrapper with authentication, status mapping and cancellation.

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};

use crate::cancel::CancelSignal;
use crate::config::{AuthMethod, CalDavConfig};
use crate::error::CalDavError;
use crate::response::MultiStatusResponse;
use crate::types::{ETag, Href};

/// Value of the `Depth` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// The resource itself.
    Zero,
    /// The resource and its immediate children.
    One,
}

impl Depth {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
        }
    }
}

/// HTTP client for `CalDAV` operations.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    config: CalDavConfig,
}

impl HttpClient {
    /// Creates a new HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn new(config: CalDavConfig) -> Result<Self, CalDavError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()?;
        Ok(Self { client, config })
    }

    /// Builds a request with authentication headers.
    pub fn build_request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut req = self.client.request(method, url);

        match &self.config.auth {
            AuthMethod::Basic { username, password } => {
                req = req.basic_auth(username, Some(password));
            }
            AuthMethod::Bearer { token } => {
                req = req.bearer_auth(token);
            }
            AuthMethod::None => {}
        }

        req
    }

    /// Sends a request and maps error statuses.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, is cancelled, or the server
    /// answers with a non-success status.
    pub async fn execute(
        &self,
        req: RequestBuilder,
        cancel: &CancelSignal,
    ) -> Result<Response, CalDavError> {
        let resp = cancel
            .guard(async { req.send().await.map_err(CalDavError::from) })
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let href = Href::from(resp.url().path());
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(CalDavError::Auth(format!("{status} for {href}")))
            }
            StatusCode::NOT_FOUND => Err(CalDavError::NotFound(href)),
            StatusCode::PRECONDITION_FAILED => Err(CalDavError::PreconditionFailed(
                resp.headers()
                    .get("ETag")
                    .and_then(|v| v.to_str().ok())
                    .map_or_else(
                        || format!("resource at {href} was modified"),
                        |etag| format!("current ETag of {href} is {etag}"),
                    ),
            )),
            StatusCode::INSUFFICIENT_STORAGE => Err(CalDavError::InsufficientStorage(href)),
            status => {
                let body = cancel
                    .guard(async { resp.text().await.map_err(CalDavError::from) })
                    .await
                    .unwrap_or_else(|_| "Unable to read response".to_string());
                Err(CalDavError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    /// Reads the response body as text.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or is cancelled.
    pub async fn text(resp: Response, cancel: &CancelSignal) -> Result<String, CalDavError> {
        cancel
            .guard(async { resp.text().await.map_err(CalDavError::from) })
            .await
    }

    /// Sends a `WebDAV` request with an XML body and decodes the multistatus
    /// answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the answer is not a valid
    /// multistatus document.
    pub async fn dav_request(
        &self,
        method: &str,
        url: &str,
        depth: Option<Depth>,
        body: String,
        cancel: &CancelSignal,
    ) -> Result<MultiStatusResponse, CalDavError> {
        tracing::debug!(method, url, ?depth, "sending WebDAV request");

        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| CalDavError::Http(format!("Invalid method: {e}")))?;
        let mut req = self
            .build_request(method, url)
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(body);
        if let Some(depth) = depth {
            req = req.header("Depth", depth.as_str());
        }

        let resp = self.execute(req, cancel).await?;
        let xml = Self::text(resp, cancel).await?;
        MultiStatusResponse::from_xml(&xml)
    }

    /// Sends a `PROPFIND`.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::dav_request`].
    pub async fn propfind(
        &self,
        url: &str,
        depth: Depth,
        body: String,
        cancel: &CancelSignal,
    ) -> Result<MultiStatusResponse, CalDavError> {
        self.dav_request("PROPFIND", url, Some(depth), body, cancel)
            .await
    }

    /// Sends a `REPORT`.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::dav_request`].
    pub async fn report(
        &self,
        url: &str,
        depth: Depth,
        body: String,
        cancel: &CancelSignal,
    ) -> Result<MultiStatusResponse, CalDavError> {
        self.dav_request("REPORT", url, Some(depth), body, cancel)
            .await
    }

    /// Sends a `PROPPATCH`.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::dav_request`].
    pub async fn proppatch(
        &self,
        url: &str,
        body: String,
        cancel: &CancelSignal,
    ) -> Result<MultiStatusResponse, CalDavError> {
        self.dav_request("PROPPATCH", url, None, body, cancel).await
    }

    /// Adds If-Match header for conditional updates.
    pub fn if_match(req: RequestBuilder, etag: &ETag) -> RequestBuilder {
        req.header("If-Match", etag.to_header())
    }

    /// Adds If-None-Match header for conditional creation.
    ///
    /// `*` is sent as is; any other value is quoted as an entity tag.
    pub fn if_none_match(req: RequestBuilder, etag: &str) -> RequestBuilder {
        if etag == "*" {
            req.header("If-None-Match", "*")
        } else {
            req.header("If-None-Match", ETag::from(etag).to_header())
        }
    }

    /// Extracts `ETag` from response headers.
    pub fn extract_etag(resp: &Response) -> Option<ETag> {
        resp.headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(ETag::from_header)
            .filter(|etag| !etag.is_empty())
    }
}
