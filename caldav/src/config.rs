// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use jiff::SignedDuration;

use crate::error::CalDavError;

/// `CalDAV` authentication method.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(tag = "type")]
pub enum AuthMethod {
    /// No authentication.
    #[serde(rename = "none")]
    #[default]
    None,
    /// Basic authentication (username/password).
    #[serde(rename = "basic")]
    Basic {
        /// Username for authentication.
        username: String,
        /// Password for authentication.
        password: String,
    },
    /// Bearer token authentication (OAuth).
    #[serde(rename = "bearer")]
    Bearer {
        /// Bearer token.
        token: String,
    },
}

/// `CalDAV` server configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CalDavConfig {
    /// Base URL of the `CalDAV` server.
    pub base_url: String,
    /// Calendar home path (e.g., /dav/calendars/user/).
    #[serde(default)]
    pub calendar_home: String,
    /// Authentication method.
    #[serde(default)]
    pub auth: AuthMethod,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Window sizes used by time-range queries.
    #[serde(default)]
    pub query_window: QueryWindowConfig,
}

/// Window sizes for splitting calendar time-range queries.
///
/// Servers such as iCloud cap the number of expanded instances returned by a
/// single calendar-query, so long ranges are issued window by window and a
/// window is halved when the server reports it as too large.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct QueryWindowConfig {
    /// Width of the windows a long range is split into, in days.
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    /// Windows at or below this width are never split further, in hours.
    #[serde(default = "default_min_window_hours")]
    pub min_window_hours: u32,
}

const fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("calsync-caldav/", env!("CARGO_PKG_VERSION")).to_string()
}

const fn default_window_days() -> u32 {
    90
}

const fn default_min_window_hours() -> u32 {
    24
}

impl Default for CalDavConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            calendar_home: String::new(),
            auth: AuthMethod::default(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            query_window: QueryWindowConfig::default(),
        }
    }
}

impl Default for QueryWindowConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            min_window_hours: default_min_window_hours(),
        }
    }
}

impl CalDavConfig {
    /// Checks that the configuration can be used to build a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing or malformed, or if the
    /// query window settings are inconsistent.
    pub fn validate(&self) -> Result<(), CalDavError> {
        if self.base_url.trim().is_empty() {
            return Err(CalDavError::Config("base_url must not be empty".to_string()));
        }
        reqwest::Url::parse(&self.base_url)
            .map_err(|e| CalDavError::Config(format!("invalid base_url: {e}")))?;
        self.query_window.validate()
    }
}

impl QueryWindowConfig {
    /// Width of a default window.
    #[must_use]
    pub fn window(&self) -> SignedDuration {
        SignedDuration::from_hours(i64::from(self.window_days) * 24)
    }

    /// Width at or below which a window is never bisected.
    #[must_use]
    pub fn min_window(&self) -> SignedDuration {
        SignedDuration::from_hours(i64::from(self.min_window_hours))
    }

    fn validate(&self) -> Result<(), CalDavError> {
        if self.window_days == 0 || self.min_window_hours == 0 {
            return Err(CalDavError::Config(
                "query window sizes must be positive".to_string(),
            ));
        }
        if self.min_window() > self.window() {
            return Err(CalDavError::Config(
                "min_window_hours must not exceed window_days".to_string(),
            ));
        }
        Ok(())
    }
}
