// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use crate::types::Href;

/// `CalDAV` client errors.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CalDavError {
    /// Connection, timeout or body transfer failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The server answered with a status the operation cannot handle.
    #[error("Unexpected HTTP status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, if it could be read.
        body: String,
    },

    /// XML parsing/writing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// Authentication error.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(Href),

    /// Precondition failed (`ETag` mismatch).
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// The server refused to return that many results (HTTP 507).
    #[error("Insufficient storage: server result limit exceeded for {0}")]
    InsufficientStorage(Href),

    /// Invalid response from server.
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// The caller passed arguments that cannot be turned into a request.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The operation was cancelled or its deadline expired.
    #[error("Operation cancelled")]
    Cancelled,

    /// A failure tagged with the phase of the operation it happened in.
    #[error("{phase} failed: {source}")]
    Phase {
        /// Which phase failed.
        phase: Phase,
        /// The underlying failure.
        source: Box<CalDavError>,
    },
}

/// The phase of a high-level operation, used to tag failures.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Principal / calendar home set discovery.
    Discovery,
    /// A windowed calendar-query.
    WindowedQuery,
    /// The sync-collection pass.
    Sync,
    /// The multiget that fills in payloads withheld by a sync response.
    Backfill,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery => f.write_str("discovery"),
            Self::WindowedQuery => f.write_str("windowed query"),
            Self::Sync => f.write_str("sync"),
            Self::Backfill => f.write_str("backfill"),
        }
    }
}

impl CalDavError {
    /// Tags the error with a phase, unless it already carries one.
    #[must_use]
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            Self::Phase { .. } => self,
            other => Self::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// Returns the phase this error was tagged with.
    #[must_use]
    pub const fn phase(&self) -> Option<Phase> {
        match self {
            Self::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Returns the underlying error, looking through phase tags.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Phase { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether the underlying error is a missing resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), Self::NotFound(_))
    }

    /// Whether the underlying error is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), Self::Cancelled)
    }
}

impl From<reqwest::Error> for CalDavError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<quick_xml::Error> for CalDavError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e.to_string())
    }
}

impl From<std::io::Error> for CalDavError {
    fn from(e: std::io::Error) -> Self {
        Self::Xml(format!("IO error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_phase_wraps_once() {
        let err = CalDavError::Cancelled
            .in_phase(Phase::Backfill)
            .in_phase(Phase::Sync);

        assert_eq!(err.phase(), Some(Phase::Backfill));
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "backfill failed: Operation cancelled");
    }

    #[test]
    fn error_root_cause_without_phase_is_self() {
        let err = CalDavError::NotFound(Href::from("/cal/a.ics"));
        assert!(err.is_not_found());
        assert_eq!(err.phase(), None);
    }
}
