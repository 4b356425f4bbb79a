//! Error taxonomy for the harvest pipeline.
//!
//! `FetchError` and `ValidationRejected` are per-page and per-record outcomes
//! that the orchestrator counts rather than propagates. `PipelineError` covers
//! setup failures that prevent a run from starting at all.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal classification of a page fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The site refused the request: auth wall, captcha or a block status
    #[error("blocked fetching {url}: {reason}")]
    Blocked {
        /// Page that was refused
        url: String,
        /// Signal that identified the block
        reason: String,
        /// Identity slot the server refused, once the retry loop knows it
        slot: Option<usize>,
    },

    /// The page does not exist
    #[error("not found: {url} (HTTP {status})")]
    NotFound {
        /// Missing page
        url: String,
        /// HTTP status returned
        status: u16,
    },

    /// Retries ran out on timeouts, connection errors or server errors
    #[error("transient failure fetching {url} after {attempts} attempt(s): {reason}")]
    Transient {
        /// Page being fetched
        url: String,
        /// Attempts made before giving up
        attempts: u32,
        /// Last failure seen
        reason: String,
    },

    /// The response could not be read as a page
    #[error("malformed page at {url}: {reason}")]
    Malformed {
        /// Page that was fetched
        url: String,
        /// What was wrong with it
        reason: String,
    },
}

impl FetchError {
    /// Fieldless kind of this error.
    #[must_use]
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Blocked { .. } => FetchErrorKind::Blocked,
            Self::NotFound { .. } => FetchErrorKind::NotFound,
            Self::Transient { .. } => FetchErrorKind::Transient,
            Self::Malformed { .. } => FetchErrorKind::Malformed,
        }
    }
}

/// Fieldless view of [`FetchError`], used in page reports and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// See [`FetchError::Blocked`]
    Blocked,
    /// See [`FetchError::NotFound`]
    NotFound,
    /// See [`FetchError::Transient`]
    Transient,
    /// See [`FetchError::Malformed`]
    Malformed,
}

/// Why a raw record did not become a `JobRecord`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationRejected {
    /// Missing title, company or a well-formed source URL
    #[error("structurally invalid record: {0}")]
    Structural(String),

    /// Title too short or carrying a banned token
    #[error("spam record: {0}")]
    Spam(String),
}

/// Errors that stop a harvest from being set up.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration failed validation
    #[error("configuration error: {0}")]
    Config(#[from] jobharvest_core::ConfigError),

    /// Identity pool or browser setup failed
    #[error("browser error: {0}")]
    Browser(#[from] jobharvest_browser::BrowserError),

    /// The HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// A search URL could not be built
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A CSS selector in the selector set does not parse
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector {
        /// Selector as written
        selector: String,
        /// Parser message
        reason: String,
    },
}

/// Result type for pipeline setup.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_kind() {
        let err = FetchError::Transient {
            url: "https://www.linkedin.com/jobs/search".to_string(),
            attempts: 3,
            reason: "timeout".to_string(),
        };
        assert_eq!(err.kind(), FetchErrorKind::Transient);
        assert!(err.to_string().contains("after 3 attempt(s)"));
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&FetchErrorKind::NotFound).expect("serialize kind");
        assert_eq!(json, "\"not_found\"");
    }

    #[test]
    fn test_rejection_display() {
        let err = ValidationRejected::Spam("banned token 'URGENT'".to_string());
        assert_eq!(err.to_string(), "spam record: banned token 'URGENT'");
    }
}
