//! Error taxonomy for a harvest run.
//!
//! Only run-level failures live here. Per-file routing problems are recorded
//! in the route report and never escalate, and a watcher timeout is an
//! outcome rather than an error.

use std::path::PathBuf;

/// All errors that can abort a harvest run (or a single page, depending on
/// the configured page-failure policy).
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Browser connection failed: {0}")]
    Connection(String),

    #[error("Navigation to {url} failed after {attempts} attempt(s): {reason}")]
    Navigation {
        url: String,
        attempts: usize,
        reason: String,
    },

    #[error("Schema extraction failed on {url}: {reason}")]
    Extraction { url: String, reason: String },

    #[error("Browser command failed: {0}")]
    Browser(String),

    #[error("Staging directory {}: {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarvestError {
    /// Errors that stop the whole run regardless of the page-failure policy.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::Config(_)
                | HarvestError::Connection(_)
                | HarvestError::Staging { .. }
                | HarvestError::Io(_)
        )
    }
}

/// Convenience result type.
pub type HarvestResult<T> = Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_level_errors_are_not_run_fatal() {
        let nav = HarvestError::Navigation {
            url: "https://example.com".into(),
            attempts: 4,
            reason: "timed out".into(),
        };
        assert!(!nav.is_run_fatal());
        let extraction = HarvestError::Extraction {
            url: "https://example.com".into(),
            reason: "no result".into(),
        };
        assert!(!extraction.is_run_fatal());
        assert!(HarvestError::Connection("refused".into()).is_run_fatal());
    }

    #[test]
    fn test_navigation_message_names_attempts() {
        let err = HarvestError::Navigation {
            url: "https://example.com/d".into(),
            attempts: 4,
            reason: "net::ERR_NAME_NOT_RESOLVED".into(),
        };
        assert_eq!(
            err.to_string(),
            "Navigation to https://example.com/d failed after 4 attempt(s): net::ERR_NAME_NOT_RESOLVED"
        );
    }
}
