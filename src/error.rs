//! Error types for coursecap
//!
//! The pipeline distinguishes exactly one fatal failure (no credential
//! obtainable through any fallback strategy) from the recoverable failures
//! that occur while crawling. Recoverable failures (a listing endpoint
//! returning garbage, a metadata fetch 500ing, an artifact URL timing out)
//! are handled at the point of occurrence with placeholders and diagnostics;
//! they never surface as `Error` values from the public API.

use thiserror::Error;

/// Result type alias for coursecap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for coursecap
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "base_url")
        key: Option<String>,
    },

    /// No credential could be obtained through any discovery strategy.
    ///
    /// This is the only fatal failure in the pipeline; it aborts the run
    /// before any crawling begins.
    #[error("no credential obtainable: all discovery strategies exhausted")]
    CredentialUnavailable,

    /// Network error from the underlying HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (export file emission)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A transport request could not be constructed (e.g., bad method token)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Convenience constructor for configuration errors
    pub fn config(message: impl Into<String>, key: Option<&str>) -> Self {
        Self::Config {
            message: message.into(),
            key: key.map(String::from),
        }
    }

    /// Whether this error aborts the whole run.
    ///
    /// Everything except a missing credential is handled upstream with
    /// skip-and-continue semantics; this exists for callers that want to
    /// branch on the taxonomy without matching variants.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::CredentialUnavailable)
    }
}
