//! Error types for the tracker API client.
//!
//! # Design
//! Each variant is a category a caller must be able to tell apart.
//! `NoTokensAvailable` is split out of `Auth` so callers can prompt the user
//! to provision a token. `Api` carries everything needed to diagnose a
//! non-2xx response, while `MalformedResponse` covers 2xx responses whose body
//! is not usable (bad XML or a missing required element).

use thiserror::Error;

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors returned by the tracker client, codec and auth providers.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Credentials were rejected or the token response was unusable.
    #[error("tracker authentication failed: {0}")]
    Auth(String),

    /// The account exists but has never had an API token provisioned.
    #[error("no API tokens available: {0}")]
    NoTokensAvailable(String),

    /// No HTTP response was obtained (connect, DNS, read failure).
    #[error("transport error: {0}")]
    Transport(#[from] ureq::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} {message} for {url}: {body}")]
    Api {
        status: u16,
        message: String,
        url: String,
        body: String,
    },

    /// A success response whose body is not well-formed XML or lacks a
    /// required element.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A caller-supplied value was rejected before any request was made.
    #[error("invalid value: {0}")]
    Validation(String),

    /// Client configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl TrackerError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        TrackerError::MalformedResponse(msg.into())
    }

    /// Whether this is an API error carrying HTTP 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackerError::Api { status: 404, .. })
    }
}

impl From<quick_xml::Error> for TrackerError {
    fn from(err: quick_xml::Error) -> Self {
        TrackerError::MalformedResponse(err.to_string())
    }
}
