//! Failure taxonomy for portal API calls

use reqwest::StatusCode;
use thiserror::Error;

use super::Route;

/// Errors that can occur when calling the game portal API
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// An admin-scoped call was made without `RPG_TOKEN` configured
    #[error("RPG_TOKEN environment variable not set")]
    MissingCredential,

    /// The request did not complete within the configured timeout
    #[error("{route} timed out")]
    Timeout { route: Route },

    /// Connection or protocol failure
    #[error("HTTP request for {route} failed: {source}")]
    Transport {
        route: Route,
        #[source]
        source: reqwest::Error,
    },

    /// The portal answered with a non-2xx status
    #[error("{route} returned HTTP {status}")]
    Status { route: Route, status: StatusCode },

    /// The portal answered 2xx with an `error` field in the document
    #[error("{route} reported an error: {message}")]
    Application { route: Route, message: String },

    /// The response body was not JSON
    #[error("Failed to parse {route} response: {source}")]
    MalformedBody {
        route: Route,
        #[source]
        source: serde_json::Error,
    },
}

impl UpstreamError {
    /// True when the portal answered 404 for this route and credential
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }

    /// True for failures worth retrying later: network trouble and 5xx answers
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => true,
            Self::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}
