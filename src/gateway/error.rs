//! HTTP error responses
//!
//! Every failure reaches the web client as `{"status": "error", "message": ...}`
//! with a status code chosen from the failure kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::upstream::UpstreamError;

/// Errors returned by gateway handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// No user token in the request
    #[error("Not authenticated")]
    Unauthorized,

    /// The request body or query is unusable
    #[error("{0}")]
    BadRequest(String),

    /// Cache miss whose fallback fetch also failed
    #[error("Service temporarily unavailable")]
    Unavailable,

    /// A direct portal call failed
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(e) => match e {
                UpstreamError::MissingCredential => StatusCode::INTERNAL_SERVER_ERROR,
                e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
                UpstreamError::Status { status, .. }
                    if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN =>
                {
                    StatusCode::UNAUTHORIZED
                }
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Upstream(e) if e.is_transient() => "Upstream API unavailable".to_string(),
            ApiError::Upstream(UpstreamError::MissingCredential) => self.to_string(),
            ApiError::Upstream(e) => format!("Upstream API error: {}", e),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        let body = Json(json!({
            "status": "error",
            "message": self.message(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::Route;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::from(UpstreamError::MissingCredential).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(UpstreamError::Timeout { route: Route::Listings }).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(UpstreamError::Status {
                route: Route::Friends,
                status: StatusCode::FORBIDDEN,
            })
            .status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(UpstreamError::Application {
                route: Route::Friends,
                message: "bad".to_string(),
            })
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_portal_server_error_is_unavailable() {
        let err = ApiError::from(UpstreamError::Status {
            route: Route::TopPlayers,
            status: StatusCode::BAD_GATEWAY,
        });
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.message(), "Upstream API unavailable");
    }

    #[test]
    fn test_upstream_message_is_prefixed() {
        let err = ApiError::from(UpstreamError::Status {
            route: Route::Listings,
            status: StatusCode::NOT_FOUND,
        });
        assert_eq!(
            err.message(),
            "Upstream API error: get_listings returned HTTP 404 Not Found"
        );
    }
}
