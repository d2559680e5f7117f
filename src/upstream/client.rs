//! Portal API client
//!
//! Sends `PortalRequest`s to the single portal endpoint and classifies the
//! outcome. The `PortalApi` trait is the seam the refresh worker and the HTTP
//! layer depend on, so either can run against a fake portal.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{Credential, ListingsQuery, PortalRequest, Route, UpstreamError};

/// Default portal endpoint
pub const DEFAULT_API_URL: &str = "https://streamarenarpg.com/portal/portal_api.php";

/// Default bound on a single portal call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Operations offered by the game portal
///
/// Implementors only provide `send`; the named operations build their requests
/// with the administrative credential.
#[async_trait]
pub trait PortalApi: Send + Sync {
    /// Sends one request and returns the parsed document
    async fn send(&self, request: PortalRequest) -> Result<Value, UpstreamError>;

    async fn fetch_items(&self) -> Result<Value, UpstreamError> {
        self.send(PortalRequest::admin(Route::GameItems)).await
    }

    async fn fetch_shaders(&self) -> Result<Value, UpstreamError> {
        self.send(PortalRequest::admin(Route::Shaders)).await
    }

    async fn fetch_backs(&self) -> Result<Value, UpstreamError> {
        self.send(PortalRequest::admin(Route::Backs)).await
    }

    async fn fetch_chests(&self) -> Result<Value, UpstreamError> {
        self.send(PortalRequest::admin(Route::Chests)).await
    }

    async fn fetch_skills(&self, class: &str) -> Result<Value, UpstreamError> {
        self.send(PortalRequest::admin(Route::Skills).class(class)).await
    }

    async fn fetch_listings(&self, query: &ListingsQuery) -> Result<Value, UpstreamError> {
        self.send(query.to_request()).await
    }
}

/// Client for the game portal API
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    api_url: String,
    admin_token: Option<String>,
}

impl UpstreamClient {
    /// Creates a client with a per-request timeout
    pub fn new(
        api_url: impl Into<String>,
        admin_token: Option<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url, admin_token))
    }

    /// Creates a client around an existing HTTP client
    pub fn with_client(
        client: Client,
        api_url: impl Into<String>,
        admin_token: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            admin_token: admin_token.filter(|t| !t.is_empty()),
        }
    }

    /// Whether admin-scoped calls can be made at all
    pub fn has_admin_credential(&self) -> bool {
        self.admin_token.is_some()
    }

    fn resolve_token<'a>(&'a self, credential: &'a Credential) -> Result<&'a str, UpstreamError> {
        match credential {
            Credential::Admin => self
                .admin_token
                .as_deref()
                .ok_or(UpstreamError::MissingCredential),
            Credential::User(token) => Ok(token.as_str()),
        }
    }
}

#[async_trait]
impl PortalApi for UpstreamClient {
    async fn send(&self, request: PortalRequest) -> Result<Value, UpstreamError> {
        let route = request.route;
        let token = self.resolve_token(&request.credential)?;
        let body = request.body(token);

        let response = self
            .client
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|source| classify_transport(route, source))?;

        let status = response.status();
        debug!("{} answered HTTP {}", route, status);
        if !status.is_success() {
            return Err(UpstreamError::Status { route, status });
        }

        let text = response
            .text()
            .await
            .map_err(|source| classify_transport(route, source))?;
        let document: Value = serde_json::from_str(&text)
            .map_err(|source| UpstreamError::MalformedBody { route, source })?;

        if let Some(message) = reported_error(&document) {
            return Err(UpstreamError::Application { route, message });
        }

        Ok(document)
    }
}

fn classify_transport(route: Route, source: reqwest::Error) -> UpstreamError {
    if source.is_timeout() {
        UpstreamError::Timeout { route }
    } else {
        UpstreamError::Transport { route, source }
    }
}

/// Extracts a truthy `error` field from a response document
fn reported_error(document: &Value) -> Option<String> {
    match document.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    type Seen = Arc<Mutex<Vec<Value>>>;

    /// Local stand-in for the portal: answers according to the `route` field
    async fn portal(State(seen): State<Seen>, Json(body): Json<Value>) -> Response {
        seen.lock().push(body.clone());
        match body["route"].as_str().unwrap_or_default() {
            "get_game_items" => Json(json!({"items": [{"item_name": "Sword"}]})).into_response(),
            "get_skills" => StatusCode::NOT_FOUND.into_response(),
            "get_friends" => Json(json!({"error": "invalid token"})).into_response(),
            "get_backs" => "<html>oops</html>".into_response(),
            "get_chests" => {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Json(json!({"chests": []})).into_response()
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }

    async fn spawn_portal() -> (String, Seen) {
        let seen: Seen = Arc::default();
        let app = Router::new().route("/", post(portal)).with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{}/", addr), seen)
    }

    fn client(url: &str, token: Option<&str>) -> UpstreamClient {
        UpstreamClient::new(url, token.map(str::to_string), Duration::from_millis(200))
            .expect("Client should build")
    }

    #[tokio::test]
    async fn test_fetch_items_sends_route_and_admin_token() {
        let (url, seen) = spawn_portal().await;

        let items = client(&url, Some("admin")).fetch_items().await.expect("Items");

        assert_eq!(items["items"][0]["item_name"], "Sword");
        assert_eq!(
            seen.lock()[0],
            json!({"route": "get_game_items", "token": "admin"})
        );
    }

    #[tokio::test]
    async fn test_not_found_is_typed() {
        let (url, seen) = spawn_portal().await;

        let err = client(&url, Some("admin"))
            .fetch_skills("mage")
            .await
            .expect_err("Skills should fail");

        assert!(err.is_not_found());
        assert_eq!(seen.lock()[0]["class"], "mage");
    }

    #[tokio::test]
    async fn test_error_field_is_application_error() {
        let (url, _seen) = spawn_portal().await;

        let err = client(&url, None)
            .send(PortalRequest::user(Route::Friends, "user"))
            .await
            .expect_err("Friends should fail");

        assert!(matches!(err, UpstreamError::Application { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let (url, _seen) = spawn_portal().await;

        let err = client(&url, Some("admin"))
            .fetch_backs()
            .await
            .expect_err("Backs should fail");

        assert!(matches!(err, UpstreamError::MalformedBody { .. }));
    }

    #[tokio::test]
    async fn test_slow_portal_times_out() {
        let (url, _seen) = spawn_portal().await;

        let err = client(&url, Some("admin"))
            .fetch_chests()
            .await
            .expect_err("Chests should time out");

        assert!(matches!(err, UpstreamError::Timeout { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let (url, _seen) = spawn_portal().await;

        let err = client(&url, Some("admin"))
            .fetch_shaders()
            .await
            .expect_err("Shaders should fail");

        assert!(matches!(err, UpstreamError::Status { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_admin_call_without_token_fails_at_call_time() {
        let (url, seen) = spawn_portal().await;
        let client = client(&url, Some(""));

        assert!(!client.has_admin_credential());
        let err = client.fetch_items().await.expect_err("No token");

        assert!(matches!(err, UpstreamError::MissingCredential));
        assert!(seen.lock().is_empty(), "Nothing should reach the portal");
    }

    #[tokio::test]
    async fn test_unreachable_portal_is_transport_error() {
        let err = client("http://127.0.0.1:9/", Some("admin"))
            .fetch_items()
            .await
            .expect_err("Nothing listens on port 9");

        assert!(err.is_transient());
    }

    #[test]
    fn test_reported_error_ignores_falsy_values() {
        assert_eq!(reported_error(&json!({"error": null})), None);
        assert_eq!(reported_error(&json!({"error": false})), None);
        assert_eq!(reported_error(&json!({"error": ""})), None);
        assert_eq!(reported_error(&json!({"items": []})), None);
        assert_eq!(
            reported_error(&json!({"error": "Not allowed"})),
            Some("Not allowed".to_string())
        );
    }
}
