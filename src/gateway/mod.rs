//! HTTP gateway for the marketplace web client
//!
//! Thin axum layer over the cache and the portal client:
//! - `handlers` - one handler per route
//! - `prefetch` - concurrent load of every tab for a signed-in user
//! - `token` - user token extraction
//! - `error` - JSON error responses

mod error;
mod handlers;
mod prefetch;
mod token;

pub use error::ApiError;
pub use prefetch::{prefetch_tabs, Tab, PREFETCH_CONCURRENCY};
pub use token::{UserToken, TOKEN_COOKIE};

use axum::extract::Request;
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::cache::CacheManager;
use crate::upstream::PortalApi;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheManager,
    pub api: Arc<dyn PortalApi>,
}

impl AppState {
    pub fn new(cache: CacheManager, api: Arc<dyn PortalApi>) -> Self {
        Self { cache, api }
    }
}

/// Builds the gateway router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/items", get(handlers::items))
        .route("/api/shaders", get(handlers::shaders))
        .route("/api/backs", get(handlers::backs))
        .route("/api/chests", get(handlers::chests))
        .route("/api/listings", get(handlers::listings))
        .route("/api/top-players", get(handlers::top_players))
        .route("/api/skills", post(handlers::skills))
        .route("/api/inventory", post(handlers::inventory))
        .route("/api/udata", post(handlers::user_data))
        .route("/api/my-listings", post(handlers::my_listings))
        .route("/api/friends", post(handlers::friends))
        .route("/api/player-chests", post(handlers::player_chests))
        .route("/api/prefetch", post(handlers::prefetch))
        .route("/api/cache/stats", get(handlers::cache_stats))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

/// Serves the gateway until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("same-origin"));
    response
}
