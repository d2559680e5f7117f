//! Route handlers
//!
//! Catalog routes answer from the cache and fall back to an admin-scoped portal
//! call on a miss. Account routes always call the portal with the user's token.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use super::prefetch::prefetch_tabs;
use super::{ApiError, AppState, UserToken};
use crate::cache::CacheStat;
use crate::refresh::Dataset;
use crate::upstream::{ListingsQuery, PortalRequest, Route, UpstreamError};

/// Body of paged account routes
#[derive(Debug, Default, Deserialize)]
pub struct PageBody {
    pub page: Option<u32>,
}

impl PageBody {
    fn page(body: Option<Json<PageBody>>) -> u32 {
        body.and_then(|Json(b)| b.page).unwrap_or(1).max(1)
    }
}

/// Body of the skills route
#[derive(Debug, Deserialize)]
pub struct SkillsBody {
    pub class: String,
}

/// Serves a dataset from the cache, fetching it with the admin token on a miss
///
/// A successful fallback is stored; a failed one becomes `Unavailable`.
pub(super) async fn cached_dataset(state: &AppState, dataset: &Dataset) -> Result<Value, ApiError> {
    let key = dataset.cache_key();
    if let Some(value) = state.cache.get(&key, None) {
        return Ok(value);
    }

    info!("Cache miss for {}, fetching from upstream", key);
    match dataset.fetch(state.api.as_ref()).await {
        Ok(value) => {
            if dataset.accepts(&value) {
                state.cache.set(&key, value.clone());
            }
            Ok(value)
        }
        Err(e) => {
            if matches!(e, UpstreamError::MissingCredential) {
                error!("Cannot fetch {}: {}", key, e);
            } else {
                warn!("Fallback fetch for {} failed: {}", key, e);
            }
            Err(ApiError::Unavailable)
        }
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub async fn items(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    cached_dataset(&state, &Dataset::Items).await.map(Json)
}

pub async fn shaders(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    cached_dataset(&state, &Dataset::Shaders).await.map(Json)
}

pub async fn backs(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    cached_dataset(&state, &Dataset::Backs).await.map(Json)
}

pub async fn chests(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    cached_dataset(&state, &Dataset::Chests).await.map(Json)
}

/// Marketplace listings; the unfiltered first page comes from the cache
pub async fn listings(
    State(state): State<AppState>,
    Query(query): Query<ListingsQuery>,
) -> Result<Json<Value>, ApiError> {
    if query.is_overview() {
        return cached_dataset(&state, &Dataset::MarketOverview).await.map(Json);
    }
    Ok(Json(state.api.fetch_listings(&query).await?))
}

pub async fn top_players(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let request = PortalRequest::admin(Route::TopPlayers);
    Ok(Json(state.api.send(request).await?))
}

/// Skills for one class
///
/// Served from `skills:<class>` when the background refresh has it, otherwise
/// fetched with the caller's token and cached for everyone.
pub async fn skills(
    State(state): State<AppState>,
    token: Option<UserToken>,
    Json(body): Json<SkillsBody>,
) -> Result<Json<Value>, ApiError> {
    let class = body.class.trim();
    if class.is_empty() {
        return Err(ApiError::BadRequest("class is required".to_string()));
    }

    let dataset = Dataset::Skills(class.to_string());
    let key = dataset.cache_key();
    if let Some(value) = state.cache.get(&key, None) {
        return Ok(Json(value));
    }

    let token = token.ok_or(ApiError::Unauthorized)?;
    let request = PortalRequest::user(Route::Skills, token.0).class(class);
    let value = state.api.send(request).await?;
    if dataset.accepts(&value) {
        state.cache.set(&key, value.clone());
    }
    Ok(Json(value))
}

pub async fn inventory(
    State(state): State<AppState>,
    token: UserToken,
    body: Option<Json<PageBody>>,
) -> Result<Json<Value>, ApiError> {
    let request = PortalRequest::user(Route::PlayerItems, token.0).page(PageBody::page(body));
    Ok(Json(state.api.send(request).await?))
}

pub async fn user_data(
    State(state): State<AppState>,
    token: UserToken,
) -> Result<Json<Value>, ApiError> {
    let request = PortalRequest::user(Route::UserData, token.0);
    Ok(Json(state.api.send(request).await?))
}

pub async fn my_listings(
    State(state): State<AppState>,
    token: UserToken,
    body: Option<Json<PageBody>>,
) -> Result<Json<Value>, ApiError> {
    let request = PortalRequest::user(Route::MyListings, token.0).page(PageBody::page(body));
    Ok(Json(state.api.send(request).await?))
}

pub async fn friends(
    State(state): State<AppState>,
    token: UserToken,
) -> Result<Json<Value>, ApiError> {
    let request = PortalRequest::user(Route::Friends, token.0);
    Ok(Json(state.api.send(request).await?))
}

pub async fn player_chests(
    State(state): State<AppState>,
    token: UserToken,
) -> Result<Json<Value>, ApiError> {
    let request = PortalRequest::user(Route::PlayerChests, token.0);
    Ok(Json(state.api.send(request).await?))
}

/// Loads every tab of the signed-in view in one round trip
pub async fn prefetch(State(state): State<AppState>, token: UserToken) -> Json<Value> {
    Json(prefetch_tabs(&state, token.as_str()).await)
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<BTreeMap<String, CacheStat>> {
    Json(state.cache.stats())
}

