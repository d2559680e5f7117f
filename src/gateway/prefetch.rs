//! Parallel prefetch of every tab in the signed-in view
//!
//! The tabs are loaded concurrently with a bounded number of portal calls in
//! flight. A failing tab reports its own error and never hides the others.

use futures::stream::{self, StreamExt};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::handlers::cached_dataset;
use super::{ApiError, AppState};
use crate::refresh::Dataset;
use crate::upstream::{PortalRequest, Route};

/// Maximum portal calls in flight for one prefetch
pub const PREFETCH_CONCURRENCY: usize = 4;

/// One tab of the web client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Profile,
    Inventory,
    MyListings,
    Friends,
    PlayerChests,
    Items,
    Shaders,
    Backs,
    Chests,
}

impl Tab {
    pub const ALL: [Tab; 9] = [
        Tab::Profile,
        Tab::Inventory,
        Tab::MyListings,
        Tab::Friends,
        Tab::PlayerChests,
        Tab::Items,
        Tab::Shaders,
        Tab::Backs,
        Tab::Chests,
    ];

    /// Field name in the prefetch response
    pub fn name(&self) -> &'static str {
        match self {
            Tab::Profile => "udata",
            Tab::Inventory => "inventory",
            Tab::MyListings => "my_listings",
            Tab::Friends => "friends",
            Tab::PlayerChests => "player_chests",
            Tab::Items => "items",
            Tab::Shaders => "shaders",
            Tab::Backs => "backs",
            Tab::Chests => "chests",
        }
    }

    async fn load(self, state: &AppState, token: &str) -> Result<Value, ApiError> {
        let user = |route| PortalRequest::user(route, token);
        let request = match self {
            Tab::Profile => user(Route::UserData),
            Tab::Inventory => user(Route::PlayerItems).page(1),
            Tab::MyListings => user(Route::MyListings).page(1),
            Tab::Friends => user(Route::Friends),
            Tab::PlayerChests => user(Route::PlayerChests),
            Tab::Items => return cached_dataset(state, &Dataset::Items).await,
            Tab::Shaders => return cached_dataset(state, &Dataset::Shaders).await,
            Tab::Backs => return cached_dataset(state, &Dataset::Backs).await,
            Tab::Chests => return cached_dataset(state, &Dataset::Chests).await,
        };
        Ok(state.api.send(request).await?)
    }
}

async fn load_tab(tab: Tab, state: &AppState, token: &str) -> (Tab, Result<Value, ApiError>) {
    (tab, tab.load(state, token).await)
}

/// Loads all tabs and joins on every result
///
/// Returns `{"tabs": {name: document | {"error": message}}, "failed": [names]}`.
pub async fn prefetch_tabs(state: &AppState, token: &str) -> Value {
    let loads: Vec<_> = Tab::ALL
        .iter()
        .map(|&tab| load_tab(tab, state, token))
        .collect();
    let results: Vec<(Tab, Result<Value, ApiError>)> = stream::iter(loads)
        .buffered(PREFETCH_CONCURRENCY)
        .collect()
        .await;

    let mut tabs = Map::new();
    let mut failed = Vec::new();
    for (tab, result) in results {
        match result {
            Ok(value) => {
                tabs.insert(tab.name().to_string(), value);
            }
            Err(e) => {
                warn!("Prefetch of {} failed: {}", tab.name(), e);
                tabs.insert(tab.name().to_string(), json!({"error": e.to_string()}));
                failed.push(tab.name());
            }
        }
    }

    info!(
        "Prefetched {} tabs ({} failed)",
        Tab::ALL.len() - failed.len(),
        failed.len()
    );
    json!({"tabs": tabs, "failed": failed})
}
