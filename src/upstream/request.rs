//! Request bodies for the portal API
//!
//! Every portal call is a POST of one JSON object carrying a `route`
//! discriminator, a `token`, and route-specific fields.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// Portal routes used by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    GameItems,
    Shaders,
    Backs,
    Chests,
    Skills,
    Listings,
    TopPlayers,
    PlayerItems,
    UserData,
    MyListings,
    Friends,
    PlayerChests,
}

impl Route {
    /// Route identifier sent in the `route` field
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::GameItems => "get_game_items",
            Route::Shaders => "get_shaders",
            Route::Backs => "get_backs",
            Route::Chests => "get_chests",
            Route::Skills => "get_skills",
            Route::Listings => "get_listings",
            Route::TopPlayers => "get_top_players",
            Route::PlayerItems => "get_player_items",
            Route::UserData => "get_udata",
            Route::MyListings => "get_my_listings",
            Route::Friends => "get_friends",
            Route::PlayerChests => "get_player_chests",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which token a request is sent with
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// The process-wide administrative token
    Admin,
    /// A token supplied by the calling user
    User(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Admin => f.write_str("Admin"),
            Credential::User(_) => f.write_str("User(..)"),
        }
    }
}

/// A single portal call before the token is resolved
#[derive(Debug, Clone, PartialEq)]
pub struct PortalRequest {
    pub route: Route,
    pub credential: Credential,
    params: Map<String, Value>,
}

impl PortalRequest {
    /// Request sent with the administrative token
    pub fn admin(route: Route) -> Self {
        Self {
            route,
            credential: Credential::Admin,
            params: Map::new(),
        }
    }

    /// Request sent with a caller's token
    pub fn user(route: Route, token: impl Into<String>) -> Self {
        Self {
            route,
            credential: Credential::User(token.into()),
            params: Map::new(),
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.params.insert("page".to_string(), Value::from(page));
        self
    }

    pub fn slot(mut self, slot: impl Into<String>) -> Self {
        self.params.insert("slot".to_string(), Value::String(slot.into()));
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.params.insert("class".to_string(), Value::String(class.into()));
        self
    }

    /// Route-specific fields, without `route` and `token`
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Full JSON body for the given resolved token
    pub fn body(&self, token: &str) -> Value {
        let mut body = Map::with_capacity(self.params.len() + 2);
        body.insert("route".to_string(), Value::from(self.route.as_str()));
        body.insert("token".to_string(), Value::from(token));
        for (key, value) in &self.params {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }
}

/// Marketplace listing filters
///
/// Empty strings and `any` mean "no filter", matching what the web client sends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ListingsQuery {
    pub page: Option<u32>,
    pub slot: Option<String>,
    pub class: Option<String>,
}

impl ListingsQuery {
    pub fn page_number(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn slot_filter(&self) -> Option<String> {
        normalize_filter(self.slot.as_deref())
    }

    pub fn class_filter(&self) -> Option<String> {
        normalize_filter(self.class.as_deref())
    }

    /// True for the unfiltered first page kept under `listings:page1`
    pub fn is_overview(&self) -> bool {
        self.page_number() == 1 && self.slot_filter().is_none() && self.class_filter().is_none()
    }

    /// Builds the admin-scoped request for these filters
    pub fn to_request(&self) -> PortalRequest {
        let mut request = PortalRequest::admin(Route::Listings).page(self.page_number());
        if let Some(slot) = self.slot_filter() {
            request = request.slot(slot);
        }
        if let Some(class) = self.class_filter() {
            request = request.class(class);
        }
        request
    }
}

fn normalize_filter(value: Option<&str>) -> Option<String> {
    let value = value?.trim().to_lowercase();
    match value.as_str() {
        "" | "any" => None,
        _ => Some(value),
    }
}
