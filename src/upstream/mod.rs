//! Game portal API access
//!
//! The portal exposes a single endpoint; every operation is a JSON POST
//! distinguished by its `route` field. Calls are made either with the
//! administrative token held by the client or with a token supplied by the user.

mod client;
mod error;
mod request;

pub use client::{PortalApi, UpstreamClient, DEFAULT_API_URL, DEFAULT_TIMEOUT};
pub use error::UpstreamError;
pub use request::{Credential, ListingsQuery, PortalRequest, Route};
