//! marketgate library
//!
//! Caching gateway between the marketplace web client and the game portal API.
//! Exposed as a library so the binary and the integration tests share it.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod gateway;
pub mod refresh;
pub mod upstream;
