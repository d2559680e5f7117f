//! Cache module for the slow-changing game datasets
//!
//! This module provides a cache manager that keeps the latest copy of each
//! dataset in memory and mirrors it to the filesystem. The disk copy is only a
//! warm-start aid: whatever is in memory always takes precedence.

mod manager;

pub use manager::{has_data, sanitize_key, CacheManager, CacheStat};
