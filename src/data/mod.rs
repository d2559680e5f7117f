//! Game data shapes the gateway inspects
//!
//! Portal documents are passed through as opaque JSON. The only place the
//! gateway looks inside them is the item catalog, to learn which classes exist.

pub mod catalog;

pub use catalog::{extract_classes, item_list, parse_class_field, ItemRecord};
