//! Item catalog normalization
//!
//! The portal is inconsistent about where an item's class restriction lives and
//! how it is encoded: a JSON list, a JSON-encoded string, or plain
//! comma-separated text, under any of several field names. Everything that
//! needs an item's classes goes through `ItemRecord::from_value`.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Item fields the portal has used to carry class restrictions
const CLASS_FIELDS: [&str; 8] = [
    "class",
    "item_class",
    "Class",
    "classes",
    "wearable",
    "wearable_by",
    "usable_by",
    "restricted_to",
];

/// An item reduced to the parts the gateway relies on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemRecord {
    /// Every class named by any class field
    pub classes: BTreeSet<String>,
}

impl ItemRecord {
    /// Normalizes one raw item document; non-objects yield `None`
    pub fn from_value(item: &Value) -> Option<Self> {
        let object = item.as_object()?;

        let classes = CLASS_FIELDS
            .iter()
            .filter_map(|field| object.get(*field))
            .flat_map(parse_class_field)
            .collect();

        Some(Self { classes })
    }
}

/// Returns the item documents in a catalog response
///
/// Accepts a bare list, an object wrapping the list under `items` or
/// `game_items`, or a single item object.
pub fn item_list(catalog: &Value) -> Vec<&Value> {
    match catalog {
        Value::Array(items) => items.iter().collect(),
        Value::Object(object) => {
            let wrapped = object
                .get("items")
                .or_else(|| object.get("game_items"))
                .and_then(Value::as_array);
            match wrapped {
                Some(items) if !items.is_empty() => items.iter().collect(),
                _ if object.contains_key("item_name") => vec![catalog],
                _ => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

/// Parses one class field
///
/// Tries, in order: a structured list, a JSON-encoded string (list or single
/// name), then comma-separated text with stray brackets and quotes removed.
pub fn parse_class_field(field: &Value) -> BTreeSet<String> {
    let mut classes = BTreeSet::new();

    match field {
        Value::Array(values) => collect_names(values, &mut classes),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(values)) => collect_names(&values, &mut classes),
            Ok(Value::String(name)) => insert_trimmed(&name, &mut classes),
            Ok(_) => {}
            Err(_) => {
                for part in text.split(',') {
                    let clean: String = part
                        .trim()
                        .chars()
                        .filter(|c| !matches!(c, '[' | ']' | '"' | '\''))
                        .collect();
                    insert_trimmed(&clean, &mut classes);
                }
            }
        },
        _ => {}
    }

    classes
}

/// Sorted, de-duplicated class names across a whole catalog
pub fn extract_classes(catalog: &Value) -> Vec<String> {
    let classes: BTreeSet<String> = item_list(catalog)
        .into_iter()
        .filter_map(ItemRecord::from_value)
        .flat_map(|record| record.classes)
        .collect();
    classes.into_iter().collect()
}

fn collect_names(values: &[Value], classes: &mut BTreeSet<String>) {
    for value in values {
        if let Some(name) = value.as_str() {
            insert_trimmed(name, classes);
        }
    }
}

fn insert_trimmed(name: &str, classes: &mut BTreeSet<String>) {
    let name = name.trim();
    if !name.is_empty() {
        classes.insert(name.to_string());
    }
}
