//! Metadata filters.

use serde_json::{Map, Value};

use crate::search::types::Filters;

/// Parses a stored metadata blob into a JSON object.
///
/// Anything that is not a JSON object is treated as absent metadata, which
/// fails every non-empty filter set.
pub fn parse_metadata(raw: Option<&str>) -> Option<Map<String, Value>> {
    match serde_json::from_str(raw?) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Whether `metadata` satisfies every filter.
///
/// Values compare as case-insensitive strings. Numbers and booleans compare
/// by their JSON text; nulls, arrays and objects never match.
pub fn matches_filters(metadata: Option<&Map<String, Value>>, filters: &Filters) -> bool {
    if filters.is_empty() {
        return true;
    }
    let Some(metadata) = metadata else {
        return false;
    };

    filters.iter().all(|(key, expected)| {
        let actual = match metadata.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
            _ => return false,
        };
        actual.to_lowercase() == expected.to_lowercase()
    })
}
