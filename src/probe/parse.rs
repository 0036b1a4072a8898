//! Tool catalog normalization.
//!
//! Servers return their catalog either as a bare list or wrapped in an
//! object under `tools` or `data`. Everything is normalized into
//! `Vec<Tool>` here; unrecognized shapes yield `None` so callers can treat
//! them as "no catalog at this path".

use serde::Deserialize;
use serde_json::Value;

use crate::registry::Tool;

/// Accepted catalog response shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogShape {
    List(Vec<Value>),
    Wrapped(WrappedCatalog),
}

#[derive(Debug, Deserialize)]
struct WrappedCatalog {
    #[serde(default)]
    tools: Option<Vec<Value>>,
    #[serde(default)]
    data: Option<Vec<Value>>,
}

/// Normalize a catalog body. `None` means the shape was not recognized.
pub fn normalize_catalog(body: &Value) -> Option<Vec<Tool>> {
    let shape = CatalogShape::deserialize(body).ok()?;
    let entries = match shape {
        CatalogShape::List(entries) => entries,
        CatalogShape::Wrapped(WrappedCatalog { tools: Some(t), .. }) => t,
        CatalogShape::Wrapped(WrappedCatalog { data: Some(d), .. }) => d,
        CatalogShape::Wrapped(_) => Vec::new(),
    };

    let total = entries.len();
    let tools: Vec<Tool> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<Tool>(entry).ok())
        .collect();
    if tools.len() < total {
        tracing::debug!(
            skipped = total - tools.len(),
            kept = tools.len(),
            "dropped malformed tool entries"
        );
    }
    Some(tools)
}

/// Whether a body is a recognized catalog with at least one tool.
pub fn has_tools(body: &Value) -> bool {
    normalize_catalog(body).is_some_and(|tools| !tools.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_list() {
        let tools = normalize_catalog(&json!([{"name": "a"}, {"name": "b"}])).unwrap();
        assert_eq!(tools.len(), 2);
    }

    #[test]
    fn test_tools_field() {
        let tools = normalize_catalog(&json!({"tools": [{"name": "a", "category": "fs"}]})).unwrap();
        assert_eq!(tools[0].category, "fs");
    }

    #[test]
    fn test_data_field() {
        let tools = normalize_catalog(&json!({"data": [{"name": "a"}]})).unwrap();
        assert_eq!(tools.len(), 1);
    }

    #[test]
    fn test_tools_field_wins_over_data() {
        let tools =
            normalize_catalog(&json!({"tools": [{"name": "t"}], "data": [{"name": "d"}]})).unwrap();
        assert_eq!(tools[0].name, "t");
    }

    #[test]
    fn test_object_without_catalog_is_empty() {
        let tools = normalize_catalog(&json!({"status": "ok"})).unwrap();
        assert!(tools.is_empty());
        assert!(!has_tools(&json!({"status": "ok"})));
    }

    #[test]
    fn test_unrecognized_shape() {
        assert!(normalize_catalog(&json!("hello")).is_none());
        assert!(normalize_catalog(&json!({"tools": "nope"})).is_none());
    }

    #[test]
    fn test_malformed_entries_dropped() {
        let tools = normalize_catalog(&json!([{"name": "ok"}, {"description": "no name"}, 42])).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "ok");
    }
}
