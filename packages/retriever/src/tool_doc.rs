//! The catalog-facing tool descriptor and the field extraction shared by
//! both retrieval backends.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolDescriptor {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
}

/// A name-keyed catalog, ordered so retrieval results are deterministic.
pub type ToolCatalog = BTreeMap<String, ToolDescriptor>;

#[derive(Debug, Clone)]
pub struct ToolDoc {
    pub name: String,
    pub description: String,
    pub required_keys: Vec<String>,
    pub optional_keys: Vec<String>,
}

/// Splits a schema's `properties`/`required` into required and optional
/// key lists, required keys excluded from the optional list.
pub fn extract_schema_fields(schema: &Value) -> (Vec<String>, Vec<String>) {
    let Some(obj) = schema.as_object() else {
        return (Vec::new(), Vec::new());
    };

    let mut optional: Vec<String> = obj
        .get("properties")
        .and_then(|v| v.as_object())
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default();

    let required: Vec<String> = obj
        .get("required")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    if !required.is_empty() {
        let required_set: std::collections::HashSet<&str> =
            required.iter().map(|s| s.as_str()).collect();
        optional.retain(|k| !required_set.contains(k.as_str()));
    }

    (required, optional)
}

pub fn build_docs(catalog: &ToolCatalog) -> Vec<ToolDoc> {
    catalog
        .iter()
        .map(|(name, meta)| {
            let (required_keys, optional_keys) = extract_schema_fields(&meta.input_schema);
            ToolDoc {
                name: name.clone(),
                description: meta.description.clone(),
                required_keys,
                optional_keys,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_required_and_optional() {
        let schema = json!({
            "properties": {"city": {}, "days": {}, "unit": {}},
            "required": ["city", "days"]
        });
        let (req, opt) = extract_schema_fields(&schema);
        assert_eq!(req, vec!["city".to_string(), "days".to_string()]);
        assert_eq!(opt, vec!["unit".to_string()]);
    }

    #[test]
    fn non_object_schema_yields_empty() {
        let (req, opt) = extract_schema_fields(&json!(null));
        assert!(req.is_empty() && opt.is_empty());
    }
}
