//! Builds the compact per-tool summaries embedded in the stage-1 prompt,
//! ported from `_build_stage1_tools_payload`.

use serde_json::{json, Value};

use taskforge_retriever::ToolCatalog;

pub fn build_stage1_tools_payload(tools: &ToolCatalog) -> Vec<Value> {
    tools
        .iter()
        .map(|(name, meta)| {
            let properties = meta
                .input_schema
                .get("properties")
                .and_then(|v| v.as_object());
            let required: std::collections::HashSet<&str> = meta
                .input_schema
                .get("required")
                .and_then(|v| v.as_array())
                .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
                .unwrap_or_default();

            let mut properties_summary = Vec::new();
            if let Some(props) = properties {
                for (key, prop) in props {
                    let mut field = serde_json::Map::new();
                    field.insert("name".to_string(), json!(key));
                    if let Some(t) = prop.get("type") {
                        field.insert("type".to_string(), t.clone());
                    }
                    if let Some(d) = prop.get("description") {
                        field.insert("description".to_string(), d.clone());
                    }
                    if let Some(e) = prop.get("enum") {
                        field.insert("enum".to_string(), e.clone());
                    }
                    field.insert("required".to_string(), json!(required.contains(key.as_str())));
                    properties_summary.push(Value::Object(field));
                }
            }

            json!({
                "name": name,
                "description": meta.description,
                "properties": properties_summary,
            })
        })
        .collect()
}

pub fn full_tool_descriptors_json(tools: &ToolCatalog) -> String {
    serde_json::to_string(tools).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_retriever::ToolDescriptor;

    #[test]
    fn builds_per_tool_summary_with_required_flag() {
        let mut catalog = ToolCatalog::new();
        catalog.insert(
            "weather".to_string(),
            ToolDescriptor {
                description: "weather forecast".to_string(),
                input_schema: serde_json::json!({
                    "properties": {"city": {"type": "string"}, "days": {"type": "integer"}},
                    "required": ["city"]
                }),
            },
        );
        let payload = build_stage1_tools_payload(&catalog);
        assert_eq!(payload.len(), 1);
        let props = payload[0]["properties"].as_array().unwrap();
        let city = props.iter().find(|p| p["name"] == "city").unwrap();
        assert_eq!(city["required"], true);
        let days = props.iter().find(|p| p["name"] == "days").unwrap();
        assert_eq!(days["required"], false);
    }
}
