//! Small readers over a stage-1 draft JSON string, ported from the free
//! functions at the top of `subtask_planner.py`.

use serde_json::Value;

use taskforge_retriever::ToolCatalog;

pub fn extract_tool_names_from_stage1(draft_json: &str) -> Vec<String> {
    let Ok(parsed) = serde_json::from_str::<Value>(draft_json) else { return Vec::new() };
    let Some(nodes) = parsed.get("nodes").and_then(|v| v.as_array()) else { return Vec::new() };

    let mut names = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for node in nodes {
        if node.get("executor").and_then(|v| v.as_str()) != Some("tool") {
            continue;
        }
        if let Some(name) = node.get("tool_name").and_then(|v| v.as_str()) {
            if !name.is_empty() && seen.insert(name.to_string()) {
                names.push(name.to_string());
            }
        }
    }
    names
}

pub fn extract_missing_tool_queries(draft_json: &str) -> Vec<String> {
    let Ok(parsed) = serde_json::from_str::<Value>(draft_json) else { return Vec::new() };
    let Some(missing) = parsed.get("missing_tools").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut queries = Vec::new();
    for item in missing {
        let mut parts = Vec::new();
        if let Some(cap) = item.get("capability").and_then(|v| v.as_str()) {
            let cap = cap.trim();
            if !cap.is_empty() {
                parts.push(cap.to_string());
            }
        }
        if let Some(keywords) = item.get("keywords").and_then(|v| v.as_array()) {
            for k in keywords {
                let s = match k {
                    Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                };
                if !s.is_empty() {
                    parts.push(s);
                }
            }
        }
        let query = parts.join(" ").trim().to_string();
        if !query.is_empty() {
            queries.push(query);
        }
    }
    queries
}

pub fn filter_tools_by_name(tools: &ToolCatalog, names: &[String]) -> ToolCatalog {
    if tools.is_empty() || names.is_empty() {
        return ToolCatalog::new();
    }
    names
        .iter()
        .filter_map(|name| tools.get(name).map(|meta| (name.clone(), meta.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_tool_names_deduped_in_order() {
        let draft = json!({
            "nodes": [
                {"executor": "tool", "tool_name": "weather"},
                {"executor": "llm"},
                {"executor": "tool", "tool_name": "weather"},
                {"executor": "tool", "tool_name": "excel"},
            ]
        })
        .to_string();
        assert_eq!(extract_tool_names_from_stage1(&draft), vec!["weather", "excel"]);
    }

    #[test]
    fn extracts_missing_tool_queries() {
        let draft = json!({
            "missing_tools": [
                {"capability": "send email", "keywords": ["smtp", "mail"]},
                {"capability": "", "keywords": []},
            ]
        })
        .to_string();
        assert_eq!(extract_missing_tool_queries(&draft), vec!["send email smtp mail"]);
    }

    #[test]
    fn malformed_json_yields_empty() {
        assert!(extract_tool_names_from_stage1("not json").is_empty());
        assert!(extract_missing_tool_queries("not json").is_empty());
    }
}
