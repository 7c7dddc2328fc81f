//! Three independent truncation policies, kept as three functions rather
//! than one configurable one because they are used at different points and
//! must never be conflated: display truncation never touches stored state,
//! stored truncation mutates the outputs map for tool nodes, and prompt
//! truncation applies only to an outgoing LLM prompt string.
//!
//! Ported from the stored-truncation cascade in the Python reference
//! implementation's `node/utils.py::truncate_node_output`.

use serde_json::{Map, Value};

const OVERHEAD_PER_FIELD: usize = 50;
const UNIFORM_TOLERANCE: f64 = 0.10;

/// Truncates `text` for display/logging only. Never mutates stored state.
pub fn truncate_display_string(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_length).collect();
    format!(
        "{truncated}... [truncated, original length: {}]",
        text.chars().count()
    )
}

/// Truncates an arbitrary value for display/logging. Strings are cut with
/// `truncate_display_string`; other types that exceed the limit once
/// JSON-encoded are wrapped in a preview envelope instead of being cut
/// mid-structure.
pub fn truncate_display_value(value: &Value, max_length: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_display_string(s, max_length)),
        other => {
            let encoded = serde_json::to_string(other).unwrap_or_default();
            if encoded.chars().count() <= max_length {
                return other.clone();
            }
            let preview: String = encoded.chars().take(max_length).collect();
            serde_json::json!({
                "_truncated": true,
                "_original_type": type_name(other),
                "_original_length": encoded.chars().count(),
                "_preview": preview,
            })
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Truncates a prompt string destined for an LLM node's outgoing request.
/// Distinct budget and suffix from both display and stored truncation.
pub fn truncate_llm_input(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}\n... [input truncated]")
}

fn json_len(value: &Value) -> usize {
    serde_json::to_string(value).map(|s| s.chars().count()).unwrap_or(0)
}

/// Truncates a tool node's output for storage into the run's outputs map,
/// preserving shape (all keys present) over raw size wherever possible.
///
/// Cascade, each tried only if the previous one doesn't fit within
/// `max_chars` (allowing `UNIFORM_TOLERANCE` slack):
/// 1. Uniform per-field budget, if that budget is at least 100 chars.
/// 2. Half-budget truncation applied only to fields whose encoded length
///    exceeds `max_chars / fields.len()`.
/// 3. Whole-value JSON-encode-then-cut.
pub fn truncate_node_output(value: &Value, max_chars: usize) -> Value {
    match value {
        Value::String(s) => {
            if s.chars().count() <= max_chars {
                value.clone()
            } else {
                Value::String(s.chars().take(max_chars).collect())
            }
        }
        Value::Object(map) => truncate_object(map, max_chars),
        Value::Array(arr) => truncate_array(arr, max_chars),
        other => {
            if json_len(other) <= max_chars {
                other.clone()
            } else {
                Value::String(
                    serde_json::to_string(other)
                        .unwrap_or_default()
                        .chars()
                        .take(max_chars)
                        .collect(),
                )
            }
        }
    }
}

fn truncate_object(map: &Map<String, Value>, max_chars: usize) -> Value {
    if json_len(&Value::Object(map.clone())) <= max_chars || map.is_empty() {
        return Value::Object(map.clone());
    }

    let n = map.len();
    let per_field_budget = (max_chars as isize - (n * OVERHEAD_PER_FIELD) as isize) / n as isize;

    if per_field_budget >= 100 {
        let budget = per_field_budget as usize;
        let uniform: Map<String, Value> = map
            .iter()
            .map(|(k, v)| (k.clone(), truncate_value_to_chars(v, budget)))
            .collect();
        let encoded_len = json_len(&Value::Object(uniform.clone()));
        if (encoded_len as f64) <= (max_chars as f64) * (1.0 + UNIFORM_TOLERANCE) {
            return Value::Object(uniform);
        }
    }

    let per_field = max_chars / n.max(1);
    let long_fields_truncated: Map<String, Value> = map
        .iter()
        .map(|(k, v)| {
            if json_len(v) > per_field {
                (k.clone(), truncate_value_to_chars(v, max_chars / 2))
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect();
    if json_len(&Value::Object(long_fields_truncated.clone())) <= max_chars * 2 {
        return Value::Object(long_fields_truncated);
    }

    let encoded = serde_json::to_string(&Value::Object(map.clone())).unwrap_or_default();
    Value::String(encoded.chars().take(max_chars).collect())
}

fn truncate_value_to_chars(value: &Value, max_chars: usize) -> Value {
    match value {
        Value::String(s) => {
            if s.chars().count() <= max_chars {
                value.clone()
            } else {
                Value::String(s.chars().take(max_chars).collect())
            }
        }
        other => {
            let encoded = serde_json::to_string(other).unwrap_or_default();
            if encoded.chars().count() <= max_chars {
                other.clone()
            } else {
                Value::String(encoded.chars().take(max_chars).collect())
            }
        }
    }
}

fn truncate_array(arr: &[Value], max_chars: usize) -> Value {
    if json_len(&Value::Array(arr.to_vec())) <= max_chars || arr.is_empty() {
        return Value::Array(arr.to_vec());
    }

    let mut kept = Vec::new();
    let mut used = 2usize; // account for enclosing brackets
    for item in arr {
        let item_len = json_len(item) + 1; // comma
        if used + item_len > max_chars {
            break;
        }
        used += item_len;
        kept.push(item.clone());
    }

    if kept.is_empty() {
        // Not even the first element fits. The reference implementation's
        // fallback is a size-bounded string slice with a length-annotated
        // suffix (`node/utils.py`'s `output_str[:max_length] + "...[原始长度: N 字符]"`),
        // never the unbounded original value.
        let encoded = serde_json::to_string(&Value::Array(arr.to_vec())).unwrap_or_default();
        let original_len = encoded.chars().count();
        let cut: String = encoded.chars().take(max_chars).collect();
        return Value::String(format!("{cut}... [truncated, original length: {original_len}]"));
    }

    if kept.len() < arr.len() {
        kept.push(serde_json::json!(format!(
            "... {} more items omitted",
            arr.len() - kept.len()
        )));
    }
    Value::Array(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_truncation_annotates_length() {
        let s = "a".repeat(20);
        let out = truncate_display_string(&s, 5);
        assert!(out.starts_with("aaaaa"));
        assert!(out.contains("original length: 20"));
    }

    #[test]
    fn display_truncation_noop_under_limit() {
        assert_eq!(truncate_display_string("short", 100), "short");
    }

    #[test]
    fn display_value_wraps_non_string() {
        let v = json!({"x": "y".repeat(50)});
        let out = truncate_display_value(&v, 10);
        assert_eq!(out["_truncated"], json!(true));
        assert_eq!(out["_original_type"], json!("object"));
    }

    #[test]
    fn llm_input_truncation_suffix() {
        let s = "x".repeat(30);
        let out = truncate_llm_input(&s, 10);
        assert!(out.ends_with("[input truncated]"));
    }

    #[test]
    fn stored_truncation_string_cuts() {
        let v = json!("x".repeat(100));
        let out = truncate_node_output(&v, 10);
        assert_eq!(out, json!("x".repeat(10)));
    }

    #[test]
    fn stored_truncation_object_uniform_preserves_keys() {
        let mut map = Map::new();
        for i in 0..5 {
            map.insert(format!("field{i}"), json!("v".repeat(500)));
        }
        let out = truncate_node_output(&Value::Object(map.clone()), 2000);
        let out_map = out.as_object().unwrap();
        assert_eq!(out_map.len(), 5);
        for key in map.keys() {
            assert!(out_map.contains_key(key));
        }
    }

    #[test]
    fn stored_truncation_under_limit_is_noop() {
        let v = json!({"a": 1, "b": "short"});
        assert_eq!(truncate_node_output(&v, 10_000), v);
    }

    #[test]
    fn stored_truncation_array_keeps_prefix_and_marker() {
        let arr: Vec<Value> = (0..1000).map(|i| json!(format!("item-{i}"))).collect();
        let out = truncate_node_output(&Value::Array(arr.clone()), 200);
        let out_arr = out.as_array().unwrap();
        assert!(out_arr.len() < arr.len());
        assert!(out_arr.last().unwrap().as_str().unwrap().contains("more items omitted"));
    }

    #[test]
    fn stored_truncation_array_falls_back_to_bounded_string_when_first_item_too_big() {
        let arr = vec![json!("x".repeat(5000)), json!("y")];
        let out = truncate_node_output(&Value::Array(arr), 200);
        let s = out.as_str().expect("oversized first element should fall back to a string, not the raw array");
        assert!(s.chars().count() <= 200 + 60, "fallback string should stay size-bounded, got {} chars", s.chars().count());
        assert!(s.contains("original length:"));
    }
}
