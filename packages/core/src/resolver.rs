//! Reference resolution: substitutes `{<NodeId>.output<path>}` expressions
//! embedded in strings (and recursively inside nested JSON containers)
//! with values from a run's accumulated outputs.
//!
//! The path parser is a small hand-written state machine rather than a
//! general expression library, so that the two failure modes (missing id,
//! bad path) stay distinguishable and observable.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\.output((?:\.[A-Za-z_][A-Za-z0-9_]*|\[\d+\])*)\}").unwrap());

#[derive(Debug, Clone, PartialEq)]
enum PathStep {
    Key(String),
    Index(usize),
}

fn parse_path(raw: &str) -> Vec<PathStep> {
    let mut steps = Vec::new();
    let mut chars = raw.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '.' => {
                let start = i + 1;
                let mut end = raw.len();
                while let Some(&(j, c2)) = chars.peek() {
                    if c2 == '.' || c2 == '[' {
                        end = j;
                        break;
                    }
                    chars.next();
                }
                steps.push(PathStep::Key(raw[start..end].to_string()));
            }
            '[' => {
                let start = i + 1;
                let mut end = raw.len();
                while let Some(&(j, c2)) = chars.peek() {
                    if c2 == ']' {
                        end = j;
                        chars.next();
                        break;
                    }
                    chars.next();
                }
                if let Ok(idx) = raw[start..end].parse::<usize>() {
                    steps.push(PathStep::Index(idx));
                }
            }
            _ => {}
        }
    }
    steps
}

fn walk<'a>(value: &'a Value, steps: &[PathStep]) -> Option<&'a Value> {
    let mut current = value;
    for step in steps {
        current = match (step, current) {
            (PathStep::Key(k), Value::Object(map)) => map.get(k)?,
            (PathStep::Index(i), Value::Array(arr)) => arr.get(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

/// Resolves every `{Id.output...}` reference found inside `text` against
/// `outputs`. Missing ids and bad paths become inline placeholder strings
/// rather than errors, matching the executor's "never raise for a missing
/// predecessor output" policy.
pub fn resolve_string(text: &str, outputs: &HashMap<String, Value>) -> String {
    REFERENCE
        .replace_all(text, |caps: &regex::Captures| {
            let id = &caps[1];
            let path_raw = &caps[2];
            match outputs.get(id) {
                None => format!("{{Missing Output: {id}}}"),
                Some(root) => {
                    let steps = parse_path(path_raw);
                    match walk(root, &steps) {
                        Some(v) => stringify(v),
                        None => format!("{{Invalid Output Path: {id}{path_raw}}}"),
                    }
                }
            }
        })
        .into_owned()
}

/// Recursively resolves references inside a JSON value: string leaves are
/// substituted in place, object/array containers are walked, everything
/// else passes through unchanged.
pub fn resolve_value(value: &Value, outputs: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_string(s, outputs)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, outputs)))
                .collect(),
        ),
        Value::Array(arr) => Value::Array(arr.iter().map(|v| resolve_value(v, outputs)).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_simple_scalar() {
        let mut outputs = HashMap::new();
        outputs.insert("ST1".to_string(), json!("sunny"));
        assert_eq!(resolve_string("{ST1.output}", &outputs), "sunny");
    }

    #[test]
    fn resolves_nested_path_scenario_6() {
        let mut outputs = HashMap::new();
        outputs.insert(
            "ST1".to_string(),
            json!({"days": [{"temp": 3}, {"temp": 5}]}),
        );
        assert_eq!(
            resolve_string("picked {ST1.output.days[1].temp}", &outputs),
            "picked 5"
        );
    }

    #[test]
    fn missing_id_becomes_placeholder() {
        let outputs = HashMap::new();
        assert_eq!(
            resolve_string("{ST9.output}", &outputs),
            "{Missing Output: ST9}"
        );
    }

    #[test]
    fn invalid_path_becomes_placeholder() {
        let mut outputs = HashMap::new();
        outputs.insert("ST1".to_string(), json!({"a": 1}));
        assert_eq!(
            resolve_string("{ST1.output.b}", &outputs),
            "{Invalid Output Path: ST1.b}"
        );
    }

    #[test]
    fn container_value_is_json_encoded() {
        let mut outputs = HashMap::new();
        outputs.insert("ST1".to_string(), json!({"days": [1, 2]}));
        assert_eq!(
            resolve_string("{ST1.output}", &outputs),
            "{\"days\":[1,2]}"
        );
    }

    #[test]
    fn resolve_value_recurses_into_nested_containers() {
        let mut outputs = HashMap::new();
        outputs.insert("ST1".to_string(), json!("x"));
        let input = json!({"a": ["{ST1.output}", {"b": "{ST1.output}"}]});
        let resolved = resolve_value(&input, &outputs);
        assert_eq!(resolved, json!({"a": ["x", {"b": "x"}]}));
    }

    #[test]
    fn no_match_passes_through_unchanged() {
        let outputs = HashMap::new();
        let input = json!({"a": 1, "b": "plain text"});
        assert_eq!(resolve_value(&input, &outputs), input);
    }
}
