//! Recovers a JSON object from arbitrary LLM text: reasoning tags and
//! fenced code blocks are stripped or scanned first, and a bracket-matching
//! scanner is the last resort before giving up.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::TaskforgeError;

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());
static THINK_UNTERMINATED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*$").unwrap());
static FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap());

fn strip_think_tags(text: &str) -> String {
    let stripped = THINK_BLOCK.replace_all(text, "");
    THINK_UNTERMINATED.replace_all(&stripped, "").trim().to_string()
}

/// Stack-based bracket-matching scan: tracks `{}`/`[]` depth while
/// respecting string literals and backslash escapes, restarting the scan
/// from the position after a failed candidate.
fn scan_brackets(text: &str) -> Option<Value> {
    let bytes: Vec<char> = text.chars().collect();
    let mut start_positions: Vec<usize> = Vec::new();
    for (i, c) in bytes.iter().enumerate() {
        if *c == '{' || *c == '[' {
            start_positions.push(i);
        }
    }

    for &start in &start_positions {
        let mut depth: i64 = 0;
        let mut in_string = false;
        let mut escape = false;
        let opener = bytes[start];
        let closer = if opener == '{' { '}' } else { ']' };

        for j in start..bytes.len() {
            let c = bytes[j];
            if in_string {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                c if c == opener => depth += 1,
                c if c == closer => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate: String = bytes[start..=j].iter().collect();
                        if let Ok(v) = serde_json::from_str::<Value>(&candidate) {
                            return Some(v);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// Extracts a JSON value from noisy LLM output text, trying direct parse,
/// fenced code blocks, then a bracket-matching scan, in that order.
pub fn extract_json(text: &str) -> crate::Result<Value> {
    let cleaned = strip_think_tags(text);

    if let Ok(v) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(v);
    }

    for caps in FENCE.captures_iter(&cleaned) {
        let candidate = caps[1].trim();
        if let Ok(v) = serde_json::from_str::<Value>(candidate) {
            return Ok(v);
        }
    }

    scan_brackets(&cleaned).ok_or(TaskforgeError::Extraction)
}

/// Validates that an extracted value has the minimal shape of a workflow
/// IR: an object with a non-empty `nodes` array and an `edges` array.
pub fn validate_workflow_structure(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let nodes_ok = obj
        .get("nodes")
        .and_then(|v| v.as_array())
        .map(|a| !a.is_empty())
        .unwrap_or(false);
    let edges_ok = obj.get("edges").map(|v| v.is_array()).unwrap_or(false);
    nodes_ok && edges_ok
}
