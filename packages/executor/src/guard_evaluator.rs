//! Component F: the param-guard evaluator. Ground-truthed on
//! `original_source/src/param_guard.py`'s `ParamGuard.validate_and_repair`:
//! coerce the candidate, build a schema-aware prompt, call the LLM, strip
//! reasoning tags and any markdown fences, then require a JSON object back.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use taskforge_core::TaskforgeError;
use taskforge_model_provider::{ChatCompletion, ChatMessage, CompletionOptions};

static THINK_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());
static THINK_UNTERMINATED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*$").unwrap());
static FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```(?:json|python|yaml)?\s*\n?").unwrap());
static FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n?```\s*$").unwrap());

pub(crate) fn strip_think_tags(text: &str) -> String {
    let stripped = THINK_BLOCK.replace_all(text, "");
    THINK_UNTERMINATED.replace_all(&stripped, "").trim().to_string()
}

fn strip_think_and_fences(text: &str) -> String {
    let cleaned = strip_think_tags(text);
    if cleaned.starts_with("```") {
        let without_open = FENCE_OPEN.replace(&cleaned, "");
        FENCE_CLOSE.replace(&without_open, "").trim().to_string()
    } else {
        cleaned
    }
}

/// String candidates that parse as JSON are coerced to their parsed form;
/// everything else, including unparseable strings, passes through as-is.
pub(crate) fn coerce_json_value(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Value::Object(serde_json::Map::new())
            } else {
                serde_json::from_str(trimmed).unwrap_or_else(|_| value.clone())
            }
        }
        other => other.clone(),
    }
}

fn render_for_prompt(value: &Value) -> String {
    match value {
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn build_guard_prompt(tool_name: Option<&str>, schema: &Value, candidate: &Value, upstream_output: &Value) -> String {
    let schema_str = if schema.is_null() || schema == &Value::Object(serde_json::Map::new()) {
        "{}".to_string()
    } else {
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| "{}".to_string())
    };
    format!(
        "Produce a JSON object that conforms to the downstream tool's input schema. \
Output only the JSON object, no explanation, no surrounding text.\n\
Target tool: {}\n\
Schema:\n{}\n\
Upstream output (reference context):\n{}\n\
Candidate input filled from the template:\n{}\n\
Return a JSON object satisfying the schema with correct fields, types, and required values. \
Do not return anything besides the JSON object.",
        tool_name.unwrap_or("unknown"),
        schema_str,
        render_for_prompt(upstream_output),
        render_for_prompt(candidate),
    )
}

#[derive(Debug, Clone)]
pub struct GuardResult {
    pub mode: String,
    pub output: Value,
    pub raw_response: String,
}

pub struct ParamGuardEvaluator {
    client: Arc<dyn ChatCompletion>,
}

impl ParamGuardEvaluator {
    pub fn new(client: Arc<dyn ChatCompletion>) -> Self {
        ParamGuardEvaluator { client }
    }

    pub async fn validate_and_repair(
        &self,
        candidate_input: &Value,
        schema: &Value,
        upstream_output: &Value,
        target_tool: Option<&str>,
    ) -> Result<GuardResult, TaskforgeError> {
        let candidate = coerce_json_value(candidate_input);
        let prompt = build_guard_prompt(target_tool, schema, &candidate, upstream_output);

        let response = self
            .client
            .complete(&[ChatMessage::user(prompt)], &CompletionOptions::default())
            .await
            .map_err(|e| TaskforgeError::guard(format!("guard LLM call failed: {e}"), None))?;

        let cleaned = strip_think_and_fences(&response);
        let parsed: Option<Value> = serde_json::from_str(&cleaned).ok();

        match parsed {
            None => Err(TaskforgeError::guard(
                "guard response could not be parsed as JSON",
                Some(cleaned),
            )),
            Some(v) if !v.is_object() => Err(TaskforgeError::guard(
                format!("guard output must be a JSON object, got {}", type_name(&v)),
                Some(cleaned),
            )),
            Some(v) => Ok(GuardResult { mode: "llm_adjusted".to_string(), output: v, raw_response: cleaned }),
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

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use taskforge_model_provider::ModelProviderError;

    struct StubClient(String);

    #[async_trait]
    impl ChatCompletion for StubClient {
        async fn complete(&self, _messages: &[ChatMessage], _opts: &CompletionOptions) -> Result<String, ModelProviderError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn strips_think_tags_and_fences_then_parses() {
        let client: Arc<dyn ChatCompletion> =
            Arc::new(StubClient("<think>reasoning</think>```json\n{\"city\": \"Paris\"}\n```".to_string()));
        let evaluator = ParamGuardEvaluator::new(client);
        let result = evaluator
            .validate_and_repair(&Value::Null, &Value::Null, &Value::Null, Some("weather"))
            .await
            .unwrap();
        assert_eq!(result.output, serde_json::json!({"city": "Paris"}));
        assert_eq!(result.mode, "llm_adjusted");
    }

    #[tokio::test]
    async fn non_object_output_is_an_error_with_raw_response() {
        let client: Arc<dyn ChatCompletion> = Arc::new(StubClient("[1, 2, 3]".to_string()));
        let evaluator = ParamGuardEvaluator::new(client);
        let err = evaluator
            .validate_and_repair(&Value::Null, &Value::Null, &Value::Null, None)
            .await
            .unwrap_err();
        match err {
            TaskforgeError::Guard { raw_response, .. } => assert_eq!(raw_response.as_deref(), Some("[1, 2, 3]")),
            other => panic!("expected Guard error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_response_is_an_error() {
        let client: Arc<dyn ChatCompletion> = Arc::new(StubClient("not json at all".to_string()));
        let evaluator = ParamGuardEvaluator::new(client);
        let err = evaluator
            .validate_and_repair(&Value::Null, &Value::Null, &Value::Null, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskforgeError::Guard { .. }));
    }

    #[test]
    fn coerce_parses_json_strings() {
        assert_eq!(coerce_json_value(&Value::String("{\"a\":1}".to_string())), serde_json::json!({"a": 1}));
        assert_eq!(coerce_json_value(&Value::String("".to_string())), serde_json::json!({}));
        assert_eq!(coerce_json_value(&Value::String("not json".to_string())), Value::String("not json".to_string()));
    }
}
