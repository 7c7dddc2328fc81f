//! Per-node-type execution, grounded in `original_source/node/{llm_node,
//! tool_node,param_guard_node}.py`. Each function resolves its node's input,
//! does the node-type-specific work, and returns either the value to store
//! in `outputs[id]` or an error; the caller (`engine.rs`) owns trace timing
//! and the completed/outputs bookkeeping shared across all three.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use taskforge_core::{resolver::resolve_value, truncate::truncate_node_output, Node, TaskforgeError, TraceEntry};
use taskforge_model_provider::{
    resolve_guard_endpoint, resolve_llm_endpoint, ChatCompletion, ChatMessage, CompletionOptions, EndpointConfig,
};

use crate::config::ExecutorConfig;
use crate::guard_evaluator::ParamGuardEvaluator;
use crate::registry::{ToolRegistry, ToolRegistryError};

/// Builds a chat client for a resolved endpoint. Production wiring installs
/// a factory that constructs `OpenAiCompatibleClient`; tests substitute a
/// stub so node execution can be exercised without network access.
pub type ClientFactory = dyn Fn(EndpointConfig) -> Arc<dyn ChatCompletion> + Send + Sync;

static THINK_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());
static THINK_UNTERMINATED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*$").unwrap());
static BARE_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[A-Za-z_][A-Za-z0-9_]*\.output").unwrap());

fn strip_think_tags(text: &str) -> String {
    let stripped = THINK_BLOCK.replace_all(text, "");
    THINK_UNTERMINATED.replace_all(&stripped, "").trim().to_string()
}

fn stringify_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn truncate_display_text(text: &str, max_chars: usize) -> Value {
    taskforge_core::truncate::truncate_display_value(&Value::String(text.to_string()), max_chars)
}

/// LLM node: resolve references, pick the prompt field, call the endpoint
/// (per-node `llm_config` overrides `PLANNER_*`), strip `<think>` tags.
pub async fn execute_llm(
    node: &Node,
    outputs: &HashMap<String, Value>,
    make_client: &ClientFactory,
    config: &ExecutorConfig,
    trace: &mut TraceEntry,
) -> Result<Value, TaskforgeError> {
    let raw_input = Value::Object(node.input.clone());
    let resolved = resolve_value(&raw_input, outputs);
    let resolved_obj = resolved.as_object().cloned().unwrap_or_default();

    let mut prompt = if let Some(p) = resolved_obj.get("prompt") {
        stringify_field(p)
    } else if let Some(c) = resolved_obj.get("content") {
        stringify_field(c)
    } else {
        serde_json::to_string(&resolved).unwrap_or_default()
    };

    if let Some(max) = config.llm_input_max_chars {
        prompt = taskforge_core::truncate::truncate_llm_input(&prompt, max);
    }

    trace.input = serde_json::json!({ "prompt": truncate_display_text(&prompt, config.tool_output_max_chars) });

    let endpoint = resolve_llm_endpoint(node.llm_config.as_ref());
    trace.model = Some(endpoint.model.clone());
    let client = make_client(endpoint);

    let response = client
        .complete(&[ChatMessage::user(prompt)], &CompletionOptions::default())
        .await
        .map_err(|e| TaskforgeError::ExecutionFailure { node_id: node.id.clone(), message: e.to_string() })?;

    Ok(Value::String(strip_think_tags(&response)))
}

fn normalize_tool_output(result: Value) -> Value {
    match &result {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                result
            } else {
                serde_json::from_str::<Value>(trimmed).unwrap_or(result)
            }
        }
        _ => result,
    }
}

fn is_tool_failure_output(value: &Value, prefixes: &[String], contains: &[String]) -> bool {
    match value {
        Value::String(s) => {
            let lowered = s.to_lowercase();
            let prefix_hit = prefixes.iter().any(|p| {
                let p = p.to_lowercase();
                !p.is_empty() && lowered.starts_with(&p)
            });
            let contains_hit = contains.iter().any(|c| {
                let c = c.to_lowercase();
                !c.is_empty() && lowered.contains(&c)
            });
            prefix_hit || contains_hit
        }
        Value::Object(map) => map.contains_key("error"),
        _ => false,
    }
}

fn merge_guard_outputs<'a>(
    ids: impl Iterator<Item = &'a str>,
    outputs: &HashMap<String, Value>,
) -> Result<Map<String, Value>, String> {
    let mut merged = Map::new();
    for id in ids {
        let guard_output = outputs.get(id).cloned().unwrap_or(Value::Object(Map::new()));
        let obj = guard_output
            .as_object()
            .cloned()
            .ok_or_else(|| format!("param guard '{id}' output is not an object"))?;
        for (k, v) in obj {
            merged.insert(k, v);
        }
    }
    Ok(merged)
}

/// Tool node: `__from_guard__`/`__from_guards__` dispatch takes priority over
/// direct reference resolution, matching the planner's intended guard-first
/// contract; the fallback path only exists to surface planner bugs loudly.
pub async fn execute_tool(
    node: &Node,
    outputs: &HashMap<String, Value>,
    registry: &dyn ToolRegistry,
    config: &ExecutorConfig,
    trace: &mut TraceEntry,
) -> Result<Value, TaskforgeError> {
    let raw_input = Value::Object(node.input.clone());
    trace.input = taskforge_core::truncate::truncate_display_value(&raw_input, config.tool_output_max_chars);

    let tool_name = node.tool_name.clone().ok_or_else(|| TaskforgeError::ToolFailure {
        tool_name: node.id.clone(),
        detail: "node has no tool_name".to_string(),
    })?;
    trace.tool_name = Some(tool_name.clone());

    let tool_input: Map<String, Value> = if let Some(guard_id) = node.input.get("__from_guard__").and_then(|v| v.as_str()) {
        let mut merged = merge_guard_outputs(std::iter::once(guard_id), outputs)
            .map_err(|detail| TaskforgeError::ToolFailure { tool_name: tool_name.clone(), detail })?;
        if let Some(overrides) = node.input.get("_param_overrides").and_then(|v| v.as_object()) {
            for (k, v) in overrides {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    } else if let Some(guard_ids) = node.input.get("__from_guards__").and_then(|v| v.as_array()) {
        let ids: Vec<&str> = guard_ids.iter().filter_map(|v| v.as_str()).collect();
        let mut merged = merge_guard_outputs(ids.into_iter(), outputs)
            .map_err(|detail| TaskforgeError::ToolFailure { tool_name: tool_name.clone(), detail })?;
        if let Some(overrides) = node.input.get("_param_overrides").and_then(|v| v.as_object()) {
            for (k, v) in overrides {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    } else {
        let raw_str = serde_json::to_string(&raw_input).unwrap_or_default();
        if BARE_REFERENCE.is_match(&raw_str) {
            tracing::warn!(
                node_id = %node.id,
                "tool node input contains reference syntax but was not routed through a guard node; this is likely a planner bug, falling back to direct resolution"
            );
        }
        resolve_value(&raw_input, outputs).as_object().cloned().unwrap_or_default()
    };

    trace.input = taskforge_core::truncate::truncate_display_value(&Value::Object(tool_input.clone()), config.tool_output_max_chars);

    let result = registry
        .invoke(&tool_name, tool_input)
        .await
        .map_err(|e| match e {
            ToolRegistryError::NotFound(name) => TaskforgeError::ToolFailure { tool_name: name, detail: "tool not found".to_string() },
            ToolRegistryError::InvocationFailed(name, detail) => TaskforgeError::ToolFailure { tool_name: name, detail },
        })?;

    let normalized = normalize_tool_output(result);
    if is_tool_failure_output(&normalized, &config.tool_failure_prefixes, &config.tool_failure_contains) {
        return Err(TaskforgeError::ToolFailure {
            tool_name,
            detail: stringify_field(&normalized),
        });
    }

    Ok(truncate_node_output(&normalized, config.node_output_max_chars))
}

/// Param-guard node: resolve the target-input template, read the upstream
/// output named by `source_nodes[0]` (or the singular `source_node` form),
/// and delegate shaping to the evaluator.
pub async fn execute_param_guard(
    node: &Node,
    outputs: &HashMap<String, Value>,
    make_client: &ClientFactory,
    tool_schemas: &HashMap<String, Value>,
    config: &ExecutorConfig,
    trace: &mut TraceEntry,
) -> Result<Value, TaskforgeError> {
    let target_input_template = node.input.get("target_input_template").cloned().unwrap_or(Value::Object(Map::new()));
    let candidate = resolve_value(&target_input_template, outputs);

    let source_node = node
        .input
        .get("source_nodes")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|v| v.as_str())
        .or_else(|| node.input.get("source_node").and_then(|v| v.as_str()));
    let upstream_output = source_node.and_then(|id| outputs.get(id)).cloned().unwrap_or(Value::Null);

    let target_tool = node
        .input
        .get("target_tool")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or_else(|| node.tool_name.clone());

    let schema = node
        .input
        .get("schema")
        .cloned()
        .or_else(|| target_tool.as_deref().and_then(|t| tool_schemas.get(t).cloned()))
        .unwrap_or(Value::Object(Map::new()));

    trace.target_tool = target_tool.clone();
    trace.input = serde_json::json!({
        "mode": "llm_adjusted",
        "candidate": taskforge_core::truncate::truncate_display_value(&candidate, config.tool_output_max_chars),
        "upstream_output": taskforge_core::truncate::truncate_display_value(&upstream_output, config.tool_output_max_chars),
        "schema": schema,
    });

    let endpoint = resolve_guard_endpoint(node.llm_config.as_ref());
    trace.model = Some(endpoint.model.clone());
    let client = make_client(endpoint);
    let evaluator = ParamGuardEvaluator::new(client);

    let result = evaluator
        .validate_and_repair(&candidate, &schema, &upstream_output, target_tool.as_deref())
        .await?;

    Ok(result.output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::StaticToolRegistry;
    use async_trait::async_trait;
    use taskforge_core::{Executor as ExecutorKind, TraceStatus};
    use taskforge_model_provider::ModelProviderError;

    struct StubClient(String);

    #[async_trait]
    impl ChatCompletion for StubClient {
        async fn complete(&self, _messages: &[ChatMessage], _opts: &CompletionOptions) -> Result<String, ModelProviderError> {
            Ok(self.0.clone())
        }
    }

    fn blank_trace(node: &Node) -> TraceEntry {
        TraceEntry {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            node_type: node.executor,
            start_time: "2026-01-01T00:00:00Z".to_string(),
            end_time: None,
            duration_ms: None,
            status: TraceStatus::Running,
            input: Value::Null,
            output: None,
            error: None,
            model: None,
            tool_name: None,
            target_tool: None,
        }
    }

    fn factory(text: &str) -> Box<ClientFactory> {
        let text = text.to_string();
        Box::new(move |_endpoint| Arc::new(StubClient(text.clone())) as Arc<dyn ChatCompletion>)
    }

    #[tokio::test]
    async fn llm_node_resolves_prompt_and_strips_think_tags() {
        let mut node = Node::new("ST1", ExecutorKind::Llm);
        node.input.insert("prompt".to_string(), Value::String("summarize {ST0.output}".to_string()));
        let mut outputs = HashMap::new();
        outputs.insert("ST0".to_string(), Value::String("weather data".to_string()));

        let config = ExecutorConfig::default();
        let mut trace = blank_trace(&node);
        let client_factory = factory("<think>ok</think>done");
        let out = execute_llm(&node, &outputs, client_factory.as_ref(), &config, &mut trace).await.unwrap();
        assert_eq!(out, Value::String("done".to_string()));
    }

    #[tokio::test]
    async fn llm_node_prefers_prompt_over_content() {
        let mut node = Node::new("ST1", ExecutorKind::Llm);
        node.input.insert("prompt".to_string(), Value::String("a".to_string()));
        node.input.insert("content".to_string(), Value::String("b".to_string()));
        let outputs = HashMap::new();
        let config = ExecutorConfig::default();
        let mut trace = blank_trace(&node);
        let client_factory = factory("out");
        execute_llm(&node, &outputs, client_factory.as_ref(), &config, &mut trace).await.unwrap();
        assert_eq!(trace.input["prompt"], Value::String("a".to_string()));
    }

    #[tokio::test]
    async fn tool_node_from_guard_merges_overrides() {
        let mut node = Node::new("ST2", ExecutorKind::Tool);
        node.tool_name = Some("weather".to_string());
        node.input.insert("__from_guard__".to_string(), Value::String("GUARD1".to_string()));
        node.input.insert("_param_overrides".to_string(), serde_json::json!({"units": "metric"}));

        let mut outputs = HashMap::new();
        outputs.insert("GUARD1".to_string(), serde_json::json!({"city": "Paris"}));

        let registry = StaticToolRegistry::new().with("weather", serde_json::json!({"temp": 20}));
        let config = ExecutorConfig::default();
        let mut trace = blank_trace(&node);
        let out = execute_tool(&node, &outputs, &registry, &config, &mut trace).await.unwrap();
        assert_eq!(out, serde_json::json!({"temp": 20}));
        assert_eq!(trace.input, serde_json::json!({"city": "Paris", "units": "metric"}));
    }

    #[tokio::test]
    async fn tool_node_from_guards_merges_in_order_later_wins() {
        let mut node = Node::new("ST3", ExecutorKind::Tool);
        node.tool_name = Some("booker".to_string());
        node.input.insert("__from_guards__".to_string(), serde_json::json!(["GUARD1", "GUARD2"]));

        let mut outputs = HashMap::new();
        outputs.insert("GUARD1".to_string(), serde_json::json!({"a": 1, "b": 1}));
        outputs.insert("GUARD2".to_string(), serde_json::json!({"b": 2}));

        let registry = StaticToolRegistry::new().with("booker", serde_json::json!({"ok": true}));
        let config = ExecutorConfig::default();
        let mut trace = blank_trace(&node);
        execute_tool(&node, &outputs, &registry, &config, &mut trace).await.unwrap();
        assert_eq!(trace.input, serde_json::json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn tool_node_classifies_error_string_as_failure() {
        let mut node = Node::new("ST4", ExecutorKind::Tool);
        node.tool_name = Some("flaky".to_string());
        let outputs = HashMap::new();
        let registry = StaticToolRegistry::new().with("flaky", Value::String("Error: timed out".to_string()));
        let config = ExecutorConfig::default();
        let mut trace = blank_trace(&node);
        let err = execute_tool(&node, &outputs, &registry, &config, &mut trace).await.unwrap_err();
        assert!(matches!(err, TaskforgeError::ToolFailure { .. }));
    }

    #[tokio::test]
    async fn tool_node_treats_mid_string_error_without_failed_as_success() {
        let mut node = Node::new("ST4b", ExecutorKind::Tool);
        node.tool_name = Some("flaky".to_string());
        let outputs = HashMap::new();
        let registry =
            StaticToolRegistry::new().with("flaky", Value::String("Processed 3 records, zero error rate".to_string()));
        let config = ExecutorConfig::default();
        let mut trace = blank_trace(&node);
        let out = execute_tool(&node, &outputs, &registry, &config, &mut trace).await.unwrap();
        assert_eq!(out, Value::String("Processed 3 records, zero error rate".to_string()));
    }

    #[tokio::test]
    async fn tool_node_classifies_error_key_object_as_failure() {
        let mut node = Node::new("ST5", ExecutorKind::Tool);
        node.tool_name = Some("flaky".to_string());
        let outputs = HashMap::new();
        let registry = StaticToolRegistry::new().with("flaky", serde_json::json!({"error": "rate limited"}));
        let config = ExecutorConfig::default();
        let mut trace = blank_trace(&node);
        let err = execute_tool(&node, &outputs, &registry, &config, &mut trace).await.unwrap_err();
        assert!(matches!(err, TaskforgeError::ToolFailure { .. }));
    }

    #[tokio::test]
    async fn tool_node_parses_json_string_result() {
        let mut node = Node::new("ST6", ExecutorKind::Tool);
        node.tool_name = Some("lookup".to_string());
        let outputs = HashMap::new();
        let registry = StaticToolRegistry::new().with("lookup", Value::String("{\"city\": \"Rome\"}".to_string()));
        let config = ExecutorConfig::default();
        let mut trace = blank_trace(&node);
        let out = execute_tool(&node, &outputs, &registry, &config, &mut trace).await.unwrap();
        assert_eq!(out, serde_json::json!({"city": "Rome"}));
    }

    #[tokio::test]
    async fn param_guard_node_resolves_target_template_against_outputs() {
        let mut node = Node::new("GUARD1", ExecutorKind::ParamGuard);
        node.tool_name = Some("weather".to_string());
        node.input.insert(
            "target_input_template".to_string(),
            serde_json::json!({"city": "{ST1.output.city}"}),
        );
        node.input.insert("source_nodes".to_string(), serde_json::json!(["ST1"]));

        let mut outputs = HashMap::new();
        outputs.insert("ST1".to_string(), serde_json::json!({"city": "Berlin"}));

        let config = ExecutorConfig::default();
        let mut trace = blank_trace(&node);
        let tool_schemas = HashMap::new();
        let client_factory = factory(r#"{"city": "Berlin"}"#);
        let out = execute_param_guard(&node, &outputs, client_factory.as_ref(), &tool_schemas, &config, &mut trace)
            .await
            .unwrap();
        assert_eq!(out, serde_json::json!({"city": "Berlin"}));
        assert_eq!(trace.target_tool.as_deref(), Some("weather"));
    }
}
