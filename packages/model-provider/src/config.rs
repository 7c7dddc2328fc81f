//! Per-node endpoint configuration override chain.
//!
//! Each field of the resolved endpoint is resolved independently:
//! `node.llm_config.<field>` wins if set, else the role-specific
//! environment variable, else (for guard nodes only) the pipeline-wide
//! `PLANNER_*` variable, else a hardcoded default. This mirrors the
//! asymmetric chains used by the guard-node and plain LLM-node evaluators
//! in the system this was ported from: guard nodes fall back through
//! `GUARD_*` before `PLANNER_*`; LLM nodes go straight to `PLANNER_*`.

use std::time::Duration;
use taskforge_core::LlmConfig;

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn first_env(names: &[&str]) -> Option<String> {
    names.iter().find_map(|n| env_var(n))
}

/// Resolves a field by checking the node override first, then each
/// environment-variable prefix in `chain` order (e.g. `["GUARD", "PLANNER"]`).
fn resolve_field(
    override_value: Option<&String>,
    chain: &[&str],
    suffix: &str,
) -> Option<String> {
    if let Some(v) = override_value {
        return Some(v.clone());
    }
    let names: Vec<String> = chain.iter().map(|prefix| format!("{prefix}_{suffix}")).collect();
    let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
    first_env(&refs)
}

fn resolve(override_cfg: Option<&LlmConfig>, chain: &[&str]) -> EndpointConfig {
    let api_key = resolve_field(override_cfg.and_then(|c| c.api_key.as_ref()), chain, "KEY");
    let base_url = resolve_field(override_cfg.and_then(|c| c.base_url.as_ref()), chain, "URL");
    let model = resolve_field(override_cfg.and_then(|c| c.model.as_ref()), chain, "MODEL")
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let timeout_secs = resolve_field(None, chain, "TIMEOUT")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    EndpointConfig {
        api_key,
        base_url,
        model,
        timeout: Duration::from_secs(timeout_secs),
    }
}

/// LLM-node override chain: `llm_config > PLANNER_* > default model`.
pub fn resolve_llm_endpoint(override_cfg: Option<&LlmConfig>) -> EndpointConfig {
    resolve(override_cfg, &["PLANNER"])
}

/// Param-guard-node override chain: `llm_config > GUARD_* > PLANNER_* > default model`.
pub fn resolve_guard_endpoint(override_cfg: Option<&LlmConfig>) -> EndpointConfig {
    resolve(override_cfg, &["GUARD", "PLANNER"])
}

/// Embedding backend endpoint, used only by the semantic tool retriever.
pub fn resolve_embedding_endpoint() -> EndpointConfig {
    resolve(None, &["EMBEDDING"])
}
