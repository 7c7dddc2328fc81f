//! Executor-wide knobs, all overridable via environment variables. Defaults
//! mirror the reference implementation's constants except where SPEC_FULL's
//! own Open Question resolution says otherwise (tool-failure substrings).

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_opt_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_list(name: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Cap on an outgoing LLM prompt's length. `None` means no truncation.
    pub llm_input_max_chars: Option<usize>,
    /// Trace-display truncation budget for a node's recorded input/output.
    pub tool_output_max_chars: usize,
    /// Stored-output truncation budget, applied to tool node outputs only.
    pub node_output_max_chars: usize,
    /// Case-insensitive prefixes that mark a string tool output as a failure
    /// (checked with `starts_with`, matching the reference's `"error"` check).
    pub tool_failure_prefixes: Vec<String>,
    /// Case-insensitive substrings that mark a string tool output as a
    /// failure anywhere in the string (checked with `contains`, matching the
    /// reference's `"failed"` check).
    pub tool_failure_contains: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            llm_input_max_chars: None,
            tool_output_max_chars: 20_000,
            node_output_max_chars: 15_000,
            tool_failure_prefixes: vec!["error".to_string()],
            tool_failure_contains: vec!["failed".to_string()],
        }
    }
}

impl ExecutorConfig {
    pub fn from_env() -> Self {
        ExecutorConfig {
            llm_input_max_chars: env_opt_usize("LLM_INPUT_MAX_CHARS"),
            tool_output_max_chars: env_usize("TOOL_OUTPUT_MAX_CHARS", 20_000),
            node_output_max_chars: env_usize("NODE_OUTPUT_MAX_CHARS", 15_000),
            tool_failure_prefixes: env_list("TOOL_FAILURE_PREFIXES", &["error"]),
            tool_failure_contains: env_list("TOOL_FAILURE_CONTAINS", &["failed"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.tool_output_max_chars, 20_000);
        assert_eq!(cfg.node_output_max_chars, 15_000);
        assert_eq!(cfg.llm_input_max_chars, None);
        assert_eq!(cfg.tool_failure_prefixes, vec!["error"]);
        assert_eq!(cfg.tool_failure_contains, vec!["failed"]);
    }
}
