//! Diagnostic record of one `Planner::plan` invocation, mirroring the
//! reference implementation's `self.last_run` dict so callers (and tests)
//! can inspect every intermediate artifact without re-running the pipeline.

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct FixAttempt {
    pub attempt: u32,
    pub status: String,
    pub input_snippet: String,
    pub output_snippet: Option<String>,
    pub error: Option<String>,
    pub nodes_count: Option<usize>,
    pub edges_count: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct LastRun {
    pub task: String,
    pub optimized_task: Option<String>,
    pub draft_json_raw: Option<String>,
    pub draft_json: Option<String>,
    pub raw_json: Option<String>,
    pub fixed_json: Option<Value>,
    pub stage1_selected_tool_names: Option<Vec<String>>,
    pub stage1_missing_tool_queries: Vec<String>,
    pub stage2_tools: Vec<String>,
    pub stage2_tools_json: Option<String>,
    pub fix_attempts: Vec<FixAttempt>,
    pub error: Option<String>,
    pub error_stage: Option<String>,
}

pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
