//! Planner-wide knobs read from the environment, mirroring the reference
//! implementation's `Config` dataclass.

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub enable_task_optimization: bool,
    pub max_fix_attempts: u32,
    pub tool_retriever_top_k: usize,
    pub tool_retriever_expand_k: usize,
    pub log_truncate_length: usize,
    pub fix_prompt_truncate_length: usize,
    pub pinned_tools: Vec<String>,
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl PlannerConfig {
    pub fn from_env() -> Self {
        let pinned_tools = std::env::var("PINNED_TOOLS")
            .unwrap_or_else(|_| "tavily-search".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        PlannerConfig {
            enable_task_optimization: env_bool("ENABLE_TASK_OPTIMIZATION", true),
            max_fix_attempts: env_u32("MAX_FIX_ATTEMPTS", 3),
            tool_retriever_top_k: env_usize("TOOL_RETRIEVER_TOP_K", 25),
            tool_retriever_expand_k: env_usize("TOOL_RETRIEVER_EXPAND_K", 15),
            log_truncate_length: env_usize("LOG_TRUNCATE_LENGTH", 500),
            fix_prompt_truncate_length: env_usize("FIX_PROMPT_TRUNCATE_LENGTH", 1500),
            pinned_tools,
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            enable_task_optimization: true,
            max_fix_attempts: 3,
            tool_retriever_top_k: 25,
            tool_retriever_expand_k: 15,
            log_truncate_length: 500,
            fix_prompt_truncate_length: 1500,
            pinned_tools: vec!["tavily-search".to_string()],
        }
    }
}
