//! The workflow intermediate representation: nodes, edges, and the
//! per-run state that accumulates as nodes execute.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// The three node kinds the executor knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Executor {
    Llm,
    Tool,
    ParamGuard,
}

impl Default for Executor {
    fn default() -> Self {
        Executor::Llm
    }
}

/// Per-node override for which LLM endpoint to use. Any field left unset
/// falls back through the role-specific then pipeline-wide environment
/// configuration (see `taskforge-model-provider::config`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A single source or target hint. The planner and the Python system this
/// was ported from both produce either a bare id or a list of ids for the
/// same field; we normalize to the list form as canonical (see
/// `IdList::as_slice`) but keep the wire format polymorphic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdList {
    One(String),
    Many(Vec<String>),
}

impl IdList {
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            IdList::One(id) => vec![id.clone()],
            IdList::Many(ids) => ids.clone(),
        }
    }

    pub fn replace(&mut self, from: &str, to: &str) {
        match self {
            IdList::One(id) => {
                if id == from {
                    *id = to.to_string();
                }
            }
            IdList::Many(ids) => {
                for id in ids.iter_mut() {
                    if id == from {
                        *id = to.to_string();
                    }
                }
            }
        }
    }
}

/// A node in the workflow graph, called a "subtask" throughout the
/// planning pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub description: String,

    #[serde(default)]
    pub executor: Executor,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<IdList>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<IdList>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(default)]
    pub input: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_config: Option<LlmConfig>,
}

impl Node {
    pub fn new(id: impl Into<String>, executor: Executor) -> Self {
        Node {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            executor,
            tool_name: None,
            source: None,
            target: None,
            output: None,
            input: Map::new(),
            llm_config: None,
        }
    }

    /// Numeric suffix of an `ST<n>` / `GUARD<n>` id, used for dense-numbering
    /// checks and for the final ST-then-GUARD ordering.
    pub fn numeric_suffix(id: &str) -> Option<u64> {
        let digits: String = id.chars().skip_while(|c| !c.is_ascii_digit()).collect();
        digits.parse().ok()
    }

    pub fn is_guard(&self) -> bool {
        self.id.starts_with("GUARD")
    }
}

/// A directed edge between two node ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

/// The complete workflow intermediate representation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowIr {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl WorkflowIr {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.target == id)
            .map(|e| e.source.as_str())
            .collect()
    }

    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.source == id)
            .map(|e| e.target.as_str())
            .collect()
    }

    /// Orders nodes ST-family first (by numeric suffix), then GUARD-family
    /// (by numeric suffix), matching the guard injector's canonical output
    /// order.
    pub fn sort_canonical(&mut self) {
        self.nodes.sort_by_key(|n| {
            (
                n.is_guard(),
                Node::numeric_suffix(&n.id).unwrap_or(u64::MAX),
            )
        });
    }
}

/// One execution attempt of a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub node_id: String,
    pub node_name: String,
    pub node_type: Executor,
    pub start_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub status: TraceStatus,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_tool: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Running,
    Success,
    Failed,
}

/// Accumulated state for one run of the executor. `outputs` is write-once
/// per node id; `error` and `messages` are append/merge monoids so that
/// independent branches executing in parallel can be combined without
/// last-writer-wins clobbering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    pub outputs: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub current_task: Vec<String>,
    #[serde(default)]
    pub completed: std::collections::HashSet<String>,
}

impl RunState {
    pub fn push_error(&mut self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        self.error = Some(match self.error.take() {
            Some(existing) => format!("{existing}; {msg}"),
            None => msg.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_suffix_parses() {
        assert_eq!(Node::numeric_suffix("ST12"), Some(12));
        assert_eq!(Node::numeric_suffix("GUARD3"), Some(3));
        assert_eq!(Node::numeric_suffix("nope"), None);
    }

    #[test]
    fn id_list_replace_one() {
        let mut l = IdList::One("ST2".into());
        l.replace("ST2", "GUARD1");
        assert_eq!(l.as_vec(), vec!["GUARD1".to_string()]);
    }

    #[test]
    fn id_list_replace_many() {
        let mut l = IdList::Many(vec!["ST1".into(), "ST2".into()]);
        l.replace("ST2", "GUARD1");
        assert_eq!(l.as_vec(), vec!["ST1".to_string(), "GUARD1".to_string()]);
    }

    #[test]
    fn run_state_error_merge() {
        let mut s = RunState::default();
        s.push_error("first");
        s.push_error("second");
        assert_eq!(s.error.as_deref(), Some("first; second"));
    }

    #[test]
    fn sort_canonical_orders_st_then_guard_by_suffix() {
        let mut ir = WorkflowIr {
            nodes: vec![
                Node::new("GUARD2", Executor::ParamGuard),
                Node::new("ST2", Executor::Tool),
                Node::new("GUARD1", Executor::ParamGuard),
                Node::new("ST1", Executor::Llm),
            ],
            edges: vec![],
        };
        ir.sort_canonical();
        let ids: Vec<_> = ir.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["ST1", "ST2", "GUARD1", "GUARD2"]);
    }
}
