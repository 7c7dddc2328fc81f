//! Component G: the DAG executor. Schedules wavefronts of ready nodes with
//! `futures::stream::buffer_unordered`, the same pattern the teacher's run
//! loop uses for its own bounded-parallel step execution, bounded here by
//! `std::thread::available_parallelism` rather than a `num_cpus` dependency.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use taskforge_core::{Executor as NodeKind, Node, RunState, TraceEntry, TraceStatus, WorkflowIr};
use taskforge_model_provider::{ChatCompletion, EndpointConfig, OpenAiCompatibleClient};

use crate::config::ExecutorConfig;
use crate::graph::{self, CompiledGraph};
use crate::nodes::{self, ClientFactory};
use crate::registry::ToolRegistry;

pub type TraceCallback = dyn Fn(&TraceEntry) + Send + Sync;

/// Owns the collaborators a run needs (tool registry, chat-client factory,
/// tool schemas for guard prompts) and executes workflow IRs against them.
/// Stateless across runs: build one per process and call `run` repeatedly.
pub struct DagExecutor {
    config: ExecutorConfig,
    registry: Arc<dyn ToolRegistry>,
    make_client: Arc<ClientFactory>,
    tool_schemas: HashMap<String, Value>,
    trace_callback: Option<Arc<TraceCallback>>,
}

impl DagExecutor {
    pub fn new(registry: Arc<dyn ToolRegistry>, tool_schemas: HashMap<String, Value>) -> Self {
        DagExecutor {
            config: ExecutorConfig::from_env(),
            registry,
            make_client: Arc::new(|endpoint: EndpointConfig| OpenAiCompatibleClient::shared(endpoint)),
            tool_schemas,
            trace_callback: None,
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_client_factory(mut self, make_client: Arc<ClientFactory>) -> Self {
        self.make_client = make_client;
        self
    }

    pub fn with_trace_callback(mut self, callback: Arc<TraceCallback>) -> Self {
        self.trace_callback = Some(callback);
        self
    }

    /// Runs every node reachable from the compiled graph's entry nodes,
    /// honoring fan-in joins and isolating failures to their own branch.
    /// Returns the accumulated run state and the append-ordered trace.
    pub async fn run(&self, ir: &WorkflowIr) -> (RunState, Vec<TraceEntry>) {
        let graph = graph::compile(ir);
        let mut state = RunState::default();
        let mut trace: Vec<TraceEntry> = Vec::new();
        let mut processed: HashSet<String> = HashSet::new();
        let mut remaining: HashSet<String> = ir.nodes.iter().map(|n| n.id.clone()).collect();
        let parallelism = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);

        while !remaining.is_empty() {
            let ready_ids = self.ready_nodes(&graph, &remaining, &processed);
            if ready_ids.is_empty() {
                break;
            }

            let mut run_ids = Vec::new();
            for id in &ready_ids {
                remaining.remove(id);
                let deps_satisfied = graph
                    .predecessors
                    .get(id)
                    .map(|preds| preds.iter().all(|p| state.outputs.contains_key(p)))
                    .unwrap_or(true);
                if deps_satisfied {
                    run_ids.push(id.clone());
                } else {
                    // A predecessor failed or was itself skipped; this node
                    // never runs and never gets a trace entry.
                    processed.insert(id.clone());
                }
            }

            if run_ids.is_empty() {
                continue;
            }

            let outputs_snapshot = Arc::new(state.outputs.clone());
            let futures_iter = run_ids.iter().map(|id| {
                let node = ir.node(id).expect("run_ids drawn from ir.nodes").clone();
                let outputs_snapshot = outputs_snapshot.clone();
                async move { self.run_one(node, outputs_snapshot).await }
            });

            let results: Vec<(String, TraceEntry, Option<Value>, Option<String>)> =
                stream::iter(futures_iter).buffer_unordered(parallelism).collect().await;

            for (id, trace_entry, output, error) in results {
                if let Some(out) = output {
                    state.outputs.insert(id.clone(), out);
                }
                if let Some(err) = &error {
                    state.push_error(format!("{id}: {err}"));
                }
                if let Some(callback) = &self.trace_callback {
                    callback(&trace_entry);
                }
                trace.push(trace_entry);
                processed.insert(id);
            }
        }

        (state, trace)
    }

    fn ready_nodes(&self, graph: &CompiledGraph, remaining: &HashSet<String>, processed: &HashSet<String>) -> Vec<String> {
        remaining
            .iter()
            .filter(|id| {
                graph
                    .predecessors
                    .get(id.as_str())
                    .map(|preds| preds.iter().all(|p| processed.contains(p)))
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    async fn run_one(&self, node: Node, outputs: Arc<HashMap<String, Value>>) -> (String, TraceEntry, Option<Value>, Option<String>) {
        let start = Utc::now();
        let mut trace_entry = TraceEntry {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            node_type: node.executor,
            start_time: start.to_rfc3339(),
            end_time: None,
            duration_ms: None,
            status: TraceStatus::Running,
            input: Value::Null,
            output: None,
            error: None,
            model: None,
            tool_name: None,
            target_tool: None,
        };

        let result = match node.executor {
            NodeKind::Llm => nodes::execute_llm(&node, &outputs, self.make_client.as_ref(), &self.config, &mut trace_entry).await,
            NodeKind::Tool => nodes::execute_tool(&node, &outputs, self.registry.as_ref(), &self.config, &mut trace_entry).await,
            NodeKind::ParamGuard => {
                nodes::execute_param_guard(&node, &outputs, self.make_client.as_ref(), &self.tool_schemas, &self.config, &mut trace_entry).await
            }
        };

        let end = Utc::now();
        trace_entry.end_time = Some(end.to_rfc3339());
        trace_entry.duration_ms = Some((end - start).num_milliseconds().max(0) as u64);

        match result {
            Ok(output) => {
                trace_entry.status = TraceStatus::Success;
                trace_entry.output = Some(output.clone());
                (node.id, trace_entry, Some(output), None)
            }
            Err(err) => {
                trace_entry.status = TraceStatus::Failed;
                trace_entry.error = Some(err.to_string());
                (node.id, trace_entry, None, Some(err.to_string()))
            }
        }
    }
}
