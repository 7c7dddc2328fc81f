//! Rewrites a raw workflow IR, inserting one `param_guard` node between
//! each target `tool` node and every predecessor whose edge triggers the
//! need for parameter shaping. Ported from the reference implementation's
//! `GuardInjector`, including its narrow bare-`{ST<n>.output}` trigger
//! regex (a reference with a path like `{ST1.output.field}` does not
//! trigger injection — shaping a specific sub-field is left to the tool's
//! own input handling).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

use taskforge_core::{Edge, Executor, IdList, Node, WorkflowIr};

static BARE_OUTPUT_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{ST\d+\.output\}").unwrap());

fn needs_param_guard(target: &Node) -> bool {
    if target.executor != Executor::Tool {
        return false;
    }
    let encoded = serde_json::to_string(&Value::Object(target.input.clone())).unwrap_or_default();
    BARE_OUTPUT_REF.is_match(&encoded)
}

/// Looks up a tool's input schema from the catalog of tool descriptors
/// used by the planner; callers without a catalog pass an empty map.
pub type ToolSchemas = HashMap<String, Value>;

/// Inserts param-guard nodes. Idempotent: a node already consuming via
/// `__from_guard__`/`__from_guards__` no longer contains a bare
/// `{ST<n>.output}` reference, so a second pass finds nothing to inject.
pub fn inject_guards(ir: &WorkflowIr, tool_schemas: &ToolSchemas) -> WorkflowIr {
    let mut nodes: HashMap<String, Node> =
        ir.nodes.iter().map(|n| (n.id.clone(), n.clone())).collect();
    let original_inputs: HashMap<String, Map<String, Value>> =
        ir.nodes.iter().map(|n| (n.id.clone(), n.input.clone())).collect();

    let next_guard_start = ir
        .nodes
        .iter()
        .filter(|n| n.is_guard())
        .filter_map(|n| Node::numeric_suffix(&n.id))
        .max()
        .unwrap_or(0)
        + 1;
    let mut next_guard_idx = next_guard_start;

    // target_id -> ordered list of triggering predecessor ids
    let mut target_guards: HashMap<String, Vec<String>> = HashMap::new();
    let mut target_order: Vec<String> = Vec::new();
    for edge in &ir.edges {
        let Some(target_node) = nodes.get(&edge.target) else { continue };
        if !nodes.contains_key(&edge.source) {
            continue;
        }
        if needs_param_guard(target_node) {
            if !target_guards.contains_key(&edge.target) {
                target_order.push(edge.target.clone());
            }
            target_guards.entry(edge.target.clone()).or_default().push(edge.source.clone());
        }
    }

    let mut new_edges: Vec<Edge> = ir
        .edges
        .iter()
        .filter(|e| !target_guards.contains_key(&e.target))
        .cloned()
        .collect();

    for target_id in &target_order {
        let source_ids = &target_guards[target_id];
        let target_tool = nodes[target_id].tool_name.clone();
        let schema = target_tool
            .as_ref()
            .and_then(|t| tool_schemas.get(t))
            .cloned()
            .unwrap_or(Value::Object(Map::new()));
        let target_input_template = original_inputs.get(target_id).cloned().unwrap_or_default();

        let guard_id = format!("GUARD{next_guard_idx}");
        next_guard_idx += 1;

        let mut guard_input = Map::new();
        guard_input.insert(
            "source_nodes".to_string(),
            Value::Array(source_ids.iter().map(|s| Value::String(s.clone())).collect()),
        );
        guard_input.insert("target_node".to_string(), Value::String(target_id.clone()));
        guard_input.insert(
            "target_tool".to_string(),
            target_tool.clone().map(Value::String).unwrap_or(Value::Null),
        );
        guard_input.insert("target_input_template".to_string(), Value::Object(target_input_template));
        guard_input.insert("schema".to_string(), schema);

        let mut guard_node = Node::new(guard_id.clone(), Executor::ParamGuard);
        guard_node.name = format!("Shape parameters for {}", target_tool.clone().unwrap_or_else(|| target_id.clone()));
        guard_node.description =
            format!("Validates and shapes the downstream tool input for {}", target_tool.clone().unwrap_or_else(|| target_id.clone()));
        guard_node.tool_name = target_tool;
        guard_node.source = if source_ids.is_empty() {
            None
        } else {
            Some(IdList::Many(source_ids.clone()))
        };
        guard_node.target = Some(IdList::Many(vec![target_id.clone()]));
        guard_node.output = Some("Shaped downstream tool input".to_string());
        guard_node.input = guard_input;

        for source_id in source_ids {
            if let Some(source_node) = nodes.get_mut(source_id) {
                if let Some(target) = source_node.target.as_mut() {
                    target.replace(target_id, &guard_id);
                }
            }
            new_edges.push(Edge { source: source_id.clone(), target: guard_id.clone() });
        }
        new_edges.push(Edge { source: guard_id.clone(), target: target_id.clone() });

        if let Some(target_node) = nodes.get_mut(target_id) {
            let mut from_guard = Map::new();
            from_guard.insert("__from_guard__".to_string(), Value::String(guard_id.clone()));
            target_node.input = from_guard;
            target_node.source = Some(IdList::Many(vec![guard_id.clone()]));
        }

        nodes.insert(guard_id, guard_node);
    }

    let mut result = WorkflowIr {
        nodes: nodes.into_values().collect(),
        edges: new_edges,
    };
    result.sort_canonical();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_node(id: &str, tool: &str, input: Map<String, Value>) -> Node {
        let mut n = Node::new(id, Executor::Tool);
        n.tool_name = Some(tool.to_string());
        n.input = input;
        n
    }

    #[test]
    fn injects_guard_for_triggering_edge_scenario_1() {
        let mut input1 = Map::new();
        input1.insert("city".to_string(), json!("SH"));
        let st1 = tool_node("ST1", "weather_lookup", input1);

        let mut input2 = Map::new();
        input2.insert("rows".to_string(), json!("{ST1.output}"));
        let st2 = tool_node("ST2", "make_excel", input2);

        let ir = WorkflowIr {
            nodes: vec![st1, st2],
            edges: vec![Edge { source: "ST1".into(), target: "ST2".into() }],
        };

        let result = inject_guards(&ir, &ToolSchemas::new());

        let guard = result.nodes.iter().find(|n| n.is_guard()).unwrap();
        assert_eq!(guard.id, "GUARD1");
        assert_eq!(guard.executor, Executor::ParamGuard);
        assert_eq!(guard.tool_name.as_deref(), Some("make_excel"));

        let st2_after = result.node("ST2").unwrap();
        assert_eq!(st2_after.input.get("__from_guard__").unwrap(), "GUARD1");

        assert!(result.edges.contains(&Edge { source: "ST1".into(), target: "GUARD1".into() }));
        assert!(result.edges.contains(&Edge { source: "GUARD1".into(), target: "ST2".into() }));
        assert!(!result.edges.contains(&Edge { source: "ST1".into(), target: "ST2".into() }));
    }

    #[test]
    fn path_reference_does_not_trigger_injection() {
        let mut input2 = Map::new();
        input2.insert("rows".to_string(), json!("{ST1.output.days}"));
        let st1 = tool_node("ST1", "weather_lookup", Map::new());
        let st2 = tool_node("ST2", "make_excel", input2);

        let ir = WorkflowIr {
            nodes: vec![st1, st2],
            edges: vec![Edge { source: "ST1".into(), target: "ST2".into() }],
        };

        let result = inject_guards(&ir, &ToolSchemas::new());
        assert!(result.nodes.iter().all(|n| !n.is_guard()));
    }

    #[test]
    fn multiple_predecessors_share_one_guard() {
        let mut input3 = Map::new();
        input3.insert("a".to_string(), json!("{ST1.output}"));
        input3.insert("b".to_string(), json!("{ST2.output}"));
        let st1 = tool_node("ST1", "t1", Map::new());
        let st2 = tool_node("ST2", "t2", Map::new());
        let st3 = tool_node("ST3", "combine", input3);

        let ir = WorkflowIr {
            nodes: vec![st1, st2, st3],
            edges: vec![
                Edge { source: "ST1".into(), target: "ST3".into() },
                Edge { source: "ST2".into(), target: "ST3".into() },
            ],
        };

        let result = inject_guards(&ir, &ToolSchemas::new());
        let guards: Vec<_> = result.nodes.iter().filter(|n| n.is_guard()).collect();
        assert_eq!(guards.len(), 1);
        let guard = guards[0];
        let sources = guard.input.get("source_nodes").unwrap().as_array().unwrap();
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn idempotent_on_already_injected_graph() {
        let mut input2 = Map::new();
        input2.insert("rows".to_string(), json!("{ST1.output}"));
        let st1 = tool_node("ST1", "weather_lookup", Map::new());
        let st2 = tool_node("ST2", "make_excel", input2);
        let ir = WorkflowIr {
            nodes: vec![st1, st2],
            edges: vec![Edge { source: "ST1".into(), target: "ST2".into() }],
        };

        let once = inject_guards(&ir, &ToolSchemas::new());
        let twice = inject_guards(&once, &ToolSchemas::new());

        assert_eq!(once.nodes.len(), twice.nodes.len());
        assert_eq!(once.edges.len(), twice.edges.len());
    }

    #[test]
    fn non_tool_node_never_triggers_injection() {
        let mut input = Map::new();
        input.insert("prompt".to_string(), json!("{ST1.output}"));
        let mut llm = Node::new("ST2", Executor::Llm);
        llm.input = input;
        let st1 = tool_node("ST1", "t1", Map::new());

        let ir = WorkflowIr {
            nodes: vec![st1, llm],
            edges: vec![Edge { source: "ST1".into(), target: "ST2".into() }],
        };
        let result = inject_guards(&ir, &ToolSchemas::new());
        assert!(result.nodes.iter().all(|n| !n.is_guard()));
    }
}
