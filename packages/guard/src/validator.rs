//! Workflow IR invariant checker. Every check runs and accumulates into a
//! single result; only errors fail validation, warnings are advisory.
//! Ported from the reference implementation's `GraphValidator`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use taskforge_core::{Executor, Node, WorkflowIr};

static ST_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ST(\d+)$").unwrap());
static GUARD_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^GUARD(\d+)$").unwrap());
static VARIABLE_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\.output\}").unwrap());

#[derive(Debug, Default, Clone)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

pub fn validate(ir: &WorkflowIr, available_tools: &HashSet<String>) -> ValidationResult {
    let mut result = ValidationResult::default();
    validate_node_ids(&ir.nodes, &mut result);
    validate_edges_reference(ir, &mut result);
    validate_dag(ir, &mut result);
    validate_tools(&ir.nodes, available_tools, &mut result);
    validate_connectivity(ir, &mut result);
    validate_input_output(ir, &mut result);
    result
}

fn validate_node_ids(nodes: &[Node], result: &mut ValidationResult) {
    if nodes.is_empty() {
        result.error("nodes list is empty");
        return;
    }

    let mut counts: HashMap<&str, u32> = HashMap::new();
    for n in nodes {
        *counts.entry(n.id.as_str()).or_insert(0) += 1;
    }
    for (id, count) in &counts {
        if *count > 1 {
            result.error(format!("node id '{id}' appears {count} times"));
        }
    }

    let mut st_nums = HashSet::new();
    let mut guard_nums = HashSet::new();
    let mut st_count = 0usize;
    let mut guard_count = 0usize;

    for n in nodes {
        if let Some(caps) = ST_ID.captures(&n.id) {
            st_count += 1;
            if let Ok(num) = caps[1].parse::<u64>() {
                st_nums.insert(num);
            }
        } else if let Some(caps) = GUARD_ID.captures(&n.id) {
            guard_count += 1;
            if let Ok(num) = caps[1].parse::<u64>() {
                guard_nums.insert(num);
            }
        } else {
            result.error(format!("node id '{}' does not match 'ST<n>' or 'GUARD<n>'", n.id));
        }
    }

    check_dense(st_count, &st_nums, "ST", result);
    check_dense(guard_count, &guard_nums, "GUARD", result);
}

fn check_dense(count: usize, actual: &HashSet<u64>, family: &str, result: &mut ValidationResult) {
    if count == 0 {
        return;
    }
    let expected: HashSet<u64> = (1..=count as u64).collect();
    if expected != *actual {
        let mut missing: Vec<u64> = expected.difference(actual).copied().collect();
        missing.sort();
        let mut extra: Vec<u64> = actual.difference(&expected).copied().collect();
        extra.sort();
        if !missing.is_empty() {
            result.error(format!("{family} node numbering is not dense, missing: {missing:?}"));
        }
        if !extra.is_empty() {
            result.error(format!("{family} node numbering out of range: {extra:?}"));
        }
    }
}

fn validate_edges_reference(ir: &WorkflowIr, result: &mut ValidationResult) {
    let node_ids: HashSet<&str> = ir.nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in &ir.edges {
        if !node_ids.contains(edge.source.as_str()) {
            result.error(format!("edge references non-existent source node: {}", edge.source));
        }
        if !node_ids.contains(edge.target.as_str()) {
            result.error(format!("edge references non-existent target node: {}", edge.target));
        }
    }

    let edge_set: HashSet<(&str, &str)> =
        ir.edges.iter().map(|e| (e.source.as_str(), e.target.as_str())).collect();

    for node in &ir.nodes {
        if let Some(source) = &node.source {
            for source_id in source.as_vec() {
                if !node_ids.contains(source_id.as_str()) {
                    result.error(format!("node {}'s source '{source_id}' does not exist", node.id));
                } else if !edge_set.contains(&(source_id.as_str(), node.id.as_str())) {
                    result.warn(format!(
                        "node {} declares source '{source_id}' but no matching edge exists",
                        node.id
                    ));
                }
            }
        }
        if let Some(target) = &node.target {
            for target_id in target.as_vec() {
                if !node_ids.contains(target_id.as_str()) {
                    result.error(format!("node {}'s target '{target_id}' does not exist", node.id));
                } else if !edge_set.contains(&(node.id.as_str(), target_id.as_str())) {
                    result.warn(format!(
                        "node {} declares target '{target_id}' but no matching edge exists",
                        node.id
                    ));
                }
            }
        }
    }
}

fn validate_dag(ir: &WorkflowIr, result: &mut ValidationResult) {
    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    for n in &ir.nodes {
        graph.entry(n.id.as_str()).or_default();
    }
    for e in &ir.edges {
        if let Some(succ) = graph.get_mut(e.source.as_str()) {
            succ.push(e.target.as_str());
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut rec_stack: HashSet<&str> = HashSet::new();

    fn dfs<'a>(
        node: &'a str,
        graph: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<&'a str>> {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        if let Some(neighbors) = graph.get(node) {
            for &neighbor in neighbors {
                if !visited.contains(neighbor) {
                    if let Some(cycle) = dfs(neighbor, graph, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(neighbor) {
                    let start = path.iter().position(|&n| n == neighbor).unwrap_or(0);
                    let mut cycle: Vec<&str> = path[start..].to_vec();
                    cycle.push(neighbor);
                    return Some(cycle);
                }
            }
        }

        rec_stack.remove(node);
        path.pop();
        None
    }

    let node_ids: Vec<&str> = graph.keys().copied().collect();
    for id in node_ids {
        if !visited.contains(id) {
            let mut path = Vec::new();
            if let Some(cycle) = dfs(id, &graph, &mut visited, &mut rec_stack, &mut path) {
                result.error(format!("cycle detected: {}", cycle.join(" -> ")));
                break;
            }
        }
    }
}

fn validate_tools(nodes: &[Node], available_tools: &HashSet<String>, result: &mut ValidationResult) {
    for n in nodes {
        if n.executor == Executor::Tool {
            match &n.tool_name {
                None => result.error(format!("node {}'s executor is 'tool' but tool_name is empty", n.id)),
                Some(name) if !available_tools.is_empty() && !available_tools.contains(name) => {
                    result.error(format!("node {} uses tool '{name}' which is not in the available tool list", n.id));
                }
                _ => {}
            }
        }
    }
}

fn validate_connectivity(ir: &WorkflowIr, result: &mut ValidationResult) {
    if ir.nodes.len() <= 1 {
        return;
    }

    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    for n in &ir.nodes {
        graph.entry(n.id.as_str()).or_default();
    }
    for e in &ir.edges {
        if let Some(succ) = graph.get_mut(e.source.as_str()) {
            succ.push(e.target.as_str());
        }
    }

    let start_nodes: Vec<&str> = ir
        .nodes
        .iter()
        .filter(|n| n.source.as_ref().map(|s| s.as_vec().is_empty()).unwrap_or(true))
        .map(|n| n.id.as_str())
        .collect();
    let end_nodes: Vec<&str> = ir
        .nodes
        .iter()
        .filter(|n| n.target.as_ref().map(|t| t.as_vec().is_empty()).unwrap_or(true))
        .map(|n| n.id.as_str())
        .collect();

    if start_nodes.is_empty() {
        result.error("no start node found (a node with empty source)");
    }
    if end_nodes.is_empty() {
        result.error("no end node found (a node with empty target)");
    }

    if !start_nodes.is_empty() {
        let mut reachable: HashSet<&str> = HashSet::new();
        let mut stack = start_nodes.clone();
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            if let Some(succ) = graph.get(id) {
                stack.extend(succ.iter().copied());
            }
        }
        let all: HashSet<&str> = ir.nodes.iter().map(|n| n.id.as_str()).collect();
        let mut unreachable: Vec<&str> = all.difference(&reachable).copied().collect();
        if !unreachable.is_empty() {
            unreachable.sort();
            result.error(format!("nodes unreachable from any start node: {unreachable:?}"));
        }
    }
}

fn validate_input_output(ir: &WorkflowIr, result: &mut ValidationResult) {
    let node_ids: HashSet<&str> = ir.nodes.iter().map(|n| n.id.as_str()).collect();
    let existing_edges: HashSet<(&str, &str)> =
        ir.edges.iter().map(|e| (e.source.as_str(), e.target.as_str())).collect();

    for node in &ir.nodes {
        for (key, value) in &node.input {
            if let Some(s) = value.as_str() {
                for caps in VARIABLE_REF.captures_iter(s) {
                    let ref_id = &caps[1];
                    if !node_ids.contains(ref_id) {
                        result.error(format!(
                            "node {}'s parameter '{key}' references non-existent node: {ref_id}",
                            node.id
                        ));
                        continue;
                    }
                    if ref_id == node.id {
                        result.error(format!(
                            "node {}'s parameter '{key}' references its own output",
                            node.id
                        ));
                        continue;
                    }
                    if !existing_edges.contains(&(ref_id, node.id.as_str())) {
                        result.warn(format!(
                            "node {} references {ref_id}'s output in '{key}' with no direct edge {ref_id}->{}; verify execution order",
                            node.id, node.id
                        ));
                    }
                }
            }
        }

        if node.output.as_deref().unwrap_or("").is_empty() {
            result.warn(format!("node {} is missing its output field (descriptive, recommended)", node.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskforge_core::{Edge, IdList};

    fn node(id: &str, executor: Executor) -> Node {
        Node::new(id, executor)
    }

    #[test]
    fn empty_nodes_is_error() {
        let ir = WorkflowIr::default();
        let result = validate(&ir, &HashSet::new());
        assert!(!result.is_valid());
    }

    #[test]
    fn single_node_no_edges_is_valid() {
        let mut n = node("ST1", Executor::Llm);
        n.output = Some("result".into());
        let ir = WorkflowIr { nodes: vec![n], edges: vec![] };
        let result = validate(&ir, &HashSet::new());
        assert!(result.is_valid(), "{:?}", result.errors);
    }

    #[test]
    fn cycle_of_two_is_error_naming_both() {
        let mut st1 = node("ST1", Executor::Llm);
        st1.source = Some(IdList::One("ST2".into()));
        st1.target = Some(IdList::One("ST2".into()));
        let mut st2 = node("ST2", Executor::Llm);
        st2.source = Some(IdList::One("ST1".into()));
        st2.target = Some(IdList::One("ST1".into()));

        let ir = WorkflowIr {
            nodes: vec![st1, st2],
            edges: vec![
                Edge { source: "ST1".into(), target: "ST2".into() },
                Edge { source: "ST2".into(), target: "ST1".into() },
            ],
        };
        let result = validate(&ir, &HashSet::new());
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("ST1") && e.contains("ST2")));
    }

    #[test]
    fn duplicate_ids_are_errors() {
        let ir = WorkflowIr {
            nodes: vec![node("ST1", Executor::Llm), node("ST1", Executor::Llm)],
            edges: vec![],
        };
        let result = validate(&ir, &HashSet::new());
        assert!(result.errors.iter().any(|e| e.contains("duplicate") || e.contains("appears")));
    }

    #[test]
    fn non_dense_numbering_is_error() {
        let ir = WorkflowIr {
            nodes: vec![node("ST1", Executor::Llm), node("ST3", Executor::Llm)],
            edges: vec![Edge { source: "ST1".into(), target: "ST3".into() }],
        };
        let result = validate(&ir, &HashSet::new());
        assert!(!result.is_valid());
    }

    #[test]
    fn tool_node_missing_name_is_error() {
        let ir = WorkflowIr { nodes: vec![node("ST1", Executor::Tool)], edges: vec![] };
        let result = validate(&ir, &HashSet::new());
        assert!(!result.is_valid());
    }

    #[test]
    fn tool_not_in_allowlist_is_error() {
        let mut n = node("ST1", Executor::Tool);
        n.tool_name = Some("unknown_tool".into());
        let ir = WorkflowIr { nodes: vec![n], edges: vec![] };
        let mut allowed = HashSet::new();
        allowed.insert("other_tool".to_string());
        let result = validate(&ir, &allowed);
        assert!(!result.is_valid());
    }

    #[test]
    fn unreachable_node_is_error() {
        let mut st1 = node("ST1", Executor::Llm);
        st1.target = Some(IdList::One("ST2".into()));
        let mut st2 = node("ST2", Executor::Llm);
        st2.source = Some(IdList::One("ST1".into()));
        let isolated = node("ST3", Executor::Llm);

        let ir = WorkflowIr {
            nodes: vec![st1, st2, isolated],
            edges: vec![Edge { source: "ST1".into(), target: "ST2".into() }],
        };
        let result = validate(&ir, &HashSet::new());
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("ST3")));
    }

    #[test]
    fn self_reference_is_error() {
        let mut n = node("ST1", Executor::Llm);
        n.input.insert("x".into(), json!("{ST1.output}"));
        let ir = WorkflowIr { nodes: vec![n], edges: vec![] };
        let result = validate(&ir, &HashSet::new());
        assert!(!result.is_valid());
    }

    #[test]
    fn indirect_reference_without_edge_is_warning_not_error() {
        let mut st1 = node("ST1", Executor::Llm);
        st1.target = Some(IdList::One("ST2".into()));
        let mut st2 = node("ST2", Executor::Llm);
        st2.input.insert("x".into(), json!("{ST1.output}"));
        st2.source = None; // no declared source, no edge to ST1 either

        let ir = WorkflowIr {
            nodes: vec![st1, st2],
            edges: vec![],
        };
        let result = validate(&ir, &HashSet::new());
        // the missing edge from the perspective of connectivity (no start/end) will
        // itself produce errors in this minimal fixture; isolate the data-flow check:
        assert!(result.warnings.iter().any(|w| w.contains("no direct edge")));
    }
}
