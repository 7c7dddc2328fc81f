//! Prompt templates for the optimization and two planning stages.
//! Rendering is a plain substring substitution rather than `format!` since
//! the payloads are raw JSON and may contain brace characters.

pub const OPTIMIZE_SYSTEM: &str =
    "You are a task optimization assistant. Output the optimized task only.";

pub const PLAN_SYSTEM: &str = "You are a workflow planning assistant. Output JSON only.";

const STAGE1_TEMPLATE: &str = r#"You are drafting a workflow plan as JSON.

Available tools:
{tools}

Task: {task}

Produce a JSON object with:
- "nodes": a list of subtasks, each an object with "id" (ST1, ST2, ...), "name",
  "description", "executor" ("llm" or "tool"), "tool_name" (if executor is "tool"),
  and "input" (a map of parameter name to value or a "{NodeId.output}" reference).
- "edges": a list of {"source": ..., "target": ...} pairs connecting node ids.
- "missing_tools": a list of {"capability": ..., "keywords": [...]} for any
  capability you could not find a matching tool for. Omit or leave empty if none.

Output JSON only, no explanation."#;

const STAGE2_TEMPLATE: &str = r#"You are concretizing a draft workflow plan into its final form.

Available tools:
{tools}

Task: {task}

Draft plan:
{draft}

Refine the draft into a complete, executable workflow with the same JSON shape
("nodes" and "edges"), filling in every node's "input" with concrete values or
"{NodeId.output}" references to a predecessor's output. Output JSON only."#;

pub fn render_stage1(tools_json: &str, task: &str) -> String {
    STAGE1_TEMPLATE.replace("{tools}", tools_json).replace("{task}", task)
}

pub fn render_stage2(tools_json: &str, task: &str, draft_json: &str) -> String {
    STAGE2_TEMPLATE
        .replace("{tools}", tools_json)
        .replace("{task}", task)
        .replace("{draft}", draft_json)
}

pub fn optimize_prompt(task: &str) -> String {
    format!(
        "The following task description may be missing details needed to execute it. \
Fill in any obviously missing information (time window, output format, data scope, \
vague verbs like \"analyze\") using sensible defaults, while keeping the original intent \
unchanged. If the task is already specific enough, return it unchanged.\n\n\
Task: {task}\n\n\
Output only the optimized task description, with no explanation or prefix."
    )
}
