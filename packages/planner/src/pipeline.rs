//! The five-stage planning pipeline: task optimization, draft-with-retrieval,
//! concretization, an auto-fix loop bounded by `max_fix_attempts`, and a
//! final build-and-validate pass. Ported from `src/subtask_planner.py`'s
//! `SubtaskPlanner`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use taskforge_core::error::{PlanningStage, Result, TaskforgeError};
use taskforge_core::extract::{extract_json, validate_workflow_structure};
use taskforge_core::model::{Edge, Node, WorkflowIr};
use taskforge_guard::{inject_guards, validate as validate_ir, ToolSchemas};
use taskforge_model_provider::{ChatCompletion, ChatMessage, CompletionOptions};
use taskforge_retriever::{retrieve_subset, EmbeddingProvider, RetrieverMode, ToolCatalog};

use crate::config::PlannerConfig;
use crate::extract_hints::{extract_missing_tool_queries, extract_tool_names_from_stage1, filter_tools_by_name};
use crate::last_run::{truncate_chars, FixAttempt, LastRun};
use crate::optimizer::TaskOptimizer;
use crate::prompts::{render_stage1, render_stage2, PLAN_SYSTEM};
use crate::tool_payload::build_stage1_tools_payload;

pub struct Planner {
    config: PlannerConfig,
    client: Arc<dyn ChatCompletion>,
    model: String,
    task_optimizer: TaskOptimizer,
    tools_definition: ToolCatalog,
    tool_schemas: ToolSchemas,
    retriever_mode: RetrieverMode,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    embedding_cache_path: PathBuf,
    catalog_path: Option<PathBuf>,
}

impl Planner {
    pub fn new(
        client: Arc<dyn ChatCompletion>,
        model: impl Into<String>,
        tools_definition: ToolCatalog,
        config: PlannerConfig,
        retriever_mode: RetrieverMode,
        embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
        embedding_cache_path: PathBuf,
        catalog_path: Option<PathBuf>,
    ) -> Self {
        let model = model.into();
        let tool_schemas: ToolSchemas = tools_definition
            .iter()
            .map(|(name, meta)| (name.clone(), meta.input_schema.clone()))
            .collect();
        let task_optimizer =
            TaskOptimizer::new(client.clone(), model.clone(), config.enable_task_optimization);

        Planner {
            config,
            client,
            model,
            task_optimizer,
            tools_definition,
            tool_schemas,
            retriever_mode,
            embedding_provider,
            embedding_cache_path,
            catalog_path,
        }
    }

    async fn call_planner_llm(
        &self,
        messages: &[ChatMessage],
    ) -> std::result::Result<String, taskforge_model_provider::ModelProviderError> {
        self.client
            .complete(messages, &CompletionOptions::default())
            .await
            .map(|s| s.trim().to_string())
    }

    async fn retrieve(&self, catalog: &ToolCatalog, task: &str, top_k: usize) -> Option<ToolCatalog> {
        retrieve_subset(
            catalog,
            self.retriever_mode,
            task,
            top_k,
            &self.config.pinned_tools,
            self.embedding_provider.as_deref(),
            self.embedding_cache_path.clone(),
            self.catalog_path.clone(),
        )
        .await
    }

    pub async fn plan(&self, task: &str) -> Result<(WorkflowIr, LastRun)> {
        let mut last_run = LastRun { task: task.to_string(), ..Default::default() };

        let optimized_task = self.task_optimizer.optimize(task).await;
        last_run.optimized_task = Some(optimized_task.clone());

        let raw_json = self.generate_workflow_json(&optimized_task, &mut last_run).await?;
        last_run.raw_json = Some(raw_json.clone());

        let fixed = self.auto_fix_json(&raw_json, &optimized_task, &mut last_run).await.map_err(
            |e| {
                last_run.error = Some(e.to_string());
                last_run.error_stage = Some(PlanningStage::AutoFixJson.to_string());
                e
            },
        )?;
        last_run.fixed_json = Some(fixed.clone());

        let ir = self.build_workflow_ir(fixed, &last_run).map_err(|e| {
            last_run.error = Some(e.to_string());
            last_run.error_stage = Some(PlanningStage::BuildWorkflowIr.to_string());
            e
        })?;

        Ok((ir, last_run))
    }

    async fn generate_workflow_json(&self, task: &str, last_run: &mut LastRun) -> Result<String> {
        let subset = self.retrieve(&self.tools_definition, task, self.config.tool_retriever_top_k).await;
        let mut tools_content = subset.unwrap_or_else(|| self.tools_definition.clone());
        tracing::info!(
            selected = tools_content.len(),
            total = self.tools_definition.len(),
            "tool retriever selected a subset for planning"
        );

        let mut stage1_json = serde_json::to_string(&build_stage1_tools_payload(&tools_content))
            .unwrap_or_else(|_| "[]".to_string());
        let stage1_prompt = render_stage1(&stage1_json, task);
        let mut stage1_content = self
            .call_planner_llm(&[ChatMessage::system(PLAN_SYSTEM), ChatMessage::user(stage1_prompt)])
            .await
            .map_err(|e| TaskforgeError::planning(PlanningStage::Draft, e.to_string()))?;
        last_run.draft_json_raw = Some(stage1_content.clone());

        let mut draft_json = if stage1_content.is_empty() {
            tracing::error!("stage 1: LLM returned empty content");
            String::new()
        } else {
            match extract_json(&stage1_content) {
                Ok(v) => v.to_string(),
                Err(_) => {
                    tracing::warn!("stage 1: failed to extract JSON, using raw content");
                    stage1_content.clone()
                }
            }
        };
        last_run.draft_json = Some(draft_json.clone());

        let initial_missing = extract_missing_tool_queries(&draft_json);
        if !initial_missing.is_empty() {
            let mut extra_tools = ToolCatalog::new();
            for query in &initial_missing {
                if let Some(more) =
                    self.retrieve(&self.tools_definition, query, self.config.tool_retriever_expand_k).await
                {
                    extra_tools.extend(more);
                }
            }
            if !extra_tools.is_empty() {
                let mut expanded = tools_content.clone();
                expanded.extend(extra_tools);
                if expanded.len() > tools_content.len() {
                    tracing::info!(
                        from = tools_content.len(),
                        to = expanded.len(),
                        "stage 1: expanded tools based on missing_tools"
                    );
                    stage1_json = serde_json::to_string(&build_stage1_tools_payload(&expanded))
                        .unwrap_or_else(|_| "[]".to_string());
                    let retry_prompt = render_stage1(&stage1_json, task);
                    stage1_content = self
                        .call_planner_llm(&[
                            ChatMessage::system(PLAN_SYSTEM),
                            ChatMessage::user(retry_prompt),
                        ])
                        .await
                        .map_err(|e| TaskforgeError::planning(PlanningStage::Draft, e.to_string()))?;
                    last_run.draft_json_raw = Some(stage1_content.clone());
                    if !stage1_content.is_empty() {
                        draft_json = match extract_json(&stage1_content) {
                            Ok(v) => v.to_string(),
                            Err(_) => {
                                tracing::warn!("stage 1 retry: failed to extract JSON, using raw content");
                                stage1_content.clone()
                            }
                        };
                    }
                    last_run.draft_json = Some(draft_json.clone());
                    tools_content = expanded;
                }
            }
        }

        last_run.stage1_missing_tool_queries = extract_missing_tool_queries(&draft_json);

        let selected_tool_names = extract_tool_names_from_stage1(&draft_json);
        last_run.stage1_selected_tool_names = Some(selected_tool_names.clone());

        let stage2_tools_content = filter_tools_by_name(&self.tools_definition, &selected_tool_names);
        if !selected_tool_names.is_empty() && stage2_tools_content.is_empty() {
            tracing::warn!("stage 2: no selected tools matched available tools");
        }
        if selected_tool_names.is_empty() {
            tracing::warn!("stage 2: no tools selected in stage 1");
        }
        let stage2_tools_json =
            serde_json::to_string(&stage2_tools_content).unwrap_or_else(|_| "{}".to_string());
        last_run.stage2_tools_json = Some(stage2_tools_json.clone());
        last_run.stage2_tools = stage2_tools_content.keys().cloned().collect();

        let stage2_prompt = render_stage2(&stage2_tools_json, task, &draft_json);
        let stage2_content = self
            .call_planner_llm(&[ChatMessage::system(PLAN_SYSTEM), ChatMessage::user(stage2_prompt)])
            .await
            .map_err(|e| TaskforgeError::planning(PlanningStage::Concretize, e.to_string()))?;

        if stage2_content.is_empty() {
            tracing::error!("stage 2: LLM returned empty content");
            return Ok("{}".to_string());
        }

        match extract_json(&stage2_content) {
            Ok(v) => Ok(v.to_string()),
            Err(_) => {
                tracing::warn!("stage 2: failed to extract JSON, entering auto-fix");
                Ok(stage2_content)
            }
        }
    }

    async fn auto_fix_json(&self, raw_json: &str, task: &str, last_run: &mut LastRun) -> Result<Value> {
        let mut current = raw_json.to_string();

        for attempt in 1..=self.config.max_fix_attempts {
            tracing::info!(attempt, "attempting to parse/fix planner JSON");
            match extract_json(&current).and_then(|v| {
                if validate_workflow_structure(&v) {
                    Ok(v)
                } else {
                    Err(TaskforgeError::Extraction)
                }
            }) {
                Ok(parsed) => {
                    let nodes_count = parsed.get("nodes").and_then(|v| v.as_array()).map(|a| a.len());
                    let edges_count = parsed.get("edges").and_then(|v| v.as_array()).map(|a| a.len());
                    last_run.fix_attempts.push(FixAttempt {
                        attempt,
                        status: "success".to_string(),
                        input_snippet: truncate_chars(&current, self.config.log_truncate_length),
                        output_snippet: Some(truncate_chars(
                            &parsed.to_string(),
                            self.config.log_truncate_length,
                        )),
                        error: None,
                        nodes_count,
                        edges_count,
                    });
                    tracing::info!(
                        nodes = nodes_count.unwrap_or(0),
                        edges = edges_count.unwrap_or(0),
                        "planner JSON fix succeeded"
                    );
                    return Ok(parsed);
                }
                Err(e) => {
                    last_run.fix_attempts.push(FixAttempt {
                        attempt,
                        status: "failed".to_string(),
                        input_snippet: truncate_chars(&current, self.config.log_truncate_length),
                        output_snippet: None,
                        error: Some(e.to_string()),
                        nodes_count: None,
                        edges_count: None,
                    });

                    if attempt == self.config.max_fix_attempts {
                        break;
                    }

                    let tools_json = last_run.stage2_tools_json.clone().unwrap_or_else(|| "{}".to_string());
                    let draft = last_run
                        .draft_json
                        .clone()
                        .or_else(|| last_run.draft_json_raw.clone())
                        .unwrap_or_default();
                    let original_prompt = render_stage2(&tools_json, task, &draft);
                    let truncated =
                        truncate_chars(&current, self.config.fix_prompt_truncate_length);
                    let fix_prompt = format!(
                        "{original_prompt}\n\n---\n\nThe previous response did not meet the requirements:\n\n```\n{truncated}\n```\n\nRegenerate the complete workflow JSON. Do not include <think> tags or any explanation — output raw JSON only."
                    );

                    current = self
                        .call_planner_llm(&[ChatMessage::user(fix_prompt)])
                        .await
                        .map_err(|e| TaskforgeError::planning(PlanningStage::AutoFixJson, e.to_string()))?;
                    tracing::info!("retrying planner JSON fix based on LLM response");
                }
            }
        }

        tracing::error!(attempts = self.config.max_fix_attempts, "all fix attempts failed");
        Err(TaskforgeError::planning(
            PlanningStage::AutoFixJson,
            format!("{} fix attempts failed: unable to generate valid JSON", self.config.max_fix_attempts),
        ))
    }

    fn build_workflow_ir(&self, fixed_json: Value, last_run: &LastRun) -> Result<WorkflowIr> {
        let nodes: Vec<Node> = serde_json::from_value(
            fixed_json.get("nodes").cloned().unwrap_or(Value::Array(vec![])),
        )
        .map_err(|e| TaskforgeError::planning(PlanningStage::BuildWorkflowIr, e.to_string()))?;
        let edges: Vec<Edge> = serde_json::from_value(
            fixed_json.get("edges").cloned().unwrap_or(Value::Array(vec![])),
        )
        .map_err(|e| TaskforgeError::planning(PlanningStage::BuildWorkflowIr, e.to_string()))?;

        let ir = WorkflowIr { nodes, edges };
        let ir = inject_guards(&ir, &self.tool_schemas);

        let available_tools: HashSet<String> = match &last_run.stage1_selected_tool_names {
            Some(names) => names.iter().cloned().collect(),
            None => self.tools_definition.keys().cloned().collect(),
        };

        let validation = validate_ir(&ir, &available_tools);
        if !validation.is_valid() {
            tracing::error!(errors = ?validation.errors, "graph validation failed");
            return Err(TaskforgeError::Validation {
                errors: validation.errors,
                warnings: validation.warnings,
            });
        }
        if !validation.warnings.is_empty() {
            tracing::warn!(warnings = ?validation.warnings, "graph validation warnings");
        }

        Ok(ir)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}
