//! Stage 0: best-effort task optimization. Grounded in
//! `original_source/src/task_optimizer.py` — any failure degrades to the
//! verbatim task rather than aborting planning.

use std::sync::Arc;

use taskforge_model_provider::{ChatCompletion, ChatMessage, CompletionOptions};

use crate::prompts::{optimize_prompt, OPTIMIZE_SYSTEM};

pub struct TaskOptimizer {
    client: Arc<dyn ChatCompletion>,
    model: String,
    enabled: bool,
}

impl TaskOptimizer {
    pub fn new(client: Arc<dyn ChatCompletion>, model: impl Into<String>, enabled: bool) -> Self {
        TaskOptimizer { client, model: model.into(), enabled }
    }

    pub async fn optimize(&self, task: &str) -> String {
        if task.trim().is_empty() {
            tracing::warn!("empty task provided, skipping optimization");
            return task.to_string();
        }
        if !self.enabled {
            tracing::info!("task optimization disabled, using original task");
            return task.to_string();
        }

        let messages = vec![
            ChatMessage::system(OPTIMIZE_SYSTEM),
            ChatMessage::user(optimize_prompt(task)),
        ];
        let opts = CompletionOptions { temperature: Some(0.3), max_tokens: Some(500) };

        match self.client.complete(&messages, &opts).await {
            Ok(text) => {
                let optimized = text.trim();
                if optimized.is_empty() {
                    tracing::warn!("optimizer returned empty result, using original task");
                    task.to_string()
                } else {
                    if optimized != task {
                        tracing::info!(original = task, optimized, "task optimized");
                    }
                    optimized.to_string()
                }
            }
            Err(err) => {
                tracing::error!(%err, "task optimization failed, using original task");
                task.to_string()
            }
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}
