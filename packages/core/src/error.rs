//! Typed errors for every component boundary. Each variant names the
//! nearest natural failure point; the outermost CLI/transport boundary is
//! expected to fold these into `anyhow::Error` for uniform reporting.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanningStage {
    Optimize,
    Draft,
    Concretize,
    AutoFixJson,
    BuildWorkflowIr,
}

impl std::fmt::Display for PlanningStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlanningStage::Optimize => "optimize",
            PlanningStage::Draft => "draft",
            PlanningStage::Concretize => "concretize",
            PlanningStage::AutoFixJson => "auto_fix_json",
            PlanningStage::BuildWorkflowIr => "build_workflow_ir",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum TaskforgeError {
    #[error("planning failed at stage {stage}: {message}")]
    Planning {
        stage: PlanningStage,
        message: String,
    },

    #[error("workflow validation failed: {} error(s), {} warning(s): {}", errors.len(), warnings.len(), errors.join("; "))]
    Validation {
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    #[error("could not extract a JSON object from the model response")]
    Extraction,

    #[error("param guard failed: {message}")]
    Guard {
        message: String,
        raw_response: Option<String>,
    },

    #[error("tool '{tool_name}' failed: {detail}")]
    ToolFailure { tool_name: String, detail: String },

    #[error("node '{node_id}' execution failed: {message}")]
    ExecutionFailure { node_id: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskforgeError {
    pub fn planning(stage: PlanningStage, message: impl Into<String>) -> Self {
        TaskforgeError::Planning {
            stage,
            message: message.into(),
        }
    }

    pub fn guard(message: impl Into<String>, raw_response: Option<String>) -> Self {
        TaskforgeError::Guard {
            message: message.into(),
            raw_response,
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskforgeError>;
