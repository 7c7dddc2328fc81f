pub mod error;
pub mod extract;
pub mod model;
pub mod resolver;
pub mod truncate;

pub use error::{PlanningStage, Result, TaskforgeError};
pub use model::{Edge, Executor, IdList, LlmConfig, Node, RunState, TraceEntry, TraceStatus, WorkflowIr};
