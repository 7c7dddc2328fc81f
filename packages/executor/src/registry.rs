//! The tool registry collaborator contract. Real tool integrations (MCP
//! servers, HTTP-backed tools, etc.) live outside this crate; this module
//! only defines the seam the executor calls through.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolRegistryError {
    #[error("tool '{0}' not found")]
    NotFound(String),
    #[error("tool '{0}' invocation failed: {1}")]
    InvocationFailed(String, String),
}

/// Safe for concurrent `has`/`schema`/`invoke` from multiple in-flight nodes;
/// the executor holds no locks of its own around it.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    fn has(&self, name: &str) -> bool;
    fn schema(&self, name: &str) -> Option<Value>;
    async fn invoke(&self, name: &str, args: Map<String, Value>) -> Result<Value, ToolRegistryError>;
}

/// A registry with no tools, useful for wiring a runnable binary before a
/// real tool backend is plugged in.
pub struct NullToolRegistry;

#[async_trait]
impl ToolRegistry for NullToolRegistry {
    fn has(&self, _name: &str) -> bool {
        false
    }

    fn schema(&self, _name: &str) -> Option<Value> {
        None
    }

    async fn invoke(&self, name: &str, _args: Map<String, Value>) -> Result<Value, ToolRegistryError> {
        Err(ToolRegistryError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;

    pub struct StaticToolRegistry {
        pub responses: HashMap<String, Value>,
    }

    impl StaticToolRegistry {
        pub fn new() -> Self {
            StaticToolRegistry { responses: HashMap::new() }
        }

        pub fn with(mut self, name: &str, response: Value) -> Self {
            self.responses.insert(name.to_string(), response);
            self
        }
    }

    #[async_trait]
    impl ToolRegistry for StaticToolRegistry {
        fn has(&self, name: &str) -> bool {
            self.responses.contains_key(name)
        }

        fn schema(&self, _name: &str) -> Option<Value> {
            None
        }

        async fn invoke(&self, name: &str, _args: Map<String, Value>) -> Result<Value, ToolRegistryError> {
            self.responses
                .get(name)
                .cloned()
                .ok_or_else(|| ToolRegistryError::NotFound(name.to_string()))
        }
    }
}
