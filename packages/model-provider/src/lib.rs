pub mod client;
pub mod config;
pub mod error;

pub use client::{ChatCompletion, ChatMessage, CompletionOptions, OpenAiCompatibleClient};
pub use config::{resolve_embedding_endpoint, resolve_guard_endpoint, resolve_llm_endpoint, EndpointConfig};
pub use error::ModelProviderError;
