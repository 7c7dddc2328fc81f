pub mod bm25;
pub mod semantic;
pub mod tool_doc;

pub use bm25::BM25Retriever;
pub use semantic::{EmbeddingProvider, OpenAiEmbeddingClient, SemanticRetriever};
pub use tool_doc::{ToolCatalog, ToolDescriptor, ToolDoc};

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieverMode {
    Bm25,
    Semantic,
}

impl RetrieverMode {
    pub fn from_env() -> Self {
        match std::env::var("RETRIEVER_MODE").as_deref() {
            Ok("semantic") => RetrieverMode::Semantic,
            _ => RetrieverMode::Bm25,
        }
    }
}

/// Combines a ranking backend with the configured pin set: any pinned tool
/// present in the catalog but missing from the ranked subset is appended
/// regardless of score. Returns `None` only when both the ranking and the
/// pin set produced nothing, matching the reference implementation's
/// `retrieve_subset` contract.
pub async fn retrieve_subset(
    catalog: &ToolCatalog,
    mode: RetrieverMode,
    task: &str,
    top_k: usize,
    pinned_tools: &[String],
    embedding_provider: Option<&dyn EmbeddingProvider>,
    embedding_cache_path: PathBuf,
    catalog_path: Option<PathBuf>,
) -> Option<ToolCatalog> {
    let ranked: Vec<(String, f64)> = match mode {
        RetrieverMode::Bm25 => BM25Retriever::new(catalog).retrieve(task, top_k),
        RetrieverMode::Semantic => {
            let retriever =
                SemanticRetriever::new(catalog, embedding_provider, embedding_cache_path, catalog_path)
                    .await;
            retriever.retrieve(task, top_k, embedding_provider).await
        }
    };

    let mut result: ToolCatalog = ranked
        .into_iter()
        .filter_map(|(name, _score)| catalog.get(&name).map(|meta| (name, meta.clone())))
        .collect();

    for name in pinned_tools {
        if catalog.contains_key(name) && !result.contains_key(name) {
            result.insert(name.clone(), catalog[name].clone());
        }
    }

    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}
