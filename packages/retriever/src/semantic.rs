//! Embedding-cosine-similarity retrieval backend with a disk cache keyed
//! by catalog file mtime and exact name-list equality.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path as FsPath, PathBuf};

use crate::tool_doc::{build_docs, ToolCatalog, ToolDoc};
use taskforge_model_provider::{resolve_embedding_endpoint, EndpointConfig};

const FALLBACK_DIM: usize = 1536;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns `None` if the embedding call fails; callers substitute a
    /// zero vector for that single tool rather than failing the whole
    /// backend.
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

#[derive(Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingApiDatum>,
}

#[derive(Deserialize)]
struct EmbeddingApiDatum {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbeddingClient {
    http: reqwest::Client,
    endpoint: EndpointConfig,
}

impl OpenAiEmbeddingClient {
    pub fn from_env() -> Option<Self> {
        let endpoint = resolve_embedding_endpoint();
        if endpoint.base_url.is_none() || endpoint.api_key.is_none() {
            return None;
        }
        let http = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .ok()?;
        Some(OpenAiEmbeddingClient { http, endpoint })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let base = self.endpoint.base_url.as_deref()?;
        let url = format!("{}/embeddings", base.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(self.endpoint.api_key.as_deref().unwrap_or_default())
            .json(&serde_json::json!({"input": text, "model": self.endpoint.model}))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let parsed: EmbeddingApiResponse = response.json().await.ok()?;
        parsed.data.into_iter().next().map(|d| d.embedding)
    }
}

#[derive(Serialize, Deserialize)]
struct EmbeddingCache {
    tools: Vec<String>,
    embeddings: Vec<Vec<f32>>,
}

fn is_cache_valid(cache_path: &FsPath, catalog_path: Option<&FsPath>) -> bool {
    if !cache_path.exists() {
        return false;
    }
    let Some(catalog_path) = catalog_path else {
        return true;
    };
    if !catalog_path.exists() {
        return true;
    }
    let cache_mtime = std::fs::metadata(cache_path).and_then(|m| m.modified()).ok();
    let catalog_mtime = std::fs::metadata(catalog_path).and_then(|m| m.modified()).ok();
    match (cache_mtime, catalog_mtime) {
        (Some(c), Some(t)) => c >= t,
        _ => false,
    }
}

fn load_cache(cache_path: &FsPath, docs: &[ToolDoc]) -> Option<Vec<Vec<f32>>> {
    let contents = std::fs::read_to_string(cache_path).ok()?;
    let cache: EmbeddingCache = serde_json::from_str(&contents).ok()?;
    if cache.tools.len() != docs.len() || cache.embeddings.len() != docs.len() {
        return None;
    }
    let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
    if cache.tools.iter().map(|s| s.as_str()).ne(names) {
        return None;
    }
    Some(cache.embeddings)
}

fn save_cache(cache_path: &FsPath, docs: &[ToolDoc], embeddings: &[Vec<f32>]) {
    let cache = EmbeddingCache {
        tools: docs.iter().map(|d| d.name.clone()).collect(),
        embeddings: embeddings.to_vec(),
    };
    if let Some(parent) = cache_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(json) = serde_json::to_string(&cache) {
        let _ = std::fs::write(cache_path, json);
    }
}

fn build_tool_text(doc: &ToolDoc) -> String {
    let mut parts = vec![format!("Tool: {}", doc.name)];
    if !doc.description.is_empty() {
        parts.push(format!("Description: {}", doc.description));
    }
    if !doc.required_keys.is_empty() {
        parts.push(format!("Required params: {}", doc.required_keys.join(", ")));
    }
    if !doc.optional_keys.is_empty() {
        parts.push(format!("Optional params: {}", doc.optional_keys.join(", ")));
    }
    parts.join(" | ")
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub struct SemanticRetriever {
    docs: Vec<ToolDoc>,
    embeddings: Option<Vec<Vec<f32>>>,
}

impl SemanticRetriever {
    pub async fn new(
        catalog: &ToolCatalog,
        provider: Option<&dyn EmbeddingProvider>,
        cache_path: PathBuf,
        catalog_path: Option<PathBuf>,
    ) -> Self {
        let docs = build_docs(catalog);
        let Some(provider) = provider else {
            return SemanticRetriever { docs, embeddings: None };
        };

        if is_cache_valid(&cache_path, catalog_path.as_deref()) {
            if let Some(cached) = load_cache(&cache_path, &docs) {
                return SemanticRetriever { docs, embeddings: Some(cached) };
            }
        }

        let mut embeddings = Vec::with_capacity(docs.len());
        for doc in &docs {
            let text = build_tool_text(doc);
            match provider.embed(&text).await {
                Some(v) => embeddings.push(v),
                None => embeddings.push(vec![0.0; FALLBACK_DIM]),
            }
        }
        save_cache(&cache_path, &docs, &embeddings);
        SemanticRetriever { docs, embeddings: Some(embeddings) }
    }

    pub async fn retrieve(
        &self,
        task: &str,
        top_k: usize,
        provider: Option<&dyn EmbeddingProvider>,
    ) -> Vec<(String, f64)> {
        let (Some(embeddings), Some(provider)) = (&self.embeddings, provider) else {
            return Vec::new();
        };
        let Some(query_emb) = provider.embed(task).await else {
            return Vec::new();
        };

        let mut scored: Vec<(usize, f64)> = embeddings
            .iter()
            .enumerate()
            .map(|(i, emb)| (i, cosine_similarity(&query_emb, emb)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(top_k)
            .map(|(idx, score)| (self.docs[idx].name.clone(), score))
            .collect()
    }

    pub fn has_embeddings(&self) -> bool {
        self.embeddings.is_some()
    }
}
