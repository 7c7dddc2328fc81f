//! Field-weighted BM25 ranking over four tool fields: name, description,
//! required params, optional params. Ported term-for-term from the
//! reference implementation's `BM25FieldIndex`/`ToolRetriever`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::tool_doc::{build_docs, ToolCatalog, ToolDoc};

static CAMEL_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_\-]+").unwrap());
static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").unwrap());

/// Splits camelCase and snake_case identifiers into space-separated words
/// so both the original and split forms contribute tokens.
pub fn split_identifier(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let spaced = SEPARATORS.replace_all(text, " ");
    CAMEL_BOUNDARY.replace_all(&spaced, "$1 $2").into_owned()
}

pub fn tokenize(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let lower = text.to_lowercase();
    TOKEN.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

fn counter(tokens: &[String]) -> HashMap<String, u32> {
    let mut map = HashMap::new();
    for t in tokens {
        *map.entry(t.clone()).or_insert(0) += 1;
    }
    map
}

pub struct Bm25FieldIndex {
    docs_tokens: Vec<HashMap<String, u32>>,
    doc_len: Vec<u32>,
    avgdl: f64,
    df: HashMap<String, u32>,
    k1: f64,
    b: f64,
}

impl Bm25FieldIndex {
    pub fn new(docs_tokens: Vec<HashMap<String, u32>>, k1: f64, b: f64) -> Self {
        let doc_len: Vec<u32> = docs_tokens.iter().map(|c| c.values().sum()).collect();
        let avgdl = if doc_len.is_empty() {
            0.0
        } else {
            doc_len.iter().sum::<u32>() as f64 / doc_len.len() as f64
        };
        let mut df: HashMap<String, u32> = HashMap::new();
        for counter in &docs_tokens {
            for term in counter.keys() {
                *df.entry(term.clone()).or_insert(0) += 1;
            }
        }
        Bm25FieldIndex { docs_tokens, doc_len, avgdl, df, k1, b }
    }

    pub fn score(&self, query_tokens: &HashMap<String, u32>, doc_idx: usize) -> f64 {
        if self.avgdl == 0.0 {
            return 0.0;
        }
        let doc_counter = &self.docs_tokens[doc_idx];
        let dl = self.doc_len[doc_idx] as f64;
        let mut score = 0.0;
        let n = self.docs_tokens.len() as f64;
        for (term, &qf) in query_tokens {
            let df = *self.df.get(term).unwrap_or(&0);
            if df == 0 {
                continue;
            }
            let tf = *doc_counter.get(term).unwrap_or(&0);
            if tf == 0 {
                continue;
            }
            let idf = (1.0 + (n - df as f64 + 0.5) / (df as f64 + 0.5)).ln();
            let denom = tf as f64 + self.k1 * (1.0 - self.b + self.b * dl / self.avgdl);
            score += idf * (tf as f64 * (self.k1 + 1.0) / denom) * qf as f64;
        }
        score
    }
}

pub struct BM25Retriever {
    docs: Vec<ToolDoc>,
    index: HashMap<&'static str, Bm25FieldIndex>,
    field_weights: [(&'static str, f64); 4],
}

const K1: f64 = 1.2;
const B: f64 = 0.75;

impl BM25Retriever {
    pub fn new(catalog: &ToolCatalog) -> Self {
        let docs = build_docs(catalog);

        let mut name_tokens = Vec::new();
        let mut desc_tokens = Vec::new();
        let mut required_tokens = Vec::new();
        let mut optional_tokens = Vec::new();

        for doc in &docs {
            let name_text = format!("{} {}", doc.name, split_identifier(&doc.name));
            name_tokens.push(counter(&tokenize(&name_text)));
            desc_tokens.push(counter(&tokenize(&doc.description)));
            required_tokens.push(counter(&tokenize(&doc.required_keys.join(" "))));
            optional_tokens.push(counter(&tokenize(&doc.optional_keys.join(" "))));
        }

        let mut index = HashMap::new();
        index.insert("name", Bm25FieldIndex::new(name_tokens, K1, B));
        index.insert("desc", Bm25FieldIndex::new(desc_tokens, K1, B));
        index.insert("required", Bm25FieldIndex::new(required_tokens, K1, B));
        index.insert("optional", Bm25FieldIndex::new(optional_tokens, K1, B));

        BM25Retriever {
            docs,
            index,
            field_weights: [("name", 3.0), ("desc", 2.0), ("required", 1.5), ("optional", 1.0)],
        }
    }

    /// Returns `(tool_name, score)` pairs, descending by score, top `top_k`,
    /// excluding zero-score tools.
    pub fn retrieve(&self, task: &str, top_k: usize) -> Vec<(String, f64)> {
        let tokens = tokenize(task);
        if tokens.is_empty() {
            return Vec::new();
        }
        let query_tokens = counter(&tokens);

        let mut results: Vec<(usize, f64)> = Vec::new();
        for idx in 0..self.docs.len() {
            let mut score = 0.0;
            for (field, weight) in self.field_weights {
                if let Some(field_index) = self.index.get(field) {
                    score += weight * field_index.score(&query_tokens, idx);
                }
            }
            if score > 0.0 {
                results.push((idx, score));
            }
        }
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results
            .into_iter()
            .take(top_k)
            .map(|(idx, score)| (self.docs[idx].name.clone(), score))
            .collect()
    }
}
