//! In-process vector store over a JSONL corpus
//!
//! Each line of the corpus file is a document (`content` or `page_content`
//! plus `metadata`). Passages are embedded once when the store is opened;
//! searches are exact cosine similarity with an optional metadata equality
//! filter.

use crate::error::{LeaseRagError, Result};
use crate::retrieval::Document;
use crate::services::{EmbeddingProvider, SearchFilter, ServiceError, VectorSearch};
use std::path::Path;
use std::sync::Arc;

pub struct LocalVectorStore {
    name: String,
    embedder: Arc<dyn EmbeddingProvider>,
    entries: Vec<(Document, Vec<f32>)>,
}

impl LocalVectorStore {
    /// Build a store from already-loaded documents
    pub fn from_documents(
        name: impl Into<String>,
        embedder: Arc<dyn EmbeddingProvider>,
        documents: Vec<Document>,
    ) -> Result<Self> {
        let name = name.into();
        let prefix = embedder.passage_prefix();
        let texts: Vec<String> = documents
            .iter()
            .map(|d| format!("{}{}", prefix, d.content))
            .collect();
        let embeddings = embedder.embed_batch(&texts)?;

        let entries = documents
            .into_iter()
            .zip(embeddings)
            .map(|(doc, vector)| (doc, normalized(vector)))
            .collect::<Vec<_>>();

        tracing::info!("Index '{}' loaded with {} documents", name, entries.len());

        Ok(Self {
            name,
            embedder,
            entries,
        })
    }

    /// Open `<dir>/<name>.jsonl`
    pub fn open(dir: &Path, name: &str, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let path = dir.join(format!("{}.jsonl", name));
        let documents = load_jsonl(&path)?;
        Self::from_documents(name, embedder, documents)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl VectorSearch for LocalVectorStore {
    fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> std::result::Result<Vec<(Document, Option<f32>)>, ServiceError> {
        if query.trim().is_empty() {
            return Err(ServiceError::Request("Query text cannot be empty".to_string()));
        }

        let query_text = format!("{}{}", self.embedder.query_prefix(), query);
        let query_vec = normalized(self.embedder.embed(&query_text)?);

        let mut hits: Vec<(&Document, f32)> = self
            .entries
            .iter()
            .filter(|(doc, _)| filter.map_or(true, |f| matches_filter(doc, f)))
            .map(|(doc, vector)| (doc, dot(&query_vec, vector)))
            .collect();

        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);

        Ok(hits
            .into_iter()
            .map(|(doc, score)| (doc.clone(), Some(score)))
            .collect())
    }
}

/// Read one document per non-empty line
pub fn load_jsonl(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path).map_err(|e| LeaseRagError::Io {
        source: e,
        context: format!("Failed to read corpus file: {:?}", path),
    })?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<Document>(line).map_err(|e| LeaseRagError::Json {
                source: e,
                context: format!("{:?} line {}", path, i + 1),
            })
        })
        .collect()
}

fn matches_filter(doc: &Document, filter: &SearchFilter) -> bool {
    filter.iter().all(|(key, expected)| doc.get(key) == Some(expected))
}

fn normalized(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
