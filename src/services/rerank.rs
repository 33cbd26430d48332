//! Cross-encoder reranking using FastEmbed

use crate::services::{Reranker, ServiceError};
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::sync::Arc;

/// Cross-encoder reranker
///
/// FastEmbed returns raw logits; they are squashed through a sigmoid so the
/// relevance threshold can be expressed on a `[0, 1]` scale.
pub struct FastEmbedReranker {
    model: Arc<TextRerank>,
    model_name: String,
}

impl FastEmbedReranker {
    /// Create a new reranker with specified model
    ///
    /// # Arguments
    /// * `model_name` - "bge-reranker-base" or "jina-reranker-v1-turbo-en"
    pub fn new(model_name: &str) -> Result<Self, ServiceError> {
        let model = match model_name {
            "bge-reranker-base" | "BAAI/bge-reranker-base" => RerankerModel::BGERerankerBase,
            "jina-reranker-v1-turbo-en" => RerankerModel::JINARerankerV1TurboEn,
            _ => {
                return Err(ServiceError::Unavailable(format!(
                    "Unsupported rerank model: {}. Supported: bge-reranker-base, jina-reranker-v1-turbo-en",
                    model_name
                )));
            }
        };

        tracing::info!("Initializing reranker model: {}", model_name);

        let init_options = RerankInitOptions::new(model).with_show_download_progress(true);

        let model = TextRerank::try_new(init_options).map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl Reranker for FastEmbedReranker {
    fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<(usize, f32)>, ServiceError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        if query.is_empty() {
            return Err(ServiceError::Request("Query cannot be empty".to_string()));
        }

        let docs: Vec<&str> = documents.iter().map(|s| s.as_str()).collect();

        let results = self
            .model
            .rerank(query, docs, false, None)
            .map_err(|e| ServiceError::Request(e.to_string()))?;

        let mut scored: Vec<(usize, f32)> = results.into_iter().map(|r| (r.index, sigmoid(r.score))).collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_n);

        Ok(scored)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
