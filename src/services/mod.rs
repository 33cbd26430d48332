//! External collaborators of the retrieval pipeline
//!
//! The pipeline talks to its search backends, reranker and language models only
//! through the traits in this module. Every call is made via
//! [`call_with_timeout`], so a slow or failing backend surfaces as a
//! [`ServiceError`] that the caller turns into a local fallback.

mod embedding;
mod generator;
mod llm;
mod local_store;
pub mod morphology;
mod normalizer;
mod rerank;

pub use embedding::{EmbeddingProvider, FastEmbedProvider};
pub use generator::OfflineAnswerGenerator;
pub use llm::{ChatClient, ChatEndpoint, ChatMessage, ChatRole, LlmAnswerGenerator, LlmNormalizer};
pub use local_store::LocalVectorStore;
pub use normalizer::{DictionaryNormalizer, LegalDictionary};
pub use rerank::FastEmbedReranker;

use crate::retrieval::Document;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Worker task failed: {0}")]
    Join(String),
}

/// Equality filter on metadata fields
pub type SearchFilter = BTreeMap<String, Value>;

/// Dense search over one named index
pub trait VectorSearch: Send + Sync {
    /// Up to `k` documents ordered best-first, with a similarity score when the
    /// backend reports one
    fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<(Document, Option<f32>)>, ServiceError>;
}

/// Second-pass relevance scoring
pub trait Reranker: Send + Sync {
    /// `(original_index, relevance in [0, 1])` pairs, best first
    fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<(usize, f32)>, ServiceError>;
}

/// Rewrites colloquial questions into statutory vocabulary
pub trait QueryNormalizer: Send + Sync {
    fn normalize(&self, dictionary: &LegalDictionary, question: &str) -> Result<String, ServiceError>;
}

/// Produces the final answer from the structured context
pub trait AnswerGenerator: Send + Sync {
    fn generate(&self, context: &str, question: &str) -> Result<String, ServiceError>;
}

/// Run a blocking collaborator call on the blocking pool, bounded by `timeout`
///
/// Expiry and worker panics are reported as [`ServiceError`]; the call itself
/// is not cancelled and its late result is discarded.
pub async fn call_with_timeout<T, F>(operation: &str, timeout: Duration, call: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(call)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(ServiceError::Join(format!("{}: {}", operation, e))),
        Err(_) => Err(ServiceError::Timeout {
            operation: operation.to_string(),
            after: timeout,
        }),
    }
}
