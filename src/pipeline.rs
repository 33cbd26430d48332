//! Question answering entry point
//!
//! Normalizes the question into statutory vocabulary, runs the triple hybrid
//! retrieval, builds the tiered context and hands it to the answer generator.
//! Every collaborator failure degrades to a fallback; only construction can
//! fail.

use crate::config::{expand_path, Config};
use crate::error::Result;
use crate::retrieval::{format_context_with_hierarchy, Document, IndexStores, RetrievalOrchestrator};
use crate::services::morphology::default_analyzer;
use crate::services::{
    call_with_timeout, AnswerGenerator, ChatClient, ChatEndpoint, ChatRole, DictionaryNormalizer, EmbeddingProvider,
    FastEmbedProvider, FastEmbedReranker, LegalDictionary, LlmAnswerGenerator, LlmNormalizer, LocalVectorStore,
    OfflineAnswerGenerator, QueryNormalizer, Reranker,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Returned when retrieval finds nothing
pub const NO_DOCUMENTS_ANSWER: &str = "Sorry, no relevant statutes or case law could be found.";

/// Returned when the answer generator fails
pub const GENERATION_FAILED_ANSWER: &str = "Sorry, an error occurred while generating the answer.";

/// Result of one retrieval pass
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    /// Query actually sent to retrieval (normalized unless skipped)
    pub query: String,
    pub documents: Vec<Document>,
    /// Tiered context block built from `documents`
    pub context: String,
}

/// A generated answer with the material it was based on
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    #[serde(flatten)]
    pub retrieval: Retrieval,
}

pub struct RagPipeline {
    orchestrator: RetrievalOrchestrator,
    generator: Arc<dyn AnswerGenerator>,
    normalizer: Option<Arc<dyn QueryNormalizer>>,
    dictionary: Arc<LegalDictionary>,
    timeout: Duration,
}

impl RagPipeline {
    /// Pipeline without query normalization
    pub fn new(orchestrator: RetrievalOrchestrator, generator: Arc<dyn AnswerGenerator>) -> Self {
        let timeout = orchestrator.config().services.timeout();
        Self {
            orchestrator,
            generator,
            normalizer: None,
            dictionary: Arc::new(LegalDictionary::default()),
            timeout,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn QueryNormalizer>, dictionary: LegalDictionary) -> Self {
        self.normalizer = Some(normalizer);
        self.dictionary = Arc::new(dictionary);
        self
    }

    /// Build a pipeline over the local corpus
    ///
    /// Loads `<corpus dir>/<index name>.jsonl` for each index and embeds it with
    /// the configured FastEmbed model. A reranker that fails to load disables
    /// reranking instead of failing the build. Normalization and generation use
    /// the configured chat endpoint, or the dictionary normalizer and offline
    /// generator when none is reachable by configuration.
    pub fn from_local_corpus(config: Config) -> Result<Self> {
        let corpus_dir = expand_path(&config.corpus.dir)?;

        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(FastEmbedProvider::new(&config.embedding.model, config.embedding.batch_size)?);

        let stores = IndexStores {
            law: Arc::new(LocalVectorStore::open(&corpus_dir, &config.indices.law, embedder.clone())?),
            rule: Arc::new(LocalVectorStore::open(&corpus_dir, &config.indices.rule, embedder.clone())?),
            case: Arc::new(LocalVectorStore::open(&corpus_dir, &config.indices.case, embedder)?),
        };

        let reranker: Option<Arc<dyn Reranker>> = if config.rerank.enabled {
            match FastEmbedReranker::new(&config.rerank.model) {
                Ok(r) => Some(Arc::new(r)),
                Err(e) => {
                    tracing::warn!("Reranker unavailable, continuing without rerank: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let dictionary = load_dictionary(&config)?;

        let analyzer = if config.bm25.use_morphological {
            default_analyzer()
        } else {
            None
        };

        let normalizer = build_normalizer(&config)?;
        let generator = build_generator(&config)?;

        let orchestrator = RetrievalOrchestrator::new(config, stores, reranker, analyzer)?;

        Ok(Self::new(orchestrator, generator).with_normalizer(normalizer, dictionary))
    }

    pub fn orchestrator(&self) -> &RetrievalOrchestrator {
        &self.orchestrator
    }

    pub fn dictionary(&self) -> &LegalDictionary {
        &self.dictionary
    }

    /// Rewrite the question into statutory vocabulary
    ///
    /// Falls back to the unmodified question when no normalizer is configured,
    /// the call fails, or it returns nothing.
    pub async fn normalize_query(&self, question: &str) -> String {
        let Some(normalizer) = self.normalizer.clone() else {
            return question.to_string();
        };

        let dictionary = self.dictionary.clone();
        let input = question.to_string();

        match call_with_timeout("query normalization", self.timeout, move || {
            normalizer.normalize(&dictionary, &input)
        })
        .await
        {
            Ok(normalized) if !normalized.trim().is_empty() => normalized.trim().to_string(),
            Ok(_) => {
                tracing::warn!("Normalization returned nothing, using original question");
                question.to_string()
            }
            Err(e) => {
                tracing::warn!("Normalization failed, using original question: {}", e);
                question.to_string()
            }
        }
    }

    /// Normalize (unless skipped) and retrieve
    pub async fn retrieve(&self, user_input: &str, skip_normalization: bool) -> Retrieval {
        let query = if skip_normalization {
            user_input.to_string()
        } else {
            let normalized = self.normalize_query(user_input).await;
            tracing::info!("Normalized question: {}", normalized);
            normalized
        };

        let documents = self.orchestrator.triple_hybrid_retrieval(&query).await;
        let context = format_context_with_hierarchy(&documents);

        Retrieval {
            query,
            documents,
            context,
        }
    }

    /// Full answer with the retrieved material
    pub async fn answer(&self, user_input: &str, skip_normalization: bool) -> Answer {
        let retrieval = self.retrieve(user_input, skip_normalization).await;

        if retrieval.documents.is_empty() {
            return Answer {
                text: NO_DOCUMENTS_ANSWER.to_string(),
                retrieval,
            };
        }

        let generator = self.generator.clone();
        let context = retrieval.context.clone();
        let question = retrieval.query.clone();

        tracing::info!("Generating answer from {} documents", retrieval.documents.len());
        let text = match call_with_timeout("answer generation", self.timeout, move || {
            generator.generate(&context, &question)
        })
        .await
        {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::error!("Answer generation failed: {}", e);
                GENERATION_FAILED_ANSWER.to_string()
            }
        };

        Answer { text, retrieval }
    }

    /// Answer text only; never fails
    pub async fn generate_answer(&self, user_input: &str, skip_normalization: bool) -> String {
        self.answer(user_input, skip_normalization).await.text
    }
}

/// Configured dictionary file, or the built-in table
pub fn load_dictionary(config: &Config) -> Result<LegalDictionary> {
    match &config.corpus.dictionary_file {
        Some(path) => LegalDictionary::from_toml_file(&expand_path(path)?),
        None => Ok(LegalDictionary::default()),
    }
}

/// Chat-model normalizer when an endpoint is configured, else the dictionary annotator
pub fn build_normalizer(config: &Config) -> Result<Arc<dyn QueryNormalizer>> {
    Ok(match ChatEndpoint::from_env(&config.llm, ChatRole::Normalize) {
        Some(endpoint) => {
            tracing::info!("Normalize model: {} at {}", endpoint.model, endpoint.base_url);
            Arc::new(LlmNormalizer::new(ChatClient::new(endpoint, config.services.timeout())?))
        }
        None => Arc::new(DictionaryNormalizer::new()),
    })
}

/// Chat-model generator when an endpoint is configured, else the offline generator
pub fn build_generator(config: &Config) -> Result<Arc<dyn AnswerGenerator>> {
    Ok(match ChatEndpoint::from_env(&config.llm, ChatRole::Generate) {
        Some(endpoint) => {
            tracing::info!("Generation model: {} at {}", endpoint.model, endpoint.base_url);
            Arc::new(LlmAnswerGenerator::new(ChatClient::new(endpoint, config.services.timeout())?))
        }
        None => {
            tracing::info!("No language model configured, answers list the retrieved material");
            Arc::new(OfflineAnswerGenerator)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_collaborators_without_endpoints() {
        let mut config = Config::default();
        config.llm.enabled = false;

        let normalizer = build_normalizer(&config).unwrap();
        let dictionary = load_dictionary(&config).unwrap();
        assert_eq!(
            normalizer.normalize(&dictionary, "집주인이 연락이 안 돼요").unwrap(),
            "집주인(임대인)이 연락이 안 돼요"
        );

        let generator = build_generator(&config).unwrap();
        let text = generator.generate("[법] 제3조", "대항력?").unwrap();
        assert!(text.starts_with("Question: 대항력?"));
    }
}
