/// Embedding provider trait and FastEmbed implementation
use crate::services::ServiceError;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;

/// Trait for embedding providers
///
/// Allows abstraction over different embedding backends.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;

    /// Generate embeddings for multiple texts (batched for efficiency)
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Text prepended to a search query before embedding
    fn query_prefix(&self) -> &str {
        ""
    }

    /// Text prepended to an indexed passage before embedding
    fn passage_prefix(&self) -> &str {
        ""
    }
}

/// E5 models are trained with role prefixes on both sides
fn is_e5(model_name: &str) -> bool {
    model_name.starts_with("multilingual-e5")
}

/// FastEmbed provider for local embedding generation
///
/// Models are downloaded on first use to the local HuggingFace cache. The
/// multilingual E5 models handle Korean; all-MiniLM-L6-v2 is English only.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
    batch_size: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    pub fn new(model_name: &str, batch_size: usize) -> Result<Self, ServiceError> {
        let (embedding_model, dimension) = match model_name {
            "multilingual-e5-small" => (EmbeddingModel::MultilingualE5Small, 384),
            "multilingual-e5-base" => (EmbeddingModel::MultilingualE5Base, 768),
            "multilingual-e5-large" => (EmbeddingModel::MultilingualE5Large, 1024),
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            _ => {
                return Err(ServiceError::Unavailable(format!(
                    "Unsupported embedding model: {}. Supported: multilingual-e5-small, \
                     multilingual-e5-base, multilingual-e5-large, all-MiniLM-L6-v2",
                    model_name
                )));
            }
        };

        tracing::info!(
            "Initializing embedding model: {} ({}D, downloaded if not cached)",
            model_name,
            dimension
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
            batch_size: batch_size.max(1),
        })
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), ServiceError> {
        if embedding.len() != self.dimension {
            return Err(ServiceError::InvalidResponse(format!(
                "Dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }
        Ok(())
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        if text.is_empty() {
            return Err(ServiceError::Request("Empty text".to_string()));
        }

        let mut embeddings = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| ServiceError::Request(e.to_string()))?;

        let embedding = embeddings
            .pop()
            .ok_or_else(|| ServiceError::InvalidResponse("No embeddings generated".to_string()))?;
        self.check_dimension(&embedding)?;

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Keep positions aligned with the input; empty passages embed as a space
        let inputs: Vec<String> = texts
            .iter()
            .map(|t| if t.is_empty() { " ".to_string() } else { t.clone() })
            .collect();

        let embeddings = self
            .model
            .embed(inputs, Some(self.batch_size))
            .map_err(|e| ServiceError::Request(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(ServiceError::InvalidResponse(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn query_prefix(&self) -> &str {
        if is_e5(&self.model_name) {
            "query: "
        } else {
            ""
        }
    }

    fn passage_prefix(&self) -> &str {
        if is_e5(&self.model_name) {
            "passage: "
        } else {
            ""
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_model() {
        let result = FastEmbedProvider::new("word2vec", 32);
        assert!(matches!(result, Err(ServiceError::Unavailable(_))));
    }

    #[test]
    fn test_e5_detection() {
        assert!(is_e5("multilingual-e5-small"));
        assert!(is_e5("multilingual-e5-large"));
        assert!(!is_e5("all-MiniLM-L6-v2"));
    }

    #[test]
    #[ignore] // Requires model download
    fn test_e5_prefixes() {
        let provider = FastEmbedProvider::new("multilingual-e5-small", 8).unwrap();
        assert_eq!(provider.query_prefix(), "query: ");
        assert_eq!(provider.passage_prefix(), "passage: ");
    }

    #[test]
    #[ignore] // Requires model download
    fn test_embed_korean() {
        let provider = FastEmbedProvider::new("multilingual-e5-small", 8).unwrap();
        let embedding = provider.embed("임대인은 보증금을 반환하여야 한다").unwrap();
        assert_eq!(embedding.len(), provider.dimension());
    }
}
