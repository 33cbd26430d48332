use crate::config::{Config, FUSION_METHODS};
use crate::error::{LeaseRagError, Result, ValidationError};

/// Largest per-index count accepted from configuration
const MAX_RESULT_COUNT: usize = 1_000;

/// Largest dense oversampling factor accepted from configuration
const MAX_SEARCH_MULTIPLIER: usize = 20;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        // Validate schema version
        Self::validate_schema_version(config, &mut errors);

        // Validate per-index counts
        Self::validate_retrieval(config, &mut errors);

        // Validate index names
        Self::validate_indices(config, &mut errors);

        // Validate fusion settings
        Self::validate_hybrid(config, &mut errors);

        // Validate BM25 constants
        Self::validate_bm25(config, &mut errors);

        // Validate rerank settings
        Self::validate_rerank(config, &mut errors);

        // Validate case expansion and dedup settings
        Self::validate_case_expansion(config, &mut errors);

        // Validate embedding and service settings
        Self::validate_services(config, &mut errors);

        // Validate language model endpoints
        Self::validate_llm(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LeaseRagError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;
        for (path, value) in [
            ("retrieval.k_law", retrieval.k_law),
            ("retrieval.k_rule", retrieval.k_rule),
            ("retrieval.k_case", retrieval.k_case),
            ("retrieval.case_candidate_k", retrieval.case_candidate_k),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "Must be greater than 0"));
            } else if value > MAX_RESULT_COUNT {
                errors.push(ValidationError::new(
                    path,
                    format!("Must be at most {}, got {}", MAX_RESULT_COUNT, value),
                ));
            }
        }

        if !(1..=MAX_SEARCH_MULTIPLIER).contains(&retrieval.search_multiplier) {
            errors.push(ValidationError::new(
                "retrieval.search_multiplier",
                format!(
                    "Search multiplier must be between 1 and {}, got {}",
                    MAX_SEARCH_MULTIPLIER, retrieval.search_multiplier
                ),
            ));
        }
    }

    fn validate_indices(config: &Config, errors: &mut Vec<ValidationError>) {
        for (path, name) in [
            ("indices.law", &config.indices.law),
            ("indices.rule", &config.indices.rule),
            ("indices.case", &config.indices.case),
        ] {
            if name.trim().is_empty() {
                errors.push(ValidationError::new(path, "Index name cannot be empty"));
            }
        }
    }

    fn validate_hybrid(config: &Config, errors: &mut Vec<ValidationError>) {
        let hybrid = &config.hybrid;

        if !FUSION_METHODS.contains(&hybrid.method.as_str()) {
            errors.push(ValidationError::new(
                "hybrid.method",
                format!(
                    "Method must be one of {:?}, got '{}'",
                    FUSION_METHODS, hybrid.method
                ),
            ));
        }

        if !(0.0..=1.0).contains(&hybrid.alpha) {
            errors.push(ValidationError::new(
                "hybrid.alpha",
                format!("Alpha must be between 0.0 and 1.0, got {}", hybrid.alpha),
            ));
        }

        if hybrid.rrf_k < 1 {
            errors.push(ValidationError::new(
                "hybrid.rrf_k",
                "RRF k must be at least 1",
            ));
        }

        if hybrid.dense_weight < 0.0 || hybrid.sparse_weight < 0.0 {
            errors.push(ValidationError::new(
                "hybrid.dense_weight",
                "Fusion weights cannot be negative",
            ));
        } else if hybrid.dense_weight == 0.0 && hybrid.sparse_weight == 0.0 {
            errors.push(ValidationError::new(
                "hybrid.dense_weight",
                "Dense and sparse weights cannot both be 0",
            ));
        }
    }

    fn validate_bm25(config: &Config, errors: &mut Vec<ValidationError>) {
        let bm25 = &config.bm25;

        if bm25.k1 <= 0.0 || !bm25.k1.is_finite() {
            errors.push(ValidationError::new(
                "bm25.k1",
                format!("k1 must be greater than 0, got {}", bm25.k1),
            ));
        }

        if !(0.0..=1.0).contains(&bm25.b) {
            errors.push(ValidationError::new(
                "bm25.b",
                format!("b must be between 0.0 and 1.0, got {}", bm25.b),
            ));
        }

        if bm25.max_doc_chars == 0 {
            errors.push(ValidationError::new(
                "bm25.max_doc_chars",
                "Max document length must be greater than 0",
            ));
        }

        if bm25.min_token_length == 0 {
            errors.push(ValidationError::new(
                "bm25.min_token_length",
                "Minimum token length must be greater than 0",
            ));
        }
    }

    fn validate_rerank(config: &Config, errors: &mut Vec<ValidationError>) {
        let rerank = &config.rerank;

        if !(0.0..=1.0).contains(&rerank.threshold) {
            errors.push(ValidationError::new(
                "rerank.threshold",
                format!(
                    "Threshold must be between 0.0 and 1.0, got {}",
                    rerank.threshold
                ),
            ));
        }

        if rerank.max_documents == 0 {
            errors.push(ValidationError::new(
                "rerank.max_documents",
                "Max documents must be greater than 0",
            ));
        }

        if rerank.doc_max_chars == 0 {
            errors.push(ValidationError::new(
                "rerank.doc_max_chars",
                "Max document length must be greater than 0",
            ));
        }

        if rerank.enabled && rerank.model.is_empty() {
            errors.push(ValidationError::new(
                "rerank.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_case_expansion(config: &Config, errors: &mut Vec<ValidationError>) {
        let expansion = &config.case_expansion;

        if expansion.context_top_k == 0 {
            errors.push(ValidationError::new(
                "case_expansion.context_top_k",
                "Context top-k must be greater than 0",
            ));
        }

        if expansion.expand_top_n == Some(0) {
            errors.push(ValidationError::new(
                "case_expansion.expand_top_n",
                "Expand top-n must be greater than 0 when set",
            ));
        }

        // The search backend rejects empty queries
        if expansion.placeholder_query.trim().is_empty() {
            errors.push(ValidationError::new(
                "case_expansion.placeholder_query",
                "Placeholder query cannot be empty",
            ));
        }

        if config.dedup.key_fields.is_empty() {
            errors.push(ValidationError::new(
                "dedup.key_fields",
                "At least one key field is required",
            ));
        }
    }

    fn validate_services(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.services.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "services.timeout_secs",
                "Timeout must be at least 1 second",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let llm = &config.llm;

        for (path, value) in [
            ("llm.normalize_temperature", llm.normalize_temperature),
            ("llm.generation_temperature", llm.generation_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                errors.push(ValidationError::new(
                    path,
                    format!("Temperature must be between 0.0 and 2.0, got {}", value),
                ));
            }
        }

        if !llm.enabled {
            return;
        }

        for (path, value) in [
            ("llm.base_url", &llm.base_url),
            ("llm.normalize_model", &llm.normalize_model),
            ("llm.generation_model", &llm.generation_model),
        ] {
            if value.trim().is_empty() {
                errors.push(ValidationError::new(path, "Cannot be empty when llm is enabled"));
            }
        }

        if !llm.fallback_model.is_empty() && llm.fallback_base_url.trim().is_empty() {
            errors.push(ValidationError::new(
                "llm.fallback_base_url",
                "Fallback model requires a fallback base URL",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_paths(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Err(LeaseRagError::ConfigValidation { errors }) => {
                errors.into_iter().map(|e| e.path).collect()
            }
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_method() {
        let mut config = Config::default();
        config.hybrid.method = "borda".to_string();
        assert_eq!(error_paths(&config), vec!["hybrid.method"]);
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut config = Config::default();
        config.rerank.threshold = 1.5;
        assert_eq!(error_paths(&config), vec!["rerank.threshold"]);
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = Config::default();
        config.retrieval.search_multiplier = 0;
        config.bm25.k1 = 0.0;
        config.bm25.b = 1.2;
        config.hybrid.dense_weight = 0.0;
        config.hybrid.sparse_weight = 0.0;

        let paths = error_paths(&config);
        assert!(paths.contains(&"retrieval.search_multiplier".to_string()));
        assert!(paths.contains(&"bm25.k1".to_string()));
        assert!(paths.contains(&"bm25.b".to_string()));
        assert!(paths.contains(&"hybrid.dense_weight".to_string()));
    }

    #[test]
    fn test_temperature_range() {
        let mut config = Config::default();
        config.llm.generation_temperature = 2.5;
        config.llm.normalize_temperature = -0.1;
        assert_eq!(
            error_paths(&config),
            vec!["llm.normalize_temperature", "llm.generation_temperature"]
        );

        // Endpoint fields are only checked while the llm is enabled
        let mut config = Config::default();
        config.llm.enabled = false;
        config.llm.base_url = String::new();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_oversized_fetch_rejected() {
        let mut config = Config::default();
        config.retrieval.search_multiplier = usize::MAX / 2;
        config.retrieval.k_case = usize::MAX;
        assert_eq!(
            error_paths(&config),
            vec!["retrieval.k_case", "retrieval.search_multiplier"]
        );
    }

    #[test]
    fn test_empty_placeholder_query() {
        let mut config = Config::default();
        config.case_expansion.placeholder_query = "  ".to_string();
        assert_eq!(error_paths(&config), vec!["case_expansion.placeholder_query"]);
    }
}
