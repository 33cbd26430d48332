//! Configuration management for lease-rag
//!
//! Loads the TOML settings file, applies `LEASE_RAG_*` environment overrides and
//! named profiles, and validates the result. A validated [`Config`] is treated as
//! immutable once a pipeline has been built from it.

use crate::error::{LeaseRagError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Fusion methods accepted by `hybrid.method`
pub const FUSION_METHODS: [&str; 3] = ["rrf", "weighted", "rank_sum"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub retrieval: RetrievalConfig,
    pub indices: IndicesConfig,
    pub hybrid: HybridConfig,
    pub bm25: Bm25Config,
    pub rerank: RerankConfig,
    pub case_expansion: CaseExpansionConfig,
    pub dedup: DedupConfig,
    pub embedding: EmbeddingConfig,
    pub services: ServicesConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    pub corpus: CorpusConfig,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Per-index result counts and oversampling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Final number of statute documents
    pub k_law: usize,
    /// Final number of regulation documents
    pub k_rule: usize,
    /// Final number of (expanded) case-law documents
    pub k_case: usize,
    /// Oversampling multiplier applied to k_law / k_rule for the dense fetch
    pub search_multiplier: usize,
    /// Number of case-law chunks fetched before case selection
    pub case_candidate_k: usize,
}

impl RetrievalConfig {
    /// Fallback size used when nothing clears the rerank threshold
    pub fn total_k(&self) -> usize {
        self.k_law.saturating_add(self.k_rule).saturating_add(self.k_case)
    }

    /// Dense fetch size for an index whose final count is `k`
    pub fn oversampled(&self, k: usize) -> usize {
        k.saturating_mul(self.search_multiplier)
    }
}

/// Names of the three search indices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicesConfig {
    pub law: String,
    pub rule: String,
    pub case: String,
}

/// Dense + sparse fusion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    pub enabled: bool,
    /// "rrf", "weighted" or "rank_sum"
    pub method: String,
    /// Dense share for the weighted method
    pub alpha: f64,
    pub rrf_k: u32,
    pub dense_weight: f64,
    pub sparse_weight: f64,
}

/// BM25 constants and tokenizer selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Config {
    pub k1: f64,
    pub b: f64,
    /// Candidate text is truncated to this many characters before tokenizing
    pub max_doc_chars: usize,
    /// Prefer the morphological tokenizer when an analyzer is available
    pub use_morphological: bool,
    pub min_token_length: usize,
    /// Part-of-speech tags kept by the morphological tokenizer
    pub pos_tags: Vec<String>,
}

/// External rerank settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    pub enabled: bool,
    pub threshold: f64,
    pub model: String,
    pub max_documents: usize,
    pub doc_max_chars: usize,
}

/// Two-stage case-law expansion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseExpansionConfig {
    /// Number of distinct cases to expand (defaults to `retrieval.k_case`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand_top_n: Option<usize>,
    /// Maximum chunks fetched per case
    pub context_top_k: usize,
    /// Query text sent with the case-number filter
    pub placeholder_query: String,
}

/// Deduplication key fields, tried in order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    pub key_fields: Vec<String>,
}

/// Local embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

/// Collaborator call settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Upper bound for every external call
    pub timeout_secs: u64,
}

impl ServicesConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// Chat-completion endpoints for normalization and answer generation
///
/// The primary endpoint is used when its API key variable is set; otherwise
/// the local fallback endpoint (Ollama) when a fallback model is named. With
/// neither, the offline normalizer and generator are used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    /// OpenAI-compatible base URL, without `/chat/completions`
    pub base_url: String,
    /// Environment variable holding the primary endpoint's API key
    pub api_key_env: String,
    pub normalize_model: String,
    pub normalize_temperature: f64,
    pub generation_model: String,
    pub generation_temperature: f64,
    pub fallback_base_url: String,
    /// Empty disables the fallback endpoint
    pub fallback_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            normalize_model: "gpt-4o-mini".to_string(),
            normalize_temperature: 0.0,
            generation_model: "gpt-4o-mini".to_string(),
            generation_temperature: 0.1,
            fallback_base_url: "http://localhost:11434/v1".to_string(),
            fallback_model: "exaone3.5:2.4b".to_string(),
        }
    }
}

/// Local corpus locations for the offline collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Directory holding `<index name>.jsonl` files
    pub dir: PathBuf,
    /// Optional TOML file replacing the built-in legal term dictionary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictionary_file: Option<PathBuf>,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hybrid_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hybrid_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_enabled: Option<bool>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_profile(profile)?;
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LeaseRagError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LeaseRagError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LeaseRagError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| LeaseRagError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| LeaseRagError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(enabled) = overrides.hybrid_enabled {
            self.hybrid.enabled = enabled;
        }
        if let Some(method) = overrides.hybrid_method {
            self.hybrid.method = method;
        }
        if let Some(enabled) = overrides.rerank_enabled {
            self.rerank.enabled = enabled;
        }
        tracing::debug!("Applied profile '{}'", profile);
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: LEASE_RAG_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("LEASE_RAG_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    pub(crate) fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "HYBRID__ENABLED" => self.hybrid.enabled = parse_env(path, value)?,
            "HYBRID__METHOD" => self.hybrid.method = value.to_string(),
            "HYBRID__ALPHA" => self.hybrid.alpha = parse_env(path, value)?,
            "RERANK__ENABLED" => self.rerank.enabled = parse_env(path, value)?,
            "RERANK__THRESHOLD" => self.rerank.threshold = parse_env(path, value)?,
            "RERANK__MODEL" => self.rerank.model = value.to_string(),
            "RETRIEVAL__K_LAW" => self.retrieval.k_law = parse_env(path, value)?,
            "RETRIEVAL__K_RULE" => self.retrieval.k_rule = parse_env(path, value)?,
            "RETRIEVAL__K_CASE" => self.retrieval.k_case = parse_env(path, value)?,
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "SERVICES__TIMEOUT_SECS" => self.services.timeout_secs = parse_env(path, value)?,
            "LLM__ENABLED" => self.llm.enabled = parse_env(path, value)?,
            "LLM__BASE_URL" => self.llm.base_url = value.to_string(),
            "LLM__GENERATION_MODEL" => self.llm.generation_model = value.to_string(),
            "LLM__NORMALIZE_MODEL" => self.llm.normalize_model = value.to_string(),
            "LLM__FALLBACK_MODEL" => self.llm.fallback_model = value.to_string(),
            "CORPUS__DIR" => self.corpus.dir = PathBuf::from(value),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Number of distinct cases handed to case expansion
    pub fn case_expand_top_n(&self) -> usize {
        self.case_expansion
            .expand_top_n
            .unwrap_or(self.retrieval.k_case)
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| LeaseRagError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("lease-rag").join("config.toml"))
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| LeaseRagError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| LeaseRagError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| LeaseRagError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.lease-rag");

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            retrieval: RetrievalConfig {
                k_law: 5,
                k_rule: 5,
                k_case: 3,
                search_multiplier: 2,
                case_candidate_k: 40,
            },
            indices: IndicesConfig {
                law: "law-index-final".to_string(),
                rule: "rule-index-final".to_string(),
                case: "case-index-final".to_string(),
            },
            hybrid: HybridConfig {
                enabled: true,
                method: "rrf".to_string(),
                alpha: 0.5,
                rrf_k: 60,
                dense_weight: 0.6,
                sparse_weight: 0.4,
            },
            bm25: Bm25Config {
                k1: 1.5,
                b: 0.75,
                max_doc_chars: 4000,
                use_morphological: true,
                min_token_length: 1,
                pos_tags: ["NNG", "NNP", "VV", "VA", "SL", "SH"]
                    .iter()
                    .map(|t| t.to_string())
                    .collect(),
            },
            rerank: RerankConfig {
                enabled: true,
                threshold: 0.2,
                model: "bge-reranker-base".to_string(),
                max_documents: 80,
                doc_max_chars: 2000,
            },
            case_expansion: CaseExpansionConfig {
                expand_top_n: None,
                context_top_k: 50,
                placeholder_query: "판례 전문 검색".to_string(),
            },
            dedup: DedupConfig {
                key_fields: vec!["chunk_id".to_string(), "id".to_string()],
            },
            embedding: EmbeddingConfig {
                model: "multilingual-e5-small".to_string(),
                batch_size: 32,
            },
            services: ServicesConfig { timeout_secs: 30 },
            llm: LlmConfig::default(),
            corpus: CorpusConfig {
                dir: data_dir.join("corpus"),
                dictionary_file: None,
            },
            profiles: HashMap::new(),
        }
    }
}
