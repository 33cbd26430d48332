//! Errors raised while building a pipeline
//!
//! Retrieval and answering never fail once a pipeline exists; collaborator
//! failures are absorbed there as [`ServiceError`] fallbacks. What remains
//! here are the setup failures: configuration, corpus and dictionary files,
//! and model or analyzer loading.

use crate::services::ServiceError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeaseRagError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every problem found by the validator, in section order
    #[error("Invalid configuration ({} problem(s)): {}", errors.len(), join_errors(errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// A single value that could not be parsed or is out of range
    #[error("Invalid value for {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    #[error("Could not parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Could not write TOML: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("{context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// Malformed corpus line or unserializable output
    #[error("{context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Legal term dictionary file that loaded but is unusable
    #[error("Dictionary {path:?}: {message}")]
    Dictionary { path: PathBuf, message: String },

    /// Morphological analyzer could not be loaded
    #[error("Morpheme analyzer unavailable: {0}")]
    Analyzer(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// One rejected configuration key
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Dotted key, e.g. `hybrid.method`
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, LeaseRagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_key() {
        let err = LeaseRagError::ConfigValidation {
            errors: vec![
                ValidationError::new("hybrid.method", "unknown method 'borda'"),
                ValidationError::new("rerank.threshold", "out of range"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration (2 problem(s)): hybrid.method: unknown method 'borda'; \
             rerank.threshold: out of range"
        );
    }
}
