//! Retrieved documents and the metadata fields the pipeline reads and writes

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Scalar metadata attached to a document
pub type Metadata = BTreeMap<String, Value>;

/// Priority used when a document carries no parseable `priority`
pub const DEFAULT_PRIORITY: i64 = 99;

/// Metadata keys used by the pipeline
pub mod keys {
    pub const CHUNK_ID: &str = "chunk_id";
    pub const CASE_NO: &str = "case_no";
    pub const TITLE: &str = "title";
    pub const CASE_NAME: &str = "case_name";
    pub const PRIORITY: &str = "priority";
    pub const SRC_TITLE: &str = "src_title";

    pub const SOURCE_INDEX: &str = "source_index";
    pub const DENSE_RANK: &str = "dense_rank";
    pub const DENSE_SCORE: &str = "dense_score";
    pub const BM25_RANK: &str = "bm25_rank";
    pub const BM25_SCORE: &str = "bm25_score";
    pub const HYBRID_RANK: &str = "hybrid_rank";
    pub const HYBRID_SCORE: &str = "hybrid_score";
    pub const RERANK_SCORE: &str = "rerank_score";
    pub const EXPANDED: &str = "expanded";
}

/// The three legal sources searched per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceIndex {
    /// Statutes
    Law,
    /// Regulations and procedures
    Rule,
    /// Case law
    Case,
}

impl SourceIndex {
    pub const ALL: [SourceIndex; 3] = [SourceIndex::Law, SourceIndex::Rule, SourceIndex::Case];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceIndex::Law => "law",
            SourceIndex::Rule => "rule",
            SourceIndex::Case => "case",
        }
    }
}

impl fmt::Display for SourceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrieved text chunk with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Text payload
    #[serde(alias = "page_content")]
    pub content: String,

    /// Scalar metadata (source fields plus pipeline annotations)
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// Return a copy annotated with `key = value`
    pub fn annotated(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Metadata value rendered as text, if it is a non-empty scalar
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(scalar_to_string)
    }

    /// Integer metadata value, if present and parseable
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(value_to_i64)
    }

    /// Legal priority, defaulting to 99 when missing or unparseable
    pub fn priority(&self) -> i64 {
        self.get_i64(keys::PRIORITY).unwrap_or(DEFAULT_PRIORITY)
    }

    /// Index this document was retrieved from
    pub fn source_index(&self) -> Option<SourceIndex> {
        match self.get(keys::SOURCE_INDEX).and_then(Value::as_str) {
            Some("law") => Some(SourceIndex::Law),
            Some("rule") => Some(SourceIndex::Rule),
            Some("case") => Some(SourceIndex::Case),
            _ => None,
        }
    }

    pub fn case_no(&self) -> Option<String> {
        self.get_str(keys::CASE_NO)
    }

    pub fn is_expanded(&self) -> bool {
        matches!(self.get(keys::EXPANDED), Some(Value::Bool(true)))
    }
}

/// Render a scalar as text; empty strings, null and containers yield `None`
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Whether a metadata value counts as present for identity purposes
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Truncate to `max_chars` characters, marking the cut with an ellipsis
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
