//! Tokenizers feeding the BM25 scorer
//!
//! Two strategies share the [`Tokenizer`] trait: a regex tokenizer that keeps
//! contiguous ASCII-alphanumeric and Hangul runs, and a morphological tokenizer
//! that keeps content-bearing parts of speech reported by a [`MorphemeAnalyzer`].
//! [`select_tokenizer`] resolves which one a pipeline uses, once, at construction.

use crate::config::Bm25Config;
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// Turns raw text into lowercase tokens
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// A surface form with its part-of-speech tag (Sejong tag set, e.g. `NNG`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Morpheme {
    pub form: String,
    pub tag: String,
}

impl Morpheme {
    pub fn new(form: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            form: form.into(),
            tag: tag.into(),
        }
    }
}

/// Morphological analyzer backend
pub trait MorphemeAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> Vec<Morpheme>;
}

fn token_regex() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| Regex::new(r"[0-9A-Za-z가-힣]+").expect("token pattern is a valid literal"))
}

/// Locale-agnostic tokenizer over alphanumeric and Hangul runs
#[derive(Debug, Clone)]
pub struct RegexTokenizer {
    min_length: usize,
}

impl RegexTokenizer {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }
}

impl Default for RegexTokenizer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Tokenizer for RegexTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let lowered = text.to_lowercase();
        token_regex()
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|t| t.chars().count() >= self.min_length)
            .map(str::to_string)
            .collect()
    }

    fn name(&self) -> &str {
        "regex"
    }
}

/// Tokenizer keeping nouns, verbs, adjectives and foreign/Chinese-derived forms
pub struct MorphTokenizer {
    analyzer: Arc<dyn MorphemeAnalyzer>,
    pos_tags: Vec<String>,
    min_length: usize,
}

impl MorphTokenizer {
    pub fn new(analyzer: Arc<dyn MorphemeAnalyzer>, pos_tags: Vec<String>, min_length: usize) -> Self {
        Self {
            analyzer,
            pos_tags,
            min_length,
        }
    }
}

impl Tokenizer for MorphTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        self.analyzer
            .analyze(text)
            .into_iter()
            .filter(|m| self.pos_tags.iter().any(|tag| *tag == m.tag))
            .filter(|m| m.form.chars().count() >= self.min_length)
            .map(|m| m.form.to_lowercase())
            .collect()
    }

    fn name(&self) -> &str {
        "morphological"
    }
}

/// Pick the tokenizer for a pipeline
///
/// The morphological tokenizer is used when it is enabled and an analyzer was
/// supplied; otherwise the regex tokenizer.
pub fn select_tokenizer(
    config: &Bm25Config,
    analyzer: Option<Arc<dyn MorphemeAnalyzer>>,
) -> Arc<dyn Tokenizer> {
    match analyzer {
        Some(analyzer) if config.use_morphological => {
            tracing::info!("Using morphological tokenizer for BM25");
            Arc::new(MorphTokenizer::new(
                analyzer,
                config.pos_tags.clone(),
                config.min_token_length,
            ))
        }
        _ => {
            if config.use_morphological {
                tracing::info!("No morpheme analyzer available, using regex tokenizer");
            }
            Arc::new(RegexTokenizer::new(config.min_token_length))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    /// Splits on whitespace and tags by a fixed table
    struct TableAnalyzer;

    impl MorphemeAnalyzer for TableAnalyzer {
        fn analyze(&self, text: &str) -> Vec<Morpheme> {
            text.split_whitespace()
                .map(|w| {
                    let tag = match w {
                        "은" | "를" | "이" => "JX",
                        "LH" => "SL",
                        _ => "NNG",
                    };
                    Morpheme::new(w, tag)
                })
                .collect()
        }
    }

    #[test]
    fn test_regex_tokenizer_mixed_script() {
        let tokenizer = RegexTokenizer::default();
        let tokens = tokenizer.tokenize("주택임대차보호법 제3조의2, Article-7!");
        assert_eq!(tokens, vec!["주택임대차보호법", "제3조의2", "article", "7"]);
    }

    #[test]
    fn test_regex_tokenizer_min_length() {
        let tokenizer = RegexTokenizer::new(2);
        assert_eq!(tokenizer.tokenize("a 임대 b 인"), vec!["임대"]);
        assert!(tokenizer.tokenize("").is_empty());
    }

    #[test]
    fn test_morph_tokenizer_filters_tags() {
        let tokenizer = MorphTokenizer::new(
            Arc::new(TableAnalyzer),
            vec!["NNG".to_string(), "SL".to_string()],
            1,
        );
        let tokens = tokenizer.tokenize("보증금 를 LH 반환");
        assert_eq!(tokens, vec!["보증금", "lh", "반환"]);
    }

    #[test]
    fn test_selection() {
        let config = Config::default();
        assert_eq!(select_tokenizer(&config.bm25, None).name(), "regex");
        assert_eq!(
            select_tokenizer(&config.bm25, Some(Arc::new(TableAnalyzer))).name(),
            "morphological"
        );

        let mut bm25 = config.bm25.clone();
        bm25.use_morphological = false;
        assert_eq!(
            select_tokenizer(&bm25, Some(Arc::new(TableAnalyzer))).name(),
            "regex"
        );
    }
}
