//! Korean morphological analysis for BM25 tokenization
//!
//! Backed by lindera with the mecab-ko-dic dictionary (`korean` feature). The
//! dictionary tags follow the Sejong tag set, so `bm25.pos_tags` applies to
//! them directly. Inflected entries carry compound tags such as `VV+EF`; the
//! leading tag is the one matched.

use crate::retrieval::MorphemeAnalyzer;
use std::sync::Arc;

/// Leading part-of-speech tag of a ko-dic feature list
pub fn leading_tag(details: &[&str]) -> String {
    details
        .first()
        .and_then(|tag| tag.split('+').next())
        .filter(|tag| !tag.is_empty() && *tag != "*")
        .unwrap_or("UNK")
        .to_string()
}

/// The bundled analyzer, or `None` when it is compiled out or fails to load
pub fn default_analyzer() -> Option<Arc<dyn MorphemeAnalyzer>> {
    #[cfg(feature = "korean")]
    {
        match KoDicAnalyzer::new() {
            Ok(analyzer) => Some(Arc::new(analyzer)),
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        }
    }

    #[cfg(not(feature = "korean"))]
    {
        tracing::debug!("Built without the korean feature, no morpheme analyzer");
        None
    }
}

#[cfg(feature = "korean")]
pub use kodic::KoDicAnalyzer;

#[cfg(feature = "korean")]
mod kodic {
    use super::leading_tag;
    use crate::error::{LeaseRagError, Result};
    use crate::retrieval::{Morpheme, MorphemeAnalyzer};
    use lindera::dictionary::{load_dictionary_from_kind, DictionaryKind};
    use lindera::mode::Mode;
    use lindera::segmenter::Segmenter;
    use lindera::tokenizer::Tokenizer;

    /// mecab-ko-dic analyzer
    pub struct KoDicAnalyzer {
        tokenizer: Tokenizer,
    }

    impl KoDicAnalyzer {
        pub fn new() -> Result<Self> {
            let dictionary = load_dictionary_from_kind(DictionaryKind::KoDic)
                .map_err(|e| LeaseRagError::Analyzer(format!("ko-dic: {}", e)))?;
            let segmenter = Segmenter::new(Mode::Normal, dictionary, None);

            tracing::info!("Loaded ko-dic morpheme analyzer");
            Ok(Self {
                tokenizer: Tokenizer::new(segmenter),
            })
        }
    }

    impl MorphemeAnalyzer for KoDicAnalyzer {
        fn analyze(&self, text: &str) -> Vec<Morpheme> {
            let mut tokens = match self.tokenizer.tokenize(text) {
                Ok(tokens) => tokens,
                Err(e) => {
                    tracing::warn!("Morphological analysis failed: {}", e);
                    return Vec::new();
                }
            };

            tokens
                .iter_mut()
                .map(|token| {
                    let tag = leading_tag(&token.details());
                    Morpheme::new(token.text.to_string(), tag)
                })
                .collect()
        }
    }
}
