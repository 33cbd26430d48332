//! BM25 scoring over a per-request candidate set
//!
//! No index is kept between calls: [`Bm25Scorer::fit`] computes document
//! frequencies over exactly the candidates returned by one dense search, and
//! [`Bm25Scorer::score`] scores a query against them.

use crate::retrieval::document::{truncate_chars, Document};
use crate::retrieval::tokenizer::Tokenizer;
use ahash::{HashMap, HashMapExt};
use std::sync::Arc;

/// Default term-frequency saturation
pub const DEFAULT_K1: f64 = 1.5;

/// Default length normalization
pub const DEFAULT_B: f64 = 0.75;

/// BM25 scorer fitted on a small candidate set
pub struct Bm25Scorer {
    tokenizer: Arc<dyn Tokenizer>,
    k1: f64,
    b: f64,
    max_doc_chars: Option<usize>,
    corpus: Vec<Vec<String>>,
}

impl Bm25Scorer {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, k1: f64, b: f64) -> Self {
        Self {
            tokenizer,
            k1,
            b,
            max_doc_chars: None,
            corpus: Vec::new(),
        }
    }

    /// Truncate candidate text to `max_chars` characters before tokenizing
    pub fn with_max_doc_chars(mut self, max_chars: usize) -> Self {
        self.max_doc_chars = Some(max_chars);
        self
    }

    /// Tokenize the candidates; replaces any previous fit
    pub fn fit(&mut self, documents: &[Document]) -> &mut Self {
        self.corpus = documents
            .iter()
            .map(|doc| match self.max_doc_chars {
                Some(max) => self.tokenizer.tokenize(&truncate_chars(&doc.content, max)),
                None => self.tokenizer.tokenize(&doc.content),
            })
            .collect();
        self
    }

    /// Score `query` against every fitted document, in fit order
    pub fn score(&self, query: &str) -> Vec<f64> {
        let query_tokens = self.tokenizer.tokenize(query);
        bm25_scores(&query_tokens, &self.corpus, self.k1, self.b)
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }
}

/// Okapi BM25 with a mild boost for repeated query terms
///
/// `idf(t) = ln(1 + (N - df + 0.5) / (df + 0.5))`; each distinct query term
/// with query frequency `qf` contributes
/// `idf * tf*(k1+1) / (tf + k1*norm) * (1 + 0.1*(qf-1))`.
pub fn bm25_scores(query_tokens: &[String], docs_tokens: &[Vec<String>], k1: f64, b: f64) -> Vec<f64> {
    let n = docs_tokens.len();
    if n == 0 {
        return Vec::new();
    }
    if query_tokens.is_empty() {
        return vec![0.0; n];
    }

    let doc_lens: Vec<usize> = docs_tokens.iter().map(Vec::len).collect();
    let mut avgdl = doc_lens.iter().sum::<usize>() as f64 / n as f64;
    if avgdl <= 0.0 {
        avgdl = 1.0;
    }

    // Document frequency
    let mut df: HashMap<&str, usize> = HashMap::new();
    for tokens in docs_tokens {
        let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        for term in seen {
            *df.entry(term).or_insert(0) += 1;
        }
    }

    let idf = |term: &str| -> f64 {
        match df.get(term) {
            Some(&dfi) => {
                let dfi = dfi as f64;
                (1.0 + (n as f64 - dfi + 0.5) / (dfi + 0.5)).ln()
            }
            None => 0.0,
        }
    };

    // Query term frequency, in first-seen order
    let mut qtf: Vec<(&str, usize)> = Vec::new();
    for token in query_tokens {
        match qtf.iter_mut().find(|(t, _)| *t == token.as_str()) {
            Some((_, count)) => *count += 1,
            None => qtf.push((token.as_str(), 1)),
        }
    }

    docs_tokens
        .iter()
        .zip(doc_lens)
        .map(|(tokens, dl)| {
            let mut tf: HashMap<&str, usize> = HashMap::new();
            for token in tokens {
                *tf.entry(token.as_str()).or_insert(0) += 1;
            }

            let norm = (1.0 - b) + b * (dl as f64 / avgdl);
            let mut score = 0.0;
            for &(term, qf) in &qtf {
                let Some(&f) = tf.get(term) else {
                    continue;
                };
                let f = f as f64;
                let denom = f + k1 * norm;
                if denom == 0.0 {
                    continue;
                }
                score += idf(term) * (f * (k1 + 1.0) / denom) * (1.0 + 0.1 * (qf as f64 - 1.0));
            }
            score
        })
        .collect()
}
