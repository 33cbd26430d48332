//! Rank fusion for combining dense and sparse rankings of one candidate set

use crate::config::{Bm25Config, HybridConfig};
use crate::retrieval::bm25::Bm25Scorer;
use crate::retrieval::deduplication::{deduplicate_documents, document_key};
use crate::retrieval::document::{keys, Document};
use crate::retrieval::tokenizer::Tokenizer;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// 1-indexed rank per document key
pub type RankMap = HashMap<String, usize>;

/// Score per document key
pub type ScoreMap = HashMap<String, f64>;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Unknown fusion method: {0}")]
    UnknownMethod(String),

    #[error("Invalid weight configuration: weights must be non-negative and not both zero")]
    InvalidWeights,
}

/// Fusion policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMethod {
    /// Reciprocal rank fusion
    Rrf,
    /// Min-max normalized weighted sum of scores
    Weighted,
    /// Weighted sum of unit-scaled ranks
    RankSum,
}

impl FromStr for FusionMethod {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rrf" => Ok(FusionMethod::Rrf),
            "weighted" => Ok(FusionMethod::Weighted),
            "rank_sum" => Ok(FusionMethod::RankSum),
            other => Err(FusionError::UnknownMethod(other.to_string())),
        }
    }
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone)]
pub struct FusionConfig {
    pub method: FusionMethod,

    /// RRF K constant (typically 60)
    pub rrf_k: u32,

    /// Dense share for the weighted method
    pub alpha: f64,

    /// Weight for dense results
    pub dense_weight: f64,

    /// Weight for sparse results
    pub sparse_weight: f64,
}

impl FusionConfig {
    pub fn new(
        method: FusionMethod,
        rrf_k: u32,
        alpha: f64,
        dense_weight: f64,
        sparse_weight: f64,
    ) -> Result<Self, FusionError> {
        if dense_weight < 0.0 || sparse_weight < 0.0 || (dense_weight == 0.0 && sparse_weight == 0.0) {
            return Err(FusionError::InvalidWeights);
        }

        Ok(Self {
            method,
            rrf_k,
            alpha,
            dense_weight,
            sparse_weight,
        })
    }

    pub fn from_config(config: &HybridConfig) -> Result<Self, FusionError> {
        Self::new(
            config.method.parse()?,
            config.rrf_k,
            config.alpha,
            config.dense_weight,
            config.sparse_weight,
        )
    }
}

/// Reciprocal Rank Fusion
///
/// `score(id) = w_dense / (k + dense_rank) + w_sparse / (k + sparse_rank)`;
/// a side on which the document is absent contributes nothing.
pub fn reciprocal_rank_fusion(
    dense_ranks: &RankMap,
    sparse_ranks: &RankMap,
    k: u32,
    w_dense: f64,
    w_sparse: f64,
) -> ScoreMap {
    let mut scores = ScoreMap::new();
    let k = f64::from(k);

    for (id, rank) in dense_ranks {
        *scores.entry(id.clone()).or_insert(0.0) += w_dense / (k + *rank as f64);
    }
    for (id, rank) in sparse_ranks {
        *scores.entry(id.clone()).or_insert(0.0) += w_sparse / (k + *rank as f64);
    }

    scores
}

/// `alpha * dense + (1 - alpha) * sparse` over min-max normalized scores
pub fn weighted_sum(dense_scores: &ScoreMap, sparse_scores: &ScoreMap, alpha: f64) -> ScoreMap {
    let dense = min_max_normalize(dense_scores);
    let sparse = min_max_normalize(sparse_scores);

    dense
        .keys()
        .chain(sparse.keys())
        .map(|id| {
            let d = dense.get(id).copied().unwrap_or(0.0);
            let s = sparse.get(id).copied().unwrap_or(0.0);
            (id.clone(), alpha * d + (1.0 - alpha) * s)
        })
        .collect()
}

/// Weighted sum of ranks mapped onto `[0, 1]`
///
/// Rank `r` over `n` distinct documents becomes `1 - (r - 1) / (n - 1)`; a
/// document missing from one side takes rank `n` there. With `n <= 1` every
/// document scores `w_dense + w_sparse`.
pub fn rank_sum(dense_ranks: &RankMap, sparse_ranks: &RankMap, w_dense: f64, w_sparse: f64) -> ScoreMap {
    let mut ids: Vec<&String> = dense_ranks.keys().chain(sparse_ranks.keys()).collect();
    ids.sort();
    ids.dedup();
    let n = ids.len();

    if n <= 1 {
        return ids.into_iter().map(|id| (id.clone(), w_dense + w_sparse)).collect();
    }

    let to_unit = |r: usize| 1.0 - (r as f64 - 1.0) / (n as f64 - 1.0);

    ids.into_iter()
        .map(|id| {
            let d = dense_ranks.get(id).copied().unwrap_or(n);
            let s = sparse_ranks.get(id).copied().unwrap_or(n);
            (id.clone(), w_dense * to_unit(d) + w_sparse * to_unit(s))
        })
        .collect()
}

/// Min-max normalization; a constant map normalizes to all 1.0
pub fn min_max_normalize(scores: &ScoreMap) -> ScoreMap {
    if scores.is_empty() {
        return ScoreMap::new();
    }
    let min = scores.values().copied().fold(f64::INFINITY, f64::min);
    let max = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);

    if max == min {
        return scores.keys().map(|k| (k.clone(), 1.0)).collect();
    }
    scores
        .iter()
        .map(|(k, v)| (k.clone(), (v - min) / (max - min)))
        .collect()
}

/// Apply the configured policy
pub fn fuse_scores(
    config: &FusionConfig,
    dense_ranks: &RankMap,
    sparse_ranks: &RankMap,
    dense_scores: &ScoreMap,
    sparse_scores: &ScoreMap,
) -> ScoreMap {
    match config.method {
        FusionMethod::Rrf => reciprocal_rank_fusion(
            dense_ranks,
            sparse_ranks,
            config.rrf_k,
            config.dense_weight,
            config.sparse_weight,
        ),
        FusionMethod::Weighted => weighted_sum(dense_scores, sparse_scores, config.alpha),
        FusionMethod::RankSum => rank_sum(
            dense_ranks,
            sparse_ranks,
            config.dense_weight,
            config.sparse_weight,
        ),
    }
}

/// Order `items` by fused score, descending
///
/// The sort is stable, so equal scores keep their input order.
pub fn order_by_fused<T>(items: Vec<(String, T)>, fused: &ScoreMap) -> Vec<(T, f64)> {
    let mut scored: Vec<(T, f64)> = items
        .into_iter()
        .map(|(key, item)| {
            let score = fused.get(&key).copied().unwrap_or(0.0);
            (item, score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// Re-ranks one index's dense candidates with BM25 and rank fusion
pub struct DenseSparseFuser {
    tokenizer: Arc<dyn Tokenizer>,
    bm25: Bm25Config,
    fusion: FusionConfig,
    key_fields: Vec<String>,
}

impl DenseSparseFuser {
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        bm25: Bm25Config,
        fusion: FusionConfig,
        key_fields: Vec<String>,
    ) -> Self {
        Self {
            tokenizer,
            bm25,
            fusion,
            key_fields,
        }
    }

    /// Deduplicate, score with BM25, fuse with the dense ranking and reorder
    ///
    /// Sets with at most one document after deduplication are returned as-is.
    pub fn fuse(&self, query: &str, docs: Vec<Document>) -> Vec<Document> {
        let docs = deduplicate_documents(docs, &self.key_fields);
        if docs.len() <= 1 {
            return docs;
        }

        let keyed: Vec<(String, Document)> = docs
            .into_iter()
            .map(|d| (document_key(&d, &self.key_fields), d))
            .collect();

        // Dense ranks from the search position unless the backend annotated one
        let mut dense_ranks = RankMap::new();
        let mut dense_scores = ScoreMap::new();
        for (position, (key, doc)) in keyed.iter().enumerate() {
            let rank = doc
                .get_i64(keys::DENSE_RANK)
                .filter(|r| *r >= 1)
                .map(|r| r as usize)
                .unwrap_or(position + 1);
            dense_ranks.insert(key.clone(), rank);
            dense_scores.insert(key.clone(), 1.0 / rank as f64);
        }

        let mut scorer = Bm25Scorer::new(self.tokenizer.clone(), self.bm25.k1, self.bm25.b)
            .with_max_doc_chars(self.bm25.max_doc_chars);
        let candidates: Vec<Document> = keyed.iter().map(|(_, d)| d.clone()).collect();
        scorer.fit(&candidates);
        let bm25 = scorer.score(query);

        let sparse_scores: ScoreMap = keyed
            .iter()
            .zip(&bm25)
            .map(|((key, _), score)| (key.clone(), *score))
            .collect();

        // Sparse ranks: BM25 descending, ties in candidate order
        let mut by_bm25: Vec<(&String, f64)> = keyed.iter().map(|(k, _)| k).zip(bm25.iter().copied()).collect();
        by_bm25.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let sparse_ranks: RankMap = by_bm25
            .into_iter()
            .enumerate()
            .map(|(i, (key, _))| (key.clone(), i + 1))
            .collect();

        let fused = fuse_scores(
            &self.fusion,
            &dense_ranks,
            &sparse_ranks,
            &dense_scores,
            &sparse_scores,
        );

        let items: Vec<(String, (String, Document))> = keyed
            .into_iter()
            .map(|(key, doc)| (key.clone(), (key, doc)))
            .collect();

        order_by_fused(items, &fused)
            .into_iter()
            .enumerate()
            .map(|(i, ((key, doc), score))| {
                let bm25_rank = sparse_ranks.get(&key).copied().unwrap_or(0);
                let bm25_score = sparse_scores.get(&key).copied().unwrap_or(0.0);
                doc.annotated(keys::BM25_SCORE, bm25_score)
                    .annotated(keys::BM25_RANK, bm25_rank)
                    .annotated(keys::HYBRID_SCORE, score)
                    .annotated(keys::HYBRID_RANK, i + 1)
            })
            .collect()
    }
}
