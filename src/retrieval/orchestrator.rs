//! Triple-index hybrid retrieval
//!
//! Dense search over the statute, regulation and case-law indices, per-index
//! BM25 fusion, cross-index reranking, case-law expansion and a final
//! legal-priority sort.

use crate::config::{Config, ConfigValidator};
use crate::error::{LeaseRagError, Result};
use crate::retrieval::case_expansion::CaseExpander;
use crate::retrieval::deduplication::deduplicate_documents;
use crate::retrieval::document::{keys, truncate_chars, Document, SourceIndex};
use crate::retrieval::fusion::{DenseSparseFuser, FusionConfig};
use crate::retrieval::hierarchy;
use crate::retrieval::tokenizer::{select_tokenizer, MorphemeAnalyzer};
use crate::services::{call_with_timeout, Reranker, VectorSearch};
use std::sync::Arc;
use std::time::Duration;

/// Search backends for the three indices
#[derive(Clone)]
pub struct IndexStores {
    pub law: Arc<dyn VectorSearch>,
    pub rule: Arc<dyn VectorSearch>,
    pub case: Arc<dyn VectorSearch>,
}

impl IndexStores {
    fn get(&self, index: SourceIndex) -> &Arc<dyn VectorSearch> {
        match index {
            SourceIndex::Law => &self.law,
            SourceIndex::Rule => &self.rule,
            SourceIndex::Case => &self.case,
        }
    }
}

/// Drives one retrieval pass from dense search to the final ordered documents
pub struct RetrievalOrchestrator {
    config: Config,
    stores: IndexStores,
    reranker: Option<Arc<dyn Reranker>>,
    fuser: DenseSparseFuser,
    expander: CaseExpander,
    timeout: Duration,
}

impl RetrievalOrchestrator {
    /// Create an orchestrator; the configuration is validated here
    ///
    /// The morphological tokenizer is used for BM25 when it is enabled and an
    /// analyzer is supplied, otherwise the regex tokenizer.
    pub fn new(
        config: Config,
        stores: IndexStores,
        reranker: Option<Arc<dyn Reranker>>,
        analyzer: Option<Arc<dyn MorphemeAnalyzer>>,
    ) -> Result<Self> {
        ConfigValidator::validate(&config)?;

        let fusion = FusionConfig::from_config(&config.hybrid).map_err(|e| LeaseRagError::InvalidConfigValue {
            path: "hybrid".to_string(),
            message: e.to_string(),
        })?;
        let tokenizer = select_tokenizer(&config.bm25, analyzer);
        tracing::debug!("BM25 tokenizer: {}", tokenizer.name());

        let key_fields = config.dedup.key_fields.clone();
        let timeout = config.services.timeout();

        let fuser = DenseSparseFuser::new(tokenizer, config.bm25.clone(), fusion, key_fields.clone());
        let expander = CaseExpander::new(
            stores.case.clone(),
            config.case_expansion.context_top_k,
            config.case_expansion.placeholder_query.clone(),
            key_fields,
            timeout,
        );

        Ok(Self {
            config,
            stores,
            reranker,
            fuser,
            expander,
            timeout,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Retrieve the final, priority-ordered documents for `query`
    ///
    /// Collaborator failures never surface here: a failed index search yields
    /// no candidates for that index, a failed rerank keeps the capped
    /// candidate order, and a failed case fetch keeps the original chunk.
    pub async fn triple_hybrid_retrieval(&self, query: &str) -> Vec<Document> {
        let cfg = &self.config;

        tracing::info!("Hybrid retrieval for query: {}", query);

        // Step 1: Parallel dense search over the three indices
        let (law, rule, case) = tokio::join!(
            self.dense_search(SourceIndex::Law, query, cfg.retrieval.oversampled(cfg.retrieval.k_law)),
            self.dense_search(SourceIndex::Rule, query, cfg.retrieval.oversampled(cfg.retrieval.k_rule)),
            self.dense_search(SourceIndex::Case, query, cfg.retrieval.case_candidate_k)
        );
        tracing::debug!(
            "Dense candidates: law={}, rule={}, case={}",
            law.len(),
            rule.len(),
            case.len()
        );

        // Step 2: Per-index dense + BM25 fusion
        let (law, rule, case) = if cfg.hybrid.enabled {
            (
                self.fuser.fuse(query, law),
                self.fuser.fuse(query, rule),
                self.fuser.fuse(query, case),
            )
        } else {
            (law, rule, case)
        };

        // Step 3: Cap the rerank input, statutes and regulations first
        let combined = cap_for_rerank(law, rule, case, cfg.rerank.max_documents, &cfg.dedup.key_fields);

        // Step 4: Rerank
        let ranked = if cfg.rerank.enabled {
            self.rerank(query, &combined).await
        } else {
            None
        };
        let selected = match ranked {
            Some(ranked) => {
                let selected =
                    select_reranked(&combined, &ranked, cfg.rerank.threshold, cfg.retrieval.total_k());
                tracing::info!("Rerank selected {} of {} documents", selected.len(), combined.len());
                selected
            }
            None => combined,
        };

        // Step 5: Deduplicate
        let selected = deduplicate_documents(selected, &cfg.dedup.key_fields);

        // Step 6: Per-source caps and case expansion
        let (law, rule, case) = split_by_source(selected);
        let final_law: Vec<Document> = law.into_iter().take(cfg.retrieval.k_law).collect();
        let final_rule: Vec<Document> = rule.into_iter().take(cfg.retrieval.k_rule).collect();

        let mut final_case = self.expander.expand(&case, cfg.case_expand_top_n()).await;
        final_case.truncate(cfg.retrieval.k_case);

        tracing::info!(
            "Final retrieval: law={}, rule={}, case={}",
            final_law.len(),
            final_rule.len(),
            final_case.len()
        );

        // Step 7: Legal-priority sort
        let mut final_docs = final_law;
        final_docs.extend(final_rule);
        final_docs.extend(final_case);
        final_docs.sort_by_key(Document::priority);

        final_docs
    }

    /// Render documents as the tiered context block
    pub fn format_context_with_hierarchy(docs: &[Document]) -> String {
        hierarchy::format_context_with_hierarchy(docs)
    }

    /// Dense search on one index, annotating source and dense rank
    async fn dense_search(&self, index: SourceIndex, query: &str, k: usize) -> Vec<Document> {
        let store = self.stores.get(index).clone();
        let query = query.to_string();

        let operation = format!("{} search", index);
        let hits = match call_with_timeout(&operation, self.timeout, move || store.search(&query, k, None)).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("Dense search on {} index failed: {}", index, e);
                return Vec::new();
            }
        };

        hits.into_iter()
            .enumerate()
            .map(|(i, (doc, score))| {
                let doc = doc
                    .annotated(keys::SOURCE_INDEX, index.as_str())
                    .annotated(keys::DENSE_RANK, i + 1);
                match score {
                    Some(score) => doc.annotated(keys::DENSE_SCORE, f64::from(score)),
                    None => doc,
                }
            })
            .collect()
    }

    /// Rerank via the collaborator; `None` when disabled, empty or failed
    async fn rerank(&self, query: &str, docs: &[Document]) -> Option<Vec<(usize, f32)>> {
        let reranker = self.reranker.clone()?;
        if docs.is_empty() {
            return None;
        }

        let max_chars = self.config.rerank.doc_max_chars;
        let texts: Vec<String> = docs.iter().map(|d| truncate_chars(&d.content, max_chars)).collect();
        let top_n = texts.len();
        let query = query.to_string();

        match call_with_timeout("rerank", self.timeout, move || reranker.rerank(&query, &texts, top_n)).await {
            Ok(ranked) if ranked.is_empty() => None,
            Ok(ranked) => Some(ranked),
            Err(e) => {
                tracing::warn!("Rerank failed, keeping fused order: {}", e);
                None
            }
        }
    }
}

/// Deduplicate each index, then fill the rerank budget with statutes and
/// regulations before any case law
pub fn cap_for_rerank(
    law: Vec<Document>,
    rule: Vec<Document>,
    case: Vec<Document>,
    max_documents: usize,
    key_fields: &[String],
) -> Vec<Document> {
    let mut base = deduplicate_documents(law, key_fields);
    base.extend(deduplicate_documents(rule, key_fields));

    if base.len() >= max_documents {
        base.truncate(max_documents);
        return base;
    }

    let remaining = max_documents - base.len();
    base.extend(deduplicate_documents(case, key_fields).into_iter().take(remaining));
    base
}

/// Apply the relevance threshold to reranked positions
///
/// Indices outside `candidates` are ignored. When nothing clears the
/// threshold, the first `fallback_k` ranked items are kept instead. Kept
/// documents carry their `rerank_score`.
pub fn select_reranked(
    candidates: &[Document],
    ranked: &[(usize, f32)],
    threshold: f64,
    fallback_k: usize,
) -> Vec<Document> {
    let valid: Vec<(usize, f32)> = ranked
        .iter()
        .copied()
        .filter(|(i, _)| *i < candidates.len())
        .collect();
    if valid.is_empty() {
        return candidates.to_vec();
    }

    let mut kept: Vec<(usize, f32)> = valid
        .iter()
        .copied()
        .filter(|(_, score)| f64::from(*score) >= threshold)
        .collect();
    if kept.is_empty() {
        tracing::debug!("No document cleared rerank threshold {}, keeping top {}", threshold, fallback_k);
        kept = valid.into_iter().take(fallback_k).collect();
    }

    kept.into_iter()
        .map(|(i, score)| candidates[i].clone().annotated(keys::RERANK_SCORE, f64::from(score)))
        .collect()
}

/// Split by `source_index`, preserving order; unlabeled documents are dropped
fn split_by_source(docs: Vec<Document>) -> (Vec<Document>, Vec<Document>, Vec<Document>) {
    let mut law = Vec::new();
    let mut rule = Vec::new();
    let mut case = Vec::new();
    for doc in docs {
        match doc.source_index() {
            Some(SourceIndex::Law) => law.push(doc),
            Some(SourceIndex::Rule) => rule.push(doc),
            Some(SourceIndex::Case) => case.push(doc),
            None => {}
        }
    }
    (law, rule, case)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{SearchFilter, ServiceError};

    /// Returns the same scored hits for every query
    struct ScoredStore(Vec<(Document, Option<f32>)>);

    impl VectorSearch for ScoredStore {
        fn search(
            &self,
            _query: &str,
            k: usize,
            _filter: Option<&SearchFilter>,
        ) -> std::result::Result<Vec<(Document, Option<f32>)>, ServiceError> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    fn fields() -> Vec<String> {
        vec!["chunk_id".to_string(), "id".to_string()]
    }

    fn doc(id: &str, source: SourceIndex) -> Document {
        Document::new(format!("본문 {}", id))
            .annotated(keys::CHUNK_ID, id)
            .annotated(keys::SOURCE_INDEX, source.as_str())
    }

    #[test]
    fn test_cap_prefers_statutes_and_regulations() {
        let law = vec![doc("l1", SourceIndex::Law), doc("l2", SourceIndex::Law)];
        let rule = vec![doc("r1", SourceIndex::Rule)];
        let case = vec![doc("c1", SourceIndex::Case), doc("c2", SourceIndex::Case)];

        let capped = cap_for_rerank(law.clone(), rule.clone(), case.clone(), 4, &fields());
        let ids: Vec<String> = capped.iter().map(|d| d.get_str(keys::CHUNK_ID).unwrap()).collect();
        assert_eq!(ids, vec!["l1", "l2", "r1", "c1"]);

        let capped = cap_for_rerank(law, rule, case, 2, &fields());
        assert_eq!(capped.len(), 2);
        assert!(capped.iter().all(|d| d.source_index() == Some(SourceIndex::Law)));
    }

    #[test]
    fn test_cap_deduplicates_within_index() {
        let law = vec![doc("l1", SourceIndex::Law), doc("l1", SourceIndex::Law)];
        let capped = cap_for_rerank(law, Vec::new(), Vec::new(), 10, &fields());
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn test_select_reranked_threshold() {
        let candidates = vec![
            doc("a", SourceIndex::Law),
            doc("b", SourceIndex::Rule),
            doc("c", SourceIndex::Case),
        ];
        let ranked = vec![(2, 0.9), (0, 0.5), (1, 0.1)];

        let kept = select_reranked(&candidates, &ranked, 0.2, 13);
        let ids: Vec<String> = kept.iter().map(|d| d.get_str(keys::CHUNK_ID).unwrap()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert!((kept[0].get(keys::RERANK_SCORE).unwrap().as_f64().unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_select_reranked_falls_back_to_top_k() {
        let candidates = vec![
            doc("a", SourceIndex::Law),
            doc("b", SourceIndex::Rule),
            doc("c", SourceIndex::Case),
        ];
        let ranked = vec![(1, 0.05), (0, 0.04), (2, 0.01)];

        let kept = select_reranked(&candidates, &ranked, 0.2, 2);
        let ids: Vec<String> = kept.iter().map(|d| d.get_str(keys::CHUNK_ID).unwrap()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_select_reranked_ignores_out_of_range() {
        let candidates = vec![doc("a", SourceIndex::Law)];
        let kept = select_reranked(&candidates, &[(7, 0.9), (0, 0.8)], 0.2, 5);
        assert_eq!(kept.len(), 1);

        let kept = select_reranked(&candidates, &[(7, 0.9)], 0.2, 5);
        assert_eq!(kept, candidates);
    }

    #[tokio::test]
    async fn test_dense_search_annotates_rank_and_score() {
        let store: Arc<dyn VectorSearch> = Arc::new(ScoredStore(vec![
            (Document::new("제3조").annotated(keys::CHUNK_ID, "l1"), Some(0.75)),
            (Document::new("제4조").annotated(keys::CHUNK_ID, "l2"), None),
        ]));
        let stores = IndexStores {
            law: store.clone(),
            rule: store.clone(),
            case: store,
        };
        let orchestrator = RetrievalOrchestrator::new(Config::default(), stores, None, None).unwrap();

        let hits = orchestrator.dense_search(SourceIndex::Law, "대항력", 10).await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_index(), Some(SourceIndex::Law));
        assert_eq!(hits[0].get_i64(keys::DENSE_RANK), Some(1));
        assert_eq!(hits[0].get(keys::DENSE_SCORE).and_then(|v| v.as_f64()), Some(0.75));
        assert_eq!(hits[1].get_i64(keys::DENSE_RANK), Some(2));
        assert!(hits[1].get(keys::DENSE_SCORE).is_none());
    }

    #[test]
    fn test_split_by_source_drops_unlabeled() {
        let docs = vec![
            doc("l1", SourceIndex::Law),
            Document::new("unlabeled"),
            doc("c1", SourceIndex::Case),
            doc("r1", SourceIndex::Rule),
        ];
        let (law, rule, case) = split_by_source(docs);
        assert_eq!((law.len(), rule.len(), case.len()), (1, 1, 1));
    }
}
