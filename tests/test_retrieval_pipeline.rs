//! Integration tests: triple hybrid retrieval and answer generation
//!
//! All collaborators are in-memory mocks so the full pipeline runs without
//! models or network access.

use lease_rag::config::Config;
use lease_rag::pipeline::{GENERATION_FAILED_ANSWER, NO_DOCUMENTS_ANSWER};
use lease_rag::retrieval::document::keys;
use lease_rag::retrieval::{Document, IndexStores, RetrievalOrchestrator, SourceIndex};
use lease_rag::services::{
    AnswerGenerator, LegalDictionary, QueryNormalizer, Reranker, SearchFilter, ServiceError, VectorSearch,
};
use lease_rag::{LeaseRagError, RagPipeline};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const QUESTION: &str = "집주인이 보증금을 안 돌려줘요";
const NORMALIZED: &str = "임대인이 임대차보증금을 반환하지 않는 경우";

/// Returns fixed documents, honoring equality filters, and records queries
struct FixtureSearch {
    docs: Vec<Document>,
    queries: Mutex<Vec<String>>,
}

impl FixtureSearch {
    fn new(docs: Vec<Document>) -> Arc<Self> {
        Arc::new(Self {
            docs,
            queries: Mutex::new(Vec::new()),
        })
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl VectorSearch for FixtureSearch {
    fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<(Document, Option<f32>)>, ServiceError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self
            .docs
            .iter()
            .filter(|d| filter.map_or(true, |f| f.iter().all(|(key, value)| d.get(key) == Some(value))))
            .take(k)
            .enumerate()
            .map(|(i, d)| (d.clone(), Some(0.9 - i as f32 * 0.1)))
            .collect())
    }
}

struct FailingSearch;

impl VectorSearch for FailingSearch {
    fn search(
        &self,
        _query: &str,
        _k: usize,
        _filter: Option<&SearchFilter>,
    ) -> Result<Vec<(Document, Option<f32>)>, ServiceError> {
        Err(ServiceError::Unavailable("index offline".to_string()))
    }
}

struct SlowSearch;

impl VectorSearch for SlowSearch {
    fn search(
        &self,
        _query: &str,
        _k: usize,
        _filter: Option<&SearchFilter>,
    ) -> Result<Vec<(Document, Option<f32>)>, ServiceError> {
        std::thread::sleep(Duration::from_millis(1500));
        Ok(Vec::new())
    }
}

/// Keeps the input order with descending scores above any sane threshold
struct PassthroughReranker;

impl Reranker for PassthroughReranker {
    fn rerank(&self, _query: &str, documents: &[String], top_n: usize) -> Result<Vec<(usize, f32)>, ServiceError> {
        Ok((0..documents.len().min(top_n))
            .map(|i| (i, 0.99 - i as f32 * 0.01))
            .collect())
    }
}

/// Scores by whether the text mentions a keyword
struct KeywordReranker(&'static str);

impl Reranker for KeywordReranker {
    fn rerank(&self, _query: &str, documents: &[String], _top_n: usize) -> Result<Vec<(usize, f32)>, ServiceError> {
        let mut scored: Vec<(usize, f32)> = documents
            .iter()
            .enumerate()
            .map(|(i, d)| (i, if d.contains(self.0) { 0.9 } else { 0.05 }))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        Ok(scored)
    }
}

struct FailingReranker;

impl Reranker for FailingReranker {
    fn rerank(&self, _query: &str, _documents: &[String], _top_n: usize) -> Result<Vec<(usize, f32)>, ServiceError> {
        Err(ServiceError::Request("rerank quota exceeded".to_string()))
    }
}

struct FixedNormalizer;

impl QueryNormalizer for FixedNormalizer {
    fn normalize(&self, _dictionary: &LegalDictionary, _question: &str) -> Result<String, ServiceError> {
        Ok(NORMALIZED.to_string())
    }
}

struct FailingNormalizer;

impl QueryNormalizer for FailingNormalizer {
    fn normalize(&self, _dictionary: &LegalDictionary, _question: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Unavailable("llm offline".to_string()))
    }
}

struct EchoGenerator;

impl AnswerGenerator for EchoGenerator {
    fn generate(&self, context: &str, question: &str) -> Result<String, ServiceError> {
        Ok(format!("  answer to {} using {} chars of context  ", question, context.chars().count()))
    }
}

struct FailingGenerator;

impl AnswerGenerator for FailingGenerator {
    fn generate(&self, _context: &str, _question: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Request("generation failed".to_string()))
    }
}

fn law_docs() -> Vec<Document> {
    vec![Document::new("임대인은 임대차가 종료된 때 임대차보증금을 반환하여야 한다.")
        .annotated(keys::CHUNK_ID, "law-1")
        .annotated(keys::PRIORITY, 1)
        .annotated(keys::SRC_TITLE, "주택임대차보호법")
        .annotated(keys::TITLE, "제3조의2")]
}

fn rule_docs() -> Vec<Document> {
    vec![Document::new("임차권등기명령의 신청서에는 임대차보증금의 액수를 적어야 한다.")
        .annotated(keys::CHUNK_ID, "rule-1")
        .annotated(keys::PRIORITY, 3)
        .annotated(keys::SRC_TITLE, "임차권등기명령 절차에 관한 규칙")
        .annotated(keys::TITLE, "제2조")]
}

fn case_chunk(chunk_id: &str, text: &str) -> Document {
    Document::new(text)
        .annotated(keys::CHUNK_ID, chunk_id)
        .annotated(keys::CASE_NO, "2020다12345")
        .annotated(keys::PRIORITY, 9)
        .annotated(keys::SRC_TITLE, "대법원 판례")
        .annotated(keys::TITLE, "보증금반환")
}

fn case_docs() -> Vec<Document> {
    vec![
        case_chunk("2020다12345-02", "임대인은 임차인에게 임대차보증금을 반환할 의무가 있다."),
        case_chunk("2020다12345-01", "원고는 피고에게 임대차보증금의 반환을 구하였다."),
    ]
}

struct Fixture {
    law: Arc<FixtureSearch>,
    rule: Arc<FixtureSearch>,
    case: Arc<FixtureSearch>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            law: FixtureSearch::new(law_docs()),
            rule: FixtureSearch::new(rule_docs()),
            case: FixtureSearch::new(case_docs()),
        }
    }

    fn stores(&self) -> IndexStores {
        IndexStores {
            law: self.law.clone(),
            rule: self.rule.clone(),
            case: self.case.clone(),
        }
    }
}

fn orchestrator(stores: IndexStores, reranker: Option<Arc<dyn Reranker>>) -> RetrievalOrchestrator {
    RetrievalOrchestrator::new(Config::default(), stores, reranker, None).unwrap()
}

#[tokio::test]
async fn test_end_to_end_priority_order() {
    let fixture = Fixture::new();
    let pipeline = RagPipeline::new(
        orchestrator(fixture.stores(), Some(Arc::new(PassthroughReranker))),
        Arc::new(EchoGenerator),
    )
    .with_normalizer(Arc::new(FixedNormalizer), LegalDictionary::default());

    let answer = pipeline.answer(QUESTION, false).await;
    let docs = &answer.retrieval.documents;

    assert_eq!(answer.retrieval.query, NORMALIZED);
    assert_eq!(fixture.law.queries(), vec![NORMALIZED.to_string()]);

    assert_eq!(docs.len(), 3);
    assert_eq!(docs.iter().map(|d| d.priority()).collect::<Vec<_>>(), vec![1, 3, 9]);
    assert_eq!(docs[0].source_index(), Some(SourceIndex::Law));
    assert_eq!(docs[1].source_index(), Some(SourceIndex::Rule));

    let case = &docs[2];
    assert!(case.is_expanded());
    assert_eq!(
        case.content,
        "[Full case text: 보증금반환]\n\
         원고는 피고에게 임대차보증금의 반환을 구하였다.\n\
         임대인은 임차인에게 임대차보증금을 반환할 의무가 있다."
    );
    assert!(docs.iter().all(|d| d.get(keys::RERANK_SCORE).is_some()));
    assert!(docs.iter().all(|d| d.get(keys::DENSE_RANK).is_some()));

    let context = &answer.retrieval.context;
    let s1 = context.find("SECTION 1").unwrap();
    let s2 = context.find("SECTION 2").unwrap();
    let s3 = context.find("SECTION 3").unwrap();
    assert!(s1 < s2 && s2 < s3);
    assert!(context.contains("[주택임대차보호법] 제3조의2"));

    assert!(answer.text.starts_with("answer to "));
    assert!(!answer.text.ends_with(' '));
}

#[tokio::test]
async fn test_generate_answer_is_deterministic() {
    let fixture = Fixture::new();
    let pipeline = RagPipeline::new(
        orchestrator(fixture.stores(), Some(Arc::new(PassthroughReranker))),
        Arc::new(EchoGenerator),
    );

    let first = pipeline.generate_answer(QUESTION, true).await;
    let second = pipeline.generate_answer(QUESTION, true).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_rerank_failure_keeps_candidates() {
    let fixture = Fixture::new();
    let orchestrator = orchestrator(fixture.stores(), Some(Arc::new(FailingReranker)));

    let docs = orchestrator.triple_hybrid_retrieval(NORMALIZED).await;

    assert_eq!(docs.len(), 3);
    assert!(docs.iter().all(|d| d.get(keys::RERANK_SCORE).is_none()));
    assert_eq!(docs.iter().map(|d| d.priority()).collect::<Vec<_>>(), vec![1, 3, 9]);
}

#[tokio::test]
async fn test_rerank_threshold_filters_documents() {
    let fixture = Fixture::new();
    let orchestrator = orchestrator(fixture.stores(), Some(Arc::new(KeywordReranker("종료된"))));

    let docs = orchestrator.triple_hybrid_retrieval(NORMALIZED).await;

    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].get_str(keys::CHUNK_ID).as_deref(), Some("law-1"));
}

#[tokio::test]
async fn test_rerank_below_threshold_falls_back_to_top_k() {
    let fixture = Fixture::new();
    let orchestrator = orchestrator(fixture.stores(), Some(Arc::new(KeywordReranker("없는 단어"))));

    let docs = orchestrator.triple_hybrid_retrieval(NORMALIZED).await;

    assert_eq!(docs.len(), 3);
    assert!(docs.iter().all(|d| d.get(keys::RERANK_SCORE).is_some()));
}

#[tokio::test]
async fn test_failed_index_is_skipped() {
    let fixture = Fixture::new();
    let stores = IndexStores {
        law: Arc::new(FailingSearch),
        rule: fixture.rule.clone(),
        case: fixture.case.clone(),
    };

    let docs = orchestrator(stores, None).triple_hybrid_retrieval(NORMALIZED).await;

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].source_index(), Some(SourceIndex::Rule));
    assert!(docs[1].is_expanded());
}

#[tokio::test]
async fn test_slow_index_times_out() {
    let fixture = Fixture::new();
    let mut config = Config::default();
    config.services.timeout_secs = 1;

    let stores = IndexStores {
        law: fixture.law.clone(),
        rule: Arc::new(SlowSearch),
        case: fixture.case.clone(),
    };
    let orchestrator = RetrievalOrchestrator::new(config, stores, None, None).unwrap();

    let docs = orchestrator.triple_hybrid_retrieval(NORMALIZED).await;
    assert!(docs.iter().all(|d| d.source_index() != Some(SourceIndex::Rule)));
    assert_eq!(docs.len(), 2);
}

#[tokio::test]
async fn test_hybrid_disabled_keeps_dense_order() {
    let fixture = Fixture::new();
    let mut config = Config::default();
    config.hybrid.enabled = false;
    config.rerank.enabled = false;

    let docs = RetrievalOrchestrator::new(config, fixture.stores(), None, None)
        .unwrap()
        .triple_hybrid_retrieval(NORMALIZED)
        .await;

    assert_eq!(docs.len(), 3);
    assert!(docs.iter().all(|d| d.get(keys::HYBRID_SCORE).is_none()));
}

#[tokio::test]
async fn test_case_law_counted_after_expansion() {
    let mut case = case_docs();
    for i in 0..4 {
        case.push(
            Document::new(format!("다른 사건 {}", i))
                .annotated(keys::CHUNK_ID, format!("other-{}", i))
                .annotated(keys::CASE_NO, format!("2021다{}", i))
                .annotated(keys::PRIORITY, 9),
        );
    }
    let stores = IndexStores {
        law: FixtureSearch::new(law_docs()),
        rule: FixtureSearch::new(rule_docs()),
        case: FixtureSearch::new(case),
    };
    let mut config = Config::default();
    config.retrieval.k_case = 2;
    config.rerank.enabled = false;

    let docs = RetrievalOrchestrator::new(config, stores, None, None)
        .unwrap()
        .triple_hybrid_retrieval(NORMALIZED)
        .await;

    let cases: Vec<&Document> = docs
        .iter()
        .filter(|d| d.source_index() == Some(SourceIndex::Case))
        .collect();
    assert_eq!(cases.len(), 2);
    assert!(cases.iter().all(|d| d.is_expanded()));
    assert_ne!(cases[0].case_no(), cases[1].case_no());
}

#[tokio::test]
async fn test_normalization_failure_uses_original_question() {
    let fixture = Fixture::new();
    let pipeline = RagPipeline::new(orchestrator(fixture.stores(), None), Arc::new(EchoGenerator))
        .with_normalizer(Arc::new(FailingNormalizer), LegalDictionary::default());

    let retrieval = pipeline.retrieve(QUESTION, false).await;
    assert_eq!(retrieval.query, QUESTION);
    assert_eq!(fixture.rule.queries(), vec![QUESTION.to_string()]);
}

#[tokio::test]
async fn test_skip_normalization() {
    let fixture = Fixture::new();
    let pipeline = RagPipeline::new(orchestrator(fixture.stores(), None), Arc::new(EchoGenerator))
        .with_normalizer(Arc::new(FixedNormalizer), LegalDictionary::default());

    let retrieval = pipeline.retrieve(QUESTION, true).await;
    assert_eq!(retrieval.query, QUESTION);
}

#[tokio::test]
async fn test_empty_retrieval_answer() {
    let stores = IndexStores {
        law: FixtureSearch::new(Vec::new()),
        rule: FixtureSearch::new(Vec::new()),
        case: FixtureSearch::new(Vec::new()),
    };
    let pipeline = RagPipeline::new(orchestrator(stores, None), Arc::new(EchoGenerator));

    assert_eq!(pipeline.generate_answer(QUESTION, true).await, NO_DOCUMENTS_ANSWER);
}

#[tokio::test]
async fn test_generation_failure_answer() {
    let fixture = Fixture::new();
    let pipeline = RagPipeline::new(orchestrator(fixture.stores(), None), Arc::new(FailingGenerator));

    assert_eq!(pipeline.generate_answer(QUESTION, true).await, GENERATION_FAILED_ANSWER);
}

#[test]
fn test_invalid_config_rejected_at_construction() {
    let fixture = Fixture::new();
    let mut config = Config::default();
    config.hybrid.method = "borda".to_string();
    config.bm25.b = 1.5;

    let err = RetrievalOrchestrator::new(config, fixture.stores(), None, None)
        .err()
        .unwrap();
    match err {
        LeaseRagError::ConfigValidation { errors } => assert_eq!(errors.len(), 2),
        other => panic!("unexpected error: {}", other),
    }
}
