//! Hybrid retrieval over the statute, regulation and case-law indices
//!
//! Dense candidates from each index are re-scored with BM25, fused per index,
//! reranked across indices, expanded to full case text where relevant and
//! finally arranged by legal priority.

pub mod bm25;
pub mod case_expansion;
pub mod deduplication;
pub mod document;
pub mod fusion;
pub mod hierarchy;
pub mod orchestrator;
pub mod tokenizer;

pub use bm25::Bm25Scorer;
pub use case_expansion::CaseExpander;
pub use deduplication::{deduplicate_documents, document_key};
pub use document::{Document, Metadata, SourceIndex};
pub use fusion::{DenseSparseFuser, FusionConfig, FusionMethod};
pub use hierarchy::{format_context_with_hierarchy, Tier};
pub use orchestrator::{IndexStores, RetrievalOrchestrator};
pub use tokenizer::{select_tokenizer, Morpheme, MorphemeAnalyzer, MorphTokenizer, RegexTokenizer, Tokenizer};
