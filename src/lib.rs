//! lease-rag - Hybrid legal retrieval for housing-lease questions
//!
//! Retrieves statutes, regulations and case law for a question through dense
//! search, BM25 rank fusion, cross-encoder reranking and full case-text
//! expansion, then arranges the material by legal priority for an answer
//! generator.

pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod retrieval;
pub mod services;

pub use error::{LeaseRagError, Result};
pub use pipeline::{Answer, RagPipeline, Retrieval};
