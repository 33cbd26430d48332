//! Two-stage case-law expansion
//!
//! Plain vector search returns fragments of rulings. For the best few distinct
//! cases the fragments are replaced by the whole ruling, reassembled from every
//! chunk stored under the same case number.

use crate::retrieval::deduplication::deduplicate_documents;
use crate::retrieval::document::{keys, Document};
use crate::services::{call_with_timeout, SearchFilter, VectorSearch};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Fetches and merges full case text for top-ranked case-law candidates
pub struct CaseExpander {
    case_store: Arc<dyn VectorSearch>,
    context_top_k: usize,
    placeholder_query: String,
    key_fields: Vec<String>,
    timeout: Duration,
}

impl CaseExpander {
    pub fn new(
        case_store: Arc<dyn VectorSearch>,
        context_top_k: usize,
        placeholder_query: impl Into<String>,
        key_fields: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            case_store,
            context_top_k,
            placeholder_query: placeholder_query.into(),
            key_fields,
            timeout,
        }
    }

    /// Expand the first `top_n` distinct cases among `candidates`
    ///
    /// Candidates without a case number, or repeating one already chosen, are
    /// skipped. A case whose full text cannot be fetched keeps its original
    /// chunk.
    pub async fn expand(&self, candidates: &[Document], top_n: usize) -> Vec<Document> {
        let mut seen: HashSet<String> = HashSet::new();
        let chosen: Vec<&Document> = candidates
            .iter()
            .filter(|doc| match doc.case_no() {
                Some(case_no) => seen.insert(case_no),
                None => false,
            })
            .take(top_n)
            .collect();

        let mut expanded = Vec::with_capacity(chosen.len());
        for doc in chosen {
            let full_text = self.full_case_text(doc).await;
            if full_text.is_empty() {
                expanded.push(doc.clone());
                continue;
            }

            let title = doc
                .get_str(keys::TITLE)
                .or_else(|| doc.get_str(keys::CASE_NAME))
                .or_else(|| doc.case_no())
                .unwrap_or_default();

            let mut replacement = Document::with_metadata(
                format!("[Full case text: {}]\n{}", title, full_text),
                doc.metadata.clone(),
            );
            replacement.metadata.insert(keys::EXPANDED.to_string(), true.into());
            expanded.push(replacement);
        }

        tracing::debug!("Expanded {} case(s) from {} candidates", expanded.len(), candidates.len());
        expanded
    }

    /// All chunks of the candidate's case joined in chunk order
    ///
    /// Returns an empty string when the fetch fails or finds nothing.
    pub async fn full_case_text(&self, candidate: &Document) -> String {
        let Some(case_value) = candidate.get(keys::CASE_NO).cloned() else {
            return String::new();
        };
        let case_no = candidate.case_no().unwrap_or_default();

        let mut filter = SearchFilter::new();
        filter.insert(keys::CASE_NO.to_string(), case_value);

        let store = self.case_store.clone();
        let query = self.placeholder_query.clone();
        let k = self.context_top_k;

        let mut chunks = match call_with_timeout("case full-text search", self.timeout, move || {
            store.search(&query, k, Some(&filter))
        })
        .await
        {
            Ok(hits) => hits.into_iter().map(|(doc, _)| doc).collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!("Failed to load full text for case {}: {}", case_no, e);
                return String::new();
            }
        };

        chunks.sort_by_key(|doc| doc.get_str(keys::CHUNK_ID).unwrap_or_default());
        let chunks = deduplicate_documents(chunks, &self.key_fields);

        chunks
            .iter()
            .map(|doc| doc.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}
