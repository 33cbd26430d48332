//! Result deduplication by document identity

use crate::retrieval::document::{is_truthy, scalar_to_string, Document};
use std::collections::HashSet;

/// Identity key for a document
///
/// The first configured key field holding a present value yields
/// `"{field}:{value}"`; documents without one are keyed by a BLAKE3 hash of
/// their content.
pub fn document_key(doc: &Document, key_fields: &[String]) -> String {
    for field in key_fields {
        if let Some(value) = doc.get(field).filter(|v| is_truthy(v)) {
            let rendered = scalar_to_string(value).unwrap_or_else(|| value.to_string());
            return format!("{}:{}", field, rendered);
        }
    }
    format!("content:{}", blake3::hash(doc.content.as_bytes()).to_hex())
}

/// Deduplicate documents by identity key, keeping the first occurrence
///
/// # Arguments
/// * `docs` - Ranked documents potentially with duplicates
/// * `key_fields` - Metadata fields tried in order to build the identity key
///
/// # Returns
/// Deduplicated documents, maintaining input order
pub fn deduplicate_documents(docs: Vec<Document>, key_fields: &[String]) -> Vec<Document> {
    let mut seen: HashSet<String> = HashSet::new();

    docs.into_iter()
        .filter(|doc| seen.insert(document_key(doc, key_fields)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::document::keys;

    fn fields() -> Vec<String> {
        vec!["chunk_id".to_string(), "id".to_string()]
    }

    #[test]
    fn test_deduplication() {
        let docs = vec![
            Document::new("text1").annotated(keys::CHUNK_ID, "c1"),
            Document::new("text2").annotated(keys::CHUNK_ID, "c2"),
            Document::new("text1 again").annotated(keys::CHUNK_ID, "c1"), // Duplicate
        ];

        let deduped = deduplicate_documents(docs, &fields());

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].content, "text1"); // Keeps first
        assert_eq!(deduped[1].content, "text2");
    }

    #[test]
    fn test_key_field_order() {
        let doc = Document::new("x")
            .annotated("id", 7)
            .annotated(keys::CHUNK_ID, "");
        // Empty chunk_id is skipped in favour of id
        assert_eq!(document_key(&doc, &fields()), "id:7");
    }

    #[test]
    fn test_content_hash_fallback() {
        let a = Document::new("same body");
        let b = Document::new("same body").annotated("title", "other");
        let c = Document::new("different body");

        assert!(document_key(&a, &fields()).starts_with("content:"));
        assert_eq!(document_key(&a, &fields()), document_key(&b, &fields()));
        assert_ne!(document_key(&a, &fields()), document_key(&c, &fields()));

        let deduped = deduplicate_documents(vec![a, b, c], &fields());
        assert_eq!(deduped.len(), 2);
    }
}
