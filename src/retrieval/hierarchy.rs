//! Legal-priority context assembly
//!
//! Final documents are grouped into three tiers by their `priority` metadata
//! and rendered as one text block for the answer generator. Statutes come
//! first, then regulations and procedures, then case law and interpretations.

use crate::retrieval::document::{keys, Document};

/// Label used when a document has neither `src_title` nor `source_index`
const DEFAULT_SOURCE_LABEL: &str = "material";

/// Legal-source authority bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// Core statutes
    CoreStatutes,
    /// Regulations and procedures
    Regulations,
    /// Case law and interpretations
    CaseLaw,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::CoreStatutes, Tier::Regulations, Tier::CaseLaw];

    /// Tier for an integer priority; anything unlisted is case law
    pub fn for_priority(priority: i64) -> Self {
        match priority {
            1 | 2 | 4 | 5 => Tier::CoreStatutes,
            3 | 6 | 7 | 8 | 11 => Tier::Regulations,
            _ => Tier::CaseLaw,
        }
    }

    pub fn header(&self) -> &'static str {
        match self {
            Tier::CoreStatutes => "## [SECTION 1: Core statutes (primary legal basis)]",
            Tier::Regulations => "## [SECTION 2: Regulations and procedures (detailed criteria)]",
            Tier::CaseLaw => "## [SECTION 3: Case law and interpretations (applied examples)]",
        }
    }
}

/// Render one document as `[{source}] {title}\n{content}`
fn render_entry(doc: &Document) -> String {
    let source = doc
        .get_str(keys::SRC_TITLE)
        .or_else(|| doc.get_str(keys::SOURCE_INDEX))
        .unwrap_or_else(|| DEFAULT_SOURCE_LABEL.to_string());
    let title = doc.get_str(keys::TITLE).unwrap_or_default();
    format!("[{}] {}\n{}", source, title, doc.content)
        .trim()
        .to_string()
}

/// Group documents into tiers, preserving input order within each tier
pub fn partition_by_tier(docs: &[Document]) -> [Vec<&Document>; 3] {
    let mut tiers: [Vec<&Document>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for doc in docs {
        let slot = match Tier::for_priority(doc.priority()) {
            Tier::CoreStatutes => 0,
            Tier::Regulations => 1,
            Tier::CaseLaw => 2,
        };
        tiers[slot].push(doc);
    }
    tiers
}

/// Build the structured context block; empty tiers are omitted
pub fn format_context_with_hierarchy(docs: &[Document]) -> String {
    let tiers = partition_by_tier(docs);

    let sections: Vec<String> = Tier::ALL
        .iter()
        .zip(tiers.iter())
        .filter(|(_, entries)| !entries.is_empty())
        .map(|(tier, entries)| {
            let body = entries
                .iter()
                .map(|doc| render_entry(doc))
                .collect::<Vec<_>>()
                .join("\n\n");
            format!("{}\n{}", tier.header(), body)
        })
        .collect();

    sections.join("\n\n").trim().to_string()
}
