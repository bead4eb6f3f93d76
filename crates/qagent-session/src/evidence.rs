//! Turns raw hits into the bounded, labelled evidence handed to generation.

use std::collections::{BTreeMap, BTreeSet};

use qagent_core::config::RetrievalSettings;
use qagent_core::types::{EvidenceContext, EvidenceEntry, SearchHit};

fn token_set(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Token-set Jaccard similarity in `[0, 1]`.
pub fn jaccard(a: &str, b: &str) -> f32 {
    let (a, b) = (token_set(a), token_set(b));
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(&b).count();
    let union = a.union(&b).count();
    shared as f32 / union as f32
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[derive(Debug, Clone, Copy)]
pub struct EvidenceAssembler {
    pub char_budget: usize,
    pub dedup_threshold: f32,
}

impl EvidenceAssembler {
    pub fn from_settings(settings: &RetrievalSettings) -> Self {
        Self { char_budget: settings.evidence_char_budget, dedup_threshold: settings.dedup_threshold }
    }

    /// Builds the context from hits ordered best first.
    ///
    /// A hit is dropped when an already kept chunk of the same document is at
    /// least `dedup_threshold` similar. Over budget, the lowest scored entries
    /// go first; the best entry is cut to the budget rather than dropped.
    pub fn assemble(&self, query: &str, hits: Vec<SearchHit>) -> EvidenceContext {
        let mut kept: Vec<SearchHit> = Vec::new();
        let mut deduplicated = 0;
        for hit in hits {
            let duplicate = kept.iter().any(|k| {
                k.chunk.id == hit.chunk.id
                    || (k.chunk.doc_id == hit.chunk.doc_id && jaccard(&k.chunk.text, &hit.chunk.text) >= self.dedup_threshold)
            });
            if duplicate {
                deduplicated += 1;
            } else {
                kept.push(hit);
            }
        }

        let mut truncated = 0;
        let mut total: usize = kept.iter().map(|h| h.chunk.text.chars().count()).sum();
        while total > self.char_budget && kept.len() > 1 {
            if let Some(dropped) = kept.pop() {
                total -= dropped.chunk.text.chars().count();
                truncated += 1;
            }
        }
        if let Some(first) = kept.first_mut() {
            if total > self.char_budget {
                first.chunk.text = truncate_chars(&first.chunk.text, self.char_budget);
                first.chunk.char_end = first.chunk.char_start + self.char_budget;
                truncated += 1;
            }
        }

        let entries: Vec<EvidenceEntry> = kept
            .into_iter()
            .enumerate()
            .map(|(i, hit)| EvidenceEntry { label: format!("E{}", i + 1), chunk: hit.chunk, score: hit.score })
            .collect();
        tracing::debug!(entries = entries.len(), deduplicated, truncated, "evidence assembled");
        EvidenceContext { query: query.to_string(), entries, char_budget: self.char_budget, truncated, deduplicated }
    }
}

/// Evidence label to the chunk id it cites.
pub fn citation_map(evidence: &EvidenceContext) -> BTreeMap<String, String> {
    evidence.entries.iter().map(|e| (e.label.clone(), e.chunk.id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qagent_core::types::{Chunk, SourceKind};

    fn hit(doc: &str, seq: usize, text: &str, score: f32) -> SearchHit {
        SearchHit {
            chunk: Chunk {
                id: Chunk::make_id(doc, seq),
                doc_id: doc.into(),
                seq,
                text: text.into(),
                char_start: 0,
                char_end: text.chars().count(),
            },
            score,
            ordinal: seq as u64,
            source: SourceKind::Keyword,
        }
    }

    fn assembler(budget: usize) -> EvidenceAssembler {
        EvidenceAssembler { char_budget: budget, dedup_threshold: 0.9 }
    }

    #[test]
    fn near_duplicates_within_a_document_collapse() {
        let ctx = assembler(1000).assemble(
            "discount",
            vec![
                hit("a.md", 0, "SAVE10 provides $10.00 off", 2.0),
                hit("a.md", 1, "SAVE10 provides $10.00 off.", 1.5),
                hit("b.md", 0, "SAVE10 provides $10.00 off", 1.0),
            ],
        );
        assert_eq!(ctx.entries.len(), 2, "same text in another document is kept");
        assert_eq!(ctx.deduplicated, 1);
        assert_eq!(ctx.entries[0].label, "E1");
        assert_eq!(ctx.entries[1].chunk.doc_id, "b.md");
    }

    #[test]
    fn budget_drops_lowest_scores_first() {
        let ctx = assembler(25).assemble(
            "q",
            vec![hit("a.md", 0, "first chunk text", 3.0), hit("a.md", 1, "another thing", 2.0), hit("b.md", 0, "tail", 1.0)],
        );
        assert_eq!(ctx.entries.len(), 1);
        assert_eq!(ctx.truncated, 2);
        assert_eq!(ctx.entries[0].chunk.text, "first chunk text");
        assert!(ctx.total_chars() <= 25);
    }

    #[test]
    fn oversized_best_entry_is_cut_not_lost() {
        let ctx = assembler(5).assemble("q", vec![hit("a.md", 0, "abcdefghij", 1.0)]);
        assert_eq!(ctx.entries[0].chunk.text, "abcde");
        assert_eq!(citation_map(&ctx).get("E1").map(String::as_str), Some("a.md#0"));
    }

    #[test]
    fn jaccard_bounds() {
        assert!((jaccard("a b", "a b") - 1.0).abs() < f32::EPSILON);
        assert!(jaccard("a b", "c d").abs() < f32::EPSILON);
    }
}
