//! Post-generation grounding pass.
//!
//! Every non-step field of a test case must be traceable to a single chunk of
//! the evidence it was generated from, either as a run of whole normalized
//! tokens or by content-word overlap. Figures (amounts, percentages, counts) must appear in
//! that same chunk. Anything else is replaced with [`NOT_SPECIFIED`].

use std::collections::HashSet;

use qagent_core::types::{Diagnostic, EvidenceContext, EvidenceEntry, IssueKind, TestCase, NOT_SPECIFIED};

use crate::text::{contains_tokens, content_words, figures_supported, tokens};

pub const DEFAULT_MIN_OVERLAP: f32 = 0.5;

pub fn is_sentinel(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(NOT_SPECIFIED)
}

/// The chunk backing a claim.
#[derive(Debug, Clone, Copy)]
pub struct Support<'a> {
    pub entry: &'a EvidenceEntry,
    pub verbatim: bool,
    pub overlap: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct GroundingValidator {
    min_overlap: f32,
}

impl Default for GroundingValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_OVERLAP)
    }
}

impl GroundingValidator {
    pub fn new(min_overlap: f32) -> Self {
        Self { min_overlap: min_overlap.clamp(0.0, 1.0) }
    }

    /// Finds the evidence chunk that backs `value`, preferring verbatim matches.
    pub fn support<'a>(&self, value: &str, evidence: &'a EvidenceContext) -> Option<Support<'a>> {
        let needle = tokens(value);
        if needle.is_empty() {
            return None;
        }
        let verbatim = evidence.entries.iter().find(|e| {
            contains_tokens(&tokens(&e.chunk.text), &needle) && figures_supported(value, &e.chunk.text)
        });
        if let Some(entry) = verbatim {
            return Some(Support { entry, verbatim: true, overlap: 1.0 });
        }

        let words: HashSet<String> = content_words(value).into_iter().collect();
        if words.is_empty() {
            return None;
        }
        let mut best: Option<Support<'a>> = None;
        for entry in &evidence.entries {
            if !figures_supported(value, &entry.chunk.text) {
                continue;
            }
            let available: HashSet<String> = content_words(&entry.chunk.text).into_iter().collect();
            let overlap = words.intersection(&available).count() as f32 / words.len() as f32;
            if overlap >= self.min_overlap && best.map_or(true, |b| overlap > b.overlap) {
                best = Some(Support { entry, verbatim: false, overlap });
            }
        }
        best
    }

    pub fn is_grounded(&self, value: &str, evidence: &EvidenceContext) -> bool {
        is_sentinel(value) || self.support(value, evidence).is_some()
    }

    /// Rewrites untraceable fields of `case` in place and reports each rewrite.
    ///
    /// `Grounded_In` must name a document of the evidence (or an evidence
    /// label); otherwise it is replaced by the document backing the other
    /// fields, or the sentinel when none do.
    pub fn enforce(&self, case: &mut TestCase, evidence: &EvidenceContext) -> Vec<Diagnostic> {
        let mut issues = Vec::new();
        let mut backing: Vec<String> = Vec::new();
        let id = case.id.clone();

        let fields = [
            ("Feature", &mut case.feature),
            ("Test_Scenario", &mut case.scenario),
            ("Expected_Result", &mut case.expected_result),
            ("Notes", &mut case.notes),
        ];
        for (name, field) in fields {
            if is_sentinel(field) {
                *field = NOT_SPECIFIED.to_string();
                continue;
            }
            if name == "Notes" && field.trim().is_empty() {
                continue;
            }
            match self.support(field, evidence) {
                Some(s) => backing.push(s.entry.chunk.doc_id.clone()),
                None => {
                    tracing::debug!(case = %id, field = name, "ungrounded field replaced");
                    issues.push(
                        Diagnostic::new(IssueKind::UngroundedContent, format!("not traceable to evidence: {}", clip(field)))
                            .with_subject(format!("{id}.{name}")),
                    );
                    *field = NOT_SPECIFIED.to_string();
                }
            }
        }

        match cited_document(&case.grounded_in, evidence) {
            Some(doc) => case.grounded_in = doc,
            None => {
                if !is_sentinel(&case.grounded_in) {
                    issues.push(
                        Diagnostic::new(
                            IssueKind::UngroundedContent,
                            format!("cited source is not in evidence: {}", clip(&case.grounded_in)),
                        )
                        .with_subject(format!("{id}.Grounded_In")),
                    );
                }
                case.grounded_in = backing.into_iter().next().unwrap_or_else(|| NOT_SPECIFIED.to_string());
            }
        }
        issues
    }
}

/// Resolves a citation to a document id of the evidence. Accepts document
/// names embedded in longer text and evidence labels such as `E2`.
fn cited_document(cited: &str, evidence: &EvidenceContext) -> Option<String> {
    let trimmed = cited.trim().trim_matches(|c| c == '[' || c == ']');
    if trimmed.is_empty() || is_sentinel(trimmed) {
        return None;
    }
    if let Some(entry) = evidence.entries.iter().find(|e| e.label.eq_ignore_ascii_case(trimmed)) {
        return Some(entry.chunk.doc_id.clone());
    }
    let lowered = trimmed.to_lowercase();
    evidence.documents().into_iter().find(|doc| lowered.contains(&doc.to_lowercase())).map(str::to_string)
}

fn clip(value: &str) -> String {
    const MAX: usize = 80;
    if value.chars().count() <= MAX {
        value.to_string()
    } else {
        format!("{}...", value.chars().take(MAX).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qagent_core::types::{Category, Chunk};

    fn evidence(chunks: &[(&str, &str)]) -> EvidenceContext {
        EvidenceContext {
            query: "discount".into(),
            entries: chunks
                .iter()
                .enumerate()
                .map(|(i, (doc, text))| EvidenceEntry {
                    label: format!("E{}", i + 1),
                    chunk: Chunk {
                        id: Chunk::make_id(doc, 0),
                        doc_id: (*doc).to_string(),
                        seq: 0,
                        text: (*text).to_string(),
                        char_start: 0,
                        char_end: text.chars().count(),
                    },
                    score: 1.0,
                })
                .collect(),
            char_budget: 4000,
            truncated: 0,
            deduplicated: 0,
        }
    }

    fn case(expected: &str, grounded_in: &str) -> TestCase {
        TestCase {
            id: "TC001".into(),
            feature: "Discount code".into(),
            scenario: "Apply discount code SAVE10".into(),
            steps: vec!["Enter SAVE10".into()],
            expected_result: expected.into(),
            grounded_in: grounded_in.into(),
            category: Category::Positive,
            notes: String::new(),
        }
    }

    #[test]
    fn different_amount_is_replaced() {
        let ev = evidence(&[("rules.md", "Discount code SAVE10 provides $10.00 off the order total.")]);
        let mut tc = case("Discount code SAVE10 provides $15.00 off the order total", "rules.md");
        let issues = GroundingValidator::default().enforce(&mut tc, &ev);
        assert_eq!(tc.expected_result, NOT_SPECIFIED);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].subject.as_deref(), Some("TC001.Expected_Result"));
        assert_eq!(tc.feature, "Discount code");
        assert_eq!(tc.grounded_in, "rules.md");
    }

    #[test]
    fn figures_must_come_from_the_same_chunk() {
        let ev = evidence(&[
            ("rules.md", "Discount code SAVE10 reduces the order total."),
            ("pricing.md", "Standard shipping costs $10.00."),
        ]);
        let v = GroundingValidator::default();
        assert!(v.support("Discount code SAVE10 reduces the total by $10.00", &ev).is_none());
        assert!(v.support("discount code save10 reduces the order total", &ev).is_some_and(|s| s.verbatim));
    }

    #[test]
    fn amount_sharing_digits_with_a_count_is_not_grounded() {
        let ev = evidence(&[("rules.md", "SAVE10 provides $10.00 off orders. Limit 5 codes per customer.")]);
        let v = GroundingValidator::default();
        assert!(!v.is_grounded("SAVE10 provides $5 off", &ev));
        assert!(v.is_grounded("SAVE10 provides $10.00 off", &ev));
        assert!(v.is_grounded("Limit 5 codes per customer", &ev));
    }

    #[test]
    fn truncated_figures_are_not_verbatim() {
        let v = GroundingValidator::default();
        assert!(!v.is_grounded("Orders over $10", &evidence(&[("ship.md", "Orders over $100 ship free.")])));
        let ev = evidence(&[("rules.md", "SAVE10 provides $10.00 off the order total.")]);
        assert!(!v.is_grounded("SAVE10 provides $1", &ev));
        assert!(v.support("SAVE10 provides $10.00", &ev).is_some_and(|s| s.verbatim));
    }

    #[test]
    fn citation_outside_evidence_is_rewritten() {
        let ev = evidence(&[("rules.md", "Discount code SAVE10 provides $10.00 off.")]);
        let mut tc = case("SAVE10 provides $10.00 off", "made_up.pdf");
        let issues = GroundingValidator::default().enforce(&mut tc, &ev);
        assert_eq!(tc.grounded_in, "rules.md", "backed by the other fields");
        assert!(issues.iter().any(|d| d.subject.as_deref() == Some("TC001.Grounded_In")));

        let mut labelled = case("SAVE10 provides $10.00 off", "E1");
        assert!(GroundingValidator::default().enforce(&mut labelled, &ev).is_empty());
        assert_eq!(labelled.grounded_in, "rules.md");
    }
}
