//! Deterministic test case derivation.
//!
//! Evidence sentences are bucketed by keyword, enumerable rules are detected
//! (discount codes, numeric limits, requirements) and each rule yields a small
//! set of cases whose expected results quote the evidence verbatim.

use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use qagent_core::config::GenerationSettings;
use qagent_core::types::{Category, Diagnostic, EvidenceContext, EvidenceEntry, IssueKind, TestCase, NOT_SPECIFIED};
use qagent_core::Result;

use crate::grounding::GroundingValidator;
use crate::text::{content_words, figure_texts, figures, normalize, sentences, FigureKind};
use crate::{finalize, GenerationOutcome, Strategy, TestCaseGenerator};

const FEATURE_WORDS: &[&str] = &["feature", "functionality", "capability", "supports", "allows"];
const RULE_WORDS: &[&str] =
    &["rule", "policy", "requirement", "must", "should", "required", "only", "cannot", "mandatory"];
const UI_WORDS: &[&str] = &["button", "field", "input", "form", "dropdown", "checkbox", "link"];
const WORKFLOW_WORDS: &[&str] = &["step", "process", "workflow", "procedure"];
const VALIDATION_WORDS: &[&str] = &["validation", "error", "message", "warning", "check", "invalid"];
const LIMIT_PHRASES: &[&str] = &[
    "minimum", "maximum", "at least", "at most", "up to", "over", "above", "below", "under", "more than", "less than",
    "exceed", "exceeds", "limit",
];
const FEATURE_LEXICON: &[&str] = &[
    "discount code", "coupon code", "promo code", "shipping", "payment", "checkout", "cart", "discount", "coupon",
    "email", "password", "login", "registration",
];
const SUBJECT_STOPS: &[&str] = &[
    "is", "are", "must", "should", "provides", "provide", "gives", "give", "grants", "requires", "will", "can",
    "cannot", "may", "applies", "shows", "displays", "offers",
];
const GENERIC_HINTS: &[&str] = &["must", "should", "requir", "field", "valid", "invalid", "valu", "error", "messag"];

static CODE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{2,}[0-9]+[A-Z0-9]*\b").expect("code regex"));
static DISCOUNT_CUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(provides?|gives?|grants?|offers?|takes?|applies|off|discount|coupon)\b").expect("cue regex")
});
static UI_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b([a-z]+)\s+(field|input|checkbox|dropdown)\b").expect("target regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactKind {
    Feature,
    BusinessRule,
    UiElement,
    Workflow,
    Validation,
}

/// One evidence sentence and the buckets it falls into.
#[derive(Debug, Clone)]
pub struct Fact<'a> {
    pub sentence: String,
    pub entry: &'a EvidenceEntry,
    pub kinds: Vec<FactKind>,
}

impl Fact<'_> {
    fn has(&self, kind: FactKind) -> bool {
        self.kinds.contains(&kind)
    }
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase().split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).map(str::to_string).collect()
}

fn padded_words(text: &str) -> String {
    let words: Vec<String> =
        text.to_lowercase().split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).map(str::to_string).collect();
    format!(" {} ", words.join(" "))
}

pub fn classify(sentence: &str) -> Vec<FactKind> {
    let words = word_set(sentence);
    let has = |list: &[&str]| list.iter().any(|w| words.contains(*w));
    let mut kinds = Vec::new();
    if has(FEATURE_WORDS) {
        kinds.push(FactKind::Feature);
    }
    if has(RULE_WORDS) {
        kinds.push(FactKind::BusinessRule);
    }
    if has(UI_WORDS) {
        kinds.push(FactKind::UiElement);
    }
    if has(WORKFLOW_WORDS) {
        kinds.push(FactKind::Workflow);
    }
    if has(VALIDATION_WORDS) {
        kinds.push(FactKind::Validation);
    }
    kinds
}

/// Splits the evidence into sentences, skipping repeats from overlapping chunks.
pub fn extract_facts(evidence: &EvidenceContext) -> Vec<Fact<'_>> {
    let mut seen = HashSet::new();
    let mut facts = Vec::new();
    for entry in &evidence.entries {
        for sentence in sentences(&entry.chunk.text) {
            if !seen.insert(normalize(&sentence)) {
                continue;
            }
            let kinds = classify(&sentence);
            facts.push(Fact { sentence, entry, kinds });
        }
    }
    facts
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleShape {
    Discount { code: String },
    Limit { figure: String },
    Requirement,
}

/// Decides whether a fact states something enumerable enough to test.
pub fn rule_shape(fact: &Fact<'_>) -> Option<RuleShape> {
    let s = fact.sentence.as_str();
    let figs = figures(s);
    let has_amount = figs.iter().any(|f| f.kind != FigureKind::Number);
    if has_amount && DISCOUNT_CUE.is_match(s) {
        if let Some(code) = CODE_TOKEN.find(s) {
            return Some(RuleShape::Discount { code: code.as_str().to_string() });
        }
    }
    if !figs.is_empty() {
        let padded = padded_words(s);
        if LIMIT_PHRASES.iter().any(|p| padded.contains(&format!(" {p} "))) {
            let figure = figure_texts(s).first().map(|f| (*f).to_string()).unwrap_or_default();
            return Some(RuleShape::Limit { figure });
        }
    }
    if fact.has(FactKind::BusinessRule) {
        return Some(RuleShape::Requirement);
    }
    None
}

fn title_case(phrase: &str) -> String {
    phrase
        .split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The leading words of a sentence up to its verb, at most five.
fn subject(sentence: &str) -> String {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    let lead: Vec<&str> = words
        .iter()
        .take_while(|w| !SUBJECT_STOPS.contains(&w.to_lowercase().trim_matches(|c: char| !c.is_alphanumeric())))
        .take(5)
        .copied()
        .collect();
    let picked = if lead.is_empty() { words.iter().take(4).copied().collect() } else { lead };
    picked.join(" ").trim_matches(|c: char| !c.is_alphanumeric() && c != '$' && c != '%').to_string()
}

fn feature_name(fact: &Fact<'_>) -> String {
    let sentence = fact.sentence.to_lowercase();
    let chunk = fact.entry.chunk.text.to_lowercase();
    FEATURE_LEXICON
        .iter()
        .find(|p| sentence.contains(**p))
        .or_else(|| FEATURE_LEXICON.iter().find(|p| chunk.contains(**p)))
        .map(|p| title_case(p))
        .unwrap_or_else(|| subject(&fact.sentence))
}

/// A validation sentence describing a rejection that shares a content word
/// with `hints`.
fn rejection_for<'a>(facts: &'a [Fact<'a>], hints: &HashSet<String>) -> Option<&'a Fact<'a>> {
    facts.iter().find(|f| {
        if !f.has(FactKind::Validation) {
            return false;
        }
        let lower = f.sentence.to_lowercase();
        let rejects = ["invalid", "error", "reject", "not accepted", "not valid"].iter().any(|w| lower.contains(w));
        rejects && content_words(&f.sentence).iter().any(|w| hints.contains(w))
    })
}

fn hints_of(sentence: &str) -> HashSet<String> {
    content_words(sentence).into_iter().filter(|w| !GENERIC_HINTS.contains(&w.as_str())).collect()
}

struct Builder<'a> {
    open_step: String,
    facts: &'a [Fact<'a>],
}

impl Builder<'_> {
    fn case(&self, fact: &Fact<'_>, prefix: &str, steps: Vec<String>, expected: &str, category: Category) -> TestCase {
        TestCase {
            id: String::new(),
            feature: feature_name(fact),
            scenario: format!("{prefix}: {}", fact.sentence),
            steps,
            expected_result: expected.to_string(),
            grounded_in: fact.entry.chunk.doc_id.clone(),
            category,
            notes: format!("Derived from: {}", fact.sentence),
        }
    }

    fn rejection_text(&self, hints: &HashSet<String>) -> String {
        rejection_for(self.facts, hints).map_or_else(|| NOT_SPECIFIED.to_string(), |f| f.sentence.clone())
    }

    fn discount(&self, fact: &Fact<'_>, code: &str) -> Vec<TestCase> {
        let hints: HashSet<String> = ["cod", "discount", "coupon", "promo"].iter().map(|s| (*s).to_string()).collect();
        vec![
            self.case(
                fact,
                "Valid",
                vec![
                    self.open_step.clone(),
                    format!("Enter \"{code}\" in the discount code field"),
                    "Click the apply button".into(),
                    "Verify the discount is applied to the order total".into(),
                ],
                &fact.sentence,
                Category::Positive,
            ),
            self.case(
                fact,
                "Invalid",
                vec![
                    self.open_step.clone(),
                    "Enter \"INVALID999\" in the discount code field".into(),
                    "Click the apply button".into(),
                    "Verify an error message is displayed".into(),
                ],
                &self.rejection_text(&hints),
                Category::Negative,
            ),
        ]
    }

    fn limit(&self, fact: &Fact<'_>, figure: &str) -> Vec<TestCase> {
        let hints = hints_of(&fact.sentence);
        vec![
            self.case(
                fact,
                "Valid",
                vec![
                    self.open_step.clone(),
                    format!("Enter a value within the limit of {figure}"),
                    "Submit the form".into(),
                    "Verify the request is accepted".into(),
                ],
                &fact.sentence,
                Category::Positive,
            ),
            self.case(
                fact,
                "Boundary",
                vec![
                    self.open_step.clone(),
                    format!("Enter a value of exactly {figure}"),
                    "Submit the form".into(),
                    "Verify the result matches the stated limit".into(),
                ],
                &fact.sentence,
                Category::Edge,
            ),
            self.case(
                fact,
                "Invalid",
                vec![
                    self.open_step.clone(),
                    format!("Enter a value beyond {figure}"),
                    "Submit the form".into(),
                    "Verify the value is rejected".into(),
                ],
                &self.rejection_text(&hints),
                Category::Negative,
            ),
        ]
    }

    fn requirement(&self, fact: &Fact<'_>) -> Vec<TestCase> {
        let target = UI_TARGET
            .captures(&fact.sentence)
            .filter(|c| !matches!(c[1].to_lowercase().as_str(), "the" | "a" | "an" | "each" | "every"))
            .map(|c| (c[1].to_lowercase(), c[2].to_lowercase()));
        let (valid_step, invalid_step) = match &target {
            Some((name, kind)) if kind == "checkbox" => {
                (format!("Check the {name} checkbox"), format!("Leave the {name} checkbox unchecked"))
            }
            Some((name, kind)) => {
                (format!("Enter a valid value in the {name} {kind}"), format!("Leave the {name} {kind} empty"))
            }
            None => ("Fill in the form as the rule requires".to_string(), "Fill in the form in violation of the rule".to_string()),
        };
        let hints = hints_of(&fact.sentence);
        vec![
            self.case(
                fact,
                "Valid",
                vec![self.open_step.clone(), valid_step, "Submit the form".into(), "Verify the form is accepted".into()],
                &fact.sentence,
                Category::Positive,
            ),
            self.case(
                fact,
                "Invalid",
                vec![
                    self.open_step.clone(),
                    invalid_step,
                    "Submit the form".into(),
                    "Verify an error message is displayed".into(),
                ],
                &self.rejection_text(&hints),
                Category::Negative,
            ),
        ]
    }

    fn observation(&self, fact: &Fact<'_>) -> TestCase {
        self.case(
            fact,
            "Valid",
            vec![self.open_step.clone(), "Perform the behaviour described".into(), "Verify the described outcome".into()],
            &fact.sentence,
            Category::Positive,
        )
    }
}

/// Keyword and pattern based strategy; needs nothing but the evidence.
pub struct RuleBasedGenerator {
    validator: GroundingValidator,
    max_cases: usize,
}

impl RuleBasedGenerator {
    pub fn new(max_cases: usize) -> Self {
        Self { validator: GroundingValidator::default(), max_cases }
    }

    pub fn from_settings(settings: &GenerationSettings) -> Self {
        Self::new(settings.max_cases)
    }

    /// Raw drafts before grounding and numbering. Rules most related to the
    /// query come first; evidence order breaks ties.
    pub fn derive(&self, query: &str, evidence: &EvidenceContext) -> Vec<TestCase> {
        let mut facts = extract_facts(evidence);
        let query_words: HashSet<String> = content_words(query).into_iter().collect();
        let relevance = |f: &Fact<'_>| content_words(&f.sentence).iter().filter(|w| query_words.contains(*w)).count();
        facts.sort_by_cached_key(|f| std::cmp::Reverse(relevance(f)));

        let mentions_checkout = evidence.entries.iter().any(|e| e.chunk.text.to_lowercase().contains("checkout"));
        let builder = Builder {
            open_step: if mentions_checkout { "Open the checkout page".into() } else { "Open the page under test".into() },
            facts: &facts,
        };

        let mut drafts = Vec::new();
        for fact in &facts {
            match rule_shape(fact) {
                Some(RuleShape::Discount { code }) => drafts.extend(builder.discount(fact, &code)),
                Some(RuleShape::Limit { figure }) => drafts.extend(builder.limit(fact, &figure)),
                Some(RuleShape::Requirement) => drafts.extend(builder.requirement(fact)),
                None => {}
            }
        }
        if drafts.is_empty() {
            drafts.extend(
                facts
                    .iter()
                    .filter(|f| f.has(FactKind::Feature) || f.has(FactKind::Workflow) || f.has(FactKind::UiElement))
                    .map(|f| builder.observation(f)),
            );
        }
        tracing::debug!(facts = facts.len(), drafts = drafts.len(), "rule-based drafts");
        drafts
    }
}

#[async_trait]
impl TestCaseGenerator for RuleBasedGenerator {
    fn strategy(&self) -> Strategy {
        Strategy::RuleBased
    }

    async fn generate(&self, query: &str, evidence: &EvidenceContext) -> Result<GenerationOutcome> {
        if evidence.is_empty() {
            return Ok(GenerationOutcome::no_evidence(self.strategy()));
        }
        let drafts = self.derive(query, evidence);
        let mut outcome = finalize(drafts, evidence, &self.validator, self.max_cases, self.strategy());
        if outcome.test_cases.is_empty() {
            outcome
                .diagnostics
                .push(Diagnostic::new(IssueKind::GenerationFailed, "evidence contains no testable rule or feature"));
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qagent_core::types::Chunk;

    fn entry(doc: &str, text: &str) -> EvidenceEntry {
        EvidenceEntry {
            label: "E1".into(),
            chunk: Chunk {
                id: Chunk::make_id(doc, 0),
                doc_id: doc.into(),
                seq: 0,
                text: text.into(),
                char_start: 0,
                char_end: text.chars().count(),
            },
            score: 1.0,
        }
    }

    #[test]
    fn buckets_follow_keywords() {
        assert_eq!(classify("The email field is required"), vec![FactKind::BusinessRule, FactKind::UiElement]);
        assert_eq!(classify("Invalid codes show an error message"), vec![FactKind::Validation]);
        assert!(classify("Hello there").is_empty());
    }

    #[test]
    fn shapes_are_detected() {
        let e = entry("rules.md", "");
        let fact = |s: &str| Fact { sentence: s.into(), entry: &e, kinds: classify(s) };
        assert_eq!(
            rule_shape(&fact("SAVE10 provides $10.00 off.")),
            Some(RuleShape::Discount { code: "SAVE10".into() })
        );
        assert_eq!(
            rule_shape(&fact("Free shipping applies to orders over $50.")),
            Some(RuleShape::Limit { figure: "$50".into() })
        );
        assert_eq!(rule_shape(&fact("The email field is required.")), Some(RuleShape::Requirement));
        assert_eq!(rule_shape(&fact("The page has a blue header.")), None);
    }

    #[test]
    fn subject_stops_at_the_verb() {
        assert_eq!(subject("SAVE10 provides $10.00 off."), "SAVE10");
        assert_eq!(subject("The email field is required."), "The email field");
    }
}
