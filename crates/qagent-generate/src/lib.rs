//! Test case generation: a model-backed strategy, a rule-based strategy and
//! the grounding pass both share.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use qagent_core::config::GenerationSettings;
use qagent_core::types::{Diagnostic, EvidenceContext, IssueKind, TestCase};
use qagent_core::Result;

pub mod fallback;
pub mod grounding;
pub mod model;
pub mod prompt;
pub mod provider;
pub mod rules;
pub mod schema;
pub mod text;

pub use fallback::FallbackGenerator;
pub use grounding::{is_sentinel, GroundingValidator};
pub use model::ModelBackedGenerator;
pub use provider::{detect_provider, CompletionProvider, CompletionRequest};
pub use rules::RuleBasedGenerator;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    ModelBacked,
    RuleBased,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::ModelBacked => "model-backed",
            Strategy::RuleBased => "rule-based",
        }
    }
}

/// Test cases plus the non-fatal issues met while producing them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationOutcome {
    pub test_cases: Vec<TestCase>,
    pub diagnostics: Vec<Diagnostic>,
    pub strategy: Strategy,
}

impl GenerationOutcome {
    pub fn no_evidence(strategy: Strategy) -> Self {
        Self {
            test_cases: Vec::new(),
            diagnostics: vec![Diagnostic::new(IssueKind::NoEvidence, "no evidence available for this query")],
            strategy,
        }
    }
}

#[async_trait]
pub trait TestCaseGenerator: Send + Sync {
    fn strategy(&self) -> Strategy;
    async fn generate(&self, query: &str, evidence: &EvidenceContext) -> Result<GenerationOutcome>;
}

/// Grounds drafts, drops the ones left without a traceable scenario or
/// expected result, removes duplicates, caps the count and numbers the
/// survivors `TC001`, `TC002`, ...
pub fn finalize(
    drafts: Vec<TestCase>,
    evidence: &EvidenceContext,
    validator: &GroundingValidator,
    max_cases: usize,
    strategy: Strategy,
) -> GenerationOutcome {
    let mut diagnostics = Vec::new();
    let mut kept: Vec<TestCase> = Vec::new();
    for (i, mut case) in drafts.into_iter().enumerate() {
        case.id = TestCase::format_id(i + 1);
        diagnostics.extend(validator.enforce(&mut case, evidence));
        if is_sentinel(&case.scenario) && is_sentinel(&case.expected_result) {
            diagnostics.push(
                Diagnostic::new(IssueKind::UngroundedContent, "dropped: neither scenario nor expected result is traceable")
                    .with_subject(case.id.clone()),
            );
            continue;
        }
        let duplicate = kept.iter().any(|k| {
            !is_sentinel(&k.scenario) && k.scenario == case.scenario && k.steps == case.steps && k.category == case.category
        });
        if !duplicate {
            kept.push(case);
        }
    }
    if max_cases > 0 {
        kept.truncate(max_cases);
    }
    for (i, case) in kept.iter_mut().enumerate() {
        case.id = TestCase::format_id(i + 1);
    }
    GenerationOutcome { test_cases: kept, diagnostics, strategy }
}

/// Chooses the generation strategy once, from configuration and the
/// environment: model-backed with rule-based fallback when a provider is
/// reachable, rule-based otherwise.
pub fn select_generator(settings: &GenerationSettings) -> Arc<dyn TestCaseGenerator> {
    let rules = RuleBasedGenerator::from_settings(settings);
    match detect_provider(settings) {
        Ok(Some(provider)) => {
            let model = ModelBackedGenerator::new(provider, settings);
            Arc::new(FallbackGenerator::new(Arc::new(model), rules))
        }
        Ok(None) => Arc::new(rules),
        Err(err) => {
            tracing::warn!(error = %err, "completion provider unavailable; using rule-based generation");
            Arc::new(rules)
        }
    }
}
