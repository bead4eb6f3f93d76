use std::sync::Arc;

use async_trait::async_trait;

use qagent_core::error::Error;
use qagent_core::types::{Diagnostic, EvidenceContext, IssueKind};
use qagent_core::Result;

use crate::rules::RuleBasedGenerator;
use crate::{GenerationOutcome, Strategy, TestCaseGenerator};

/// Runs the primary strategy and degrades to the rule-based one on timeout,
/// provider failure, an unusable payload or an empty grounded result.
pub struct FallbackGenerator {
    primary: Arc<dyn TestCaseGenerator>,
    fallback: RuleBasedGenerator,
}

impl FallbackGenerator {
    pub fn new(primary: Arc<dyn TestCaseGenerator>, fallback: RuleBasedGenerator) -> Self {
        Self { primary, fallback }
    }
}

fn failure_diagnostic(err: &Error) -> Diagnostic {
    let kind = match err {
        Error::GenerationTimeout { .. } => IssueKind::GenerationTimeout,
        Error::SchemaValidation(_) => IssueKind::SchemaValidation,
        _ => IssueKind::GenerationFailed,
    };
    Diagnostic::new(kind, format!("{err:#}; falling back to rule-based generation"))
}

#[async_trait]
impl TestCaseGenerator for FallbackGenerator {
    fn strategy(&self) -> Strategy {
        self.primary.strategy()
    }

    async fn generate(&self, query: &str, evidence: &EvidenceContext) -> Result<GenerationOutcome> {
        if evidence.is_empty() {
            return Ok(GenerationOutcome::no_evidence(self.primary.strategy()));
        }
        let mut carried = match self.primary.generate(query, evidence).await {
            Ok(outcome) if !outcome.test_cases.is_empty() => return Ok(outcome),
            Ok(outcome) => {
                tracing::warn!("primary generator returned no grounded test cases; falling back");
                let mut diags = outcome.diagnostics;
                diags.push(Diagnostic::new(
                    IssueKind::GenerationFailed,
                    "no grounded test cases from the model; falling back to rule-based generation",
                ));
                diags
            }
            Err(err) => {
                tracing::warn!(error = %err, timeout = err.is_timeout(), "primary generator failed; falling back");
                vec![failure_diagnostic(&err)]
            }
        };
        let mut outcome = self.fallback.generate(query, evidence).await?;
        carried.append(&mut outcome.diagnostics);
        outcome.diagnostics = carried;
        Ok(outcome)
    }
}
