use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use qagent_core::config::GenerationSettings;
use qagent_core::retry::RetryPolicy;
use qagent_core::types::EvidenceContext;
use qagent_core::Result;

use crate::grounding::GroundingValidator;
use crate::prompt::{build_prompt, system_prompt};
use crate::provider::{CompletionProvider, CompletionRequest};
use crate::schema::parse_payload;
use crate::{finalize, GenerationOutcome, Strategy, TestCaseGenerator};

/// Asks an external provider for test cases and treats the answer as
/// untrusted: schema-checked, then grounded field by field.
pub struct ModelBackedGenerator {
    provider: Arc<dyn CompletionProvider>,
    policy: RetryPolicy,
    validator: GroundingValidator,
    temperature: f32,
    max_tokens: usize,
    max_cases: usize,
}

impl ModelBackedGenerator {
    pub fn new(provider: Arc<dyn CompletionProvider>, settings: &GenerationSettings) -> Self {
        Self {
            provider,
            policy: RetryPolicy::new(settings.timeout(), settings.retries, Duration::from_millis(settings.backoff_ms)),
            validator: GroundingValidator::default(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            max_cases: settings.max_cases,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }
}

#[async_trait]
impl TestCaseGenerator for ModelBackedGenerator {
    fn strategy(&self) -> Strategy {
        Strategy::ModelBacked
    }

    async fn generate(&self, query: &str, evidence: &EvidenceContext) -> Result<GenerationOutcome> {
        if evidence.is_empty() {
            return Ok(GenerationOutcome::no_evidence(self.strategy()));
        }
        let request = CompletionRequest {
            system: system_prompt(),
            prompt: build_prompt(query, evidence, self.max_cases),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        tracing::info!(provider = self.provider.name(), evidence = evidence.entries.len(), "requesting test cases");
        let raw = self.policy.run("generate", || self.provider.complete(&request)).await?;
        let batch = parse_payload(&raw)?;
        tracing::debug!(parsed = batch.cases.len(), dropped = batch.issues.len(), "model payload validated");

        let mut outcome = finalize(batch.cases, evidence, &self.validator, self.max_cases, self.strategy());
        let mut diagnostics = batch.issues;
        diagnostics.append(&mut outcome.diagnostics);
        outcome.diagnostics = diagnostics;
        Ok(outcome)
    }
}
