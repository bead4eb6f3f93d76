use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CompletionProvider, CompletionRequest};

const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";
const DEFAULT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.3";

/// Hugging Face Inference API text generation.
pub struct HuggingFaceProvider {
    token: String,
    model: String,
    base_url: String,
    client: Client,
}

impl HuggingFaceProvider {
    pub fn new(token: String, model: Option<String>, base_url: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().context("failed to build Hugging Face HTTP client")?;
        Ok(Self {
            token,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()).trim_end_matches('/').to_string(),
            client,
        })
    }
}

/// Single-string prompt for models without a separate system channel.
fn inputs(request: &CompletionRequest) -> String {
    format!("System: {}\n\nUser: {}\n\nAssistant:", request.system, request.prompt)
}

#[async_trait]
impl CompletionProvider for HuggingFaceProvider {
    fn name(&self) -> &'static str {
        "huggingface"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = InferenceRequest {
            inputs: inputs(request),
            parameters: InferenceParameters {
                max_new_tokens: request.max_tokens,
                temperature: request.temperature,
                return_full_text: false,
            },
        };
        let resp = self
            .client
            .post(format!("{}/models/{}", self.base_url, self.model))
            .bearer_auth(self.token.trim())
            .json(&body)
            .send()
            .await
            .context("failed to call Hugging Face inference API")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Hugging Face returned {}: {}", status, text);
        }
        let parsed: Vec<Generated> = resp.json().await.context("failed to parse Hugging Face response")?;
        let answer = parsed.into_iter().next().map(|g| g.generated_text).unwrap_or_default();
        if answer.trim().is_empty() {
            bail!("Hugging Face response was empty");
        }
        Ok(answer)
    }
}

#[derive(Serialize)]
struct InferenceRequest {
    inputs: String,
    parameters: InferenceParameters,
}

#[derive(Serialize)]
struct InferenceParameters {
    max_new_tokens: usize,
    temperature: f32,
    return_full_text: bool,
}

#[derive(Deserialize)]
struct Generated {
    #[serde(default)]
    generated_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_folds_system_and_user_turns() {
        let req = CompletionRequest {
            system: "Return JSON.".into(),
            prompt: "Cases for discounts".into(),
            temperature: 0.1,
            max_tokens: 32,
        };
        assert_eq!(inputs(&req), "System: Return JSON.\n\nUser: Cases for discounts\n\nAssistant:");
    }
}
