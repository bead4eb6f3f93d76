//! External completion providers used by the model-backed strategy.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use qagent_core::config::{GenerationSettings, ProviderKind};

mod anthropic;
mod gemini;
mod huggingface;
mod ollama;
mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use huggingface::HuggingFaceProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

pub const GEMINI_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];
pub const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";
pub const ANTHROPIC_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const OLLAMA_HOST_VAR: &str = "OLLAMA_HOST";
pub const HUGGINGFACE_TOKEN_VARS: [&str; 2] = ["HUGGINGFACE_TOKEN", "HF_TOKEN"];

/// Request envelope shared by the providers.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Trait implemented by concrete completion providers.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Picks a provider from configuration and the environment.
///
/// `Auto` tries a Gemini key (`GEMINI_API_KEY` or `GOOGLE_API_KEY`), then
/// `OPENAI_API_KEY`, then `ANTHROPIC_API_KEY`, then a configured Ollama base
/// URL (`generation.base_url` or `OLLAMA_HOST`), then a Hugging Face token
/// (`HUGGINGFACE_TOKEN` or `HF_TOKEN`). `Ok(None)` means only the
/// deterministic strategy is available.
pub fn detect_provider(settings: &GenerationSettings) -> Result<Option<Arc<dyn CompletionProvider>>> {
    detect_provider_with(settings, |key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
}

pub fn detect_provider_with<F>(settings: &GenerationSettings, env: F) -> Result<Option<Arc<dyn CompletionProvider>>>
where
    F: Fn(&str) -> Option<String>,
{
    let timeout = settings.timeout();
    let model = settings.model.clone();
    let base_url = settings.base_url.clone();
    let ollama_url = || base_url.clone().or_else(|| env(OLLAMA_HOST_VAR));
    let first_of = |keys: [&str; 2]| keys.into_iter().find_map(|k| env(k));

    let provider: Option<Arc<dyn CompletionProvider>> = match settings.provider {
        ProviderKind::None => None,
        ProviderKind::Gemini => match first_of(GEMINI_KEY_VARS) {
            Some(key) => Some(Arc::new(GeminiProvider::new(key, model, base_url.clone(), timeout)?)),
            None => {
                tracing::warn!("generation.provider = gemini but neither GEMINI_API_KEY nor GOOGLE_API_KEY is set");
                None
            }
        },
        ProviderKind::OpenAi => match env(OPENAI_KEY_VAR) {
            Some(key) => Some(Arc::new(OpenAiProvider::new(key, model, base_url.clone(), timeout)?)),
            None => {
                tracing::warn!("generation.provider = openai but {OPENAI_KEY_VAR} is not set");
                None
            }
        },
        ProviderKind::Anthropic => match env(ANTHROPIC_KEY_VAR) {
            Some(key) => Some(Arc::new(AnthropicProvider::new(key, model, base_url.clone(), timeout)?)),
            None => {
                tracing::warn!("generation.provider = anthropic but {ANTHROPIC_KEY_VAR} is not set");
                None
            }
        },
        ProviderKind::Ollama => Some(Arc::new(OllamaProvider::new(ollama_url(), model, timeout)?)),
        ProviderKind::HuggingFace => match first_of(HUGGINGFACE_TOKEN_VARS) {
            Some(token) => Some(Arc::new(HuggingFaceProvider::new(token, model, base_url.clone(), timeout)?)),
            None => {
                tracing::warn!("generation.provider = huggingface but neither HUGGINGFACE_TOKEN nor HF_TOKEN is set");
                None
            }
        },
        ProviderKind::Auto => {
            if let Some(key) = first_of(GEMINI_KEY_VARS) {
                Some(Arc::new(GeminiProvider::new(key, model, base_url.clone(), timeout)?))
            } else if let Some(key) = env(OPENAI_KEY_VAR) {
                Some(Arc::new(OpenAiProvider::new(key, model, base_url.clone(), timeout)?))
            } else if let Some(key) = env(ANTHROPIC_KEY_VAR) {
                Some(Arc::new(AnthropicProvider::new(key, model, base_url.clone(), timeout)?))
            } else if let Some(url) = ollama_url() {
                Some(Arc::new(OllamaProvider::new(Some(url), model, timeout)?))
            } else if let Some(token) = first_of(HUGGINGFACE_TOKEN_VARS) {
                Some(Arc::new(HuggingFaceProvider::new(token, model, base_url.clone(), timeout)?))
            } else {
                None
            }
        }
    };
    match &provider {
        Some(p) => tracing::info!(provider = p.name(), "completion provider selected"),
        None => tracing::info!("no completion provider; using rule-based generation"),
    }
    Ok(provider)
}
