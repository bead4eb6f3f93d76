//! Configuration loader and typed settings.
//!
//! Uses Figment to merge defaults + `config.toml` + `config.<env>.toml` +
//! `QAGENT_*` env vars (nested keys separated by `__`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Loads `config.toml`, `config.<env>.toml` and `QAGENT_*` variables from the
    /// current directory on top of the built-in defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => tracing::debug!(env = %env_name, "no environment overlay for RUST_ENV"),
        }
        figment = figment.merge(Env::prefixed("QAGENT_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extracts and validates the typed settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub script: ScriptSettings,
    pub storage: StorageSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.chunk_size must be positive".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.dedup_threshold) {
            return Err(Error::InvalidConfig("retrieval.dedup_threshold must be within [0, 1]".into()));
        }
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Window size in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive windows.
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 1000, chunk_overlap: 200 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    Auto,
    Vector,
    Keyword,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub evidence_char_budget: usize,
    pub mode: IndexMode,
    /// Token Jaccard similarity above which two chunks of one document are duplicates.
    pub dedup_threshold: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 10, evidence_char_budget: 6000, mode: IndexMode::Auto, dedup_threshold: 0.9 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Model,
    Hashed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model_dir: Option<String>,
    /// Dimension of the hashed embedder.
    pub dim: usize,
    pub max_len: usize,
    pub timeout_secs: u64,
    pub retries: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Model,
            model_dir: None,
            dim: 384,
            max_len: 256,
            timeout_secs: 60,
            retries: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Auto,
    Gemini,
    OpenAi,
    Anthropic,
    Ollama,
    HuggingFace,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationSettings {
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    pub retries: u32,
    pub backoff_ms: u64,
    pub max_cases: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Auto,
            model: None,
            base_url: None,
            temperature: 0.1,
            max_tokens: 2000,
            timeout_secs: 30,
            retries: 3,
            backoff_ms: 500,
            max_cases: 10,
        }
    }
}

impl GenerationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScriptSettings {
    pub base_url: String,
    pub wait_secs: u64,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self { base_url: "http://localhost:8000/checkout.html".to_string(), wait_secs: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageSettings {
    pub index_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { index_dir: "~/.qagent/index".to_string() }
    }
}

impl StorageSettings {
    pub fn index_path(&self) -> PathBuf {
        expand_path(&self.index_dir)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_toml(toml: &str) -> Config {
        Config::from_figment(
            Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(toml)),
        )
    }

    #[test]
    fn defaults_validate() {
        let settings = with_toml("").settings().expect("defaults");
        assert_eq!(settings.chunking.chunk_size, 1000);
        assert_eq!(settings.chunking.chunk_overlap, 200);
        assert_eq!(settings.retrieval.mode, IndexMode::Auto);
        assert_eq!(settings.generation.retries, 3);
    }

    #[test]
    fn toml_overrides_single_keys() {
        let cfg = with_toml("[retrieval]\ntop_k = 4\nmode = \"keyword\"\n");
        let settings = cfg.settings().expect("settings");
        assert_eq!(settings.retrieval.top_k, 4);
        assert_eq!(settings.retrieval.mode, IndexMode::Keyword);
        assert_eq!(settings.retrieval.evidence_char_budget, 6000, "untouched keys keep defaults");
        let k: usize = cfg.get("retrieval.top_k").expect("get");
        assert_eq!(k, 4);
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        let err = with_toml("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n")
            .settings()
            .expect_err("invalid");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn expand_path_handles_env_vars() {
        std::env::set_var("QAGENT_TEST_HOME_DIR", "/tmp/qagent-home");
        let p = expand_path("${QAGENT_TEST_HOME_DIR}/index");
        assert_eq!(p, PathBuf::from("/tmp/qagent-home/index"));
    }
}
