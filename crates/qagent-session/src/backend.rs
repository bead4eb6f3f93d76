//! Index backend probe: vector when an embedder loads, keyword otherwise.

use std::sync::Arc;
use std::time::Duration;

use qagent_core::config::{EmbeddingSettings, IndexMode};
use qagent_core::error::{Error, Result};
use qagent_core::retry::RetryPolicy;
use qagent_core::traits::{ChunkIndex, Embedder};
use qagent_core::types::{Diagnostic, IssueKind};
use qagent_embed::load_embedder;
use qagent_text::KeywordIndex;
use qagent_vector::VectorIndex;

const EMBED_BACKOFF: Duration = Duration::from_millis(200);

/// The active index plus how it was chosen.
pub struct Backend {
    pub index: Arc<dyn ChunkIndex>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub policy: RetryPolicy,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn embedding_policy(settings: &EmbeddingSettings) -> RetryPolicy {
    RetryPolicy::new(Duration::from_secs(settings.timeout_secs), settings.retries, EMBED_BACKOFF)
}

pub fn keyword_index() -> Result<Arc<dyn ChunkIndex>> {
    let index = KeywordIndex::new().map_err(|e| Error::IndexUnavailable(format!("{e:#}")))?;
    Ok(Arc::new(index))
}

/// Picks the index for `mode`. An embedder that fails to load degrades to the
/// keyword index with a `BackendFallback` diagnostic instead of failing.
pub fn select_backend(mode: IndexMode, embedding: &EmbeddingSettings) -> Result<Backend> {
    let policy = embedding_policy(embedding);
    if mode == IndexMode::Keyword {
        tracing::info!("keyword index selected by configuration");
        return Ok(Backend { index: keyword_index()?, embedder: None, policy, diagnostics: Vec::new() });
    }
    match load_embedder(embedding) {
        Ok(embedder) => {
            tracing::info!(embedder = %embedder.id(), dim = embedder.dim(), "vector index selected");
            let index: Arc<dyn ChunkIndex> = Arc::new(VectorIndex::new(Arc::clone(&embedder), policy));
            Ok(Backend { index, embedder: Some(embedder), policy, diagnostics: Vec::new() })
        }
        Err(err) => {
            tracing::warn!(error = %err, ?mode, "embedding engine unavailable; using keyword index");
            let diagnostic = Diagnostic::new(
                IssueKind::BackendFallback,
                format!("embedding engine unavailable ({err}); keyword index in use"),
            );
            Ok(Backend { index: keyword_index()?, embedder: None, policy, diagnostics: vec![diagnostic] })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qagent_core::config::EmbeddingBackend;
    use qagent_core::types::SourceKind;

    #[test]
    fn hashed_embedder_gives_vector_backend() {
        let settings = EmbeddingSettings { backend: EmbeddingBackend::Hashed, dim: 64, ..EmbeddingSettings::default() };
        let backend = select_backend(IndexMode::Auto, &settings).expect("backend");
        assert_eq!(backend.index.descriptor().kind, SourceKind::Vector);
        assert!(backend.diagnostics.is_empty());
    }

    #[test]
    fn missing_model_falls_back_to_keyword() {
        let settings = EmbeddingSettings {
            backend: EmbeddingBackend::Model,
            model_dir: Some("/nonexistent/qagent-model".into()),
            ..EmbeddingSettings::default()
        };
        let backend = select_backend(IndexMode::Vector, &settings).expect("backend");
        assert_eq!(backend.index.descriptor().kind, SourceKind::Keyword);
        assert_eq!(backend.diagnostics[0].kind, IssueKind::BackendFallback);
    }

    #[test]
    fn keyword_mode_skips_the_probe() {
        let backend = select_backend(IndexMode::Keyword, &EmbeddingSettings::default()).expect("backend");
        assert_eq!(backend.index.descriptor().kind, SourceKind::Keyword);
        assert!(backend.embedder.is_none());
    }
}
