//! Embedding capability: a local transformer encoder and a hashed fallback.

pub mod device;
pub mod hashed;
pub mod model;
pub mod pool;
pub mod tokenize;

use std::path::PathBuf;
use std::sync::Arc;

use qagent_core::config::{expand_path, EmbeddingBackend, EmbeddingSettings};
use qagent_core::traits::Embedder;

pub use hashed::HashEmbedder;
pub use model::{resolve_model_dir, EmbeddingModel};
pub use pool::masked_mean_l2;

/// Availability probe: returns the configured embedder or the reason it
/// cannot be used on this host.
pub fn load_embedder(settings: &EmbeddingSettings) -> anyhow::Result<Arc<dyn Embedder>> {
    match settings.backend {
        EmbeddingBackend::Hashed => {
            tracing::info!(dim = settings.dim, "using hashed embedder");
            Ok(Arc::new(HashEmbedder::new(settings.dim)))
        }
        EmbeddingBackend::Model => {
            let configured: Option<PathBuf> = settings.model_dir.as_deref().map(expand_path);
            let dir = resolve_model_dir(configured.as_deref())?;
            Ok(Arc::new(EmbeddingModel::load(&dir, settings.max_len)?))
        }
    }
}
