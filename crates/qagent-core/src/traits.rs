use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::{Chunk, SearchHit, SourceKind};

pub trait Embedder: Send + Sync {
    /// Stable identity of the model and its parameters; persisted indexes
    /// refuse to load under a different id.
    fn id(&self) -> String;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// What a persisted index was built with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub kind: SourceKind,
    pub embedder_id: Option<String>,
    pub dim: Option<usize>,
}

/// Retrieval contract shared by the vector and keyword indexes.
///
/// Mutations are serialized against reads: a concurrent `search` observes
/// either the state before or after an `index`/`clear` call, never a mix.
#[async_trait]
pub trait ChunkIndex: Send + Sync {
    fn descriptor(&self) -> IndexDescriptor;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends one entry per chunk and returns how many were added.
    async fn index(&self, chunks: &[Chunk]) -> anyhow::Result<usize>;

    /// Up to `k` hits by descending score, ties by earliest insertion.
    /// An empty index yields an empty list.
    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<SearchHit>>;

    fn clear(&self) -> anyhow::Result<()>;

    /// Every stored chunk in insertion order.
    fn chunks(&self) -> anyhow::Result<Vec<Chunk>>;

    async fn save(&self, dir: &Path) -> anyhow::Result<()>;
}
