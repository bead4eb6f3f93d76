use anyhow::{ensure, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use lancedb::query::ExecutableQuery;

use qagent_core::error::Error;
use qagent_core::retry::RetryPolicy;
use qagent_core::traits::{ChunkIndex, Embedder, IndexDescriptor};
use qagent_core::types::{Chunk, SearchHit, SourceKind};

use crate::schema::{chunk_schema, CHUNKS_TABLE, META_TABLE, VECTOR_LAYOUT};
use crate::store::{batch_to_entries, entries_to_batch, VectorEntry};
use crate::table::{create_table, open_db, read_meta, table_exists, write_meta};

pub const VECTOR_DIR: &str = "vector";

/// Cosine similarity; 0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

/// Exact cosine search over embedded chunks.
///
/// Embedding runs outside the lock, bounded by the retry policy; the computed
/// entries are appended in one write so readers never see half a batch.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    policy: RetryPolicy,
    entries: RwLock<Vec<VectorEntry>>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>, policy: RetryPolicy) -> Self {
        Self { embedder, policy, entries: RwLock::new(Vec::new()) }
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let embedder = Arc::clone(&self.embedder);
        let vectors = self
            .policy
            .run("embed", || {
                let embedder = Arc::clone(&embedder);
                let texts = texts.clone();
                async move { tokio::task::spawn_blocking(move || embedder.embed_batch(&texts)).await? }
            })
            .await?;
        Ok(vectors)
    }

    /// Opens an index saved by [`ChunkIndex::save`]. Fails with
    /// `Error::IncompatibleIndex` when the layout tag or embedder differ.
    pub async fn load(dir: &Path, embedder: Arc<dyn Embedder>, policy: RetryPolicy) -> qagent_core::Result<Self> {
        let db_dir = dir.join(VECTOR_DIR);
        if !db_dir.exists() {
            return Err(Error::NotFound(format!("no vector index under {}", dir.display())));
        }
        let conn = open_db(&db_dir.to_string_lossy()).await?;
        let meta = read_meta(&conn, META_TABLE).await?;

        let layout = meta.get("layout").cloned().unwrap_or_default();
        if layout != VECTOR_LAYOUT {
            return Err(Error::IncompatibleIndex { found: layout, expected: VECTOR_LAYOUT.to_string() });
        }
        let stored_id = meta.get("embedder_id").cloned().unwrap_or_default();
        if stored_id != embedder.id() {
            return Err(Error::IncompatibleIndex { found: stored_id, expected: embedder.id() });
        }

        let mut entries = Vec::new();
        if table_exists(&conn, CHUNKS_TABLE).await? {
            let table = conn.open_table(CHUNKS_TABLE).execute().await.map_err(anyhow::Error::from)?;
            let mut stream = table.query().execute().await.map_err(anyhow::Error::from)?;
            while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await.map_err(anyhow::Error::from)? {
                entries.extend(batch_to_entries(&batch)?);
            }
        }
        entries.sort_by_key(|e| e.ordinal);
        tracing::info!(entries = entries.len(), embedder = %stored_id, "vector index restored");

        let index = Self::new(embedder, policy);
        *index.entries.write() = entries;
        Ok(index)
    }
}

#[async_trait]
impl ChunkIndex for VectorIndex {
    fn descriptor(&self) -> IndexDescriptor {
        IndexDescriptor {
            kind: SourceKind::Vector,
            embedder_id: Some(self.embedder.id()),
            dim: Some(self.embedder.dim()),
        }
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    async fn index(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed(texts).await?;
        ensure!(vectors.len() == chunks.len(), "embedder returned {} vectors for {} chunks", vectors.len(), chunks.len());
        let dim = self.embedder.dim();
        for v in &vectors {
            ensure!(v.len() == dim, "embedding dimension {} does not match {dim}", v.len());
        }

        let mut entries = self.entries.write();
        let first = entries.len() as u64;
        entries.extend(chunks.iter().cloned().zip(vectors).enumerate().map(|(i, (chunk, vector))| VectorEntry {
            ordinal: first + i as u64,
            chunk,
            vector,
        }));
        tracing::debug!(added = chunks.len(), total = entries.len(), "vector index append");
        Ok(chunks.len())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 || self.entries.read().is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embed(vec![query.to_string()]).await?.into_iter().next().unwrap_or_default();

        let entries = self.entries.read();
        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(&query_vec, &e.vector), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal).then(a.1.ordinal.cmp(&b.1.ordinal)));
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(score, e)| SearchHit { chunk: e.chunk.clone(), score, ordinal: e.ordinal, source: SourceKind::Vector })
            .collect())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        tracing::info!("vector index cleared");
        Ok(())
    }

    fn chunks(&self) -> Result<Vec<Chunk>> {
        Ok(self.entries.read().iter().map(|e| e.chunk.clone()).collect())
    }

    async fn save(&self, dir: &Path) -> Result<()> {
        let snapshot: Vec<VectorEntry> = self.entries.read().clone();
        let dim = self.embedder.dim();
        let db_dir = dir.join(VECTOR_DIR);
        if db_dir.exists() {
            std::fs::remove_dir_all(&db_dir)?;
        }
        std::fs::create_dir_all(&db_dir)?;

        let conn = open_db(&db_dir.to_string_lossy()).await?;
        let batch = if snapshot.is_empty() { None } else { Some(entries_to_batch(&snapshot, dim)?) };
        create_table(&conn, CHUNKS_TABLE, chunk_schema(i32::try_from(dim)?), batch).await?;

        let mut meta = BTreeMap::new();
        meta.insert("layout".to_string(), VECTOR_LAYOUT.to_string());
        meta.insert("embedder_id".to_string(), self.embedder.id());
        meta.insert("dim".to_string(), dim.to_string());
        meta.insert("entries".to_string(), snapshot.len().to_string());
        write_meta(&conn, META_TABLE, &meta).await?;
        tracing::info!(entries = snapshot.len(), path = %db_dir.display(), "vector index saved");
        Ok(())
    }
}
