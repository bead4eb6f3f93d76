use std::sync::Arc;
use std::time::Duration;

use qagent_core::error::Error;
use qagent_core::retry::RetryPolicy;
use qagent_core::traits::{ChunkIndex, Embedder};
use qagent_core::types::{Chunk, SourceKind};
use qagent_embed::HashEmbedder;
use qagent_vector::{cosine_similarity, VectorIndex};

fn policy() -> RetryPolicy {
    RetryPolicy::new(Duration::from_secs(5), 2, Duration::from_millis(1))
}

fn index_with(dim: usize) -> VectorIndex {
    VectorIndex::new(Arc::new(HashEmbedder::new(dim)), policy())
}

fn chunk(doc: &str, seq: usize, text: &str) -> Chunk {
    Chunk {
        id: Chunk::make_id(doc, seq),
        doc_id: doc.to_string(),
        seq,
        text: text.to_string(),
        char_start: 0,
        char_end: text.chars().count(),
    }
}

fn corpus() -> Vec<Chunk> {
    vec![
        chunk("rules.md", 0, "discount code SAVE10 provides ten dollars off"),
        chunk("rules.md", 1, "express shipping costs extra"),
        chunk("ui.html", 0, "invalid discount code shows an error"),
    ]
}

#[test]
fn cosine_handles_degenerate_inputs() {
    assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn empty_index_search_is_empty() {
    let idx = index_with(64);
    assert!(idx.search("anything", 5).await.expect("search").is_empty());
}

#[tokio::test]
async fn search_orders_by_similarity() {
    let idx = index_with(512);
    assert_eq!(idx.index(&corpus()).await.expect("index"), 3);
    let hits = idx.search("discount code", 3).await.expect("search");
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.source == SourceKind::Vector));
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert_ne!(hits[0].chunk.id, "rules.md#1", "shipping chunk does not lead a discount query");
    assert!(idx.search("discount code", 1).await.expect("search").len() == 1);
}

#[tokio::test]
async fn ties_resolve_to_earliest_entry() {
    let idx = index_with(128);
    let chunks = vec![chunk("a.txt", 0, "coupon rules"), chunk("b.txt", 0, "coupon rules")];
    idx.index(&chunks).await.expect("index");
    let hits = idx.search("coupon rules", 2).await.expect("search");
    assert_eq!(hits[0].chunk.doc_id, "a.txt");
    assert_eq!(hits[1].chunk.doc_id, "b.txt");
}

#[tokio::test]
async fn clear_then_rebuild_is_indistinguishable() {
    let idx = index_with(256);
    idx.index(&corpus()).await.expect("index");
    let before = idx.search("discount error", 3).await.expect("search");
    idx.clear().expect("clear");
    assert!(idx.search("discount error", 3).await.expect("search").is_empty());
    idx.index(&corpus()).await.expect("reindex");
    assert_eq!(idx.search("discount error", 3).await.expect("search"), before);
}

#[tokio::test]
async fn persisted_index_round_trips_and_rejects_other_embedders() {
    let tmp = tempfile::tempdir().expect("tmp");
    let idx = index_with(96);
    idx.index(&corpus()).await.expect("index");
    idx.save(tmp.path()).await.expect("save");

    let restored = VectorIndex::load(tmp.path(), Arc::new(HashEmbedder::new(96)), policy()).await.expect("load");
    assert_eq!(restored.chunks().expect("chunks"), corpus());
    assert_eq!(
        restored.search("shipping", 2).await.expect("search"),
        idx.search("shipping", 2).await.expect("search")
    );

    let other: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
    let err = VectorIndex::load(tmp.path(), other, policy()).await.err().expect("incompatible");
    assert!(matches!(err, Error::IncompatibleIndex { .. }), "got {err}");
}

struct StuckEmbedder;

impl Embedder for StuckEmbedder {
    fn id(&self) -> String {
        "stuck".into()
    }
    fn dim(&self) -> usize {
        4
    }
    fn max_len(&self) -> usize {
        16
    }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        std::thread::sleep(Duration::from_millis(200));
        Ok(vec![])
    }
}

#[tokio::test]
async fn embedding_timeout_leaves_index_untouched() {
    let idx = VectorIndex::new(
        Arc::new(StuckEmbedder),
        RetryPolicy::new(Duration::from_millis(20), 2, Duration::from_millis(1)),
    );
    assert!(idx.index(&corpus()).await.is_err());
    assert_eq!(idx.len(), 0);
}

#[tokio::test]
async fn unrelated_entries_still_fill_k() {
    let idx = index_with(1024);
    let chunks = vec![chunk("a.txt", 0, "alpha"), chunk("b.txt", 0, "bravo"), chunk("c.txt", 0, "charlie")];
    idx.index(&chunks).await.expect("index");
    for k in [1, 2, 3, 10] {
        let hits = idx.search("zulu", k).await.expect("search");
        assert_eq!(hits.len(), k.min(chunks.len()), "k = {k}");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
