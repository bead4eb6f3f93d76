//! qagent-text
//!
//! Keyword fallback index: tantivy BM25 over chunk text with case folding and
//! stop-word removal, exposed through the shared `ChunkIndex` contract.

pub mod index;
pub mod tantivy_utils;

pub use index::{KeywordIndex, KEYWORD_FILE};
