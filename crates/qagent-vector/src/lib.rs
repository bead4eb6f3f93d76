//! qagent-vector
//!
//! Primary chunk index: embeddings with exact cosine ranking in memory,
//! persisted to LanceDB tables plus a key/value meta table.

pub mod index;
pub mod schema;
pub mod store;
pub mod table;

pub use index::{cosine_similarity, VectorIndex, VECTOR_DIR};
pub use store::VectorEntry;
