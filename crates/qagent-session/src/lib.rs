//! The knowledge-base session that ties ingestion, retrieval, generation and
//! script synthesis together behind one object owned by the caller.

pub mod backend;
pub mod evidence;
pub mod manifest;
pub mod session;

pub use backend::{select_backend, Backend};
pub use evidence::{citation_map, EvidenceAssembler};
pub use manifest::{IndexManifest, SCHEMA_TAG};
pub use session::{
    AcceptedDocument, BuildSummary, IngestionSummary, KnowledgeBase, KnowledgeBaseStats, QueryOutcome, RejectedDocument,
};
