//! `manifest.json` written next to a persisted index.

use std::path::Path;

use serde::{Deserialize, Serialize};

use qagent_core::error::{Error, Result};
use qagent_core::traits::IndexDescriptor;
use qagent_core::types::{Document, DocumentFormat, SourceKind};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const DOCUMENTS_FILE: &str = "documents.json";
pub const SCHEMA_TAG: &str = "qagent-index/v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub format: DocumentFormat,
    pub content_hash: String,
    pub chars: usize,
}

impl From<&Document> for DocumentRecord {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            filename: doc.filename.clone(),
            format: doc.format,
            content_hash: doc.content_hash.clone(),
            chars: doc.text.chars().count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexManifest {
    pub schema: String,
    pub backend: SourceKind,
    pub embedder_id: Option<String>,
    pub dim: Option<usize>,
    pub entries: usize,
    /// RFC 3339, UTC.
    pub created_at: String,
    pub documents: Vec<DocumentRecord>,
}

impl IndexManifest {
    pub fn new(descriptor: &IndexDescriptor, entries: usize, documents: &[Document]) -> Self {
        Self {
            schema: SCHEMA_TAG.to_string(),
            backend: descriptor.kind,
            embedder_id: descriptor.embedder_id.clone(),
            dim: descriptor.dim,
            entries,
            created_at: chrono::Utc::now().to_rfc3339(),
            documents: documents.iter().map(DocumentRecord::from).collect(),
        }
    }

    pub fn exists(dir: &Path) -> bool {
        dir.join(MANIFEST_FILE).is_file()
    }

    pub fn write(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Reads and checks the schema tag; anything else is `IncompatibleIndex`.
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(Error::NotFound(format!("no index manifest at {}", path.display())));
        }
        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
        let found = raw.get("schema").and_then(|s| s.as_str()).unwrap_or("<missing>").to_string();
        if found != SCHEMA_TAG {
            return Err(Error::IncompatibleIndex { found, expected: SCHEMA_TAG.to_string() });
        }
        Ok(serde_json::from_value(raw)?)
    }

    /// Fails unless the index was built by the same backend and embedder.
    pub fn check(&self, active: &IndexDescriptor) -> Result<()> {
        if self.backend != active.kind {
            return Err(Error::IncompatibleIndex {
                found: format!("{} index", self.backend.name()),
                expected: format!("{} index", active.kind.name()),
            });
        }
        if self.embedder_id != active.embedder_id {
            return Err(Error::IncompatibleIndex {
                found: self.embedder_id.clone().unwrap_or_else(|| "no embedder".into()),
                expected: active.embedder_id.clone().unwrap_or_else(|| "no embedder".into()),
            });
        }
        Ok(())
    }
}

pub fn write_documents(dir: &Path, documents: &[Document]) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(DOCUMENTS_FILE), serde_json::to_vec(documents)?)?;
    Ok(())
}

/// Documents saved with the index; an absent file means none were kept.
pub fn read_documents(dir: &Path) -> Result<Vec<Document>> {
    let path = dir.join(DOCUMENTS_FILE);
    if !path.is_file() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(&std::fs::read(path)?)?)
}
