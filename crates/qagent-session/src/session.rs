use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use qagent_browser::{ScriptSynthesizer, Synthesis};
use qagent_core::chunker::Chunker;
use qagent_core::config::Settings;
use qagent_core::error::{Error, Result};
use qagent_core::normalize::{Normalizer, SourceFile};
use qagent_core::traits::{ChunkIndex, Embedder};
use qagent_core::types::{Chunk, Diagnostic, Document, DocumentFormat, EvidenceContext, IssueKind, SearchHit, SourceKind, TestCase};
use qagent_core::retry::RetryPolicy;
use qagent_generate::{select_generator, Strategy, TestCaseGenerator};
use qagent_text::KeywordIndex;
use qagent_vector::VectorIndex;

use crate::backend::{keyword_index, select_backend};
use crate::evidence::{citation_map, EvidenceAssembler};
use crate::manifest::{read_documents, write_documents, IndexManifest};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcceptedDocument {
    pub id: String,
    pub filename: String,
    pub format: DocumentFormat,
    pub chars: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RejectedDocument {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestionSummary {
    pub accepted: Vec<AcceptedDocument>,
    pub rejected: Vec<RejectedDocument>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildSummary {
    pub documents_indexed: usize,
    pub chunks: usize,
    pub total_entries: usize,
    pub backend: SourceKind,
    /// Whether the index was emptied before this pass.
    pub rebuilt: bool,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryOutcome {
    pub query: String,
    pub test_cases: Vec<TestCase>,
    pub diagnostics: Vec<Diagnostic>,
    pub evidence: EvidenceContext,
    /// Evidence label to cited chunk id.
    pub citations: BTreeMap<String, String>,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnowledgeBaseStats {
    pub documents: usize,
    pub indexed_documents: usize,
    pub entries: usize,
    pub backend: SourceKind,
    pub embedder_id: Option<String>,
    pub file_types: BTreeMap<String, usize>,
    pub strategy: Strategy,
    pub pending_rebuild: bool,
}

/// Submitted documents and which of them the index currently holds.
#[derive(Default)]
struct Catalog {
    documents: BTreeMap<String, Document>,
    indexed: BTreeSet<String>,
    /// An indexed document was replaced; the next build must start over.
    stale: bool,
    /// An append to the live index did not complete.
    interrupted: bool,
}

/// The knowledge-base session: documents, the active index, and the
/// generation and script strategies chosen at construction.
///
/// Index mutation (build, clear, load) takes the write side of `index`;
/// searches take the read side, so a query sees the index from before or
/// after a build, never midway.
pub struct KnowledgeBase {
    settings: Settings,
    normalizer: Normalizer,
    chunker: Chunker,
    assembler: EvidenceAssembler,
    index: RwLock<Arc<dyn ChunkIndex>>,
    embedder: Option<Arc<dyn Embedder>>,
    embed_policy: RetryPolicy,
    backend_diagnostics: Vec<Diagnostic>,
    catalog: Mutex<Catalog>,
    generator: Arc<dyn TestCaseGenerator>,
    synthesizer: ScriptSynthesizer,
}

fn index_error(err: &anyhow::Error) -> Error {
    Error::IndexUnavailable(format!("{err:#}"))
}

impl KnowledgeBase {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let backend = select_backend(settings.retrieval.mode, &settings.embedding)?;
        let generator = select_generator(&settings.generation);
        Ok(Self {
            normalizer: Normalizer::new(),
            chunker: Chunker::from_settings(&settings.chunking)?,
            assembler: EvidenceAssembler::from_settings(&settings.retrieval),
            index: RwLock::new(backend.index),
            embedder: backend.embedder,
            embed_policy: backend.policy,
            backend_diagnostics: backend.diagnostics,
            catalog: Mutex::new(Catalog::default()),
            generator,
            synthesizer: ScriptSynthesizer::from_settings(&settings.script),
            settings,
        })
    }

    /// A session restored from `storage.index_dir` when a saved index is
    /// there, otherwise a fresh one.
    pub async fn open(settings: Settings) -> Result<Self> {
        let dir = settings.storage.index_path();
        let kb = Self::new(settings)?;
        if IndexManifest::exists(&dir) {
            kb.load(&dir).await?;
        }
        Ok(kb)
    }

    /// An empty index of the active backend.
    fn fresh_index(&self) -> Result<Arc<dyn ChunkIndex>> {
        match &self.embedder {
            Some(embedder) => Ok(Arc::new(VectorIndex::new(Arc::clone(embedder), self.embed_policy))),
            None => keyword_index(),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn TestCaseGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Diagnostics from choosing the index backend.
    pub fn backend_diagnostics(&self) -> &[Diagnostic] {
        &self.backend_diagnostics
    }

    /// Normalizes and stages files for the next build. Each file is accepted
    /// or rejected on its own.
    pub fn submit_documents(&self, files: Vec<SourceFile>) -> IngestionSummary {
        let mut summary = IngestionSummary::default();
        for file in files {
            let doc = match self.normalizer.document(&file) {
                Ok(doc) => doc,
                Err(err) => {
                    let kind = match err {
                        Error::UnsupportedFormat(_) => IssueKind::UnsupportedFormat,
                        _ => IssueKind::PartialParse,
                    };
                    tracing::warn!(file = %file.filename, error = %err, "document rejected");
                    summary.diagnostics.push(Diagnostic::new(kind, err.to_string()).with_subject(file.filename.clone()));
                    summary.rejected.push(RejectedDocument { filename: file.filename, reason: err.to_string() });
                    continue;
                }
            };
            if doc.text.is_empty() {
                summary
                    .diagnostics
                    .push(Diagnostic::new(IssueKind::EmptyDocument, "no text content").with_subject(doc.filename.clone()));
                summary.rejected.push(RejectedDocument { filename: doc.filename, reason: "no text content".into() });
                continue;
            }
            for warning in &doc.warnings {
                summary
                    .diagnostics
                    .push(Diagnostic::new(IssueKind::PartialParse, warning.clone()).with_subject(doc.filename.clone()));
            }

            let mut catalog = self.catalog.lock();
            if let Some(previous) = catalog.documents.get(&doc.id) {
                let message = if previous.content_hash == doc.content_hash {
                    "resubmitted with identical content"
                } else {
                    "replaces an earlier submission"
                };
                summary
                    .diagnostics
                    .push(Diagnostic::new(IssueKind::DuplicateDocument, message).with_subject(doc.id.clone()));
                if previous.content_hash != doc.content_hash && catalog.indexed.remove(&doc.id) {
                    catalog.stale = true;
                }
            }
            summary.accepted.push(AcceptedDocument {
                id: doc.id.clone(),
                filename: doc.filename.clone(),
                format: doc.format,
                chars: doc.text.chars().count(),
                warnings: doc.warnings.clone(),
            });
            catalog.documents.insert(doc.id.clone(), doc);
        }
        tracing::info!(accepted = summary.accepted.len(), rejected = summary.rejected.len(), "documents submitted");
        summary
    }

    /// Chunks and indexes staged documents. With `clear_existing`, or after an
    /// indexed document was replaced, the index is emptied and every document
    /// is indexed again; otherwise only documents not yet indexed are added.
    pub async fn build_index(&self, clear_existing: bool) -> Result<BuildSummary> {
        let mut index = self.index.write().await;
        let (documents, rebuild) = {
            let catalog = self.catalog.lock();
            let rebuild = clear_existing || catalog.stale || catalog.interrupted;
            let docs: Vec<Document> = catalog
                .documents
                .values()
                .filter(|d| rebuild || !catalog.indexed.contains(&d.id))
                .cloned()
                .collect();
            (docs, rebuild)
        };

        let chunks: Vec<Chunk> = documents.iter().flat_map(|d| self.chunker.chunk(d)).collect();
        let added = if rebuild {
            // The replacement is filled off to the side; a failed or dropped
            // build leaves the live index untouched.
            let replacement = self.fresh_index()?;
            let added = replacement.index(&chunks).await.map_err(|e| index_error(&e))?;
            *index = replacement;
            added
        } else {
            // Appending mutates the live index in place; until it completes the
            // next build has to start over.
            self.catalog.lock().interrupted = true;
            let added = index.index(&chunks).await.map_err(|e| index_error(&e))?;
            self.catalog.lock().interrupted = false;
            added
        };

        {
            let mut catalog = self.catalog.lock();
            if rebuild {
                catalog.indexed.clear();
                catalog.interrupted = false;
            }
            let mut replaced = false;
            for doc in &documents {
                match catalog.documents.get(&doc.id) {
                    Some(current) if current.content_hash == doc.content_hash => {
                        catalog.indexed.insert(doc.id.clone());
                    }
                    _ => replaced = true,
                }
            }
            catalog.stale = if rebuild { replaced } else { catalog.stale || replaced };
        }
        let summary = BuildSummary {
            documents_indexed: documents.len(),
            chunks: added,
            total_entries: index.len(),
            backend: index.descriptor().kind,
            rebuilt: rebuild,
            diagnostics: self.backend_diagnostics.clone(),
        };
        tracing::info!(
            documents = summary.documents_indexed,
            chunks = summary.chunks,
            total = summary.total_entries,
            backend = summary.backend.name(),
            rebuilt = rebuild,
            "index built"
        );
        Ok(summary)
    }

    /// Raw hits for `text`, best first. An empty index yields no hits.
    pub async fn search(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("query is empty".into()));
        }
        let index = self.index.read().await;
        index.search(text, k).await.map_err(|e| index_error(&e))
    }

    /// The evidence context the generator would see for `text`.
    pub async fn retrieve(&self, text: &str) -> Result<EvidenceContext> {
        let hits = self.search(text, self.settings.retrieval.top_k).await?;
        Ok(self.assembler.assemble(text.trim(), hits))
    }

    /// Retrieves evidence and generates test cases from it. No evidence is a
    /// normal outcome: an empty list with a `NoEvidence` diagnostic.
    pub async fn query(&self, text: &str) -> Result<QueryOutcome> {
        let evidence = self.retrieve(text).await?;
        let citations = citation_map(&evidence);
        if evidence.is_empty() {
            tracing::info!(query = %text.trim(), "no evidence for query");
            return Ok(QueryOutcome {
                query: text.trim().to_string(),
                test_cases: Vec::new(),
                diagnostics: vec![Diagnostic::new(IssueKind::NoEvidence, "no evidence available for this query")],
                evidence,
                citations,
                strategy: self.generator.strategy(),
            });
        }
        let outcome = self.generator.generate(text.trim(), &evidence).await?;
        tracing::info!(
            query = %text.trim(),
            evidence = evidence.entries.len(),
            cases = outcome.test_cases.len(),
            strategy = outcome.strategy.name(),
            "query answered"
        );
        Ok(QueryOutcome {
            query: text.trim().to_string(),
            test_cases: outcome.test_cases,
            diagnostics: outcome.diagnostics,
            evidence,
            citations,
            strategy: outcome.strategy,
        })
    }

    pub fn synthesize_script(&self, case: &TestCase, page_html: &str) -> Result<Synthesis> {
        self.synthesizer.synthesize(case, page_html)
    }

    pub async fn stats(&self) -> KnowledgeBaseStats {
        let index = self.index.read().await;
        let descriptor = index.descriptor();
        let catalog = self.catalog.lock();
        let mut file_types: BTreeMap<String, usize> = BTreeMap::new();
        for doc in catalog.documents.values() {
            *file_types.entry(doc.format.name().to_string()).or_insert(0) += 1;
        }
        KnowledgeBaseStats {
            documents: catalog.documents.len(),
            indexed_documents: catalog.indexed.len(),
            entries: index.len(),
            backend: descriptor.kind,
            embedder_id: descriptor.embedder_id,
            file_types,
            strategy: self.generator.strategy(),
            pending_rebuild: catalog.stale || catalog.interrupted,
        }
    }

    /// Drops every document and empties the index.
    pub async fn reset(&self) -> Result<()> {
        let index = self.index.write().await;
        index.clear().map_err(|e| index_error(&e))?;
        *self.catalog.lock() = Catalog::default();
        tracing::info!("knowledge base reset");
        Ok(())
    }

    /// Persists the index, its manifest and the indexed documents to `dir`.
    pub async fn save(&self, dir: &Path) -> Result<IndexManifest> {
        let index = self.index.read().await;
        let documents: Vec<Document> = {
            let catalog = self.catalog.lock();
            catalog.documents.values().filter(|d| catalog.indexed.contains(&d.id)).cloned().collect()
        };
        index.save(dir).await.map_err(|e| index_error(&e))?;
        write_documents(dir, &documents)?;
        let manifest = IndexManifest::new(&index.descriptor(), index.len(), &documents);
        manifest.write(dir)?;
        tracing::info!(entries = manifest.entries, dir = %dir.display(), "knowledge base saved");
        Ok(manifest)
    }

    /// Replaces the live index and documents with what `save` wrote to `dir`.
    /// Fails with `IncompatibleIndex` when the schema tag, backend or embedder
    /// differ from this session's.
    pub async fn load(&self, dir: &Path) -> Result<IndexManifest> {
        let manifest = IndexManifest::read(dir)?;
        let mut index = self.index.write().await;
        manifest.check(&index.descriptor())?;

        let restored: Arc<dyn ChunkIndex> = match (manifest.backend, &self.embedder) {
            (SourceKind::Vector, Some(embedder)) => {
                Arc::new(VectorIndex::load(dir, Arc::clone(embedder), self.embed_policy).await?)
            }
            (SourceKind::Keyword, _) => {
                if manifest.entries == 0 && !dir.join(qagent_text::KEYWORD_FILE).is_file() {
                    keyword_index()?
                } else {
                    Arc::new(KeywordIndex::load(dir).map_err(|e| index_error(&e))?)
                }
            }
            (SourceKind::Vector, None) => {
                return Err(Error::IncompatibleIndex {
                    found: "vector index".into(),
                    expected: "keyword index".into(),
                })
            }
        };
        if restored.len() != manifest.entries {
            tracing::warn!(manifest = manifest.entries, found = restored.len(), "entry count differs from manifest");
        }
        let documents = read_documents(dir)?;
        *index = restored;
        let mut catalog = self.catalog.lock();
        *catalog = Catalog::default();
        for doc in documents {
            catalog.indexed.insert(doc.id.clone());
            catalog.documents.insert(doc.id.clone(), doc);
        }
        tracing::info!(entries = index.len(), documents = catalog.documents.len(), "knowledge base loaded");
        Ok(manifest)
    }
}
