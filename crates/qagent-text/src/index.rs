use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};

use qagent_core::traits::{ChunkIndex, IndexDescriptor};
use qagent_core::types::{Chunk, SearchHit, SourceKind};

use crate::tantivy_utils::{build_schema, register_tokenizer, Fields};

pub const KEYWORD_FILE: &str = "keyword_chunks.json";

const WRITER_BUDGET: usize = 50_000_000;

struct WriterState {
    writer: IndexWriter,
    next_ordinal: u64,
}

/// In-memory BM25 keyword index over chunk text.
///
/// The single `IndexWriter` sits behind a mutex; readers work on the last
/// reloaded searcher, so a concurrent search sees the committed state from
/// before or after a mutation.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    fields: Fields,
    state: Mutex<WriterState>,
}

impl KeywordIndex {
    pub fn new() -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizer(&index);
        let writer: IndexWriter = index.writer_with_num_threads(1, WRITER_BUDGET)?;
        let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
        Ok(Self { index, reader, fields, state: Mutex::new(WriterState { writer, next_ordinal: 0 }) })
    }

    /// Rebuilds an index from chunks written by [`ChunkIndex::save`].
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(KEYWORD_FILE);
        let raw = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let chunks: Vec<Chunk> = serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let index = Self::new()?;
        index.append(&chunks)?;
        tracing::info!(chunks = chunks.len(), dir = %dir.display(), "keyword index restored");
        Ok(index)
    }

    fn append(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let mut state = self.state.lock();
        let first = state.next_ordinal;
        for (offset, c) in chunks.iter().enumerate() {
            let doc = doc!(
                self.fields.id => c.id.clone(),
                self.fields.doc_id => c.doc_id.clone(),
                self.fields.seq => c.seq as u64,
                self.fields.ordinal => first + offset as u64,
                self.fields.char_start => c.char_start as u64,
                self.fields.char_end => c.char_end as u64,
                self.fields.text => c.text.clone(),
            );
            if let Err(e) = state.writer.add_document(doc) {
                state.writer.rollback()?;
                return Err(e.into());
            }
        }
        state.writer.commit()?;
        self.reader.reload()?;
        state.next_ordinal = first + chunks.len() as u64;
        tracing::debug!(added = chunks.len(), total = state.next_ordinal, "keyword index commit");
        Ok(chunks.len())
    }

    fn query_terms(&self, query: &str) -> Result<Vec<String>> {
        let mut analyzer = self.index.tokenizer_for_field(self.fields.text)?;
        let mut stream = analyzer.token_stream(query);
        let mut terms: Vec<String> = Vec::new();
        while stream.advance() {
            let text = &stream.token().text;
            if !terms.contains(text) {
                terms.push(text.clone());
            }
        }
        Ok(terms)
    }

    fn read_chunk(&self, doc: &TantivyDocument) -> (Chunk, u64) {
        let text = |f| doc.get_first(f).and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let num = |f| doc.get_first(f).and_then(|v| v.as_u64()).unwrap_or_default();
        let chunk = Chunk {
            id: text(self.fields.id),
            doc_id: text(self.fields.doc_id),
            seq: num(self.fields.seq) as usize,
            text: text(self.fields.text),
            char_start: num(self.fields.char_start) as usize,
            char_end: num(self.fields.char_end) as usize,
        };
        (chunk, num(self.fields.ordinal))
    }

    fn collect(&self, searcher: &Searcher, query: &dyn Query) -> Result<Vec<(f32, Chunk, u64)>> {
        let total = usize::try_from(searcher.num_docs())?;
        if total == 0 {
            return Ok(Vec::new());
        }
        let top = searcher.search(query, &TopDocs::with_limit(total))?;
        let mut out = Vec::with_capacity(top.len());
        for (score, addr) in top {
            let doc: TantivyDocument = searcher.doc(addr)?;
            let (chunk, ordinal) = self.read_chunk(&doc);
            out.push((score, chunk, ordinal));
        }
        Ok(out)
    }
}

#[async_trait]
impl ChunkIndex for KeywordIndex {
    fn descriptor(&self) -> IndexDescriptor {
        IndexDescriptor { kind: SourceKind::Keyword, embedder_id: None, dim: None }
    }

    fn len(&self) -> usize {
        usize::try_from(self.reader.searcher().num_docs()).unwrap_or(usize::MAX)
    }

    async fn index(&self, chunks: &[Chunk]) -> Result<usize> {
        self.append(chunks)
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let terms = self.query_terms(query)?;
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|t| {
                let q: Box<dyn Query> = Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.text, t),
                    IndexRecordOption::WithFreqs,
                ));
                (Occur::Should, q)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let mut scored = self.collect(&searcher, &query)?;
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal).then(a.2.cmp(&b.2)));
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(score, chunk, ordinal)| SearchHit { chunk, score, ordinal, source: SourceKind::Keyword })
            .collect())
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.writer.delete_all_documents()?;
        state.writer.commit()?;
        self.reader.reload()?;
        state.next_ordinal = 0;
        tracing::info!("keyword index cleared");
        Ok(())
    }

    fn chunks(&self) -> Result<Vec<Chunk>> {
        let searcher = self.reader.searcher();
        let mut all = self.collect(&searcher, &AllQuery)?;
        all.sort_by_key(|(_, _, ordinal)| *ordinal);
        Ok(all.into_iter().map(|(_, chunk, _)| chunk).collect())
    }

    async fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let chunks = self.chunks()?;
        let path = dir.join(KEYWORD_FILE);
        std::fs::write(&path, serde_json::to_vec(&chunks)?).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(chunks = chunks.len(), path = %path.display(), "keyword index saved");
        Ok(())
    }
}
