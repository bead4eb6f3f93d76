//! Domain types shared by the indexes, the generator and the script synthesizer.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ChunkId = String;
pub type DocumentId = String;

/// Placeholder written into any test case field that the evidence does not back.
pub const NOT_SPECIFIED: &str = "NOT SPECIFIED";

/// Input formats the normalizer understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Html,
    Json,
    Pdf,
}

impl DocumentFormat {
    pub fn name(self) -> &'static str {
        match self {
            DocumentFormat::PlainText => "text",
            DocumentFormat::Markdown => "markdown",
            DocumentFormat::Html => "html",
            DocumentFormat::Json => "json",
            DocumentFormat::Pdf => "pdf",
        }
    }

    /// Maps a file extension (without the dot, any case) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" | "log" => Some(DocumentFormat::PlainText),
            "md" | "markdown" => Some(DocumentFormat::Markdown),
            "html" | "htm" => Some(DocumentFormat::Html),
            "json" => Some(DocumentFormat::Json),
            "pdf" => Some(DocumentFormat::Pdf),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A normalized source document.
///
/// - `id`: stable document identity (the submitted filename)
/// - `format`: detected or declared input format
/// - `text`: normalized plain text that chunks are cut from
/// - `content_hash`: blake3 of the raw bytes
/// - `warnings`: partial-parse notes recorded during normalization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    pub format: DocumentFormat,
    pub text: String,
    pub content_hash: String,
    pub byte_len: usize,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// A bounded slice of a document's normalized text.
///
/// `char_start`/`char_end` are character (not byte) offsets into
/// `Document::text`, end exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub id: ChunkId,
    pub doc_id: DocumentId,
    pub seq: usize,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
}

impl Chunk {
    pub fn make_id(doc_id: &str, seq: usize) -> ChunkId {
        format!("{doc_id}#{seq}")
    }
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Vector,
    Keyword,
}

impl SourceKind {
    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Vector => "vector",
            SourceKind::Keyword => "keyword",
        }
    }
}

/// One retrieved chunk. `score` is engine-specific but higher is always better;
/// `ordinal` is the insertion position inside the index and breaks ties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
    pub ordinal: u64,
    pub source: SourceKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceEntry {
    pub label: String,
    pub chunk: Chunk,
    pub score: f32,
}

/// The bounded evidence assembled for one query. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvidenceContext {
    pub query: String,
    pub entries: Vec<EvidenceEntry>,
    pub char_budget: usize,
    /// Entries removed to stay inside `char_budget`.
    pub truncated: usize,
    /// Entries removed as near-duplicates of a better-scored chunk.
    pub deduplicated: usize,
}

impl EvidenceContext {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_chars(&self) -> usize {
        self.entries.iter().map(|e| e.chunk.text.chars().count()).sum()
    }

    /// Distinct document ids in evidence order.
    pub fn documents(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for e in &self.entries {
            if !out.contains(&e.chunk.doc_id.as_str()) {
                out.push(e.chunk.doc_id.as_str());
            }
        }
        out
    }

    pub fn entry(&self, label: &str) -> Option<&EvidenceEntry> {
        self.entries.iter().find(|e| e.label == label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    Positive,
    Negative,
    Edge,
}

impl Category {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Category::Positive),
            "negative" => Some(Category::Negative),
            "edge" | "edge case" | "boundary" => Some(Category::Edge),
            _ => None,
        }
    }
}

/// Externally visible test case record. Field names on the wire are fixed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCase {
    #[serde(rename = "Test_ID")]
    pub id: String,
    #[serde(rename = "Feature")]
    pub feature: String,
    #[serde(rename = "Test_Scenario")]
    pub scenario: String,
    #[serde(rename = "Steps")]
    pub steps: Vec<String>,
    #[serde(rename = "Expected_Result")]
    pub expected_result: String,
    #[serde(rename = "Grounded_In")]
    pub grounded_in: String,
    #[serde(rename = "Type")]
    pub category: Category,
    #[serde(rename = "Notes", default)]
    pub notes: String,
}

impl TestCase {
    pub fn format_id(n: usize) -> String {
        format!("TC{n:03}")
    }
}

/// Browser action a step is bound to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Navigate,
    Input,
    Click,
    AssertText,
    AssertState,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::Navigate => "navigate",
            Action::Input => "input",
            Action::Click => "click",
            Action::AssertText => "assert-text",
            Action::AssertState => "assert-state",
        }
    }
}

/// Selector strategies in priority order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorStrategy {
    Identifier,
    Name,
    Class,
    StructuralPath,
}

impl SelectorStrategy {
    pub fn name(self) -> &'static str {
        match self {
            SelectorStrategy::Identifier => "identifier",
            SelectorStrategy::Name => "name",
            SelectorStrategy::Class => "class",
            SelectorStrategy::StructuralPath => "structural-path",
        }
    }

    /// Lower is preferred.
    pub fn priority(self) -> u8 {
        match self {
            SelectorStrategy::Identifier => 0,
            SelectorStrategy::Name => 1,
            SelectorStrategy::Class => 2,
            SelectorStrategy::StructuralPath => 3,
        }
    }
}

/// Addressing expression bound into a script step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Locator {
    pub strategy: SelectorStrategy,
    /// CSS form of the selector, valid for any strategy.
    pub css: String,
    /// Raw value for strategies with a native lookup (`id`, `name`).
    pub value: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WaitCondition {
    PageLoaded,
    Present,
    Visible,
    Clickable,
    TextPresent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepBinding {
    pub index: usize,
    pub step: String,
    /// `None` when the step could not be bound.
    pub action: Option<Action>,
    pub target: Option<Locator>,
    pub wait: Option<WaitCondition>,
    pub value: Option<String>,
    pub note: Option<String>,
}

impl StepBinding {
    pub fn is_resolved(&self) -> bool {
        self.action.is_some()
    }
}

/// Externally visible script payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedScript {
    pub test_case_id: String,
    pub filename: String,
    pub bindings: Vec<StepBinding>,
    pub source: String,
}

/// Kinds of non-fatal issues reported next to results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    UnsupportedFormat,
    PartialParse,
    DuplicateDocument,
    EmptyDocument,
    NoEvidence,
    BackendFallback,
    GenerationTimeout,
    GenerationFailed,
    SchemaValidation,
    UngroundedContent,
    SelectorResolution,
    UnresolvedStep,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: IssueKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), subject: None }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Some(s) => write!(f, "[{:?}] {}: {}", self.kind, s, self.message),
            None => write!(f, "[{:?}] {}", self.kind, self.message),
        }
    }
}
