use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER: &str = "text_with_stopwords";

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it", "its", "of", "on",
    "that", "the", "to", "was", "will", "with", "or", "but", "this", "these", "they", "them", "their", "there",
    "then", "than", "so", "if", "when", "where", "why", "how", "what", "which", "who", "whom", "whose", "can", "could",
    "would", "may", "might", "shall", "do", "does", "did", "have", "had", "having", "you", "your", "i", "we", "our",
];

#[derive(Debug, Clone, Copy)]
pub struct Fields {
    pub id: Field,
    pub doc_id: Field,
    pub seq: Field,
    pub ordinal: Field,
    pub char_start: Field,
    pub char_end: Field,
    pub text: Field,
}

/// Chunk schema: identity and offsets are stored only, `text` is analyzed
/// with the stop-word tokenizer and stored for reconstruction.
pub fn build_schema() -> (Schema, Fields) {
    let mut schema_builder = Schema::builder();
    let id = schema_builder.add_text_field("id", STRING | STORED);
    let doc_id = schema_builder.add_text_field("doc_id", STRING | STORED);
    let seq = schema_builder.add_u64_field("seq", STORED);
    let ordinal = schema_builder.add_u64_field("ordinal", STORED);
    let char_start = schema_builder.add_u64_field("char_start", STORED);
    let char_end = schema_builder.add_u64_field("char_end", STORED);
    let text_field_indexing = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
    let text = schema_builder.add_text_field("text", text_options);
    (schema_builder.build(), Fields { id, doc_id, seq, ordinal, char_start, char_end, text })
}

/// Case folding plus stop-word removal; shared by indexing and query analysis.
pub fn register_tokenizer(index: &Index) {
    let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| (*s).to_string())))
        .build();
    index.tokenizers().register(TOKENIZER, tokenizer);
}
