use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED};
use tantivy::tokenizer::{TextAnalyzer, WhitespaceTokenizer};
use tantivy::{Index, TantivyError};

use toolseek_core::Error;

/// Documents are tokenized by [`crate::Tokenizer`] before indexing; tantivy only splits on the joining spaces.
pub const PRETOKENIZED: &str = "toolseek_pretokenized";

/// Smallest per-thread budget tantivy accepts.
pub const WRITER_MEMORY_BYTES: usize = 15_000_000;

#[derive(Clone, Copy)]
pub struct LexicalFields {
    /// Position of the document in the tokenized corpus.
    pub ordinal: Field,
    pub body: Field,
}

pub fn build_schema() -> (Schema, LexicalFields) {
    let mut schema_builder = Schema::builder();
    let ordinal = schema_builder.add_u64_field("ordinal", STORED);
    let body_indexing = TextFieldIndexing::default()
        .set_tokenizer(PRETOKENIZED)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let body = schema_builder.add_text_field("body", TextOptions::default().set_indexing_options(body_indexing));
    (schema_builder.build(), LexicalFields { ordinal, body })
}

pub fn register_tokenizer(index: &Index) {
    let tokenizer = TextAnalyzer::builder(WhitespaceTokenizer::default()).build();
    index.tokenizers().register(PRETOKENIZED, tokenizer);
}

pub fn index_err(e: TantivyError) -> Error {
    Error::Index(e.to_string())
}
