//! toolseek-text
//!
//! Lexical retrieval over a corpus snapshot: the shared tokenizer, BM25
//! (tantivy, in RAM) and TF-IDF cosine scoring.

pub mod corpus;
pub mod keyword;
pub mod sparse;
pub mod tantivy_utils;
pub mod tokenize;

pub use keyword::KeywordRetriever;
pub use sparse::SparseRetriever;
pub use tokenize::Tokenizer;
