use async_trait::async_trait;

use crate::error::{EmbedError, Result};
use crate::types::{Candidate, Collection, CorpusDocument, CorpusSnapshot, Method};

/// Turns text into fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hash:d1024`).
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbedError>;

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbedError> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        match (out.pop(), out.is_empty()) {
            (Some(v), true) => Ok(v),
            _ => Err(EmbedError::Permanent("provider returned an unexpected number of vectors".into())),
        }
    }
}

/// How `CorpusStore::put` treats an existing id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Fail with `Error::Conflict` and write nothing if the id exists.
    Insert,
    /// Replace any existing document wholesale.
    Upsert,
}

/// Holds the `descriptors` and `hypothetical_queries` collections.
///
/// A document is written atomically: readers see the old or the new
/// version, never a mix.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<CorpusDocument>>;
    async fn get_all(&self, collection: Collection) -> Result<Vec<CorpusDocument>>;
    async fn put(&self, collection: Collection, doc: CorpusDocument, mode: PutMode) -> Result<()>;
    /// Returns whether a document was removed.
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool>;
    /// Up to `n` documents closest to `query`, with their cosine distance, nearest first.
    async fn nearest(&self, collection: Collection, query: &[f32], n: usize) -> Result<Vec<(CorpusDocument, f32)>>;

    async fn snapshot(&self) -> Result<CorpusSnapshot> {
        Ok(CorpusSnapshot {
            descriptors: self.get_all(Collection::Descriptors).await?,
            hypothetical_queries: self.get_all(Collection::HypotheticalQueries).await?,
        })
    }
}

/// A retriever that scores a full corpus snapshot in memory.
pub trait LexicalRetriever: Send + Sync {
    fn method(&self) -> Method;
    fn retrieve(&self, snapshot: &CorpusSnapshot, query: &str, n: usize) -> Result<Vec<Candidate>>;
}
