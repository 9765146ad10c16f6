use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use toolseek_core::dedup::dedup_by_tool;
use toolseek_core::traits::{CorpusStore, EmbeddingProvider};
use toolseek_core::types::{Candidate, Collection, Score};
use toolseek_core::{EmbedError, Error, Result};

/// Embedding similarity over both collections of a store.
pub struct DenseRetriever {
    store: Arc<dyn CorpusStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl DenseRetriever {
    pub fn new(store: Arc<dyn CorpusStore>, embedder: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self { store, embedder, timeout }
    }

    /// Embed `query` within the timeout; both provider failures and timeouts surface as `EmbeddingUnavailable`.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        match tokio::time::timeout(self.timeout, self.embedder.embed(query)).await {
            Ok(Ok(vector)) => Ok(vector),
            Ok(Err(e)) => Err(Error::EmbeddingUnavailable(e)),
            Err(_) => Err(Error::EmbeddingUnavailable(EmbedError::Transient(format!(
                "{} did not answer within {} ms",
                self.embedder.id(),
                self.timeout.as_millis()
            )))),
        }
    }

    pub async fn retrieve(&self, query: &str, n: usize) -> Result<Vec<Candidate>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embed_query(query).await?;
        let mut candidates = Vec::new();
        for collection in Collection::ALL {
            for (doc, distance) in self.store.nearest(collection, &vector, n).await? {
                candidates.push(Candidate {
                    tool_id: doc.id,
                    score: Score::Dense { similarity: 1.0 - distance },
                    source: collection,
                    text: doc.text,
                    metadata: doc.metadata,
                });
            }
        }
        debug!(provider = self.embedder.id(), hits = candidates.len(), "dense: scored corpus");
        Ok(dedup_by_tool(candidates, n))
    }
}
