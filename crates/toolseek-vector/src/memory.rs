use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use toolseek_core::traits::{CorpusStore, PutMode};
use toolseek_core::types::{Collection, CorpusDocument, CorpusSnapshot};
use toolseek_core::{Error, Result};

/// In-process store; documents keep insertion order and nearest-neighbour
/// queries are an exact cosine scan.
#[derive(Default)]
pub struct MemoryCorpus {
    descriptors: RwLock<Vec<CorpusDocument>>,
    hypothetical_queries: RwLock<Vec<CorpusDocument>>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    fn docs(&self, collection: Collection) -> &RwLock<Vec<CorpusDocument>> {
        match collection {
            Collection::Descriptors => &self.descriptors,
            Collection::HypotheticalQueries => &self.hypothetical_queries,
        }
    }
}

/// `1 - cos(a, b)`; a zero vector is at distance 1 from everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na.sqrt() * nb.sqrt())
}

#[async_trait]
impl CorpusStore for MemoryCorpus {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<CorpusDocument>> {
        Ok(self.docs(collection).read().await.iter().find(|d| d.id == id).cloned())
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<CorpusDocument>> {
        Ok(self.docs(collection).read().await.clone())
    }

    async fn put(&self, collection: Collection, doc: CorpusDocument, mode: PutMode) -> Result<()> {
        let mut docs = self.docs(collection).write().await;
        match (docs.iter().position(|d| d.id == doc.id), mode) {
            (Some(_), PutMode::Insert) => Err(Error::Conflict { collection, id: doc.id }),
            (Some(pos), PutMode::Upsert) => {
                docs[pos] = doc;
                Ok(())
            }
            (None, _) => {
                docs.push(doc);
                Ok(())
            }
        }
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let mut docs = self.docs(collection).write().await;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        Ok(docs.len() != before)
    }

    async fn nearest(&self, collection: Collection, query: &[f32], n: usize) -> Result<Vec<(CorpusDocument, f32)>> {
        let docs = self.docs(collection).read().await;
        let mut scored: Vec<(&CorpusDocument, f32)> = Vec::with_capacity(docs.len());
        for doc in docs.iter() {
            if doc.embedding.len() != query.len() {
                let err = Error::MalformedDocument {
                    id: doc.id.clone(),
                    reason: format!("embedding has {} dimensions, query has {}", doc.embedding.len(), query.len()),
                };
                warn!(error = %err, %collection, "skipping document");
                continue;
            }
            scored.push((doc, cosine_distance(query, &doc.embedding)));
        }
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(n);
        Ok(scored.into_iter().map(|(doc, d)| (doc.clone(), d)).collect())
    }

    /// Both collections are read under their locks at the same time.
    async fn snapshot(&self) -> Result<CorpusSnapshot> {
        let descriptors = self.descriptors.read().await;
        let hypothetical_queries = self.hypothetical_queries.read().await;
        Ok(CorpusSnapshot { descriptors: descriptors.clone(), hypothetical_queries: hypothetical_queries.clone() })
    }
}
