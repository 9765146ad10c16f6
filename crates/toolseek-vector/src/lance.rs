use std::path::Path;

use arrow_array::RecordBatchIterator;
use async_trait::async_trait;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use tokio::sync::Mutex;
use tracing::debug;

use toolseek_core::traits::{CorpusStore, PutMode};
use toolseek_core::types::{Collection, CorpusDocument};
use toolseek_core::{Error, Result};

use crate::schema::corpus_schema;
use crate::table::{collect_docs, docs_to_record_batch, ensure_table, open_db, quote, store_err};

/// Corpus store backed by one LanceDB table per collection.
///
/// Writes go through a single mutex so an insert's existence check and its
/// append cannot interleave with another writer in this process.
pub struct LanceCorpus {
    db: Connection,
    dim: usize,
    write_lock: Mutex<()>,
}

impl LanceCorpus {
    pub async fn open(path: &Path, dim: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(store_err)?;
        }
        let db = open_db(path.to_string_lossy().as_ref()).await?;
        for collection in Collection::ALL {
            ensure_table(&db, collection.as_str(), corpus_schema(dim)).await?;
        }
        debug!(path = %path.display(), dim, "opened lance corpus");
        Ok(Self { db, dim, write_lock: Mutex::new(()) })
    }

    async fn table(&self, collection: Collection) -> Result<Table> {
        self.db.open_table(collection.as_str()).execute().await.map_err(store_err)
    }

    async fn find(&self, table: &Table, id: &str) -> Result<Option<CorpusDocument>> {
        let stream = table.query().only_if(format!("id = {}", quote(id))).execute().await.map_err(store_err)?;
        Ok(collect_docs(stream).await?.into_iter().next().map(|(doc, _)| doc))
    }
}

#[async_trait]
impl CorpusStore for LanceCorpus {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<CorpusDocument>> {
        let table = self.table(collection).await?;
        self.find(&table, id).await
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<CorpusDocument>> {
        let table = self.table(collection).await?;
        let stream = table.query().execute().await.map_err(store_err)?;
        Ok(collect_docs(stream).await?.into_iter().map(|(doc, _)| doc).collect())
    }

    async fn put(&self, collection: Collection, doc: CorpusDocument, mode: PutMode) -> Result<()> {
        if doc.embedding.len() != self.dim {
            return Err(Error::MalformedDocument {
                id: doc.id,
                reason: format!("embedding has {} dimensions, table expects {}", doc.embedding.len(), self.dim),
            });
        }
        let _guard = self.write_lock.lock().await;
        let table = self.table(collection).await?;
        let batch = docs_to_record_batch(std::slice::from_ref(&doc), self.dim)?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), corpus_schema(self.dim)));
        match mode {
            PutMode::Insert => {
                if self.find(&table, &doc.id).await?.is_some() {
                    return Err(Error::Conflict { collection, id: doc.id });
                }
                table.add(reader).execute().await.map_err(store_err)?;
            }
            PutMode::Upsert => {
                let mut merge = table.merge_insert(&["id"]);
                merge.when_matched_update_all(None).when_not_matched_insert_all();
                let _ = merge.execute(reader).await.map_err(store_err)?;
            }
        }
        debug!(%collection, id = %doc.id, ?mode, "lance put");
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let table = self.table(collection).await?;
        if self.find(&table, id).await?.is_none() {
            return Ok(false);
        }
        let _ = table.delete(&format!("id = {}", quote(id))).await.map_err(store_err)?;
        Ok(true)
    }

    async fn nearest(&self, collection: Collection, query: &[f32], n: usize) -> Result<Vec<(CorpusDocument, f32)>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(Error::InvalidRequest(format!(
                "query vector has {} dimensions, table expects {}",
                query.len(),
                self.dim
            )));
        }
        let table = self.table(collection).await?;
        let stream = table
            .vector_search(query.to_vec())
            .map_err(store_err)?
            .distance_type(DistanceType::Cosine)
            .limit(n)
            .execute()
            .await
            .map_err(store_err)?;
        // A zero query vector has no cosine distance; treat it like the memory store does.
        let mut hits: Vec<(CorpusDocument, f32)> = collect_docs(stream)
            .await?
            .into_iter()
            .map(|(doc, d)| (doc, d.filter(|d| !d.is_nan()).unwrap_or(1.0)))
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(hits)
    }
}
