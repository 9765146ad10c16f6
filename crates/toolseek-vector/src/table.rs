//! LanceDB connection helpers and row conversion for corpus tables.

use std::sync::Arc;

use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray,
};
use arrow_schema::Schema;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::arrow::SendableRecordBatchStream;
use lancedb::{connect, Connection};
use tracing::warn;

use toolseek_core::types::{CorpusDocument, Meta};
use toolseek_core::{Error, Result};

use crate::schema::corpus_schema;

pub fn store_err(e: impl std::fmt::Display) -> Error {
    Error::Store(e.to_string())
}

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(store_err)
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<Schema>) -> Result<()> {
    let names = conn.table_names().execute().await.map_err(store_err)?;
    if names.iter().any(|n| n == name) {
        return Ok(());
    }
    let empty: Vec<std::result::Result<RecordBatch, arrow_schema::ArrowError>> = Vec::new();
    let iter = RecordBatchIterator::new(empty.into_iter(), schema);
    conn.create_table(name, Box::new(iter)).execute().await.map_err(store_err)?;
    Ok(())
}

/// SQL string literal for a `only_if` / `delete` predicate.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn docs_to_record_batch(docs: &[CorpusDocument], dim: usize) -> Result<RecordBatch> {
    let now = Utc::now().timestamp_millis();
    let mut metadata = Vec::with_capacity(docs.len());
    for doc in docs {
        metadata.push(serde_json::to_string(&doc.metadata).map_err(store_err)?);
    }
    let vectors = docs.iter().map(|d| Some(d.embedding.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    RecordBatch::try_new(
        corpus_schema(dim),
        vec![
            Arc::new(StringArray::from_iter_values(docs.iter().map(|d| d.id.as_str()))),
            Arc::new(StringArray::from_iter_values(docs.iter().map(|d| d.text.as_str()))),
            Arc::new(StringArray::from(metadata)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim as i32)),
            Arc::new(TimestampMillisecondArray::from(vec![now; docs.len()])),
        ],
    )
    .map_err(store_err)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Store(format!("column '{name}' missing or not utf8")))
}

/// Decode every row of `batch`, with the `_distance` column when the batch came from a vector search.
pub fn batch_to_docs(batch: &RecordBatch) -> Result<Vec<(CorpusDocument, Option<f32>)>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let metadata = string_column(batch, "metadata")?;
    let vectors = batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| Error::Store("column 'vector' missing".into()))?;
    let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let meta: Meta = match serde_json::from_str(metadata.value(i)) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(id = ids.value(i), error = %e, "skipping row with unreadable metadata");
                continue;
            }
        };
        let embedding = if vectors.is_null(i) {
            Vec::new()
        } else {
            let values = vectors.value(i);
            values
                .as_any()
                .downcast_ref::<Float32Array>()
                .map(|a| a.values().to_vec())
                .ok_or_else(|| Error::Store("vector items are not float32".into()))?
        };
        let doc = CorpusDocument::new(ids.value(i), texts.value(i), embedding).with_metadata(meta);
        out.push((doc, distances.map(|d| d.value(i))));
    }
    Ok(out)
}

pub async fn collect_docs(mut stream: SendableRecordBatchStream) -> Result<Vec<(CorpusDocument, Option<f32>)>> {
    let mut out = Vec::new();
    while let Some(batch) = stream.try_next().await.map_err(store_err)? {
        out.extend(batch_to_docs(&batch)?);
    }
    Ok(out)
}
