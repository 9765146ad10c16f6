use std::sync::Arc;

use toolseek_core::traits::{CorpusStore, PutMode};
use toolseek_core::types::{Collection, CorpusDocument};
use toolseek_core::Error;
use toolseek_vector::{LanceCorpus, MemoryCorpus};

fn doc(id: &str, text: &str, embedding: Vec<f32>) -> CorpusDocument {
    CorpusDocument::new(id, text, embedding)
}

/// Shared behaviour every store must satisfy.
async fn exercise_store(store: Arc<dyn CorpusStore>) {
    let c = Collection::Descriptors;
    store.put(c, doc("weather", "get weather", vec![1.0, 0.0, 0.0]), PutMode::Insert).await.unwrap();
    store.put(c, doc("stocks", "stock price", vec![0.0, 1.0, 0.0]), PutMode::Insert).await.unwrap();

    // A second insert under the same id is rejected and leaves the original untouched.
    let err = store.put(c, doc("weather", "different", vec![0.0, 0.0, 1.0]), PutMode::Insert).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { collection: Collection::Descriptors, ref id } if id == "weather"));
    assert_eq!(store.get(c, "weather").await.unwrap().unwrap().text, "get weather");

    store.put(c, doc("weather", "current weather", vec![0.9, 0.1, 0.0]), PutMode::Upsert).await.unwrap();
    assert_eq!(store.get(c, "weather").await.unwrap().unwrap().text, "current weather");
    assert_eq!(store.get_all(c).await.unwrap().len(), 2);

    let hits = store.nearest(c, &[1.0, 0.0, 0.0], 5).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0.id, "weather");
    assert!(hits[0].1 < hits[1].1);
    assert!(hits[0].1 >= -1e-5 && hits[0].1 < 0.1);

    assert!(store.get(Collection::HypotheticalQueries, "weather").await.unwrap().is_none());
    assert!(store.delete(c, "weather").await.unwrap());
    assert!(!store.delete(c, "weather").await.unwrap());
    assert!(store.get(c, "weather").await.unwrap().is_none());

    let snapshot = store.snapshot().await.unwrap();
    assert_eq!(snapshot.descriptors.len(), 1);
    assert!(snapshot.hypothetical_queries.is_empty());
}

#[tokio::test]
async fn memory_store_semantics() {
    exercise_store(Arc::new(MemoryCorpus::new())).await;
}

#[tokio::test]
async fn lance_store_semantics() {
    let dir = tempfile::tempdir().unwrap();
    let store = LanceCorpus::open(&dir.path().join("corpus"), 3).await.unwrap();
    exercise_store(Arc::new(store)).await;
}

#[tokio::test]
async fn lance_store_persists_metadata_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corpus");
    {
        let store = LanceCorpus::open(&path, 2).await.unwrap();
        let mut meta = toolseek_core::types::Meta::new();
        meta.insert("owner".into(), serde_json::json!("ops"));
        let d = doc("pager", "page the on-call", vec![0.0, 1.0]).with_metadata(meta);
        store.put(Collection::HypotheticalQueries, d, PutMode::Insert).await.unwrap();
    }
    let store = LanceCorpus::open(&path, 2).await.unwrap();
    let back = store.get(Collection::HypotheticalQueries, "pager").await.unwrap().unwrap();
    assert_eq!(back.embedding, vec![0.0, 1.0]);
    assert_eq!(back.metadata["owner"], serde_json::json!("ops"));
}

#[tokio::test]
async fn lance_rejects_wrong_dimension() {
    let dir = tempfile::tempdir().unwrap();
    let store = LanceCorpus::open(&dir.path().join("corpus"), 3).await.unwrap();
    let err = store.put(Collection::Descriptors, doc("x", "x", vec![1.0]), PutMode::Insert).await.unwrap_err();
    assert!(matches!(err, Error::MalformedDocument { .. }));
}

#[tokio::test]
async fn memory_nearest_skips_mismatched_embeddings() {
    let store = MemoryCorpus::new();
    store.put(Collection::Descriptors, doc("short", "x", vec![1.0]), PutMode::Insert).await.unwrap();
    store.put(Collection::Descriptors, doc("ok", "y", vec![1.0, 0.0]), PutMode::Insert).await.unwrap();
    let hits = store.nearest(Collection::Descriptors, &[1.0, 0.0], 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0.id, "ok");
}

#[test]
fn cosine_distance_bounds() {
    use toolseek_vector::memory::cosine_distance;
    assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
    assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
    assert!((cosine_distance(&[0.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
}
