use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use toolseek_core::config::RetrievalSettings;
use toolseek_core::traits::{CorpusStore, EmbeddingProvider, PutMode};
use toolseek_core::types::{Collection, CorpusDocument, Method, RetrievalMethod};
use toolseek_core::{EmbedError, Error, Result};
use toolseek_embed::HashEmbedder;
use toolseek_hybrid::{FusionStrategy, Hits, RetrievalRequest, RetrievalService};
use toolseek_vector::MemoryCorpus;

const DIM: usize = 128;

struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn id(&self) -> &str {
        "failing"
    }
    fn dim(&self) -> usize {
        DIM
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Transient("connection refused".into()))
    }
}

async fn seeded_store() -> Arc<MemoryCorpus> {
    let embedder = HashEmbedder::new(DIM);
    let store = Arc::new(MemoryCorpus::new());
    let tools = [
        ("weather_lookup", "get current weather for a city"),
        ("stock_quote", "latest stock price for a ticker symbol"),
        ("send_email", "send an email message to a recipient"),
        ("translate", "translate text between languages"),
    ];
    let mut rows: Vec<(Collection, &str, String)> = tools
        .iter()
        .map(|(id, description)| {
            (Collection::Descriptors, *id, format!(r#"{{"name":"{id}","description":"{description}"}}"#))
        })
        .collect();
    rows.push((
        Collection::HypotheticalQueries,
        "weather_lookup",
        "will it rain in Paris tomorrow? what is the weather today?".to_string(),
    ));
    rows.push((Collection::HypotheticalQueries, "send_email", "email my boss that I am late".to_string()));
    for (collection, id, text) in rows {
        let embedding = embedder.embed_sync(&text);
        store.put(collection, CorpusDocument::new(id, text, embedding), PutMode::Insert).await.unwrap();
    }
    store
}

fn service(store: Arc<MemoryCorpus>, embedder: Arc<dyn EmbeddingProvider>) -> RetrievalService {
    RetrievalService::new(store, embedder, &RetrievalSettings::default()).unwrap()
}

fn assert_bounded_unique(ids: &[&str], n: usize) {
    assert!(ids.len() <= n, "{ids:?} longer than {n}");
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len(), "duplicates in {ids:?}");
}

#[tokio::test]
async fn every_method_is_bounded_and_unique() {
    let svc = service(seeded_store().await, Arc::new(HashEmbedder::new(DIM)));
    for method in ["dense", "sparse", "keyword", "hybrid"] {
        for n in 1..=4 {
            let req = RetrievalRequest::new("what is the weather today in Paris", method.parse().unwrap(), n);
            let resp = svc.retrieve(&req).await.unwrap();
            assert_bounded_unique(&resp.hits.tool_ids(), n);
            assert!(!resp.is_degraded());
        }
    }
}

#[tokio::test]
async fn keyword_single_document_scenario() {
    let store = Arc::new(MemoryCorpus::new());
    let doc = CorpusDocument::new("weather_lookup", "get current weather for a city", vec![0.0; DIM]);
    store.put(Collection::Descriptors, doc, PutMode::Insert).await.unwrap();
    let svc = service(store, Arc::new(HashEmbedder::new(DIM)));
    let req = RetrievalRequest::new("what's the weather today", RetrievalMethod::Single(Method::Keyword), 1);
    let resp = svc.retrieve(&req).await.unwrap();
    match resp.hits {
        Hits::Single(hits) => {
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].tool_id, "weather_lookup");
            assert!(hits[0].score.raw() > 0.0);
        }
        Hits::Fused(_) => panic!("expected single-method hits"),
    }
    assert_eq!(resp.contributing, vec![Method::Keyword]);
}

#[tokio::test]
async fn hybrid_degrades_when_embedding_fails() {
    let svc = service(seeded_store().await, Arc::new(FailingEmbedder));
    for strategy in [FusionStrategy::Weighted, FusionStrategy::Adaptive, FusionStrategy::RankFusion] {
        let req = RetrievalRequest::new("weather today", RetrievalMethod::Hybrid, 3).with_strategy(strategy);
        let resp = svc.retrieve(&req).await.unwrap();
        assert!(!resp.hits.is_empty());
        assert!(resp.hits.len() <= 3);
        assert_eq!(resp.contributing, vec![Method::Sparse, Method::Keyword]);
        assert_eq!(resp.failures.len(), 1);
        assert_eq!(resp.failures[0].0, Method::Dense);
        let Hits::Fused(hits) = &resp.hits else { panic!("expected fused hits") };
        assert_eq!(hits[0].tool_id, "weather_lookup");
        assert!(hits.iter().all(|h| !h.breakdown.contains_key(&Method::Dense)));
    }
}

#[tokio::test]
async fn standalone_dense_fails_hard() {
    let svc = service(seeded_store().await, Arc::new(FailingEmbedder));
    let req = RetrievalRequest::new("weather today", RetrievalMethod::Single(Method::Dense), 3);
    let err = svc.retrieve(&req).await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingUnavailable(EmbedError::Transient(_))));
}

#[tokio::test]
async fn hybrid_reports_all_methods_and_breakdowns() {
    let svc = service(seeded_store().await, Arc::new(HashEmbedder::new(DIM)));
    let req = RetrievalRequest::new("send an email", RetrievalMethod::Hybrid, 2);
    let resp = svc.retrieve(&req).await.unwrap();
    assert_eq!(resp.contributing, Method::ALL.to_vec());
    let Hits::Fused(hits) = resp.hits else { panic!("expected fused hits") };
    assert_eq!(hits[0].tool_id, "send_email");
    assert_eq!(hits[0].breakdown.len(), 3);
    for pair in hits.windows(2) {
        assert!(pair[0].fused_score >= pair[1].fused_score);
    }
}

#[tokio::test]
async fn empty_corpus_returns_empty_lists() {
    let svc = service(Arc::new(MemoryCorpus::new()), Arc::new(HashEmbedder::new(DIM)));
    for method in ["dense", "sparse", "keyword", "hybrid"] {
        let req = RetrievalRequest::new("weather", method.parse().unwrap(), 5);
        let resp = svc.retrieve(&req).await.unwrap();
        assert!(resp.hits.is_empty(), "{method} returned hits on an empty corpus");
    }
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let svc = service(seeded_store().await, Arc::new(HashEmbedder::new(DIM)));
    let zero = RetrievalRequest::new("weather", RetrievalMethod::Hybrid, 0);
    assert!(matches!(svc.retrieve(&zero).await, Err(Error::InvalidRequest(_))));

    assert!(matches!("semantic".parse::<RetrievalMethod>(), Err(Error::UnsupportedMethod(_))));

    let bad_weights = RetrievalRequest::new("weather", RetrievalMethod::Hybrid, 3)
        .with_weights([(Method::Dense, -1.0)].into_iter().collect());
    assert!(matches!(svc.retrieve(&bad_weights).await, Err(Error::InvalidWeights(_))));
}

#[test]
fn unknown_default_strategy_is_a_config_error() {
    let settings = RetrievalSettings { default_strategy: "borda".into(), ..RetrievalSettings::default() };
    let result = RetrievalService::new(Arc::new(MemoryCorpus::new()), Arc::new(HashEmbedder::new(DIM)), &settings);
    assert!(matches!(result, Err(Error::UnsupportedStrategy(_))));
}

/// Forwards to a memory store and remembers the `n` of every `nearest` call.
struct RecordingStore {
    inner: Arc<MemoryCorpus>,
    nearest_calls: Mutex<Vec<(Collection, usize)>>,
}

#[async_trait]
impl CorpusStore for RecordingStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<CorpusDocument>> {
        self.inner.get(collection, id).await
    }
    async fn get_all(&self, collection: Collection) -> Result<Vec<CorpusDocument>> {
        self.inner.get_all(collection).await
    }
    async fn put(&self, collection: Collection, doc: CorpusDocument, mode: PutMode) -> Result<()> {
        self.inner.put(collection, doc, mode).await
    }
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        self.inner.delete(collection, id).await
    }
    async fn nearest(&self, collection: Collection, query: &[f32], n: usize) -> Result<Vec<(CorpusDocument, f32)>> {
        self.nearest_calls.lock().unwrap().push((collection, n));
        self.inner.nearest(collection, query, n).await
    }
}

#[tokio::test]
async fn hybrid_fetches_twice_the_cut_per_method() {
    let store = Arc::new(RecordingStore { inner: seeded_store().await, nearest_calls: Mutex::new(Vec::new()) });
    let svc =
        RetrievalService::new(store.clone(), Arc::new(HashEmbedder::new(DIM)), &RetrievalSettings::default()).unwrap();

    let resp = svc.retrieve(&RetrievalRequest::new("weather today", RetrievalMethod::Hybrid, 3)).await.unwrap();
    assert!(resp.hits.len() <= 3);
    let calls = std::mem::take(&mut *store.nearest_calls.lock().unwrap());
    assert_eq!(calls, vec![(Collection::Descriptors, 6), (Collection::HypotheticalQueries, 6)]);

    // Single-method calls keep the requested cut.
    svc.retrieve(&RetrievalRequest::new("weather today", RetrievalMethod::Single(Method::Dense), 3)).await.unwrap();
    let calls = store.nearest_calls.lock().unwrap().clone();
    assert!(calls.iter().all(|(_, n)| *n == 3), "{calls:?}");
}

#[tokio::test]
async fn methods_without_hits_do_not_contribute() {
    let svc = service(seeded_store().await, Arc::new(HashEmbedder::new(DIM)));
    let resp = svc.retrieve(&RetrievalRequest::new("zzqx", RetrievalMethod::Hybrid, 3)).await.unwrap();
    assert!(!resp.is_degraded());
    assert_eq!(resp.contributing, vec![Method::Dense]);

    let req = RetrievalRequest::new("zzqx", RetrievalMethod::Single(Method::Keyword), 3);
    let resp = svc.retrieve(&req).await.unwrap();
    assert!(resp.hits.is_empty());
    assert!(resp.contributing.is_empty());
}

#[tokio::test]
async fn plain_hybrid_uses_rank_fusion() {
    let svc = service(seeded_store().await, Arc::new(HashEmbedder::new(DIM)));
    let plain = svc.retrieve(&RetrievalRequest::new("send an email", RetrievalMethod::Hybrid, 3)).await.unwrap();
    let rrf = RetrievalRequest::new("send an email", RetrievalMethod::Hybrid, 3);
    let rrf = svc.retrieve(&rrf.with_strategy(FusionStrategy::RankFusion)).await.unwrap();

    let (Hits::Fused(plain), Hits::Fused(rrf)) = (plain.hits, rrf.hits) else { panic!("expected fused hits") };
    let scores = |hits: &[toolseek_core::types::FusedCandidate]| -> Vec<(String, f32)> {
        hits.iter().map(|h| (h.tool_id.clone(), h.fused_score)).collect()
    };
    assert_eq!(scores(&plain), scores(&rrf));
    // Reciprocal-rank scores are bounded by three first places.
    assert!(plain.iter().all(|h| h.fused_score <= 3.0 / 61.0 + 1e-6));
}
