use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use toolseek_core::config::RetrievalSettings;
use toolseek_core::traits::{CorpusStore, EmbeddingProvider, LexicalRetriever};
use toolseek_core::types::{Candidate, CorpusSnapshot, FusedCandidate, Method, RetrievalMethod};
use toolseek_core::{Error, Result};
use toolseek_text::{KeywordRetriever, SparseRetriever, Tokenizer};
use toolseek_vector::DenseRetriever;

use crate::fusion::{fuse, FusionStrategy, MethodWeights};

#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    pub method: RetrievalMethod,
    pub n_results: usize,
    /// Hybrid only; the configured default when absent.
    pub strategy: Option<FusionStrategy>,
    /// Hybrid only; overrides the strategy's weights.
    pub weights: Option<HashMap<Method, f32>>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, method: RetrievalMethod, n_results: usize) -> Self {
        Self { query: query.into(), method, n_results, strategy: None, weights: None }
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: FusionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    #[must_use]
    pub fn with_weights(mut self, weights: HashMap<Method, f32>) -> Self {
        self.weights = Some(weights);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum Hits {
    Single(Vec<Candidate>),
    Fused(Vec<FusedCandidate>),
}

impl Hits {
    pub fn len(&self) -> usize {
        match self {
            Self::Single(v) => v.len(),
            Self::Fused(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tool_ids(&self) -> Vec<&str> {
        match self {
            Self::Single(v) => v.iter().map(|c| c.tool_id.as_str()).collect(),
            Self::Fused(v) => v.iter().map(|c| c.tool_id.as_str()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResponse {
    pub hits: Hits,
    /// Methods that returned at least one hit.
    pub contributing: Vec<Method>,
    /// Methods that failed during a hybrid call, with the reason.
    pub failures: Vec<(Method, String)>,
}

impl RetrievalResponse {
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Entry point for queries: owns the three retrievers over one store and embedder.
pub struct RetrievalService {
    store: Arc<dyn CorpusStore>,
    dense: DenseRetriever,
    sparse: Arc<SparseRetriever>,
    keyword: Arc<KeywordRetriever>,
    default_strategy: FusionStrategy,
}

impl RetrievalService {
    pub fn new(
        store: Arc<dyn CorpusStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: &RetrievalSettings,
    ) -> Result<Self> {
        let tokenizer = Tokenizer::new();
        let default_strategy = settings.default_strategy.parse::<FusionStrategy>()?;
        Ok(Self {
            dense: DenseRetriever::new(Arc::clone(&store), embedder, Duration::from_millis(settings.embed_timeout_ms)),
            sparse: Arc::new(SparseRetriever::new(tokenizer.clone(), settings.sparse_epsilon)),
            keyword: Arc::new(KeywordRetriever::new(tokenizer)),
            store,
            default_strategy,
        })
    }

    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResponse> {
        if request.n_results == 0 {
            return Err(Error::InvalidRequest("n_results must be positive".into()));
        }
        let n = request.n_results;
        debug!(method = %request.method, n, query = %request.query, "retrieve");
        match request.method {
            RetrievalMethod::Single(Method::Dense) => {
                let hits = self.dense.retrieve(&request.query, n).await?;
                Ok(single(Method::Dense, hits))
            }
            RetrievalMethod::Single(method) => {
                let snapshot = Arc::new(self.store.snapshot().await?);
                let hits = run_lexical(self.lexical(method)?, snapshot, request.query.clone(), n).await?;
                Ok(single(method, hits))
            }
            RetrievalMethod::Hybrid => self.hybrid(request).await,
        }
    }

    fn lexical(&self, method: Method) -> Result<Arc<dyn LexicalRetriever>> {
        match method {
            Method::Sparse => Ok(self.sparse.clone()),
            Method::Keyword => Ok(self.keyword.clone()),
            Method::Dense => Err(Error::UnsupportedMethod("dense is not a lexical method".into())),
        }
    }

    async fn hybrid(&self, request: &RetrievalRequest) -> Result<RetrievalResponse> {
        let n = request.n_results;
        let strategy = request.strategy.unwrap_or(self.default_strategy);
        if let (Some(weights), FusionStrategy::Weighted | FusionStrategy::Adaptive) = (&request.weights, strategy) {
            MethodWeights::from_explicit(weights)?;
        }
        let snapshot = Arc::new(self.store.snapshot().await?);
        // Each method ranks past the cut so fusion can promote tools they agree on.
        let per_method = fetch_per_method(n);

        let (dense, sparse, keyword) = tokio::join!(
            self.dense.retrieve(&request.query, per_method),
            run_lexical(self.sparse.clone(), Arc::clone(&snapshot), request.query.clone(), per_method),
            run_lexical(self.keyword.clone(), snapshot, request.query.clone(), per_method),
        );

        let mut results: BTreeMap<Method, Vec<Candidate>> = BTreeMap::new();
        let mut failures = Vec::new();
        for (method, outcome) in [(Method::Dense, dense), (Method::Sparse, sparse), (Method::Keyword, keyword)] {
            match outcome {
                Ok(hits) => {
                    results.insert(method, hits);
                }
                Err(e) => {
                    warn!(%method, error = %e, "method failed, continuing without it");
                    failures.push((method, e.to_string()));
                }
            }
        }
        if results.is_empty() {
            return Err(Error::Operation(format!("every retrieval method failed: {failures:?}")));
        }

        let fused = fuse(&results, strategy, &request.query, request.weights.as_ref(), n)?;
        debug!(%strategy, hits = fused.len(), degraded = !failures.is_empty(), "hybrid: fused");
        let contributing = results.iter().filter(|(_, hits)| !hits.is_empty()).map(|(m, _)| *m).collect();
        Ok(RetrievalResponse { hits: Hits::Fused(fused), contributing, failures })
    }
}

/// How many candidates each method returns in hybrid mode for a final cut of `n`.
fn fetch_per_method(n: usize) -> usize {
    n.saturating_mul(2)
}

fn single(method: Method, hits: Vec<Candidate>) -> RetrievalResponse {
    let contributing = if hits.is_empty() { Vec::new() } else { vec![method] };
    RetrievalResponse { hits: Hits::Single(hits), contributing, failures: Vec::new() }
}

/// Lexical scoring is CPU-bound, so it runs on the blocking pool.
async fn run_lexical(
    retriever: Arc<dyn LexicalRetriever>,
    snapshot: Arc<CorpusSnapshot>,
    query: String,
    n: usize,
) -> Result<Vec<Candidate>> {
    let method = retriever.method();
    tokio::task::spawn_blocking(move || retriever.retrieve(&snapshot, &query, n))
        .await
        .map_err(|e| Error::Operation(format!("{method} task failed: {e}")))?
}
