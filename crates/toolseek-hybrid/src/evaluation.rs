//! Hit-rate evaluation over labelled queries.
//!
//! A labelled file pairs each `query` with the `tool` expected to come back.
//! JSON files hold an array of `{"query": .., "tool": ..}` objects; CSV files
//! need a header row naming the `query` and `tool` columns.

use std::fs;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use toolseek_core::types::RetrievalMethod;
use toolseek_core::{Error, Result};

use crate::service::{RetrievalRequest, RetrievalService};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelledQuery {
    pub query: String,
    /// Expected tool id; an empty label can never be hit.
    #[serde(default)]
    pub tool: String,
}

pub fn load_labelled(path: &Path) -> Result<Vec<LabelledQuery>> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    let cases: Vec<LabelledQuery> = match extension.as_deref() {
        Some("json") => {
            let raw = fs::read_to_string(path)
                .map_err(|e| Error::NotFound(format!("labelled queries {}: {e}", path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::InvalidRequest(format!("{} is not a query list: {e}", path.display())))?
        }
        Some("csv") => {
            let mut reader = csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .from_path(path)
                .map_err(|e| Error::NotFound(format!("labelled queries {}: {e}", path.display())))?;
            reader
                .deserialize::<LabelledQuery>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::InvalidRequest(format!("{}: {e}", path.display())))?
        }
        _ => return Err(Error::InvalidRequest(format!("{} must be a .json or .csv file", path.display()))),
    };
    let kept: Vec<LabelledQuery> = cases.into_iter().filter(|c| !c.query.trim().is_empty()).collect();
    debug!(path = %path.display(), queries = kept.len(), "loaded labelled queries");
    Ok(kept)
}

/// What one labelled query returned.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub query: String,
    pub expected: String,
    pub retrieved: Vec<String>,
    pub hit: bool,
    pub elapsed_ms: f64,
    /// Set when the retrieval call itself failed; the query counts as a miss.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub method: String,
    pub n_results: usize,
    pub outcomes: Vec<QueryOutcome>,
}

impl EvalReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn hits(&self) -> usize {
        self.outcomes.iter().filter(|o| o.hit).count()
    }

    /// Fraction of queries whose expected tool was in the top `n_results`; 0 for no queries.
    pub fn hit_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.hits() as f64 / self.total() as f64
    }

    pub fn mean_latency_ms(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.outcomes.iter().map(|o| o.elapsed_ms).sum::<f64>() / self.total() as f64
    }

    pub fn max_latency_ms(&self) -> f64 {
        self.outcomes.iter().map(|o| o.elapsed_ms).fold(0.0, f64::max)
    }
}

/// Run every case through `service`, calling `on_outcome` after each one.
pub async fn evaluate<F>(
    service: &RetrievalService,
    cases: &[LabelledQuery],
    method: RetrievalMethod,
    n_results: usize,
    mut on_outcome: F,
) -> Result<EvalReport>
where
    F: FnMut(&QueryOutcome),
{
    if n_results == 0 {
        return Err(Error::InvalidRequest("n_results must be positive".into()));
    }
    let mut outcomes = Vec::with_capacity(cases.len());
    for case in cases {
        let request = RetrievalRequest::new(case.query.clone(), method, n_results);
        let started = Instant::now();
        let result = service.retrieve(&request).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let outcome = match result {
            Ok(response) => {
                let retrieved: Vec<String> = response.hits.tool_ids().into_iter().map(String::from).collect();
                let hit = !case.tool.is_empty() && retrieved.iter().any(|t| *t == case.tool);
                QueryOutcome {
                    query: case.query.clone(),
                    expected: case.tool.clone(),
                    retrieved,
                    hit,
                    elapsed_ms,
                    error: None,
                }
            }
            Err(e) => {
                warn!(query = %case.query, error = %e, "evaluation query failed");
                QueryOutcome {
                    query: case.query.clone(),
                    expected: case.tool.clone(),
                    retrieved: Vec::new(),
                    hit: false,
                    elapsed_ms,
                    error: Some(e.to_string()),
                }
            }
        };
        on_outcome(&outcome);
        outcomes.push(outcome);
    }
    Ok(EvalReport { method: method.to_string(), n_results, outcomes })
}
