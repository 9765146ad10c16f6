//! Combining per-method ranked lists into one ranking.
//!
//! `weighted` and `adaptive` sum weighted normalized scores; `rank_fusion`
//! is reciprocal rank fusion, `score = Σ 1/(k + rank)` with `k = 60`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use toolseek_core::dedup::dedup_by_tool;
use toolseek_core::types::{Candidate, FusedCandidate, Method};
use toolseek_core::{Error, Result};

/// Smoothing constant for reciprocal rank fusion.
pub const RRF_K: f32 = 60.0;

/// Exponent applied to normalized scores by the adaptive strategy.
pub const ADAPTIVE_EXPONENT: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    Weighted,
    Adaptive,
    RankFusion,
}

impl FusionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weighted => "weighted",
            Self::Adaptive => "adaptive",
            Self::RankFusion => "rank_fusion",
        }
    }
}

impl fmt::Display for FusionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FusionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weighted" => Ok(Self::Weighted),
            "adaptive" => Ok(Self::Adaptive),
            "rank_fusion" | "rrf" => Ok(Self::RankFusion),
            other => Err(Error::UnsupportedStrategy(other.to_string())),
        }
    }
}

/// Per-method weights summing to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MethodWeights {
    pub dense: f32,
    pub sparse: f32,
    pub keyword: f32,
}

impl Default for MethodWeights {
    fn default() -> Self {
        Self { dense: 0.4, sparse: 0.3, keyword: 0.3 }
    }
}

impl MethodWeights {
    /// Short queries lean lexical, long ones lean dense.
    pub fn for_query(query: &str) -> Self {
        match query.chars().count() {
            len if len < 10 => Self { dense: 0.3, sparse: 0.4, keyword: 0.3 },
            len if len < 30 => Self { dense: 0.4, sparse: 0.3, keyword: 0.3 },
            _ => Self { dense: 0.5, sparse: 0.2, keyword: 0.3 },
        }
    }

    /// Caller-supplied weights, rescaled to sum to 1. Methods not named get 0.
    pub fn from_explicit(weights: &HashMap<Method, f32>) -> Result<Self> {
        if let Some((m, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(Error::InvalidWeights(format!("weight for {m} must be a non-negative number, got {w}")));
        }
        let total: f32 = weights.values().sum();
        if total <= 0.0 {
            return Err(Error::InvalidWeights("weights must not all be zero".into()));
        }
        let get = |m: Method| weights.get(&m).copied().unwrap_or(0.0) / total;
        Ok(Self { dense: get(Method::Dense), sparse: get(Method::Sparse), keyword: get(Method::Keyword) })
    }

    pub fn get(&self, method: Method) -> f32 {
        match method {
            Method::Dense => self.dense,
            Method::Sparse => self.sparse,
            Method::Keyword => self.keyword,
        }
    }
}

/// Fuse the lists of the methods that ran into at most `n` candidates.
///
/// Each input list must already be deduplicated and ordered best first.
/// A method missing from `results` contributes exactly as a method that
/// returned nothing.
pub fn fuse(
    results: &BTreeMap<Method, Vec<Candidate>>,
    strategy: FusionStrategy,
    query: &str,
    weights: Option<&HashMap<Method, f32>>,
    n: usize,
) -> Result<Vec<FusedCandidate>> {
    let mut fused = collect_tools(results);
    match strategy {
        FusionStrategy::Weighted | FusionStrategy::Adaptive => {
            let w = match (weights, strategy) {
                (Some(explicit), _) => MethodWeights::from_explicit(explicit)?,
                (None, FusionStrategy::Adaptive) => MethodWeights::for_query(query),
                (None, _) => MethodWeights::default(),
            };
            let exponent = if strategy == FusionStrategy::Adaptive { ADAPTIVE_EXPONENT } else { 1.0 };
            for candidate in &mut fused {
                candidate.fused_score = candidate
                    .breakdown
                    .iter()
                    .map(|(m, score)| w.get(*m) * score.normalized().powf(exponent))
                    .sum();
            }
        }
        FusionStrategy::RankFusion => {
            let ranks: Vec<(usize, HashMap<&str, usize>)> = results
                .values()
                .map(|list| (list.len(), list.iter().enumerate().map(|(i, c)| (c.tool_id.as_str(), i + 1)).collect()))
                .collect();
            for candidate in &mut fused {
                candidate.fused_score = ranks
                    .iter()
                    .map(|(len, by_tool)| match by_tool.get(candidate.tool_id.as_str()) {
                        Some(rank) => 1.0 / (*rank as f32 + RRF_K),
                        None => 1.0 / (*len as f32 + RRF_K + 1.0),
                    })
                    .sum();
            }
        }
    }
    Ok(dedup_by_tool(fused, n))
}

/// One entry per tool seen by any method, text and metadata taken from the
/// first method (dense, sparse, keyword order) that returned it.
fn collect_tools(results: &BTreeMap<Method, Vec<Candidate>>) -> Vec<FusedCandidate> {
    let mut order: HashMap<&str, usize> = HashMap::new();
    let mut fused: Vec<FusedCandidate> = Vec::new();
    for (method, list) in results {
        for c in list {
            let slot = *order.entry(c.tool_id.as_str()).or_insert_with(|| {
                fused.push(FusedCandidate {
                    tool_id: c.tool_id.clone(),
                    fused_score: 0.0,
                    breakdown: BTreeMap::new(),
                    text: c.text.clone(),
                    metadata: c.metadata.clone(),
                });
                fused.len() - 1
            });
            fused[slot].breakdown.entry(*method).or_insert(c.score);
        }
    }
    fused
}
