//! Domain types used by the stores, the retrievers and the fusion engine.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub type ToolId = String;
pub type Meta = HashMap<String, serde_json::Value>;

/// The two logical collections held by a corpus store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Descriptors,
    HypotheticalQueries,
}

impl Collection {
    pub const ALL: [Self; 2] = [Self::Descriptors, Self::HypotheticalQueries];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Descriptors => "descriptors",
            Self::HypotheticalQueries => "hypothetical_queries",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability descriptor as registered by callers.
///
/// Unknown top-level fields are kept in `extra` and survive serialisation,
/// so the stored document text is the full descriptor JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self { name: name.into(), description: description.into(), parameters, extra: serde_json::Map::new() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidDescriptor("name must not be empty".into()));
        }
        if self.description.trim().is_empty() {
            return Err(Error::InvalidDescriptor(format!("'{}' has an empty description", self.name)));
        }
        if !self.parameters.is_object() {
            return Err(Error::InvalidDescriptor(format!("'{}' parameters must be a JSON object", self.name)));
        }
        Ok(())
    }

    /// Compact JSON used as the unit of embedding and tokenization.
    pub fn to_document_text(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidDescriptor(format!("'{}': {e}", self.name)))
    }
}

/// A stored document: one descriptor or one block of hypothetical queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub id: ToolId,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Meta,
}

impl CorpusDocument {
    pub fn new(id: impl Into<ToolId>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self { id: id.into(), text: text.into(), embedding, metadata: Meta::new() }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Meta) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Both collections read once; immutable for the duration of a retrieval call.
#[derive(Debug, Clone, Default)]
pub struct CorpusSnapshot {
    pub descriptors: Vec<CorpusDocument>,
    pub hypothetical_queries: Vec<CorpusDocument>,
}

impl CorpusSnapshot {
    pub fn len(&self) -> usize {
        self.descriptors.len() + self.hypothetical_queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Descriptors first, then hypothetical queries.
    pub fn iter(&self) -> impl Iterator<Item = (Collection, &CorpusDocument)> {
        self.descriptors
            .iter()
            .map(|d| (Collection::Descriptors, d))
            .chain(self.hypothetical_queries.iter().map(|d| (Collection::HypotheticalQueries, d)))
    }
}

/// One of the three independent retrieval methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Dense,
    Sparse,
    Keyword,
}

impl Method {
    pub const ALL: [Self; 3] = [Self::Dense, Self::Sparse, Self::Keyword];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
            Self::Keyword => "keyword",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense" => Ok(Self::Dense),
            "sparse" => Ok(Self::Sparse),
            "keyword" => Ok(Self::Keyword),
            other => Err(Error::UnsupportedMethod(other.to_string())),
        }
    }
}

/// What a caller may ask for: one method, or all three fused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMethod {
    Single(Method),
    Hybrid,
}

impl FromStr for RetrievalMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("hybrid") {
            return Ok(Self::Hybrid);
        }
        s.parse::<Method>().map(Self::Single)
    }
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(m) => write!(f, "{m}"),
            Self::Hybrid => f.write_str("hybrid"),
        }
    }
}

/// A score tagged with the scale that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Score {
    /// Cosine similarity in `[-1, 1]`.
    Dense { similarity: f32 },
    /// Raw BM25 in `[0, inf)` plus its share of the best raw score in the same result set.
    Sparse { raw: f32, normalized: f32 },
    /// TF-IDF cosine similarity in `[0, 1]`.
    Keyword { similarity: f32 },
}

impl Score {
    pub fn method(&self) -> Method {
        match self {
            Self::Dense { .. } => Method::Dense,
            Self::Sparse { .. } => Method::Sparse,
            Self::Keyword { .. } => Method::Keyword,
        }
    }

    pub fn raw(&self) -> f32 {
        match *self {
            Self::Dense { similarity } | Self::Keyword { similarity } => similarity,
            Self::Sparse { raw, .. } => raw,
        }
    }

    /// The score on a common `[0, 1]` scale.
    pub fn normalized(&self) -> f32 {
        match *self {
            Self::Dense { similarity } | Self::Keyword { similarity } => similarity.clamp(0.0, 1.0),
            Self::Sparse { normalized, .. } => normalized,
        }
    }
}

/// A single-method hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub tool_id: ToolId,
    pub score: Score,
    pub source: Collection,
    pub text: String,
    pub metadata: Meta,
}

/// A hit after fusion, with the per-method scores it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedCandidate {
    pub tool_id: ToolId,
    pub fused_score: f32,
    pub breakdown: BTreeMap<Method, Score>,
    pub text: String,
    pub metadata: Meta,
}

impl FusedCandidate {
    pub fn normalized_scores(&self) -> BTreeMap<Method, f32> {
        self.breakdown.iter().map(|(m, s)| (*m, s.normalized())).collect()
    }

    pub fn raw_scores(&self) -> BTreeMap<Method, f32> {
        self.breakdown.iter().map(|(m, s)| (*m, s.raw())).collect()
    }
}

/// Common surface of every returned hit.
pub trait Ranked {
    fn tool_id(&self) -> &str;
    /// The value a list of these is ordered by.
    fn rank_score(&self) -> f32;
    fn metadata(&self) -> &Meta;
}

impl Ranked for Candidate {
    fn tool_id(&self) -> &str {
        &self.tool_id
    }

    fn rank_score(&self) -> f32 {
        self.score.raw()
    }

    fn metadata(&self) -> &Meta {
        &self.metadata
    }
}

impl Ranked for FusedCandidate {
    fn tool_id(&self) -> &str {
        &self.tool_id
    }

    fn rank_score(&self) -> f32 {
        self.fused_score
    }

    fn metadata(&self) -> &Meta {
        &self.metadata
    }
}
