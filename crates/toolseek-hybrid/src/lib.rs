//! Hybrid retrieval: fusion of the dense, sparse and keyword retrievers,
//! the query service, the tool registry that maintains the corpus, and
//! hit-rate evaluation over labelled queries.

pub mod evaluation;
pub mod fusion;
pub mod registry;
pub mod service;

pub use evaluation::{evaluate, load_labelled, EvalReport, LabelledQuery, QueryOutcome};
pub use fusion::{fuse, FusionStrategy, MethodWeights};
pub use registry::{IngestSummary, ToolEntry, ToolRegistry};
pub use service::{Hits, RetrievalRequest, RetrievalResponse, RetrievalService};
