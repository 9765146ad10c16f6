//! toolseek-core
//!
//! Shared vocabulary for the toolseek crates: corpus and hit types, the error
//! enum, the embedding/corpus collaborator traits, the deduplicator and the
//! configuration loader.

pub mod catalog;
pub mod config;
pub mod dedup;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{EmbedError, Error, Result};
