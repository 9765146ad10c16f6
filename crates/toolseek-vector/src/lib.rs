//! Corpus stores and the dense retriever.

pub mod dense;
pub mod lance;
pub mod memory;
pub mod schema;
pub mod table;

use std::sync::Arc;

use toolseek_core::config::{expand_path, StoreSettings};
use toolseek_core::traits::CorpusStore;
use toolseek_core::{Error, Result};

pub use dense::DenseRetriever;
pub use lance::LanceCorpus;
pub use memory::MemoryCorpus;

/// Open the store named by `store.backend` (`memory` or `lancedb`).
pub async fn open_store(settings: &StoreSettings, dim: usize) -> Result<Arc<dyn CorpusStore>> {
    match settings.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryCorpus::new())),
        "lancedb" => Ok(Arc::new(LanceCorpus::open(&expand_path(&settings.path), dim).await?)),
        other => Err(Error::InvalidConfig(format!("unknown store backend '{other}'"))),
    }
}
