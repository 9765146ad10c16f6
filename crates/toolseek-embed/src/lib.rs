//! Embedding providers: a deterministic hashing embedder, local BGE-M3 on
//! candle, and an OpenAI-compatible HTTP client.

pub mod device;
pub mod encode;
pub mod hashing;
pub mod local;
pub mod pool;
pub mod remote;

use std::sync::Arc;

use tracing::info;

use toolseek_core::config::EmbedSettings;
use toolseek_core::traits::EmbeddingProvider;
use toolseek_core::EmbedError;

pub use hashing::HashEmbedder;
pub use local::LocalEmbedder;
pub use pool::masked_mean_l2;
pub use remote::HttpEmbedder;

pub(crate) fn model_err(e: impl std::fmt::Display) -> EmbedError {
    EmbedError::Permanent(e.to_string())
}

/// Build the provider named by `embed.provider` (`hash`, `local` or `http`).
///
/// `APP_USE_FAKE_EMBEDDINGS=1` forces the hashing embedder regardless.
pub fn embedder_from_settings(settings: &EmbedSettings) -> Result<Arc<dyn EmbeddingProvider>, EmbedError> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let provider = if use_fake { "hash" } else { settings.provider.as_str() };
    info!(provider, dim = settings.dim, "selecting embedding provider");
    match provider {
        "hash" => Ok(Arc::new(HashEmbedder::new(settings.dim))),
        "local" => Ok(Arc::new(LocalEmbedder::load(settings.model_dir.as_deref(), settings.dim, settings.max_len)?)),
        "http" => Ok(Arc::new(HttpEmbedder::new(settings)?)),
        other => Err(EmbedError::Permanent(format!("unknown embedding provider '{other}'"))),
    }
}
