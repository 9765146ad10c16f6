//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`APP_RETRIEVAL__EMBED_TIMEOUT_MS=500` sets `retrieval.embed_timeout_ms`).
//! Each section has serde defaults, so an empty configuration is valid.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Load from the current directory, picking the environment from `RUST_ENV`.
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    pub fn load_from(dir: &Path, env_name: &str) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config = Self { figment };
        config.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment.extract_inner(key).map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// A typed section, or its defaults when the section is absent.
    pub fn section<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if self.figment.contains(key) { self.get(key) } else { Ok(T::default()) }
    }

    pub fn retrieval(&self) -> Result<RetrievalSettings> {
        self.section("retrieval")
    }

    pub fn embed(&self) -> Result<EmbedSettings> {
        self.section("embed")
    }

    pub fn store(&self) -> Result<StoreSettings> {
        self.section("store")
    }

    fn validate(&self) -> Result<()> {
        let retrieval = self.retrieval()?;
        if retrieval.default_n_results == 0 {
            return Err(Error::InvalidConfig("retrieval.default_n_results must be positive".into()));
        }
        if !(retrieval.sparse_epsilon.is_finite() && retrieval.sparse_epsilon > 0.0) {
            return Err(Error::InvalidConfig("retrieval.sparse_epsilon must be a positive number".into()));
        }
        let embed = self.embed()?;
        if embed.dim == 0 {
            return Err(Error::InvalidConfig("embed.dim must be positive".into()));
        }
        Ok(())
    }
}

/// `[retrieval]`: knobs for the retrieval service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub default_n_results: usize,
    pub embed_timeout_ms: u64,
    pub sparse_epsilon: f32,
    /// `weighted`, `adaptive` or `rank_fusion`. Plain hybrid calls use rank fusion.
    pub default_strategy: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_n_results: 5,
            embed_timeout_ms: 10_000,
            sparse_epsilon: 1e-6,
            default_strategy: "rank_fusion".into(),
        }
    }
}

/// `[embed]`: which embedding provider to build and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedSettings {
    /// `hash`, `local` or `http`.
    pub provider: String,
    pub dim: usize,
    pub max_len: usize,
    pub model_dir: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for EmbedSettings {
    fn default() -> Self {
        Self {
            provider: "hash".into(),
            dim: 1024,
            max_len: 256,
            model_dir: None,
            base_url: "http://localhost:8080/v1".into(),
            model: "bge-m3".into(),
            api_key_env: "EMBEDDING_API_KEY".into(),
            request_timeout_ms: 30_000,
            max_retries: 2,
        }
    }
}

/// `[store]`: where the corpus lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// `memory` or `lancedb`.
    pub backend: String,
    pub path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { backend: "lancedb".into(), path: "~/.toolseek/lancedb".into() }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
