use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use toolseek_core::traits::EmbeddingProvider;
use toolseek_core::EmbedError;

use crate::device::select_device;
use crate::encode::encode_batch;
use crate::model_err;
use crate::pool::masked_mean_l2;

/// BGE-M3 (XLM-RoBERTa) run locally through candle.
///
/// Inference is blocking, so each batch runs on the tokio blocking pool.
pub struct LocalEmbedder {
    inner: Arc<LocalModel>,
    id: String,
}

struct LocalModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    dim: usize,
}

impl LocalEmbedder {
    pub fn load(model_dir: Option<&str>, dim: usize, max_len: usize) -> Result<Self, EmbedError> {
        let started = Instant::now();
        let device = select_device();
        let dir = resolve_model_dir(model_dir)?;
        info!(dir = %dir.display(), "loading embedding model");

        let tokenizer_path = dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            EmbedError::Permanent(format!("failed to load tokenizer from {}: {e}", tokenizer_path.display()))
        })?;

        let config_path = dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)
            .map_err(|e| EmbedError::Permanent(format!("failed to read {}: {e}", config_path.display())))?;
        let config: XLMRobertaConfig = serde_json::from_str(&raw_config)
            .map_err(|e| EmbedError::Permanent(format!("invalid model config {}: {e}", config_path.display())))?;

        let weights = load_weights(&dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb).map_err(model_err)?;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "embedding model loaded");

        let id = format!("local:{}", dir.file_name().and_then(|n| n.to_str()).unwrap_or("model"));
        Ok(Self { inner: Arc::new(LocalModel { model, tokenizer, device, max_len: max_len.max(1), dim }), id })
    }
}

impl LocalModel {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let started = Instant::now();
        let (input_ids, attention_mask) = encode_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like().map_err(model_err)?;
        let hidden = self
            .model
            .forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)
            .map_err(model_err)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask).map_err(model_err)?;
        let vectors: Vec<Vec<f32>> =
            pooled.to_device(&Device::Cpu).and_then(|t: Tensor| t.to_vec2()).map_err(model_err)?;
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(EmbedError::Permanent(format!("model produced {} dimensions, expected {}", v.len(), self.dim)));
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if elapsed_ms > 100 * texts.len() as u64 {
            warn!(elapsed_ms, batch = texts.len(), "slow embedding batch");
        } else {
            debug!(elapsed_ms, batch = texts.len(), "embedded batch");
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.inner.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inner = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || inner.embed_batch(&texts))
            .await
            .map_err(|e| EmbedError::Permanent(format!("embedding task failed: {e}")))?
    }
}

/// `model.safetensors` when present, otherwise the pickled `pytorch_model.bin`.
fn load_weights(dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>, EmbedError> {
    let safetensors = dir.join("model.safetensors");
    if safetensors.exists() {
        return candle_core::safetensors::load(&safetensors, device).map_err(model_err);
    }
    let pickle = dir.join("pytorch_model.bin");
    let tensors = candle_core::pickle::read_all(&pickle).map_err(model_err)?;
    Ok(tensors.into_iter().collect())
}

/// Configured directory first, then `APP_MODEL_DIR`, `MODEL_DIR` and `models/bge-m3`.
fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf, EmbedError> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(dir) = configured {
        candidates.push(toolseek_core::config::expand_path(dir));
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            candidates.push(PathBuf::from(dir));
        }
    }
    candidates.push(PathBuf::from("models/bge-m3"));
    candidates.push(PathBuf::from("../models/bge-m3"));
    candidates
        .into_iter()
        .find(|p| p.is_dir())
        .ok_or_else(|| EmbedError::Permanent("could not locate the BGE-M3 model directory".into()))
}
