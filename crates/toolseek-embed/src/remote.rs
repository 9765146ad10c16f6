use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use toolseek_core::config::EmbedSettings;
use toolseek_core::traits::EmbeddingProvider;
use toolseek_core::EmbedError;

const BASE_BACKOFF_MS: u64 = 200;

/// Client for an OpenAI-compatible `POST {base_url}/embeddings` endpoint.
///
/// Timeouts, connection failures, 408, 429 and 5xx are transient and retried
/// with exponential backoff up to `max_retries` times. Anything else is permanent.
pub struct HttpEmbedder {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dim: usize,
    max_retries: u32,
    id: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(settings: &EmbedSettings) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(|e| EmbedError::Permanent(format!("failed to build http client: {e}")))?;
        let api_key = std::env::var(&settings.api_key_env).ok().filter(|k| !k.is_empty());
        Ok(Self {
            client,
            url: format!("{}/embeddings", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key,
            dim: settings.dim,
            max_retries: settings.max_retries,
            id: format!("http:{}", settings.model),
        })
    }

    async fn request_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut request = self.client.post(&self.url).json(&EmbeddingRequest { model: &self.model, input: texts });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Permanent(format!("malformed embedding response: {e}")))?;
        self.collect_vectors(parsed, texts.len())
    }

    fn collect_vectors(&self, parsed: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
        if parsed.data.len() != expected {
            return Err(EmbedError::Permanent(format!("expected {expected} embeddings, got {}", parsed.data.len())));
        }
        let mut items: Vec<(usize, Vec<f32>)> = parsed
            .data
            .into_iter()
            .enumerate()
            .map(|(pos, item)| (item.index.unwrap_or(pos), item.embedding))
            .collect();
        items.sort_by_key(|(index, _)| *index);
        let mut vectors = Vec::with_capacity(items.len());
        for (_, embedding) in items {
            if embedding.len() != self.dim {
                return Err(EmbedError::Permanent(format!(
                    "embedding has {} dimensions, expected {}",
                    embedding.len(),
                    self.dim
                )));
            }
            vectors.push(embedding);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut attempt = 0u32;
        loop {
            match self.request_once(texts).await {
                Ok(vectors) => {
                    debug!(batch = texts.len(), attempt, "remote embedding ok");
                    return Ok(vectors);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS << attempt.min(8));
                    warn!(error = %e, attempt, backoff_ms = backoff.as_millis() as u64, "retrying embedding request");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn classify_status(status: StatusCode, body: &str) -> EmbedError {
    let message = format!("embedding endpoint returned {status}: {}", body.trim());
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        EmbedError::Transient(message)
    } else {
        EmbedError::Permanent(message)
    }
}

fn classify_transport(e: reqwest::Error) -> EmbedError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        EmbedError::Transient(e.to_string())
    } else {
        EmbedError::Permanent(e.to_string())
    }
}
