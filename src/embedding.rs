//! Embedding provider abstraction and the OpenAI implementation.
//!
//! Defines the [`EmbeddingProvider`] trait consumed by the knowledge base
//! cache (batch embedding at build time) and the query pipeline (single
//! embedding per request), plus [`cosine_similarity`] for the ranker.
//!
//! # Retry Strategy
//!
//! The OpenAI provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Turns text into fixed-dimension vectors, singly or in batch.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed a single query text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embedding provider backed by the OpenAI embeddings API.
///
/// Calls `POST /v1/embeddings` with the configured model. Construction
/// fails fast if `OPENAI_API_KEY` is not set, so a missing credential is
/// reported before any request is attempted.
pub struct OpenAIEmbeddings {
    model: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }

    /// Call the embeddings endpoint with retry/backoff.
    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_embeddings_response(&json, texts.len());
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "OpenAI API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.request(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}

/// Parse the embeddings API response, restoring input order via the
/// per-item `index` field.
fn parse_embeddings_response(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    if data.len() != expected {
        bail!(
            "Invalid OpenAI response: {} embeddings for {} inputs",
            data.len(),
            expected
        );
    }

    let mut indexed = Vec::with_capacity(data.len());

    for item in data {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing index"))?;

        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or
/// zero-magnitude vectors — the undefined cases rank lowest instead of
/// failing the request.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
