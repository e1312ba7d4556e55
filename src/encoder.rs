//! Embedding providers behind a single trait.
//!
//! The `lexical` provider is offline and deterministic (feature-hashed bag of
//! tokens, L2-normalized), suitable for tests and air-gapped runs. The
//! `openai` provider calls the embeddings API with retry and backoff. Both
//! expose the tokenizer-side counts the chunker budgets against.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EncoderConfig;
use crate::error::PipelineError;
use crate::retry::{with_retry, RetryPolicy};

#[async_trait]
pub trait Encoder: Send + Sync {
    /// Width of every vector this encoder produces.
    fn dimension(&self) -> usize;

    /// Hard per-text token limit.
    fn max_tokens(&self) -> usize;

    /// Token counts for `texts`, in order. Must agree with the tokenization
    /// `embed` applies, so chunk budgets hold at encode time.
    async fn token_counts(&self, texts: &[String]) -> Result<Vec<usize>, PipelineError>;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;
}

pub fn create_encoder(config: &EncoderConfig) -> Result<Arc<dyn Encoder>, PipelineError> {
    match config.provider.as_str() {
        "lexical" => Ok(Arc::new(LexicalEncoder::new(
            config.dimension,
            config.max_tokens,
        ))),
        "openai" => Ok(Arc::new(RemoteEncoder::new(config)?)),
        other => Err(PipelineError::Encoder(format!(
            "unknown encoder provider: {other}"
        ))),
    }
}

/// Offline encoder: hash each token into a fixed-width vector with a sign
/// bit, then normalize. Identical text always embeds identically.
pub struct LexicalEncoder {
    dimension: usize,
    max_tokens: usize,
}

impl LexicalEncoder {
    pub fn new(dimension: usize, max_tokens: usize) -> Self {
        Self {
            dimension,
            max_tokens,
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dimension as u64) as usize;
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Encoder for LexicalEncoder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    async fn token_counts(&self, texts: &[String]) -> Result<Vec<usize>, PipelineError> {
        Ok(texts.iter().map(|t| tokenize(t).count()).collect())
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Token stream: maximal alphanumeric runs plus single punctuation marks.
/// Whitespace separates, never counts.
fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (i, ch) in text.char_indices() {
        if ch.is_alphanumeric() {
            if start.is_none() {
                start = Some(i);
            }
        } else {
            if let Some(s) = start.take() {
                tokens.push(&text[s..i]);
            }
            if !ch.is_whitespace() {
                tokens.push(&text[i..i + ch.len_utf8()]);
            }
        }
    }
    if let Some(s) = start {
        tokens.push(&text[s..]);
    }
    tokens.into_iter()
}

/// OpenAI-compatible embeddings client.
pub struct RemoteEncoder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
    max_tokens: usize,
    policy: RetryPolicy,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl RemoteEncoder {
    pub fn new(config: &EncoderConfig) -> Result<Self, PipelineError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            PipelineError::Encoder("OPENAI_API_KEY not set for the openai provider".into())
        })?;

        let model = config
            .model
            .clone()
            .ok_or_else(|| PipelineError::Encoder("encoder.model is required".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Encoder(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/embeddings".to_string()),
            api_key,
            model,
            dimension: config.dimension,
            max_tokens: config.max_tokens,
            policy: RetryPolicy::new(config.max_retries, Duration::from_millis(500)),
        })
    }

    async fn embed_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| PipelineError::Encoder(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(PipelineError::RateLimited { retry_after: None });
        }
        if status.is_server_error() {
            return Err(PipelineError::Encoder(format!(
                "embeddings API returned HTTP {status}"
            )));
        }
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(PipelineError::ValidationFailed(format!(
                "embeddings API rejected request: HTTP {status}: {detail}"
            )));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Encoder(format!("invalid embeddings response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(PipelineError::Encoder(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        let mut ordered = parsed.data;
        ordered.sort_by_key(|d| d.index);
        Ok(ordered.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Encoder for RemoteEncoder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    async fn token_counts(&self, texts: &[String]) -> Result<Vec<usize>, PipelineError> {
        // Standard approximation for BPE vocabularies: ~4 chars per token.
        Ok(texts
            .iter()
            .map(|t| (t.chars().count() / 4).max(1))
            .collect())
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        with_retry(&self.policy, "embed", || self.embed_once(texts)).await
    }
}
