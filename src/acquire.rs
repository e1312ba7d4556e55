//! Document acquisition: retrying download with integrity verification.
//!
//! A download is accepted only after three checks pass: HTTP success, byte
//! length against any server-declared size, and the structural signature of
//! the expected file type. Both SHA-256 and SHA-512 are computed over the
//! accepted bytes in a single pass — downstream integrity decisions must
//! never rest on one hash alone.

use sha2::{Digest, Sha256, Sha512};
use std::time::Duration;
use tracing::debug;

use crate::config::AcquisitionConfig;
use crate::error::PipelineError;
use crate::retry::{with_retry, RetryPolicy};

/// PDF structural signature. Anything else is rejected before rendering.
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Result of a verified download.
#[derive(Debug, Clone)]
pub struct Acquired {
    pub bytes: Vec<u8>,
    pub sha256: String,
    pub sha512: String,
}

pub struct Acquirer {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Acquirer {
    pub fn new(config: &AcquisitionConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::TransientNetwork(e.to_string()))?;

        Ok(Self {
            client,
            policy: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.base_delay_ms),
            ),
        })
    }

    /// Fetch `url` with retry/backoff, then validate and hash the bytes.
    ///
    /// Persistence is the caller's responsibility; this returns bytes and
    /// hashes only.
    pub async fn acquire(&self, url: &str) -> Result<Acquired, PipelineError> {
        let bytes = with_retry(&self.policy, "acquire", || self.fetch_once(url)).await?;

        if !bytes.starts_with(PDF_MAGIC) {
            return Err(PipelineError::ValidationFailed(format!(
                "{url}: response lacks a PDF signature"
            )));
        }

        let (sha256, sha512) = hash_pair(&bytes);
        debug!(url, len = bytes.len(), %sha256, "acquired document");

        Ok(Acquired {
            bytes,
            sha256,
            sha512,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();

        if status.as_u16() == 429 {
            return Err(PipelineError::RateLimited {
                retry_after: parse_retry_after(resp.headers()),
            });
        }
        if status.is_server_error() {
            return Err(PipelineError::TransientNetwork(format!(
                "{url}: HTTP {status}"
            )));
        }
        if !status.is_success() {
            // 4xx other than 429: the source says this artifact is not
            // fetchable; retrying will not change that.
            return Err(PipelineError::ValidationFailed(format!(
                "{url}: HTTP {status}"
            )));
        }

        let declared = resp.content_length();
        let body = resp.bytes().await?;

        if let Some(expected) = declared {
            if expected != body.len() as u64 {
                return Err(PipelineError::ValidationFailed(format!(
                    "{url}: declared {expected} bytes, received {}",
                    body.len()
                )));
            }
        }

        Ok(body.to_vec())
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// SHA-256 and SHA-512 over the same bytes in one pass.
pub fn hash_pair(bytes: &[u8]) -> (String, String) {
    let mut h256 = Sha256::new();
    let mut h512 = Sha512::new();
    for block in bytes.chunks(64 * 1024) {
        h256.update(block);
        h512.update(block);
    }
    (
        format!("{:x}", h256.finalize()),
        format!("{:x}", h512.finalize()),
    )
}
