//! Rendering seam: raw document bytes to structured markdown.
//!
//! The conversion itself runs in an external service; this module owns the
//! HTTP contract with it and nothing else. The trait exists so tests can
//! substitute a canned renderer without a network.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::RendererConfig;
use crate::error::PipelineError;

/// Output of a successful render: markdown plus any non-fatal warnings the
/// service reported (unparsed regions, dropped figures).
#[derive(Debug, Clone)]
pub struct Rendered {
    pub markdown: String,
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, bytes: &[u8], source_type: &str) -> Result<Rendered, PipelineError>;
}

pub struct HttpRenderer {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct RenderResponse {
    markdown: String,
    #[serde(default)]
    warnings: Vec<String>,
}

impl HttpRenderer {
    pub fn new(config: &RendererConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Render(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, bytes: &[u8], source_type: &str) -> Result<Rendered, PipelineError> {
        let url = format!("{}/render?source_type={}", self.base_url, source_type);

        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| PipelineError::Render(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Render(format!(
                "renderer returned HTTP {status}: {detail}"
            )));
        }

        let parsed: RenderResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Render(format!("invalid renderer response: {e}")))?;

        if parsed.markdown.trim().is_empty() {
            return Err(PipelineError::Render("renderer produced no text".into()));
        }

        debug!(
            len = parsed.markdown.len(),
            warnings = parsed.warnings.len(),
            "render complete"
        );
        Ok(Rendered {
            markdown: parsed.markdown,
            warnings: parsed.warnings,
        })
    }
}
