use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Immutable application configuration, validated once at startup.
///
/// Every field's valid range is enforced in [`load_config`]; components can
/// assume the values they receive are sane.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub db: DbConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    pub renderer: RendererConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Source label recorded on every document (e.g. `"arxiv"`).
    #[serde(default = "default_source_type")]
    pub source_type: String,
    /// Atom query endpoint.
    #[serde(default = "default_source_endpoint")]
    pub endpoint: String,
    /// Default search query when none is given on the command line.
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// License recorded on documents when the feed carries none.
    #[serde(default)]
    pub default_license: Option<String>,
    /// When false, author lists are dropped from stored documents.
    #[serde(default = "default_true")]
    pub include_authors: bool,
}

fn default_source_type() -> String {
    "arxiv".to_string()
}
fn default_source_endpoint() -> String {
    "http://export.arxiv.org/api/query".to_string()
}
fn default_max_results() -> usize {
    25
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Directory holding raw artifacts, the catalog, and the processing log.
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens. Valid range: 512–4096.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between adjacent chunks as a fraction of `chunk_size`. 0 ≤ x < 1.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: f64,
    /// Treat markdown tables as atomic blocks.
    #[serde(default = "default_true")]
    pub preserve_tables: bool,
    /// Treat display equations as atomic blocks.
    #[serde(default = "default_true")]
    pub preserve_equations: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            preserve_tables: true,
            preserve_equations: true,
        }
    }
}

fn default_chunk_size() -> usize {
    1024
}
fn default_chunk_overlap() -> f64 {
    0.1
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    /// Case-insensitive heading patterns; a matching section is removed whole.
    #[serde(default = "default_exclude_sections")]
    pub exclude_sections: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exclude_sections: default_exclude_sections(),
        }
    }
}

fn default_exclude_sections() -> Vec<String> {
    vec![
        "references".to_string(),
        "bibliography".to_string(),
        "acknowledgment".to_string(),
        "acknowledgement".to_string(),
        "author contributions".to_string(),
        "collaboration".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct AcquisitionConfig {
    /// Maximum download attempts per document.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff delay; doubles on each retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_download_timeout(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_download_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RendererConfig {
    /// Base URL of the rendering service (`POST {endpoint}/render`).
    pub endpoint: String,
    #[serde(default = "default_render_timeout")]
    pub timeout_secs: u64,
}

fn default_render_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EncoderConfig {
    /// `"lexical"` (offline, deterministic) or `"openai"` (remote API).
    #[serde(default = "default_encoder_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Hard token limit of the embedding model. `chunk_size` must not exceed it.
    #[serde(default = "default_encoder_max_tokens")]
    pub max_tokens: usize,
    /// Chunks per embed call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_encoder_timeout")]
    pub timeout_secs: u64,
    /// Override for the remote embeddings endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            provider: default_encoder_provider(),
            model: None,
            dimension: default_dimension(),
            max_tokens: default_encoder_max_tokens(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_encoder_timeout(),
            endpoint: None,
        }
    }
}

fn default_encoder_provider() -> String {
    "lexical".to_string()
}
fn default_dimension() -> usize {
    384
}
fn default_encoder_max_tokens() -> usize {
    8192
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_encoder_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Documents processed in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Deadline covering render + chunk + encode for one document.
    #[serde(default = "default_deadline")]
    pub document_deadline_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            document_deadline_secs: default_deadline(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_deadline() -> u64 {
    300
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if !(512..=4096).contains(&config.chunking.chunk_size) {
        anyhow::bail!(
            "chunking.chunk_size must be in 512..=4096, got {}",
            config.chunking.chunk_size
        );
    }

    if !(0.0..1.0).contains(&config.chunking.chunk_overlap) {
        anyhow::bail!(
            "chunking.chunk_overlap must be in [0.0, 1.0), got {}",
            config.chunking.chunk_overlap
        );
    }

    if config.chunking.chunk_size > config.encoder.max_tokens {
        anyhow::bail!(
            "chunking.chunk_size ({}) must not exceed encoder.max_tokens ({})",
            config.chunking.chunk_size,
            config.encoder.max_tokens
        );
    }

    if config.acquisition.max_attempts == 0 {
        anyhow::bail!("acquisition.max_attempts must be >= 1");
    }

    if config.pipeline.concurrency == 0 {
        anyhow::bail!("pipeline.concurrency must be >= 1");
    }

    if config.encoder.batch_size == 0 {
        anyhow::bail!("encoder.batch_size must be >= 1");
    }

    match config.encoder.provider.as_str() {
        "lexical" | "openai" => {}
        other => anyhow::bail!(
            "Unknown encoder provider: '{}'. Must be lexical or openai.",
            other
        ),
    }

    if config.encoder.provider == "openai" && config.encoder.model.is_none() {
        anyhow::bail!("encoder.model must be specified when provider is 'openai'");
    }

    if config.encoder.dimension == 0 {
        anyhow::bail!("encoder.dimension must be > 0");
    }

    Ok(())
}
