use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Upper bound on chunk content length, in characters.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    /// Chunks shorter than this are dropped (near-empty fragments).
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
    /// Line overlap between consecutive windows in fallback chunking.
    #[serde(default = "default_overlap_lines")]
    pub overlap_lines: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            min_chunk_size: default_min_chunk_size(),
            overlap_lines: default_overlap_lines(),
        }
    }
}

fn default_max_chunk_size() -> usize {
    2000
}
fn default_min_chunk_size() -> usize {
    50
}
fn default_overlap_lines() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    /// Files larger than this are never chunked or embedded.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Extra path globs to exclude, on top of the built-in exclusions.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    512 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Number of files prepared per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Delay between file-preparation batches, milliseconds.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Delay between embedding API calls, milliseconds. Larger than the
    /// batch delay because the embedding API is the tighter rate limit.
    #[serde(default = "default_embed_delay_ms")]
    pub embed_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            embed_delay_ms: default_embed_delay_ms(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    10
}
fn default_batch_delay_ms() -> u64 {
    200
}
fn default_embed_delay_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// A full scan is skipped when the memory record is fresher than this,
    /// unless the caller forces a re-scan.
    #[serde(default = "default_freshness_hours")]
    pub freshness_hours: i64,
    /// How long an ingest lease is held before it is considered expired.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: i64,
    /// Branch label reported in scan summaries.
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            freshness_hours: default_freshness_hours(),
            lease_secs: default_lease_secs(),
            branch: default_branch(),
        }
    }
}

fn default_freshness_hours() -> i64 {
    24
}
fn default_lease_secs() -> i64 {
    15 * 60
}
fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_context_limit")]
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_context_limit(),
        }
    }
}

fn default_context_limit() -> usize {
    10
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_chunk_size == 0 {
        anyhow::bail!("chunking.max_chunk_size must be > 0");
    }
    if config.chunking.min_chunk_size >= config.chunking.max_chunk_size {
        anyhow::bail!("chunking.min_chunk_size must be < chunking.max_chunk_size");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Validate retrieval
    if config.retrieval.default_limit == 0 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }

    if config.scan.freshness_hours < 0 {
        anyhow::bail!("scan.freshness_hours must be >= 0");
    }

    Ok(config)
}
