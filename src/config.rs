//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to defaults, so
//! a minimal config is just:
//!
//! ```toml
//! [db]
//! path = "./data/tlh.sqlite"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use telecom_harness_core::capture::AnomalyThresholds;
use telecom_harness_core::segment::DEFAULT_MAX_CHUNK_BYTES;
use telecom_harness_core::service::DEFAULT_DIMS;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub segmenting: SegmentingConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub anomaly: AnomalyThresholds,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SegmentingConfig {
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
}

impl Default for SegmentingConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
        }
    }
}

fn default_max_chunk_bytes() -> usize {
    DEFAULT_MAX_CHUNK_BYTES
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_completion_model")]
    pub completion_model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
    #[serde(default = "default_completion_timeout_secs")]
    pub completion_timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    /// Environment variable holding a bearer token, if the server wants one.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            completion_model: default_completion_model(),
            dims: default_dims(),
            embed_timeout_secs: default_embed_timeout_secs(),
            completion_timeout_secs: default_completion_timeout_secs(),
            max_retries: 0,
            api_key_env: None,
        }
    }
}

fn default_mode() -> String {
    "offline".to_string()
}
fn default_base_url() -> String {
    "http://localhost:8080/v1".to_string()
}
fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}
fn default_completion_model() -> String {
    "mistral-7b-v0.1".to_string()
}
fn default_dims() -> usize {
    DEFAULT_DIMS
}
fn default_embed_timeout_secs() -> u64 {
    10
}
fn default_completion_timeout_secs() -> u64 {
    30
}

impl ServicesConfig {
    pub fn is_live(&self) -> bool {
        self.mode == "live"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_upsert_timeout_secs")]
    pub upsert_timeout_secs: u64,
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            upsert_timeout_secs: default_upsert_timeout_secs(),
            search_timeout_secs: default_search_timeout_secs(),
            top_k: default_top_k(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_upsert_timeout_secs() -> u64 {
    10
}
fn default_search_timeout_secs() -> u64 {
    10
}
fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Chunk embeddings in flight at once within one run.
    #[serde(default = "default_embed_concurrency")]
    pub embed_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            embed_concurrency: default_embed_concurrency(),
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_embed_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.log".to_string(),
        "**/*.txt".to_string(),
        "**/*.pcap".to_string(),
        "**/*.pcapng".to_string(),
    ]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.segmenting.max_chunk_bytes == 0 {
        anyhow::bail!("segmenting.max_chunk_bytes must be > 0");
    }

    if config.pipeline.workers == 0 {
        anyhow::bail!("pipeline.workers must be >= 1");
    }

    if config.pipeline.embed_concurrency == 0 {
        anyhow::bail!("pipeline.embed_concurrency must be >= 1");
    }

    if config.vector_store.top_k == 0 {
        anyhow::bail!("vector_store.top_k must be >= 1");
    }

    match config.services.mode.as_str() {
        "offline" | "live" => {}
        other => anyhow::bail!(
            "Unknown services mode: '{}'. Must be offline or live.",
            other
        ),
    }

    if config.services.dims == 0 {
        anyhow::bail!("services.dims must be > 0");
    }

    if config.services.is_live() && config.services.base_url.trim().is_empty() {
        anyhow::bail!("services.base_url must be set when mode is 'live'");
    }

    match config.vector_store.backend.as_str() {
        "sqlite" | "memory" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown vector store backend: '{}'. Must be sqlite, memory, or disabled.",
            other
        ),
    }

    let t = &config.anomaly;
    if t.syn_ratio_high < t.syn_ratio_medium {
        anyhow::bail!("anomaly.syn_ratio_high must be >= anomaly.syn_ratio_medium");
    }
    if t.icmp_share_high < t.icmp_share_medium {
        anyhow::bail!("anomaly.icmp_share_high must be >= anomaly.icmp_share_medium");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"x.sqlite\"\n").unwrap();
        assert_eq!(config.segmenting.max_chunk_bytes, 512);
        assert_eq!(config.services.mode, "offline");
        assert_eq!(config.services.dims, 384);
        assert_eq!(config.services.embed_timeout_secs, 10);
        assert_eq!(config.vector_store.backend, "sqlite");
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.pipeline.embed_concurrency, 4);
        assert_eq!(config.vector_store.search_timeout_secs, 10);
        assert_eq!(config.anomaly, AnomalyThresholds::default());
    }

    #[test]
    fn test_anomaly_overrides_merge_with_defaults() {
        let config = parse(
            "[db]\npath = \"x.sqlite\"\n[anomaly]\nsyn_min_count = 20\n",
        )
        .unwrap();
        assert_eq!(config.anomaly.syn_min_count, 20);
        assert_eq!(config.anomaly.syn_ratio_high, 10.0);
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let err = parse("[db]\npath = \"x\"\n[services]\nmode = \"mock\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown services mode"));
    }

    #[test]
    fn test_rejects_unknown_backend() {
        assert!(parse("[db]\npath = \"x\"\n[vector_store]\nbackend = \"qdrant\"\n").is_err());
    }

    #[test]
    fn test_rejects_zero_chunk_size_and_workers() {
        assert!(parse("[db]\npath = \"x\"\n[segmenting]\nmax_chunk_bytes = 0\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[pipeline]\nworkers = 0\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[pipeline]\nembed_concurrency = 0\n").is_err());
    }

    #[test]
    fn test_embed_concurrency_is_independent_of_workers() {
        let config = parse(
            "[db]\npath = \"x\"\n[pipeline]\nworkers = 1\nembed_concurrency = 8\n",
        )
        .unwrap();
        assert_eq!(config.pipeline.workers, 1);
        assert_eq!(config.pipeline.embed_concurrency, 8);
    }
}
