//! TOML configuration.
//!
//! Every section has serde defaults, so an empty file yields a working
//! configuration against a local engine. [`load_config`] validates the
//! cross-field constraints after parsing.
//!
//! ```toml
//! [engine]
//! host = "vespa.internal"
//! deployment_zip = "./deploy/app.zip"
//!
//! [mutation]
//! num_threads = 16
//!
//! [retrieval]
//! hybrid_alpha = 0.62
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub mutation: MutationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_tenant_port")]
    pub tenant_port: u16,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default)]
    pub deployment_zip: Option<PathBuf>,
    /// Client-side HTTP timeout for uploading the application package.
    #[serde(default = "default_deploy_timeout")]
    pub deploy_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tenant_port: default_tenant_port(),
            index_name: default_index_name(),
            deployment_zip: None,
            deploy_timeout_secs: default_deploy_timeout(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    8081
}
fn default_tenant_port() -> u16 {
    19071
}
fn default_index_name() -> String {
    "danswer_chunk".to_string()
}
fn default_deploy_timeout() -> u64 {
    60
}

impl EngineConfig {
    /// Point operations on chunk documents: `{endpoint}/{chunk uuid}`.
    pub fn document_endpoint(&self) -> String {
        format!(
            "http://{}:{}/document/v1/default/{}/docid",
            self.host, self.port, self.index_name
        )
    }

    pub fn search_endpoint(&self) -> String {
        format!("http://{}:{}/search/", self.host, self.port)
    }

    pub fn application_endpoint(&self) -> String {
        format!("http://{}:{}/application/v2", self.host, self.tenant_port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MutationConfig {
    /// Items per batch for existence checks, deletes, inserts, and updates.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Worker pool size. The index has no bulk write API, so writes fan out.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    #[serde(default = "default_mutation_timeout")]
    pub timeout_secs: u64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            num_threads: default_num_threads(),
            timeout_secs: default_mutation_timeout(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}
fn default_num_threads() -> usize {
    16
}
fn default_mutation_timeout() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Engine-side budget for ranked queries.
    #[serde(default = "default_engine_timeout")]
    pub engine_timeout: String,
    /// Engine-side budget for chunk-id scans.
    #[serde(default = "default_id_scan_timeout")]
    pub id_scan_timeout: String,
    /// Client-side HTTP timeout for search requests.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_doc_time_decay")]
    pub doc_time_decay: f64,
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_num_returned_hits")]
    pub num_returned_hits: usize,
    #[serde(default = "default_true")]
    pub edit_keyword_query: bool,
    #[serde(default)]
    pub log_timing: bool,
    /// Minimum nearest-neighbor candidates for hybrid queries.
    #[serde(default = "default_hybrid_target_hits_floor")]
    pub hybrid_target_hits_floor: usize,
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            engine_timeout: default_engine_timeout(),
            id_scan_timeout: default_id_scan_timeout(),
            query_timeout_secs: default_query_timeout(),
            doc_time_decay: default_doc_time_decay(),
            hybrid_alpha: default_hybrid_alpha(),
            num_returned_hits: default_num_returned_hits(),
            edit_keyword_query: true,
            log_timing: false,
            hybrid_target_hits_floor: default_hybrid_target_hits_floor(),
            summary_max_chars: default_summary_max_chars(),
        }
    }
}

fn default_engine_timeout() -> String {
    "3s".to_string()
}
fn default_id_scan_timeout() -> String {
    "10s".to_string()
}
fn default_query_timeout() -> u64 {
    10
}
fn default_doc_time_decay() -> f64 {
    0.5
}
fn default_hybrid_alpha() -> f64 {
    0.62
}
fn default_num_returned_hits() -> usize {
    50
}
fn default_true() -> bool {
    true
}
fn default_hybrid_target_hits_floor() -> usize {
    1000
}
fn default_summary_max_chars() -> usize {
    docindex_core::summary::DEFAULT_MAX_SUMMARY_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff: default_backoff(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_backoff() -> f64 {
    2.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            endpoint: default_embedding_endpoint(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_endpoint() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_secs(self.mutation.timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval.query_timeout_secs)
    }

    pub fn deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.deploy_timeout_secs)
    }

    /// Check cross-field constraints. Called by [`load_config`].
    pub fn validate(&self) -> Result<()> {
        if self.mutation.batch_size == 0 {
            bail!("mutation.batch_size must be > 0");
        }
        if self.mutation.num_threads == 0 {
            bail!("mutation.num_threads must be > 0");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be >= 1");
        }
        if self.retry.backoff < 1.0 {
            bail!("retry.backoff must be >= 1.0");
        }
        if !(0.0..=1.0).contains(&self.retrieval.hybrid_alpha) {
            bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
        }
        if self.engine.deploy_timeout_secs == 0 {
            bail!("engine.deploy_timeout_secs must be > 0");
        }
        if self.retrieval.query_timeout_secs <= self.mutation.timeout_secs {
            bail!("retrieval.query_timeout_secs must be greater than mutation.timeout_secs");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled or openai.",
                other
            ),
        }
        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
