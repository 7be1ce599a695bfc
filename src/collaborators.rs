//! External collaborators consumed by the retrieval engine.
//!
//! - [`QueryEmbedder`] turns query text into a vector. [`HttpEmbedder`] calls
//!   an OpenAI-compatible endpoint; [`DisabledEmbedder`] always fails.
//! - [`QueryProcessor`] prepares keyword text. [`StopwordProcessor`] drops
//!   punctuation and English stop words.
//! - [`Clock`] supplies the current instant for recency filters.
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use docindex::config::EmbeddingConfig;
//! # use docindex::collaborators::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docindex_core::error::{IndexError, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::retry::RetryPolicy;

#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    async fn embed(&self, query: &str) -> Result<Vec<f32>>;
}

pub trait QueryProcessor: Send + Sync {
    /// Keyword-search form of a query.
    fn rewrite(&self, query: &str) -> String;

    /// Query tokens with punctuation and stop words removed. Used as the
    /// highlight terms of vector searches.
    fn strip_stop_words(&self, query: &str) -> Vec<String>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "don", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "s", "same", "she",
    "should", "so", "some", "such", "t", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which", "while",
    "who", "whom", "why", "will", "with", "you", "your", "yours", "yourself", "yourselves",
];

pub struct StopwordProcessor {
    stop_words: HashSet<&'static str>,
}

impl Default for StopwordProcessor {
    fn default() -> Self {
        Self {
            stop_words: ENGLISH_STOP_WORDS.iter().copied().collect(),
        }
    }
}

impl QueryProcessor for StopwordProcessor {
    fn rewrite(&self, query: &str) -> String {
        self.strip_stop_words(query).join(" ")
    }

    /// Falls back to the punctuation-free tokens when every token is a stop
    /// word, so a query like "how to" still matches something.
    fn strip_stop_words(&self, query: &str) -> Vec<String> {
        let tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| c.is_ascii_punctuation()))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        let kept: Vec<String> = tokens
            .iter()
            .filter(|t| !self.stop_words.contains(t.to_lowercase().as_str()))
            .cloned()
            .collect();

        if kept.is_empty() {
            tokens
        } else {
            kept
        }
    }
}

// ============ Disabled Embedder ============

pub struct DisabledEmbedder;

#[async_trait]
impl QueryEmbedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _query: &str) -> Result<Vec<f32>> {
        Err(IndexError::Embedding(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ HTTP Embedder ============

/// Embedder for an OpenAI-compatible `POST /v1/embeddings` endpoint.
///
/// Reads the key from `OPENAI_API_KEY`. Rate limits, server errors, and
/// network failures are retried with exponential backoff.
pub struct HttpEmbedder {
    model: String,
    dims: usize,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            endpoint: config.endpoint.clone(),
            api_key,
            client,
            retry: RetryPolicy {
                max_attempts: config.max_retries + 1,
                initial_delay: Duration::from_secs(1),
                backoff: 2.0,
            },
        })
    }

    async fn request(&self, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| IndexError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| IndexError::Transport(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(IndexError::Status { status, body: text });
        }
        serde_json::from_str(&text).map_err(|e| IndexError::Embedding(e.to_string()))
    }
}

#[async_trait]
impl QueryEmbedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [query],
        });
        let json = self.retry.run("embed", || self.request(&body)).await?;
        parse_embedding_response(&json)
    }
}

/// First vector of an embeddings response (`data[0].embedding`).
fn parse_embedding_response(json: &Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(Value::as_array)
        .and_then(|data| data.first())
        .and_then(|item| item.get("embedding"))
        .and_then(Value::as_array)
        .ok_or_else(|| IndexError::Embedding("missing data[0].embedding".to_string()))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Build the configured embedder.
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn QueryEmbedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(HttpEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
