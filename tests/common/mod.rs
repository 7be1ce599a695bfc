//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use docindex::collaborators::{FixedClock, QueryEmbedder};
use docindex::config::Config;
use docindex::core::error::Result;
use docindex::core::models::{Chunk, ChunkEmbedding};
use docindex::retry::RetryPolicy;
use docindex::transport::memory::InMemoryTransport;
use docindex::RemoteIndex;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap().fixed_offset()
}

pub fn config_with_batch_size(batch_size: usize) -> Config {
    let mut config = Config::default();
    config.mutation.batch_size = batch_size;
    config.mutation.num_threads = 4;
    config
}

pub struct Harness {
    pub transport: Arc<InMemoryTransport>,
    pub index: RemoteIndex,
}

pub fn harness(config: Config) -> Harness {
    let transport = Arc::new(InMemoryTransport::new(config.engine.index_name.clone()));
    let index = RemoteIndex::new(Arc::new(config), transport.clone())
        .with_retry(RetryPolicy::immediate(3))
        .with_clock(Arc::new(FixedClock(now())));
    Harness { transport, index }
}

pub fn default_harness() -> Harness {
    harness(config_with_batch_size(100))
}

pub fn chunk(document_id: &str, chunk_id: usize, content: &str) -> Chunk {
    Chunk {
        document_id: document_id.to_string(),
        chunk_id,
        blurb: content.chars().take(40).collect(),
        content: content.to_string(),
        source_links: [(0, format!("https://example.com/{}", document_id))]
            .into_iter()
            .collect(),
        section_continuation: chunk_id > 0,
        source_type: "web".to_string(),
        semantic_identifier: format!("Document {}", document_id),
        title: None,
        metadata: serde_json::Map::new(),
        embeddings: ChunkEmbedding {
            full_embedding: vec![0.1, 0.2, 0.3],
            mini_chunk_embeddings: Vec::new(),
        },
        boost: 0,
        doc_updated_at: Some(utc(2024, 5, 1)),
        primary_owners: Vec::new(),
        secondary_owners: Vec::new(),
        access_control_list: BTreeSet::from(["PUBLIC".to_string()]),
        document_sets: BTreeSet::new(),
    }
}

/// `count` chunks of one document, numbered from 0.
pub fn document(document_id: &str, count: usize) -> Vec<Chunk> {
    (0..count)
        .map(|i| chunk(document_id, i, &format!("{} section {} about revenue", document_id, i)))
        .collect()
}

/// Returns a fixed vector and remembers the queries it was asked to embed.
pub struct FixedEmbedder {
    pub vector: Vec<f32>,
    pub seen: Mutex<Vec<String>>,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryEmbedder for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }
    fn dims(&self) -> usize {
        self.vector.len()
    }
    async fn embed(&self, query: &str) -> Result<Vec<f32>> {
        self.seen.lock().unwrap().push(query.to_string());
        Ok(self.vector.clone())
    }
}
