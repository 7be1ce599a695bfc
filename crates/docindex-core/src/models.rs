//! Core data models for the chunk index.
//!
//! These types flow between the indexing pipeline, the mutation engine, and
//! the retrieval engine. [`Chunk`] is what callers hand in for indexing;
//! [`InferenceChunk`] is what every retrieval path hands back.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Boost assigned to freshly indexed chunks until a user adjusts it.
pub const DEFAULT_BOOST: i64 = 0;

fn default_boost() -> i64 {
    DEFAULT_BOOST
}

/// Embedding vectors for one chunk.
///
/// Mini-chunk vectors are stored inside the parent chunk; the index has no
/// separate mini-chunk documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkEmbedding {
    pub full_embedding: Vec<f32>,
    #[serde(default)]
    pub mini_chunk_embeddings: Vec<Vec<f32>>,
}

/// A chunk ready for indexing, carrying its source document's metadata and
/// already-resolved access information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    /// Zero-based position within the document. Index 0 is the chunk used to
    /// test whether the document already exists.
    pub chunk_id: usize,
    pub blurb: String,
    pub content: String,
    /// Footnote index → source URL fragment.
    #[serde(default)]
    pub source_links: BTreeMap<usize, String>,
    #[serde(default)]
    pub section_continuation: bool,
    pub source_type: String,
    pub semantic_identifier: String,
    /// Title used for the index; falls back to the semantic identifier.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub embeddings: ChunkEmbedding,
    #[serde(default = "default_boost")]
    pub boost: i64,
    /// Must be UTC. Any other offset is rejected at encode time.
    #[serde(default)]
    pub doc_updated_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub primary_owners: Vec<String>,
    #[serde(default)]
    pub secondary_owners: Vec<String>,
    #[serde(default)]
    pub access_control_list: BTreeSet<String>,
    #[serde(default)]
    pub document_sets: BTreeSet<String>,
}

impl Chunk {
    pub fn title_for_index(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.semantic_identifier)
    }
}

/// Query-time filters. Absent lists mean "unfiltered", not "deny all".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexFilters {
    #[serde(default)]
    pub access_control_list: Option<Vec<String>>,
    #[serde(default)]
    pub source_type: Option<Vec<String>>,
    #[serde(default)]
    pub document_set: Option<Vec<String>>,
    #[serde(default)]
    pub time_cutoff: Option<DateTime<Utc>>,
}

/// Partial update applied to every chunk of the listed documents.
///
/// `None` fields are left untouched on the index. Set-valued fields replace
/// the stored set wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub document_ids: Vec<String>,
    #[serde(default)]
    pub boost: Option<i64>,
    #[serde(default)]
    pub document_sets: Option<BTreeSet<String>>,
    #[serde(default)]
    pub access_control_list: Option<BTreeSet<String>>,
    #[serde(default)]
    pub hidden: Option<bool>,
}

impl UpdateRequest {
    pub fn has_changes(&self) -> bool {
        self.boost.is_some()
            || self.document_sets.is_some()
            || self.access_control_list.is_some()
            || self.hidden.is_some()
    }
}

/// Outcome of indexing one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DocumentInsertionRecord {
    pub document_id: String,
    pub already_existed: bool,
}

/// A retrieved chunk in canonical form.
///
/// Only the codec's decode path builds these (the struct is
/// `#[non_exhaustive]`, so other crates can read it but not construct it).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct InferenceChunk {
    pub document_id: String,
    pub chunk_id: usize,
    pub blurb: String,
    pub content: String,
    pub source_links: BTreeMap<usize, String>,
    pub section_continuation: bool,
    pub source_type: String,
    pub semantic_identifier: String,
    pub boost: i64,
    pub recency_bias: f64,
    pub score: f64,
    pub hidden: bool,
    pub primary_owners: Option<Vec<String>>,
    pub secondary_owners: Option<Vec<String>>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Highlighted excerpts, bounded in total length.
    pub match_highlights: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}
