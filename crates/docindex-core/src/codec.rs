//! Mapping between [`Chunk`]/[`InferenceChunk`] and the index's wire fields.
//!
//! - [`encode_chunk`] builds the [`ChunkFields`] payload posted for a chunk.
//! - [`FieldUpdate`] builds the partial-update payload (`{"assign": ..}` per field).
//! - [`decode_hit`] turns a search hit or point-lookup body into an
//!   [`InferenceChunk`].
//!
//! The index's only set-like field type is a weighted set, so ACL entries
//! and document sets are sent as `entry → 1` maps. Metadata and source links
//! are stored as JSON strings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::{IndexError, Result};
use crate::models::{Chunk, InferenceChunk, UpdateRequest};
use crate::sanitize::remove_invalid_unicode_chars;
use crate::summary::truncate_summary;

/// Field names of the chunk schema on the index.
pub mod fields {
    pub const DOCUMENT_ID: &str = "document_id";
    pub const CHUNK_ID: &str = "chunk_id";
    pub const BLURB: &str = "blurb";
    pub const CONTENT: &str = "content";
    /// Duplicate of `content` indexed for highlighting.
    pub const CONTENT_SUMMARY: &str = "content_summary";
    pub const SOURCE_TYPE: &str = "source_type";
    pub const SOURCE_LINKS: &str = "source_links";
    pub const SEMANTIC_IDENTIFIER: &str = "semantic_identifier";
    pub const TITLE: &str = "title";
    pub const SECTION_CONTINUATION: &str = "section_continuation";
    pub const METADATA: &str = "metadata";
    pub const EMBEDDINGS: &str = "embeddings";
    pub const BOOST: &str = "boost";
    pub const HIDDEN: &str = "hidden";
    pub const DOC_UPDATED_AT: &str = "doc_updated_at";
    pub const PRIMARY_OWNERS: &str = "primary_owners";
    pub const SECONDARY_OWNERS: &str = "secondary_owners";
    pub const ACCESS_CONTROL_LIST: &str = "access_control_list";
    pub const DOCUMENT_SETS: &str = "document_sets";
    pub const MATCH_FEATURES: &str = "matchfeatures";
    pub const RECENCY_BIAS: &str = "recency_bias";
    /// Engine-assigned full document id (`id:<ns>:<type>::<local id>`).
    pub const DOCUMENTID: &str = "documentid";
}

/// Stored in place of an update time for documents that have none.
pub const UNTIMED_SENTINEL: i64 = -1;

/// Weight given to every member of a weighted-set field.
const SET_MEMBER_WEIGHT: i32 = 1;

/// Deterministic identifier for a chunk on the index.
///
/// UUIDv5 over `"{document_id}_{chunk_id}_0"`. The trailing slot is the
/// mini-chunk index, always 0 for stored chunks. Re-indexing the same
/// `(document_id, chunk_id)` therefore overwrites instead of duplicating.
pub fn chunk_uuid(document_id: &str, chunk_id: usize) -> Uuid {
    let key = format!("{}_{}_{}", document_id, chunk_id, 0);
    Uuid::new_v5(&Uuid::NAMESPACE_X500, key.as_bytes())
}

/// Local chunk id from an engine `documentid` (`id:default:chunk::<uuid>`).
pub fn local_id(documentid: &str) -> &str {
    documentid.rsplit("::").next().unwrap_or(documentid)
}

/// Wire payload for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFields {
    pub document_id: String,
    pub chunk_id: usize,
    pub blurb: String,
    pub content: String,
    pub content_summary: String,
    pub source_type: String,
    pub source_links: String,
    pub semantic_identifier: String,
    pub title: String,
    pub section_continuation: bool,
    pub metadata: String,
    pub embeddings: BTreeMap<String, Vec<f32>>,
    pub boost: i64,
    pub doc_updated_at: i64,
    pub primary_owners: Vec<String>,
    pub secondary_owners: Vec<String>,
    pub access_control_list: BTreeMap<String, i32>,
    pub document_sets: BTreeMap<String, i32>,
}

impl ChunkFields {
    /// The chunk's identifier on the index.
    pub fn uuid(&self) -> Uuid {
        chunk_uuid(&self.document_id, self.chunk_id)
    }

    /// Strip characters the index refuses from the text-bearing fields.
    pub fn sanitize_text(&mut self) {
        self.blurb = remove_invalid_unicode_chars(&self.blurb);
        self.semantic_identifier = remove_invalid_unicode_chars(&self.semantic_identifier);
        self.content = remove_invalid_unicode_chars(&self.content);
        self.content_summary = remove_invalid_unicode_chars(&self.content_summary);
    }

    /// Request body for a document put: `{"fields": {..}}`.
    pub fn to_document(&self) -> Result<Value> {
        Ok(json!({ "fields": serde_json::to_value(self)? }))
    }
}

/// Encode a chunk for the index.
///
/// Fails with [`IndexError::NonUtcTimestamp`] when the update time carries a
/// non-zero offset.
pub fn encode_chunk(chunk: &Chunk) -> Result<ChunkFields> {
    let mut embeddings = BTreeMap::new();
    embeddings.insert(
        "full_chunk".to_string(),
        chunk.embeddings.full_embedding.clone(),
    );
    for (ind, vector) in chunk.embeddings.mini_chunk_embeddings.iter().enumerate() {
        embeddings.insert(format!("mini_chunk_{}", ind), vector.clone());
    }

    Ok(ChunkFields {
        document_id: chunk.document_id.clone(),
        chunk_id: chunk.chunk_id,
        blurb: chunk.blurb.clone(),
        content: chunk.content.clone(),
        content_summary: chunk.content.clone(),
        source_type: chunk.source_type.clone(),
        source_links: serde_json::to_string(&chunk.source_links)?,
        semantic_identifier: chunk.semantic_identifier.clone(),
        title: chunk.title_for_index().to_string(),
        section_continuation: chunk.section_continuation,
        metadata: serde_json::to_string(&chunk.metadata)?,
        embeddings,
        boost: chunk.boost,
        doc_updated_at: updated_at_attribute(chunk.doc_updated_at)?,
        primary_owners: chunk.primary_owners.clone(),
        secondary_owners: chunk.secondary_owners.clone(),
        access_control_list: weighted_set(&chunk.access_control_list),
        document_sets: weighted_set(&chunk.document_sets),
    })
}

fn updated_at_attribute(t: Option<DateTime<chrono::FixedOffset>>) -> Result<i64> {
    let Some(t) = t else {
        return Ok(UNTIMED_SENTINEL);
    };
    if t.offset().local_minus_utc() != 0 {
        return Err(IndexError::NonUtcTimestamp {
            offset: t.offset().to_string(),
        });
    }
    Ok(t.timestamp())
}

fn weighted_set(entries: &BTreeSet<String>) -> BTreeMap<String, i32> {
    entries
        .iter()
        .map(|e| (e.clone(), SET_MEMBER_WEIGHT))
        .collect()
}

/// `{"assign": value}` wrapper for a partial update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assign<T> {
    pub assign: T,
}

/// Partial-update payload. Unset fields are omitted from the wire body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost: Option<Assign<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_sets: Option<Assign<BTreeMap<String, i32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_control_list: Option<Assign<BTreeMap<String, i32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden: Option<Assign<bool>>,
}

impl FieldUpdate {
    /// Build the update for a request, or `None` if it changes nothing.
    pub fn from_request(req: &UpdateRequest) -> Option<Self> {
        if !req.has_changes() {
            return None;
        }
        Some(Self {
            boost: req.boost.map(|assign| Assign { assign }),
            document_sets: req.document_sets.as_ref().map(|s| Assign {
                assign: weighted_set(s),
            }),
            access_control_list: req.access_control_list.as_ref().map(|s| Assign {
                assign: weighted_set(s),
            }),
            hidden: req.hidden.map(|assign| Assign { assign }),
        })
    }

    /// Request body for a partial update: `{"fields": {..}}`.
    pub fn to_document(&self) -> Result<Value> {
        Ok(json!({ "fields": serde_json::to_value(self)? }))
    }
}

/// Whether a hit carries the primary content field.
pub fn hit_has_content(hit: &Value) -> bool {
    hit.get("fields")
        .and_then(|f| f.get(fields::CONTENT))
        .map(|c| !c.is_null())
        .unwrap_or(false)
}

/// Best available identifier of a hit, for log lines.
pub fn hit_identifier(hit: &Value) -> String {
    hit.get("fields")
        .and_then(|f| f.get(fields::DOCUMENTID))
        .or_else(|| hit.get("id"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

/// Decode a search hit or a point-lookup body into an [`InferenceChunk`].
///
/// Missing semantic identifier or blurb degrade to empty strings with an
/// error log. Missing identity or content fields are [`IndexError::MalformedHit`].
pub fn decode_hit(hit: &Value, max_summary_chars: usize) -> Result<InferenceChunk> {
    let raw = hit
        .get("fields")
        .and_then(Value::as_object)
        .ok_or(IndexError::MalformedHit("fields"))?;

    let document_id = str_field(raw, fields::DOCUMENT_ID)
        .ok_or(IndexError::MalformedHit(fields::DOCUMENT_ID))?
        .to_string();
    let chunk_id = raw
        .get(fields::CHUNK_ID)
        .and_then(Value::as_u64)
        .ok_or(IndexError::MalformedHit(fields::CHUNK_ID))? as usize;
    let content = str_field(raw, fields::CONTENT)
        .ok_or(IndexError::MalformedHit(fields::CONTENT))?
        .to_string();
    let source_type = str_field(raw, fields::SOURCE_TYPE)
        .ok_or(IndexError::MalformedHit(fields::SOURCE_TYPE))?
        .to_string();

    let semantic_identifier = str_field(raw, fields::SEMANTIC_IDENTIFIER)
        .unwrap_or_default()
        .to_string();
    if semantic_identifier.is_empty() {
        let blurb_preview: String = str_field(raw, fields::BLURB)
            .unwrap_or("Unknown")
            .chars()
            .take(50)
            .collect();
        error!(
            "Chunk with blurb: {}... has no Semantic Identifier",
            blurb_preview
        );
    }

    let blurb = match str_field(raw, fields::BLURB) {
        Some(b) if !b.is_empty() => b.to_string(),
        _ => {
            error!(document_id = %document_id, chunk_id, "Chunk has no blurb");
            String::new()
        }
    };

    let dynamic_summary = str_field(raw, fields::CONTENT_SUMMARY).unwrap_or(&content);
    let match_highlights = truncate_summary(dynamic_summary, max_summary_chars);

    let updated_at = raw
        .get(fields::DOC_UPDATED_AT)
        .and_then(Value::as_i64)
        .filter(|secs| *secs != UNTIMED_SENTINEL)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    let recency_bias = raw
        .get(fields::MATCH_FEATURES)
        .and_then(|m| m.get(fields::RECENCY_BIAS))
        .and_then(Value::as_f64)
        .unwrap_or(1.0);

    Ok(InferenceChunk {
        document_id,
        chunk_id,
        blurb,
        content,
        source_links: decode_source_links(raw.get(fields::SOURCE_LINKS)),
        section_continuation: raw
            .get(fields::SECTION_CONTINUATION)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        source_type,
        semantic_identifier,
        boost: raw.get(fields::BOOST).and_then(Value::as_i64).unwrap_or(1),
        recency_bias,
        score: hit.get("relevance").and_then(Value::as_f64).unwrap_or(0.0),
        hidden: raw
            .get(fields::HIDDEN)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        primary_owners: string_list(raw.get(fields::PRIMARY_OWNERS)),
        secondary_owners: string_list(raw.get(fields::SECONDARY_OWNERS)),
        metadata: decode_metadata(raw.get(fields::METADATA)),
        match_highlights,
        updated_at,
    })
}

fn str_field<'a>(raw: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    raw.get(name).and_then(Value::as_str)
}

/// Accepts the stored JSON string or an already-parsed object.
fn json_object(value: Option<&Value>, field: &str) -> Map<String, Value> {
    let parsed = match value {
        None | Some(Value::Null) => return Map::new(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(v) => v,
            Err(e) => {
                warn!(field, error = %e, "Stored field is not valid JSON");
                return Map::new();
            }
        },
        Some(other) => other.clone(),
    };
    match parsed {
        Value::Object(map) => map,
        _ => {
            warn!(field, "Stored field is not a JSON object");
            Map::new()
        }
    }
}

fn decode_metadata(value: Option<&Value>) -> Map<String, Value> {
    json_object(value, fields::METADATA)
}

fn decode_source_links(value: Option<&Value>) -> BTreeMap<usize, String> {
    json_object(value, fields::SOURCE_LINKS)
        .into_iter()
        .filter_map(|(k, v)| {
            let Ok(ind) = k.parse::<usize>() else {
                warn!(key = %k, "Skipping non-integer source link key");
                return None;
            };
            v.as_str().map(|link| (ind, link.to_string()))
        })
        .collect()
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value.and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}
