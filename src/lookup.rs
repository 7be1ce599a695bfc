//! Lookup by document id, bypassing ranked search.

use chrono::{DateTime, Utc};
use docindex_core::codec::decode_hit;
use docindex_core::error::Result;
use docindex_core::filters::build_filters;
use docindex_core::models::{IndexFilters, InferenceChunk};
use docindex_core::query::{chunk_lookup_yql, QueryParams};
use tracing::{debug, warn};

use crate::client::IndexClient;
use crate::config::RetrievalConfig;
use crate::pool::WorkerPool;
use crate::retrieval::query_index;

/// Fetch one stored chunk by its engine id.
pub async fn fetch_chunk(client: &IndexClient, uuid: &str, max_summary_chars: usize) -> Result<InferenceChunk> {
    let body = client.get(uuid).await?.error_for_status()?.json()?;
    decode_hit(&body, max_summary_chars)
}

/// Chunks of one document, honoring `filters` (hidden chunks included).
///
/// With `chunk_ind` the exact `(document, chunk)` pair is queried. Without
/// it every chunk is resolved and fetched in parallel; chunks that fail to
/// fetch are logged and left out. The result is sorted by chunk index.
pub async fn id_based_retrieval(
    client: &IndexClient,
    pool: &WorkerPool,
    config: &RetrievalConfig,
    document_id: &str,
    chunk_ind: Option<usize>,
    filters: &IndexFilters,
    now: DateTime<Utc>,
) -> Result<Vec<InferenceChunk>> {
    let filters_str = build_filters(filters, true, now);

    if let Some(chunk_id) = chunk_ind {
        let yql = chunk_lookup_yql(client.index_name(), &filters_str, document_id, chunk_id);
        let params = QueryParams::new(yql)
            .hits(1)
            .timeout(config.engine_timeout.clone());
        return query_index(client, config, params).await;
    }

    let chunk_ids = client
        .chunk_ids_for_document(document_id, &filters_str)
        .await?;
    if chunk_ids.is_empty() {
        return Ok(Vec::new());
    }

    let max_summary_chars = config.summary_max_chars;
    let results = pool
        .run_all(chunk_ids.clone(), |uuid: String| {
            let client = client.clone();
            async move { fetch_chunk(&client, &uuid, max_summary_chars).await }
        })
        .await;

    let mut chunks = Vec::with_capacity(results.len());
    for (uuid, result) in chunk_ids.iter().zip(results) {
        match result {
            Ok(chunk) => chunks.push(chunk),
            Err(e) => warn!(document_id, uuid = %uuid, error = %e, "Skipping chunk that failed to load"),
        }
    }
    chunks.sort_by_key(|c| c.chunk_id);

    debug!(document_id, chunks = chunks.len(), "Loaded document chunks");
    Ok(chunks)
}
