//! Batched mutation engine: index, delete, and partial update.
//!
//! # Document replace
//!
//! [`index_chunks`] runs three barrier-separated phases, each batched and
//! fanned out over the worker pool:
//!
//! 1. **exists?** point lookup of every document's chunk 0.
//! 2. **purge** every chunk of the documents that existed, so a document
//!    that shrank leaves no stale trailing chunks.
//! 3. **write** every chunk.
//!
//! All chunks are encoded before the first request, so a contract violation
//! (a non-UTC timestamp) fails the call without touching the index.
//!
//! # Updates
//!
//! [`update_documents`] expands each request into one partial update per
//! stored chunk and applies them in fixed-size batches. A failed batch does
//! not stop later ones; the first failure is returned once all have run.

use docindex_core::codec::{encode_chunk, ChunkFields, FieldUpdate};
use docindex_core::error::{IndexError, Result};
use docindex_core::models::{Chunk, DocumentInsertionRecord, UpdateRequest};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::time::Instant;
use tracing::{debug, error, info};

use crate::client::IndexClient;
use crate::pool::{first_error, WorkerPool};

/// Whether a chunk is stored under `uuid`.
///
/// 404 is absent, 2xx is present. Any other status is retried and, once the
/// attempts are spent, returned as an error.
pub async fn does_chunk_exist(client: &IndexClient, uuid: &str) -> Result<bool> {
    let resp = client.get_definite(uuid).await?;
    Ok(resp.status != 404)
}

/// Delete every stored chunk of one document. Already-absent chunks are fine.
pub async fn delete_document_chunks(client: &IndexClient, document_id: &str) -> Result<()> {
    let chunk_ids = client.chunk_ids_for_document(document_id, "").await?;
    for chunk_id in &chunk_ids {
        let resp = client.delete(chunk_id).await?;
        if !resp.is_success() && resp.status != 404 {
            return Err(resp.into_error());
        }
    }
    debug!(document_id, chunks = chunk_ids.len(), "Deleted document chunks");
    Ok(())
}

/// Write one chunk.
///
/// A client-error response is retried once with the text fields sanitized.
/// If that also fails with a client error the chunk is
/// [`Rejected`](IndexError::Rejected).
pub async fn insert_chunk(client: &IndexClient, mut chunk: ChunkFields) -> Result<()> {
    let uuid = chunk.uuid().to_string();
    debug!(document_id = %chunk.document_id, chunk_id = chunk.chunk_id, uuid = %uuid, "Indexing chunk");

    let resp = client.put(&uuid, &chunk.to_document()?).await?;
    if resp.is_success() {
        return Ok(());
    }
    let first = resp.into_error();
    if !first.is_client_error() {
        return Err(first);
    }

    chunk.sanitize_text();
    let resp = client.put(&uuid, &chunk.to_document()?).await?;
    if resp.is_success() {
        return Ok(());
    }

    error!(
        document_id = %chunk.document_id,
        status = resp.status,
        body = %resp.body,
        "Failed to index document"
    );
    if (400..500).contains(&resp.status) && resp.status != 429 {
        Err(IndexError::Rejected {
            document_id: chunk.document_id,
            chunk_id: chunk.chunk_id,
            status: resp.status,
            body: resp.body,
        })
    } else {
        Err(resp.into_error())
    }
}

/// Run `op` over `items` in batches of `batch_size`, stopping at the first
/// batch that fails.
async fn run_batched<T, R, F, Fut>(
    pool: &WorkerPool,
    items: Vec<T>,
    batch_size: usize,
    op: F,
) -> Result<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: std::future::Future<Output = Result<R>> + Send + 'static,
{
    let mut out = Vec::with_capacity(items.len());
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        let batch: Vec<T> = items.by_ref().take(batch_size.max(1)).collect();
        out.extend(first_error(pool.run_all(batch, &op).await)?);
    }
    Ok(out)
}

/// Replace the chunks of every document in `chunks`.
///
/// Assumes one call carries a document's complete chunk set.
pub async fn index_chunks(
    client: &IndexClient,
    pool: &WorkerPool,
    batch_size: usize,
    chunks: &[Chunk],
) -> Result<HashSet<DocumentInsertionRecord>> {
    let encoded: Vec<ChunkFields> = chunks.iter().map(encode_chunk).collect::<Result<_>>()?;

    let first_chunks: Vec<(String, String)> = encoded
        .iter()
        .filter(|c| c.chunk_id == 0)
        .map(|c| (c.document_id.clone(), c.uuid().to_string()))
        .collect();

    let existence = run_batched(pool, first_chunks, batch_size, |(document_id, uuid): (String, String)| {
        let client = client.clone();
        async move { Ok((document_id, does_chunk_exist(&client, &uuid).await?)) }
    })
    .await?;
    let existing: BTreeSet<String> = existence
        .into_iter()
        .filter(|(_, exists)| *exists)
        .map(|(document_id, _)| document_id)
        .collect();

    run_batched(
        pool,
        existing.iter().cloned().collect(),
        batch_size,
        |document_id: String| {
            let client = client.clone();
            async move { delete_document_chunks(&client, &document_id).await }
        },
    )
    .await?;

    run_batched(pool, encoded, batch_size, |chunk: ChunkFields| {
        let client = client.clone();
        async move { insert_chunk(&client, chunk).await }
    })
    .await?;

    let all_documents: BTreeSet<&str> = chunks.iter().map(|c| c.document_id.as_str()).collect();
    Ok(all_documents
        .into_iter()
        .map(|document_id| DocumentInsertionRecord {
            document_id: document_id.to_string(),
            already_existed: existing.contains(document_id),
        })
        .collect())
}

pub async fn delete_documents(
    client: &IndexClient,
    pool: &WorkerPool,
    batch_size: usize,
    document_ids: &[String],
) -> Result<()> {
    info!("Deleting {} documents", document_ids.len());
    run_batched(pool, document_ids.to_vec(), batch_size, |document_id: String| {
        let client = client.clone();
        async move { delete_document_chunks(&client, &document_id).await }
    })
    .await?;
    Ok(())
}

/// One partial update addressed to one stored chunk.
#[derive(Debug, Clone)]
struct PendingUpdate {
    document_id: String,
    chunk_uuid: String,
    body: Value,
}

async fn apply_update(client: &IndexClient, update: PendingUpdate) -> Result<()> {
    let failure = match client.update(&update.chunk_uuid, &update.body).await {
        Ok(resp) if resp.is_success() => return Ok(()),
        Ok(resp) => resp.into_error(),
        Err(e) => e,
    };
    Err(IndexError::UpdateFailed {
        document_id: update.document_id,
        source: Box::new(failure),
    })
}

/// Apply partial updates to every chunk of the listed documents.
pub async fn update_documents(
    client: &IndexClient,
    pool: &WorkerPool,
    batch_size: usize,
    requests: &[UpdateRequest],
) -> Result<()> {
    info!("Updating {} documents", requests.len());
    let start = Instant::now();

    let mut targets: Vec<(String, Value)> = Vec::new();
    for request in requests {
        let Some(update) = FieldUpdate::from_request(request) else {
            error!("Update request received but nothing to update");
            continue;
        };
        let body = update.to_document()?;
        for document_id in &request.document_ids {
            targets.push((document_id.clone(), body.clone()));
        }
    }
    if targets.is_empty() {
        return Ok(());
    }

    let resolved = run_batched(pool, targets, batch_size, |(document_id, body): (String, Value)| {
        let client = client.clone();
        async move {
            let chunk_ids = client.chunk_ids_for_document(&document_id, "").await?;
            Ok(chunk_ids
                .into_iter()
                .map(|chunk_uuid| PendingUpdate {
                    document_id: document_id.clone(),
                    chunk_uuid,
                    body: body.clone(),
                })
                .collect::<Vec<_>>())
        }
    })
    .await?;
    let pending: Vec<PendingUpdate> = resolved.into_iter().flatten().collect();

    let mut first_failure = None;
    let mut pending = pending.into_iter().peekable();
    let mut batch_number = 0;
    while pending.peek().is_some() {
        batch_number += 1;
        let batch: Vec<PendingUpdate> = pending.by_ref().take(batch_size.max(1)).collect();
        let results = pool
            .run_all(batch, |update: PendingUpdate| {
                let client = client.clone();
                async move { apply_update(&client, update).await }
            })
            .await;
        if let Err(e) = first_error(results) {
            error!(batch = batch_number, error = %e, "Update batch failed");
            first_failure.get_or_insert(e);
        }
    }

    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Finished updating documents"
    );
    match first_failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
