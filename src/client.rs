//! Retried requests against the remote index.
//!
//! [`IndexClient`] pairs a [`Transport`] with a [`RetryPolicy`] and the
//! settings every engine needs. It is cheap to clone, so each pooled task
//! takes its own copy.

use docindex_core::codec::{fields, local_id};
use docindex_core::error::{IndexError, Result};
use docindex_core::query::{chunk_id_scan_yql, QueryParams};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::retry::RetryPolicy;
use crate::transport::{RawResponse, Transport};

#[derive(Clone)]
pub struct IndexClient {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    index_name: Arc<str>,
    page_size: usize,
    id_scan_timeout: Arc<str>,
}

impl IndexClient {
    pub fn new(transport: Arc<dyn Transport>, config: &Config, retry: RetryPolicy) -> Self {
        Self {
            transport,
            retry,
            index_name: Arc::from(config.engine.index_name.as_str()),
            page_size: config.mutation.batch_size.max(1),
            id_scan_timeout: Arc::from(config.retrieval.id_scan_timeout.as_str()),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn get(&self, id: &str) -> Result<RawResponse> {
        self.retry
            .run_request("get", || self.transport.get_document(id))
            .await
    }

    /// GET whose only acceptable answers are 2xx and 404.
    ///
    /// Every other status is an error and is retried, client errors
    /// included, until the attempts run out.
    pub async fn get_definite(&self, id: &str) -> Result<RawResponse> {
        self.retry
            .run_when("get", |_| true, || async {
                let resp = self.transport.get_document(id).await?;
                if resp.is_success() || resp.status == 404 {
                    Ok(resp)
                } else {
                    Err(resp.into_error())
                }
            })
            .await
    }

    pub async fn put(&self, id: &str, body: &Value) -> Result<RawResponse> {
        self.retry
            .run_request("put", || self.transport.put_document(id, body))
            .await
    }

    pub async fn update(&self, id: &str, body: &Value) -> Result<RawResponse> {
        self.retry
            .run_request("update", || self.transport.update_document(id, body))
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<RawResponse> {
        self.retry
            .run_request("delete", || self.transport.delete_document(id))
            .await
    }

    /// Run a search and return the parsed body. Non-2xx statuses are errors.
    pub async fn search(&self, params: &QueryParams) -> Result<Value> {
        self.retry
            .run("search", || async {
                self.transport.search(params).await?.error_for_status()?.json()
            })
            .await
    }

    pub async fn deploy(&self, package: Vec<u8>) -> Result<RawResponse> {
        self.transport.deploy_application(package).await
    }

    /// Engine ids of every chunk of a document.
    ///
    /// Pages through `document_id contains ..` until a short page comes back.
    /// `filters` is a predicate prefix as built by the filter builder, or
    /// empty to see every chunk, hidden ones included.
    pub async fn chunk_ids_for_document(&self, document_id: &str, filters: &str) -> Result<Vec<String>> {
        let yql = chunk_id_scan_yql(&self.index_name, filters, document_id);
        let mut ids = Vec::new();
        let mut offset = 0;

        loop {
            let params = QueryParams::new(yql.clone())
                .hits(self.page_size)
                .offset(offset)
                .timeout(self.id_scan_timeout.to_string());
            let body = self.search(&params).await?;
            let hits = hits_of(&body)?;

            for hit in hits {
                let documentid = hit
                    .get("fields")
                    .and_then(|f| f.get(fields::DOCUMENTID))
                    .and_then(Value::as_str)
                    .ok_or(IndexError::MalformedHit(fields::DOCUMENTID))?;
                ids.push(local_id(documentid).to_string());
            }

            if hits.len() < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        debug!(document_id, chunks = ids.len(), "Resolved chunk ids");
        Ok(ids)
    }
}

/// `root.children` of a search response. A response without children has
/// no hits.
pub fn hits_of(body: &Value) -> Result<&[Value]> {
    let root = body
        .get("root")
        .ok_or_else(|| IndexError::MalformedResponse("missing root".to_string()))?;
    Ok(root
        .get("children")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]))
}
