//! Index, delete, and update against the in-memory index.

mod common;

use common::*;
use docindex::core::codec::chunk_uuid;
use docindex::core::error::IndexError;
use docindex::core::models::{DocumentInsertionRecord, UpdateRequest};
use docindex::transport::memory::Operation;
use docindex::DocumentIndex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;

fn sorted(records: std::collections::HashSet<DocumentInsertionRecord>) -> Vec<DocumentInsertionRecord> {
    let mut v: Vec<_> = records.into_iter().collect();
    v.sort();
    v
}

#[tokio::test]
async fn test_index_new_documents() {
    let h = default_harness();
    let mut chunks = document("doc-a", 3);
    chunks.extend(document("doc-b", 2));

    let records = sorted(h.index.index(&chunks).await.unwrap());
    assert_eq!(
        records,
        vec![
            DocumentInsertionRecord {
                document_id: "doc-a".into(),
                already_existed: false
            },
            DocumentInsertionRecord {
                document_id: "doc-b".into(),
                already_existed: false
            },
        ]
    );
    assert_eq!(h.transport.chunk_ids("doc-a"), vec![0, 1, 2]);
    assert_eq!(h.transport.chunk_ids("doc-b"), vec![0, 1]);
    // New documents skip the purge phase.
    assert_eq!(h.transport.request_count(Operation::Delete), 0);
}

#[tokio::test]
async fn test_reindex_shrunk_document_leaves_no_stale_chunks() {
    // Page size 2 forces the chunk-id scan to paginate.
    let h = harness(config_with_batch_size(2));
    h.index.index(&document("doc-a", 5)).await.unwrap();
    assert_eq!(h.transport.chunk_ids("doc-a"), vec![0, 1, 2, 3, 4]);

    let records = sorted(h.index.index(&document("doc-a", 2)).await.unwrap());
    assert_eq!(records.len(), 1);
    assert!(records[0].already_existed);
    assert_eq!(h.transport.chunk_ids("doc-a"), vec![0, 1]);
    assert!(h.transport.chunk("doc-a", 4).is_none());
}

#[tokio::test]
async fn test_reindex_only_purges_existing_documents() {
    let h = default_harness();
    h.index.index(&document("doc-a", 2)).await.unwrap();
    h.index.index(&document("doc-keep", 3)).await.unwrap();

    let mut chunks = document("doc-a", 1);
    chunks.extend(document("doc-new", 1));
    let records = sorted(h.index.index(&chunks).await.unwrap());

    assert!(records.iter().any(|r| r.document_id == "doc-a" && r.already_existed));
    assert!(records.iter().any(|r| r.document_id == "doc-new" && !r.already_existed));
    assert_eq!(h.transport.chunk_ids("doc-a"), vec![0]);
    assert_eq!(h.transport.chunk_ids("doc-keep"), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_chunk_ids_are_deterministic() {
    let h = default_harness();
    h.index.index(&document("doc-a", 2)).await.unwrap();
    h.index.index(&document("doc-a", 2)).await.unwrap();
    assert_eq!(h.transport.len(), 2);
    assert_ne!(chunk_uuid("doc-a", 0), chunk_uuid("doc-a", 1));
}

#[tokio::test]
async fn test_existence_check_is_retried() {
    let h = default_harness();
    h.transport.fail_next(Operation::Get, 503, 2);

    h.index.index(&document("doc-a", 1)).await.unwrap();
    assert_eq!(h.transport.request_count(Operation::Get), 3);
    assert_eq!(h.transport.chunk_ids("doc-a"), vec![0]);
}

#[tokio::test]
async fn test_existence_check_failure_aborts_before_writes() {
    let h = default_harness();
    h.transport.fail_next(Operation::Get, 503, 3);

    let err = h.index.index(&document("doc-a", 2)).await.unwrap_err();
    assert!(matches!(err, IndexError::Status { status: 503, .. }));
    assert_eq!(h.transport.request_count(Operation::Put), 0);
    assert!(h.transport.is_empty());
}

#[tokio::test]
async fn test_existence_check_retries_client_errors() {
    let h = default_harness();
    h.transport.fail_next(Operation::Get, 403, 2);

    h.index.index(&document("doc-a", 1)).await.unwrap();
    assert_eq!(h.transport.request_count(Operation::Get), 3);
    assert_eq!(h.transport.chunk_ids("doc-a"), vec![0]);
}

#[tokio::test]
async fn test_existence_check_gives_up_on_persistent_client_error() {
    let h = default_harness();
    h.transport.fail_next(Operation::Get, 403, 3);

    let err = h.index.index(&document("doc-a", 1)).await.unwrap_err();
    assert!(matches!(err, IndexError::Status { status: 403, .. }));
    assert_eq!(h.transport.request_count(Operation::Get), 3);
    assert_eq!(h.transport.request_count(Operation::Put), 0);
}

#[tokio::test]
async fn test_invalid_characters_are_sanitized_and_retried_once() {
    let h = default_harness();
    let mut bad = chunk("doc-a", 0, "quarterly\u{0} revenue\u{b}");
    bad.blurb = "blurb\u{1}".to_string();

    h.index.index(&[bad]).await.unwrap();
    assert_eq!(h.transport.request_count(Operation::Put), 2);

    let stored = h.transport.chunk("doc-a", 0).unwrap();
    assert_eq!(stored["content"], "quarterly revenue");
    assert_eq!(stored["content_summary"], "quarterly revenue");
    assert_eq!(stored["blurb"], "blurb");
}

#[tokio::test]
async fn test_second_client_error_rejects_chunk() {
    let h = default_harness();
    h.transport.fail_chunk(Operation::Put, "doc-a", 0, 400);

    let err = h.index.index(&document("doc-a", 1)).await.unwrap_err();
    match err {
        IndexError::Rejected {
            document_id,
            chunk_id,
            status,
            ..
        } => {
            assert_eq!(document_id, "doc-a");
            assert_eq!(chunk_id, 0);
            assert_eq!(status, 400);
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert_eq!(h.transport.request_count(Operation::Put), 2);
}

#[tokio::test]
async fn test_server_errors_are_retried_not_sanitized() {
    let h = default_harness();
    h.transport.fail_chunk(Operation::Put, "doc-a", 0, 500);

    let err = h.index.index(&document("doc-a", 1)).await.unwrap_err();
    assert!(matches!(err, IndexError::Status { status: 500, .. }));
    assert_eq!(h.transport.request_count(Operation::Put), 3);
}

#[tokio::test]
async fn test_non_utc_timestamp_fails_before_any_request() {
    let h = default_harness();
    let mut c = chunk("doc-a", 0, "text");
    c.doc_updated_at = Some(
        chrono::DateTime::parse_from_rfc3339("2024-05-01T10:00:00+02:00").unwrap(),
    );

    let err = h.index.index(&[c]).await.unwrap_err();
    assert!(matches!(err, IndexError::NonUtcTimestamp { .. }));
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn test_delete_documents() {
    let h = harness(config_with_batch_size(2));
    let mut chunks = document("doc-a", 3);
    chunks.extend(document("doc-b", 2));
    h.index.index(&chunks).await.unwrap();

    h.index
        .delete(&["doc-a".to_string(), "doc-missing".to_string()])
        .await
        .unwrap();
    assert!(h.transport.chunk_ids("doc-a").is_empty());
    assert_eq!(h.transport.chunk_ids("doc-b"), vec![0, 1]);
}

#[tokio::test]
async fn test_update_without_fields_sends_nothing() {
    let h = default_harness();
    h.index.index(&document("doc-a", 2)).await.unwrap();
    h.transport.clear_requests();

    let request = UpdateRequest {
        document_ids: vec!["doc-a".into()],
        ..Default::default()
    };
    h.index.update(&[request]).await.unwrap();
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn test_update_assigns_only_set_fields() {
    let h = default_harness();
    h.index.index(&document("doc-a", 3)).await.unwrap();

    let request = UpdateRequest {
        document_ids: vec!["doc-a".into()],
        boost: Some(5),
        document_sets: Some(BTreeSet::from(["finance".to_string()])),
        ..Default::default()
    };
    h.index.update(&[request]).await.unwrap();

    for i in 0..3 {
        let stored = h.transport.chunk("doc-a", i).unwrap();
        assert_eq!(stored["boost"], 5);
        assert_eq!(stored["document_sets"]["finance"], 1);
        // Untouched by the update.
        assert_eq!(stored["access_control_list"]["PUBLIC"], 1);
        assert!(stored.get("hidden").is_none());
    }
}

#[tokio::test]
async fn test_failed_update_batch_does_not_stop_siblings() {
    // Two chunks per document and batch size 2: each document is one batch.
    let h = harness(config_with_batch_size(2));
    let ids: Vec<String> = (1..=5).map(|i| format!("doc-{}", i)).collect();
    let chunks: Vec<_> = ids.iter().flat_map(|id| document(id, 2)).collect();
    h.index.index(&chunks).await.unwrap();

    h.transport.fail_chunk(Operation::Update, "doc-3", 0, 500);
    h.transport.fail_chunk(Operation::Update, "doc-3", 1, 500);

    let request = UpdateRequest {
        document_ids: ids.clone(),
        hidden: Some(true),
        ..Default::default()
    };
    let err = h.index.update(&[request]).await.unwrap_err();
    match err {
        IndexError::UpdateFailed { document_id, .. } => assert_eq!(document_id, "doc-3"),
        other => panic!("expected UpdateFailed, got {other:?}"),
    }

    for id in ["doc-1", "doc-2", "doc-4", "doc-5"] {
        for i in 0..2 {
            let stored = h.transport.chunk(id, i).unwrap();
            assert_eq!(stored["hidden"], Value::Bool(true), "{id} chunk {i}");
        }
    }
    assert!(h.transport.chunk("doc-3", 0).unwrap().get("hidden").is_none());
}

#[tokio::test]
async fn test_injected_pool_is_not_shut_down() {
    let semaphore = Arc::new(Semaphore::new(2));
    let h = default_harness();
    let index = h.index.with_pool(Arc::clone(&semaphore));

    index.index(&document("doc-a", 3)).await.unwrap();
    assert!(!semaphore.is_closed());

    // The same pool serves a second call.
    index.delete(&["doc-a".to_string()]).await.unwrap();
    assert!(!semaphore.is_closed());
    assert!(h.transport.is_empty());
}
