//! Error taxonomy for index operations.
//!
//! Errors fall into five groups:
//!
//! | Group | Variants | Handling |
//! |-------|----------|----------|
//! | transient | [`Transport`](IndexError::Transport), server-side [`Status`](IndexError::Status) | retried with backoff |
//! | validation | client-side [`Status`](IndexError::Status), [`Rejected`](IndexError::Rejected) | recovered once by sanitizing text, then fatal |
//! | integrity | (logged, never raised) | degraded result |
//! | contract | [`NonUtcTimestamp`](IndexError::NonUtcTimestamp), [`EmptyQuery`](IndexError::EmptyQuery) | fail fast |
//! | batch | [`UpdateFailed`](IndexError::UpdateFailed), [`TaskFailed`](IndexError::TaskFailed) | raised after siblings finish |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// The request never produced a response (connect, timeout, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The index answered with a status the caller did not expect.
    #[error("index returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A chunk was refused even after its text fields were sanitized.
    #[error("index rejected chunk {chunk_id} of document '{document_id}' (HTTP {status}): {body}")]
    Rejected {
        document_id: String,
        chunk_id: usize,
        status: u16,
        body: String,
    },

    #[error("connectors must provide document update time in UTC, got offset {offset}")]
    NonUtcTimestamp { offset: String },

    #[error("no/empty query received")]
    EmptyQuery,

    #[error("malformed response from index: {0}")]
    MalformedResponse(String),

    #[error("malformed hit: missing field '{0}'")]
    MalformedHit(&'static str),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("worker pool is shut down")]
    PoolClosed,

    #[error("worker task failed: {0}")]
    TaskFailed(String),

    #[error("failed to update document '{document_id}': {source}")]
    UpdateFailed {
        document_id: String,
        #[source]
        source: Box<IndexError>,
    },

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("failed to prepare index application: {0}")]
    Deploy(String),
}

impl IndexError {
    /// Whether a retry policy should try the operation again.
    ///
    /// Network failures, server errors, throttling, and any unexpected
    /// non-client status are retryable. Client errors, contract violations,
    /// and decoding failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            IndexError::Transport(_) => true,
            IndexError::Status { status, .. } => *status == 429 || !(400..500).contains(status),
            IndexError::UpdateFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether this is a client-error response (the validation class).
    pub fn is_client_error(&self) -> bool {
        matches!(self, IndexError::Status { status, .. } if (400..500).contains(status) && *status != 429)
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> IndexError {
        IndexError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_server_errors_are_retryable() {
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(IndexError::Transport("reset".into()).is_retryable());
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        assert!(!status(400).is_retryable());
        assert!(status(400).is_client_error());
        assert!(!status(429).is_client_error());
        assert!(!IndexError::EmptyQuery.is_retryable());
        assert!(!IndexError::NonUtcTimestamp {
            offset: "+02:00".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_update_failed_inherits_retryability() {
        let err = IndexError::UpdateFailed {
            document_id: "doc".into(),
            source: Box::new(status(502)),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("doc"));
    }
}
