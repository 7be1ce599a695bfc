//! Wire access to the remote index.
//!
//! The [`Transport`] trait is the only place requests leave the process.
//! [`HttpTransport`] talks to a live engine over HTTP; [`memory::InMemoryTransport`]
//! answers the same contract from an in-process map for tests and dry runs.
//!
//! # Contract
//!
//! | Method | HTTP | Expected statuses |
//! |--------|------|-------------------|
//! | [`get_document`](Transport::get_document) | `GET {doc}/{id}` | 200 present, 404 absent |
//! | [`put_document`](Transport::put_document) | `POST {doc}/{id}` | 200, 400 on invalid text |
//! | [`update_document`](Transport::update_document) | `PUT {doc}/{id}` | 200 |
//! | [`delete_document`](Transport::delete_document) | `DELETE {doc}/{id}` | 200 (also when absent) |
//! | [`search`](Transport::search) | `GET {search}?yql=..` | 200 |
//! | [`deploy_application`](Transport::deploy_application) | `POST {app}/tenant/default/prepareandactivate` | 200 |
//!
//! Statuses are returned, not interpreted: callers decide what a 404 means.

pub mod memory;

use async_trait::async_trait;
use docindex_core::error::{IndexError, Result};
use docindex_core::query::QueryParams;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<Value> {
        serde_json::from_str(&self.body)
            .map_err(|e| IndexError::MalformedResponse(format!("{}: {}", e, truncate(&self.body))))
    }

    /// Ok for 2xx, otherwise [`IndexError::Status`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    pub fn into_error(self) -> IndexError {
        IndexError::Status {
            status: self.status,
            body: self.body,
        }
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_document(&self, id: &str) -> Result<RawResponse>;

    /// Create or overwrite a document with `{"fields": ..}`.
    async fn put_document(&self, id: &str, body: &Value) -> Result<RawResponse>;

    /// Partial update with `{"fields": {name: {"assign": ..}}}`.
    async fn update_document(&self, id: &str, body: &Value) -> Result<RawResponse>;

    async fn delete_document(&self, id: &str) -> Result<RawResponse>;

    async fn search(&self, params: &QueryParams) -> Result<RawResponse>;

    /// Upload an application package (zip) to the config server.
    async fn deploy_application(&self, package: Vec<u8>) -> Result<RawResponse>;
}

/// [`Transport`] over HTTP with `reqwest`.
///
/// Document operations use the mutation timeout; searches use the longer
/// query timeout. Package uploads have their own deploy timeout.
pub struct HttpTransport {
    client: reqwest::Client,
    document_endpoint: String,
    search_endpoint: String,
    application_endpoint: String,
    mutation_timeout: Duration,
    query_timeout: Duration,
    deploy_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| IndexError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            document_endpoint: config.engine.document_endpoint(),
            search_endpoint: config.engine.search_endpoint(),
            application_endpoint: config.engine.application_endpoint(),
            mutation_timeout: config.mutation_timeout(),
            query_timeout: config.query_timeout(),
            deploy_timeout: config.deploy_timeout(),
        })
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.document_endpoint, id)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<RawResponse> {
        let response = request
            .send()
            .await
            .map_err(|e| IndexError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| IndexError::Transport(e.to_string()))?;
        Ok(RawResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_document(&self, id: &str) -> Result<RawResponse> {
        let url = self.document_url(id);
        debug!(url = %url, "GET document");
        self.send(self.client.get(&url).timeout(self.mutation_timeout))
            .await
    }

    async fn put_document(&self, id: &str, body: &Value) -> Result<RawResponse> {
        let url = self.document_url(id);
        debug!(url = %url, "Indexing to URL");
        self.send(
            self.client
                .post(&url)
                .timeout(self.mutation_timeout)
                .json(body),
        )
        .await
    }

    async fn update_document(&self, id: &str, body: &Value) -> Result<RawResponse> {
        let url = self.document_url(id);
        debug!(url = %url, body = %body, "Updating document");
        self.send(
            self.client
                .put(&url)
                .timeout(self.mutation_timeout)
                .json(body),
        )
        .await
    }

    async fn delete_document(&self, id: &str) -> Result<RawResponse> {
        let url = self.document_url(id);
        debug!(url = %url, "DELETE document");
        self.send(self.client.delete(&url).timeout(self.mutation_timeout))
            .await
    }

    async fn search(&self, params: &QueryParams) -> Result<RawResponse> {
        debug!(yql = %params.yql, "Search request");
        self.send(
            self.client
                .get(&self.search_endpoint)
                .timeout(self.query_timeout)
                .query(&params.to_pairs()),
        )
        .await
    }

    async fn deploy_application(&self, package: Vec<u8>) -> Result<RawResponse> {
        let url = format!(
            "{}/tenant/default/prepareandactivate",
            self.application_endpoint
        );
        debug!(url = %url, bytes = package.len(), "Sending application package");
        self.send(
            self.client
                .post(&url)
                .timeout(self.deploy_timeout)
                .header("Content-Type", "application/zip")
                .body(package),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOC_PATH: &str = "/document/v1/default/danswer_chunk/docid/abc";
    const DEPLOY_PATH: &str = "/application/v2/tenant/default/prepareandactivate";

    fn config_for(server: &MockServer) -> Config {
        let addr = server.address();
        let mut config = Config::default();
        config.engine.host = addr.ip().to_string();
        config.engine.port = addr.port();
        config.engine.tenant_port = addr.port();
        config
    }

    #[test]
    fn test_raw_response_status_handling() {
        assert!(RawResponse::new(204, "").is_success());
        let err = RawResponse::new(503, "busy").error_for_status().unwrap_err();
        assert!(matches!(err, IndexError::Status { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_raw_response_json() {
        let resp = RawResponse::new(200, r#"{"root": {}}"#);
        assert!(resp.json().unwrap().get("root").is_some());
        assert!(matches!(
            RawResponse::new(200, "not json").json(),
            Err(IndexError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_document_urls() {
        let transport = HttpTransport::new(&Config::default()).unwrap();
        assert_eq!(
            transport.document_url("abc"),
            "http://localhost:8081/document/v1/default/danswer_chunk/docid/abc"
        );
    }

    #[tokio::test]
    async fn test_insert_posts_and_update_puts() {
        let server = MockServer::start().await;
        let fields = json!({"fields": {"document_id": "doc-a", "chunk_id": 0}});
        let update = json!({"fields": {"hidden": {"assign": true}}});
        Mock::given(method("POST"))
            .and(path(DOC_PATH))
            .and(body_json(&fields))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(DOC_PATH))
            .and(body_json(&update))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&config_for(&server)).unwrap();
        assert_eq!(transport.put_document("abc", &fields).await.unwrap().status, 200);
        assert_eq!(
            transport.update_document("abc", &update).await.unwrap().status,
            200
        );
    }

    #[tokio::test]
    async fn test_get_and_delete_pass_status_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&config_for(&server)).unwrap();
        let got = transport.get_document("abc").await.unwrap();
        assert_eq!(got.status, 404);
        assert_eq!(got.body, "not found");
        assert_eq!(transport.delete_document("abc").await.unwrap().status, 503);
    }

    #[tokio::test]
    async fn test_search_sends_query_pairs() {
        let server = MockServer::start().await;
        let mut params = QueryParams::new("select * from danswer_chunk where true;");
        params.query = Some("quarterly revenue".to_string());
        params.hits = 10;
        params.offset = 5;
        params.timeout = Some("3s".to_string());
        Mock::given(method("GET"))
            .and(path("/search/"))
            .and(query_param("yql", params.yql.as_str()))
            .and(query_param("query", "quarterly revenue"))
            .and(query_param("hits", "10"))
            .and(query_param("offset", "5"))
            .and(query_param("timeout", "3s"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"root": {"fields": {}}})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&config_for(&server)).unwrap();
        let resp = transport.search(&params).await.unwrap();
        assert!(resp.json().unwrap().get("root").is_some());
    }

    #[tokio::test]
    async fn test_deploy_uploads_zip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEPLOY_PATH))
            .and(header("content-type", "application/zip"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&config_for(&server)).unwrap();
        let resp = transport
            .deploy_application(b"PK\x03\x04app".to_vec())
            .await
            .unwrap();
        assert_eq!(resp.status, 200);

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body, b"PK\x03\x04app");
    }

    #[tokio::test]
    async fn test_document_ops_use_shorter_timeout_than_search() {
        let server = MockServer::start().await;
        let slow = ResponseTemplate::new(200)
            .set_body_json(json!({"root": {}}))
            .set_delay(Duration::from_millis(1500));
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(slow.clone())
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/"))
            .respond_with(slow)
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.mutation.timeout_secs = 1;
        config.retrieval.query_timeout_secs = 2;
        let transport = HttpTransport::new(&config).unwrap();

        let err = transport.get_document("abc").await.unwrap_err();
        assert!(matches!(err, IndexError::Transport(_)));
        assert!(err.is_retryable());

        let resp = transport.search(&QueryParams::new("select *")).await.unwrap();
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn test_deploy_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEPLOY_PATH))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)))
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.engine.deploy_timeout_secs = 1;
        let transport = HttpTransport::new(&config).unwrap();

        let err = transport
            .deploy_application(b"zip".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Transport(_)));
    }
}
