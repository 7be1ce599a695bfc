//! The document index facade.
//!
//! [`DocumentIndex`] is the contract the indexing pipeline and the search
//! layer program against. [`RemoteIndex`] implements it over a
//! [`Transport`], the immutable [`Config`], and the query collaborators.
//!
//! # Worker pools
//!
//! Each mutating call runs over a [`WorkerPool`]. By default the call
//! creates its own pool and closes it when done. A caller that chains many
//! calls can inject one semaphore with [`RemoteIndex::with_pool`]; the calls
//! then share it and never close it.

use async_trait::async_trait;
use docindex_core::error::{IndexError, Result};
use docindex_core::models::{
    Chunk, DocumentInsertionRecord, IndexFilters, InferenceChunk, UpdateRequest,
};
use docindex_core::query::SearchMode;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::client::IndexClient;
use crate::collaborators::{
    create_embedder, Clock, DisabledEmbedder, QueryEmbedder, QueryProcessor, StopwordProcessor,
    SystemClock,
};
use crate::config::Config;
use crate::lookup;
use crate::mutation;
use crate::pool::WorkerPool;
use crate::retrieval::Retriever;
use crate::retry::RetryPolicy;
use crate::transport::{HttpTransport, Transport};

/// One ranked search, dispatched by [`DocumentIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    pub filters: IndexFilters,
    pub time_decay_multiplier: f64,
    /// `None` uses `retrieval.num_returned_hits`.
    pub num_to_retrieve: Option<usize>,
    /// Hybrid only. `None` uses `retrieval.hybrid_alpha`.
    pub alpha: Option<f64>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            query: query.into(),
            mode,
            filters: IndexFilters::default(),
            time_decay_multiplier: 1.0,
            num_to_retrieve: None,
            alpha: None,
        }
    }
}

#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Deploy the application package so the schema is current.
    async fn ensure_indices_exist(&self) -> Result<()>;

    /// Replace the stored chunks of every document present in `chunks`.
    async fn index(&self, chunks: &[Chunk]) -> Result<HashSet<DocumentInsertionRecord>>;

    async fn update(&self, requests: &[UpdateRequest]) -> Result<()>;

    async fn delete(&self, document_ids: &[String]) -> Result<()>;

    async fn id_based_retrieval(
        &self,
        document_id: &str,
        chunk_ind: Option<usize>,
        filters: &IndexFilters,
    ) -> Result<Vec<InferenceChunk>>;

    async fn keyword_retrieval(
        &self,
        query: &str,
        filters: &IndexFilters,
        time_decay_multiplier: f64,
        num_to_retrieve: usize,
    ) -> Result<Vec<InferenceChunk>>;

    async fn semantic_retrieval(
        &self,
        query: &str,
        filters: &IndexFilters,
        time_decay_multiplier: f64,
        num_to_retrieve: usize,
    ) -> Result<Vec<InferenceChunk>>;

    async fn hybrid_retrieval(
        &self,
        query: &str,
        filters: &IndexFilters,
        time_decay_multiplier: f64,
        num_to_retrieve: usize,
        alpha: Option<f64>,
    ) -> Result<Vec<InferenceChunk>>;

    async fn admin_retrieval(
        &self,
        query: &str,
        filters: &IndexFilters,
        num_to_retrieve: usize,
    ) -> Result<Vec<InferenceChunk>>;

    fn default_num_to_retrieve(&self) -> usize;

    async fn search(&self, request: &SearchRequest) -> Result<Vec<InferenceChunk>> {
        let num = request
            .num_to_retrieve
            .unwrap_or_else(|| self.default_num_to_retrieve());
        let q = request.query.as_str();
        let f = &request.filters;
        let decay = request.time_decay_multiplier;
        match request.mode {
            SearchMode::Keyword => self.keyword_retrieval(q, f, decay, num).await,
            SearchMode::Semantic => self.semantic_retrieval(q, f, decay, num).await,
            SearchMode::Hybrid => {
                self.hybrid_retrieval(q, f, decay, num, request.alpha)
                    .await
            }
            SearchMode::Admin => self.admin_retrieval(q, f, num).await,
        }
    }
}

pub struct RemoteIndex {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    client: IndexClient,
    embedder: Arc<dyn QueryEmbedder>,
    processor: Arc<dyn QueryProcessor>,
    clock: Arc<dyn Clock>,
    shared_pool: Option<Arc<Semaphore>>,
}

impl RemoteIndex {
    /// An index over `transport` with the default collaborators: no
    /// embedder, the stop-word processor, and the system clock.
    pub fn new(config: Arc<Config>, transport: Arc<dyn Transport>) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        let client = IndexClient::new(Arc::clone(&transport), &config, retry);
        Self {
            config,
            transport,
            client,
            embedder: Arc::new(DisabledEmbedder),
            processor: Arc::new(StopwordProcessor::default()),
            clock: Arc::new(SystemClock),
            shared_pool: None,
        }
    }

    /// An index over HTTP with the configured embedder.
    pub fn from_config(config: Arc<Config>) -> anyhow::Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        let embedder = create_embedder(&config.embedding)?;
        Ok(Self::new(config, transport).with_embedder(embedder))
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn QueryEmbedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn QueryProcessor>) -> Self {
        self.processor = processor;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.client = IndexClient::new(Arc::clone(&self.transport), &self.config, retry);
        self
    }

    /// Share `semaphore` across calls instead of creating a pool per call.
    pub fn with_pool(mut self, semaphore: Arc<Semaphore>) -> Self {
        self.shared_pool = Some(semaphore);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn pool(&self) -> WorkerPool {
        match &self.shared_pool {
            Some(semaphore) => WorkerPool::shared(Arc::clone(semaphore)),
            None => WorkerPool::new(self.config.mutation.num_threads),
        }
    }

    fn retriever(&self) -> Retriever<'_> {
        Retriever {
            client: &self.client,
            config: &self.config.retrieval,
            embedder: self.embedder.as_ref(),
            processor: self.processor.as_ref(),
            clock: self.clock.as_ref(),
        }
    }
}

#[async_trait]
impl DocumentIndex for RemoteIndex {
    async fn ensure_indices_exist(&self) -> Result<()> {
        let path = self
            .config
            .engine
            .deployment_zip
            .as_ref()
            .ok_or_else(|| IndexError::Deploy("engine.deployment_zip is not set".to_string()))?;
        let package = tokio::fs::read(path)
            .await
            .map_err(|e| IndexError::Deploy(format!("{}: {}", path.display(), e)))?;

        debug!(bytes = package.len(), "Sending application package");
        let resp = self.client.deploy(package).await?;
        if resp.status != 200 {
            return Err(IndexError::Deploy(format!(
                "Failed to prepare index. Response: {}",
                resp.body
            )));
        }
        info!("Application package activated");
        Ok(())
    }

    async fn index(&self, chunks: &[Chunk]) -> Result<HashSet<DocumentInsertionRecord>> {
        let start = Instant::now();
        let pool = self.pool();
        let result = mutation::index_chunks(
            &self.client,
            &pool,
            self.config.mutation.batch_size,
            chunks,
        )
        .await;
        pool.shutdown();

        let records = result?;
        info!(
            chunks = chunks.len(),
            documents = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Indexed chunks"
        );
        Ok(records)
    }

    async fn update(&self, requests: &[UpdateRequest]) -> Result<()> {
        let pool = self.pool();
        let result = mutation::update_documents(
            &self.client,
            &pool,
            self.config.mutation.batch_size,
            requests,
        )
        .await;
        pool.shutdown();
        result
    }

    async fn delete(&self, document_ids: &[String]) -> Result<()> {
        let pool = self.pool();
        let result = mutation::delete_documents(
            &self.client,
            &pool,
            self.config.mutation.batch_size,
            document_ids,
        )
        .await;
        pool.shutdown();
        result
    }

    async fn id_based_retrieval(
        &self,
        document_id: &str,
        chunk_ind: Option<usize>,
        filters: &IndexFilters,
    ) -> Result<Vec<InferenceChunk>> {
        let pool = self.pool();
        let result = lookup::id_based_retrieval(
            &self.client,
            &pool,
            &self.config.retrieval,
            document_id,
            chunk_ind,
            filters,
            self.clock.now(),
        )
        .await;
        pool.shutdown();
        result
    }

    async fn keyword_retrieval(
        &self,
        query: &str,
        filters: &IndexFilters,
        time_decay_multiplier: f64,
        num_to_retrieve: usize,
    ) -> Result<Vec<InferenceChunk>> {
        self.retriever()
            .keyword(
                query,
                filters,
                time_decay_multiplier,
                num_to_retrieve,
                self.config.retrieval.edit_keyword_query,
            )
            .await
    }

    async fn semantic_retrieval(
        &self,
        query: &str,
        filters: &IndexFilters,
        time_decay_multiplier: f64,
        num_to_retrieve: usize,
    ) -> Result<Vec<InferenceChunk>> {
        self.retriever()
            .semantic(
                query,
                filters,
                time_decay_multiplier,
                num_to_retrieve,
                self.config.retrieval.edit_keyword_query,
            )
            .await
    }

    async fn hybrid_retrieval(
        &self,
        query: &str,
        filters: &IndexFilters,
        time_decay_multiplier: f64,
        num_to_retrieve: usize,
        alpha: Option<f64>,
    ) -> Result<Vec<InferenceChunk>> {
        self.retriever()
            .hybrid(
                query,
                filters,
                time_decay_multiplier,
                num_to_retrieve,
                alpha,
                self.config.retrieval.edit_keyword_query,
            )
            .await
    }

    async fn admin_retrieval(
        &self,
        query: &str,
        filters: &IndexFilters,
        num_to_retrieve: usize,
    ) -> Result<Vec<InferenceChunk>> {
        self.retriever().admin(query, filters, num_to_retrieve).await
    }

    fn default_num_to_retrieve(&self) -> usize {
        self.config.retrieval.num_returned_hits
    }
}
