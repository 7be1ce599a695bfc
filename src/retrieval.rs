//! Ranked retrieval: keyword, semantic, hybrid, and admin.
//!
//! Every mode builds its query from the filter prefix plus a mode-specific
//! match clause (see [`docindex_core::query`]) and goes through
//! [`query_index`], which rejects empty queries, drops hits without content,
//! and decodes the rest.
//!
//! Vector modes embed the raw query. The `query` parameter carries the
//! processed keyword form, which drives weak-AND matching and highlight
//! term selection.

use docindex_core::codec::{decode_hit, hit_has_content, hit_identifier};
use docindex_core::error::{IndexError, Result};
use docindex_core::filters::build_filters;
use docindex_core::models::{IndexFilters, InferenceChunk};
use docindex_core::query::{
    hybrid_yql, keyword_yql, semantic_yql, QueryParams, SearchMode, TARGET_HITS_PER_RESULT,
};
use std::time::Instant;
use tracing::{debug, error, info};

use crate::client::{hits_of, IndexClient};
use crate::collaborators::{Clock, QueryEmbedder, QueryProcessor};
use crate::config::RetrievalConfig;

/// Issue one search and decode its hits.
pub async fn query_index(
    client: &IndexClient,
    config: &RetrievalConfig,
    params: QueryParams,
) -> Result<Vec<InferenceChunk>> {
    if matches!(&params.query, Some(q) if q.trim().is_empty()) {
        return Err(IndexError::EmptyQuery);
    }
    let params = params.timing(config.log_timing);

    let start = Instant::now();
    let body = client.search(&params).await?;
    if config.log_timing {
        info!(
            timing = %body.get("timing").cloned().unwrap_or_default(),
            "Index timing info"
        );
    }

    let hits = hits_of(&body)?;
    let mut chunks = Vec::with_capacity(hits.len());
    for hit in hits {
        if !hit_has_content(hit) {
            error!(
                id = %hit_identifier(hit),
                "Indexed chunk has no contents. The vector is not meaningful and keyword search cannot fetch it"
            );
            continue;
        }
        chunks.push(decode_hit(hit, config.summary_max_chars)?);
    }

    debug!(
        hits = hits.len(),
        returned = chunks.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Search finished"
    );
    Ok(chunks)
}

/// Collaborators and settings for ranked retrieval.
pub struct Retriever<'a> {
    pub client: &'a IndexClient,
    pub config: &'a RetrievalConfig,
    pub embedder: &'a dyn QueryEmbedder,
    pub processor: &'a dyn QueryProcessor,
    pub clock: &'a dyn Clock,
}

impl Retriever<'_> {
    fn filters(&self, filters: &IndexFilters, include_hidden: bool) -> String {
        build_filters(filters, include_hidden, self.clock.now())
    }

    fn decay(&self, time_decay_multiplier: f64) -> f64 {
        self.config.doc_time_decay * time_decay_multiplier
    }

    fn keywords(&self, query: &str, edit_keyword_query: bool) -> String {
        if edit_keyword_query {
            self.processor.strip_stop_words(query).join(" ")
        } else {
            query.to_string()
        }
    }

    fn base_params(&self, yql: String, query: String, num_to_retrieve: usize, mode: SearchMode) -> QueryParams {
        QueryParams::new(yql)
            .query(query)
            .hits(num_to_retrieve)
            .offset(0)
            .ranking(mode)
            .timeout(self.config.engine_timeout.clone())
    }

    pub async fn keyword(
        &self,
        query: &str,
        filters: &IndexFilters,
        time_decay_multiplier: f64,
        num_to_retrieve: usize,
        edit_keyword_query: bool,
    ) -> Result<Vec<InferenceChunk>> {
        ensure_query(query)?;
        let yql = keyword_yql(self.client.index_name(), &self.filters(filters, false));
        let final_query = if edit_keyword_query {
            self.processor.rewrite(query)
        } else {
            query.to_string()
        };

        let params = self
            .base_params(yql, final_query, num_to_retrieve, SearchMode::Keyword)
            .decay_factor(self.decay(time_decay_multiplier));
        query_index(self.client, self.config, params).await
    }

    pub async fn semantic(
        &self,
        query: &str,
        filters: &IndexFilters,
        time_decay_multiplier: f64,
        num_to_retrieve: usize,
        edit_keyword_query: bool,
    ) -> Result<Vec<InferenceChunk>> {
        ensure_query(query)?;
        let target_hits = TARGET_HITS_PER_RESULT * num_to_retrieve;
        let yql = semantic_yql(
            self.client.index_name(),
            &self.filters(filters, false),
            target_hits,
        );
        let embedding = self.embedder.embed(query).await?;

        let params = self
            .base_params(
                yql,
                self.keywords(query, edit_keyword_query),
                num_to_retrieve,
                SearchMode::Semantic,
            )
            .embedding(embedding)
            .decay_factor(self.decay(time_decay_multiplier));
        query_index(self.client, self.config, params).await
    }

    /// `alpha` weights the vector score against the keyword score; `None`
    /// uses the configured default.
    pub async fn hybrid(
        &self,
        query: &str,
        filters: &IndexFilters,
        time_decay_multiplier: f64,
        num_to_retrieve: usize,
        alpha: Option<f64>,
        edit_keyword_query: bool,
    ) -> Result<Vec<InferenceChunk>> {
        ensure_query(query)?;
        let target_hits = (TARGET_HITS_PER_RESULT * num_to_retrieve)
            .max(self.config.hybrid_target_hits_floor);
        let yql = hybrid_yql(
            self.client.index_name(),
            &self.filters(filters, false),
            target_hits,
        );
        let embedding = self.embedder.embed(query).await?;

        let params = self
            .base_params(
                yql,
                self.keywords(query, edit_keyword_query),
                num_to_retrieve,
                SearchMode::Hybrid,
            )
            .embedding(embedding)
            .decay_factor(self.decay(time_decay_multiplier))
            .alpha(alpha.unwrap_or(self.config.hybrid_alpha));
        query_index(self.client, self.config, params).await
    }

    /// Unranked-by-recency keyword search that includes hidden documents.
    pub async fn admin(
        &self,
        query: &str,
        filters: &IndexFilters,
        num_to_retrieve: usize,
    ) -> Result<Vec<InferenceChunk>> {
        ensure_query(query)?;
        let yql = keyword_yql(self.client.index_name(), &self.filters(filters, true));
        let params = self.base_params(yql, query.to_string(), num_to_retrieve, SearchMode::Admin);
        query_index(self.client, self.config, params).await
    }
}

fn ensure_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        Err(IndexError::EmptyQuery)
    } else {
        Ok(())
    }
}
