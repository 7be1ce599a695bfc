//! Query-language templates and typed request parameters.
//!
//! Every retrieval mode selects the same field list and differs only in its
//! match clause and ranking profile:
//!
//! | Mode | Match clause | Ranking profile |
//! |------|--------------|-----------------|
//! | keyword | weak-AND ∪ highlight fallback | `keyword_search` |
//! | semantic | nearest-neighbor ∪ highlight fallback | `semantic_search` |
//! | hybrid | nearest-neighbor ∪ weak-AND ∪ highlight fallback | `hybrid_search` |
//! | admin | weak-AND ∪ highlight fallback | `admin_search` |
//!
//! The highlight fallback is a full-text match on the summary field; exact
//! N-gram highlighting on the primary field is unreliable, so the summary
//! duplicate is matched as well.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::codec::fields;
use crate::filters::quote;

/// Nearest-neighbor candidate count per requested hit.
pub const TARGET_HITS_PER_RESULT: usize = 10;

const SELECT_FIELDS: &[&str] = &[
    fields::DOCUMENTID,
    fields::DOCUMENT_ID,
    fields::CHUNK_ID,
    fields::BLURB,
    fields::CONTENT,
    fields::SOURCE_TYPE,
    fields::SOURCE_LINKS,
    fields::SEMANTIC_IDENTIFIER,
    fields::SECTION_CONTINUATION,
    fields::BOOST,
    fields::HIDDEN,
    fields::DOC_UPDATED_AT,
    fields::PRIMARY_OWNERS,
    fields::SECONDARY_OWNERS,
    fields::METADATA,
    fields::CONTENT_SUMMARY,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Keyword,
    Semantic,
    Hybrid,
    Admin,
}

impl SearchMode {
    pub fn ranking_profile(&self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword_search",
            SearchMode::Semantic => "semantic_search",
            SearchMode::Hybrid => "hybrid_search",
            SearchMode::Admin => "admin_search",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
            SearchMode::Admin => "admin",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyword" => Ok(SearchMode::Keyword),
            "semantic" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            "admin" => Ok(SearchMode::Admin),
            other => Err(format!(
                "Unknown search mode: {}. Use keyword, semantic, hybrid, or admin.",
                other
            )),
        }
    }
}

/// `select <fields> from <index> where `
pub fn yql_base(index_name: &str) -> String {
    format!(
        "select {} from {} where ",
        SELECT_FIELDS.join(", "),
        index_name
    )
}

fn highlight_clause() -> String {
    format!(
        "({{defaultIndex: \"{}\"}}userInput(@query))",
        fields::CONTENT_SUMMARY
    )
}

fn nearest_neighbor_clause(target_hits: usize) -> String {
    format!(
        "({{targetHits: {}}}nearestNeighbor({}, query_embedding))",
        target_hits,
        fields::EMBEDDINGS
    )
}

const WEAK_AND_CLAUSE: &str = "({grammar: \"weakAnd\"}userInput(@query))";

/// Keyword and admin queries: weak-AND plus the highlight fallback.
pub fn keyword_yql(index_name: &str, filters: &str) -> String {
    format!(
        "{}{}({} or {})",
        yql_base(index_name),
        filters,
        WEAK_AND_CLAUSE,
        highlight_clause()
    )
}

pub fn semantic_yql(index_name: &str, filters: &str, target_hits: usize) -> String {
    format!(
        "{}{}({} or {})",
        yql_base(index_name),
        filters,
        nearest_neighbor_clause(target_hits),
        highlight_clause()
    )
}

pub fn hybrid_yql(index_name: &str, filters: &str, target_hits: usize) -> String {
    format!(
        "{}{}({} or {} or {})",
        yql_base(index_name),
        filters,
        nearest_neighbor_clause(target_hits),
        WEAK_AND_CLAUSE,
        highlight_clause()
    )
}

/// Exact `(document, chunk index)` lookup.
pub fn chunk_lookup_yql(index_name: &str, filters: &str, document_id: &str, chunk_id: usize) -> String {
    format!(
        "{}{}({} contains {} and {} contains {})",
        yql_base(index_name),
        filters,
        fields::DOCUMENT_ID,
        quote(document_id),
        fields::CHUNK_ID,
        quote(&chunk_id.to_string())
    )
}

/// Resolve the engine ids of every chunk of a document.
pub fn chunk_id_scan_yql(index_name: &str, filters: &str, document_id: &str) -> String {
    format!(
        "select {} from {} where {}{} contains {}",
        fields::DOCUMENTID,
        index_name,
        filters,
        fields::DOCUMENT_ID,
        quote(document_id)
    )
}

/// Parameters of one search request.
///
/// [`to_pairs`](QueryParams::to_pairs) serializes them in a fixed order so
/// that requests are reproducible and easy to assert on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub yql: String,
    /// Free text bound to `@query`.
    pub query: Option<String>,
    pub hits: usize,
    pub offset: usize,
    pub ranking_profile: Option<&'static str>,
    /// Engine-side time budget, e.g. `"3s"`.
    pub timeout: Option<String>,
    pub decay_factor: Option<f64>,
    pub query_embedding: Option<Vec<f32>>,
    pub alpha: Option<f64>,
    /// Ask the engine to report timing information.
    pub timing: bool,
}

impl QueryParams {
    pub fn new(yql: impl Into<String>) -> Self {
        Self {
            yql: yql.into(),
            ..Default::default()
        }
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn hits(mut self, hits: usize) -> Self {
        self.hits = hits;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn ranking(mut self, mode: SearchMode) -> Self {
        self.ranking_profile = Some(mode.ranking_profile());
        self
    }

    pub fn timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn decay_factor(mut self, decay: f64) -> Self {
        self.decay_factor = Some(decay);
        self
    }

    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.query_embedding = Some(embedding);
        self
    }

    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn timing(mut self, timing: bool) -> Self {
        self.timing = timing;
        self
    }

    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("yql".to_string(), self.yql.clone())];
        if let Some(q) = &self.query {
            pairs.push(("query".to_string(), q.clone()));
        }
        if let Some(emb) = &self.query_embedding {
            pairs.push(("input.query(query_embedding)".to_string(), format_vector(emb)));
        }
        if let Some(decay) = self.decay_factor {
            pairs.push(("input.query(decay_factor)".to_string(), decay.to_string()));
        }
        if let Some(alpha) = self.alpha {
            pairs.push(("input.query(alpha)".to_string(), alpha.to_string()));
        }
        pairs.push(("hits".to_string(), self.hits.to_string()));
        pairs.push(("offset".to_string(), self.offset.to_string()));
        if let Some(profile) = self.ranking_profile {
            pairs.push(("ranking.profile".to_string(), profile.to_string()));
        }
        if let Some(timeout) = &self.timeout {
            pairs.push(("timeout".to_string(), timeout.clone()));
        }
        if self.timing {
            pairs.push(("presentation.timing".to_string(), "true".to_string()));
        }
        pairs
    }
}

fn format_vector(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(","))
}
