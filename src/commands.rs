//! CLI command implementations.
//!
//! Each `run_*` function backs one `docindex` subcommand: it reads its
//! input, calls the [`DocumentIndex`], and prints the outcome to stdout.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use docindex_core::models::{Chunk, IndexFilters, InferenceChunk, UpdateRequest};
use docindex_core::query::SearchMode;
use std::path::Path;

use crate::config::Config;
use crate::index::{DocumentIndex, SearchRequest};

pub async fn run_deploy(index: &dyn DocumentIndex) -> Result<()> {
    index
        .ensure_indices_exist()
        .await
        .context("Failed to deploy application package")?;
    println!("Application package deployed.");
    Ok(())
}

/// Parse JSON-lines chunks. Blank lines are skipped.
pub fn read_chunks(content: &str) -> Result<Vec<Chunk>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid chunk on line {}", n + 1))
        })
        .collect()
}

pub async fn run_index(index: &dyn DocumentIndex, path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read chunks file: {}", path.display()))?;
    let chunks = read_chunks(&content)?;
    if chunks.is_empty() {
        println!("No chunks to index.");
        return Ok(());
    }

    let mut records: Vec<_> = index.index(&chunks).await?.into_iter().collect();
    records.sort();
    for record in &records {
        println!("{}\t{}", record.document_id, record.already_existed);
    }
    Ok(())
}

pub async fn run_update(index: &dyn DocumentIndex, path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read update file: {}", path.display()))?;
    let requests: Vec<UpdateRequest> =
        serde_json::from_str(&content).with_context(|| "Failed to parse update requests")?;

    index.update(&requests).await?;
    println!("Applied {} update request(s).", requests.len());
    Ok(())
}

pub async fn run_delete(index: &dyn DocumentIndex, document_ids: &[String]) -> Result<()> {
    index.delete(document_ids).await?;
    println!("Deleted {} document(s).", document_ids.len());
    Ok(())
}

/// Flags of `docindex search`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub sources: Vec<String>,
    pub document_sets: Vec<String>,
    pub acl: Vec<String>,
    pub since: Option<String>,
    pub decay: Option<f64>,
    pub alpha: Option<f64>,
    pub json: bool,
}

pub fn build_index_filters(opts: &SearchOptions) -> Result<IndexFilters> {
    let non_empty = |v: &Vec<String>| if v.is_empty() { None } else { Some(v.clone()) };

    let time_cutoff = match &opts.since {
        Some(since) => {
            let date = NaiveDate::parse_from_str(since, "%Y-%m-%d")
                .with_context(|| format!("Invalid --since date: {}", since))?;
            let start = date
                .and_hms_opt(0, 0, 0)
                .context("Invalid --since date")?
                .and_utc();
            Some(start)
        }
        None => None,
    };

    Ok(IndexFilters {
        access_control_list: non_empty(&opts.acl),
        source_type: non_empty(&opts.sources),
        document_set: non_empty(&opts.document_sets),
        time_cutoff,
    })
}

pub async fn run_search(
    index: &dyn DocumentIndex,
    config: &Config,
    query: &str,
    mode: SearchMode,
    opts: &SearchOptions,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if matches!(mode, SearchMode::Semantic | SearchMode::Hybrid) && !config.embedding.is_enabled() {
        bail!(
            "Mode '{}' requires embeddings. Set [embedding] provider in config.",
            mode
        );
    }

    let mut request = SearchRequest::new(query, mode);
    request.filters = build_index_filters(opts)?;
    request.num_to_retrieve = opts.limit;
    request.alpha = opts.alpha;
    if let Some(decay) = opts.decay {
        request.time_decay_multiplier = decay;
    }

    let results = index.search(&request).await?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, chunk) in results.iter().enumerate() {
        print_hit(i + 1, chunk);
    }
    Ok(())
}

fn print_hit(rank: usize, chunk: &InferenceChunk) {
    println!(
        "{}. [{:.2}] {} / {}",
        rank, chunk.score, chunk.source_type, chunk.semantic_identifier
    );
    println!("    document: {} (chunk {})", chunk.document_id, chunk.chunk_id);
    if let Some(updated) = chunk.updated_at {
        println!("    updated: {}", updated.format("%Y-%m-%d"));
    }
    if let Some(link) = chunk.source_links.values().next() {
        println!("    url: {}", link);
    }
    for excerpt in &chunk.match_highlights {
        println!("    excerpt: \"{}\"", excerpt);
    }
    println!();
}

pub async fn run_get(
    index: &dyn DocumentIndex,
    document_id: &str,
    chunk: Option<usize>,
    json: bool,
) -> Result<()> {
    let chunks = index
        .id_based_retrieval(document_id, chunk, &IndexFilters::default())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }
    if chunks.is_empty() {
        bail!("document not found: {}", document_id);
    }

    let first = &chunks[0];
    println!("--- Document ---");
    println!("id:           {}", first.document_id);
    println!("title:        {}", first.semantic_identifier);
    println!("source:       {}", first.source_type);
    println!("hidden:       {}", first.hidden);
    println!("boost:        {}", first.boost);
    if let Some(updated) = first.updated_at {
        println!("updated_at:   {}", updated.to_rfc3339());
    }
    println!("metadata:     {}", serde_json::Value::Object(first.metadata.clone()));
    println!();

    println!("--- Chunks ({}) ---", chunks.len());
    for c in &chunks {
        println!("[chunk {}]", c.chunk_id);
        println!("{}", c.content);
        println!();
    }
    Ok(())
}
