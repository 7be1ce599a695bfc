//! # docindex
//!
//! Keeps a chunk-level document index in a remote search engine in sync
//! with upstream documents, and runs keyword, semantic, hybrid, and admin
//! queries against it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │  Indexing    │──▶│   Mutation    │──▶│              │
//! │  pipeline    │   │ exists/purge/ │   │              │
//! └──────────────┘   │ write/update  │   │   Remote     │
//!                    └───────────────┘   │   index      │
//! ┌──────────────┐   ┌───────────────┐   │  (HTTP)      │
//! │   Search     │──▶│  Retrieval /  │──▶│              │
//! │   callers    │   │    Lookup     │   │              │
//! └──────────────┘   └───────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docindex deploy                       # push the application package
//! docindex index chunks.jsonl           # replace documents' chunks
//! docindex search "quarterly revenue" --mode hybrid
//! docindex get doc-42 --chunk 0
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`transport`] | HTTP and in-memory access to the remote index |
//! | [`retry`] | Exponential-backoff retry policy |
//! | [`pool`] | Bounded worker pool with owned/shared lifecycle |
//! | [`client`] | Retried requests and chunk-id scans |
//! | [`collaborators`] | Embedder, query processor, and clock |
//! | [`mutation`] | Index, delete, and partial update |
//! | [`retrieval`] | Keyword, semantic, hybrid, and admin search |
//! | [`lookup`] | Retrieval by document id |
//! | [`index`] | The `DocumentIndex` facade |
//! | [`commands`] | CLI command implementations |
//!
//! Pure logic (data model, filters, codec, summary truncation, query
//! templates) lives in the `docindex-core` crate.

pub mod client;
pub mod collaborators;
pub mod commands;
pub mod config;
pub mod index;
pub mod lookup;
pub mod mutation;
pub mod pool;
pub mod retrieval;
pub mod retry;
pub mod transport;

pub use docindex_core as core;
pub use index::{DocumentIndex, RemoteIndex, SearchRequest};
