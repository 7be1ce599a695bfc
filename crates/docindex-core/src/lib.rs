//! # docindex core
//!
//! Runtime-free logic shared by the `docindex` gateway: the chunk data
//! model, the error taxonomy, predicate construction for the remote index's
//! query language, the wire codec for chunk documents, highlight summary
//! truncation, and the query templates for each retrieval mode.
//!
//! This crate performs no I/O. Everything that talks to the network lives in
//! the `docindex` app crate.

pub mod codec;
pub mod error;
pub mod filters;
pub mod models;
pub mod query;
pub mod sanitize;
pub mod summary;

pub use error::{IndexError, Result};
