//! # LexGraph Core
//!
//! Shared, WASM-safe logic for LexGraph: legal-document models, the
//! token-aware chunker, the deterministic embedder, store traits with an
//! in-memory backend, knowledge-graph rules, keyword retrieval, and the
//! four-stage ingestion pipeline.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. The `lexgraph` application crate supplies
//! SQLite and filesystem-backed stores.
//!
//! ```text
//! raw bytes ─▶ dedup ─▶ A capture ─▶ B parse ─▶ C chunk+embed ─▶ D graph
//! ```

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod models;
pub mod parse;
pub mod pipeline;
pub mod progress;
pub mod search;
pub mod store;
