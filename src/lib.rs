//! # LexGraph
//!
//! Legal-document ingestion into a versioned document store, a vector
//! index, and an authority knowledge graph.
//!
//! The pipeline itself lives in [`lexgraph_core`]; this crate supplies the
//! SQLite and filesystem backends, TOML configuration, progress rendering,
//! and the `lexgraph` CLI commands.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │ files / dir │──▶│ capture → parse → chunk  │──▶│  SQLite   │
//! │  (bulk)     │   │ + embed → graph          │   │ + blobs   │
//! └─────────────┘   └──────────────────────────┘   └────┬─────┘
//!                                                        │
//!                      ┌─────────────┬──────────────────┤
//!                      ▼             ▼                  ▼
//!                 ┌─────────┐  ┌──────────┐       ┌──────────┐
//!                 │ search  │  │  graph   │       │  export  │
//!                 └─────────┘  └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lexgraph init
//! lexgraph bulk ./demo-data
//! lexgraph graph --conflicts
//! lexgraph search "short-term rental" --jurisdiction municipal
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite-backed document store, vector index, and graph |
//! | [`blob_fs`] | Content-addressed filesystem blob store |
//! | [`progress`] | Stderr progress reporters |
//! | [`ingest`] | `ingest`, `bulk`, `revise`, and `purge` commands |
//! | [`get`] | Document detail |
//! | [`search`] | Keyword retrieval |
//! | [`graph_cmd`] | Graph edge listing |
//! | [`stats`] | Aggregate counts |
//! | [`export`] | JSON export with embedding projections |

pub mod blob_fs;
pub mod config;
pub mod db;
pub mod export;
pub mod get;
pub mod graph_cmd;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod sqlite_store;
pub mod stats;
