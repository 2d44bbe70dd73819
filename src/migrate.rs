//! Idempotent schema migrations.
//!
//! Tables follow the pipeline stages: blob captures, versioned documents
//! and sections, the vector index, and the graph adjacency tables. Dates
//! are stored as `YYYY-MM-DD` text, timestamps as RFC 3339 text, and
//! embeddings as little-endian f32 BLOBs.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS blob_objects (
        id TEXT PRIMARY KEY,
        key TEXT NOT NULL,
        source TEXT NOT NULL,
        checksum TEXT NOT NULL,
        content_type TEXT NOT NULL,
        file_size_bytes INTEGER NOT NULL,
        fetched_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        jurisdiction TEXT NOT NULL,
        authority_level TEXT NOT NULL,
        source TEXT NOT NULL,
        effective_from TEXT NOT NULL,
        effective_to TEXT,
        current_version_id TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS document_versions (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        version_number INTEGER NOT NULL,
        effective_from TEXT NOT NULL,
        effective_to TEXT,
        source_blob_id TEXT,
        ingested_at TEXT NOT NULL,
        UNIQUE(document_id, version_number),
        FOREIGN KEY (document_id) REFERENCES documents(id),
        FOREIGN KEY (source_blob_id) REFERENCES blob_objects(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sections (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        citation TEXT NOT NULL,
        heading TEXT NOT NULL,
        FOREIGN KEY (document_id) REFERENCES documents(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS section_versions (
        id TEXT PRIMARY KEY,
        section_id TEXT NOT NULL,
        document_version_id TEXT NOT NULL,
        text TEXT NOT NULL,
        token_count INTEGER NOT NULL,
        FOREIGN KEY (section_id) REFERENCES sections(id),
        FOREIGN KEY (document_version_id) REFERENCES document_versions(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vector_chunks (
        id TEXT PRIMARY KEY,
        section_version_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        text TEXT NOT NULL,
        token_count INTEGER NOT NULL,
        embedding BLOB NOT NULL,
        dims INTEGER NOT NULL,
        jurisdiction TEXT NOT NULL,
        authority_level TEXT NOT NULL,
        effective_from TEXT NOT NULL,
        citation TEXT NOT NULL,
        document_id TEXT NOT NULL,
        heading TEXT NOT NULL,
        FOREIGN KEY (section_version_id) REFERENCES section_versions(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS graph_nodes (
        id TEXT PRIMARY KEY,
        label TEXT NOT NULL,
        node_type TEXT NOT NULL,
        jurisdiction TEXT NOT NULL,
        authority_level TEXT NOT NULL,
        citation TEXT,
        effective_from TEXT,
        document_id TEXT,
        section_id TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS graph_edges (
        id TEXT PRIMARY KEY,
        source_node_id TEXT NOT NULL,
        target_node_id TEXT NOT NULL,
        edge_type TEXT NOT NULL,
        severity TEXT,
        rationale TEXT,
        UNIQUE(source_node_id, target_node_id, edge_type),
        FOREIGN KEY (source_node_id) REFERENCES graph_nodes(id),
        FOREIGN KEY (target_node_id) REFERENCES graph_nodes(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_blob_objects_checksum ON blob_objects(checksum)",
    "CREATE INDEX IF NOT EXISTS idx_documents_title ON documents(title)",
    "CREATE INDEX IF NOT EXISTS idx_sections_document_id ON sections(document_id)",
    "CREATE INDEX IF NOT EXISTS idx_section_versions_dv ON section_versions(document_version_id)",
    "CREATE INDEX IF NOT EXISTS idx_vector_chunks_document_id ON vector_chunks(document_id)",
    "CREATE INDEX IF NOT EXISTS idx_vector_chunks_jurisdiction ON vector_chunks(jurisdiction)",
    "CREATE INDEX IF NOT EXISTS idx_graph_nodes_document_id ON graph_nodes(document_id)",
];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes on an open pool.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
