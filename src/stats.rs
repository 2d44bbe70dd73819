//! Database statistics.
//!
//! Summarizes what has been ingested: record counts per entity kind, a
//! per-jurisdiction breakdown of documents and chunks, and graph edges by
//! type. Used by `lexgraph stats`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

/// Aggregate counts across the store.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngestionStats {
    pub blob_objects: i64,
    pub documents: i64,
    pub document_versions: i64,
    pub sections: i64,
    pub section_versions: i64,
    pub chunks: i64,
    pub graph_nodes: i64,
    pub graph_edges: i64,
}

/// Document and chunk counts for one jurisdiction.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JurisdictionStats {
    pub jurisdiction: String,
    pub documents: i64,
    pub chunks: i64,
}

async fn count(pool: &SqlitePool, table: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?)
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<IngestionStats> {
    Ok(IngestionStats {
        blob_objects: count(pool, "blob_objects").await?,
        documents: count(pool, "documents").await?,
        document_versions: count(pool, "document_versions").await?,
        sections: count(pool, "sections").await?,
        section_versions: count(pool, "section_versions").await?,
        chunks: count(pool, "vector_chunks").await?,
        graph_nodes: count(pool, "graph_nodes").await?,
        graph_edges: count(pool, "graph_edges").await?,
    })
}

/// Per-jurisdiction breakdown, highest jurisdiction first.
pub async fn jurisdiction_stats(pool: &SqlitePool) -> Result<Vec<JurisdictionStats>> {
    let rows = sqlx::query(
        r#"
        SELECT
            d.jurisdiction,
            COUNT(DISTINCT d.id) AS doc_count,
            (SELECT COUNT(*) FROM vector_chunks c WHERE c.jurisdiction = d.jurisdiction)
                AS chunk_count
        FROM documents d
        GROUP BY d.jurisdiction
        ORDER BY CASE d.jurisdiction
            WHEN 'federal' THEN 0 WHEN 'state' THEN 1 ELSE 2 END
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| JurisdictionStats {
            jurisdiction: row.get("jurisdiction"),
            documents: row.get("doc_count"),
            chunks: row.get("chunk_count"),
        })
        .collect())
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let stats = collect_stats(&pool).await?;
    let by_jurisdiction = jurisdiction_stats(&pool).await?;
    let edge_rows = sqlx::query(
        "SELECT edge_type, COUNT(*) AS n FROM graph_edges GROUP BY edge_type ORDER BY edge_type",
    )
    .fetch_all(&pool)
    .await?;
    let last_ingest: Option<String> =
        sqlx::query_scalar("SELECT MAX(ingested_at) FROM document_versions")
            .fetch_one(&pool)
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("LexGraph — Database Stats");
    println!("=========================");
    println!();
    println!("  Database:          {}", config.db.path.display());
    println!("  Size:              {}", format_bytes(db_size));
    println!();
    println!("  Blob objects:      {}", stats.blob_objects);
    println!("  Documents:         {}", stats.documents);
    println!("  Document versions: {}", stats.document_versions);
    println!("  Sections:          {}", stats.sections);
    println!("  Section versions:  {}", stats.section_versions);
    println!("  Chunks:            {}", stats.chunks);
    println!("  Graph nodes:       {}", stats.graph_nodes);
    println!("  Graph edges:       {}", stats.graph_edges);
    println!(
        "  Last ingest:       {}",
        last_ingest
            .as_deref()
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    if !by_jurisdiction.is_empty() {
        println!();
        println!("  By jurisdiction:");
        println!("  {:<16} {:>6} {:>8}", "JURISDICTION", "DOCS", "CHUNKS");
        println!("  {}", "-".repeat(32));
        for j in &by_jurisdiction {
            println!("  {:<16} {:>6} {:>8}", j.jurisdiction, j.documents, j.chunks);
        }
    }

    if !edge_rows.is_empty() {
        println!();
        println!("  Edges by type:");
        for row in &edge_rows {
            let edge_type: String = row.get("edge_type");
            let n: i64 = row.get("n");
            println!("  {:<16} {:>6}", edge_type, n);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format an RFC 3339 timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: &str) -> String {
    let Ok(parsed) = DateTime::parse_from_rfc3339(ts) else {
        return ts.to_string();
    };
    let parsed = parsed.with_timezone(&Utc);
    let delta = (Utc::now() - parsed).num_seconds();

    if delta < 0 {
        parsed.format("%Y-%m-%d %H:%M").to_string()
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        parsed.format("%Y-%m-%d %H:%M").to_string()
    }
}
