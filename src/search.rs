//! `lexgraph search`: keyword retrieval over the vector index with
//! metadata filters.

use anyhow::Result;

use lexgraph_core::models::{AuthorityLevel, Jurisdiction};
use lexgraph_core::search::search_chunks;
use lexgraph_core::store::ChunkFilter;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub const DEFAULT_LIMIT: usize = 10;

pub async fn run_search(
    config: &Config,
    query: &str,
    jurisdiction: Option<&str>,
    authority: Option<&str>,
    document_id: Option<String>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let filter = ChunkFilter {
        jurisdiction: jurisdiction.map(str::parse::<Jurisdiction>).transpose()?,
        authority_level: authority.map(str::parse::<AuthorityLevel>).transpose()?,
        document_id,
        ..Default::default()
    };

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let hits = search_chunks(&store, query, &filter, limit.unwrap_or(DEFAULT_LIMIT)).await;
    pool.close().await;
    let hits = hits?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.2}] {}  {} / {}",
            i + 1,
            hit.score,
            hit.citation,
            hit.jurisdiction,
            hit.authority_level
        );
        if !hit.heading.is_empty() {
            println!("    {}", hit.heading);
        }
        println!("    document: {}  chunk: {}", hit.document_id, hit.chunk_index);
        println!("    > {}", hit.snippet.replace('\n', " "));
        println!();
    }
    Ok(())
}
