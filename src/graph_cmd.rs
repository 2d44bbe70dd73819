//! Knowledge-graph listing.
//!
//! `lexgraph graph` prints edges with labelled endpoints. `--document`
//! restricts the listing to edges touching that document's nodes and
//! `--conflicts` to `CONFLICTS_WITH` edges.

use anyhow::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use lexgraph_core::models::{EdgeType, GraphEdge, GraphNode};
use lexgraph_core::store::GraphStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRow {
    pub source: String,
    pub target: String,
    #[serde(flatten)]
    pub edge: GraphEdge,
}

/// Edges matching the filters, in insertion order.
pub async fn list_graph<S>(
    store: &S,
    document_id: Option<&str>,
    conflicts_only: bool,
) -> Result<Vec<EdgeRow>>
where
    S: GraphStore + ?Sized,
{
    let nodes: HashMap<String, GraphNode> = store
        .list_nodes()
        .await?
        .into_iter()
        .map(|n| (n.id.clone(), n))
        .collect();

    let scope: Option<HashSet<&str>> = document_id.map(|doc| {
        nodes
            .values()
            .filter(|n| n.document_id.as_deref() == Some(doc))
            .map(|n| n.id.as_str())
            .collect()
    });

    let label = |id: &str| nodes.get(id).map(|n| n.label.clone()).unwrap_or_default();

    let mut rows = Vec::new();
    for edge in store.list_edges().await? {
        if conflicts_only && edge.edge_type != EdgeType::ConflictsWith {
            continue;
        }
        if let Some(scope) = &scope {
            if !scope.contains(edge.source_node_id.as_str())
                && !scope.contains(edge.target_node_id.as_str())
            {
                continue;
            }
        }
        rows.push(EdgeRow {
            source: label(&edge.source_node_id),
            target: label(&edge.target_node_id),
            edge,
        });
    }
    Ok(rows)
}

pub async fn run_graph(
    config: &Config,
    document_id: Option<&str>,
    conflicts_only: bool,
    json: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let rows = list_graph(&store, document_id, conflicts_only).await;
    pool.close().await;
    let rows = rows?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No edges.");
        return Ok(());
    }

    for row in &rows {
        println!(
            "{} -[{}]-> {}",
            row.source, row.edge.edge_type, row.target
        );
        if let Some(severity) = row.edge.severity {
            println!("    severity: {}", severity);
        }
        if let Some(rationale) = &row.edge.rationale {
            println!("    {}", rationale);
        }
    }
    println!();
    println!("{} edges", rows.len());
    Ok(())
}
