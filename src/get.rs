//! Document retrieval by ID.
//!
//! Assembles a document with its version history, the section texts of
//! its current version, and the graph edges that touch its document node.

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashMap;

use lexgraph_core::models::{Document, DocumentVersion, GraphEdge};
use lexgraph_core::store::{ChunkFilter, DocumentStore, GraphStore, VectorIndex};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetail {
    pub document: Document,
    pub versions: Vec<DocumentVersion>,
    pub sections: Vec<SectionDetail>,
    pub chunk_count: usize,
    pub edges: Vec<EdgeDetail>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionDetail {
    pub citation: String,
    pub heading: String,
    pub token_count: usize,
    pub text: String,
}

/// An edge touching the document, with both endpoints labelled.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDetail {
    pub edge: GraphEdge,
    pub source_label: String,
    pub target_label: String,
}

/// Load a document and everything hanging off it.
pub async fn get_document<S>(store: &S, id: &str) -> Result<DocumentDetail>
where
    S: DocumentStore + VectorIndex + GraphStore + ?Sized,
{
    let Some(document) = store.get_document(id).await? else {
        bail!("document not found: {}", id);
    };
    let versions = store.list_document_versions(id).await?;

    let section_meta: HashMap<String, (String, String)> = store
        .list_sections(id)
        .await?
        .into_iter()
        .map(|s| (s.id, (s.citation, s.heading)))
        .collect();
    let mut sections = Vec::new();
    if let Some(current) = &document.current_version_id {
        for sv in store.list_section_versions(current).await? {
            let (citation, heading) = section_meta
                .get(&sv.section_id)
                .cloned()
                .unwrap_or_default();
            sections.push(SectionDetail {
                citation,
                heading,
                token_count: sv.token_count,
                text: sv.text,
            });
        }
    }

    let chunk_count = store
        .list_chunks(&ChunkFilter {
            document_id: Some(id.to_string()),
            ..Default::default()
        })
        .await?
        .len();

    let mut edges = Vec::new();
    if let Some(node) = store.find_document_node(id).await? {
        let labels: HashMap<String, String> = store
            .list_nodes()
            .await?
            .into_iter()
            .map(|n| (n.id, n.label))
            .collect();
        for edge in store.list_edges().await? {
            if edge.source_node_id != node.id && edge.target_node_id != node.id {
                continue;
            }
            edges.push(EdgeDetail {
                source_label: labels.get(&edge.source_node_id).cloned().unwrap_or_default(),
                target_label: labels.get(&edge.target_node_id).cloned().unwrap_or_default(),
                edge,
            });
        }
    }

    Ok(DocumentDetail {
        document,
        versions,
        sections,
        chunk_count,
        edges,
    })
}

/// CLI entry point: print the document to stdout.
pub async fn run_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let detail = get_document(&store, id).await;
    pool.close().await;
    let detail = detail?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let doc = &detail.document;
    println!("--- Document ---");
    println!("id:              {}", doc.id);
    println!("title:           {}", doc.title);
    println!("jurisdiction:    {}", doc.jurisdiction);
    println!("authority_level: {}", doc.authority_level);
    println!("source:          {}", doc.source);
    println!("effective_from:  {}", doc.effective_from);
    if let Some(to) = doc.effective_to {
        println!("effective_to:    {}", to);
    }
    println!("created_at:      {}", doc.created_at.format("%Y-%m-%dT%H:%M:%SZ"));
    println!("chunks:          {}", detail.chunk_count);
    println!();

    println!("--- Versions ({}) ---", detail.versions.len());
    for v in &detail.versions {
        let marker = if doc.current_version_id.as_deref() == Some(v.id.as_str()) {
            " (current)"
        } else {
            ""
        };
        println!(
            "v{}  effective {}  ingested {}{}",
            v.version_number,
            v.effective_from,
            v.ingested_at.format("%Y-%m-%d %H:%M"),
            marker
        );
    }
    println!();

    println!("--- Sections ({}) ---", detail.sections.len());
    for s in &detail.sections {
        println!("[{}] {}  ({} tokens)", s.citation, s.heading, s.token_count);
        println!("{}", s.text);
        println!();
    }

    if !detail.edges.is_empty() {
        println!("--- Edges ({}) ---", detail.edges.len());
        for e in &detail.edges {
            println!(
                "{} -[{}]-> {}",
                e.source_label, e.edge.edge_type, e.target_label
            );
        }
    }

    Ok(())
}
