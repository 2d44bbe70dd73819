//! Export every ingested record as JSON.
//!
//! The document is the camelCase [`IngestionOutputs`] shape extended with
//! a 2-D projection of each chunk embedding, for plotting the vector space
//! in a static viewer.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use lexgraph_core::embedding::project_to_2d;
use lexgraph_core::models::IngestionOutputs;
use lexgraph_core::store::{ChunkFilter, DocumentStore, GraphStore, VectorIndex};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Seed for the random projection; fixed so exports are reproducible.
const PROJECTION_SEED: u64 = 42;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    #[serde(flatten)]
    pub outputs: IngestionOutputs,
    pub projections: Vec<ChunkProjection>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkProjection {
    pub chunk_id: String,
    pub document_id: String,
    pub x: f32,
    pub y: f32,
}

/// Collect the full store contents.
pub async fn collect_export<S>(store: &S) -> Result<ExportData>
where
    S: DocumentStore + VectorIndex + GraphStore + ?Sized,
{
    let mut outputs = IngestionOutputs {
        blob_objects: store.list_blob_objects().await?,
        documents: store.list_documents().await?,
        ..Default::default()
    };
    for doc in &outputs.documents {
        let versions = store.list_document_versions(&doc.id).await?;
        for version in &versions {
            outputs
                .section_versions
                .extend(store.list_section_versions(&version.id).await?);
        }
        outputs.document_versions.extend(versions);
        outputs.sections.extend(store.list_sections(&doc.id).await?);
    }
    outputs.chunks = store.list_chunks(&ChunkFilter::default()).await?;
    outputs.graph_nodes = store.list_nodes().await?;
    outputs.graph_edges = store.list_edges().await?;

    let embeddings: Vec<Vec<f32>> = outputs.chunks.iter().map(|c| c.embedding.clone()).collect();
    let projections = outputs
        .chunks
        .iter()
        .zip(project_to_2d(&embeddings, PROJECTION_SEED))
        .map(|(chunk, (x, y))| ChunkProjection {
            chunk_id: chunk.id.clone(),
            document_id: chunk.metadata.document_id.clone(),
            x,
            y,
        })
        .collect();

    Ok(ExportData {
        outputs,
        projections,
    })
}

/// Export as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let data = collect_export(&store).await;
    pool.close().await;
    let data = data?;

    let doc_count = data.outputs.documents.len();
    let chunk_count = data.outputs.chunks.len();
    let edge_count = data.outputs.graph_edges.len();
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)?;
            eprintln!(
                "Exported {} documents, {} chunks, {} edges to {}",
                doc_count,
                chunk_count,
                edge_count,
                path.display()
            );
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}
