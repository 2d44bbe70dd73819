//! Storage abstraction for LexGraph.
//!
//! Persistence is split along the pipeline's seams:
//!
//! | Trait | Written by | Holds |
//! |-------|------------|-------|
//! | [`DocumentStore`] | Stages A and B | blob records, documents, versions, sections |
//! | [`VectorIndex`] | Stage C | embedded chunks with denormalized metadata |
//! | [`GraphStore`] | Stage D | graph nodes and typed edges |
//! | [`BlobStore`] | Stage A | raw bytes, content-addressed |
//!
//! [`Store`] bundles the first three so a backend (in-memory, SQLite) can
//! be handed to the pipeline as one value. All traits are `Send + Sync`
//! and async via `async-trait`; in-memory implementations return
//! immediately-ready futures.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{
    AuthorityLevel, BlobObject, Document, DocumentVersion, EdgeType, GraphEdge, GraphNode,
    Jurisdiction, Section, SectionVersion, Severity, VectorChunk,
};

pub use memory::{InMemoryStore, MemoryBlobStore};

/// Fields the caller supplies when creating a [`Document`].
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub jurisdiction: Jurisdiction,
    pub authority_level: AuthorityLevel,
    pub source: String,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

/// Fields the caller supplies when creating a [`DocumentVersion`].
///
/// The version number is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewDocumentVersion {
    pub document_id: String,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub source_blob_id: Option<String>,
}

/// Fields the caller supplies when creating a [`GraphEdge`].
#[derive(Debug, Clone)]
pub struct NewEdge {
    pub source_node_id: String,
    pub target_node_id: String,
    pub edge_type: EdgeType,
    pub severity: Option<Severity>,
    pub rationale: Option<String>,
}

impl NewEdge {
    pub fn new(source: &str, target: &str, edge_type: EdgeType) -> Self {
        Self {
            source_node_id: source.to_string(),
            target_node_id: target.to_string(),
            edge_type,
            severity: None,
            rationale: None,
        }
    }
}

/// Metadata filter for [`VectorIndex::list_chunks`].
///
/// Every populated field must match. `keyword` is a case-insensitive
/// substring test on chunk text.
#[derive(Debug, Clone, Default)]
pub struct ChunkFilter {
    pub jurisdiction: Option<Jurisdiction>,
    pub authority_level: Option<AuthorityLevel>,
    pub document_id: Option<String>,
    pub section_version_id: Option<String>,
    pub citation: Option<String>,
    pub keyword: Option<String>,
    pub limit: Option<usize>,
}

impl ChunkFilter {
    /// Whether `chunk` satisfies every populated field (ignores `limit`).
    pub fn matches(&self, chunk: &VectorChunk) -> bool {
        let meta = &chunk.metadata;
        if self.jurisdiction.is_some_and(|j| j != meta.jurisdiction) {
            return false;
        }
        if self.authority_level.is_some_and(|a| a != meta.authority_level) {
            return false;
        }
        if let Some(id) = &self.document_id {
            if *id != meta.document_id {
                return false;
            }
        }
        if let Some(id) = &self.section_version_id {
            if *id != chunk.section_version_id {
                return false;
            }
        }
        if let Some(citation) = &self.citation {
            if *citation != meta.citation {
                return false;
            }
        }
        if let Some(keyword) = &self.keyword {
            if !chunk.text.to_lowercase().contains(&keyword.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Versioned entity store written by Stages A and B.
///
/// Section and section-version content is append-only: there are no update
/// or delete operations for it. A document's current version pointer is
/// the only mutable field.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_blob_object(&self, blob: &BlobObject) -> Result<()>;
    async fn list_blob_objects(&self) -> Result<Vec<BlobObject>>;

    /// Whether a raw capture with this checksum was already recorded.
    async fn exists_by_checksum(&self, checksum: &str) -> Result<bool>;
    /// Whether a document with exactly this title exists.
    async fn exists_by_title(&self, title: &str) -> Result<bool>;

    async fn create_document(&self, doc: NewDocument) -> Result<Document>;

    /// Create the next version of a document.
    ///
    /// `version_number` is the document's current maximum plus one (1 for
    /// the first version). It never skips or decreases.
    async fn create_document_version(&self, version: NewDocumentVersion)
        -> Result<DocumentVersion>;

    async fn set_current_version(&self, document_id: &str, version_id: &str) -> Result<()>;

    async fn create_section(&self, document_id: &str, citation: &str, heading: &str)
        -> Result<Section>;

    /// Create a section version; `token_count` is supplied by the caller.
    async fn create_section_version(
        &self,
        section_id: &str,
        document_version_id: &str,
        text: &str,
        token_count: usize,
    ) -> Result<SectionVersion>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;
    async fn find_document_by_title(&self, title: &str) -> Result<Option<Document>>;
    /// All documents, oldest first.
    async fn list_documents(&self) -> Result<Vec<Document>>;
    /// Versions of one document, ascending by version number.
    async fn list_document_versions(&self, document_id: &str) -> Result<Vec<DocumentVersion>>;
    async fn list_sections(&self, document_id: &str) -> Result<Vec<Section>>;
    async fn list_section_versions(&self, document_version_id: &str)
        -> Result<Vec<SectionVersion>>;
}

/// Chunk index written by Stage C.
///
/// Re-indexing a section version appends new rows; nothing is updated in
/// place and chunks are never deduplicated by content.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn insert_chunk(&self, chunk: &VectorChunk) -> Result<()>;
    /// Chunks matching `filter`, in insertion order.
    async fn list_chunks(&self, filter: &ChunkFilter) -> Result<Vec<VectorChunk>>;
}

/// Adjacency-model graph written by Stage D.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn insert_node(&self, node: &GraphNode) -> Result<()>;
    async fn find_document_node(&self, document_id: &str) -> Result<Option<GraphNode>>;
    async fn find_section_node(&self, section_id: &str) -> Result<Option<GraphNode>>;
    async fn list_document_nodes(&self) -> Result<Vec<GraphNode>>;
    async fn list_nodes(&self) -> Result<Vec<GraphNode>>;
    async fn list_edges(&self) -> Result<Vec<GraphEdge>>;

    async fn edge_exists(&self, source: &str, target: &str, edge_type: EdgeType) -> Result<bool>;

    /// Atomically insert an edge unless one with the same
    /// `(source, target, edge_type)` already exists.
    ///
    /// Returns the new edge, or `None` if it already existed. Fails with
    /// [`IngestError::GraphConsistency`](crate::error::IngestError) when
    /// either endpoint is not a stored node.
    async fn insert_edge_if_absent(&self, edge: NewEdge) -> Result<Option<GraphEdge>>;
}

/// A complete persistence backend.
#[async_trait]
pub trait Store: DocumentStore + VectorIndex + GraphStore {
    /// Delete every ingested record, dependents first.
    async fn purge(&self) -> Result<()>;
}

/// Reference to bytes written to a [`BlobStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    /// Store key; stable for identical content.
    pub key: String,
    pub checksum: String,
    pub size: u64,
}

/// Opaque raw-capture storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bytes: &[u8]) -> Result<BlobRef>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Remove every stored blob.
    async fn clear(&self) -> Result<()>;
}
