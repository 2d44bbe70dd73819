//! In-memory [`Store`] and [`BlobStore`] implementations for tests and
//! WASM targets.
//!
//! All tables live behind one `std::sync::RwLock`, so version numbering
//! and edge insert-if-absent are atomic under the write lock.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::embedding::checksum;
use crate::error::IngestError;
use crate::models::{
    BlobObject, Document, DocumentVersion, EdgeType, GraphEdge, GraphNode, NodeType, Section,
    SectionVersion, VectorChunk,
};

use super::{
    BlobRef, BlobStore, ChunkFilter, DocumentStore, GraphStore, NewDocument, NewDocumentVersion,
    NewEdge, Store, VectorIndex,
};

#[derive(Default)]
struct Tables {
    blob_objects: Vec<BlobObject>,
    documents: Vec<Document>,
    document_versions: Vec<DocumentVersion>,
    sections: Vec<Section>,
    section_versions: Vec<SectionVersion>,
    chunks: Vec<VectorChunk>,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

/// In-memory store for testing and WASM environments.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_blob_object(&self, blob: &BlobObject) -> Result<()> {
        self.write()?.blob_objects.push(blob.clone());
        Ok(())
    }

    async fn list_blob_objects(&self) -> Result<Vec<BlobObject>> {
        Ok(self.read()?.blob_objects.clone())
    }

    async fn exists_by_checksum(&self, checksum: &str) -> Result<bool> {
        Ok(self
            .read()?
            .blob_objects
            .iter()
            .any(|b| b.checksum == checksum))
    }

    async fn exists_by_title(&self, title: &str) -> Result<bool> {
        Ok(self.read()?.documents.iter().any(|d| d.title == title))
    }

    async fn create_document(&self, doc: NewDocument) -> Result<Document> {
        let document = Document {
            id: Uuid::new_v4().to_string(),
            title: doc.title,
            jurisdiction: doc.jurisdiction,
            authority_level: doc.authority_level,
            source: doc.source,
            effective_from: doc.effective_from,
            effective_to: doc.effective_to,
            current_version_id: None,
            created_at: Utc::now(),
        };
        self.write()?.documents.push(document.clone());
        Ok(document)
    }

    async fn create_document_version(
        &self,
        version: NewDocumentVersion,
    ) -> Result<DocumentVersion> {
        let mut tables = self.write()?;
        if !tables.documents.iter().any(|d| d.id == version.document_id) {
            bail!("document not found: {}", version.document_id);
        }
        let max = tables
            .document_versions
            .iter()
            .filter(|v| v.document_id == version.document_id)
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0);
        let created = DocumentVersion {
            id: Uuid::new_v4().to_string(),
            document_id: version.document_id,
            version_number: max + 1,
            effective_from: version.effective_from,
            effective_to: version.effective_to,
            source_blob_id: version.source_blob_id,
            ingested_at: Utc::now(),
        };
        tables.document_versions.push(created.clone());
        Ok(created)
    }

    async fn set_current_version(&self, document_id: &str, version_id: &str) -> Result<()> {
        let mut tables = self.write()?;
        let belongs = tables
            .document_versions
            .iter()
            .any(|v| v.id == version_id && v.document_id == document_id);
        if !belongs {
            bail!(
                "version {} does not belong to document {}",
                version_id,
                document_id
            );
        }
        match tables.documents.iter_mut().find(|d| d.id == document_id) {
            Some(doc) => {
                doc.current_version_id = Some(version_id.to_string());
                Ok(())
            }
            None => bail!("document not found: {}", document_id),
        }
    }

    async fn create_section(
        &self,
        document_id: &str,
        citation: &str,
        heading: &str,
    ) -> Result<Section> {
        let section = Section {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            citation: citation.to_string(),
            heading: heading.to_string(),
        };
        self.write()?.sections.push(section.clone());
        Ok(section)
    }

    async fn create_section_version(
        &self,
        section_id: &str,
        document_version_id: &str,
        text: &str,
        token_count: usize,
    ) -> Result<SectionVersion> {
        let mut tables = self.write()?;
        let section_doc = tables
            .sections
            .iter()
            .find(|s| s.id == section_id)
            .map(|s| s.document_id.clone());
        let version_doc = tables
            .document_versions
            .iter()
            .find(|v| v.id == document_version_id)
            .map(|v| v.document_id.clone());
        match (section_doc, version_doc) {
            (Some(a), Some(b)) if a == b => {}
            (Some(_), Some(_)) => bail!(
                "section {} and version {} belong to different documents",
                section_id,
                document_version_id
            ),
            _ => bail!(
                "unknown section {} or document version {}",
                section_id,
                document_version_id
            ),
        }
        let created = SectionVersion {
            id: Uuid::new_v4().to_string(),
            section_id: section_id.to_string(),
            document_version_id: document_version_id.to_string(),
            text: text.to_string(),
            token_count,
        };
        tables.section_versions.push(created.clone());
        Ok(created)
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn find_document_by_title(&self, title: &str) -> Result<Option<Document>> {
        Ok(self
            .read()?
            .documents
            .iter()
            .find(|d| d.title == title)
            .cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        Ok(self.read()?.documents.clone())
    }

    async fn list_document_versions(&self, document_id: &str) -> Result<Vec<DocumentVersion>> {
        let mut versions: Vec<DocumentVersion> = self
            .read()?
            .document_versions
            .iter()
            .filter(|v| v.document_id == document_id)
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    async fn list_sections(&self, document_id: &str) -> Result<Vec<Section>> {
        Ok(self
            .read()?
            .sections
            .iter()
            .filter(|s| s.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn list_section_versions(
        &self,
        document_version_id: &str,
    ) -> Result<Vec<SectionVersion>> {
        Ok(self
            .read()?
            .section_versions
            .iter()
            .filter(|v| v.document_version_id == document_version_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    async fn insert_chunk(&self, chunk: &VectorChunk) -> Result<()> {
        self.write()?.chunks.push(chunk.clone());
        Ok(())
    }

    async fn list_chunks(&self, filter: &ChunkFilter) -> Result<Vec<VectorChunk>> {
        let tables = self.read()?;
        let matching = tables.chunks.iter().filter(|c| filter.matches(c)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }
}

#[async_trait]
impl GraphStore for InMemoryStore {
    async fn insert_node(&self, node: &GraphNode) -> Result<()> {
        let mut tables = self.write()?;
        if tables.nodes.iter().any(|n| n.id == node.id) {
            bail!("graph node already exists: {}", node.id);
        }
        tables.nodes.push(node.clone());
        Ok(())
    }

    async fn find_document_node(&self, document_id: &str) -> Result<Option<GraphNode>> {
        Ok(self
            .read()?
            .nodes
            .iter()
            .find(|n| {
                n.node_type == NodeType::Document && n.document_id.as_deref() == Some(document_id)
            })
            .cloned())
    }

    async fn find_section_node(&self, section_id: &str) -> Result<Option<GraphNode>> {
        Ok(self
            .read()?
            .nodes
            .iter()
            .find(|n| {
                n.node_type == NodeType::Section && n.section_id.as_deref() == Some(section_id)
            })
            .cloned())
    }

    async fn list_document_nodes(&self) -> Result<Vec<GraphNode>> {
        Ok(self
            .read()?
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Document)
            .cloned()
            .collect())
    }

    async fn list_nodes(&self) -> Result<Vec<GraphNode>> {
        Ok(self.read()?.nodes.clone())
    }

    async fn list_edges(&self) -> Result<Vec<GraphEdge>> {
        Ok(self.read()?.edges.clone())
    }

    async fn edge_exists(&self, source: &str, target: &str, edge_type: EdgeType) -> Result<bool> {
        Ok(self.read()?.edges.iter().any(|e| {
            e.source_node_id == source && e.target_node_id == target && e.edge_type == edge_type
        }))
    }

    async fn insert_edge_if_absent(&self, edge: NewEdge) -> Result<Option<GraphEdge>> {
        let mut tables = self.write()?;
        for id in [&edge.source_node_id, &edge.target_node_id] {
            if !tables.nodes.iter().any(|n| &n.id == id) {
                return Err(IngestError::GraphConsistency {
                    node_id: id.clone(),
                }
                .into());
            }
        }
        let exists = tables.edges.iter().any(|e| {
            e.source_node_id == edge.source_node_id
                && e.target_node_id == edge.target_node_id
                && e.edge_type == edge.edge_type
        });
        if exists {
            return Ok(None);
        }
        let created = GraphEdge {
            id: Uuid::new_v4().to_string(),
            source_node_id: edge.source_node_id,
            target_node_id: edge.target_node_id,
            edge_type: edge.edge_type,
            severity: edge.severity,
            rationale: edge.rationale,
        };
        tables.edges.push(created.clone());
        Ok(Some(created))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn purge(&self) -> Result<()> {
        *self.write()? = Tables::default();
        Ok(())
    }
}

/// Content-addressed blob store held in memory.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: &[u8]) -> Result<BlobRef> {
        let sum = checksum(bytes);
        let key = format!("sha256/{}", sum);
        self.blobs
            .write()
            .map_err(|_| anyhow!("blob store lock poisoned"))?
            .entry(key.clone())
            .or_insert_with(|| bytes.to_vec());
        Ok(BlobRef {
            key,
            checksum: sum,
            size: bytes.len() as u64,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .read()
            .map_err(|_| anyhow!("blob store lock poisoned"))?
            .get(key)
            .cloned())
    }

    async fn clear(&self) -> Result<()> {
        self.blobs
            .write()
            .map_err(|_| anyhow!("blob store lock poisoned"))?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthorityLevel, Jurisdiction};
    use chrono::NaiveDate;

    fn new_doc(title: &str) -> NewDocument {
        NewDocument {
            title: title.to_string(),
            jurisdiction: Jurisdiction::State,
            authority_level: AuthorityLevel::Statute,
            source: "texas-statutes".to_string(),
            effective_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            effective_to: None,
        }
    }

    fn node(id: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            label: id.to_string(),
            node_type: NodeType::Document,
            jurisdiction: Jurisdiction::State,
            authority_level: AuthorityLevel::Statute,
            citation: None,
            effective_from: None,
            document_id: Some(format!("doc-{}", id)),
            section_id: None,
        }
    }

    #[tokio::test]
    async fn test_version_numbers_are_monotonic() {
        let store = InMemoryStore::new();
        let doc = store.create_document(new_doc("Texas Property Code")).await.unwrap();
        let mut numbers = Vec::new();
        for _ in 0..3 {
            let v = store
                .create_document_version(NewDocumentVersion {
                    document_id: doc.id.clone(),
                    effective_from: doc.effective_from,
                    effective_to: None,
                    source_blob_id: None,
                })
                .await
                .unwrap();
            numbers.push(v.version_number);
        }
        assert_eq!(numbers, vec![1, 2, 3]);

        let listed = store.list_document_versions(&doc.id).await.unwrap();
        store.set_current_version(&doc.id, &listed[2].id).await.unwrap();
        let doc = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(doc.current_version_id.as_deref(), Some(listed[2].id.as_str()));
    }

    #[tokio::test]
    async fn test_section_version_must_share_document() {
        let store = InMemoryStore::new();
        let a = store.create_document(new_doc("A")).await.unwrap();
        let b = store.create_document(new_doc("B")).await.unwrap();
        let va = store
            .create_document_version(NewDocumentVersion {
                document_id: a.id.clone(),
                effective_from: a.effective_from,
                effective_to: None,
                source_blob_id: None,
            })
            .await
            .unwrap();
        let sb = store.create_section(&b.id, "§ 1", "One").await.unwrap();
        assert!(store
            .create_section_version(&sb.id, &va.id, "text", 1)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_dedup_predicates() {
        let store = InMemoryStore::new();
        assert!(!store.exists_by_title("A").await.unwrap());
        store.create_document(new_doc("A")).await.unwrap();
        assert!(store.exists_by_title("A").await.unwrap());

        assert!(!store.exists_by_checksum("abc").await.unwrap());
        store
            .insert_blob_object(&BlobObject {
                id: "b1".into(),
                key: "sha256/abc".into(),
                source: "us-code".into(),
                checksum: "abc".into(),
                content_type: "application/json".into(),
                file_size_bytes: 3,
                fetched_at: Utc::now(),
            })
            .await
            .unwrap();
        assert!(store.exists_by_checksum("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_edge_insert_if_absent_keys_on_type() {
        let store = InMemoryStore::new();
        store.insert_node(&node("a")).await.unwrap();
        store.insert_node(&node("b")).await.unwrap();

        let first = store
            .insert_edge_if_absent(NewEdge::new("a", "b", EdgeType::DerivesAuthorityFrom))
            .await
            .unwrap();
        assert!(first.is_some());
        let again = store
            .insert_edge_if_absent(NewEdge::new("a", "b", EdgeType::DerivesAuthorityFrom))
            .await
            .unwrap();
        assert!(again.is_none());
        let other_type = store
            .insert_edge_if_absent(NewEdge::new("a", "b", EdgeType::ConflictsWith))
            .await
            .unwrap();
        assert!(other_type.is_some());
        assert_eq!(store.list_edges().await.unwrap().len(), 2);
        assert!(store
            .edge_exists("a", "b", EdgeType::ConflictsWith)
            .await
            .unwrap());
        assert!(!store.edge_exists("b", "a", EdgeType::ConflictsWith).await.unwrap());
    }

    #[tokio::test]
    async fn test_edge_to_missing_node_is_consistency_error() {
        let store = InMemoryStore::new();
        store.insert_node(&node("a")).await.unwrap();
        let err = store
            .insert_edge_if_absent(NewEdge::new("a", "ghost", EdgeType::Amends))
            .await
            .unwrap_err();
        match err.downcast_ref::<IngestError>() {
            Some(IngestError::GraphConsistency { node_id }) => assert_eq!(node_id, "ghost"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_purge_clears_everything() {
        let store = InMemoryStore::new();
        store.create_document(new_doc("A")).await.unwrap();
        store.insert_node(&node("a")).await.unwrap();
        store.purge().await.unwrap();
        assert!(store.list_documents().await.unwrap().is_empty());
        assert!(store.list_nodes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blob_store_is_content_addressed() {
        let blobs = MemoryBlobStore::new();
        let a = blobs.put(b"hello").await.unwrap();
        let b = blobs.put(b"hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.size, 5);
        assert_eq!(blobs.get(&a.key).await.unwrap().unwrap(), b"hello");
        assert!(blobs.get("sha256/missing").await.unwrap().is_none());
    }
}
