//! SQLite-backed [`Store`] implementation.
//!
//! Maps each store trait operation onto the schema created by
//! [`migrate`](crate::migrate). Version numbering runs inside a
//! transaction and the `UNIQUE(document_id, version_number)` constraint
//! rejects any race that slips past it; edge insertion relies on
//! `UNIQUE(source_node_id, target_node_id, edge_type)` with
//! `ON CONFLICT DO NOTHING`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteRow, Sqlite};
use sqlx::{QueryBuilder, Row, SqlitePool};
use uuid::Uuid;

use lexgraph_core::embedding::{blob_to_vec, vec_to_blob};
use lexgraph_core::error::IngestError;
use lexgraph_core::models::{
    BlobObject, ChunkMetadata, Document, DocumentVersion, EdgeType, GraphEdge, GraphNode,
    NodeType, Section, SectionVersion, VectorChunk,
};
use lexgraph_core::store::{
    ChunkFilter, DocumentStore, GraphStore, NewDocument, NewDocumentVersion, NewEdge, Store,
    VectorIndex,
};

/// SQLite implementation of the store traits.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

fn ts_to_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(text: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)
        .with_context(|| format!("invalid timestamp in database: {}", text))?
        .with_timezone(&Utc))
}

fn date_to_text(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .with_context(|| format!("invalid date in database: {}", text))
}

fn parse_opt_date(text: Option<String>) -> Result<Option<NaiveDate>> {
    text.as_deref().map(parse_date).transpose()
}

fn parse_enum<T>(text: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(text.parse::<T>()?)
}

fn row_to_blob(row: &SqliteRow) -> Result<BlobObject> {
    Ok(BlobObject {
        id: row.get("id"),
        key: row.get("key"),
        source: row.get("source"),
        checksum: row.get("checksum"),
        content_type: row.get("content_type"),
        file_size_bytes: row.get::<i64, _>("file_size_bytes") as u64,
        fetched_at: parse_ts(row.get("fetched_at"))?,
    })
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    Ok(Document {
        id: row.get("id"),
        title: row.get("title"),
        jurisdiction: parse_enum(row.get("jurisdiction"))?,
        authority_level: parse_enum(row.get("authority_level"))?,
        source: row.get("source"),
        effective_from: parse_date(row.get("effective_from"))?,
        effective_to: parse_opt_date(row.get("effective_to"))?,
        current_version_id: row.get("current_version_id"),
        created_at: parse_ts(row.get("created_at"))?,
    })
}

fn row_to_version(row: &SqliteRow) -> Result<DocumentVersion> {
    Ok(DocumentVersion {
        id: row.get("id"),
        document_id: row.get("document_id"),
        version_number: row.get::<i64, _>("version_number") as u32,
        effective_from: parse_date(row.get("effective_from"))?,
        effective_to: parse_opt_date(row.get("effective_to"))?,
        source_blob_id: row.get("source_blob_id"),
        ingested_at: parse_ts(row.get("ingested_at"))?,
    })
}

fn row_to_section(row: &SqliteRow) -> Section {
    Section {
        id: row.get("id"),
        document_id: row.get("document_id"),
        citation: row.get("citation"),
        heading: row.get("heading"),
    }
}

fn row_to_section_version(row: &SqliteRow) -> SectionVersion {
    SectionVersion {
        id: row.get("id"),
        section_id: row.get("section_id"),
        document_version_id: row.get("document_version_id"),
        text: row.get("text"),
        token_count: row.get::<i64, _>("token_count") as usize,
    }
}

fn row_to_chunk(row: &SqliteRow) -> Result<VectorChunk> {
    let chunk_index = row.get::<i64, _>("chunk_index") as usize;
    let embedding: Vec<u8> = row.get("embedding");
    Ok(VectorChunk {
        id: row.get("id"),
        section_version_id: row.get("section_version_id"),
        chunk_index,
        text: row.get("text"),
        token_count: row.get::<i64, _>("token_count") as usize,
        embedding: blob_to_vec(&embedding),
        metadata: ChunkMetadata {
            jurisdiction: parse_enum(row.get("jurisdiction"))?,
            authority_level: parse_enum(row.get("authority_level"))?,
            effective_from: parse_date(row.get("effective_from"))?,
            citation: row.get("citation"),
            document_id: row.get("document_id"),
            heading: row.get("heading"),
            chunk_index,
        },
    })
}

fn row_to_node(row: &SqliteRow) -> Result<GraphNode> {
    Ok(GraphNode {
        id: row.get("id"),
        label: row.get("label"),
        node_type: parse_enum(row.get("node_type"))?,
        jurisdiction: parse_enum(row.get("jurisdiction"))?,
        authority_level: parse_enum(row.get("authority_level"))?,
        citation: row.get("citation"),
        effective_from: parse_opt_date(row.get("effective_from"))?,
        document_id: row.get("document_id"),
        section_id: row.get("section_id"),
    })
}

fn row_to_edge(row: &SqliteRow) -> Result<GraphEdge> {
    let severity: Option<String> = row.get("severity");
    Ok(GraphEdge {
        id: row.get("id"),
        source_node_id: row.get("source_node_id"),
        target_node_id: row.get("target_node_id"),
        edge_type: parse_enum(row.get("edge_type"))?,
        severity: severity.as_deref().map(parse_enum).transpose()?,
        rationale: row.get("rationale"),
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_blob_object(&self, blob: &BlobObject) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO blob_objects (id, key, source, checksum, content_type,
                                      file_size_bytes, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&blob.id)
        .bind(&blob.key)
        .bind(&blob.source)
        .bind(&blob.checksum)
        .bind(&blob.content_type)
        .bind(blob.file_size_bytes as i64)
        .bind(ts_to_text(&blob.fetched_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_blob_objects(&self) -> Result<Vec<BlobObject>> {
        let rows = sqlx::query("SELECT * FROM blob_objects ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_blob).collect()
    }

    async fn exists_by_checksum(&self, checksum: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM blob_objects WHERE checksum = ?")
                .bind(checksum)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn exists_by_title(&self, title: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM documents WHERE title = ?")
            .bind(title)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
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
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, jurisdiction, authority_level, source,
                                   effective_from, effective_to, current_version_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?)
            "#,
        )
        .bind(&document.id)
        .bind(&document.title)
        .bind(document.jurisdiction.as_str())
        .bind(document.authority_level.as_str())
        .bind(&document.source)
        .bind(date_to_text(&document.effective_from))
        .bind(document.effective_to.as_ref().map(date_to_text))
        .bind(ts_to_text(&document.created_at))
        .execute(&self.pool)
        .await?;
        Ok(document)
    }

    async fn create_document_version(
        &self,
        version: NewDocumentVersion,
    ) -> Result<DocumentVersion> {
        let mut tx = self.pool.begin().await?;

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version_number), 0) + 1 FROM document_versions WHERE document_id = ?",
        )
        .bind(&version.document_id)
        .fetch_one(&mut *tx)
        .await?;

        let created = DocumentVersion {
            id: Uuid::new_v4().to_string(),
            document_id: version.document_id,
            version_number: next as u32,
            effective_from: version.effective_from,
            effective_to: version.effective_to,
            source_blob_id: version.source_blob_id,
            ingested_at: Utc::now(),
        };
        sqlx::query(
            r#"
            INSERT INTO document_versions (id, document_id, version_number, effective_from,
                                           effective_to, source_blob_id, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&created.id)
        .bind(&created.document_id)
        .bind(next)
        .bind(date_to_text(&created.effective_from))
        .bind(created.effective_to.as_ref().map(date_to_text))
        .bind(&created.source_blob_id)
        .bind(ts_to_text(&created.ingested_at))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to create version for {}", created.document_id))?;

        tx.commit().await?;
        Ok(created)
    }

    async fn set_current_version(&self, document_id: &str, version_id: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents SET current_version_id = ?
            WHERE id = ?
              AND EXISTS (SELECT 1 FROM document_versions WHERE id = ? AND document_id = ?)
            "#,
        )
        .bind(version_id)
        .bind(document_id)
        .bind(version_id)
        .bind(document_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!(
                "version {} does not belong to document {}",
                version_id,
                document_id
            ));
        }
        Ok(())
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
        sqlx::query("INSERT INTO sections (id, document_id, citation, heading) VALUES (?, ?, ?, ?)")
            .bind(&section.id)
            .bind(&section.document_id)
            .bind(&section.citation)
            .bind(&section.heading)
            .execute(&self.pool)
            .await?;
        Ok(section)
    }

    async fn create_section_version(
        &self,
        section_id: &str,
        document_version_id: &str,
        text: &str,
        token_count: usize,
    ) -> Result<SectionVersion> {
        let same_document: bool = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) > 0 FROM sections s
            JOIN document_versions v ON v.document_id = s.document_id
            WHERE s.id = ? AND v.id = ?
            "#,
        )
        .bind(section_id)
        .bind(document_version_id)
        .fetch_one(&self.pool)
        .await?;
        if !same_document {
            return Err(anyhow!(
                "section {} and version {} do not belong to the same document",
                section_id,
                document_version_id
            ));
        }

        let created = SectionVersion {
            id: Uuid::new_v4().to_string(),
            section_id: section_id.to_string(),
            document_version_id: document_version_id.to_string(),
            text: text.to_string(),
            token_count,
        };
        sqlx::query(
            r#"
            INSERT INTO section_versions (id, section_id, document_version_id, text, token_count)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&created.id)
        .bind(&created.section_id)
        .bind(&created.document_version_id)
        .bind(&created.text)
        .bind(created.token_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(created)
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn find_document_by_title(&self, title: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE title = ? ORDER BY rowid LIMIT 1")
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_document).collect()
    }

    async fn list_document_versions(&self, document_id: &str) -> Result<Vec<DocumentVersion>> {
        let rows = sqlx::query(
            "SELECT * FROM document_versions WHERE document_id = ? ORDER BY version_number",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_version).collect()
    }

    async fn list_sections(&self, document_id: &str) -> Result<Vec<Section>> {
        let rows = sqlx::query("SELECT * FROM sections WHERE document_id = ? ORDER BY rowid")
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_section).collect())
    }

    async fn list_section_versions(
        &self,
        document_version_id: &str,
    ) -> Result<Vec<SectionVersion>> {
        let rows = sqlx::query(
            "SELECT * FROM section_versions WHERE document_version_id = ? ORDER BY rowid",
        )
        .bind(document_version_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_section_version).collect())
    }
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn insert_chunk(&self, chunk: &VectorChunk) -> Result<()> {
        let meta = &chunk.metadata;
        sqlx::query(
            r#"
            INSERT INTO vector_chunks (id, section_version_id, chunk_index, text, token_count,
                                       embedding, dims, jurisdiction, authority_level,
                                       effective_from, citation, document_id, heading)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.section_version_id)
        .bind(chunk.chunk_index as i64)
        .bind(&chunk.text)
        .bind(chunk.token_count as i64)
        .bind(vec_to_blob(&chunk.embedding))
        .bind(chunk.embedding.len() as i64)
        .bind(meta.jurisdiction.as_str())
        .bind(meta.authority_level.as_str())
        .bind(date_to_text(&meta.effective_from))
        .bind(&meta.citation)
        .bind(&meta.document_id)
        .bind(&meta.heading)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_chunks(&self, filter: &ChunkFilter) -> Result<Vec<VectorChunk>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM vector_chunks WHERE 1 = 1");
        if let Some(j) = filter.jurisdiction {
            qb.push(" AND jurisdiction = ").push_bind(j.as_str());
        }
        if let Some(a) = filter.authority_level {
            qb.push(" AND authority_level = ").push_bind(a.as_str());
        }
        if let Some(id) = &filter.document_id {
            qb.push(" AND document_id = ").push_bind(id.clone());
        }
        if let Some(id) = &filter.section_version_id {
            qb.push(" AND section_version_id = ").push_bind(id.clone());
        }
        if let Some(citation) = &filter.citation {
            qb.push(" AND citation = ").push_bind(citation.clone());
        }
        qb.push(" ORDER BY rowid");
        // Keyword matching is Unicode-aware in Rust, so only push the
        // limit down when no keyword filter remains.
        if filter.keyword.is_none() {
            if let Some(limit) = filter.limit {
                qb.push(" LIMIT ").push_bind(limit as i64);
            }
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut chunks = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk = row_to_chunk(row)?;
            if filter.matches(&chunk) {
                chunks.push(chunk);
                if filter.limit.is_some_and(|l| chunks.len() >= l) {
                    break;
                }
            }
        }
        Ok(chunks)
    }
}

#[async_trait]
impl GraphStore for SqliteStore {
    async fn insert_node(&self, node: &GraphNode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO graph_nodes (id, label, node_type, jurisdiction, authority_level,
                                     citation, effective_from, document_id, section_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&node.id)
        .bind(&node.label)
        .bind(node.node_type.as_str())
        .bind(node.jurisdiction.as_str())
        .bind(node.authority_level.as_str())
        .bind(&node.citation)
        .bind(node.effective_from.as_ref().map(date_to_text))
        .bind(&node.document_id)
        .bind(&node.section_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_document_node(&self, document_id: &str) -> Result<Option<GraphNode>> {
        let row = sqlx::query(
            "SELECT * FROM graph_nodes WHERE node_type = ? AND document_id = ? ORDER BY rowid LIMIT 1",
        )
        .bind(NodeType::Document.as_str())
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_node).transpose()
    }

    async fn find_section_node(&self, section_id: &str) -> Result<Option<GraphNode>> {
        let row = sqlx::query(
            "SELECT * FROM graph_nodes WHERE node_type = ? AND section_id = ? ORDER BY rowid LIMIT 1",
        )
        .bind(NodeType::Section.as_str())
        .bind(section_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_node).transpose()
    }

    async fn list_document_nodes(&self) -> Result<Vec<GraphNode>> {
        let rows = sqlx::query("SELECT * FROM graph_nodes WHERE node_type = ? ORDER BY rowid")
            .bind(NodeType::Document.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_node).collect()
    }

    async fn list_nodes(&self) -> Result<Vec<GraphNode>> {
        let rows = sqlx::query("SELECT * FROM graph_nodes ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_node).collect()
    }

    async fn list_edges(&self) -> Result<Vec<GraphEdge>> {
        let rows = sqlx::query("SELECT * FROM graph_edges ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_edge).collect()
    }

    async fn edge_exists(&self, source: &str, target: &str, edge_type: EdgeType) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) > 0 FROM graph_edges
            WHERE source_node_id = ? AND target_node_id = ? AND edge_type = ?
            "#,
        )
        .bind(source)
        .bind(target)
        .bind(edge_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_edge_if_absent(&self, edge: NewEdge) -> Result<Option<GraphEdge>> {
        for node_id in [&edge.source_node_id, &edge.target_node_id] {
            let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM graph_nodes WHERE id = ?")
                .bind(node_id)
                .fetch_one(&self.pool)
                .await?;
            if !exists {
                return Err(IngestError::GraphConsistency {
                    node_id: node_id.clone(),
                }
                .into());
            }
        }

        let created = GraphEdge {
            id: Uuid::new_v4().to_string(),
            source_node_id: edge.source_node_id,
            target_node_id: edge.target_node_id,
            edge_type: edge.edge_type,
            severity: edge.severity,
            rationale: edge.rationale,
        };
        let result = sqlx::query(
            r#"
            INSERT INTO graph_edges (id, source_node_id, target_node_id, edge_type,
                                     severity, rationale)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_node_id, target_node_id, edge_type) DO NOTHING
            "#,
        )
        .bind(&created.id)
        .bind(&created.source_node_id)
        .bind(&created.target_node_id)
        .bind(created.edge_type.as_str())
        .bind(created.severity.map(|s| s.as_str()))
        .bind(&created.rationale)
        .execute(&self.pool)
        .await?;

        Ok((result.rows_affected() == 1).then_some(created))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn purge(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "graph_edges",
            "graph_nodes",
            "vector_chunks",
            "section_versions",
            "sections",
            "document_versions",
            "documents",
            "blob_objects",
        ] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
