//! Ingestion orchestrator.
//!
//! [`Pipeline::ingest`] runs one unit through four stages:
//!
//! | Stage | Function | Writes |
//! |-------|----------|--------|
//! | capture | [`Pipeline::stage_a`] | blob bytes + [`BlobObject`] record |
//! | parse | [`Pipeline::stage_b`] | document, version, sections, section versions |
//! | index | [`Pipeline::stage_c`] | embedded [`VectorChunk`]s |
//! | graph | [`Pipeline::stage_d`] | graph nodes and edges |
//!
//! Duplicates (by checksum, then by parsed title) are skipped before
//! anything is written. The first failing stage stops the run; records
//! already written by earlier stages stay in place.

use std::cmp::Reverse;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

use crate::chunk::{chunk_text, estimate_token_count, ChunkConfig};
use crate::embedding::{checksum, DeterministicEmbedder, EmbeddingProvider};
use crate::error::{DuplicateReason, IngestError, StageId};
use crate::graph::{GraphBuilder, GraphOutput};
use crate::models::{
    BlobObject, ChunkMetadata, Document, DocumentVersion, IngestionOutputs, Section,
    SectionVersion, VectorChunk,
};
use crate::parse::{parse_document, ParsedDocument};
use crate::progress::{NoProgress, PipelineEvent, ProgressReporter};
use crate::store::{BlobStore, NewDocument, NewDocumentVersion, Store};

/// One ingestion unit: a named file's raw bytes and its corpus source.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub name: String,
    pub source: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl IngestRequest {
    /// Build a request, inferring the content type from the file name.
    pub fn new(name: impl Into<String>, source: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let content_type = content_type_for(&name).to_string();
        Self {
            name,
            source: source.into(),
            content_type,
            bytes,
        }
    }
}

/// MIME type recorded for a file name's extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("json") => "application/json",
        Some("xml") => "text/xml",
        Some("html") | Some("htm") => "text/html",
        Some("md") => "text/markdown",
        _ => "text/plain",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Ingested,
    Skipped,
    Failed,
}

impl IngestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IngestStatus::Ingested => "ingested",
            IngestStatus::Skipped => "skipped",
            IngestStatus::Failed => "failed",
        }
    }
}

/// Result of ingesting one unit.
///
/// `outputs` holds whatever the completed stages produced, so a failed run
/// still shows its orphaned capture record.
#[derive(Debug)]
pub struct IngestReport {
    pub name: String,
    pub outputs: IngestionOutputs,
    pub error: Option<IngestError>,
}

impl IngestReport {
    pub fn status(&self) -> IngestStatus {
        match &self.error {
            None => IngestStatus::Ingested,
            Some(e) if e.is_duplicate() => IngestStatus::Skipped,
            Some(_) => IngestStatus::Failed,
        }
    }

    /// The stage that failed, if any.
    pub fn failed_stage(&self) -> Option<StageId> {
        self.error.as_ref().and_then(IngestError::stage_id)
    }

    pub fn document_id(&self) -> Option<&str> {
        self.outputs.documents.first().map(|d| d.id.as_str())
    }

    pub fn message(&self) -> String {
        match &self.error {
            None => {
                let o = &self.outputs;
                let title = o.documents.first().map(|d| d.title.as_str()).unwrap_or("");
                format!(
                    "Ingested: {} ({} sections, {} chunks, {} edges)",
                    title,
                    o.section_versions.len(),
                    o.chunks.len(),
                    o.graph_edges.len()
                )
            }
            Some(IngestError::Duplicate(reason)) => format!("Already ingested: {}", reason),
            Some(e) => e.to_string(),
        }
    }
}

/// Aggregate of a bulk run, in processing order.
#[derive(Debug, Default)]
pub struct BulkSummary {
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
    pub reports: Vec<IngestReport>,
}

impl BulkSummary {
    fn push(&mut self, report: IngestReport) {
        match report.status() {
            IngestStatus::Ingested => self.ingested += 1,
            IngestStatus::Skipped => self.skipped += 1,
            IngestStatus::Failed => self.failed += 1,
        }
        self.reports.push(report);
    }
}

/// Records written by Stage B.
#[derive(Debug, Clone)]
pub struct ParsedRecords {
    pub document: Document,
    pub version: DocumentVersion,
    pub sections: Vec<Section>,
    pub section_versions: Vec<SectionVersion>,
}

/// Runs ingestion units against explicit store handles.
pub struct Pipeline<'a, S: ?Sized, B: ?Sized> {
    store: &'a S,
    blobs: &'a B,
    embedder: Box<dyn EmbeddingProvider>,
    chunking: ChunkConfig,
    graph: GraphBuilder,
    progress: &'a dyn ProgressReporter,
}

impl<'a, S, B> Pipeline<'a, S, B>
where
    S: Store + ?Sized,
    B: BlobStore + ?Sized,
{
    /// A pipeline with the default embedder, chunking, conflict rules, and
    /// no progress output.
    pub fn new(store: &'a S, blobs: &'a B) -> Self {
        Self {
            store,
            blobs,
            embedder: Box::new(DeterministicEmbedder::default()),
            chunking: ChunkConfig::pipeline_default(),
            graph: GraphBuilder::default(),
            progress: &NoProgress,
        }
    }

    pub fn with_embedder(mut self, embedder: Box<dyn EmbeddingProvider>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_graph(mut self, graph: GraphBuilder) -> Self {
        self.graph = graph;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    fn started(&self, unit: &str, stage: StageId) {
        self.progress.report(PipelineEvent::StageStarted {
            unit: unit.to_string(),
            stage,
        });
    }

    fn completed(&self, unit: &str, stage: StageId, count: usize) {
        self.progress.report(PipelineEvent::StageCompleted {
            unit: unit.to_string(),
            stage,
            count,
        });
    }

    fn fail(&self, mut report: IngestReport, error: IngestError) -> IngestReport {
        match error.stage_id() {
            Some(stage) => self.progress.report(PipelineEvent::StageFailed {
                unit: report.name.clone(),
                stage,
                error: error.to_string(),
            }),
            None => self.progress.report(PipelineEvent::Skipped {
                unit: report.name.clone(),
                reason: error.to_string(),
            }),
        }
        report.error = Some(error);
        report
    }

    /// Ingest one unit through stages A to D.
    pub async fn ingest(&self, request: &IngestRequest) -> IngestReport {
        let report = IngestReport {
            name: request.name.clone(),
            outputs: IngestionOutputs::default(),
            error: None,
        };

        let sum = checksum(&request.bytes);
        match self.store.exists_by_checksum(&sum).await {
            Ok(true) => {
                return self.fail(report, IngestError::Duplicate(DuplicateReason::Checksum(sum)))
            }
            Ok(false) => {}
            Err(e) => return self.fail(report, IngestError::stage(StageId::Capture, e)),
        }

        let parsed = parse_request(request);
        if let Ok(doc) = &parsed {
            match self.store.exists_by_title(&doc.title).await {
                Ok(true) => {
                    let reason = DuplicateReason::Title(doc.title.clone());
                    return self.fail(report, IngestError::Duplicate(reason));
                }
                Ok(false) => {}
                Err(e) => return self.fail(report, IngestError::stage(StageId::Capture, e)),
            }
        }

        self.run_stages(report, request, parsed).await
    }

    async fn run_stages(
        &self,
        mut report: IngestReport,
        request: &IngestRequest,
        parsed: Result<ParsedDocument, IngestError>,
    ) -> IngestReport {
        let unit = request.name.clone();

        self.started(&unit, StageId::Capture);
        let blob = match self
            .stage_a(request, &mut ticker(self.progress, &unit, StageId::Capture))
            .await
        {
            Ok(blob) => blob,
            Err(e) => return self.fail(report, IngestError::stage(StageId::Capture, e)),
        };
        report.outputs.blob_objects.push(blob.clone());
        self.completed(&unit, StageId::Capture, 1);

        self.started(&unit, StageId::Parse);
        let parsed = match parsed {
            Ok(p) => p,
            Err(e) => return self.fail(report, e),
        };
        let records = match self
            .stage_b(&blob, &parsed, &mut ticker(self.progress, &unit, StageId::Parse))
            .await
        {
            Ok(r) => r,
            Err(e) => return self.fail(report, IngestError::stage(StageId::Parse, e)),
        };
        let outputs = &mut report.outputs;
        outputs.documents.push(records.document.clone());
        outputs.document_versions.push(records.version.clone());
        outputs.sections.extend(records.sections.iter().cloned());
        outputs
            .section_versions
            .extend(records.section_versions.iter().cloned());
        self.completed(
            &unit,
            StageId::Parse,
            2 + records.sections.len() + records.section_versions.len(),
        );

        self.finish_index_and_graph(report, &unit, &records, parsed.amends.as_deref())
            .await
    }

    async fn finish_index_and_graph(
        &self,
        mut report: IngestReport,
        unit: &str,
        records: &ParsedRecords,
        amends: Option<&str>,
    ) -> IngestReport {
        self.started(unit, StageId::Index);
        let chunks = match self
            .stage_c(
                &records.document,
                &records.sections,
                &records.section_versions,
                &mut ticker(self.progress, unit, StageId::Index),
            )
            .await
        {
            Ok(c) => c,
            Err(e) => return self.fail(report, IngestError::stage(StageId::Index, e)),
        };
        self.completed(unit, StageId::Index, chunks.len());
        report.outputs.chunks = chunks;

        self.started(unit, StageId::Graph);
        let graph = match self
            .stage_d(
                &records.document,
                &records.sections,
                amends,
                &mut ticker(self.progress, unit, StageId::Graph),
            )
            .await
        {
            Ok(g) => g,
            Err(e) => return self.fail(report, IngestError::from_stage(StageId::Graph, e)),
        };
        self.completed(unit, StageId::Graph, graph.nodes_created + graph.edges.len());
        report.outputs.graph_nodes = graph.nodes;
        report.outputs.graph_edges = graph.edges;
        report
    }

    /// Stage A: write raw bytes to the blob store and record the capture.
    pub async fn stage_a(
        &self,
        request: &IngestRequest,
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<BlobObject> {
        progress(10);
        let blob_ref = self
            .blobs
            .put(&request.bytes)
            .await
            .with_context(|| format!("failed to store blob for {}", request.name))?;
        progress(70);

        let blob = BlobObject {
            id: Uuid::new_v4().to_string(),
            key: blob_ref.key,
            source: request.source.clone(),
            checksum: blob_ref.checksum,
            content_type: request.content_type.clone(),
            file_size_bytes: blob_ref.size,
            fetched_at: Utc::now(),
        };
        self.store.insert_blob_object(&blob).await?;
        progress(100);
        Ok(blob)
    }

    /// Stage B: store a document, its first version, and its sections.
    pub async fn stage_b(
        &self,
        blob: &BlobObject,
        parsed: &ParsedDocument,
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<ParsedRecords> {
        progress(10);
        let mut document = self
            .store
            .create_document(NewDocument {
                title: parsed.title.clone(),
                jurisdiction: parsed.jurisdiction,
                authority_level: parsed.authority_level,
                source: blob.source.clone(),
                effective_from: parsed.effective_from,
                effective_to: parsed.effective_to,
            })
            .await?;
        progress(30);

        let version = self.new_current_version(&document, blob, parsed).await?;
        document.current_version_id = Some(version.id.clone());
        progress(50);

        let mut sections = Vec::with_capacity(parsed.sections.len());
        let mut section_versions = Vec::with_capacity(parsed.sections.len());
        for input in &parsed.sections {
            let section = self
                .store
                .create_section(&document.id, &input.citation, &input.heading)
                .await?;
            let sv = self
                .store
                .create_section_version(
                    &section.id,
                    &version.id,
                    &input.text,
                    estimate_token_count(&input.text),
                )
                .await?;
            sections.push(section);
            section_versions.push(sv);
        }
        progress(100);

        Ok(ParsedRecords {
            document,
            version,
            sections,
            section_versions,
        })
    }

    async fn new_current_version(
        &self,
        document: &Document,
        blob: &BlobObject,
        parsed: &ParsedDocument,
    ) -> Result<DocumentVersion> {
        let version = self
            .store
            .create_document_version(NewDocumentVersion {
                document_id: document.id.clone(),
                effective_from: parsed.effective_from,
                effective_to: parsed.effective_to,
                source_blob_id: Some(blob.id.clone()),
            })
            .await?;
        self.store
            .set_current_version(&document.id, &version.id)
            .await?;
        Ok(version)
    }

    /// Stage C: chunk and embed every section version into the index.
    ///
    /// Chunks are written in section order, then chunk order.
    pub async fn stage_c(
        &self,
        document: &Document,
        sections: &[Section],
        section_versions: &[SectionVersion],
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<Vec<VectorChunk>> {
        let mut planned = Vec::new();
        for sv in section_versions {
            let Some(section) = sections.iter().find(|s| s.id == sv.section_id) else {
                continue;
            };
            planned.push((sv, section, chunk_text(&sv.text, &self.chunking)));
        }
        let total: usize = planned.iter().map(|(_, _, c)| c.len()).sum();
        progress(5);

        let mut out = Vec::with_capacity(total);
        for (sv, section, text_chunks) in planned {
            for chunk in text_chunks {
                let record = VectorChunk {
                    id: Uuid::new_v4().to_string(),
                    section_version_id: sv.id.clone(),
                    chunk_index: chunk.chunk_index,
                    embedding: self.embedder.embed(&chunk.text),
                    token_count: chunk.token_count,
                    text: chunk.text,
                    metadata: ChunkMetadata {
                        jurisdiction: document.jurisdiction,
                        authority_level: document.authority_level,
                        effective_from: document.effective_from,
                        citation: section.citation.clone(),
                        document_id: document.id.clone(),
                        heading: section.heading.clone(),
                        chunk_index: chunk.chunk_index,
                    },
                };
                self.store.insert_chunk(&record).await?;
                out.push(record);
                let done = out.len() as f64 / total as f64;
                progress(5 + (done * 95.0).round() as u8);
            }
        }
        if total == 0 {
            progress(100);
        }
        Ok(out)
    }

    /// Stage D: link the document into the knowledge graph.
    pub async fn stage_d(
        &self,
        document: &Document,
        sections: &[Section],
        amends: Option<&str>,
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<GraphOutput> {
        self.graph
            .build(self.store, document, sections, amends, progress)
            .await
    }

    /// Ingest several units in authority order.
    ///
    /// Units are sorted by jurisdiction rank, then authority rank (both
    /// highest first), then name, so derivation and conflict edges find
    /// their higher-authority targets already in the graph. Unparseable
    /// units sort last. A failing unit never aborts the batch.
    pub async fn ingest_bulk(&self, mut requests: Vec<IngestRequest>) -> BulkSummary {
        requests.sort_by_cached_key(|r| {
            let (j, a) = match parse_request(r) {
                Ok(p) => (p.jurisdiction.rank(), p.authority_level.rank()),
                Err(_) => (0, 0),
            };
            (Reverse(j), Reverse(a), r.name.clone())
        });

        let mut summary = BulkSummary::default();
        for request in &requests {
            summary.push(self.ingest(request).await);
        }
        summary
    }

    /// Ingest new content for an existing document as its next version.
    ///
    /// Sections are matched to existing ones by citation and created when
    /// new. The document keeps its original classification; the graph is
    /// re-linked idempotently.
    pub async fn ingest_revision(
        &self,
        document_id: &str,
        request: &IngestRequest,
    ) -> IngestReport {
        let report = IngestReport {
            name: request.name.clone(),
            outputs: IngestionOutputs::default(),
            error: None,
        };

        let sum = checksum(&request.bytes);
        match self.store.exists_by_checksum(&sum).await {
            Ok(true) => {
                return self.fail(report, IngestError::Duplicate(DuplicateReason::Checksum(sum)))
            }
            Ok(false) => {}
            Err(e) => return self.fail(report, IngestError::stage(StageId::Capture, e)),
        }
        let document = match self.store.get_document(document_id).await {
            Ok(Some(d)) => d,
            Ok(None) => {
                let err = anyhow::anyhow!("document not found: {}", document_id);
                return self.fail(report, IngestError::stage(StageId::Capture, err));
            }
            Err(e) => return self.fail(report, IngestError::stage(StageId::Capture, e)),
        };

        self.run_revision(report, request, document).await
    }

    async fn run_revision(
        &self,
        mut report: IngestReport,
        request: &IngestRequest,
        document: Document,
    ) -> IngestReport {
        let unit = request.name.clone();

        self.started(&unit, StageId::Capture);
        let blob = match self
            .stage_a(request, &mut ticker(self.progress, &unit, StageId::Capture))
            .await
        {
            Ok(blob) => blob,
            Err(e) => return self.fail(report, IngestError::stage(StageId::Capture, e)),
        };
        report.outputs.blob_objects.push(blob.clone());
        self.completed(&unit, StageId::Capture, 1);

        self.started(&unit, StageId::Parse);
        let parsed = match parse_request(request) {
            Ok(p) => p,
            Err(e) => return self.fail(report, e),
        };
        let records = match self
            .stage_b_revision(
                document,
                &blob,
                &parsed,
                &mut ticker(self.progress, &unit, StageId::Parse),
            )
            .await
        {
            Ok(r) => r,
            Err(e) => return self.fail(report, IngestError::stage(StageId::Parse, e)),
        };
        let outputs = &mut report.outputs;
        outputs.documents.push(records.document.clone());
        outputs.document_versions.push(records.version.clone());
        outputs.sections.extend(records.sections.iter().cloned());
        outputs
            .section_versions
            .extend(records.section_versions.iter().cloned());
        self.completed(&unit, StageId::Parse, 1 + records.section_versions.len());

        self.finish_index_and_graph(report, &unit, &records, parsed.amends.as_deref())
            .await
    }

    async fn stage_b_revision(
        &self,
        mut document: Document,
        blob: &BlobObject,
        parsed: &ParsedDocument,
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<ParsedRecords> {
        progress(10);
        let version = self.new_current_version(&document, blob, parsed).await?;
        document.current_version_id = Some(version.id.clone());
        progress(40);

        let existing = self.store.list_sections(&document.id).await?;
        let mut sections = Vec::with_capacity(parsed.sections.len());
        let mut section_versions = Vec::with_capacity(parsed.sections.len());
        for input in &parsed.sections {
            let section = match existing.iter().find(|s| s.citation == input.citation) {
                Some(s) => s.clone(),
                None => {
                    self.store
                        .create_section(&document.id, &input.citation, &input.heading)
                        .await?
                }
            };
            let sv = self
                .store
                .create_section_version(
                    &section.id,
                    &version.id,
                    &input.text,
                    estimate_token_count(&input.text),
                )
                .await?;
            sections.push(section);
            section_versions.push(sv);
        }
        progress(100);

        Ok(ParsedRecords {
            document,
            version,
            sections,
            section_versions,
        })
    }
}

fn ticker<'p>(
    progress: &'p dyn ProgressReporter,
    unit: &str,
    stage: StageId,
) -> impl FnMut(u8) + Send + 'p {
    let unit = unit.to_string();
    move |percent| {
        progress.report(PipelineEvent::StageProgress {
            unit: unit.clone(),
            stage,
            percent,
        })
    }
}

fn parse_request(request: &IngestRequest) -> Result<ParsedDocument, IngestError> {
    let text = std::str::from_utf8(&request.bytes)
        .map_err(|e| IngestError::Parse(format!("{}: not valid UTF-8: {}", request.name, e)))?;
    parse_document(text, &request.source, &request.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EdgeType, Jurisdiction};
    use crate::store::{
        ChunkFilter, DocumentStore, GraphStore, InMemoryStore, MemoryBlobStore, VectorIndex,
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<PipelineEvent>>,
    }

    impl ProgressReporter for Recorder {
        fn report(&self, event: PipelineEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn json_doc(title: &str, jurisdiction: &str, authority: &str, text: &str) -> Vec<u8> {
        serde_json::json!({
            "title": title,
            "jurisdiction": jurisdiction,
            "authorityLevel": authority,
            "citation": title,
            "effectiveFrom": "2024-01-01",
            "text": text,
        })
        .to_string()
        .into_bytes()
    }

    fn property_code() -> IngestRequest {
        IngestRequest::new(
            "tx-property.json",
            "texas-statutes",
            json_doc(
                "Texas Property Code",
                "state",
                "statute",
                "A political subdivision may not require owner occupancy of rental property.",
            ),
        )
    }

    fn str_ordinance() -> IngestRequest {
        IngestRequest::new(
            "austin-str.json",
            "austin-ordinances",
            json_doc(
                "Austin Short-Term Rental Ordinance",
                "municipal",
                "ordinance",
                "A type 2 short-term rental must be owner occupied.",
            ),
        )
    }

    #[tokio::test]
    async fn test_ingest_produces_all_outputs() {
        let store = InMemoryStore::new();
        let blobs = MemoryBlobStore::new();
        let pipeline = Pipeline::new(&store, &blobs);

        let report = pipeline.ingest(&property_code()).await;
        assert_eq!(report.status(), IngestStatus::Ingested, "{}", report.message());
        let o = &report.outputs;
        assert_eq!(o.blob_objects.len(), 1);
        assert_eq!(o.documents.len(), 1);
        assert_eq!(o.document_versions[0].version_number, 1);
        assert_eq!(
            o.documents[0].current_version_id.as_deref(),
            Some(o.document_versions[0].id.as_str())
        );
        assert_eq!(o.sections.len(), 1);
        assert_eq!(o.chunks.len(), 1);
        assert_eq!(o.chunks[0].embedding.len(), 384);
        assert_eq!(o.chunks[0].metadata.jurisdiction, Jurisdiction::State);
        assert_eq!(o.graph_nodes.len(), 2);
        assert_eq!(o.graph_edges.len(), 1);
        assert_eq!(o.graph_edges[0].edge_type, EdgeType::Authorizes);

        let stored = blobs.get(&o.blob_objects[0].key).await.unwrap().unwrap();
        assert_eq!(stored, property_code().bytes);
    }

    #[tokio::test]
    async fn test_duplicate_checksum_is_skipped_without_writes() {
        let store = InMemoryStore::new();
        let blobs = MemoryBlobStore::new();
        let pipeline = Pipeline::new(&store, &blobs);
        pipeline.ingest(&property_code()).await;

        let docs = store.list_documents().await.unwrap().len();
        let chunks = store.list_chunks(&ChunkFilter::default()).await.unwrap().len();
        let nodes = store.list_nodes().await.unwrap().len();

        let report = pipeline.ingest(&property_code()).await;
        assert_eq!(report.status(), IngestStatus::Skipped);
        assert!(report.message().starts_with("Already ingested: checksum exists"));
        assert_eq!(report.outputs, IngestionOutputs::default());
        assert_eq!(store.list_documents().await.unwrap().len(), docs);
        assert_eq!(store.list_chunks(&ChunkFilter::default()).await.unwrap().len(), chunks);
        assert_eq!(store.list_nodes().await.unwrap().len(), nodes);
        assert_eq!(store.list_blob_objects().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_title_is_skipped() {
        let store = InMemoryStore::new();
        let blobs = MemoryBlobStore::new();
        let pipeline = Pipeline::new(&store, &blobs);
        pipeline.ingest(&property_code()).await;

        // Same title, different bytes.
        let again = IngestRequest::new(
            "tx-property-v2.json",
            "texas-statutes",
            json_doc("Texas Property Code", "state", "statute", "Different text."),
        );
        let report = pipeline.ingest(&again).await;
        assert_eq!(report.status(), IngestStatus::Skipped);
        assert!(report.message().contains("title exists"));
        assert_eq!(store.list_blob_objects().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_parse_failure_stops_after_capture() {
        let store = InMemoryStore::new();
        let blobs = MemoryBlobStore::new();
        let recorder = Recorder::default();
        let pipeline = Pipeline::new(&store, &blobs).with_progress(&recorder);

        let bad = IngestRequest::new(
            "broken.json",
            "texas-statutes",
            br#"{"title": "No Classification"}"#.to_vec(),
        );
        let report = pipeline.ingest(&bad).await;
        assert_eq!(report.status(), IngestStatus::Failed);
        assert_eq!(report.failed_stage(), Some(StageId::Parse));
        // capture record stays, nothing else was written
        assert_eq!(store.list_blob_objects().await.unwrap().len(), 1);
        assert!(store.list_documents().await.unwrap().is_empty());
        assert!(store.list_nodes().await.unwrap().is_empty());

        let events = recorder.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::StageFailed { stage: StageId::Parse, .. }
        )));
        assert!(!events.iter().any(|e| matches!(
            e,
            PipelineEvent::StageStarted { stage: StageId::Index, .. }
        )));
    }

    #[tokio::test]
    async fn test_events_follow_stage_order() {
        let store = InMemoryStore::new();
        let blobs = MemoryBlobStore::new();
        let recorder = Recorder::default();
        let pipeline = Pipeline::new(&store, &blobs).with_progress(&recorder);
        pipeline.ingest(&property_code()).await;

        let events = recorder.events.lock().unwrap();
        let started: Vec<StageId> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::StageStarted { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(started, StageId::ALL.to_vec());

        for stage in StageId::ALL {
            let percents: Vec<u8> = events
                .iter()
                .filter_map(|e| match e {
                    PipelineEvent::StageProgress { stage: s, percent, .. } if *s == stage => {
                        Some(*percent)
                    }
                    _ => None,
                })
                .collect();
            assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
            assert_eq!(percents.last(), Some(&100));
        }
    }

    #[tokio::test]
    async fn test_bulk_processes_in_authority_order() {
        let store = InMemoryStore::new();
        let blobs = MemoryBlobStore::new();
        let pipeline = Pipeline::new(&store, &blobs);

        let constitution = IngestRequest::new(
            "z-constitution.json",
            "us-code",
            json_doc("US Constitution", "federal", "constitution", "We the People."),
        );
        let broken = IngestRequest::new("a-broken.json", "us-code", b"{oops".to_vec());
        let summary = pipeline
            .ingest_bulk(vec![str_ordinance(), broken, property_code(), constitution])
            .await;

        let order: Vec<&str> = summary.reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "z-constitution.json",
                "tx-property.json",
                "austin-str.json",
                "a-broken.json"
            ]
        );
        assert_eq!(summary.ingested, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);

        let edges = store.list_edges().await.unwrap();
        let conflicts: Vec<_> = edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::ConflictsWith)
            .collect();
        assert_eq!(conflicts.len(), 1);
        // state -> federal constitution, municipal -> state, municipal -> constitution
        let derives = edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::DerivesAuthorityFrom)
            .count();
        assert_eq!(derives, 3);
    }

    #[tokio::test]
    async fn test_revisions_number_versions_monotonically() {
        let store = InMemoryStore::new();
        let blobs = MemoryBlobStore::new();
        let pipeline = Pipeline::new(&store, &blobs);

        let report = pipeline.ingest(&property_code()).await;
        let doc_id = report.document_id().unwrap().to_string();
        let section_count = store.list_sections(&doc_id).await.unwrap().len();
        let edge_count = store.list_edges().await.unwrap().len();

        for (i, text) in ["Revised once.", "Revised twice."].iter().enumerate() {
            let rev = IngestRequest::new(
                format!("tx-property-r{}.json", i),
                "texas-statutes",
                json_doc("Texas Property Code", "state", "statute", text),
            );
            let r = pipeline.ingest_revision(&doc_id, &rev).await;
            assert_eq!(r.status(), IngestStatus::Ingested, "{}", r.message());
            assert!(r.outputs.graph_edges.is_empty());
        }

        let versions = store.list_document_versions(&doc_id).await.unwrap();
        let numbers: Vec<u32> = versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        let doc = store.get_document(&doc_id).await.unwrap().unwrap();
        assert_eq!(doc.current_version_id.as_deref(), Some(versions[2].id.as_str()));
        // same citation: section reused, graph unchanged
        assert_eq!(store.list_sections(&doc_id).await.unwrap().len(), section_count);
        assert_eq!(store.list_edges().await.unwrap().len(), edge_count);
        let chunks = store
            .list_chunks(&ChunkFilter {
                document_id: Some(doc_id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(chunks.len(), 3);
    }

    #[tokio::test]
    async fn test_revision_of_unknown_document_fails() {
        let store = InMemoryStore::new();
        let blobs = MemoryBlobStore::new();
        let pipeline = Pipeline::new(&store, &blobs);
        let r = pipeline.ingest_revision("missing", &property_code()).await;
        assert_eq!(r.status(), IngestStatus::Failed);
        assert!(store.list_blob_objects().await.unwrap().is_empty());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a.JSON"), "application/json");
        assert_eq!(content_type_for("a.txt"), "text/plain");
        assert_eq!(content_type_for("a.xml"), "text/xml");
        assert_eq!(content_type_for("noext"), "text/plain");
    }
}
