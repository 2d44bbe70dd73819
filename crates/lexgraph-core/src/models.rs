//! Core data models used throughout LexGraph.
//!
//! These types represent the raw captures, versioned documents, sections,
//! vector chunks, and knowledge-graph records that flow through the
//! ingestion pipeline. All of them serialize with camelCase field names;
//! that JSON shape is the interchange format with the persistence and
//! presentation layers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ─── Enumerations ───────────────────────────────────────────────────

/// Governmental level that issued a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Jurisdiction {
    Federal,
    State,
    Municipal,
}

impl Jurisdiction {
    /// Numeric rank; higher outranks lower.
    pub fn rank(self) -> u8 {
        match self {
            Jurisdiction::Federal => 3,
            Jurisdiction::State => 2,
            Jurisdiction::Municipal => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Jurisdiction::Federal => "federal",
            Jurisdiction::State => "state",
            Jurisdiction::Municipal => "municipal",
        }
    }
}

/// Kind of legal instrument, ordered by binding force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorityLevel {
    Constitution,
    Statute,
    Regulation,
    Ordinance,
}

impl AuthorityLevel {
    /// Numeric rank; higher outranks lower.
    pub fn rank(self) -> u8 {
        match self {
            AuthorityLevel::Constitution => 4,
            AuthorityLevel::Statute => 3,
            AuthorityLevel::Regulation => 2,
            AuthorityLevel::Ordinance => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthorityLevel::Constitution => "constitution",
            AuthorityLevel::Statute => "statute",
            AuthorityLevel::Regulation => "regulation",
            AuthorityLevel::Ordinance => "ordinance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Document,
    Section,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Document => "document",
            NodeType::Section => "section",
        }
    }
}

/// Relationship carried by a [`GraphEdge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    Authorizes,
    DerivesAuthorityFrom,
    ConflictsWith,
    Amends,
}

impl EdgeType {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeType::Authorizes => "AUTHORIZES",
            EdgeType::DerivesAuthorityFrom => "DERIVES_AUTHORITY_FROM",
            EdgeType::ConflictsWith => "CONFLICTS_WITH",
            EdgeType::Amends => "AMENDS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

/// Error returned when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! impl_str_enum {
    ($ty:ident, $kind:literal, [$($variant:ident),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($ty::$variant.as_str()) {
                        return Ok($ty::$variant);
                    }
                )+
                Err(UnknownVariant {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_str_enum!(Jurisdiction, "jurisdiction", [Federal, State, Municipal]);
impl_str_enum!(
    AuthorityLevel,
    "authority level",
    [Constitution, Statute, Regulation, Ordinance]
);
impl_str_enum!(NodeType, "node type", [Document, Section]);
impl_str_enum!(
    EdgeType,
    "edge type",
    [Authorizes, DerivesAuthorityFrom, ConflictsWith, Amends]
);
impl_str_enum!(Severity, "severity", [High, Medium, Low]);

// ─── Stage A: raw capture ───────────────────────────────────────────

/// Record of a raw capture written to the blob store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobObject {
    pub id: String,
    /// Blob store key (content address).
    pub key: String,
    /// Corpus source name, e.g. `texas-statutes`.
    pub source: String,
    pub checksum: String,
    pub content_type: String,
    pub file_size_bytes: u64,
    pub fetched_at: DateTime<Utc>,
}

// ─── Stage B: versioned documents ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    pub jurisdiction: Jurisdiction,
    pub authority_level: AuthorityLevel,
    pub source: String,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub current_version_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable snapshot of a document at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVersion {
    pub id: String,
    pub document_id: String,
    /// 1-based, monotonic per document.
    pub version_number: u32,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub source_blob_id: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub document_id: String,
    pub citation: String,
    pub heading: String,
}

/// Immutable text of a section within one document version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionVersion {
    pub id: String,
    pub section_id: String,
    pub document_version_id: String,
    pub text: String,
    pub token_count: usize,
}

// ─── Stage C: vector index ──────────────────────────────────────────

/// Metadata denormalized onto every chunk so retrieval needs no joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub jurisdiction: Jurisdiction,
    pub authority_level: AuthorityLevel,
    pub effective_from: NaiveDate,
    pub citation: String,
    pub document_id: String,
    pub heading: String,
    pub chunk_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorChunk {
    pub id: String,
    pub section_version_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub token_count: usize,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

// ─── Stage D: knowledge graph ───────────────────────────────────────

/// A document or section node. Nodes track current state, not history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub node_type: NodeType,
    pub jurisdiction: Jurisdiction,
    pub authority_level: AuthorityLevel,
    pub citation: Option<String>,
    pub effective_from: Option<NaiveDate>,
    pub document_id: Option<String>,
    pub section_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub edge_type: EdgeType,
    pub severity: Option<Severity>,
    pub rationale: Option<String>,
}

// ─── Aggregated output ──────────────────────────────────────────────

/// Everything one ingestion run produced, for the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionOutputs {
    pub blob_objects: Vec<BlobObject>,
    pub documents: Vec<Document>,
    pub document_versions: Vec<DocumentVersion>,
    pub sections: Vec<Section>,
    pub section_versions: Vec<SectionVersion>,
    pub chunks: Vec<VectorChunk>,
    pub graph_nodes: Vec<GraphNode>,
    pub graph_edges: Vec<GraphEdge>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_order_hierarchy() {
        assert!(Jurisdiction::Federal.rank() > Jurisdiction::State.rank());
        assert!(Jurisdiction::State.rank() > Jurisdiction::Municipal.rank());
        assert!(AuthorityLevel::Constitution.rank() > AuthorityLevel::Statute.rank());
        assert!(AuthorityLevel::Regulation.rank() > AuthorityLevel::Ordinance.rank());
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("State".parse::<Jurisdiction>().unwrap(), Jurisdiction::State);
        assert_eq!(
            "derives_authority_from".parse::<EdgeType>().unwrap(),
            EdgeType::DerivesAuthorityFrom
        );
        let err = "county".parse::<Jurisdiction>().unwrap_err();
        assert_eq!(err.to_string(), "unknown jurisdiction: 'county'");
    }

    #[test]
    fn edge_serializes_with_wire_names() {
        let edge = GraphEdge {
            id: "e1".into(),
            source_node_id: "a".into(),
            target_node_id: "b".into(),
            edge_type: EdgeType::ConflictsWith,
            severity: Some(Severity::High),
            rationale: None,
        };
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["edgeType"], "CONFLICTS_WITH");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["sourceNodeId"], "a");
    }
}
