//! Error taxonomy for the ingestion pipeline.
//!
//! Store and stage internals return [`anyhow::Result`]; the orchestrator
//! classifies failures into [`IngestError`] at its boundary so callers can
//! tell a skipped duplicate from a failed stage.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stage identifier, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    /// Raw capture into the blob store.
    Capture,
    /// Parse and store versioned documents and sections.
    Parse,
    /// Chunk, embed, and index.
    Index,
    /// Knowledge-graph nodes and edges.
    Graph,
}

impl StageId {
    pub const ALL: [StageId; 4] = [
        StageId::Capture,
        StageId::Parse,
        StageId::Index,
        StageId::Graph,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageId::Capture => "capture",
            StageId::Parse => "parse",
            StageId::Index => "index",
            StageId::Graph => "graph",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an ingestion unit was recognised as already ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum DuplicateReason {
    Checksum(String),
    Title(String),
}

impl fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateReason::Checksum(c) => write!(f, "checksum exists ({})", c),
            DuplicateReason::Title(t) => write!(f, "title exists ({})", t),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    /// Soft failure: the unit is skipped, not failed.
    #[error("already ingested: {0}")]
    Duplicate(DuplicateReason),

    /// Malformed input or missing required metadata.
    #[error("parse error: {0}")]
    Parse(String),

    /// A stage failed; later stages did not run.
    #[error("stage '{stage}' failed: {source:#}")]
    Stage {
        stage: StageId,
        #[source]
        source: anyhow::Error,
    },

    /// An edge referenced a node that does not exist.
    #[error("graph consistency violated: node '{node_id}' does not exist")]
    GraphConsistency { node_id: String },
}

impl IngestError {
    pub fn stage(stage: StageId, source: anyhow::Error) -> Self {
        IngestError::Stage { stage, source }
    }

    /// Like [`IngestError::stage`], but keeps an `IngestError` raised by a
    /// store as-is instead of wrapping it.
    pub fn from_stage(stage: StageId, source: anyhow::Error) -> Self {
        match source.downcast::<IngestError>() {
            Ok(err) => err,
            Err(source) => IngestError::Stage { stage, source },
        }
    }

    /// The stage this error failed, or `None` for a skipped duplicate.
    pub fn stage_id(&self) -> Option<StageId> {
        match self {
            IngestError::Duplicate(_) => None,
            IngestError::Stage { stage, .. } => Some(*stage),
            IngestError::Parse(_) => Some(StageId::Parse),
            IngestError::GraphConsistency { .. } => Some(StageId::Graph),
        }
    }

    /// Whether this error means "skip" rather than "fail".
    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestError::Duplicate(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_message_includes_stage_and_cause() {
        let err = IngestError::stage(StageId::Index, anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "stage 'index' failed: disk full");
        assert!(!err.is_duplicate());
    }

    #[test]
    fn store_consistency_error_is_not_rewrapped() {
        let raised = anyhow::Error::new(IngestError::GraphConsistency {
            node_id: "ghost".into(),
        });
        let err = IngestError::from_stage(StageId::Graph, raised);
        assert!(matches!(
            &err,
            IngestError::GraphConsistency { node_id } if node_id == "ghost"
        ));
        assert_eq!(err.stage_id(), Some(StageId::Graph));

        let plain = IngestError::from_stage(StageId::Graph, anyhow::anyhow!("locked"));
        assert!(matches!(plain, IngestError::Stage { stage: StageId::Graph, .. }));
    }

    #[test]
    fn duplicate_is_soft() {
        let err = IngestError::Duplicate(DuplicateReason::Title("Texas Property Code".into()));
        assert!(err.is_duplicate());
        assert_eq!(
            err.to_string(),
            "already ingested: title exists (Texas Property Code)"
        );
    }
}
