//! Knowledge-graph construction.
//!
//! [`GraphBuilder::build`] links one ingested document into the graph:
//!
//! 1. get-or-create the document node and one node per section, with an
//!    `AUTHORIZES` edge from the document to each of its sections;
//! 2. `DERIVES_AUTHORITY_FROM` edges to every existing document node that
//!    outranks it (see [`derives_authority`]);
//! 3. at most one `CONFLICTS_WITH` edge per counterpart, chosen from an
//!    ordered list of [`ConflictRule`]s under a [`ConflictPolicy`];
//! 4. an `AMENDS` edge when the document names the title it amends.
//!
//! Every edge goes through [`GraphStore::insert_edge_if_absent`], so
//! running the builder twice for the same document changes nothing.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    AuthorityLevel, Document, EdgeType, GraphEdge, GraphNode, Jurisdiction, NodeType, Section,
    Severity,
};
use crate::store::{GraphStore, NewEdge};

pub const RENTAL_RATIONALE: &str = "Municipal rental/STR ordinance may conflict with state \
property rights protections. Texas Property Code § 5.003 prohibits owner-occupancy requirements \
for rentals.";

pub const ZONING_RATIONALE: &str = "Municipal zoning regulations must comply with state local \
government code limitations on municipal authority.";

/// A keyword heuristic flagging a possible conflict between two documents.
///
/// Fires when the subject document has `subject_jurisdiction`, the
/// counterpart has `counterpart_jurisdiction`, the subject's lower-cased
/// title contains any of `subject_terms`, and the counterpart's lower-cased
/// label contains any of `counterpart_terms`. Section text is never
/// inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRule {
    pub name: String,
    pub subject_jurisdiction: Jurisdiction,
    pub counterpart_jurisdiction: Jurisdiction,
    pub subject_terms: Vec<String>,
    pub counterpart_terms: Vec<String>,
    pub severity: Severity,
    pub rationale: String,
}

impl ConflictRule {
    pub fn fires(
        &self,
        subject_jurisdiction: Jurisdiction,
        subject_title: &str,
        counterpart: &GraphNode,
    ) -> bool {
        if subject_jurisdiction != self.subject_jurisdiction
            || counterpart.jurisdiction != self.counterpart_jurisdiction
        {
            return false;
        }
        let title = subject_title.to_lowercase();
        let label = counterpart.label.to_lowercase();
        self.subject_terms.iter().any(|t| title.contains(t.as_str()))
            && self.counterpart_terms.iter().any(|t| label.contains(t.as_str()))
    }
}

fn terms(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// The built-in municipal-versus-state rules, in evaluation order.
pub fn default_conflict_rules() -> Vec<ConflictRule> {
    vec![
        ConflictRule {
            name: "rental".to_string(),
            subject_jurisdiction: Jurisdiction::Municipal,
            counterpart_jurisdiction: Jurisdiction::State,
            subject_terms: terms(&["rental", "str", "short-term"]),
            counterpart_terms: terms(&["property", "landlord"]),
            severity: Severity::High,
            rationale: RENTAL_RATIONALE.to_string(),
        },
        ConflictRule {
            name: "zoning".to_string(),
            subject_jurisdiction: Jurisdiction::Municipal,
            counterpart_jurisdiction: Jurisdiction::State,
            subject_terms: terms(&["zoning", "land use"]),
            counterpart_terms: terms(&["local government", "municipal"]),
            severity: Severity::High,
            rationale: ZONING_RATIONALE.to_string(),
        },
    ]
}

/// Which firing rule supplies severity and rationale when several match
/// the same pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    #[default]
    #[serde(rename = "first")]
    FirstMatch,
    #[serde(rename = "last")]
    LastMatch,
}

impl ConflictPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictPolicy::FirstMatch => "first",
            ConflictPolicy::LastMatch => "last",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(ConflictPolicy::FirstMatch),
            "last" => Ok(ConflictPolicy::LastMatch),
            other => bail!("unknown conflict policy: '{}' (expected first|last)", other),
        }
    }
}

/// Whether a document at `current` derives authority from one at `other`.
///
/// Two independent cases:
/// - same jurisdiction and `other` has the higher authority level;
/// - `other` is in a higher jurisdiction that is either the immediately
///   higher one or whose document is a constitution.
pub fn derives_authority(
    current: (Jurisdiction, AuthorityLevel),
    other: (Jurisdiction, AuthorityLevel),
) -> bool {
    let (cur_j, cur_a) = (current.0.rank(), current.1.rank());
    let (oth_j, oth_a) = (other.0.rank(), other.1.rank());

    let same_jurisdiction_higher_authority = oth_j == cur_j && oth_a > cur_a;
    let higher_jurisdiction = oth_j > cur_j
        && (oth_j == cur_j + 1 || other.1 == AuthorityLevel::Constitution);

    same_jurisdiction_higher_authority || higher_jurisdiction
}

/// Nodes and edges touched by one [`GraphBuilder::build`] run.
#[derive(Debug, Clone, Default)]
pub struct GraphOutput {
    /// The document node followed by its section nodes, new or existing.
    pub nodes: Vec<GraphNode>,
    /// How many of `nodes` this run created.
    pub nodes_created: usize,
    /// Edges this run inserted.
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone)]
pub struct GraphBuilder {
    rules: Vec<ConflictRule>,
    policy: ConflictPolicy,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new(default_conflict_rules(), ConflictPolicy::default())
    }
}

impl GraphBuilder {
    pub fn new(rules: Vec<ConflictRule>, policy: ConflictPolicy) -> Self {
        Self { rules, policy }
    }

    pub fn with_policy(policy: ConflictPolicy) -> Self {
        Self::new(default_conflict_rules(), policy)
    }

    pub fn rules(&self) -> &[ConflictRule] {
        &self.rules
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// The rule that decides the conflict edge for a pair, if any fires.
    pub fn select_rule(
        &self,
        subject_jurisdiction: Jurisdiction,
        subject_title: &str,
        counterpart: &GraphNode,
    ) -> Option<&ConflictRule> {
        let mut firing = self
            .rules
            .iter()
            .filter(|r| r.fires(subject_jurisdiction, subject_title, counterpart));
        match self.policy {
            ConflictPolicy::FirstMatch => firing.next(),
            ConflictPolicy::LastMatch => firing.last(),
        }
    }

    /// Link `document` and its `sections` into the graph.
    ///
    /// `amends` is the title of a document this one amends. `progress`
    /// receives a monotonic percentage. Writes are committed step by step;
    /// on error, earlier steps stay applied.
    pub async fn build<S>(
        &self,
        store: &S,
        document: &Document,
        sections: &[Section],
        amends: Option<&str>,
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<GraphOutput>
    where
        S: GraphStore + ?Sized,
    {
        let mut out = GraphOutput::default();
        progress(5);

        let doc_node = match store.find_document_node(&document.id).await? {
            Some(node) => node,
            None => {
                let node = GraphNode {
                    id: Uuid::new_v4().to_string(),
                    label: document.title.clone(),
                    node_type: NodeType::Document,
                    jurisdiction: document.jurisdiction,
                    authority_level: document.authority_level,
                    citation: None,
                    effective_from: Some(document.effective_from),
                    document_id: Some(document.id.clone()),
                    section_id: None,
                };
                store.insert_node(&node).await?;
                out.nodes_created += 1;
                node
            }
        };
        out.nodes.push(doc_node.clone());
        progress(15);

        for section in sections {
            let section_node = match store.find_section_node(&section.id).await? {
                Some(node) => node,
                None => {
                    let node = GraphNode {
                        id: Uuid::new_v4().to_string(),
                        label: section.heading.clone(),
                        node_type: NodeType::Section,
                        jurisdiction: document.jurisdiction,
                        authority_level: document.authority_level,
                        citation: Some(section.citation.clone()),
                        effective_from: Some(document.effective_from),
                        document_id: Some(document.id.clone()),
                        section_id: Some(section.id.clone()),
                    };
                    store.insert_node(&node).await?;
                    out.nodes_created += 1;
                    node
                }
            };
            let edge = NewEdge::new(&doc_node.id, &section_node.id, EdgeType::Authorizes);
            if let Some(created) = store.insert_edge_if_absent(edge).await? {
                out.edges.push(created);
            }
            out.nodes.push(section_node);
        }
        progress(40);

        let others: Vec<GraphNode> = store
            .list_document_nodes()
            .await?
            .into_iter()
            .filter(|n| n.id != doc_node.id)
            .collect();
        progress(50);

        let current = (document.jurisdiction, document.authority_level);
        for other in &others {
            if !derives_authority(current, (other.jurisdiction, other.authority_level)) {
                continue;
            }
            let edge = NewEdge::new(&doc_node.id, &other.id, EdgeType::DerivesAuthorityFrom);
            if let Some(created) = store.insert_edge_if_absent(edge).await? {
                out.edges.push(created);
            }
        }
        progress(70);

        for other in &others {
            let Some(rule) = self.select_rule(document.jurisdiction, &document.title, other) else {
                continue;
            };
            let edge = NewEdge {
                severity: Some(rule.severity),
                rationale: Some(rule.rationale.clone()),
                ..NewEdge::new(&doc_node.id, &other.id, EdgeType::ConflictsWith)
            };
            if let Some(created) = store.insert_edge_if_absent(edge).await? {
                out.edges.push(created);
            }
        }
        progress(85);

        if let Some(title) = amends {
            if let Some(target) = others.iter().find(|n| n.label == title) {
                let edge = NewEdge::new(&doc_node.id, &target.id, EdgeType::Amends);
                if let Some(created) = store.insert_edge_if_absent(edge).await? {
                    out.edges.push(created);
                }
            }
        }
        progress(100);

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::{NaiveDate, Utc};

    fn document(title: &str, j: Jurisdiction, a: AuthorityLevel) -> Document {
        Document {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            jurisdiction: j,
            authority_level: a,
            source: "test".to_string(),
            effective_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            effective_to: None,
            current_version_id: None,
            created_at: Utc::now(),
        }
    }

    fn section(doc: &Document, citation: &str) -> Section {
        Section {
            id: Uuid::new_v4().to_string(),
            document_id: doc.id.clone(),
            citation: citation.to_string(),
            heading: format!("Heading {}", citation),
        }
    }

    async fn build(
        builder: &GraphBuilder,
        store: &InMemoryStore,
        doc: &Document,
        sections: &[Section],
    ) -> GraphOutput {
        builder
            .build(store, doc, sections, None, &mut |_| {})
            .await
            .unwrap()
    }

    fn edges_of(edges: &[GraphEdge], t: EdgeType) -> Vec<&GraphEdge> {
        edges.iter().filter(|e| e.edge_type == t).collect()
    }

    #[test]
    fn test_derivation_rules() {
        use AuthorityLevel::*;
        use Jurisdiction::*;
        // same jurisdiction, higher authority
        assert!(derives_authority((Federal, Regulation), (Federal, Statute)));
        assert!(!derives_authority((Federal, Statute), (Federal, Regulation)));
        assert!(!derives_authority((State, Statute), (State, Statute)));
        // immediately higher jurisdiction, any authority
        assert!(derives_authority((State, Statute), (Federal, Regulation)));
        assert!(derives_authority((Municipal, Ordinance), (State, Statute)));
        // two levels up only for constitutions
        assert!(!derives_authority((Municipal, Ordinance), (Federal, Statute)));
        assert!(derives_authority((Municipal, Ordinance), (Federal, Constitution)));
        // never downward
        assert!(!derives_authority((Federal, Constitution), (State, Statute)));
    }

    #[tokio::test]
    async fn test_state_statute_derives_from_federal_constitution() {
        let store = InMemoryStore::new();
        let builder = GraphBuilder::default();

        let constitution = document("US Constitution", Jurisdiction::Federal, AuthorityLevel::Constitution);
        build(&builder, &store, &constitution, &[section(&constitution, "Art. I")]).await;

        let statute = document("Texas Property Code", Jurisdiction::State, AuthorityLevel::Statute);
        let out = build(&builder, &store, &statute, &[section(&statute, "§ 5.003")]).await;

        let derives = edges_of(&out.edges, EdgeType::DerivesAuthorityFrom);
        assert_eq!(derives.len(), 1);
        assert_eq!(derives[0].source_node_id, out.nodes[0].id);
        let const_node = store.find_document_node(&constitution.id).await.unwrap().unwrap();
        assert_eq!(derives[0].target_node_id, const_node.id);
        assert_eq!(edges_of(&out.edges, EdgeType::Authorizes).len(), 1);
    }

    #[tokio::test]
    async fn test_state_statute_derives_from_federal_statute() {
        let store = InMemoryStore::new();
        let builder = GraphBuilder::default();

        let federal = document("Fair Housing Act", Jurisdiction::Federal, AuthorityLevel::Statute);
        build(&builder, &store, &federal, &[section(&federal, "42 U.S.C. § 3604")]).await;

        let statute = document("Texas Property Code", Jurisdiction::State, AuthorityLevel::Statute);
        let out = build(&builder, &store, &statute, &[section(&statute, "§ 5.003")]).await;

        let derives = edges_of(&out.edges, EdgeType::DerivesAuthorityFrom);
        assert_eq!(derives.len(), 1);
        assert_eq!(derives[0].source_node_id, out.nodes[0].id);
        let federal_node = store.find_document_node(&federal.id).await.unwrap().unwrap();
        assert_eq!(derives[0].target_node_id, federal_node.id);
        assert!(edges_of(&out.edges, EdgeType::ConflictsWith).is_empty());
    }

    #[tokio::test]
    async fn test_rental_conflict_with_property_code() {
        let store = InMemoryStore::new();
        let builder = GraphBuilder::default();

        let state = document("Texas Property Code", Jurisdiction::State, AuthorityLevel::Statute);
        build(&builder, &store, &state, &[]).await;
        let city = document(
            "Austin Short-Term Rental Ordinance",
            Jurisdiction::Municipal,
            AuthorityLevel::Ordinance,
        );
        let out = build(&builder, &store, &city, &[]).await;

        let conflicts = edges_of(&out.edges, EdgeType::ConflictsWith);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].severity, Some(Severity::High));
        assert_eq!(conflicts[0].rationale.as_deref(), Some(RENTAL_RATIONALE));
        // derivation and conflict coexist for the same pair
        assert_eq!(edges_of(&out.edges, EdgeType::DerivesAuthorityFrom).len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_needs_matching_counterpart_terms() {
        let store = InMemoryStore::new();
        let builder = GraphBuilder::default();
        let state = document("Texas Election Code", Jurisdiction::State, AuthorityLevel::Statute);
        build(&builder, &store, &state, &[]).await;
        let city = document("Austin Rental Registration", Jurisdiction::Municipal, AuthorityLevel::Ordinance);
        let out = build(&builder, &store, &city, &[]).await;
        assert!(edges_of(&out.edges, EdgeType::ConflictsWith).is_empty());
    }

    #[tokio::test]
    async fn test_conflict_policy_picks_rule() {
        // Title and label match both default rules.
        let title = "Short-Term Rental Zoning Overlay";
        let label = "Texas Local Government and Property Code";
        let counterpart = GraphNode {
            id: "n".into(),
            label: label.into(),
            node_type: NodeType::Document,
            jurisdiction: Jurisdiction::State,
            authority_level: AuthorityLevel::Statute,
            citation: None,
            effective_from: None,
            document_id: None,
            section_id: None,
        };
        let first = GraphBuilder::with_policy(ConflictPolicy::FirstMatch);
        let last = GraphBuilder::with_policy(ConflictPolicy::LastMatch);
        assert_eq!(
            first.select_rule(Jurisdiction::Municipal, title, &counterpart).unwrap().name,
            "rental"
        );
        assert_eq!(
            last.select_rule(Jurisdiction::Municipal, title, &counterpart).unwrap().name,
            "zoning"
        );
        assert!(first
            .select_rule(Jurisdiction::State, title, &counterpart)
            .is_none());
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let store = InMemoryStore::new();
        let builder = GraphBuilder::default();
        let state = document("Texas Property Code", Jurisdiction::State, AuthorityLevel::Statute);
        build(&builder, &store, &state, &[section(&state, "§ 1")]).await;
        let city = document("Austin STR Ordinance", Jurisdiction::Municipal, AuthorityLevel::Ordinance);
        let city_sections = vec![section(&city, "§ 25-2-788"), section(&city, "§ 25-2-789")];
        let first = build(&builder, &store, &city, &city_sections).await;
        assert_eq!(first.nodes_created, 3);

        let nodes_before = store.list_nodes().await.unwrap().len();
        let edges_before = store.list_edges().await.unwrap().len();
        let second = build(&builder, &store, &city, &city_sections).await;
        assert_eq!(second.nodes_created, 0);
        assert!(second.edges.is_empty());
        assert_eq!(second.nodes.len(), 3);
        assert_eq!(store.list_nodes().await.unwrap().len(), nodes_before);
        assert_eq!(store.list_edges().await.unwrap().len(), edges_before);
    }

    #[tokio::test]
    async fn test_amends_edge() {
        let store = InMemoryStore::new();
        let builder = GraphBuilder::default();
        let base = document("Austin STR Ordinance", Jurisdiction::Municipal, AuthorityLevel::Ordinance);
        build(&builder, &store, &base, &[]).await;
        let amendment = document("STR Amendment 2024", Jurisdiction::Municipal, AuthorityLevel::Ordinance);
        let out = builder
            .build(&store, &amendment, &[], Some("Austin STR Ordinance"), &mut |_| {})
            .await
            .unwrap();
        let amends = edges_of(&out.edges, EdgeType::Amends);
        assert_eq!(amends.len(), 1);

        // unknown target is ignored
        let orphan = document("Lonely Amendment", Jurisdiction::Municipal, AuthorityLevel::Ordinance);
        let out = builder
            .build(&store, &orphan, &[], Some("Nope"), &mut |_| {})
            .await
            .unwrap();
        assert!(edges_of(&out.edges, EdgeType::Amends).is_empty());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let store = InMemoryStore::new();
        let builder = GraphBuilder::default();
        let doc = document("US Code Title 42", Jurisdiction::Federal, AuthorityLevel::Statute);
        let mut seen = Vec::new();
        builder
            .build(&store, &doc, &[], None, &mut |p| seen.push(p))
            .await
            .unwrap();
        assert_eq!(seen, vec![5, 15, 40, 50, 70, 85, 100]);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("first".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::FirstMatch);
        assert_eq!("LAST".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::LastMatch);
        assert!("middle".parse::<ConflictPolicy>().is_err());
    }
}
