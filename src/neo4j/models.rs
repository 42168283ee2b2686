//! Neo4j graph models for the BIAN reference taxonomy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Labels and relationship types
// ============================================================================

/// Node label of a BIAN reference entity.
///
/// The set is closed: labels are interpolated into Cypher, so only these
/// values ever reach a query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeLabel {
    BusinessArea,
    BusinessDomain,
    ServiceDomain,
    ControlRecord,
    BehaviorQualifier,
    Operation,
    Schema,
}

impl NodeLabel {
    /// All reference labels, hierarchy first
    pub const ALL: [NodeLabel; 7] = [
        NodeLabel::BusinessArea,
        NodeLabel::BusinessDomain,
        NodeLabel::ServiceDomain,
        NodeLabel::ControlRecord,
        NodeLabel::BehaviorQualifier,
        NodeLabel::Operation,
        NodeLabel::Schema,
    ];

    /// Label as stored in Neo4j
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BusinessArea => "BusinessArea",
            Self::BusinessDomain => "BusinessDomain",
            Self::ServiceDomain => "BIANServiceDomain",
            Self::ControlRecord => "BIANControlRecord",
            Self::BehaviorQualifier => "BIANBehaviorQualifier",
            Self::Operation => "BIANOperation",
            Self::Schema => "BIANSchema",
        }
    }

    /// Unique key property
    pub fn key_property(&self) -> &'static str {
        match self {
            Self::BusinessArea | Self::BusinessDomain => "name",
            Self::ServiceDomain => "object_id",
            Self::ControlRecord | Self::BehaviorQualifier | Self::Operation | Self::Schema => "id",
        }
    }

    /// Name of the uniqueness constraint on the key property
    pub fn constraint_name(&self) -> String {
        let entity = match self {
            Self::BusinessArea => "business_area",
            Self::BusinessDomain => "business_domain",
            Self::ServiceDomain => "service_domain",
            Self::ControlRecord => "control_record",
            Self::BehaviorQualifier => "behavior_qualifier",
            Self::Operation => "operation",
            Self::Schema => "schema",
        };
        format!("bian_{}_{}", entity, self.key_property())
    }

    /// Reverse lookup from a stored label
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == label)
    }
}

impl std::fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relationship type between reference entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationType {
    HasDomain,
    HasService,
    Triggers,
    HasControlRecord,
    HasBehaviorQualifier,
    HasOperation,
    HasSchema,
    ForControlRecord,
    ForBehaviorQualifier,
}

impl RelationType {
    pub const ALL: [RelationType; 9] = [
        RelationType::HasDomain,
        RelationType::HasService,
        RelationType::Triggers,
        RelationType::HasControlRecord,
        RelationType::HasBehaviorQualifier,
        RelationType::HasOperation,
        RelationType::HasSchema,
        RelationType::ForControlRecord,
        RelationType::ForBehaviorQualifier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HasDomain => "HAS_DOMAIN",
            Self::HasService => "HAS_SERVICE",
            Self::Triggers => "TRIGGERS",
            Self::HasControlRecord => "HAS_CR",
            Self::HasBehaviorQualifier => "HAS_BQ",
            Self::HasOperation => "HAS_OPERATION",
            Self::HasSchema => "HAS_SCHEMA",
            Self::ForControlRecord => "FOR_CR",
            Self::ForBehaviorQualifier => "FOR_BQ",
        }
    }

    /// (source label, target label) the relationship connects
    pub fn endpoints(&self) -> (NodeLabel, NodeLabel) {
        match self {
            Self::HasDomain => (NodeLabel::BusinessArea, NodeLabel::BusinessDomain),
            Self::HasService => (NodeLabel::BusinessDomain, NodeLabel::ServiceDomain),
            Self::Triggers => (NodeLabel::ServiceDomain, NodeLabel::ServiceDomain),
            Self::HasControlRecord => (NodeLabel::ServiceDomain, NodeLabel::ControlRecord),
            Self::HasBehaviorQualifier => (NodeLabel::ServiceDomain, NodeLabel::BehaviorQualifier),
            Self::HasOperation => (NodeLabel::ServiceDomain, NodeLabel::Operation),
            Self::HasSchema => (NodeLabel::ServiceDomain, NodeLabel::Schema),
            Self::ForControlRecord => (NodeLabel::Operation, NodeLabel::ControlRecord),
            Self::ForBehaviorQualifier => (NodeLabel::Operation, NodeLabel::BehaviorQualifier),
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Address of a node: label plus unique key value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub label: NodeLabel,
    pub key: String,
}

impl NodeKey {
    pub fn new(label: NodeLabel, key: impl Into<String>) -> Self {
        Self {
            label,
            key: key.into(),
        }
    }

    pub fn business_area(name: &str) -> Self {
        Self::new(NodeLabel::BusinessArea, name)
    }

    pub fn business_domain(name: &str) -> Self {
        Self::new(NodeLabel::BusinessDomain, name)
    }

    pub fn service_domain(object_id: &str) -> Self {
        Self::new(NodeLabel::ServiceDomain, object_id)
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.label, self.key)
    }
}

// ============================================================================
// Provenance
// ============================================================================

/// Provenance applied to every node a run touches.
///
/// `run_id` and `imported_at` land in `_run_id` / `_imported_at` only when the
/// node is created; every touch refreshes `_last_run_id` / `_last_imported_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStamp {
    pub run_id: String,
    pub imported_at: DateTime<Utc>,
}

impl RunStamp {
    pub fn new(run_id: impl Into<String>, imported_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            imported_at,
        }
    }
}

// ============================================================================
// Hierarchy nodes
// ============================================================================

/// Root of the taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessAreaNode {
    pub name: String,
}

/// Second level, child of exactly one business area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessDomainNode {
    pub name: String,
}

/// Service domain as declared by the hierarchy index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDomainNode {
    pub object_id: String,
    pub name: String,
    pub url: Option<String>,
}

/// Descriptive attributes attached by enrichment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDomainEnrichment {
    pub role: String,
    pub example_of_use: String,
    pub executive_summary: String,
    pub key_features: Vec<String>,
    /// Unset when the document carries no recognised pattern
    pub functional_pattern: Option<String>,
}

/// Lightweight service domain view used for name resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDomainRef {
    pub object_id: String,
    pub name: String,
}

// ============================================================================
// Specification nodes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRecordNode {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorQualifierNode {
    pub id: String,
    pub name: String,
}

/// One API action of a service domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationNode {
    pub id: String,
    pub name: String,
    pub action_term: String,
    pub http_method: String,
    pub path: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub schema_type: String,
}

// ============================================================================
// Write outcomes
// ============================================================================

/// Result of a merge-by-key upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Created/updated tally for one entity type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertCounts {
    pub created: usize,
    pub updated: usize,
}

impl UpsertCounts {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated
    }
}

/// Result of merging a relationship keyed by its ordered endpoint pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipOutcome {
    Created,
    Existing,
    /// One of the endpoints does not exist; nothing was written
    MissingEndpoint,
}

/// Result of attaching a child to its single containment parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
    pub outcome: RelationshipOutcome,
    /// Containment edges from previous parents that were removed
    pub detached: usize,
}

/// Result of ensuring a uniqueness constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum ConstraintOutcome {
    Created,
    AlreadyPresent,
    /// Existing data violates uniqueness
    Violated(String),
}

// ============================================================================
// Run registry views
// ============================================================================

/// One import run as seen in the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub node_count: usize,
    pub earliest_imported_at: Option<DateTime<Utc>>,
}

/// Nodes and relationships that deleting a run would remove
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFootprint {
    pub nodes: usize,
    pub relationships: usize,
}

/// Node and relationship counts of the whole graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Node count per stored label (includes labels owned by other subsystems)
    pub nodes: BTreeMap<String, usize>,
    pub relationships: BTreeMap<String, usize>,
}

impl GraphStats {
    /// Nodes carrying a reference label
    pub fn reference_nodes(&self) -> usize {
        self.nodes
            .iter()
            .filter(|(label, _)| NodeLabel::from_label(label).is_some())
            .map(|(_, count)| count)
            .sum()
    }

    /// Nodes carrying any other label
    pub fn other_nodes(&self) -> usize {
        self.total_nodes() - self.reference_nodes()
    }

    pub fn total_nodes(&self) -> usize {
        self.nodes.values().sum()
    }

    pub fn node_count(&self, label: NodeLabel) -> usize {
        self.nodes.get(label.as_str()).copied().unwrap_or(0)
    }

    pub fn relationship_count(&self, rel: RelationType) -> usize {
        self.relationships.get(rel.as_str()).copied().unwrap_or(0)
    }
}
