//! In-memory mock implementation of GraphStore for testing.
//!
//! Provides a complete mock of all graph operations using
//! `tokio::sync::RwLock` collections keyed the way Neo4j keys them:
//! nodes by (label, key), relationships by (type, source, target).
//! Conditionally compiled with `#[cfg(test)]`.

use crate::neo4j::models::*;
use crate::neo4j::traits::GraphStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// (stored label, key value)
pub type MockNodeId = (String, String);

/// A stored node with its properties and provenance
#[derive(Debug, Clone, PartialEq)]
pub struct MockNode {
    pub properties: BTreeMap<String, Value>,
    pub run_id: Option<String>,
    pub imported_at: Option<DateTime<Utc>>,
    pub last_run_id: Option<String>,
}

/// A stored relationship
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MockEdge {
    pub rel: String,
    pub from: MockNodeId,
    pub to: MockNodeId,
}

fn node_id(key: &NodeKey) -> MockNodeId {
    (key.label.as_str().to_string(), key.key.clone())
}

/// In-memory mock implementation of GraphStore for testing.
pub struct MockGraphStore {
    pub nodes: RwLock<BTreeMap<MockNodeId, MockNode>>,
    pub edges: RwLock<BTreeSet<MockEdge>>,
    pub constraints: RwLock<BTreeSet<NodeLabel>>,
    /// Labels whose existing data violates uniqueness
    pub duplicate_labels: RwLock<BTreeSet<NodeLabel>>,
    /// Keys whose upserts fail, simulating a dropped connection
    pub failing_keys: RwLock<BTreeSet<String>>,
    /// Make `list_service_domains` fail
    pub failing_listing: RwLock<bool>,
    /// Flag raised once the remaining upsert count reaches zero
    pub stop_after: RwLock<Option<(Arc<AtomicBool>, usize)>>,
}

impl MockGraphStore {
    /// Create a new empty MockGraphStore.
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            edges: RwLock::new(BTreeSet::new()),
            constraints: RwLock::new(BTreeSet::new()),
            duplicate_labels: RwLock::new(BTreeSet::new()),
            failing_keys: RwLock::new(BTreeSet::new()),
            failing_listing: RwLock::new(false),
            stop_after: RwLock::new(None),
        }
    }

    // ========================================================================
    // Builder / seeding methods for tests
    // ========================================================================

    /// Seed a node owned by another subsystem (arbitrary label)
    pub async fn with_foreign_node(self, label: &str, key: &str, run_id: Option<&str>) -> Self {
        self.nodes.write().await.insert(
            (label.to_string(), key.to_string()),
            MockNode {
                properties: BTreeMap::new(),
                run_id: run_id.map(str::to_string),
                imported_at: run_id.map(|_| Utc::now()),
                last_run_id: run_id.map(str::to_string),
            },
        );
        self
    }

    /// Seed a relationship between two already seeded nodes
    pub async fn with_edge(self, rel: &str, from: (&str, &str), to: (&str, &str)) -> Self {
        self.edges.write().await.insert(MockEdge {
            rel: rel.to_string(),
            from: (from.0.to_string(), from.1.to_string()),
            to: (to.0.to_string(), to.1.to_string()),
        });
        self
    }

    /// Pretend the label already holds duplicate key values
    pub async fn with_duplicate_data(self, label: NodeLabel) -> Self {
        self.duplicate_labels.write().await.insert(label);
        self
    }

    /// Make every upsert of `key` fail
    pub async fn fail_on_key(self, key: &str) -> Self {
        self.failing_keys.write().await.insert(key.to_string());
        self
    }

    /// Make listing service domains fail
    pub async fn fail_listing(self) -> Self {
        *self.failing_listing.write().await = true;
        self
    }

    /// Raise `flag` as the `upserts`-th node upsert completes
    pub async fn stop_after_upserts(self, flag: Arc<AtomicBool>, upserts: usize) -> Self {
        *self.stop_after.write().await = Some((flag, upserts));
        self
    }

    // ========================================================================
    // Inspection helpers
    // ========================================================================

    pub async fn node(&self, label: NodeLabel, key: &str) -> Option<MockNode> {
        self.nodes
            .read()
            .await
            .get(&(label.as_str().to_string(), key.to_string()))
            .cloned()
    }

    pub async fn property(&self, label: NodeLabel, key: &str, property: &str) -> Option<Value> {
        self.node(label, key)
            .await
            .and_then(|n| n.properties.get(property).cloned())
    }

    pub async fn count_label(&self, label: &str) -> usize {
        self.nodes
            .read()
            .await
            .keys()
            .filter(|(l, _)| l == label)
            .count()
    }

    pub async fn count_edges(&self, rel: RelationType) -> usize {
        self.edges
            .read()
            .await
            .iter()
            .filter(|e| e.rel == rel.as_str())
            .count()
    }

    pub async fn has_edge(&self, rel: RelationType, from: &NodeKey, to: &NodeKey) -> bool {
        self.edges.read().await.contains(&MockEdge {
            rel: rel.as_str().to_string(),
            from: node_id(from),
            to: node_id(to),
        })
    }

    /// Sources of `rel` edges pointing at `to`
    pub async fn incoming(&self, rel: RelationType, to: &NodeKey) -> Vec<String> {
        let target = node_id(to);
        self.edges
            .read()
            .await
            .iter()
            .filter(|e| e.rel == rel.as_str() && e.to == target)
            .map(|e| e.from.1.clone())
            .collect()
    }

    /// Shape of the graph with provenance stripped: node ids, properties, edges
    pub async fn snapshot(&self) -> (BTreeMap<MockNodeId, BTreeMap<String, Value>>, BTreeSet<MockEdge>) {
        let nodes = self
            .nodes
            .read()
            .await
            .iter()
            .map(|(id, n)| (id.clone(), n.properties.clone()))
            .collect();
        (nodes, self.edges.read().await.clone())
    }

    // ========================================================================
    // Internal write helpers
    // ========================================================================

    async fn merge_node(
        &self,
        label: NodeLabel,
        key: &str,
        properties: Vec<(&str, Value)>,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome> {
        if self.failing_keys.read().await.contains(key) {
            anyhow::bail!("connection reset while merging {}({})", label, key);
        }

        let mut nodes = self.nodes.write().await;
        let id = (label.as_str().to_string(), key.to_string());
        let outcome = if nodes.contains_key(&id) {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        };

        let node = nodes.entry(id).or_insert_with(|| MockNode {
            properties: BTreeMap::new(),
            run_id: Some(stamp.run_id.clone()),
            imported_at: Some(stamp.imported_at),
            last_run_id: None,
        });
        node.properties
            .insert(label.key_property().to_string(), json!(key));
        for (name, value) in properties {
            if value.is_null() {
                node.properties.remove(name);
            } else {
                node.properties.insert(name.to_string(), value);
            }
        }
        node.last_run_id = Some(stamp.run_id.clone());
        drop(nodes);

        let mut stop_after = self.stop_after.write().await;
        let fired = match stop_after.as_mut() {
            Some((flag, remaining)) => {
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    flag.store(true, Ordering::Relaxed);
                }
                *remaining == 0
            }
            None => false,
        };
        if fired {
            *stop_after = None;
        }

        Ok(outcome)
    }

    /// Remove nodes matching `predicate` (at most `limit`) together with their edges
    async fn detach_delete<F>(&self, limit: usize, predicate: F) -> usize
    where
        F: Fn(&MockNodeId, &MockNode) -> bool,
    {
        let mut nodes = self.nodes.write().await;
        let doomed: Vec<MockNodeId> = nodes
            .iter()
            .filter(|(id, n)| predicate(id, n))
            .map(|(id, _)| id.clone())
            .take(limit)
            .collect();

        let mut edges = self.edges.write().await;
        edges.retain(|e| !doomed.contains(&e.from) && !doomed.contains(&e.to));
        for id in &doomed {
            nodes.remove(id);
        }
        doomed.len()
    }
}

impl Default for MockGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    // ========================================================================
    // Schema
    // ========================================================================

    async fn ensure_unique_constraint(&self, label: NodeLabel) -> Result<ConstraintOutcome> {
        if self.duplicate_labels.read().await.contains(&label) {
            return Ok(ConstraintOutcome::Violated(format!(
                "Both nodes have the label `{}` and property `{}` with the same value",
                label,
                label.key_property()
            )));
        }
        if self.constraints.write().await.insert(label) {
            Ok(ConstraintOutcome::Created)
        } else {
            Ok(ConstraintOutcome::AlreadyPresent)
        }
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    async fn upsert_business_area(
        &self,
        area: &BusinessAreaNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome> {
        self.merge_node(NodeLabel::BusinessArea, &area.name, vec![], stamp)
            .await
    }

    async fn upsert_business_domain(
        &self,
        domain: &BusinessDomainNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome> {
        self.merge_node(NodeLabel::BusinessDomain, &domain.name, vec![], stamp)
            .await
    }

    async fn upsert_service_domain(
        &self,
        service_domain: &ServiceDomainNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome> {
        self.merge_node(
            NodeLabel::ServiceDomain,
            &service_domain.object_id,
            vec![
                ("name", json!(service_domain.name)),
                ("url", json!(service_domain.url)),
            ],
            stamp,
        )
        .await
    }

    async fn link_parent(
        &self,
        rel: RelationType,
        parent: &NodeKey,
        child: &NodeKey,
    ) -> Result<ParentLink> {
        let (parent_id, child_id) = (node_id(parent), node_id(child));
        {
            let nodes = self.nodes.read().await;
            if !nodes.contains_key(&parent_id) || !nodes.contains_key(&child_id) {
                return Ok(ParentLink {
                    outcome: RelationshipOutcome::MissingEndpoint,
                    detached: 0,
                });
            }
        }

        let mut edges = self.edges.write().await;
        let before = edges.len();
        edges.retain(|e| !(e.rel == rel.as_str() && e.to == child_id && e.from != parent_id));
        let detached = before - edges.len();

        let created = edges.insert(MockEdge {
            rel: rel.as_str().to_string(),
            from: parent_id,
            to: child_id,
        });
        Ok(ParentLink {
            outcome: if created {
                RelationshipOutcome::Created
            } else {
                RelationshipOutcome::Existing
            },
            detached,
        })
    }

    // ========================================================================
    // Service domain enrichment
    // ========================================================================

    async fn list_service_domains(&self) -> Result<Vec<ServiceDomainRef>> {
        if *self.failing_listing.read().await {
            anyhow::bail!("connection reset while listing service domains");
        }
        let label = NodeLabel::ServiceDomain.as_str();
        let mut refs: Vec<ServiceDomainRef> = self
            .nodes
            .read()
            .await
            .iter()
            .filter(|((l, _), _)| l == label)
            .map(|((_, key), n)| ServiceDomainRef {
                object_id: key.clone(),
                name: n
                    .properties
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect();
        refs.sort_by(|a, b| a.name.cmp(&b.name).then(a.object_id.cmp(&b.object_id)));
        Ok(refs)
    }

    async fn enrich_service_domain(
        &self,
        object_id: &str,
        enrichment: &ServiceDomainEnrichment,
        stamp: &RunStamp,
    ) -> Result<bool> {
        if self.failing_keys.read().await.contains(object_id) {
            anyhow::bail!("connection reset while enriching {}", object_id);
        }
        let mut nodes = self.nodes.write().await;
        let id = (
            NodeLabel::ServiceDomain.as_str().to_string(),
            object_id.to_string(),
        );
        let Some(node) = nodes.get_mut(&id) else {
            return Ok(false);
        };

        let props = &mut node.properties;
        props.insert("role".into(), json!(enrichment.role));
        props.insert("example_of_use".into(), json!(enrichment.example_of_use));
        props.insert(
            "executive_summary".into(),
            json!(enrichment.executive_summary),
        );
        props.insert("key_features".into(), json!(enrichment.key_features));
        match &enrichment.functional_pattern {
            Some(pattern) => {
                props.insert("functional_pattern".into(), json!(pattern));
            }
            None => {
                props.remove("functional_pattern");
            }
        }
        node.last_run_id = Some(stamp.run_id.clone());
        Ok(true)
    }

    // ========================================================================
    // Specification entities
    // ========================================================================

    async fn upsert_control_record(
        &self,
        record: &ControlRecordNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome> {
        self.merge_node(
            NodeLabel::ControlRecord,
            &record.id,
            vec![("name", json!(record.name))],
            stamp,
        )
        .await
    }

    async fn upsert_behavior_qualifier(
        &self,
        qualifier: &BehaviorQualifierNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome> {
        self.merge_node(
            NodeLabel::BehaviorQualifier,
            &qualifier.id,
            vec![("name", json!(qualifier.name))],
            stamp,
        )
        .await
    }

    async fn upsert_operation(
        &self,
        operation: &OperationNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome> {
        self.merge_node(
            NodeLabel::Operation,
            &operation.id,
            vec![
                ("name", json!(operation.name)),
                ("action_term", json!(operation.action_term)),
                ("summary", json!(operation.summary)),
                ("http_method", json!(operation.http_method)),
                ("path", json!(operation.path)),
            ],
            stamp,
        )
        .await
    }

    async fn upsert_schema(&self, schema: &SchemaNode, stamp: &RunStamp) -> Result<UpsertOutcome> {
        self.merge_node(
            NodeLabel::Schema,
            &schema.id,
            vec![
                ("name", json!(schema.name)),
                ("type", json!(schema.schema_type)),
            ],
            stamp,
        )
        .await
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    async fn merge_relationship(
        &self,
        rel: RelationType,
        from: &NodeKey,
        to: &NodeKey,
    ) -> Result<RelationshipOutcome> {
        let (from_id, to_id) = (node_id(from), node_id(to));
        {
            let nodes = self.nodes.read().await;
            if !nodes.contains_key(&from_id) || !nodes.contains_key(&to_id) {
                return Ok(RelationshipOutcome::MissingEndpoint);
            }
        }

        let created = self.edges.write().await.insert(MockEdge {
            rel: rel.as_str().to_string(),
            from: from_id,
            to: to_id,
        });
        Ok(if created {
            RelationshipOutcome::Created
        } else {
            RelationshipOutcome::Existing
        })
    }

    // ========================================================================
    // Run registry
    // ========================================================================

    async fn list_runs(&self) -> Result<Vec<RunInfo>> {
        let mut runs: BTreeMap<String, RunInfo> = BTreeMap::new();
        for node in self.nodes.read().await.values() {
            let Some(run_id) = &node.run_id else {
                continue;
            };
            let info = runs.entry(run_id.clone()).or_insert_with(|| RunInfo {
                run_id: run_id.clone(),
                node_count: 0,
                earliest_imported_at: None,
            });
            info.node_count += 1;
            info.earliest_imported_at = match (info.earliest_imported_at, node.imported_at) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }

        let mut runs: Vec<RunInfo> = runs.into_values().collect();
        runs.sort_by(|a, b| {
            b.earliest_imported_at
                .cmp(&a.earliest_imported_at)
                .then(b.run_id.cmp(&a.run_id))
        });
        Ok(runs)
    }

    async fn list_touched_run_ids(&self) -> Result<Vec<String>> {
        let ids: BTreeSet<String> = self
            .nodes
            .read()
            .await
            .values()
            .filter_map(|n| n.last_run_id.clone())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn run_footprint(&self, run_id: &str) -> Result<RunFootprint> {
        let nodes = self.nodes.read().await;
        let members: BTreeSet<&MockNodeId> = nodes
            .iter()
            .filter(|(_, n)| n.run_id.as_deref() == Some(run_id))
            .map(|(id, _)| id)
            .collect();
        let relationships = self
            .edges
            .read()
            .await
            .iter()
            .filter(|e| members.contains(&e.from) || members.contains(&e.to))
            .count();
        Ok(RunFootprint {
            nodes: members.len(),
            relationships,
        })
    }

    async fn delete_run_batch(&self, run_id: &str, batch_size: usize) -> Result<usize> {
        Ok(self
            .detach_delete(batch_size, |_, n| n.run_id.as_deref() == Some(run_id))
            .await)
    }

    async fn delete_label_batch(&self, label: NodeLabel, batch_size: usize) -> Result<usize> {
        Ok(self
            .detach_delete(batch_size, |(l, _), _| l == label.as_str())
            .await)
    }

    async fn delete_all_batch(&self, batch_size: usize) -> Result<usize> {
        Ok(self.detach_delete(batch_size, |_, _| true).await)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    async fn graph_stats(&self) -> Result<GraphStats> {
        let mut stats = GraphStats::default();
        for (label, _) in self.nodes.read().await.keys() {
            *stats.nodes.entry(label.clone()).or_default() += 1;
        }
        for edge in self.edges.read().await.iter() {
            *stats.relationships.entry(edge.rel.clone()).or_default() += 1;
        }
        Ok(stats)
    }
}
