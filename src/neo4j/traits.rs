//! GraphStore trait definition
//!
//! Defines the abstract interface for all graph operations the loaders use.
//! This trait mirrors the public async methods of `Neo4jClient`,
//! enabling testing with the in-memory mock and future backend swaps.

use crate::neo4j::models::*;
use anyhow::Result;
use async_trait::async_trait;

/// Abstract interface for all graph database operations.
///
/// Every upsert is merge-by-key: creation stamps `_run_id` / `_imported_at`,
/// later touches only refresh the `_last_*` audit fields.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ========================================================================
    // Schema
    // ========================================================================

    /// Ensure a uniqueness constraint on the label's key property
    async fn ensure_unique_constraint(&self, label: NodeLabel) -> Result<ConstraintOutcome>;

    // ========================================================================
    // Hierarchy
    // ========================================================================

    async fn upsert_business_area(
        &self,
        area: &BusinessAreaNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome>;

    async fn upsert_business_domain(
        &self,
        domain: &BusinessDomainNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome>;

    async fn upsert_service_domain(
        &self,
        service_domain: &ServiceDomainNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome>;

    /// Attach `child` to `parent` through `rel`, removing any `rel` edge
    /// from a different parent so the child keeps exactly one.
    async fn link_parent(
        &self,
        rel: RelationType,
        parent: &NodeKey,
        child: &NodeKey,
    ) -> Result<ParentLink>;

    // ========================================================================
    // Service domain enrichment
    // ========================================================================

    /// List all service domains (object id and name)
    async fn list_service_domains(&self) -> Result<Vec<ServiceDomainRef>>;

    /// Set descriptive attributes on an existing service domain.
    ///
    /// Returns false when no service domain has that object id.
    async fn enrich_service_domain(
        &self,
        object_id: &str,
        enrichment: &ServiceDomainEnrichment,
        stamp: &RunStamp,
    ) -> Result<bool>;

    // ========================================================================
    // Specification entities
    // ========================================================================

    async fn upsert_control_record(
        &self,
        record: &ControlRecordNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome>;

    async fn upsert_behavior_qualifier(
        &self,
        qualifier: &BehaviorQualifierNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome>;

    async fn upsert_operation(
        &self,
        operation: &OperationNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome>;

    async fn upsert_schema(&self, schema: &SchemaNode, stamp: &RunStamp) -> Result<UpsertOutcome>;

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Merge a relationship keyed by its ordered endpoint pair
    async fn merge_relationship(
        &self,
        rel: RelationType,
        from: &NodeKey,
        to: &NodeKey,
    ) -> Result<RelationshipOutcome>;

    // ========================================================================
    // Run registry
    // ========================================================================

    /// Runs present in the graph, most recent first
    async fn list_runs(&self) -> Result<Vec<RunInfo>>;

    /// Distinct `_last_run_id` values, including runs that created nothing
    async fn list_touched_run_ids(&self) -> Result<Vec<String>>;

    /// Count what deleting a run would remove
    async fn run_footprint(&self, run_id: &str) -> Result<RunFootprint>;

    /// Detach-delete up to `batch_size` nodes created by `run_id`.
    ///
    /// Returns the number of nodes deleted; 0 means the run is gone.
    async fn delete_run_batch(&self, run_id: &str, batch_size: usize) -> Result<usize>;

    /// Detach-delete up to `batch_size` nodes carrying `label`
    async fn delete_label_batch(&self, label: NodeLabel, batch_size: usize) -> Result<usize>;

    /// Detach-delete up to `batch_size` nodes of any label
    async fn delete_all_batch(&self, batch_size: usize) -> Result<usize>;

    // ========================================================================
    // Statistics
    // ========================================================================

    async fn graph_stats(&self) -> Result<GraphStats>;
}
