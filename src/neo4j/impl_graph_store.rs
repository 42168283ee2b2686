//! `GraphStore` implementation for `Neo4jClient`.
//!
//! Every method simply delegates to the corresponding inherent method on `Neo4jClient`.

use async_trait::async_trait;

use super::client::Neo4jClient;
use super::models::*;
use super::traits::GraphStore;

#[async_trait]
impl GraphStore for Neo4jClient {
    // ========================================================================
    // Schema
    // ========================================================================

    async fn ensure_unique_constraint(&self, label: NodeLabel) -> anyhow::Result<ConstraintOutcome> {
        self.ensure_unique_constraint(label).await
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    async fn upsert_business_area(
        &self,
        area: &BusinessAreaNode,
        stamp: &RunStamp,
    ) -> anyhow::Result<UpsertOutcome> {
        self.upsert_business_area(area, stamp).await
    }

    async fn upsert_business_domain(
        &self,
        domain: &BusinessDomainNode,
        stamp: &RunStamp,
    ) -> anyhow::Result<UpsertOutcome> {
        self.upsert_business_domain(domain, stamp).await
    }

    async fn upsert_service_domain(
        &self,
        service_domain: &ServiceDomainNode,
        stamp: &RunStamp,
    ) -> anyhow::Result<UpsertOutcome> {
        self.upsert_service_domain(service_domain, stamp).await
    }

    async fn link_parent(
        &self,
        rel: RelationType,
        parent: &NodeKey,
        child: &NodeKey,
    ) -> anyhow::Result<ParentLink> {
        self.link_parent(rel, parent, child).await
    }

    // ========================================================================
    // Service domain enrichment
    // ========================================================================

    async fn list_service_domains(&self) -> anyhow::Result<Vec<ServiceDomainRef>> {
        self.list_service_domains().await
    }

    async fn enrich_service_domain(
        &self,
        object_id: &str,
        enrichment: &ServiceDomainEnrichment,
        stamp: &RunStamp,
    ) -> anyhow::Result<bool> {
        self.enrich_service_domain(object_id, enrichment, stamp)
            .await
    }

    // ========================================================================
    // Specification entities
    // ========================================================================

    async fn upsert_control_record(
        &self,
        record: &ControlRecordNode,
        stamp: &RunStamp,
    ) -> anyhow::Result<UpsertOutcome> {
        self.upsert_control_record(record, stamp).await
    }

    async fn upsert_behavior_qualifier(
        &self,
        qualifier: &BehaviorQualifierNode,
        stamp: &RunStamp,
    ) -> anyhow::Result<UpsertOutcome> {
        self.upsert_behavior_qualifier(qualifier, stamp).await
    }

    async fn upsert_operation(
        &self,
        operation: &OperationNode,
        stamp: &RunStamp,
    ) -> anyhow::Result<UpsertOutcome> {
        self.upsert_operation(operation, stamp).await
    }

    async fn upsert_schema(
        &self,
        schema: &SchemaNode,
        stamp: &RunStamp,
    ) -> anyhow::Result<UpsertOutcome> {
        self.upsert_schema(schema, stamp).await
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    async fn merge_relationship(
        &self,
        rel: RelationType,
        from: &NodeKey,
        to: &NodeKey,
    ) -> anyhow::Result<RelationshipOutcome> {
        self.merge_relationship(rel, from, to).await
    }

    // ========================================================================
    // Run registry
    // ========================================================================

    async fn list_runs(&self) -> anyhow::Result<Vec<RunInfo>> {
        self.list_runs().await
    }

    async fn list_touched_run_ids(&self) -> anyhow::Result<Vec<String>> {
        self.list_touched_run_ids().await
    }

    async fn run_footprint(&self, run_id: &str) -> anyhow::Result<RunFootprint> {
        self.run_footprint(run_id).await
    }

    async fn delete_run_batch(&self, run_id: &str, batch_size: usize) -> anyhow::Result<usize> {
        self.delete_run_batch(run_id, batch_size).await
    }

    async fn delete_label_batch(
        &self,
        label: NodeLabel,
        batch_size: usize,
    ) -> anyhow::Result<usize> {
        self.delete_label_batch(label, batch_size).await
    }

    async fn delete_all_batch(&self, batch_size: usize) -> anyhow::Result<usize> {
        self.delete_all_batch(batch_size).await
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    async fn graph_stats(&self) -> anyhow::Result<GraphStats> {
        self.graph_stats().await
    }
}
