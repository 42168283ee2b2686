//! Neo4j client for loading the BIAN reference model

use super::models::*;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use neo4rs::{query, Graph, Query};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Error codes Neo4j raises when existing data prevents a uniqueness constraint
const CONSTRAINT_FAILURE_MARKERS: [&str; 3] = [
    "ConstraintCreationFailed",
    "ConstraintValidationFailed",
    "Unable to create Constraint",
];

/// Client for Neo4j operations
pub struct Neo4jClient {
    graph: Arc<Graph>,
}

/// Cypher for a merge-by-key upsert.
///
/// `set_clause` is a list of `n.prop = $param, ` assignments applied on both
/// create and update. Provenance is only written on create.
fn merge_node_cypher(label: NodeLabel, set_clause: &str) -> String {
    format!(
        r#"
        OPTIONAL MATCH (existing:{label} {{{key}: $key}})
        WITH existing IS NULL AS created
        MERGE (n:{label} {{{key}: $key}})
        ON CREATE SET n._run_id = $run_id,
                      n._imported_at = datetime($now)
        SET {set_clause}n._last_run_id = $run_id,
            n._last_imported_at = datetime($now)
        RETURN created
        "#,
        label = label.as_str(),
        key = label.key_property(),
        set_clause = set_clause,
    )
}

fn stamped(q: Query, key: &str, stamp: &RunStamp) -> Query {
    q.param("key", key)
        .param("run_id", stamp.run_id.clone())
        .param("now", stamp.imported_at.to_rfc3339())
}

fn is_constraint_failure(message: &str) -> bool {
    CONSTRAINT_FAILURE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

fn parse_neo4j_datetime(raw: &str) -> Option<DateTime<Utc>> {
    // toString(datetime) may append a zone id, e.g. "...+01:00[Europe/Paris]"
    let trimmed = raw.split('[').next().unwrap_or(raw);
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl Neo4jClient {
    /// Create a new Neo4j client.
    ///
    /// Unlike most graph clients this does not touch the schema: constraints
    /// are owned by the constraint manager and ensured once per pipeline run.
    pub async fn new(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .context("Failed to connect to Neo4j")?;

        let client = Self {
            graph: Arc::new(graph),
        };

        client
            .execute("RETURN 1 AS ok")
            .await
            .context("Neo4j connection check failed")?;

        Ok(client)
    }

    /// Execute a raw Cypher query (internal use only)
    pub(crate) async fn execute(&self, cypher: &str) -> Result<Vec<neo4rs::Row>> {
        self.execute_with_params(query(cypher)).await
    }

    /// Execute a parameterized Cypher query (internal use only)
    pub(crate) async fn execute_with_params(&self, q: Query) -> Result<Vec<neo4rs::Row>> {
        let mut result = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = result.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Run a merge query built by `merge_node_cypher` and report whether it created
    async fn run_merge(&self, q: Query) -> Result<UpsertOutcome> {
        let rows = self.execute_with_params(q).await?;
        let created = match rows.first() {
            Some(row) => row.get::<bool>("created")?,
            None => anyhow::bail!("MERGE returned no rows"),
        };
        Ok(if created {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn count_query(&self, q: Query, column: &str) -> Result<usize> {
        let rows = self.execute_with_params(q).await?;
        match rows.first() {
            Some(row) => Ok(row.get::<i64>(column)?.max(0) as usize),
            None => Ok(0),
        }
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Ensure a uniqueness constraint on the label's key property
    pub async fn ensure_unique_constraint(&self, label: NodeLabel) -> Result<ConstraintOutcome> {
        let q = query(
            r#"
            SHOW CONSTRAINTS YIELD name, type, labelsOrTypes, properties
            WHERE name = $name
               OR (type IN ['UNIQUENESS', 'NODE_PROPERTY_UNIQUENESS']
                   AND labelsOrTypes = [$label]
                   AND properties = [$property])
            RETURN count(*) AS existing
            "#,
        )
        .param("name", label.constraint_name())
        .param("label", label.as_str())
        .param("property", label.key_property());

        if self.count_query(q, "existing").await? > 0 {
            return Ok(ConstraintOutcome::AlreadyPresent);
        }

        let cypher = format!(
            "CREATE CONSTRAINT {name} IF NOT EXISTS FOR (n:{label}) REQUIRE n.{key} IS UNIQUE",
            name = label.constraint_name(),
            label = label.as_str(),
            key = label.key_property(),
        );

        match self.graph.run(query(&cypher)).await {
            Ok(()) => Ok(ConstraintOutcome::Created),
            Err(e) => {
                let message = e.to_string();
                if is_constraint_failure(&message) {
                    Ok(ConstraintOutcome::Violated(message))
                } else {
                    Err(e).with_context(|| format!("Failed to create constraint on {}", label))
                }
            }
        }
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    pub async fn upsert_business_area(
        &self,
        area: &BusinessAreaNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome> {
        let cypher = merge_node_cypher(NodeLabel::BusinessArea, "");
        self.run_merge(stamped(query(&cypher), &area.name, stamp))
            .await
    }

    pub async fn upsert_business_domain(
        &self,
        domain: &BusinessDomainNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome> {
        let cypher = merge_node_cypher(NodeLabel::BusinessDomain, "");
        self.run_merge(stamped(query(&cypher), &domain.name, stamp))
            .await
    }

    pub async fn upsert_service_domain(
        &self,
        service_domain: &ServiceDomainNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome> {
        let cypher = merge_node_cypher(
            NodeLabel::ServiceDomain,
            "n.name = $name, n.url = CASE WHEN $url = '' THEN null ELSE $url END, ",
        );
        let q = stamped(query(&cypher), &service_domain.object_id, stamp)
            .param("name", service_domain.name.clone())
            .param("url", service_domain.url.clone().unwrap_or_default());
        self.run_merge(q).await
    }

    /// Attach `child` to `parent`, dropping containment edges from other parents
    pub async fn link_parent(
        &self,
        rel: RelationType,
        parent: &NodeKey,
        child: &NodeKey,
    ) -> Result<ParentLink> {
        let cypher = format!(
            r#"
            MATCH (parent:{pl} {{{pk}: $parent}})
            MATCH (child:{cl} {{{ck}: $child}})
            OPTIONAL MATCH (other)-[old:{rel}]->(child)
            WHERE other <> parent
            WITH parent, child, collect(old) AS stale
            FOREACH (r IN stale | DELETE r)
            WITH parent, child, size(stale) AS detached
            OPTIONAL MATCH (parent)-[existing:{rel}]->(child)
            WITH parent, child, detached, count(existing) > 0 AS existed
            MERGE (parent)-[:{rel}]->(child)
            RETURN detached, existed
            "#,
            pl = parent.label.as_str(),
            pk = parent.label.key_property(),
            cl = child.label.as_str(),
            ck = child.label.key_property(),
            rel = rel.as_str(),
        );
        let q = query(&cypher)
            .param("parent", parent.key.clone())
            .param("child", child.key.clone());

        let rows = self.execute_with_params(q).await?;
        let Some(row) = rows.first() else {
            return Ok(ParentLink {
                outcome: RelationshipOutcome::MissingEndpoint,
                detached: 0,
            });
        };

        let existed: bool = row.get("existed")?;
        let detached: i64 = row.get("detached")?;
        Ok(ParentLink {
            outcome: if existed {
                RelationshipOutcome::Existing
            } else {
                RelationshipOutcome::Created
            },
            detached: detached.max(0) as usize,
        })
    }

    // ========================================================================
    // Service domain enrichment
    // ========================================================================

    /// List all service domains ordered by name
    pub async fn list_service_domains(&self) -> Result<Vec<ServiceDomainRef>> {
        let rows = self
            .execute(
                r#"
                MATCH (sd:BIANServiceDomain)
                RETURN sd.object_id AS object_id, coalesce(sd.name, '') AS name
                ORDER BY name, object_id
                "#,
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(ServiceDomainRef {
                    object_id: row.get("object_id")?,
                    name: row.get("name")?,
                })
            })
            .collect()
    }

    /// Set descriptive attributes on an existing service domain
    pub async fn enrich_service_domain(
        &self,
        object_id: &str,
        enrichment: &ServiceDomainEnrichment,
        stamp: &RunStamp,
    ) -> Result<bool> {
        let q = query(
            r#"
            MATCH (sd:BIANServiceDomain {object_id: $object_id})
            SET sd.role = $role,
                sd.example_of_use = $example_of_use,
                sd.executive_summary = $executive_summary,
                sd.key_features = $key_features,
                sd.functional_pattern = CASE WHEN $functional_pattern = '' THEN null
                                             ELSE $functional_pattern END,
                sd._enriched_at = datetime($now),
                sd._last_run_id = $run_id,
                sd._last_imported_at = datetime($now)
            RETURN count(sd) AS matched
            "#,
        )
        .param("object_id", object_id)
        .param("role", enrichment.role.clone())
        .param("example_of_use", enrichment.example_of_use.clone())
        .param("executive_summary", enrichment.executive_summary.clone())
        .param("key_features", enrichment.key_features.clone())
        .param(
            "functional_pattern",
            enrichment.functional_pattern.clone().unwrap_or_default(),
        )
        .param("run_id", stamp.run_id.clone())
        .param("now", stamp.imported_at.to_rfc3339());

        Ok(self.count_query(q, "matched").await? > 0)
    }

    // ========================================================================
    // Specification entities
    // ========================================================================

    pub async fn upsert_control_record(
        &self,
        record: &ControlRecordNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome> {
        let cypher = merge_node_cypher(NodeLabel::ControlRecord, "n.name = $name, ");
        let q = stamped(query(&cypher), &record.id, stamp).param("name", record.name.clone());
        self.run_merge(q).await
    }

    pub async fn upsert_behavior_qualifier(
        &self,
        qualifier: &BehaviorQualifierNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome> {
        let cypher = merge_node_cypher(NodeLabel::BehaviorQualifier, "n.name = $name, ");
        let q =
            stamped(query(&cypher), &qualifier.id, stamp).param("name", qualifier.name.clone());
        self.run_merge(q).await
    }

    pub async fn upsert_operation(
        &self,
        operation: &OperationNode,
        stamp: &RunStamp,
    ) -> Result<UpsertOutcome> {
        let cypher = merge_node_cypher(
            NodeLabel::Operation,
            "n.name = $name, n.action_term = $action_term, n.summary = $summary, \
             n.http_method = $http_method, n.path = $path, ",
        );
        let q = stamped(query(&cypher), &operation.id, stamp)
            .param("name", operation.name.clone())
            .param("action_term", operation.action_term.clone())
            .param("summary", operation.summary.clone())
            .param("http_method", operation.http_method.clone())
            .param("path", operation.path.clone());
        self.run_merge(q).await
    }

    pub async fn upsert_schema(&self, schema: &SchemaNode, stamp: &RunStamp) -> Result<UpsertOutcome> {
        let cypher = merge_node_cypher(NodeLabel::Schema, "n.name = $name, n.type = $type, ");
        let q = stamped(query(&cypher), &schema.id, stamp)
            .param("name", schema.name.clone())
            .param("type", schema.schema_type.clone());
        self.run_merge(q).await
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Merge a relationship keyed by its ordered endpoint pair
    pub async fn merge_relationship(
        &self,
        rel: RelationType,
        from: &NodeKey,
        to: &NodeKey,
    ) -> Result<RelationshipOutcome> {
        let cypher = format!(
            r#"
            MATCH (a:{fl} {{{fk}: $from}})
            MATCH (b:{tl} {{{tk}: $to}})
            OPTIONAL MATCH (a)-[existing:{rel}]->(b)
            WITH a, b, count(existing) > 0 AS existed
            MERGE (a)-[:{rel}]->(b)
            RETURN existed
            "#,
            fl = from.label.as_str(),
            fk = from.label.key_property(),
            tl = to.label.as_str(),
            tk = to.label.key_property(),
            rel = rel.as_str(),
        );
        let q = query(&cypher)
            .param("from", from.key.clone())
            .param("to", to.key.clone());

        let rows = self.execute_with_params(q).await?;
        let Some(row) = rows.first() else {
            return Ok(RelationshipOutcome::MissingEndpoint);
        };
        if row.get::<bool>("existed")? {
            Ok(RelationshipOutcome::Existing)
        } else {
            Ok(RelationshipOutcome::Created)
        }
    }

    // ========================================================================
    // Run registry
    // ========================================================================

    /// Runs present in the graph, most recent first
    pub async fn list_runs(&self) -> Result<Vec<RunInfo>> {
        let rows = self
            .execute(
                r#"
                MATCH (n)
                WHERE n._run_id IS NOT NULL
                WITH n._run_id AS run_id, count(*) AS nodes, min(n._imported_at) AS earliest
                RETURN run_id, nodes, toString(earliest) AS imported_at
                ORDER BY earliest DESC, run_id DESC
                "#,
            )
            .await?;

        rows.iter()
            .map(|row| {
                let nodes: i64 = row.get("nodes")?;
                let imported_at: Option<String> = row.get("imported_at").ok();
                Ok(RunInfo {
                    run_id: row.get("run_id")?,
                    node_count: nodes.max(0) as usize,
                    earliest_imported_at: imported_at.as_deref().and_then(parse_neo4j_datetime),
                })
            })
            .collect()
    }

    /// Runs recorded as last toucher of some node
    pub async fn list_touched_run_ids(&self) -> Result<Vec<String>> {
        let rows = self
            .execute(
                r#"
                MATCH (n)
                WHERE n._last_run_id IS NOT NULL
                RETURN DISTINCT n._last_run_id AS run_id
                "#,
            )
            .await?;

        rows.iter()
            .map(|row| Ok(row.get::<String>("run_id")?))
            .collect()
    }

    /// Count what deleting a run would remove
    pub async fn run_footprint(&self, run_id: &str) -> Result<RunFootprint> {
        let q = query(
            r#"
            MATCH (n {_run_id: $run_id})
            OPTIONAL MATCH (n)-[r]-()
            RETURN count(DISTINCT n) AS nodes, count(DISTINCT r) AS relationships
            "#,
        )
        .param("run_id", run_id);

        let rows = self.execute_with_params(q).await?;
        let Some(row) = rows.first() else {
            return Ok(RunFootprint::default());
        };
        let nodes: i64 = row.get("nodes")?;
        let relationships: i64 = row.get("relationships")?;
        Ok(RunFootprint {
            nodes: nodes.max(0) as usize,
            relationships: relationships.max(0) as usize,
        })
    }

    /// Detach-delete one batch of a run's nodes
    pub async fn delete_run_batch(&self, run_id: &str, batch_size: usize) -> Result<usize> {
        let q = query(
            r#"
            MATCH (n {_run_id: $run_id})
            WITH n LIMIT $batch_size
            DETACH DELETE n
            RETURN count(*) AS deleted
            "#,
        )
        .param("run_id", run_id)
        .param("batch_size", batch_size as i64);
        self.count_query(q, "deleted").await
    }

    /// Detach-delete one batch of nodes carrying `label`
    pub async fn delete_label_batch(&self, label: NodeLabel, batch_size: usize) -> Result<usize> {
        let cypher = format!(
            r#"
            MATCH (n:{label})
            WITH n LIMIT $batch_size
            DETACH DELETE n
            RETURN count(*) AS deleted
            "#,
            label = label.as_str(),
        );
        let q = query(&cypher).param("batch_size", batch_size as i64);
        self.count_query(q, "deleted").await
    }

    /// Detach-delete one batch of nodes of any label
    pub async fn delete_all_batch(&self, batch_size: usize) -> Result<usize> {
        let q = query(
            r#"
            MATCH (n)
            WITH n LIMIT $batch_size
            DETACH DELETE n
            RETURN count(*) AS deleted
            "#,
        )
        .param("batch_size", batch_size as i64);
        self.count_query(q, "deleted").await
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub async fn graph_stats(&self) -> Result<GraphStats> {
        let mut nodes = BTreeMap::new();
        for row in self
            .execute(
                r#"
                MATCH (n)
                RETURN coalesce(labels(n)[0], '') AS label, count(*) AS count
                "#,
            )
            .await?
        {
            let count: i64 = row.get("count")?;
            nodes.insert(row.get::<String>("label")?, count.max(0) as usize);
        }

        let mut relationships = BTreeMap::new();
        for row in self
            .execute("MATCH ()-[r]->() RETURN type(r) AS type, count(*) AS count")
            .await?
        {
            let count: i64 = row.get("count")?;
            relationships.insert(row.get::<String>("type")?, count.max(0) as usize);
        }

        Ok(GraphStats {
            nodes,
            relationships,
        })
    }
}
