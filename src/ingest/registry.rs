//! Run registry: run identity and the administrative delete operations.
//!
//! A run id looks like `bian-20260301-101530`. Ids sort in creation order:
//! when the clock has not moved past the latest run in the graph the new id is
//! placed one second after it.
//!
//! Deletions go through the store in batches so that a run of tens of
//! thousands of nodes never needs one huge transaction. Every batch detaches
//! and deletes whole nodes, so an interrupted deletion leaves no dangling
//! half-deleted node behind and simply calling it again finishes the job.

use crate::ingest::error::IngestError;
use crate::neo4j::models::*;
use crate::neo4j::traits::GraphStore;
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

/// Text an operator must type to wipe the whole graph
pub const WIPE_CONFIRMATION: &str = "DELETE ALL";

const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

// ============================================================================
// Run ids
// ============================================================================

/// Format a run id for `at`
pub fn format_run_id(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", prefix, at.format(RUN_TIMESTAMP_FORMAT))
}

/// Timestamp embedded in a run id carrying `prefix`
pub fn parse_run_id(prefix: &str, run_id: &str) -> Option<DateTime<Utc>> {
    let timestamp = run_id.strip_prefix(prefix)?.strip_prefix('-')?;
    NaiveDateTime::parse_from_str(timestamp, RUN_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

// ============================================================================
// Categories
// ============================================================================

/// Groups of reference labels that can be deleted together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Business areas, business domains, service domains
    Hierarchy,
    /// Control records, behavior qualifiers, operations, schemas
    Specification,
    /// Every reference label
    Reference,
}

impl Category {
    pub fn labels(&self) -> &'static [NodeLabel] {
        const HIERARCHY: [NodeLabel; 3] = [
            NodeLabel::BusinessArea,
            NodeLabel::BusinessDomain,
            NodeLabel::ServiceDomain,
        ];
        const SPECIFICATION: [NodeLabel; 4] = [
            NodeLabel::ControlRecord,
            NodeLabel::BehaviorQualifier,
            NodeLabel::Operation,
            NodeLabel::Schema,
        ];
        match self {
            Self::Hierarchy => &HIERARCHY,
            Self::Specification => &SPECIFICATION,
            Self::Reference => &NodeLabel::ALL,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hierarchy => write!(f, "hierarchy"),
            Self::Specification => write!(f, "specification"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

impl FromStr for Category {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hierarchy" => Ok(Self::Hierarchy),
            "specification" => Ok(Self::Specification),
            "reference" | "bian" => Ok(Self::Reference),
            _ => Err(IngestError::UnknownCategory(s.to_string())),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Count only
    Preview,
    Execute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunDeletion {
    pub run_id: String,
    /// What the run owned before anything was deleted
    pub footprint: RunFootprint,
    pub executed: bool,
    pub deleted_nodes: usize,
    pub batches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryDeletion {
    pub category: Category,
    /// Deleted nodes per stored label
    pub deleted: BTreeMap<String, usize>,
}

impl CategoryDeletion {
    pub fn total(&self) -> usize {
        self.deleted.values().sum()
    }
}

// ============================================================================
// Registry
// ============================================================================

pub struct RunRegistry {
    store: Arc<dyn GraphStore>,
    prefix: String,
    batch_size: usize,
}

impl RunRegistry {
    pub fn new(store: Arc<dyn GraphStore>, prefix: impl Into<String>, batch_size: usize) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            batch_size: batch_size.max(1),
        }
    }

    /// Stamp for a new run starting now
    pub async fn next_stamp(&self) -> Result<RunStamp> {
        self.next_stamp_at(Utc::now()).await
    }

    /// Stamp for a new run starting at `now`, ordered after every run that
    /// created or last touched a node.
    ///
    /// A run that left no trace at all (an empty index) is invisible here.
    pub async fn next_stamp_at(&self, now: DateTime<Utc>) -> Result<RunStamp> {
        let mut seen: Vec<String> = self
            .store
            .list_runs()
            .await?
            .into_iter()
            .map(|run| run.run_id)
            .collect();
        seen.extend(self.store.list_touched_run_ids().await?);
        let latest = seen
            .iter()
            .filter_map(|run_id| parse_run_id(&self.prefix, run_id))
            .max();

        let mut id_time = now;
        if let Some(latest) = latest {
            if format_run_id(&self.prefix, id_time) <= format_run_id(&self.prefix, latest) {
                id_time = latest + Duration::seconds(1);
                tracing::debug!(
                    "Clock not past latest run {}, bumping run id",
                    format_run_id(&self.prefix, latest)
                );
            }
        }

        Ok(RunStamp::new(format_run_id(&self.prefix, id_time), now))
    }

    /// Runs present in the graph, most recent first
    pub async fn list_runs(&self) -> Result<Vec<RunInfo>> {
        self.store.list_runs().await
    }

    /// Delete (or just count) every node created by `run_id` with its relationships
    pub async fn delete_run(&self, run_id: &str, mode: DeleteMode) -> Result<RunDeletion> {
        let footprint = self.store.run_footprint(run_id).await?;
        let mut deletion = RunDeletion {
            run_id: run_id.to_string(),
            footprint,
            executed: false,
            deleted_nodes: 0,
            batches: 0,
        };

        if mode == DeleteMode::Preview {
            tracing::info!(
                "Run {} owns {} nodes and {} relationships (preview, nothing deleted)",
                run_id,
                footprint.nodes,
                footprint.relationships
            );
            return Ok(deletion);
        }

        tracing::info!("Deleting run {} ({} nodes)", run_id, footprint.nodes);
        loop {
            let deleted = self.store.delete_run_batch(run_id, self.batch_size).await?;
            if deleted == 0 {
                break;
            }
            deletion.deleted_nodes += deleted;
            deletion.batches += 1;
            tracing::debug!("  Deleted {} nodes of run {}", deletion.deleted_nodes, run_id);
            if deleted < self.batch_size {
                break;
            }
        }
        deletion.executed = true;

        tracing::info!(
            "Run {} deleted: {} nodes in {} batches",
            run_id,
            deletion.deleted_nodes,
            deletion.batches
        );
        Ok(deletion)
    }

    /// Delete every node of the category's labels; other labels are untouched
    pub async fn delete_category(&self, category: Category) -> Result<CategoryDeletion> {
        let mut deletion = CategoryDeletion {
            category,
            deleted: BTreeMap::new(),
        };

        for &label in category.labels() {
            let mut total = 0;
            loop {
                let deleted = self.store.delete_label_batch(label, self.batch_size).await?;
                total += deleted;
                if deleted < self.batch_size {
                    break;
                }
            }
            if total > 0 {
                tracing::info!("Deleted {} {} nodes", total, label);
            }
            deletion.deleted.insert(label.as_str().to_string(), total);
        }

        tracing::info!("Category {} deleted: {} nodes", category, deletion.total());
        Ok(deletion)
    }

    /// Delete every node in the graph, whoever owns it
    pub async fn wipe_all(&self, confirmation: &str) -> Result<usize> {
        if confirmation != WIPE_CONFIRMATION {
            return Err(IngestError::ConfirmationRequired {
                expected: WIPE_CONFIRMATION,
            }
            .into());
        }

        let mut total = 0;
        loop {
            let deleted = self.store.delete_all_batch(self.batch_size).await?;
            total += deleted;
            if deleted > 0 {
                tracing::debug!("  Deleted {} nodes...", total);
            }
            if deleted < self.batch_size {
                break;
            }
        }

        tracing::warn!("Graph wiped: {} nodes deleted", total);
        Ok(total)
    }
}
