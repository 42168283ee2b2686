//! Pipeline driver.
//!
//! Runs constraints -> hierarchy -> enrichment -> specifications under a
//! single run stamp. Only two things abort a run: a constraint that cannot be
//! created and a missing or malformed hierarchy index. Everything else ends up
//! in the [`PipelineReport`].

use crate::ingest::enrichment::{EnrichmentLoader, EnrichmentReport};
use crate::ingest::error::{IngestError, Stage};
use crate::ingest::hierarchy::{HierarchyLoader, HierarchyReport};
use crate::ingest::registry::RunRegistry;
use crate::ingest::schema::{ConstraintManager, ConstraintReport};
use crate::ingest::sources::PipelineInputs;
use crate::ingest::specification::{SpecificationLoader, SpecificationReport};
use crate::neo4j::models::{GraphStats, RunStamp};
use crate::neo4j::traits::GraphStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Knobs of an import run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSettings {
    pub run_prefix: String,
    pub delete_batch_size: usize,
    /// Log a progress line every N records
    pub progress_every: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            run_prefix: "bian".into(),
            delete_batch_size: 10_000,
            progress_every: 50,
        }
    }
}

/// Structured summary of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub constraints: ConstraintReport,
    pub hierarchy: HierarchyReport,
    pub enrichment: EnrichmentReport,
    pub specification: SpecificationReport,
    /// Graph counts after the run; absent if they could not be read
    pub stats: Option<GraphStats>,
    pub cancelled: bool,
}

impl PipelineReport {
    /// Recoverable record failures across all stages
    pub fn error_count(&self) -> usize {
        self.hierarchy.errors.len() + self.enrichment.errors.len() + self.specification.errors.len()
    }
}

pub struct PipelineDriver {
    store: Arc<dyn GraphStore>,
    settings: ImportSettings,
    stop: Option<Arc<AtomicBool>>,
}

impl PipelineDriver {
    pub fn new(store: Arc<dyn GraphStore>, settings: ImportSettings) -> Self {
        Self {
            store,
            settings,
            stop: None,
        }
    }

    /// Stop between records once `flag` is set
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Run every stage under a freshly generated run id
    pub async fn run(&self, inputs: &PipelineInputs) -> Result<PipelineReport> {
        if inputs.hierarchy.is_none() {
            return Err(IngestError::MissingRootInput("hierarchy index document".into()).into());
        }
        let registry = RunRegistry::new(
            self.store.clone(),
            self.settings.run_prefix.clone(),
            self.settings.delete_batch_size,
        );
        let stamp = registry.next_stamp().await?;
        self.run_with_stamp(inputs, &stamp).await
    }

    /// Run every stage under `stamp`
    pub async fn run_with_stamp(
        &self,
        inputs: &PipelineInputs,
        stamp: &RunStamp,
    ) -> Result<PipelineReport> {
        let Some(index) = &inputs.hierarchy else {
            return Err(IngestError::MissingRootInput("hierarchy index document".into()).into());
        };

        let started_at = Utc::now();
        let cancel = self.stop.as_deref();
        let every = self.settings.progress_every;
        tracing::info!("Starting import run {}", stamp.run_id);

        let constraints = ConstraintManager::new(self.store.clone())
            .ensure_constraints()
            .await?;

        let hierarchy = HierarchyLoader::new(self.store.clone(), every)
            .load(index, stamp, cancel)
            .await?;

        let mut enrichment = if self.stop_requested() {
            EnrichmentReport {
                cancelled: true,
                ..Default::default()
            }
        } else {
            EnrichmentLoader::new(self.store.clone(), every)
                .enrich(&inputs.domains, stamp, cancel)
                .await?
        };

        let mut specification = if self.stop_requested() {
            SpecificationReport {
                cancelled: true,
                ..Default::default()
            }
        } else {
            SpecificationLoader::new(self.store.clone(), every)
                .load(&inputs.specifications, stamp, cancel)
                .await?
        };

        enrichment
            .errors
            .extend(inputs.unreadable_for(Stage::Enrichment).cloned());
        specification
            .errors
            .extend(inputs.unreadable_for(Stage::Specification).cloned());

        let stats = match self.store.graph_stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!("Failed to read graph statistics: {}", e);
                None
            }
        };

        let report = PipelineReport {
            run_id: stamp.run_id.clone(),
            started_at,
            finished_at: Utc::now(),
            constraints,
            cancelled: self.stop_requested(),
            hierarchy,
            enrichment,
            specification,
            stats,
        };

        if report.cancelled {
            tracing::warn!("Import run {} stopped early; re-run to complete it", report.run_id);
        }
        tracing::info!(
            "Import run {} finished: {} record errors, {} unmatched domains, {} unmatched specifications, {} unresolved triggers",
            report.run_id,
            report.error_count(),
            report.enrichment.unmatched.len(),
            report.specification.unmatched.len(),
            report.enrichment.unresolved_triggers.len()
        );
        Ok(report)
    }
}
