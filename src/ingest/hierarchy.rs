//! Hierarchy loader: Business Area -> Business Domain -> Service Domain.
//!
//! The index document is a JSON array of areas, each listing its domains,
//! each listing its service domains. Every level is merge-by-key upserted and
//! attached to its single containment parent.
//!
//! Within one batch a domain (or service domain) declared under two different
//! parents is rejected on the second declaration, and a repeat under the same
//! parent is counted but not written again. Across batches a changed parent
//! wins and the old containment edge is removed.

use crate::ingest::error::{IngestError, RecordError, RecordErrorKind, Stage};
use crate::ingest::sources::SourceDocument;
use crate::neo4j::models::*;
use crate::neo4j::traits::GraphStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ============================================================================
// Index document
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AreaEntry {
    pub business_area: Option<String>,
    #[serde(default)]
    pub business_domains: Vec<DomainEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DomainEntry {
    pub business_domain: Option<String>,
    #[serde(default)]
    pub service_domains: Vec<ServiceDomainEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDomainEntry {
    pub name: Option<String>,
    pub object_id: Option<String>,
    pub url: Option<String>,
}

/// Parse the index document; anything but an array of areas is malformed
pub fn parse_index(document: &SourceDocument) -> Result<Vec<AreaEntry>, IngestError> {
    serde_json::from_str(&document.contents).map_err(|e| IngestError::MalformedRoot {
        source_name: document.name.clone(),
        detail: e.to_string(),
    })
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct HierarchyReport {
    pub areas: UpsertCounts,
    pub domains: UpsertCounts,
    pub service_domains: UpsertCounts,
    /// Containment edges that did not exist before this run
    pub containment_created: usize,
    /// Children moved away from a previous parent
    pub reparented: usize,
    /// Entries declared again under the same parent in this batch
    pub repeated_declarations: usize,
    pub errors: Vec<RecordError>,
    pub cancelled: bool,
}

// ============================================================================
// Loader
// ============================================================================

struct LoadState<'a> {
    stamp: &'a RunStamp,
    cancel: Option<&'a AtomicBool>,
    report: HierarchyReport,
    areas_seen: HashSet<String>,
    /// domain name -> area it was declared under in this batch
    domain_parent: HashMap<String, String>,
    /// service domain object id -> domain it was declared under in this batch
    service_domain_parent: HashMap<String, String>,
    processed: usize,
}

impl LoadState<'_> {
    fn stop_requested(&mut self) -> bool {
        if let Some(flag) = self.cancel {
            if flag.load(Ordering::Relaxed) {
                self.report.cancelled = true;
            }
        }
        self.report.cancelled
    }

    fn error(&mut self, record: impl Into<String>, kind: RecordErrorKind) {
        let error = RecordError::new(Stage::Hierarchy, record, kind);
        tracing::warn!("{}", error);
        self.report.errors.push(error);
    }

    fn store_error(&mut self, record: impl Into<String>, err: &anyhow::Error) {
        let error = RecordError::store(Stage::Hierarchy, record, err);
        tracing::warn!("{}", error);
        self.report.errors.push(error);
    }

    /// A domain whose area was not loaded, together with its service domains
    fn orphan_domain(&mut self, domain: &DomainEntry, area: &str) {
        let name = present(&domain.business_domain).unwrap_or("<unnamed>").to_string();
        self.error(name.clone(), RecordErrorKind::MissingParent(area.to_string()));
        self.orphan_service_domains(domain, &name);
    }

    fn orphan_service_domains(&mut self, domain: &DomainEntry, domain_name: &str) {
        for sd in &domain.service_domains {
            let record = present(&sd.object_id)
                .or(present(&sd.name))
                .unwrap_or("<unnamed>")
                .to_string();
            self.error(record, RecordErrorKind::MissingParent(domain_name.to_string()));
        }
    }

    fn record_link(&mut self, link: ParentLink, child: &str, parent: &str) {
        match link.outcome {
            RelationshipOutcome::Created => self.report.containment_created += 1,
            RelationshipOutcome::Existing => {}
            RelationshipOutcome::MissingEndpoint => {
                self.error(child, RecordErrorKind::MissingParent(parent.to_string()));
                return;
            }
        }
        if link.detached > 0 {
            tracing::info!("Re-parented {} under {}", child, parent);
            self.report.reparented += 1;
        }
    }
}

/// Builds the top three taxonomy levels from the index document
pub struct HierarchyLoader {
    store: Arc<dyn GraphStore>,
    progress_every: usize,
}

impl HierarchyLoader {
    pub fn new(store: Arc<dyn GraphStore>, progress_every: usize) -> Self {
        Self {
            store,
            progress_every: progress_every.max(1),
        }
    }

    /// Load the index document under `stamp`.
    ///
    /// Fails only when the document itself is malformed; per-record problems
    /// are collected into the report.
    pub async fn load(
        &self,
        document: &SourceDocument,
        stamp: &RunStamp,
        cancel: Option<&AtomicBool>,
    ) -> Result<HierarchyReport> {
        let areas = parse_index(document)?;
        tracing::info!(
            "Loading hierarchy from {} ({} business areas, run {})",
            document.name,
            areas.len(),
            stamp.run_id
        );

        let mut state = LoadState {
            stamp,
            cancel,
            report: HierarchyReport::default(),
            areas_seen: HashSet::new(),
            domain_parent: HashMap::new(),
            service_domain_parent: HashMap::new(),
            processed: 0,
        };

        for (index, area) in areas.iter().enumerate() {
            if state.stop_requested() {
                break;
            }
            self.load_area(&mut state, index, area).await;
        }

        let report = state.report;
        tracing::info!(
            "Hierarchy loaded: {} areas, {} domains, {} service domains, {} new containment edges, {} errors",
            report.areas.total(),
            report.domains.total(),
            report.service_domains.total(),
            report.containment_created,
            report.errors.len()
        );
        Ok(report)
    }

    async fn load_area(&self, state: &mut LoadState<'_>, index: usize, area: &AreaEntry) {
        let Some(area_name) = present(&area.business_area) else {
            state.error(
                format!("business area #{}", index + 1),
                RecordErrorKind::MissingKey("business_area".into()),
            );
            for domain in &area.business_domains {
                state.orphan_domain(domain, "<unnamed>");
            }
            return;
        };

        if state.areas_seen.contains(area_name) {
            tracing::debug!("Business area {} declared again", area_name);
            state.report.repeated_declarations += 1;
        } else {
            let node = BusinessAreaNode {
                name: area_name.to_string(),
            };
            match self.store.upsert_business_area(&node, state.stamp).await {
                Ok(outcome) => state.report.areas.record(outcome),
                Err(e) => {
                    state.store_error(area_name, &e);
                    for domain in &area.business_domains {
                        state.orphan_domain(domain, area_name);
                    }
                    return;
                }
            }
            state.areas_seen.insert(area_name.to_string());
        }

        for domain in &area.business_domains {
            if state.stop_requested() {
                return;
            }
            self.load_domain(state, area_name, domain).await;
        }
    }

    async fn load_domain(&self, state: &mut LoadState<'_>, area_name: &str, domain: &DomainEntry) {
        let Some(domain_name) = present(&domain.business_domain) else {
            state.error(
                format!("business domain in {}", area_name),
                RecordErrorKind::MissingKey("business_domain".into()),
            );
            state.orphan_service_domains(domain, "<unnamed>");
            return;
        };

        let declared_under = state.domain_parent.get(domain_name).cloned();

        if declared_under.as_deref() == Some(area_name) {
            tracing::debug!("Business domain {} declared again under {}", domain_name, area_name);
            state.report.repeated_declarations += 1;
        } else if let Some(existing) = declared_under {
            // The node exists from its first declaration; only this containment is refused
            state.error(
                domain_name,
                RecordErrorKind::ConflictingParent {
                    declared: area_name.to_string(),
                    existing,
                },
            );
        } else {
            let node = BusinessDomainNode {
                name: domain_name.to_string(),
            };
            match self.store.upsert_business_domain(&node, state.stamp).await {
                Ok(outcome) => state.report.domains.record(outcome),
                Err(e) => {
                    state.store_error(domain_name, &e);
                    state.orphan_service_domains(domain, domain_name);
                    return;
                }
            }

            let link = self
                .store
                .link_parent(
                    RelationType::HasDomain,
                    &NodeKey::business_area(area_name),
                    &NodeKey::business_domain(domain_name),
                )
                .await;
            match link {
                Ok(link) => state.record_link(link, domain_name, area_name),
                Err(e) => state.store_error(domain_name, &e),
            }
            state
                .domain_parent
                .insert(domain_name.to_string(), area_name.to_string());
        }

        for sd in &domain.service_domains {
            if state.stop_requested() {
                return;
            }
            self.load_service_domain(state, domain_name, sd).await;
        }
    }

    async fn load_service_domain(
        &self,
        state: &mut LoadState<'_>,
        domain_name: &str,
        entry: &ServiceDomainEntry,
    ) {
        let (Some(object_id), Some(name)) = (present(&entry.object_id), present(&entry.name)) else {
            let (record, missing) = match present(&entry.name) {
                Some(name) => (name.to_string(), "object_id"),
                None => (
                    present(&entry.object_id)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("service domain in {}", domain_name)),
                    "name",
                ),
            };
            state.error(record, RecordErrorKind::MissingKey(missing.into()));
            return;
        };

        if let Some(existing) = state.service_domain_parent.get(object_id) {
            if existing == domain_name {
                tracing::debug!("Service domain {} declared again under {}", object_id, domain_name);
                state.report.repeated_declarations += 1;
            } else {
                let existing = existing.clone();
                state.error(
                    object_id,
                    RecordErrorKind::ConflictingParent {
                        declared: domain_name.to_string(),
                        existing,
                    },
                );
            }
            return;
        }

        let node = ServiceDomainNode {
            object_id: object_id.to_string(),
            name: name.to_string(),
            url: present(&entry.url).map(str::to_string),
        };
        match self.store.upsert_service_domain(&node, state.stamp).await {
            Ok(outcome) => state.report.service_domains.record(outcome),
            Err(e) => {
                state.store_error(object_id, &e);
                return;
            }
        }

        let link = self
            .store
            .link_parent(
                RelationType::HasService,
                &NodeKey::business_domain(domain_name),
                &NodeKey::service_domain(object_id),
            )
            .await;
        match link {
            Ok(link) => state.record_link(link, object_id, domain_name),
            Err(e) => state.store_error(object_id, &e),
        }
        state
            .service_domain_parent
            .insert(object_id.to_string(), domain_name.to_string());

        state.processed += 1;
        if state.processed % self.progress_every == 0 {
            tracing::debug!("  {} service domains loaded...", state.processed);
        }
    }
}
