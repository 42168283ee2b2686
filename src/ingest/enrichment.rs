//! Enrichment loader.
//!
//! Attaches the scraped descriptive text to existing service domains and
//! derives `TRIGGERS` edges from each document's service domain relations.
//! Enrichment never creates a service domain: documents for unknown object
//! ids are reported as unmatched.

use crate::ingest::error::{RecordError, RecordErrorKind, Stage};
use crate::ingest::sources::SourceDocument;
use crate::neo4j::models::*;
use crate::neo4j::traits::GraphStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Functional patterns recognised in `relations_all.realized_by`
pub const KNOWN_PATTERNS: [&str; 17] = [
    "Fulfill",
    "Manage",
    "Administer",
    "Register",
    "Maintain",
    "Direct",
    "Monitor",
    "Analyze",
    "Evaluate",
    "Execute",
    "Operate",
    "Allocate",
    "Agree Terms",
    "Design",
    "Develop",
    "Process",
    "Track",
];

/// Scraper placeholders that are not real features
const FEATURE_ARTEFACTS: [&str; 2] = ["**", "General comment"];

/// A scrape failure is written as `{"error": ..}` plus a few identifying keys
const SCRAPE_ERROR_MAX_KEYS: usize = 4;

// ============================================================================
// Domain document
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationRef {
    pub name: Option<String>,
    pub object_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationsAll {
    #[serde(default)]
    pub realized_by: Vec<RelationRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceDomainRelations {
    #[serde(default)]
    pub triggers: Vec<RelationRef>,
    #[serde(default)]
    pub triggered_by: Vec<RelationRef>,
}

/// Per-domain document as written by the scraper
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DomainDocument {
    pub object_id: Option<String>,
    pub role_definition: Option<String>,
    pub example_of_use: Option<String>,
    pub executive_summary: Option<String>,
    pub key_features: Option<Vec<Option<String>>>,
    pub relations_all: Option<RelationsAll>,
    pub relations_service_domains: Option<ServiceDomainRelations>,
}

impl DomainDocument {
    /// Descriptive attributes as they are stored on the node
    pub fn enrichment(&self) -> (ServiceDomainEnrichment, PatternDerivation) {
        let derivation = derive_functional_pattern(
            self.relations_all
                .as_ref()
                .map(|r| r.realized_by.as_slice())
                .unwrap_or_default(),
        );
        let enrichment = ServiceDomainEnrichment {
            role: self.role_definition.clone().unwrap_or_default(),
            example_of_use: self.example_of_use.clone().unwrap_or_default(),
            executive_summary: self.executive_summary.clone().unwrap_or_default(),
            key_features: clean_key_features(self.key_features.as_deref().unwrap_or_default()),
            functional_pattern: derivation.pattern.clone(),
        };
        (enrichment, derivation)
    }
}

enum ParsedDomain {
    Document(Box<DomainDocument>),
    ScrapeError,
}

fn parse_domain_document(document: &SourceDocument) -> Result<ParsedDomain, String> {
    let value: Value = serde_json::from_str(&document.contents).map_err(|e| e.to_string())?;
    let Some(object) = value.as_object() else {
        return Err("document root is not an object".to_string());
    };
    if object.contains_key("error") && object.len() <= SCRAPE_ERROR_MAX_KEYS {
        return Ok(ParsedDomain::ScrapeError);
    }
    serde_json::from_value(value)
        .map(|doc| ParsedDomain::Document(Box::new(doc)))
        .map_err(|e| e.to_string())
}

/// Trim features and drop blanks and scraper artefacts
pub fn clean_key_features(features: &[Option<String>]) -> Vec<String> {
    features
        .iter()
        .flatten()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty() && !FEATURE_ARTEFACTS.contains(f))
        .map(str::to_string)
        .collect()
}

/// Functional pattern taken from `realized_by`, plus disagreeing later entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternDerivation {
    pub pattern: Option<String>,
    /// Known patterns after the first entry that differ from the adopted one
    pub discrepancies: Vec<String>,
}

/// The first entry decides; it must name a known pattern
pub fn derive_functional_pattern(realized_by: &[RelationRef]) -> PatternDerivation {
    let known = |r: &RelationRef| {
        r.name
            .as_deref()
            .map(str::trim)
            .filter(|n| KNOWN_PATTERNS.contains(n))
            .map(str::to_string)
    };

    let Some((first, rest)) = realized_by.split_first() else {
        return PatternDerivation::default();
    };
    let pattern = known(first);

    let mut discrepancies: Vec<String> = Vec::new();
    for candidate in rest.iter().filter_map(known) {
        if Some(&candidate) != pattern.as_ref() && !discrepancies.contains(&candidate) {
            discrepancies.push(candidate);
        }
    }

    PatternDerivation {
        pattern,
        discrepancies,
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternDiscrepancy {
    pub object_id: String,
    pub adopted: Option<String>,
    pub ignored: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedTrigger {
    pub source: String,
    /// Object id or name as written in the document
    pub target: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichmentReport {
    pub enriched: usize,
    /// Domains per functional pattern
    pub patterns: BTreeMap<String, usize>,
    pub pattern_discrepancies: Vec<PatternDiscrepancy>,
    pub triggers_created: usize,
    pub triggers_existing: usize,
    pub unresolved_triggers: Vec<UnresolvedTrigger>,
    pub self_loops_skipped: usize,
    /// Object ids with a document but no service domain
    pub unmatched: Vec<String>,
    pub scrape_errors: usize,
    pub errors: Vec<RecordError>,
    pub cancelled: bool,
}

// ============================================================================
// Loader
// ============================================================================

/// Service domains known to the graph, for trigger resolution
struct KnownDomains {
    ids: HashSet<String>,
    by_name: HashMap<String, String>,
}

impl KnownDomains {
    fn new(refs: Vec<ServiceDomainRef>) -> Self {
        let mut by_name = HashMap::new();
        let mut ids = HashSet::new();
        for sd in refs {
            by_name.entry(sd.name).or_insert_with(|| sd.object_id.clone());
            ids.insert(sd.object_id);
        }
        Self { ids, by_name }
    }

    fn contains(&self, object_id: &str) -> bool {
        self.ids.contains(object_id)
    }

    /// Object id first, exact name second
    fn resolve(&self, target: &RelationRef) -> Option<String> {
        target
            .object_id
            .as_deref()
            .filter(|id| self.ids.contains(*id))
            .map(str::to_string)
            .or_else(|| {
                target
                    .name
                    .as_deref()
                    .and_then(|name| self.by_name.get(name))
                    .cloned()
            })
    }
}

fn describe(target: &RelationRef) -> String {
    target
        .object_id
        .clone()
        .or_else(|| target.name.clone())
        .unwrap_or_else(|| "<unnamed>".to_string())
}

/// Direction of a relation entry relative to the document's domain
#[derive(Debug, Clone, Copy)]
enum Direction {
    Outgoing,
    Incoming,
}

pub struct EnrichmentLoader {
    store: Arc<dyn GraphStore>,
    progress_every: usize,
}

impl EnrichmentLoader {
    pub fn new(store: Arc<dyn GraphStore>, progress_every: usize) -> Self {
        Self {
            store,
            progress_every: progress_every.max(1),
        }
    }

    /// Enrich service domains from their documents and derive `TRIGGERS`.
    ///
    /// If the service domains cannot be listed the stage records one error
    /// and enriches nothing.
    pub async fn enrich(
        &self,
        documents: &[SourceDocument],
        stamp: &RunStamp,
        cancel: Option<&AtomicBool>,
    ) -> Result<EnrichmentReport> {
        let mut report = EnrichmentReport::default();
        let known = match self.store.list_service_domains().await {
            Ok(refs) => KnownDomains::new(refs),
            Err(e) => {
                let error = RecordError::store(Stage::Enrichment, "service domain listing", &e);
                tracing::warn!("{}, skipping {} documents", error, documents.len());
                report.errors.push(error);
                return Ok(report);
            }
        };
        tracing::info!(
            "Enriching from {} documents against {} service domains (run {})",
            documents.len(),
            known.ids.len(),
            stamp.run_id
        );

        for document in documents {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    tracing::info!("Enrichment cancelled after {} domains", report.enriched);
                    report.cancelled = true;
                    break;
                }
            }
            self.enrich_one(document, &known, stamp, &mut report).await;
        }

        tracing::info!(
            "Enriched {} domains: {} TRIGGERS created, {} unresolved, {} unmatched, {} scrape errors",
            report.enriched,
            report.triggers_created,
            report.unresolved_triggers.len(),
            report.unmatched.len(),
            report.scrape_errors
        );
        for (pattern, count) in &report.patterns {
            tracing::debug!("  {}: {}", pattern, count);
        }
        Ok(report)
    }

    async fn enrich_one(
        &self,
        document: &SourceDocument,
        known: &KnownDomains,
        stamp: &RunStamp,
        report: &mut EnrichmentReport,
    ) {
        let doc = match parse_domain_document(document) {
            Ok(ParsedDomain::Document(doc)) => doc,
            Ok(ParsedDomain::ScrapeError) => {
                tracing::debug!("Skipping scrape error document {}", document.name);
                report.scrape_errors += 1;
                return;
            }
            Err(detail) => {
                let error =
                    RecordError::new(Stage::Enrichment, &document.name, RecordErrorKind::Parse(detail));
                tracing::warn!("{}", error);
                report.errors.push(error);
                return;
            }
        };

        let object_id = doc
            .object_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| document.stem.clone());

        if !known.contains(&object_id) {
            tracing::warn!("No service domain for enrichment document {}", object_id);
            report.unmatched.push(object_id);
            return;
        }

        let (enrichment, derivation) = doc.enrichment();
        match self
            .store
            .enrich_service_domain(&object_id, &enrichment, stamp)
            .await
        {
            Ok(true) => {
                report.enriched += 1;
                if let Some(pattern) = &derivation.pattern {
                    *report.patterns.entry(pattern.clone()).or_default() += 1;
                }
                if !derivation.discrepancies.is_empty() {
                    tracing::warn!(
                        "{}: functional pattern {:?} adopted, later entries disagree: {:?}",
                        object_id,
                        derivation.pattern,
                        derivation.discrepancies
                    );
                    report.pattern_discrepancies.push(PatternDiscrepancy {
                        object_id: object_id.clone(),
                        adopted: derivation.pattern,
                        ignored: derivation.discrepancies,
                    });
                }
                if report.enriched % self.progress_every == 0 {
                    tracing::debug!("  Enriched {} domains...", report.enriched);
                }
            }
            Ok(false) => {
                report.unmatched.push(object_id);
                return;
            }
            Err(e) => {
                let error = RecordError::store(Stage::Enrichment, &object_id, &e);
                tracing::warn!("{}", error);
                report.errors.push(error);
                return;
            }
        }

        if let Some(relations) = &doc.relations_service_domains {
            for target in &relations.triggers {
                self.derive_trigger(&object_id, target, Direction::Outgoing, known, report)
                    .await;
            }
            for source in &relations.triggered_by {
                self.derive_trigger(&object_id, source, Direction::Incoming, known, report)
                    .await;
            }
        }
    }

    async fn derive_trigger(
        &self,
        object_id: &str,
        other: &RelationRef,
        direction: Direction,
        known: &KnownDomains,
        report: &mut EnrichmentReport,
    ) {
        let Some(other_id) = known.resolve(other) else {
            tracing::debug!("{}: unresolved TRIGGERS reference {}", object_id, describe(other));
            report.unresolved_triggers.push(UnresolvedTrigger {
                source: object_id.to_string(),
                target: describe(other),
            });
            return;
        };
        if other_id == object_id {
            report.self_loops_skipped += 1;
            return;
        }

        let (from, to) = match direction {
            Direction::Outgoing => (object_id, other_id.as_str()),
            Direction::Incoming => (other_id.as_str(), object_id),
        };
        let outcome = self
            .store
            .merge_relationship(
                RelationType::Triggers,
                &NodeKey::service_domain(from),
                &NodeKey::service_domain(to),
            )
            .await;

        match outcome {
            Ok(RelationshipOutcome::Created) => report.triggers_created += 1,
            Ok(RelationshipOutcome::Existing) => report.triggers_existing += 1,
            Ok(RelationshipOutcome::MissingEndpoint) => {
                report.unresolved_triggers.push(UnresolvedTrigger {
                    source: object_id.to_string(),
                    target: describe(other),
                });
            }
            Err(e) => {
                let error = RecordError::store(Stage::Enrichment, format!("{}->{}", from, to), &e);
                tracing::warn!("{}", error);
                report.errors.push(error);
            }
        }
    }
}
