//! Specification loader.
//!
//! Each OpenAPI file describes one service domain. The file title is resolved
//! to a service domain (see [`resolve_service_domain`]); files that do not
//! resolve are reported with their operation count so the report always
//! accounts for every operation in the input.
//!
//! Leaf ids are derived from the normalized title (`<sd>`):
//!
//! | Entity | Id |
//! |---|---|
//! | Control record | `<sd>-CR-<normalized name>` |
//! | Behavior qualifier | `<sd>-BQ-<normalized name>` |
//! | Operation | `<sd>-OP-<operationId>` |
//! | Schema | `<sd>-SCHEMA-<normalized name>` |

use crate::ingest::error::{RecordError, RecordErrorKind, Stage};
use crate::ingest::resolve::{
    extract_action_term, normalize_name, parse_reference_tag, resolve_operation_targets,
    resolve_service_domain, MatchKind, OperationSignature, ReferenceKind, TargetCandidates,
};
use crate::ingest::sources::SourceDocument;
use crate::neo4j::models::*;
use crate::neo4j::traits::GraphStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Shared error envelope present in every specification
const SKIPPED_SCHEMAS: [&str; 1] = ["HTTPError"];

const DEFAULT_SCHEMA_TYPE: &str = "object";

// ============================================================================
// OpenAPI document (only the parts we read)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OpenApiDocument {
    info: Option<InfoSection>,
    tags: Vec<TagSection>,
    paths: Mapping,
    components: Option<ComponentsSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InfoSection {
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TagSection {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ComponentsSection {
    schemas: Mapping,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OperationSection {
    #[serde(rename = "operationId")]
    operation_id: Option<String>,
    summary: Option<String>,
    tags: Vec<String>,
}

// ============================================================================
// Parsed specification
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOperation {
    pub node: OperationNode,
    pub tags: Vec<String>,
}

/// An operation whose definition could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedOperation {
    /// `METHOD /path`
    pub operation: String,
    pub detail: String,
}

/// Everything one specification file contributes, before resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSpecification {
    pub file: String,
    pub title: String,
    /// Normalized title, prefix of every leaf id
    pub prefix: String,
    pub control_records: Vec<ControlRecordNode>,
    pub behavior_qualifiers: Vec<BehaviorQualifierNode>,
    pub operations: Vec<ParsedOperation>,
    pub schemas: Vec<SchemaNode>,
    /// Operations skipped while the rest of the file was kept
    pub rejected: Vec<RejectedOperation>,
}

impl ParsedSpecification {
    fn leaf_id(&self, kind: ReferenceKind, name: &str) -> String {
        format!("{}-{}-{}", self.prefix, kind.id_infix(), normalize_name(name))
    }

    fn add_reference(&mut self, tag: &str) {
        let Some((kind, name)) = parse_reference_tag(tag) else {
            return;
        };
        let id = self.leaf_id(kind, &name);
        match kind {
            ReferenceKind::ControlRecord => {
                if !self.control_records.iter().any(|cr| cr.id == id) {
                    self.control_records.push(ControlRecordNode { id, name });
                }
            }
            ReferenceKind::BehaviorQualifier => {
                if !self.behavior_qualifiers.iter().any(|bq| bq.id == id) {
                    self.behavior_qualifiers
                        .push(BehaviorQualifierNode { id, name });
                }
            }
        }
    }

    fn candidates(&self) -> TargetCandidates {
        TargetCandidates {
            control_records: self.control_records.iter().map(|cr| cr.name.clone()).collect(),
            behavior_qualifiers: self
                .behavior_qualifiers
                .iter()
                .map(|bq| bq.name.clone())
                .collect(),
        }
    }
}

/// Parse one OpenAPI YAML document
pub fn parse_specification(document: &SourceDocument) -> Result<ParsedSpecification, String> {
    let raw: OpenApiDocument =
        serde_yaml::from_str(&document.contents).map_err(|e| e.to_string())?;

    let title = raw
        .info
        .and_then(|info| info.title)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| document.stem.clone());

    let mut spec = ParsedSpecification {
        file: document.name.clone(),
        prefix: normalize_name(&title),
        title,
        ..Default::default()
    };

    for tag in raw.tags.iter().filter_map(|t| t.name.as_deref()) {
        spec.add_reference(tag);
    }

    for (path, item) in &raw.paths {
        let (Some(path), Some(item)) = (path.as_str(), item.as_mapping()) else {
            continue;
        };
        for (method, operation) in item {
            let Some(method) = method
                .as_str()
                .map(str::to_ascii_lowercase)
                .filter(|m| HTTP_METHODS.contains(&m.as_str()))
            else {
                continue;
            };
            let operation: OperationSection = match serde_yaml::from_value(operation.clone()) {
                Ok(operation) => operation,
                Err(e) => {
                    spec.rejected.push(RejectedOperation {
                        operation: format!("{} {}", method.to_uppercase(), path),
                        detail: e.to_string(),
                    });
                    continue;
                }
            };

            for tag in &operation.tags {
                spec.add_reference(tag);
            }

            let http_method = method.to_uppercase();
            let (name, id_suffix) = match operation
                .operation_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
            {
                Some(operation_id) => (operation_id.to_string(), operation_id.to_string()),
                // Unnamed operations still count; name them by method and path
                None => (
                    format!("{} {}", http_method, path),
                    format!("{}{}", http_method, normalize_name(path)),
                ),
            };

            spec.operations.push(ParsedOperation {
                node: OperationNode {
                    id: format!("{}-OP-{}", spec.prefix, id_suffix),
                    action_term: extract_action_term(&name).to_string(),
                    name,
                    http_method,
                    path: path.to_string(),
                    summary: operation.summary.unwrap_or_default(),
                },
                tags: operation.tags,
            });
        }
    }

    if let Some(components) = raw.components {
        for (name, definition) in &components.schemas {
            let Some(name) = name.as_str() else {
                continue;
            };
            if SKIPPED_SCHEMAS.contains(&name) {
                continue;
            }
            let schema_type = definition
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_SCHEMA_TYPE);
            spec.schemas.push(SchemaNode {
                id: format!("{}-SCHEMA-{}", spec.prefix, normalize_name(name)),
                name: name.to_string(),
                schema_type: schema_type.to_string(),
            });
        }
    }

    Ok(spec)
}

// ============================================================================
// Report
// ============================================================================

/// A file whose title did not resolve to a service domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedSpecification {
    pub file: String,
    pub title: String,
    /// Operations in the file, none of which were loaded
    pub operations: usize,
}

/// A file resolved only by the loosest matching tier, worth a review
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LooseMatch {
    pub file: String,
    pub title: String,
    pub service_domain: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SpecificationReport {
    pub files_loaded: usize,
    pub control_records: UpsertCounts,
    pub behavior_qualifiers: UpsertCounts,
    pub operations: UpsertCounts,
    pub schemas: UpsertCounts,
    /// Operations linked to a control record / behavior qualifier
    pub for_cr: usize,
    pub for_bq: usize,
    /// Operations that resolved to neither a control record nor a behavior qualifier
    pub operations_without_target: usize,
    pub partial_matches: Vec<LooseMatch>,
    pub unmatched: Vec<UnmatchedSpecification>,
    pub errors: Vec<RecordError>,
    pub cancelled: bool,
}

impl SpecificationReport {
    /// Operations in files that did not resolve
    pub fn unmatched_operations(&self) -> usize {
        self.unmatched.iter().map(|u| u.operations).sum()
    }

    fn store_error(&mut self, record: &str, err: &anyhow::Error) {
        let error = RecordError::store(Stage::Specification, record, err);
        tracing::warn!("{}", error);
        self.errors.push(error);
    }
}

// ============================================================================
// Loader
// ============================================================================

pub struct SpecificationLoader {
    store: Arc<dyn GraphStore>,
    progress_every: usize,
}

impl SpecificationLoader {
    pub fn new(store: Arc<dyn GraphStore>, progress_every: usize) -> Self {
        Self {
            store,
            progress_every: progress_every.max(1),
        }
    }

    /// Load every specification file under `stamp`
    pub async fn load(
        &self,
        documents: &[SourceDocument],
        stamp: &RunStamp,
        cancel: Option<&AtomicBool>,
    ) -> Result<SpecificationReport> {
        let mut report = SpecificationReport::default();
        let service_domains = match self.store.list_service_domains().await {
            Ok(service_domains) => service_domains,
            Err(e) => {
                report.store_error("service domain listing", &e);
                return Ok(report);
            }
        };
        tracing::info!(
            "Loading {} specifications against {} service domains (run {})",
            documents.len(),
            service_domains.len(),
            stamp.run_id
        );

        for document in documents {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    tracing::info!(
                        "Specification loading cancelled after {} files",
                        report.files_loaded
                    );
                    report.cancelled = true;
                    break;
                }
            }

            let spec = match parse_specification(document) {
                Ok(spec) => spec,
                Err(detail) => {
                    let error = RecordError::new(
                        Stage::Specification,
                        &document.name,
                        RecordErrorKind::Parse(detail),
                    );
                    tracing::warn!("{}", error);
                    report.errors.push(error);
                    continue;
                }
            };

            for rejected in &spec.rejected {
                let error = RecordError::new(
                    Stage::Specification,
                    format!("{} {}", spec.file, rejected.operation),
                    RecordErrorKind::Parse(rejected.detail.clone()),
                );
                tracing::warn!("{}", error);
                report.errors.push(error);
            }

            let Some(matched) = resolve_service_domain(&spec.title, &service_domains) else {
                tracing::warn!(
                    "No service domain for specification '{}' ({} operations)",
                    spec.title,
                    spec.operations.len()
                );
                report.unmatched.push(UnmatchedSpecification {
                    file: spec.file.clone(),
                    title: spec.title.clone(),
                    operations: spec.operations.len(),
                });
                continue;
            };

            if matched.kind == MatchKind::Partial {
                tracing::info!(
                    "Specification '{}' loosely matched to '{}'",
                    spec.title,
                    matched.service_domain.name
                );
                report.partial_matches.push(LooseMatch {
                    file: spec.file.clone(),
                    title: spec.title.clone(),
                    service_domain: matched.service_domain.name.clone(),
                });
            }

            let owner = NodeKey::service_domain(&matched.service_domain.object_id);
            self.load_one(&spec, &owner, stamp, &mut report).await;
            report.files_loaded += 1;
            if report.files_loaded % self.progress_every == 0 {
                tracing::debug!("  Loaded {} specifications...", report.files_loaded);
            }
        }

        tracing::info!(
            "Specifications loaded: {} files, {} CRs, {} BQs, {} operations, {} schemas, {} unmatched files",
            report.files_loaded,
            report.control_records.total(),
            report.behavior_qualifiers.total(),
            report.operations.total(),
            report.schemas.total(),
            report.unmatched.len()
        );
        Ok(report)
    }

    /// Attach one leaf to its owning service domain
    async fn own(
        &self,
        rel: RelationType,
        owner: &NodeKey,
        leaf: NodeKey,
        report: &mut SpecificationReport,
    ) {
        if let Err(e) = self.store.merge_relationship(rel, owner, &leaf).await {
            report.store_error(&leaf.key, &e);
        }
    }

    async fn load_one(
        &self,
        spec: &ParsedSpecification,
        owner: &NodeKey,
        stamp: &RunStamp,
        report: &mut SpecificationReport,
    ) {
        for cr in &spec.control_records {
            match self.store.upsert_control_record(cr, stamp).await {
                Ok(outcome) => {
                    report.control_records.record(outcome);
                    let leaf = NodeKey::new(NodeLabel::ControlRecord, &cr.id);
                    self.own(RelationType::HasControlRecord, owner, leaf, report)
                        .await;
                }
                Err(e) => report.store_error(&cr.id, &e),
            }
        }

        for bq in &spec.behavior_qualifiers {
            match self.store.upsert_behavior_qualifier(bq, stamp).await {
                Ok(outcome) => {
                    report.behavior_qualifiers.record(outcome);
                    let leaf = NodeKey::new(NodeLabel::BehaviorQualifier, &bq.id);
                    self.own(RelationType::HasBehaviorQualifier, owner, leaf, report)
                        .await;
                }
                Err(e) => report.store_error(&bq.id, &e),
            }
        }

        for schema in &spec.schemas {
            match self.store.upsert_schema(schema, stamp).await {
                Ok(outcome) => {
                    report.schemas.record(outcome);
                    let leaf = NodeKey::new(NodeLabel::Schema, &schema.id);
                    self.own(RelationType::HasSchema, owner, leaf, report).await;
                }
                Err(e) => report.store_error(&schema.id, &e),
            }
        }

        let candidates = spec.candidates();
        for operation in &spec.operations {
            let op = &operation.node;
            match self.store.upsert_operation(op, stamp).await {
                Ok(outcome) => report.operations.record(outcome),
                Err(e) => {
                    report.store_error(&op.id, &e);
                    continue;
                }
            }
            let op_key = NodeKey::new(NodeLabel::Operation, &op.id);
            self.own(RelationType::HasOperation, owner, op_key.clone(), report)
                .await;

            let targets = resolve_operation_targets(
                OperationSignature {
                    path: &op.path,
                    tags: &operation.tags,
                },
                &candidates,
            );
            if targets.is_empty() {
                tracing::debug!("Operation {} names no control record or behavior qualifier", op.id);
                report.operations_without_target += 1;
                continue;
            }

            let mut linked = false;
            if let Some(name) = &targets.control_record {
                let target = NodeKey::new(
                    NodeLabel::ControlRecord,
                    spec.leaf_id(ReferenceKind::ControlRecord, name),
                );
                if self
                    .link_target(RelationType::ForControlRecord, &op_key, &target, report)
                    .await
                {
                    report.for_cr += 1;
                    linked = true;
                }
            }
            if let Some(name) = &targets.behavior_qualifier {
                let target = NodeKey::new(
                    NodeLabel::BehaviorQualifier,
                    spec.leaf_id(ReferenceKind::BehaviorQualifier, name),
                );
                if self
                    .link_target(RelationType::ForBehaviorQualifier, &op_key, &target, report)
                    .await
                {
                    report.for_bq += 1;
                    linked = true;
                }
            }
            if !linked {
                tracing::debug!("Operation {} targets were not loaded", op.id);
                report.operations_without_target += 1;
            }
        }
    }

    async fn link_target(
        &self,
        rel: RelationType,
        operation: &NodeKey,
        target: &NodeKey,
        report: &mut SpecificationReport,
    ) -> bool {
        match self.store.merge_relationship(rel, operation, target).await {
            Ok(RelationshipOutcome::Created | RelationshipOutcome::Existing) => true,
            Ok(RelationshipOutcome::MissingEndpoint) => false,
            Err(e) => {
                report.store_error(&operation.key, &e);
                false
            }
        }
    }
}
