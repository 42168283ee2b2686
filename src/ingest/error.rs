//! Error taxonomy of the ingestion pipeline.
//!
//! [`IngestError`] is fatal and aborts the pipeline. [`RecordError`] is a
//! value: it is collected into the stage report and the stage moves on.

use crate::neo4j::models::NodeLabel;
use serde::Serialize;
use thiserror::Error;

/// Failures that stop the pipeline (or an administrative action) outright
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("uniqueness constraint on {label} cannot be created, existing data violates it: {detail}")]
    ConstraintViolation { label: NodeLabel, detail: String },

    #[error("hierarchy index not found: {0}")]
    MissingRootInput(String),

    #[error("hierarchy index '{source_name}' is malformed: {detail}")]
    MalformedRoot { source_name: String, detail: String },

    #[error("destructive action not confirmed (expected '{expected}')")]
    ConfirmationRequired { expected: &'static str },

    #[error("unknown category '{0}' (valid: hierarchy, specification, reference)")]
    UnknownCategory(String),
}

/// Pipeline stage a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Hierarchy,
    Enrichment,
    Specification,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hierarchy => write!(f, "hierarchy"),
            Self::Enrichment => write!(f, "enrichment"),
            Self::Specification => write!(f, "specification"),
        }
    }
}

/// Why a single record was not (fully) loaded
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum RecordErrorKind {
    #[error("missing key attribute '{0}'")]
    MissingKey(String),

    #[error("parent '{0}' was not loaded in this batch")]
    MissingParent(String),

    #[error("declared under '{declared}' but already placed under '{existing}'")]
    ConflictingParent { declared: String, existing: String },

    #[error("read error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("store error: {0}")]
    Store(String),
}

/// A recoverable failure tied to one source record
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("[{stage}] {record}: {kind}")]
pub struct RecordError {
    pub stage: Stage,
    pub record: String,
    pub kind: RecordErrorKind,
}

impl RecordError {
    pub fn new(stage: Stage, record: impl Into<String>, kind: RecordErrorKind) -> Self {
        Self {
            stage,
            record: record.into(),
            kind,
        }
    }

    /// Wrap a store failure; `{:#}` keeps the anyhow context chain
    pub fn store(stage: Stage, record: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::new(stage, record, RecordErrorKind::Store(format!("{:#}", err)))
    }
}
