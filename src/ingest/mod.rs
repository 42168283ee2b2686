//! BIAN reference model ingestion
//!
//! Stages, in the order the pipeline runs them:
//! - [`schema`]: uniqueness constraints
//! - [`hierarchy`]: areas, domains and service domains from the index document
//! - [`enrichment`]: descriptive attributes and `TRIGGERS` edges
//! - [`specification`]: control records, behavior qualifiers, operations, schemas
//!
//! [`registry`] owns run identity and deletion, [`pipeline`] sequences the stages.

pub mod enrichment;
pub mod error;
pub mod hierarchy;
pub mod pipeline;
pub mod registry;
pub mod resolve;
pub mod schema;
pub mod sources;
pub mod specification;

pub use error::{IngestError, RecordError, RecordErrorKind, Stage};
pub use pipeline::{ImportSettings, PipelineDriver, PipelineReport};
pub use registry::{Category, DeleteMode, RunRegistry, WIPE_CONFIRMATION};
pub use schema::ConstraintManager;
pub use sources::{PipelineInputs, SourceDocument, SourceLocations};
