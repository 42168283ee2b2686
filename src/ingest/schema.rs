//! Uniqueness constraints for every reference label.
//!
//! Runs before any load. Constraints that already exist are left alone;
//! a constraint that cannot be created because stored data already holds
//! duplicate keys stops the pipeline with [`IngestError::ConstraintViolation`].

use crate::ingest::error::IngestError;
use crate::neo4j::models::{ConstraintOutcome, NodeLabel};
use crate::neo4j::traits::GraphStore;
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

/// What ensuring the constraints did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConstraintReport {
    pub created: Vec<NodeLabel>,
    pub already_present: Vec<NodeLabel>,
}

pub struct ConstraintManager {
    store: Arc<dyn GraphStore>,
}

impl ConstraintManager {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Ensure one uniqueness constraint per label on its key property
    pub async fn ensure_constraints(&self) -> Result<ConstraintReport> {
        let mut report = ConstraintReport::default();

        for label in NodeLabel::ALL {
            match self.store.ensure_unique_constraint(label).await? {
                ConstraintOutcome::Created => {
                    tracing::debug!("Created constraint {}", label.constraint_name());
                    report.created.push(label);
                }
                ConstraintOutcome::AlreadyPresent => report.already_present.push(label),
                ConstraintOutcome::Violated(detail) => {
                    tracing::error!(
                        "Constraint {} cannot be created: {}",
                        label.constraint_name(),
                        detail
                    );
                    return Err(IngestError::ConstraintViolation { label, detail }.into());
                }
            }
        }

        tracing::info!(
            "Constraints ensured: {} created, {} already present",
            report.created.len(),
            report.already_present.len()
        );
        Ok(report)
    }
}
