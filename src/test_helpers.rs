//! Test helper factories and sample source documents
//!
//! Provides small but realistic BIAN fixtures (index, enrichment documents,
//! OpenAPI specifications) and builders for mock loader state.
#![allow(dead_code)]

use crate::ingest::sources::{PipelineInputs, SourceDocument};
use crate::neo4j::mock::MockGraphStore;
use crate::neo4j::models::*;
use crate::{Config, LoaderState};
use chrono::{TimeZone, Utc};
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Mock state builders
// ============================================================================

pub fn test_config() -> Config {
    Config {
        neo4j_uri: "bolt://mock:7687".to_string(),
        neo4j_user: "neo4j".to_string(),
        neo4j_password: "mock".to_string(),
        hierarchy_file: PathBuf::from("./data/index_hierarchy.json"),
        service_domains_dir: PathBuf::from("./data/service_domains"),
        specifications_dir: PathBuf::from("./data/yamls"),
        run_prefix: "bian".to_string(),
        delete_batch_size: 100,
        progress_every: 10,
    }
}

/// Create a mock LoaderState with an empty in-memory graph
pub fn mock_loader_state() -> LoaderState {
    mock_loader_state_with(MockGraphStore::new())
}

/// Create a mock LoaderState over a pre-seeded graph
pub fn mock_loader_state_with(graph: MockGraphStore) -> LoaderState {
    LoaderState {
        graph: Arc::new(graph),
        config: Arc::new(test_config()),
    }
}

// ============================================================================
// Run stamps
// ============================================================================

/// Stamp whose import time is derived from the run id when it parses
pub fn test_stamp(run_id: &str) -> RunStamp {
    let imported_at = crate::ingest::registry::parse_run_id("bian", run_id)
        .unwrap_or_else(|| Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    RunStamp::new(run_id, imported_at)
}

// ============================================================================
// Hierarchy index
// ============================================================================

/// 1 area, 2 domains, 3 service domains
pub const SAMPLE_INDEX: &str = r#"[
  {
    "business_area": "Products",
    "business_domains": [
      {
        "business_domain": "Loans and Deposits",
        "service_domains": [
          {"name": "Consumer Loan", "object_id": "SD-LOAN", "url": "https://bian.org/sd/loan"}
        ]
      },
      {
        "business_domain": "Cards",
        "service_domains": [
          {"name": "Card Authorization", "object_id": "SD-CARD", "url": "https://bian.org/sd/card-auth"},
          {"name": "Card Issuance", "object_id": "SD-ISSUE", "url": null}
        ]
      }
    ]
  }
]"#;

/// 1 area, 1 domain, 2 service domains, disjoint from [`SAMPLE_INDEX`]
pub const SECOND_INDEX: &str = r#"[
  {
    "business_area": "Operations",
    "business_domains": [
      {
        "business_domain": "Payments",
        "service_domains": [
          {"name": "Payment Execution", "object_id": "SD-PAY", "url": null},
          {"name": "Payment Order", "object_id": "SD-ORDER", "url": null}
        ]
      }
    ]
  }
]"#;

pub fn index_document(json: &str) -> SourceDocument {
    SourceDocument::new("index_hierarchy.json", json)
}

// ============================================================================
// Enrichment documents
// ============================================================================

/// Two enrichable domains, one scrape error, one unknown domain
pub fn sample_domain_documents() -> Vec<SourceDocument> {
    vec![
        SourceDocument::new(
            "SD-LOAN.json",
            r#"{
              "object_id": "SD-LOAN",
              "role_definition": "Handles consumer loans",
              "example_of_use": "A customer takes out a car loan",
              "executive_summary": "Fulfills consumer loan arrangements",
              "key_features": ["Loan origination", "**", "", "Repayment tracking"],
              "relations_all": {"realized_by": [{"name": "Fulfill"}]},
              "relations_service_domains": {
                "triggers": [
                  {"name": "Card Authorization", "object_id": "SD-CARD"},
                  {"name": "Zeta", "object_id": "SD-ZZZ"},
                  {"name": "Consumer Loan", "object_id": "SD-LOAN"}
                ],
                "triggered_by": [{"name": "Card Issuance"}]
              }
            }"#,
        ),
        SourceDocument::new(
            "SD-CARD.json",
            r#"{
              "role_definition": "Authorizes card transactions",
              "key_features": ["General comment", "Real-time checks"]
            }"#,
        ),
        SourceDocument::new(
            "SD-ISSUE.json",
            r#"{"error": "timeout", "url": "https://bian.org/sd/issue", "name": "Card Issuance"}"#,
        ),
        SourceDocument::new(
            "SD-GHOST.json",
            r#"{"role_definition": "Not in the landscape"}"#,
        ),
    ]
}

// ============================================================================
// Specifications
// ============================================================================

/// Resolves to "Consumer Loan"; 4 operations, 1 CR, 2 BQs, 2 schemas (+ HTTPError)
pub const CONSUMER_LOAN_SPEC: &str = r#"
openapi: 3.0.0
info:
  title: Consumer Loan
  version: 13.0.0
tags:
  - name: CR - Consumer Loan Fulfillment Arrangement
  - name: BQ - Disbursement
paths:
  /ConsumerLoan/Initiate:
    post:
      tags:
        - CR - Consumer Loan Fulfillment Arrangement
      operationId: InitiateConsumerLoanFulfillmentArrangement
      summary: Initiate a consumer loan arrangement
  /ConsumerLoan/{consumerloanid}/Disbursement/{disbursementid}/Update:
    parameters:
      - name: consumerloanid
        in: path
        required: true
    put:
      tags:
        - BQ - Disbursement
      operationId: UpdateDisbursement
      summary: Update a disbursement
  /ConsumerLoan/{consumerloanid}/Repayment/{repaymentid}/Retrieve:
    get:
      tags:
        - BQ - Repayment
      operationId: RetrieveRepayment
  /ConsumerLoan/{consumerloanid}/Status:
    get:
      summary: Loan status
components:
  schemas:
    HTTPError:
      type: object
    ConsumerLoanFulfillmentArrangement:
      type: object
      properties:
        ProductInstanceReference:
          type: string
    Disbursement:
      type: array
      items:
        type: string
"#;

/// Title matches no service domain; 2 operations
pub const UNMATCHED_SPEC: &str = r#"
openapi: 3.0.0
info:
  title: Treasury Widget Exchange
paths:
  /Widget/Initiate:
    post:
      tags:
        - CR - Widget
      operationId: InitiateWidget
  /Widget/{widgetid}/Retrieve:
    get:
      tags:
        - CR - Widget
      operationId: RetrieveWidget
"#;

/// Hierarchy, enrichment and one resolvable specification
pub fn sample_inputs() -> PipelineInputs {
    PipelineInputs {
        hierarchy: Some(index_document(SAMPLE_INDEX)),
        domains: sample_domain_documents(),
        specifications: vec![SourceDocument::new("ConsumerLoan.yaml", CONSUMER_LOAN_SPEC)],
        unreadable: Vec::new(),
    }
}
