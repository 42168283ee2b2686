//! Best-effort matching rules used by the loaders.
//!
//! Everything here is pure: candidates come in as slices, matches come out as
//! values. The loaders decide what to do with a miss.
//!
//! ## Service domain resolution
//!
//! A specification title is matched against service domain names in tiers,
//! stopping at the first tier that hits:
//!
//! 1. exact name
//! 2. case-insensitive name
//! 3. normalized name (lowercase ASCII alphanumerics only)
//! 4. partial: the first [`PARTIAL_PREFIX_LEN`] normalized characters of the
//!    title contain, or are contained in, a normalized candidate name
//!
//! Candidates are scanned in the order given, so callers pass them sorted by
//! name to keep tier 4 deterministic.
//!
//! ## Operation target resolution
//!
//! An operation's primary target is its first tag (`CR - <Name>` or
//! `BQ - <Name>`). Literal path segments whose normalized form equals a known
//! control record or behavior qualifier name fill whichever slot is still
//! empty. BIAN paths nest the behavior qualifier under its control record
//! (`/ConsumerLoan/{id}/Fulfillment/{id}/Update`), so a BQ-tagged operation
//! usually resolves both.

use crate::neo4j::models::ServiceDomainRef;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Normalized title characters used for partial matching
pub const PARTIAL_PREFIX_LEN: usize = 15;

/// Action terms recognised in operation ids, in priority order
pub const ACTION_TERMS: [&str; 15] = [
    "Initiate", "Create", "Update", "Retrieve", "Execute", "Request", "Notify", "Exchange",
    "Control", "Register", "Capture", "Grant", "Evaluate", "Provide", "Allocate",
];

static REFERENCE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(CR|BQ)\s*-\s*(.*?)\s*$").expect("valid regex"));

static PATH_PARAMETER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{[^}]*\}$").expect("valid regex"));

/// Lowercase and keep only ASCII alphanumerics
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ============================================================================
// Service domain resolution
// ============================================================================

/// Tier that produced a service domain match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    CaseInsensitive,
    Normalized,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDomainMatch<'a> {
    pub service_domain: &'a ServiceDomainRef,
    pub kind: MatchKind,
}

/// Resolve a specification title to a service domain
pub fn resolve_service_domain<'a>(
    title: &str,
    candidates: &'a [ServiceDomainRef],
) -> Option<ServiceDomainMatch<'a>> {
    let hit = |kind: MatchKind| move |sd: &'a ServiceDomainRef| ServiceDomainMatch {
        service_domain: sd,
        kind,
    };

    if let Some(sd) = candidates.iter().find(|sd| sd.name == title) {
        return Some(hit(MatchKind::Exact)(sd));
    }

    let lowered = title.to_lowercase();
    if let Some(sd) = candidates
        .iter()
        .find(|sd| sd.name.to_lowercase() == lowered)
    {
        return Some(hit(MatchKind::CaseInsensitive)(sd));
    }

    let normalized = normalize_name(title);
    if normalized.is_empty() {
        return None;
    }
    if let Some(sd) = candidates
        .iter()
        .find(|sd| normalize_name(&sd.name) == normalized)
    {
        return Some(hit(MatchKind::Normalized)(sd));
    }

    let prefix: String = normalized.chars().take(PARTIAL_PREFIX_LEN).collect();
    candidates
        .iter()
        .find(|sd| {
            let name = normalize_name(&sd.name);
            !name.is_empty() && (name.contains(&prefix) || prefix.contains(&name))
        })
        .map(hit(MatchKind::Partial))
}

// ============================================================================
// Operation targets
// ============================================================================

/// Kind of entity a reference tag points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReferenceKind {
    #[serde(rename = "CR")]
    ControlRecord,
    #[serde(rename = "BQ")]
    BehaviorQualifier,
}

impl ReferenceKind {
    /// Infix used in leaf entity ids
    pub fn id_infix(&self) -> &'static str {
        match self {
            Self::ControlRecord => "CR",
            Self::BehaviorQualifier => "BQ",
        }
    }
}

/// Parse `CR - Name` / `BQ - Name` tags
pub fn parse_reference_tag(tag: &str) -> Option<(ReferenceKind, String)> {
    let caps = REFERENCE_TAG.captures(tag)?;
    let kind = match &caps[1] {
        "CR" => ReferenceKind::ControlRecord,
        _ => ReferenceKind::BehaviorQualifier,
    };
    let name = caps[2].to_string();
    if name.is_empty() {
        return None;
    }
    Some((kind, name))
}

/// What the matcher sees of one operation
#[derive(Debug, Clone, Copy)]
pub struct OperationSignature<'a> {
    pub path: &'a str,
    pub tags: &'a [String],
}

/// Known control record / behavior qualifier names of one specification
#[derive(Debug, Clone, Default)]
pub struct TargetCandidates {
    pub control_records: Vec<String>,
    pub behavior_qualifiers: Vec<String>,
}

/// Names an operation resolved to; either or both may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationTargets {
    pub control_record: Option<String>,
    pub behavior_qualifier: Option<String>,
}

impl OperationTargets {
    pub fn is_empty(&self) -> bool {
        self.control_record.is_none() && self.behavior_qualifier.is_none()
    }
}

fn find_candidate(candidates: &[String], normalized: &str) -> Option<String> {
    candidates
        .iter()
        .find(|c| normalize_name(c) == normalized)
        .cloned()
}

/// Resolve the control record and behavior qualifier an operation acts on
pub fn resolve_operation_targets(
    operation: OperationSignature<'_>,
    candidates: &TargetCandidates,
) -> OperationTargets {
    let mut targets = OperationTargets::default();

    if let Some((kind, name)) = operation.tags.first().and_then(|t| parse_reference_tag(t)) {
        let normalized = normalize_name(&name);
        match kind {
            ReferenceKind::ControlRecord => {
                targets.control_record = find_candidate(&candidates.control_records, &normalized)
            }
            ReferenceKind::BehaviorQualifier => {
                targets.behavior_qualifier =
                    find_candidate(&candidates.behavior_qualifiers, &normalized)
            }
        }
    }

    for segment in operation
        .path
        .split('/')
        .filter(|s| !s.is_empty() && !PATH_PARAMETER.is_match(s))
    {
        let normalized = normalize_name(segment);
        if targets.control_record.is_none() {
            targets.control_record = find_candidate(&candidates.control_records, &normalized);
        }
        if targets.behavior_qualifier.is_none() {
            targets.behavior_qualifier =
                find_candidate(&candidates.behavior_qualifiers, &normalized);
        }
    }

    targets
}

/// First action term the operation id starts with, else the first it contains
pub fn extract_action_term(operation_id: &str) -> &'static str {
    ACTION_TERMS
        .iter()
        .find(|term| operation_id.starts_with(*term))
        .or_else(|| ACTION_TERMS.iter().find(|term| operation_id.contains(*term)))
        .copied()
        .unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sd(object_id: &str, name: &str) -> ServiceDomainRef {
        ServiceDomainRef {
            object_id: object_id.into(),
            name: name.into(),
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Consumer Loan"), "consumerloan");
        assert_eq!(normalize_name("Party Reference Data-Directory & Co"), "partyreferencedatadirectoryco");
        assert_eq!(normalize_name("  "), "");
    }

    #[test]
    fn test_resolve_service_domain_tiers() {
        let candidates = vec![
            sd("SD-1", "Consumer Loan"),
            sd("SD-2", "Customer Offer"),
            sd("SD-3", "Party Reference Data Directory"),
        ];

        let exact = resolve_service_domain("Consumer Loan", &candidates).unwrap();
        assert_eq!(exact.service_domain.object_id, "SD-1");
        assert_eq!(exact.kind, MatchKind::Exact);

        let ci = resolve_service_domain("consumer LOAN", &candidates).unwrap();
        assert_eq!(ci.kind, MatchKind::CaseInsensitive);

        let norm = resolve_service_domain("CustomerOffer", &candidates).unwrap();
        assert_eq!(norm.service_domain.object_id, "SD-2");
        assert_eq!(norm.kind, MatchKind::Normalized);

        let partial = resolve_service_domain("Party Reference Data Management", &candidates).unwrap();
        assert_eq!(partial.service_domain.object_id, "SD-3");
        assert_eq!(partial.kind, MatchKind::Partial);
    }

    #[test]
    fn test_resolve_service_domain_misses() {
        let candidates = vec![sd("SD-1", "Consumer Loan")];
        assert!(resolve_service_domain("BIAN Common Types", &candidates).is_none());
        assert!(resolve_service_domain("---", &candidates).is_none());
        assert!(resolve_service_domain("Anything", &[]).is_none());
    }

    #[test]
    fn test_partial_match_prefers_first_candidate_in_order() {
        let candidates = vec![sd("SD-A", "Card Authorization"), sd("SD-B", "Card Authorization Extra")];
        let m = resolve_service_domain("Card Authorization Services", &candidates).unwrap();
        assert_eq!(m.kind, MatchKind::Partial);
        assert_eq!(m.service_domain.object_id, "SD-A");
    }

    #[test]
    fn test_parse_reference_tag() {
        assert_eq!(
            parse_reference_tag("CR - Consumer Loan Fulfillment Arrangement"),
            Some((
                ReferenceKind::ControlRecord,
                "Consumer Loan Fulfillment Arrangement".to_string()
            ))
        );
        assert_eq!(
            parse_reference_tag("BQ-Disbursement "),
            Some((ReferenceKind::BehaviorQualifier, "Disbursement".to_string()))
        );
        assert_eq!(parse_reference_tag("Consumer Loan"), None);
        assert_eq!(parse_reference_tag("CR - "), None);
    }

    #[test]
    fn test_operation_targets_from_tag_and_path() {
        let candidates = TargetCandidates {
            control_records: vec!["ConsumerLoan".into()],
            behavior_qualifiers: vec!["Fulfillment".into(), "Disbursement".into()],
        };

        let tags = vec!["BQ - Disbursement".to_string()];
        let targets = resolve_operation_targets(
            OperationSignature {
                path: "/ConsumerLoan/{consumerloanid}/Disbursement/{disbursementid}/Update",
                tags: &tags,
            },
            &candidates,
        );
        assert_eq!(targets.control_record.as_deref(), Some("ConsumerLoan"));
        assert_eq!(targets.behavior_qualifier.as_deref(), Some("Disbursement"));
    }

    #[test]
    fn test_operation_targets_tag_wins_over_path() {
        let candidates = TargetCandidates {
            control_records: vec![],
            behavior_qualifiers: vec!["Fulfillment".into(), "Disbursement".into()],
        };
        let tags = vec!["BQ - Fulfillment".to_string()];
        let targets = resolve_operation_targets(
            OperationSignature {
                path: "/Disbursement/Fulfillment/Retrieve",
                tags: &tags,
            },
            &candidates,
        );
        assert_eq!(targets.behavior_qualifier.as_deref(), Some("Fulfillment"));
        assert!(targets.control_record.is_none());
    }

    #[test]
    fn test_operation_targets_unresolved() {
        let candidates = TargetCandidates::default();
        let targets = resolve_operation_targets(
            OperationSignature {
                path: "/Something/{id}/Retrieve",
                tags: &[],
            },
            &candidates,
        );
        assert!(targets.is_empty());
    }

    #[test]
    fn test_extract_action_term() {
        assert_eq!(extract_action_term("InitiateConsumerLoan"), "Initiate");
        assert_eq!(extract_action_term("RetrieveConsumerLoanFulfillment"), "Retrieve");
        // prefix beats an earlier term that only appears later in the id
        assert_eq!(extract_action_term("ExchangeCreditUpdate"), "Exchange");
        assert_eq!(extract_action_term("ConsumerLoanUpdate"), "Update");
        assert_eq!(extract_action_term("Frobnicate"), "Unknown");
    }
}
