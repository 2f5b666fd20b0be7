//! Declaration lifecycle: the status graph and the validation gates
//! guarding it. Transitions are validated at runtime against the fixed
//! graph; the store persists only sequences this module admits.

use rust_decimal::Decimal;
use serde_json::json;
use std::collections::BTreeMap;

use common::{ServiceError, ServiceResult};

use crate::catalog::fields;
use crate::models::DeclarationStatus;

pub fn can_transition(from: DeclarationStatus, to: DeclarationStatus) -> bool {
    use DeclarationStatus::*;
    matches!(
        (from, to),
        (Draft, Validated)
            | (Validated, Draft)
            | (Validated, AwaitingConsent)
            | (AwaitingConsent, Validated)
            | (AwaitingConsent, Signed)
            | (Signed, Submitted)
            | (Submitted, Accepted)
            | (Submitted, Rejected)
            | (Rejected, Draft)
    )
}

/// ACCEPTED is the single terminal state.
pub fn is_terminal(status: DeclarationStatus) -> bool {
    matches!(status, DeclarationStatus::Accepted)
}

/// Once handed to the gateway the declaration cannot be touched.
pub fn is_immutable(status: DeclarationStatus) -> bool {
    matches!(status, DeclarationStatus::Submitted | DeclarationStatus::Accepted)
}

/// Regeneration is only allowed before the consent step.
pub fn can_regenerate(status: DeclarationStatus) -> bool {
    matches!(status, DeclarationStatus::Draft | DeclarationStatus::Validated)
}

pub fn ensure_transition(from: DeclarationStatus, to: DeclarationStatus) -> ServiceResult<()> {
    if is_immutable(from) && !can_transition(from, to) {
        return Err(ServiceError::Conflict(format!(
            "declaration is {} and immutable",
            from
        )));
    }
    if !can_transition(from, to) {
        return Err(ServiceError::Conflict(format!(
            "invalid status transition: {} -> {}",
            from, to
        )));
    }
    Ok(())
}

pub fn ensure_mutable(status: DeclarationStatus) -> ServiceResult<()> {
    if is_immutable(status) {
        return Err(ServiceError::Conflict(format!(
            "declaration is {} and immutable",
            status
        )));
    }
    Ok(())
}

#[derive(Debug)]
pub struct GateOutcome {
    pub is_valid: bool,
    pub report: serde_json::Value,
}

/// The DRAFT → VALIDATED business gate: the declaration must carry items
/// and the computed tax chain.
pub fn business_validation(items: &BTreeMap<String, Decimal>) -> GateOutcome {
    let mut failures: Vec<String> = Vec::new();

    if items.is_empty() {
        failures.push("declaration has no items".to_string());
    }
    for field in fields::VALIDATION_REQUIRED_FIELDS {
        if !items.contains_key(field) {
            failures.push(format!("required field {} is missing", field));
        }
    }

    GateOutcome {
        is_valid: failures.is_empty(),
        report: json!({
            "item_count": items.len(),
            "required_fields": fields::VALIDATION_REQUIRED_FIELDS,
            "failures": failures,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeclarationStatus::*;

    const ALL: [DeclarationStatus; 7] =
        [Draft, Validated, AwaitingConsent, Signed, Submitted, Accepted, Rejected];

    #[test]
    fn test_happy_path_is_admitted() {
        let path = [Draft, Validated, AwaitingConsent, Signed, Submitted, Accepted];
        for pair in path.windows(2) {
            assert!(can_transition(pair[0], pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_rejection_loops_back_to_draft() {
        assert!(can_transition(Submitted, Rejected));
        assert!(can_transition(Rejected, Draft));
    }

    #[test]
    fn test_backward_steps() {
        assert!(can_transition(Validated, Draft));
        assert!(can_transition(AwaitingConsent, Validated));
    }

    #[test]
    fn test_accepted_is_terminal() {
        assert!(is_terminal(Accepted));
        for target in ALL {
            assert!(!can_transition(Accepted, target));
        }
    }

    #[test]
    fn test_no_skipping_states() {
        assert!(!can_transition(Draft, Signed));
        assert!(!can_transition(Draft, Submitted));
        assert!(!can_transition(Validated, Signed));
        assert!(!can_transition(Signed, Accepted));
    }

    #[test]
    fn test_immutable_states_reject_distinctly() {
        assert!(is_immutable(Submitted));
        assert!(is_immutable(Accepted));
        assert!(!is_immutable(Validated));
        assert!(matches!(ensure_mutable(Submitted), Err(ServiceError::Conflict(_))));
    }

    #[test]
    fn test_regeneration_window() {
        assert!(can_regenerate(Draft));
        assert!(can_regenerate(Validated));
        assert!(!can_regenerate(AwaitingConsent));
        assert!(!can_regenerate(Submitted));
    }

    #[test]
    fn test_gate_fails_without_items() {
        let gate = business_validation(&BTreeMap::new());
        assert!(!gate.is_valid);
        assert!(gate.report["failures"]
            .as_array()
            .unwrap()
            .iter()
            .any(|f| f.as_str().unwrap().contains("no items")));
    }

    #[test]
    fn test_gate_requires_tax_chain() {
        let mut items = BTreeMap::new();
        items.insert(fields::INCOME_TOTAL.to_string(), Decimal::new(500_000, 0));
        let gate = business_validation(&items);
        assert!(!gate.is_valid);

        items.insert(fields::TAXABLE_INCOME.to_string(), Decimal::new(500_000, 0));
        items.insert(fields::IPN_CALCULATED.to_string(), Decimal::new(50_000, 0));
        let gate = business_validation(&items);
        assert!(gate.is_valid);
        assert_eq!(gate.report["failures"], json!([]));
    }
}
