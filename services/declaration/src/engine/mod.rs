//! The rule engine runner. A run is a pure fold over a snapshot of
//! events and rules: no IO, no suspension points, and byte-identical
//! output for identical input.

pub mod conditions;
pub mod formula;

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use common::{ServiceError, ServiceResult};
use utils::AmountRounding;

use crate::catalog::actions::{self, AmountSource, MapAction, RuleAction};
use crate::catalog::fields;
use crate::models::{RuleKind, TaxEvent, TaxRule};

/// IPN rate: 10% of taxable income.
const IPN_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub tax_year: i32,
    pub allow_empty: bool,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStats {
    pub events_processed: u64,
    pub events_excluded: u64,
    pub rules_matched: u64,
    pub mappings_created: u64,
}

/// One `map` action firing: the audit trail row behind a field value.
#[derive(Debug, Clone, Serialize)]
pub struct MappingRecord {
    pub tax_event_id: Uuid,
    pub tax_year: i32,
    pub logical_field: String,
    pub amount: Decimal,
    pub rule_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalculationRecord {
    pub logical_field: String,
    pub value: Decimal,
    pub rule_id: Uuid,
}

/// Non-fatal per-rule failure. The run continues past these.
#[derive(Debug, Clone, Serialize)]
pub struct RuleFailure {
    pub rule_id: Uuid,
    pub event_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunOutcome {
    pub field_values: BTreeMap<String, Decimal>,
    pub mappings: Vec<MappingRecord>,
    pub calculations: Vec<CalculationRecord>,
    pub flags: BTreeMap<String, bool>,
    pub excluded_event_ids: BTreeSet<Uuid>,
    pub errors: Vec<RuleFailure>,
    pub stats: RunStats,
}

/// The catalog vocabulary a run validates its inputs against.
#[derive(Debug, Default, Clone)]
pub struct Vocabulary {
    pub event_types: BTreeSet<String>,
    pub logical_fields: BTreeSet<String>,
}

struct PreparedRule {
    id: Uuid,
    rule_code: String,
    kind: RuleKind,
    conditions: serde_json::Value,
    actions: Vec<RuleAction>,
}

/// Decodes, filters and orders the rule set for one run. A malformed
/// persisted rule is a structural defect and fails the whole run.
fn prepare_rules(
    rules: &[TaxRule],
    vocabulary: &Vocabulary,
    tax_year: i32,
) -> ServiceResult<Vec<PreparedRule>> {
    let mut applicable: Vec<&TaxRule> = rules
        .iter()
        .filter(|rule| rule.active)
        .filter(|rule| rule.tax_year.is_none() || rule.tax_year == Some(tax_year))
        .collect();
    applicable.sort_by(|a, b| {
        (a.priority, a.created_at, a.id).cmp(&(b.priority, b.created_at, b.id))
    });

    let mut prepared = Vec::with_capacity(applicable.len());
    for rule in applicable {
        let decoded = actions::decode_actions(rule.kind, &rule.actions).map_err(|reason| {
            ServiceError::Conflict(format!("rule {} is malformed: {}", rule.rule_code, reason))
        })?;

        for action in &decoded {
            let target = match action {
                RuleAction::Map(map) => Some(&map.target),
                RuleAction::Calc(calc) => Some(&calc.target),
                _ => None,
            };
            if let Some(target) = target {
                if !vocabulary.logical_fields.contains(target) {
                    return Err(ServiceError::Conflict(format!(
                        "rule {} targets unknown logical field {}",
                        rule.rule_code, target
                    )));
                }
            }
        }

        prepared.push(PreparedRule {
            id: rule.id,
            rule_code: rule.rule_code.clone(),
            kind: rule.kind,
            conditions: rule.conditions.clone(),
            actions: decoded,
        });
    }
    Ok(prepared)
}

/// Runs the seven phases over a fixed snapshot of events and rules.
pub fn run(
    events: &[TaxEvent],
    rules: &[TaxRule],
    vocabulary: &Vocabulary,
    options: &RunOptions,
) -> ServiceResult<RunOutcome> {
    let mut ordered_events: Vec<&TaxEvent> = events.iter().filter(|event| event.active).collect();
    if ordered_events.is_empty() && !options.allow_empty {
        return Err(ServiceError::Unprocessable(format!(
            "no tax events for year {}",
            options.tax_year
        )));
    }
    ordered_events.sort_by(|a, b| (a.event_date, a.id).cmp(&(b.event_date, b.id)));

    for event in &ordered_events {
        if !vocabulary.event_types.contains(&event.event_type) {
            return Err(ServiceError::Conflict(format!(
                "event {} has unknown event type {}",
                event.id, event.event_type
            )));
        }
    }

    let prepared = prepare_rules(rules, vocabulary, options.tax_year)?;
    let exclusion_rules: Vec<&PreparedRule> =
        prepared.iter().filter(|r| r.kind == RuleKind::Exclusion).collect();
    let mapping_rules: Vec<&PreparedRule> =
        prepared.iter().filter(|r| r.kind == RuleKind::Mapping).collect();
    let calculation_rules: Vec<&PreparedRule> =
        prepared.iter().filter(|r| r.kind == RuleKind::Calculation).collect();
    let flag_rules: Vec<&PreparedRule> =
        prepared.iter().filter(|r| r.kind == RuleKind::Flag).collect();

    let mut outcome = RunOutcome::default();

    // Phase 1 — exclusion. First matching rule wins per event.
    for event in &ordered_events {
        for rule in &exclusion_rules {
            if conditions::match_event(&rule.conditions, event) {
                outcome.excluded_event_ids.insert(event.id);
                outcome.stats.events_excluded += 1;
                outcome.stats.rules_matched += 1;
                break;
            }
        }
    }

    // Phase 2 — mapping. Every matching rule fires all its actions.
    for event in &ordered_events {
        if outcome.excluded_event_ids.contains(&event.id) {
            continue;
        }
        outcome.stats.events_processed += 1;

        for rule in &mapping_rules {
            if !conditions::match_event(&rule.conditions, event) {
                continue;
            }
            outcome.stats.rules_matched += 1;

            for action in &rule.actions {
                match action {
                    RuleAction::Map(map) => {
                        if let Err(message) = apply_map(&mut outcome, rule, map, event) {
                            tracing::debug!(
                                rule = %rule.rule_code,
                                event = %event.id,
                                "map action failed: {}",
                                message
                            );
                            outcome.errors.push(RuleFailure {
                                rule_id: rule.id,
                                event_id: Some(event.id),
                                message,
                            });
                        }
                    }
                    RuleAction::Flag(flag) => {
                        for (name, value) in &flag.set {
                            outcome.flags.insert(name.clone(), *value);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    // Phase 3 — base totals for anything the year's rules left implicit.
    apply_base_totals(&mut outcome.field_values);

    // Phase 4 — calculation rules, in rule order.
    for rule in &calculation_rules {
        for action in &rule.actions {
            if let RuleAction::Calc(calc) = action {
                let mut value = calc.formula.eval(&outcome.field_values);
                if let Some(precision) = calc.round {
                    value = AmountRounding::to_scale(value, precision);
                }
                if let Some(min) = calc.min {
                    value = value.max(min);
                }
                if let Some(max) = calc.max {
                    value = value.min(max);
                }
                outcome.field_values.insert(calc.target.clone(), value);
                outcome.calculations.push(CalculationRecord {
                    logical_field: calc.target.clone(),
                    value,
                    rule_id: rule.id,
                });
                outcome.stats.rules_matched += 1;
            }
        }
    }

    // Phase 5 — derived totals.
    apply_derived_totals(&mut outcome.field_values);

    // Phase 6 — conditional flag rules, matched against field values.
    for rule in &flag_rules {
        if !conditions::match_fields(&rule.conditions, &outcome.field_values) {
            continue;
        }
        outcome.stats.rules_matched += 1;
        for action in &rule.actions {
            if let RuleAction::Flag(flag) = action {
                for (name, value) in &flag.set {
                    outcome.flags.insert(name.clone(), *value);
                }
            }
        }
    }

    // Phase 7 — presentation flags derived from the totals.
    apply_auto_flags(&outcome.field_values, &mut outcome.flags);

    outcome.stats.mappings_created = outcome.mappings.len() as u64;
    Ok(outcome)
}

fn apply_map(
    outcome: &mut RunOutcome,
    rule: &PreparedRule,
    map: &MapAction,
    event: &TaxEvent,
) -> Result<(), String> {
    let base = match &map.amount_source {
        AmountSource::EventAmount => event
            .amount
            .ok_or_else(|| "event carries no amount".to_string())?,
        AmountSource::Metadata(path) => {
            let value = lookup_metadata(&event.metadata, path)
                .ok_or_else(|| format!("metadata path {} is absent", path))?;
            actions::decimal_from_value(&value)
                .ok_or_else(|| format!("metadata path {} is not numeric", path))?
        }
        AmountSource::Fixed(amount) => *amount,
    };

    let mut amount = match map.multiplier {
        Some(multiplier) => base * multiplier,
        None => base,
    };
    if let Some(precision) = map.round {
        amount = AmountRounding::to_scale(amount, precision);
    }

    let entry = outcome
        .field_values
        .entry(map.target.clone())
        .or_insert(Decimal::ZERO);
    *entry += amount;

    outcome.mappings.push(MappingRecord {
        tax_event_id: event.id,
        tax_year: event.tax_year,
        logical_field: map.target.clone(),
        amount,
        rule_id: rule.id,
    });
    Ok(())
}

fn lookup_metadata(metadata: &serde_json::Value, path: &str) -> Option<serde_json::Value> {
    let mut current = metadata;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current.clone())
}

fn sum_fields(values: &BTreeMap<String, Decimal>, group: &[&str]) -> Decimal {
    group
        .iter()
        .filter_map(|code| values.get(*code))
        .copied()
        .sum()
}

/// Sets a subtotal only when it is positive and no earlier rule already
/// produced the field.
fn set_subtotal(values: &mut BTreeMap<String, Decimal>, code: &str, value: Decimal) {
    if value > Decimal::ZERO && !values.contains_key(code) {
        values.insert(code.to_string(), value);
    }
}

fn apply_base_totals(values: &mut BTreeMap<String, Decimal>) {
    let property = sum_fields(values, &fields::PROPERTY_FIELDS);
    set_subtotal(values, fields::INCOME_PROPERTY_TOTAL, property);

    let foreign = sum_fields(values, &fields::FOREIGN_FIELDS);
    set_subtotal(values, fields::INCOME_FOREIGN_TOTAL, foreign);

    let deductions = sum_fields(values, &fields::DEDUCTION_FIELDS);
    set_subtotal(values, fields::DEDUCTION_TOTAL, deductions);

    let adjustments = sum_fields(values, &fields::ADJUSTMENT_FIELDS);
    set_subtotal(values, fields::ADJUSTMENT_TOTAL, adjustments);

    // Primary categories include the property and foreign subtotals, so
    // this sum must come after they are settled.
    let income = sum_fields(values, &fields::PRIMARY_INCOME_FIELDS);
    set_subtotal(values, fields::INCOME_TOTAL, income);
}

fn get(values: &BTreeMap<String, Decimal>, code: &str) -> Decimal {
    values.get(code).copied().unwrap_or(Decimal::ZERO)
}

/// Writes a derived total unless a calculation rule already produced a
/// non-zero value for it.
fn set_derived(values: &mut BTreeMap<String, Decimal>, code: &str, value: Decimal) {
    let current = values.get(code).copied().unwrap_or(Decimal::ZERO);
    if current.is_zero() {
        values.insert(code.to_string(), value);
    }
}

fn apply_derived_totals(values: &mut BTreeMap<String, Decimal>) {
    let taxable = (get(values, fields::INCOME_TOTAL)
        - get(values, fields::ADJUSTMENT_TOTAL)
        - get(values, fields::DEDUCTION_TOTAL))
    .max(Decimal::ZERO);
    set_derived(values, fields::TAXABLE_INCOME, taxable);

    let ipn = AmountRounding::to_whole(get(values, fields::TAXABLE_INCOME) * IPN_RATE);
    set_derived(values, fields::IPN_CALCULATED, ipn);

    let payable = (get(values, fields::IPN_CALCULATED)
        - get(values, fields::FOREIGN_TAX_CREDIT_GENERAL)
        - get(values, fields::FOREIGN_TAX_CREDIT_CFC))
    .max(Decimal::ZERO);
    set_derived(values, fields::IPN_PAYABLE, payable);
}

fn apply_auto_flags(values: &BTreeMap<String, Decimal>, flags: &mut BTreeMap<String, bool>) {
    let positive = |code: &str| get(values, code) > Decimal::ZERO;

    if positive(fields::INCOME_TOTAL) {
        flags.insert("has_income".to_string(), true);
    }
    if positive(fields::INCOME_FOREIGN_TOTAL) {
        flags.insert("has_foreign_income".to_string(), true);
        flags.insert("pril_2".to_string(), true);
    }
    if positive(fields::CFC_PROFIT) {
        flags.insert("has_cfc".to_string(), true);
        flags.insert("pril_3".to_string(), true);
    }
    if positive(fields::DEDUCTION_TOTAL) {
        flags.insert("has_deductions".to_string(), true);
    }
    if positive(fields::INCOME_PROPERTY_TOTAL)
        || positive(fields::INCOME_RENT_NON_AGENT)
        || positive(fields::INCOME_OTHER_NON_AGENT)
    {
        flags.insert("pril_1".to_string(), true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::seed;
    use chrono::NaiveDate;
    use serde_json::json;

    fn vocabulary() -> Vocabulary {
        seed::vocabulary()
    }

    fn event(event_type: &str, date: (i32, u32, u32), amount: i64) -> TaxEvent {
        let event_date = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
        TaxEvent {
            id: Uuid::new_v4(),
            taxpayer_id: Uuid::new_v4(),
            source_record_id: None,
            event_type: event_type.to_string(),
            event_date,
            amount: Some(Decimal::new(amount, 0)),
            currency: Some("KZT".to_string()),
            metadata: json!({}),
            tax_year: event_date.year(),
            active: true,
            created_at: chrono::Utc::now(),
        }
    }

    use chrono::Datelike;

    fn options(year: i32) -> RunOptions {
        RunOptions { tax_year: year, allow_empty: false }
    }

    #[test]
    fn test_empty_run_requires_allow_empty() {
        let rules = seed::rules();
        let err = run(&[], &rules, &vocabulary(), &options(2024)).unwrap_err();
        assert!(matches!(err, ServiceError::Unprocessable(_)));

        let opts = RunOptions { tax_year: 2024, allow_empty: true };
        let outcome = run(&[], &rules, &vocabulary(), &opts).unwrap();
        assert!(outcome.field_values.is_empty() || outcome.field_values.values().all(|v| v.is_zero()));
    }

    #[test]
    fn test_unknown_event_type_is_structural() {
        let events = vec![event("EV_TIME_TRAVEL", (2024, 6, 15), 1)];
        let err = run(&events, &seed::rules(), &vocabulary(), &options(2024)).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn test_mapping_accumulates_and_records() {
        let events = vec![
            event("EV_FOREIGN_DIVIDENDS", (2024, 6, 15), 300_000),
            event("EV_FOREIGN_DIVIDENDS", (2024, 7, 1), 200_000),
        ];
        let outcome = run(&events, &seed::rules(), &vocabulary(), &options(2024)).unwrap();
        assert_eq!(
            outcome.field_values.get(fields::INCOME_FOREIGN_DIVIDENDS),
            Some(&Decimal::new(500_000, 0))
        );
        assert_eq!(outcome.mappings.len(), 2);
        assert_eq!(outcome.stats.mappings_created, 2);
        assert_eq!(outcome.stats.events_processed, 2);
    }

    #[test]
    fn test_exclusion_removes_event_contribution() {
        let excluded = event("EV_FOREIGN_DIVIDENDS", (2024, 6, 15), 300_000);
        let kept = event("EV_FOREIGN_DIVIDENDS", (2024, 7, 1), 200_000);
        let mut rules = seed::rules();
        rules.push(seed::rule(
            "EXCL_SMALL",
            RuleKind::Exclusion,
            10,
            json!({"amount": {"gte": 300000}}),
            json!([{"action": "exclude"}]),
        ));

        let outcome = run(
            &[excluded.clone(), kept],
            &rules,
            &vocabulary(),
            &options(2024),
        )
        .unwrap();

        assert!(outcome.excluded_event_ids.contains(&excluded.id));
        assert_eq!(
            outcome.field_values.get(fields::INCOME_FOREIGN_DIVIDENDS),
            Some(&Decimal::new(200_000, 0))
        );
        assert_eq!(outcome.stats.events_excluded, 1);
        assert!(outcome
            .mappings
            .iter()
            .all(|m| m.tax_event_id != excluded.id));
    }

    #[test]
    fn test_calculation_rule_overwrites_field() {
        let events = vec![event("EV_WINNINGS", (2024, 3, 1), 100_000)];
        let mut rules = seed::rules();
        rules.push(seed::rule(
            "CALC_DOUBLE_WINNINGS",
            RuleKind::Calculation,
            500,
            json!({"always": true}),
            json!([{
                "action": "calc",
                "target": "LF_INCOME_WINNINGS",
                "formula": {"op": "mul", "a": {"ref": "LF_INCOME_WINNINGS"}, "b": 2}
            }]),
        ));

        let outcome = run(&events, &rules, &vocabulary(), &options(2024)).unwrap();
        assert_eq!(
            outcome.field_values.get(fields::INCOME_WINNINGS),
            Some(&Decimal::new(200_000, 0))
        );
        assert_eq!(outcome.calculations.len(), 1);
    }

    #[test]
    fn test_rule_error_is_non_fatal() {
        let mut no_amount = event("EV_WINNINGS", (2024, 3, 1), 0);
        no_amount.amount = None;
        let fine = event("EV_WINNINGS", (2024, 4, 1), 50_000);

        let outcome = run(
            &[no_amount, fine],
            &seed::rules(),
            &vocabulary(),
            &options(2024),
        )
        .unwrap();

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(
            outcome.field_values.get(fields::INCOME_WINNINGS),
            Some(&Decimal::new(50_000, 0))
        );
    }

    #[test]
    fn test_flag_rule_matches_field_values() {
        let events = vec![event("EV_FOREIGN_DIVIDENDS", (2024, 6, 15), 500_000)];
        let mut rules = seed::rules();
        rules.push(seed::rule(
            "FLAG_BIG_INCOME",
            RuleKind::Flag,
            900,
            json!({"LF_INCOME_TOTAL": {"gte": 100000}}),
            json!([{"action": "flag", "set": {"large_income": true}}]),
        ));

        let outcome = run(&events, &rules, &vocabulary(), &options(2024)).unwrap();
        assert_eq!(outcome.flags.get("large_income"), Some(&true));
    }

    #[test]
    fn test_year_scoped_rule_is_ignored_for_other_years() {
        let events = vec![event("EV_WINNINGS", (2024, 3, 1), 100_000)];
        let mut rules = seed::rules();
        let mut scoped = seed::rule(
            "CALC_2023_ONLY",
            RuleKind::Calculation,
            500,
            json!({"always": true}),
            json!([{
                "action": "calc",
                "target": "LF_INCOME_WINNINGS",
                "formula": "MUL(LF_INCOME_WINNINGS, 0)"
            }]),
        );
        scoped.tax_year = Some(2023);
        rules.push(scoped);

        let outcome = run(&events, &rules, &vocabulary(), &options(2024)).unwrap();
        assert_eq!(
            outcome.field_values.get(fields::INCOME_WINNINGS),
            Some(&Decimal::new(100_000, 0))
        );
    }

    #[test]
    fn test_determinism_across_runs() {
        let events = vec![
            event("EV_PROPERTY_SALE_KZ", (2024, 8, 20), 1_000_000),
            event("EV_DEDUCTION_STANDARD", (2024, 3, 1), 200_000),
            event("EV_FOREIGN_DIVIDENDS", (2024, 6, 15), 500_000),
        ];
        let rules = seed::rules();

        let first = run(&events, &rules, &vocabulary(), &options(2024)).unwrap();
        let second = run(&events, &rules, &vocabulary(), &options(2024)).unwrap();

        assert_eq!(first.field_values, second.field_values);
        assert_eq!(first.flags, second.flags);
        assert_eq!(
            serde_json::to_string(&first.mappings).unwrap(),
            serde_json::to_string(&second.mappings).unwrap()
        );
    }

    #[test]
    fn test_derived_totals_and_auto_flags() {
        let events = vec![
            event("EV_PROPERTY_SALE_KZ", (2024, 8, 20), 1_000_000),
            event("EV_DEDUCTION_STANDARD", (2024, 3, 1), 200_000),
        ];
        let outcome = run(&events, &seed::rules(), &vocabulary(), &options(2024)).unwrap();

        assert_eq!(get(&outcome.field_values, fields::INCOME_PROPERTY_TOTAL), Decimal::new(1_000_000, 0));
        assert_eq!(get(&outcome.field_values, fields::DEDUCTION_TOTAL), Decimal::new(200_000, 0));
        assert_eq!(get(&outcome.field_values, fields::TAXABLE_INCOME), Decimal::new(800_000, 0));
        assert_eq!(get(&outcome.field_values, fields::IPN_CALCULATED), Decimal::new(80_000, 0));
        assert_eq!(outcome.flags.get("pril_1"), Some(&true));
        assert_eq!(outcome.flags.get("has_income"), Some(&true));
        assert_eq!(outcome.flags.get("has_deductions"), Some(&true));
        assert_eq!(outcome.flags.get("pril_2"), None);
    }
}
