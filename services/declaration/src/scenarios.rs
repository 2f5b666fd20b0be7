//! End-to-end scenarios over the pure pipeline: parse → run → project.
//! These pin down the arithmetic of the standard catalog and the
//! determinism of the serialized form.

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::catalog::{fields, seed};
use crate::engine::{self, RunOptions, RunOutcome};
use crate::models::{
    Declaration, DeclarationHeader, DeclarationKind, DeclarationStatus, SourceKind, SourceRecord,
    TaxEvent, FORM_270,
};
use crate::parsers::{parser_for, SourceParser};
use crate::workflow;
use crate::xml;

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
        created_at: Utc::now(),
    }
}

fn run(events: &[TaxEvent]) -> RunOutcome {
    engine::run(
        events,
        &seed::rules(),
        &seed::vocabulary(),
        &RunOptions { tax_year: 2024, allow_empty: false },
    )
    .unwrap()
}

fn amount(outcome: &RunOutcome, code: &str) -> Decimal {
    outcome
        .field_values
        .get(code)
        .copied()
        .unwrap_or(Decimal::ZERO)
}

fn declaration(flags: &BTreeMap<String, bool>) -> Declaration {
    Declaration {
        id: Uuid::new_v4(),
        taxpayer_id: Uuid::new_v4(),
        tax_year: 2024,
        form_code: FORM_270.to_string(),
        kind: DeclarationKind::Main,
        status: DeclarationStatus::Validated,
        header: DeclarationHeader {
            iin: "850615300123".to_string(),
            last_name: "Akhmetova".to_string(),
            first_name: "Aliya".to_string(),
            middle_name: Some("Bulatovna".to_string()),
            phone: Some("+77011234567".to_string()),
            email: Some("aliya@example.kz".to_string()),
            spouse_iin: None,
            legal_rep_iin: None,
        },
        flags: flags.clone(),
        validated_at: None,
        exported_at: None,
        created_at: Utc.with_ymd_and_hms(2025, 2, 10, 9, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2025, 2, 10, 9, 0, 0).unwrap(),
    }
}

#[test]
fn scenario_foreign_dividends_only() {
    let outcome = run(&[event("EV_FOREIGN_DIVIDENDS", (2024, 6, 15), 500_000)]);

    assert_eq!(amount(&outcome, fields::INCOME_FOREIGN_DIVIDENDS), Decimal::new(500_000, 0));
    assert_eq!(amount(&outcome, fields::INCOME_FOREIGN_TOTAL), Decimal::new(500_000, 0));
    assert_eq!(amount(&outcome, fields::INCOME_TOTAL), Decimal::new(500_000, 0));
    assert_eq!(amount(&outcome, fields::TAXABLE_INCOME), Decimal::new(500_000, 0));
    assert_eq!(amount(&outcome, fields::IPN_CALCULATED), Decimal::new(50_000, 0));
    assert_eq!(amount(&outcome, fields::IPN_PAYABLE), Decimal::new(50_000, 0));

    for flag in ["has_income", "has_foreign_income", "pril_2"] {
        assert_eq!(outcome.flags.get(flag), Some(&true), "flag {}", flag);
    }
    assert_eq!(outcome.flags.get("pril_1"), None);
    assert_eq!(outcome.flags.get("has_cfc"), None);
}

#[test]
fn scenario_foreign_credit_wipes_ipn() {
    let outcome = run(&[
        event("EV_FOREIGN_DIVIDENDS", (2024, 6, 15), 500_000),
        event("EV_FOREIGN_TAX_PAID_GENERAL", (2024, 6, 15), 50_000),
    ]);

    assert_eq!(amount(&outcome, fields::FOREIGN_TAX_CREDIT_GENERAL), Decimal::new(50_000, 0));
    assert_eq!(amount(&outcome, fields::IPN_CALCULATED), Decimal::new(50_000, 0));
    assert_eq!(amount(&outcome, fields::IPN_PAYABLE), Decimal::ZERO);
}

#[test]
fn scenario_property_sale_with_deduction() {
    let outcome = run(&[
        event("EV_PROPERTY_SALE_KZ", (2024, 8, 20), 1_000_000),
        event("EV_DEDUCTION_STANDARD", (2024, 3, 1), 200_000),
    ]);

    assert_eq!(amount(&outcome, fields::INCOME_PROPERTY_KZ), Decimal::new(1_000_000, 0));
    assert_eq!(amount(&outcome, fields::INCOME_PROPERTY_TOTAL), Decimal::new(1_000_000, 0));
    assert_eq!(amount(&outcome, fields::DEDUCTION_STANDARD), Decimal::new(200_000, 0));
    assert_eq!(amount(&outcome, fields::DEDUCTION_TOTAL), Decimal::new(200_000, 0));
    assert_eq!(amount(&outcome, fields::TAXABLE_INCOME), Decimal::new(800_000, 0));
    assert_eq!(amount(&outcome, fields::IPN_CALCULATED), Decimal::new(80_000, 0));
    assert_eq!(outcome.flags.get("pril_1"), Some(&true));
}

#[test]
fn scenario_regeneration_is_byte_identical() {
    let events = [
        event("EV_PROPERTY_SALE_KZ", (2024, 8, 20), 1_000_000),
        event("EV_DEDUCTION_STANDARD", (2024, 3, 1), 200_000),
    ];
    let layout = seed::xml_field_maps();

    let first_run = run(&events);
    let second_run = run(&events);
    assert_eq!(first_run.field_values, second_run.field_values);

    let declaration = declaration(&first_run.flags);
    let first_xml = xml::project(&declaration, &first_run.field_values, &layout);
    let second_xml = xml::project(&declaration, &second_run.field_values, &layout);

    assert_eq!(first_xml, second_xml);
    assert_eq!(xml::content_hash(&first_xml), xml::content_hash(&second_xml));
}

#[test]
fn scenario_projected_form_carries_computed_cells() {
    let outcome = run(&[event("EV_FOREIGN_DIVIDENDS", (2024, 6, 15), 500_000)]);
    let declaration = declaration(&outcome.flags);
    let document = xml::project(&declaration, &outcome.field_values, &seed::xml_field_maps());

    assert!(xml::structural_check(&document));
    // income total, foreign detail and the appendix flag all land in the form
    assert!(document.contains("<field name=\"field_270_01_D\">500000</field>"));
    assert!(document.contains("<field name=\"field_270_01_C\">500000</field>"));
    assert!(document.contains("<field name=\"field_270_02_A\">500000</field>"));
    assert!(document.contains("<field name=\"pril_2\">1</field>"));
    assert!(document.contains("<field name=\"pril_3\"/>"));
}

#[test]
fn scenario_validation_gate_accepts_engine_output() {
    let outcome = run(&[event("EV_FOREIGN_DIVIDENDS", (2024, 6, 15), 500_000)]);
    let gate = workflow::business_validation(&outcome.field_values);
    assert!(gate.is_valid, "{}", gate.report);
}

#[test]
fn scenario_ingest_checksum_is_stable() {
    // same manual payload, different key order: one checksum, one parse
    let first = json!({"event_type": "EV_WINNINGS", "event_date": "2024-03-01", "amount": "100000"});
    let second = json!({"amount": "100000", "event_date": "2024-03-01", "event_type": "EV_WINNINGS"});
    assert_eq!(utils::payload_checksum(&first), utils::payload_checksum(&second));

    let record = SourceRecord {
        id: Uuid::new_v4(),
        taxpayer_id: Uuid::new_v4(),
        source_kind: SourceKind::Manual,
        external_id: None,
        checksum: utils::payload_checksum(&first),
        raw_payload: first,
        imported_at: Utc::now(),
        active: true,
    };
    let parser = parser_for(SourceKind::Manual);
    let once = parser.parse(&record).unwrap();
    let twice = parser.parse(&record).unwrap();
    assert_eq!(once.len(), twice.len());
    assert_eq!(once[0].event_type, twice[0].event_type);
    assert_eq!(once[0].amount, twice[0].amount);
}

#[test]
fn invariant_totals_are_consistent() {
    let outcome = run(&[
        event("EV_PROPERTY_SALE_KZ", (2024, 1, 10), 1_000_000),
        event("EV_PROPERTY_SALE_VEHICLE", (2024, 2, 11), 700_000),
        event("EV_RENT_INCOME", (2024, 3, 12), 300_000),
        event("EV_FOREIGN_DIVIDENDS", (2024, 4, 13), 500_000),
        event("EV_FOREIGN_INTEREST", (2024, 5, 14), 120_000),
        event("EV_WINNINGS", (2024, 6, 15), 80_000),
        event("EV_CFC_PROFIT", (2024, 7, 16), 250_000),
        event("EV_DEDUCTION_STANDARD", (2024, 8, 17), 200_000),
        event("EV_ADJUSTMENT_EXEMPT", (2024, 9, 18), 90_000),
    ]);

    let primary_sum: Decimal = fields::PRIMARY_INCOME_FIELDS
        .iter()
        .map(|code| amount(&outcome, code))
        .sum();
    assert_eq!(amount(&outcome, fields::INCOME_TOTAL), primary_sum);

    let foreign_sum: Decimal = fields::FOREIGN_FIELDS
        .iter()
        .map(|code| amount(&outcome, code))
        .sum();
    assert_eq!(amount(&outcome, fields::INCOME_FOREIGN_TOTAL), foreign_sum);

    let taxable = amount(&outcome, fields::TAXABLE_INCOME);
    assert!(taxable >= Decimal::ZERO);
    assert_eq!(
        taxable,
        amount(&outcome, fields::INCOME_TOTAL)
            - amount(&outcome, fields::ADJUSTMENT_TOTAL)
            - amount(&outcome, fields::DEDUCTION_TOTAL)
    );
    assert_eq!(
        amount(&outcome, fields::IPN_CALCULATED),
        utils::AmountRounding::to_whole(taxable * Decimal::new(10, 2))
    );

    let payable = amount(&outcome, fields::IPN_PAYABLE);
    let credited = amount(&outcome, fields::IPN_CALCULATED)
        - amount(&outcome, fields::FOREIGN_TAX_CREDIT_GENERAL)
        - amount(&outcome, fields::FOREIGN_TAX_CREDIT_CFC);
    assert_eq!(payable, credited.max(Decimal::ZERO));

    for flag in ["has_income", "has_foreign_income", "has_cfc", "has_deductions", "pril_1", "pril_2", "pril_3"] {
        assert_eq!(outcome.flags.get(flag), Some(&true), "flag {}", flag);
    }
}

#[test]
fn invariant_excluded_events_contribute_nothing() {
    let noise = event("EV_WINNINGS", (2024, 5, 5), 999_999);
    let mut rules = seed::rules();
    rules.push(seed::rule(
        "EXCL_WINNINGS",
        crate::models::RuleKind::Exclusion,
        5,
        json!({"event_type": {"eq": "EV_WINNINGS"}}),
        json!([{"action": "exclude"}]),
    ));

    let outcome = engine::run(
        &[noise.clone(), event("EV_RENT_INCOME", (2024, 5, 6), 100_000)],
        &rules,
        &seed::vocabulary(),
        &RunOptions { tax_year: 2024, allow_empty: false },
    )
    .unwrap();

    assert!(outcome.excluded_event_ids.contains(&noise.id));
    assert_eq!(amount(&outcome, fields::INCOME_WINNINGS), Decimal::ZERO);
    assert_eq!(amount(&outcome, fields::INCOME_TOTAL), Decimal::new(100_000, 0));
}

#[test]
fn invariant_projection_renders_half_up_integers() {
    let mut values = BTreeMap::new();
    values.insert(fields::INCOME_TOTAL.to_string(), Decimal::new(1234567_49, 2)); // 1234567.49
    values.insert(fields::TAXABLE_INCOME.to_string(), Decimal::new(1234567_50, 2)); // 1234567.50
    values.insert(fields::IPN_CALCULATED.to_string(), Decimal::new(123_457, 0));

    let declaration = declaration(&BTreeMap::new());
    let document = xml::project(&declaration, &values, &seed::xml_field_maps());
    assert!(document.contains("<field name=\"field_270_01_D\">1234567</field>"));
    assert!(document.contains("<field name=\"field_270_01_G\">1234568</field>"));
}
