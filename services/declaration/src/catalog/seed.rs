//! Seed vocabulary for form 270.00: event types, logical fields, the
//! standard mapping rules connecting them, and the XML field layout of
//! the form and its appendices. Loaded into the reference tables on
//! first start; tests run against it directly.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::catalog::fields;
use crate::engine::Vocabulary;
use crate::models::{EventTypeCode, LogicalField, RuleKind, TaxRule, XmlFieldMap};

/// Event type → target logical field for the standard mapping rules.
/// Order defines rule priority within the mapping phase.
const MAPPING_PAIRS: [(&str, &str); 30] = [
    ("EV_PROPERTY_SALE_KZ", fields::INCOME_PROPERTY_KZ),
    ("EV_PROPERTY_SALE_ABROAD", fields::INCOME_PROPERTY_ABROAD),
    ("EV_PROPERTY_SALE_VEHICLE", fields::INCOME_PROPERTY_VEHICLE),
    ("EV_RENT_INCOME", fields::INCOME_RENT_NON_AGENT),
    ("EV_ASSIGNMENT_INCOME", fields::INCOME_ASSIGNMENT),
    ("EV_IP_ASSET_SALE", fields::INCOME_IP_OTHER_ASSETS),
    ("EV_FOREIGN_DIVIDENDS", fields::INCOME_FOREIGN_DIVIDENDS),
    ("EV_FOREIGN_INTEREST", fields::INCOME_FOREIGN_INTEREST),
    ("EV_FOREIGN_ROYALTY", fields::INCOME_FOREIGN_ROYALTY),
    ("EV_FOREIGN_EMPLOYMENT", fields::INCOME_FOREIGN_EMPLOYMENT),
    ("EV_FOREIGN_CAPITAL_GAINS", fields::INCOME_FOREIGN_CAPITAL_GAINS),
    ("EV_FOREIGN_RENT", fields::INCOME_FOREIGN_RENT),
    ("EV_FOREIGN_PENSION", fields::INCOME_FOREIGN_PENSION),
    ("EV_FOREIGN_BUSINESS", fields::INCOME_FOREIGN_BUSINESS),
    ("EV_FOREIGN_OTHER", fields::INCOME_FOREIGN_OTHER),
    ("EV_EMPLOYMENT_NON_AGENT", fields::INCOME_EMPLOYMENT_NON_AGENT),
    ("EV_SERVICE_NON_AGENT", fields::INCOME_SERVICE_NON_AGENT),
    ("EV_WINNINGS", fields::INCOME_WINNINGS),
    ("EV_INTEREST_NON_AGENT", fields::INCOME_INTEREST_NON_AGENT),
    ("EV_DIVIDENDS_NON_AGENT", fields::INCOME_DIVIDENDS_NON_AGENT),
    ("EV_OTHER_NON_AGENT", fields::INCOME_OTHER_NON_AGENT),
    ("EV_CFC_PROFIT", fields::CFC_PROFIT),
    ("EV_DEDUCTION_STANDARD", fields::DEDUCTION_STANDARD),
    ("EV_DEDUCTION_OTHER", fields::DEDUCTION_OTHER),
    ("EV_ADJUSTMENT_EXEMPT", fields::ADJUSTMENT_EXEMPT),
    ("EV_ADJUSTMENT_NON_TAXABLE", fields::ADJUSTMENT_NON_TAXABLE),
    ("EV_ADJUSTMENT_CORRECTION", fields::ADJUSTMENT_CORRECTION),
    ("EV_ADJUSTMENT_OTHER", fields::ADJUSTMENT_OTHER),
    ("EV_FOREIGN_TAX_PAID_GENERAL", fields::FOREIGN_TAX_CREDIT_GENERAL),
    ("EV_FOREIGN_TAX_PAID_CFC", fields::FOREIGN_TAX_CREDIT_CFC),
];

/// Event types that carry appendix detail (assets and debts grids)
/// without contributing to any computed field.
const INFORMATIONAL_EVENT_TYPES: [&str; 2] = ["EV_ASSET_DECLARED", "EV_DEBT_DECLARED"];

/// Legacy `income_type` codes accepted by the manual parser. Codes not
/// listed here are rejected at parse time.
pub fn legacy_income_type(code: &str) -> Option<&'static str> {
    match code {
        "INCOME_DIVIDENDS_FOREIGN" => Some("EV_FOREIGN_DIVIDENDS"),
        "INCOME_INTEREST_FOREIGN" => Some("EV_FOREIGN_INTEREST"),
        "INCOME_SALARY_FOREIGN" => Some("EV_FOREIGN_EMPLOYMENT"),
        "INCOME_PROPERTY_SALE" => Some("EV_PROPERTY_SALE_KZ"),
        "INCOME_RENT" => Some("EV_RENT_INCOME"),
        "INCOME_WINNINGS" => Some("EV_WINNINGS"),
        "INCOME_OTHER" => Some("EV_OTHER_NON_AGENT"),
        _ => None,
    }
}

pub fn event_types() -> Vec<EventTypeCode> {
    let mut types: Vec<EventTypeCode> = MAPPING_PAIRS
        .iter()
        .map(|(code, _)| EventTypeCode {
            code: code.to_string(),
            description: describe_event_type(code),
        })
        .collect();
    for code in INFORMATIONAL_EVENT_TYPES {
        types.push(EventTypeCode {
            code: code.to_string(),
            description: describe_event_type(code),
        });
    }
    types
}

fn describe_event_type(code: &str) -> String {
    code.trim_start_matches("EV_")
        .replace('_', " ")
        .to_lowercase()
}

pub fn logical_fields() -> Vec<LogicalField> {
    let leaf = MAPPING_PAIRS.iter().map(|(_, field)| *field);
    let totals = [
        fields::INCOME_PROPERTY_TOTAL,
        fields::INCOME_FOREIGN_TOTAL,
        fields::DEDUCTION_TOTAL,
        fields::ADJUSTMENT_TOTAL,
        fields::INCOME_TOTAL,
        fields::TAXABLE_INCOME,
        fields::IPN_CALCULATED,
        fields::IPN_PAYABLE,
    ];
    leaf.chain(totals)
        .map(|code| LogicalField {
            code: code.to_string(),
            description: code.trim_start_matches("LF_").replace('_', " ").to_lowercase(),
        })
        .collect()
}

/// Builds one rule record. Seed rules are year-agnostic and active.
pub fn rule(
    rule_code: &str,
    kind: RuleKind,
    priority: i32,
    conditions: serde_json::Value,
    actions: serde_json::Value,
) -> TaxRule {
    TaxRule {
        id: Uuid::new_v4(),
        rule_code: rule_code.to_string(),
        tax_year: None,
        kind,
        conditions,
        actions,
        priority,
        active: true,
        created_at: Utc::now(),
    }
}

/// The standard rule set: one mapping rule per event type.
pub fn rules() -> Vec<TaxRule> {
    MAPPING_PAIRS
        .iter()
        .enumerate()
        .map(|(index, (event_type, target))| {
            let code = format!("MAP_{}", event_type.trim_start_matches("EV_"));
            rule(
                &code,
                RuleKind::Mapping,
                100 + (index as i32) * 10,
                json!({"event_type": {"eq": event_type}}),
                json!([{"action": "map", "target": target}]),
            )
        })
        .collect()
}

pub fn vocabulary() -> Vocabulary {
    Vocabulary {
        event_types: event_types().into_iter().map(|t| t.code).collect(),
        logical_fields: logical_fields().into_iter().map(|f| f.code).collect(),
    }
}

fn header_field(form: &str, sheet: &str, name: &str, position: i32) -> XmlFieldMap {
    XmlFieldMap {
        form_code: form.to_string(),
        application_code: sheet.to_string(),
        logical_field: None,
        xml_field_name: name.to_string(),
        position,
    }
}

fn mapped_field(form: &str, sheet: &str, name: &str, logical: &str, position: i32) -> XmlFieldMap {
    XmlFieldMap {
        form_code: form.to_string(),
        application_code: sheet.to_string(),
        logical_field: Some(logical.to_string()),
        xml_field_name: name.to_string(),
        position,
    }
}

/// The full field inventory of form 270.00 and appendices 270.01–270.07,
/// in emission order.
pub fn xml_field_maps() -> Vec<XmlFieldMap> {
    let mut maps = Vec::new();

    let header = "page_270_00_01";
    let header_names = [
        "iin",
        "period_year",
        "creation_date",
        "fio1",
        "fio2",
        "fio3",
        "email",
        "payer_phone_number",
        "dt_main",
        "dt_regular",
        "dt_additional",
        "dt_notice",
        "pril_1",
        "pril_2",
        "pril_3",
        "pril_4",
        "pril_5",
        "pril_6",
        "pril_7",
    ];
    for (position, name) in header_names.iter().enumerate() {
        maps.push(header_field("270.00", header, name, position as i32));
    }

    let computation = [
        ("field_270_01_A", fields::INCOME_PROPERTY_TOTAL),
        ("field_270_01_B", fields::INCOME_RENT_NON_AGENT),
        ("field_270_01_C", fields::INCOME_FOREIGN_TOTAL),
        ("field_270_01_D", fields::INCOME_TOTAL),
        ("field_270_01_E", fields::ADJUSTMENT_TOTAL),
        ("field_270_01_F", fields::DEDUCTION_TOTAL),
        ("field_270_01_G", fields::TAXABLE_INCOME),
        ("field_270_01_H", fields::IPN_CALCULATED),
        ("field_270_01_I", fields::FOREIGN_TAX_CREDIT_GENERAL),
        ("field_270_01_J", fields::FOREIGN_TAX_CREDIT_CFC),
        ("field_270_01_K", fields::IPN_PAYABLE),
    ];
    for (position, (name, logical)) in computation.iter().enumerate() {
        maps.push(mapped_field("270.01", "page_270_01_01", name, logical, position as i32));
    }

    let foreign_names = [
        "field_270_02_A",
        "field_270_02_B",
        "field_270_02_C",
        "field_270_02_D",
        "field_270_02_E",
        "field_270_02_F",
        "field_270_02_G",
        "field_270_02_H",
        "field_270_02_I",
    ];
    for (position, (name, logical)) in foreign_names.iter().zip(fields::FOREIGN_FIELDS).enumerate() {
        maps.push(mapped_field("270.02", "page_270_02_01", name, logical, position as i32));
    }

    maps.push(mapped_field("270.03", "page_270_03_01", "field_270_03_A", fields::CFC_PROFIT, 0));
    maps.push(mapped_field(
        "270.03",
        "page_270_03_01",
        "field_270_03_B",
        fields::FOREIGN_TAX_CREDIT_CFC,
        1,
    ));

    // Appendices 270.04–270.07 are fixed grids; rows without computed
    // counterparts are emitted as empty placeholders in declared order.
    for form_index in 4..=7 {
        let form = format!("270.0{}", form_index);
        let sheet = format!("page_270_0{}_01", form_index);
        let mut position = 0;
        for row in 1..=3 {
            for column in 1..=3 {
                let name = format!("field_270_0{}_R{}C{}", form_index, row, column);
                maps.push(header_field(&form, &sheet, &name, position));
                position += 1;
            }
        }
    }

    maps
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_every_mapping_target_is_a_seeded_field() {
        let known: BTreeSet<String> = logical_fields().into_iter().map(|f| f.code).collect();
        for (_, target) in MAPPING_PAIRS {
            assert!(known.contains(target), "unseeded target {}", target);
        }
    }

    #[test]
    fn test_rule_priorities_are_unique_and_ordered() {
        let rules = rules();
        let priorities: Vec<i32> = rules.iter().map(|r| r.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(priorities.len(), sorted.len());
    }

    #[test]
    fn test_codes_match_naming_conventions() {
        for event_type in event_types() {
            assert!(event_type.code.starts_with("EV_"), "{}", event_type.code);
        }
        for field in logical_fields() {
            assert!(field.code.starts_with("LF_"), "{}", field.code);
        }
    }

    #[test]
    fn test_xml_layout_positions_are_dense_per_sheet() {
        let maps = xml_field_maps();
        let mut by_sheet: std::collections::BTreeMap<(String, String), Vec<i32>> =
            std::collections::BTreeMap::new();
        for map in &maps {
            by_sheet
                .entry((map.form_code.clone(), map.application_code.clone()))
                .or_default()
                .push(map.position);
        }
        for ((form, sheet), positions) in by_sheet {
            for (expected, actual) in positions.iter().enumerate() {
                assert_eq!(*actual, expected as i32, "{} {}", form, sheet);
            }
        }
    }

    #[test]
    fn test_xml_names_unique_per_form_and_sheet() {
        let maps = xml_field_maps();
        let mut seen = BTreeSet::new();
        for map in &maps {
            assert!(
                seen.insert((map.form_code.clone(), map.application_code.clone(), map.xml_field_name.clone())),
                "duplicate xml field {}",
                map.xml_field_name
            );
        }
    }

    #[test]
    fn test_legacy_aliases_resolve_to_seeded_types() {
        let known: BTreeSet<String> = event_types().into_iter().map(|t| t.code).collect();
        for legacy in [
            "INCOME_DIVIDENDS_FOREIGN",
            "INCOME_PROPERTY_SALE",
            "INCOME_RENT",
            "INCOME_WINNINGS",
        ] {
            let resolved = legacy_income_type(legacy).unwrap();
            assert!(known.contains(resolved));
        }
        assert_eq!(legacy_income_type("INCOME_UNKNOWN"), None);
    }
}
