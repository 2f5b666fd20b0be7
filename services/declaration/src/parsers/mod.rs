//! Source payload parsers. One parser per source kind, selected by
//! [`parser_for`]; each turns one source record into a normalized event
//! sequence and never touches the store. Payload shapes are schema-free:
//! fields are discovered by name through ranked, case-insensitive alias
//! lists.

pub mod accounting;
pub mod api;
pub mod bank;
pub mod manual;
pub mod tabular;
pub mod upload;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use common::{ServiceError, ServiceResult};
use utils::{AmountParser, CurrencyNormalizer, DateNormalizer};

use crate::models::{SourceKind, SourceRecord, TaxEventInput};

pub trait SourceParser: Send + Sync {
    fn parse(&self, record: &SourceRecord) -> ServiceResult<Vec<TaxEventInput>>;
}

pub fn parser_for(kind: SourceKind) -> &'static dyn SourceParser {
    match kind {
        SourceKind::Manual => &manual::ManualParser,
        SourceKind::Csv => &tabular::CsvParser,
        SourceKind::Excel => &tabular::ExcelParser,
        SourceKind::Bank => &bank::BankParser,
        SourceKind::Accounting => &accounting::AccountingParser,
        SourceKind::Api => &api::ApiParser,
    }
}

pub(crate) fn parse_error(index: usize, message: impl Into<String>) -> ServiceError {
    ServiceError::Parse(format!("record {}: {}", index, message.into()))
}

/// Ranked, case-insensitive field lookup. Earlier aliases win; null
/// values count as absent.
pub(crate) fn lookup<'a>(obj: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    for alias in aliases {
        for (key, value) in obj {
            if key.eq_ignore_ascii_case(alias) && !value.is_null() {
                return Some(value);
            }
        }
    }
    None
}

pub(crate) fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn amount_of(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => AmountParser::parse(&n.to_string()),
        Value::String(s) => AmountParser::parse(s),
        _ => None,
    }
}

pub(crate) const DATE_ALIASES: [&str; 6] =
    ["event_date", "date", "operation_date", "value_date", "дата", "timestamp"];
pub(crate) const AMOUNT_ALIASES: [&str; 5] = ["amount", "sum", "value", "total", "сумма"];
pub(crate) const CURRENCY_ALIASES: [&str; 3] = ["currency", "currency_code", "валюта"];
pub(crate) const DESCRIPTION_ALIASES: [&str; 5] =
    ["description", "purpose", "details", "назначение", "наименование"];

pub(crate) fn required_date(
    obj: &Map<String, Value>,
    index: usize,
) -> ServiceResult<NaiveDate> {
    let raw = lookup(obj, &DATE_ALIASES)
        .and_then(text)
        .ok_or_else(|| parse_error(index, "missing event_date"))?;
    DateNormalizer::parse(&raw)
        .ok_or_else(|| parse_error(index, format!("unparseable date: {}", raw)))
}

pub(crate) fn optional_amount(
    obj: &Map<String, Value>,
    index: usize,
) -> ServiceResult<Option<Decimal>> {
    match lookup(obj, &AMOUNT_ALIASES) {
        None => Ok(None),
        Some(value) => amount_of(value)
            .map(Some)
            .ok_or_else(|| parse_error(index, format!("unparseable amount: {}", value))),
    }
}

pub(crate) fn normalized_currency(obj: &Map<String, Value>) -> String {
    let raw = lookup(obj, &CURRENCY_ALIASES).and_then(text);
    CurrencyNormalizer::normalize(raw.as_deref())
}

/// Remaining payload fields carried over as event metadata. Consumed
/// column names (and their aliases) are dropped.
pub(crate) fn metadata_from(obj: &Map<String, Value>, consumed: &[&str]) -> Value {
    let mut metadata = Map::new();
    for (key, value) in obj {
        let is_consumed = consumed
            .iter()
            .any(|name| key.eq_ignore_ascii_case(name));
        if !is_consumed && !value.is_null() {
            metadata.insert(key.clone(), value.clone());
        }
    }
    Value::Object(metadata)
}

/// Event type inference from free description text, shared by the
/// tabular, bank and accounting parsers.
pub(crate) fn infer_event_type(description: &str) -> &'static str {
    let lower = description.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

    if has(&["rent", "аренд", "найм"]) {
        "EV_RENT_INCOME"
    } else if has(&["недвиж", "property", "квартир", "дом ", "участок"]) {
        "EV_PROPERTY_SALE_KZ"
    } else if has(&["swift", "из-за рубеж", "foreign transfer", "зарубеж", "перевод из"]) {
        "EV_FOREIGN_OTHER"
    } else if has(&["дивиден", "dividend"]) {
        "EV_DIVIDENDS_NON_AGENT"
    } else if has(&["выигрыш", "лотере", "lottery", "winning"]) {
        "EV_WINNINGS"
    } else if has(&["процент", "вознаграждение", "interest", "купон"]) {
        "EV_INTEREST_NON_AGENT"
    } else if has(&["услуг", "service", "консультац"]) {
        "EV_SERVICE_NON_AGENT"
    } else {
        "EV_OTHER_NON_AGENT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_lookup_is_case_insensitive_and_ranked() {
        let row = obj(json!({"Amount": "10", "SUM": "20"}));
        let found = lookup(&row, &["amount", "sum"]).unwrap();
        assert_eq!(found, &json!("10"));
    }

    #[test]
    fn test_lookup_skips_null() {
        let row = obj(json!({"amount": null, "sum": "20"}));
        let found = lookup(&row, &["amount", "sum"]).unwrap();
        assert_eq!(found, &json!("20"));
    }

    #[test]
    fn test_required_date_accepts_all_formats() {
        for raw in ["2024-06-15", "15.06.2024", "15/06/2024"] {
            let row = obj(json!({"date": raw}));
            assert_eq!(
                required_date(&row, 0).unwrap(),
                chrono::NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
            );
        }
    }

    #[test]
    fn test_missing_date_is_parse_error() {
        let row = obj(json!({"amount": "10"}));
        assert!(matches!(required_date(&row, 3), Err(ServiceError::Parse(_))));
    }

    #[test]
    fn test_metadata_excludes_consumed_columns() {
        let row = obj(json!({"date": "2024-01-01", "amount": "5", "country": "DE"}));
        let metadata = metadata_from(&row, &["date", "amount"]);
        assert_eq!(metadata, json!({"country": "DE"}));
    }

    #[test]
    fn test_infer_event_type_keywords() {
        assert_eq!(infer_event_type("Аренда квартиры за июнь"), "EV_RENT_INCOME");
        assert_eq!(infer_event_type("SWIFT transfer from abroad"), "EV_FOREIGN_OTHER");
        assert_eq!(infer_event_type("Дивиденды АО КазМунайГаз"), "EV_DIVIDENDS_NON_AGENT");
        assert_eq!(infer_event_type("просто платеж"), "EV_OTHER_NON_AGENT");
    }
}
