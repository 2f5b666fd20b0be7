//! Predicate evaluation for rule conditions. The same condition grammar
//! is matched against a tax event (exclusion/mapping rules) or against
//! the computed field map (flag rules); only the attribute resolver
//! differs. Unknown operators never match and missing metadata paths
//! resolve to null, so a bad predicate disables its rule instead of
//! failing the run.

use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::models::TaxEvent;

/// Matches rule conditions against a single tax event.
pub fn match_event(conditions: &Value, event: &TaxEvent) -> bool {
    matches(conditions, &|name| resolve_event_attr(event, name))
}

/// Matches rule conditions against the computed logical-field map.
pub fn match_fields(conditions: &Value, fields: &BTreeMap<String, Decimal>) -> bool {
    matches(conditions, &|name| {
        fields
            .get(name)
            .map(|value| Value::String(value.to_string()))
    })
}

fn matches(conditions: &Value, resolve: &dyn Fn(&str) -> Option<Value>) -> bool {
    let Some(obj) = conditions.as_object() else {
        return false;
    };

    if let Some(always) = obj.get("always") {
        return always.as_bool().unwrap_or(false);
    }

    if let Some(all) = obj.get("all") {
        return match all.as_array() {
            Some(subs) => subs.iter().all(|sub| matches(sub, resolve)),
            None => false,
        };
    }

    if let Some(any) = obj.get("any") {
        return match any.as_array() {
            Some(subs) => subs.iter().any(|sub| matches(sub, resolve)),
            None => false,
        };
    }

    // Explicit triple: { "field": ..., "op": ..., "value": ... }
    if let (Some(field), Some(op)) = (
        obj.get("field").and_then(Value::as_str),
        obj.get("op").and_then(Value::as_str),
    ) {
        return compare(op, resolve(field).as_ref(), obj.get("value"));
    }

    // Compact form: { name: { op: value, ... }, ... } — implicit AND
    // across names and across operators under one name.
    obj.iter().all(|(name, spec)| {
        let Some(ops) = spec.as_object() else {
            return false;
        };
        let actual = resolve(name);
        ops.iter()
            .all(|(op, expected)| compare(op, actual.as_ref(), Some(expected)))
    })
}

/// Attribute lookup on an event. Accepts the `event.`-prefixed names and
/// auto-prefixes bare ones.
fn resolve_event_attr(event: &TaxEvent, name: &str) -> Option<Value> {
    let attr = name.strip_prefix("event.").unwrap_or(name);

    if let Some(path) = attr.strip_prefix("metadata.") {
        return metadata_path(&event.metadata, path);
    }

    match attr {
        "event_type" | "type" => Some(Value::String(event.event_type.clone())),
        "amount" => event.amount.map(|a| Value::String(a.to_string())),
        "currency" => event.currency.clone().map(Value::String),
        "event_date" | "date" => Some(Value::String(event.event_date.format("%Y-%m-%d").to_string())),
        "tax_year" => Some(Value::from(event.tax_year)),
        "id" => Some(Value::String(event.id.to_string())),
        "source_record_id" => event.source_record_id.map(|id| Value::String(id.to_string())),
        _ => None,
    }
}

/// Dotted lookup into the metadata map; a missing segment yields None.
fn metadata_path(metadata: &Value, path: &str) -> Option<Value> {
    let mut current = metadata;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current.clone())
    }
}

fn compare(op: &str, actual: Option<&Value>, expected: Option<&Value>) -> bool {
    match op {
        "exists" => actual.is_some(),
        "not_exists" => actual.is_none(),
        "=" | "eq" => values_equal(actual, expected),
        "!=" | "neq" => !values_equal(actual, expected),
        "in" => set_contains(expected, actual),
        "not_in" => !set_contains(expected, actual),
        ">" | "gt" => ordered(actual, expected, |o| o == std::cmp::Ordering::Greater),
        ">=" | "gte" => ordered(actual, expected, |o| o != std::cmp::Ordering::Less),
        "<" | "lt" => ordered(actual, expected, |o| o == std::cmp::Ordering::Less),
        "<=" | "lte" => ordered(actual, expected, |o| o != std::cmp::Ordering::Greater),
        "contains" => text_op(actual, expected, |a, e| a.contains(e)),
        "starts_with" => text_op(actual, expected, |a, e| a.starts_with(e)),
        "ends_with" => text_op(actual, expected, |a, e| a.ends_with(e)),
        // unknown operator never matches
        _ => false,
    }
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn values_equal(actual: Option<&Value>, expected: Option<&Value>) -> bool {
    let (Some(actual), Some(expected)) = (actual, expected) else {
        return false;
    };
    // numeric operators coerce strings to numbers
    if let (Some(a), Some(e)) = (to_decimal(actual), to_decimal(expected)) {
        return a == e;
    }
    match (text_of(actual), text_of(expected)) {
        (Some(a), Some(e)) => a == e,
        _ => actual == expected,
    }
}

fn set_contains(expected: Option<&Value>, actual: Option<&Value>) -> bool {
    let Some(Value::Array(options)) = expected else {
        return false;
    };
    options
        .iter()
        .any(|option| values_equal(actual, Some(option)))
}

fn ordered(
    actual: Option<&Value>,
    expected: Option<&Value>,
    check: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    let (Some(actual), Some(expected)) = (actual, expected) else {
        return false;
    };
    if let (Some(a), Some(e)) = (to_decimal(actual), to_decimal(expected)) {
        return check(a.cmp(&e));
    }
    // Non-numeric operands fall back to lexicographic order, which is
    // chronological for ISO dates.
    match (actual.as_str(), expected.as_str()) {
        (Some(a), Some(e)) => check(a.cmp(e)),
        _ => false,
    }
}

fn text_op(
    actual: Option<&Value>,
    expected: Option<&Value>,
    check: impl Fn(&str, &str) -> bool,
) -> bool {
    let (Some(actual), Some(expected)) = (actual, expected) else {
        return false;
    };
    match (text_of(actual), text_of(expected)) {
        (Some(a), Some(e)) => check(&a, &e),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use uuid::Uuid;

    fn event() -> TaxEvent {
        TaxEvent {
            id: Uuid::new_v4(),
            taxpayer_id: Uuid::new_v4(),
            source_record_id: None,
            event_type: "EV_FOREIGN_DIVIDENDS".to_string(),
            event_date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            amount: Some(Decimal::new(500_000, 0)),
            currency: Some("KZT".to_string()),
            metadata: json!({"country": "DE", "broker": {"name": "IB"}}),
            tax_year: 2024,
            active: true,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_always_true() {
        assert!(match_event(&json!({"always": true}), &event()));
        assert!(!match_event(&json!({"always": false}), &event()));
    }

    #[test]
    fn test_explicit_triple() {
        let cond = json!({"field": "event.event_type", "op": "eq", "value": "EV_FOREIGN_DIVIDENDS"});
        assert!(match_event(&cond, &event()));
    }

    #[test]
    fn test_compact_form_auto_prefixes() {
        let cond = json!({"event_type": {"eq": "EV_FOREIGN_DIVIDENDS"}});
        assert!(match_event(&cond, &event()));
        let cond = json!({"event_type": {"eq": "EV_WINNINGS"}});
        assert!(!match_event(&cond, &event()));
    }

    #[test]
    fn test_numeric_coercion_on_amount() {
        assert!(match_event(&json!({"amount": {"gt": "400000"}}), &event()));
        assert!(match_event(&json!({"amount": {"lte": 500000}}), &event()));
        assert!(!match_event(&json!({"amount": {"lt": 500000}}), &event()));
    }

    #[test]
    fn test_all_any_combinators() {
        let cond = json!({"all": [
            {"amount": {"gt": 0}},
            {"any": [
                {"currency": {"eq": "USD"}},
                {"currency": {"eq": "KZT"}}
            ]}
        ]});
        assert!(match_event(&cond, &event()));
    }

    #[test]
    fn test_in_operator() {
        let cond = json!({"event_type": {"in": ["EV_FOREIGN_DIVIDENDS", "EV_FOREIGN_INTEREST"]}});
        assert!(match_event(&cond, &event()));
        let cond = json!({"event_type": {"not_in": ["EV_WINNINGS"]}});
        assert!(match_event(&cond, &event()));
    }

    #[test]
    fn test_metadata_dotted_path() {
        assert!(match_event(&json!({"metadata.broker.name": {"eq": "IB"}}), &event()));
        assert!(match_event(&json!({"metadata.broker.city": {"not_exists": true}}), &event()));
        assert!(!match_event(&json!({"metadata.broker.city": {"eq": "Almaty"}}), &event()));
    }

    #[test]
    fn test_string_operators() {
        assert!(match_event(&json!({"event_type": {"starts_with": "EV_FOREIGN"}}), &event()));
        assert!(match_event(&json!({"event_type": {"contains": "DIVIDEND"}}), &event()));
        assert!(match_event(&json!({"event_type": {"ends_with": "DIVIDENDS"}}), &event()));
    }

    #[test]
    fn test_unknown_operator_is_false() {
        assert!(!match_event(&json!({"amount": {"between": [1, 2]}}), &event()));
    }

    #[test]
    fn test_date_comparison_as_iso() {
        assert!(match_event(&json!({"event_date": {"eq": "2024-06-15"}}), &event()));
        assert!(match_event(&json!({"tax_year": {"eq": 2024}}), &event()));
    }

    #[test]
    fn test_match_fields_resolver() {
        let mut fields = BTreeMap::new();
        fields.insert("LF_INCOME_TOTAL".to_string(), Decimal::new(500_000, 0));
        assert!(match_fields(&json!({"LF_INCOME_TOTAL": {"gt": 0}}), &fields));
        assert!(!match_fields(&json!({"LF_CFC_PROFIT": {"gt": 0}}), &fields));
        assert!(match_fields(&json!({"LF_CFC_PROFIT": {"not_exists": true}}), &fields));
    }
}
