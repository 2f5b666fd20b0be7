//! External API pulls. The payload is one of a small set of top-level
//! shapes — `incomes`, `items`/`records`/`events`, `assets`, `debts`, or
//! a single record — each with its own per-record mapper.

use serde_json::{Map, Value};

use common::ServiceResult;

use crate::catalog::seed;
use crate::models::{SourceRecord, TaxEventInput};

use super::{
    lookup, metadata_from, normalized_currency, optional_amount, parse_error, required_date,
    text, SourceParser, AMOUNT_ALIASES, CURRENCY_ALIASES, DATE_ALIASES,
};

pub struct ApiParser;

impl SourceParser for ApiParser {
    fn parse(&self, record: &SourceRecord) -> ServiceResult<Vec<TaxEventInput>> {
        let payload = record
            .raw_payload
            .as_object()
            .ok_or_else(|| parse_error(0, "api payload must be an object"))?;

        if let Some(incomes) = payload.get("incomes").and_then(Value::as_array) {
            return map_all(incomes, income_event);
        }
        for key in ["items", "records", "events"] {
            if let Some(items) = payload.get(key).and_then(Value::as_array) {
                return map_all(items, income_event);
            }
        }
        if let Some(assets) = payload.get("assets").and_then(Value::as_array) {
            return map_all(assets, asset_event);
        }
        if let Some(debts) = payload.get("debts").and_then(Value::as_array) {
            return map_all(debts, debt_event);
        }

        // single-record object
        Ok(vec![income_event(payload, 0)?])
    }
}

fn map_all(
    items: &[Value],
    mapper: impl Fn(&Map<String, Value>, usize) -> ServiceResult<TaxEventInput>,
) -> ServiceResult<Vec<TaxEventInput>> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let obj = item
                .as_object()
                .ok_or_else(|| parse_error(index, "record must be an object"))?;
            mapper(obj, index)
        })
        .collect()
}

fn income_event(obj: &Map<String, Value>, index: usize) -> ServiceResult<TaxEventInput> {
    let event_type = resolve_income_type(obj, index)?;
    let event_date = required_date(obj, index)?;
    let amount = optional_amount(obj, index)?;

    let mut consumed: Vec<&str> = vec!["event_type", "income_type", "type"];
    consumed.extend_from_slice(&DATE_ALIASES);
    consumed.extend_from_slice(&AMOUNT_ALIASES);
    consumed.extend_from_slice(&CURRENCY_ALIASES);

    Ok(TaxEventInput {
        event_type,
        event_date,
        amount,
        currency: Some(normalized_currency(obj)),
        metadata: metadata_from(obj, &consumed),
    })
}

fn resolve_income_type(obj: &Map<String, Value>, index: usize) -> ServiceResult<String> {
    let raw = lookup(obj, &["event_type", "income_type", "type"])
        .and_then(|v| text(v))
        .ok_or_else(|| parse_error(index, "missing event_type"))?
        .to_uppercase();

    if raw.starts_with("EV_") {
        return Ok(raw);
    }
    seed::legacy_income_type(&raw)
        .map(str::to_string)
        .ok_or_else(|| parse_error(index, format!("unknown income type: {}", raw)))
}

/// Assets feed the property appendix grids; they carry no computable
/// amount contribution but keep their valuation in the event.
fn asset_event(obj: &Map<String, Value>, index: usize) -> ServiceResult<TaxEventInput> {
    let raw_date = lookup(obj, &["as_of_date", "valuation_date"])
        .and_then(|v| text(v));
    let event_date = match raw_date {
        Some(raw) => utils::DateNormalizer::parse(&raw)
            .ok_or_else(|| parse_error(index, format!("unparseable date: {}", raw)))?,
        None => required_date(obj, index)?,
    };
    let amount = match lookup(obj, &["value", "valuation", "cost", "amount"]) {
        None => None,
        Some(value) => Some(
            super::amount_of(value)
                .ok_or_else(|| parse_error(index, format!("unparseable asset value: {}", value)))?,
        ),
    };

    let mut consumed: Vec<&str> = vec!["value", "valuation", "cost", "as_of_date", "valuation_date"];
    consumed.extend_from_slice(&DATE_ALIASES);
    consumed.extend_from_slice(&AMOUNT_ALIASES);
    consumed.extend_from_slice(&CURRENCY_ALIASES);

    Ok(TaxEventInput {
        event_type: "EV_ASSET_DECLARED".to_string(),
        event_date,
        amount,
        currency: Some(normalized_currency(obj)),
        metadata: metadata_from(obj, &consumed),
    })
}

fn debt_event(obj: &Map<String, Value>, index: usize) -> ServiceResult<TaxEventInput> {
    let event_date = required_date(obj, index)?;
    let amount = optional_amount(obj, index)?;

    let mut consumed: Vec<&str> = Vec::new();
    consumed.extend_from_slice(&DATE_ALIASES);
    consumed.extend_from_slice(&AMOUNT_ALIASES);
    consumed.extend_from_slice(&CURRENCY_ALIASES);

    Ok(TaxEventInput {
        event_type: "EV_DEBT_DECLARED".to_string(),
        event_date,
        amount,
        currency: Some(normalized_currency(obj)),
        metadata: metadata_from(obj, &consumed),
    })
}
