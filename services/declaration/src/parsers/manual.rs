//! Manually entered events: a single object or an `events` list. The
//! legacy shape carries `income_type` codes, mapped through the alias
//! table; codes outside the table are rejected.

use serde_json::{Map, Value};

use common::ServiceResult;

use crate::catalog::seed;
use crate::models::{SourceRecord, TaxEventInput};

use super::{
    lookup, metadata_from, normalized_currency, optional_amount, parse_error, required_date,
    text, SourceParser, AMOUNT_ALIASES, CURRENCY_ALIASES, DATE_ALIASES,
};

pub struct ManualParser;

impl SourceParser for ManualParser {
    fn parse(&self, record: &SourceRecord) -> ServiceResult<Vec<TaxEventInput>> {
        let payload = record
            .raw_payload
            .as_object()
            .ok_or_else(|| parse_error(0, "manual payload must be an object"))?;

        if let Some(events) = payload.get("events") {
            let items = events
                .as_array()
                .ok_or_else(|| parse_error(0, "events must be a list"))?;
            return items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    let obj = item
                        .as_object()
                        .ok_or_else(|| parse_error(index, "event must be an object"))?;
                    manual_event(obj, index)
                })
                .collect();
        }

        Ok(vec![manual_event(payload, 0)?])
    }
}

fn manual_event(obj: &Map<String, Value>, index: usize) -> ServiceResult<TaxEventInput> {
    let event_type = resolve_event_type(obj, index)?;
    let event_date = required_date(obj, index)?;
    let amount = optional_amount(obj, index)?;
    let currency = normalized_currency(obj);

    let mut consumed: Vec<&str> = vec!["event_type", "income_type", "events"];
    consumed.extend_from_slice(&DATE_ALIASES);
    consumed.extend_from_slice(&AMOUNT_ALIASES);
    consumed.extend_from_slice(&CURRENCY_ALIASES);

    Ok(TaxEventInput {
        event_type,
        event_date,
        amount,
        currency: Some(currency),
        metadata: metadata_from(obj, &consumed),
    })
}

fn resolve_event_type(obj: &Map<String, Value>, index: usize) -> ServiceResult<String> {
    if let Some(explicit) = lookup(obj, &["event_type"]).and_then(|v| text(v)) {
        return Ok(explicit.to_uppercase());
    }

    let legacy = lookup(obj, &["income_type"])
        .and_then(|v| text(v))
        .ok_or_else(|| parse_error(index, "missing event_type"))?;

    seed::legacy_income_type(&legacy.to_uppercase())
        .map(str::to_string)
        .ok_or_else(|| parse_error(index, format!("unknown legacy income_type: {}", legacy)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::json;
    use uuid::Uuid;

    fn record(payload: Value) -> SourceRecord {
        SourceRecord {
            id: Uuid::new_v4(),
            taxpayer_id: Uuid::new_v4(),
            source_kind: SourceKind::Manual,
            external_id: None,
            checksum: utils::payload_checksum(&payload),
            raw_payload: payload,
            imported_at: chrono::Utc::now(),
            active: true,
        }
    }

    #[test]
    fn test_single_event_shape() {
        let events = ManualParser
            .parse(&record(json!({
                "event_type": "EV_FOREIGN_DIVIDENDS",
                "event_date": "2024-06-15",
                "amount": "500000",
                "currency": "KZT",
                "country": "DE"
            })))
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "EV_FOREIGN_DIVIDENDS");
        assert_eq!(events[0].event_date, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
        assert_eq!(events[0].amount, Some(Decimal::new(500_000, 0)));
        assert_eq!(events[0].currency.as_deref(), Some("KZT"));
        assert_eq!(events[0].metadata, json!({"country": "DE"}));
    }

    #[test]
    fn test_event_list_shape_keeps_order() {
        let events = ManualParser
            .parse(&record(json!({"events": [
                {"event_type": "EV_WINNINGS", "date": "01.03.2024", "amount": "100000"},
                {"event_type": "EV_RENT_INCOME", "date": "02.03.2024", "amount": "150000"}
            ]})))
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "EV_WINNINGS");
        assert_eq!(events[1].event_type, "EV_RENT_INCOME");
    }

    #[test]
    fn test_legacy_income_type_is_aliased() {
        let events = ManualParser
            .parse(&record(json!({
                "income_type": "INCOME_DIVIDENDS_FOREIGN",
                "event_date": "2024-06-15",
                "amount": 500000
            })))
            .unwrap();
        assert_eq!(events[0].event_type, "EV_FOREIGN_DIVIDENDS");
    }

    #[test]
    fn test_unknown_legacy_code_is_rejected() {
        let result = ManualParser.parse(&record(json!({
            "income_type": "INCOME_MOON_MINING",
            "event_date": "2024-06-15"
        })));
        assert!(result.is_err());
    }

    #[test]
    fn test_first_bad_record_fails_whole_parse() {
        let result = ManualParser.parse(&record(json!({"events": [
            {"event_type": "EV_WINNINGS", "date": "01.03.2024"},
            {"event_type": "EV_WINNINGS"}
        ]})));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("record 1"));
    }

    #[test]
    fn test_currency_defaults_to_kzt() {
        let events = ManualParser
            .parse(&record(json!({
                "event_type": "EV_WINNINGS",
                "event_date": "2024-03-01",
                "amount": "100000"
            })))
            .unwrap();
        assert_eq!(events[0].currency.as_deref(), Some("KZT"));
    }
}
