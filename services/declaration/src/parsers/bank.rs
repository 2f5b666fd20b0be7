//! Bank statement imports. Each transaction yields at most one event:
//! the direction is inferred from credit/debit columns or a signed
//! amount, the stored amount is always non-negative, and the direction
//! lands in metadata. Event types come from the payment purpose text.

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use common::ServiceResult;

use crate::models::{SourceRecord, TaxEventInput};

use super::{
    amount_of, infer_event_type, lookup, metadata_from, normalized_currency, parse_error,
    required_date, text, SourceParser, AMOUNT_ALIASES, CURRENCY_ALIASES, DATE_ALIASES,
    DESCRIPTION_ALIASES,
};

const CREDIT_ALIASES: [&str; 4] = ["credit", "credit_amount", "поступление", "приход"];
const DEBIT_ALIASES: [&str; 4] = ["debit", "debit_amount", "списание", "расход"];

pub struct BankParser;

impl SourceParser for BankParser {
    fn parse(&self, record: &SourceRecord) -> ServiceResult<Vec<TaxEventInput>> {
        let transactions = record
            .raw_payload
            .get("transactions")
            .or_else(|| record.raw_payload.get("rows"))
            .and_then(Value::as_array)
            .or_else(|| record.raw_payload.as_array())
            .ok_or_else(|| parse_error(0, "bank payload must carry a transactions list"))?;

        let mut events = Vec::new();
        for (index, transaction) in transactions.iter().enumerate() {
            let obj = transaction
                .as_object()
                .ok_or_else(|| parse_error(index, "transaction must be an object"))?;
            if let Some(event) = transaction_event(obj, index)? {
                events.push(event);
            }
        }
        Ok(events)
    }
}

fn transaction_event(
    obj: &Map<String, Value>,
    index: usize,
) -> ServiceResult<Option<TaxEventInput>> {
    let event_date = required_date(obj, index)?;

    let Some((amount, direction)) = resolve_direction(obj, index)? else {
        // zero-amount technical rows produce no event
        return Ok(None);
    };

    let purpose = lookup(obj, &DESCRIPTION_ALIASES).and_then(|v| text(v));
    let event_type = purpose
        .as_deref()
        .map(infer_event_type)
        .unwrap_or("EV_OTHER_NON_AGENT");

    let mut consumed: Vec<&str> = Vec::new();
    consumed.extend_from_slice(&CREDIT_ALIASES);
    consumed.extend_from_slice(&DEBIT_ALIASES);
    consumed.extend_from_slice(&DATE_ALIASES);
    consumed.extend_from_slice(&AMOUNT_ALIASES);
    consumed.extend_from_slice(&CURRENCY_ALIASES);

    let mut metadata = metadata_from(obj, &consumed);
    if let Some(meta) = metadata.as_object_mut() {
        meta.insert("direction".to_string(), Value::String(direction.to_string()));
    }

    Ok(Some(TaxEventInput {
        event_type: event_type.to_string(),
        event_date,
        amount: Some(amount),
        currency: Some(normalized_currency(obj)),
        metadata,
    }))
}

/// Direction from dedicated credit/debit columns, falling back to the
/// sign of a single amount column. Returns None for zero amounts.
fn resolve_direction(
    obj: &Map<String, Value>,
    index: usize,
) -> ServiceResult<Option<(Decimal, &'static str)>> {
    let credit = lookup(obj, &CREDIT_ALIASES).and_then(amount_of);
    let debit = lookup(obj, &DEBIT_ALIASES).and_then(amount_of);

    if let Some(credit) = credit {
        if credit > Decimal::ZERO {
            return Ok(Some((credit, "credit")));
        }
    }
    if let Some(debit) = debit {
        if debit > Decimal::ZERO {
            return Ok(Some((debit, "debit")));
        }
    }
    if credit.is_some() || debit.is_some() {
        return Ok(None);
    }

    let signed = lookup(obj, &AMOUNT_ALIASES)
        .ok_or_else(|| parse_error(index, "transaction has no amount"))?;
    let signed = amount_of(signed)
        .ok_or_else(|| parse_error(index, format!("unparseable amount: {}", signed)))?;

    if signed.is_zero() {
        Ok(None)
    } else if signed > Decimal::ZERO {
        Ok(Some((signed, "credit")))
    } else {
        Ok(Some((-signed, "debit")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;
    use serde_json::json;
    use uuid::Uuid;

    fn record(payload: Value) -> SourceRecord {
        SourceRecord {
            id: Uuid::new_v4(),
            taxpayer_id: Uuid::new_v4(),
            source_kind: SourceKind::Bank,
            external_id: Some("stmt-2024-06".to_string()),
            checksum: utils::payload_checksum(&payload),
            raw_payload: payload,
            imported_at: chrono::Utc::now(),
            active: true,
        }
    }

    #[test]
    fn test_credit_debit_columns() {
        let events = BankParser
            .parse(&record(json!({"transactions": [
                {"date": "2024-06-01", "credit": "150000", "purpose": "Аренда за май"},
                {"date": "2024-06-02", "debit": "40000", "purpose": "Оплата услуг"}
            ]})))
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "EV_RENT_INCOME");
        assert_eq!(events[0].amount, Some(Decimal::new(150_000, 0)));
        assert_eq!(events[0].metadata.get("direction"), Some(&json!("credit")));
        assert_eq!(events[1].metadata.get("direction"), Some(&json!("debit")));
        assert!(events[1].amount.unwrap() > Decimal::ZERO);
    }

    #[test]
    fn test_signed_amount_fallback() {
        let events = BankParser
            .parse(&record(json!({"transactions": [
                {"date": "2024-06-01", "amount": "-75000", "purpose": "платеж"}
            ]})))
            .unwrap();
        assert_eq!(events[0].amount, Some(Decimal::new(75_000, 0)));
        assert_eq!(events[0].metadata.get("direction"), Some(&json!("debit")));
    }

    #[test]
    fn test_zero_amount_rows_are_skipped() {
        let events = BankParser
            .parse(&record(json!({"transactions": [
                {"date": "2024-06-01", "amount": "0", "purpose": "сервисная запись"},
                {"date": "2024-06-02", "credit": "0", "purpose": "сервисная запись"}
            ]})))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_foreign_transfer_purpose() {
        let events = BankParser
            .parse(&record(json!({"transactions": [
                {"date": "2024-06-01", "credit": "900000", "purpose": "SWIFT transfer from Deutsche Bank"}
            ]})))
            .unwrap();
        assert_eq!(events[0].event_type, "EV_FOREIGN_OTHER");
    }

    #[test]
    fn test_purposeless_transaction_defaults_generic() {
        let events = BankParser
            .parse(&record(json!({"transactions": [
                {"date": "2024-06-01", "credit": "5000"}
            ]})))
            .unwrap();
        assert_eq!(events[0].event_type, "EV_OTHER_NON_AGENT");
    }

    #[test]
    fn test_transaction_without_amount_fails() {
        let result = BankParser.parse(&record(json!({"transactions": [
            {"date": "2024-06-01", "purpose": "нет суммы"}
        ]})));
        assert!(result.is_err());
    }
}
