//! Accounting-system exports: per-document and per-operation shapes.
//! Expense documents yield no events; sales and receipt documents map by
//! description keywords. Documents with tabular line items produce one
//! event per line.

use serde_json::{Map, Value};

use common::ServiceResult;

use crate::models::{SourceRecord, TaxEventInput};

use super::{
    infer_event_type, lookup, metadata_from, normalized_currency, optional_amount, parse_error,
    required_date, text, SourceParser, AMOUNT_ALIASES, CURRENCY_ALIASES, DATE_ALIASES,
    DESCRIPTION_ALIASES,
};

const DOC_TYPE_ALIASES: [&str; 4] = ["doc_type", "document_type", "operation_type", "вид"];
const LINE_ALIASES: [&str; 3] = ["items", "lines", "positions"];

pub struct AccountingParser;

impl SourceParser for AccountingParser {
    fn parse(&self, record: &SourceRecord) -> ServiceResult<Vec<TaxEventInput>> {
        let documents = record
            .raw_payload
            .get("documents")
            .or_else(|| record.raw_payload.get("operations"))
            .and_then(Value::as_array)
            .ok_or_else(|| parse_error(0, "accounting payload must carry documents or operations"))?;

        let mut events = Vec::new();
        for (index, document) in documents.iter().enumerate() {
            let obj = document
                .as_object()
                .ok_or_else(|| parse_error(index, "document must be an object"))?;
            document_events(obj, index, &mut events)?;
        }
        Ok(events)
    }
}

fn document_events(
    obj: &Map<String, Value>,
    index: usize,
    events: &mut Vec<TaxEventInput>,
) -> ServiceResult<()> {
    if is_expense(obj) {
        return Ok(());
    }

    let event_date = required_date(obj, index)?;
    let description = lookup(obj, &DESCRIPTION_ALIASES).and_then(|v| text(v));
    let event_type = description
        .as_deref()
        .map(infer_event_type)
        .unwrap_or("EV_OTHER_NON_AGENT")
        .to_string();
    let currency = normalized_currency(obj);

    let mut consumed: Vec<&str> = Vec::new();
    consumed.extend_from_slice(&DOC_TYPE_ALIASES);
    consumed.extend_from_slice(&LINE_ALIASES);
    consumed.extend_from_slice(&DATE_ALIASES);
    consumed.extend_from_slice(&AMOUNT_ALIASES);
    consumed.extend_from_slice(&CURRENCY_ALIASES);
    let doc_metadata = metadata_from(obj, &consumed);

    if let Some(lines) = lookup(obj, &LINE_ALIASES).and_then(Value::as_array) {
        for (line_index, line) in lines.iter().enumerate() {
            let line_obj = line.as_object().ok_or_else(|| {
                parse_error(index, format!("line {} must be an object", line_index))
            })?;
            let amount = optional_amount(line_obj, index)?
                .ok_or_else(|| parse_error(index, format!("line {} has no amount", line_index)))?;

            let line_type = lookup(line_obj, &DESCRIPTION_ALIASES)
                .and_then(|v| text(v))
                .map(|line_description| infer_event_type(&line_description).to_string())
                .unwrap_or_else(|| event_type.clone());

            let mut metadata = doc_metadata.clone();
            if let Some(meta) = metadata.as_object_mut() {
                meta.insert("line_number".to_string(), Value::from(line_index as i64 + 1));
                for (key, value) in metadata_from(line_obj, &consumed)
                    .as_object()
                    .into_iter()
                    .flatten()
                {
                    meta.insert(key.clone(), value.clone());
                }
            }

            events.push(TaxEventInput {
                event_type: line_type,
                event_date,
                amount: Some(amount),
                currency: Some(currency.clone()),
                metadata,
            });
        }
        return Ok(());
    }

    let amount = optional_amount(obj, index)?;
    events.push(TaxEventInput {
        event_type,
        event_date,
        amount,
        currency: Some(currency),
        metadata: doc_metadata,
    });
    Ok(())
}

/// Expense documents are skipped outright: they are the payer's own
/// spending, not reportable income.
fn is_expense(obj: &Map<String, Value>) -> bool {
    let Some(doc_type) = lookup(obj, &DOC_TYPE_ALIASES).and_then(|v| text(v)) else {
        return false;
    };
    let lower = doc_type.to_lowercase();
    ["expense", "purchase", "расход", "закуп", "списание"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;
    use rust_decimal::Decimal;
    use serde_json::json;
    use uuid::Uuid;

    fn record(payload: Value) -> SourceRecord {
        SourceRecord {
            id: Uuid::new_v4(),
            taxpayer_id: Uuid::new_v4(),
            source_kind: SourceKind::Accounting,
            external_id: Some("1c-export-7".to_string()),
            checksum: utils::payload_checksum(&payload),
            raw_payload: payload,
            imported_at: chrono::Utc::now(),
            active: true,
        }
    }

    #[test]
    fn test_expense_documents_are_skipped() {
        let events = AccountingParser
            .parse(&record(json!({"documents": [
                {"doc_type": "Расходная накладная", "date": "2024-04-01", "amount": "99000"},
                {"doc_type": "Реализация услуг", "date": "2024-04-02", "amount": "120000",
                 "description": "Консультационные услуги"}
            ]})))
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "EV_SERVICE_NON_AGENT");
        assert_eq!(events[0].amount, Some(Decimal::new(120_000, 0)));
    }

    #[test]
    fn test_line_items_emit_per_line() {
        let events = AccountingParser
            .parse(&record(json!({"documents": [
                {"doc_type": "Реализация", "date": "2024-04-02", "description": "услуги",
                 "items": [
                    {"description": "Консультационные услуги", "amount": "70000"},
                    {"description": "Аренда оборудования", "amount": "30000"}
                 ]}
            ]})))
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "EV_SERVICE_NON_AGENT");
        assert_eq!(events[1].event_type, "EV_RENT_INCOME");
        assert_eq!(events[0].metadata.get("line_number"), Some(&json!(1)));
        assert_eq!(events[1].metadata.get("line_number"), Some(&json!(2)));
    }

    #[test]
    fn test_operations_shape() {
        let events = AccountingParser
            .parse(&record(json!({"operations": [
                {"operation_type": "Поступление", "date": "2024-05-10", "amount": 45000,
                 "description": "дивиденды"}
            ]})))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "EV_DIVIDENDS_NON_AGENT");
    }

    #[test]
    fn test_line_without_amount_fails() {
        let result = AccountingParser.parse(&record(json!({"documents": [
            {"doc_type": "Реализация", "date": "2024-04-02",
             "items": [{"description": "услуги"}]}
        ]})));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_document_list_fails() {
        let result = AccountingParser.parse(&record(json!({"invoices": []})));
        assert!(result.is_err());
    }
}
