//! Row-oriented imports (CSV and Excel). Rows arrive as header-keyed
//! JSON records; the Excel shape additionally supports multiple sheets
//! keyed by sheet name. Both kinds share one row mapper.

use serde_json::{Map, Value};

use common::ServiceResult;

use crate::models::{SourceRecord, TaxEventInput};

use super::{
    infer_event_type, lookup, metadata_from, normalized_currency, optional_amount, parse_error,
    required_date, text, SourceParser, AMOUNT_ALIASES, CURRENCY_ALIASES, DATE_ALIASES,
    DESCRIPTION_ALIASES,
};

const EVENT_TYPE_ALIASES: [&str; 4] = ["event_type", "type", "category", "тип"];

pub struct CsvParser;

impl SourceParser for CsvParser {
    fn parse(&self, record: &SourceRecord) -> ServiceResult<Vec<TaxEventInput>> {
        let rows = rows_of(&record.raw_payload)?;
        rows.iter()
            .enumerate()
            .map(|(index, row)| row_event(row, index, None))
            .collect()
    }
}

pub struct ExcelParser;

impl SourceParser for ExcelParser {
    fn parse(&self, record: &SourceRecord) -> ServiceResult<Vec<TaxEventInput>> {
        if let Some(sheets) = record.raw_payload.get("sheets").and_then(Value::as_object) {
            let mut events = Vec::new();
            // sheets iterate in name order, rows in sheet order
            for (sheet_name, sheet_rows) in sheets {
                let rows = sheet_rows
                    .as_array()
                    .ok_or_else(|| parse_error(0, format!("sheet {} must be a list", sheet_name)))?;
                for (index, row) in rows.iter().enumerate() {
                    let obj = row.as_object().ok_or_else(|| {
                        parse_error(index, format!("sheet {}: row must be an object", sheet_name))
                    })?;
                    events.push(row_event(obj, index, Some(sheet_name))?);
                }
            }
            return Ok(events);
        }

        let rows = rows_of(&record.raw_payload)?;
        rows.iter()
            .enumerate()
            .map(|(index, row)| row_event(row, index, None))
            .collect()
    }
}

fn rows_of(payload: &Value) -> ServiceResult<Vec<Map<String, Value>>> {
    let rows = payload
        .get("rows")
        .or_else(|| payload.get("records"))
        .and_then(Value::as_array)
        .or_else(|| payload.as_array())
        .ok_or_else(|| parse_error(0, "tabular payload must carry a rows list"))?;

    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            row.as_object()
                .cloned()
                .ok_or_else(|| parse_error(index, "row must be an object"))
        })
        .collect()
}

fn row_event(
    row: &Map<String, Value>,
    index: usize,
    sheet: Option<&str>,
) -> ServiceResult<TaxEventInput> {
    let event_date = required_date(row, index)?;
    let event_type = resolve_event_type(row, index)?;
    let amount = optional_amount(row, index)?;
    let currency = normalized_currency(row);

    let mut consumed: Vec<&str> = Vec::new();
    consumed.extend_from_slice(&EVENT_TYPE_ALIASES);
    consumed.extend_from_slice(&DATE_ALIASES);
    consumed.extend_from_slice(&AMOUNT_ALIASES);
    consumed.extend_from_slice(&CURRENCY_ALIASES);

    let mut metadata = metadata_from(row, &consumed);
    if let (Some(sheet), Some(obj)) = (sheet, metadata.as_object_mut()) {
        obj.insert("sheet".to_string(), Value::String(sheet.to_string()));
    }

    Ok(TaxEventInput {
        event_type,
        event_date,
        amount,
        currency: Some(currency),
        metadata,
    })
}

/// An explicit event-type column wins; otherwise the type is inferred
/// from the description column. A row with neither cannot be classified.
fn resolve_event_type(row: &Map<String, Value>, index: usize) -> ServiceResult<String> {
    if let Some(explicit) = lookup(row, &EVENT_TYPE_ALIASES).and_then(|v| text(v)) {
        return Ok(explicit.to_uppercase());
    }
    if let Some(description) = lookup(row, &DESCRIPTION_ALIASES).and_then(|v| text(v)) {
        return Ok(infer_event_type(&description).to_string());
    }
    Err(parse_error(index, "row has no event type and no description"))
}
