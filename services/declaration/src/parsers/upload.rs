//! Upload conversion. CSV text and XLSX workbooks are converted to the
//! canonical row-JSON shapes at the ingest boundary, before the payload
//! is checksummed, so file uploads and direct JSON flow through one
//! pipeline.

use calamine::{DataType, Reader, Xlsx};
use serde_json::{json, Map, Value};
use std::io::Cursor;

use common::{ServiceError, ServiceResult};

/// CSV text → `{"rows": [{header: cell, ...}, ...]}`. Empty cells are
/// omitted so the row mappers treat them as absent.
pub fn csv_to_rows(text: &str) -> ServiceResult<Value> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| ServiceError::Parse(format!("csv header: {}", e)))?
        .clone();

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record =
            result.map_err(|e| ServiceError::Parse(format!("csv row {}: {}", index, e)))?;
        let mut row = Map::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            let cell = cell.trim();
            if !cell.is_empty() {
                row.insert(header.trim().to_string(), Value::String(cell.to_string()));
            }
        }
        rows.push(Value::Object(row));
    }
    Ok(json!({ "rows": rows }))
}

/// XLSX bytes → `{"sheets": {name: [rows], ...}}`. The first row of each
/// sheet is the header row.
pub fn xlsx_to_sheets(bytes: &[u8]) -> ServiceResult<Value> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| ServiceError::Parse(format!("xlsx workbook: {}", e)))?;

    let mut sheets = Map::new();
    for name in workbook.sheet_names().to_vec() {
        let range = match workbook.worksheet_range(&name) {
            Some(Ok(range)) => range,
            Some(Err(e)) => {
                return Err(ServiceError::Parse(format!("xlsx sheet {}: {}", name, e)))
            }
            None => continue,
        };

        let mut rows_iter = range.rows();
        let Some(header_row) = rows_iter.next() else {
            sheets.insert(name, Value::Array(Vec::new()));
            continue;
        };
        let headers: Vec<String> = header_row
            .iter()
            .enumerate()
            .map(|(column, cell)| {
                cell_to_string(cell).unwrap_or_else(|| format!("column_{}", column + 1))
            })
            .collect();

        let mut rows = Vec::new();
        for data_row in rows_iter {
            let mut row = Map::new();
            for (header, cell) in headers.iter().zip(data_row.iter()) {
                if let Some(value) = cell_to_string(cell) {
                    row.insert(header.clone(), Value::String(value));
                }
            }
            if !row.is_empty() {
                rows.push(Value::Object(row));
            }
        }
        sheets.insert(name, Value::Array(rows));
    }

    Ok(json!({ "sheets": sheets }))
}

fn cell_to_string(cell: &DataType) -> Option<String> {
    match cell {
        DataType::Empty => None,
        DataType::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        DataType::Int(i) => Some(i.to_string()),
        DataType::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 9e15 {
                Some(format!("{}", *f as i64))
            } else {
                Some(f.to_string())
            }
        }
        DataType::Bool(b) => Some(b.to_string()),
        DataType::DateTime(serial) => Some(serial.to_string()),
        _ => None,
    }
}
