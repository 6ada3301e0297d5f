//! Schema Normalizer - JSON records with uneven key sets into one Table
//!
//! Columns appear in the order their key is first seen. Each column gets the
//! narrowest domain that holds every value observed for it (see
//! [`ColumnType::widen`]); records missing a key get null.

use crate::error::{PitError, Result};
use crate::table::{Column, Schema, Table, Value};
use std::collections::HashMap;
use tracing::debug;

/// Parse payload text (a JSON array of flat objects) and normalize it.
pub fn normalize_json(payload: &str) -> Result<Table> {
    let parsed: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| PitError::MalformedInput(format!("payload is not valid JSON: {}", e)))?;

    match parsed {
        serde_json::Value::Array(records) => normalize(&records),
        other => Err(PitError::MalformedInput(format!(
            "payload must be a JSON array of records, got {}",
            json_kind(&other)
        ))),
    }
}

/// Normalize already-parsed records. An empty slice yields an empty Table.
pub fn normalize(records: &[serde_json::Value]) -> Result<Table> {
    let mut columns: Vec<Column> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    // First pass: discover columns and widen their domains
    for (row_idx, record) in records.iter().enumerate() {
        let object = as_object(record, row_idx)?;
        for (key, raw) in object {
            let value = scalar(raw, key, row_idx)?;
            match positions.get(key) {
                Some(&idx) => {
                    let column = &mut columns[idx];
                    column.column_type = column.column_type.widen(value.column_type());
                }
                None => {
                    positions.insert(key.clone(), columns.len());
                    columns.push(Column::new(key.clone(), value.column_type()));
                }
            }
        }
    }

    // Second pass: lay values out under the widened schema
    let mut rows = Vec::with_capacity(records.len());
    for (row_idx, record) in records.iter().enumerate() {
        let object = as_object(record, row_idx)?;
        let mut row = vec![Value::Null; columns.len()];
        for (key, raw) in object {
            let idx = positions[key];
            let value = scalar(raw, key, row_idx)?;
            row[idx] = value.widen_to(columns[idx].column_type)?;
        }
        rows.push(row);
    }

    debug!(
        "Normalized {} records into {} columns",
        rows.len(),
        columns.len()
    );

    Table::new(Schema::new(columns), rows)
}

fn as_object(record: &serde_json::Value, row_idx: usize) -> Result<&serde_json::Map<String, serde_json::Value>> {
    record.as_object().ok_or_else(|| {
        PitError::MalformedInput(format!(
            "record {} must be an object, got {}",
            row_idx,
            json_kind(record)
        ))
    })
}

fn scalar(raw: &serde_json::Value, key: &str, row_idx: usize) -> Result<Value> {
    Value::from_json(raw).ok_or_else(|| {
        PitError::MalformedInput(format!(
            "record {} column '{}' holds a nested {}; only flat records are supported",
            row_idx,
            key,
            json_kind(raw)
        ))
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
