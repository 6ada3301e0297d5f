//! Schema reconciliation across several loaded sources
//!
//! The merged view is every source's columns side by side. Columns identical
//! in name and domain collapse to one; same-named columns with different
//! domains are widened. No column is ever dropped: a source lacking a column
//! contributes nulls for it.

use crate::error::Result;
use crate::table::{Column, Schema, Table, Value};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::debug;

/// Columns of all sources, concatenated in source order.
pub fn merged_view(tables: &[Table]) -> Vec<Column> {
    tables
        .iter()
        .flat_map(|t| t.schema().columns.iter().cloned())
        .collect()
}

/// Keep the first of each group of columns identical in name and domain.
pub fn dedup_columns(columns: &[Column]) -> Vec<Column> {
    columns.iter().unique().cloned().collect()
}

/// Union of columns by name, each widened over every domain seen for it.
/// Order is first appearance.
pub fn reconcile_schema(columns: &[Column]) -> Schema {
    let mut merged: Vec<Column> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for column in columns {
        match positions.get(column.name.as_str()) {
            Some(&idx) => {
                let existing = &mut merged[idx];
                existing.column_type = existing.column_type.widen(column.column_type);
            }
            None => {
                positions.insert(column.name.as_str(), merged.len());
                merged.push(column.clone());
            }
        }
    }

    Schema::new(merged)
}

/// Concatenate tables under their reconciled schema, preserving source order
/// and row order within each source.
pub fn concat(tables: Vec<Table>) -> Result<Table> {
    if tables.len() == 1 {
        return Ok(tables.into_iter().next().unwrap_or_default());
    }

    let schema = reconcile_schema(&dedup_columns(&merged_view(&tables)));
    let total_rows: usize = tables.iter().map(Table::len).sum();
    let mut rows = Vec::with_capacity(total_rows);

    for table in tables {
        let (source_schema, source_rows) = table.into_parts();
        let targets: Vec<usize> = source_schema
            .columns
            .iter()
            .filter_map(|c| schema.index_of(&c.name))
            .collect();

        for source_row in source_rows {
            let mut row = vec![Value::Null; schema.len()];
            for (value, &target) in source_row.into_iter().zip(&targets) {
                row[target] = value.widen_to(schema.columns[target].column_type)?;
            }
            rows.push(row);
        }
    }

    debug!(
        "Reconciled {} rows under columns [{}]",
        rows.len(),
        schema.names().iter().join(", ")
    );

    Table::new(schema, rows)
}
