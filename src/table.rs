//! Table model shared by both backends
//!
//! A [`Table`] is a reconciled [`Schema`] plus positionally aligned rows.
//! Tables live for one operation only; nothing here is cached.

use crate::error::{PitError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A record as seen at the JSON boundary: column name to scalar, in
/// declaration order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Value domain of a column, ordered from narrowest to widest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ColumnType {
    Null,
    Boolean,
    Integer,
    Float,
    String,
}

impl ColumnType {
    /// Narrowest domain able to hold values of both `self` and `other`.
    ///
    /// Null never widens anything. Booleans fold into a numeric domain
    /// (true=1, false=0) and never push it to string. Any text widens to
    /// string.
    pub fn widen(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Null, x) | (x, Null) => x,
            (String, _) | (_, String) => String,
            (Float, _) | (_, Float) => Float,
            (Integer, Boolean) | (Boolean, Integer) => Integer,
            (a, _) => a,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Null => "null",
            ColumnType::Boolean => "boolean",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::String => "string",
        };
        f.write_str(name)
    }
}

/// A single scalar cell. Crosses the JSON boundary through
/// [`Value::from_json`] and [`Value::to_json`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Null => ColumnType::Null,
            Value::Boolean(_) => ColumnType::Boolean,
            Value::Integer(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::String(_) => ColumnType::String,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert a JSON scalar. Returns `None` for arrays and objects.
    ///
    /// Integers that do not fit `i64` become floats.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Boolean(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Value::Integer(i)),
                None => n.as_f64().map(Value::Float),
            },
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::Number((*i).into()),
            // NaN and infinities have no JSON form
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Move this value into a domain at least as wide as its own.
    pub fn widen_to(self, target: ColumnType) -> Result<Value> {
        let source = self.column_type();
        if source == target || self.is_null() {
            return Ok(self);
        }

        let widened = match (self, target) {
            (Value::Boolean(b), ColumnType::Integer) => Value::Integer(b as i64),
            (Value::Boolean(b), ColumnType::Float) => Value::Float(if b { 1.0 } else { 0.0 }),
            (Value::Integer(i), ColumnType::Float) => Value::Float(i as f64),
            (Value::Boolean(b), ColumnType::String) => Value::String(b.to_string()),
            (Value::Integer(i), ColumnType::String) => Value::String(i.to_string()),
            (Value::Float(f), ColumnType::String) => Value::String(render_float(f)),
            (value, _) => {
                return Err(PitError::MalformedSource(format!(
                    "cannot represent {} value {:?} as {}",
                    source, value, target
                )))
            }
        };

        Ok(widened)
    }
}

/// Float text as JSON would print it (`1.0`, `2.5`).
pub(crate) fn render_float(f: f64) -> String {
    serde_json::Number::from_f64(f)
        .map(|n| n.to_string())
        .unwrap_or_else(|| f.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Rows under one schema. Every row has exactly one value per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    schema: Schema,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Result<Self> {
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != schema.len() {
                return Err(PitError::MalformedSource(format!(
                    "row {} has {} values but the schema has {} columns",
                    idx,
                    row.len(),
                    schema.len()
                )));
            }
        }
        Ok(Self { schema, rows })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_parts(self) -> (Schema, Vec<Vec<Value>>) {
        (self.schema, self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, top to bottom.
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// JSON-serializable rows; every schema column is present in every record.
    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.schema
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(col, value)| (col.name.clone(), value.to_json()))
                    .collect()
            })
            .collect()
    }
}
