//! Filter constraints - conjunctive column = literal equality
//!
//! Literals are text. Each literal is read in the reconciled domain of its
//! column; a literal that has no reading in that domain matches nothing.
//! Null cells never match.

use crate::error::{PitError, Result};
use crate::table::{ColumnType, Schema, Table, Value};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt;

/// Column name to required literal. An empty set matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterConstraintSet {
    constraints: BTreeMap<String, String>,
}

impl FilterConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse space-separated `column=value` pairs.
    ///
    /// Each pair splits on its first `=`, so values may themselves contain
    /// `=`. A repeated column keeps its last value.
    pub fn parse(text: &str) -> Result<Self> {
        let mut set = Self::new();
        for pair in text.split_whitespace() {
            let (column, value) = pair.split_once('=').ok_or_else(|| {
                PitError::MalformedInput(format!("constraint '{}' is not of the form column=value", pair))
            })?;
            if column.is_empty() {
                return Err(PitError::MalformedInput(format!(
                    "constraint '{}' has an empty column name",
                    pair
                )));
            }
            set.insert(column, value);
        }
        Ok(set)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.constraints.insert(column.into(), value.into());
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.constraints.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FilterConstraintSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

impl fmt::Display for FilterConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.iter().map(|(k, v)| format!("{}={}", k, v)).join(" ");
        f.write_str(&text)
    }
}

/// One constraint bound to a schema position. `expected` is `None` when the
/// literal has no reading in the column's domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub index: usize,
    pub expected: Option<Value>,
}

impl Predicate {
    pub fn matches(&self, row: &[Value]) -> bool {
        match (&self.expected, &row[self.index]) {
            (_, Value::Null) | (None, _) => false,
            (Some(expected), actual) => expected == actual,
        }
    }
}

/// Bind every constraint to the schema, failing on columns it lacks.
pub fn compile(schema: &Schema, constraints: &FilterConstraintSet) -> Result<Vec<Predicate>> {
    constraints
        .iter()
        .map(|(column, literal)| {
            let index = schema
                .index_of(column)
                .ok_or_else(|| unknown_column(schema, column))?;
            Ok(Predicate {
                column: column.to_string(),
                index,
                expected: literal_in_domain(literal, schema.columns[index].column_type),
            })
        })
        .collect()
}

/// Keep rows satisfying every constraint, in their original order.
pub fn apply(table: Table, constraints: &FilterConstraintSet) -> Result<Table> {
    let predicates = compile(table.schema(), constraints)?;
    if predicates.is_empty() {
        return Ok(table);
    }

    let (schema, rows) = table.into_parts();
    let kept = rows
        .into_iter()
        .filter(|row| predicates.iter().all(|p| p.matches(row)))
        .collect();

    Table::new(schema, kept)
}

/// Read a text literal in a column domain.
pub fn literal_in_domain(literal: &str, column_type: ColumnType) -> Option<Value> {
    match column_type {
        ColumnType::Null => None,
        ColumnType::Boolean => match literal {
            "true" => Some(Value::Boolean(true)),
            "false" => Some(Value::Boolean(false)),
            _ => None,
        },
        ColumnType::Integer => literal.parse::<i64>().ok().map(Value::Integer),
        ColumnType::Float => literal
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::Float),
        ColumnType::String => Some(Value::String(literal.to_string())),
    }
}

fn unknown_column(schema: &Schema, column: &str) -> PitError {
    let available = schema.names();
    let suggestion = available
        .iter()
        .map(|name| (name, strsim::jaro_winkler(column, name)))
        .filter(|(_, score)| *score >= 0.8)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| format!("; did you mean '{}'?", name))
        .unwrap_or_default();

    PitError::UnknownColumn(format!(
        "'{}' is not in [{}]{}",
        column,
        available.iter().join(", "),
        suggestion
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::normalize::normalize;
    use serde_json::json;

    #[test]
    fn test_parse_pairs() {
        let set = FilterConstraintSet::parse("a=1  b=x=y").unwrap();
        let pairs: Vec<(&str, &str)> = set.iter().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "x=y")]);
        assert!(FilterConstraintSet::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_pairs() {
        for text in ["a", "a=1 b", "=1"] {
            let err = FilterConstraintSet::parse(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedInput, "text {}", text);
        }
    }

    #[test]
    fn test_parse_last_value_wins() {
        let set = FilterConstraintSet::parse("a=1 a=2").unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![("a", "2")]);
    }

    #[test]
    fn test_conjunction() {
        let table = normalize(&[json!({"a": 1, "b": "x"}), json!({"a": 1, "b": "y"})]).unwrap();
        let constraints = FilterConstraintSet::new().with("a", "1").with("b", "x");
        let result = apply(table, &constraints).unwrap();
        assert_eq!(result.to_records(), vec![json!({"a": 1, "b": "x"}).as_object().unwrap().clone()]);
    }

    #[test]
    fn test_empty_constraints_keep_everything() {
        let table = normalize(&[json!({"a": 1}), json!({"a": 2})]).unwrap();
        let result = apply(table.clone(), &FilterConstraintSet::new()).unwrap();
        assert_eq!(result, table);
    }

    #[test]
    fn test_unknown_column_suggests_closest() {
        let table = normalize(&[json!({"customer_id": 1})]).unwrap();
        let err = apply(table, &FilterConstraintSet::new().with("customer_ld", "1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownColumn);
        assert!(err.to_string().contains("did you mean 'customer_id'"));
    }

    #[test]
    fn test_literals_are_read_in_column_domain() {
        assert_eq!(literal_in_domain("3", ColumnType::Integer), Some(Value::Integer(3)));
        assert_eq!(literal_in_domain("3.0", ColumnType::Integer), None);
        assert_eq!(literal_in_domain("3", ColumnType::Float), Some(Value::Float(3.0)));
        assert_eq!(literal_in_domain("True", ColumnType::Boolean), None);
        assert_eq!(literal_in_domain("x", ColumnType::Null), None);
    }

    #[test]
    fn test_string_domain_has_no_numeric_coercion() {
        let table = normalize(&[json!({"v": "3"}), json!({"v": "3.0"}), json!({"v": "03"})]).unwrap();
        let result = apply(table, &FilterConstraintSet::new().with("v", "3")).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows()[0][0], Value::String("3".into()));
    }

    #[test]
    fn test_nulls_never_match() {
        let table = normalize(&[json!({"a": null, "b": 1}), json!({"b": 2})]).unwrap();
        let result = apply(table, &FilterConstraintSet::new().with("a", "")).unwrap();
        assert!(result.is_empty());
    }
}
