//! Table <-> Polars DataFrame, and the Parquet codec on top of it

use crate::error::{PitError, Result};
use crate::table::{Column, ColumnType, Schema, Table, Value};
use polars::io::mmap::MmapBytesReader;
use polars::prelude::*;
use std::io::{Cursor, Write};

/// Build a DataFrame with one typed series per schema column.
///
/// Columns whose domain is `Null` are written as nullable text.
pub fn to_dataframe(table: &Table) -> Result<DataFrame> {
    let height = table.len();
    let mut columns = Vec::with_capacity(table.schema().len());

    for (idx, column) in table.schema().columns.iter().enumerate() {
        let name = column.name.as_str();
        let values = table.column_values(idx);

        let series = match column.column_type {
            ColumnType::Null => Series::full_null(name, height, &DataType::String),
            ColumnType::Boolean => {
                let data: Vec<Option<bool>> = values
                    .map(|v| match v {
                        Value::Boolean(b) => Ok(Some(*b)),
                        other => null_or_mismatch(other, column),
                    })
                    .collect::<Result<_>>()?;
                Series::new(name, data)
            }
            ColumnType::Integer => {
                let data: Vec<Option<i64>> = values
                    .map(|v| match v {
                        Value::Integer(i) => Ok(Some(*i)),
                        other => null_or_mismatch(other, column),
                    })
                    .collect::<Result<_>>()?;
                Series::new(name, data)
            }
            ColumnType::Float => {
                let data: Vec<Option<f64>> = values
                    .map(|v| match v {
                        Value::Float(f) => Ok(Some(*f)),
                        other => null_or_mismatch(other, column),
                    })
                    .collect::<Result<_>>()?;
                Series::new(name, data)
            }
            ColumnType::String => {
                let data: Vec<Option<&str>> = values
                    .map(|v| match v {
                        Value::String(s) => Ok(Some(s.as_str())),
                        other => null_or_mismatch(other, column),
                    })
                    .collect::<Result<_>>()?;
                Series::new(name, data)
            }
        };
        columns.push(series);
    }

    DataFrame::new(columns).map_err(|e| PitError::Storage(format!("Failed to build DataFrame: {}", e)))
}

fn null_or_mismatch<T>(value: &Value, column: &Column) -> Result<Option<T>> {
    match value {
        Value::Null => Ok(None),
        other => Err(PitError::MalformedInput(format!(
            "column '{}' is {} but holds {:?}",
            column.name, column.column_type, other
        ))),
    }
}

/// Read a DataFrame back into a Table.
///
/// Integer widths collapse to i64 (unsigned values beyond i64 become
/// floats), temporal columns are read as their text form, and nested
/// columns are rejected. A column holding only nulls reads back with the
/// `Null` domain.
pub fn from_dataframe(df: &DataFrame) -> Result<Table> {
    let mut columns = Vec::with_capacity(df.width());
    let mut data: Vec<Vec<Value>> = Vec::with_capacity(df.width());

    for series in df.get_columns() {
        let (column_type, values) = series_values(series)?;
        columns.push(Column::new(series.name(), column_type));
        data.push(values);
    }

    // Column-major to row-major
    let mut rows: Vec<Vec<Value>> = (0..df.height())
        .map(|_| Vec::with_capacity(columns.len()))
        .collect();
    for values in data {
        for (row, value) in rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    Table::new(Schema::new(columns), rows)
}

fn series_values(series: &Series) -> Result<(ColumnType, Vec<Value>)> {
    let malformed = |e: PolarsError| {
        PitError::MalformedSource(format!("Failed to read column '{}': {}", series.name(), e))
    };

    // No observed value means no domain evidence, whatever the physical type
    if series.len() > 0 && series.null_count() == series.len() {
        return Ok((ColumnType::Null, vec![Value::Null; series.len()]));
    }

    let result = match series.dtype() {
        DataType::Null => (ColumnType::Null, vec![Value::Null; series.len()]),
        DataType::Boolean => {
            let values = series
                .bool()
                .map_err(malformed)?
                .into_iter()
                .map(|v| v.map(Value::Boolean).unwrap_or(Value::Null))
                .collect();
            (ColumnType::Boolean, values)
        }
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => integer_values(&series.cast(&DataType::Int64).map_err(malformed)?)?,
        DataType::UInt64 => match series.strict_cast(&DataType::Int64) {
            Ok(cast) => integer_values(&cast)?,
            Err(_) => float_values(&series.cast(&DataType::Float64).map_err(malformed)?)?,
        },
        DataType::Float32 | DataType::Float64 => {
            float_values(&series.cast(&DataType::Float64).map_err(malformed)?)?
        }
        DataType::String => text_values(series)?,
        dtype if dtype.is_temporal() => text_values(&series.cast(&DataType::String).map_err(malformed)?)?,
        dtype => {
            return Err(PitError::MalformedSource(format!(
                "column '{}' has unsupported type {}",
                series.name(),
                dtype
            )))
        }
    };

    Ok(result)
}

fn integer_values(series: &Series) -> Result<(ColumnType, Vec<Value>)> {
    let values = series
        .i64()
        .map_err(|e| PitError::MalformedSource(e.to_string()))?
        .into_iter()
        .map(|v| v.map(Value::Integer).unwrap_or(Value::Null))
        .collect();
    Ok((ColumnType::Integer, values))
}

fn float_values(series: &Series) -> Result<(ColumnType, Vec<Value>)> {
    let values = series
        .f64()
        .map_err(|e| PitError::MalformedSource(e.to_string()))?
        .into_iter()
        .map(|v| v.map(Value::Float).unwrap_or(Value::Null))
        .collect();
    Ok((ColumnType::Float, values))
}

fn text_values(series: &Series) -> Result<(ColumnType, Vec<Value>)> {
    let values = series
        .str()
        .map_err(|e| PitError::MalformedSource(e.to_string()))?
        .into_iter()
        .map(|v| v.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null))
        .collect();
    Ok((ColumnType::String, values))
}

/// Serialize a table as one Parquet file into `writer`.
pub fn write_parquet<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut df = to_dataframe(table)?;
    ParquetWriter::new(writer)
        .finish(&mut df)
        .map_err(|e| PitError::Storage(format!("Failed to write Parquet: {}", e)))?;
    Ok(())
}

/// Serialize a table as Parquet into memory.
pub fn parquet_bytes(table: &Table) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_parquet(table, &mut buffer)?;
    Ok(buffer)
}

/// Decode a Parquet file held in memory.
pub fn read_parquet_bytes(bytes: Vec<u8>, location: &str) -> Result<Table> {
    read_parquet(Cursor::new(bytes), location)
}

/// Decode a Parquet file from any seekable reader.
pub fn read_parquet<R: MmapBytesReader>(reader: R, location: &str) -> Result<Table> {
    let df = ParquetReader::new(reader)
        .finish()
        .map_err(|e| PitError::MalformedSource(format!("Failed to read Parquet {}: {}", location, e)))?;
    from_dataframe(&df)
}
