//! Database backend - named tables in an in-memory relational store
//!
//! Tables persist for as long as their [`RelationalStore`] lives; the shared
//! store lives for the whole process. Ingesting under an existing name
//! replaces the table inside one transaction.
//!
//! Table and column names are kept verbatim in a catalog and compared
//! exactly (case-sensitive). Physical tables and columns carry generated
//! names (`t<id>`, `c<position>`), so user text only ever reaches SQL as a
//! bound parameter.

use super::{require_columns, require_sources, search_reconciled, Backend};
use crate::config::StorageConfig;
use crate::error::{PitError, Result};
use crate::filter::{self, FilterConstraintSet};
use crate::session::Session;
use crate::table::{Column, ColumnType, Schema, Table, Value};
use itertools::Itertools;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, info};

static SHARED_STORE: OnceLock<Arc<RelationalStore>> = OnceLock::new();

const CATALOG_SCHEMA: &str = "
CREATE TABLE pit_tables (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE pit_columns (
    table_id INTEGER NOT NULL REFERENCES pit_tables(id),
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    column_type TEXT NOT NULL,
    PRIMARY KEY (table_id, position)
);
";

/// In-memory relational store holding named tables.
pub struct RelationalStore {
    conn: Mutex<Connection>,
}

impl RelationalStore {
    /// A private store, independent of the process-wide one.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PitError::Storage(format!("Failed to open in-memory store: {}", e)))?;
        conn.execute_batch(CATALOG_SCHEMA)
            .map_err(|e| PitError::Storage(format!("Failed to create store catalog: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// The process-wide store, created on first use.
    pub fn shared() -> Result<Arc<Self>> {
        if let Some(store) = SHARED_STORE.get() {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(Self::open_in_memory()?);
        // Another thread may have set it first; everyone gets the kept one
        let _ = SHARED_STORE.set(store);
        SHARED_STORE
            .get()
            .cloned()
            .ok_or_else(|| PitError::Storage("shared store unavailable".to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PitError::Storage("relational store lock poisoned".to_string()))
    }

    /// Names of the tables currently held, sorted.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT name FROM pit_tables ORDER BY name")
            .map_err(storage)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage)?;
        Ok(names)
    }
}

#[derive(Clone)]
pub struct DatabaseBackend {
    store: Arc<RelationalStore>,
}

impl DatabaseBackend {
    pub fn new(store: Arc<RelationalStore>) -> Self {
        Self { store }
    }

    /// Backend over the process-wide store.
    pub fn shared() -> Result<Self> {
        Ok(Self::new(RelationalStore::shared()?))
    }

    pub fn store(&self) -> &RelationalStore {
        &self.store
    }
}

impl Backend for DatabaseBackend {
    fn name(&self) -> &'static str {
        "database"
    }

    fn ingest(&self, destination: &str, table: &Table, config: &StorageConfig) -> Result<()> {
        require_columns(destination, table)?;
        let _session = self.provision(config)?;
        let mut conn = self.store.lock()?;

        // Dropped without commit on any error, which rolls everything back
        let tx = conn.transaction().map_err(storage)?;

        let existing = tx
            .query_row(
                "SELECT id FROM pit_tables WHERE name = ?1",
                [destination],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(storage)?;
        let table_id = match existing {
            Some(id) => id,
            None => {
                tx.execute("INSERT INTO pit_tables (name) VALUES (?1)", [destination])
                    .map_err(storage)?;
                tx.last_insert_rowid()
            }
        };
        let physical = physical_table(table_id);

        tx.execute(&format!("DROP TABLE IF EXISTS {}", physical), [])
            .map_err(storage)?;
        tx.execute("DELETE FROM pit_columns WHERE table_id = ?1", [table_id])
            .map_err(storage)?;

        let column_defs = table
            .schema()
            .columns
            .iter()
            .enumerate()
            .map(|(idx, c)| format!("{} {}", physical_column(idx), declared_type(c.column_type)))
            .join(", ");
        tx.execute(&format!("CREATE TABLE {} ({})", physical, column_defs), [])
            .map_err(storage)?;

        {
            let mut catalog = tx
                .prepare("INSERT INTO pit_columns (table_id, position, name, column_type) VALUES (?1, ?2, ?3, ?4)")
                .map_err(storage)?;
            for (idx, column) in table.schema().columns.iter().enumerate() {
                catalog
                    .execute(params![table_id, idx as i64, column.name, column.column_type.to_string()])
                    .map_err(storage)?;
            }

            let placeholders = (1..=table.schema().len()).map(|i| format!("?{}", i)).join(", ");
            let mut insert = tx
                .prepare(&format!("INSERT INTO {} VALUES ({})", physical, placeholders))
                .map_err(storage)?;
            for row in table.rows() {
                insert
                    .execute(params_from_iter(row.iter().map(to_sql)))
                    .map_err(storage)?;
            }
        }
        tx.commit().map_err(storage)?;

        info!("Created table {} with {} rows", destination, table.len());
        Ok(())
    }

    fn load_source(&self, _session: &Session, source: &str) -> Result<Table> {
        let conn = self.store.lock()?;
        let (table_id, schema) = table_schema(&conn, source)?;
        select_rows(&conn, table_id, source, schema, &[])
    }

    /// A single table is filtered inside the store with a parameterized
    /// WHERE clause; several tables go through the shared pipeline.
    fn search(
        &self,
        sources: &[String],
        constraints: &FilterConstraintSet,
        config: &StorageConfig,
    ) -> Result<Table> {
        require_sources(sources)?;
        let [source] = sources else {
            return search_reconciled(self, sources, constraints, config);
        };

        let _session = self.provision(config)?;
        let conn = self.store.lock()?;
        let (table_id, schema) = table_schema(&conn, source)?;
        let predicates = filter::compile(&schema, constraints)?;

        let mut bound = Vec::with_capacity(predicates.len());
        for predicate in &predicates {
            match &predicate.expected {
                Some(value) => bound.push((predicate.index, value.clone())),
                // literal has no reading in the column domain
                None => return Table::new(schema, Vec::new()),
            }
        }

        let matched = select_rows(&conn, table_id, source, schema, &bound)?;
        info!(
            "Search [{}] matched {} rows in table {}",
            constraints,
            matched.len(),
            source
        );
        Ok(matched)
    }
}

fn physical_table(table_id: i64) -> String {
    format!("t{}", table_id)
}

fn physical_column(position: usize) -> String {
    format!("c{}", position)
}

/// Catalog id and schema of the table named exactly `table`.
fn table_schema(conn: &Connection, table: &str) -> Result<(i64, Schema)> {
    let table_id = conn
        .query_row("SELECT id FROM pit_tables WHERE name = ?1", [table], |row| {
            row.get::<_, i64>(0)
        })
        .optional()
        .map_err(storage)?
        .ok_or_else(|| PitError::SourceNotFound(format!("table {}", table)))?;

    let mut stmt = conn
        .prepare("SELECT name, column_type FROM pit_columns WHERE table_id = ?1 ORDER BY position")
        .map_err(storage)?;
    let columns = stmt
        .query_map([table_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(storage)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage)?
        .into_iter()
        .map(|(name, domain)| Ok(Column::new(name, parse_domain(&domain, table)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok((table_id, Schema::new(columns)))
}

/// Rows of one table in insertion order, optionally restricted to rows where
/// each `(position, value)` column equals its value.
fn select_rows(
    conn: &Connection,
    table_id: i64,
    table: &str,
    schema: Schema,
    equal: &[(usize, Value)],
) -> Result<Table> {
    let projection = (0..schema.len()).map(physical_column).join(", ");
    let mut sql = format!("SELECT {} FROM {}", projection, physical_table(table_id));
    if !equal.is_empty() {
        let clause = equal
            .iter()
            .enumerate()
            .map(|(i, (position, _))| format!("{} = ?{}", physical_column(*position), i + 1))
            .join(" AND ");
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
    sql.push_str(" ORDER BY rowid");
    debug!("Relational store query for {}: {}", table, sql);

    let mut stmt = conn.prepare(&sql).map_err(storage)?;
    let mut cursor = stmt
        .query(params_from_iter(equal.iter().map(|(_, v)| to_sql(v))))
        .map_err(storage)?;

    let mut rows = Vec::new();
    while let Some(row) = cursor.next().map_err(storage)? {
        let mut values = Vec::with_capacity(schema.len());
        for (idx, column) in schema.columns.iter().enumerate() {
            let cell = row.get_ref(idx).map_err(storage)?;
            values.push(from_sql(cell, column, table)?);
        }
        rows.push(values);
    }

    Table::new(schema, rows)
}

/// Column affinity for the physical table.
fn declared_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Null => "",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Integer => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::String => "TEXT",
    }
}

fn parse_domain(text: &str, table: &str) -> Result<ColumnType> {
    match text {
        "null" => Ok(ColumnType::Null),
        "boolean" => Ok(ColumnType::Boolean),
        "integer" => Ok(ColumnType::Integer),
        "float" => Ok(ColumnType::Float),
        "string" => Ok(ColumnType::String),
        other => Err(PitError::MalformedSource(format!(
            "table {} has a column of unsupported type {}",
            table, other
        ))),
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Integer(*b as i64),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql(cell: ValueRef<'_>, column: &Column, table: &str) -> Result<Value> {
    let value = match (cell, column.column_type) {
        (ValueRef::Null, _) => Value::Null,
        (ValueRef::Integer(i), ColumnType::Boolean) => Value::Boolean(i != 0),
        (ValueRef::Integer(i), ColumnType::Integer) => Value::Integer(i),
        (ValueRef::Integer(i), ColumnType::Float) => Value::Float(i as f64),
        (ValueRef::Real(f), ColumnType::Float) => Value::Float(f),
        (ValueRef::Text(bytes), ColumnType::String) => Value::String(
            std::str::from_utf8(bytes)
                .map_err(|e| PitError::MalformedSource(format!("table {} holds invalid text: {}", table, e)))?
                .to_string(),
        ),
        (other, column_type) => {
            return Err(PitError::MalformedSource(format!(
                "table {} column '{}' is {} but holds {:?}",
                table,
                column.name,
                column_type,
                other.data_type()
            )))
        }
    };
    Ok(value)
}

fn storage(e: rusqlite::Error) -> PitError {
    PitError::Storage(format!("Relational store error: {}", e))
}
