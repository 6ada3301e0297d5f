//! Storage backends
//!
//! Both backends implement the same four operations. Retrieval and search
//! share one pipeline: open a session, load every source in the order given,
//! reconcile, then (for search) filter. A backend only has to know how to
//! persist a table and how to load one source.

pub mod database;
pub mod file;

pub use database::{DatabaseBackend, RelationalStore};
pub use file::FileBackend;

use crate::config::StorageConfig;
use crate::error::{PitError, Result};
use crate::filter::{self, FilterConstraintSet};
use crate::reconcile;
use crate::session::{open_session, Session};
use crate::table::Table;
use tracing::{debug, info};

pub trait Backend {
    /// Short name used in logs ("file", "database")
    fn name(&self) -> &'static str;

    /// Open the session every operation runs inside.
    fn provision(&self, config: &StorageConfig) -> Result<Session> {
        open_session(config)
    }

    /// Persist `table` at `destination`, replacing whatever was there.
    /// Either the whole table is committed or prior state is untouched.
    fn ingest(&self, destination: &str, table: &Table, config: &StorageConfig) -> Result<()>;

    /// Load one source as a table.
    fn load_source(&self, session: &Session, source: &str) -> Result<Table>;

    /// Load every source and concatenate them under the reconciled schema.
    fn retrieve(&self, sources: &[String], config: &StorageConfig) -> Result<Table> {
        require_sources(sources)?;
        let session = self.provision(config)?;
        let tables = load_all(self, &session, sources)?;
        let merged = reconcile::concat(tables)?;

        info!(
            "Retrieved {} rows from {} source(s) via {} backend",
            merged.len(),
            sources.len(),
            self.name()
        );
        Ok(merged)
    }

    /// Load, reconcile and keep rows satisfying every constraint.
    fn search(
        &self,
        sources: &[String],
        constraints: &FilterConstraintSet,
        config: &StorageConfig,
    ) -> Result<Table> {
        search_reconciled(self, sources, constraints, config)
    }
}

/// Retrieve under the reconciled schema, then filter in process.
pub(crate) fn search_reconciled<B: Backend + ?Sized>(
    backend: &B,
    sources: &[String],
    constraints: &FilterConstraintSet,
    config: &StorageConfig,
) -> Result<Table> {
    let merged = backend.retrieve(sources, config)?;
    let matched = filter::apply(merged, constraints)?;

    info!(
        "Search [{}] matched {} rows via {} backend",
        constraints,
        matched.len(),
        backend.name()
    );
    Ok(matched)
}

fn load_all<B: Backend + ?Sized>(backend: &B, session: &Session, sources: &[String]) -> Result<Vec<Table>> {
    sources
        .iter()
        .map(|source| {
            let table = backend.load_source(session, source)?;
            debug!("Loaded {} rows from {}", table.len(), source);
            Ok(table)
        })
        .collect()
}

pub(crate) fn require_sources(sources: &[String]) -> Result<()> {
    if sources.is_empty() {
        return Err(PitError::EmptyInput("at least one source is required".to_string()));
    }
    Ok(())
}

/// A table without columns has nothing to persist.
pub(crate) fn require_columns(destination: &str, table: &Table) -> Result<()> {
    if table.schema().is_empty() {
        return Err(PitError::EmptyInput(format!(
            "refusing to write {}: the payload has no columns",
            destination
        )));
    }
    Ok(())
}
