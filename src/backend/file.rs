//! File backend - one Parquet file per destination, local or on S3
//!
//! Local writes go to a temporary file beside the destination and are
//! renamed into place, so a failed write never leaves a partial file.
//! Remote writes are a single object put.

use super::{require_columns, Backend};
use crate::config::StorageConfig;
use crate::error::{PitError, Result};
use crate::frame;
use crate::session::{is_remote, open_session, open_session_with_store, Session};
use crate::table::Table;
use object_store::ObjectStore;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct FileBackend {
    object_store: Option<Arc<dyn ObjectStore>>,
}

impl FileBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `s3://bucket/key` locations inside `store` instead of S3.
    pub fn with_object_store(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            object_store: Some(store),
        }
    }
}

impl Backend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn provision(&self, config: &StorageConfig) -> Result<Session> {
        match &self.object_store {
            Some(store) => Ok(open_session_with_store(Arc::clone(store))),
            None => open_session(config),
        }
    }

    fn ingest(&self, destination: &str, table: &Table, config: &StorageConfig) -> Result<()> {
        require_columns(destination, table)?;
        let session = self.provision(config)?;

        if is_remote(destination) {
            let bytes = frame::parquet_bytes(table)?;
            session.remote()?.write(destination, bytes)?;
        } else {
            write_local(Path::new(destination), table)?;
        }

        info!("Wrote {} rows to {}", table.len(), destination);
        Ok(())
    }

    fn load_source(&self, session: &Session, source: &str) -> Result<Table> {
        if is_remote(source) {
            let bytes = session.remote()?.read(source)?;
            return frame::read_parquet_bytes(bytes, source);
        }

        let path = Path::new(source);
        if !path.exists() {
            return Err(PitError::SourceNotFound(source.to_string()));
        }
        if !path.is_file() {
            return Err(PitError::MalformedSource(format!("{} is not a file", source)));
        }

        let file = File::open(path)?;
        frame::read_parquet(file, source)
    }
}

fn write_local(path: &Path, table: &Table) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut staged = tempfile::Builder::new()
        .prefix(".pit-")
        .suffix(".parquet.tmp")
        .tempfile_in(parent)?;
    frame::write_parquet(table, staged.as_file_mut())?;
    staged.as_file().sync_all()?;

    staged.persist(path).map_err(|e| {
        PitError::Storage(format!("Failed to move Parquet into place at {}: {}", path.display(), e.error))
    })?;
    Ok(())
}
