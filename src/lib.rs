//! pit - persist JSON record batches as Parquet files or relational tables
//!
//! Four operations (provision, ingest, retrieve, search) over two backends.
//! Records are normalized into a typed [`Table`] on the way in; reads from
//! several sources are reconciled under one widened schema on the way out.

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod frame;
pub mod normalize;
pub mod reconcile;
pub mod session;
pub mod table;

pub use backend::{Backend, DatabaseBackend, FileBackend, RelationalStore};
pub use config::StorageConfig;
pub use dispatch::{dispatch, Command, Dispatcher, Mode, Operation, Outcome};
pub use error::{ErrorKind, PitError, Result};
pub use filter::FilterConstraintSet;
pub use normalize::{normalize, normalize_json};
pub use session::{open_session, open_session_with_store, Session};
pub use table::{Column, ColumnType, Record, Schema, Table, Value};
