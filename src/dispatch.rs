//! Backend Selector - route one operation to the file or database backend
//!
//! Operations are a closed enum matched exhaustively, so every operation is
//! handled for every mode. Names coming from outside (mode, command) are
//! parsed at this boundary into [`Mode`] and [`Command`].

use crate::backend::{Backend, DatabaseBackend, FileBackend};
use crate::config::StorageConfig;
use crate::error::{PitError, Result};
use crate::filter::FilterConstraintSet;
use crate::normalize::normalize_json;
use crate::table::{Record, Table};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    File,
    Database,
}

impl FromStr for Mode {
    type Err = PitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(Mode::File),
            "database" => Ok(Mode::Database),
            other => Err(PitError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::File => write!(f, "file"),
            Mode::Database => write!(f, "database"),
        }
    }
}

/// Command names accepted on the command surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Dump,
    Retrieve,
    Search,
    Export,
}

impl FromStr for Command {
    type Err = PitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dump" => Ok(Command::Dump),
            "retrieve" => Ok(Command::Retrieve),
            "search" => Ok(Command::Search),
            "export" => Ok(Command::Export),
            other => Err(PitError::UnknownCommand(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Open and release a session without touching any data
    Provision,
    /// Normalize a JSON payload and persist it at `destination`
    Dump { destination: String, payload: String },
    Retrieve { sources: Vec<String> },
    Search {
        sources: Vec<String>,
        constraints: FilterConstraintSet,
    },
    /// Copy a relational table to one columnar file
    Export { table: String, destination: String },
}

impl Operation {
    /// Build an operation from a command name and its positional arguments.
    ///
    /// - `dump <destination> <payload>`
    /// - `retrieve <source>...`
    /// - `search <constraints> <source>...` where constraints is one
    ///   string of space-separated `column=value` pairs
    /// - `export <table> <destination>`
    pub fn parse(command: &str, args: &[String]) -> Result<Self> {
        let command: Command = command.parse()?;

        let operation = match (command, args) {
            (Command::Dump, [destination, payload]) => Operation::Dump {
                destination: destination.clone(),
                payload: payload.clone(),
            },
            (Command::Retrieve, sources) => Operation::Retrieve {
                sources: sources.to_vec(),
            },
            (Command::Search, [constraints, sources @ ..]) => Operation::Search {
                sources: sources.to_vec(),
                constraints: FilterConstraintSet::parse(constraints)?,
            },
            (Command::Export, [table, destination]) => Operation::Export {
                table: table.clone(),
                destination: destination.clone(),
            },
            (command, args) => {
                return Err(PitError::MalformedInput(format!(
                    "{:?} does not take {} argument(s)",
                    command,
                    args.len()
                )))
            }
        };
        Ok(operation)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Provision => "provision",
            Operation::Dump { .. } => "dump",
            Operation::Retrieve { .. } => "retrieve",
            Operation::Search { .. } => "search",
            Operation::Export { .. } => "export",
        }
    }
}

/// Result of a dispatched operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Side-effect only (dump, export, provision); serializes as `null`
    Done,
    /// Rows as flat JSON objects; serializes as an array
    Records(Vec<Record>),
}

impl Outcome {
    fn from_table(table: &Table) -> Self {
        Outcome::Records(table.to_records())
    }

    pub fn records(&self) -> Option<&[Record]> {
        match self {
            Outcome::Done => None,
            Outcome::Records(records) => Some(records),
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Outcome::Done => serializer.serialize_unit(),
            Outcome::Records(records) => {
                let mut seq = serializer.serialize_seq(Some(records.len()))?;
                for record in records {
                    seq.serialize_element(record)?;
                }
                seq.end()
            }
        }
    }
}

/// Holds one backend per mode.
#[derive(Clone)]
pub struct Dispatcher {
    file: FileBackend,
    database: DatabaseBackend,
}

impl Dispatcher {
    pub fn new(database: DatabaseBackend) -> Self {
        Self {
            file: FileBackend::new(),
            database,
        }
    }

    /// Dispatcher over the process-wide relational store.
    pub fn shared() -> Result<Self> {
        Ok(Self::new(DatabaseBackend::shared()?))
    }

    pub fn backend(&self, mode: Mode) -> &dyn Backend {
        match mode {
            Mode::File => &self.file,
            Mode::Database => &self.database,
        }
    }

    /// Parse `mode` and run the operation on the matching backend.
    pub fn dispatch(&self, operation: Operation, mode: &str, config: &StorageConfig) -> Result<Outcome> {
        let mode: Mode = mode.parse()?;
        self.run(operation, mode, config)
    }

    pub fn run(&self, operation: Operation, mode: Mode, config: &StorageConfig) -> Result<Outcome> {
        info!("Dispatching {} in {} mode", operation.name(), mode);
        let backend = self.backend(mode);

        match operation {
            Operation::Provision => {
                backend.provision(config)?;
                Ok(Outcome::Done)
            }
            Operation::Dump { destination, payload } => {
                let table = normalize_json(&payload)?;
                backend.ingest(&destination, &table, config)?;
                Ok(Outcome::Done)
            }
            Operation::Retrieve { sources } => {
                let table = backend.retrieve(&sources, config)?;
                Ok(Outcome::from_table(&table))
            }
            Operation::Search { sources, constraints } => {
                let table = backend.search(&sources, &constraints, config)?;
                Ok(Outcome::from_table(&table))
            }
            Operation::Export { table, destination } => {
                if mode != Mode::Database {
                    return Err(PitError::InvalidMode(format!(
                        "export reads from the relational store, not {}",
                        mode
                    )));
                }
                let rows = self.database.retrieve(&[table], config)?;
                self.file.ingest(&destination, &rows, config)?;
                Ok(Outcome::Done)
            }
        }
    }
}

/// Run one operation against the process-wide backends.
pub fn dispatch(operation: Operation, mode: &str, config: &StorageConfig) -> Result<Outcome> {
    Dispatcher::shared()?.dispatch(operation, mode, config)
}
