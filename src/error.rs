use thiserror::Error;

#[derive(Error, Debug)]
pub enum PitError {
    #[error("Invalid mode: {0} (mode can be either file or database)")]
    InvalidMode(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Storage configuration error: {0}")]
    StorageConfig(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Malformed source: {0}")]
    MalformedSource(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fieldless discriminant of [`PitError`], for callers that branch on the
/// failure kind rather than on its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidMode,
    UnknownCommand,
    StorageConfig,
    EmptyInput,
    SourceNotFound,
    MalformedSource,
    MalformedInput,
    UnknownColumn,
    Storage,
    Io,
}

impl PitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PitError::InvalidMode(_) => ErrorKind::InvalidMode,
            PitError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            PitError::StorageConfig(_) => ErrorKind::StorageConfig,
            PitError::EmptyInput(_) => ErrorKind::EmptyInput,
            PitError::SourceNotFound(_) => ErrorKind::SourceNotFound,
            PitError::MalformedSource(_) => ErrorKind::MalformedSource,
            PitError::MalformedInput(_) => ErrorKind::MalformedInput,
            PitError::UnknownColumn(_) => ErrorKind::UnknownColumn,
            PitError::Storage(_) => ErrorKind::Storage,
            PitError::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, PitError>;
