use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TextDbError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Table already exists: {name}")]
    DuplicateTable { name: String },

    #[error("No such table: {name}")]
    NoSuchTable { name: String },

    #[error("Record already exists: {table}/{name}")]
    DuplicateRecord { table: String, name: String },

    #[error("No such record: {table}/{name}")]
    NoSuchRecord { table: String, name: String },

    #[error("Unknown field '{field}' in table '{table}'")]
    UnknownField { table: String, field: String },

    #[error("Invalid value for field '{field}' (kind {kind}): {message}")]
    InvalidValue {
        field: String,
        kind: String,
        message: String,
    },

    #[error(
        "Dangling reference: {table}/{record} field '{field}' points at missing record(s) {missing:?}"
    )]
    DanglingReference {
        table: String,
        record: String,
        field: String,
        missing: Vec<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, TextDbError>;

/// A non-fatal problem found while loading a database.
/// Degraded record files are loaded as plain content and reported here
/// instead of aborting the whole `open`.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    pub path: PathBuf,
    pub message: String,
}
