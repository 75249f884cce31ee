// Centralized error handling for the account store

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors returned by every lookup and mutation on the stores
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Malformed row in {file}: wrong number of fields in {row:?}")]
    MalformedRow { file: PathBuf, row: String },

    #[error("Invalid {field} field in {file}: {row:?}")]
    FieldType {
        file: PathBuf,
        row: String,
        field: &'static str,
    },

    #[error("No matching entry found")]
    NotFound,

    #[error("Entry already exists")]
    Exists,

    #[error("Missing required field: {0}")]
    RequiredField(&'static str),

    #[error("Home directory cannot be the home root {0:?}")]
    HomeConflict(String),

    #[error("Identifier {0} is already in use")]
    IdInUse(i64),

    #[error("No free identifier left in range [{low}, {high}]")]
    RangeExhausted { low: i64, high: i64 },

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound)
    }

    /// Tag a row-level error with the store it came from
    pub(crate) fn in_file(self, path: &Path) -> Self {
        match self {
            DbError::MalformedRow { row, .. } => DbError::MalformedRow {
                file: path.to_path_buf(),
                row,
            },
            DbError::FieldType { row, field, .. } => DbError::FieldType {
                file: path.to_path_buf(),
                row,
                field,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
