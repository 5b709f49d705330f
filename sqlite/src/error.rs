//! Error types for the SQLite mapping engine.
//!
//! Provides a unified error type covering declaration problems, marshaling
//! and binding failures, engine errors and configuration I/O.

use entity_schema_core::SchemaError;
use thiserror::Error;

/// Errors that can occur while mapping records onto SQLite.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// The entity declaration is invalid.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The engine rejected or failed a statement.
    #[error("query failed: {0}")]
    QueryFailed(#[from] rusqlite::Error),

    /// A NOT NULL column had no value under strict marshaling.
    #[error("column {column} in {table} is NOT NULL but the record has no value")]
    NullableViolation { table: String, column: String },

    /// A result value could not be assigned to a record field.
    #[error("cannot read column {column} into field {field} of {table}: {reason}")]
    FieldCoercion {
        table: String,
        field: String,
        column: String,
        reason: String,
    },

    /// A where argument has no driver-native scalar form.
    #[error("argument {index} of type {type_name} is not supported as a bind argument")]
    UnsupportedBindArgument {
        index: usize,
        type_name: &'static str,
    },

    /// Writes against a join view.
    #[error("{0} is a join view and cannot be modified")]
    NotModifiable(String),

    /// A key lookup on an entity without primary key column.
    #[error("{0} has no primary key column")]
    NoPrimaryKey(String),

    /// A key-based write on a record that was never saved.
    #[error("record of {0} has not been saved yet")]
    UnsavedRecord(String),

    /// An update without any column to set.
    #[error("nothing to update in {0}")]
    EmptyUpdate(String),

    /// Table or column name contains characters other than alphanumerics
    /// and underscores.
    #[error("invalid identifier '{0}': must contain only alphanumeric characters and underscores")]
    InvalidIdentifier(String),

    /// A batch statement failed; nothing from the batch was applied.
    #[error("batch aborted at statement {index}: {source}")]
    BatchAborted {
        index: usize,
        #[source]
        source: rusqlite::Error,
    },

    /// Configured schema versions start at 1; 0 marks a fresh file.
    #[error("schema version must be at least 1, got {0}")]
    InvalidVersion(u32),

    /// The database file was written by a newer schema version.
    #[error("database version {found} is newer than configured version {expected}")]
    VersionDowngrade { found: i64, expected: u32 },

    /// Configuration file I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
