//! Configuration and coercion errors.
//!
//! [`SchemaError`]s are raised while an entity declaration is resolved and
//! always point at a mistake in the declaration itself. [`ValueError`]s are
//! raised when a value cannot be coerced into a field type.

use thiserror::Error;

use crate::types::Value;

/// Entity declaration errors, detected when a type is first described.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A persisted type declared neither a table name nor a join.
    #[error("no table name declared for type {type_name}")]
    MissingTableMetadata { type_name: String },

    /// A column's declared type has no primitive counterpart.
    #[error("field {field} of {type_name} has unsupported column type '{declared}'")]
    UnsupportedColumnType {
        type_name: String,
        field: String,
        declared: String,
    },

    /// Blob columns cannot carry a text default.
    #[error("column {column} in {table} is a blob and cannot declare a default value")]
    UnsupportedDefaultForBlob { table: String, column: String },

    /// A query-only type has no usable join specification.
    #[error("no join specification declared for type {type_name}")]
    NoJoinSpecification { type_name: String },

    /// Primary key declaration is missing, repeated or not an integer.
    #[error("invalid primary key on {type_name}: {reason}")]
    InvalidPrimaryKey { type_name: String, reason: String },

    /// Two columns map to the same physical name.
    #[error("duplicate column {column} in {type_name}")]
    DuplicateColumn { type_name: String, column: String },
}

/// Coercion failure between a [`Value`] and a field type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The value variant does not fit the field type.
    #[error("expected {expected} value, found {found}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// An integer does not fit into a narrower field type.
    #[error("integer {value} does not fit into {target}")]
    Overflow { value: i64, target: &'static str },

    /// The record has no field with this name.
    #[error("unknown field {0}")]
    UnknownField(String),
}

impl ValueError {
    pub(crate) fn mismatch(expected: &'static str, found: &Value) -> Self {
        ValueError::Mismatch {
            expected,
            found: found.type_name(),
        }
    }
}

/// Convenience alias for results with [`SchemaError`].
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;
