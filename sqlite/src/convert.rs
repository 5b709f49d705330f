//! Conversion between records and SQLite rows.
//!
//! [`to_row`] flattens a record into ordered `(column, value)` pairs for
//! writes; [`from_row`] builds a fresh record from a result row, reading each
//! column with the accessor matching its declared [`ColumnKind`].
//!
//! # Write rules
//!
//! - An unsaved primary key (`0` or `NULL`) is left out so the engine assigns it.
//! - Missing values are replaced by the kind's zero value, except for NOT NULL
//!   columns under [`MarshalMode::Strict`], which fail with
//!   [`SqliteError::NullableViolation`].

use entity_schema_core::{ColumnDef, ColumnKind, EntityDef, Record, UNSAVED, Value};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SqliteError};

/// How missing field values are treated on writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarshalMode {
    /// Substitute zero values for every missing value.
    #[default]
    Lenient,
    /// Reject missing values on NOT NULL columns.
    Strict,
}

/// Flattens a record into `(column, value)` pairs in declaration order.
///
/// # Errors
///
/// Returns [`SqliteError::NullableViolation`] under [`MarshalMode::Strict`]
/// when a NOT NULL column has no value.
pub fn to_row<T: Record>(
    record: &T,
    def: &EntityDef,
    mode: MarshalMode,
) -> Result<Vec<(String, Value)>> {
    let mut row = Vec::with_capacity(def.columns().len());
    for column in def.columns() {
        let value = record.field(&column.field);
        if column.primary_key {
            if is_unsaved(&value) {
                continue;
            }
            row.push((column.name.clone(), value));
            continue;
        }

        let value = if value.is_null() {
            if column.not_null && mode == MarshalMode::Strict {
                return Err(SqliteError::NullableViolation {
                    table: def.label().to_string(),
                    column: column.name.clone(),
                });
            }
            column.kind.zero_value()
        } else {
            value
        };
        row.push((column.name.clone(), value));
    }
    Ok(row)
}

/// Reads the primary key of a record, `UNSAVED` when it has none yet.
pub fn record_key<T: Record>(record: &T, def: &EntityDef) -> Result<i64> {
    let key = def
        .primary_key()
        .ok_or_else(|| SqliteError::NoPrimaryKey(def.label().to_string()))?;
    match record.field(&key.field) {
        Value::Integer(id) => Ok(id),
        Value::Null => Ok(UNSAVED),
        other => Err(SqliteError::FieldCoercion {
            table: def.label().to_string(),
            field: key.field.clone(),
            column: key.name.clone(),
            reason: format!("primary key holds a {} value", other.type_name()),
        }),
    }
}

/// Writes an engine-assigned key back into the record.
pub fn assign_key<T: Record>(record: &mut T, def: &EntityDef, id: i64) -> Result<()> {
    let key = def
        .primary_key()
        .ok_or_else(|| SqliteError::NoPrimaryKey(def.label().to_string()))?;
    record
        .set_field(&key.field, Value::Integer(id))
        .map_err(|e| coercion_error(def, key, e.to_string()))
}

/// Builds a record from a result row.
///
/// Only columns named in `filter` are read; an empty filter reads every
/// column of the entity.
///
/// # Errors
///
/// Returns [`SqliteError::FieldCoercion`] naming the field and table when a
/// column is missing from the row or its value does not fit the field.
pub fn from_row<T: Record>(row: &Row<'_>, def: &EntityDef, filter: &[String]) -> Result<T> {
    let mut record = T::default();
    for column in def.columns() {
        if !filter.is_empty() && !filter.iter().any(|name| *name == column.name) {
            continue;
        }
        let value = read_column(row, column).map_err(|e| coercion_error(def, column, e.to_string()))?;
        record
            .set_field(&column.field, value)
            .map_err(|e| coercion_error(def, column, e.to_string()))?;
    }
    Ok(record)
}

fn read_column(row: &Row<'_>, column: &ColumnDef) -> rusqlite::Result<Value> {
    let name = column.name.as_str();
    let value = match column.kind {
        ColumnKind::Integer => row.get::<_, Option<i64>>(name)?.map(Value::Integer),
        ColumnKind::Real => row.get::<_, Option<f64>>(name)?.map(Value::Real),
        ColumnKind::Text => row.get::<_, Option<String>>(name)?.map(Value::Text),
        ColumnKind::Blob => row.get::<_, Option<Vec<u8>>>(name)?.map(Value::Blob),
        ColumnKind::Boolean => row
            .get::<_, Option<i64>>(name)?
            .map(|v| Value::Bool(v == 1)),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn is_unsaved(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Integer(UNSAVED))
}

fn coercion_error(def: &EntityDef, column: &ColumnDef, reason: String) -> SqliteError {
    SqliteError::FieldCoercion {
        table: def.label().to_string(),
        field: column.field.clone(),
        column: column.name.clone(),
        reason,
    }
}
