//! SQL generation for tables and rows.
//!
//! Builds `CREATE TABLE`, `ALTER TABLE ... ADD`, `INSERT`, `UPDATE` and
//! `DELETE` statements from resolved [`EntityDef`]s. Every value travels as a
//! bind argument; only validated identifiers are spliced into the text.
//!
//! # Column clause layout
//!
//! ```text
//! <name> <TYPE> [PRIMARY KEY AUTOINCREMENT] [DEFAULT '<v>'] [UNIQUE] [NOT NULL] [REFERENCES <t>(<c>)]
//! ```

use entity_schema_core::{ColumnDef, EntityDef, Value};

use crate::error::{Result, SqliteError};
use crate::statement::Statement;

/// Validates that a table or column name contains only alphanumeric
/// characters and underscores.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SqliteError::InvalidIdentifier(name.to_string()));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(SqliteError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Returns the table of a persisted entity, rejecting join views.
pub(crate) fn writable_table(def: &EntityDef) -> Result<&str> {
    def.table()
        .ok_or_else(|| SqliteError::NotModifiable(def.label().to_string()))
}

/// Renders one column clause of a `CREATE TABLE` statement.
fn column_clause(column: &ColumnDef, table: &str) -> Result<String> {
    validate_identifier(&column.name)?;
    column.check_default(table)?;

    let mut clause = format!("{} {}", column.name, column.kind.sql_type());
    if column.primary_key {
        clause.push_str(" PRIMARY KEY AUTOINCREMENT");
    }
    if let Some(default) = &column.default {
        clause.push_str(&format!(" DEFAULT '{}'", default.replace('\'', "''")));
    }
    if column.unique {
        clause.push_str(" UNIQUE");
    }
    if column.not_null {
        clause.push_str(" NOT NULL");
    }
    if let Some(foreign) = &column.foreign {
        validate_identifier(&foreign.table)?;
        validate_identifier(&foreign.column)?;
        clause.push_str(&format!(" REFERENCES {}({})", foreign.table, foreign.column));
    }
    Ok(clause)
}

/// Builds the `CREATE TABLE IF NOT EXISTS` statement for a persisted entity.
///
/// Columns appear in declaration order.
///
/// # Errors
///
/// Returns [`SqliteError::NotModifiable`] for join views,
/// [`SqliteError::InvalidIdentifier`] for unusable names, or
/// [`SchemaError::UnsupportedDefaultForBlob`](entity_schema_core::SchemaError::UnsupportedDefaultForBlob)
/// for blob columns with a default.
pub fn create_table_statement(def: &EntityDef) -> Result<Statement> {
    let table = writable_table(def)?;
    validate_identifier(table)?;

    let clauses = def
        .columns()
        .iter()
        .map(|column| column_clause(column, table))
        .collect::<Result<Vec<_>>>()?;

    Ok(Statement::new(format!(
        "CREATE TABLE IF NOT EXISTS {table} ({})",
        clauses.join(", ")
    )))
}

/// Builds the additive `ALTER TABLE <table> ADD <col> <kind>` statement.
pub fn add_column_statement(table: &str, column: &ColumnDef) -> Result<Statement> {
    validate_identifier(table)?;
    validate_identifier(&column.name)?;
    Ok(Statement::new(format!(
        "ALTER TABLE {table} ADD {} {}",
        column.name,
        column.kind.sql_type()
    )))
}

/// Builds an `INSERT` for a marshaled row.
///
/// An empty row (only an unsaved key) inserts default values.
pub fn insert_statement(def: &EntityDef, row: Vec<(String, Value)>) -> Result<Statement> {
    let table = writable_table(def)?;
    if row.is_empty() {
        return Ok(Statement::new(format!("INSERT INTO {table} DEFAULT VALUES")));
    }

    let (names, args): (Vec<String>, Vec<Value>) = row.into_iter().unzip();
    let placeholders = vec!["?"; names.len()].join(", ");
    Ok(Statement::with_args(
        format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            names.join(", ")
        ),
        args,
    ))
}

/// Builds an `UPDATE` setting `values` on rows matching `where_clause`.
///
/// The primary key column is never part of the `SET` list. Bind arguments
/// are the set values followed by `where_args`.
///
/// # Errors
///
/// Returns [`SqliteError::EmptyUpdate`] if nothing is left to set.
pub fn update_statement(
    def: &EntityDef,
    values: Vec<(String, Value)>,
    where_clause: Option<&str>,
    where_args: &[Value],
) -> Result<Statement> {
    let table = writable_table(def)?;
    let key = def.primary_key().map(|c| c.name.as_str());

    let mut assignments = Vec::with_capacity(values.len());
    let mut args = Vec::with_capacity(values.len() + where_args.len());
    for (name, value) in values {
        if Some(name.as_str()) == key {
            continue;
        }
        validate_identifier(&name)?;
        assignments.push(format!("{name} = ?"));
        args.push(value);
    }
    if assignments.is_empty() {
        return Err(SqliteError::EmptyUpdate(table.to_string()));
    }

    let mut sql = format!("UPDATE {table} SET {}", assignments.join(", "));
    if let Some(clause) = where_clause.filter(|w| !w.trim().is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
        args.extend_from_slice(where_args);
    }
    Ok(Statement::with_args(sql, args))
}

/// Builds a `DELETE`, unconditional when `where_clause` is `None` or blank.
pub fn delete_statement(
    def: &EntityDef,
    where_clause: Option<&str>,
    where_args: &[Value],
) -> Result<Statement> {
    let table = writable_table(def)?;
    match where_clause.filter(|w| !w.trim().is_empty()) {
        Some(clause) => Ok(Statement::with_args(
            format!("DELETE FROM {table} WHERE {clause}"),
            where_args.to_vec(),
        )),
        None => Ok(Statement::new(format!("DELETE FROM {table}"))),
    }
}

/// `"<pk> = ?"` for an entity, or [`SqliteError::NoPrimaryKey`].
pub(crate) fn key_predicate(def: &EntityDef) -> Result<String> {
    def.primary_key()
        .map(|key| format!("{} = ?", key.name))
        .ok_or_else(|| SqliteError::NoPrimaryKey(def.label().to_string()))
}
