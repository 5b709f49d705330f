//! Condition builder and query execution.
//!
//! A [`Query`] is bound to one entity and one connection. Each `with_*` call
//! consumes the builder and returns a new configuration, so a query value
//! never leaks state into a later use; clone it to branch.
//!
//! Persisted types select `FROM <table>`; join views replace the `FROM`
//! clause with their rendered join chain and project their alias
//! expressions. Writes against views fail with
//! [`SqliteError::NotModifiable`].
//!
//! # Example
//!
//! ```no_run
//! # use entity_schema_core::*;
//! # #[derive(Default)] struct Person { id: i64, age: i32 }
//! # impl Record for Person {
//! #     fn entity() -> EntityBuilder {
//! #         EntityBuilder::new().table("person").column(Column::id("id")).column(Column::new("age", ColumnKind::Integer))
//! #     }
//! #     fn field(&self, f: &str) -> Value { match f { "id" => self.id.into(), "age" => self.age.into(), _ => Value::Null } }
//! #     fn set_field(&mut self, f: &str, v: Value) -> Result<(), ValueError> {
//! #         match f { "id" => self.id = FromValue::from_value(v)?, "age" => self.age = FromValue::from_value(v)?, o => return Err(ValueError::UnknownField(o.into())) }
//! #         Ok(())
//! #     }
//! # }
//! use entity_schema_sqlite::Database;
//!
//! let db = Database::open_in_memory().unwrap();
//! let adults = db
//!     .with_table::<Person>()
//!     .unwrap()
//!     .with_where("age >= ?", values![18])
//!     .unwrap()
//!     .with_order_by("age")
//!     .with_limit(0, 10)
//!     .search_as_list()
//!     .unwrap();
//! println!("{} adults", adults.len());
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use entity_schema_core::{EntityDef, JoinSpec, Record, Source, UNSAVED, Value};
use rusqlite::{Connection, OptionalExtension, Rows, params_from_iter};
use tracing::{debug, info, warn};

use crate::convert::{self, MarshalMode};
use crate::error::{Result, SqliteError};
use crate::schema::{self, writable_table};
use crate::statement::{Bind, Statement, bind_args};

/// Projection used by [`Query::count`].
const COUNT_COLUMN: &str = "count(*)";

/// Sequence value above which an unconditional delete resets the counter.
pub const SEQUENCE_RESET_THRESHOLD: i64 = i64::MAX / 4 * 3;

/// Renders the `FROM` source of a join view.
///
/// Chains of more than one link nest every link but the last in
/// parentheses: `((a JOIN b ON ..) JOIN c ON ..) JOIN d ON ..`.
pub fn render_join(spec: &JoinSpec) -> String {
    let keyword = spec.kind.keyword();
    let mut out = "(".repeat(spec.items.len().saturating_sub(1));
    for (index, item) in spec.items.iter().enumerate() {
        if index == 0 {
            out.push_str(&item.left_table);
        }
        out.push(' ');
        out.push_str(keyword);
        out.push(' ');
        out.push_str(&item.right_table);
        if spec.kind.has_condition() {
            out.push_str(&format!(
                " ON {}.{}={}.{}",
                item.left_table, item.left_column, item.right_table, item.right_column
            ));
        }
        if index + 1 < spec.items.len() {
            out.push(')');
        }
    }
    out
}

/// Stateless condition builder bound to an entity and a connection.
pub struct Query<'c, T> {
    conn: &'c Connection,
    def: Arc<EntityDef>,
    mode: MarshalMode,
    columns: Option<Vec<String>>,
    where_clause: Option<String>,
    where_args: Vec<Value>,
    group_by: Option<String>,
    having: Option<String>,
    order_by: Option<String>,
    limit: Option<(i64, i64)>,
    distinct: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for Query<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("entity", &self.def.label())
            .field("columns", &self.columns)
            .field("where_clause", &self.where_clause)
            .field("where_args", &self.where_args)
            .field("order_by", &self.order_by)
            .field("limit", &self.limit)
            .field("distinct", &self.distinct)
            .finish_non_exhaustive()
    }
}

impl<T> Clone for Query<'_, T> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn,
            def: Arc::clone(&self.def),
            mode: self.mode,
            columns: self.columns.clone(),
            where_clause: self.where_clause.clone(),
            where_args: self.where_args.clone(),
            group_by: self.group_by.clone(),
            having: self.having.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit,
            distinct: self.distinct,
            _record: PhantomData,
        }
    }
}

impl<'c, T: Record> Query<'c, T> {
    pub(crate) fn new(conn: &'c Connection, def: Arc<EntityDef>, mode: MarshalMode) -> Self {
        Self {
            conn,
            def,
            mode,
            columns: None,
            where_clause: None,
            where_args: Vec::new(),
            group_by: None,
            having: None,
            order_by: None,
            limit: None,
            distinct: false,
            _record: PhantomData,
        }
    }

    /// Descriptor of the bound entity.
    pub fn entity(&self) -> &EntityDef {
        &self.def
    }

    /// Restricts the projection to the given physical column names.
    ///
    /// Records read through this query only have these columns populated.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the where clause with `?` placeholders and its arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::UnsupportedBindArgument`] if an argument is not
    /// a string, number or boolean.
    pub fn with_where<I, V>(mut self, clause: impl Into<String>, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.where_args = bind_args(args)?;
        self.where_clause = Some(clause.into());
        Ok(self)
    }

    pub fn with_group_by(mut self, group_by: impl Into<String>) -> Self {
        self.group_by = Some(group_by.into());
        self
    }

    pub fn with_having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    /// Overrides the entity's default ordering.
    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// Skips `offset` rows and returns at most `size`.
    pub fn with_limit(mut self, offset: i64, size: i64) -> Self {
        self.limit = Some((offset, size));
        self
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    fn projection(&self) -> String {
        match &self.columns {
            Some(names) => names
                .iter()
                .map(|name| {
                    self.def
                        .column(name)
                        .map_or(name.as_str(), |c| c.projection())
                })
                .collect::<Vec<_>>()
                .join(", "),
            None => self
                .def
                .columns()
                .iter()
                .map(|c| c.projection())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Renders the `SELECT` this query would run.
    pub fn to_statement(&self) -> Statement {
        let source = match self.def.source() {
            Source::Table(table) => table.clone(),
            Source::Join(spec) => render_join(spec),
        };

        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.projection());
        sql.push_str(" FROM ");
        sql.push_str(&source);

        let mut args = Vec::new();
        if let Some(clause) = self.where_clause.as_deref().filter(|w| !w.trim().is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
            args.extend_from_slice(&self.where_args);
        }
        if let Some(group_by) = &self.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group_by);
            if let Some(having) = &self.having {
                sql.push_str(" HAVING ");
                sql.push_str(having);
            }
        }
        if let Some(order_by) = self.order_by.as_deref().or(self.def.order_by()) {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }
        if let Some((offset, size)) = self.limit {
            sql.push_str(&format!(" LIMIT {offset},{size}"));
        }
        Statement::with_args(sql, args)
    }

    /// Runs the `SELECT` and hands the open cursor to `consume`.
    ///
    /// The cursor is closed when this returns, whatever `consume` does.
    pub fn search<R>(&self, consume: impl FnOnce(&mut Rows<'_>) -> Result<R>) -> Result<R> {
        let statement = self.to_statement();
        debug!(sql = statement.sql(), args = statement.raw_args().len(), "search");
        let mut prepared = self.conn.prepare(statement.sql())?;
        let mut rows = prepared.query(params_from_iter(statement.raw_args().iter().map(Bind)))?;
        consume(&mut rows)
    }

    fn filter(&self) -> &[String] {
        self.columns.as_deref().unwrap_or_default()
    }

    /// Collects every matching record.
    ///
    /// A failure while stepping or converting a row ends the listing; the
    /// records read so far are returned and the failure is logged. Errors
    /// raised before the first row (preparing or binding) are returned.
    pub fn search_as_list(&self) -> Result<Vec<T>> {
        self.search(|rows| {
            let mut records = Vec::new();
            loop {
                let row = match rows.next() {
                    Ok(Some(row)) => row,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(table = self.def.label(), error = %e, read = records.len(), "listing stopped");
                        break;
                    }
                };
                match convert::from_row(row, &self.def, self.filter()) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(table = self.def.label(), error = %e, read = records.len(), "listing stopped");
                        break;
                    }
                }
            }
            Ok(records)
        })
    }

    /// Like [`search_as_list`](Self::search_as_list) but fails on the first
    /// row that cannot be read.
    pub fn try_search_as_list(&self) -> Result<Vec<T>> {
        self.search(|rows| {
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(convert::from_row(row, &self.def, self.filter())?);
            }
            Ok(records)
        })
    }

    /// First matching record, `None` when nothing matches.
    pub fn search_first(&self) -> Result<Option<T>> {
        self.search(|rows| match rows.next()? {
            Some(row) => convert::from_row(row, &self.def, self.filter()).map(Some),
            None => Ok(None),
        })
    }

    /// Looks a record up by primary key. The unsaved key never matches.
    pub fn search_by_id(&self, id: i64) -> Result<Option<T>> {
        let predicate = schema::key_predicate(&self.def)?;
        if id == UNSAVED {
            return Ok(None);
        }
        self.clone()
            .with_where(predicate, [id])?
            .search_first()
    }

    /// Number of matching rows; `0` for an empty result.
    ///
    /// Pagination is ignored: the count covers every row the where clause
    /// matches, not only the current page.
    pub fn count(&self) -> Result<i64> {
        let mut counting = self.clone().with_columns([COUNT_COLUMN]);
        counting.limit = None;
        counting.search(|rows| match rows.next()? {
            Some(row) => Ok(row.get::<_, i64>(0)?),
            None => Ok(0),
        })
    }

    /// Sets `values` on every matching row.
    ///
    /// The primary key is never updated. Returns the number of rows changed.
    pub fn update(&self, values: Vec<(String, Value)>) -> Result<usize> {
        let statement = schema::update_statement(
            &self.def,
            values,
            self.where_clause.as_deref(),
            &self.where_args,
        )?;
        self.execute(&statement)
    }

    /// Writes every column of a saved record back to its row.
    pub fn update_record(&self, record: &T) -> Result<usize> {
        writable_table(&self.def)?;
        let id = convert::record_key(record, &self.def)?;
        if id == UNSAVED {
            return Err(SqliteError::UnsavedRecord(self.def.label().to_string()));
        }
        let values = convert::to_row(record, &self.def, self.mode)?;
        let predicate = schema::key_predicate(&self.def)?;
        let statement =
            schema::update_statement(&self.def, values, Some(&predicate), &[Value::Integer(id)])?;
        self.execute(&statement)
    }

    /// Deletes every matching row.
    ///
    /// Without a where clause this empties the table and resets the
    /// auto-increment counter once it exceeds [`SEQUENCE_RESET_THRESHOLD`].
    pub fn delete(&self) -> Result<usize> {
        let table = writable_table(&self.def)?;
        let statement =
            schema::delete_statement(&self.def, self.where_clause.as_deref(), &self.where_args)?;
        let deleted = self.execute(&statement)?;
        let unconditional = self
            .where_clause
            .as_deref()
            .is_none_or(|w| w.trim().is_empty());
        if unconditional {
            reset_sequence_if_needed(self.conn, table)?;
        }
        Ok(deleted)
    }

    /// Deletes the row with the given key; the unsaved key deletes nothing.
    pub fn delete_by_id(&self, id: i64) -> Result<usize> {
        writable_table(&self.def)?;
        let predicate = schema::key_predicate(&self.def)?;
        if id == UNSAVED {
            return Ok(0);
        }
        self.clone().with_where(predicate, [id])?.delete()
    }

    pub fn delete_record(&self, record: &T) -> Result<usize> {
        writable_table(&self.def)?;
        let id = convert::record_key(record, &self.def)?;
        self.delete_by_id(id)
    }

    fn execute(&self, statement: &Statement) -> Result<usize> {
        debug!(sql = statement.sql(), args = statement.raw_args().len(), "execute");
        Ok(statement.execute(self.conn)?)
    }
}

/// Resets the auto-increment counter of `table` to zero when it has grown
/// past [`SEQUENCE_RESET_THRESHOLD`]. Returns whether a reset happened.
pub(crate) fn reset_sequence_if_needed(conn: &Connection, table: &str) -> Result<bool> {
    let has_sequences: bool = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='sqlite_sequence'",
        [],
        |row| Ok(row.get::<_, i64>(0)? > 0),
    )?;
    if !has_sequences {
        return Ok(false);
    }

    let seq: Option<i64> = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    match seq {
        Some(seq) if seq > SEQUENCE_RESET_THRESHOLD => {
            conn.execute("UPDATE sqlite_sequence SET seq = 0 WHERE name = ?1", [table])?;
            info!(table, seq, "auto-increment counter reset");
            Ok(true)
        }
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use entity_schema_core::{JoinItem, JoinKind};

    use super::*;

    #[test]
    fn test_render_single_inner_join() {
        let spec = JoinSpec::inner(vec![JoinItem::new("teacher", "_id", "student", "teacher_id")]);
        assert_eq!(
            render_join(&spec),
            "teacher INNER JOIN student ON teacher._id=student.teacher_id"
        );
    }

    #[test]
    fn test_render_chained_inner_join() {
        let spec = JoinSpec::inner(vec![
            JoinItem::new("a", "id", "b", "a_id"),
            JoinItem::new("b", "id", "c", "b_id"),
            JoinItem::new("c", "id", "d", "c_id"),
        ]);
        assert_eq!(
            render_join(&spec),
            "((a INNER JOIN b ON a.id=b.a_id) INNER JOIN c ON b.id=c.b_id) INNER JOIN d ON c.id=d.c_id"
        );
    }

    #[test]
    fn test_render_other_join_kinds() {
        let left = JoinSpec::left(JoinItem::new("a", "id", "b", "a_id"));
        assert_eq!(render_join(&left), "a LEFT JOIN b ON a.id=b.a_id");
        assert_eq!(render_join(&JoinSpec::cross("a", "b")), "a CROSS JOIN b");
        assert_eq!(render_join(&JoinSpec::natural("a", "b")), "a NATURAL JOIN b");
        assert_eq!(JoinKind::Natural.keyword(), "NATURAL JOIN");
    }
}
