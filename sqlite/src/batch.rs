//! Transactional batch execution.
//!
//! A [`BatchJobs`] queue collects insert, update and delete statements built
//! from entity descriptors. Applying the queue runs every statement in order
//! inside one transaction and commits only when all of them succeed.
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
//! let mut jobs = db.batch();
//! jobs.add_insert(&Person { id: 0, age: 31 })
//!     .unwrap()
//!     .add_delete_where::<Person, _, _>("age < ?", values![18])
//!     .unwrap();
//!
//! if !db.apply_batch(jobs) {
//!     eprintln!("batch rolled back");
//! }
//! ```

use std::sync::Arc;

use entity_schema_core::{EntityDef, Record, Registry, UNSAVED, Value};
use rusqlite::Connection;
use tracing::{debug, error, info};

use crate::convert::{self, MarshalMode};
use crate::error::{Result, SqliteError};
use crate::schema;
use crate::statement::{Statement, bind_args};

/// One-shot queue of statements applied atomically.
#[derive(Debug)]
pub struct BatchJobs {
    registry: Arc<Registry>,
    mode: MarshalMode,
    jobs: Vec<Statement>,
}

impl BatchJobs {
    pub(crate) fn new(registry: Arc<Registry>, mode: MarshalMode) -> Self {
        Self {
            registry,
            mode,
            jobs: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Queued statements in application order.
    pub fn statements(&self) -> &[Statement] {
        &self.jobs
    }

    fn describe<T: Record>(&self) -> Result<Arc<EntityDef>> {
        Ok(self.registry.describe::<T>()?)
    }

    fn push(&mut self, statement: Statement) -> &mut Self {
        self.jobs.push(statement);
        self
    }

    /// Queues a prebuilt statement as is.
    pub fn add_statement(&mut self, statement: Statement) -> &mut Self {
        self.push(statement)
    }

    /// Queues the insert of one record. An unsaved key is left to the engine.
    pub fn add_insert<T: Record>(&mut self, record: &T) -> Result<&mut Self> {
        let def = self.describe::<T>()?;
        let row = convert::to_row(record, &def, self.mode)?;
        Ok(self.push(schema::insert_statement(&def, row)?))
    }

    pub fn add_inserts<T: Record>(&mut self, records: &[T]) -> Result<&mut Self> {
        for record in records {
            self.add_insert(record)?;
        }
        Ok(self)
    }

    /// Queues an update of every column of a saved record, matched by key.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::UnsavedRecord`] if the record has no key yet.
    pub fn add_update_by_id<T: Record>(&mut self, record: &T) -> Result<&mut Self> {
        let def = self.describe::<T>()?;
        let id = convert::record_key(record, &def)?;
        if id == UNSAVED {
            return Err(SqliteError::UnsavedRecord(def.label().to_string()));
        }
        let predicate = schema::key_predicate(&def)?;
        let values = convert::to_row(record, &def, self.mode)?;
        let statement =
            schema::update_statement(&def, values, Some(&predicate), &[Value::Integer(id)])?;
        Ok(self.push(statement))
    }

    /// Queues an update setting `values` on every row of `T`'s table.
    pub fn add_update<T: Record>(&mut self, values: Vec<(String, Value)>) -> Result<&mut Self> {
        let def = self.describe::<T>()?;
        Ok(self.push(schema::update_statement(&def, values, None, &[])?))
    }

    /// Queues an update of the rows matching a predicate.
    pub fn add_update_where<T, I, V>(
        &mut self,
        values: Vec<(String, Value)>,
        clause: &str,
        args: I,
    ) -> Result<&mut Self>
    where
        T: Record,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let def = self.describe::<T>()?;
        let args = bind_args(args)?;
        Ok(self.push(schema::update_statement(&def, values, Some(clause), &args)?))
    }

    /// Queues the delete of a record by its key. Unsaved records queue
    /// nothing.
    pub fn add_delete<T: Record>(&mut self, record: &T) -> Result<&mut Self> {
        let def = self.describe::<T>()?;
        let id = convert::record_key(record, &def)?;
        self.add_delete_by_id::<T>(id)
    }

    pub fn add_delete_by_id<T: Record>(&mut self, id: i64) -> Result<&mut Self> {
        let def = self.describe::<T>()?;
        let predicate = schema::key_predicate(&def)?;
        if id == UNSAVED {
            return Ok(self);
        }
        Ok(self.push(schema::delete_statement(
            &def,
            Some(&predicate),
            &[Value::Integer(id)],
        )?))
    }

    /// Queues the delete of every row of `T`'s table.
    pub fn add_delete_all<T: Record>(&mut self) -> Result<&mut Self> {
        let def = self.describe::<T>()?;
        Ok(self.push(schema::delete_statement(&def, None, &[])?))
    }

    pub fn add_delete_where<T, I, V>(&mut self, clause: &str, args: I) -> Result<&mut Self>
    where
        T: Record,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let def = self.describe::<T>()?;
        let args = bind_args(args)?;
        Ok(self.push(schema::delete_statement(&def, Some(clause), &args)?))
    }

    /// Applies the queue in one transaction.
    ///
    /// Returns the total number of rows changed. On the first failing
    /// statement the transaction is rolled back and
    /// [`SqliteError::BatchAborted`] names its position.
    pub(crate) fn apply(self, conn: &Connection) -> Result<usize> {
        let tx = conn.unchecked_transaction()?;
        let mut changed = 0;
        for (index, statement) in self.jobs.iter().enumerate() {
            debug!(index, sql = %statement.to_inline_sql(), "batch job");
            match statement.execute(conn) {
                Ok(rows) => changed += rows,
                Err(source) => {
                    error!(index, error = %source, jobs = self.jobs.len(), "batch aborted");
                    return Err(SqliteError::BatchAborted { index, source });
                }
            }
        }
        tx.commit()?;
        info!(jobs = self.jobs.len(), changed, "batch applied");
        Ok(changed)
    }
}
