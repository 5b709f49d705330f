//! Connection facade tying the registry, builders and executors together.
//!
//! A [`Database`] owns one connection and one [`Registry`]. It hands out
//! [`Query`] builders bound to a record type, saves records, runs migrations
//! and applies batch queues, always against that single connection.

use std::path::Path;
use std::sync::Arc;

use entity_schema_core::{EntityDef, Record, Registry, SchemaError, UNSAVED};
use rusqlite::Connection;
use tracing::debug;

use crate::batch::BatchJobs;
use crate::convert::{self, MarshalMode};
use crate::error::Result;
use crate::migration::{Migration, MigrationReport};
use crate::query::Query;
use crate::schema::{self, writable_table};

/// A live connection plus the entity descriptors mapped onto it.
///
/// # Examples
///
/// ```
/// use entity_schema_core::*;
/// use entity_schema_sqlite::Database;
///
/// #[derive(Default)]
/// struct Person {
///     id: i64,
///     name: String,
///     age: i32,
/// }
///
/// impl Record for Person {
///     fn entity() -> EntityBuilder {
///         EntityBuilder::new()
///             .table("person")
///             .column(Column::id("id"))
///             .column(Column::new("name", ColumnKind::Text).not_null())
///             .column(Column::new("age", ColumnKind::Integer))
///     }
///
///     fn field(&self, field: &str) -> Value {
///         match field {
///             "id" => self.id.into(),
///             "name" => self.name.as_str().into(),
///             "age" => self.age.into(),
///             _ => Value::Null,
///         }
///     }
///
///     fn set_field(&mut self, field: &str, value: Value) -> Result<(), ValueError> {
///         match field {
///             "id" => self.id = FromValue::from_value(value)?,
///             "name" => self.name = FromValue::from_value(value)?,
///             "age" => self.age = FromValue::from_value(value)?,
///             other => return Err(ValueError::UnknownField(other.to_string())),
///         }
///         Ok(())
///     }
/// }
///
/// let db = Database::open_in_memory().unwrap();
/// db.create_tables(&[db.describe::<Person>().unwrap()]).unwrap();
///
/// let mut alice = Person { id: 0, name: "Alice".into(), age: 30 };
/// assert_eq!(db.save(&mut alice).unwrap(), 1);
/// assert_eq!(alice.id, 1);
///
/// let adults = db
///     .with_table::<Person>()
///     .unwrap()
///     .with_where("age > ?", values![20])
///     .unwrap();
/// assert_eq!(adults.count().unwrap(), 1);
/// ```
pub struct Database {
    conn: Connection,
    registry: Arc<Registry>,
    mode: MarshalMode,
}

impl Database {
    /// Wraps a connection with a fresh registry.
    pub fn new(conn: Connection) -> Self {
        Self::with_registry(conn, Arc::new(Registry::new()))
    }

    /// Wraps a connection, sharing descriptors with other databases.
    pub fn with_registry(conn: Connection, registry: Arc<Registry>) -> Self {
        Self {
            conn,
            registry,
            mode: MarshalMode::default(),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    /// Sets how missing values are marshaled on writes.
    pub fn with_mode(mut self, mode: MarshalMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> MarshalMode {
        self.mode
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the database and returns the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Descriptor of `T`, described on first use.
    pub fn describe<T: Record>(&self) -> Result<Arc<EntityDef>> {
        Ok(self.registry.describe::<T>()?)
    }

    /// Query builder over `T`, a table or a join view.
    pub fn with_table<T: Record>(&self) -> Result<Query<'_, T>> {
        let def = self.describe::<T>()?;
        Ok(Query::new(&self.conn, def, self.mode))
    }

    /// Query builder over a join view.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NoJoinSpecification`] if `T` is a plain table.
    pub fn with_view<T: Record>(&self) -> Result<Query<'_, T>> {
        let def = self.describe::<T>()?;
        if !def.is_view() {
            return Err(SchemaError::NoJoinSpecification {
                type_name: def.type_name().to_string(),
            }
            .into());
        }
        Ok(Query::new(&self.conn, def, self.mode))
    }

    /// Inserts a record and returns its key.
    ///
    /// An unsaved record receives the engine-assigned key, which is also
    /// written back into it.
    pub fn save<T: Record>(&self, record: &mut T) -> Result<i64> {
        let def = self.describe::<T>()?;
        self.insert(&def, record)
    }

    /// Inserts every record in one transaction, writing each key back.
    ///
    /// Either all records are stored or none are.
    pub fn save_all<T: Record>(&self, records: &mut [T]) -> Result<Vec<i64>> {
        let def = self.describe::<T>()?;
        let tx = self.conn.unchecked_transaction()?;
        let ids = records
            .iter_mut()
            .map(|record| self.insert(&def, record))
            .collect::<Result<Vec<_>>>()?;
        tx.commit()?;
        Ok(ids)
    }

    fn insert<T: Record>(&self, def: &EntityDef, record: &mut T) -> Result<i64> {
        writable_table(def)?;
        let key = convert::record_key(record, def)?;
        let row = convert::to_row(record, def, self.mode)?;
        let statement = schema::insert_statement(def, row)?;
        debug!(sql = statement.sql(), args = statement.raw_args().len(), "insert");
        statement.execute(&self.conn)?;

        if key != UNSAVED {
            return Ok(key);
        }
        let id = self.conn.last_insert_rowid();
        convert::assign_key(record, def, id)?;
        Ok(id)
    }

    pub fn migration(&self) -> Migration<'_> {
        Migration::new(&self.conn)
    }

    /// Creates the tables of `entities` if they do not exist yet.
    pub fn create_tables(&self, entities: &[Arc<EntityDef>]) -> Result<MigrationReport> {
        self.migration().create(entities)
    }

    /// Creates missing tables and adds missing columns.
    pub fn migrate(&self, entities: &[Arc<EntityDef>]) -> Result<MigrationReport> {
        self.migration().migrate(entities)
    }

    /// Starts an empty batch queue.
    pub fn batch(&self) -> BatchJobs {
        BatchJobs::new(Arc::clone(&self.registry), self.mode)
    }

    /// Applies a batch queue atomically and reports whether it committed.
    ///
    /// The failure itself is logged; use
    /// [`try_apply_batch`](Self::try_apply_batch) to inspect it.
    pub fn apply_batch(&self, jobs: BatchJobs) -> bool {
        self.try_apply_batch(jobs).is_ok()
    }

    /// Applies a batch queue atomically, returning the rows changed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::BatchAborted`](crate::SqliteError::BatchAborted)
    /// naming the first failing statement; nothing from the queue is applied
    /// in that case.
    pub fn try_apply_batch(&self, jobs: BatchJobs) -> Result<usize> {
        jobs.apply(&self.conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.conn.path())
            .field("entities", &self.registry.len())
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use entity_schema_core::{Column, ColumnKind, EntityBuilder, FromValue, JoinItem, JoinSpec, Value, ValueError};

    use super::*;
    use crate::error::SqliteError;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Tag {
        id: i64,
        label: String,
    }

    impl Record for Tag {
        fn entity() -> EntityBuilder {
            EntityBuilder::new()
                .table("tag")
                .column(Column::id("id"))
                .column(Column::new("label", ColumnKind::Text).unique())
        }

        fn field(&self, field: &str) -> Value {
            match field {
                "id" => self.id.into(),
                "label" => self.label.as_str().into(),
                _ => Value::Null,
            }
        }

        fn set_field(&mut self, field: &str, value: Value) -> std::result::Result<(), ValueError> {
            match field {
                "id" => self.id = FromValue::from_value(value)?,
                "label" => self.label = FromValue::from_value(value)?,
                other => return Err(ValueError::UnknownField(other.to_string())),
            }
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct TagPair {
        label: String,
    }

    impl Record for TagPair {
        fn entity() -> EntityBuilder {
            EntityBuilder::new()
                .join(JoinSpec::inner(vec![JoinItem::new("tag", "id", "tag_link", "tag_id")]))
                .column(Column::new("label", ColumnKind::Text).alias("tag.label AS label"))
        }

        fn field(&self, field: &str) -> Value {
            match field {
                "label" => self.label.as_str().into(),
                _ => Value::Null,
            }
        }

        fn set_field(&mut self, field: &str, value: Value) -> std::result::Result<(), ValueError> {
            match field {
                "label" => self.label = FromValue::from_value(value)?,
                other => return Err(ValueError::UnknownField(other.to_string())),
            }
            Ok(())
        }
    }

    fn tag_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_tables(&[db.describe::<Tag>().unwrap()]).unwrap();
        db
    }

    fn tag(label: &str) -> Tag {
        Tag {
            id: 0,
            label: label.to_string(),
        }
    }

    #[test]
    fn test_save_writes_key_back() {
        let db = tag_db();
        let mut first = tag("red");
        let mut second = tag("blue");
        assert_eq!(db.save(&mut first).unwrap(), 1);
        assert_eq!(db.save(&mut second).unwrap(), 2);
        assert_eq!(second.id, 2);
    }

    #[test]
    fn test_save_all_is_atomic() {
        let db = tag_db();
        let mut tags = vec![tag("a"), tag("b")];
        assert_eq!(db.save_all(&mut tags).unwrap(), vec![1, 2]);
        assert_eq!(tags[1].id, 2);

        let mut clash = vec![tag("c"), tag("a")];
        assert!(matches!(
            db.save_all(&mut clash),
            Err(SqliteError::QueryFailed(_))
        ));
        assert_eq!(db.with_table::<Tag>().unwrap().count().unwrap(), 2);
    }

    #[test]
    fn test_with_view_requires_join() {
        let db = tag_db();
        assert!(db.with_view::<TagPair>().is_ok());
        let err = db.with_view::<Tag>().err().unwrap();
        assert!(matches!(
            err,
            SqliteError::Schema(SchemaError::NoJoinSpecification { .. })
        ));
    }

    #[test]
    fn test_views_reject_writes() {
        let db = tag_db();
        let mut pair = TagPair::default();
        assert!(matches!(db.save(&mut pair), Err(SqliteError::NotModifiable(_))));
        let view = db.with_view::<TagPair>().unwrap();
        assert!(matches!(view.delete(), Err(SqliteError::NotModifiable(_))));
    }

    #[test]
    fn test_registry_is_shared_with_batches() {
        let db = tag_db();
        let mut jobs = db.batch();
        jobs.add_insert(&tag("green")).unwrap();
        assert!(db.registry().contains::<Tag>());
        assert!(db.apply_batch(jobs));
        assert_eq!(db.with_table::<Tag>().unwrap().count().unwrap(), 1);
    }
}
