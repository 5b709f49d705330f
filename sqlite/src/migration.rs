//! Table creation and additive schema migration.
//!
//! [`Migration`] creates the tables of persisted entities and evolves
//! existing tables to match their current declaration. Evolution is strictly
//! additive: missing columns are appended with `ALTER TABLE ... ADD`, nothing
//! is ever dropped, renamed or retyped. Join views have no table and are
//! skipped.
//!
//! Each call runs inside one transaction, so a failing statement leaves the
//! schema as it was.
//!
//! # Example
//!
//! ```no_run
//! # use entity_schema_core::*;
//! # #[derive(Default)] struct Note { id: i64, body: String }
//! # impl Record for Note {
//! #     fn entity() -> EntityBuilder {
//! #         EntityBuilder::new().table("note").column(Column::id("id")).column(Column::new("body", ColumnKind::Text))
//! #     }
//! #     fn field(&self, f: &str) -> Value { match f { "id" => self.id.into(), "body" => self.body.as_str().into(), _ => Value::Null } }
//! #     fn set_field(&mut self, f: &str, v: Value) -> Result<(), ValueError> {
//! #         match f { "id" => self.id = FromValue::from_value(v)?, "body" => self.body = FromValue::from_value(v)?, o => return Err(ValueError::UnknownField(o.into())) }
//! #         Ok(())
//! #     }
//! # }
//! use entity_schema_sqlite::{Database, Migration};
//! use rusqlite::Connection;
//!
//! let db = Database::new(Connection::open("notes.db").unwrap());
//! let entities = vec![db.describe::<Note>().unwrap()];
//!
//! let report = Migration::new(db.connection()).migrate(&entities).unwrap();
//! println!(
//!     "{} tables created, {} columns added",
//!     report.tables_created.len(),
//!     report.columns_added.len()
//! );
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use entity_schema_core::EntityDef;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::Result;
use crate::schema::{add_column_statement, create_table_statement};
use crate::statement::Statement;

/// Progress of one entity through the migration flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    CheckExists,
    Create,
    DiffColumns,
    Done,
}

/// Creates and evolves entity tables on a borrowed connection.
pub struct Migration<'c> {
    conn: &'c Connection,
}

impl<'c> Migration<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Creates the table of every persisted entity that has none yet.
    ///
    /// Existing tables are left alone and do not show up in the report, so
    /// it is safe to call more than once. Executes within a transaction.
    pub fn create(&self, entities: &[Arc<EntityDef>]) -> Result<MigrationReport> {
        let tx = self.conn.unchecked_transaction()?;
        let mut report = MigrationReport::default();
        for def in entities.iter().filter(|d| !d.is_view()) {
            let statement = create_table_statement(def)?;
            let table = def.label();
            if self.table_exists(table)? {
                debug!(table, "table already exists");
                continue;
            }
            self.run(&mut report, statement)?;
            report.tables_created.push(table.to_string());
            info!(table, "table created");
        }
        tx.commit()?;
        Ok(report)
    }

    /// Brings every persisted entity's table up to date.
    ///
    /// Absent tables are created. Present tables gain one `ADD` per declared
    /// column missing from the catalog. Running it again against an
    /// up-to-date schema executes no statements.
    pub fn migrate(&self, entities: &[Arc<EntityDef>]) -> Result<MigrationReport> {
        let tx = self.conn.unchecked_transaction()?;
        let mut report = MigrationReport::default();
        for def in entities.iter().filter(|d| !d.is_view()) {
            self.migrate_entity(def, &mut report)?;
        }
        tx.commit()?;
        Ok(report)
    }

    fn migrate_entity(&self, def: &EntityDef, report: &mut MigrationReport) -> Result<()> {
        let table = crate::schema::writable_table(def)?;
        let mut step = Step::CheckExists;
        loop {
            debug!(table, ?step, "migration step");
            step = match step {
                Step::CheckExists => {
                    if self.table_exists(table)? {
                        Step::DiffColumns
                    } else {
                        Step::Create
                    }
                }
                Step::Create => {
                    self.run(report, create_table_statement(def)?)?;
                    report.tables_created.push(table.to_string());
                    info!(table, "table created");
                    Step::Done
                }
                Step::DiffColumns => {
                    let existing = self.table_columns(table)?;
                    for column in def.columns() {
                        if existing.contains(&column.name) {
                            continue;
                        }
                        self.run(report, add_column_statement(table, column)?)?;
                        report
                            .columns_added
                            .push((table.to_string(), column.name.clone()));
                        info!(table, column = %column.name, "column added");
                    }
                    Step::Done
                }
                Step::Done => return Ok(()),
            };
        }
    }

    fn run(&self, report: &mut MigrationReport, statement: Statement) -> Result<()> {
        debug!(sql = statement.sql(), "migration statement");
        statement.execute(self.conn)?;
        report.statements.push(statement);
        Ok(())
    }

    /// Checks the catalog for a table.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1")?;
        let count: i64 = stmt.query_row([table], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Physical column names of a table as recorded in the catalog.
    pub fn table_columns(&self, table: &str) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1)")?;
        let names = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(names)
    }
}

/// What a [`Migration`] call changed.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    /// Tables created, in entity order.
    pub tables_created: Vec<String>,
    /// `(table, column)` pairs appended to existing tables.
    pub columns_added: Vec<(String, String)>,
    /// Every DDL statement executed.
    pub statements: Vec<Statement>,
}

impl MigrationReport {
    /// Whether the call left the schema untouched.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use entity_schema_core::{Column, ColumnKind, EntityBuilder, JoinItem, JoinSpec};

    use super::*;

    fn note(with_tags: bool) -> Arc<EntityDef> {
        let mut builder = EntityBuilder::new()
            .table("note")
            .column(Column::id("id"))
            .column(Column::new("body", ColumnKind::Text));
        if with_tags {
            builder = builder
                .column(Column::new("tags", ColumnKind::Text))
                .column(Column::new("pinned", ColumnKind::Boolean));
        }
        Arc::new(builder.build("Note").unwrap())
    }

    #[test]
    fn test_migrate_creates_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        let migration = Migration::new(&conn);
        assert!(!migration.table_exists("note").unwrap());

        let report = migration.migrate(&[note(false)]).unwrap();
        assert_eq!(report.tables_created, vec!["note".to_string()]);
        assert!(report.columns_added.is_empty());
        assert!(migration.table_exists("note").unwrap());
    }

    #[test]
    fn test_migrate_adds_missing_columns() {
        let conn = Connection::open_in_memory().unwrap();
        let migration = Migration::new(&conn);
        migration.create(&[note(false)]).unwrap();

        let report = migration.migrate(&[note(true)]).unwrap();
        assert!(report.tables_created.is_empty());
        assert_eq!(
            report.columns_added,
            vec![
                ("note".to_string(), "tags".to_string()),
                ("note".to_string(), "pinned".to_string())
            ]
        );
        assert_eq!(report.statements[0].sql(), "ALTER TABLE note ADD tags TEXT");

        let columns = migration.table_columns("note").unwrap();
        assert_eq!(columns.len(), 4);
        assert!(columns.contains("pinned"));
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let migration = Migration::new(&conn);
        migration.migrate(&[note(true)]).unwrap();
        let second = migration.migrate(&[note(true)]).unwrap();
        assert!(second.is_empty());
        assert!(!second.statements.iter().any(|s| s.sql().starts_with("ALTER")));
    }

    #[test]
    fn test_migrate_keeps_existing_data() {
        let conn = Connection::open_in_memory().unwrap();
        let migration = Migration::new(&conn);
        migration.create(&[note(false)]).unwrap();
        conn.execute("INSERT INTO note (body) VALUES ('kept')", []).unwrap();

        migration.migrate(&[note(true)]).unwrap();
        let body: String = conn
            .query_row("SELECT body FROM note WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(body, "kept");
    }

    #[test]
    fn test_create_is_idempotent_and_skips_views() {
        let conn = Connection::open_in_memory().unwrap();
        let view = Arc::new(
            EntityBuilder::new()
                .join(JoinSpec::inner(vec![JoinItem::new("note", "id", "tag", "note_id")]))
                .column(Column::new("body", ColumnKind::Text))
                .build("NoteTag")
                .unwrap(),
        );
        let migration = Migration::new(&conn);
        let report = migration.create(&[note(false), Arc::clone(&view)]).unwrap();
        assert_eq!(report.tables_created, vec!["note".to_string()]);
        assert_eq!(report.statements.len(), 1);

        let second = migration.create(&[note(false), view]).unwrap();
        assert!(second.is_empty());
        assert!(second.tables_created.is_empty());
        assert!(migration.table_exists("note").unwrap());
    }
}
