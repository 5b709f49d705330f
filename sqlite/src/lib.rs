//! SQLite mapping engine for table-mapped records.
//!
//! This crate turns the entity descriptors of `entity-schema-core` into
//! tables and parameterized SQL. It creates and additively migrates tables,
//! converts records to and from rows, builds filtered queries over tables
//! and join views, and applies queued writes atomically.
//!
//! # Architecture
//!
//! - **`statement`**: SQL template plus bind arguments, with raw and
//!   escaped-literal projections
//! - **`schema`**: DDL and DML generation from descriptors
//! - **`migration`**: table creation and additive column migration
//! - **`convert`**: record ↔ row marshaling
//! - **`query`**: the condition builder and its search/update/delete
//!   operations
//! - **`batch`**: transactional batch queue
//! - **`database`**: the connection facade tying everything together
//! - **`config`**: YAML store configuration and schema-version lifecycle
//!
//! # Quick start
//!
//! ```no_run
//! # use entity_schema_core::*;
//! # #[derive(Default)] struct Person { id: i64, name: String }
//! # impl Record for Person {
//! #     fn entity() -> EntityBuilder {
//! #         EntityBuilder::new().table("person").column(Column::id("id")).column(Column::new("name", ColumnKind::Text))
//! #     }
//! #     fn field(&self, f: &str) -> Value { match f { "id" => self.id.into(), "name" => self.name.as_str().into(), _ => Value::Null } }
//! #     fn set_field(&mut self, f: &str, v: Value) -> Result<(), ValueError> {
//! #         match f { "id" => self.id = FromValue::from_value(v)?, "name" => self.name = FromValue::from_value(v)?, o => return Err(ValueError::UnknownField(o.into())) }
//! #         Ok(())
//! #     }
//! # }
//! use std::sync::Arc;
//! use entity_schema_sqlite::StoreConfig;
//!
//! let registry = Arc::new(Registry::new());
//! let entities = vec![registry.describe::<Person>().unwrap()];
//!
//! let config = StoreConfig::load("store.yml").unwrap();
//! let db = config.open(registry, &entities).unwrap();
//!
//! let mut bob = Person { id: 0, name: "Bob".into() };
//! db.save(&mut bob).unwrap();
//!
//! let found = db.with_table::<Person>().unwrap().search_by_id(bob.id).unwrap();
//! assert!(found.is_some());
//! ```
//!
//! # Errors
//!
//! Engine failures surface as [`SqliteError::QueryFailed`]; no operation
//! turns an engine error into an empty result. The one lossy path is
//! [`Query::search_as_list`], which returns the rows read before a
//! mid-stream failure.

mod batch;
mod config;
mod convert;
mod database;
mod error;
mod migration;
mod query;
mod schema;
mod statement;

pub use batch::BatchJobs;
pub use config::{MEMORY_PATH, StoreConfig};
pub use convert::{MarshalMode, from_row, to_row};
pub use database::Database;
pub use error::{Result, SqliteError};
pub use migration::{Migration, MigrationReport};
pub use query::{Query, SEQUENCE_RESET_THRESHOLD, render_join};
pub use schema::{
    add_column_statement, create_table_statement, delete_statement, insert_statement,
    update_statement,
};
pub use statement::{Statement, bind_args, escape_literal};
