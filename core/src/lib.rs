//! Storage-agnostic metadata for table-mapped records.
//!
//! This crate defines how a Rust type describes the table it is stored in:
//!
//! - [`Record`]: implemented by every mapped type; exposes fields by name
//!   and declares its schema through an [`EntityBuilder`].
//! - [`Column`]: per-field declaration (name, kind, constraints, foreign
//!   key, join alias).
//! - [`EntityDef`] / [`ColumnDef`]: the validated, immutable descriptors.
//! - [`JoinSpec`]: join chain behind query-only view types.
//! - [`Registry`]: per-instance cache that describes each type once.
//! - [`Value`] / [`FromValue`]: the generic value model and its coercions.
//!
//! Declaration mistakes (missing table name, unsupported column types, blob
//! defaults, bad primary keys) surface as [`SchemaError`]s the first time a
//! type is described, never later at query time.
//!
//! The SQL side lives in `entity-schema-sqlite`.

mod entity;
mod registry;
mod types;
mod validate;

pub use entity::{
    Column, ColumnDef, EntityBuilder, EntityDef, ForeignKey, JoinItem, JoinKind, JoinSpec, Record,
    Source, UNSAVED,
};
pub use registry::Registry;
pub use types::{ColumnKind, FromValue, Value};
pub use validate::{SchemaError, SchemaResult, ValueError};
