//! Entity declarations and their resolved descriptors.
//!
//! A record type declares its schema once through an [`EntityBuilder`]
//! (returned from [`Record::entity`]). The [`Registry`](crate::Registry)
//! resolves that declaration into an immutable [`EntityDef`], validating
//! column kinds, defaults and the primary key along the way.
//!
//! # Example
//!
//! ```
//! use entity_schema_core::*;
//!
//! #[derive(Default)]
//! struct Person {
//!     id: i64,
//!     name: String,
//!     age: i32,
//! }
//!
//! impl Record for Person {
//!     fn entity() -> EntityBuilder {
//!         EntityBuilder::new()
//!             .table("person")
//!             .order_by("age DESC")
//!             .column(Column::id("id"))
//!             .column(Column::new("name", ColumnKind::Text).not_null())
//!             .column(Column::declared("age", "i32"))
//!     }
//!
//!     fn field(&self, field: &str) -> Value {
//!         match field {
//!             "id" => self.id.into(),
//!             "name" => self.name.as_str().into(),
//!             "age" => self.age.into(),
//!             _ => Value::Null,
//!         }
//!     }
//!
//!     fn set_field(&mut self, field: &str, value: Value) -> Result<(), ValueError> {
//!         match field {
//!             "id" => self.id = FromValue::from_value(value)?,
//!             "name" => self.name = FromValue::from_value(value)?,
//!             "age" => self.age = FromValue::from_value(value)?,
//!             other => return Err(ValueError::UnknownField(other.to_string())),
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let registry = Registry::new();
//! let def = registry.describe::<Person>().unwrap();
//! assert_eq!(def.table(), Some("person"));
//! assert_eq!(def.columns().len(), 3);
//! assert_eq!(def.primary_key().unwrap().name, "id");
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::{ColumnKind, Value};
use crate::validate::{SchemaError, SchemaResult, ValueError};

/// Primary key value of a record that has not been persisted yet.
pub const UNSAVED: i64 = 0;

/// A record type mapped to a table or to a join view.
///
/// Implementations expose their fields by logical name; the marshaler drives
/// all type coercion from the declared [`ColumnKind`]s.
pub trait Record: Default + 'static {
    /// Declares the schema of this type. Called once per registry.
    fn entity() -> EntityBuilder;

    /// Reads a field. Unknown fields and absent values yield [`Value::Null`].
    fn field(&self, field: &str) -> Value;

    /// Assigns a field from a value read out of the engine.
    fn set_field(&mut self, field: &str, value: Value) -> Result<(), ValueError>;
}

/// Target of a foreign key reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone)]
enum DeclaredKind {
    Kind(ColumnKind),
    Named(String),
}

/// Column declaration on a record field, before validation.
#[derive(Debug, Clone)]
pub struct Column {
    field: String,
    name: Option<String>,
    kind: DeclaredKind,
    not_null: bool,
    unique: bool,
    default: Option<String>,
    primary_key: bool,
    foreign: Option<ForeignKey>,
    alias: Option<String>,
}

impl Column {
    /// Declares a column of a known kind. The physical name defaults to the
    /// field name.
    pub fn new(field: impl Into<String>, kind: ColumnKind) -> Self {
        Self::with_kind(field.into(), DeclaredKind::Kind(kind))
    }

    /// Declares a column by type name, e.g. `"VARCHAR(20)"` or `"i64"`.
    ///
    /// The name is resolved when the entity is described; names without a
    /// primitive counterpart fail with
    /// [`SchemaError::UnsupportedColumnType`].
    pub fn declared(field: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::with_kind(field.into(), DeclaredKind::Named(type_name.into()))
    }

    /// Declares the auto-incrementing integer surrogate key.
    pub fn id(field: impl Into<String>) -> Self {
        let mut column = Self::new(field, ColumnKind::Integer);
        column.primary_key = true;
        column
    }

    fn with_kind(field: String, kind: DeclaredKind) -> Self {
        Self {
            field,
            name: None,
            kind,
            not_null: false,
            unique: false,
            default: None,
            primary_key: false,
            foreign: None,
            alias: None,
        }
    }

    /// Overrides the physical column name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Default literal rendered as `DEFAULT '<value>'`.
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Projection expression used by join views, e.g.
    /// `"teacher.name AS teacher_name"`.
    pub fn alias(mut self, expression: impl Into<String>) -> Self {
        self.alias = Some(expression.into());
        self
    }
}

/// Resolved, validated column facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Logical field name on the record.
    pub field: String,
    /// Physical column name.
    pub name: String,
    pub kind: ColumnKind,
    pub not_null: bool,
    pub unique: bool,
    pub default: Option<String>,
    pub primary_key: bool,
    pub foreign: Option<ForeignKey>,
    pub alias: Option<String>,
}

impl ColumnDef {
    /// Term used in the select list: the alias expression when present,
    /// otherwise the physical name.
    pub fn projection(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Fails for blob columns carrying a default literal.
    pub fn check_default(&self, table: &str) -> SchemaResult<()> {
        if self.default.is_some() && self.kind == ColumnKind::Blob {
            return Err(SchemaError::UnsupportedDefaultForBlob {
                table: table.to_string(),
                column: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Join flavour of a query-only type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
    Natural,
}

impl JoinKind {
    /// SQL keyword for this join.
    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Cross => "CROSS JOIN",
            JoinKind::Natural => "NATURAL JOIN",
        }
    }

    /// Whether this join takes an `ON` condition.
    pub fn has_condition(self) -> bool {
        matches!(self, JoinKind::Inner | JoinKind::Left)
    }
}

/// One link of a join chain: `left_table.left_column = right_table.right_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinItem {
    pub left_table: String,
    pub left_column: String,
    pub right_table: String,
    pub right_column: String,
}

impl JoinItem {
    pub fn new(
        left_table: impl Into<String>,
        left_column: impl Into<String>,
        right_table: impl Into<String>,
        right_column: impl Into<String>,
    ) -> Self {
        Self {
            left_table: left_table.into(),
            left_column: left_column.into(),
            right_table: right_table.into(),
            right_column: right_column.into(),
        }
    }

    /// Column-less link, for cross and natural joins.
    pub fn tables(left_table: impl Into<String>, right_table: impl Into<String>) -> Self {
        Self::new(left_table, "", right_table, "")
    }
}

/// Declarative join chain backing a query-only type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub items: Vec<JoinItem>,
}

impl JoinSpec {
    pub fn new(kind: JoinKind, items: Vec<JoinItem>) -> Self {
        Self { kind, items }
    }

    pub fn inner(items: Vec<JoinItem>) -> Self {
        Self::new(JoinKind::Inner, items)
    }

    pub fn left(item: JoinItem) -> Self {
        Self::new(JoinKind::Left, vec![item])
    }

    pub fn cross(left_table: impl Into<String>, right_table: impl Into<String>) -> Self {
        Self::new(
            JoinKind::Cross,
            vec![JoinItem::tables(left_table, right_table)],
        )
    }

    pub fn natural(left_table: impl Into<String>, right_table: impl Into<String>) -> Self {
        Self::new(
            JoinKind::Natural,
            vec![JoinItem::tables(left_table, right_table)],
        )
    }
}

/// Where the rows of an entity come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    /// A persisted table.
    Table(String),
    /// A read-only view over a join chain.
    Join(JoinSpec),
}

/// Schema declaration of a record type.
#[derive(Debug, Clone, Default)]
pub struct EntityBuilder {
    source: Option<Source>,
    order_by: Option<String>,
    columns: Vec<Column>,
}

impl EntityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps the type to a persisted table.
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.source = Some(Source::Table(name.into()));
        self
    }

    /// Maps the type to a read-only join view.
    pub fn join(mut self, spec: JoinSpec) -> Self {
        self.source = Some(Source::Join(spec));
        self
    }

    /// Default `ORDER BY` clause used when a query sets none.
    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Validates the declaration and produces the immutable descriptor.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] describing the first problem found.
    pub fn build(self, type_name: &str) -> SchemaResult<EntityDef> {
        let source = self
            .source
            .ok_or_else(|| SchemaError::MissingTableMetadata {
                type_name: type_name.to_string(),
            })?;

        let label = match &source {
            Source::Table(name) => name.clone(),
            Source::Join(spec) => {
                if spec.items.is_empty() {
                    return Err(SchemaError::NoJoinSpecification {
                        type_name: type_name.to_string(),
                    });
                }
                type_name.to_string()
            }
        };

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(self.columns.len());
        for column in self.columns {
            let kind = match column.kind {
                DeclaredKind::Kind(kind) => kind,
                DeclaredKind::Named(declared) => ColumnKind::parse(&declared).ok_or_else(|| {
                    SchemaError::UnsupportedColumnType {
                        type_name: type_name.to_string(),
                        field: column.field.clone(),
                        declared,
                    }
                })?,
            };
            let name = column.name.unwrap_or_else(|| column.field.clone());
            if !seen.insert(name.clone()) {
                return Err(SchemaError::DuplicateColumn {
                    type_name: type_name.to_string(),
                    column: name,
                });
            }
            let def = ColumnDef {
                field: column.field,
                name,
                kind,
                not_null: column.not_null,
                unique: column.unique,
                default: column.default,
                primary_key: column.primary_key,
                foreign: column.foreign,
                alias: column.alias,
            };
            def.check_default(&label)?;
            columns.push(def);
        }

        let keys: Vec<&ColumnDef> = columns.iter().filter(|c| c.primary_key).collect();
        let invalid_key = |reason: &str| SchemaError::InvalidPrimaryKey {
            type_name: type_name.to_string(),
            reason: reason.to_string(),
        };
        if keys.len() > 1 {
            return Err(invalid_key("more than one primary key column"));
        }
        if let Some(key) = keys.first() {
            if key.kind != ColumnKind::Integer {
                return Err(invalid_key("primary key must be an integer column"));
            }
        } else if matches!(source, Source::Table(_)) {
            return Err(invalid_key("persisted types need a primary key column"));
        }

        Ok(EntityDef {
            type_name: type_name.to_string(),
            source,
            order_by: self.order_by,
            columns,
        })
    }
}

/// Immutable schema description of a record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    type_name: String,
    source: Source,
    order_by: Option<String>,
    columns: Vec<ColumnDef>,
}

impl EntityDef {
    /// Rust type name the descriptor was built for.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Table name of a persisted type; `None` for join views.
    pub fn table(&self) -> Option<&str> {
        match &self.source {
            Source::Table(name) => Some(name),
            Source::Join(_) => None,
        }
    }

    /// Join chain of a query-only type; `None` for tables.
    pub fn join(&self) -> Option<&JoinSpec> {
        match &self.source {
            Source::Table(_) => None,
            Source::Join(spec) => Some(spec),
        }
    }

    pub fn is_view(&self) -> bool {
        matches!(self.source, Source::Join(_))
    }

    /// Table name, or the type name for views. Used in messages.
    pub fn label(&self) -> &str {
        self.table().unwrap_or(&self.type_name)
    }

    pub fn order_by(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Looks a column up by its physical name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }
}
