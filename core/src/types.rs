//! Column kinds and the generic value model.
//!
//! Every persisted field maps to one of five primitive [`ColumnKind`]s. Values
//! travel between records and the engine as [`Value`]s; [`FromValue`] performs
//! the coercion back into concrete Rust field types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::validate::ValueError;

/// Primitive storage kind of a column.
///
/// Booleans are stored as integers (`0`/`1`) but keep their own kind so the
/// marshaler can coerce them back into `bool` fields.
///
/// # Examples
///
/// ```
/// use entity_schema_core::ColumnKind;
///
/// assert_eq!(ColumnKind::Boolean.sql_type(), "INTEGER");
/// assert_eq!(ColumnKind::parse("varchar(32)"), Some(ColumnKind::Text));
/// assert_eq!(ColumnKind::parse("DATETIME"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Signed integer of any width.
    Integer,
    /// Floating point number.
    Real,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Blob,
    /// Boolean stored as `0`/`1`.
    Boolean,
}

impl ColumnKind {
    /// SQL type name used in DDL.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Integer | ColumnKind::Boolean => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
            ColumnKind::Blob => "BLOB",
        }
    }

    /// Resolves a declared type name (SQL or Rust spelling) to a kind.
    ///
    /// Length suffixes such as `VARCHAR(20)` are ignored. Returns `None` for
    /// anything that has no primitive counterpart.
    pub fn parse(declared: &str) -> Option<Self> {
        let base = declared.split('(').next().unwrap_or_default().trim();
        match base.to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" | "BIGINT" | "SMALLINT" | "TINYINT" | "LONG" | "SHORT" | "I64"
            | "I32" | "I16" | "I8" | "U32" | "U16" | "U8" => Some(ColumnKind::Integer),
            "REAL" | "DOUBLE" | "FLOAT" | "F64" | "F32" => Some(ColumnKind::Real),
            "TEXT" | "VARCHAR" | "CHAR" | "STRING" | "&STR" => Some(ColumnKind::Text),
            "BLOB" | "BYTES" | "VEC<U8>" => Some(ColumnKind::Blob),
            "BOOLEAN" | "BOOL" => Some(ColumnKind::Boolean),
            _ => None,
        }
    }

    /// Value written for a column whose field holds no value.
    pub fn zero_value(self) -> Value {
        match self {
            ColumnKind::Integer => Value::Integer(0),
            ColumnKind::Real => Value::Real(0.0),
            ColumnKind::Text => Value::Text(String::new()),
            ColumnKind::Blob => Value::Blob(Vec::new()),
            ColumnKind::Boolean => Value::Bool(false),
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Real => "real",
            ColumnKind::Text => "text",
            ColumnKind::Blob => "blob",
            ColumnKind::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// A dynamically typed column value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// SQL `NULL`, also used for "field has no value".
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Blob(bytes) => {
                f.write_str("X'")?;
                for b in bytes {
                    write!(f, "{b:02X}")?;
                }
                f.write_str("'")
            }
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Integer(i64::from(v))
                }
            }
        )*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(f64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Builds a `Vec<Value>` from heterogeneous expressions.
///
/// ```
/// use entity_schema_core::{Value, values};
///
/// let args = values![20, "alice", true];
/// assert_eq!(args[1], Value::Text("alice".into()));
/// ```
#[macro_export]
macro_rules! values {
    () => { ::std::vec::Vec::<$crate::Value>::new() };
    ($($arg:expr),+ $(,)?) => { vec![$($crate::Value::from($arg)),+] };
}

/// Coerces a [`Value`] read from the engine into a field type.
///
/// `NULL` coerces to the type's zero value, except for `Option<T>` which
/// yields `None`.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ValueError>;
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Integer(v) => Ok(v),
            Value::Bool(b) => Ok(i64::from(b)),
            Value::Null => Ok(0),
            other => Err(ValueError::mismatch("integer", &other)),
        }
    }
}

macro_rules! narrow_from_value {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, ValueError> {
                    let wide = i64::from_value(value)?;
                    <$ty>::try_from(wide).map_err(|_| ValueError::Overflow {
                        value: wide,
                        target: stringify!($ty),
                    })
                }
            }
        )*
    };
}

narrow_from_value!(i8, i16, i32, u8, u16, u32);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Real(v) => Ok(v),
            Value::Integer(v) => Ok(v as f64),
            Value::Null => Ok(0.0),
            other => Err(ValueError::mismatch("real", &other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Integer(v) => Ok(v == 1),
            Value::Null => Ok(false),
            other => Err(ValueError::mismatch("boolean", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Text(v) => Ok(v),
            Value::Null => Ok(String::new()),
            other => Err(ValueError::mismatch("text", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Blob(v) => Ok(v),
            Value::Null => Ok(Vec::new()),
            other => Err(ValueError::mismatch("blob", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
