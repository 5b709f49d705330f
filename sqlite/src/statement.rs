//! SQL statement buffers.
//!
//! A [`Statement`] pairs a SQL template using positional `?` placeholders
//! with its ordered bind arguments. Arguments are exposed two ways:
//! [`raw_args`](Statement::raw_args) for driver binding and
//! [`escaped_args`](Statement::escaped_args) for inline literals.
//!
//! # Escape scheme
//!
//! Inline string literals double single quotes and prefix each of
//! `/ [ ] % & _ ( )` with `/`, then wrap the result in single quotes. The
//! literal therefore matches its original text in a `LIKE ... ESCAPE '/'`
//! comparison.

use entity_schema_core::Value;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};

use crate::error::{Result, SqliteError};

/// Characters prefixed with `/` in inline literals.
const ESCAPED_CHARS: &[char] = &['/', '[', ']', '%', '&', '_', '(', ')'];

/// Immutable SQL template plus ordered bind arguments.
///
/// # Examples
///
/// ```
/// use entity_schema_sqlite::Statement;
/// use entity_schema_core::values;
///
/// let stmt = Statement::with_args("SELECT * FROM t WHERE a = ? AND b = ?", values!["x_1", true]);
/// assert_eq!(stmt.escaped_args(), vec!["'x/_1'".to_string(), "1".to_string()]);
/// assert_eq!(stmt.to_inline_sql(), "SELECT * FROM t WHERE a = 'x/_1' AND b = 1");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    args: Vec<Value>,
}

impl Statement {
    /// Creates a statement without bind arguments.
    pub fn new(sql: impl Into<String>) -> Self {
        Self::with_args(sql, Vec::new())
    }

    pub fn with_args(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// The SQL template.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Arguments as given, for driver-level binding.
    pub fn raw_args(&self) -> &[Value] {
        &self.args
    }

    /// Arguments rendered as inline SQL literals.
    pub fn escaped_args(&self) -> Vec<String> {
        self.args.iter().map(escape_literal).collect()
    }

    /// Renders the template with every placeholder replaced by its escaped
    /// literal.
    ///
    /// Placeholders are substituted positionally; a `?` inside a quoted
    /// literal of the template is not recognized as such.
    pub fn to_inline_sql(&self) -> String {
        let mut literals = self.escaped_args().into_iter();
        let mut out = String::with_capacity(self.sql.len());
        for ch in self.sql.chars() {
            match ch {
                '?' => match literals.next() {
                    Some(literal) => out.push_str(&literal),
                    None => out.push(ch),
                },
                _ => out.push(ch),
            }
        }
        out
    }

    /// Executes the statement once, binding [`raw_args`](Self::raw_args).
    pub(crate) fn execute(&self, conn: &Connection) -> rusqlite::Result<usize> {
        if self.args.is_empty() {
            conn.execute(&self.sql, [])
        } else {
            conn.execute(&self.sql, params_from_iter(self.args.iter().map(Bind)))
        }
    }
}

/// Renders a value as an inline SQL literal.
///
/// Booleans become `1`/`0`, strings are escaped and quoted, everything else
/// uses its textual form. Non-finite reals render as `NULL`.
pub fn escape_literal(value: &Value) -> String {
    match value {
        Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
        Value::Text(text) => {
            let mut out = String::with_capacity(text.len() + 2);
            out.push('\'');
            for ch in text.chars() {
                if ch == '\'' {
                    out.push_str("''");
                } else if ESCAPED_CHARS.contains(&ch) {
                    out.push('/');
                    out.push(ch);
                } else {
                    out.push(ch);
                }
            }
            out.push('\'');
            out
        }
        // SQL has no literal for NaN or the infinities.
        Value::Real(v) if !v.is_finite() => String::from("NULL"),
        other => other.to_string(),
    }
}

/// Converts where arguments into driver-native scalars.
///
/// Text, integers and reals pass through; booleans become `0`/`1`.
///
/// # Errors
///
/// Returns [`SqliteError::UnsupportedBindArgument`] for `NULL` and blobs.
pub fn bind_args<I, V>(args: I) -> Result<Vec<Value>>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    args.into_iter()
        .map(Into::into)
        .enumerate()
        .map(|(index, value)| match value {
            Value::Text(_) | Value::Integer(_) | Value::Real(_) => Ok(value),
            Value::Bool(b) => Ok(Value::Integer(i64::from(b))),
            other => Err(SqliteError::UnsupportedBindArgument {
                index,
                type_name: other.type_name(),
            }),
        })
        .collect()
}

/// Binds a [`Value`] without copying text or blob payloads.
pub(crate) struct Bind<'a>(pub(crate) &'a Value);

impl ToSql for Bind<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
            Value::Bool(v) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*v))),
        })
    }
}

#[cfg(test)]
mod tests {
    use entity_schema_core::values;

    use super::*;

    #[test]
    fn test_escape_special_characters() {
        let escaped = escape_literal(&Value::Text("it's 50%_off (a/b) [x] & y".into()));
        assert_eq!(escaped, "'it''s 50/%/_off /(a//b/) /[x/] /& y'");
    }

    #[test]
    fn test_escape_non_text_values() {
        assert_eq!(escape_literal(&Value::Bool(true)), "1");
        assert_eq!(escape_literal(&Value::Bool(false)), "0");
        assert_eq!(escape_literal(&Value::Integer(-7)), "-7");
        assert_eq!(escape_literal(&Value::Real(2.5)), "2.5");
        assert_eq!(escape_literal(&Value::Null), "NULL");
        assert_eq!(escape_literal(&Value::Blob(vec![0xAB, 0x01])), "X'AB01'");
    }

    #[test]
    fn test_escape_non_finite_reals() {
        assert_eq!(escape_literal(&Value::Real(f64::NAN)), "NULL");
        assert_eq!(escape_literal(&Value::Real(f64::INFINITY)), "NULL");
        assert_eq!(escape_literal(&Value::Real(f64::NEG_INFINITY)), "NULL");
    }

    #[test]
    fn test_raw_args_are_untouched() {
        let stmt = Statement::with_args("INSERT INTO t (a, b) VALUES (?, ?)", values!["a_b", false]);
        assert_eq!(
            stmt.raw_args(),
            &[Value::Text("a_b".into()), Value::Bool(false)]
        );
    }

    #[test]
    fn test_inline_sql_leaves_extra_placeholders() {
        let stmt = Statement::with_args("a = ? AND b = ?", values![1]);
        assert_eq!(stmt.to_inline_sql(), "a = 1 AND b = ?");
        assert_eq!(Statement::new("SELECT 1").to_inline_sql(), "SELECT 1");
    }

    #[test]
    fn test_bind_args_normalizes_scalars() {
        let args = bind_args(values!["x", 3, 1.5, true]).unwrap();
        assert_eq!(
            args,
            vec![
                Value::Text("x".into()),
                Value::Integer(3),
                Value::Real(1.5),
                Value::Integer(1)
            ]
        );
    }

    #[test]
    fn test_bind_args_rejects_blobs_and_nulls() {
        let err = bind_args(vec![Value::Integer(1), Value::Blob(vec![1])]).unwrap_err();
        assert!(matches!(
            err,
            SqliteError::UnsupportedBindArgument { index: 1, type_name: "blob" }
        ));
        assert!(bind_args(vec![Value::Null]).is_err());
    }

    #[test]
    fn test_execute_binds_booleans_as_integers() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (flag INTEGER, label TEXT);")
            .unwrap();
        let stmt = Statement::with_args("INSERT INTO t (flag, label) VALUES (?, ?)", values![true, "on"]);
        assert_eq!(stmt.execute(&conn).unwrap(), 1);
        let flag: i64 = conn.query_row("SELECT flag FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(flag, 1);
    }
}
