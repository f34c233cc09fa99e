//! Raw column values exchanged with the storage layer.
//!
//! [`DbValue`] is what a database driver hands to a field wrapper's `scan`, and
//! what `value()` hands back for writing. It mirrors SQLite's storage classes,
//! which cover every shape a driver can produce for a single column.

use serde::{Deserialize, Serialize};

/// A single raw column value as read from or written to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DbValue {
    /// SQL `NULL`.
    Null,
    /// A 64-bit signed integer.
    Integer(i64),
    /// A floating point number.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// An opaque byte sequence.
    Bytes(Vec<u8>),
}

impl DbValue {
    /// Short name of the storage class, used in error messages and logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            DbValue::Null => "null",
            DbValue::Integer(_) => "integer",
            DbValue::Real(_) => "real",
            DbValue::Text(_) => "text",
            DbValue::Bytes(_) => "bytes",
        }
    }

    /// Returns `true` for SQL `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// Borrow the text payload, if this is a [`DbValue::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DbValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<String> for DbValue {
    fn from(s: String) -> Self {
        DbValue::Text(s)
    }
}

impl From<&str> for DbValue {
    fn from(s: &str) -> Self {
        DbValue::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(b: Vec<u8>) -> Self {
        DbValue::Bytes(b)
    }
}

impl From<i64> for DbValue {
    fn from(i: i64) -> Self {
        DbValue::Integer(i)
    }
}

impl From<f64> for DbValue {
    fn from(r: f64) -> Self {
        DbValue::Real(r)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(DbValue::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// rusqlite adapters
// ---------------------------------------------------------------------------

#[cfg(feature = "rusqlite")]
mod sqlite {
    use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

    use super::DbValue;

    impl From<ValueRef<'_>> for DbValue {
        fn from(value: ValueRef<'_>) -> Self {
            match value {
                ValueRef::Null => DbValue::Null,
                ValueRef::Integer(i) => DbValue::Integer(i),
                ValueRef::Real(r) => DbValue::Real(r),
                // SQLite does not enforce UTF-8 on TEXT; keep invalid text as bytes.
                ValueRef::Text(t) => match std::str::from_utf8(t) {
                    Ok(s) => DbValue::Text(s.to_owned()),
                    Err(_) => DbValue::Bytes(t.to_vec()),
                },
                ValueRef::Blob(b) => DbValue::Bytes(b.to_vec()),
            }
        }
    }

    impl FromSql for DbValue {
        fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
            Ok(value.into())
        }
    }

    impl ToSql for DbValue {
        fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
            let value = match self {
                DbValue::Null => ValueRef::Null,
                DbValue::Integer(i) => ValueRef::Integer(*i),
                DbValue::Real(r) => ValueRef::Real(*r),
                DbValue::Text(s) => ValueRef::Text(s.as_bytes()),
                DbValue::Bytes(b) => ValueRef::Blob(b),
            };
            Ok(ToSqlOutput::Borrowed(value))
        }
    }
}
