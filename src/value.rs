//! Owned values flowing in and out of the store
//!
//! [`BindValue`] is what a statement parameter becomes once a native Rust value
//! has been bound. [`Cell`] is one column of a fetched row, copied out of the
//! store so rows can outlive the statement that produced them.

use diesel::deserialize::FromSql;
use diesel::sql_types;
use diesel::sqlite::{Sqlite, SqliteType, SqliteValue};

use crate::error::{Error, Result};

/// A parameter value ready to be attached to a statement
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    /// SQL NULL
    Null,
    /// Any integer, booleans included (0/1)
    Integer(i64),
    /// Double precision floating point
    Double(f64),
    /// Text value
    Text(String),
    /// Binary data
    Binary(Vec<u8>),
}

impl BindValue {
    /// Check if the value binds as SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }
}

/// One column of a fetched row
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    /// SQL NULL
    Null,
    /// Integer storage class
    Integer(i64),
    /// Floating point storage class
    Real(f64),
    /// Text storage class
    Text(String),
    /// Blob storage class
    Blob(Vec<u8>),
}

impl Cell {
    /// Copy a raw store value into an owned cell
    pub(crate) fn from_sqlite(value: Option<SqliteValue<'_, '_, '_>>) -> Result<Self> {
        let Some(value) = value else {
            return Ok(Cell::Null);
        };

        let cell = match value.value_type() {
            None => Cell::Null,
            Some(SqliteType::Text) => Cell::Text(
                <String as FromSql<sql_types::Text, Sqlite>>::from_sql(value)
                    .map_err(decode_error)?,
            ),
            Some(SqliteType::Binary) => Cell::Blob(
                <Vec<u8> as FromSql<sql_types::Binary, Sqlite>>::from_sql(value)
                    .map_err(decode_error)?,
            ),
            Some(SqliteType::Double | SqliteType::Float) => Cell::Real(
                <f64 as FromSql<sql_types::Double, Sqlite>>::from_sql(value)
                    .map_err(decode_error)?,
            ),
            Some(_) => Cell::Integer(
                <i64 as FromSql<sql_types::BigInt, Sqlite>>::from_sql(value)
                    .map_err(decode_error)?,
            ),
        };
        Ok(cell)
    }

    /// Check if the cell is SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Read the cell as text
    ///
    /// Note: Returns an empty string for NULL values. Numbers are rendered in
    /// decimal, blobs are decoded lossily as UTF-8.
    pub(crate) fn read_string(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Integer(i) => i.to_string(),
            Cell::Real(r) => r.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    /// Read the cell as a boolean
    ///
    /// Numbers are true when non-zero. Text is true when it starts with one of
    /// `t`, `T`, `y`, `Y` or `1`.
    pub(crate) fn read_bool(&self) -> Result<bool> {
        match self {
            Cell::Null => Ok(false),
            Cell::Integer(i) => Ok(*i != 0),
            Cell::Real(r) => Ok(*r != 0.0),
            Cell::Text(s) => Ok(matches!(
                s.trim_start().chars().next(),
                Some('t' | 'T' | 'y' | 'Y' | '1')
            )),
            Cell::Blob(_) => Err(type_error("blob", "bool")),
        }
    }

    /// Read the cell as a signed 64-bit integer
    ///
    /// Reals are truncated toward zero, text is parsed.
    pub(crate) fn read_i64(&self) -> Result<i64> {
        match self {
            Cell::Null => Ok(0),
            Cell::Integer(i) => Ok(*i),
            Cell::Real(r) => Ok(*r as i64),
            Cell::Text(s) => parse_text(s),
            Cell::Blob(_) => Err(type_error("blob", "integer")),
        }
    }

    /// Read the cell as an unsigned 64-bit integer
    ///
    /// Integers are reinterpreted, so a `u64` stored as its two's complement
    /// comes back unchanged.
    pub(crate) fn read_u64(&self) -> Result<u64> {
        match self {
            Cell::Null => Ok(0),
            Cell::Integer(i) => Ok(*i as u64),
            Cell::Real(r) => Ok(*r as u64),
            Cell::Text(s) => {
                parse_text::<u64>(s).or_else(|_| parse_text::<i64>(s).map(|i| i as u64))
            }
            Cell::Blob(_) => Err(type_error("blob", "unsigned integer")),
        }
    }

    /// Read the cell as a double
    pub(crate) fn read_f64(&self) -> Result<f64> {
        match self {
            Cell::Null => Ok(0.0),
            Cell::Integer(i) => Ok(*i as f64),
            Cell::Real(r) => Ok(*r),
            Cell::Text(s) => parse_text(s),
            Cell::Blob(_) => Err(type_error("blob", "double")),
        }
    }

    /// Read the cell as binary data
    pub(crate) fn read_blob(&self) -> Vec<u8> {
        match self {
            Cell::Null => Vec::new(),
            Cell::Blob(b) => b.clone(),
            Cell::Text(s) => s.as_bytes().to_vec(),
            other => other.read_string().into_bytes(),
        }
    }
}

fn parse_text<T>(text: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    text.trim()
        .parse()
        .map_err(|e| Error::database(format!("cannot convert '{}': {}", text, e)))
}

fn type_error(from: &str, to: &str) -> Error {
    Error::database(format!("cannot convert {} value to {}", from, to))
}

fn decode_error(err: Box<dyn std::error::Error + Send + Sync>) -> Error {
    Error::database(format!("failed to decode column: {}", err))
}
