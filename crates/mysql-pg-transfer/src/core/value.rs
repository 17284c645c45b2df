//! Tagged row values carried from the source to the target.
//!
//! Every value read from the source is classified once, at decode time, into
//! one of five kinds. Normalization and repair dispatch on that tag.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;

use super::schema::PkValue;

/// Kind tag of a [`SqlValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Text,
    Temporal,
    Numeric,
    Binary,
}

/// A temporal value as read from the source.
///
/// `Raw` holds the server's textual form when it cannot be represented by
/// chrono, e.g. the zero date `0000-00-00 00:00:00` or a TIME above 24 hours.
#[derive(Debug, Clone, PartialEq)]
pub enum Temporal {
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Raw(String),
}

/// A numeric value as read from the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Numeric {
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(Decimal),
    Bool(bool),
}

/// One column value of a row.
///
/// Text is kept as raw bytes so invalid sequences from the source survive
/// until the loader's repair cascade decides what to do with them.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(Vec<u8>),
    Temporal(Temporal),
    Numeric(Numeric),
    Binary(Vec<u8>),
}

impl SqlValue {
    /// Build a text value from a string.
    pub fn text(s: impl Into<String>) -> Self {
        SqlValue::Text(s.into().into_bytes())
    }

    pub fn int(v: i64) -> Self {
        SqlValue::Numeric(Numeric::Int(v))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            SqlValue::Null => ValueKind::Null,
            SqlValue::Text(_) => ValueKind::Text,
            SqlValue::Temporal(_) => ValueKind::Temporal,
            SqlValue::Numeric(_) => ValueKind::Numeric,
            SqlValue::Binary(_) => ValueKind::Binary,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Text content if this is a valid UTF-8 text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// Integer view used for primary-key sequence tracking.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Numeric(Numeric::Int(v)) => Some(*v),
            SqlValue::Numeric(Numeric::UInt(v)) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Primary-key view of this value, for error reporting.
    pub fn to_pk(&self) -> Option<PkValue> {
        match self {
            SqlValue::Null => None,
            SqlValue::Numeric(Numeric::Int(v)) => Some(PkValue::Int(*v)),
            SqlValue::Numeric(Numeric::UInt(v)) => Some(match i64::try_from(*v) {
                Ok(v) => PkValue::Int(v),
                Err(_) => PkValue::String(v.to_string()),
            }),
            SqlValue::Text(bytes) => Some(PkValue::String(
                String::from_utf8_lossy(bytes).into_owned(),
            )),
            other => Some(PkValue::String(other.to_string())),
        }
    }
}

impl fmt::Display for Temporal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Temporal::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
            Temporal::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Temporal::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            Temporal::Raw(s) => f.write_str(s),
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Int(v) => write!(f, "{}", v),
            Numeric::UInt(v) => write!(f, "{}", v),
            Numeric::Float(v) => write!(f, "{}", v),
            Numeric::Decimal(v) => write!(f, "{}", v),
            Numeric::Bool(v) => f.write_str(if *v { "t" } else { "f" }),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Text(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            SqlValue::Temporal(t) => t.fmt(f),
            SqlValue::Numeric(n) => n.fmt(f),
            SqlValue::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::int(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Temporal(Temporal::Timestamp(v))
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// A row, positionally aligned with the target table's columns.
pub type Row = Vec<SqlValue>;

/// One bounded batch of rows fetched by offset pagination.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageInfo {
    /// Zero-based page number.
    pub number: u64,
    /// Offset of the first row of the page.
    pub offset: u64,
}

/// A page of rows. Consumed once by the loader.
#[derive(Debug, Clone)]
pub struct Page {
    pub info: PageInfo,
    pub rows: Vec<Row>,
}

impl Page {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
