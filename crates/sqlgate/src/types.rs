use crate::error::{DataError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Database dialects with a bundled strategy implementation
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    MySql,
    PostgreSql,
    Oracle,
    Sqlite,
}

impl Dialect {
    pub const ALL: [Dialect; 4] = [
        Dialect::MySql,
        Dialect::PostgreSql,
        Dialect::Oracle,
        Dialect::Sqlite,
    ];

    /// Stable identifier used as the registry key for strategies of this dialect
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::PostgreSql => "postgresql",
            Dialect::Oracle => "oracle",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Parse a dialect name, accepting common aliases, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Some(Dialect::MySql),
            "postgresql" | "postgres" | "pg" => Some(Dialect::PostgreSql),
            "oracle" => Some(Dialect::Oracle),
            "sqlite" | "sqlite3" => Some(Dialect::Sqlite),
            _ => None,
        }
    }

    /// Canonical name for a known dialect, or the lower-cased input for anything else
    pub fn canonical_name(name: &str) -> String {
        match Self::parse(name) {
            Some(dialect) => dialect.as_str().to_string(),
            None => name.trim().to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| DataError::UnsupportedDialect(s.to_string()))
    }
}

/// A dynamically-typed scalar cell or parameter value.
///
/// Serialized untagged, so dates render as `YYYY-MM-DD` and date-times as
/// ISO 8601 without offset. When deserializing, strings shaped like a date or
/// date-time become temporal values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(v) => Some(*v),
            SqlValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            SqlValue::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    /// Short type label, used in logs and table output
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "boolean",
            SqlValue::Int(_) => "integer",
            SqlValue::Float(_) => "float",
            SqlValue::Date(_) => "date",
            SqlValue::DateTime(_) => "datetime",
            SqlValue::Text(_) => "text",
        }
    }

    /// Interpret a decimal rendered as text: integral values that fit in `i64`
    /// become `Int`, everything else `Float`, unparseable input stays `Text`.
    pub fn from_decimal_str(raw: &str) -> Self {
        let trimmed = raw.trim();
        if !trimmed.contains(['.', 'e', 'E']) {
            if let Ok(v) = trimmed.parse::<i64>() {
                return SqlValue::Int(v);
            }
        }
        match trimmed.parse::<f64>() {
            Ok(v) => SqlValue::Float(v),
            Err(_) => SqlValue::Text(raw.to_string()),
        }
    }

    /// Parse a literal typed on a command line or in a config file.
    ///
    /// Tries, in order: `null`, booleans, integers, floats, `YYYY-MM-DD`,
    /// `YYYY-MM-DD[T ]HH:MM:SS[.f]`. Anything else is text; wrap the value in
    /// single quotes to force text.
    pub fn parse_literal(raw: &str) -> Self {
        let trimmed = raw.trim();

        if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
            return SqlValue::Text(trimmed[1..trimmed.len() - 1].to_string());
        }
        if trimmed.eq_ignore_ascii_case("null") {
            return SqlValue::Null;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return SqlValue::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return SqlValue::Bool(false);
        }
        if let Ok(v) = trimmed.parse::<i64>() {
            return SqlValue::Int(v);
        }
        if let Ok(v) = trimmed.parse::<f64>() {
            if v.is_finite() {
                return SqlValue::Float(v);
            }
        }
        Self::parse_temporal(trimmed).unwrap_or_else(|| SqlValue::Text(raw.to_string()))
    }

    /// Read text written as `YYYY-MM-DD` or `YYYY-MM-DD[T ]HH:MM:SS[.f]` back
    /// as a date or date-time. Zero-padded fields only; anything else is `None`.
    pub fn parse_temporal(raw: &str) -> Option<Self> {
        let bytes = raw.as_bytes();
        if bytes.len() < 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return None;
        }
        if bytes.len() == 10 {
            return NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(SqlValue::Date);
        }
        if bytes.len() < 19 || !matches!(bytes[10], b'T' | b' ') {
            return None;
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(SqlValue::DateTime)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            SqlValue::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            SqlValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v.into())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One result record: lower-cased column label to value, in select-list order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    /// Insert a cell under the lower-cased label.
    ///
    /// A repeated label replaces the earlier value but keeps its position.
    pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
        let column = column.into().to_lowercase();
        match self.cells.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.cells.push((column, value)),
        }
    }

    /// Look up a cell; the label is matched case-insensitively
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        let column = column.to_lowercase();
        self.cells
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.cells.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl IntoIterator for Row {
    type Item = (String, SqlValue);
    type IntoIter = std::vec::IntoIter<(String, SqlValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Positional statement parameters keyed by 1-based index
pub type QueryParams = BTreeMap<u32, SqlValue>;

/// Parameters in binding order.
///
/// Drivers bind positionally, so indices must run contiguously from 1.
pub fn ordered_params(params: &QueryParams) -> Result<Vec<&SqlValue>> {
    let mut ordered = Vec::with_capacity(params.len());
    for (expected, (index, value)) in (1u32..).zip(params.iter()) {
        if *index != expected {
            return Err(DataError::InvalidQuery(format!(
                "Parameter indices must be contiguous from 1; expected {}, found {}",
                expected, index
            )));
        }
        ordered.push(value);
    }
    Ok(ordered)
}

/// Snapshot of a strategy's connection pool
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Connections currently open (idle + checked out)
    pub size: u32,
    /// Connections currently idle
    pub idle: usize,
    /// Configured upper bound
    pub max_size: u32,
}

impl PoolStatus {
    /// Connections currently checked out
    pub fn in_use(&self) -> usize {
        (self.size as usize).saturating_sub(self.idle)
    }
}
