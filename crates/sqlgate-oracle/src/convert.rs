//! Conversions between sqlgate values and the oracle driver.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use oracle::sql_type::{OracleType, ToSql};
use oracle::Row as OracleRow;
use sqlgate::{DataError, SqlValue};
use std::time::Duration;

/// Turn a configured URL into an Oracle connect string.
///
/// Accepts `jdbc:oracle:thin:@//host:port/service`,
/// `jdbc:oracle:thin:@host:port:SID`, `oracle://host:port/service` and plain
/// Easy Connect strings.
pub fn connect_string(url: &str) -> String {
    let url = url.trim();
    let rest = url
        .strip_prefix("jdbc:oracle:thin:@")
        .or_else(|| url.strip_prefix("jdbc:oracle:oci:@"))
        .unwrap_or(url);

    if let Some(easy) = rest.strip_prefix("oracle://") {
        return format!("//{}", easy);
    }

    // host:port:SID has no Easy Connect form
    if !rest.starts_with("//") && !rest.starts_with('(') && !rest.contains('/') {
        let parts: Vec<&str> = rest.split(':').collect();
        if let [host, port, sid] = parts.as_slice() {
            if port.parse::<u16>().is_ok() {
                return format!(
                    "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST={})(PORT={}))(CONNECT_DATA=(SID={})))",
                    host, port, sid
                );
            }
        }
    }

    rest.to_string()
}

/// An owned bind value that can cross onto a blocking thread
#[derive(Debug, Clone, PartialEq)]
pub enum OracleParam {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

static NULL_TEXT: Option<String> = None;

impl OracleParam {
    pub fn as_to_sql(&self) -> &dyn ToSql {
        match self {
            OracleParam::Null => &NULL_TEXT,
            OracleParam::Int(v) => v,
            OracleParam::Float(v) => v,
            OracleParam::Text(v) => v,
            OracleParam::Date(v) => v,
            OracleParam::Timestamp(v) => v,
        }
    }
}

/// Booleans bind as NUMBER 1/0; Oracle SQL before 23ai has no boolean type
impl From<&SqlValue> for OracleParam {
    fn from(value: &SqlValue) -> Self {
        match value {
            SqlValue::Null => OracleParam::Null,
            SqlValue::Bool(v) => OracleParam::Int(i64::from(*v)),
            SqlValue::Int(v) => OracleParam::Int(*v),
            SqlValue::Float(v) => OracleParam::Float(*v),
            SqlValue::Text(v) => OracleParam::Text(v.clone()),
            SqlValue::Date(v) => OracleParam::Date(*v),
            SqlValue::DateTime(v) => OracleParam::Timestamp(*v),
        }
    }
}

/// Oracle DATE always carries a time of day; midnight values become calendar dates
pub fn date_value(value: NaiveDateTime) -> SqlValue {
    if value.time() == NaiveTime::MIN {
        SqlValue::Date(value.date())
    } else {
        SqlValue::DateTime(value)
    }
}

/// Read one cell by its column type. A value the typed read rejects is retried
/// as text, then as raw bytes; only a genuine SQL NULL becomes [`SqlValue::Null`].
pub fn decode_cell(
    row: &OracleRow,
    idx: usize,
    label: &str,
    oracle_type: &OracleType,
) -> Result<SqlValue, DataError> {
    let value = match oracle_type {
        OracleType::Number(_, _) | OracleType::Int64 | OracleType::UInt64 => {
            typed(row.get::<usize, Option<String>>(idx), |v| {
                SqlValue::from_decimal_str(&v)
            })
        }
        OracleType::Float(_) | OracleType::BinaryFloat | OracleType::BinaryDouble => {
            typed(row.get::<usize, Option<f64>>(idx), SqlValue::Float)
        }
        OracleType::Date => typed(row.get::<usize, Option<NaiveDateTime>>(idx), date_value),
        OracleType::Timestamp(_) => {
            typed(row.get::<usize, Option<NaiveDateTime>>(idx), SqlValue::DateTime)
        }
        OracleType::TimestampTZ(_) | OracleType::TimestampLTZ(_) => {
            typed(row.get::<usize, Option<DateTime<Utc>>>(idx), |v| {
                SqlValue::DateTime(v.naive_utc())
            })
        }
        OracleType::Boolean => typed(row.get::<usize, Option<bool>>(idx), SqlValue::Bool),
        OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB => {
            typed(row.get::<usize, Option<Vec<u8>>>(idx), hex_text)
        }
        // VARCHAR2, CHAR, CLOB, ROWID, intervals and anything else as text
        _ => typed(row.get::<usize, Option<String>>(idx), SqlValue::Text),
    };

    value
        .or_else(|_| typed(row.get::<usize, Option<String>>(idx), SqlValue::Text))
        .or_else(|_| typed(row.get::<usize, Option<Vec<u8>>>(idx), hex_text))
        .map_err(|e| {
            DataError::QueryFailed(format!(
                "Cannot decode column '{}' ({}): {}",
                label, oracle_type, e
            ))
        })
}

/// `Ok(None)` is SQL NULL; a failed read stays an error
fn typed<T, E>(value: Result<Option<T>, E>, map: impl FnOnce(T) -> SqlValue) -> Result<SqlValue, E> {
    value.map(|v| v.map(map).unwrap_or(SqlValue::Null))
}

fn hex_text(bytes: Vec<u8>) -> SqlValue {
    SqlValue::Text(hex::encode(bytes))
}

/// Categorize a driver error by its ORA-/DPI- code
pub fn classify_error(datasource_id: &str, connection_timeout: Duration, message: &str) -> DataError {
    const POOL_EXHAUSTED: &[&str] = &["ORA-24457", "ORA-24459", "ORA-24496"];
    const CONNECTION_LOST: &[&str] = &["ORA-03113", "ORA-03114", "ORA-03135", "DPI-1010", "DPI-1080"];
    const CONNECTION_FAILED: &[&str] = &[
        "ORA-01017", "ORA-12154", "ORA-12170", "ORA-12505", "ORA-12514", "ORA-12541", "ORA-12545",
        "DPI-1047",
    ];

    let has = |codes: &[&str]| codes.iter().any(|code| message.contains(code));

    if has(POOL_EXHAUSTED) {
        DataError::PoolTimeout {
            datasource: datasource_id.to_string(),
            timeout_ms: connection_timeout.as_millis() as u64,
        }
    } else if has(CONNECTION_LOST) {
        DataError::ConnectionLost(message.to_string())
    } else if has(CONNECTION_FAILED) {
        DataError::ConnectionFailed(message.to_string())
    } else {
        DataError::QueryFailed(message.to_string())
    }
}
