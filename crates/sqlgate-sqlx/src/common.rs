//! Pool handling and row mapping shared by the sqlx backends.

use sqlgate::{DataError, DatasourceDescriptor, OpenPool, PoolCell, PoolStatus, Result, Row, SqlValue};
use sqlx::error::DatabaseError;
use sqlx::pool::{Pool, PoolOptions};
use sqlx::postgres::PgDatabaseError;
use sqlx::{Column, ColumnIndex, Connection, Database, Decode, TypeInfo};
use tracing::{debug, warn};

/// Strip a leading `jdbc:` so JDBC-style URLs reach sqlx in native form
pub fn strip_jdbc_prefix(url: &str) -> &str {
    let url = url.trim();
    url.strip_prefix("jdbc:").unwrap_or(url)
}

/// Build a pool sized and bounded by the descriptor.
///
/// Lazy descriptors get a pool that connects on first use; eager ones
/// connect once here so an unreachable server fails provisioning.
pub(crate) async fn open_pool<DB: Database>(
    descriptor: &DatasourceDescriptor,
    options: <DB::Connection as Connection>::Options,
) -> Result<Pool<DB>> {
    let pool_options = PoolOptions::<DB>::new()
        .max_connections(descriptor.max_pool_size)
        .min_connections(0)
        .acquire_timeout(descriptor.connection_timeout());

    if descriptor.lazy {
        debug!(
            "Created lazy pool for '{}' (max {} connections)",
            descriptor.id, descriptor.max_pool_size
        );
        return Ok(pool_options.connect_lazy_with(options));
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| map_connect_error(descriptor, e))?;
    debug!(
        "Connected pool for '{}' (max {} connections)",
        descriptor.id, descriptor.max_pool_size
    );
    Ok(pool)
}

/// Hand a freshly opened pool to the strategy's cell, closing it on conflict
pub(crate) async fn install_pool<DB: Database>(
    cell: &PoolCell<Pool<DB>>,
    descriptor: &DatasourceDescriptor,
    pool: Pool<DB>,
) -> Result<()> {
    let open = OpenPool {
        pool,
        datasource_id: descriptor.id.clone(),
        max_size: descriptor.max_pool_size,
        connection_timeout: descriptor.connection_timeout(),
    };
    match cell.install(open) {
        Ok(()) => Ok(()),
        Err((err, pool)) => {
            pool.close().await;
            Err(err)
        }
    }
}

/// Close a pool, waiting at most the connection timeout for checked-out
/// connections to come back
pub(crate) async fn close_pool<DB: Database>(open: OpenPool<Pool<DB>>) {
    let OpenPool {
        pool,
        datasource_id,
        connection_timeout,
        ..
    } = open;

    debug!(
        "Closing pool for '{}' ({} connections, {} idle)",
        datasource_id,
        pool.size(),
        pool.num_idle()
    );

    if tokio::time::timeout(connection_timeout, pool.close())
        .await
        .is_err()
    {
        warn!(
            "Pool for '{}' did not drain within {}ms; remaining connections close on release",
            datasource_id,
            connection_timeout.as_millis()
        );
    }
}

pub(crate) fn pool_status<DB: Database>(open: &OpenPool<Pool<DB>>) -> PoolStatus {
    PoolStatus {
        size: open.pool.size(),
        idle: open.pool.num_idle(),
        max_size: open.max_size,
    }
}

/// Convert result rows, reading the lower-cased column labels once.
///
/// A cell the backend cannot decode fails the whole result with a
/// `QueryFailed` naming the column; it never turns into NULL.
pub(crate) fn map_rows<R, F>(rows: &[R], decode: F) -> Result<Vec<Row>>
where
    R: sqlx::Row,
    F: Fn(&R, usize) -> std::result::Result<SqlValue, sqlx::Error>,
{
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns: Vec<(String, String)> = first
        .columns()
        .iter()
        .map(|column| {
            (
                column.name().to_lowercase(),
                column.type_info().name().to_string(),
            )
        })
        .collect();

    rows.iter()
        .map(|row| {
            let mut mapped = Row::with_capacity(columns.len());
            for (idx, (label, type_name)) in columns.iter().enumerate() {
                let value = decode(row, idx).map_err(|e| {
                    DataError::QueryFailed(format!(
                        "Cannot decode column '{}' ({}): {}",
                        label, type_name, e
                    ))
                })?;
                mapped.insert(label.clone(), value);
            }
            Ok(mapped)
        })
        .collect()
}

/// Decode a cell as `T`. `Ok(None)` is SQL NULL; a value `T` cannot hold
/// stays an error so callers can fall back instead of reporting NULL.
pub(crate) fn typed_cell<'r, R, T>(
    row: &'r R,
    idx: usize,
    map: impl FnOnce(T) -> SqlValue,
) -> std::result::Result<SqlValue, sqlx::Error>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx)
        .map(|value| value.map(map).unwrap_or(SqlValue::Null))
}

/// Read the cell's raw bytes as text, or hex when they are not UTF-8.
///
/// Only meaningful where results arrive as text or blobs (SQLite, and MySQL
/// for the types its typed decoders reject).
pub(crate) fn untyped_cell<'r, R>(row: &'r R, idx: usize) -> std::result::Result<SqlValue, sqlx::Error>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    Vec<u8>: Decode<'r, R::Database>,
{
    row.try_get_unchecked::<Option<Vec<u8>>, _>(idx)
        .map(|value| value.map(text_or_hex).unwrap_or(SqlValue::Null))
}

/// Binary cells: UTF-8 text when valid, hex otherwise
pub(crate) fn text_or_hex(bytes: Vec<u8>) -> SqlValue {
    match String::from_utf8(bytes) {
        Ok(text) => SqlValue::Text(text),
        Err(e) => SqlValue::Text(hex::encode(e.into_bytes())),
    }
}

/// Categorize a failure raised while a statement was running
pub(crate) fn map_sqlx_error<P>(open: &OpenPool<P>, err: sqlx::Error) -> DataError {
    match err {
        sqlx::Error::PoolTimedOut => DataError::PoolTimeout {
            datasource: open.datasource_id.clone(),
            timeout_ms: open.connection_timeout.as_millis() as u64,
        },
        sqlx::Error::PoolClosed => DataError::Closed(open.datasource_id.clone()),
        sqlx::Error::Io(e) => DataError::ConnectionLost(e.to_string()),
        sqlx::Error::Tls(e) => DataError::ConnectionFailed(format!("TLS error: {}", e)),
        sqlx::Error::Database(db) => DataError::QueryFailed(describe_database_error(db.as_ref())),
        other => DataError::QueryFailed(other.to_string()),
    }
}

/// Categorize a failure raised while opening an eager pool
pub(crate) fn map_connect_error(descriptor: &DatasourceDescriptor, err: sqlx::Error) -> DataError {
    match err {
        sqlx::Error::Configuration(e) => DataError::invalid_configuration(format!(
            "datasource '{}': {}",
            descriptor.id, e
        )),
        sqlx::Error::PoolTimedOut => DataError::ConnectionFailed(format!(
            "{}: no connection within {}ms",
            descriptor.redacted_url(),
            descriptor.connection_timeout_ms
        )),
        sqlx::Error::Database(db) => DataError::ConnectionFailed(format!(
            "{}: {}",
            descriptor.redacted_url(),
            describe_database_error(db.as_ref())
        )),
        other => DataError::ConnectionFailed(format!("{}: {}", descriptor.redacted_url(), other)),
    }
}

/// Server message plus PostgreSQL detail/hint and the SQLSTATE/error code
fn describe_database_error(db: &dyn DatabaseError) -> String {
    let mut msg = db.message().to_string();

    if let Some(pg) = db.try_downcast_ref::<PgDatabaseError>() {
        if let Some(detail) = pg.detail() {
            msg.push_str(&format!("\nDetail: {}", detail));
        }
        if let Some(hint) = pg.hint() {
            msg.push_str(&format!("\nHint: {}", hint));
        }
    }

    if let Some(code) = db.code() {
        msg.push_str(&format!(" (code {})", code));
    }
    msg
}

/// Parse a connection URL with the backend's options type
pub(crate) fn parse_options<O>(descriptor: &DatasourceDescriptor, url: &str) -> Result<O>
where
    O: std::str::FromStr<Err = sqlx::Error>,
{
    url.parse::<O>().map_err(|e| {
        DataError::invalid_configuration(format!(
            "datasource '{}' has an invalid url {}: {}",
            descriptor.id,
            descriptor.redacted_url(),
            e
        ))
    })
}
