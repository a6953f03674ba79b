//! SQLite strategy. Placeholders are `?`, bound in index order.
//!
//! Cells are decoded by the declared column type, falling back to the value's
//! storage class for expressions. Expression text written exactly as
//! `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS` reads back as a date or date-time,
//! so `SELECT ? AS d` returns the bound date. Declared `TEXT` columns are
//! never reinterpreted.

use crate::common;
use async_trait::async_trait;
use chrono::NaiveTime;
use sqlgate::{
    ordered_params, validate, BackendStrategy, DatasourceDescriptor, Dialect, PoolCell,
    PoolStatus, QueryParams, Result, Row, SqlValue, StrategyFactory,
};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::{Column, Row as _, Sqlite, TypeInfo, ValueRef};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// SQLite strategy backed by a sqlx `SqlitePool`
pub struct SqliteStrategy {
    pool: PoolCell<SqlitePool>,
}

impl SqliteStrategy {
    pub fn new() -> Self {
        Self {
            pool: PoolCell::new(),
        }
    }

    fn connect_options(descriptor: &DatasourceDescriptor) -> Result<SqliteConnectOptions> {
        let url = common::strip_jdbc_prefix(&descriptor.url);
        common::parse_options(descriptor, url)
    }

    async fn fetch<'q>(
        &self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
        sql: &str,
    ) -> Result<Vec<Row>> {
        let open = self.pool.get()?;
        let start = Instant::now();

        let rows = query.fetch_all(&open.pool).await.map_err(|e| {
            error!("SQLite query on '{}' failed: {}", open.datasource_id, e);
            error!("Failed SQL: {}", sql);
            common::map_sqlx_error(&open, e)
        })?;

        let mapped = common::map_rows(&rows, decode_cell).map_err(|e| {
            error!("SQLite result from '{}' could not be mapped: {}", open.datasource_id, e);
            error!("Failed SQL: {}", sql);
            e
        })?;
        debug!(
            "SQLite query on '{}' returned {} rows in {}ms",
            open.datasource_id,
            mapped.len(),
            start.elapsed().as_millis()
        );
        Ok(mapped)
    }
}

impl Default for SqliteStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendStrategy for SqliteStrategy {
    fn dialect_name(&self) -> &'static str {
        Dialect::Sqlite.as_str()
    }

    async fn init(&self, descriptor: &DatasourceDescriptor) -> Result<()> {
        self.pool.ensure_uninitialized(&descriptor.id)?;

        debug!("Opening SQLite pool for '{}': {}", descriptor.id, descriptor.url);
        let options = Self::connect_options(descriptor)?;
        let pool = common::open_pool::<Sqlite>(descriptor, options).await?;
        common::install_pool(&self.pool, descriptor, pool).await
    }

    async fn execute_query(&self, sql: &str) -> Result<Vec<Row>> {
        debug!("Executing SQL: {}", sql);
        self.fetch(sqlx::query(sql), sql).await
    }

    async fn execute_query_with_params(&self, sql: &str, params: &QueryParams) -> Result<Vec<Row>> {
        validate(sql)?;
        let ordered = ordered_params(params)?;

        debug!("Executing SQL with {} params: {}", ordered.len(), sql);
        let mut query = sqlx::query(sql);
        for value in ordered {
            query = bind_value(query, value);
        }
        self.fetch(query, sql).await
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(open) = self.pool.begin_close() {
            common::close_pool(open).await;
        }
        Ok(())
    }

    fn pool_status(&self) -> Option<PoolStatus> {
        self.pool.get().ok().map(|open| common::pool_status(&open))
    }
}

/// Creates [`SqliteStrategy`] instances
pub struct SqliteStrategyFactory;

impl StrategyFactory for SqliteStrategyFactory {
    fn dialect(&self) -> &'static str {
        Dialect::Sqlite.as_str()
    }

    fn create(&self) -> Arc<dyn BackendStrategy> {
        Arc::new(SqliteStrategy::new())
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::DateTime(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
    }
}

/// Declared column type, or the value's storage class for expressions.
/// The flag is true when the type came from a column declaration.
fn cell_type(row: &SqliteRow, idx: usize) -> (String, bool) {
    let declared = row.columns()[idx].type_info();
    if !declared.is_null() {
        return (declared.name().to_string(), true);
    }
    let runtime = row
        .try_get_raw(idx)
        .map(|value| value.type_info().name().to_string())
        .unwrap_or_else(|_| "NULL".to_string());
    (runtime, false)
}

/// SQLite stores whatever it is given, so a value that does not fit the
/// declared type is read back from its raw bytes
fn decode_cell(row: &SqliteRow, idx: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    let (type_name, declared) = cell_type(row, idx);

    let typed = match type_name.as_str() {
        "NULL" => Ok(SqlValue::Null),
        "BOOLEAN" => common::typed_cell(row, idx, SqlValue::Bool),
        "INTEGER" => common::typed_cell(row, idx, SqlValue::Int),
        "REAL" => common::typed_cell(row, idx, SqlValue::Float),
        "NUMERIC" => common::typed_cell(row, idx, SqlValue::Int)
            .or_else(|_| common::typed_cell(row, idx, SqlValue::Float)),
        "DATE" => common::typed_cell(row, idx, SqlValue::Date),
        "DATETIME" => common::typed_cell(row, idx, SqlValue::DateTime),
        "TIME" => common::typed_cell(row, idx, |v: NaiveTime| SqlValue::Text(v.to_string())),
        "BLOB" => common::typed_cell(row, idx, common::text_or_hex),
        // Bound dates travel as ISO text; without a declared type, read them back as dates
        "TEXT" if !declared => common::typed_cell(row, idx, |v: String| {
            SqlValue::parse_temporal(&v).unwrap_or_else(|| SqlValue::Text(v))
        }),
        _ => common::typed_cell(row, idx, SqlValue::Text),
    };

    typed.or_else(|e| {
        debug!("Column {} ({}) read as raw bytes: {}", idx, type_name, e);
        common::untyped_cell(row, idx)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sqlgate::DataError;

    fn memory() -> DatasourceDescriptor {
        DatasourceDescriptor::new("local", "sqlite", "sqlite::memory:").with_max_pool_size(2)
    }

    #[tokio::test]
    async fn test_select_literal() {
        let strategy = SqliteStrategy::new();
        strategy.init(&memory()).await.unwrap();

        let rows = strategy.execute_query("SELECT 1 AS X, 'a' AS Label").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns().collect::<Vec<_>>(), vec!["x", "label"]);
        assert_eq!(rows[0].get("x"), Some(&SqlValue::Int(1)));
        assert_eq!(rows[0].get("label"), Some(&SqlValue::Text("a".into())));

        strategy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_typed_expressions() {
        let strategy = SqliteStrategy::new();
        strategy.init(&memory()).await.unwrap();

        let rows = strategy
            .execute_query("SELECT 2.5 AS f, NULL AS n, x'ff00' AS b")
            .await
            .unwrap();
        assert_eq!(rows[0].get("f"), Some(&SqlValue::Float(2.5)));
        assert_eq!(rows[0].get("n"), Some(&SqlValue::Null));
        assert_eq!(rows[0].get("b"), Some(&SqlValue::Text("ff00".into())));

        strategy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_params_bind_in_index_order() {
        let strategy = SqliteStrategy::new();
        strategy.init(&memory()).await.unwrap();

        let mut params = QueryParams::new();
        params.insert(2, SqlValue::Text("second".into()));
        params.insert(1, SqlValue::Int(7));

        let rows = strategy
            .execute_query_with_params("SELECT ? AS a, ? AS b", &params)
            .await
            .unwrap();
        assert_eq!(rows[0].get("a"), Some(&SqlValue::Int(7)));
        assert_eq!(rows[0].get("b"), Some(&SqlValue::Text("second".into())));

        strategy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bound_date_selected_as_expression() {
        let strategy = SqliteStrategy::new();
        strategy.init(&memory()).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 3, 25).unwrap();
        let at = date.and_hms_opt(9, 30, 0).unwrap();
        let mut params = QueryParams::new();
        params.insert(1, SqlValue::Date(date));
        params.insert(2, SqlValue::DateTime(at));
        params.insert(3, SqlValue::Text("2025-03-25 is launch day".into()));

        let rows = strategy
            .execute_query_with_params("SELECT ? AS d, ? AS t, ? AS s", &params)
            .await
            .unwrap();
        assert_eq!(rows[0].get("d"), Some(&SqlValue::Date(date)));
        assert_eq!(rows[0].get("t"), Some(&SqlValue::DateTime(at)));
        assert_eq!(
            rows[0].get("s"),
            Some(&SqlValue::Text("2025-03-25 is launch day".into()))
        );

        strategy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_values_outside_declared_type_are_not_null() {
        let strategy = SqliteStrategy::new();
        strategy.init(&memory().with_max_pool_size(1)).await.unwrap();

        strategy
            .execute_query("CREATE TABLE t (n INTEGER, r REAL, d DATE)")
            .await
            .unwrap();
        strategy
            .execute_query("INSERT INTO t VALUES ('abc', 'xyz', 'someday')")
            .await
            .unwrap();

        let rows = strategy.execute_query("SELECT n, r, d FROM t").await.unwrap();
        assert_eq!(rows[0].get("n"), Some(&SqlValue::Text("abc".into())));
        assert_eq!(rows[0].get("r"), Some(&SqlValue::Text("xyz".into())));
        assert_eq!(rows[0].get("d"), Some(&SqlValue::Text("someday".into())));

        strategy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_syntax_error_is_a_query_error() {
        let strategy = SqliteStrategy::new();
        strategy.init(&memory()).await.unwrap();

        let err = strategy.execute_query("SELEC 1").await.unwrap_err();
        assert!(matches!(err, DataError::QueryFailed(_)));
        assert!(err.to_string().contains("syntax error"));

        strategy.shutdown().await.unwrap();
    }
}
