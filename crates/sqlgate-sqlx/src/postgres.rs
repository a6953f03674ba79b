//! PostgreSQL strategy.
//!
//! Placeholders are `$1`, `$2`, ... and parameter `n` binds to `$n`.

use crate::common;
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use sqlgate::{
    ordered_params, validate, BackendStrategy, DatasourceDescriptor, Dialect, PoolCell,
    PoolStatus, QueryParams, Result, Row, SqlValue, StrategyFactory,
};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::types::{Decimal, JsonValue, Uuid};
use sqlx::{Column, Postgres, Row as _, TypeInfo};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// PostgreSQL strategy backed by a sqlx `PgPool`
pub struct PostgresStrategy {
    pool: PoolCell<PgPool>,
}

impl PostgresStrategy {
    pub fn new() -> Self {
        Self {
            pool: PoolCell::new(),
        }
    }

    fn connect_options(descriptor: &DatasourceDescriptor) -> Result<PgConnectOptions> {
        let url = common::strip_jdbc_prefix(&descriptor.url);
        let mut options: PgConnectOptions = common::parse_options(descriptor, url)?;

        if let Some(username) = &descriptor.username {
            options = options.username(username);
        }
        if let Some(password) = &descriptor.password {
            options = options.password(password);
        }
        Ok(options)
    }

    async fn fetch(&self, query: Query<'_, Postgres, PgArguments>, sql: &str) -> Result<Vec<Row>> {
        let open = self.pool.get()?;
        let start = Instant::now();

        let rows = query.fetch_all(&open.pool).await.map_err(|e| {
            error!("PostgreSQL query on '{}' failed: {}", open.datasource_id, e);
            error!("Failed SQL: {}", sql);
            common::map_sqlx_error(&open, e)
        })?;

        let mapped = common::map_rows(&rows, decode_cell).map_err(|e| {
            error!("PostgreSQL result from '{}' could not be mapped: {}", open.datasource_id, e);
            error!("Failed SQL: {}", sql);
            e
        })?;
        debug!(
            "PostgreSQL query on '{}' returned {} rows in {}ms",
            open.datasource_id,
            mapped.len(),
            start.elapsed().as_millis()
        );
        Ok(mapped)
    }
}

impl Default for PostgresStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendStrategy for PostgresStrategy {
    fn dialect_name(&self) -> &'static str {
        Dialect::PostgreSql.as_str()
    }

    async fn init(&self, descriptor: &DatasourceDescriptor) -> Result<()> {
        self.pool.ensure_uninitialized(&descriptor.id)?;

        debug!(
            "Opening PostgreSQL pool for '{}': {}",
            descriptor.id,
            descriptor.redacted_url()
        );
        let options = Self::connect_options(descriptor)?;
        let pool = common::open_pool::<Postgres>(descriptor, options).await?;
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

/// Creates [`PostgresStrategy`] instances
pub struct PostgresStrategyFactory;

impl StrategyFactory for PostgresStrategyFactory {
    fn dialect(&self) -> &'static str {
        Dialect::PostgreSql.as_str()
    }

    fn create(&self) -> Arc<dyn BackendStrategy> {
        Arc::new(PostgresStrategy::new())
    }
}

/// Calendar dates bind as DATE and date-times as TIMESTAMP; NULL binds as a
/// text NULL, so cast the placeholder when the column type matters
fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
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

/// Results arrive in binary format, so there is no safe text fallback: a value
/// outside the mapped types fails the query and should be cast to text in SQL
fn decode_cell(row: &PgRow, idx: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    let column = &row.columns()[idx];

    let value = match column.type_info().name() {
        "BOOL" => common::typed_cell(row, idx, SqlValue::Bool),
        "INT2" => common::typed_cell(row, idx, |v: i16| SqlValue::Int(v.into())),
        "INT4" => common::typed_cell(row, idx, |v: i32| SqlValue::Int(v.into())),
        "INT8" => common::typed_cell(row, idx, SqlValue::Int),
        "FLOAT4" => common::typed_cell(row, idx, |v: f32| SqlValue::Float(v.into())),
        "FLOAT8" => common::typed_cell(row, idx, SqlValue::Float),
        "NUMERIC" => common::typed_cell(row, idx, |v: Decimal| {
            SqlValue::from_decimal_str(&v.to_string())
        }),
        "DATE" => common::typed_cell(row, idx, SqlValue::Date),
        "TIMESTAMP" => common::typed_cell(row, idx, SqlValue::DateTime),
        "TIMESTAMPTZ" => common::typed_cell(row, idx, |v: DateTime<Utc>| {
            SqlValue::DateTime(v.naive_utc())
        }),
        "TIME" => common::typed_cell(row, idx, |v: NaiveTime| SqlValue::Text(v.to_string())),
        "UUID" => common::typed_cell(row, idx, |v: Uuid| SqlValue::Text(v.to_string())),
        "JSON" | "JSONB" => {
            common::typed_cell(row, idx, |v: JsonValue| SqlValue::Text(v.to_string()))
        }
        "BYTEA" => common::typed_cell(row, idx, common::text_or_hex),
        "VOID" => Ok(SqlValue::Null),
        // Text types, enums and anything else that decodes as a string
        _ => common::typed_cell(row, idx, SqlValue::Text),
    };

    value.map_err(|e| match e {
        sqlx::Error::ColumnDecode { index, source } => sqlx::Error::ColumnDecode {
            index,
            source: format!("{}; cast the column to text", source).into(),
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgate::DataError;

    #[test]
    fn test_dialect_name() {
        assert_eq!(PostgresStrategy::new().dialect_name(), "postgresql");
        assert_eq!(PostgresStrategyFactory.dialect(), "postgresql");
    }

    #[test]
    fn test_connect_options_accept_jdbc_url() {
        let descriptor = DatasourceDescriptor::new(
            "pg1",
            "postgresql",
            "jdbc:postgresql://db.internal:6543/reporting",
        )
        .with_credentials("reader", "secret");

        let options = PostgresStrategy::connect_options(&descriptor).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "reader");
        assert_eq!(options.get_database(), Some("reporting"));
    }

    #[test]
    fn test_invalid_url_is_a_configuration_error() {
        let descriptor = DatasourceDescriptor::new("pg1", "postgresql", "postgres://db:notaport/x");
        assert!(matches!(
            PostgresStrategy::connect_options(&descriptor),
            Err(DataError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_lazy_init_does_not_connect() {
        let strategy = PostgresStrategy::new();
        let descriptor =
            DatasourceDescriptor::new("pg1", "postgresql", "postgres://127.0.0.1:1/none")
                .with_max_pool_size(5);

        strategy.init(&descriptor).await.unwrap();
        let status = strategy.pool_status().unwrap();
        assert_eq!(status.size, 0);
        assert_eq!(status.max_size, 5);

        assert!(matches!(
            strategy.init(&descriptor).await,
            Err(DataError::AlreadyInitialized(_))
        ));

        strategy.shutdown().await.unwrap();
        strategy.shutdown().await.unwrap();
        assert!(strategy.pool_status().is_none());
        assert!(matches!(
            strategy.execute_query("SELECT 1").await,
            Err(DataError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn test_forbidden_statement_never_reaches_the_pool() {
        let strategy = PostgresStrategy::new();
        let err = strategy
            .execute_query_with_params("DELETE FROM users WHERE id = $1", &QueryParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Security(_)));
    }
}
