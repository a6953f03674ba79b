//! MySQL / MariaDB strategy. Placeholders are `?`, bound in index order.

use crate::common;
use async_trait::async_trait;
use chrono::NaiveTime;
use sqlgate::{
    ordered_params, validate, BackendStrategy, DatasourceDescriptor, Dialect, PoolCell,
    PoolStatus, QueryParams, Result, Row, SqlValue, StrategyFactory,
};
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlRow};
use sqlx::query::Query;
use sqlx::types::{Decimal, JsonValue};
use sqlx::{Column, MySql, Row as _, TypeInfo};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// MySQL strategy backed by a sqlx `MySqlPool`
pub struct MySqlStrategy {
    pool: PoolCell<MySqlPool>,
}

impl MySqlStrategy {
    pub fn new() -> Self {
        Self {
            pool: PoolCell::new(),
        }
    }

    fn connect_options(descriptor: &DatasourceDescriptor) -> Result<MySqlConnectOptions> {
        let url = common::strip_jdbc_prefix(&descriptor.url);
        let url = match url.strip_prefix("mariadb://") {
            Some(rest) => format!("mysql://{}", rest),
            None => url.to_string(),
        };
        let mut options: MySqlConnectOptions = common::parse_options(descriptor, &url)?;

        if let Some(username) = &descriptor.username {
            options = options.username(username);
        }
        if let Some(password) = &descriptor.password {
            options = options.password(password);
        }
        Ok(options)
    }

    async fn fetch(&self, query: Query<'_, MySql, MySqlArguments>, sql: &str) -> Result<Vec<Row>> {
        let open = self.pool.get()?;
        let start = Instant::now();

        let rows = query.fetch_all(&open.pool).await.map_err(|e| {
            error!("MySQL query on '{}' failed: {}", open.datasource_id, e);
            error!("Failed SQL: {}", sql);
            common::map_sqlx_error(&open, e)
        })?;

        let mapped = common::map_rows(&rows, decode_cell).map_err(|e| {
            error!("MySQL result from '{}' could not be mapped: {}", open.datasource_id, e);
            error!("Failed SQL: {}", sql);
            e
        })?;
        debug!(
            "MySQL query on '{}' returned {} rows in {}ms",
            open.datasource_id,
            mapped.len(),
            start.elapsed().as_millis()
        );
        Ok(mapped)
    }
}

impl Default for MySqlStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendStrategy for MySqlStrategy {
    fn dialect_name(&self) -> &'static str {
        Dialect::MySql.as_str()
    }

    async fn init(&self, descriptor: &DatasourceDescriptor) -> Result<()> {
        self.pool.ensure_uninitialized(&descriptor.id)?;

        debug!(
            "Opening MySQL pool for '{}': {}",
            descriptor.id,
            descriptor.redacted_url()
        );
        let options = Self::connect_options(descriptor)?;
        let pool = common::open_pool::<MySql>(descriptor, options).await?;
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

/// Creates [`MySqlStrategy`] instances
pub struct MySqlStrategyFactory;

impl StrategyFactory for MySqlStrategyFactory {
    fn dialect(&self) -> &'static str {
        Dialect::MySql.as_str()
    }

    fn create(&self) -> Arc<dyn BackendStrategy> {
        Arc::new(MySqlStrategy::new())
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
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

/// Values the typed decoders reject (wide DECIMALs, GEOMETRY, odd collations)
/// fall back to their raw bytes
fn decode_cell(row: &MySqlRow, idx: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    let column = &row.columns()[idx];
    let type_name = column.type_info().name();

    let typed = if type_name.ends_with("UNSIGNED") {
        common::typed_cell(row, idx, |v: u64| match i64::try_from(v) {
            Ok(v) => SqlValue::Int(v),
            Err(_) => SqlValue::Float(v as f64),
        })
    } else {
        match type_name {
            "BOOLEAN" => common::typed_cell(row, idx, SqlValue::Bool),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
                common::typed_cell(row, idx, SqlValue::Int)
            }
            "FLOAT" => common::typed_cell(row, idx, |v: f32| SqlValue::Float(v.into())),
            "DOUBLE" => common::typed_cell(row, idx, SqlValue::Float),
            "DECIMAL" => common::typed_cell(row, idx, |v: Decimal| {
                SqlValue::from_decimal_str(&v.to_string())
            }),
            "DATE" => common::typed_cell(row, idx, SqlValue::Date),
            "DATETIME" | "TIMESTAMP" => common::typed_cell(row, idx, SqlValue::DateTime),
            "TIME" => common::typed_cell(row, idx, |v: NaiveTime| SqlValue::Text(v.to_string())),
            "JSON" => common::typed_cell(row, idx, |v: JsonValue| SqlValue::Text(v.to_string())),
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
                common::typed_cell(row, idx, common::text_or_hex)
            }
            "NULL" => Ok(SqlValue::Null),
            // CHAR, VARCHAR, TEXT variants, ENUM, SET and anything else stringly
            _ => common::typed_cell(row, idx, SqlValue::Text),
        }
    };

    typed.or_else(|e| {
        debug!("Column {} ({}) read as raw bytes: {}", idx, type_name, e);
        common::untyped_cell(row, idx)
    })
}
