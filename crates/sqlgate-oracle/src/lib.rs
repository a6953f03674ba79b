//! Oracle strategy for sqlgate
//!
//! The `oracle` driver is synchronous, so pool creation, statement execution
//! and pool shutdown run on tokio's blocking thread pool. Placeholders are
//! `:1`, `:2`, ... and parameter `n` binds to position `n`.
//!
//! The driver loads the Oracle client libraries at runtime; a missing client
//! surfaces as a `ConnectionFailed` error from `init`.

pub mod convert;

use async_trait::async_trait;
use convert::{classify_error, connect_string, decode_cell, OracleParam};
use oracle::pool::{CloseMode, GetMode, Pool, PoolBuilder};
use oracle::sql_type::{OracleType, ToSql};
use sqlgate::{
    ordered_params, validate, BackendStrategy, DataError, DatasourceDescriptor, Dialect, OpenPool,
    PoolCell, PoolStatus, QueryParams, Result, Row, StrategyFactory,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Retry interval while waiting for busy sessions during shutdown
const CLOSE_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Oracle strategy backed by an OCI session pool
pub struct OracleStrategy {
    pool: PoolCell<Arc<Pool>>,
}

impl OracleStrategy {
    pub fn new() -> Self {
        Self {
            pool: PoolCell::new(),
        }
    }

    async fn run(&self, sql: &str, params: Vec<OracleParam>) -> Result<Vec<Row>> {
        let open = self.pool.get()?;
        let pool = open.pool.clone();
        let datasource_id = open.datasource_id.clone();
        let timeout = open.connection_timeout;
        let statement = sql.to_string();
        let start = Instant::now();

        let rows = tokio::task::spawn_blocking(move || {
            query_blocking(&pool, &statement, &params, &datasource_id, timeout)
        })
        .await
        .map_err(|e| DataError::Internal(format!("Oracle worker failed: {}", e)))?
        .map_err(|e| {
            error!("Oracle query on '{}' failed: {}", open.datasource_id, e);
            error!("Failed SQL: {}", sql);
            e
        })?;

        debug!(
            "Oracle query on '{}' returned {} rows in {}ms",
            open.datasource_id,
            rows.len(),
            start.elapsed().as_millis()
        );
        Ok(rows)
    }
}

impl Default for OracleStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute on one pooled session; the session returns to the pool on drop
fn query_blocking(
    pool: &Pool,
    sql: &str,
    params: &[OracleParam],
    datasource_id: &str,
    timeout: Duration,
) -> Result<Vec<Row>> {
    let classify = |e: oracle::Error| classify_error(datasource_id, timeout, &e.to_string());

    let conn = pool.get().map_err(classify)?;
    let binds: Vec<&dyn ToSql> = params.iter().map(OracleParam::as_to_sql).collect();
    let result_set = conn.query(sql, &binds).map_err(classify)?;

    let columns: Vec<(String, OracleType)> = result_set
        .column_info()
        .iter()
        .map(|column| (column.name().to_lowercase(), column.oracle_type().clone()))
        .collect();

    let mut rows = Vec::new();
    for row in result_set {
        let row = row.map_err(classify)?;
        let mut mapped = Row::with_capacity(columns.len());
        for (idx, (label, oracle_type)) in columns.iter().enumerate() {
            mapped.insert(label.clone(), decode_cell(&row, idx, label, oracle_type)?);
        }
        rows.push(mapped);
    }
    Ok(rows)
}

fn build_pool(descriptor: &DatasourceDescriptor) -> oracle::Result<Pool> {
    let username = descriptor.username.clone().unwrap_or_default();
    let password = descriptor.password.clone().unwrap_or_default();

    let pool = PoolBuilder::new(username, password, connect_string(&descriptor.url))
        .min_connections(0)
        .max_connections(descriptor.max_pool_size)
        .connection_increment(1)
        .get_mode(GetMode::TimedWait(descriptor.connection_timeout()))
        .build()?;

    if !descriptor.lazy {
        // Open and release one session so an unreachable server fails here
        drop(pool.get()?);
    }
    Ok(pool)
}

/// Close gracefully while sessions are busy, forcing once the timeout passes
fn close_blocking(pool: &Pool, timeout: Duration) -> oracle::Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match pool.close(&CloseMode::Default) {
            Ok(()) => return Ok(()),
            Err(e) if Instant::now() < deadline => {
                debug!("Oracle pool still busy ({}), retrying close", e);
                std::thread::sleep(CLOSE_RETRY_INTERVAL);
            }
            Err(e) => {
                warn!("Oracle pool did not drain ({}); forcing close", e);
                return pool.close(&CloseMode::Force);
            }
        }
    }
}

#[async_trait]
impl BackendStrategy for OracleStrategy {
    fn dialect_name(&self) -> &'static str {
        Dialect::Oracle.as_str()
    }

    async fn init(&self, descriptor: &DatasourceDescriptor) -> Result<()> {
        self.pool.ensure_uninitialized(&descriptor.id)?;

        debug!(
            "Opening Oracle pool for '{}': {}",
            descriptor.id,
            descriptor.redacted_url()
        );
        let owned = descriptor.clone();
        let pool = tokio::task::spawn_blocking(move || build_pool(&owned))
            .await
            .map_err(|e| DataError::Internal(format!("Oracle worker failed: {}", e)))?
            .map_err(|e| {
                DataError::ConnectionFailed(format!("{}: {}", descriptor.redacted_url(), e))
            })?;

        let open = OpenPool {
            pool: Arc::new(pool),
            datasource_id: descriptor.id.clone(),
            max_size: descriptor.max_pool_size,
            connection_timeout: descriptor.connection_timeout(),
        };
        if let Err((err, pool)) = self.pool.install(open) {
            let timeout = descriptor.connection_timeout();
            match tokio::task::spawn_blocking(move || close_blocking(&pool, timeout)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to close surplus Oracle pool for '{}': {}", descriptor.id, e),
                Err(e) => warn!("Oracle worker failed closing surplus pool for '{}': {}", descriptor.id, e),
            }
            return Err(err);
        }
        Ok(())
    }

    async fn execute_query(&self, sql: &str) -> Result<Vec<Row>> {
        debug!("Executing SQL: {}", sql);
        self.run(sql, Vec::new()).await
    }

    async fn execute_query_with_params(&self, sql: &str, params: &QueryParams) -> Result<Vec<Row>> {
        validate(sql)?;
        let binds: Vec<OracleParam> = ordered_params(params)?
            .into_iter()
            .map(OracleParam::from)
            .collect();

        debug!("Executing SQL with {} params: {}", binds.len(), sql);
        self.run(sql, binds).await
    }

    async fn shutdown(&self) -> Result<()> {
        let Some(open) = self.pool.begin_close() else {
            return Ok(());
        };

        debug!("Closing Oracle pool for '{}'", open.datasource_id);
        let OpenPool {
            pool,
            datasource_id,
            connection_timeout,
            ..
        } = open;

        tokio::task::spawn_blocking(move || close_blocking(&pool, connection_timeout))
            .await
            .map_err(|e| DataError::Internal(format!("Oracle worker failed: {}", e)))?
            .map_err(|e| {
                DataError::Internal(format!("Failed to close Oracle pool for '{}': {}", datasource_id, e))
            })
    }

    fn pool_status(&self) -> Option<PoolStatus> {
        let open = self.pool.get().ok()?;
        let size = open.pool.open_count().ok()?;
        let busy = open.pool.busy_count().ok()?;
        Some(PoolStatus {
            size,
            idle: size.saturating_sub(busy) as usize,
            max_size: open.max_size,
        })
    }
}

/// Creates [`OracleStrategy`] instances
pub struct OracleStrategyFactory;

impl StrategyFactory for OracleStrategyFactory {
    fn dialect(&self) -> &'static str {
        Dialect::Oracle.as_str()
    }

    fn create(&self) -> Arc<dyn BackendStrategy> {
        Arc::new(OracleStrategy::new())
    }
}
