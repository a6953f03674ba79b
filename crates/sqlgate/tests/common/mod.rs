//! In-memory strategy used by the registry and facade tests.
//!
//! Behaviour is driven by the descriptor URL and the SQL text:
//! - url containing `unreachable` fails `init`
//! - url containing `stuck` fails `shutdown`
//! - `SELECT 1 AS x` returns one row `{x: 1}`
//! - `SLEEP <ms>` waits before returning no rows
//! - `FAIL` returns a driver error
//! - parameterized statements echo their parameters as columns `p1..pn`

#![allow(dead_code)]

use async_trait::async_trait;
use sqlgate::{
    ordered_params, validate, BackendStrategy, DataError, DatasourceDescriptor, OpenPool,
    PoolCell, PoolStatus, QueryParams, Result, Row, SqlValue, StrategyFactory,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct FakePool {
    pub fail_shutdown: bool,
}

pub struct FakeStrategy {
    dialect: &'static str,
    pool: PoolCell<FakePool>,
    pub executed: AtomicUsize,
}

impl FakeStrategy {
    pub fn new(dialect: &'static str) -> Self {
        Self {
            dialect,
            pool: PoolCell::new(),
            executed: AtomicUsize::new(0),
        }
    }

    async fn run(&self, sql: &str) -> Result<Vec<Row>> {
        self.pool.get()?;
        self.executed.fetch_add(1, Ordering::SeqCst);

        let trimmed = sql.trim();
        if trimmed.eq_ignore_ascii_case("SELECT 1 AS x") {
            let mut row = Row::new();
            row.insert("X", SqlValue::Int(1));
            return Ok(vec![row]);
        }
        if let Some(ms) = trimmed.strip_prefix("SLEEP ") {
            let ms: u64 = ms.parse().map_err(|_| DataError::InvalidQuery(sql.to_string()))?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            return Ok(Vec::new());
        }
        if trimmed == "FAIL" {
            return Err(DataError::query_failed("syntax error at or near \"FAIL\""));
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl BackendStrategy for FakeStrategy {
    fn dialect_name(&self) -> &'static str {
        self.dialect
    }

    async fn init(&self, descriptor: &DatasourceDescriptor) -> Result<()> {
        self.pool.ensure_uninitialized(&descriptor.id)?;
        if descriptor.url.contains("unreachable") {
            return Err(DataError::ConnectionFailed(format!(
                "could not reach {}",
                descriptor.redacted_url()
            )));
        }
        let open = OpenPool {
            pool: FakePool {
                fail_shutdown: descriptor.url.contains("stuck"),
            },
            datasource_id: descriptor.id.clone(),
            max_size: descriptor.max_pool_size,
            connection_timeout: descriptor.connection_timeout(),
        };
        self.pool.install(open).map_err(|(err, _)| err)
    }

    async fn execute_query(&self, sql: &str) -> Result<Vec<Row>> {
        self.run(sql).await
    }

    async fn execute_query_with_params(&self, sql: &str, params: &QueryParams) -> Result<Vec<Row>> {
        validate(sql)?;
        let ordered = ordered_params(params)?;
        self.run(sql).await?;

        let mut row = Row::new();
        for (index, value) in ordered.into_iter().enumerate() {
            row.insert(format!("p{}", index + 1), value.clone());
        }
        Ok(vec![row])
    }

    async fn shutdown(&self) -> Result<()> {
        match self.pool.begin_close() {
            Some(open) if open.pool.fail_shutdown => Err(DataError::Internal(format!(
                "pool for '{}' did not drain",
                open.datasource_id
            ))),
            _ => Ok(()),
        }
    }

    fn pool_status(&self) -> Option<PoolStatus> {
        self.pool.get().ok().map(|open| PoolStatus {
            size: 0,
            idle: 0,
            max_size: open.max_size,
        })
    }
}

pub struct FakeFactory {
    dialect: &'static str,
}

impl FakeFactory {
    pub fn new(dialect: &'static str) -> Arc<Self> {
        Arc::new(Self { dialect })
    }
}

impl StrategyFactory for FakeFactory {
    fn dialect(&self) -> &'static str {
        self.dialect
    }

    fn create(&self) -> Arc<dyn BackendStrategy> {
        Arc::new(FakeStrategy::new(self.dialect))
    }
}

pub fn descriptor(id: &str, dialect: &str) -> DatasourceDescriptor {
    DatasourceDescriptor::new(id, dialect, format!("fake://localhost/{}", id))
}
