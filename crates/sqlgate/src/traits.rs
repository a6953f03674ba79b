use crate::config::DatasourceDescriptor;
use crate::error::Result;
use crate::types::{PoolStatus, QueryParams, Row};
use async_trait::async_trait;
use downcast_rs::{impl_downcast, Downcast};
use std::sync::Arc;

/// Core trait that every database dialect implements.
///
/// A strategy owns exactly one connection pool, bound to one descriptor.
/// It is created empty by its [`StrategyFactory`], opened by `init`, and
/// closed by `shutdown`.
#[async_trait]
pub trait BackendStrategy: Send + Sync + Downcast {
    /// Stable dialect identifier, unique per strategy type
    fn dialect_name(&self) -> &'static str;

    /// Open the connection pool for `descriptor`.
    ///
    /// Fails with `AlreadyInitialized` when called a second time.
    async fn init(&self, descriptor: &DatasourceDescriptor) -> Result<()>;

    /// Execute `sql` without parameters.
    ///
    /// The statement is not screened; callers on this path are trusted.
    async fn execute_query(&self, sql: &str) -> Result<Vec<Row>>;

    /// Screen `sql` with the read-only validator, then bind `params`
    /// positionally and execute
    async fn execute_query_with_params(&self, sql: &str, params: &QueryParams) -> Result<Vec<Row>>;

    /// Close the pool. Idempotent; bounded by the connection timeout.
    async fn shutdown(&self) -> Result<()>;

    /// Current pool occupancy, if the pool is open
    fn pool_status(&self) -> Option<PoolStatus> {
        None
    }
}

impl_downcast!(BackendStrategy);

/// Creates uninitialized strategies for one dialect
pub trait StrategyFactory: Send + Sync {
    /// Canonical dialect name this factory handles
    fn dialect(&self) -> &'static str;

    /// Create a fresh strategy; the registry calls `init` on it
    fn create(&self) -> Arc<dyn BackendStrategy>;
}
