//! # sqlgate
//!
//! Core abstractions for running read-only SQL against heterogeneous databases
//! registered under logical datasource ids.
//!
//! Supported dialects (each implemented in its own backend crate):
//! - PostgreSQL (`sqlgate-sqlx`)
//! - MySQL (`sqlgate-sqlx`)
//! - SQLite (`sqlgate-sqlx`)
//! - Oracle (`sqlgate-oracle`)
//!
//! ## Architecture
//!
//! - **BackendStrategy**: one implementation per dialect; owns a connection pool
//!   and maps driver rows into [`Row`]s
//! - **StrategyFactory**: creates uninitialized strategies for a dialect
//! - **validator**: read-only keyword screen applied to parameterized statements
//! - **DatasourceRegistry**: provisions one strategy per descriptor and owns them
//!   until shutdown
//! - **QueryFacade**: the single execution entry point used by callers
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sqlgate::{DatasourceRegistry, DatasourcesConfig, QueryFacade};
//!
//! # async fn example() -> sqlgate::Result<()> {
//! let config = DatasourcesConfig::from_yaml_str(
//!     r#"
//! datasources:
//!   - id: reporting
//!     dialect: postgresql
//!     url: postgres://localhost:5432/reporting
//!     max_pool_size: 5
//! "#,
//! )?;
//!
//! let registry = Arc::new(DatasourceRegistry::new());
//! // Factories come from the backend crates:
//! // registry.register_factory(Arc::new(PostgresStrategyFactory)).await;
//! let report = registry.initialize(config.datasources).await?;
//! assert!(report.failed.is_empty());
//!
//! let facade = QueryFacade::new(registry.clone());
//! // let response = facade.execute("reporting", "SELECT 1 AS x", None).await?;
//!
//! registry.shutdown_all().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod facade;
pub mod pool;
pub mod registry;
pub mod traits;
pub mod types;
pub mod validator;

// Re-export commonly used items
pub use config::{DatasourceDescriptor, DatasourcesConfig};
pub use error::{DataError, ErrorKind, Result};
pub use facade::{QueryFacade, QueryFailure, QueryRequest, QueryResponse, QueryStats};
pub use pool::{OpenPool, PoolCell};
pub use registry::{
    DatasourceRegistry, InitReport, RegisteredDatasource, RegistryLifecycle, ShutdownReport,
    SkippedDatasource, UnknownDialectPolicy,
};
pub use traits::{BackendStrategy, StrategyFactory};
pub use types::{ordered_params, Dialect, PoolStatus, QueryParams, Row, SqlValue};
pub use validator::validate;
