use clap::{Args, ValueEnum};
use sqlgate::{DatasourceRegistry, DatasourcesConfig, UnknownDialectPolicy};
use sqlgate_oracle::OracleStrategyFactory;
use sqlgate_sqlx::{MySqlStrategyFactory, PostgresStrategyFactory, SqliteStrategyFactory};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum UnknownDialectArg {
    /// Leave the datasource out and keep going
    Skip,
    /// Fail before any pool is opened
    Reject,
}

impl From<UnknownDialectArg> for UnknownDialectPolicy {
    fn from(arg: UnknownDialectArg) -> Self {
        match arg {
            UnknownDialectArg::Skip => UnknownDialectPolicy::Skip,
            UnknownDialectArg::Reject => UnknownDialectPolicy::Reject,
        }
    }
}

/// Options shared by every command that reads the datasource file
#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    /// Path to the datasources YAML file
    #[arg(
        long,
        short = 'c',
        env = "SQLGATE_CONFIG",
        default_value = "datasources.yaml"
    )]
    pub config: PathBuf,

    /// What to do with datasources whose dialect has no registered backend
    #[arg(
        long,
        value_enum,
        env = "SQLGATE_UNKNOWN_DIALECT",
        default_value = "skip"
    )]
    pub unknown_dialect: UnknownDialectArg,
}

impl ConfigArgs {
    pub fn load(&self) -> anyhow::Result<DatasourcesConfig> {
        debug!("Loading datasources from {}", self.config.display());
        DatasourcesConfig::from_file(&self.config)
            .map_err(|e| anyhow::anyhow!("{}: {}", self.config.display(), e))
    }
}

/// A registry with every built-in backend registered
pub async fn build_registry(policy: UnknownDialectPolicy) -> Arc<DatasourceRegistry> {
    let registry = DatasourceRegistry::new().with_unknown_dialect_policy(policy);
    registry
        .register_factory(Arc::new(PostgresStrategyFactory))
        .await;
    registry.register_factory(Arc::new(MySqlStrategyFactory)).await;
    registry
        .register_factory(Arc::new(SqliteStrategyFactory))
        .await;
    registry
        .register_factory(Arc::new(OracleStrategyFactory))
        .await;
    Arc::new(registry)
}
