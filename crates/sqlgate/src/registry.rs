use crate::config::DatasourceDescriptor;
use crate::error::{DataError, Result};
use crate::traits::{BackendStrategy, StrategyFactory};
use crate::types::Dialect;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// What `initialize` does with a descriptor whose dialect has no factory
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownDialectPolicy {
    /// Leave the datasource out and record it in the report
    #[default]
    Skip,
    /// Fail the whole `initialize` call before any pool is opened
    Reject,
}

/// Observable registry state
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RegistryLifecycle {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

impl fmt::Display for RegistryLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryLifecycle::Uninitialized => write!(f, "uninitialized"),
            RegistryLifecycle::Initializing => write!(f, "initializing"),
            RegistryLifecycle::Ready => write!(f, "ready"),
            RegistryLifecycle::Closed => write!(f, "closed"),
        }
    }
}

/// A provisioned datasource: its descriptor and the strategy serving it
#[derive(Clone)]
pub struct RegisteredDatasource {
    pub descriptor: Arc<DatasourceDescriptor>,
    pub strategy: Arc<dyn BackendStrategy>,
}

impl RegisteredDatasource {
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }
}

impl fmt::Debug for RegisteredDatasource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredDatasource")
            .field("id", &self.descriptor.id)
            .field("dialect", &self.strategy.dialect_name())
            .finish()
    }
}

/// A descriptor left out by the unknown-dialect policy
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SkippedDatasource {
    pub id: String,
    pub dialect: String,
    pub reason: String,
}

/// Outcome of [`DatasourceRegistry::initialize`]
#[derive(Debug, Default)]
pub struct InitReport {
    /// Ids now served, in descriptor order
    pub registered: Vec<String>,
    pub skipped: Vec<SkippedDatasource>,
    /// Descriptors whose strategy failed to initialize
    pub failed: Vec<(String, DataError)>,
}

impl InitReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }

    /// Turn any failed descriptor into an error listing all of them
    pub fn ensure_complete(self) -> Result<Self> {
        if self.failed.is_empty() {
            return Ok(self);
        }
        let details = self
            .failed
            .iter()
            .map(|(id, err)| format!("{}: {}", id, err))
            .collect::<Vec<_>>()
            .join("; ");
        Err(DataError::Internal(format!(
            "{} datasource(s) failed to initialize: {}",
            self.failed.len(),
            details
        )))
    }
}

/// Outcome of [`DatasourceRegistry::shutdown_all`]
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub closed: Vec<String>,
    pub failed: Vec<(String, DataError)>,
}

enum RegistryState {
    Uninitialized,
    Initializing,
    Ready(Arc<HashMap<String, RegisteredDatasource>>),
    Closed,
}

/// Owns one strategy per datasource id, from `initialize` until `shutdown_all`.
///
/// Factories are registered explicitly before `initialize`; the datasource
/// map is built once and never mutated afterwards.
pub struct DatasourceRegistry {
    factories: Arc<RwLock<HashMap<String, Arc<dyn StrategyFactory>>>>,
    state: Arc<RwLock<RegistryState>>,
    unknown_dialect_policy: UnknownDialectPolicy,
}

impl DatasourceRegistry {
    pub fn new() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
            state: Arc::new(RwLock::new(RegistryState::Uninitialized)),
            unknown_dialect_policy: UnknownDialectPolicy::default(),
        }
    }

    pub fn with_unknown_dialect_policy(mut self, policy: UnknownDialectPolicy) -> Self {
        self.unknown_dialect_policy = policy;
        self
    }

    pub fn unknown_dialect_policy(&self) -> UnknownDialectPolicy {
        self.unknown_dialect_policy
    }

    /// Register a factory for a dialect
    pub async fn register_factory(&self, factory: Arc<dyn StrategyFactory>) {
        let dialect = Dialect::canonical_name(factory.dialect());
        let mut factories = self.factories.write().await;

        if factories.contains_key(&dialect) {
            warn!("Overwriting existing factory for dialect: {}", dialect);
        }

        debug!("Registered factory for dialect: {}", dialect);
        factories.insert(dialect, factory);
    }

    /// List dialects with a registered factory, sorted
    pub async fn list_dialects(&self) -> Vec<String> {
        let factories = self.factories.read().await;
        let mut dialects: Vec<String> = factories.keys().cloned().collect();
        dialects.sort();
        dialects
    }

    /// Check if a dialect (or one of its aliases) has a factory
    pub async fn has_dialect(&self, dialect: &str) -> bool {
        let factories = self.factories.read().await;
        factories.contains_key(&Dialect::canonical_name(dialect))
    }

    /// Provision one strategy per descriptor.
    ///
    /// Unknown dialects follow the [`UnknownDialectPolicy`]. A descriptor that
    /// fails validation or `init` is recorded in the report and does not stop
    /// the others. Callable once.
    pub async fn initialize(&self, descriptors: Vec<DatasourceDescriptor>) -> Result<InitReport> {
        {
            let mut state = self.state.write().await;
            match &*state {
                RegistryState::Uninitialized => *state = RegistryState::Initializing,
                RegistryState::Closed => {
                    return Err(DataError::Closed("registry has been shut down".to_string()))
                }
                _ => {
                    return Err(DataError::AlreadyInitialized(
                        "registry initialize called twice".to_string(),
                    ))
                }
            }
        }

        let factories = self.factories.read().await.clone();

        if self.unknown_dialect_policy == UnknownDialectPolicy::Reject {
            if let Some(descriptor) = descriptors
                .iter()
                .find(|d| !factories.contains_key(&d.dialect_name()))
            {
                *self.state.write().await = RegistryState::Uninitialized;
                error!(
                    "Datasource '{}' uses unsupported dialect '{}'",
                    descriptor.id, descriptor.dialect
                );
                return Err(DataError::UnsupportedDialect(format!(
                    "{} (datasource '{}')",
                    descriptor.dialect, descriptor.id
                )));
            }
        }

        let mut report = InitReport::default();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for descriptor in descriptors {
            if let Err(e) = descriptor.validate() {
                warn!("Datasource '{}' has an invalid descriptor: {}", descriptor.id, e);
                report.failed.push((descriptor.id.clone(), e));
                continue;
            }
            if !seen.insert(descriptor.id.clone()) {
                warn!("Duplicate datasource id '{}' ignored", descriptor.id);
                let err = DataError::invalid_configuration(format!(
                    "duplicate datasource id '{}'",
                    descriptor.id
                ));
                report.failed.push((descriptor.id.clone(), err));
                continue;
            }

            let dialect = descriptor.dialect_name();
            let Some(factory) = factories.get(&dialect) else {
                warn!(
                    "Skipping datasource '{}': no strategy for dialect '{}'",
                    descriptor.id, descriptor.dialect
                );
                report.skipped.push(SkippedDatasource {
                    id: descriptor.id.clone(),
                    dialect: descriptor.dialect.clone(),
                    reason: format!("no strategy registered for dialect '{}'", dialect),
                });
                continue;
            };

            debug!(
                "Initializing datasource '{}' ({}, {})",
                descriptor.id,
                dialect,
                descriptor.redacted_url()
            );
            pending.push((Arc::new(descriptor), factory.create()));
        }

        let outcomes = join_all(pending.into_iter().map(|(descriptor, strategy)| async move {
            let outcome = strategy.init(&descriptor).await;
            (descriptor, strategy, outcome)
        }))
        .await;

        let mut datasources = HashMap::new();
        for (descriptor, strategy, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    info!(
                        "Datasource '{}' ready ({}, max pool size {})",
                        descriptor.id,
                        strategy.dialect_name(),
                        descriptor.max_pool_size
                    );
                    report.registered.push(descriptor.id.clone());
                    datasources.insert(
                        descriptor.id.clone(),
                        RegisteredDatasource {
                            descriptor,
                            strategy,
                        },
                    );
                }
                Err(e) => {
                    error!("Failed to initialize datasource '{}': {}", descriptor.id, e);
                    report.failed.push((descriptor.id.clone(), e));
                }
            }
        }

        let mut state = self.state.write().await;
        if !matches!(&*state, RegistryState::Initializing) {
            drop(state);
            warn!("Registry closed while initializing; releasing new pools");
            shutdown_datasources(datasources.into_values().collect()).await;
            return Err(DataError::Closed("registry was shut down during initialize".to_string()));
        }
        *state = RegistryState::Ready(Arc::new(datasources));

        info!(
            "Registry initialized: {} registered, {} skipped, {} failed",
            report.registered.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn datasources(&self) -> Result<Arc<HashMap<String, RegisteredDatasource>>> {
        match &*self.state.read().await {
            RegistryState::Ready(map) => Ok(map.clone()),
            RegistryState::Uninitialized | RegistryState::Initializing => Err(
                DataError::NotInitialized("datasource registry has not been initialized".to_string()),
            ),
            RegistryState::Closed => Err(DataError::Closed("datasource registry".to_string())),
        }
    }

    /// Look up a datasource with its descriptor
    pub async fn get_datasource(&self, id: &str) -> Result<RegisteredDatasource> {
        self.datasources()
            .await?
            .get(id)
            .cloned()
            .ok_or_else(|| DataError::not_found(id))
    }

    /// Look up the strategy serving `id`
    pub async fn get_strategy(&self, id: &str) -> Result<Arc<dyn BackendStrategy>> {
        Ok(self.get_datasource(id).await?.strategy)
    }

    /// All datasources with the given dialect, sorted by id
    pub async fn get_datasources_by_dialect(&self, dialect: &str) -> Result<Vec<RegisteredDatasource>> {
        let dialect = Dialect::canonical_name(dialect);
        let datasources = self.datasources().await?;

        let mut matching: Vec<RegisteredDatasource> = datasources
            .values()
            .filter(|d| d.descriptor.dialect_name() == dialect)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.descriptor.id.cmp(&b.descriptor.id));
        Ok(matching)
    }

    /// All strategies with the given dialect, ordered by datasource id; empty when none
    pub async fn get_strategies_by_dialect(&self, dialect: &str) -> Result<Vec<Arc<dyn BackendStrategy>>> {
        Ok(self
            .get_datasources_by_dialect(dialect)
            .await?
            .into_iter()
            .map(|d| d.strategy)
            .collect())
    }

    /// Registered datasource ids, sorted
    pub async fn datasource_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.datasources().await?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    pub async fn lifecycle(&self) -> RegistryLifecycle {
        match &*self.state.read().await {
            RegistryState::Uninitialized => RegistryLifecycle::Uninitialized,
            RegistryState::Initializing => RegistryLifecycle::Initializing,
            RegistryState::Ready(_) => RegistryLifecycle::Ready,
            RegistryState::Closed => RegistryLifecycle::Closed,
        }
    }

    /// Shut down every strategy, continuing past failures.
    ///
    /// The registry is closed afterwards; later calls return an empty report.
    pub async fn shutdown_all(&self) -> ShutdownReport {
        let datasources = {
            let mut state = self.state.write().await;
            match std::mem::replace(&mut *state, RegistryState::Closed) {
                RegistryState::Ready(map) => map,
                RegistryState::Closed => {
                    debug!("Registry already closed");
                    return ShutdownReport::default();
                }
                RegistryState::Uninitialized | RegistryState::Initializing => {
                    debug!("Registry closed before initialization completed");
                    return ShutdownReport::default();
                }
            }
        };

        let report = shutdown_datasources(datasources.values().cloned().collect()).await;
        info!(
            "Registry shut down: {} closed, {} failed",
            report.closed.len(),
            report.failed.len()
        );
        report
    }
}

async fn shutdown_datasources(datasources: Vec<RegisteredDatasource>) -> ShutdownReport {
    let outcomes = join_all(datasources.into_iter().map(|d| async move {
        let outcome = d.strategy.shutdown().await;
        (d.descriptor.id.clone(), outcome)
    }))
    .await;

    let mut report = ShutdownReport::default();
    for (id, outcome) in outcomes {
        match outcome {
            Ok(()) => {
                debug!("Datasource '{}' closed", id);
                report.closed.push(id);
            }
            Err(e) => {
                error!("Failed to shut down datasource '{}': {}", id, e);
                report.failed.push((id, e));
            }
        }
    }
    report.closed.sort();
    report.failed.sort_by(|a, b| a.0.cmp(&b.0));
    report
}

impl Default for DatasourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
