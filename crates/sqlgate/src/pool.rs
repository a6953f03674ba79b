//! Pool lifecycle shared by every strategy implementation.
//!
//! A strategy is created empty, receives exactly one pool in `init`, and gives
//! it up exactly once in `shutdown`. [`PoolCell`] enforces that sequence so each
//! backend only deals with opening, using and closing its driver's pool.

use crate::error::{DataError, Result};
use parking_lot::RwLock;
use std::time::Duration;

/// An open pool plus the descriptor settings needed while it is in use
#[derive(Debug, Clone)]
pub struct OpenPool<P> {
    pub pool: P,
    pub datasource_id: String,
    pub max_size: u32,
    /// Acquisition timeout; also bounds the drain on shutdown
    pub connection_timeout: Duration,
}

#[derive(Debug)]
enum PoolState<P> {
    Uninitialized,
    Open(OpenPool<P>),
    Closed { datasource_id: String },
}

/// Holds a strategy's pool through `Uninitialized -> Open -> Closed`
#[derive(Debug)]
pub struct PoolCell<P> {
    state: RwLock<PoolState<P>>,
}

impl<P: Clone> PoolCell<P> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PoolState::Uninitialized),
        }
    }

    /// Fail with `AlreadyInitialized` unless no pool was ever installed.
    ///
    /// Strategies call this before opening a pool so a second `init` never
    /// builds one.
    pub fn ensure_uninitialized(&self, datasource_id: &str) -> Result<()> {
        match &*self.state.read() {
            PoolState::Uninitialized => Ok(()),
            PoolState::Open(open) => Err(DataError::AlreadyInitialized(format!(
                "strategy already serves datasource '{}' (init called for '{}')",
                open.datasource_id, datasource_id
            ))),
            PoolState::Closed { datasource_id: id } => Err(DataError::AlreadyInitialized(
                format!("strategy for datasource '{}' was shut down", id),
            )),
        }
    }

    /// Install a freshly opened pool.
    ///
    /// On conflict the pool is handed back so the caller can close it.
    pub fn install(&self, open: OpenPool<P>) -> std::result::Result<(), (DataError, P)> {
        let mut state = self.state.write();
        match &*state {
            PoolState::Uninitialized => {
                *state = PoolState::Open(open);
                Ok(())
            }
            _ => {
                let err = DataError::AlreadyInitialized(format!(
                    "strategy for datasource '{}' initialized concurrently",
                    open.datasource_id
                ));
                Err((err, open.pool))
            }
        }
    }

    /// The open pool, or `NotInitialized` / `Closed`
    pub fn get(&self) -> Result<OpenPool<P>> {
        match &*self.state.read() {
            PoolState::Open(open) => Ok(open.clone()),
            PoolState::Uninitialized => Err(DataError::NotInitialized(
                "strategy has no connection pool; call init first".to_string(),
            )),
            PoolState::Closed { datasource_id } => Err(DataError::Closed(datasource_id.clone())),
        }
    }

    /// Mark the cell closed and return the pool if it was open.
    ///
    /// Later calls return `None`, which makes shutdown idempotent.
    pub fn begin_close(&self) -> Option<OpenPool<P>> {
        let mut state = self.state.write();
        match std::mem::replace(&mut *state, PoolState::Uninitialized) {
            PoolState::Open(open) => {
                *state = PoolState::Closed {
                    datasource_id: open.datasource_id.clone(),
                };
                Some(open)
            }
            other => {
                *state = other;
                None
            }
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(&*self.state.read(), PoolState::Open(_))
    }

    pub fn datasource_id(&self) -> Option<String> {
        match &*self.state.read() {
            PoolState::Open(open) => Some(open.datasource_id.clone()),
            PoolState::Closed { datasource_id } => Some(datasource_id.clone()),
            PoolState::Uninitialized => None,
        }
    }
}

impl<P: Clone> Default for PoolCell<P> {
    fn default() -> Self {
        Self::new()
    }
}
