//! sqlx-backed strategies for sqlgate
//!
//! One strategy per dialect, each owning a single sqlx pool sized by the
//! descriptor's `max_pool_size` and bounded by its `connection_timeout_ms`:
//!
//! - [`PostgresStrategy`] (`postgresql`)
//! - [`MySqlStrategy`] (`mysql`, also serves MariaDB)
//! - [`SqliteStrategy`] (`sqlite`)

mod common;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use common::strip_jdbc_prefix;
pub use mysql::{MySqlStrategy, MySqlStrategyFactory};
pub use postgres::{PostgresStrategy, PostgresStrategyFactory};
pub use sqlite::{SqliteStrategy, SqliteStrategyFactory};
