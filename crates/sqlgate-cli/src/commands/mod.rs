pub mod check;
pub mod datasources;
pub mod query;

pub use check::CheckCommand;
pub use datasources::DatasourcesCommand;
pub use query::QueryCommand;
