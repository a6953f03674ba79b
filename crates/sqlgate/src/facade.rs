//! The single execution entry point exposed to callers.
//!
//! [`QueryFacade::execute`] resolves a datasource, picks the plain or the
//! parameterized path, and folds every ordinary failure into a
//! [`QueryResponse`]. Only serving before the registry is initialized is
//! returned as an `Err`.

use crate::error::{DataError, ErrorKind, Result};
use crate::registry::DatasourceRegistry;
use crate::types::{QueryParams, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Inbound request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(alias = "datasourceId")]
    pub datasource_id: String,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<QueryParams>,
}

impl QueryRequest {
    pub fn new(datasource_id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            datasource_id: datasource_id.into(),
            sql: sql.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = Some(params);
        self
    }
}

/// Categorized failure carried by a [`QueryResponse`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&DataError> for QueryFailure {
    fn from(err: &DataError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStats {
    pub row_count: usize,
    pub execution_ms: u64,
}

/// Rows on success or a failure, never both
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<QueryFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<QueryStats>,
}

impl QueryResponse {
    pub fn success(rows: Vec<Row>, execution_ms: u64) -> Self {
        let row_count = rows.len();
        Self {
            data: Some(rows),
            error: None,
            stats: Some(QueryStats {
                row_count,
                execution_ms,
            }),
        }
    }

    pub fn failure(err: &DataError) -> Self {
        Self {
            data: None,
            error: Some(QueryFailure::from(err)),
            stats: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn rows(&self) -> &[Row] {
        self.data.as_deref().unwrap_or(&[])
    }
}

/// Executes statements against datasources held by a [`DatasourceRegistry`]
#[derive(Clone)]
pub struct QueryFacade {
    registry: Arc<DatasourceRegistry>,
}

impl QueryFacade {
    pub fn new(registry: Arc<DatasourceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DatasourceRegistry> {
        &self.registry
    }

    /// Run `sql` on `datasource_id`.
    ///
    /// With `params` the statement goes through the read-only screen and
    /// positional binding; without, it runs as given.
    pub async fn execute(
        &self,
        datasource_id: &str,
        sql: &str,
        params: Option<&QueryParams>,
    ) -> Result<QueryResponse> {
        match self.run(datasource_id, sql, params).await {
            Ok(response) => Ok(response),
            Err(e @ DataError::NotInitialized(_)) => Err(e),
            Err(e) => {
                warn!("Query on '{}' failed: {}", datasource_id, e);
                Ok(QueryResponse::failure(&e))
            }
        }
    }

    pub async fn handle(&self, request: QueryRequest) -> Result<QueryResponse> {
        self.execute(&request.datasource_id, &request.sql, request.params.as_ref())
            .await
    }

    async fn run(
        &self,
        datasource_id: &str,
        sql: &str,
        params: Option<&QueryParams>,
    ) -> Result<QueryResponse> {
        let datasource = self.registry.get_datasource(datasource_id).await?;
        let strategy = datasource.strategy;

        debug!(
            "Executing on '{}' ({}), {} param(s): {}",
            datasource_id,
            strategy.dialect_name(),
            params.map(|p| p.len()).unwrap_or(0),
            sql
        );

        let start = Instant::now();
        let execution = async {
            match params {
                Some(params) => strategy.execute_query_with_params(sql, params).await,
                None => strategy.execute_query(sql).await,
            }
        };

        let rows = match datasource.descriptor.statement_timeout() {
            Some(limit) => tokio::time::timeout(limit, execution)
                .await
                .map_err(|_| DataError::QueryTimeout(limit.as_millis() as u64))??,
            None => execution.await?,
        };

        let execution_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Query on '{}' returned {} row(s) in {}ms",
            datasource_id,
            rows.len(),
            execution_ms
        );
        Ok(QueryResponse::success(rows, execution_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shape() {
        let ok = QueryResponse::success(vec![Row::new()], 3);
        assert!(ok.is_success());
        assert!(ok.error.is_none());
        assert_eq!(ok.stats.unwrap().row_count, 1);

        let failed = QueryResponse::failure(&DataError::security("DROP"));
        assert!(!failed.is_success());
        assert!(failed.rows().is_empty());
        assert_eq!(failed.error_kind(), Some(ErrorKind::Security));

        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error"]["kind"], "security");
        assert_eq!(json["error"]["message"], "Forbidden SQL operation: DROP");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_request_deserialization() {
        let request: QueryRequest = serde_json::from_str(
            r#"{"datasourceId": "pg1", "sql": "SELECT ? AS d", "params": {"1": "2025-03-25"}}"#,
        )
        .unwrap();
        assert_eq!(request.datasource_id, "pg1");
        assert_eq!(request.params.unwrap().len(), 1);

        let plain: QueryRequest =
            serde_json::from_str(r#"{"datasource_id": "my1", "sql": "SELECT 1"}"#).unwrap();
        assert!(plain.params.is_none());
    }
}
