//! End-to-end tests through the registry and facade against SQLite.

use chrono::NaiveDate;
use sqlgate::{
    BackendStrategy, DataError, DatasourceDescriptor, DatasourceRegistry, ErrorKind, QueryFacade,
    QueryParams, SqlValue,
};
use sqlgate_sqlx::{SqliteStrategy, SqliteStrategyFactory};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn facade_for(descriptors: Vec<DatasourceDescriptor>) -> QueryFacade {
    let registry = DatasourceRegistry::new();
    registry.register_factory(Arc::new(SqliteStrategyFactory)).await;
    let report = registry.initialize(descriptors).await.unwrap();
    assert!(report.failed.is_empty(), "init failures: {:?}", report.failed);
    QueryFacade::new(Arc::new(registry))
}

fn file_descriptor(dir: &TempDir, id: &str) -> DatasourceDescriptor {
    let path = dir.path().join(format!("{}.db", id));
    DatasourceDescriptor::new(id, "sqlite", format!("sqlite://{}?mode=rwc", path.display()))
}

#[tokio::test]
async fn test_select_one_round_trip() {
    let facade = facade_for(vec![DatasourceDescriptor::new(
        "local",
        "sqlite",
        "sqlite::memory:",
    )])
    .await;

    let response = facade.execute("local", "SELECT 1 AS x", None).await.unwrap();
    let rows = response.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].len(), 1);
    assert_eq!(rows[0].get("x"), Some(&SqlValue::Int(1)));

    let strategy = facade.registry().get_strategy("local").await.unwrap();
    assert_eq!(strategy.dialect_name(), "sqlite");

    facade.registry().shutdown_all().await;
}

#[tokio::test]
async fn test_bound_date_reads_back_as_date() {
    let dir = TempDir::new().unwrap();
    let facade = facade_for(vec![file_descriptor(&dir, "events")]).await;

    // Plain path is trusted, so fixtures can be created through it
    for sql in [
        "CREATE TABLE events (id INTEGER PRIMARY KEY, name TEXT, happened_on DATE, logged_at DATETIME)",
        "INSERT INTO events (name, happened_on, logged_at) VALUES ('launch', '2025-03-25', '2025-03-25 09:30:00')",
        "INSERT INTO events (name, happened_on, logged_at) VALUES ('retro', '2025-04-01', '2025-04-01 16:00:00')",
    ] {
        let response = facade.execute("events", sql, None).await.unwrap();
        assert!(response.is_success(), "{}: {:?}", sql, response.error);
    }

    let date = NaiveDate::from_ymd_opt(2025, 3, 25).unwrap();
    let mut params = QueryParams::new();
    params.insert(1, SqlValue::Date(date));

    let response = facade
        .execute(
            "events",
            "SELECT name, happened_on AS d, logged_at FROM events WHERE happened_on = ?",
            Some(&params),
        )
        .await
        .unwrap();

    let rows = response.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("d"), Some(&SqlValue::Date(date)));
    assert_eq!(rows[0].get("name"), Some(&SqlValue::Text("launch".into())));
    assert_eq!(
        rows[0].get("logged_at"),
        Some(&SqlValue::DateTime(date.and_hms_opt(9, 30, 0).unwrap()))
    );

    facade.registry().shutdown_all().await;
}

#[tokio::test]
async fn test_select_bound_date_expression() {
    let dir = TempDir::new().unwrap();
    let facade = facade_for(vec![file_descriptor(&dir, "notes")]).await;

    for sql in [
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)",
        "INSERT INTO notes (body) VALUES ('2025-03-25')",
    ] {
        let response = facade.execute("notes", sql, None).await.unwrap();
        assert!(response.is_success(), "{}: {:?}", sql, response.error);
    }

    let date = NaiveDate::from_ymd_opt(2025, 3, 25).unwrap();
    let mut params = QueryParams::new();
    params.insert(1, SqlValue::Date(date));

    let response = facade
        .execute("notes", "SELECT ? AS d", Some(&params))
        .await
        .unwrap();
    assert_eq!(response.rows()[0].get("d"), Some(&SqlValue::Date(date)));

    // Declared text keeps its text
    let mut params = QueryParams::new();
    params.insert(1, SqlValue::Int(1));
    let response = facade
        .execute("notes", "SELECT body FROM notes WHERE id = ?", Some(&params))
        .await
        .unwrap();
    assert_eq!(
        response.rows()[0].get("body"),
        Some(&SqlValue::Text("2025-03-25".into()))
    );

    facade.registry().shutdown_all().await;
}

#[tokio::test]
async fn test_checked_out_connections_never_exceed_pool_size() {
    let facade = facade_for(vec![DatasourceDescriptor::new(
        "busy",
        "sqlite",
        "sqlite::memory:",
    )
    .with_max_pool_size(3)])
    .await;

    let strategy = facade.registry().get_strategy("busy").await.unwrap();
    let done = Arc::new(AtomicBool::new(false));
    let peak = Arc::new(AtomicU32::new(0));

    let monitor = {
        let strategy = strategy.clone();
        let done = done.clone();
        let peak = peak.clone();
        tokio::spawn(async move {
            while !done.load(Ordering::SeqCst) {
                if let Some(status) = strategy.pool_status() {
                    peak.fetch_max(status.size, Ordering::SeqCst);
                    assert!(status.in_use() <= 3);
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    let sql = "WITH RECURSIVE c(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM c WHERE n < 20000) \
               SELECT count(*) AS n FROM c";
    let handles: Vec<_> = (0..24)
        .map(|_| {
            let facade = facade.clone();
            tokio::spawn(async move { facade.execute("busy", sql, None).await })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        let response = result.unwrap().unwrap();
        assert!(response.is_success(), "{:?}", response.error);
        assert_eq!(response.rows()[0].get("n"), Some(&SqlValue::Int(20000)));
    }

    done.store(true, Ordering::SeqCst);
    monitor.await.unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(strategy.pool_status().unwrap().size <= 3);

    facade.registry().shutdown_all().await;
}

#[tokio::test]
async fn test_forbidden_statement_rejected_on_parameterized_path() {
    let dir = TempDir::new().unwrap();
    let facade = facade_for(vec![file_descriptor(&dir, "guarded")]).await;
    facade
        .execute("guarded", "CREATE TABLE t (id INTEGER)", None)
        .await
        .unwrap();

    let response = facade
        .execute("guarded", "DROP TABLE t", Some(&QueryParams::new()))
        .await
        .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Security);
    assert_eq!(error.message, "Forbidden SQL operation: DROP");

    // The table is still there
    let count = facade
        .execute("guarded", "SELECT count(*) AS c FROM t", Some(&QueryParams::new()))
        .await
        .unwrap();
    assert_eq!(count.rows()[0].get("c"), Some(&SqlValue::Int(0)));

    facade.registry().shutdown_all().await;
}

#[tokio::test]
async fn test_driver_errors_keep_the_driver_message() {
    let facade = facade_for(vec![DatasourceDescriptor::new(
        "local",
        "sqlite",
        "sqlite::memory:",
    )])
    .await;

    let response = facade
        .execute("local", "SELECT * FROM missing_table", None)
        .await
        .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Query);
    assert!(error.message.contains("no such table"), "{}", error.message);

    facade.registry().shutdown_all().await;
}

#[tokio::test]
async fn test_execute_after_shutdown_fails_fast() {
    let facade = facade_for(vec![DatasourceDescriptor::new(
        "local",
        "sqlite",
        "sqlite::memory:",
    )])
    .await;
    let strategy = facade.registry().get_strategy("local").await.unwrap();

    let report = facade.registry().shutdown_all().await;
    assert_eq!(report.closed, vec!["local"]);

    let response = tokio::time::timeout(
        Duration::from_secs(1),
        facade.execute("local", "SELECT 1 AS x", None),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(response.error_kind(), Some(ErrorKind::Closed));

    assert!(matches!(
        strategy.execute_query("SELECT 1 AS x").await,
        Err(DataError::Closed(_))
    ));
    assert!(strategy.shutdown().await.is_ok());
}

#[tokio::test]
async fn test_double_init_fails_without_replacing_the_pool() {
    let dir = TempDir::new().unwrap();
    let first = file_descriptor(&dir, "first");
    let second = file_descriptor(&dir, "second");

    let strategy = SqliteStrategy::new();
    strategy.init(&first).await.unwrap();
    strategy
        .execute_query("CREATE TABLE marker (id INTEGER)")
        .await
        .unwrap();

    let err = strategy.init(&second).await.unwrap_err();
    assert!(matches!(err, DataError::AlreadyInitialized(_)));

    // Still bound to the first database
    let rows = strategy
        .execute_query("SELECT count(*) AS c FROM marker")
        .await
        .unwrap();
    assert_eq!(rows[0].get("c"), Some(&SqlValue::Int(0)));

    strategy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_eager_pool_fails_provisioning_for_missing_file() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.db");

    let registry = DatasourceRegistry::new();
    registry.register_factory(Arc::new(SqliteStrategyFactory)).await;
    let report = registry
        .initialize(vec![
            DatasourceDescriptor::new(
                "absent",
                "sqlite",
                format!("sqlite://{}?mode=ro", missing.display()),
            )
            .with_lazy(false)
            .with_connection_timeout_ms(1_000),
            DatasourceDescriptor::new("local", "sqlite", "sqlite::memory:"),
        ])
        .await
        .unwrap();

    assert_eq!(report.registered, vec!["local"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "absent");

    registry.shutdown_all().await;
}
