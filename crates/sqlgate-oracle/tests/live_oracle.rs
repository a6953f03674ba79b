//! Runs against a real Oracle server when `SQLGATE_TEST_ORACLE_URL` is set
//! (for example `//localhost:1521/FREEPDB1`). Credentials come from
//! `SQLGATE_TEST_ORACLE_USER` and `SQLGATE_TEST_ORACLE_PASSWORD`.

use chrono::NaiveDate;
use sqlgate::{BackendStrategy, DataError, DatasourceDescriptor, QueryParams, SqlValue};
use sqlgate_oracle::OracleStrategy;

fn descriptor() -> Option<DatasourceDescriptor> {
    let url = match std::env::var("SQLGATE_TEST_ORACLE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            eprintln!("Skipping: SQLGATE_TEST_ORACLE_URL is not set");
            return None;
        }
    };
    let user = std::env::var("SQLGATE_TEST_ORACLE_USER").unwrap_or_else(|_| "system".into());
    let password = std::env::var("SQLGATE_TEST_ORACLE_PASSWORD").unwrap_or_default();
    Some(
        DatasourceDescriptor::new("ora1", "oracle", url)
            .with_credentials(user, password)
            .with_max_pool_size(2)
            .with_lazy(false),
    )
}

#[tokio::test]
async fn test_oracle_round_trip() {
    let Some(descriptor) = descriptor() else {
        return;
    };
    let strategy = OracleStrategy::new();
    strategy.init(&descriptor).await.unwrap();

    let rows = strategy.execute_query("SELECT 1 AS X FROM dual").await.unwrap();
    assert_eq!(rows[0].get("x"), Some(&SqlValue::Int(1)));

    let date = NaiveDate::from_ymd_opt(2025, 3, 25).unwrap();
    let mut params = QueryParams::new();
    params.insert(1, SqlValue::Date(date));
    params.insert(2, SqlValue::Text("abc".into()));

    let rows = strategy
        .execute_query_with_params("SELECT :1 AS d, :2 AS s, 2.5 AS f FROM dual", &params)
        .await
        .unwrap();
    assert_eq!(rows[0].get("d"), Some(&SqlValue::Date(date)));
    assert_eq!(rows[0].get("s"), Some(&SqlValue::Text("abc".into())));
    assert_eq!(rows[0].get("f"), Some(&SqlValue::Float(2.5)));

    let err = strategy
        .execute_query("SELECT * FROM sqlgate_missing_table")
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::QueryFailed(ref m) if m.contains("ORA-00942")));

    strategy.shutdown().await.unwrap();
    assert!(matches!(
        strategy.execute_query("SELECT 1 FROM dual").await,
        Err(DataError::Closed(_))
    ));
}

#[tokio::test]
async fn test_oracle_unmapped_types_are_not_null() {
    let Some(descriptor) = descriptor() else {
        return;
    };
    let strategy = OracleStrategy::new();
    strategy.init(&descriptor).await.unwrap();

    let rows = strategy
        .execute_query(
            "SELECT INTERVAL '2 03:04:05' DAY TO SECOND AS span, HEXTORAW('CAFE') AS raw_value FROM dual",
        )
        .await
        .unwrap();
    assert!(matches!(rows[0].get("span"), Some(SqlValue::Text(s)) if !s.is_empty()));
    assert_eq!(rows[0].get("raw_value"), Some(&SqlValue::Text("cafe".into())));

    strategy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_oracle_racing_inits_keep_one_pool() {
    let Some(descriptor) = descriptor() else {
        return;
    };
    let strategy = OracleStrategy::new();

    let (first, second) = tokio::join!(strategy.init(&descriptor), strategy.init(&descriptor));
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(DataError::AlreadyInitialized(_)))));

    let rows = strategy.execute_query("SELECT 1 AS X FROM dual").await.unwrap();
    assert_eq!(rows[0].get("x"), Some(&SqlValue::Int(1)));
    strategy.shutdown().await.unwrap();
}
