//! Live MySQL tests.
//!
//! These need a running server; set DATABASE_URL to run them.

use db_steward::config::ConnectionConfig;
use db_steward::db::{MySqlConnector, Row, Value};
use db_steward::error::StewardError;
use db_steward::query::{Execution, QueryExecutor};

/// Helper to get test database URL from environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

/// Helper to create an executor against the test database.
fn get_test_executor() -> Option<QueryExecutor<MySqlConnector>> {
    let url = get_test_database_url()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    QueryExecutor::new(MySqlConnector::new().ok()?, config).ok()
}

#[test]
fn test_select_one() {
    let Some(mut exec) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let execution = exec.execute("SELECT 1 AS one").unwrap();
    let rows = execution.rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("one"), Some(&Value::Int(1)));
    exec.close();
}

#[test]
fn test_write_cycle() {
    let Some(mut exec) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    exec.execute("DROP TABLE IF EXISTS steward_write_cycle").unwrap();
    let created = exec
        .execute("CREATE TABLE steward_write_cycle (id INT AUTO_INCREMENT PRIMARY KEY, name VARCHAR(20))")
        .unwrap();
    assert!(matches!(created, Execution::Raw(_)));

    let inserted = exec
        .execute("INSERT INTO steward_write_cycle (name) VALUES ('a'), ('b')")
        .unwrap();
    assert_eq!(inserted, Execution::Affected(2));
    assert!(exec.insert_id().is_some());

    let streamed = exec
        .execute_unbuffered("SELECT name FROM steward_write_cycle ORDER BY id")
        .unwrap();
    let names: Vec<Option<&Value>> = streamed
        .rows()
        .unwrap()
        .iter()
        .map(|row: &Row| row.get("name"))
        .collect();
    assert_eq!(
        names,
        vec![Some(&Value::from("a")), Some(&Value::from("b"))]
    );

    exec.execute("DROP TABLE steward_write_cycle").unwrap();
    exec.close();
}

#[test]
fn test_query_error_carries_native_code() {
    let Some(mut exec) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = exec
        .execute("SELECT * FROM steward_table_that_does_not_exist")
        .unwrap_err();
    assert!(matches!(err, StewardError::Query { .. }));
    assert_eq!(err.native_code(), Some(1146));
}

#[test]
fn test_connect_to_closed_port() {
    let config = ConnectionConfig {
        host: Some("127.0.0.1".to_string()),
        port: 1,
        database: Some("testdb".to_string()),
        user: Some("testuser".to_string()),
        reconnect_retries: 1,
        retry_delay_ms: 0,
        ..Default::default()
    };

    let mut exec = QueryExecutor::new(MySqlConnector::new().unwrap(), config).unwrap();
    let err = exec.execute("SELECT 1").unwrap_err();

    assert!(matches!(err, StewardError::Connection(_)));
    assert!(err.to_string().to_lowercase().contains("connect"));
}

#[test]
fn test_unbuffered_matches_buffered() {
    let Some(mut exec) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let sql = "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 500) \
               SELECT n FROM seq";
    let streamed = exec.execute_unbuffered(sql).unwrap();
    let buffered = exec.execute(sql).unwrap();

    assert_eq!(streamed.rows().unwrap().len(), 500);
    assert_eq!(streamed, buffered);

    let after = exec.execute("SELECT 1 AS one").unwrap();
    assert_eq!(after.rows().unwrap()[0].get("one"), Some(&Value::Int(1)));
    exec.close();
}
