//! Query execution tests.
//!
//! Tests statement classification, result materialization and recovery
//! from dropped connections.

use db_steward::db::{
    FetchMode, MockConnector, RawResult, ResultMode, Row, Value, CR_SERVER_GONE_ERROR,
};
use db_steward::error::StewardError;
use db_steward::query::{escape_for_like_str, Execution, QueryExecutor};
use pretty_assertions::assert_eq;

use super::mock_config;

fn executor(connector: &MockConnector) -> QueryExecutor<MockConnector> {
    QueryExecutor::new(connector.clone(), mock_config()).unwrap()
}

fn orders() -> MockConnector {
    MockConnector::new().with_result(
        "SELECT id, status FROM orders",
        &["id", "status"],
        vec![
            vec![Value::Int(1), Value::from("paid")],
            vec![Value::Int(2), Value::from("open")],
            vec![Value::Int(3), Value::Null],
        ],
    )
}

#[test]
fn test_schema_changes_return_raw_result() {
    let connector = MockConnector::new();
    connector.set_affected_rows(9);
    let mut exec = executor(&connector);

    for sql in [
        "CREATE TABLE t (id INT)",
        "alter table t add column c int",
        "TRUNCATE t",
        "  DROP TABLE t",
    ] {
        assert_eq!(exec.execute(sql).unwrap(), Execution::Raw(RawResult::Done));
        assert_eq!(exec.affected_rows(), None, "{sql}");
        assert_eq!(exec.insert_id(), None, "{sql}");
    }
}

#[test]
fn test_affected_rows_survive_liveness_ping() {
    let connector = MockConnector::new();
    connector.set_affected_rows(4);
    let mut exec = executor(&connector);

    assert_eq!(
        exec.execute("DELETE FROM orders WHERE status = 'open'").unwrap(),
        Execution::Affected(4)
    );

    // A ping resets the server-side counter; the executor keeps its copy.
    exec.supervisor_mut().ensure_live().unwrap();
    assert_eq!(exec.affected_rows(), Some(4));
    assert_eq!(exec.affected_rows(), Some(4));
}

#[test]
fn test_insert_and_replace_expose_insert_id() {
    let connector = MockConnector::new();
    connector.set_next_insert_id(100);
    let mut exec = executor(&connector);

    exec.execute("INSERT INTO orders (status) VALUES ('new')").unwrap();
    assert_eq!(exec.insert_id(), Some(100));

    exec.execute("REPLACE INTO orders (id, status) VALUES (5, 'x')").unwrap();
    assert_eq!(exec.insert_id(), Some(101));

    exec.execute("DELETE FROM orders WHERE id = 5").unwrap();
    assert_eq!(exec.insert_id(), None);
}

#[test]
fn test_buffered_and_streaming_reads_agree() {
    let connector = orders();
    let mut exec = executor(&connector);

    let buffered = exec.execute("SELECT id, status FROM orders").unwrap();
    assert_eq!(exec.num_rows(), Some(3));

    let streamed = exec
        .execute_with_mode("SELECT id, status FROM orders", ResultMode::Use)
        .unwrap();
    assert_eq!(exec.num_rows(), None);
    assert_eq!(exec.last_num_rows(), Some(3));

    assert_eq!(buffered, streamed);
}

#[test]
fn test_rows_to_array_is_cached_per_result() {
    let connector = orders();
    let mut exec = executor(&connector);

    exec.execute_unbuffered("SELECT id, status FROM orders").unwrap();
    let again = exec.rows_to_array().to_vec();

    assert_eq!(again.len(), 3);
    assert_eq!(again[2].get("status"), Some(&Value::Null));
}

#[test]
fn test_object_rows() {
    let connector = orders();
    let mut exec = executor(&connector);
    exec.set_fetch_mode(FetchMode::Object);

    let execution = exec.execute("SELECT id, status FROM orders").unwrap();
    let Row::Record(record) = &execution.rows().unwrap()[0] else {
        panic!("expected a record row");
    };
    assert_eq!(record.columns(), ["id", "status"]);
    assert_eq!(record.get("status"), Some(&Value::from("paid")));
}

#[test]
fn test_result_released_before_next_statement() {
    let connector = orders();
    let mut exec = executor(&connector);

    exec.execute("SELECT id, status FROM orders").unwrap();
    exec.execute("UPDATE orders SET status = 'paid'").unwrap();

    assert_eq!(connector.freed().len(), 1);
}

#[test]
fn test_server_gone_recovers_once() {
    let connector = orders();
    let mut exec = executor(&connector);
    exec.execute("SELECT 1").unwrap();

    connector.drop_connections();
    let execution = exec.execute("SELECT id, status FROM orders").unwrap();

    assert_eq!(execution.rows().unwrap().len(), 3);
    assert_eq!(connector.connect_attempts(), 2);
}

#[test]
fn test_recovery_failure_is_connection_error() {
    let connector = MockConnector::new();
    let mut exec = executor(&connector);
    exec.set_reconnect_retries(2);
    exec.execute("SELECT 1").unwrap();

    connector.drop_connections();
    connector.set_unreachable(true);
    let err = exec.execute("SELECT 2").unwrap_err();

    assert!(matches!(err, StewardError::Connection(_)));
    assert_eq!(connector.connect_attempts(), 3);
}

#[test]
fn test_other_errors_are_not_retried() {
    let connector = MockConnector::new();
    connector.fail_queries_containing("missing", 1146, "Table 'shop.missing' doesn't exist");
    let mut exec = executor(&connector);

    let err = exec.execute("SELECT * FROM missing").unwrap_err();

    match err {
        StewardError::Query {
            code,
            message,
            database,
            sql,
        } => {
            assert_eq!(code, 1146);
            assert_eq!(message, "Table 'shop.missing' doesn't exist");
            assert_eq!(database, "shop");
            assert_eq!(sql, "SELECT * FROM missing");
        }
        other => panic!("expected a query error, got {other:?}"),
    }
    assert_eq!(connector.executed(), vec!["SELECT * FROM missing"]);
    assert_eq!(connector.connect_attempts(), 1);
}

#[test]
fn test_persistent_stale_connection_surfaces_native_code() {
    let connector = MockConnector::new();
    connector.fail_next_query(CR_SERVER_GONE_ERROR, "MySQL server has gone away");
    connector.fail_next_query(CR_SERVER_GONE_ERROR, "MySQL server has gone away");
    let mut exec = executor(&connector);

    let err = exec.execute("SELECT 1").unwrap_err();
    assert_eq!(err.native_code(), Some(CR_SERVER_GONE_ERROR));
}

#[test]
fn test_transaction_through_executor() {
    let connector = MockConnector::new();
    let mut exec = executor(&connector);

    exec.begin_transaction().unwrap();
    exec.execute("INSERT INTO orders (status) VALUES ('a')").unwrap();
    exec.rollback().unwrap();

    assert!(!exec.supervisor().in_transaction());
    assert_eq!(
        connector.transaction_log(),
        vec!["autocommit=0", "begin", "rollback", "autocommit=1"]
    );
}

#[test]
fn test_escape_for_like_matches_literally() {
    let connector = MockConnector::new();
    let mut exec = executor(&connector);
    exec.execute("SELECT 1").unwrap();

    let needle = "100%_off";
    let escaped = exec.escape_for_like(needle);
    assert_eq!(escaped, "100\\%\\_off");
    assert_eq!(escaped, escape_for_like_str(needle));

    // Undoing the backslash escapes yields the original characters.
    let unescaped = escaped.replace("\\%", "%").replace("\\_", "_");
    assert_eq!(unescaped, needle);
}

#[test]
fn test_last_query_metadata() {
    let connector = MockConnector::new();
    let mut exec = executor(&connector);

    exec.execute("SELECT 1").unwrap();
    assert_eq!(exec.last_query(), Some("SELECT 1"));
    assert!(exec.last_elapsed().is_some());
}
