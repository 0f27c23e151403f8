//! Connection supervision tests.
//!
//! Tests lazy connect, reconnect bounds and transaction bracketing.

use std::time::Duration;

use db_steward::config::ConnectionConfig;
use db_steward::connection::ConnectionSupervisor;
use db_steward::db::{ConnectTarget, MockConnector};
use db_steward::error::StewardError;

use super::mock_config;

#[test]
fn test_unreachable_host_exhausts_retry_bound() {
    let connector = MockConnector::new();
    connector.set_unreachable(true);
    let config = ConnectionConfig {
        reconnect_retries: 3,
        retry_delay_ms: 1000,
        ..mock_config()
    };
    let mut supervisor = ConnectionSupervisor::new(connector.clone(), config).unwrap();

    let err = supervisor.ensure_live().unwrap_err();

    assert!(matches!(err, StewardError::Connection(_)));
    let attempts = connector.connect_attempt_times();
    assert_eq!(attempts.len(), 3);
    for pair in attempts.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(
            gap >= Duration::from_millis(950) && gap < Duration::from_millis(2000),
            "attempts spaced by {gap:?}"
        );
    }
}

#[test]
fn test_retry_bound_can_be_changed() {
    let connector = MockConnector::new();
    connector.set_unreachable(true);
    let mut supervisor = ConnectionSupervisor::new(connector.clone(), mock_config()).unwrap();

    supervisor.set_reconnect_retries(2);
    supervisor.set_retry_delay(Duration::from_millis(5));
    assert!(supervisor.ensure_live().is_err());
    assert_eq!(connector.connect_attempts(), 2);
}

#[test]
fn test_socket_used_without_host() {
    let connector = MockConnector::new();
    let config = ConnectionConfig {
        host: None,
        socket: Some("/run/mysqld/custom.sock".into()),
        ..mock_config()
    };
    let mut supervisor = ConnectionSupervisor::new(connector.clone(), config).unwrap();

    supervisor.connect().unwrap();

    let params = connector.last_params().unwrap();
    assert_eq!(
        params.target,
        ConnectTarget::Socket("/run/mysqld/custom.sock".into())
    );
    assert_eq!(params.database, Some("shop".to_string()));
}

#[test]
fn test_tcp_used_with_host() {
    let connector = MockConnector::new();
    let mut supervisor = ConnectionSupervisor::new(connector.clone(), mock_config()).unwrap();

    supervisor.connect().unwrap();

    assert_eq!(
        connector.last_params().unwrap().target,
        ConnectTarget::Tcp {
            host: "db.test".to_string(),
            port: 3306
        }
    );
}

#[test]
fn test_live_handle_is_reused() {
    let connector = MockConnector::new();
    let mut supervisor = ConnectionSupervisor::new(connector.clone(), mock_config()).unwrap();

    supervisor.ensure_live().unwrap();
    supervisor.ensure_live().unwrap();
    supervisor.connect().unwrap();

    assert_eq!(connector.connect_attempts(), 1);
}

#[test]
fn test_dropped_connection_recovers() {
    let connector = MockConnector::new();
    let mut supervisor = ConnectionSupervisor::new(connector.clone(), mock_config()).unwrap();
    supervisor.connect().unwrap();

    connector.drop_connections();
    connector.fail_next_connects(1);
    supervisor.ensure_live().unwrap();

    // One initial connect, one failed reconnect, one successful reconnect.
    assert_eq!(connector.connect_attempts(), 3);
    assert!(supervisor.is_connected());
}

#[test]
fn test_reconnect_reselects_database() {
    let connector = MockConnector::new();
    let mut supervisor = ConnectionSupervisor::new(connector.clone(), mock_config()).unwrap();
    supervisor.select_database(Some("reports")).unwrap();

    connector.drop_connections();
    supervisor.ensure_live().unwrap();

    assert_eq!(
        connector.last_params().unwrap().database,
        Some("reports".to_string())
    );
    assert_eq!(
        supervisor.current_database().unwrap(),
        Some("reports".to_string())
    );
}

#[test]
fn test_lost_connection_clears_transaction() {
    let connector = MockConnector::new();
    let mut supervisor = ConnectionSupervisor::new(connector.clone(), mock_config()).unwrap();
    supervisor.begin_transaction().unwrap();

    connector.drop_connections();
    supervisor.ensure_live().unwrap();

    assert!(!supervisor.in_transaction());
}

#[test]
fn test_failed_commit_restores_autocommit() {
    let connector = MockConnector::new();
    let mut supervisor = ConnectionSupervisor::new(connector.clone(), mock_config()).unwrap();
    supervisor.begin_transaction().unwrap();
    connector.set_failing_commit(true);

    let err = supervisor.commit().unwrap_err();

    assert!(matches!(err, StewardError::Query { .. }));
    assert!(!supervisor.in_transaction());
    assert_eq!(
        connector.transaction_log(),
        vec!["autocommit=0", "begin", "commit", "autocommit=1"]
    );
}
