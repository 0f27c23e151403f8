//! Integration tests for db-steward.

pub mod accel_test;
pub mod executor_test;
pub mod importer_test;
pub mod mysql_test;
pub mod supervisor_test;

use db_steward::config::ConnectionConfig;

/// Connection config accepted by the mock driver.
pub fn mock_config() -> ConnectionConfig {
    ConnectionConfig {
        host: Some("db.test".to_string()),
        database: Some("shop".to_string()),
        user: Some("app".to_string()),
        retry_delay_ms: 10,
        ..Default::default()
    }
}
