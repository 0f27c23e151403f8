//! Script import tests.
//!
//! Tests checkpointing, resume and terminal status of script imports run
//! through a query executor on the mock driver.

use std::fs;
use std::path::{Path, PathBuf};

use db_steward::db::MockConnector;
use db_steward::import::{
    Checkpoint, ImportStatus, ResumableImporter, CHECKPOINT_SUFFIX, ERROR_LOG_SUFFIX,
};
use db_steward::query::QueryExecutor;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::mock_config;

const SCRIPT: &str = "\
-- orders fixture
CREATE TABLE orders (id INT);

INSERT INTO orders VALUES (1);
INSERT INTO orders
  VALUES (2);
";

fn write_script(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("fixture.sql");
    fs::write(&path, content).unwrap();
    path
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}{suffix}", path.display()))
}

#[test]
fn test_full_import_succeeds_and_clears_checkpoint() {
    let dir = TempDir::new().unwrap();
    let path = write_script(&dir, SCRIPT);
    let connector = MockConnector::new();
    let mut exec = QueryExecutor::new(connector.clone(), mock_config()).unwrap();

    let report = ResumableImporter::new(&path).run(&mut exec);

    assert_eq!(report.status, ImportStatus::Success);
    assert_eq!(report.queries, 3);
    assert_eq!(report.details, "");
    assert_eq!(
        connector.executed(),
        vec![
            "CREATE TABLE orders (id INT);",
            "INSERT INTO orders VALUES (1);",
            "INSERT INTO orders\n  VALUES (2);",
        ]
    );
    assert!(!sibling(&path, CHECKPOINT_SUFFIX).exists());
}

#[test]
fn test_failing_middle_statement_keeps_previous_checkpoint() {
    let dir = TempDir::new().unwrap();
    let path = write_script(&dir, "A;\nB;\nC;\n");
    let connector = MockConnector::new();
    connector.fail_queries_containing("B", 1064, "You have an error in your SQL syntax");
    let mut exec = QueryExecutor::new(connector.clone(), mock_config()).unwrap();

    let report = ResumableImporter::new(&path).run(&mut exec);

    assert_eq!(report.status, ImportStatus::Fail);
    assert_eq!(report.queries, 1);
    assert!(report.details.starts_with("Error performing query 'B;'"));
    assert!(report.details.contains("1064"));
    assert_eq!(
        fs::read_to_string(sibling(&path, CHECKPOINT_SUFFIX)).unwrap(),
        "3"
    );
    assert_eq!(connector.executed(), vec!["A;", "B;"]);
}

#[test]
fn test_failure_is_appended_to_error_log() {
    let dir = TempDir::new().unwrap();
    let path = write_script(&dir, "A;\nB;\n");
    let connector = MockConnector::new();
    connector.fail_queries_containing("B", 1062, "Duplicate entry '1' for key 'PRIMARY'");
    let mut exec = QueryExecutor::new(connector.clone(), mock_config()).unwrap();

    ResumableImporter::new(&path).run(&mut exec);
    ResumableImporter::new(&path).run(&mut exec);

    let log = fs::read_to_string(sibling(&path, ERROR_LOG_SUFFIX)).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        "Error performing query 'B;': DB: [shop] Query: [B;] failed. \
         MySQL error: [1062 : Duplicate entry '1' for key 'PRIMARY']"
    );
}

#[test]
fn test_resume_after_failure_skips_committed_statements() {
    let dir = TempDir::new().unwrap();
    let path = write_script(&dir, SCRIPT);
    let connector = MockConnector::new();
    connector.fail_queries_containing("(2)", 1213, "Deadlock found");
    let mut exec = QueryExecutor::new(connector.clone(), mock_config()).unwrap();

    let first = ResumableImporter::new(&path).run(&mut exec);
    assert_eq!(first.status, ImportStatus::Fail);
    assert_eq!(first.queries, 2);

    connector.clear_query_failures();
    let second = ResumableImporter::new(&path).run(&mut exec);

    assert_eq!(second.status, ImportStatus::Success);
    assert_eq!(second.queries, 1);
    let executed = connector.executed();
    assert_eq!(
        executed
            .iter()
            .filter(|sql| sql.as_str() == "INSERT INTO orders VALUES (1);")
            .count(),
        1
    );
    assert_eq!(executed.last().unwrap(), "INSERT INTO orders\n  VALUES (2);");
}

#[test]
fn test_resume_after_crash_from_saved_offset() {
    let dir = TempDir::new().unwrap();
    let path = write_script(&dir, "A;\nB;\nC;\n");
    // A previous process committed A and B before dying.
    Checkpoint::for_script(&path).save(6).unwrap();
    let connector = MockConnector::new();
    let mut exec = QueryExecutor::new(connector.clone(), mock_config()).unwrap();

    let report = ResumableImporter::new(&path).run(&mut exec);

    assert_eq!(report.status, ImportStatus::Success);
    assert_eq!(report.queries, 1);
    assert_eq!(connector.executed(), vec!["C;"]);
}

#[test]
fn test_comments_only_script() {
    let dir = TempDir::new().unwrap();
    let path = write_script(&dir, "-- nothing here\n\n   \n-- still nothing\n");
    let connector = MockConnector::new();
    let mut exec = QueryExecutor::new(connector.clone(), mock_config()).unwrap();

    let report = ResumableImporter::new(&path).run(&mut exec);

    assert_eq!(report.status, ImportStatus::Success);
    assert_eq!(report.queries, 0);
    assert!(!sibling(&path, CHECKPOINT_SUFFIX).exists());
    assert!(connector.executed().is_empty());
}

#[test]
fn test_unterminated_statement_is_partly() {
    let dir = TempDir::new().unwrap();
    let path = write_script(&dir, "A;\nSELECT\n  1\n");
    let connector = MockConnector::new();
    let mut exec = QueryExecutor::new(connector.clone(), mock_config()).unwrap();

    let report = ResumableImporter::new(&path).run(&mut exec);

    assert_eq!(report.status, ImportStatus::Partly);
    assert_eq!(report.queries, 1);
    assert_eq!(report.details, "3/14 21%");
    assert!(sibling(&path, CHECKPOINT_SUFFIX).exists());
}

#[test]
fn test_missing_script() {
    let dir = TempDir::new().unwrap();
    let connector = MockConnector::new();
    let mut exec = QueryExecutor::new(connector.clone(), mock_config()).unwrap();

    let report = ResumableImporter::new(dir.path().join("absent.sql")).run(&mut exec);

    assert_eq!(report.status, ImportStatus::Fail);
    assert_eq!(report.details, "File not found");
    assert_eq!(report.queries, 0);
    assert_eq!(connector.connect_attempts(), 0);
}

#[test]
fn test_report_serializes_lowercase_status() {
    let dir = TempDir::new().unwrap();
    let path = write_script(&dir, "A;\n");
    let mut exec = QueryExecutor::new(MockConnector::new(), mock_config()).unwrap();

    let report = ResumableImporter::new(&path).run(&mut exec);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(
        json,
        serde_json::json!({ "status": "success", "details": "", "queries": 1 })
    );
}
