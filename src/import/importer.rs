//! Resumable, checkpointed import of SQL script files.
//!
//! A script is read line by line. Lines starting with `--` and blank lines
//! are skipped; everything else accumulates until a line ends in `;`, at
//! which point the statement runs and the byte offset after it is saved.
//! A later run seeks to the saved offset and continues from there.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::checkpoint::{append_error_line, Checkpoint};
use crate::db::Connector;
use crate::error::Result;
use crate::query::QueryExecutor;

/// Prefix of comment lines.
const COMMENT_PREFIX: &str = "--";

/// Runs one statement of a script.
pub trait StatementExecutor {
    fn execute_statement(&mut self, sql: &str) -> Result<()>;
}

impl<C: Connector> StatementExecutor for QueryExecutor<C> {
    fn execute_statement(&mut self, sql: &str) -> Result<()> {
        self.execute(sql).map(|_| ())
    }
}

/// Terminal status of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Success,
    Partly,
    Fail,
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Partly => write!(f, "partly"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// Structured outcome of an import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub status: ImportStatus,
    pub details: String,
    /// Statements executed by this run.
    pub queries: usize,
}

impl ImportReport {
    fn fail(details: impl Into<String>, queries: usize) -> Self {
        Self {
            status: ImportStatus::Fail,
            details: details.into(),
            queries,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ImportStatus::Success
    }
}

/// Where an importer is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    NotStarted,
    Reading,
    Executing,
    Completed,
    PartiallyCompleted,
    Failed,
}

/// Imports one script file through a [`StatementExecutor`].
///
/// Runs against the same script must not overlap; the checkpoint file is
/// not locked.
#[derive(Debug)]
pub struct ResumableImporter {
    script: PathBuf,
    checkpoint: Checkpoint,
    state: ImportState,
}

impl ResumableImporter {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        let script = script.into();
        Self {
            checkpoint: Checkpoint::for_script(&script),
            script,
            state: ImportState::NotStarted,
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    /// Imports the script, resuming from the checkpoint if one exists.
    ///
    /// Failures are reported in the returned status, never raised.
    pub fn run<E: StatementExecutor + ?Sized>(&mut self, executor: &mut E) -> ImportReport {
        let report = self.import(executor);
        self.state = match report.status {
            ImportStatus::Success => ImportState::Completed,
            ImportStatus::Partly => ImportState::PartiallyCompleted,
            ImportStatus::Fail => ImportState::Failed,
        };
        info!(
            script = %self.script.display(),
            status = %report.status,
            queries = report.queries,
            "Import finished"
        );
        report
    }

    fn import<E: StatementExecutor + ?Sized>(&mut self, executor: &mut E) -> ImportReport {
        if !self.script.is_file() {
            return ImportReport::fail("File not found", 0);
        }

        let total = match fs::metadata(&self.script) {
            Ok(meta) => meta.len(),
            Err(e) => return ImportReport::fail(e.to_string(), 0),
        };
        let mut reader = match File::open(&self.script) {
            Ok(file) => BufReader::new(file),
            Err(e) => return ImportReport::fail(e.to_string(), 0),
        };
        let start = match self.checkpoint.load() {
            Ok(offset) => offset.unwrap_or(0),
            Err(e) => return ImportReport::fail(e.to_string(), 0),
        };
        if start > 0 {
            if let Err(e) = reader.seek(SeekFrom::Start(start)) {
                return ImportReport::fail(e.to_string(), 0);
            }
            info!(script = %self.script.display(), offset = start, "Resuming import");
        }

        self.state = ImportState::Reading;
        let mut position = start;
        let mut committed = start;
        let mut queries = 0;
        let mut statement = String::new();
        let mut line = Vec::new();

        let reached_eof = loop {
            line.clear();
            let read = match reader.read_until(b'\n', &mut line) {
                Ok(0) => break true,
                Ok(read) => read,
                Err(e) => {
                    warn!(error = %e, offset = position, "Read failed");
                    break false;
                }
            };
            let line_start = position;
            position += read as u64;

            let Ok(text) = std::str::from_utf8(&line) else {
                let message = format!("Line at byte offset {line_start} is not valid UTF-8");
                error!(script = %self.script.display(), "{message}");
                return ImportReport::fail(message, queries);
            };
            if text.starts_with(COMMENT_PREFIX) || text.trim().is_empty() {
                continue;
            }
            statement.push_str(text);
            if !text.trim_end().ends_with(';') {
                continue;
            }

            self.state = ImportState::Executing;
            let sql = statement.trim();
            if let Err(e) = executor.execute_statement(sql) {
                let message = format!("Error performing query '{sql}': {e}");
                error!(offset = committed, "{message}");
                if let Err(log_err) = append_error_line(&self.script, &message) {
                    warn!(error = %log_err, "Failed to write import error log");
                }
                return ImportReport::fail(message, queries);
            }

            queries += 1;
            if let Err(e) = self.checkpoint.save(position) {
                return ImportReport::fail(e.to_string(), queries);
            }
            committed = position;
            statement.clear();
            self.state = ImportState::Reading;
            debug!(queries, offset = position, "Statement imported");
        };

        if reached_eof && statement.trim().is_empty() {
            if let Err(e) = self.checkpoint.clear() {
                warn!(error = %e, "Failed to remove checkpoint");
            }
            return ImportReport {
                status: ImportStatus::Success,
                details: String::new(),
                queries,
            };
        }

        ImportReport {
            status: ImportStatus::Partly,
            details: progress(committed, total),
            queries,
        }
    }
}

/// Formats `read/total percent%`, the percentage rounded to an integer.
fn progress(read: u64, total: u64) -> String {
    let percent = if total == 0 {
        100
    } else {
        (read as f64 / total as f64 * 100.0).round() as u64
    };
    format!("{read}/{total} {percent}%")
}
