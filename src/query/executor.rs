//! Statement execution through a supervised connection.
//!
//! The executor classifies each statement, issues it with one automatic
//! recovery from a dropped connection, and materializes the outcome by class.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::connection::ConnectionSupervisor;
use crate::db::{ColumnInfo, Connection, Connector, FetchMode, RawResult, ResultMode, Row};
use crate::error::{Result, StewardError};

use super::classify::{classify_statement, StatementClass};
use super::escape::{escape_str, escape_wildcards};
use super::materializer::{PendingResult, ResultMaterializer};

/// Outcome of one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// A read that produced no result set.
    Empty,
    /// Materialized rows of a read.
    Rows(Vec<Row>),
    /// Affected-row count of a mutation.
    Affected(u64),
    /// Untouched driver result of a schema change.
    Raw(RawResult),
}

impl Execution {
    /// Rows of a read, if this is one.
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            Self::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// Affected-row count of a mutation, if this is one.
    pub fn affected(&self) -> Option<u64> {
        match self {
            Self::Affected(count) => Some(*count),
            _ => None,
        }
    }
}

/// Issues statements through a [`ConnectionSupervisor`].
pub struct QueryExecutor<C: Connector> {
    supervisor: ConnectionSupervisor<C>,
    materializer: ResultMaterializer,
    pending: Option<PendingResult>,
    last_query: Option<String>,
    last_affected_rows: Option<u64>,
    last_insert_id: Option<u64>,
    last_num_rows: Option<usize>,
    last_elapsed: Option<Duration>,
}

impl<C: Connector> QueryExecutor<C> {
    /// Creates an executor with a fresh supervisor for `config`.
    pub fn new(connector: C, config: ConnectionConfig) -> Result<Self> {
        let fetch_mode = config.fetch_mode;
        let supervisor = ConnectionSupervisor::new(connector, config)?;
        Ok(Self::with_supervisor(supervisor, fetch_mode))
    }

    /// Wraps an existing supervisor.
    pub fn with_supervisor(supervisor: ConnectionSupervisor<C>, fetch_mode: FetchMode) -> Self {
        Self {
            supervisor,
            materializer: ResultMaterializer::new(fetch_mode),
            pending: None,
            last_query: None,
            last_affected_rows: None,
            last_insert_id: None,
            last_num_rows: None,
            last_elapsed: None,
        }
    }

    /// Executes a statement with a buffered result.
    pub fn execute(&mut self, sql: &str) -> Result<Execution> {
        self.execute_with_mode(sql, ResultMode::Store)
    }

    /// Executes a statement with a streaming result.
    pub fn execute_unbuffered(&mut self, sql: &str) -> Result<Execution> {
        self.execute_with_mode(sql, ResultMode::Use)
    }

    /// Executes a statement with the given buffering mode.
    ///
    /// Schema changes return the raw driver result, mutations their
    /// affected-row count, and everything else its materialized rows.
    pub fn execute_with_mode(&mut self, sql: &str, mode: ResultMode) -> Result<Execution> {
        if sql.trim().is_empty() {
            return Err(StewardError::invalid_argument("Statement text is empty"));
        }

        self.release();
        let classification = classify_statement(sql);
        self.last_query = Some(sql.to_string());
        self.last_affected_rows = None;
        self.last_insert_id = None;
        self.last_num_rows = None;

        let started = Instant::now();
        let raw = self.issue(sql, mode);
        let elapsed = started.elapsed();
        self.last_elapsed = Some(elapsed);
        let raw = raw?;

        debug!(
            class = %classification.class,
            %mode,
            elapsed_ms = elapsed.as_millis() as u64,
            "Executed: {sql}"
        );

        if let Some(handle) = raw.handle() {
            self.pending = Some(PendingResult::new(handle, mode));
        }

        let execution = match classification.class {
            StatementClass::SchemaChange => Execution::Raw(raw),
            StatementClass::Mutation => {
                let connection = self.supervisor.connection();
                let affected = ResultMaterializer::affected_rows(connection).unwrap_or(0);
                if classification.generates_insert_id {
                    self.last_insert_id = ResultMaterializer::insert_id(connection);
                }
                self.last_affected_rows = Some(affected);
                Execution::Affected(affected)
            }
            StatementClass::Read => match raw {
                RawResult::Set(_) => {
                    let rows = self.rows_to_array().to_vec();
                    self.last_num_rows = Some(rows.len());
                    Execution::Rows(rows)
                }
                RawResult::Done => Execution::Empty,
            },
        };

        Ok(execution)
    }

    /// Issues the statement, recovering once from a dropped connection.
    fn issue(&mut self, sql: &str, mode: ResultMode) -> Result<RawResult> {
        if !self.supervisor.is_connected() {
            self.supervisor.ensure_live()?;
        }

        let outcome = match self.query_once(sql, mode)? {
            Err(err) if err.is_server_gone() => {
                warn!(error = %err, "Server has gone away; reconnecting and retrying once");
                self.supervisor.ensure_live()?;
                self.query_once(sql, mode)?
            }
            other => other,
        };

        outcome.map_err(|err| {
            StewardError::query(err.code, err.message, self.supervisor.database_name(), sql)
        })
    }

    fn query_once(
        &mut self,
        sql: &str,
        mode: ResultMode,
    ) -> Result<crate::db::DriverResult<RawResult>> {
        let conn = self
            .supervisor
            .connection_mut()
            .ok_or_else(|| StewardError::connection("Connection error. No open connection"))?;
        Ok(conn.query(sql, mode))
    }

    /// Frees the pending result and drains any further results of a batch.
    pub fn release(&mut self) {
        let pending = self.pending.take();
        if let Some(conn) = self.supervisor.connection_mut() {
            if let Some(pending) = pending {
                conn.free_result(pending.handle());
            }
            while conn.more_results() {
                if !conn.next_result() {
                    break;
                }
            }
        }
    }

    /// Rows of the pending result, materialized on first call and cached.
    pub fn rows_to_array(&mut self) -> &[Row] {
        match (self.supervisor.connection_mut(), self.pending.as_mut()) {
            (Some(conn), Some(pending)) => self.materializer.rows_to_array(conn, pending),
            _ => &[],
        }
    }

    /// Column metadata of the pending result.
    pub fn columns(&self) -> Vec<ColumnInfo> {
        match (self.supervisor.connection(), &self.pending) {
            (Some(conn), Some(pending)) => conn.columns(pending.handle()),
            _ => Vec::new(),
        }
    }

    /// Row count of a buffered pending result; `None` when streaming.
    pub fn num_rows(&self) -> Option<usize> {
        match (self.supervisor.connection(), &self.pending) {
            (Some(conn), Some(pending)) => conn.num_rows(pending.handle()),
            _ => None,
        }
    }

    /// Affected-row count of the last mutation.
    ///
    /// Read once from the driver right after the statement, so later pings do
    /// not change it.
    pub fn affected_rows(&self) -> Option<u64> {
        self.last_affected_rows
    }

    /// Id generated by the last insert or replace.
    pub fn insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    /// Rows materialized by the last read.
    pub fn last_num_rows(&self) -> Option<usize> {
        self.last_num_rows
    }

    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    pub fn last_elapsed(&self) -> Option<Duration> {
        self.last_elapsed
    }

    /// Escapes text for a quoted literal, using the driver when connected.
    pub fn escape(&self, text: &str) -> String {
        match self.supervisor.connection() {
            Some(conn) => conn.escape(text),
            None => escape_str(text),
        }
    }

    /// Like [`escape`](Self::escape), and also escapes LIKE wildcards.
    pub fn escape_for_like(&self, text: &str) -> String {
        escape_wildcards(&self.escape(text))
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        self.release();
        self.supervisor.begin_transaction()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.release();
        self.supervisor.commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.release();
        self.supervisor.rollback()
    }

    pub fn fetch_mode(&self) -> FetchMode {
        self.materializer.fetch_mode()
    }

    /// Changes the row shape for later reads.
    pub fn set_fetch_mode(&mut self, fetch_mode: FetchMode) {
        self.materializer.set_fetch_mode(fetch_mode);
    }

    pub fn set_reconnect_retries(&mut self, retries: u32) {
        self.supervisor.set_reconnect_retries(retries);
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor<C> {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut ConnectionSupervisor<C> {
        &mut self.supervisor
    }

    /// Releases the pending result and closes the connection.
    pub fn close(&mut self) {
        self.release();
        self.supervisor.close();
    }
}

impl<C: Connector> Drop for QueryExecutor<C> {
    fn drop(&mut self) {
        self.release();
    }
}
