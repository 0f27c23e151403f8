//! Mock database driver for testing.
//!
//! Provides a scripted in-memory driver: registered result sets, injectable
//! connect and query failures, simulated dropped connections, and a call log.

use super::{
    returns_rows, ColumnInfo, ConnectParams, Connection, Connector, DriverError, DriverResult,
    RawResult, ResultHandle, ResultMode, Value, CR_CONN_HOST_ERROR,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

#[derive(Debug, Clone)]
struct ScriptedSet {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct MockState {
    unreachable: bool,
    failing_connects: usize,
    connect_attempts: Vec<Instant>,
    last_params: Option<ConnectParams>,
    generation: u64,
    query_failures: VecDeque<DriverError>,
    failing_patterns: Vec<(String, DriverError)>,
    result_sets: HashMap<String, ScriptedSet>,
    affected_rows: u64,
    next_insert_id: u64,
    extra_results: usize,
    executed: Vec<String>,
    freed: Vec<ResultHandle>,
    drained: usize,
    tx_log: Vec<String>,
    failing_commit: bool,
    charsets: Vec<String>,
    closed: usize,
}

/// A connector whose behaviour is scripted by the test.
///
/// Clones share state, so a test can keep one clone for assertions while the
/// supervisor owns another.
#[derive(Debug, Clone)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Creates a reachable mock server with no registered result sets.
    pub fn new() -> Self {
        let state = MockState {
            affected_rows: 1,
            next_insert_id: 1,
            ..MockState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers the result set returned for an exact statement text.
    pub fn with_result(self, sql: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        self.state().result_sets.insert(
            sql.trim().to_string(),
            ScriptedSet {
                columns: columns
                    .iter()
                    .map(|name| ColumnInfo::new(*name, "VARCHAR"))
                    .collect(),
                rows,
            },
        );
        self
    }

    /// Makes every connect attempt fail until cleared.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Makes the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.state().failing_connects = count;
    }

    /// Makes the next statement fail with the given native error.
    pub fn fail_next_query(&self, code: u32, message: &str) {
        self.state()
            .query_failures
            .push_back(DriverError::new(code, message));
    }

    /// Makes every statement containing `pattern` fail with the given native error.
    pub fn fail_queries_containing(&self, pattern: &str, code: u32, message: &str) {
        self.state()
            .failing_patterns
            .push((pattern.to_string(), DriverError::new(code, message)));
    }

    /// Clears all statement failures.
    pub fn clear_query_failures(&self) {
        let mut state = self.state();
        state.query_failures.clear();
        state.failing_patterns.clear();
    }

    /// Drops every open connection server-side: pings fail and statements
    /// report "server has gone away" until a fresh handle is opened.
    pub fn drop_connections(&self) {
        self.state().generation += 1;
    }

    /// Sets the affected-row count reported for writes.
    pub fn set_affected_rows(&self, rows: u64) {
        self.state().affected_rows = rows;
    }

    /// Sets the next id generated by an insert.
    pub fn set_next_insert_id(&self, id: u64) {
        self.state().next_insert_id = id;
    }

    /// Makes every statement leave `count` extra multi-statement results pending.
    pub fn set_extra_results(&self, count: usize) {
        self.state().extra_results = count;
    }

    /// Makes commit and rollback calls fail.
    pub fn set_failing_commit(&self, failing: bool) {
        self.state().failing_commit = failing;
    }

    /// Number of connect attempts so far.
    pub fn connect_attempts(&self) -> usize {
        self.state().connect_attempts.len()
    }

    /// Instants at which connect attempts were made.
    pub fn connect_attempt_times(&self) -> Vec<Instant> {
        self.state().connect_attempts.clone()
    }

    /// Parameters of the most recent connect attempt.
    pub fn last_params(&self) -> Option<ConnectParams> {
        self.state().last_params.clone()
    }

    /// Statements issued so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    /// Result handles released so far.
    pub fn freed(&self) -> Vec<ResultHandle> {
        self.state().freed.clone()
    }

    /// Number of multi-statement results drained.
    pub fn drained(&self) -> usize {
        self.state().drained
    }

    /// Transaction-control calls made so far (`autocommit=0`, `begin`, `commit`, ...).
    pub fn transaction_log(&self) -> Vec<String> {
        self.state().tx_log.clone()
    }

    /// Character sets requested so far.
    pub fn charsets(&self) -> Vec<String> {
        self.state().charsets.clone()
    }

    /// Number of handles closed.
    pub fn closed(&self) -> usize {
        self.state().closed
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MockConnector {
    type Conn = MockConnection;

    fn connect(&self, params: &ConnectParams) -> DriverResult<MockConnection> {
        let mut state = self.state();
        state.connect_attempts.push(Instant::now());
        state.last_params = Some(params.clone());

        if state.unreachable {
            return Err(DriverError::new(
                CR_CONN_HOST_ERROR,
                "Can't connect to MySQL server (111)",
            ));
        }
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(DriverError::new(
                CR_CONN_HOST_ERROR,
                "Can't connect to MySQL server (111)",
            ));
        }

        Ok(MockConnection {
            state: Arc::clone(&self.state),
            generation: state.generation,
            database: params.database.clone(),
            open_sets: HashMap::new(),
            next_handle: 1,
            affected_rows: 0,
            insert_id: 0,
            pending_results: 0,
        })
    }
}

#[derive(Debug)]
struct OpenSet {
    set: ScriptedSet,
    cursor: usize,
    mode: ResultMode,
}

/// A handle opened by [`MockConnector`].
#[derive(Debug)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    generation: u64,
    database: Option<String>,
    open_sets: HashMap<ResultHandle, OpenSet>,
    next_handle: u64,
    affected_rows: u64,
    insert_id: u64,
    pending_results: usize,
}

impl MockConnection {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_alive(&self) -> bool {
        self.state().generation == self.generation
    }

    fn control(&mut self, entry: &str) -> DriverResult<()> {
        if !self.is_alive() {
            return Err(DriverError::server_gone());
        }
        let mut state = self.state();
        state.tx_log.push(entry.to_string());
        if state.failing_commit && (entry == "commit" || entry == "rollback") {
            return Err(DriverError::new(1180, format!("Got error during {entry}")));
        }
        Ok(())
    }
}

impl Connection for MockConnection {
    fn ping(&mut self) -> bool {
        // A real ping refreshes the session and forgets the last affected-row count.
        self.affected_rows = 0;
        self.is_alive()
    }

    fn set_charset(&mut self, charset: &str) -> DriverResult<()> {
        self.state().charsets.push(charset.to_string());
        Ok(())
    }

    fn select_db(&mut self, name: &str) -> DriverResult<()> {
        if !self.is_alive() {
            return Err(DriverError::server_gone());
        }
        self.database = Some(name.to_string());
        Ok(())
    }

    fn query(&mut self, sql: &str, mode: ResultMode) -> DriverResult<RawResult> {
        let alive = self.is_alive();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.executed.push(sql.to_string());
        self.pending_results = 0;
        self.affected_rows = 0;
        self.insert_id = 0;

        if !alive {
            return Err(DriverError::server_gone());
        }
        if let Some(err) = state.query_failures.pop_front() {
            return Err(err);
        }
        if let Some((_, err)) = state
            .failing_patterns
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
        {
            return Err(err.clone());
        }

        self.pending_results = state.extra_results;

        let trimmed = sql.trim();
        if trimmed.eq_ignore_ascii_case("SELECT DATABASE()") {
            let set = ScriptedSet {
                columns: vec![ColumnInfo::new("DATABASE()", "VARCHAR")],
                rows: vec![vec![Value::from(self.database.clone())]],
            };
            drop(state);
            return Ok(self.open(set, mode));
        }

        let scripted = state.result_sets.get(trimmed).cloned();
        match scripted {
            Some(set) => {
                drop(state);
                Ok(self.open(set, mode))
            }
            None if returns_rows(trimmed) => {
                drop(state);
                Ok(self.open(
                    ScriptedSet {
                        columns: Vec::new(),
                        rows: Vec::new(),
                    },
                    mode,
                ))
            }
            None => {
                self.affected_rows = state.affected_rows;
                let lowered = trimmed.to_ascii_lowercase();
                if lowered.starts_with("insert") || lowered.starts_with("replace") {
                    self.insert_id = state.next_insert_id;
                    state.next_insert_id += 1;
                }
                Ok(RawResult::Done)
            }
        }
    }

    fn fetch_row(&mut self, handle: ResultHandle) -> Option<Vec<Value>> {
        let open = self.open_sets.get_mut(&handle)?;
        let row = open.set.rows.get(open.cursor).cloned();
        if row.is_some() {
            open.cursor += 1;
        }
        row
    }

    fn data_seek(&mut self, handle: ResultHandle, row: usize) -> bool {
        match self.open_sets.get_mut(&handle) {
            Some(open) if open.mode == ResultMode::Store && row < open.set.rows.len() => {
                open.cursor = row;
                true
            }
            _ => false,
        }
    }

    fn num_rows(&self, handle: ResultHandle) -> Option<usize> {
        self.open_sets
            .get(&handle)
            .filter(|open| open.mode == ResultMode::Store)
            .map(|open| open.set.rows.len())
    }

    fn columns(&self, handle: ResultHandle) -> Vec<ColumnInfo> {
        self.open_sets
            .get(&handle)
            .map(|open| open.set.columns.clone())
            .unwrap_or_default()
    }

    fn free_result(&mut self, handle: ResultHandle) {
        if self.open_sets.remove(&handle).is_some() {
            self.state().freed.push(handle);
        }
    }

    fn more_results(&self) -> bool {
        self.pending_results > 0
    }

    fn next_result(&mut self) -> bool {
        if self.pending_results == 0 {
            return false;
        }
        self.pending_results -= 1;
        self.state().drained += 1;
        true
    }

    fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    fn insert_id(&self) -> u64 {
        self.insert_id
    }

    fn set_autocommit(&mut self, enabled: bool) -> DriverResult<()> {
        self.control(if enabled { "autocommit=1" } else { "autocommit=0" })
    }

    fn begin(&mut self) -> DriverResult<()> {
        self.control("begin")
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.control("commit")
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.control("rollback")
    }

    fn escape(&self, text: &str) -> String {
        crate::query::escape_str(text)
    }

    fn close(&mut self) {
        self.open_sets.clear();
        self.state().closed += 1;
    }
}

impl MockConnection {
    fn open(&mut self, set: ScriptedSet, mode: ResultMode) -> RawResult {
        let handle = ResultHandle::new(self.next_handle);
        self.next_handle += 1;
        self.open_sets.insert(
            handle,
            OpenSet {
                set,
                cursor: 0,
                mode,
            },
        );
        RawResult::Set(handle)
    }
}
