//! MySQL driver implementation.
//!
//! Provides `MySqlConnector` and `MySqlLink`, which implement the blocking
//! driver capability on top of sqlx. Each connector owns a current-thread
//! tokio runtime and every call blocks on it, so callers see plain
//! synchronous I/O. Unbuffered results are streamed through [`super::stream`].

use super::stream::{EventSender, EventStream, StreamEvent};
use super::{
    returns_rows, ColumnInfo, ConnectParams, ConnectTarget, Connection, Connector, DriverError,
    DriverResult, RawResult, ResultHandle, ResultMode, Value, CR_CONN_HOST_ERROR,
    CR_SERVER_GONE_ERROR, CR_UNKNOWN_ERROR,
};
use crate::error::{Result, StewardError};
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::{
    Column as SqlxColumn, ConnectOptions, Connection as SqlxConnection, Either, Row as SqlxRow,
    TypeInfo,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, warn};

/// Opens MySQL connections through sqlx.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    runtime: Arc<Runtime>,
}

impl MySqlConnector {
    /// Creates a connector with its own blocking runtime.
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                StewardError::internal(format!("Failed to start driver runtime: {e}"))
            })?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }
}

impl Connector for MySqlConnector {
    type Conn = MySqlLink;

    fn connect(&self, params: &ConnectParams) -> DriverResult<MySqlLink> {
        let mut options = MySqlConnectOptions::new()
            .username(&params.user)
            .charset(&params.charset);

        options = match &params.target {
            ConnectTarget::Tcp { host, port } => options.host(host).port(*port),
            ConnectTarget::Socket(path) => options.socket(path),
        };
        if let Some(password) = &params.password {
            options = options.password(password);
        }
        if let Some(database) = &params.database {
            options = options.database(database);
        }

        let conn = self
            .runtime
            .block_on(options.connect())
            .map_err(map_connect_error)?;

        debug!("Opened MySQL connection");
        Ok(MySqlLink {
            conn: Some(conn),
            runtime: Arc::clone(&self.runtime),
            sets: HashMap::new(),
            stream: None,
            pending: VecDeque::new(),
            next_handle: 1,
            affected_rows: 0,
            insert_id: 0,
        })
    }
}

/// One statement's worth of output from a (possibly multi-statement) batch.
#[derive(Debug, Default)]
struct Segment {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Value>>,
    has_rows: bool,
    affected_rows: u64,
    insert_id: u64,
}

impl Segment {
    fn push_row(&mut self, row: &MySqlRow) {
        if !self.has_rows {
            self.columns = columns_of(row);
            self.has_rows = true;
        }
        self.rows.push(convert_row(row));
    }
}

#[derive(Debug)]
struct OpenSet {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Value>>,
    cursor: usize,
    mode: ResultMode,
}

/// What a streaming task hands back: the connection and the results after the first.
type BatchTail = (MySqlConnection, std::result::Result<Vec<Segment>, DriverError>);

/// An unbuffered result still being read off the wire.
#[derive(Debug)]
struct OpenStream {
    handle: ResultHandle,
    columns: Vec<ColumnInfo>,
    events: EventStream<BatchTail>,
    exhausted: bool,
}

/// An open MySQL connection.
///
/// Buffered results are read off the wire when the statement runs. An
/// unbuffered result moves the connection into a task that forwards rows as
/// they arrive; each `fetch_row` pulls one, and the connection comes back
/// once the result is freed or the next command is issued.
#[derive(Debug)]
pub struct MySqlLink {
    conn: Option<MySqlConnection>,
    runtime: Arc<Runtime>,
    sets: HashMap<ResultHandle, OpenSet>,
    stream: Option<OpenStream>,
    pending: VecDeque<Segment>,
    next_handle: u64,
    affected_rows: u64,
    insert_id: u64,
}

impl MySqlLink {
    fn execute_control(&mut self, sql: &str) -> DriverResult<()> {
        self.finish_stream();
        let conn = self.conn.as_mut().ok_or_else(DriverError::server_gone)?;
        self.runtime
            .block_on(sqlx::raw_sql(sql).execute(&mut *conn))
            .map(|_| ())
            .map_err(map_error)
    }

    fn store_set(
        &mut self,
        columns: Vec<ColumnInfo>,
        rows: Vec<Vec<Value>>,
        mode: ResultMode,
    ) -> RawResult {
        let handle = self.allocate_handle();
        self.sets.insert(
            handle,
            OpenSet {
                columns,
                rows,
                cursor: 0,
                mode,
            },
        );
        RawResult::Set(handle)
    }

    fn allocate_handle(&mut self) -> ResultHandle {
        let handle = ResultHandle::new(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn run_buffered(&mut self, sql: &str) -> DriverResult<RawResult> {
        let conn = self.conn.as_mut().ok_or_else(DriverError::server_gone)?;
        let mut segments: VecDeque<Segment> = self
            .runtime
            .block_on(run_batch(conn, sql))
            .map_err(map_error)?
            .into();

        let first = segments.pop_front().unwrap_or_default();
        self.pending = segments;
        self.affected_rows = first.affected_rows;
        self.insert_id = first.insert_id;

        if !first.has_rows && !returns_rows(sql) {
            return Ok(RawResult::Done);
        }
        Ok(self.store_set(first.columns, first.rows, ResultMode::Store))
    }

    fn start_stream(&mut self, sql: &str) -> DriverResult<RawResult> {
        let conn = self.conn.take().ok_or_else(DriverError::server_gone)?;
        let owned = sql.to_string();
        let mut events =
            EventStream::spawn(&self.runtime, move |sender| stream_batch(conn, owned, sender));

        match events.next(&self.runtime) {
            Some(StreamEvent::Columns(columns)) => {
                let handle = self.allocate_handle();
                self.stream = Some(OpenStream {
                    handle,
                    columns,
                    events,
                    exhausted: false,
                });
                Ok(RawResult::Set(handle))
            }
            Some(StreamEvent::Done {
                affected_rows,
                insert_id,
            }) => {
                self.rejoin(events);
                self.affected_rows = affected_rows;
                self.insert_id = insert_id;
                if returns_rows(sql) {
                    Ok(self.store_set(Vec::new(), Vec::new(), ResultMode::Use))
                } else {
                    Ok(RawResult::Done)
                }
            }
            Some(StreamEvent::Failed(err)) => {
                self.rejoin(events);
                Err(err)
            }
            Some(StreamEvent::Row(_)) | None => {
                self.rejoin(events);
                Err(DriverError::new(
                    CR_UNKNOWN_ERROR,
                    "Result stream ended unexpectedly",
                ))
            }
        }
    }

    /// Waits for a streaming task and takes the connection back.
    fn rejoin(&mut self, events: EventStream<BatchTail>) {
        match events.finish(&self.runtime) {
            Some((conn, tail)) => {
                self.conn = Some(conn);
                match tail {
                    Ok(segments) => self.pending = segments.into(),
                    Err(e) => warn!(error = %e, "Later result of a streamed batch failed"),
                }
            }
            None => warn!("Result stream task failed; connection dropped"),
        }
    }

    /// Discards the rest of an open unbuffered result.
    fn finish_stream(&mut self) {
        if let Some(open) = self.stream.take() {
            if !open.exhausted {
                debug!("Draining unread rows of a streamed result");
            }
            self.rejoin(open.events);
        }
    }
}

impl Connection for MySqlLink {
    fn ping(&mut self) -> bool {
        self.finish_stream();
        let Some(conn) = self.conn.as_mut() else {
            return false;
        };
        self.affected_rows = 0;
        match self.runtime.block_on(conn.ping()) {
            Ok(()) => true,
            Err(e) => {
                debug!("Ping failed: {e}");
                false
            }
        }
    }

    fn set_charset(&mut self, charset: &str) -> DriverResult<()> {
        if !charset.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DriverError::new(
                CR_UNKNOWN_ERROR,
                format!("Invalid character set name '{charset}'"),
            ));
        }
        self.execute_control(&format!("SET NAMES {charset}"))
    }

    fn select_db(&mut self, name: &str) -> DriverResult<()> {
        self.execute_control(&format!("USE `{}`", name.replace('`', "``")))
    }

    fn query(&mut self, sql: &str, mode: ResultMode) -> DriverResult<RawResult> {
        self.finish_stream();
        self.pending.clear();
        self.affected_rows = 0;
        self.insert_id = 0;

        match mode {
            ResultMode::Store => self.run_buffered(sql),
            ResultMode::Use => self.start_stream(sql),
        }
    }

    fn fetch_row(&mut self, handle: ResultHandle) -> Option<Vec<Value>> {
        if let Some(open) = self.stream.as_mut().filter(|open| open.handle == handle) {
            if open.exhausted {
                return None;
            }
            match open.events.next(&self.runtime) {
                Some(StreamEvent::Row(values)) => return Some(values),
                Some(StreamEvent::Done {
                    affected_rows,
                    insert_id,
                }) => {
                    self.affected_rows = affected_rows;
                    self.insert_id = insert_id;
                }
                Some(StreamEvent::Failed(e)) => warn!(error = %e, "Streamed result failed"),
                Some(StreamEvent::Columns(_)) | None => {}
            }
            open.exhausted = true;
            return None;
        }

        let set = self.sets.get_mut(&handle)?;
        let row = set.rows.get(set.cursor).cloned();
        if row.is_some() {
            set.cursor += 1;
        }
        row
    }

    fn data_seek(&mut self, handle: ResultHandle, row: usize) -> bool {
        match self.sets.get_mut(&handle) {
            Some(set) if set.mode == ResultMode::Store && row < set.rows.len() => {
                set.cursor = row;
                true
            }
            _ => false,
        }
    }

    fn num_rows(&self, handle: ResultHandle) -> Option<usize> {
        self.sets
            .get(&handle)
            .filter(|set| set.mode == ResultMode::Store)
            .map(|set| set.rows.len())
    }

    fn columns(&self, handle: ResultHandle) -> Vec<ColumnInfo> {
        if let Some(open) = self.stream.as_ref().filter(|open| open.handle == handle) {
            return open.columns.clone();
        }
        self.sets
            .get(&handle)
            .map(|set| set.columns.clone())
            .unwrap_or_default()
    }

    fn free_result(&mut self, handle: ResultHandle) {
        if self.stream.as_ref().is_some_and(|open| open.handle == handle) {
            self.finish_stream();
        }
        self.sets.remove(&handle);
    }

    fn more_results(&self) -> bool {
        !self.pending.is_empty()
    }

    fn next_result(&mut self) -> bool {
        self.pending.pop_front().is_some()
    }

    fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    fn insert_id(&self) -> u64 {
        self.insert_id
    }

    fn set_autocommit(&mut self, enabled: bool) -> DriverResult<()> {
        self.execute_control(if enabled {
            "SET autocommit=1"
        } else {
            "SET autocommit=0"
        })
    }

    fn begin(&mut self) -> DriverResult<()> {
        self.execute_control("START TRANSACTION")
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.execute_control("COMMIT")
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.execute_control("ROLLBACK")
    }

    fn escape(&self, text: &str) -> String {
        crate::query::escape_str(text)
    }

    fn close(&mut self) {
        self.finish_stream();
        self.sets.clear();
        self.pending.clear();
        if let Some(conn) = self.conn.take() {
            if let Err(e) = self.runtime.block_on(conn.close()) {
                warn!("Error while closing MySQL connection: {e}");
            }
        }
    }
}

/// Runs a statement batch over the text protocol, collecting every result.
async fn run_batch(
    conn: &mut MySqlConnection,
    sql: &str,
) -> std::result::Result<Vec<Segment>, sqlx::Error> {
    let mut segments = Vec::new();
    let mut current = Segment::default();

    let mut stream = sqlx::raw_sql(sql).fetch_many(&mut *conn);
    while let Some(step) = stream.try_next().await? {
        match step {
            Either::Left(done) => {
                current.affected_rows = done.rows_affected();
                current.insert_id = done.last_insert_id();
                segments.push(std::mem::take(&mut current));
            }
            Either::Right(row) => current.push_row(&row),
        }
    }
    if current.has_rows {
        segments.push(current);
    }

    Ok(segments)
}

/// Streaming task body: forwards the first result row by row, then collects
/// the rest of the batch. The connection is always handed back.
async fn stream_batch(mut conn: MySqlConnection, sql: String, mut sender: EventSender) -> BatchTail {
    let tail = forward_batch(&mut conn, &sql, &mut sender).await;
    (conn, tail)
}

async fn forward_batch(
    conn: &mut MySqlConnection,
    sql: &str,
    sender: &mut EventSender,
) -> std::result::Result<Vec<Segment>, DriverError> {
    let mut later = Vec::new();
    let mut current = Segment::default();
    let mut in_first = true;
    let mut columns_sent = false;

    let mut stream = sqlx::raw_sql(sql).fetch_many(&mut *conn);
    loop {
        let step = match stream.try_next().await {
            Ok(Some(step)) => step,
            Ok(None) => break,
            Err(e) if in_first => {
                sender.send(StreamEvent::Failed(map_error(e))).await;
                return Ok(later);
            }
            Err(e) => return Err(map_error(e)),
        };

        match step {
            Either::Right(row) if in_first => {
                if !columns_sent {
                    sender.send(StreamEvent::Columns(columns_of(&row))).await;
                    columns_sent = true;
                }
                sender.send(StreamEvent::Row(convert_row(&row))).await;
            }
            Either::Left(done) if in_first => {
                in_first = false;
                sender
                    .send(StreamEvent::Done {
                        affected_rows: done.rows_affected(),
                        insert_id: done.last_insert_id(),
                    })
                    .await;
            }
            Either::Right(row) => current.push_row(&row),
            Either::Left(done) => {
                current.affected_rows = done.rows_affected();
                current.insert_id = done.last_insert_id();
                later.push(std::mem::take(&mut current));
            }
        }
    }

    if in_first {
        sender
            .send(StreamEvent::Done {
                affected_rows: 0,
                insert_id: 0,
            })
            .await;
    }
    if current.has_rows {
        later.push(current);
    }
    Ok(later)
}

fn columns_of(row: &MySqlRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

/// Converts a sqlx MySqlRow to raw values.
fn convert_row(row: &MySqlRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a MySqlRow to our Value type.
fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    let typed = match type_name.to_uppercase().as_str() {
        "BOOLEAN" => row.try_get::<Option<bool>, _>(index).ok().map(Value::from),

        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<Option<i64>, _>(index).ok().map(Value::from)
        }

        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row.try_get::<Option<u64>, _>(index).ok().map(|v| match v {
            Some(n) => i64::try_from(n)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::String(n.to_string())),
            None => Value::Null,
        }),

        "FLOAT" | "DOUBLE" => row.try_get::<Option<f64>, _>(index).ok().map(Value::from),

        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .map(Value::from),

        _ => None,
    };

    // Text-protocol values always decode as strings; fall back to raw bytes.
    typed
        .or_else(|| {
            row.try_get_unchecked::<Option<String>, _>(index)
                .ok()
                .map(Value::from)
        })
        .or_else(|| {
            row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
                .ok()
                .map(Value::from)
        })
        .unwrap_or(Value::Null)
}

/// Maps sqlx statement errors to native diagnostics.
fn map_error(error: sqlx::Error) -> DriverError {
    match &error {
        sqlx::Error::Database(db_error) => {
            let code = db_error
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(|e| u32::from(e.number()))
                .unwrap_or(CR_UNKNOWN_ERROR);
            DriverError::new(code, db_error.message())
        }
        sqlx::Error::Io(_) | sqlx::Error::Protocol(_) => {
            DriverError::new(CR_SERVER_GONE_ERROR, error.to_string())
        }
        _ => DriverError::new(CR_UNKNOWN_ERROR, error.to_string()),
    }
}

/// Maps sqlx connect errors to native diagnostics.
fn map_connect_error(error: sqlx::Error) -> DriverError {
    match &error {
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            DriverError::new(CR_CONN_HOST_ERROR, error.to_string())
        }
        _ => map_error(error),
    }
}
