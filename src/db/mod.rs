//! Database driver capability for db-steward.
//!
//! The supervisor and executor talk to MySQL through the [`Connector`] and
//! [`Connection`] traits, which mirror the classic client-library surface
//! (connect, ping, query, fetch, seek, free, escape, transaction control).
//! Two implementations ship with the crate: the sqlx-backed [`MySqlConnector`]
//! and the scripted [`MockConnector`] used by tests.

mod mock;
mod mysql;
mod stream;
mod types;

pub use mock::{MockConnection, MockConnector};
pub use mysql::{MySqlConnector, MySqlLink};
pub use types::{ColumnInfo, FetchMode, Record, ResultMode, Row, Value};

use std::fmt;
use std::path::PathBuf;

/// Native code for "MySQL server has gone away".
pub const CR_SERVER_GONE_ERROR: u32 = 2006;

/// Native code for "Can't connect to MySQL server".
pub const CR_CONN_HOST_ERROR: u32 = 2003;

/// Native code for errors the driver could not classify.
pub const CR_UNKNOWN_ERROR: u32 = 2000;

/// Native diagnostic reported by a driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    /// Native error number.
    pub code: u32,
    /// Native error message.
    pub message: String,
}

impl DriverError {
    /// Creates a driver error from a native code and message.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The error a driver reports when the server dropped the connection.
    pub fn server_gone() -> Self {
        Self::new(CR_SERVER_GONE_ERROR, "MySQL server has gone away")
    }

    /// Returns true if this is the stale-connection error.
    pub fn is_server_gone(&self) -> bool {
        self.code == CR_SERVER_GONE_ERROR
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.code, self.message)
    }
}

impl std::error::Error for DriverError {}

/// Result type for driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Where a connection is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// TCP host and port.
    Tcp { host: String, port: u16 },
    /// Local unix socket.
    Socket(PathBuf),
}

/// Everything a connector needs to open a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub target: ConnectTarget,
    pub user: String,
    pub password: Option<String>,
    pub database: Option<String>,
    pub charset: String,
    pub persistent: bool,
}

/// Opaque reference to a result set held by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultHandle(u64);

impl ResultHandle {
    /// Wraps a driver-assigned id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the driver-assigned id.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// What a driver returns for a successfully issued statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawResult {
    /// The statement produced a result set.
    Set(ResultHandle),
    /// The statement completed without a result set.
    Done,
}

impl RawResult {
    /// Returns the result-set handle, if any.
    pub fn handle(&self) -> Option<ResultHandle> {
        match self {
            Self::Set(handle) => Some(*handle),
            Self::Done => None,
        }
    }
}

/// Opens connection handles.
pub trait Connector {
    /// The handle type this connector produces.
    type Conn: Connection;

    /// Opens a new handle.
    fn connect(&self, params: &ConnectParams) -> DriverResult<Self::Conn>;
}

/// One open connection handle.
///
/// Calls block until the server answers. A handle is not safe to share;
/// callers serialize access.
pub trait Connection {
    /// Checks liveness. May reset session counters such as affected rows.
    fn ping(&mut self) -> bool;

    /// Sets the connection character set.
    fn set_charset(&mut self, charset: &str) -> DriverResult<()>;

    /// Switches the default database.
    fn select_db(&mut self, name: &str) -> DriverResult<()>;

    /// Issues a statement.
    fn query(&mut self, sql: &str, mode: ResultMode) -> DriverResult<RawResult>;

    /// Fetches the next row of a result set, or `None` when exhausted.
    fn fetch_row(&mut self, handle: ResultHandle) -> Option<Vec<Value>>;

    /// Positions a buffered result set at `row`. Fails past the end and in streaming mode.
    fn data_seek(&mut self, handle: ResultHandle, row: usize) -> bool;

    /// Row count of a buffered result set; `None` in streaming mode.
    fn num_rows(&self, handle: ResultHandle) -> Option<usize>;

    /// Column metadata of a result set.
    fn columns(&self, handle: ResultHandle) -> Vec<ColumnInfo>;

    /// Releases a result set.
    fn free_result(&mut self, handle: ResultHandle);

    /// Returns true while a multi-statement batch has unread results.
    fn more_results(&self) -> bool;

    /// Advances to the next result of a multi-statement batch.
    fn next_result(&mut self) -> bool;

    /// Rows affected by the last statement.
    fn affected_rows(&self) -> u64;

    /// Id generated by the last insert.
    fn insert_id(&self) -> u64;

    fn set_autocommit(&mut self, enabled: bool) -> DriverResult<()>;

    fn begin(&mut self) -> DriverResult<()>;

    fn commit(&mut self) -> DriverResult<()>;

    fn rollback(&mut self) -> DriverResult<()>;

    /// Escapes text for inclusion in a quoted SQL literal.
    fn escape(&self, text: &str) -> String;

    /// Closes the handle.
    fn close(&mut self);
}

/// Leading keywords of statements that answer with a result set even when it is empty.
const ROW_RETURNING_KEYWORDS: &[&str] = &[
    "select", "show", "describe", "desc", "explain", "with", "values", "table", "(",
];

/// Returns true if the statement is expected to produce a result set.
pub(crate) fn returns_rows(sql: &str) -> bool {
    let lowered = sql.trim_start().to_ascii_lowercase();
    ROW_RETURNING_KEYWORDS.iter().any(|keyword| {
        lowered.starts_with(keyword)
            && (*keyword == "("
                || lowered[keyword.len()..]
                    .chars()
                    .next()
                    .map_or(true, |c| !c.is_ascii_alphanumeric() && c != '_'))
    })
}
