//! Accelerated-write channel.
//!
//! Inserts can bypass SQL through a key-value channel that writes straight
//! into a table index (HandlerSocket). Index handles are opened once per
//! `(table, columns)` pair and cached.

mod cache;
mod error;
mod handlersocket;
mod mock;
mod writer;

pub use cache::{normalize_columns, IndexHandleCache};
pub use error::describe_error;
pub use handlersocket::{HandlerSocketChannel, HandlerSocketConnector};
pub use mock::{MockAccelConnector, MockChannel, SharedMockChannel};
pub use writer::AcceleratedWriter;

use std::fmt;

use crate::db::Value;
use crate::error::Result;

/// Where a channel failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelErrorKind {
    /// The server answered with an error token.
    Server,
    /// The request or its response was lost; the connection is out of step.
    Io,
}

/// Failure of a channel request.
///
/// `code` is the server's error token (`open_table`, `121`, ...) or, for
/// I/O failures, a description of what went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelError {
    pub kind: ChannelErrorKind,
    pub code: String,
}

impl ChannelError {
    /// An error token returned by the server.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            kind: ChannelErrorKind::Server,
            code: code.into(),
        }
    }

    /// A transport failure.
    pub fn io(message: impl Into<String>) -> Self {
        Self {
            kind: ChannelErrorKind::Io,
            code: message.into(),
        }
    }

    pub fn is_io(&self) -> bool {
        self.kind == ChannelErrorKind::Io
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ChannelErrorKind::Server => write!(f, "{}", describe_error(&self.code)),
            ChannelErrorKind::Io => write!(f, "Channel I/O error: {}", self.code),
        }
    }
}

impl std::error::Error for ChannelError {}

/// An open connection to the accelerated channel.
pub trait AccelChannel {
    /// Opens `columns` of `table` under index id `id`. An empty `index` means the primary key.
    fn open_index(
        &mut self,
        id: u32,
        database: &str,
        table: &str,
        index: &str,
        columns: &str,
    ) -> std::result::Result<(), ChannelError>;

    /// Inserts one row through a previously opened index.
    fn insert(&mut self, id: u32, values: &[Value]) -> std::result::Result<(), ChannelError>;

    /// True once an I/O failure has left the connection unusable.
    fn is_broken(&self) -> bool;
}

/// Opens channel connections.
pub trait AccelConnector {
    type Channel: AccelChannel;

    /// Connects to the writable listener.
    fn connect_writer(&self, host: &str, port: u16) -> Result<Self::Channel>;
}
