//! Result materialization.
//!
//! Turns a driver result handle into shaped rows. Rows are computed once per
//! result; later calls return the cached set.

use crate::db::{Connection, FetchMode, ResultHandle, ResultMode, Row};
use std::sync::Arc;

/// A result set that has not been released yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResult {
    handle: ResultHandle,
    mode: ResultMode,
    rows: Option<Vec<Row>>,
}

impl PendingResult {
    /// Wraps a freshly returned handle.
    pub fn new(handle: ResultHandle, mode: ResultMode) -> Self {
        Self {
            handle,
            mode,
            rows: None,
        }
    }

    /// The driver handle.
    pub fn handle(&self) -> ResultHandle {
        self.handle
    }

    /// The buffering mode the statement ran with.
    pub fn mode(&self) -> ResultMode {
        self.mode
    }
}

/// Converts result handles into row sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultMaterializer {
    fetch_mode: FetchMode,
}

impl ResultMaterializer {
    /// Creates a materializer producing rows in the given shape.
    pub fn new(fetch_mode: FetchMode) -> Self {
        Self { fetch_mode }
    }

    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    pub fn set_fetch_mode(&mut self, fetch_mode: FetchMode) {
        self.fetch_mode = fetch_mode;
    }

    /// Materializes every row of `result`, or returns the rows cached by an earlier call.
    ///
    /// Streaming results are read with fetch-next until exhausted. Buffered
    /// results are read by explicit position until a seek fails.
    pub fn rows_to_array<'r, C: Connection>(
        &self,
        conn: &mut C,
        result: &'r mut PendingResult,
    ) -> &'r [Row] {
        let (handle, mode) = (result.handle, result.mode);
        result
            .rows
            .get_or_insert_with(|| self.fetch_all(conn, handle, mode))
    }

    fn fetch_all<C: Connection>(
        &self,
        conn: &mut C,
        handle: ResultHandle,
        mode: ResultMode,
    ) -> Vec<Row> {
        let columns: Arc<[String]> = conn
            .columns(handle)
            .into_iter()
            .map(|column| column.name)
            .collect();
        let mut rows = Vec::new();

        match mode {
            ResultMode::Use => {
                while let Some(values) = conn.fetch_row(handle) {
                    rows.push(Row::shape(self.fetch_mode, &columns, values));
                }
            }
            ResultMode::Store => {
                while conn.data_seek(handle, rows.len()) {
                    match conn.fetch_row(handle) {
                        Some(values) => rows.push(Row::shape(self.fetch_mode, &columns, values)),
                        None => break,
                    }
                }
            }
        }

        rows
    }

    /// Rows affected by the last statement; `None` without a live connection.
    pub fn affected_rows<C: Connection>(conn: Option<&C>) -> Option<u64> {
        conn.map(|c| c.affected_rows())
    }

    /// Id generated by the last insert; `None` without a live connection.
    pub fn insert_id<C: Connection>(conn: Option<&C>) -> Option<u64> {
        conn.map(|c| c.insert_id())
    }
}
