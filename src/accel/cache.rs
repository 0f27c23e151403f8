//! Memoized index handles of the accelerated channel.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::AccelChannel;
use crate::error::{Result, StewardError};

/// Strips all whitespace from a column list; the channel protocol forbids it.
pub fn normalize_columns(columns: &str) -> String {
    columns.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Maps `(table, columns)` to the index id opened for it.
///
/// Ids are handed out sequentially from 1 and never reused, even after a
/// failed open or a [`reset`](Self::reset).
#[derive(Debug, Default)]
pub struct IndexHandleCache {
    handles: HashMap<(String, String), u32>,
    last_id: u32,
}

impl IndexHandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index id for `table` and `columns`, opening the index on first use.
    pub fn resolve<Ch: AccelChannel + ?Sized>(
        &mut self,
        channel: &mut Ch,
        database: &str,
        table: &str,
        columns: &str,
    ) -> Result<u32> {
        let key = (table.to_string(), normalize_columns(columns));
        if let Some(id) = self.handles.get(&key) {
            return Ok(*id);
        }

        self.last_id += 1;
        let id = self.last_id;

        if let Err(e) = channel.open_index(id, database, table, "", &key.1) {
            warn!(table, id, code = %e.code, "Index open failed");
            return Err(StewardError::index_open(format!(
                "HandlerSocket {table} failed to connect. Message: {e}"
            )));
        }

        debug!(table, columns = %key.1, id, "Index opened");
        self.handles.insert(key, id);
        Ok(id)
    }

    /// Forgets every cached handle. The id counter keeps counting.
    pub fn reset(&mut self) {
        self.handles.clear();
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
