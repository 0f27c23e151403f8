//! Inserts through the accelerated channel.

use tracing::{debug, info, warn};

use super::cache::IndexHandleCache;
use super::{AccelChannel, AccelConnector};
use crate::config::AccelConfig;
use crate::db::Value;
use crate::error::{Result, StewardError};

/// Writes rows through the accelerated channel's writable listener.
///
/// The channel is connected on the first insert. Index handles are resolved
/// through an [`IndexHandleCache`], so each `(table, columns)` pair is opened
/// once per connection.
pub struct AcceleratedWriter<K: AccelConnector> {
    connector: K,
    config: AccelConfig,
    channel: Option<K::Channel>,
    cache: IndexHandleCache,
}

impl<K: AccelConnector> AcceleratedWriter<K> {
    pub fn new(connector: K, config: AccelConfig) -> Self {
        Self {
            connector,
            config,
            channel: None,
            cache: IndexHandleCache::new(),
        }
    }

    /// Points the writer at another host and database.
    ///
    /// An open channel is dropped along with its index handles.
    pub fn select_storage(&mut self, host: &str, database: &str) {
        if self.channel.take().is_some() {
            debug!("Dropping accelerated channel after storage change");
        }
        self.cache.reset();
        self.config.host = host.to_string();
        self.config.database = database.to_string();
    }

    /// Connects the writable channel unless already connected.
    pub fn connect_writer(&mut self) -> Result<()> {
        if self.channel.is_none() {
            let channel = self
                .connector
                .connect_writer(&self.config.host, self.config.write_port)?;
            info!(
                host = %self.config.host,
                port = self.config.write_port,
                "Accelerated channel connected"
            );
            self.channel = Some(channel);
        }
        Ok(())
    }

    /// Inserts one row of `values` into `columns` of `table`.
    ///
    /// Write failures whose error token appears in `ignore_errors` are
    /// logged and treated as success. A failure that leaves the channel
    /// unusable drops it along with its index handles; the next insert
    /// reconnects.
    pub fn insert(
        &mut self,
        table: &str,
        columns: &str,
        values: &[Value],
        ignore_errors: &[&str],
    ) -> Result<()> {
        let result = self.write_row(table, columns, values, ignore_errors);
        if result.is_err() && self.channel.as_ref().is_some_and(|c| c.is_broken()) {
            warn!(host = %self.config.host, "Dropping broken accelerated channel");
            self.channel = None;
            self.cache.reset();
        }
        result
    }

    fn write_row(
        &mut self,
        table: &str,
        columns: &str,
        values: &[Value],
        ignore_errors: &[&str],
    ) -> Result<()> {
        self.connect_writer()?;
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| StewardError::internal("Accelerated channel missing after connect"))?;

        let id = self
            .cache
            .resolve(channel, &self.config.database, table, columns)?;

        match channel.insert(id, values) {
            Ok(()) => Ok(()),
            Err(e) if ignore_errors.contains(&e.code.as_str()) => {
                debug!(table, code = %e.code, "Ignored accelerated write error");
                Ok(())
            }
            Err(e) => {
                warn!(table, code = %e.code, "Accelerated write failed");
                Err(StewardError::index_write(format!(
                    "HandlerSocket {table} failed. Message: {e}"
                )))
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn config(&self) -> &AccelConfig {
        &self.config
    }
}
