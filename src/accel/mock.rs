//! Scripted accelerated channel for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{AccelChannel, AccelConnector, ChannelError};
use crate::db::Value;
use crate::error::{Result, StewardError};

/// Records opens and inserts; fails on demand.
#[derive(Debug, Default, Clone)]
pub struct MockChannel {
    /// `(id, database, table, columns)` of every successful open.
    pub opened: Vec<(u32, String, String, String)>,
    /// `(id, values)` of every successful insert.
    pub inserted: Vec<(u32, Vec<Value>)>,
    pub open_failure: Option<ChannelError>,
    pub insert_failure: Option<ChannelError>,
    /// Set by an I/O failure; cleared when the connector hands the channel out again.
    pub broken: bool,
}

impl MockChannel {
    fn fail(&mut self, err: &ChannelError) -> std::result::Result<(), ChannelError> {
        if err.is_io() {
            self.broken = true;
        }
        Err(err.clone())
    }
}

impl AccelChannel for MockChannel {
    fn open_index(
        &mut self,
        id: u32,
        database: &str,
        table: &str,
        _index: &str,
        columns: &str,
    ) -> std::result::Result<(), ChannelError> {
        if let Some(err) = self.open_failure.clone() {
            return self.fail(&err);
        }
        self.opened
            .push((id, database.to_string(), table.to_string(), columns.to_string()));
        Ok(())
    }

    fn insert(&mut self, id: u32, values: &[Value]) -> std::result::Result<(), ChannelError> {
        if let Some(err) = self.insert_failure.clone() {
            return self.fail(&err);
        }
        self.inserted.push((id, values.to_vec()));
        Ok(())
    }

    fn is_broken(&self) -> bool {
        self.broken
    }
}

/// Hands out [`MockChannel`]s sharing one recorder.
#[derive(Debug, Default, Clone)]
pub struct MockAccelConnector {
    channel: Arc<Mutex<MockChannel>>,
    refuse: Arc<Mutex<bool>>,
    connects: Arc<AtomicUsize>,
}

impl MockAccelConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes later connects fail.
    pub fn set_refusing(&self, refuse: bool) {
        *self.refuse.lock().unwrap_or_else(|e| e.into_inner()) = refuse;
    }

    /// Number of connect attempts so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Shared channel state for scripting and assertions.
    pub fn channel(&self) -> MutexGuard<'_, MockChannel> {
        self.channel.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A channel backed by the connector's shared recorder.
#[derive(Debug, Clone)]
pub struct SharedMockChannel(Arc<Mutex<MockChannel>>);

impl SharedMockChannel {
    fn inner(&self) -> MutexGuard<'_, MockChannel> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AccelChannel for SharedMockChannel {
    fn open_index(
        &mut self,
        id: u32,
        database: &str,
        table: &str,
        index: &str,
        columns: &str,
    ) -> std::result::Result<(), ChannelError> {
        self.inner().open_index(id, database, table, index, columns)
    }

    fn insert(&mut self, id: u32, values: &[Value]) -> std::result::Result<(), ChannelError> {
        self.inner().insert(id, values)
    }

    fn is_broken(&self) -> bool {
        self.inner().broken
    }
}

impl AccelConnector for MockAccelConnector {
    type Channel = SharedMockChannel;

    fn connect_writer(&self, host: &str, port: u16) -> Result<SharedMockChannel> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if *self.refuse.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(StewardError::connection(format!(
                "Connect error: connection refused ({host}:{port})"
            )));
        }
        self.channel().broken = false;
        Ok(SharedMockChannel(Arc::clone(&self.channel)))
    }
}
