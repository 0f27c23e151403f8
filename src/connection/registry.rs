//! Registry of executors keyed by connection signature.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::info;

use crate::config::{ConnectionConfig, ConnectionSignature};
use crate::db::Connector;
use crate::error::Result;
use crate::query::QueryExecutor;

/// Hands out one executor per distinct connection signature.
///
/// Owned by the caller; two configs with the same host, port, database,
/// socket and persistent flag share an executor.
pub struct ConnectionRegistry<C: Connector + Clone> {
    connector: C,
    executors: HashMap<ConnectionSignature, QueryExecutor<C>>,
}

impl<C: Connector + Clone> ConnectionRegistry<C> {
    /// Creates an empty registry opening handles through `connector`.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            executors: HashMap::new(),
        }
    }

    /// Returns the executor for `config`, creating it on first request.
    pub fn get_or_create(&mut self, config: &ConnectionConfig) -> Result<&mut QueryExecutor<C>> {
        match self.executors.entry(config.signature()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let executor = QueryExecutor::new(self.connector.clone(), config.clone())?;
                info!(signature = %entry.key(), "Registered connection");
                Ok(entry.insert(executor))
            }
        }
    }

    /// Closes and forgets the executor for `config`. Returns false if none was registered.
    pub fn close(&mut self, config: &ConnectionConfig) -> bool {
        match self.executors.remove(&config.signature()) {
            Some(mut executor) => {
                executor.close();
                true
            }
            None => false,
        }
    }

    /// Closes every registered executor.
    pub fn close_all(&mut self) {
        for (_, mut executor) in self.executors.drain() {
            executor.close();
        }
    }

    pub fn contains(&self, config: &ConnectionConfig) -> bool {
        self.executors.contains_key(&config.signature())
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}
