//! Supervised lifecycle of one logical database connection.

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::db::{Connection, Connector, DriverError, ResultMode, Value};
use crate::error::{Result, StewardError};

/// Owns at most one live handle and keeps it usable.
///
/// The handle is opened lazily, checked with a ping before reuse, and
/// reopened with a bounded number of attempts when the ping fails. Calls
/// block; the supervisor is not meant to be shared between threads.
pub struct ConnectionSupervisor<C: Connector> {
    connector: C,
    config: ConnectionConfig,
    conn: Option<C::Conn>,
    database: Option<String>,
    in_transaction: bool,
}

impl<C: Connector> ConnectionSupervisor<C> {
    /// Creates a supervisor. No connection is opened until first use.
    pub fn new(connector: C, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            connector,
            database: config.database.clone(),
            config,
            conn: None,
            in_transaction: false,
        })
    }

    /// Opens the handle unless one already exists.
    pub fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        debug!(dsn = %self.config.display_string(), "Opening database connection");
        let mut params = self.config.connect_params();
        params.database = self.database.clone();

        let mut conn = self
            .connector
            .connect(&params)
            .map_err(|e| StewardError::connection(format!("Connection error. {}", e.message)))?;

        if let Err(e) = conn.set_charset(&self.config.charset) {
            conn.close();
            return Err(StewardError::connection(format!(
                "Connection error. Failed to set charset '{}': {}",
                self.config.charset, e.message
            )));
        }

        info!(dsn = %self.config.display_string(), "Connected");
        self.conn = Some(conn);
        Ok(())
    }

    /// Makes sure a live handle exists, reconnecting if needed.
    ///
    /// A handle that fails its ping is discarded. Reconnecting makes up to
    /// `reconnect_retries` attempts with the configured delay between them;
    /// the error of the last attempt is returned when all of them fail.
    pub fn ensure_live(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.as_mut() {
            if conn.ping() {
                return Ok(());
            }
            warn!(dsn = %self.config.display_string(), "Liveness ping failed");
            self.discard();
        }

        let attempts = self.config.reconnect_retries.max(1);
        let delay = self.config.retry_delay();
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                thread::sleep(delay);
            }
            match self.connect() {
                Ok(()) => {
                    if attempt > 1 {
                        info!(attempt, "Reconnected");
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| StewardError::connection("Connection error. No attempts made")))
    }

    /// Turns autocommit off and opens a transaction.
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.ensure_live()?;
        let database = self.database_name().to_string();
        let conn = self.live_connection()?;

        conn.set_autocommit(false)
            .map_err(|e| lift(e, &database, "SET autocommit=0"))?;
        conn.begin()
            .map_err(|e| lift(e, &database, "START TRANSACTION"))?;

        self.in_transaction = true;
        debug!("Transaction started");
        Ok(())
    }

    /// Commits the open transaction.
    ///
    /// The transaction flag is cleared and autocommit restored even when the
    /// commit itself fails; that failure is still returned.
    pub fn commit(&mut self) -> Result<()> {
        self.finish_transaction(true)
    }

    /// Rolls back the open transaction. Same flag handling as [`commit`](Self::commit).
    pub fn rollback(&mut self) -> Result<()> {
        self.finish_transaction(false)
    }

    fn finish_transaction(&mut self, commit: bool) -> Result<()> {
        let verb = if commit { "COMMIT" } else { "ROLLBACK" };
        let was_active = std::mem::replace(&mut self.in_transaction, false);
        if !was_active {
            debug!("{verb} without an active transaction");
        }

        let database = self.database_name().to_string();
        let conn = self.live_connection()?;

        let outcome = if commit { conn.commit() } else { conn.rollback() };
        let restored = conn.set_autocommit(true);

        if let Err(e) = &outcome {
            warn!(error = %e, "{verb} failed; transaction flag cleared anyway");
        }
        outcome.map_err(|e| lift(e, &database, verb))?;
        restored.map_err(|e| lift(e, &database, "SET autocommit=1"))?;

        debug!("Transaction finished with {verb}");
        Ok(())
    }

    /// Switches the default database, falling back to the configured one.
    pub fn select_database(&mut self, name: Option<&str>) -> Result<()> {
        let name = match name.or(self.config.database.as_deref()) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(StewardError::invalid_argument("No database name given")),
        };

        self.ensure_live()?;
        let conn = self.live_connection()?;
        conn.select_db(&name)
            .map_err(|e| lift(e, &name, &format!("USE `{name}`")))?;

        info!(database = %name, "Database selected");
        self.database = Some(name);
        Ok(())
    }

    /// Asks the server which database is currently selected.
    pub fn current_database(&mut self) -> Result<Option<String>> {
        const SQL: &str = "SELECT DATABASE()";

        self.ensure_live()?;
        let database = self.database_name().to_string();
        let conn = self.live_connection()?;

        let raw = conn
            .query(SQL, ResultMode::Store)
            .map_err(|e| lift(e, &database, SQL))?;
        let Some(handle) = raw.handle() else {
            return Ok(None);
        };

        let row = conn.fetch_row(handle);
        conn.free_result(handle);

        Ok(match row.and_then(|values| values.into_iter().next()) {
            Some(Value::String(name)) => Some(name),
            Some(Value::Bytes(bytes)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            _ => None,
        })
    }

    /// Releases the handle. Does nothing when already closed.
    pub fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if self.in_transaction {
                warn!("Closing connection with an open transaction");
            }
            conn.close();
            self.in_transaction = false;
            debug!(dsn = %self.config.display_string(), "Connection closed");
        }
    }

    fn discard(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
        if self.in_transaction {
            warn!("Connection lost inside a transaction");
            self.in_transaction = false;
        }
    }

    fn live_connection(&mut self) -> Result<&mut C::Conn> {
        self.conn
            .as_mut()
            .ok_or_else(|| StewardError::connection("Connection error. No open connection"))
    }

    /// The open handle, if any.
    pub fn connection(&self) -> Option<&C::Conn> {
        self.conn.as_ref()
    }

    /// The open handle, if any.
    pub fn connection_mut(&mut self) -> Option<&mut C::Conn> {
        self.conn.as_mut()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Name of the selected database, or an empty string.
    pub fn database_name(&self) -> &str {
        self.database.as_deref().unwrap_or("")
    }

    pub fn set_reconnect_retries(&mut self, retries: u32) {
        self.config.reconnect_retries = retries;
    }

    pub fn set_retry_delay(&mut self, delay: Duration) {
        self.config.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl<C: Connector> Drop for ConnectionSupervisor<C> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Lifts a driver diagnostic into a query error.
pub(crate) fn lift(err: DriverError, database: &str, sql: &str) -> StewardError {
    StewardError::query(err.code, err.message, database, sql)
}
