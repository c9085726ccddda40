//! Connection leasing
//!
//! A [`ConnectionLease`] is the handle an operation works with. It either owns a
//! connection spawned from the datastore's pool, or borrows one that a caller
//! leased into the operation. Only pool-owned connections are ever released by
//! this layer, and a lease releases at most once.

use std::sync::Arc;

use super::pool::ManagedPool;
use crate::backends::{DatabaseConnection, DatabaseConnectionConfig};
use crate::error::{DatastoreError, DatastoreResult};

enum LeaseState<'a> {
    Pooled {
        connection: Box<dyn DatabaseConnection>,
        pool: Arc<ManagedPool>,
    },
    Leased(&'a mut dyn DatabaseConnection),
    Released,
}

/// A connection in use by exactly one operation
pub struct ConnectionLease<'a> {
    state: LeaseState<'a>,
}

impl<'a> ConnectionLease<'a> {
    /// Spawn a connection from the pool
    pub async fn acquire(pool: &Arc<ManagedPool>) -> DatastoreResult<ConnectionLease<'a>> {
        let connection = pool.acquire().await?;
        Ok(Self {
            state: LeaseState::Pooled {
                connection,
                pool: Arc::clone(pool),
            },
        })
    }

    /// Wrap a connection owned by the caller
    pub fn leased(connection: &'a mut dyn DatabaseConnection) -> Self {
        Self {
            state: LeaseState::Leased(connection),
        }
    }

    /// Use the caller's connection when one was handed in, otherwise spawn one
    pub async fn spawn_or_lease(
        pool: &Arc<ManagedPool>,
        leased: Option<&'a mut dyn DatabaseConnection>,
    ) -> DatastoreResult<ConnectionLease<'a>> {
        match leased {
            Some(connection) => Ok(Self::leased(connection)),
            None => Self::acquire(pool).await,
        }
    }

    /// Whether the connection belongs to an external caller
    pub fn is_leased(&self) -> bool {
        matches!(self.state, LeaseState::Leased(_))
    }

    pub fn is_released(&self) -> bool {
        matches!(self.state, LeaseState::Released)
    }

    /// Borrow the live connection
    pub fn connection(&mut self) -> DatastoreResult<&mut dyn DatabaseConnection> {
        match &mut self.state {
            LeaseState::Pooled { connection, .. } => Ok(connection.as_mut()),
            LeaseState::Leased(connection) => Ok(&mut **connection),
            LeaseState::Released => Err(DatastoreError::bad_connection(
                "Connection was already released",
                None,
            )),
        }
    }

    /// Give the connection back
    ///
    /// Pool-owned connections go back to the pool; leased connections stay with
    /// their owner. Calling this more than once is a no-op, and it never fails.
    pub async fn release(&mut self) {
        match std::mem::replace(&mut self.state, LeaseState::Released) {
            LeaseState::Pooled { connection, pool } => pool.release(connection).await,
            LeaseState::Leased(_) => {
                tracing::debug!("Leaving leased connection with its owner");
            }
            LeaseState::Released => {}
        }
    }
}

impl Drop for ConnectionLease<'_> {
    fn drop(&mut self) {
        if let LeaseState::Pooled { .. } = self.state {
            // We can't await in Drop; the backend connection is dropped with the lease.
            tracing::warn!("Connection lease dropped without an explicit release");
        }
    }
}

/// Human-readable hints for a failed acquisition
///
/// Purely diagnostic: the result is only ever logged.
pub fn connection_hints(
    error: &DatastoreError,
    config: Option<&DatabaseConnectionConfig>,
) -> Vec<String> {
    let mut message = error.to_string();
    if let Some(source) = std::error::Error::source(error) {
        message.push_str(": ");
        message.push_str(&source.to_string());
    }
    let message = message.to_lowercase();
    let mut hints = Vec::new();

    if let Some(config) = config {
        if config.is_local() {
            hints.push(format!(
                "The datastore points at this machine ({}:{}); \
                 make sure the database server is running locally",
                config.host, config.port
            ));
        }
    }

    if message.contains("too many connections") || message.contains("remaining connection slots") {
        hints.push(
            "The server refused more connections; \
             lower the pool's max_connections or raise the server limit"
                .to_string(),
        );
    }

    if message.contains("password authentication failed") || message.contains("authentication") {
        hints.push("Check the username and password in the datastore URL".to_string());
    }

    if message.contains("timed out") {
        hints.push(
            "Acquiring a connection timed out; \
             the pool may be exhausted by long-running operations"
                .to_string(),
        );
    }

    hints
}

pub(crate) fn log_connection_hints(
    error: &DatastoreError,
    config: Option<&DatabaseConnectionConfig>,
) {
    for hint in connection_hints(error, config) {
        tracing::warn!("{}", hint);
    }
}
