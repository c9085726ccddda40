//! Transaction Management
//!
//! Begin, commit and roll back a transaction on a leased connection. Every
//! failure path cleans up (rollback, then release) before the triggering error
//! is surfaced, and cleanup errors are only ever logged.

use tracing::{debug, warn};

use crate::backends::DatabaseConnection;
use crate::connection::ConnectionLease;
use crate::error::{DatastoreError, DatastoreResult, TransactionStage};

/// Transaction isolation levels supported by PostgreSQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Read Uncommitted - lowest isolation level
    ReadUncommitted,
    /// Read Committed - default PostgreSQL isolation level
    ReadCommitted,
    /// Repeatable Read - stronger consistency guarantees
    RepeatableRead,
    /// Serializable - highest isolation level
    Serializable,
}

impl IsolationLevel {
    /// SQL fragment used after `ISOLATION LEVEL`
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Transaction configuration options
///
/// Boundary operations are never retried, so there is no retry policy here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionConfig {
    /// Transaction isolation level, backend default when unset
    pub isolation_level: Option<IsolationLevel>,
    /// Whether the transaction is read-only
    pub read_only: bool,
}

impl TransactionConfig {
    /// The statement that opens a transaction with this configuration
    pub fn begin_sql(&self) -> String {
        let mut sql = String::from("BEGIN");
        if let Some(level) = self.isolation_level {
            sql.push_str(" ISOLATION LEVEL ");
            sql.push_str(level.as_sql());
        }
        if self.read_only {
            sql.push_str(" READ ONLY");
        }
        sql
    }
}

/// Lifecycle of a [`Transaction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Open,
    Committed,
    RolledBack,
    Released,
}

/// An open transaction that owns the lease it runs on
pub struct Transaction<'a> {
    lease: ConnectionLease<'a>,
    state: TransactionState,
    config: TransactionConfig,
}

impl<'a> Transaction<'a> {
    /// Open a transaction on `lease`
    ///
    /// On failure the lease is released (a no-op for leased connections) and
    /// the begin error is returned.
    pub async fn begin(
        mut lease: ConnectionLease<'a>,
        config: TransactionConfig,
    ) -> DatastoreResult<Transaction<'a>> {
        let sql = config.begin_sql();
        debug!("Beginning transaction: {}", sql);

        let result = match lease.connection() {
            Ok(conn) => conn
                .execute(&sql, &[])
                .await
                .map(|_| ())
                .map_err(|source| DatastoreError::Transaction {
                    stage: TransactionStage::Begin,
                    source,
                }),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!("Failed to begin transaction: {}", e);
            lease.release().await;
            return Err(e);
        }

        Ok(Transaction {
            lease,
            state: TransactionState::Open,
            config,
        })
    }

    /// The connection statements inside the transaction run on
    pub fn connection(&mut self) -> DatastoreResult<&mut dyn DatabaseConnection> {
        self.lease.connection()
    }

    /// The lease backing this transaction, for the query executor
    pub fn lease_mut(&mut self) -> &mut ConnectionLease<'a> {
        &mut self.lease
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Commit, then release the connection
    ///
    /// When the commit fails a rollback is attempted, the connection is
    /// released, and the commit error is returned.
    pub async fn commit_and_release(mut self) -> DatastoreResult<()> {
        debug!("Committing transaction");

        let result = match self.lease.connection() {
            Ok(conn) => conn
                .execute("COMMIT", &[])
                .await
                .map(|_| ())
                .map_err(|source| DatastoreError::Transaction {
                    stage: TransactionStage::Commit,
                    source,
                }),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.state = TransactionState::Committed;
                debug!("Transaction committed successfully");
                self.finish().await;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to commit transaction: {}", e);
                self.rollback_quietly().await;
                self.finish().await;
                Err(e)
            }
        }
    }

    /// Roll back after `cause`, release the connection, and hand `cause` back
    pub async fn rollback_and_release(mut self, cause: DatastoreError) -> DatastoreError {
        debug!("Rolling back transaction after error: {}", cause);
        self.rollback_quietly().await;
        self.finish().await;
        cause
    }

    async fn rollback_quietly(&mut self) {
        match self.lease.connection() {
            Ok(conn) => match conn.execute("ROLLBACK", &[]).await {
                Ok(_) => debug!("Transaction rolled back successfully"),
                Err(e) => warn!("Failed to roll back transaction: {}", e),
            },
            Err(e) => warn!("Cannot roll back transaction: {}", e),
        }
        self.state = TransactionState::RolledBack;
    }

    async fn finish(&mut self) {
        self.lease.release().await;
        self.state = TransactionState::Released;
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == TransactionState::Open {
            warn!(
                "Transaction dropped while still open; \
                 the backend will roll it back when the session ends"
            );
        }
    }
}
