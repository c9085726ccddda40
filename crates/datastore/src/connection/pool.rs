//! Connection Pool Management
//!
//! This module provides a managed wrapper around a backend pool that keeps
//! acquire/release accounting, so callers can verify that every connection
//! handed out by an operation came back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backends::{DatabaseConnection, DatabasePool, DatabasePoolConfig, DatabasePoolStats};
use crate::error::{DatastoreError, DatastoreResult, DriverError};

/// Extended pool statistics with lease accounting
#[derive(Debug, Clone)]
pub struct ExtendedPoolStats {
    pub pool_stats: DatabasePoolStats,
    pub acquire_count: u64,
    pub acquire_errors: u64,
    pub release_count: u64,
    pub release_errors: u64,
    pub created_at: Instant,
}

impl ExtendedPoolStats {
    /// Connections acquired through this pool and not yet released
    pub fn outstanding(&self) -> u64 {
        let acquired = self.acquire_count.saturating_sub(self.acquire_errors);
        acquired.saturating_sub(self.release_count)
    }

    /// Calculate the acquire error rate as a percentage
    pub fn error_rate(&self) -> f64 {
        if self.acquire_count > 0 {
            (self.acquire_errors as f64 / self.acquire_count as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Get the pool uptime
    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Managed connection pool wrapper with statistics tracking
pub struct ManagedPool {
    pool: Arc<dyn DatabasePool>,
    config: DatabasePoolConfig,
    acquire_count: AtomicU64,
    acquire_errors: AtomicU64,
    release_count: AtomicU64,
    release_errors: AtomicU64,
    created_at: Instant,
}

impl ManagedPool {
    pub fn new(pool: Arc<dyn DatabasePool>, config: DatabasePoolConfig) -> Self {
        Self {
            pool,
            config,
            acquire_count: AtomicU64::new(0),
            acquire_errors: AtomicU64::new(0),
            release_count: AtomicU64::new(0),
            release_errors: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &dyn DatabasePool {
        &*self.pool
    }

    /// Acquire a connection from the pool with statistics tracking
    ///
    /// Every driver failure (exhaustion, authentication, network) surfaces as
    /// [`DatastoreError::BadConnection`] carrying the underlying cause.
    pub async fn acquire(&self) -> DatastoreResult<Box<dyn DatabaseConnection>> {
        self.acquire_count.fetch_add(1, Ordering::Relaxed);

        match self.pool.acquire().await {
            Ok(conn) => {
                let stats = self.pool.stats();
                tracing::debug!(
                    "Database connection acquired successfully (total: {}, idle: {})",
                    stats.total_connections,
                    stats.idle_connections
                );
                Ok(conn)
            }
            Err(e) => {
                self.acquire_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Failed to acquire database connection: {}", e);
                Err(DatastoreError::bad_connection(
                    "Could not acquire a connection from the pool",
                    Some(e),
                ))
            }
        }
    }

    /// Return a connection to the pool
    ///
    /// Never fails: a release error is logged and counted so it cannot mask the
    /// error of the operation that owned the connection.
    pub async fn release(&self, connection: Box<dyn DatabaseConnection>) {
        self.release_count.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self.pool.release(connection).await {
            self.release_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Failed to release database connection: {}", e);
        } else {
            tracing::debug!("Database connection released");
        }
    }

    /// Get pool statistics with lease accounting
    pub fn extended_stats(&self) -> ExtendedPoolStats {
        ExtendedPoolStats {
            pool_stats: self.pool.stats(),
            acquire_count: self.acquire_count.load(Ordering::Relaxed),
            acquire_errors: self.acquire_errors.load(Ordering::Relaxed),
            release_count: self.release_count.load(Ordering::Relaxed),
            release_errors: self.release_errors.load(Ordering::Relaxed),
            created_at: self.created_at,
        }
    }

    /// Get current backend pool statistics
    pub fn stats(&self) -> DatabasePoolStats {
        self.pool.stats()
    }

    /// Check pool health
    pub async fn health_check(&self) -> DatastoreResult<Duration> {
        match self.pool.health_check().await {
            Ok(duration) => {
                tracing::debug!("Database health check passed in {:?}", duration);
                Ok(duration)
            }
            Err(e) => {
                tracing::error!("Database health check failed: {}", e);
                Err(DatastoreError::bad_connection("Health check failed", Some(e)))
            }
        }
    }

    /// Get connection pool configuration
    pub fn config(&self) -> &DatabasePoolConfig {
        &self.config
    }

    /// Close the connection pool
    pub async fn close(&self) -> Result<(), DriverError> {
        self.pool.close().await
    }
}
