//! # elif-datastore: Relational Datastore Access Layer
//!
//! Turns logical operations (`create`, `find`, `update`, `destroy` and the
//! aggregates) into native SQL, runs them over leased connections and folds
//! joined result sets back into nested records.
//!
//! Callers own a [`DatastoreRegistry`], register pools and models under an
//! identity, and drive everything through an [`Adapter`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use elif_datastore::{
//!     Adapter, Criteria, DatastoreConfig, DatastoreRegistry, Meta, ModelDefinition,
//!     PostgresBackend,
//! };
//!
//! # async fn run() -> elif_datastore::DatastoreResult<()> {
//! let registry = Arc::new(DatastoreRegistry::new());
//! registry
//!     .register(
//!         "main",
//!         DatastoreConfig::from_url("postgresql://localhost/app"),
//!         &[ModelDefinition::new("user", "users")],
//!         &PostgresBackend::new(),
//!     )
//!     .await?;
//!
//! let adapter = Adapter::new(Arc::clone(&registry));
//! let users = adapter.find("main", "users", &Criteria::new(), &[], Meta::new()).await?;
//! # let _ = users;
//! registry.teardown_all().await
//! # }
//! ```

pub mod adapter;
pub mod backends;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod join;
pub mod model;
pub mod query;
pub mod registry;
pub mod transaction;

#[cfg(test)]
mod tests;

pub use adapter::{Adapter, DestroyOutcome, Meta};
pub use backends::{
    DatabaseBackend, DatabaseConnection, DatabasePool, DatabasePoolConfig, DatabaseValue,
    PostgresBackend, Record, SqlDialect,
};
pub use config::DatastoreConfig;
pub use connection::{ConnectionLease, ManagedPool};
pub use error::*;
pub use executor::{QueryExecutor, QueryResult, QueryType};
pub use join::{
    Association, Cardinality, DefaultJoinPlanner, JoinPlanner, PlannerConfig, QueryCache,
};
pub use model::{AttributeDefinition, AttributeType, ModelDefinition, ModelLookup};
pub use query::*;
pub use registry::{Datastore, DatastoreRegistry};
pub use transaction::{IsolationLevel, Transaction, TransactionConfig, TransactionState};
