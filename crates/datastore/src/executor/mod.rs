//! Query execution
//!
//! The [`QueryExecutor`] sends a native query over a lease, turns driver
//! failures into a [`QueryFailure`] and reshapes raw rows for the declared
//! [`QueryType`].

pub mod classifier;

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::backends::Record;
use crate::connection::ConnectionLease;
use crate::error::{DatastoreError, DriverError, FootprintIdentity, QueryFailure};
use crate::query::NativeQuery;

pub use classifier::{ClassifierError, ErrorClassifier, PostgresErrorClassifier};

/// Query types the executor can reshape results for
#[derive(Debug, Clone, PartialEq)]
pub enum QueryType {
    Select,
    /// Rows returned by the insert carry the generated `primary_key`
    Insert { primary_key: String },
    Update,
    Delete,
}

/// Normalized result of one query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Record>,
    pub row_count: u64,
    pub inserted_ids: Option<Vec<JsonValue>>,
}

/// Why a query did not produce a result
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionError {
    Query(QueryFailure),
    /// The rows did not fit the declared query type
    Reshape(String),
    /// The lease had already been released
    Released,
}

impl ExecutionError {
    pub fn into_datastore_error(self, table: &str) -> DatastoreError {
        match self {
            ExecutionError::Query(failure) => failure.into_datastore_error(table),
            ExecutionError::Reshape(message) => DatastoreError::Reshape(message),
            ExecutionError::Released => DatastoreError::bad_connection(
                format!("Connection for '{}' was already released", table),
                None,
            ),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ExecutionError::Query(failure) if failure.is_transport())
    }
}

/// Runs native queries and classifies their failures
#[derive(Clone)]
pub struct QueryExecutor {
    classifier: Arc<dyn ErrorClassifier>,
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new(Arc::new(PostgresErrorClassifier))
    }
}

impl QueryExecutor {
    pub fn new(classifier: Arc<dyn ErrorClassifier>) -> Self {
        Self { classifier }
    }

    /// Run `query` on `lease`
    ///
    /// A transport failure releases the lease first when `disconnect_on_error`
    /// is set; a rejected query leaves the lease alone. The lease is never
    /// released on success.
    pub async fn run(
        &self,
        lease: &mut ConnectionLease<'_>,
        query: &NativeQuery,
        query_type: Option<&QueryType>,
        disconnect_on_error: bool,
    ) -> Result<QueryResult, ExecutionError> {
        let fetch = query.returning || matches!(query_type, Some(QueryType::Select));
        tracing::debug!("Executing query: {} ({} bindings)", query.sql, query.bindings.len());

        let outcome = {
            let conn = lease.connection().map_err(|_| ExecutionError::Released)?;
            if fetch {
                conn.fetch_all(&query.sql, &query.bindings).await.map(|rows| {
                    let count = rows.len() as u64;
                    (rows, count)
                })
            } else {
                conn.execute(&query.sql, &query.bindings).await.map(|count| (Vec::new(), count))
            }
        };

        match outcome {
            Ok((rows, row_count)) => reshape(rows, row_count, query_type),
            Err(err) if err.is_transport() => {
                tracing::error!("Connection failed while executing query: {}", err);
                if disconnect_on_error {
                    lease.release().await;
                }
                Err(ExecutionError::Query(QueryFailure::Transport(err)))
            }
            Err(err) => Err(ExecutionError::Query(self.classify(err))),
        }
    }

    fn classify(&self, err: DriverError) -> QueryFailure {
        match self.classifier.classify(&err) {
            Ok(footprint) if footprint.identity == FootprintIdentity::Catchall => {
                tracing::debug!("Query rejected: {}", err);
                QueryFailure::Raw(err)
            }
            Ok(footprint) => {
                tracing::debug!("Query rejected ({}): {}", footprint.identity, err);
                QueryFailure::Footprint(footprint)
            }
            Err(classifier_err) => {
                tracing::warn!("{}; surfacing the raw error", classifier_err);
                QueryFailure::Raw(err)
            }
        }
    }
}

fn reshape(
    rows: Vec<Record>,
    row_count: u64,
    query_type: Option<&QueryType>,
) -> Result<QueryResult, ExecutionError> {
    let inserted_ids = match query_type {
        Some(QueryType::Insert { primary_key }) => {
            let ids = rows
                .iter()
                .map(|row| {
                    row.get(primary_key).cloned().ok_or_else(|| {
                        ExecutionError::Reshape(format!(
                            "inserted row is missing primary key '{}'",
                            primary_key
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Some(ids)
        }
        _ => None,
    };

    Ok(QueryResult {
        rows,
        row_count,
        inserted_ids,
    })
}
