//! Error types for the datastore layer
//!
//! Every public operation resolves to a [`DatastoreError`] on failure. Driver
//! failures are normalized into [`DriverError`] first, and the classifier output
//! travels as a [`Footprint`] value rather than being bolted onto the error.

use std::fmt;

/// Result type alias for datastore operations
pub type DatastoreResult<T> = Result<T, DatastoreError>;

/// Error returned by every datastore operation
#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    /// A usable connection could not be acquired or maintained
    #[error("Bad connection: {message}")]
    BadConnection {
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    /// The datastore or table is not registered with this instance
    #[error("Invalid datastore: {0}")]
    InvalidDatastore(String),

    /// The statement could not be compiled into a native query
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The join planner rejected the association set
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// A uniqueness constraint was violated
    #[error(
        "Would violate uniqueness constraint on '{table}' ({}): {message}",
        .columns.join(", ")
    )]
    NotUnique {
        table: String,
        columns: Vec<String>,
        message: String,
        #[source]
        source: DriverError,
    },

    /// The backend rejected the query
    #[error("Query failed: {0}")]
    Query(#[source] DriverError),

    /// A transaction boundary operation failed
    #[error("Transaction {stage} failed: {source}")]
    Transaction {
        stage: TransactionStage,
        #[source]
        source: DriverError,
    },

    /// Incoming values did not satisfy the model definition
    #[error("Validation error: {0}")]
    Validation(String),

    /// Raw rows could not be reshaped into the declared query type
    #[error("Unexpected query result: {0}")]
    Reshape(String),

    /// Child rows could not be folded into their parents
    #[error("Join reassembly failed: {0}")]
    Reassembly(String),
}

impl DatastoreError {
    pub(crate) fn bad_connection(message: impl Into<String>, source: Option<DriverError>) -> Self {
        DatastoreError::BadConnection {
            message: message.into(),
            source,
        }
    }

    /// Whether this failure is a uniqueness violation
    pub fn is_not_unique(&self) -> bool {
        matches!(self, DatastoreError::NotUnique { .. })
    }
}

/// Transaction boundary that produced a [`DatastoreError::Transaction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStage {
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStage::Begin => write!(f, "begin"),
            TransactionStage::Commit => write!(f, "commit"),
            TransactionStage::Rollback => write!(f, "rollback"),
        }
    }
}

/// How a driver failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The connection itself failed (I/O, protocol, pool timeout, closed pool)
    Transport,
    /// The backend received the query and refused it
    Rejected,
}

/// Normalized failure reported by a database driver
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    /// SQLSTATE code when the backend provided one
    pub code: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub constraint: Option<String>,
    pub table: Option<String>,
}

impl DriverError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Transport,
            code: None,
            message: message.into(),
            detail: None,
            constraint: None,
            table: None,
        }
    }

    pub fn rejected(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Rejected,
            code,
            message: message.into(),
            detail: None,
            constraint: None,
            table: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn is_transport(&self) -> bool {
        self.kind == DriverErrorKind::Transport
    }
}

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned());
                let mut driver = DriverError::rejected(code, db.message());
                if let Some(constraint) = db.constraint() {
                    driver = driver.with_constraint(constraint);
                }
                if let Some(table) = db.table() {
                    driver = driver.with_table(table);
                }
                if let Some(pg) = db.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
                    if let Some(detail) = pg.detail() {
                        driver = driver.with_detail(detail);
                    }
                }
                driver
            }
            other => DriverError::transport(other.to_string()),
        }
    }
}

/// Classification identity produced by an error classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FootprintIdentity {
    /// A uniqueness constraint was violated
    NotUnique,
    /// No specific rule matched
    Catchall,
}

impl fmt::Display for FootprintIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FootprintIdentity::NotUnique => write!(f, "notUnique"),
            FootprintIdentity::Catchall => write!(f, "catchall"),
        }
    }
}

/// Backend-agnostic classification of a raw driver error
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    pub identity: FootprintIdentity,
    /// Columns involved in the violation, when the backend reports them
    pub keys: Vec<String>,
    pub raw: DriverError,
}

impl Footprint {
    pub fn catchall(raw: DriverError) -> Self {
        Self {
            identity: FootprintIdentity::Catchall,
            keys: Vec::new(),
            raw,
        }
    }
}

/// Failure returned by the query executor
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFailure {
    /// The connection failed while running the query
    Transport(DriverError),
    /// The backend rejected the query and a specific rule matched
    Footprint(Footprint),
    /// The backend rejected the query and nothing more specific is known
    Raw(DriverError),
}

impl QueryFailure {
    /// Convert into the public error for an operation on `table`
    pub fn into_datastore_error(self, table: &str) -> DatastoreError {
        match self {
            QueryFailure::Transport(err) => DatastoreError::bad_connection(
                format!("Connection failed while querying '{}'", table),
                Some(err),
            ),
            QueryFailure::Footprint(footprint) => match footprint.identity {
                FootprintIdentity::NotUnique => DatastoreError::NotUnique {
                    table: table.to_string(),
                    columns: footprint.keys,
                    message: footprint.raw.message.clone(),
                    source: footprint.raw,
                },
                FootprintIdentity::Catchall => DatastoreError::Query(footprint.raw),
            },
            QueryFailure::Raw(err) => DatastoreError::Query(err),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, QueryFailure::Transport(_))
    }
}

/// Errors raised while turning criteria or statements into native queries
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("Unsupported operator '{operator}' on column '{column}'")]
    UnsupportedOperator { column: String, operator: String },

    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error("Invalid value for column '{column}': {reason}")]
    InvalidValue { column: String, reason: String },

    #[error("Missing values for {0} statement")]
    MissingValues(String),
}

/// Errors raised by the join planner
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("Unknown table '{0}' in association")]
    UnknownTable(String),

    #[error("Invalid association '{alias}': {reason}")]
    InvalidAssociation { alias: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_unique_footprint_maps_to_not_unique_error() {
        let raw = DriverError::rejected(Some("23505".to_string()), "duplicate key value");
        let failure = QueryFailure::Footprint(Footprint {
            identity: FootprintIdentity::NotUnique,
            keys: vec!["email".to_string()],
            raw,
        });

        let err = failure.into_datastore_error("users");
        assert!(err.is_not_unique());
        match err {
            DatastoreError::NotUnique { table, columns, .. } => {
                assert_eq!(table, "users");
                assert_eq!(columns, vec!["email".to_string()]);
            }
            other => panic!("Expected NotUnique, got {:?}", other),
        }
    }

    #[test]
    fn transport_failure_maps_to_bad_connection() {
        let failure = QueryFailure::Transport(DriverError::transport("connection reset"));
        assert!(failure.is_transport());
        assert!(matches!(
            failure.into_datastore_error("users"),
            DatastoreError::BadConnection { source: Some(_), .. }
        ));
    }

    #[test]
    fn raw_failure_keeps_original_driver_error() {
        let raw = DriverError::rejected(Some("42P01".to_string()), "relation does not exist");
        match QueryFailure::Raw(raw.clone()).into_datastore_error("pets") {
            DatastoreError::Query(err) => assert_eq!(err, raw),
            other => panic!("Expected Query, got {:?}", other),
        }
    }

    #[test]
    fn display_messages() {
        let err = DatastoreError::Transaction {
            stage: TransactionStage::Commit,
            source: DriverError::transport("broken pipe"),
        };
        assert_eq!(err.to_string(), "Transaction commit failed: broken pipe");

        let err = DatastoreError::Compile(CompileError::UnsupportedOperator {
            column: "age".to_string(),
            operator: "near".to_string(),
        });
        assert_eq!(err.to_string(), "Unsupported operator 'near' on column 'age'");
    }
}
