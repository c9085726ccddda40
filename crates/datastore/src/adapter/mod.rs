//! Datastore adapter
//!
//! The public operations: `create`, `create_each`, `find`, `update`,
//! `destroy`, `count`, `sum` and `avg`. Each one compiles what it can before
//! taking a connection, runs its statements in order on a single lease, and
//! releases that lease exactly once on every exit path.

mod aggregate;
mod create;
mod destroy;
mod find;
mod update;

use std::sync::Arc;

use crate::backends::DatabaseConnection;
use crate::connection::{lessee::log_connection_hints, ConnectionLease};
use crate::error::DatastoreResult;
use crate::executor::{QueryExecutor, QueryResult, QueryType};
use crate::join::{DefaultJoinPlanner, JoinPlanner};
use crate::query::{NativeQuery, PostgresCompiler, Statement, StatementCompiler};
use crate::registry::{Datastore, DatastoreRegistry};
use crate::transaction::TransactionConfig;

pub use destroy::DestroyOutcome;

/// Per-call options
#[derive(Default)]
pub struct Meta<'a> {
    /// Run on this connection instead of spawning one; it is never released here
    pub leased_connection: Option<&'a mut dyn DatabaseConnection>,
    /// Return the created, updated or destroyed records
    pub fetch: bool,
}

impl<'a> Meta<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch(mut self) -> Self {
        self.fetch = true;
        self
    }

    pub fn leased(mut self, connection: &'a mut dyn DatabaseConnection) -> Self {
        self.leased_connection = Some(connection);
        self
    }
}

/// Runs logical operations against registered datastores
#[derive(Clone)]
pub struct Adapter {
    registry: Arc<DatastoreRegistry>,
    compiler: Arc<dyn StatementCompiler>,
    planner: Arc<dyn JoinPlanner>,
    executor: QueryExecutor,
    transaction: TransactionConfig,
}

impl Adapter {
    /// Adapter with the PostgreSQL compiler, classifier and default planner
    pub fn new(registry: Arc<DatastoreRegistry>) -> Self {
        Self {
            registry,
            compiler: Arc::new(PostgresCompiler::new()),
            planner: Arc::new(DefaultJoinPlanner::default()),
            executor: QueryExecutor::default(),
            transaction: TransactionConfig::default(),
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn StatementCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_planner(mut self, planner: Arc<dyn JoinPlanner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_executor(mut self, executor: QueryExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Transaction options used by `update`
    pub fn with_transaction_config(mut self, config: TransactionConfig) -> Self {
        self.transaction = config;
        self
    }

    pub fn registry(&self) -> &Arc<DatastoreRegistry> {
        &self.registry
    }

    fn compile(&self, statement: &Statement) -> DatastoreResult<NativeQuery> {
        self.compiler.compile(statement).map_err(|e| {
            tracing::debug!(
                "Failed to compile {} on '{}': {}",
                statement.method.name(),
                statement.table,
                e
            );
            e.into()
        })
    }

    async fn spawn<'a>(
        &self,
        datastore: &Datastore,
        leased: Option<&'a mut dyn DatabaseConnection>,
    ) -> DatastoreResult<ConnectionLease<'a>> {
        ConnectionLease::spawn_or_lease(datastore.pool(), leased)
            .await
            .map_err(|e| {
                log_connection_hints(&e, datastore.connection_config());
                e
            })
    }

    async fn run(
        &self,
        lease: &mut ConnectionLease<'_>,
        query: &NativeQuery,
        query_type: Option<&QueryType>,
        table: &str,
        disconnect_on_error: bool,
    ) -> DatastoreResult<QueryResult> {
        self.executor
            .run(lease, query, query_type, disconnect_on_error)
            .await
            .map_err(|e| e.into_datastore_error(table))
    }
}
