//! Datastore registry
//!
//! A caller-owned map from datastore identity to its pool, configuration and
//! models. Each registry has its own lifecycle: `register`, use, `teardown`.

use std::sync::Arc;

use dashmap::DashMap;

use crate::backends::{DatabaseBackend, DatabaseConnectionConfig, DatabasePool, SqlDialect};
use crate::config::DatastoreConfig;
use crate::connection::ManagedPool;
use crate::error::{DatastoreError, DatastoreResult};
use crate::model::{ModelDefinition, ModelLookup};

/// One registered datastore
pub struct Datastore {
    identity: String,
    config: DatastoreConfig,
    pool: Arc<ManagedPool>,
    dialect: SqlDialect,
    models: ModelLookup,
    connection_config: Option<DatabaseConnectionConfig>,
}

impl Datastore {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ManagedPool> {
        &self.pool
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn models(&self) -> &ModelLookup {
        &self.models
    }

    /// Parsed connection parameters, used for diagnostics only
    pub fn connection_config(&self) -> Option<&DatabaseConnectionConfig> {
        self.connection_config.as_ref()
    }

    /// Schema namespace statements run against
    pub fn schema(&self) -> &str {
        self.config
            .schema
            .as_deref()
            .unwrap_or_else(|| self.dialect.default_schema())
    }

    /// The model registered for `table`
    pub fn model(&self, table: &str) -> DatastoreResult<&ModelDefinition> {
        self.models.get(table).ok_or_else(|| {
            DatastoreError::InvalidDatastore(format!(
                "Table '{}' is not registered with datastore '{}'",
                table, self.identity
            ))
        })
    }
}

impl std::fmt::Debug for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore")
            .field("identity", &self.identity)
            .field("dialect", &self.dialect)
            .field("schema", &self.schema())
            .field("models", &self.models.len())
            .finish()
    }
}

/// Registered datastores, keyed by identity
#[derive(Default)]
pub struct DatastoreRegistry {
    datastores: DashMap<String, Arc<Datastore>>,
}

impl DatastoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool through `backend` and register it under `identity`
    pub async fn register(
        &self,
        identity: &str,
        config: DatastoreConfig,
        models: &[ModelDefinition],
        backend: &dyn DatabaseBackend,
    ) -> DatastoreResult<Arc<Datastore>> {
        config.validate()?;
        self.ensure_vacant(identity)?;

        let connection_config = match backend.parse_database_url(&config.url) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::debug!("Could not parse datastore URL for diagnostics: {}", e);
                None
            }
        };
        let pool = backend.create_pool(&config.url, &config.pool).await?;

        let mut datastore = self.build(identity, config, models, pool, backend.sql_dialect());
        datastore.connection_config = connection_config;
        self.insert(datastore).await
    }

    /// Register an existing pool under `identity`
    pub async fn register_pool(
        &self,
        identity: &str,
        config: DatastoreConfig,
        models: &[ModelDefinition],
        pool: Arc<dyn DatabasePool>,
        dialect: SqlDialect,
    ) -> DatastoreResult<Arc<Datastore>> {
        config.validate()?;
        self.ensure_vacant(identity)?;
        let datastore = self.build(identity, config, models, pool, dialect);
        self.insert(datastore).await
    }

    /// Look up a registered datastore
    pub fn get(&self, identity: &str) -> DatastoreResult<Arc<Datastore>> {
        self.datastores
            .get(identity)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| not_registered(identity))
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.datastores.contains_key(identity)
    }

    pub fn identities(&self) -> Vec<String> {
        self.datastores.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.datastores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datastores.is_empty()
    }

    /// Unregister `identity` and close its pool
    pub async fn teardown(&self, identity: &str) -> DatastoreResult<()> {
        let (_, datastore) = self
            .datastores
            .remove(identity)
            .ok_or_else(|| not_registered(identity))?;

        tracing::debug!("Tearing down datastore '{}'", identity);
        datastore.pool.close().await.map_err(|e| {
            DatastoreError::bad_connection(
                format!("Failed to close pool for '{}'", identity),
                Some(e),
            )
        })
    }

    /// Tear down every datastore, reporting the first failure
    pub async fn teardown_all(&self) -> DatastoreResult<()> {
        let mut first_error = None;
        for identity in self.identities() {
            if let Err(e) = self.teardown(&identity).await {
                tracing::warn!("{}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn ensure_vacant(&self, identity: &str) -> DatastoreResult<()> {
        if identity.is_empty() {
            return Err(DatastoreError::InvalidDatastore("Datastore identity is empty".to_string()));
        }
        if self.datastores.contains_key(identity) {
            return Err(DatastoreError::InvalidDatastore(format!(
                "Datastore '{}' is already registered",
                identity
            )));
        }
        Ok(())
    }

    fn build(
        &self,
        identity: &str,
        config: DatastoreConfig,
        models: &[ModelDefinition],
        pool: Arc<dyn DatabasePool>,
        dialect: SqlDialect,
    ) -> Datastore {
        let pool = Arc::new(ManagedPool::new(pool, config.pool.clone()));
        Datastore {
            identity: identity.to_string(),
            config,
            pool,
            dialect,
            models: ModelLookup::from_definitions(models),
            connection_config: None,
        }
    }

    async fn insert(&self, datastore: Datastore) -> DatastoreResult<Arc<Datastore>> {
        let datastore = Arc::new(datastore);
        let inserted = match self.datastores.entry(datastore.identity.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&datastore));
                true
            }
        };

        if !inserted {
            // Lost a registration race; the pool we just built is ours to close.
            if let Err(e) = datastore.pool.close().await {
                tracing::warn!(
                    "Failed to close duplicate pool for '{}': {}",
                    datastore.identity,
                    e
                );
            }
            return Err(DatastoreError::InvalidDatastore(format!(
                "Datastore '{}' is already registered",
                datastore.identity
            )));
        }

        tracing::debug!(
            "Registered datastore '{}' with {} models",
            datastore.identity,
            datastore.models.len()
        );
        Ok(datastore)
    }
}

fn not_registered(identity: &str) -> DatastoreError {
    DatastoreError::InvalidDatastore(format!("Datastore '{}' is not registered", identity))
}
