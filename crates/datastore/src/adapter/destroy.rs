use super::{Adapter, Meta};
use crate::backends::Record;
use crate::error::DatastoreResult;
use crate::executor::QueryType;
use crate::query::{Criteria, Statement};

/// Result of `Adapter::destroy`
#[derive(Debug, Clone, PartialEq)]
pub struct DestroyOutcome {
    /// Rows removed
    pub count: u64,
    /// The removed records, present only when `meta.fetch` was set
    pub records: Option<Vec<Record>>,
}

impl Adapter {
    /// Delete every record matching `criteria`
    pub async fn destroy(
        &self,
        datastore: &str,
        table: &str,
        criteria: &Criteria,
        meta: Meta<'_>,
    ) -> DatastoreResult<DestroyOutcome> {
        let datastore = self.registry.get(datastore)?;
        let model = datastore.model(table)?;

        let statement = Statement::destroy(table, criteria.clone())
            .with_schema(Some(datastore.schema().to_string()))
            .with_column_types(model.column_types())
            .returning(meta.fetch);
        let query = self.compile(&statement)?;

        let mut lease = self.spawn(&datastore, meta.leased_connection).await?;
        let result = self
            .run(&mut lease, &query, Some(&QueryType::Delete), table, true)
            .await;
        lease.release().await;

        let result = result?;
        tracing::debug!("Destroyed {} rows in '{}'", result.row_count, table);
        Ok(DestroyOutcome {
            count: result.row_count,
            records: meta.fetch.then_some(result.rows),
        })
    }
}
