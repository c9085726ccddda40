use serde_json::Value as JsonValue;

use super::{Adapter, Meta};
use crate::error::{DatastoreError, DatastoreResult};
use crate::executor::QueryType;
use crate::query::{Criteria, Statement};

impl Adapter {
    /// Number of records matching `criteria`
    pub async fn count(
        &self,
        datastore: &str,
        table: &str,
        criteria: &Criteria,
        meta: Meta<'_>,
    ) -> DatastoreResult<u64> {
        let value = self
            .aggregate(datastore, Statement::count(table, criteria.clone()), "count", meta)
            .await?;
        value.as_u64().ok_or_else(|| {
            DatastoreError::Reshape(format!("count of '{}' is not a number: {}", table, value))
        })
    }

    /// Sum of `column` over the matching records, zero when none match
    pub async fn sum(
        &self,
        datastore: &str,
        table: &str,
        criteria: &Criteria,
        column: &str,
        meta: Meta<'_>,
    ) -> DatastoreResult<f64> {
        let value = self
            .aggregate(datastore, Statement::sum(table, criteria.clone(), column), "sum", meta)
            .await?;
        match value {
            JsonValue::Null => Ok(0.0),
            other => other.as_f64().ok_or_else(|| {
                DatastoreError::Reshape(format!(
                    "sum of '{}.{}' is not a number: {}",
                    table, column, other
                ))
            }),
        }
    }

    /// Average of `column`, `None` when no records match
    pub async fn avg(
        &self,
        datastore: &str,
        table: &str,
        criteria: &Criteria,
        column: &str,
        meta: Meta<'_>,
    ) -> DatastoreResult<Option<f64>> {
        let value = self
            .aggregate(datastore, Statement::avg(table, criteria.clone(), column), "avg", meta)
            .await?;
        match value {
            JsonValue::Null => Ok(None),
            other => other.as_f64().map(Some).ok_or_else(|| {
                DatastoreError::Reshape(format!(
                    "average of '{}.{}' is not a number: {}",
                    table, column, other
                ))
            }),
        }
    }

    async fn aggregate(
        &self,
        datastore: &str,
        statement: Statement,
        label: &str,
        meta: Meta<'_>,
    ) -> DatastoreResult<JsonValue> {
        let datastore = self.registry.get(datastore)?;
        let table = statement.table.clone();
        let model = datastore.model(&table)?;

        let statement = statement
            .with_schema(Some(datastore.schema().to_string()))
            .with_column_types(model.column_types());
        let query = self.compile(&statement)?;

        let mut lease = self.spawn(&datastore, meta.leased_connection).await?;
        let result = self
            .run(&mut lease, &query, Some(&QueryType::Select), &table, true)
            .await;
        lease.release().await;

        let mut rows = result?.rows;
        if rows.is_empty() {
            return Err(DatastoreError::Reshape(format!(
                "{} of '{}' returned no rows",
                label, table
            )));
        }
        let mut row = rows.swap_remove(0);
        row.remove(label).ok_or_else(|| {
            DatastoreError::Reshape(format!(
                "{} of '{}' is missing column '{}'",
                label, table, label
            ))
        })
    }
}
