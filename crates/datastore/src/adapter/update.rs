use serde_json::Value as JsonValue;

use super::{Adapter, Meta};
use crate::backends::{DatabaseValue, Record};
use crate::error::DatastoreResult;
use crate::executor::QueryType;
use crate::model::normalize_values;
use crate::query::{ColumnTypes, Criteria, NativeQuery, Statement, WhereClause};
use crate::transaction::Transaction;

/// Queries prepared before the transaction starts
struct UpdatePlan<'q> {
    table: &'q str,
    schema: String,
    column_types: ColumnTypes,
    primary_key: String,
    lookup: NativeQuery,
    update: NativeQuery,
    new_key: Option<JsonValue>,
}

impl Adapter {
    /// Update every record matching `criteria` and return the updated records
    ///
    /// Runs `BEGIN`, a primary key lookup, the `UPDATE`, a refetch by primary
    /// key and `COMMIT` on one connection. Any failure rolls back.
    pub async fn update(
        &self,
        datastore: &str,
        table: &str,
        criteria: &Criteria,
        values: &Record,
        meta: Meta<'_>,
    ) -> DatastoreResult<Vec<Record>> {
        let datastore = self.registry.get(datastore)?;
        let model = datastore.model(table)?;
        let schema = datastore.schema().to_string();
        let primary_key = model.primary_key().to_string();
        let column_types = model.column_types();

        let values = normalize_values(model, values)?;
        let new_key = values
            .get(&primary_key)
            .filter(|v| !v.is_null())
            .map(DatabaseValue::to_json);

        let update = self.compile(
            &Statement::update(table, criteria.clone(), values)
                .with_schema(Some(schema.clone()))
                .with_column_types(column_types.clone()),
        )?;
        let lookup = Criteria {
            where_clause: criteria.where_clause.clone(),
            select: Some(vec![primary_key.clone()]),
            ..Criteria::default()
        };
        let lookup = self.compile(
            &Statement::find(table, lookup)
                .with_schema(Some(schema.clone()))
                .with_column_types(column_types.clone()),
        )?;

        let plan = UpdatePlan {
            table,
            schema,
            column_types,
            primary_key,
            lookup,
            update,
            new_key,
        };

        let lease = self.spawn(&datastore, meta.leased_connection).await?;
        let mut transaction = Transaction::begin(lease, self.transaction.clone()).await?;

        match self.update_in(&mut transaction, &plan).await {
            Ok(records) => {
                transaction.commit_and_release().await?;
                tracing::debug!("Updated {} records in '{}'", records.len(), table);
                Ok(records)
            }
            Err(e) => Err(transaction.rollback_and_release(e).await),
        }
    }

    async fn update_in(
        &self,
        transaction: &mut Transaction<'_>,
        plan: &UpdatePlan<'_>,
    ) -> DatastoreResult<Vec<Record>> {
        let lease = transaction.lease_mut();

        let found = self
            .run(lease, &plan.lookup, Some(&QueryType::Select), plan.table, false)
            .await?;
        let mut keys: Vec<JsonValue> = found
            .rows
            .iter()
            .filter_map(|row| row.get(&plan.primary_key).cloned())
            .collect();

        self.run(lease, &plan.update, Some(&QueryType::Update), plan.table, false)
            .await?;

        // The old keys no longer exist once the update rewrote the primary key.
        if let Some(new_key) = &plan.new_key {
            if !keys.is_empty() {
                keys = vec![new_key.clone()];
            }
        }

        let refetch = Statement::find(
            plan.table,
            Criteria::new().with_where(WhereClause::is_in(plan.primary_key.clone(), keys)),
        )
        .with_schema(Some(plan.schema.clone()))
        .with_column_types(plan.column_types.clone());
        let query = self.compile(&refetch)?;
        let updated = self
            .run(lease, &query, Some(&QueryType::Select), plan.table, false)
            .await?;

        Ok(updated.rows)
    }
}
