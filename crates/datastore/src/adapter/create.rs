use super::{Adapter, Meta};
use crate::backends::Record;
use crate::connection::ConnectionLease;
use crate::error::DatastoreResult;
use crate::executor::{QueryResult, QueryType};
use crate::model::{check_required, normalize_values};
use crate::query::{NativeQuery, Statement};

impl Adapter {
    /// Insert one record
    ///
    /// Returns the stored record when `meta.fetch` is set.
    pub async fn create(
        &self,
        datastore: &str,
        table: &str,
        record: &Record,
        meta: Meta<'_>,
    ) -> DatastoreResult<Option<Record>> {
        let created = self.insert(datastore, table, std::slice::from_ref(record), meta).await?;
        Ok(created.and_then(|records| records.into_iter().next()))
    }

    /// Insert several records with one statement
    pub async fn create_each(
        &self,
        datastore: &str,
        table: &str,
        records: &[Record],
        meta: Meta<'_>,
    ) -> DatastoreResult<Option<Vec<Record>>> {
        self.insert(datastore, table, records, meta).await
    }

    async fn insert(
        &self,
        datastore: &str,
        table: &str,
        records: &[Record],
        meta: Meta<'_>,
    ) -> DatastoreResult<Option<Vec<Record>>> {
        let datastore = self.registry.get(datastore)?;
        let model = datastore.model(table)?;
        let schema = datastore.schema().to_string();

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            check_required(model, record)?;
            rows.push(normalize_values(model, record)?);
        }

        // Explicit values for a sequence-backed key leave the sequence behind.
        let sequence_fix = model
            .auto_increment_key()
            .filter(|key| rows.iter().any(|row| row.get(*key).map_or(false, |v| !v.is_null())))
            .map(|key| self.compiler.sequence_fix(table, Some(schema.as_str()), key));

        let statement = Statement::create(table, rows)
            .with_schema(Some(schema))
            .returning(meta.fetch);
        let query = self.compile(&statement)?;
        let query_type = QueryType::Insert {
            primary_key: model.primary_key().to_string(),
        };

        let mut lease = self.spawn(&datastore, meta.leased_connection).await?;
        let result = self
            .insert_on(&mut lease, &query, &query_type, sequence_fix.as_ref(), table)
            .await;
        lease.release().await;

        let result = result?;
        tracing::debug!("Created {} rows in '{}'", result.row_count, table);
        Ok(meta.fetch.then_some(result.rows))
    }

    async fn insert_on(
        &self,
        lease: &mut ConnectionLease<'_>,
        query: &NativeQuery,
        query_type: &QueryType,
        sequence_fix: Option<&NativeQuery>,
        table: &str,
    ) -> DatastoreResult<QueryResult> {
        let result = self.run(lease, query, Some(query_type), table, true).await?;

        if let Some(fix) = sequence_fix {
            self.run(lease, fix, None, table, true).await?;
            tracing::debug!(
                "Moved the primary key sequence of '{}' past the inserted values",
                table
            );
        }

        Ok(result)
    }
}
