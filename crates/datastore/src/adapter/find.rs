use super::{Adapter, Meta};
use crate::backends::Record;
use crate::connection::ConnectionLease;
use crate::error::DatastoreResult;
use crate::executor::QueryType;
use crate::join::{Association, JoinPlan, QueryCache};
use crate::query::{Criteria, NativeQuery};

impl Adapter {
    /// Find records of `table`, populating `associations`
    ///
    /// To-many associations come back as arrays and to-one associations as
    /// objects, empty when nothing matched.
    pub async fn find(
        &self,
        datastore: &str,
        table: &str,
        criteria: &Criteria,
        associations: &[Association],
        meta: Meta<'_>,
    ) -> DatastoreResult<Vec<Record>> {
        let datastore = self.registry.get(datastore)?;
        datastore.model(table)?;
        for association in associations {
            datastore.model(&association.child_table)?;
        }

        let plan = self.planner.plan_join(
            table,
            criteria,
            associations,
            datastore.models(),
            Some(datastore.schema()),
        )?;
        let parent_query = self.compile(&plan.parent_statement)?;
        // Surface child criteria errors before a connection is taken.
        for child in &plan.child_statements {
            self.compile(&child.bind(Vec::new()))?;
        }

        let mut lease = self.spawn(&datastore, meta.leased_connection).await?;
        let result = self.find_on(&mut lease, &plan, &parent_query, table).await;
        lease.release().await;
        result
    }

    async fn find_on(
        &self,
        lease: &mut ConnectionLease<'_>,
        plan: &JoinPlan,
        parent_query: &NativeQuery,
        table: &str,
    ) -> DatastoreResult<Vec<Record>> {
        let parents = self
            .run(lease, parent_query, Some(&QueryType::Select), table, true)
            .await?;

        let mut cache = QueryCache::new(plan.primary_key.clone(), plan.instructions());
        cache.set_parents(parents.rows)?;

        for child in &plan.child_statements {
            let keys = cache.parent_keys(&child.instructions.parent_key);
            if keys.is_empty() {
                continue;
            }

            tracing::debug!(
                "Populating '{}' of '{}' with {} keys ({:?})",
                child.instructions.alias,
                table,
                keys.len(),
                child.strategy
            );
            let query = self.compile(&child.bind(keys))?;
            let children = self
                .run(lease, &query, Some(&QueryType::Select), &child.statement.table, true)
                .await?;
            cache.extend(children.rows, &child.instructions)?;
        }

        Ok(cache.combine_records())
    }
}
