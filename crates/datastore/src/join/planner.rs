//! Join planning
//!
//! A find with associations is decomposed into one parent statement plus child
//! statements that are bound to the parent keys once the parent rows are in.
//! Strategy selection is fixed: no cost estimates are involved.

use std::collections::HashSet;

use serde_json::Value as JsonValue;

use crate::error::PlanError;
use crate::model::{AttributeType, ModelDefinition, ModelLookup};
use crate::query::{
    ColumnTypes, Criteria, LeftJoin, Statement, UnionBatch, WhereClause, ALIAS_SEPARATOR,
};

/// Whether an association holds one record or many
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// One association to populate on the parent records
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    /// Field name of the association on the parent record
    pub alias: String,
    pub child_table: String,
    pub cardinality: Cardinality,
    /// Parent-side correlation column
    pub parent_key: String,
    /// Child-side correlation column
    pub child_key: String,
    pub criteria: Criteria,
}

impl Association {
    /// A to-many association, e.g. `user.pets` where `pet.owner = user.id`
    pub fn many(
        alias: impl Into<String>,
        child_table: impl Into<String>,
        parent_key: impl Into<String>,
        child_key: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            child_table: child_table.into(),
            cardinality: Cardinality::Many,
            parent_key: parent_key.into(),
            child_key: child_key.into(),
            criteria: Criteria::default(),
        }
    }

    /// A to-one association, e.g. `pet.owner` where `user.id = pet.owner`
    pub fn one(
        alias: impl Into<String>,
        child_table: impl Into<String>,
        parent_key: impl Into<String>,
        child_key: impl Into<String>,
    ) -> Self {
        Self {
            cardinality: Cardinality::One,
            ..Self::many(alias, child_table, parent_key, child_key)
        }
    }

    pub fn with_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = criteria;
        self
    }
}

/// How child rows fold back into their parents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinInstructions {
    pub alias: String,
    pub cardinality: Cardinality,
    pub parent_key: String,
    pub child_key: String,
    pub child_primary_key: String,
}

/// How a child statement is restricted to the parent keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStrategy {
    /// One query with `child_key IN (..)`
    In,
    /// One bounded sub-select per parent key, combined with `UNION ALL`
    Union,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChildStatement {
    pub statement: Statement,
    pub strategy: ChildStrategy,
    pub instructions: JoinInstructions,
}

impl ChildStatement {
    /// The child statement restricted to `keys`
    pub fn bind(&self, keys: Vec<JsonValue>) -> Statement {
        let mut statement = self.statement.clone();
        let column = self.instructions.child_key.clone();
        match self.strategy {
            ChildStrategy::In => {
                statement.criteria =
                    statement.criteria.with_where(WhereClause::is_in(column, keys));
            }
            ChildStrategy::Union => {
                statement.union = Some(UnionBatch { column, keys });
            }
        }
        statement
    }
}

/// Output of the planner
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPlan {
    pub parent_statement: Statement,
    pub child_statements: Vec<ChildStatement>,
    /// Associations resolved inside the parent statement by `LEFT JOIN`
    pub inline: Vec<JoinInstructions>,
    /// Primary key of the parent table
    pub primary_key: String,
}

impl JoinPlan {
    /// Instructions for every association, inline ones first
    pub fn instructions(&self) -> Vec<JoinInstructions> {
        self.inline
            .iter()
            .cloned()
            .chain(self.child_statements.iter().map(|c| c.instructions.clone()))
            .collect()
    }
}

/// Decomposes a find with associations
pub trait JoinPlanner: Send + Sync {
    fn plan_join(
        &self,
        table: &str,
        criteria: &Criteria,
        associations: &[Association],
        models: &ModelLookup,
        schema: Option<&str>,
    ) -> Result<JoinPlan, PlanError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Resolve unconstrained to-one associations with a `LEFT JOIN`
    pub inline_to_one: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { inline_to_one: true }
    }
}

/// The planner used by the adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultJoinPlanner {
    config: PlannerConfig,
}

impl DefaultJoinPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    fn can_inline(&self, association: &Association, table: &str) -> bool {
        self.config.inline_to_one
            && association.cardinality == Cardinality::One
            && association.criteria.where_clause.is_none()
            && !association.criteria.has_bounds()
            && association.alias != table
    }
}

impl JoinPlanner for DefaultJoinPlanner {
    fn plan_join(
        &self,
        table: &str,
        criteria: &Criteria,
        associations: &[Association],
        models: &ModelLookup,
        schema: Option<&str>,
    ) -> Result<JoinPlan, PlanError> {
        let parent = models
            .get(table)
            .ok_or_else(|| PlanError::UnknownTable(table.to_string()))?;
        let primary_key = parent.primary_key().to_string();

        let mut parent_criteria = criteria.clone();
        parent_criteria.ensure_selected(&primary_key);

        let mut left_joins = Vec::new();
        let mut inline = Vec::new();
        let mut child_statements = Vec::new();
        let mut aliases = HashSet::new();

        for association in associations {
            validate_alias(association, &mut aliases)?;

            let child = models
                .get(&association.child_table)
                .ok_or_else(|| PlanError::UnknownTable(association.child_table.clone()))?;
            let child_primary_key = child.primary_key().to_string();

            parent_criteria.ensure_selected(&association.parent_key);

            let instructions = JoinInstructions {
                alias: association.alias.clone(),
                cardinality: association.cardinality,
                parent_key: association.parent_key.clone(),
                child_key: association.child_key.clone(),
                child_primary_key: child_primary_key.clone(),
            };

            if self.can_inline(association, table) {
                let mut columns = association
                    .criteria
                    .select
                    .clone()
                    .unwrap_or_else(|| child.column_names());
                if !columns.contains(&child_primary_key) {
                    columns.push(child_primary_key);
                }

                left_joins.push(LeftJoin {
                    table: association.child_table.clone(),
                    alias: association.alias.clone(),
                    parent_column: association.parent_key.clone(),
                    child_column: association.child_key.clone(),
                    columns,
                });
                inline.push(instructions);
                continue;
            }

            let mut child_criteria = association.criteria.clone();
            child_criteria.ensure_selected(&association.child_key);
            child_criteria.ensure_selected(&child_primary_key);

            let strategy = if child_criteria.has_bounds() {
                ChildStrategy::Union
            } else {
                ChildStrategy::In
            };

            child_statements.push(ChildStatement {
                statement: Statement::find(association.child_table.clone(), child_criteria)
                    .with_schema(schema.map(str::to_string))
                    .with_column_types(child_column_types(parent, child, association)),
                strategy,
                instructions,
            });
        }

        let mut parent_statement = Statement::find(table, parent_criteria)
            .with_schema(schema.map(str::to_string))
            .with_column_types(parent.column_types());
        parent_statement.left_joins = left_joins;

        tracing::debug!(
            "Planned join on '{}': {} inline, {} child statements",
            table,
            inline.len(),
            child_statements.len()
        );

        Ok(JoinPlan {
            parent_statement,
            child_statements,
            inline,
            primary_key,
        })
    }
}

/// Child column types, with an untyped correlation column taking the type of
/// the parent key it is compared with
fn child_column_types(
    parent: &ModelDefinition,
    child: &ModelDefinition,
    association: &Association,
) -> ColumnTypes {
    let mut types = child.column_types();
    let declared = types.get(&association.child_key).copied();
    if matches!(declared, None | Some(AttributeType::Ref)) {
        if let Some(attribute) = parent.attribute(&association.parent_key) {
            types.insert(association.child_key.clone(), attribute.attribute_type);
        }
    }
    types
}

fn validate_alias<'a>(
    association: &'a Association,
    seen: &mut HashSet<&'a str>,
) -> Result<(), PlanError> {
    let reason = if association.alias.is_empty() {
        Some("alias must not be empty")
    } else if association.alias.contains(ALIAS_SEPARATOR) {
        Some("alias must not contain the column separator")
    } else if !seen.insert(association.alias.as_str()) {
        Some("alias is declared more than once")
    } else if association.parent_key.is_empty() || association.child_key.is_empty() {
        Some("correlation keys must not be empty")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(PlanError::InvalidAssociation {
            alias: association.alias.clone(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
