//! Statements and native queries
//!
//! A [`Statement`] is the method-tagged form between criteria and SQL; a
//! [`NativeQuery`] is what the compiler produces from it.

use std::collections::BTreeMap;

use serde_json::Value;

use super::criteria::Criteria;
use crate::backends::DatabaseValue;
use crate::model::AttributeType;

/// Column values for an insert or update, in column order
pub type ValueMap = BTreeMap<String, DatabaseValue>;

/// Declared attribute types of the statement's table, keyed by column
///
/// Criteria values compared against these columns are bound with the
/// matching native type.
pub type ColumnTypes = BTreeMap<String, AttributeType>;

/// Operation a statement performs
#[derive(Debug, Clone, PartialEq)]
pub enum StatementMethod {
    Find,
    Create,
    Update,
    Destroy,
    Count,
    Sum(String),
    Avg(String),
}

impl StatementMethod {
    pub fn name(&self) -> &'static str {
        match self {
            StatementMethod::Find => "find",
            StatementMethod::Create => "create",
            StatementMethod::Update => "update",
            StatementMethod::Destroy => "destroy",
            StatementMethod::Count => "count",
            StatementMethod::Sum(_) => "sum",
            StatementMethod::Avg(_) => "avg",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementOptions {
    /// Schema namespace; the dialect default when unset
    pub schema: Option<String>,
    /// Return the affected rows from the statement itself
    pub returning: bool,
}

/// A to-one association resolved by the backend in the same query
///
/// Child columns come back as `alias___column`.
#[derive(Debug, Clone, PartialEq)]
pub struct LeftJoin {
    pub table: String,
    pub alias: String,
    pub parent_column: String,
    pub child_column: String,
    pub columns: Vec<String>,
}

/// One sub-select per key, combined with `UNION ALL`
#[derive(Debug, Clone, PartialEq)]
pub struct UnionBatch {
    pub column: String,
    pub keys: Vec<Value>,
}

/// Backend-agnostic description of one operation
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub method: StatementMethod,
    pub table: String,
    pub criteria: Criteria,
    pub values: Vec<ValueMap>,
    pub options: StatementOptions,
    pub left_joins: Vec<LeftJoin>,
    pub union: Option<UnionBatch>,
    pub column_types: ColumnTypes,
}

impl Statement {
    fn new(method: StatementMethod, table: impl Into<String>, criteria: Criteria) -> Self {
        Self {
            method,
            table: table.into(),
            criteria,
            values: Vec::new(),
            options: StatementOptions::default(),
            left_joins: Vec::new(),
            union: None,
            column_types: ColumnTypes::new(),
        }
    }

    pub fn find(table: impl Into<String>, criteria: Criteria) -> Self {
        Self::new(StatementMethod::Find, table, criteria)
    }

    pub fn create(table: impl Into<String>, values: Vec<ValueMap>) -> Self {
        let mut statement = Self::new(StatementMethod::Create, table, Criteria::default());
        statement.values = values;
        statement
    }

    pub fn update(table: impl Into<String>, criteria: Criteria, values: ValueMap) -> Self {
        let mut statement = Self::new(StatementMethod::Update, table, criteria);
        statement.values = vec![values];
        statement
    }

    pub fn destroy(table: impl Into<String>, criteria: Criteria) -> Self {
        Self::new(StatementMethod::Destroy, table, criteria)
    }

    pub fn count(table: impl Into<String>, criteria: Criteria) -> Self {
        Self::new(StatementMethod::Count, table, criteria)
    }

    pub fn sum(table: impl Into<String>, criteria: Criteria, column: impl Into<String>) -> Self {
        Self::new(StatementMethod::Sum(column.into()), table, criteria)
    }

    pub fn avg(table: impl Into<String>, criteria: Criteria, column: impl Into<String>) -> Self {
        Self::new(StatementMethod::Avg(column.into()), table, criteria)
    }

    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.options.schema = schema;
        self
    }

    pub fn with_column_types(mut self, column_types: ColumnTypes) -> Self {
        self.column_types = column_types;
        self
    }

    pub fn returning(mut self, returning: bool) -> Self {
        self.options.returning = returning;
        self
    }
}

/// A compiled, parameterized query
#[derive(Debug, Clone, PartialEq)]
pub struct NativeQuery {
    pub sql: String,
    pub bindings: Vec<DatabaseValue>,
    /// Whether the query produces rows to fetch
    pub returning: bool,
}

impl NativeQuery {
    pub fn new(sql: impl Into<String>, bindings: Vec<DatabaseValue>) -> Self {
        Self {
            sql: sql.into(),
            bindings,
            returning: false,
        }
    }

    pub fn fetching(mut self) -> Self {
        self.returning = true;
        self
    }
}
