//! Statement compilation
//!
//! [`StatementCompiler`] is the boundary between declarative statements and the
//! backend's SQL. [`PostgresCompiler`] is the implementation shipped with the
//! crate; it only produces parameterized SQL and never touches a connection.

use std::collections::BTreeSet;

use serde_json::Value;

use super::criteria::{Criteria, QueryOperator, WhereClause};
use super::statement::{ColumnTypes, NativeQuery, Statement, StatementMethod};
use crate::backends::{DatabaseValue, SqlDialect};
use crate::error::CompileError;
use crate::model::AttributeType;

/// Separator between an association alias and a child column in inline joins
pub const ALIAS_SEPARATOR: &str = "___";

/// Turns statements into native queries
pub trait StatementCompiler: Send + Sync {
    /// Compile a statement into SQL plus ordered bindings
    fn compile(&self, statement: &Statement) -> Result<NativeQuery, CompileError>;

    /// Query that moves an auto-increment sequence past the column's maximum
    fn sequence_fix(&self, table: &str, schema: Option<&str>, column: &str) -> NativeQuery;
}

/// PostgreSQL statement compiler
#[derive(Debug, Clone, Copy)]
pub struct PostgresCompiler {
    dialect: SqlDialect,
}

impl Default for PostgresCompiler {
    fn default() -> Self {
        Self {
            dialect: SqlDialect::PostgreSQL,
        }
    }
}

impl PostgresCompiler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatementCompiler for PostgresCompiler {
    fn compile(&self, statement: &Statement) -> Result<NativeQuery, CompileError> {
        let mut writer = QueryWriter::new(
            self.dialect,
            statement.options.schema.as_deref(),
            &statement.column_types,
        );

        let fetches = match &statement.method {
            StatementMethod::Find => {
                writer.find(statement)?;
                true
            }
            StatementMethod::Create => {
                writer.insert(statement)?;
                statement.options.returning
            }
            StatementMethod::Update => {
                writer.update(statement)?;
                statement.options.returning
            }
            StatementMethod::Destroy => {
                writer.delete(statement)?;
                statement.options.returning
            }
            StatementMethod::Count => {
                writer.aggregate(statement, "COUNT(*)", "count")?;
                true
            }
            StatementMethod::Sum(column) => {
                let expr = format!(
                    "COALESCE(SUM({}), 0)::double precision",
                    self.dialect.quote_identifier(column)
                );
                writer.aggregate(statement, &expr, "sum")?;
                true
            }
            StatementMethod::Avg(column) => {
                let expr = format!(
                    "AVG({})::double precision",
                    self.dialect.quote_identifier(column)
                );
                writer.aggregate(statement, &expr, "avg")?;
                true
            }
        };

        let query = NativeQuery::new(writer.sql, writer.bindings);
        Ok(if fetches { query.fetching() } else { query })
    }

    fn sequence_fix(&self, table: &str, schema: Option<&str>, column: &str) -> NativeQuery {
        let types = ColumnTypes::new();
        let writer = QueryWriter::new(self.dialect, schema, &types);
        let qualified = writer.table(table);
        let sql = format!(
            "SELECT setval(pg_get_serial_sequence($1, $2), COALESCE((SELECT MAX({}) FROM {}), 1))",
            self.dialect.quote_identifier(column),
            qualified
        );
        NativeQuery::new(
            sql,
            vec![DatabaseValue::String(qualified), DatabaseValue::String(column.to_string())],
        )
    }
}

struct QueryWriter<'s> {
    dialect: SqlDialect,
    schema: Option<&'s str>,
    types: &'s ColumnTypes,
    sql: String,
    bindings: Vec<DatabaseValue>,
}

impl<'s> QueryWriter<'s> {
    fn new(dialect: SqlDialect, schema: Option<&'s str>, types: &'s ColumnTypes) -> Self {
        Self {
            dialect,
            schema,
            types,
            sql: String::new(),
            bindings: Vec::new(),
        }
    }

    fn ident(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    fn table(&self, name: &str) -> String {
        let schema = self.schema.unwrap_or_else(|| self.dialect.default_schema());
        format!("{}.{}", self.ident(schema), self.ident(name))
    }

    fn column(&self, qualifier: Option<&str>, column: &str) -> String {
        match qualifier {
            Some(q) => format!("{}.{}", self.ident(q), self.ident(column)),
            None => self.ident(column),
        }
    }

    /// Placeholder for `value`; nulls are written inline so they take the
    /// column's type instead of the parameter's
    fn bind(&mut self, value: DatabaseValue) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        let placeholder = self.dialect.parameter_placeholder(self.bindings.len());
        self.bindings.push(value);
        placeholder
    }

    fn find(&mut self, statement: &Statement) -> Result<(), CompileError> {
        let Some(batch) = &statement.union else {
            return self.select(statement, None);
        };

        if batch.keys.is_empty() {
            let nothing = WhereClause::is_in(batch.column.clone(), Vec::new());
            return self.select(statement, Some(&nothing));
        }

        for (index, key) in batch.keys.iter().enumerate() {
            if index > 0 {
                self.sql.push_str(" UNION ALL ");
            }
            let correlated = WhereClause::eq(batch.column.clone(), key.clone());
            self.sql.push('(');
            self.select(statement, Some(&correlated))?;
            self.sql.push(')');
        }
        Ok(())
    }

    fn select(
        &mut self,
        statement: &Statement,
        extra: Option<&WhereClause>,
    ) -> Result<(), CompileError> {
        let criteria = &statement.criteria;
        let qualifier = if statement.left_joins.is_empty() {
            None
        } else {
            Some(statement.table.as_str())
        };

        let mut columns: Vec<String> = match (&criteria.select, qualifier) {
            (Some(select), _) => select.iter().map(|c| self.column(qualifier, c)).collect(),
            (None, Some(q)) => vec![format!("{}.*", self.ident(q))],
            (None, None) => vec!["*".to_string()],
        };
        for join in &statement.left_joins {
            for child_column in &join.columns {
                columns.push(format!(
                    "{} AS {}",
                    self.column(Some(&join.alias), child_column),
                    self.ident(&format!("{}{}{}", join.alias, ALIAS_SEPARATOR, child_column))
                ));
            }
        }

        self.sql.push_str("SELECT ");
        self.sql.push_str(&columns.join(", "));
        self.sql.push_str(" FROM ");
        self.sql.push_str(&self.table(&statement.table));
        if let Some(q) = qualifier {
            self.sql.push_str(" AS ");
            self.sql.push_str(&self.ident(q));
        }

        for join in &statement.left_joins {
            let clause = format!(
                " LEFT JOIN {} AS {} ON {} = {}",
                self.table(&join.table),
                self.ident(&join.alias),
                self.column(Some(&join.alias), &join.child_column),
                self.column(qualifier, &join.parent_column)
            );
            self.sql.push_str(&clause);
        }

        let combined = match (&criteria.where_clause, extra) {
            (Some(w), Some(e)) => Some(WhereClause::And(vec![w.clone(), e.clone()])),
            (Some(w), None) => Some(w.clone()),
            (None, Some(e)) => Some(e.clone()),
            (None, None) => None,
        };
        if let Some(clause) = combined {
            self.sql.push_str(" WHERE ");
            self.predicate(&clause, qualifier)?;
        }

        self.bounds(criteria, qualifier);
        Ok(())
    }

    fn bounds(&mut self, criteria: &Criteria, qualifier: Option<&str>) {
        if !criteria.sort.is_empty() {
            let order: Vec<String> = criteria
                .sort
                .iter()
                .map(|s| format!("{} {}", self.column(qualifier, &s.column), s.direction))
                .collect();
            self.sql.push_str(" ORDER BY ");
            self.sql.push_str(&order.join(", "));
        }
        if let Some(limit) = criteria.limit {
            self.sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(skip) = criteria.skip {
            self.sql.push_str(&format!(" OFFSET {}", skip));
        }
    }

    fn insert(&mut self, statement: &Statement) -> Result<(), CompileError> {
        if statement.values.is_empty() {
            return Err(CompileError::MissingValues("create".to_string()));
        }

        let columns: BTreeSet<&String> =
            statement.values.iter().flat_map(|row| row.keys()).collect();
        self.sql.push_str("INSERT INTO ");
        self.sql.push_str(&self.table(&statement.table));

        if columns.is_empty() {
            if statement.values.len() > 1 {
                return Err(CompileError::MissingValues("create".to_string()));
            }
            self.sql.push_str(" DEFAULT VALUES");
        } else {
            let names: Vec<String> = columns.iter().map(|c| self.ident(c)).collect();
            self.sql.push_str(" (");
            self.sql.push_str(&names.join(", "));
            self.sql.push_str(") VALUES ");

            for (index, row) in statement.values.iter().enumerate() {
                if index > 0 {
                    self.sql.push_str(", ");
                }
                let mut slots = Vec::with_capacity(columns.len());
                for column in &columns {
                    match row.get(column.as_str()) {
                        Some(value) => slots.push(self.bind(value.clone())),
                        None => slots.push("DEFAULT".to_string()),
                    }
                }
                self.sql.push('(');
                self.sql.push_str(&slots.join(", "));
                self.sql.push(')');
            }
        }

        self.returning(statement);
        Ok(())
    }

    fn update(&mut self, statement: &Statement) -> Result<(), CompileError> {
        reject_bounds(&statement.criteria, "update")?;
        let values = match statement.values.first() {
            Some(values) if !values.is_empty() => values,
            _ => return Err(CompileError::MissingValues("update".to_string())),
        };

        self.sql.push_str("UPDATE ");
        self.sql.push_str(&self.table(&statement.table));
        self.sql.push_str(" SET ");

        let mut assignments = Vec::with_capacity(values.len());
        for (column, value) in values {
            let placeholder = self.bind(value.clone());
            assignments.push(format!("{} = {}", self.ident(column), placeholder));
        }
        self.sql.push_str(&assignments.join(", "));

        self.filter(&statement.criteria)?;
        self.returning(statement);
        Ok(())
    }

    fn delete(&mut self, statement: &Statement) -> Result<(), CompileError> {
        reject_bounds(&statement.criteria, "destroy")?;
        self.sql.push_str("DELETE FROM ");
        self.sql.push_str(&self.table(&statement.table));
        self.filter(&statement.criteria)?;
        self.returning(statement);
        Ok(())
    }

    fn aggregate(
        &mut self,
        statement: &Statement,
        expr: &str,
        label: &str,
    ) -> Result<(), CompileError> {
        reject_bounds(&statement.criteria, statement.method.name())?;
        self.sql.push_str(&format!("SELECT {} AS {} FROM ", expr, self.ident(label)));
        self.sql.push_str(&self.table(&statement.table));
        self.filter(&statement.criteria)
    }

    fn filter(&mut self, criteria: &Criteria) -> Result<(), CompileError> {
        if let Some(clause) = &criteria.where_clause {
            self.sql.push_str(" WHERE ");
            self.predicate(clause, None)?;
        }
        Ok(())
    }

    fn returning(&mut self, statement: &Statement) {
        if statement.options.returning && self.dialect.supports_returning() {
            self.sql.push_str(" RETURNING *");
        }
    }

    fn predicate(
        &mut self,
        clause: &WhereClause,
        qualifier: Option<&str>,
    ) -> Result<(), CompileError> {
        match clause {
            WhereClause::And(branches) | WhereClause::Or(branches) if branches.is_empty() => {
                let identity = if matches!(clause, WhereClause::And(_)) { "TRUE" } else { "FALSE" };
                self.sql.push_str(identity);
            }
            WhereClause::And(branches) | WhereClause::Or(branches) => {
                let joiner = if matches!(clause, WhereClause::And(_)) { " AND " } else { " OR " };
                for (index, branch) in branches.iter().enumerate() {
                    if index > 0 {
                        self.sql.push_str(joiner);
                    }
                    self.sql.push('(');
                    self.predicate(branch, qualifier)?;
                    self.sql.push(')');
                }
            }
            WhereClause::Condition {
                column,
                operator,
                value,
            } => self.condition(column, operator, value, qualifier)?,
        }
        Ok(())
    }

    fn condition(
        &mut self,
        column: &str,
        operator: &QueryOperator,
        value: &Value,
        qualifier: Option<&str>,
    ) -> Result<(), CompileError> {
        let target = self.column(qualifier, column);

        match operator {
            QueryOperator::IsNull => self.sql.push_str(&format!("{} IS NULL", target)),
            QueryOperator::IsNotNull => self.sql.push_str(&format!("{} IS NOT NULL", target)),
            QueryOperator::Equal if value.is_null() => {
                self.sql.push_str(&format!("{} IS NULL", target))
            }
            QueryOperator::NotEqual if value.is_null() => {
                self.sql.push_str(&format!("{} IS NOT NULL", target))
            }
            QueryOperator::In | QueryOperator::NotIn => {
                let items = value.as_array().ok_or_else(|| CompileError::InvalidValue {
                    column: column.to_string(),
                    reason: format!("{} expects an array", operator),
                })?;
                if items.is_empty() {
                    let empty = if *operator == QueryOperator::In { "FALSE" } else { "TRUE" };
                    self.sql.push_str(empty);
                    return Ok(());
                }
                let mut placeholders = Vec::with_capacity(items.len());
                for item in items {
                    let value = self.scalar(column, operator, item)?;
                    placeholders.push(self.bind(value));
                }
                self.sql
                    .push_str(&format!("{} {} ({})", target, operator, placeholders.join(", ")));
            }
            _ => {
                let value = self.scalar(column, operator, value)?;
                let placeholder = self.bind(value);
                self.sql.push_str(&format!("{} {} {}", target, operator, placeholder));
            }
        }
        Ok(())
    }

    /// Encode a criteria value for comparison against `column`
    ///
    /// UUID and timestamp columns get native values; PostgreSQL will not
    /// compare them with text. Patterns stay text.
    fn scalar(
        &self,
        column: &str,
        operator: &QueryOperator,
        value: &Value,
    ) -> Result<DatabaseValue, CompileError> {
        let invalid = |reason: String| CompileError::InvalidValue {
            column: column.to_string(),
            reason,
        };

        match (value, self.types.get(column)) {
            (Value::Array(_) | Value::Object(_), _) => {
                Err(invalid("expected a scalar value".to_string()))
            }
            (Value::String(_), _) if *operator == QueryOperator::Like => {
                Ok(DatabaseValue::from_json(value))
            }
            (Value::String(text), Some(AttributeType::Uuid)) => uuid::Uuid::parse_str(text)
                .map(DatabaseValue::Uuid)
                .map_err(|e| invalid(format!("not a UUID ({})", e))),
            (Value::String(text), Some(AttributeType::DateTime)) => {
                chrono::DateTime::parse_from_rfc3339(text)
                    .map(|dt| DatabaseValue::DateTime(dt.with_timezone(&chrono::Utc)))
                    .map_err(|e| invalid(format!("not an RFC 3339 timestamp ({})", e)))
            }
            (other, _) => Ok(DatabaseValue::from_json(other)),
        }
    }
}

fn reject_bounds(criteria: &Criteria, method: &str) -> Result<(), CompileError> {
    if criteria.has_bounds() {
        return Err(CompileError::InvalidCriteria(format!(
            "{} does not support sort, limit or skip",
            method
        )));
    }
    Ok(())
}
