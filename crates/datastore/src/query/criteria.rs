//! Declarative criteria
//!
//! Criteria describe filters, ordering, paging and projection independently of
//! SQL. They are usually parsed from the JSON shape
//! `{ "where": {..}, "sort": .., "limit": n, "skip": n, "select": [..] }`.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::CompileError;

/// Query operator types
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl QueryOperator {
    /// Parse a criteria modifier key
    ///
    /// `contains`, `startsWith` and `endsWith` are rewritten to `Like` by the
    /// caller, so they are not accepted here.
    fn from_modifier(modifier: &str) -> Option<Self> {
        match modifier {
            "<" | "lessThan" => Some(QueryOperator::LessThan),
            "<=" | "lessThanOrEqual" => Some(QueryOperator::LessThanOrEqual),
            ">" | "greaterThan" => Some(QueryOperator::GreaterThan),
            ">=" | "greaterThanOrEqual" => Some(QueryOperator::GreaterThanOrEqual),
            "!=" | "not" => Some(QueryOperator::NotEqual),
            "in" => Some(QueryOperator::In),
            "nin" => Some(QueryOperator::NotIn),
            "like" => Some(QueryOperator::Like),
            _ => None,
        }
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "<>"),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::In => write!(f, "IN"),
            QueryOperator::NotIn => write!(f, "NOT IN"),
            QueryOperator::IsNull => write!(f, "IS NULL"),
            QueryOperator::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortClause {
    pub column: String,
    pub direction: OrderDirection,
}

/// A filter tree
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    And(Vec<WhereClause>),
    Or(Vec<WhereClause>),
    Condition {
        column: String,
        operator: QueryOperator,
        /// Scalar for comparisons, array for `In`/`NotIn`, `Null` for null checks
        value: Value,
    },
}

impl WhereClause {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        WhereClause::Condition {
            column: column.into(),
            operator: QueryOperator::Equal,
            value: value.into(),
        }
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        WhereClause::Condition {
            column: column.into(),
            operator: QueryOperator::In,
            value: Value::Array(values),
        }
    }

    /// Parse a criteria `where` object
    pub fn from_json(value: &Value) -> Result<Option<Self>, CompileError> {
        let object = match value {
            Value::Null => return Ok(None),
            Value::Object(object) => object,
            other => {
                return Err(CompileError::InvalidCriteria(format!(
                    "where clause must be an object, got {}",
                    other
                )))
            }
        };

        let mut clauses = Vec::new();
        for (key, constraint) in object {
            match key.as_str() {
                "and" | "or" => {
                    let branches = constraint.as_array().ok_or_else(|| {
                        CompileError::InvalidCriteria(format!(
                            "'{}' must be an array of where clauses",
                            key
                        ))
                    })?;
                    let mut parsed = Vec::with_capacity(branches.len());
                    for branch in branches {
                        if let Some(clause) = WhereClause::from_json(branch)? {
                            parsed.push(clause);
                        }
                    }
                    clauses.push(if key == "and" {
                        WhereClause::And(parsed)
                    } else {
                        WhereClause::Or(parsed)
                    });
                }
                column => parse_constraint(column, constraint, &mut clauses)?,
            }
        }

        Ok(match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(WhereClause::And(clauses)),
        })
    }
}

fn parse_constraint(
    column: &str,
    constraint: &Value,
    out: &mut Vec<WhereClause>,
) -> Result<(), CompileError> {
    match constraint {
        Value::Null => out.push(WhereClause::Condition {
            column: column.to_string(),
            operator: QueryOperator::IsNull,
            value: Value::Null,
        }),
        Value::Array(values) => out.push(WhereClause::is_in(column, values.clone())),
        Value::Object(modifiers) => {
            for (modifier, operand) in modifiers {
                out.push(parse_modifier(column, modifier, operand)?);
            }
        }
        scalar => out.push(WhereClause::eq(column, scalar.clone())),
    }
    Ok(())
}

fn parse_modifier(
    column: &str,
    modifier: &str,
    operand: &Value,
) -> Result<WhereClause, CompileError> {
    let pattern = |wrap: fn(&str) -> String| -> Result<WhereClause, CompileError> {
        let text = operand.as_str().ok_or_else(|| CompileError::InvalidValue {
            column: column.to_string(),
            reason: format!("'{}' expects a string", modifier),
        })?;
        Ok(WhereClause::Condition {
            column: column.to_string(),
            operator: QueryOperator::Like,
            value: Value::String(wrap(&escape_like(text))),
        })
    };

    match modifier {
        "contains" => return pattern(|s| format!("%{}%", s)),
        "startsWith" => return pattern(|s| format!("{}%", s)),
        "endsWith" => return pattern(|s| format!("%{}", s)),
        _ => {}
    }

    let operator =
        QueryOperator::from_modifier(modifier).ok_or_else(|| CompileError::UnsupportedOperator {
            column: column.to_string(),
            operator: modifier.to_string(),
        })?;
    let is_list = matches!(operator, QueryOperator::In | QueryOperator::NotIn);

    let operator = match (operator, operand) {
        (QueryOperator::NotEqual, Value::Null) => QueryOperator::IsNotNull,
        (QueryOperator::NotEqual, Value::Array(_)) => QueryOperator::NotIn,
        (QueryOperator::In | QueryOperator::NotIn, value) if !value.is_array() => {
            return Err(CompileError::InvalidValue {
                column: column.to_string(),
                reason: format!("'{}' expects an array", modifier),
            })
        }
        (_, Value::Array(_) | Value::Object(_)) if !is_list => {
            return Err(CompileError::InvalidValue {
                column: column.to_string(),
                reason: format!("'{}' expects a scalar", modifier),
            })
        }
        (operator, _) => operator,
    };

    Ok(WhereClause::Condition {
        column: column.to_string(),
        operator,
        value: operand.clone(),
    })
}

fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Declarative description of a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub where_clause: Option<WhereClause>,
    pub sort: Vec<SortClause>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    /// Projected columns; `None` selects every column
    pub select: Option<Vec<String>>,
}

const CRITERIA_KEYS: [&str; 5] = ["where", "sort", "limit", "skip", "select"];

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse criteria from JSON
    ///
    /// An object carrying none of the criteria keys is taken as a bare `where`
    /// clause.
    pub fn from_json(value: &Value) -> Result<Self, CompileError> {
        let object = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(object) => object,
            other => {
                return Err(CompileError::InvalidCriteria(format!(
                    "criteria must be an object, got {}",
                    other
                )))
            }
        };

        if !object.keys().any(|k| CRITERIA_KEYS.contains(&k.as_str())) {
            return Ok(Criteria {
                where_clause: WhereClause::from_json(value)?,
                ..Default::default()
            });
        }

        if let Some(unknown) = object.keys().find(|k| !CRITERIA_KEYS.contains(&k.as_str())) {
            return Err(CompileError::InvalidCriteria(format!(
                "unknown criteria key '{}'",
                unknown
            )));
        }

        Ok(Criteria {
            where_clause: match object.get("where") {
                Some(w) => WhereClause::from_json(w)?,
                None => None,
            },
            sort: parse_sort(object.get("sort"))?,
            limit: parse_count(object, "limit")?,
            skip: parse_count(object, "skip")?,
            select: parse_select(object.get("select"))?,
        })
    }

    pub fn with_where(mut self, clause: WhereClause) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => WhereClause::And(vec![existing, clause]),
            None => clause,
        });
        self
    }

    pub fn with_sort(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.sort.push(SortClause {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_select(mut self, columns: Vec<String>) -> Self {
        self.select = Some(columns);
        self
    }

    /// Whether the criteria constrains nothing at all
    pub fn is_empty(&self) -> bool {
        self.where_clause.is_none()
            && self.sort.is_empty()
            && self.limit.is_none()
            && self.skip.is_none()
            && self.select.is_none()
    }

    /// Whether the criteria bounds or orders its rows
    pub fn has_bounds(&self) -> bool {
        self.limit.is_some() || self.skip.is_some() || !self.sort.is_empty()
    }

    /// Add `column` to an explicit projection
    pub fn ensure_selected(&mut self, column: &str) {
        if let Some(select) = self.select.as_mut() {
            if !select.iter().any(|c| c == column) {
                select.push(column.to_string());
            }
        }
    }
}

fn parse_sort(value: Option<&Value>) -> Result<Vec<SortClause>, CompileError> {
    let value = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(value) => value,
    };

    match value {
        Value::String(text) => text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_sort_string)
            .collect(),
        Value::Array(items) => {
            let mut sort = Vec::new();
            for item in items {
                match item {
                    Value::String(text) => sort.push(parse_sort_string(text)?),
                    Value::Object(object) => sort.extend(parse_sort_object(object)?),
                    other => {
                        return Err(CompileError::InvalidCriteria(format!(
                            "invalid sort entry {}",
                            other
                        )))
                    }
                }
            }
            Ok(sort)
        }
        Value::Object(object) => parse_sort_object(object),
        other => Err(CompileError::InvalidCriteria(format!("invalid sort {}", other))),
    }
}

fn parse_sort_string(text: &str) -> Result<SortClause, CompileError> {
    let mut parts = text.split_whitespace();
    let column = parts
        .next()
        .ok_or_else(|| CompileError::InvalidCriteria("empty sort clause".to_string()))?;
    let direction = match parts.next() {
        None => OrderDirection::Asc,
        Some(d) => parse_direction(column, &Value::String(d.to_string()))?,
    };
    if parts.next().is_some() {
        return Err(CompileError::InvalidCriteria(format!("invalid sort clause '{}'", text)));
    }
    Ok(SortClause {
        column: column.to_string(),
        direction,
    })
}

fn parse_sort_object(object: &Map<String, Value>) -> Result<Vec<SortClause>, CompileError> {
    object
        .iter()
        .map(|(column, direction)| -> Result<SortClause, CompileError> {
            Ok(SortClause {
                column: column.clone(),
                direction: parse_direction(column, direction)?,
            })
        })
        .collect()
}

fn parse_direction(column: &str, value: &Value) -> Result<OrderDirection, CompileError> {
    match value {
        Value::String(s) if s.eq_ignore_ascii_case("asc") => Ok(OrderDirection::Asc),
        Value::String(s) if s.eq_ignore_ascii_case("desc") => Ok(OrderDirection::Desc),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(OrderDirection::Asc),
        Value::Number(n) if n.as_i64() == Some(-1) => Ok(OrderDirection::Desc),
        other => Err(CompileError::InvalidCriteria(format!(
            "invalid sort direction {} for '{}'",
            other, column
        ))),
    }
}

fn parse_count(object: &Map<String, Value>, key: &str) -> Result<Option<u64>, CompileError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            CompileError::InvalidCriteria(format!("'{}' must be a non-negative integer", key))
        }),
    }
}

fn parse_select(value: Option<&Value>) -> Result<Option<Vec<String>>, CompileError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    CompileError::InvalidCriteria("'select' entries must be strings".to_string())
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(other) => Err(CompileError::InvalidCriteria(format!(
            "'select' must be an array, got {}",
            other
        ))),
    }
}
