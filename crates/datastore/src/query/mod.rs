//! Query Module
//!
//! Declarative criteria, method-tagged statements, and the compiler that turns
//! them into parameterized SQL.

pub mod compiler;
pub mod criteria;
pub mod statement;

pub use compiler::{PostgresCompiler, StatementCompiler, ALIAS_SEPARATOR};
pub use criteria::{Criteria, OrderDirection, QueryOperator, SortClause, WhereClause};
pub use statement::{
    ColumnTypes, LeftJoin, NativeQuery, Statement, StatementMethod, StatementOptions, UnionBatch,
    ValueMap,
};
