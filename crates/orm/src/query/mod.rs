//! Query Builder System - Structured select queries for dynamic models
//!
//! The builder is decomposed by concern:
//!
//! - `builder`: core builder state
//! - `types`: operators, conditions, join clauses
//! - `select`: SELECT and FROM operations
//! - `where_clause`: filter composition, including find-by-example
//! - `joins`: joins with entity aliases and sub-query targets
//! - `ordering` / `pagination`: ORDER BY, LIMIT, OFFSET
//! - `sql_generation`: rendering to SQL text

pub mod builder;
pub mod joins;
pub mod ordering;
pub mod pagination;
pub mod select;
pub mod sql_generation;
pub mod types;
pub mod where_clause;

pub use builder::QueryBuilder;
pub use types::{JoinClause, JoinTarget, JoinType, OrderDirection, QueryOperator, WhereCondition};
