//! Query Builder JOIN operations

use super::builder::QueryBuilder;
use super::types::*;

impl QueryBuilder {
    /// Add INNER JOIN to the query
    pub fn join(mut self, table: &str, left_col: &str, right_col: &str) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Inner,
            target: JoinTarget::Table(table.to_string()),
            alias: None,
            on_conditions: vec![(left_col.to_string(), right_col.to_string())],
        });
        self
    }

    /// Add LEFT JOIN to the query
    pub fn left_join(mut self, table: &str, left_col: &str, right_col: &str) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Left,
            target: JoinTarget::Table(table.to_string()),
            alias: None,
            on_conditions: vec![(left_col.to_string(), right_col.to_string())],
        });
        self
    }

    /// Add LEFT JOIN with an entity alias
    pub fn left_join_as(mut self, table: &str, alias: &str, left_col: &str, right_col: &str) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Left,
            target: JoinTarget::Table(table.to_string()),
            alias: Some(alias.to_string()),
            on_conditions: vec![(left_col.to_string(), right_col.to_string())],
        });
        self
    }

    /// Add INNER JOIN against a nested sub-query
    pub fn join_subquery(
        mut self,
        subquery: QueryBuilder,
        alias: &str,
        left_col: &str,
        right_col: &str,
    ) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Inner,
            target: JoinTarget::Subquery(Box::new(subquery)),
            alias: Some(alias.to_string()),
            on_conditions: vec![(left_col.to_string(), right_col.to_string())],
        });
        self
    }

    /// Append an already-built join clause
    pub fn with_join(mut self, clause: JoinClause) -> Self {
        self.joins.push(clause);
        self
    }

    /// Returns true if a join labeled `alias` is already queued
    pub fn has_join_alias(&self, alias: &str) -> bool {
        self.joins.iter().any(|join| join.label() == alias)
    }
}
