//! Query Builder SQL generation

use serde_json::Value;

use super::builder::QueryBuilder;
use super::types::*;

impl QueryBuilder {
    /// Render the query as a SQL string
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();

        // SELECT clause
        if self.distinct {
            sql.push_str("SELECT DISTINCT ");
        } else {
            sql.push_str("SELECT ");
        }

        if self.select_fields.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.select_fields.join(", "));
        }

        // FROM clause
        if !self.from_tables.is_empty() {
            sql.push_str(" FROM ");
            sql.push_str(&self.from_tables.join(", "));
        }

        // JOIN clauses
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.join_type.to_string());
            sql.push(' ');
            match &join.target {
                JoinTarget::Table(table) => sql.push_str(table),
                JoinTarget::Subquery(subquery) => {
                    sql.push('(');
                    sql.push_str(&subquery.to_sql());
                    sql.push(')');
                }
            }
            if let Some(alias) = &join.alias {
                sql.push_str(" AS ");
                sql.push_str(alias);
            }
            if !join.on_conditions.is_empty() {
                sql.push_str(" ON ");
                let conditions: Vec<String> = join
                    .on_conditions
                    .iter()
                    .map(|(left, right)| format!("{} = {}", left, right))
                    .collect();
                sql.push_str(&conditions.join(" AND "));
            }
        }

        // WHERE clause
        if !self.where_conditions.is_empty() {
            sql.push_str(" WHERE ");
            let conditions: Vec<String> = self
                .where_conditions
                .iter()
                .map(|condition| self.build_condition(condition))
                .collect();
            sql.push_str(&conditions.join(" AND "));
        }

        // ORDER BY clause
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            let order_clauses: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", column, direction))
                .collect();
            sql.push_str(&order_clauses.join(", "));
        }

        // LIMIT clause
        if let Some(limit) = self.limit_count {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        // OFFSET clause
        if let Some(offset) = self.offset_value {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }

    /// Render a single WHERE condition
    fn build_condition(&self, condition: &WhereCondition) -> String {
        match &condition.operator {
            QueryOperator::IsNull | QueryOperator::IsNotNull => {
                format!("{} {}", condition.column, condition.operator)
            }
            QueryOperator::In | QueryOperator::NotIn => {
                let values: Vec<String> = condition
                    .values
                    .iter()
                    .map(|v| self.format_value(v))
                    .collect();
                format!(
                    "{} {} ({})",
                    condition.column,
                    condition.operator,
                    values.join(", ")
                )
            }
            _ => {
                if let Some(value) = &condition.value {
                    format!(
                        "{} {} {}",
                        condition.column,
                        condition.operator,
                        self.format_value(value)
                    )
                } else {
                    format!("{} IS NULL", condition.column)
                }
            }
        }
    }

    /// Format a value for SQL
    pub(crate) fn format_value(&self, value: &Value) -> String {
        match value {
            Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => "NULL".to_string(),
            _ => "NULL".to_string(),
        }
    }
}
