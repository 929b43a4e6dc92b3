//! Query Builder ORDER BY operations

use super::builder::QueryBuilder;
use super::types::OrderDirection;

impl QueryBuilder {
    /// Add ascending ORDER BY
    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push((column.to_string(), OrderDirection::Asc));
        self
    }

    /// Add descending ORDER BY
    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by
            .push((column.to_string(), OrderDirection::Desc));
        self
    }
}
