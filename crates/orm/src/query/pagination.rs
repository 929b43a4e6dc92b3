//! Query Builder LIMIT and OFFSET operations

use super::builder::QueryBuilder;

impl QueryBuilder {
    /// Limit the number of returned rows
    pub fn limit(mut self, count: i64) -> Self {
        self.limit_count = Some(count);
        self
    }

    /// Skip the first `count` rows
    pub fn offset(mut self, count: i64) -> Self {
        self.offset_value = Some(count);
        self
    }
}
