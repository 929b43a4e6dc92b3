//! Query Builder SELECT and FROM operations

use super::builder::QueryBuilder;

impl QueryBuilder {
    /// Add a field to the SELECT list
    pub fn select(mut self, field: &str) -> Self {
        self.select_fields.push(field.to_string());
        self
    }

    /// Add several fields to the SELECT list
    pub fn select_all<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Add a source table
    pub fn from(mut self, table: &str) -> Self {
        self.from_tables.push(table.to_string());
        self
    }

    /// Select only distinct rows
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}
