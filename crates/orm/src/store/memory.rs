//! In-Memory Store - Reference adapter for the storage boundary
//!
//! Implements `DataStore` over plain record vectors. Supports the engine's
//! single-table query subset (equality, IN, null checks, comparisons,
//! ordering, pagination); joined queries are rejected so callers fall back
//! to SQL-capable adapters for them. Uniqueness constraints are not
//! enforced here; relation handles guard them before writing.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{values_equal, DataStore, ObjectState, Record, STATE_FIELD};
use crate::error::{OrmError, OrmResult};
use crate::query::{QueryBuilder, QueryOperator, WhereCondition};
use crate::schema::ModelDef;

/// In-memory storage adapter
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of a table's rows, for assertions
    pub async fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns true if the table has been created
    pub async fn has_table(&self, table: &str) -> bool {
        self.tables.read().await.contains_key(table)
    }

    fn unqualified(column: &str) -> &str {
        column.rsplit('.').next().unwrap_or(column)
    }

    fn cell<'a>(row: &'a Record, column: &str) -> Option<&'a Value> {
        row.get(Self::unqualified(column))
    }

    fn compare(a: &Value, b: &Value) -> Option<Ordering> {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
            (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
            (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
            _ => None,
        }
    }

    fn matches(row: &Record, condition: &WhereCondition) -> bool {
        let cell = Self::cell(row, &condition.column);
        match condition.operator {
            QueryOperator::IsNull => cell.map(Value::is_null).unwrap_or(true),
            QueryOperator::IsNotNull => cell.map(|v| !v.is_null()).unwrap_or(false),
            QueryOperator::Equal => match (cell, &condition.value) {
                (Some(cell), Some(value)) => values_equal(cell, value),
                _ => false,
            },
            QueryOperator::NotEqual => match (cell, &condition.value) {
                (Some(cell), Some(value)) => !values_equal(cell, value),
                (None, Some(_)) => true,
                _ => false,
            },
            QueryOperator::In => cell
                .map(|cell| condition.values.iter().any(|v| values_equal(cell, v)))
                .unwrap_or(false),
            QueryOperator::NotIn => cell
                .map(|cell| !condition.values.iter().any(|v| values_equal(cell, v)))
                .unwrap_or(true),
            QueryOperator::GreaterThan
            | QueryOperator::GreaterThanOrEqual
            | QueryOperator::LessThan
            | QueryOperator::LessThanOrEqual => {
                let ordering = match (cell, &condition.value) {
                    (Some(cell), Some(value)) => Self::compare(cell, value),
                    _ => None,
                };
                match ordering {
                    Some(ordering) => match condition.operator {
                        QueryOperator::GreaterThan => ordering == Ordering::Greater,
                        QueryOperator::GreaterThanOrEqual => ordering != Ordering::Less,
                        QueryOperator::LessThan => ordering == Ordering::Less,
                        QueryOperator::LessThanOrEqual => ordering != Ordering::Greater,
                        _ => false,
                    },
                    None => false,
                }
            }
        }
    }

    fn next_key(rows: &[Record], key_name: &str) -> i64 {
        rows.iter()
            .filter_map(|row| row.get(key_name).and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
            + 1
    }

    fn stored_copy(record: &Record) -> Record {
        let mut stored = record.clone();
        stored.remove(STATE_FIELD);
        stored
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn query(&self, query: &QueryBuilder) -> OrmResult<Vec<Record>> {
        if !query.joins().is_empty() {
            return Err(OrmError::Query(
                "joined queries are not supported by the in-memory store".to_string(),
            ));
        }
        let table = query
            .from_tables()
            .first()
            .ok_or_else(|| OrmError::Query("query has no source table".to_string()))?;

        let tables = self.tables.read().await;
        let rows = tables.get(table.as_str()).cloned().unwrap_or_default();
        drop(tables);

        let mut matched: Vec<Record> = rows
            .into_iter()
            .filter(|row| {
                query
                    .where_conditions()
                    .iter()
                    .all(|condition| Self::matches(row, condition))
            })
            .collect();

        for (column, direction) in query.order_clauses().iter().rev() {
            let column = Self::unqualified(column).to_string();
            let descending = *direction == crate::query::OrderDirection::Desc;
            matched.sort_by(|a, b| {
                let ordering = match (a.get(&column), b.get(&column)) {
                    (Some(x), Some(y)) => Self::compare(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        if let Some(offset) = query.offset_count() {
            let offset = offset.max(0) as usize;
            matched = matched.into_iter().skip(offset).collect();
        }
        if let Some(limit) = query.limit_value() {
            matched.truncate(limit.max(0) as usize);
        }

        Ok(matched)
    }

    async fn save(&self, model: &ModelDef, objects: &mut [Record]) -> OrmResult<()> {
        let key_name = model.primary_key_name().to_string();
        let mut tables = self.tables.write().await;
        let rows = tables.entry(model.source.clone()).or_default();

        for record in objects.iter_mut() {
            let state = ObjectState::of(record).unwrap_or_else(|| {
                if model.key_of(record).is_some() {
                    ObjectState::Update
                } else {
                    ObjectState::Insert
                }
            });
            match state {
                ObjectState::Insert => {
                    if model.key_of(record).is_none() {
                        let next = Self::next_key(rows, &key_name);
                        record.insert(key_name.clone(), Value::from(next));
                    }
                    rows.push(Self::stored_copy(record));
                }
                ObjectState::Update => {
                    let key = model.key_of(record).ok_or_else(|| {
                        OrmError::Validation(format!(
                            "cannot update a '{}' object without its key",
                            model.name
                        ))
                    })?;
                    let position = rows
                        .iter()
                        .position(|row| matches!(row.get(&key_name), Some(v) if values_equal(v, &key)));
                    match position {
                        Some(index) => {
                            let row = &mut rows[index];
                            for (attribute, value) in Self::stored_copy(record) {
                                row.insert(attribute, value);
                            }
                        }
                        None => rows.push(Self::stored_copy(record)),
                    }
                }
                ObjectState::Delete => {
                    if let Some(key) = model.key_of(record) {
                        rows.retain(|row| {
                            !matches!(row.get(&key_name), Some(v) if values_equal(v, &key))
                        });
                    }
                }
            }
        }
        Ok(())
    }

    async fn remove(&self, model: &ModelDef, objects: &[Record]) -> OrmResult<()> {
        let key_name = model.primary_key_name().to_string();
        let mut tables = self.tables.write().await;
        let rows = tables.entry(model.source.clone()).or_default();

        for record in objects {
            if let Some(key) = model.key_of(record) {
                rows.retain(|row| !matches!(row.get(&key_name), Some(v) if values_equal(v, &key)));
            }
        }
        Ok(())
    }

    async fn migrate(&self, model: &ModelDef) -> OrmResult<()> {
        self.tables
            .write()
            .await
            .entry(model.source.clone())
            .or_default();
        Ok(())
    }
}
