//! Storage Boundary - The injected adapter the engine runs against
//!
//! The engine never opens a connection itself; every read and write goes
//! through the `DataStore` trait. `MemoryStore` is a reference adapter used
//! by the test suite and as an executable specification of the boundary.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OrmResult;
use crate::query::QueryBuilder;
use crate::schema::ModelDef;

pub mod memory;

pub use memory::MemoryStore;

/// Materialized record: a dynamic attribute map
pub type Record = serde_json::Map<String, Value>;

/// Record attribute carrying the transient processing state of an object
/// through a save batch. Never persisted.
pub const STATE_FIELD: &str = "$state";

/// Processing state of an object inside a save batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    Insert,
    Update,
    Delete,
}

impl ObjectState {
    /// Wire representation of the state marker
    pub fn as_value(self) -> Value {
        match self {
            ObjectState::Insert => Value::from(1),
            ObjectState::Update => Value::from(2),
            ObjectState::Delete => Value::from(4),
        }
    }

    /// Read the state marker from a record
    pub fn of(record: &Record) -> Option<ObjectState> {
        match record.get(STATE_FIELD).and_then(Value::as_i64) {
            Some(1) => Some(ObjectState::Insert),
            Some(2) => Some(ObjectState::Update),
            Some(4) => Some(ObjectState::Delete),
            _ => None,
        }
    }

    /// Stamp the state marker onto a record
    pub fn mark(record: &mut Record, state: ObjectState) {
        record.insert(STATE_FIELD.to_string(), state.as_value());
    }

    /// Strip the state marker from a record
    pub fn strip(record: &mut Record) {
        record.remove(STATE_FIELD);
    }
}

/// Loose value equality used for key matching: numeric values compare by
/// magnitude regardless of integer/float representation.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(xi), Some(yi)) = (x.as_i64(), y.as_i64()) {
                xi == yi
            } else {
                match (x.as_f64(), y.as_f64()) {
                    (Some(xf), Some(yf)) => xf == yf,
                    _ => false,
                }
            }
        }
        _ => a == b,
    }
}

/// Collect distinct values, preserving first-seen order
pub fn distinct_values<I>(values: I) -> Vec<Value>
where
    I: IntoIterator<Item = Value>,
{
    let mut out: Vec<Value> = Vec::new();
    for value in values {
        if value.is_null() {
            continue;
        }
        if !out.iter().any(|existing| values_equal(existing, &value)) {
            out.push(value);
        }
    }
    out
}

/// The storage collaborator consumed by the engine.
///
/// `save` dispatches insert/update/delete per object according to the
/// `$state` marker (defaulting to insert for records without a key and
/// update otherwise) and writes generated keys back into inserted records.
/// `migrate` is an idempotent schema ensure.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Execute a select query and materialize the results
    async fn query(&self, query: &QueryBuilder) -> OrmResult<Vec<Record>>;

    /// Persist a batch of records against a model, in input order
    async fn save(&self, model: &ModelDef, objects: &mut [Record]) -> OrmResult<()>;

    /// Remove a batch of records by primary key, in input order
    async fn remove(&self, model: &ModelDef, objects: &[Record]) -> OrmResult<()>;

    /// Idempotently ensure the model's backing table exists
    async fn migrate(&self, model: &ModelDef) -> OrmResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_marker_round_trip() {
        let mut record = Record::new();
        assert!(ObjectState::of(&record).is_none());

        ObjectState::mark(&mut record, ObjectState::Update);
        assert_eq!(ObjectState::of(&record), Some(ObjectState::Update));

        ObjectState::strip(&mut record);
        assert!(ObjectState::of(&record).is_none());
        assert!(!record.contains_key(STATE_FIELD));
    }

    #[test]
    fn test_values_equal_across_number_forms() {
        assert!(values_equal(&json!(1), &json!(1)));
        assert!(values_equal(&json!(1.0), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!(2)));
        assert!(values_equal(&json!("a"), &json!("a")));
        assert!(!values_equal(&json!("a"), &json!(1)));
    }

    #[test]
    fn test_distinct_values_drops_nulls_and_duplicates() {
        let distinct = distinct_values(vec![json!(1), json!(2), json!(1), Value::Null, json!(2)]);
        assert_eq!(distinct, vec![json!(1), json!(2)]);
    }
}
