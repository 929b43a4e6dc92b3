//! Relation Handles - Per-instance accessors over one parent and descriptor
//!
//! Three capability variants over one interface: `ForeignKeyRelation`
//! (association, one-to-many from the parent side), `JunctionRelation`
//! (many-to-many via an adapter of two foreign keys), and `TagRelation`
//! (junction variant whose value side is a scalar). Handles are transient,
//! created per access, and hold a pure query description plus the injected
//! context; they never mutate shared query state.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::DataContext;
use crate::error::{OrmError, OrmResult};
use crate::query::QueryBuilder;
use crate::schema::{AssociationDescriptor, ModelDef};
use crate::store::{ObjectState, Record};

pub mod foreign_key;
pub mod junction;
pub mod tag;

pub use foreign_key::ForeignKeyRelation;
pub use junction::JunctionRelation;
pub use tag::TagRelation;

/// Common interface of all relation handle variants.
///
/// Multi-item operations process sequentially in input order; the first
/// failure aborts the remaining items and propagates.
#[async_trait]
pub trait Relation: Send + Sync {
    /// The descriptor this handle is bound to
    fn descriptor(&self) -> &AssociationDescriptor;

    /// Pure query over the relation members
    fn query(&self) -> OrmResult<QueryBuilder>;

    /// Fetch the relation members: records for object relations, scalar
    /// values for tag relations
    async fn members(&self) -> OrmResult<Vec<Value>>;

    /// Link one object, an array of objects, or raw key values to the
    /// parent. Idempotent: linking an already-linked item is a no-op.
    async fn insert(&self, items: &Value) -> OrmResult<()>;

    /// Unlink items from the parent. Absence is a no-op, not an error.
    async fn remove(&self, items: &Value) -> OrmResult<()>;

    /// Unlink every member of the relation
    async fn remove_all(&self) -> OrmResult<()>;

    /// Idempotently ensure the backing adapter exists
    async fn migrate(&self) -> OrmResult<()>;
}

/// Normalize the polymorphic items argument: one object, an array, or raw
/// key values
pub(crate) fn normalize_items(items: &Value) -> Vec<Value> {
    match items {
        Value::Array(list) => list.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// The parent-side key this handle filters by
pub(crate) fn parent_key_of(
    parent: &Record,
    descriptor: &AssociationDescriptor,
) -> OrmResult<Value> {
    parent
        .get(&descriptor.parent_field)
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| descriptor.configuration_error("parent object has no key value"))
}

/// Resolve an item to the related object's primary key. A bare key is used
/// directly; an object lacking the key is looked up by example, and when no
/// match exists the object is inserted first, unless `create_missing` is
/// false.
pub(crate) async fn resolve_child_key(
    context: &DataContext,
    child: &Arc<ModelDef>,
    item: &Value,
    create_missing: bool,
) -> OrmResult<Option<Value>> {
    match item {
        Value::Null => Ok(None),
        Value::Object(example) => {
            if let Some(key) = child.key_of(example) {
                return Ok(Some(key));
            }
            let query = QueryBuilder::new()
                .select("*")
                .from(child.source.as_str())
                .where_example(example)
                .limit(1);
            let matches = context.store().query(&query).await?;
            if let Some(found) = matches.first() {
                return Ok(child.key_of(found));
            }
            if !create_missing {
                return Ok(None);
            }
            let mut record = example.clone();
            ObjectState::mark(&mut record, ObjectState::Insert);
            context
                .store()
                .save(child, std::slice::from_mut(&mut record))
                .await?;
            ObjectState::strip(&mut record);
            Ok(child.key_of(&record))
        }
        scalar => Ok(Some(scalar.clone())),
    }
}

/// Error raised when an item cannot be resolved to a key
pub(crate) fn unresolved_item_error(descriptor: &AssociationDescriptor) -> OrmError {
    descriptor.configuration_error("item cannot be resolved to a related object key")
}
