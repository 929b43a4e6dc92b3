//! Foreign-Key Relation - One-to-many association seen from the parent side
//!
//! The association "row" is the child's foreign-key attribute: `insert`
//! adopts a child by pointing its key at the parent, `remove` nulls it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{normalize_items, parent_key_of, resolve_child_key, unresolved_item_error, Relation};
use crate::context::DataContext;
use crate::error::{OrmError, OrmResult};
use crate::query::QueryBuilder;
use crate::schema::{AssociationDescriptor, ModelDef};
use crate::store::{values_equal, ObjectState, Record};

/// Relation handle for foreign-key associations
pub struct ForeignKeyRelation {
    context: DataContext,
    parent: Record,
    descriptor: AssociationDescriptor,
    child: Arc<ModelDef>,
}

impl ForeignKeyRelation {
    /// Bind a handle to one parent record and one association descriptor
    pub fn new(
        context: DataContext,
        parent: Record,
        descriptor: AssociationDescriptor,
    ) -> OrmResult<Self> {
        descriptor.validate()?;
        let child_name = descriptor
            .child_model
            .as_deref()
            .ok_or_else(|| descriptor.configuration_error("associations require a child model"))?;
        let child = context
            .registry()
            .get(child_name)
            .ok_or_else(|| descriptor.configuration_error("child model is not registered"))?;
        Ok(Self {
            context,
            parent,
            descriptor,
            child,
        })
    }

    fn parent_key(&self) -> OrmResult<Value> {
        parent_key_of(&self.parent, &self.descriptor)
    }

    /// Fetch the child row carrying the given key
    async fn child_row(&self, child_key: &Value) -> OrmResult<Option<Record>> {
        let query = QueryBuilder::new()
            .select("*")
            .from(self.child.source.as_str())
            .where_eq(self.child.primary_key_name(), child_key.clone())
            .limit(1);
        Ok(self.context.store().query(&query).await?.into_iter().next())
    }

    /// Point the child's foreign key at the parent, unless it already does
    async fn adopt(&self, child_key: &Value) -> OrmResult<()> {
        let parent_key = self.parent_key()?;
        let mut row = self.child_row(child_key).await?.ok_or_else(|| {
            OrmError::Validation(format!(
                "related '{}' object with key {} was not found",
                self.child.name, child_key
            ))
        })?;
        if matches!(row.get(&self.descriptor.child_field), Some(v) if values_equal(v, &parent_key))
        {
            return Ok(());
        }
        row.insert(self.descriptor.child_field.clone(), parent_key);
        ObjectState::mark(&mut row, ObjectState::Update);
        self.context
            .store()
            .save(&self.child, std::slice::from_mut(&mut row))
            .await
    }
}

#[async_trait]
impl Relation for ForeignKeyRelation {
    fn descriptor(&self) -> &AssociationDescriptor {
        &self.descriptor
    }

    fn query(&self) -> OrmResult<QueryBuilder> {
        Ok(QueryBuilder::new()
            .select("*")
            .from(self.child.source.as_str())
            .where_eq(self.descriptor.child_field.as_str(), self.parent_key()?)
            .order_by(self.child.primary_key_name()))
    }

    async fn members(&self) -> OrmResult<Vec<Value>> {
        let rows = self.context.store().query(&self.query()?).await?;
        Ok(rows.into_iter().map(Value::Object).collect())
    }

    async fn insert(&self, items: &Value) -> OrmResult<()> {
        for item in normalize_items(items) {
            let child_key = resolve_child_key(&self.context, &self.child, &item, true)
                .await?
                .ok_or_else(|| unresolved_item_error(&self.descriptor))?;
            self.adopt(&child_key).await?;
        }
        Ok(())
    }

    async fn remove(&self, items: &Value) -> OrmResult<()> {
        let parent_key = self.parent_key()?;
        for item in normalize_items(items) {
            let child_key =
                match resolve_child_key(&self.context, &self.child, &item, false).await? {
                    Some(key) => key,
                    None => continue,
                };
            let mut row = match self.child_row(&child_key).await? {
                Some(row) => row,
                None => continue,
            };
            let is_member = matches!(
                row.get(&self.descriptor.child_field),
                Some(v) if values_equal(v, &parent_key)
            );
            if !is_member {
                continue;
            }
            row.insert(self.descriptor.child_field.clone(), Value::Null);
            ObjectState::mark(&mut row, ObjectState::Update);
            self.context
                .store()
                .save(&self.child, std::slice::from_mut(&mut row))
                .await?;
        }
        Ok(())
    }

    async fn remove_all(&self) -> OrmResult<()> {
        let mut rows = self.context.store().query(&self.query()?).await?;
        if rows.is_empty() {
            return Ok(());
        }
        for row in rows.iter_mut() {
            row.insert(self.descriptor.child_field.clone(), Value::Null);
            ObjectState::mark(row, ObjectState::Update);
        }
        self.context.store().save(&self.child, &mut rows).await
    }

    async fn migrate(&self) -> OrmResult<()> {
        self.context.store().migrate(&self.child).await
    }
}
