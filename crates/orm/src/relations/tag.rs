//! Tag Relation - Junction variant storing scalar values
//!
//! The value side is the scalar itself, not a foreign key, so items resolve
//! without touching any child model.

use async_trait::async_trait;
use serde_json::Value;

use super::{normalize_items, parent_key_of, Relation};
use crate::context::DataContext;
use crate::error::OrmResult;
use crate::query::QueryBuilder;
use crate::schema::{AssociationDescriptor, ModelDef};
use crate::store::{ObjectState, Record};
use std::sync::Arc;

/// Relation handle for scalar tag collections
pub struct TagRelation {
    context: DataContext,
    parent: Record,
    descriptor: AssociationDescriptor,
    adapter: String,
}

impl TagRelation {
    /// Bind a handle to one parent record and one tag descriptor
    pub fn new(
        context: DataContext,
        parent: Record,
        descriptor: AssociationDescriptor,
    ) -> OrmResult<Self> {
        descriptor.validate()?;
        let adapter = descriptor.adapter.clone().ok_or_else(|| {
            descriptor.configuration_error("tag relations require a backing adapter")
        })?;
        Ok(Self {
            context,
            parent,
            descriptor,
            adapter,
        })
    }

    fn link_definition(&self) -> Arc<ModelDef> {
        let descriptor = self.descriptor.clone();
        let adapter = self.adapter.clone();
        self.context
            .registry()
            .get_or_create(&self.adapter, move || {
                descriptor.junction_definition_named(&adapter)
            })
    }

    fn parent_key(&self) -> OrmResult<Value> {
        parent_key_of(&self.parent, &self.descriptor)
    }

    fn link_query(&self) -> OrmResult<QueryBuilder> {
        Ok(QueryBuilder::new()
            .select("*")
            .from(self.adapter.as_str())
            .where_eq(self.descriptor.object_field.as_str(), self.parent_key()?))
    }

    fn pair_query(&self, value: &Value) -> OrmResult<QueryBuilder> {
        Ok(self
            .link_query()?
            .where_eq(self.descriptor.value_field.as_str(), value.clone()))
    }

    async fn insert_value(&self, value: &Value) -> OrmResult<()> {
        let link = self.link_definition();
        let existing = self.context.store().query(&self.pair_query(value)?).await?;
        if !existing.is_empty() {
            return Ok(());
        }
        if !self.descriptor.multiplicity.is_collection() {
            let current = self.context.store().query(&self.link_query()?).await?;
            if let Some(mut row) = current.into_iter().next() {
                row.insert(self.descriptor.value_field.clone(), value.clone());
                ObjectState::mark(&mut row, ObjectState::Update);
                return self
                    .context
                    .store()
                    .save(&link, std::slice::from_mut(&mut row))
                    .await;
            }
        }
        let mut row = Record::new();
        row.insert(self.descriptor.object_field.clone(), self.parent_key()?);
        row.insert(self.descriptor.value_field.clone(), value.clone());
        ObjectState::mark(&mut row, ObjectState::Insert);
        self.context
            .store()
            .save(&link, std::slice::from_mut(&mut row))
            .await
    }
}

#[async_trait]
impl Relation for TagRelation {
    fn descriptor(&self) -> &AssociationDescriptor {
        &self.descriptor
    }

    fn query(&self) -> OrmResult<QueryBuilder> {
        Ok(QueryBuilder::new()
            .select(self.descriptor.value_field.as_str())
            .from(self.adapter.as_str())
            .where_eq(self.descriptor.object_field.as_str(), self.parent_key()?))
    }

    async fn members(&self) -> OrmResult<Vec<Value>> {
        let rows = self.context.store().query(&self.link_query()?).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get(&self.descriptor.value_field).cloned())
            .filter(|v| !v.is_null())
            .collect())
    }

    async fn insert(&self, items: &Value) -> OrmResult<()> {
        self.migrate().await?;
        for item in normalize_items(items) {
            if item.is_object() {
                return Err(self
                    .descriptor
                    .configuration_error("tag relations store scalar values"));
            }
            if item.is_null() {
                continue;
            }
            self.insert_value(&item).await?;
        }
        Ok(())
    }

    async fn remove(&self, items: &Value) -> OrmResult<()> {
        let link = self.link_definition();
        for item in normalize_items(items) {
            if item.is_null() {
                continue;
            }
            let rows = self.context.store().query(&self.pair_query(&item)?).await?;
            if rows.is_empty() {
                continue;
            }
            self.context.store().remove(&link, &rows).await?;
        }
        Ok(())
    }

    async fn remove_all(&self) -> OrmResult<()> {
        let link = self.link_definition();
        let rows = self.context.store().query(&self.link_query()?).await?;
        if rows.is_empty() {
            return Ok(());
        }
        self.context.store().remove(&link, &rows).await
    }

    async fn migrate(&self) -> OrmResult<()> {
        let link = self.link_definition();
        self.context.store().migrate(&link).await
    }
}
