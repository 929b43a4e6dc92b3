//! Junction Relation - Many-to-many through an adapter of key pairs
//!
//! The backing definition is synthesized the first time an adapter name is
//! referenced and cached in the registry. Row insertion is idempotent: a
//! `(object, value)` pair is written only when no matching row exists, and
//! One/ZeroOrOne multiplicity replaces the parent's single row in place.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{normalize_items, parent_key_of, resolve_child_key, unresolved_item_error, Relation};
use crate::context::DataContext;
use crate::error::OrmResult;
use crate::query::QueryBuilder;
use crate::schema::{AssociationDescriptor, ModelDef};
use crate::store::{ObjectState, Record};

/// Relation handle for many-to-many junctions
pub struct JunctionRelation {
    context: DataContext,
    parent: Record,
    descriptor: AssociationDescriptor,
    child: Arc<ModelDef>,
    adapter: String,
}

impl JunctionRelation {
    /// Bind a handle to one parent record and one junction descriptor
    pub fn new(
        context: DataContext,
        parent: Record,
        descriptor: AssociationDescriptor,
    ) -> OrmResult<Self> {
        descriptor.validate()?;
        let adapter = descriptor
            .adapter
            .clone()
            .ok_or_else(|| {
                descriptor.configuration_error("junction relations require a backing adapter")
            })?;
        let child_name = descriptor.child_model.as_deref().ok_or_else(|| {
            descriptor.configuration_error("junction relations require a child model")
        })?;
        let child = context
            .registry()
            .get(child_name)
            .ok_or_else(|| descriptor.configuration_error("child model is not registered"))?;
        Ok(Self {
            context,
            parent,
            descriptor,
            child,
            adapter,
        })
    }

    /// The backing junction definition, synthesized on first use
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

    /// Query over this parent's junction rows
    fn link_query(&self) -> OrmResult<QueryBuilder> {
        Ok(QueryBuilder::new()
            .select("*")
            .from(self.adapter.as_str())
            .where_eq(self.descriptor.object_field.as_str(), self.parent_key()?))
    }

    /// Query over the junction rows matching one `(object, value)` pair
    fn pair_query(&self, child_key: &Value) -> OrmResult<QueryBuilder> {
        Ok(self
            .link_query()?
            .where_eq(self.descriptor.value_field.as_str(), child_key.clone()))
    }

    async fn insert_pair(&self, child_key: &Value) -> OrmResult<()> {
        let link = self.link_definition();
        let existing = self.context.store().query(&self.pair_query(child_key)?).await?;
        if !existing.is_empty() {
            // Unique on (object, value): duplicate insert is a no-op.
            return Ok(());
        }
        if !self.descriptor.multiplicity.is_collection() {
            // Unique on object alone: replace the parent's single row.
            let current = self.context.store().query(&self.link_query()?).await?;
            if let Some(mut row) = current.into_iter().next() {
                row.insert(self.descriptor.value_field.clone(), child_key.clone());
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
        row.insert(self.descriptor.value_field.clone(), child_key.clone());
        ObjectState::mark(&mut row, ObjectState::Insert);
        self.context
            .store()
            .save(&link, std::slice::from_mut(&mut row))
            .await
    }
}

#[async_trait]
impl Relation for JunctionRelation {
    fn descriptor(&self) -> &AssociationDescriptor {
        &self.descriptor
    }

    fn query(&self) -> OrmResult<QueryBuilder> {
        Ok(QueryBuilder::new()
            .select(&format!("{}.*", self.child.source))
            .from(self.child.source.as_str())
            .join(
                self.adapter.as_str(),
                &format!("{}.{}", self.child.source, self.descriptor.child_field),
                &format!("{}.{}", self.adapter, self.descriptor.value_field),
            )
            .where_eq(
                &format!("{}.{}", self.adapter, self.descriptor.object_field),
                self.parent_key()?,
            ))
    }

    async fn members(&self) -> OrmResult<Vec<Value>> {
        let rows = self.context.store().query(&self.link_query()?).await?;
        let keys: Vec<Value> = rows
            .iter()
            .filter_map(|row| row.get(&self.descriptor.value_field))
            .filter(|v| !v.is_null())
            .cloned()
            .collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let children = self
            .context
            .store()
            .query(
                &QueryBuilder::new()
                    .select("*")
                    .from(self.child.source.as_str())
                    .where_in(self.descriptor.child_field.as_str(), keys.clone()),
            )
            .await?;
        // Preserve junction-row order.
        let mut members = Vec::new();
        for key in &keys {
            if let Some(child) = children.iter().find(|child| {
                matches!(
                    child.get(&self.descriptor.child_field),
                    Some(v) if crate::store::values_equal(v, key)
                )
            }) {
                members.push(Value::Object(child.clone()));
            }
        }
        Ok(members)
    }

    async fn insert(&self, items: &Value) -> OrmResult<()> {
        self.migrate().await?;
        for item in normalize_items(items) {
            let child_key = resolve_child_key(&self.context, &self.child, &item, true)
                .await?
                .ok_or_else(|| unresolved_item_error(&self.descriptor))?;
            self.insert_pair(&child_key).await?;
        }
        Ok(())
    }

    async fn remove(&self, items: &Value) -> OrmResult<()> {
        let link = self.link_definition();
        for item in normalize_items(items) {
            let child_key =
                match resolve_child_key(&self.context, &self.child, &item, false).await? {
                    Some(key) => key,
                    None => continue,
                };
            let rows = self.context.store().query(&self.pair_query(&child_key)?).await?;
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
