//! Referential Integrity Guard - Pre-delete cascade enforcement
//!
//! Before a parent object is removed, every reference mapping touching its
//! model is checked strictly in sequence. Mappings are independent: a
//! failure on mapping N does not roll back cascades already committed for
//! earlier mappings. Callers wrap the whole delete externally when
//! atomicity across mappings is required.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::context::DataContext;
use crate::error::{OrmError, OrmResult};
use crate::events::DataListener;
use crate::query::QueryBuilder;
use crate::schema::{AssociationDescriptor, AssociationKind, CascadeRule, ModelDef};
use crate::store::{ObjectState, Record};

/// Listener enforcing cascade rules ahead of the store delete
pub struct ReferentialIntegrityGuard;

impl ReferentialIntegrityGuard {
    /// Enforce every reference mapping touching `model` for one object
    /// about to be removed
    pub async fn enforce(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &Record,
    ) -> OrmResult<()> {
        if model.key_of(object).is_none() {
            return Ok(()); // never persisted, nothing can reference it
        }

        for mapping in context.registry().mappings_referencing(&model.name) {
            match mapping.kind {
                AssociationKind::Association => {
                    self.enforce_association(context, model, object, &mapping)
                        .await?;
                }
                AssociationKind::Junction => {
                    self.enforce_junction(context, model, object, &mapping)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Association where the removed model is the referenced parent:
    /// count children, then block, null, or delete them per the cascade
    /// rule.
    async fn enforce_association(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &Record,
        mapping: &AssociationDescriptor,
    ) -> OrmResult<()> {
        let key = match object.get(&mapping.parent_field).filter(|v| !v.is_null()) {
            Some(key) => key.clone(),
            None => return Ok(()),
        };
        let child_name = mapping
            .child_model
            .as_deref()
            .ok_or_else(|| mapping.configuration_error("associations require a child model"))?;
        let child = context
            .registry()
            .get(child_name)
            .ok_or_else(|| mapping.configuration_error("child model is not registered"))?;

        let mut children = context
            .store()
            .query(
                &QueryBuilder::new()
                    .select("*")
                    .from(child.source.as_str())
                    .where_eq(mapping.child_field.as_str(), key),
            )
            .await?;
        if children.is_empty() {
            return Ok(());
        }

        match mapping.cascade {
            CascadeRule::None => Err(OrmError::ReferentialIntegrity {
                model: child.name.clone(),
                attribute: mapping.child_field.clone(),
            }),
            CascadeRule::Null | CascadeRule::Default => {
                debug!(
                    model = %model.name,
                    child = %child.name,
                    rows = children.len(),
                    "cascade: nulling referencing keys"
                );
                for row in children.iter_mut() {
                    row.insert(mapping.child_field.clone(), Value::Null);
                    ObjectState::mark(row, ObjectState::Update);
                }
                context.store().save(&child, &mut children).await
            }
            CascadeRule::Delete => {
                debug!(
                    model = %model.name,
                    child = %child.name,
                    rows = children.len(),
                    "cascade: removing referencing rows"
                );
                context.store().remove(&child, &children).await
            }
        }
    }

    /// Junction touching the removed model on either side: block on
    /// `None`, otherwise remove the junction rows. Relation existence is
    /// binary, so the null and delete cascades coincide here.
    async fn enforce_junction(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &Record,
        mapping: &AssociationDescriptor,
    ) -> OrmResult<()> {
        let adapter = mapping.adapter.as_deref().ok_or_else(|| {
            mapping.configuration_error("junction relations require a backing adapter")
        })?;

        // Which side of the junction is being removed decides the filter
        // column and the key attribute on the object.
        let (key_field, filter_column) = if mapping.parent_model == model.name {
            (&mapping.parent_field, &mapping.object_field)
        } else {
            (&mapping.child_field, &mapping.value_field)
        };
        let key = match object.get(key_field).filter(|v| !v.is_null()) {
            Some(key) => key.clone(),
            None => return Ok(()),
        };

        let link = context.registry().get_or_create(adapter, || {
            mapping.junction_definition_named(adapter)
        });
        let rows = context
            .store()
            .query(
                &QueryBuilder::new()
                    .select("*")
                    .from(adapter)
                    .where_eq(filter_column.as_str(), key),
            )
            .await?;
        if rows.is_empty() {
            return Ok(());
        }

        match mapping.cascade {
            CascadeRule::None => Err(OrmError::ReferentialIntegrity {
                model: mapping
                    .child_model
                    .clone()
                    .unwrap_or_else(|| adapter.to_string()),
                attribute: mapping.attribute_name().to_string(),
            }),
            CascadeRule::Null | CascadeRule::Default | CascadeRule::Delete => {
                debug!(
                    model = %model.name,
                    adapter = %adapter,
                    rows = rows.len(),
                    "cascade: removing junction rows"
                );
                context.store().remove(&link, &rows).await
            }
        }
    }
}

#[async_trait]
impl DataListener for ReferentialIntegrityGuard {
    async fn before_remove(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &Record,
    ) -> OrmResult<()> {
        self.enforce(context, model, object).await
    }
}
