//! Nested Object Listener - Cascading save/delete of embedded objects
//!
//! Applies to attributes flagged `nested`: scalar attributes embed one
//! object whose key the owner carries, array attributes embed a collection
//! of child rows carrying the owner's key. Saves reconcile the embedded
//! state by primary-key diff and persist the unioned batch in one
//! nested-model save call; the transient state marker is stripped from
//! every batched object afterward regardless of outcome.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::context::DataContext;
use crate::error::{OrmError, OrmResult};
use crate::events::DataListener;
use crate::query::QueryBuilder;
use crate::schema::{FieldDef, ModelDef};
use crate::store::{values_equal, ObjectState, Record};

/// Listener cascading saves and deletes into embedded objects
pub struct NestedObjectListener;

impl NestedObjectListener {
    /// Fetch the owner's currently linked key for a scalar nested
    /// attribute, in one query
    async fn current_link(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &Record,
        field: &FieldDef,
    ) -> OrmResult<Option<Value>> {
        let owner_key = match model.key_of(object) {
            Some(key) => key,
            None => return Ok(None),
        };
        let rows = context
            .store()
            .query(
                &QueryBuilder::new()
                    .select(field.name.as_str())
                    .from(model.source.as_str())
                    .where_eq(model.primary_key_name(), owner_key)
                    .limit(1),
            )
            .await?;
        Ok(rows
            .first()
            .and_then(|row| row.get(&field.name))
            .filter(|v| !v.is_null())
            .cloned())
    }

    fn target_model(
        &self,
        context: &DataContext,
        model: &ModelDef,
        field: &FieldDef,
    ) -> OrmResult<std::sync::Arc<ModelDef>> {
        let target_name = field.model_name().ok_or_else(|| {
            OrmError::AssociationConfiguration {
                model: model.name.clone(),
                attribute: field.name.clone(),
                message: "nested attributes must reference a model".to_string(),
            }
        })?;
        context
            .registry()
            .get(target_name)
            .ok_or_else(|| OrmError::AssociationConfiguration {
                model: model.name.clone(),
                attribute: field.name.clone(),
                message: "nested model is not registered".to_string(),
            })
    }

    /// Save one embedded scalar object ahead of the owner, replacing the
    /// owner's attribute with the embedded object's key
    async fn save_scalar_nested(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &mut Record,
        field: &FieldDef,
    ) -> OrmResult<()> {
        let nested = match object.get(&field.name) {
            Some(Value::Object(nested)) => nested.clone(),
            _ => return Ok(()), // already a key, or absent
        };
        let target = self.target_model(context, model, field)?;
        let old_key = self.current_link(context, model, object, field).await?;

        let mut record = nested;
        let incoming_key = target.key_of(&record);
        match incoming_key {
            Some(_) => ObjectState::mark(&mut record, ObjectState::Update),
            None => ObjectState::mark(&mut record, ObjectState::Insert),
        }
        let mut batch = vec![record];

        // A previously linked object the submitted state no longer names
        // is deleted in the same batch.
        if let Some(old_key) = old_key {
            let replaced = incoming_key
                .as_ref()
                .map_or(true, |key| !values_equal(key, &old_key));
            if replaced {
                let mut stale = Record::new();
                stale.insert(target.primary_key_name().to_string(), old_key);
                ObjectState::mark(&mut stale, ObjectState::Delete);
                batch.push(stale);
            }
        }

        let result = context.store().save(&target, &mut batch).await;
        for record in batch.iter_mut() {
            ObjectState::strip(record);
        }
        result?;

        let key = target.key_of(&batch[0]).ok_or_else(|| {
            OrmError::Validation(format!(
                "nested '{}' object was not assigned a key",
                target.name
            ))
        })?;
        object.insert(field.name.clone(), key);
        Ok(())
    }

    /// Reconcile one embedded array after the owner save: diff the
    /// submitted items against the original linked rows by primary key,
    /// then persist inserts, updates, and deletes in one batch
    async fn save_nested_array(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &mut Record,
        field: &FieldDef,
    ) -> OrmResult<()> {
        let items = match object.get(&field.name) {
            Some(Value::Array(items)) => items.clone(),
            _ => return Ok(()),
        };
        let target = self.target_model(context, model, field)?;
        let mapping = model
            .infer_mapping(&field.name, context.registry())
            .ok_or_else(|| OrmError::AttributeResolution {
                model: model.name.clone(),
                attribute: field.name.clone(),
            })?;
        let owner_key = model.key_of(object).ok_or_else(|| {
            OrmError::Validation(format!(
                "cannot save nested '{}' items without the owner key",
                field.name
            ))
        })?;
        let foreign_key = mapping.child_field.clone();

        // The full original nested array, in one query.
        let original = context
            .store()
            .query(
                &QueryBuilder::new()
                    .select("*")
                    .from(target.source.as_str())
                    .where_eq(foreign_key.as_str(), owner_key.clone()),
            )
            .await?;

        let mut batch: Vec<Record> = Vec::new();
        let mut seen_keys: Vec<Value> = Vec::new();
        for item in &items {
            let submitted = match item {
                Value::Object(submitted) => submitted.clone(),
                _ => {
                    return Err(OrmError::Validation(format!(
                        "nested '{}' items must be objects",
                        field.name
                    )))
                }
            };
            let mut record = submitted;
            match target.key_of(&record) {
                Some(key)
                    if original.iter().any(|row| {
                        matches!(
                            row.get(target.primary_key_name()),
                            Some(v) if values_equal(v, &key)
                        )
                    }) =>
                {
                    seen_keys.push(key);
                    record.insert(foreign_key.clone(), owner_key.clone());
                    ObjectState::mark(&mut record, ObjectState::Update);
                }
                Some(_stale) => {
                    // Present only in the submitted state with an unknown
                    // identifier: strip it and insert fresh.
                    record.remove(target.primary_key_name());
                    record.insert(foreign_key.clone(), owner_key.clone());
                    ObjectState::mark(&mut record, ObjectState::Insert);
                }
                None => {
                    record.insert(foreign_key.clone(), owner_key.clone());
                    ObjectState::mark(&mut record, ObjectState::Insert);
                }
            }
            batch.push(record);
        }
        for row in &original {
            let key = match target.key_of(row) {
                Some(key) => key,
                None => continue,
            };
            if !seen_keys.iter().any(|seen| values_equal(seen, &key)) {
                let mut removed = row.clone();
                ObjectState::mark(&mut removed, ObjectState::Delete);
                batch.push(removed);
            }
        }

        let survivors = items.len();
        let result = context.store().save(&target, &mut batch).await;
        for record in batch.iter_mut() {
            ObjectState::strip(record);
        }
        result?;

        object.insert(
            field.name.clone(),
            Value::Array(
                batch[..survivors]
                    .iter()
                    .cloned()
                    .map(Value::Object)
                    .collect(),
            ),
        );
        Ok(())
    }

    /// Scalar nested delete: null the owning row's foreign key first, then
    /// remove the nested object
    async fn remove_scalar_nested(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &Record,
        field: &FieldDef,
    ) -> OrmResult<()> {
        let target = self.target_model(context, model, field)?;
        let linked_key = match object.get(&field.name) {
            Some(Value::Object(nested)) => target.key_of(nested),
            Some(value) if !value.is_null() => Some(value.clone()),
            _ => self.current_link(context, model, object, field).await?,
        };
        let linked_key = match linked_key {
            Some(key) => key,
            None => return Ok(()),
        };

        if let Some(owner_key) = model.key_of(object) {
            let mut patch = Record::new();
            patch.insert(model.primary_key_name().to_string(), owner_key);
            patch.insert(field.name.clone(), Value::Null);
            ObjectState::mark(&mut patch, ObjectState::Update);
            context
                .store()
                .save(model, std::slice::from_mut(&mut patch))
                .await?;
        }

        let rows = context
            .store()
            .query(
                &QueryBuilder::new()
                    .select("*")
                    .from(target.source.as_str())
                    .where_eq(target.primary_key_name(), linked_key)
                    .limit(1),
            )
            .await?;
        if rows.is_empty() {
            return Ok(());
        }
        context.store().remove(&target, &rows).await
    }

    /// Array nested delete: clear the association entirely, then remove
    /// every previously linked object. A failure in the removal phase
    /// after the clear already succeeded is swallowed.
    async fn remove_nested_array(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &Record,
        field: &FieldDef,
    ) -> OrmResult<()> {
        let target = self.target_model(context, model, field)?;
        let mapping = model
            .infer_mapping(&field.name, context.registry())
            .ok_or_else(|| OrmError::AttributeResolution {
                model: model.name.clone(),
                attribute: field.name.clone(),
            })?;
        let owner_key = match model.key_of(object) {
            Some(key) => key,
            None => return Ok(()),
        };
        let foreign_key = mapping.child_field.clone();

        let children = context
            .store()
            .query(
                &QueryBuilder::new()
                    .select("*")
                    .from(target.source.as_str())
                    .where_eq(foreign_key.as_str(), owner_key),
            )
            .await?;
        if children.is_empty() {
            return Ok(());
        }

        let mut cleared = children.clone();
        for row in cleared.iter_mut() {
            row.insert(foreign_key.clone(), Value::Null);
            ObjectState::mark(row, ObjectState::Update);
        }
        context.store().save(&target, &mut cleared).await?;

        if let Err(err) = context.store().remove(&target, &children).await {
            warn!(
                model = %target.name,
                error = %err,
                "nested cleanup failed after association clear; continuing"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl DataListener for NestedObjectListener {
    async fn before_save(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &mut Record,
    ) -> OrmResult<()> {
        for field in model.nested_fields() {
            if !field.many {
                self.save_scalar_nested(context, model, object, field)
                    .await?;
            }
        }
        Ok(())
    }

    async fn after_save(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &mut Record,
    ) -> OrmResult<()> {
        for field in model.nested_fields() {
            if field.many {
                self.save_nested_array(context, model, object, field).await?;
            }
        }
        Ok(())
    }

    async fn before_remove(
        &self,
        context: &DataContext,
        model: &ModelDef,
        object: &Record,
    ) -> OrmResult<()> {
        for field in model.nested_fields() {
            if field.many {
                self.remove_nested_array(context, model, object, field)
                    .await?;
            } else {
                self.remove_scalar_nested(context, model, object, field)
                    .await?;
            }
        }
        Ok(())
    }
}
