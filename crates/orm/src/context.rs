//! Data Context - Composition root for the relationship engine
//!
//! Owns the model registry, the injected store, and the listener pipeline.
//! Save and remove orchestration runs here: listeners fire sequentially
//! around the store call, with nested-object handling registered ahead of
//! the referential integrity guard so embedded objects are reconciled
//! before cascade rules are checked.

use std::sync::Arc;

use crate::error::{OrmError, OrmResult};
use crate::events::ListenerPipeline;
use crate::integrity::ReferentialIntegrityGuard;
use crate::nested::NestedObjectListener;
use crate::relations::{ForeignKeyRelation, JunctionRelation, Relation, TagRelation};
use crate::schema::{AssociationKind, ModelDef, ModelRegistry};
use crate::store::{DataStore, ObjectState, Record};

/// Shared engine state handed to handles, loaders, and listeners
#[derive(Clone)]
pub struct DataContext {
    registry: ModelRegistry,
    store: Arc<dyn DataStore>,
    pipeline: Arc<ListenerPipeline>,
}

impl DataContext {
    /// Create a context with the default listener pipeline
    pub fn new(registry: ModelRegistry, store: Arc<dyn DataStore>) -> Self {
        let mut pipeline = ListenerPipeline::new();
        pipeline.register(Box::new(NestedObjectListener));
        pipeline.register(Box::new(ReferentialIntegrityGuard));
        Self {
            registry,
            store,
            pipeline: Arc::new(pipeline),
        }
    }

    /// Create a context with a custom listener pipeline
    pub fn with_pipeline(
        registry: ModelRegistry,
        store: Arc<dyn DataStore>,
        pipeline: ListenerPipeline,
    ) -> Self {
        Self {
            registry,
            store,
            pipeline: Arc::new(pipeline),
        }
    }

    /// The model registry
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The injected storage adapter
    pub fn store(&self) -> &dyn DataStore {
        self.store.as_ref()
    }

    /// Look up a model definition by name
    pub fn model(&self, name: &str) -> OrmResult<Arc<ModelDef>> {
        self.registry
            .get(name)
            .ok_or_else(|| OrmError::Query(format!("unknown model '{}'", name)))
    }

    /// Save one object against a model, running the listener pipeline
    /// around the store call. The state marker is stripped from the object
    /// regardless of outcome.
    pub async fn save(&self, model_name: &str, object: &mut Record) -> OrmResult<()> {
        let model = self.model(model_name)?;
        let result = self.save_inner(&model, object).await;
        ObjectState::strip(object);
        result
    }

    async fn save_inner(&self, model: &Arc<ModelDef>, object: &mut Record) -> OrmResult<()> {
        self.pipeline
            .trigger_before_save(self, model, object)
            .await?;
        self.store
            .save(model, std::slice::from_mut(object))
            .await?;
        self.pipeline.trigger_after_save(self, model, object).await
    }

    /// Remove one object, running pre-delete listeners (nested cleanup and
    /// the referential integrity guard) before the store call
    pub async fn remove(&self, model_name: &str, object: &Record) -> OrmResult<()> {
        let model = self.model(model_name)?;
        self.pipeline
            .trigger_before_remove(self, &model, object)
            .await?;
        self.store.remove(&model, std::slice::from_ref(object)).await?;
        self.pipeline
            .trigger_after_remove(self, &model, object)
            .await
    }

    /// Build the relation handle for one parent object and one attribute.
    /// The variant is picked from the resolved descriptor: foreign-key
    /// association, junction, or tag.
    pub fn relation(
        &self,
        model_name: &str,
        parent: &Record,
        attribute: &str,
    ) -> OrmResult<Box<dyn Relation>> {
        let model = self.model(model_name)?;
        let mapping = model
            .infer_mapping(attribute, &self.registry)
            .ok_or_else(|| OrmError::AttributeResolution {
                model: model.name.clone(),
                attribute: attribute.to_string(),
            })?;
        match mapping.kind {
            AssociationKind::Association => Ok(Box::new(ForeignKeyRelation::new(
                self.clone(),
                parent.clone(),
                mapping,
            )?)),
            AssociationKind::Junction if mapping.is_tag() => Ok(Box::new(TagRelation::new(
                self.clone(),
                parent.clone(),
                mapping,
            )?)),
            AssociationKind::Junction => Ok(Box::new(JunctionRelation::new(
                self.clone(),
                parent.clone(),
                mapping,
            )?)),
        }
    }
}
