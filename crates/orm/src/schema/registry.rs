//! Model Registry - Runtime schema storage with single-writer arbitration

use std::sync::Arc;

use dashmap::DashMap;

use super::descriptor::{AssociationDescriptor, AssociationKind};
use super::model::ModelDef;

/// Thread-safe registry of model definitions.
///
/// Synthesized junction/tag definitions are cached here the first time a
/// given adapter name is referenced and reused afterwards. Population goes
/// through the concurrent map's entry API, so two tasks racing on first use
/// of the same adapter name still observe exactly one definition.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Arc<DashMap<String, Arc<ModelDef>>>,
}

impl ModelRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            models: Arc::new(DashMap::new()),
        }
    }

    /// Register a model definition, replacing any previous definition of
    /// the same name
    pub fn register(&self, definition: ModelDef) -> Arc<ModelDef> {
        let definition = Arc::new(definition);
        self.models
            .insert(definition.name.clone(), definition.clone());
        definition
    }

    /// Get a model definition by name
    pub fn get(&self, name: &str) -> Option<Arc<ModelDef>> {
        self.models.get(name).map(|entry| entry.value().clone())
    }

    /// Returns true if a model of the given name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Get the definition for `name`, creating and caching it from
    /// `factory` on first use. The entry API arbitrates concurrent first
    /// use: exactly one factory result is kept per key.
    pub fn get_or_create<F>(&self, name: &str, factory: F) -> Arc<ModelDef>
    where
        F: FnOnce() -> ModelDef,
    {
        self.models
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(factory()))
            .value()
            .clone()
    }

    /// Snapshot of all registered definitions
    pub fn models(&self) -> Vec<Arc<ModelDef>> {
        self.models
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Collect every association descriptor, declared or inferable, that
    /// references the given model: associations where it is the referenced
    /// parent and junctions touching it on either side. Used by the
    /// pre-delete integrity guard.
    pub fn mappings_referencing(&self, model_name: &str) -> Vec<AssociationDescriptor> {
        let mut found: Vec<AssociationDescriptor> = Vec::new();
        for model in self.models() {
            let mut candidates: Vec<AssociationDescriptor> = Vec::new();
            for field in &model.fields {
                if let Some(descriptor) = model.infer_mapping(&field.name, self) {
                    candidates.push(descriptor);
                }
            }
            for (attribute, _) in model.mappings.iter() {
                if model.has_field(attribute) {
                    continue; // already collected through the field scan
                }
                if let Some(descriptor) = model.infer_mapping(attribute, self) {
                    candidates.push(descriptor);
                }
            }
            for descriptor in candidates {
                let touches = match descriptor.kind {
                    AssociationKind::Association => descriptor.parent_model == model_name,
                    AssociationKind::Junction => {
                        descriptor.parent_model == model_name
                            || descriptor.child_model.as_deref() == Some(model_name)
                    }
                };
                if touches && !found.contains(&descriptor) {
                    found.push(descriptor);
                }
            }
        }
        found
    }
}
