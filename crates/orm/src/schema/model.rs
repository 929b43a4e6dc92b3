//! Model Definitions - Static schema for dynamic data models
//!
//! Model schemas are authored externally and arrive here as already-built
//! `ModelDef` values. Attribute access goes through typed field accessors
//! rather than reflection over arbitrary object maps.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::descriptor::{AssociationDescriptor, Multiplicity};
use super::field::FieldDef;
use super::registry::ModelRegistry;
use crate::store::Record;

/// Generate the conventional foreign key attribute for a model name
pub fn default_foreign_key(model_name: &str) -> String {
    format!("{}_id", model_name.to_lowercase())
}

/// Generate the conventional adapter name for a collection attribute
pub fn default_adapter_name(model_name: &str, attribute: &str) -> String {
    let mut chars = attribute.chars();
    let capitalized = match chars.next() {
        Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    };
    format!("{}{}", model_name, capitalized)
}

/// Static definition of one data model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    /// Model name
    pub name: String,

    /// Backing table/adapter name
    pub source: String,

    /// Declared attributes, in declaration order
    pub fields: Vec<FieldDef>,

    /// Explicitly declared association descriptors, keyed by attribute name
    pub mappings: HashMap<String, AssociationDescriptor>,
}

impl ModelDef {
    /// Create a new model definition
    pub fn new(name: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            fields: Vec::new(),
            mappings: HashMap::new(),
        }
    }

    /// Append a field definition
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare an association descriptor for an attribute
    pub fn with_mapping(mut self, attribute: &str, descriptor: AssociationDescriptor) -> Self {
        self.mappings.insert(attribute.to_string(), descriptor);
        self
    }

    /// Typed accessor for a declared field
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns true if the attribute is declared on this model
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// The primary key field, when one is declared
    pub fn primary_key(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary)
    }

    /// The primary key attribute name, defaulting to `id`
    pub fn primary_key_name(&self) -> &str {
        self.primary_key().map(|f| f.name.as_str()).unwrap_or("id")
    }

    /// Extract the primary key value from a record, if present and non-null
    pub fn key_of(&self, record: &Record) -> Option<Value> {
        record
            .get(self.primary_key_name())
            .filter(|v| !v.is_null())
            .cloned()
    }

    /// Fields flagged as embedded objects or arrays
    pub fn nested_fields(&self) -> Vec<&FieldDef> {
        self.fields.iter().filter(|f| f.nested).collect()
    }

    /// Resolve the association descriptor for an attribute.
    ///
    /// An explicitly declared mapping wins. Otherwise a default descriptor
    /// is synthesized for fields whose type names a registered model: a
    /// reference association for scalar attributes (this model holds the
    /// foreign key), a foreign-key collection for nested arrays (children
    /// hold the key), a junction for plain collections, and a tag junction
    /// for primitive-typed collections.
    pub fn infer_mapping(
        &self,
        attribute: &str,
        registry: &ModelRegistry,
    ) -> Option<AssociationDescriptor> {
        if let Some(declared) = self.mappings.get(attribute) {
            let mut descriptor = declared.clone();
            if descriptor.refers_to.is_none() {
                descriptor.refers_to = Some(attribute.to_string());
            }
            return Some(descriptor);
        }

        let field = self.field(attribute)?;
        match field.model_name() {
            Some(target_name) => {
                let target = registry.get(target_name)?;
                if !field.many {
                    // This model holds the key of the referenced object.
                    let multiplicity = if field.nullable {
                        Multiplicity::ZeroOrOne
                    } else {
                        Multiplicity::One
                    };
                    Some(
                        AssociationDescriptor::association(
                            &target.name,
                            target.primary_key_name(),
                            &self.name,
                            attribute,
                        )
                        .with_multiplicity(multiplicity)
                        .with_refers_to(attribute),
                    )
                } else if field.nested {
                    // Embedded arrays: child rows carry the owner's key.
                    Some(
                        AssociationDescriptor::association(
                            &self.name,
                            self.primary_key_name(),
                            &target.name,
                            &default_foreign_key(&self.name),
                        )
                        .with_refers_to(attribute),
                    )
                } else {
                    Some(
                        AssociationDescriptor::junction(
                            &self.name,
                            self.primary_key_name(),
                            &target.name,
                            target.primary_key_name(),
                            &default_adapter_name(&self.name, attribute),
                        )
                        .with_refers_to(attribute),
                    )
                }
            }
            None if field.many => Some(
                AssociationDescriptor::tag(
                    &self.name,
                    self.primary_key_name(),
                    &default_adapter_name(&self.name, attribute),
                )
                .with_refers_to(attribute),
            ),
            None => None,
        }
    }
}
