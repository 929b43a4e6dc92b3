//! Field Definitions - Typed schema accessors for model attributes

use serde::{Deserialize, Serialize};

/// Storage type of a model attribute. A `Model` type names another
/// registered model and makes the attribute a relation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// Auto-incrementing integer, usually the primary key
    Counter,
    Integer,
    Text,
    Boolean,
    Float,
    Json,
    /// Reference to another model by name
    Model(String),
}

impl FieldType {
    /// Returns true if this type names another model
    pub fn is_model(&self) -> bool {
        matches!(self, Self::Model(_))
    }
}

/// Declared attribute of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Attribute name
    pub name: String,

    /// Storage type, or the related model for relation endpoints
    pub field_type: FieldType,

    /// Whether NULL values are accepted
    pub nullable: bool,

    /// Whether this attribute is the primary key
    pub primary: bool,

    /// Whether this attribute holds a collection of values
    pub many: bool,

    /// Whether this attribute is an embedded ("nested") object or array
    pub nested: bool,
}

impl FieldDef {
    /// Create a new field definition
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            nullable: true,
            primary: false,
            many: false,
            nested: false,
        }
    }

    /// Create the conventional auto-incrementing primary key field
    pub fn primary_counter(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Counter,
            nullable: false,
            primary: true,
            many: false,
            nested: false,
        }
    }

    /// Mark the field as non-nullable
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the field as the primary key
    pub fn with_primary(mut self) -> Self {
        self.primary = true;
        self.nullable = false;
        self
    }

    /// Mark the field as a collection attribute
    pub fn with_many(mut self) -> Self {
        self.many = true;
        self
    }

    /// Mark the field as an embedded object or array
    pub fn with_nested(mut self) -> Self {
        self.nested = true;
        self
    }

    /// The related model name, when the field type references a model
    pub fn model_name(&self) -> Option<&str> {
        match &self.field_type {
            FieldType::Model(name) => Some(name.as_str()),
            _ => None,
        }
    }
}
