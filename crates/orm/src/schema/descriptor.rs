//! Association Descriptors - Immutable metadata describing one relationship

use serde::{Deserialize, Serialize};

use super::field::{FieldDef, FieldType};
use super::model::ModelDef;
use crate::error::{OrmError, OrmResult};

/// Defines how two models are related
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationKind {
    /// Foreign-key relationship: a child row holds a field referencing a
    /// parent row's key
    Association,
    /// Many-to-many relationship realized via a separate adapter holding
    /// (object, value) key pairs
    Junction,
}

/// Cardinality constraint on a relation end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Multiplicity {
    One,
    ZeroOrOne,
    Many,
}

impl Multiplicity {
    /// Returns true if this end resolves to a collection of values
    pub fn is_collection(self) -> bool {
        matches!(self, Self::Many)
    }
}

/// Action taken on dependents when a referenced object is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CascadeRule {
    /// Block the delete while dependents exist
    None,
    /// Null the dependents' foreign key, then proceed
    Null,
    /// Remove the dependents, then proceed
    Delete,
    /// Adapter default; behaves as `Null` for associations
    Default,
}

/// Immutable metadata describing one relationship between models.
///
/// For `Association`, `child_field` is an attribute of `child_model`
/// referencing `parent_field` on `parent_model`. For `Junction`, `adapter`
/// names a backing store with columns `{id, object_field, value_field}` and
/// a uniqueness constraint on `(object_field, value_field)`, or on
/// `object_field` alone when multiplicity is `One`/`ZeroOrOne`. Tag
/// relations are junctions whose value side is a scalar: `child_model` is
/// `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationDescriptor {
    /// The model holding the referenced key
    pub parent_model: String,

    /// The related model; `None` for tag relations
    pub child_model: Option<String>,

    /// The referenced attribute on the parent model
    pub parent_field: String,

    /// The referencing attribute on the child model
    pub child_field: String,

    /// The kind of relationship
    pub kind: AssociationKind,

    /// Backing store name for junction relations
    pub adapter: Option<String>,

    /// Junction column holding the parent-side key
    pub object_field: String,

    /// Junction column holding the child-side key or tag value
    pub value_field: String,

    /// Optional attribute name this mapping was declared under
    pub refers_to: Option<String>,

    /// Cascade policy applied when the referenced parent is deleted
    pub cascade: CascadeRule,

    /// Cardinality of the relation end seen from the parent
    pub multiplicity: Multiplicity,
}

impl AssociationDescriptor {
    /// Create a foreign-key association descriptor
    pub fn association(
        parent_model: &str,
        parent_field: &str,
        child_model: &str,
        child_field: &str,
    ) -> Self {
        Self {
            parent_model: parent_model.to_string(),
            child_model: Some(child_model.to_string()),
            parent_field: parent_field.to_string(),
            child_field: child_field.to_string(),
            kind: AssociationKind::Association,
            adapter: None,
            object_field: "object".to_string(),
            value_field: "value".to_string(),
            refers_to: None,
            cascade: CascadeRule::None,
            multiplicity: Multiplicity::Many,
        }
    }

    /// Create a many-to-many junction descriptor backed by `adapter`
    pub fn junction(
        parent_model: &str,
        parent_field: &str,
        child_model: &str,
        child_field: &str,
        adapter: &str,
    ) -> Self {
        Self {
            parent_model: parent_model.to_string(),
            child_model: Some(child_model.to_string()),
            parent_field: parent_field.to_string(),
            child_field: child_field.to_string(),
            kind: AssociationKind::Junction,
            adapter: Some(adapter.to_string()),
            object_field: "object".to_string(),
            value_field: "value".to_string(),
            refers_to: None,
            cascade: CascadeRule::None,
            multiplicity: Multiplicity::Many,
        }
    }

    /// Create a tag descriptor: a junction whose value side is a scalar
    pub fn tag(parent_model: &str, parent_field: &str, adapter: &str) -> Self {
        Self {
            parent_model: parent_model.to_string(),
            child_model: None,
            parent_field: parent_field.to_string(),
            child_field: "value".to_string(),
            kind: AssociationKind::Junction,
            adapter: Some(adapter.to_string()),
            object_field: "object".to_string(),
            value_field: "value".to_string(),
            refers_to: None,
            cascade: CascadeRule::None,
            multiplicity: Multiplicity::Many,
        }
    }

    /// Set the multiplicity of the relation end
    pub fn with_multiplicity(mut self, multiplicity: Multiplicity) -> Self {
        self.multiplicity = multiplicity;
        self
    }

    /// Set the cascade policy
    pub fn with_cascade(mut self, cascade: CascadeRule) -> Self {
        self.cascade = cascade;
        self
    }

    /// Record the attribute name this mapping was declared under
    pub fn with_refers_to(mut self, attribute: &str) -> Self {
        self.refers_to = Some(attribute.to_string());
        self
    }

    /// Override the junction column holding the parent-side key
    pub fn with_object_field(mut self, field: &str) -> Self {
        self.object_field = field.to_string();
        self
    }

    /// Override the junction column holding the child-side key or tag value
    pub fn with_value_field(mut self, field: &str) -> Self {
        self.value_field = field.to_string();
        self
    }

    /// Returns true for tag relations (junction with a scalar value side)
    pub fn is_tag(&self) -> bool {
        self.kind == AssociationKind::Junction && self.child_model.is_none()
    }

    /// The attribute name used in error reporting
    pub fn attribute_name(&self) -> &str {
        self.refers_to.as_deref().unwrap_or(&self.child_field)
    }

    /// Validate the descriptor for internal consistency
    pub fn validate(&self) -> OrmResult<()> {
        if self.parent_model.is_empty() || self.parent_field.is_empty() {
            return Err(self.configuration_error("parent model and field are required"));
        }
        match self.kind {
            AssociationKind::Association => {
                if self.child_model.is_none() {
                    return Err(self.configuration_error("associations require a child model"));
                }
                if self.child_field.is_empty() {
                    return Err(self.configuration_error("associations require a child field"));
                }
            }
            AssociationKind::Junction => {
                if self.adapter.is_none() {
                    return Err(
                        self.configuration_error("junction relations require a backing adapter")
                    );
                }
                if self.object_field == self.value_field {
                    return Err(self.configuration_error(
                        "junction object and value columns must be different",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Synthesize the backing model definition for a junction or tag
    /// relation. The definition carries the conventional `{id, object,
    /// value}` columns; the value column is a scalar for tag relations and
    /// a key reference otherwise.
    pub fn junction_definition(&self) -> OrmResult<ModelDef> {
        let adapter = self
            .adapter
            .as_deref()
            .ok_or_else(|| self.configuration_error("junction relations require a backing adapter"))?;
        Ok(self.junction_definition_named(adapter))
    }

    pub(crate) fn junction_definition_named(&self, adapter: &str) -> ModelDef {
        let value_type = if self.is_tag() {
            FieldType::Json
        } else {
            FieldType::Integer
        };
        ModelDef::new(adapter, adapter)
            .with_field(FieldDef::primary_counter("id"))
            .with_field(FieldDef::new(&self.object_field, FieldType::Integer).not_null())
            .with_field(FieldDef::new(&self.value_field, value_type).not_null())
    }

    pub(crate) fn configuration_error(&self, message: &str) -> OrmError {
        OrmError::AssociationConfiguration {
            model: self.parent_model.clone(),
            attribute: self.attribute_name().to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_association_descriptor_defaults() {
        let descriptor = AssociationDescriptor::association("User", "id", "Post", "owner");

        assert_eq!(descriptor.kind, AssociationKind::Association);
        assert_eq!(descriptor.child_model.as_deref(), Some("Post"));
        assert_eq!(descriptor.cascade, CascadeRule::None);
        assert_eq!(descriptor.multiplicity, Multiplicity::Many);
        assert!(!descriptor.is_tag());
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_junction_descriptor_validation() {
        let descriptor = AssociationDescriptor::junction("User", "id", "Group", "id", "UserGroups");
        assert!(descriptor.validate().is_ok());

        let broken = AssociationDescriptor::junction("User", "id", "Group", "id", "UserGroups")
            .with_object_field("value");
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_tag_descriptor() {
        let descriptor = AssociationDescriptor::tag("Person", "id", "PersonTags")
            .with_multiplicity(Multiplicity::Many);

        assert!(descriptor.is_tag());
        assert!(descriptor.validate().is_ok());

        let definition = descriptor.junction_definition().unwrap();
        assert_eq!(definition.name, "PersonTags");
        assert!(definition.field("object").is_some());
        assert!(definition.field("value").is_some());
    }

    #[test]
    fn test_junction_definition_requires_adapter() {
        let mut descriptor = AssociationDescriptor::junction("User", "id", "Group", "id", "X");
        descriptor.adapter = None;
        let err = descriptor.junction_definition().unwrap_err();
        assert_eq!(err.code(), "EJUNC");
    }
}
