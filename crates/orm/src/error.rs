//! Error types for the relationship engine
//!
//! Provides structured error handling for attribute resolution, relation
//! mutation, cascade enforcement, and nested saves. Every error carries a
//! stable machine code consumed by external error-reporting layers.

use std::fmt;

/// Result type alias for engine operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for relationship engine operations
#[derive(Debug, Clone, PartialEq)]
pub enum OrmError {
    /// An attribute path segment could not be resolved on a model
    AttributeResolution { model: String, attribute: String },
    /// The association type is not eligible for traversal, filter, or sort
    UnsupportedAssociation { model: String, attribute: String },
    /// A cascade delete was blocked by existing dependents
    ReferentialIntegrity { model: String, attribute: String },
    /// An association descriptor is missing or invalid
    AssociationConfiguration {
        model: String,
        attribute: String,
        message: String,
    },
    /// More than one match was found where exactly one was expected
    MultiplicityViolation { model: String, attribute: String },
    /// Validation failed during a (possibly nested) save
    Validation(String),
    /// Storage adapter error
    Database(String),
    /// Query building or execution error
    Query(String),
    /// Serialization/deserialization error
    Serialization(String),
}

impl OrmError {
    /// Stable machine code for the external error-reporting layer
    pub fn code(&self) -> &'static str {
        match self {
            OrmError::AttributeResolution { .. } => "E_ATTR",
            OrmError::UnsupportedAssociation { .. } => "EASSOCIATION",
            OrmError::ReferentialIntegrity { .. } => "EFKEY",
            OrmError::AssociationConfiguration { .. } => "EJUNC",
            OrmError::MultiplicityViolation { .. } => "EMULTI",
            OrmError::Validation(_) => "EVALID",
            OrmError::Database(_) => "EDATA",
            OrmError::Query(_) => "EQUERY",
            OrmError::Serialization(_) => "ESERDE",
        }
    }

    /// Offending model name, when the error names one
    pub fn model(&self) -> Option<&str> {
        match self {
            OrmError::AttributeResolution { model, .. }
            | OrmError::UnsupportedAssociation { model, .. }
            | OrmError::ReferentialIntegrity { model, .. }
            | OrmError::AssociationConfiguration { model, .. }
            | OrmError::MultiplicityViolation { model, .. } => Some(model),
            _ => None,
        }
    }

    /// Offending attribute name, when the error names one
    pub fn attribute(&self) -> Option<&str> {
        match self {
            OrmError::AttributeResolution { attribute, .. }
            | OrmError::UnsupportedAssociation { attribute, .. }
            | OrmError::ReferentialIntegrity { attribute, .. }
            | OrmError::AssociationConfiguration { attribute, .. }
            | OrmError::MultiplicityViolation { attribute, .. } => Some(attribute),
            _ => None,
        }
    }
}

impl fmt::Display for OrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrmError::AttributeResolution { model, attribute } => write!(
                f,
                "Attribute '{}' cannot be resolved on model '{}'",
                attribute, model
            ),
            OrmError::UnsupportedAssociation { model, attribute } => write!(
                f,
                "Association '{}' on model '{}' is not supported for this operation",
                attribute, model
            ),
            OrmError::ReferentialIntegrity { model, attribute } => write!(
                f,
                "The object cannot be deleted because it is referenced by '{}' objects through '{}'",
                model, attribute
            ),
            OrmError::AssociationConfiguration {
                model,
                attribute,
                message,
            } => write!(
                f,
                "Invalid association configuration for '{}' on model '{}': {}",
                attribute, model, message
            ),
            OrmError::MultiplicityViolation { model, attribute } => write!(
                f,
                "More than one '{}' object matched through '{}' where exactly one was expected",
                model, attribute
            ),
            OrmError::Validation(msg) => write!(f, "Validation error: {}", msg),
            OrmError::Database(msg) => write!(f, "Database error: {}", msg),
            OrmError::Query(msg) => write!(f, "Query error: {}", msg),
            OrmError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for OrmError {}

// Convert from serde_json errors
impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}

// Convert from anyhow errors raised by adapter implementations
impl From<anyhow::Error> for OrmError {
    fn from(err: anyhow::Error) -> Self {
        OrmError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = OrmError::ReferentialIntegrity {
            model: "Post".to_string(),
            attribute: "owner".to_string(),
        };
        assert_eq!(err.code(), "EFKEY");
        assert_eq!(err.model(), Some("Post"));
        assert_eq!(err.attribute(), Some("owner"));

        assert_eq!(
            OrmError::AttributeResolution {
                model: "User".to_string(),
                attribute: "missing".to_string(),
            }
            .code(),
            "E_ATTR"
        );
        assert_eq!(OrmError::Validation("bad".to_string()).code(), "EVALID");
    }

    #[test]
    fn test_error_display_names_blocking_model() {
        let err = OrmError::ReferentialIntegrity {
            model: "Post".to_string(),
            attribute: "owner".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("Post"));
        assert!(message.contains("owner"));
    }

    #[test]
    fn test_model_and_attribute_absent_for_plain_errors() {
        let err = OrmError::Database("boom".to_string());
        assert!(err.model().is_none());
        assert!(err.attribute().is_none());
    }
}
