//! Schema System - Typed model definitions and association metadata
//!
//! This module holds the static schema the engine resolves relationships
//! against:
//!
//! - `field`: typed attribute definitions
//! - `model`: model definitions with schema-keyed accessors
//! - `descriptor`: immutable association descriptors
//! - `registry`: runtime registry with single-writer definition caching

pub mod descriptor;
pub mod field;
pub mod model;
pub mod registry;

pub use descriptor::{AssociationDescriptor, AssociationKind, CascadeRule, Multiplicity};
pub use field::{FieldDef, FieldType};
pub use model::{default_adapter_name, default_foreign_key, ModelDef};
pub use registry::ModelRegistry;
