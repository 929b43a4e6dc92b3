//! # tether-orm: Relationship Resolution Engine
//!
//! The relationship/association layer of an object-relational mapping
//! stack: attribute path expressions become join expansions, relation
//! handles mutate foreign-key/junction/tag links, a bulk loader resolves
//! related objects for whole parent sets without N+1 queries, and listener
//! pipelines enforce referential integrity and cascade saves/deletes into
//! embedded objects.
//!
//! Storage execution is an injected boundary: the engine composes queries
//! and record batches and hands them to a `DataStore` implementation.

pub mod context;
pub mod error;
pub mod events;
pub mod integrity;
pub mod loading;
pub mod nested;
pub mod query;
pub mod relations;
pub mod resolver;
pub mod schema;
pub mod store;

#[cfg(test)]
mod scenario_tests;

// Re-export core traits and types
pub use context::*;
pub use error::*;
pub use events::*;
pub use integrity::*;
pub use loading::*;
pub use nested::*;
pub use query::*;
pub use relations::*;
pub use resolver::*;
pub use schema::*;
pub use store::*;
