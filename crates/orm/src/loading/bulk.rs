//! Bulk Association Loader - Related objects for a set of parents
//!
//! Resolves one descriptor for all parents in a constant number of queries
//! instead of one per parent. Results align with input order; duplicate
//! parent keys each independently receive their own matched set.

use serde_json::Value;
use tracing::debug;

use super::config::{BulkLoadConfig, LoadStrategy};
use crate::context::DataContext;
use crate::error::{OrmError, OrmResult};
use crate::query::QueryBuilder;
use crate::schema::{AssociationDescriptor, AssociationKind, Multiplicity};
use crate::store::{distinct_values, values_equal, Record};

/// Column carrying the parent key out of the optimized sub-query
const REF_COLUMN: &str = "__object";

/// Batched loader bound to one descriptor
pub struct BulkAssociationLoader {
    context: DataContext,
    descriptor: AssociationDescriptor,
    config: BulkLoadConfig,
}

impl BulkAssociationLoader {
    /// Create a loader with the default configuration
    pub fn new(context: DataContext, descriptor: AssociationDescriptor) -> Self {
        Self {
            context,
            descriptor,
            config: BulkLoadConfig::default(),
        }
    }

    /// Override the loading configuration
    pub fn with_config(mut self, config: BulkLoadConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve the related set for every parent. The result aligns with
    /// input order: `Many` yields an array (possibly empty), `One` and
    /// `ZeroOrOne` yield a single value or `Null`.
    pub async fn load(&self, parents: &[Record]) -> OrmResult<Vec<Value>> {
        if parents.is_empty() {
            return Ok(Vec::new());
        }

        let parent_keys: Vec<Value> = parents
            .iter()
            .map(|parent| {
                parent
                    .get(&self.descriptor.parent_field)
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect();
        let key_set = distinct_values(parent_keys.iter().cloned());

        match self.descriptor.kind {
            AssociationKind::Association => self.load_association(&parent_keys, &key_set).await,
            AssociationKind::Junction => match self.config.strategy {
                LoadStrategy::Optimized if !self.descriptor.is_tag() => {
                    self.load_junction_optimized(&parent_keys, &key_set).await
                }
                // Tag relations have no target model to join, they always
                // load through the key-set path.
                _ => self.load_junction_naive(&parent_keys, &key_set).await,
            },
        }
    }

    /// Load and write each result into its parent record under `attribute`
    pub async fn attach(&self, parents: &mut [Record], attribute: &str) -> OrmResult<()> {
        let values = self.load(parents).await?;
        for (parent, value) in parents.iter_mut().zip(values) {
            parent.insert(attribute.to_string(), value);
        }
        Ok(())
    }

    /// The single optimized-mode query for the given parent-key set
    pub fn optimized_query(&self, parent_keys: &[Value]) -> OrmResult<QueryBuilder> {
        self.optimized_query_avoiding(parent_keys, &[])
    }

    /// The optimized-mode query with its sub-query alias chosen to avoid
    /// the caller-supplied aliases
    pub fn optimized_query_avoiding(
        &self,
        parent_keys: &[Value],
        taken: &[&str],
    ) -> OrmResult<QueryBuilder> {
        let adapter = self.descriptor.adapter.as_deref().ok_or_else(|| {
            self.descriptor
                .configuration_error("junction relations require a backing adapter")
        })?;
        let child = self.child_model()?;

        let mut index = 0usize;
        let mut alias = format!("link{}", index);
        while taken.contains(&alias.as_str()) || alias == child.source || alias == adapter {
            index += 1;
            alias = format!("link{}", index);
        }

        let subquery = QueryBuilder::new()
            .select(self.descriptor.object_field.as_str())
            .select(self.descriptor.value_field.as_str())
            .from(adapter)
            .where_in(self.descriptor.object_field.as_str(), parent_keys.to_vec());

        Ok(QueryBuilder::new()
            .select(&format!("{}.*", child.source))
            .select(&format!(
                "{}.{} AS {}",
                alias, self.descriptor.object_field, REF_COLUMN
            ))
            .from(child.source.as_str())
            .join_subquery(
                subquery,
                &alias,
                &format!("{}.{}", child.source, self.descriptor.child_field),
                &format!("{}.{}", alias, self.descriptor.value_field),
            ))
    }

    fn child_model(&self) -> OrmResult<std::sync::Arc<crate::schema::ModelDef>> {
        let child_name = self.descriptor.child_model.as_deref().ok_or_else(|| {
            self.descriptor
                .configuration_error("this relation has no target model")
        })?;
        self.context.registry().get(child_name).ok_or_else(|| {
            self.descriptor
                .configuration_error("target model is not registered")
        })
    }

    async fn query_chunked<F>(&self, key_set: &[Value], build: F) -> OrmResult<Vec<Record>>
    where
        F: Fn(Vec<Value>) -> QueryBuilder,
    {
        let chunk_size = self.config.chunk_size.max(1);
        let mut rows = Vec::new();
        for chunk in key_set.chunks(chunk_size) {
            let query = build(chunk.to_vec());
            rows.extend(self.context.store().query(&query).await?);
        }
        Ok(rows)
    }

    /// Foreign-key association: one query on the child source filtered by
    /// the parent-key set, grouped in memory by the child field.
    async fn load_association(
        &self,
        parent_keys: &[Value],
        key_set: &[Value],
    ) -> OrmResult<Vec<Value>> {
        let child = self.child_model()?;
        let children = self
            .query_chunked(key_set, |keys| {
                QueryBuilder::new()
                    .select("*")
                    .from(child.source.as_str())
                    .where_in(self.descriptor.child_field.as_str(), keys)
            })
            .await?;
        debug!(
            model = %child.name,
            parents = parent_keys.len(),
            matched = children.len(),
            "bulk-loaded association"
        );

        parent_keys
            .iter()
            .map(|key| {
                let matched: Vec<Value> = children
                    .iter()
                    .filter(|child_row| {
                        matches!(
                            child_row.get(&self.descriptor.child_field),
                            Some(v) if values_equal(v, key)
                        )
                    })
                    .cloned()
                    .map(Value::Object)
                    .collect();
                self.shape(matched)
            })
            .collect()
    }

    /// Junction naive mode: key-set query on the adapter, key-set query on
    /// the target, in-memory match per parent.
    async fn load_junction_naive(
        &self,
        parent_keys: &[Value],
        key_set: &[Value],
    ) -> OrmResult<Vec<Value>> {
        let adapter = self.descriptor.adapter.as_deref().ok_or_else(|| {
            self.descriptor
                .configuration_error("junction relations require a backing adapter")
        })?;
        let links = self
            .query_chunked(key_set, |keys| {
                QueryBuilder::new()
                    .select("*")
                    .from(adapter)
                    .where_in(self.descriptor.object_field.as_str(), keys)
            })
            .await?;
        debug!(
            adapter = %adapter,
            parents = parent_keys.len(),
            links = links.len(),
            "bulk-loaded junction rows"
        );

        if self.descriptor.is_tag() {
            return parent_keys
                .iter()
                .map(|key| {
                    let matched: Vec<Value> = links
                        .iter()
                        .filter(|link| {
                            matches!(
                                link.get(&self.descriptor.object_field),
                                Some(v) if values_equal(v, key)
                            )
                        })
                        .filter_map(|link| link.get(&self.descriptor.value_field).cloned())
                        .filter(|v| !v.is_null())
                        .collect();
                    self.shape(matched)
                })
                .collect();
        }

        let child = self.child_model()?;
        let related_keys = distinct_values(
            links
                .iter()
                .filter_map(|link| link.get(&self.descriptor.value_field).cloned()),
        );
        let children = if related_keys.is_empty() {
            Vec::new()
        } else {
            self.query_chunked(&related_keys, |keys| {
                QueryBuilder::new()
                    .select("*")
                    .from(child.source.as_str())
                    .where_in(self.descriptor.child_field.as_str(), keys)
            })
            .await?
        };

        parent_keys
            .iter()
            .map(|key| {
                let matched: Vec<Value> = links
                    .iter()
                    .filter(|link| {
                        matches!(
                            link.get(&self.descriptor.object_field),
                            Some(v) if values_equal(v, key)
                        )
                    })
                    .filter_map(|link| link.get(&self.descriptor.value_field))
                    .filter_map(|value_key| {
                        children
                            .iter()
                            .find(|child_row| {
                                matches!(
                                    child_row.get(&self.descriptor.child_field),
                                    Some(v) if values_equal(v, value_key)
                                )
                            })
                            .cloned()
                    })
                    .map(Value::Object)
                    .collect();
                self.shape(matched)
            })
            .collect()
    }

    /// Junction optimized mode: one query joining the target to a
    /// sub-query over the adapter, carrying the object key out as a
    /// reference column.
    async fn load_junction_optimized(
        &self,
        parent_keys: &[Value],
        key_set: &[Value],
    ) -> OrmResult<Vec<Value>> {
        let query = self.optimized_query(key_set)?;
        let rows = self.context.store().query(&query).await?;
        debug!(
            parents = parent_keys.len(),
            rows = rows.len(),
            "bulk-loaded junction (optimized)"
        );

        parent_keys
            .iter()
            .map(|key| {
                let matched: Vec<Value> = rows
                    .iter()
                    .filter(|row| {
                        matches!(row.get(REF_COLUMN), Some(v) if values_equal(v, key))
                    })
                    .map(|row| {
                        let mut child = row.clone();
                        child.remove(REF_COLUMN);
                        Value::Object(child)
                    })
                    .collect();
                self.shape(matched)
            })
            .collect()
    }

    /// Shape one parent's matched set according to multiplicity
    fn shape(&self, mut matched: Vec<Value>) -> OrmResult<Value> {
        match self.descriptor.multiplicity {
            Multiplicity::Many => Ok(Value::Array(matched)),
            Multiplicity::One | Multiplicity::ZeroOrOne => {
                if matched.len() > 1 {
                    return Err(OrmError::MultiplicityViolation {
                        model: self
                            .descriptor
                            .child_model
                            .clone()
                            .unwrap_or_else(|| self.descriptor.parent_model.clone()),
                        attribute: self.descriptor.attribute_name().to_string(),
                    });
                }
                Ok(matched.pop().unwrap_or(Value::Null))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AssociationDescriptor, FieldDef, FieldType, ModelDef, ModelRegistry};
    use crate::store::{DataStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    fn record(pairs: &[(&str, Value)]) -> Record {
        let mut record = Record::new();
        for (key, value) in pairs {
            record.insert((*key).to_string(), value.clone());
        }
        record
    }

    async fn junction_fixture() -> (DataContext, Arc<MemoryStore>) {
        let registry = ModelRegistry::new();
        registry.register(
            ModelDef::new("User", "users")
                .with_field(FieldDef::primary_counter("id"))
                .with_field(FieldDef::new("name", FieldType::Text)),
        );
        registry.register(
            ModelDef::new("Group", "groups")
                .with_field(FieldDef::primary_counter("id"))
                .with_field(FieldDef::new("name", FieldType::Text)),
        );
        let store = Arc::new(MemoryStore::new());
        let context = DataContext::new(registry, store.clone());

        let groups_model = context.model("Group").unwrap();
        let mut groups = vec![
            record(&[("name", json!("admins"))]),
            record(&[("name", json!("editors"))]),
        ];
        store.save(&groups_model, &mut groups).await.unwrap();

        let link_model = ModelDef::new("UserGroups", "UserGroups")
            .with_field(FieldDef::primary_counter("id"))
            .with_field(FieldDef::new("object", FieldType::Integer))
            .with_field(FieldDef::new("value", FieldType::Integer));
        let mut links = vec![
            record(&[("object", json!(1)), ("value", json!(1))]),
            record(&[("object", json!(1)), ("value", json!(2))]),
            record(&[("object", json!(2)), ("value", json!(2))]),
        ];
        store.save(&link_model, &mut links).await.unwrap();

        (context, store)
    }

    fn junction_descriptor() -> AssociationDescriptor {
        AssociationDescriptor::junction("User", "id", "Group", "id", "UserGroups")
    }

    #[tokio::test]
    async fn test_empty_parent_set_resolves_immediately() {
        let (context, _store) = junction_fixture().await;
        let loader = BulkAssociationLoader::new(context, junction_descriptor());

        let loaded = loader.load(&[]).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_naive_junction_grouping() {
        let (context, _store) = junction_fixture().await;
        let loader = BulkAssociationLoader::new(context, junction_descriptor());

        let parents = vec![
            record(&[("id", json!(1))]),
            record(&[("id", json!(2))]),
            record(&[("id", json!(3))]),
        ];
        let loaded = loader.load(&parents).await.unwrap();

        assert_eq!(loaded.len(), 3);
        let first = loaded[0].as_array().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0]["name"], json!("admins"));
        assert_eq!(first[1]["name"], json!("editors"));

        let second = loaded[1].as_array().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0]["name"], json!("editors"));

        assert_eq!(loaded[2], json!([]));
    }

    #[tokio::test]
    async fn test_duplicate_parents_each_receive_their_set() {
        let (context, _store) = junction_fixture().await;
        let loader = BulkAssociationLoader::new(context, junction_descriptor());

        let parents = vec![record(&[("id", json!(2))]), record(&[("id", json!(2))])];
        let loaded = loader.load(&parents).await.unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], loaded[1]);
        assert_eq!(loaded[0].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_single_multiplicity_shapes_and_violations() {
        let (context, _store) = junction_fixture().await;

        let loader = BulkAssociationLoader::new(
            context.clone(),
            junction_descriptor().with_multiplicity(Multiplicity::ZeroOrOne),
        );

        // Parent 2 has exactly one link, parent 3 has none.
        let parents = vec![record(&[("id", json!(2))]), record(&[("id", json!(3))])];
        let loaded = loader.load(&parents).await.unwrap();
        assert_eq!(loaded[0]["name"], json!("editors"));
        assert_eq!(loaded[1], Value::Null);

        // Parent 1 has two links: more than one match is a violation.
        let parents = vec![record(&[("id", json!(1))])];
        let err = loader.load(&parents).await.unwrap_err();
        assert_eq!(err.code(), "EMULTI");
    }

    #[tokio::test]
    async fn test_association_bulk_load() {
        let registry = ModelRegistry::new();
        registry.register(
            ModelDef::new("User", "users").with_field(FieldDef::primary_counter("id")),
        );
        registry.register(
            ModelDef::new("Post", "posts")
                .with_field(FieldDef::primary_counter("id"))
                .with_field(FieldDef::new("owner", FieldType::Integer)),
        );
        let store = Arc::new(MemoryStore::new());
        let context = DataContext::new(registry, store.clone());

        let posts_model = context.model("Post").unwrap();
        let mut posts = vec![
            record(&[("owner", json!(1))]),
            record(&[("owner", json!(1))]),
            record(&[("owner", json!(2))]),
        ];
        store.save(&posts_model, &mut posts).await.unwrap();

        let descriptor = AssociationDescriptor::association("User", "id", "Post", "owner");
        let loader = BulkAssociationLoader::new(context, descriptor);

        let parents = vec![record(&[("id", json!(1))]), record(&[("id", json!(9))])];
        let loaded = loader.load(&parents).await.unwrap();

        assert_eq!(loaded[0].as_array().unwrap().len(), 2);
        assert_eq!(loaded[1], json!([]));
    }

    #[tokio::test]
    async fn test_attach_writes_results_into_parents() {
        let (context, _store) = junction_fixture().await;
        let loader = BulkAssociationLoader::new(context, junction_descriptor());

        let mut parents = vec![record(&[("id", json!(1))])];
        loader.attach(&mut parents, "groups").await.unwrap();

        assert_eq!(parents[0]["groups"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_optimized_query_shape() {
        let registry = ModelRegistry::new();
        registry.register(
            ModelDef::new("User", "users").with_field(FieldDef::primary_counter("id")),
        );
        registry.register(
            ModelDef::new("Group", "groups").with_field(FieldDef::primary_counter("id")),
        );
        let context = DataContext::new(registry, Arc::new(MemoryStore::new()));
        let loader = BulkAssociationLoader::new(context, junction_descriptor());

        let query = loader.optimized_query(&[json!(1), json!(2)]).unwrap();
        assert_eq!(
            query.to_sql(),
            "SELECT groups.*, link0.object AS __object FROM groups INNER JOIN \
             (SELECT object, value FROM UserGroups WHERE object IN (1, 2)) AS link0 \
             ON groups.id = link0.value"
        );
    }

    #[test]
    fn test_optimized_query_alias_avoids_collisions() {
        let registry = ModelRegistry::new();
        registry.register(
            ModelDef::new("User", "users").with_field(FieldDef::primary_counter("id")),
        );
        registry.register(
            ModelDef::new("Group", "groups").with_field(FieldDef::primary_counter("id")),
        );
        let context = DataContext::new(registry, Arc::new(MemoryStore::new()));
        let loader = BulkAssociationLoader::new(context, junction_descriptor());

        let query = loader
            .optimized_query_avoiding(&[json!(1)], &["link0", "link1"])
            .unwrap();
        assert!(query.has_join_alias("link2"));
        assert!(!query.has_join_alias("link0"));
    }

    #[tokio::test]
    async fn test_chunked_key_sets_cover_all_parents() {
        let (context, _store) = junction_fixture().await;
        let loader = BulkAssociationLoader::new(context, junction_descriptor())
            .with_config(BulkLoadConfig::default().with_chunk_size(1));

        let parents = vec![record(&[("id", json!(1))]), record(&[("id", json!(2))])];
        let loaded = loader.load(&parents).await.unwrap();

        assert_eq!(loaded[0].as_array().unwrap().len(), 2);
        assert_eq!(loaded[1].as_array().unwrap().len(), 1);
    }
}
