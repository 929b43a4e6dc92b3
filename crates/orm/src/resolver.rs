//! Attribute Path Resolver - Nested attribute expressions to join expansions
//!
//! Parses slash-delimited attribute expressions from external filter,
//! select, and sort surfaces (`a`, `a/b`, `fn(a/b) as x`) and resolves each
//! hop against the association metadata of the current entity, producing a
//! select field plus the LEFT JOIN expansions required to reach it. The
//! already-joined alias set is threaded through resolution as an explicit
//! parameter, so repeated traversals of the same segment reuse one join.

use std::sync::Arc;

use crate::error::{OrmError, OrmResult};
use crate::query::{JoinClause, JoinTarget, JoinType, QueryBuilder};
use crate::schema::{AssociationKind, ModelDef, ModelRegistry};

/// Parse failure for an attribute path expression
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathParseError {
    #[error("empty attribute expression")]
    Empty,
    #[error("invalid attribute expression '{0}'")]
    Invalid(String),
}

impl From<PathParseError> for OrmError {
    fn from(err: PathParseError) -> Self {
        OrmError::Query(err.to_string())
    }
}

/// Parsed shape of an attribute path expression
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    /// Wrapping function name, for `fn(attr)` forms
    pub function: Option<String>,
    /// Slash-separated traversal segments
    pub segments: Vec<String>,
    /// Output alias, for `... as alias` forms
    pub output: Option<String>,
}

/// Parse an attribute path expression: `attr`, `attr as alias`, `fn(attr)`,
/// `fn(attr) as alias`, with 1-4 slash-separated segments inside.
pub fn parse_path(expr: &str) -> Result<PathExpr, PathParseError> {
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return Err(PathParseError::Empty);
    }

    let (body, output) = match trimmed.rsplit_once(" as ") {
        Some((body, alias)) => {
            let alias = alias.trim();
            if alias.is_empty() {
                return Err(PathParseError::Invalid(trimmed.to_string()));
            }
            (body.trim(), Some(alias.to_string()))
        }
        None => (trimmed, None),
    };

    let (function, inner) = match body.find('(') {
        Some(open) => {
            let name = &body[..open];
            if name.is_empty()
                || !body.ends_with(')')
                || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(PathParseError::Invalid(body.to_string()));
            }
            (Some(name.to_string()), &body[open + 1..body.len() - 1])
        }
        None => {
            if body.contains(')') {
                return Err(PathParseError::Invalid(body.to_string()));
            }
            (None, body)
        }
    };

    let segments: Vec<String> = inner.split('/').map(|s| s.trim().to_string()).collect();
    if segments.iter().any(String::is_empty) {
        return Err(PathParseError::Invalid(body.to_string()));
    }

    Ok(PathExpr {
        function,
        segments,
        output,
    })
}

/// One join queued by path resolution
#[derive(Debug, Clone, PartialEq)]
pub struct JoinExpansion {
    /// Entity alias introduced by this join
    pub alias: String,
    /// The joined model's name
    pub model: String,
    /// The join clause itself
    pub clause: JoinClause,
}

/// Result of resolving one attribute path expression
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttribute {
    /// Qualified select field, e.g. `customer.name` or `year(customer.birth)`
    pub select_field: String,
    /// Output alias from the `as` form
    pub output_name: Option<String>,
    /// Snapshot of the join expansions required by this attribute
    pub expansions: Vec<JoinExpansion>,
}

impl ResolvedAttribute {
    /// Render the select list entry for this attribute
    pub fn select_sql(&self) -> String {
        match &self.output_name {
            Some(output) => format!("{} AS {}", self.select_field, output),
            None => self.select_field.clone(),
        }
    }

    /// Merge this attribute into a query: queue each expansion whose alias
    /// is not already joined, then add the select field
    pub fn apply_to(&self, mut query: QueryBuilder) -> QueryBuilder {
        for expansion in &self.expansions {
            if !query.has_join_alias(&expansion.alias) {
                query = query.with_join(expansion.clause.clone());
            }
        }
        query.select(&self.select_sql())
    }
}

/// Resolves attribute path expressions against one root model
pub struct AttributeResolver<'a> {
    registry: &'a ModelRegistry,
    model: Arc<ModelDef>,
}

impl<'a> AttributeResolver<'a> {
    pub fn new(registry: &'a ModelRegistry, model: Arc<ModelDef>) -> Self {
        Self { registry, model }
    }

    /// Resolve an expression with a fresh expansion set
    pub fn resolve(&self, expr: &str) -> OrmResult<ResolvedAttribute> {
        let mut joined = Vec::new();
        self.resolve_with(expr, &mut joined)
    }

    /// Resolve an expression against an existing expansion set. New joins
    /// are appended to `joined`; an equivalent alias already present is
    /// reused rather than duplicated.
    pub fn resolve_with(
        &self,
        expr: &str,
        joined: &mut Vec<JoinExpansion>,
    ) -> OrmResult<ResolvedAttribute> {
        let parsed = parse_path(expr)?;
        let (select_field, output_name) = self.resolve_segments(&parsed, joined)?;
        Ok(ResolvedAttribute {
            select_field,
            output_name,
            expansions: joined.clone(),
        })
    }

    fn resolve_segments(
        &self,
        parsed: &PathExpr,
        joined: &mut Vec<JoinExpansion>,
    ) -> OrmResult<(String, Option<String>)> {
        let mut current = self.model.clone();
        let mut current_label = current.source.clone();
        let hop_count = parsed.segments.len() - 1;

        for (index, segment) in parsed.segments[..hop_count].iter().enumerate() {
            let mapping = current
                .infer_mapping(segment, self.registry)
                .ok_or_else(|| OrmError::AttributeResolution {
                    model: current.name.clone(),
                    attribute: segment.clone(),
                })?;

            match mapping.kind {
                AssociationKind::Association => {
                    let (target, on_left, on_right);
                    if mapping.child_model.as_deref() == Some(current.name.as_str()) {
                        // The current entity holds the referenced key.
                        target = self.registry.get(&mapping.parent_model).ok_or_else(|| {
                            mapping
                                .configuration_error("referenced parent model is not registered")
                        })?;
                        on_left = format!("{}.{}", current_label, mapping.child_field);
                        on_right = format!("{}.{}", segment, mapping.parent_field);
                    } else if mapping.parent_model == current.name {
                        // Reverse mapping: child rows reference the current
                        // entity, the join direction flips.
                        let child_name = mapping.child_model.as_deref().ok_or_else(|| {
                            OrmError::UnsupportedAssociation {
                                model: current.name.clone(),
                                attribute: segment.clone(),
                            }
                        })?;
                        target = self.registry.get(child_name).ok_or_else(|| {
                            mapping.configuration_error("referencing child model is not registered")
                        })?;
                        on_left = format!("{}.{}", segment, mapping.child_field);
                        on_right = format!("{}.{}", current_label, mapping.parent_field);
                    } else {
                        return Err(
                            mapping.configuration_error("association does not touch this model")
                        );
                    }
                    push_expansion(
                        joined,
                        JoinExpansion {
                            alias: segment.clone(),
                            model: target.name.clone(),
                            clause: JoinClause {
                                join_type: JoinType::Left,
                                target: JoinTarget::Table(target.source.clone()),
                                alias: Some(segment.clone()),
                                on_conditions: vec![(on_left, on_right)],
                            },
                        },
                    );
                    current = target;
                    current_label = segment.clone();
                }
                AssociationKind::Junction => {
                    // Junction traversal is only supported on the first hop,
                    // and tag junctions have no target entity to reach.
                    if index != 0 || mapping.is_tag() {
                        return Err(OrmError::UnsupportedAssociation {
                            model: current.name.clone(),
                            attribute: segment.clone(),
                        });
                    }
                    let adapter = mapping.adapter.clone().ok_or_else(|| {
                        mapping.configuration_error("junction relations require a backing adapter")
                    })?;
                    let link_alias = format!("{}_link", segment);

                    let (target, link_on, target_on);
                    if mapping.parent_model == current.name {
                        let child_name = mapping.child_model.as_deref().ok_or_else(|| {
                            OrmError::UnsupportedAssociation {
                                model: current.name.clone(),
                                attribute: segment.clone(),
                            }
                        })?;
                        target = self.registry.get(child_name).ok_or_else(|| {
                            mapping.configuration_error("junction child model is not registered")
                        })?;
                        link_on = (
                            format!("{}.{}", current_label, mapping.parent_field),
                            format!("{}.{}", link_alias, mapping.object_field),
                        );
                        target_on = (
                            format!("{}.{}", link_alias, mapping.value_field),
                            format!("{}.{}", segment, mapping.child_field),
                        );
                    } else if mapping.child_model.as_deref() == Some(current.name.as_str()) {
                        target = self.registry.get(&mapping.parent_model).ok_or_else(|| {
                            mapping.configuration_error("junction parent model is not registered")
                        })?;
                        link_on = (
                            format!("{}.{}", current_label, mapping.child_field),
                            format!("{}.{}", link_alias, mapping.value_field),
                        );
                        target_on = (
                            format!("{}.{}", link_alias, mapping.object_field),
                            format!("{}.{}", segment, mapping.parent_field),
                        );
                    } else {
                        return Err(
                            mapping.configuration_error("junction does not touch this model")
                        );
                    }

                    push_expansion(
                        joined,
                        JoinExpansion {
                            alias: link_alias.clone(),
                            model: adapter.clone(),
                            clause: JoinClause {
                                join_type: JoinType::Left,
                                target: JoinTarget::Table(adapter),
                                alias: Some(link_alias),
                                on_conditions: vec![link_on],
                            },
                        },
                    );
                    push_expansion(
                        joined,
                        JoinExpansion {
                            alias: segment.clone(),
                            model: target.name.clone(),
                            clause: JoinClause {
                                join_type: JoinType::Left,
                                target: JoinTarget::Table(target.source.clone()),
                                alias: Some(segment.clone()),
                                on_conditions: vec![target_on],
                            },
                        },
                    );
                    current = target;
                    current_label = segment.clone();
                }
            }
        }

        let last = &parsed.segments[hop_count];
        let field = current
            .field(last)
            .ok_or_else(|| OrmError::AttributeResolution {
                model: current.name.clone(),
                attribute: last.clone(),
            })?;
        let mut select_field = format!("{}.{}", current_label, field.name);
        if let Some(function) = &parsed.function {
            select_field = format!("{}({})", function, select_field);
        }
        Ok((select_field, parsed.output.clone()))
    }
}

/// Queue an expansion unless an equivalent alias is already present
fn push_expansion(joined: &mut Vec<JoinExpansion>, expansion: JoinExpansion) {
    if joined.iter().any(|e| e.alias == expansion.alias) {
        return;
    }
    joined.push(expansion);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AssociationDescriptor, FieldDef, FieldType, ModelDef};

    fn sample_registry() -> ModelRegistry {
        let registry = ModelRegistry::new();
        registry.register(
            ModelDef::new("Person", "people")
                .with_field(FieldDef::primary_counter("id"))
                .with_field(FieldDef::new("name", FieldType::Text))
                .with_field(FieldDef::new("birth", FieldType::Text))
                .with_field(FieldDef::new(
                    "address",
                    FieldType::Model("Address".to_string()),
                )),
        );
        registry.register(
            ModelDef::new("Address", "addresses")
                .with_field(FieldDef::primary_counter("id"))
                .with_field(FieldDef::new("city", FieldType::Text))
                .with_field(FieldDef::new(
                    "country",
                    FieldType::Model("Country".to_string()),
                )),
        );
        registry.register(
            ModelDef::new("Country", "countries")
                .with_field(FieldDef::primary_counter("id"))
                .with_field(FieldDef::new("code", FieldType::Text)),
        );
        registry.register(
            ModelDef::new("Order", "orders")
                .with_field(FieldDef::primary_counter("id"))
                .with_field(FieldDef::new("total", FieldType::Float))
                .with_field(FieldDef::new(
                    "customer",
                    FieldType::Model("Person".to_string()),
                )),
        );
        registry.register(
            ModelDef::new("User", "users")
                .with_field(FieldDef::primary_counter("id"))
                .with_field(FieldDef::new("name", FieldType::Text))
                .with_field(
                    FieldDef::new("groups", FieldType::Model("Group".to_string())).with_many(),
                )
                .with_field(FieldDef::new("tags", FieldType::Text).with_many()),
        );
        registry.register(
            ModelDef::new("Group", "groups")
                .with_field(FieldDef::primary_counter("id"))
                .with_field(FieldDef::new("name", FieldType::Text)),
        );
        registry
    }

    #[test]
    fn test_parse_plain_and_aliased() {
        assert_eq!(
            parse_path("customer/name").unwrap(),
            PathExpr {
                function: None,
                segments: vec!["customer".to_string(), "name".to_string()],
                output: None,
            }
        );
        assert_eq!(
            parse_path("customer/name as customerName").unwrap(),
            PathExpr {
                function: None,
                segments: vec!["customer".to_string(), "name".to_string()],
                output: Some("customerName".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_function_forms() {
        assert_eq!(
            parse_path("year(customer/birth) as birthYear").unwrap(),
            PathExpr {
                function: Some("year".to_string()),
                segments: vec!["customer".to_string(), "birth".to_string()],
                output: Some("birthYear".to_string()),
            }
        );
        assert!(parse_path("year(customer/birth").is_err());
        assert!(parse_path("").is_err());
        assert!(parse_path("a//b").is_err());
    }

    #[test]
    fn test_single_segment_resolution() {
        let registry = sample_registry();
        let resolver = AttributeResolver::new(&registry, registry.get("Order").unwrap());

        let resolved = resolver.resolve("total").unwrap();
        assert_eq!(resolved.select_field, "orders.total");
        assert!(resolved.expansions.is_empty());
    }

    #[test]
    fn test_two_segment_association_produces_one_join() {
        let registry = sample_registry();
        let resolver = AttributeResolver::new(&registry, registry.get("Order").unwrap());

        let resolved = resolver.resolve("customer/name").unwrap();
        assert_eq!(resolved.select_field, "customer.name");
        assert_eq!(resolved.expansions.len(), 1);

        let expansion = &resolved.expansions[0];
        assert_eq!(expansion.alias, "customer");
        assert_eq!(expansion.model, "Person");
        assert_eq!(
            expansion.clause.on_conditions,
            vec![("orders.customer".to_string(), "customer.id".to_string())]
        );
    }

    #[test]
    fn test_shared_expansion_set_deduplicates_joins() {
        let registry = sample_registry();
        let resolver = AttributeResolver::new(&registry, registry.get("Order").unwrap());

        let mut joined = Vec::new();
        let first = resolver.resolve_with("customer/name", &mut joined).unwrap();
        let second = resolver
            .resolve_with("customer/birth", &mut joined)
            .unwrap();

        assert_eq!(joined.len(), 1);
        assert_eq!(first.select_field, "customer.name");
        assert_eq!(second.select_field, "customer.birth");
    }

    #[test]
    fn test_deep_chain_resolution() {
        let registry = sample_registry();
        let resolver = AttributeResolver::new(&registry, registry.get("Order").unwrap());

        let resolved = resolver.resolve("customer/address/country/code").unwrap();
        assert_eq!(resolved.select_field, "country.code");
        assert_eq!(resolved.expansions.len(), 3);
        assert_eq!(resolved.expansions[0].alias, "customer");
        assert_eq!(resolved.expansions[1].alias, "address");
        assert_eq!(resolved.expansions[2].alias, "country");
        assert_eq!(
            resolved.expansions[1].clause.on_conditions,
            vec![("customer.address".to_string(), "address.id".to_string())]
        );
    }

    #[test]
    fn test_reverse_association_flips_join_direction() {
        let registry = sample_registry();
        registry.register(
            ModelDef::new("Team", "teams")
                .with_field(FieldDef::primary_counter("id"))
                .with_field(FieldDef::new("name", FieldType::Text))
                .with_mapping(
                    "members",
                    AssociationDescriptor::association("Team", "id", "Person", "team"),
                ),
        );

        let resolver = AttributeResolver::new(&registry, registry.get("Team").unwrap());
        let resolved = resolver.resolve("members/name").unwrap();

        assert_eq!(resolved.expansions.len(), 1);
        assert_eq!(
            resolved.expansions[0].clause.on_conditions,
            vec![("members.team".to_string(), "teams.id".to_string())]
        );
    }

    #[test]
    fn test_junction_first_hop_expands_through_adapter() {
        let registry = sample_registry();
        let resolver = AttributeResolver::new(&registry, registry.get("User").unwrap());

        let resolved = resolver.resolve("groups/name").unwrap();
        assert_eq!(resolved.select_field, "groups.name");
        assert_eq!(resolved.expansions.len(), 2);

        let link = &resolved.expansions[0];
        assert_eq!(link.alias, "groups_link");
        assert_eq!(
            link.clause.on_conditions,
            vec![("users.id".to_string(), "groups_link.object".to_string())]
        );

        let target = &resolved.expansions[1];
        assert_eq!(target.alias, "groups");
        assert_eq!(
            target.clause.on_conditions,
            vec![("groups_link.value".to_string(), "groups.id".to_string())]
        );
    }

    #[test]
    fn test_junction_beyond_first_hop_is_unsupported() {
        let registry = sample_registry();
        registry.register(
            ModelDef::new("Account", "accounts")
                .with_field(FieldDef::primary_counter("id"))
                .with_field(FieldDef::new(
                    "user",
                    FieldType::Model("User".to_string()),
                )),
        );

        let resolver = AttributeResolver::new(&registry, registry.get("Account").unwrap());
        let err = resolver.resolve("user/groups/name").unwrap_err();
        assert_eq!(err.code(), "EASSOCIATION");
    }

    #[test]
    fn test_tag_traversal_is_unsupported() {
        let registry = sample_registry();
        let resolver = AttributeResolver::new(&registry, registry.get("User").unwrap());

        let err = resolver.resolve("tags/value").unwrap_err();
        assert_eq!(err.code(), "EASSOCIATION");
    }

    #[test]
    fn test_unknown_segment_fails_with_attribute_error() {
        let registry = sample_registry();
        let resolver = AttributeResolver::new(&registry, registry.get("Order").unwrap());

        let err = resolver.resolve("customer/missing").unwrap_err();
        assert_eq!(err.code(), "E_ATTR");
        assert_eq!(err.model(), Some("Person"));
        assert_eq!(err.attribute(), Some("missing"));

        let err = resolver.resolve("nothing/name").unwrap_err();
        assert_eq!(err.code(), "E_ATTR");
        assert_eq!(err.model(), Some("Order"));
    }

    #[test]
    fn test_function_and_alias_render_in_select() {
        let registry = sample_registry();
        let resolver = AttributeResolver::new(&registry, registry.get("Order").unwrap());

        let resolved = resolver.resolve("year(customer/birth) as birthYear").unwrap();
        assert_eq!(resolved.select_field, "year(customer.birth)");
        assert_eq!(resolved.select_sql(), "year(customer.birth) AS birthYear");
    }

    #[test]
    fn test_apply_to_merges_joins_idempotently() {
        let registry = sample_registry();
        let resolver = AttributeResolver::new(&registry, registry.get("Order").unwrap());

        let name = resolver.resolve("customer/name").unwrap();
        let birth = resolver.resolve("customer/birth").unwrap();

        let query = QueryBuilder::new().from("orders");
        let query = name.apply_to(query);
        let query = birth.apply_to(query);

        assert_eq!(query.joins().len(), 1);
        assert_eq!(
            query.select_fields(),
            &["customer.name".to_string(), "customer.birth".to_string()]
        );
    }
}
