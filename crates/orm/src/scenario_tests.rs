//! End-to-end scenarios across handles, loaders, listeners, and the guard

use std::sync::Arc;

use serde_json::{json, Value};

use crate::context::DataContext;
use crate::loading::BulkAssociationLoader;
use crate::schema::{
    AssociationDescriptor, CascadeRule, FieldDef, FieldType, ModelDef, ModelRegistry,
};
use crate::store::{DataStore, MemoryStore, Record, STATE_FIELD};

fn record(pairs: &[(&str, Value)]) -> Record {
    let mut record = Record::new();
    for (key, value) in pairs {
        record.insert((*key).to_string(), value.clone());
    }
    record
}

/// User/Group junction plus a tag collection on User
fn membership_fixture() -> (DataContext, Arc<MemoryStore>) {
    let registry = ModelRegistry::new();
    registry.register(
        ModelDef::new("User", "users")
            .with_field(FieldDef::primary_counter("id"))
            .with_field(FieldDef::new("name", FieldType::Text))
            .with_field(FieldDef::new("groups", FieldType::Model("Group".to_string())).with_many())
            .with_field(FieldDef::new("tags", FieldType::Text).with_many()),
    );
    registry.register(
        ModelDef::new("Group", "groups")
            .with_field(FieldDef::primary_counter("id"))
            .with_field(FieldDef::new("name", FieldType::Text)),
    );
    let store = Arc::new(MemoryStore::new());
    let context = DataContext::new(registry, store.clone());
    (context, store)
}

/// User referenced by Post.owner with a configurable cascade rule
fn ownership_fixture(cascade: CascadeRule) -> (DataContext, Arc<MemoryStore>) {
    let registry = ModelRegistry::new();
    registry.register(
        ModelDef::new("User", "users")
            .with_field(FieldDef::primary_counter("id"))
            .with_field(FieldDef::new("name", FieldType::Text)),
    );
    registry.register(
        ModelDef::new("Post", "posts")
            .with_field(FieldDef::primary_counter("id"))
            .with_field(FieldDef::new("title", FieldType::Text))
            .with_field(FieldDef::new("owner", FieldType::Model("User".to_string())))
            .with_mapping(
                "owner",
                AssociationDescriptor::association("User", "id", "Post", "owner")
                    .with_cascade(cascade),
            ),
    );
    let store = Arc::new(MemoryStore::new());
    let context = DataContext::new(registry, store.clone());
    (context, store)
}

async fn seed_owner_and_posts(context: &DataContext, store: &MemoryStore) -> Record {
    let users = context.model("User").unwrap();
    let mut owner = vec![record(&[("name", json!("ada"))])];
    store.save(&users, &mut owner).await.unwrap();

    let posts = context.model("Post").unwrap();
    let mut rows = vec![
        record(&[("title", json!("one")), ("owner", json!(1))]),
        record(&[("title", json!("two")), ("owner", json!(1))]),
    ];
    store.save(&posts, &mut rows).await.unwrap();
    owner.remove(0)
}

#[tokio::test]
async fn test_junction_insert_is_idempotent() {
    let (context, store) = membership_fixture();
    let user = record(&[("id", json!(1))]);
    let relation = context.relation("User", &user, "groups").unwrap();

    relation.insert(&json!({"name": "admins"})).await.unwrap();
    relation.insert(&json!({"name": "admins"})).await.unwrap();

    assert_eq!(store.rows("UserGroups").await.len(), 1);
    assert_eq!(store.rows("groups").await.len(), 1);

    // Raw-key form is idempotent too.
    relation.insert(&json!(1)).await.unwrap();
    assert_eq!(store.rows("UserGroups").await.len(), 1);
}

#[tokio::test]
async fn test_remove_of_unlinked_item_is_a_noop() {
    let (context, store) = membership_fixture();
    let user = record(&[("id", json!(1))]);
    let relation = context.relation("User", &user, "groups").unwrap();

    relation.insert(&json!({"name": "admins"})).await.unwrap();
    // Key 99 was never linked; removing it must not error or change rows.
    relation.remove(&json!(99)).await.unwrap();
    relation
        .remove(&json!({"name": "strangers"}))
        .await
        .unwrap();

    assert_eq!(store.rows("UserGroups").await.len(), 1);
}

#[tokio::test]
async fn test_insert_processes_items_in_order_and_fails_fast() {
    let (context, store) = membership_fixture();
    let user = record(&[("id", json!(1))]);
    let relation = context.relation("User", &user, "groups").unwrap();

    // The null item cannot be resolved; the first failure aborts the rest.
    let result = relation
        .insert(&json!([{"name": "a"}, null, {"name": "b"}]))
        .await;
    assert!(result.is_err());

    let rows = store.rows("UserGroups").await;
    assert_eq!(rows.len(), 1, "items before the failure stay committed");
    assert_eq!(store.rows("groups").await.len(), 1);
}

#[tokio::test]
async fn test_cascade_none_blocks_delete() {
    let (context, store) = ownership_fixture(CascadeRule::None);
    let owner = seed_owner_and_posts(&context, &store).await;

    let err = context.remove("User", &owner).await.unwrap_err();
    assert_eq!(err.code(), "EFKEY");
    assert_eq!(err.model(), Some("Post"));
    assert_eq!(err.attribute(), Some("owner"));

    assert_eq!(store.rows("users").await.len(), 1, "delete was blocked");
    assert_eq!(store.rows("posts").await.len(), 2);
}

#[tokio::test]
async fn test_cascade_delete_removes_dependents_then_parent() {
    let (context, store) = ownership_fixture(CascadeRule::Delete);
    let owner = seed_owner_and_posts(&context, &store).await;

    context.remove("User", &owner).await.unwrap();

    assert!(store.rows("users").await.is_empty());
    assert!(store.rows("posts").await.is_empty());
}

#[tokio::test]
async fn test_cascade_null_clears_foreign_keys_then_deletes_parent() {
    let (context, store) = ownership_fixture(CascadeRule::Null);
    let owner = seed_owner_and_posts(&context, &store).await;

    context.remove("User", &owner).await.unwrap();

    assert!(store.rows("users").await.is_empty());
    let posts = store.rows("posts").await;
    assert_eq!(posts.len(), 2);
    assert!(posts.iter().all(|post| post["owner"].is_null()));
}

#[tokio::test]
async fn test_bulk_loader_matches_per_parent_relation_queries() {
    let (context, store) = membership_fixture();

    // Five parents with varied membership, including a zero-match case.
    let users_model = context.model("User").unwrap();
    let mut users: Vec<Record> = (0..5)
        .map(|i| record(&[("name", json!(format!("u{}", i)))]))
        .collect();
    store.save(&users_model, &mut users).await.unwrap();

    let memberships: &[&[i64]] = &[&[1, 2], &[2], &[], &[1, 2, 3], &[3]];
    for (user, groups) in users.iter().zip(memberships) {
        let relation = context.relation("User", user, "groups").unwrap();
        for group in groups.iter() {
            relation
                .insert(&json!({ "name": format!("g{}", group) }))
                .await
                .unwrap();
        }
    }

    let descriptor = users_model
        .infer_mapping("groups", context.registry())
        .unwrap();
    let loader = BulkAssociationLoader::new(context.clone(), descriptor);

    for count in [0usize, 1, 5] {
        let parents = &users[..count];
        let loaded = loader.load(parents).await.unwrap();
        assert_eq!(loaded.len(), count);

        for (parent, bulk_value) in parents.iter().zip(&loaded) {
            let relation = context.relation("User", parent, "groups").unwrap();
            let looped = Value::Array(relation.members().await.unwrap());
            assert_eq!(bulk_value, &looped);
        }
    }
}

#[tokio::test]
async fn test_junction_link_and_unlink_scenario() {
    let (context, store) = membership_fixture();

    // Parent A(1) junction-linked to X(10) and Y(20).
    let groups_model = context.model("Group").unwrap();
    let mut groups = vec![
        record(&[("id", json!(10)), ("name", json!("X"))]),
        record(&[("id", json!(20)), ("name", json!("Y"))]),
    ];
    store.save(&groups_model, &mut groups).await.unwrap();

    let parent = record(&[("id", json!(1))]);
    let relation = context.relation("User", &parent, "groups").unwrap();
    relation.insert(&json!([10, 20])).await.unwrap();

    let users_model = context.model("User").unwrap();
    let descriptor = users_model
        .infer_mapping("groups", context.registry())
        .unwrap();
    let loader = BulkAssociationLoader::new(context.clone(), descriptor);

    let loaded = loader.load(std::slice::from_ref(&parent)).await.unwrap();
    let names: Vec<&str> = loaded[0]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["X", "Y"]);

    relation.remove(&json!(20)).await.unwrap();

    let reloaded = loader.load(std::slice::from_ref(&parent)).await.unwrap();
    let names: Vec<&str> = reloaded[0]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["X"]);
}

#[tokio::test]
async fn test_tag_relation_round_trip() {
    let (context, store) = membership_fixture();
    let user = record(&[("id", json!(1))]);
    let relation = context.relation("User", &user, "tags").unwrap();

    relation.insert(&json!(["red", "blue"])).await.unwrap();
    relation.insert(&json!("red")).await.unwrap();

    let members = relation.members().await.unwrap();
    assert_eq!(members, vec![json!("red"), json!("blue")]);
    assert_eq!(store.rows("UserTags").await.len(), 2);

    relation.remove(&json!("red")).await.unwrap();
    assert_eq!(relation.members().await.unwrap(), vec![json!("blue")]);

    relation.remove_all().await.unwrap();
    assert!(relation.members().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_junction_definition_synthesized_once() {
    let (context, _store) = membership_fixture();
    let user = record(&[("id", json!(1))]);

    let first = context.relation("User", &user, "groups").unwrap();
    first.migrate().await.unwrap();
    let cached_a = context.registry().get("UserGroups").unwrap();

    let second = context.relation("User", &user, "groups").unwrap();
    second.migrate().await.unwrap();
    let cached_b = context.registry().get("UserGroups").unwrap();

    assert!(Arc::ptr_eq(&cached_a, &cached_b));
}

/// Person with one embedded scalar (address) and one embedded array
/// (attachments)
fn nested_fixture() -> (DataContext, Arc<MemoryStore>) {
    let registry = ModelRegistry::new();
    registry.register(
        ModelDef::new("Person", "people")
            .with_field(FieldDef::primary_counter("id"))
            .with_field(FieldDef::new("name", FieldType::Text))
            .with_field(
                FieldDef::new("address", FieldType::Model("Address".to_string())).with_nested(),
            )
            .with_field(
                FieldDef::new("attachments", FieldType::Model("Attachment".to_string()))
                    .with_many()
                    .with_nested(),
            ),
    );
    registry.register(
        ModelDef::new("Address", "addresses")
            .with_field(FieldDef::primary_counter("id"))
            .with_field(FieldDef::new("city", FieldType::Text)),
    );
    registry.register(
        ModelDef::new("Attachment", "attachments")
            .with_field(FieldDef::primary_counter("id"))
            .with_field(FieldDef::new("title", FieldType::Text))
            .with_field(FieldDef::new("person_id", FieldType::Integer)),
    );
    let store = Arc::new(MemoryStore::new());
    let context = DataContext::new(registry, store.clone());
    (context, store)
}

#[tokio::test]
async fn test_nested_scalar_saved_before_owner() {
    let (context, store) = nested_fixture();

    let mut person = record(&[
        ("name", json!("ada")),
        ("address", json!({"city": "london"})),
    ]);
    context.save("Person", &mut person).await.unwrap();

    assert_eq!(person["address"], json!(1), "attribute replaced by the key");
    let addresses = store.rows("addresses").await;
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0]["city"], json!("london"));
    assert_eq!(store.rows("people").await.len(), 1);
}

#[tokio::test]
async fn test_nested_array_diff_by_primary_key() {
    let (context, store) = nested_fixture();

    let mut person = record(&[
        ("name", json!("ada")),
        (
            "attachments",
            json!([{"title": "first"}, {"title": "second"}]),
        ),
    ]);
    context.save("Person", &mut person).await.unwrap();

    let rows = store.rows("attachments").await;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row["person_id"] == json!(1)));

    // Submit: keep id 2 updated, add a new item carrying a stale id.
    person.insert(
        "attachments".to_string(),
        json!([
            {"id": 2, "title": "second", "updated": true},
            {"id": 77, "title": "third"},
        ]),
    );
    context.save("Person", &mut person).await.unwrap();

    let rows = store.rows("attachments").await;
    assert_eq!(rows.len(), 2);

    assert!(
        !rows.iter().any(|row| row["id"] == json!(1)),
        "item missing from the submitted state was deleted"
    );
    let updated = rows.iter().find(|row| row["id"] == json!(2)).unwrap();
    assert_eq!(updated["updated"], json!(true));
    assert!(
        !rows.iter().any(|row| row["id"] == json!(77)),
        "stale identifier was stripped before insert"
    );
    let inserted = rows.iter().find(|row| row["title"] == json!("third")).unwrap();
    assert_eq!(inserted["person_id"], json!(1));

    // No persisted record nor reconciled item retains the state marker.
    assert!(rows.iter().all(|row| !row.contains_key(STATE_FIELD)));
    let reconciled = person["attachments"].as_array().unwrap();
    assert_eq!(reconciled.len(), 2);
    assert!(reconciled
        .iter()
        .all(|item| item.get(STATE_FIELD).is_none()));
}

#[tokio::test]
async fn test_nested_delete_clears_links_then_objects() {
    let (context, store) = nested_fixture();

    let mut person = record(&[
        ("name", json!("ada")),
        ("address", json!({"city": "london"})),
        ("attachments", json!([{"title": "first"}])),
    ]);
    context.save("Person", &mut person).await.unwrap();
    assert_eq!(store.rows("addresses").await.len(), 1);
    assert_eq!(store.rows("attachments").await.len(), 1);

    context.remove("Person", &person).await.unwrap();

    assert!(store.rows("people").await.is_empty());
    assert!(store.rows("addresses").await.is_empty());
    assert!(store.rows("attachments").await.is_empty());
}
