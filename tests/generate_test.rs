//! Integration tests for per-version document generation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use versioned_openapi::{
    Document, FieldDef, GenerateError, GeneratorConfig, Operation, Reflect, Registration, Schema,
    SchemaGenerator, SchemaRef, TypeDef, TypeGraph, TypeKey, TypeOperations, TypeRegistry,
    Version, VersionBundle, VersionChange,
};

// === Fixtures ===

struct User;

impl Reflect for User {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        graph.reflect_struct::<Self>("User", |g| {
            vec![
                FieldDef::new("ID", g.of::<i64>())
                    .tag("json", "id")
                    .tag("validate", "required"),
                FieldDef::new("FullName", g.of::<String>()).tag("json", "full_name"),
                FieldDef::new("Email", g.of::<String>())
                    .tag("json", "email")
                    .tag("validate", "email"),
                FieldDef::new("Phone", g.of::<String>()).tag("json", "phone,omitempty"),
                FieldDef::new("Status", g.of::<String>())
                    .tag("json", "status")
                    .tag("enums", "active,disabled"),
            ]
        })
    }
}

struct Category;

impl Reflect for Category {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        graph.reflect_struct::<Self>("Category", |g| {
            vec![
                FieldDef::new("Name", g.of::<String>()).tag("json", "name"),
                FieldDef::new("Children", g.of::<Vec<Category>>()).tag("json", "children"),
                FieldDef::new("Parent", g.of::<Option<Box<Category>>>()).tag("json", "parent"),
            ]
        })
    }
}

struct Author;
struct Book;

impl Reflect for Author {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        graph.reflect_struct::<Self>("Author", |g| {
            vec![
                FieldDef::new("Name", g.of::<String>()).tag("json", "name"),
                FieldDef::new("Books", g.of::<Vec<Book>>()).tag("json", "books"),
            ]
        })
    }
}

impl Reflect for Book {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        graph.reflect_struct::<Self>("Book", |g| {
            vec![
                FieldDef::new("Title", g.of::<String>()).tag("json", "title"),
                FieldDef::new("Author", g.of::<Option<Author>>()).tag("json", "author"),
            ]
        })
    }
}

struct Audit;
struct Customer;

impl Reflect for Audit {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        graph.reflect_struct::<Self>("Audit", |g| {
            vec![
                FieldDef::new("CreatedAt", g.of::<DateTime<Utc>>())
                    .tag("json", "created_at")
                    .tag("validate", "required"),
                FieldDef::new("UpdatedBy", g.of::<String>()).tag("json", "updated_by"),
            ]
        })
    }
}

impl Reflect for Customer {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        graph.reflect_struct::<Self>("Customer", |g| {
            vec![
                FieldDef::new("ID", g.of::<String>())
                    .tag("json", "id")
                    .tag("validate", "required,uuid"),
                FieldDef::new("Name", g.of::<String>()).tag("json", "name"),
                FieldDef::new("Secret", g.of::<String>()).tag("json", "-"),
                FieldDef::new("cache", g.of::<String>()).unexported(),
                FieldDef::embedded("Audit", g.of::<Audit>()),
            ]
        })
    }
}

struct Settings;

impl Reflect for Settings {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        graph.reflect_struct::<Self>("Settings", |g| {
            vec![
                FieldDef::new("Labels", g.of::<HashMap<String, String>>()).tag("json", "labels"),
                FieldDef::new("Extra", g.of::<BTreeMap<String, Value>>()).tag("json", "extra"),
            ]
        })
    }
}

fn v(s: &str) -> Version {
    Version::parse(s)
}

fn three_versions() -> VersionBundle {
    VersionBundle::new(vec![v("2024-01-01"), v("2024-06-01"), v("2025-01-01")]).unwrap()
}

/// The user history: v2 dropped email and status from older responses,
/// v3 renamed name to full_name and added phone.
fn user_bundle() -> VersionBundle {
    let mut bundle = three_versions();
    bundle
        .attach(
            &v("2024-06-01"),
            VersionChange::new("Add email and status").with(
                TypeOperations::new("User")
                    .response(Operation::remove_field("email"))
                    .response(Operation::remove_field("status")),
            ),
        )
        .unwrap();
    bundle
        .attach(
            &v("2025-01-01"),
            VersionChange::new("Rename name, add phone").with(
                TypeOperations::new("User")
                    .response(Operation::rename_field("full_name", "name"))
                    .response(Operation::remove_field("phone")),
            ),
        )
        .unwrap();
    bundle
}

fn user_base() -> Document {
    serde_json::from_value(json!({
        "openapi": "3.0.3",
        "info": { "title": "Users", "version": "1" },
        "paths": { "/users/{id}": { "get": { "operationId": "getUser" } } },
        "components": { "schemas": {
            "User": {
                "type": "object",
                "x-owner": "identity",
                "properties": {
                    "id": { "type": "integer", "format": "int64", "description": "Primary key", "example": 42 },
                    "full_name": { "type": "string", "description": "Display name" },
                    "email": { "type": "string", "format": "email", "example": "a@example.com" },
                    "phone": { "type": "string" },
                    "status": { "type": "string", "enum": ["active", "disabled"] }
                },
                "required": ["id", "full_name"]
            },
            "ErrorBody": {
                "type": "object",
                "properties": {
                    "inner": { "type": "object", "properties": { "id": { "type": "integer" } } }
                }
            }
        } }
    }))
    .unwrap()
}

fn inline<'d>(document: &'d Document, name: &str) -> &'d Schema {
    document
        .schema(name)
        .and_then(SchemaRef::as_inline)
        .unwrap_or_else(|| panic!("missing inline schema {}", name))
}

fn property_names(schema: &Schema) -> BTreeSet<&str> {
    schema.property_names()
}

fn names(list: &[&'static str]) -> BTreeSet<&'static str> {
    list.iter().copied().collect()
}

// === Cumulative version changes ===

mod cumulative_versions {
    use super::*;

    fn generate() -> BTreeMap<String, Document> {
        let mut graph = TypeGraph::new();
        let user = graph.of::<User>();
        let mut registry = TypeRegistry::new();
        registry.register_response(user);
        let bundle = user_bundle();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        generator.generate_versioned_specs(&user_base()).unwrap()
    }

    #[test]
    fn one_document_per_version() {
        let documents = generate();
        let keys: Vec<&str> = documents.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["2024-01-01", "2024-06-01", "2025-01-01", "head"]);
    }

    #[test]
    fn head_and_latest_keep_every_field() {
        let documents = generate();
        let all = names(&["id", "full_name", "email", "phone", "status"]);
        assert_eq!(property_names(inline(&documents["head"], "User")), all);
        assert_eq!(property_names(inline(&documents["2025-01-01"], "User")), all);
    }

    #[test]
    fn middle_version_undoes_latest_change() {
        let documents = generate();
        let user = inline(&documents["2024-06-01"], "User");
        assert_eq!(property_names(user), names(&["id", "name", "email", "status"]));
        // Rename carries the requirement and sub-schema along
        assert!(user.required.contains(&"name".to_string()));
        assert_eq!(
            user.properties["name"].as_inline().unwrap().description.as_deref(),
            Some("Display name")
        );
    }

    #[test]
    fn oldest_version_undoes_every_change() {
        let documents = generate();
        let user = inline(&documents["2024-01-01"], "User");
        assert_eq!(property_names(user), names(&["id", "name"]));
        assert_eq!(user.required, vec!["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn base_document_is_not_mutated() {
        let base = user_base();
        let mut graph = TypeGraph::new();
        let user = graph.of::<User>();
        let mut registry = TypeRegistry::new();
        registry.register_response(user);
        let bundle = user_bundle();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        generator.generate_versioned_specs(&base).unwrap();
        assert_eq!(base, user_base());
    }

    #[test]
    fn unmanaged_sections_pass_through() {
        let documents = generate();
        for document in documents.values() {
            assert_eq!(document.rest["openapi"], "3.0.3");
            assert_eq!(
                document.rest["paths"]["/users/{id}"]["get"]["operationId"],
                "getUser"
            );
            assert_eq!(
                document.raw_schema("ErrorBody"),
                user_base().raw_schema("ErrorBody")
            );
        }
    }
}

// === Request and response directions ===

mod direction_symmetry {
    use super::*;

    struct CreateOrder;
    struct Order;

    impl Reflect for CreateOrder {
        fn reflect(graph: &mut TypeGraph) -> TypeKey {
            graph.reflect_struct::<Self>("CreateOrder", |g| {
                vec![
                    FieldDef::new("Item", g.of::<String>())
                        .tag("json", "item")
                        .tag("binding", "required"),
                    FieldDef::new("Note", g.of::<String>()).tag("json", "note"),
                ]
            })
        }
    }

    impl Reflect for Order {
        fn reflect(graph: &mut TypeGraph) -> TypeKey {
            graph.reflect_struct::<Self>("Order", |g| {
                vec![
                    FieldDef::new("Item", g.of::<String>()).tag("json", "item"),
                    FieldDef::new("Note", g.of::<String>()).tag("json", "note"),
                ]
            })
        }
    }

    fn setup() -> (TypeGraph, TypeRegistry, VersionBundle) {
        let mut graph = TypeGraph::new();
        let create = graph.of::<CreateOrder>();
        let order = graph.of::<Order>();
        let mut registry = TypeRegistry::new();
        registry.register_pair(create, order);

        let mut bundle = VersionBundle::new(vec![v("2024-01-01"), v("2024-06-01")]).unwrap();
        bundle
            .attach(
                &v("2024-06-01"),
                VersionChange::new("Orders carry a note")
                    .with(
                        TypeOperations::new("CreateOrder")
                            .request(Operation::add_field("note", json!("")))
                            .request(Operation::remove_field("legacy_code"))
                            .request(Operation::custom("normalize", |_| {})),
                    )
                    .with(TypeOperations::new("Order").response(Operation::remove_field("note"))),
            )
            .unwrap();
        (graph, registry, bundle)
    }

    #[test]
    fn added_request_field_is_absent_in_older_request() {
        let (graph, registry, bundle) = setup();
        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let document = generator
            .generate_spec_for_version(&Document::default(), &v("2024-01-01"))
            .unwrap();

        let request = inline(&document, "CreateOrder20240101");
        let response = inline(&document, "Order20240101");
        assert!(!request.properties.contains_key("note"));
        assert!(!response.properties.contains_key("note"));
        assert_eq!(request.required, vec!["item".to_string()]);
    }

    #[test]
    fn removed_request_field_comes_back_as_generic_object() {
        let (graph, registry, bundle) = setup();
        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let document = generator
            .generate_spec_for_version(&Document::default(), &v("2024-01-01"))
            .unwrap();

        let request = inline(&document, "CreateOrder20240101");
        let legacy = request.properties["legacy_code"].as_inline().unwrap();
        assert!(legacy.is_object());
        assert!(!request.required.contains(&"legacy_code".to_string()));
    }

    #[test]
    fn newest_version_is_unchanged() {
        let (graph, registry, bundle) = setup();
        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let document = generator
            .generate_spec_for_version(&Document::default(), &v("2024-06-01"))
            .unwrap();

        assert_eq!(
            property_names(inline(&document, "CreateOrder20240601")),
            names(&["item", "note"])
        );
        assert_eq!(
            property_names(inline(&document, "Order20240601")),
            names(&["item", "note"])
        );
    }

    #[test]
    fn request_registration_wins_for_shared_type() {
        let mut graph = TypeGraph::new();
        let order = graph.of::<Order>();
        let mut registry = TypeRegistry::new();
        registry.register_response(order);
        registry.register_request(order);

        let mut bundle = VersionBundle::new(vec![v("v1"), v("v2")]).unwrap();
        bundle
            .attach(
                &v("v2"),
                VersionChange::new("Drop note from responses")
                    .with(TypeOperations::new("Order").response(Operation::remove_field("note"))),
            )
            .unwrap();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let document = generator
            .generate_spec_for_version(&Document::default(), &v("v1"))
            .unwrap();
        // Only request operations apply, and there are none
        assert_eq!(
            property_names(inline(&document, "Orderv1")),
            names(&["item", "note"])
        );
    }
}

// === Recursive types ===

mod cycles {
    use super::*;

    #[test]
    fn self_referential_type_yields_one_component() {
        let mut graph = TypeGraph::new();
        let category = graph.of::<Category>();
        let mut registry = TypeRegistry::new();
        registry.register_response(category);
        let bundle = three_versions();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let documents = generator.generate_versioned_specs(&Document::default()).unwrap();

        for document in documents.values() {
            let names: Vec<&String> = document.components.schemas.keys().collect();
            assert_eq!(names, vec!["Category"]);

            let category = inline(document, "Category");
            assert_eq!(
                category.properties["parent"].component_name(),
                Some("Category")
            );
            let children = category.properties["children"].as_inline().unwrap();
            assert_eq!(
                children.items.as_ref().unwrap().component_name(),
                Some("Category")
            );
        }
    }

    #[test]
    fn mutually_referential_pair_yields_one_component_each() {
        let mut graph = TypeGraph::new();
        let author = graph.of::<Author>();
        let mut registry = TypeRegistry::new();
        registry.register_response(author);
        let bundle = three_versions();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let document = generator
            .generate_spec_for_version(&Document::default(), &v("2024-01-01"))
            .unwrap();

        let names: Vec<&String> = document.components.schemas.keys().collect();
        assert_eq!(names, vec!["Author", "Book"]);
        assert_eq!(
            inline(&document, "Book").properties["author"].component_name(),
            Some("Author")
        );
        let expected: BTreeSet<String> = ["Author".to_string(), "Book".to_string()]
            .into_iter()
            .collect();
        assert_eq!(generator.nested_components(&v("2024-01-01")), Some(&expected));
    }
}

// === Externally authored metadata ===

mod identity_preservation {
    use super::*;

    #[test]
    fn untouched_field_metadata_survives_every_version() {
        let mut graph = TypeGraph::new();
        let user = graph.of::<User>();
        let mut registry = TypeRegistry::new();
        registry.register_response(user);
        let bundle = user_bundle();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let documents = generator.generate_versioned_specs(&user_base()).unwrap();

        for document in documents.values() {
            let user = inline(document, "User");
            assert_eq!(user.extensions["x-owner"], json!("identity"));

            let id = user.properties["id"].as_inline().unwrap();
            assert_eq!(id.description.as_deref(), Some("Primary key"));
            assert_eq!(id.example, Some(json!(42)));
        }

        let email = inline(&documents["2024-06-01"], "User").properties["email"].clone();
        assert_eq!(
            email.as_inline().unwrap().example,
            Some(json!("a@example.com"))
        );
    }

    #[test]
    fn base_reference_is_left_alone() {
        let mut graph = TypeGraph::new();
        let user = graph.of::<User>();
        let mut registry = TypeRegistry::new();
        registry.register_response(user);
        let bundle = user_bundle();

        let base: Document = serde_json::from_value(json!({
            "components": { "schemas": {
                "User": { "$ref": "#/components/schemas/Person" },
                "Person": { "type": "object", "properties": { "id": { "type": "integer" } } }
            } }
        }))
        .unwrap();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let document = generator
            .generate_spec_for_version(&base, &v("2024-01-01"))
            .unwrap();
        assert_eq!(
            document.raw_schema("User"),
            Some(&json!({ "$ref": "#/components/schemas/Person" }))
        );
        assert!(!document.has_schema("User20240101"));
    }
}

// === Maps and embedding ===

mod shapes {
    use super::*;

    #[test]
    fn string_keyed_maps() {
        let mut graph = TypeGraph::new();
        let settings = graph.of::<Settings>();
        let mut registry = TypeRegistry::new();
        registry.register_response(settings);
        let bundle = VersionBundle::default();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let document = generator
            .generate_spec_for_version(&Document::default(), &Version::head())
            .unwrap();

        let value = serde_json::to_value(inline(&document, "Settings")).unwrap();
        assert_eq!(
            value["properties"]["labels"]["additionalProperties"],
            json!({ "type": "string" })
        );
        assert_eq!(value["properties"]["extra"]["additionalProperties"], json!(true));
    }

    #[test]
    fn non_string_map_key_fails_the_version() {
        let mut graph = TypeGraph::new();
        let scores = graph.of::<HashMap<i64, String>>();
        let board = graph.declare_struct("Board");
        graph.define_struct(board, vec![FieldDef::new("Scores", scores).tag("json", "scores")]);
        let mut registry = TypeRegistry::new();
        registry.register_response(board);
        let bundle = three_versions();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let err = generator
            .generate_versioned_specs(&Document::default())
            .unwrap_err();
        match err {
            GenerateError::Type {
                type_name,
                version,
                source,
            } => {
                assert_eq!(type_name, "Board");
                assert_eq!(version, "2024-01-01");
                assert!(matches!(*source, GenerateError::UnsupportedMapKey { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unsupported_kind_is_wrapped_with_context() {
        let mut graph = TypeGraph::new();
        let channel = graph.add(TypeDef::Unsupported("chan".to_string()));
        let widget = graph.declare_struct("Widget");
        graph.define_struct(widget, vec![FieldDef::new("Events", channel)]);
        let mut registry = TypeRegistry::new();
        registry.register_response(widget);
        let bundle = VersionBundle::default();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let err = generator
            .generate_spec_for_version(&Document::default(), &Version::head())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "type Widget at version head: unsupported kind: chan"
        );
    }

    #[test]
    fn embedded_struct_is_flattened() {
        let mut graph = TypeGraph::new();
        let customer = graph.of::<Customer>();
        let mut registry = TypeRegistry::new();
        registry.register_response(customer);
        let bundle = VersionBundle::default();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let document = generator
            .generate_spec_for_version(&Document::default(), &Version::head())
            .unwrap();

        let customer = inline(&document, "Customer");
        assert_eq!(
            property_names(customer),
            names(&["id", "name", "created_at", "updated_by"])
        );
        assert_eq!(
            customer.required,
            vec!["id".to_string(), "created_at".to_string()]
        );
        let created = customer.properties["created_at"].as_inline().unwrap();
        assert_eq!(created.format.as_deref(), Some("date-time"));
        assert!(!document.has_schema("Audit"));
    }

    #[test]
    fn head_properties_match_serializable_fields() {
        let mut graph = TypeGraph::new();
        let user = graph.of::<User>();
        let mut registry = TypeRegistry::new();
        registry.register_response(user);
        let bundle = VersionBundle::default();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let document = generator
            .generate_spec_for_version(&Document::default(), &Version::head())
            .unwrap();

        let user = inline(&document, "User");
        assert_eq!(
            property_names(user),
            names(&["id", "full_name", "email", "phone", "status"])
        );
        let email = user.properties["email"].as_inline().unwrap();
        assert_eq!(email.format.as_deref(), Some("email"));
        let status = user.properties["status"].as_inline().unwrap();
        assert_eq!(status.enum_values, vec![json!("active"), json!("disabled")]);
    }

    #[test]
    fn generation_is_repeatable() {
        let mut graph = TypeGraph::new();
        let author = graph.of::<Author>();
        let customer = graph.of::<Customer>();
        let mut registry = TypeRegistry::new();
        registry.register_pair(customer, author);
        let bundle = user_bundle();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let first = generator
            .generate_spec_for_version(&user_base(), &v("2024-06-01"))
            .unwrap();
        let second = generator
            .generate_spec_for_version(&user_base(), &v("2024-06-01"))
            .unwrap();
        assert_eq!(first, second);
    }
}

// === Component naming ===

mod naming {
    use super::*;

    struct Order;

    impl Reflect for Order {
        fn reflect(graph: &mut TypeGraph) -> TypeKey {
            graph.reflect_struct::<Self>("Order", |g| {
                let source = g.of::<String>();
                let channel = g.of::<String>();
                let meta = g.anonymous_struct(vec![
                    FieldDef::new("Source", source).tag("json", "source"),
                    FieldDef::new("Channel", channel).tag("json", "channel"),
                ]);
                vec![
                    FieldDef::new("ID", g.of::<i64>()).tag("json", "id"),
                    FieldDef::new("Meta", meta).tag("json", "meta"),
                ]
            })
        }
    }

    #[test]
    fn prefix_and_mapper_shape_generated_names() {
        let mut graph = TypeGraph::new();
        let user = graph.of::<User>();
        let mut registry = TypeRegistry::new();
        registry.register_response(user);
        let bundle = three_versions();

        let config = GeneratorConfig::new()
            .name_prefix("V")
            .output_name_mapper(|name| format!("{}Resource", name));
        let mut generator = SchemaGenerator::new(&graph, &registry, &bundle, config);
        let documents = generator.generate_versioned_specs(&Document::default()).unwrap();

        assert!(documents["head"].has_schema("UserResource"));
        assert!(documents["2024-06-01"].has_schema("UserResourceV20240601"));
        assert!(!documents["2024-06-01"].has_schema("UserResource"));
    }

    #[test]
    fn registered_nested_array_gets_component() {
        let mut graph = TypeGraph::new();
        let users = graph.of::<Vec<User>>();
        let mut registry = TypeRegistry::new();
        registry.register(Registration::new(None, Some(users)).nested_array(users));
        let bundle = three_versions();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let document = generator
            .generate_spec_for_version(&Document::default(), &v("2024-01-01"))
            .unwrap();

        let names: Vec<&String> = document.components.schemas.keys().collect();
        assert_eq!(names, vec!["User", "UserArray"]);
        let array = inline(&document, "UserArray");
        assert_eq!(array.items.as_ref().unwrap().component_name(), Some("User"));
    }

    #[test]
    fn anonymous_struct_named_after_parent_field() {
        let mut graph = TypeGraph::new();
        let order = graph.of::<Order>();
        let mut registry = TypeRegistry::new();
        registry.register_response(order);
        let bundle = VersionBundle::default();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let document = generator
            .generate_spec_for_version(&Document::default(), &Version::head())
            .unwrap();

        assert_eq!(
            property_names(inline(&document, "OrderMeta")),
            names(&["source", "channel"])
        );
        // Inline shape is swapped for the component with the same field names
        assert_eq!(
            inline(&document, "Order").properties["meta"].component_name(),
            Some("OrderMeta")
        );
    }

    #[test]
    fn nested_types_get_both_directions() {
        struct Profile;
        struct Account;

        impl Reflect for Profile {
            fn reflect(graph: &mut TypeGraph) -> TypeKey {
                graph.reflect_struct::<Self>("Profile", |g| {
                    vec![
                        FieldDef::new("Bio", g.of::<String>()).tag("json", "bio"),
                        FieldDef::new("Avatar", g.of::<String>()).tag("json", "avatar"),
                    ]
                })
            }
        }

        impl Reflect for Account {
            fn reflect(graph: &mut TypeGraph) -> TypeKey {
                graph.reflect_struct::<Self>("Account", |g| {
                    vec![FieldDef::new("Profile", g.of::<Profile>()).tag("json", "profile")]
                })
            }
        }

        let mut graph = TypeGraph::new();
        let account = graph.of::<Account>();
        let mut registry = TypeRegistry::new();
        registry.register_response(account);

        let mut bundle = VersionBundle::new(vec![v("2024-01-01"), v("2024-06-01")]).unwrap();
        bundle
            .attach(
                &v("2024-06-01"),
                VersionChange::new("Profiles get avatars and lose bios").with(
                    TypeOperations::new("Profile")
                        .response(Operation::remove_field("avatar"))
                        .request(Operation::remove_field("bio")),
                ),
            )
            .unwrap();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let document = generator
            .generate_spec_for_version(&Document::default(), &v("2024-01-01"))
            .unwrap();

        // avatar dropped by the response change, bio kept by the inverted request change
        let profile = inline(&document, "Profile");
        assert_eq!(property_names(profile), names(&["bio"]));
        assert!(document.has_schema("Account20240101"));
    }
}

// === Migration metadata ===

mod migration_metadata {
    use super::*;

    #[test]
    fn migrated_schemas_are_annotated() {
        let mut graph = TypeGraph::new();
        let user = graph.of::<User>();
        let mut registry = TypeRegistry::new();
        registry.register_response(user);
        let bundle = user_bundle();

        let config = GeneratorConfig::new().include_migration_metadata(true);
        let mut generator = SchemaGenerator::new(&graph, &registry, &bundle, config);
        let documents = generator.generate_versioned_specs(&user_base()).unwrap();

        let old = inline(&documents["2024-01-01"], "User");
        assert_eq!(old.extensions["x-api-version"], json!("2024-01-01"));
        assert_eq!(
            old.extensions["x-migrations"],
            json!(["Rename name, add phone", "Add email and status"])
        );

        let head = inline(&documents["head"], "User");
        assert!(!head.extensions.contains_key("x-api-version"));
        let latest = inline(&documents["2025-01-01"], "User");
        assert!(!latest.extensions.contains_key("x-migrations"));
    }

    #[test]
    fn disabled_by_default() {
        let mut graph = TypeGraph::new();
        let user = graph.of::<User>();
        let mut registry = TypeRegistry::new();
        registry.register_response(user);
        let bundle = user_bundle();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let document = generator
            .generate_spec_for_version(&user_base(), &v("2024-01-01"))
            .unwrap();
        assert!(!inline(&document, "User").extensions.contains_key("x-migrations"));
    }
}

// === Schemas authored in the base document ===

mod authored_schemas {
    use super::*;

    fn authored_base() -> Value {
        json!({
            "openapi": "3.1.0",
            "components": { "schemas": {
                "Legacy": {
                    "type": "object",
                    "properties": {
                        "n": { "type": "integer", "minimum": 1, "maximum": 10, "exclusiveMinimum": false },
                        "tags": { "type": "array", "items": { "type": "string" }, "enum": [] },
                        "extra": { "type": "object", "properties": {} }
                    },
                    "required": []
                },
                "Alias": { "$ref": "#/components/schemas/Legacy", "description": "Old name" },
                "Nullable": { "type": ["string", "null"] },
                "Positive": { "type": "number", "exclusiveMinimum": 0 },
                "Address": {
                    "type": "object",
                    "properties": { "street": { "type": "string" }, "city": { "type": "string" } }
                },
                "User": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "integer", "minimum": 1 },
                        "full_name": { "type": "string" },
                        "email": { "type": "string" },
                        "phone": { "type": "string" },
                        "status": { "type": "string" },
                        "home": {
                            "type": "object",
                            "properties": { "city": { "type": "string" }, "street": { "type": "string" } }
                        }
                    }
                }
            } }
        })
    }

    fn generate(base: &Document) -> Result<BTreeMap<String, Document>, GenerateError> {
        let mut graph = TypeGraph::new();
        let user = graph.of::<User>();
        let mut registry = TypeRegistry::new();
        registry.register_response(user);
        let bundle = user_bundle();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        generator.generate_versioned_specs(base)
    }

    #[test]
    fn unmanaged_schemas_are_written_back_verbatim() {
        let input = authored_base();
        let base: Document = serde_json::from_value(input.clone()).unwrap();
        let documents = generate(&base).unwrap();

        for document in documents.values() {
            let output = serde_json::to_value(document).unwrap();
            for name in ["Legacy", "Alias", "Nullable", "Positive", "Address"] {
                assert_eq!(
                    output["components"]["schemas"][name],
                    input["components"]["schemas"][name],
                    "{} changed",
                    name
                );
            }
            assert_eq!(output["openapi"], "3.1.0");
        }
    }

    #[test]
    fn managed_schema_keeps_integer_bounds() {
        let base: Document = serde_json::from_value(authored_base()).unwrap();
        let documents = generate(&base).unwrap();

        let output = serde_json::to_value(&documents["2024-01-01"]).unwrap();
        let id = &output["components"]["schemas"]["User"]["properties"]["id"];
        assert_eq!(id["minimum"], json!(1));
        assert!(id["minimum"].is_u64());
    }

    #[test]
    fn authored_component_is_a_reference_target() {
        let base: Document = serde_json::from_value(authored_base()).unwrap();
        let documents = generate(&base).unwrap();

        let user = inline(&documents["head"], "User");
        assert_eq!(user.properties["home"].component_name(), Some("Address"));
    }

    #[test]
    fn managed_schema_in_other_dialect_fails() {
        let base: Document = serde_json::from_value(json!({
            "components": { "schemas": {
                "User": { "type": ["object", "null"], "properties": {} }
            } }
        }))
        .unwrap();

        match generate(&base).unwrap_err() {
            GenerateError::Type { type_name, source, .. } => {
                assert_eq!(type_name, "User");
                assert!(matches!(*source, GenerateError::InvalidBaseSchema { ref name, .. } if name == "User"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

// === Declared version order ===

mod declared_order {
    use super::*;

    #[test]
    fn labels_follow_declaration_not_spelling() {
        let mut graph = TypeGraph::new();
        let user = graph.of::<User>();
        let mut registry = TypeRegistry::new();
        registry.register_response(user);

        let mut bundle = VersionBundle::new(vec![v("v1"), v("v2"), v("v10")]).unwrap();
        bundle
            .attach(
                &v("v10"),
                VersionChange::new("Add email")
                    .with(TypeOperations::new("User").response(Operation::remove_field("email"))),
            )
            .unwrap();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let documents = generator.generate_versioned_specs(&Document::default()).unwrap();

        let keys: BTreeSet<&str> = documents.keys().map(String::as_str).collect();
        assert_eq!(keys, names(&["v1", "v2", "v10", "head"]));
        assert!(!property_names(inline(&documents["v1"], "Userv1")).contains("email"));
        assert!(!property_names(inline(&documents["v2"], "Userv2")).contains("email"));
        assert!(property_names(inline(&documents["v10"], "Userv10")).contains("email"));
    }

    #[test]
    fn documents_keyed_by_declared_spelling() {
        let mut graph = TypeGraph::new();
        let user = graph.of::<User>();
        let mut registry = TypeRegistry::new();
        registry.register_response(user);
        let bundle = VersionBundle::new(vec![v("v1.2.0"), v("2.0")]).unwrap();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let documents = generator.generate_versioned_specs(&Document::default()).unwrap();

        let keys: Vec<&str> = documents.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["2.0", "head", "v1.2.0"]);
        assert!(documents["v1.2.0"].has_schema("Userv120"));
    }
}

// === Transform failures ===

mod failures {
    use super::*;

    #[test]
    fn rename_onto_existing_field_aborts_version() {
        let mut graph = TypeGraph::new();
        let user = graph.of::<User>();
        let mut registry = TypeRegistry::new();
        registry.register_response(user);

        let mut bundle = VersionBundle::new(vec![v("v1"), v("v2")]).unwrap();
        bundle
            .attach(
                &v("v2"),
                VersionChange::new("Bad rename").with(
                    TypeOperations::new("User")
                        .response(Operation::rename_field("email", "phone")),
                ),
            )
            .unwrap();

        let mut generator =
            SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
        let err = generator
            .generate_spec_for_version(&Document::default(), &v("v1"))
            .unwrap_err();
        match err {
            GenerateError::Type { source, .. } => {
                assert!(matches!(*source, GenerateError::TransformFailure { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }

        // Head is untouched by changes and still generates
        assert!(generator
            .generate_spec_for_version(&Document::default(), &Version::head())
            .is_ok());
    }
}
