use std::collections::BTreeMap;

use satchel_core::{
  Error,
  backend::{DocumentBackend, Query},
};
use satchel_crypto::GcmFieldCrypto;
use satchel_store_sqlite::SqliteBackend;
use satchel_validate::SubsetValidator;
use serde_json::{Map, Value, json};

use super::*;
use crate::system::aggregate_version;

type TestEngine = Satchel<SqliteBackend, GcmFieldCrypto, SubsetValidator>;

const TEST_KEY: &str = "correct-horse-battery-staple";

async fn engine_with(policy: ConflictPolicy) -> TestEngine {
  let backend = SqliteBackend::open_in_memory().await.unwrap();
  let mut config = Config::new("test", "test-db", TEST_KEY);
  config.conflict_policy = policy;
  let satchel =
    Satchel::new(config, backend, GcmFieldCrypto, SubsetValidator).unwrap();
  satchel.initialize().await.unwrap();
  satchel
}

async fn engine() -> TestEngine { engine_with(ConflictPolicy::Reject).await }

fn obj(v: Value) -> Map<String, Value> {
  let Value::Object(map) = v else { panic!("expected a JSON object") };
  map
}

async fn install_book_schema(s: &TestEngine) {
  s.create(
    SCHEMA_KIND,
    obj(json!({
      "name": "book",
      "schema": {
        "type": "object",
        "additionalProperties": false,
        "properties": {
          "title":       { "type": "string" },
          "author":      { "type": "string" },
          "genre":       { "type": "string", "default": "unknown" },
          "secret_note": { "type": "string" }
        },
        "required": ["title", "author"]
      },
      "settings": {
        "primary_keys":        ["title", "author"],
        "non_editable_fields": ["author"],
        "encrypted_fields":    ["secret_note"],
        "templates": {
          "card": { "engine": "plain", "text": "{{doc.data.title}} by {{doc.data.author}}" }
        }
      }
    })),
    None,
    None,
  )
  .await
  .unwrap();
}

async fn install_author_schema(s: &TestEngine) {
  s.create(
    SCHEMA_KIND,
    obj(json!({
      "name": "author",
      "schema": {
        "type": "object",
        "properties": { "name": { "type": "string" } },
        "required": ["name"]
      },
      "settings": { "primary_keys": ["name"] }
    })),
    None,
    None,
  )
  .await
  .unwrap();
}

async fn create_book(s: &TestEngine, title: &str, author: &str) -> String {
  let doc = s
    .create(
      "book",
      obj(json!({ "title": title, "author": author })),
      None,
      None,
    )
    .await
    .unwrap();
  doc.id.unwrap()
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn operations_refused_before_initialize() {
  let backend = SqliteBackend::open_in_memory().await.unwrap();
  let satchel = Satchel::new(
    Config::new("test", "test-db", TEST_KEY),
    backend,
    GcmFieldCrypto,
    SubsetValidator,
  )
  .unwrap();

  let err = satchel
    .create("book", obj(json!({ "title": "t" })), None, None)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NotReady));
  assert!(satchel.active_version().is_none());
}

#[tokio::test]
async fn bootstrap_installs_all_builtin_schemas() {
  let backend = SqliteBackend::open_in_memory().await.unwrap();
  let satchel = Satchel::new(
    Config::new("test", "test-db", TEST_KEY),
    backend,
    GcmFieldCrypto,
    SubsetValidator,
  )
  .unwrap();

  let report = satchel.initialize().await.unwrap();
  assert!(report.changed);
  assert_eq!(report.installed.len(), 8);
  assert_eq!(report.version, aggregate_version());
  assert_eq!(satchel.active_version(), Some(aggregate_version()));
}

#[tokio::test]
async fn bootstrap_is_idempotent() {
  let satchel = engine().await;
  let report = satchel.initialize().await.unwrap();
  assert!(!report.changed);
  assert!(report.installed.is_empty());
  assert!(report.upgraded.is_empty());
}

#[tokio::test]
async fn short_encryption_key_is_refused_at_construction() {
  let backend = SqliteBackend::open_in_memory().await.unwrap();
  let result = Satchel::new(
    Config::new("test", "test-db", "too-short"),
    backend,
    GcmFieldCrypto,
    SubsetValidator,
  );
  assert!(matches!(result, Err(Error::Config(_))));
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_applies_defaults_and_assigns_link() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;

  let doc = satchel
    .create("book", obj(json!({ "title": "Dune", "author": "Herbert" })), None, None)
    .await
    .unwrap();
  assert_eq!(doc.data["genre"], "unknown");
  assert!(doc.id.is_some());
  assert!(doc.rev.is_some());
  assert!(!doc.meta.link.is_empty());
}

#[tokio::test]
async fn create_rejects_invalid_data() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;

  let err = satchel
    .create("book", obj(json!({ "title": 42, "author": "x" })), None, None)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));

  let err = satchel
    .create("book", obj(json!({ "author": "x" })), None, None)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn create_refuses_unknown_schema() {
  let satchel = engine().await;
  let err = satchel
    .create("missing", obj(json!({ "x": 1 })), None, None)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::SchemaNotFound(name) if name == "missing"));
}

#[tokio::test]
async fn duplicate_primary_key_is_refused() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  create_book(&satchel, "Dune", "Herbert").await;

  let err = satchel
    .create("book", obj(json!({ "title": "Dune", "author": "Herbert" })), None, None)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DocCreation(_)));

  // Same title, different author — the key is the combination.
  create_book(&satchel, "Dune", "Villeneuve").await;
}

#[tokio::test]
async fn requested_link_must_be_unique() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;

  satchel
    .create(
      "book",
      obj(json!({ "title": "Dune", "author": "Herbert" })),
      Some(obj(json!({ "link": "my-favourite" }))),
      None,
    )
    .await
    .unwrap();

  let err = satchel
    .create(
      "book",
      obj(json!({ "title": "Other", "author": "Else" })),
      Some(obj(json!({ "link": "my-favourite" }))),
      None,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DocCreation(_)));
}

#[tokio::test]
async fn create_refuses_malformed_schema_document() {
  let satchel = engine().await;
  // Primary key names a property that does not exist.
  let err = satchel
    .create(
      SCHEMA_KIND,
      obj(json!({
        "name": "broken",
        "schema": {
          "type": "object",
          "properties": { "a": { "type": "string" } }
        },
        "settings": { "primary_keys": ["missing"] }
      })),
      None,
      None,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));
}

// ─── Read ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn read_by_id_link_and_primary_key_agree() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  let doc = satchel
    .create(
      "book",
      obj(json!({ "title": "Dune", "author": "Herbert" })),
      Some(obj(json!({ "link": "the-dune-copy" }))),
      None,
    )
    .await
    .unwrap();
  let id = doc.id.clone().unwrap();

  let by_id = satchel.read(&DocRef::id(&id)).await.unwrap();
  let by_link = satchel.read(&DocRef::link("the-dune-copy")).await.unwrap();
  let by_pk = satchel
    .read(&DocRef::PrimaryKey {
      schema: "book".into(),
      values: obj(json!({ "title": "Dune", "author": "Herbert" })),
    })
    .await
    .unwrap();

  assert_eq!(by_id.id, Some(id.clone()));
  assert_eq!(by_link.id, Some(id.clone()));
  assert_eq!(by_pk.id, Some(id));
}

#[tokio::test]
async fn read_missing_document_is_not_found() {
  let satchel = engine().await;
  let err = satchel.read(&DocRef::id("nope")).await.unwrap_err();
  assert!(matches!(err, Error::DocNotFound(_)));
}

#[tokio::test]
async fn primary_key_read_names_missing_criteria_fields() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  let err = satchel
    .read(&DocRef::PrimaryKey {
      schema: "book".into(),
      values: obj(json!({ "title": "Dune" })),
    })
    .await
    .unwrap_err();
  let Error::Validation(issues) = err else { panic!("expected validation") };
  assert!(issues.0.iter().any(|i| i.path.as_deref() == Some("data.author")));
}

#[tokio::test]
async fn read_with_renders_schema_template() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  let id = create_book(&satchel, "Dune", "Herbert").await;

  let result = satchel
    .read_with(
      &DocRef::id(&id),
      &ReadOptions {
        include_schema: true,
        text_template:  Some("card".into()),
      },
    )
    .await
    .unwrap();
  assert_eq!(result.rendered.as_deref(), Some("Dune by Herbert"));
  assert_eq!(result.schema.unwrap().name, "book");

  // A missing template renders an inline marker, never an error.
  let result = satchel
    .read_with(
      &DocRef::id(&id),
      &ReadOptions { include_schema: false, text_template: Some("nope".into()) },
    )
    .await
    .unwrap();
  assert!(result.rendered.unwrap().starts_with("[template error:"));
}

// ─── Encryption ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn encrypted_fields_are_sealed_at_rest_and_plain_on_read() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;

  let doc = satchel
    .create(
      "book",
      obj(json!({
        "title": "Dune", "author": "Herbert",
        "secret_note": "signed first edition"
      })),
      None,
      None,
    )
    .await
    .unwrap();
  let id = doc.id.unwrap();

  let stored = satchel.backend.get(&id).await.unwrap().unwrap();
  assert_ne!(stored.data["secret_note"], "signed first edition");

  let read = satchel.read(&DocRef::id(&id)).await.unwrap();
  assert_eq!(read.data["secret_note"], "signed first edition");
}

#[tokio::test]
async fn search_returns_sealed_values_unless_asked() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  satchel
    .create(
      "book",
      obj(json!({ "title": "Dune", "author": "Herbert", "secret_note": "s" })),
      None,
      None,
    )
    .await
    .unwrap();

  let query = Query::with_selector(json!({ "schema": "book" }));
  let sealed = satchel.search(query.clone()).await.unwrap();
  assert_ne!(sealed[0].data["secret_note"], "s");

  let plain = satchel
    .search_with(query, SearchOptions { decrypt_docs: true })
    .await
    .unwrap();
  assert_eq!(plain[0].data["secret_note"], "s");
}

// ─── Update / delete ─────────────────────────────────────────────────────────

#[tokio::test]
async fn update_merges_and_drops_non_editable_fields() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  let id = create_book(&satchel, "Dune", "Herbert").await;

  let updated = satchel
    .update(&DocRef::id(&id), UpdateRequest {
      data: Some(obj(json!({ "genre": "sci-fi", "author": "Impostor" }))),
      update_source: Some("tests".into()),
      ..UpdateRequest::default()
    })
    .await
    .unwrap();

  assert_eq!(updated.data["genre"], "sci-fi");
  // Non-editable, silently dropped.
  assert_eq!(updated.data["author"], "Herbert");
  assert_eq!(updated.meta.updated_by.as_deref(), Some("tests"));
  assert!(updated.meta.updated_on.is_some());
}

#[tokio::test]
async fn update_with_no_effect_is_refused() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  let id = create_book(&satchel, "Dune", "Herbert").await;

  let err = satchel
    .update(&DocRef::id(&id), UpdateRequest {
      data: Some(obj(json!({ "author": "Impostor" }))),
      ..UpdateRequest::default()
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DocUpdate(_)));
}

#[tokio::test]
async fn update_to_occupied_primary_key_is_refused() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  create_book(&satchel, "Dune", "Herbert").await;
  let id = create_book(&satchel, "Draft", "Herbert").await;

  let err = satchel
    .update(&DocRef::id(&id), UpdateRequest {
      data: Some(obj(json!({ "title": "Dune" }))),
      ..UpdateRequest::default()
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DocUpdate(_)));
}

#[tokio::test]
async fn stale_revision_is_rejected_by_default() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  let id = create_book(&satchel, "Dune", "Herbert").await;

  let err = satchel
    .update(&DocRef::id(&id), UpdateRequest {
      data: Some(obj(json!({ "genre": "sci-fi" }))),
      expected_rev: Some("9-0000000000000000".into()),
      ..UpdateRequest::default()
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::StaleRevision { .. }));
}

#[tokio::test]
async fn stale_revision_overwrites_under_last_write_wins() {
  let satchel = engine_with(ConflictPolicy::LastWriteWins).await;
  install_book_schema(&satchel).await;
  let id = create_book(&satchel, "Dune", "Herbert").await;

  let updated = satchel
    .update(&DocRef::id(&id), UpdateRequest {
      data: Some(obj(json!({ "genre": "sci-fi" }))),
      expected_rev: Some("9-0000000000000000".into()),
      ..UpdateRequest::default()
    })
    .await
    .unwrap();
  assert_eq!(updated.data["genre"], "sci-fi");
}

#[tokio::test]
async fn matching_expected_rev_is_accepted() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  let doc = satchel
    .create("book", obj(json!({ "title": "Dune", "author": "H" })), None, None)
    .await
    .unwrap();

  let updated = satchel
    .update(&DocRef::id(doc.id.unwrap()), UpdateRequest {
      data: Some(obj(json!({ "genre": "sci-fi" }))),
      expected_rev: doc.rev,
      ..UpdateRequest::default()
    })
    .await
    .unwrap();
  assert_eq!(updated.data["genre"], "sci-fi");
}

#[tokio::test]
async fn app_section_is_namespaced_and_mode_driven() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  let id = create_book(&satchel, "Dune", "Herbert").await;

  let mut app = BTreeMap::new();
  app.insert("tracker".to_owned(), AppUpdate {
    mode:  "update".into(),
    value: json!({ "reads": 1 }),
  });
  satchel
    .update(&DocRef::id(&id), UpdateRequest {
      app: Some(app),
      ..UpdateRequest::default()
    })
    .await
    .unwrap();

  let mut app = BTreeMap::new();
  app.insert("tracker".to_owned(), AppUpdate {
    mode:  "append".into(),
    value: json!({ "history": "2026-01-01" }),
  });
  let doc = satchel
    .update(&DocRef::id(&id), UpdateRequest {
      app: Some(app),
      ..UpdateRequest::default()
    })
    .await
    .unwrap();
  assert_eq!(doc.app["tracker"]["reads"], 1);
  assert_eq!(doc.app["tracker"]["history"], json!(["2026-01-01"]));
}

#[tokio::test]
async fn system_generated_schemas_cannot_be_edited() {
  let satchel = engine().await;
  let err = satchel
    .update(
      &DocRef::PrimaryKey {
        schema: SCHEMA_KIND.into(),
        values: obj(json!({ "name": "system_key" })),
      },
      UpdateRequest {
        data: Some(obj(json!({ "description": "tampered" }))),
        ..UpdateRequest::default()
      },
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DocUpdate(_)));
}

#[tokio::test]
async fn delete_removes_ordinary_documents() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  let id = create_book(&satchel, "Dune", "Herbert").await;

  satchel.delete(&DocRef::id(&id)).await.unwrap();
  let err = satchel.read(&DocRef::id(&id)).await.unwrap_err();
  assert!(matches!(err, Error::DocNotFound(_)));
}

#[tokio::test]
async fn delete_refuses_protected_kinds() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  let err = satchel
    .delete(&DocRef::PrimaryKey {
      schema: SCHEMA_KIND.into(),
      values: obj(json!({ "name": "book" })),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Guard(kind) if kind == SCHEMA_KIND));
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_refuses_an_empty_selector() {
  let satchel = engine().await;
  let err = satchel.search(Query::default()).await.unwrap_err();
  assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn search_filters_by_dotted_paths() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  create_book(&satchel, "Dune", "Herbert").await;
  create_book(&satchel, "Emma", "Austen").await;

  let docs = satchel
    .search(Query::with_selector(json!({
      "schema": "book",
      "data.author": "Austen",
    })))
    .await
    .unwrap();
  assert_eq!(docs.len(), 1);
  assert_eq!(docs[0].data["title"], "Emma");
}

// ─── Graph ───────────────────────────────────────────────────────────────────

async fn wrote_constraint(satchel: &TestEngine, max_to_node2: i64) {
  satchel
    .create(
      EDGE_CONSTRAINT_KIND,
      obj(json!({
        "name": "wrote",
        "node1": "author",
        "node2": "book",
        "max_to_node2": max_to_node2,
      })),
      None,
      None,
    )
    .await
    .unwrap();
}

async fn create_author(satchel: &TestEngine, name: &str) -> String {
  let doc = satchel
    .create("author", obj(json!({ "name": name })), None, None)
    .await
    .unwrap();
  doc.id.unwrap()
}

#[tokio::test]
async fn edge_nodes_are_stored_in_constraint_orientation() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  install_author_schema(&satchel).await;
  wrote_constraint(&satchel, -1).await;
  let author = create_author(&satchel, "Herbert").await;
  let book = create_book(&satchel, "Dune", "Herbert").await;

  // Given backwards; the stored edge still reads author -> book.
  let edge = satchel
    .create_edge(EdgeInput {
      node1:     DocRef::id(&book),
      node2:     DocRef::id(&author),
      edge_name: "wrote".into(),
      note:      None,
    })
    .await
    .unwrap();
  assert_eq!(edge.data["node1"], json!(author));
  assert_eq!(edge.data["node2"], json!(book));
}

#[tokio::test]
async fn edge_cardinality_is_enforced() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  install_author_schema(&satchel).await;
  wrote_constraint(&satchel, 1).await;
  let herbert = create_author(&satchel, "Herbert").await;
  let austen = create_author(&satchel, "Austen").await;
  let book = create_book(&satchel, "Dune", "Herbert").await;

  satchel
    .create_edge(EdgeInput {
      node1:     DocRef::id(&herbert),
      node2:     DocRef::id(&book),
      edge_name: "wrote".into(),
      note:      None,
    })
    .await
    .unwrap();

  // The book already has its one incoming `wrote` edge.
  let err = satchel
    .create_edge(EdgeInput {
      node1:     DocRef::id(&austen),
      node2:     DocRef::id(&book),
      edge_name: "wrote".into(),
      note:      None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Relation(_)));
}

#[tokio::test]
async fn edge_schema_mismatch_is_refused() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  install_author_schema(&satchel).await;
  wrote_constraint(&satchel, -1).await;
  let a = create_author(&satchel, "Herbert").await;
  let b = create_author(&satchel, "Austen").await;

  // author -> author fits neither orientation of author -> book.
  let err = satchel
    .create_edge(EdgeInput {
      node1:     DocRef::id(&a),
      node2:     DocRef::id(&b),
      edge_name: "wrote".into(),
      note:      None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Relation(_)));
}

#[tokio::test]
async fn self_edges_are_refused() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  let id = create_book(&satchel, "Dune", "Herbert").await;

  let err = satchel
    .create_edge(EdgeInput {
      node1:     DocRef::id(&id),
      node2:     DocRef::id(&id),
      edge_name: "references".into(),
      note:      None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Relation(_)));
}

#[tokio::test]
async fn first_use_of_an_edge_name_installs_a_permissive_constraint() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  let a = create_book(&satchel, "Dune", "Herbert").await;
  let b = create_book(&satchel, "Messiah", "Herbert").await;

  satchel
    .create_edge(EdgeInput {
      node1:     DocRef::id(&a),
      node2:     DocRef::id(&b),
      edge_name: "sequel".into(),
      note:      Some("direct sequel".into()),
    })
    .await
    .unwrap();

  let constraints = satchel
    .search(Query::with_selector(json!({
      "schema": EDGE_CONSTRAINT_KIND,
      "data.name": "sequel",
    })))
    .await
    .unwrap();
  assert_eq!(constraints.len(), 1);
  assert_eq!(constraints[0].data["node1"], "*");
  assert_eq!(constraints[0].data["max_from_node1"], -1);
}

#[tokio::test]
async fn edges_can_reference_nodes_by_primary_key_criteria() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  install_author_schema(&satchel).await;
  wrote_constraint(&satchel, -1).await;
  create_author(&satchel, "Herbert").await;
  create_book(&satchel, "Dune", "Herbert").await;

  let edge = satchel
    .create(
      EDGE_KIND,
      obj(json!({
        "node1": { "schema": "author", "name": "Herbert" },
        "node2": { "schema": "book", "title": "Dune", "author": "Herbert" },
        "edge_name": "wrote",
      })),
      None,
      None,
    )
    .await
    .unwrap();
  // Criteria were resolved down to ids.
  assert!(edge.data["node1"].is_string());
  assert!(edge.data["node2"].is_string());
}

// ─── Keys and settings ───────────────────────────────────────────────────────

#[tokio::test]
async fn keys_round_trip_and_are_sealed_at_rest() {
  let satchel = engine().await;
  let doc = satchel
    .put_key("api_token", "hunter2-hunter2", Some("test token"))
    .await
    .unwrap();
  assert_ne!(doc.data["value"], "hunter2-hunter2");

  let value = satchel.get_key("api_token").await.unwrap();
  assert_eq!(value, "hunter2-hunter2");

  let err = satchel
    .put_key("api_token", "other", None)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DocCreation(_)));
}

#[tokio::test]
async fn version_marker_is_recorded_as_a_setting() {
  let satchel = engine().await;
  let value = satchel.get_setting(VERSION_SETTING).await.unwrap();
  assert_eq!(value, Some(json!(aggregate_version())));
}

// ─── App bundles ─────────────────────────────────────────────────────────────

fn notes_bundle() -> AppBundle {
  let schema = obj(json!({
    "name": "note",
    "version": 2,
    "schema": {
      "type": "object",
      "properties": {
        "slug": { "type": "string" },
        "body": { "type": "string", "default": "" }
      },
      "required": ["slug"]
    },
    "settings": { "primary_keys": ["slug"] }
  }));
  AppBundle {
    name:     "notes".into(),
    schemas:  vec![
      satchel_core::schema::SchemaSpec::from_data(&schema).unwrap(),
    ],
    records:  vec![("note".into(), obj(json!({ "slug": "welcome" })))],
    settings: vec![("notes_theme".into(), json!("dark"))],
  }
}

#[tokio::test]
async fn app_bundles_install_idempotently() {
  let satchel = engine().await;

  let report = satchel.install_app(&notes_bundle()).await.unwrap();
  assert!(report.changed);
  assert_eq!(report.installed, vec!["note".to_owned()]);

  let spec = satchel.resolve_schema("note").await.unwrap();
  assert_eq!(spec.settings.install_source.as_deref(), Some("notes"));

  let welcome = DocRef::PrimaryKey {
    schema: "note".into(),
    values: obj(json!({ "slug": "welcome" })),
  };
  assert!(satchel.read(&welcome).await.is_ok());
  assert_eq!(
    satchel.get_setting("notes_theme").await.unwrap(),
    Some(json!("dark"))
  );

  // Reinstalling the same version is a no-op, and the default record is
  // not duplicated.
  let report = satchel.install_app(&notes_bundle()).await.unwrap();
  assert!(!report.changed);
  let notes = satchel
    .search(Query::with_selector(json!({ "schema": "note" })))
    .await
    .unwrap();
  assert_eq!(notes.len(), 1);
}

#[tokio::test]
async fn update_indexes_covers_stored_schemas() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  satchel.update_indexes().await.unwrap();
}

// ─── Partial bootstrap recovery ──────────────────────────────────────────────

/// Delegates to a real [`SqliteBackend`] but fails the first insert of the
/// `system_media` schema document, simulating a transient storage fault
/// mid-bootstrap.
#[derive(Clone)]
struct FlakyBackend {
  inner:     SqliteBackend,
  fail_once: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl DocumentBackend for FlakyBackend {
  type Error = satchel_store_sqlite::Error;

  async fn insert(
    &self,
    doc: satchel_core::document::Document,
  ) -> Result<satchel_core::backend::DocHandle, Self::Error> {
    if doc.schema == SCHEMA_KIND
      && doc.data.get("name").and_then(Value::as_str) == Some(MEDIA_KIND)
      && self.fail_once.swap(false, std::sync::atomic::Ordering::SeqCst)
    {
      return Err(satchel_store_sqlite::Error::NotFound(
        "injected fault".into(),
      ));
    }
    self.inner.insert(doc).await
  }

  async fn update(
    &self,
    doc: satchel_core::document::Document,
  ) -> Result<satchel_core::backend::DocHandle, Self::Error> {
    self.inner.update(doc).await
  }

  async fn delete(&self, id: &str) -> Result<(), Self::Error> {
    self.inner.delete(id).await
  }

  async fn get(
    &self,
    id: &str,
  ) -> Result<Option<satchel_core::document::Document>, Self::Error> {
    self.inner.get(id).await
  }

  async fn search(
    &self,
    query: &Query,
  ) -> Result<Vec<satchel_core::document::Document>, Self::Error> {
    self.inner.search(query).await
  }

  async fn create_index(&self, fields: &[String]) -> Result<(), Self::Error> {
    self.inner.create_index(fields).await
  }

  async fn ping(&self) -> Result<(), Self::Error> {
    self.inner.ping().await
  }
}

#[tokio::test]
async fn bootstrap_retries_failed_installs_on_next_run() {
  let backend = FlakyBackend {
    inner:     SqliteBackend::open_in_memory().await.unwrap(),
    fail_once: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)),
  };
  let satchel = Satchel::new(
    Config::new("test", "test-db", TEST_KEY),
    backend,
    GcmFieldCrypto,
    SubsetValidator,
  )
  .unwrap();

  // First run survives the fault but leaves a hole in the registry.
  let report = satchel.initialize().await.unwrap();
  assert!(report.changed);
  assert!(matches!(
    satchel.resolve_schema(MEDIA_KIND).await,
    Err(Error::SchemaNotFound(_))
  ));

  // The marker was withheld, so the next run re-reconciles and fills the
  // hole now that the backend is healthy again.
  let report = satchel.initialize().await.unwrap();
  assert!(report.changed);
  assert!(report.installed.contains(&MEDIA_KIND.to_owned()));
  assert!(satchel.resolve_schema(MEDIA_KIND).await.is_ok());

  // Third run is the ordinary short-circuit.
  let report = satchel.initialize().await.unwrap();
  assert!(!report.changed);
}

// ─── Outgoing cardinality ────────────────────────────────────────────────────

#[tokio::test]
async fn edge_outgoing_cardinality_is_enforced() {
  let satchel = engine().await;
  install_book_schema(&satchel).await;
  install_author_schema(&satchel).await;
  satchel
    .create(
      EDGE_CONSTRAINT_KIND,
      obj(json!({
        "name": "wrote",
        "node1": "author",
        "node2": "book",
        "max_from_node1": 1,
      })),
      None,
      None,
    )
    .await
    .unwrap();
  let herbert = create_author(&satchel, "Herbert").await;
  let dune = create_book(&satchel, "Dune", "Herbert").await;
  let messiah = create_book(&satchel, "Messiah", "Herbert").await;

  satchel
    .create_edge(EdgeInput {
      node1:     DocRef::id(&herbert),
      node2:     DocRef::id(&dune),
      edge_name: "wrote".into(),
      note:      None,
    })
    .await
    .unwrap();

  // The author already has their one outgoing `wrote` edge.
  let err = satchel
    .create_edge(EdgeInput {
      node1:     DocRef::id(&herbert),
      node2:     DocRef::id(&messiah),
      edge_name: "wrote".into(),
      note:      None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Relation(_)));
}

// ─── Wrong-key reads ─────────────────────────────────────────────────────────

#[tokio::test]
async fn reading_with_a_different_key_is_an_encryption_error() {
  let backend = SqliteBackend::open_in_memory().await.unwrap();
  let writer = Satchel::new(
    Config::new("writer", "shared-db", TEST_KEY),
    backend.clone(),
    GcmFieldCrypto,
    SubsetValidator,
  )
  .unwrap();
  writer.initialize().await.unwrap();
  install_book_schema(&writer).await;
  let doc = writer
    .create(
      "book",
      obj(json!({
        "title": "Dune", "author": "Herbert",
        "secret_note": "signed first edition"
      })),
      None,
      None,
    )
    .await
    .unwrap();
  let id = doc.id.unwrap();

  // Same database, different passphrase.
  let reader = Satchel::new(
    Config::new("reader", "shared-db", "an-entirely-different-key"),
    backend,
    GcmFieldCrypto,
    SubsetValidator,
  )
  .unwrap();
  reader.initialize().await.unwrap();

  let err = reader.read(&DocRef::id(&id)).await.unwrap_err();
  assert!(matches!(err, Error::Encryption(_)));
}
