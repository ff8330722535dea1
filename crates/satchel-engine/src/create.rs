//! Document creation and the shared pre-commit pipeline helpers
//! (validation, uniqueness probes, field encryption, link generation).

use satchel_core::{
  Error, Issue, Result,
  backend::{DocumentBackend, Query},
  document::Document,
  provider::{FieldCrypto, SchemaValidator},
  schema::{SchemaSpec, editable_meta_schema},
};
use serde_json::{Map, Value, json};

use crate::{
  Satchel, link, schema_rules,
  system::{EDGE_KIND, SCHEMA_KIND},
};

impl<B, C, V> Satchel<B, C, V>
where
  B: DocumentBackend,
  C: FieldCrypto,
  V: SchemaValidator,
{
  /// Create a document of kind `schema_name`.
  ///
  /// Runs the full pre-insert pipeline: active-schema gate, JSON-Schema
  /// validation (with defaults applied), editable-metadata validation,
  /// link uniqueness, schema meta-validation for `schema` documents,
  /// graph validation for `system_edge` documents, primary-key duplicate
  /// rejection and field encryption — then hands the assembled envelope
  /// to the backend.
  pub async fn create(
    &self,
    schema_name: &str,
    data: Map<String, Value>,
    meta: Option<Map<String, Value>>,
    app: Option<Map<String, Value>>,
  ) -> Result<Document> {
    self.guard_active()?;

    let mut issues = Vec::new();
    if schema_name.trim().is_empty() {
      issues.push(Issue::at("schema", "a schema name is required"));
    }
    if data.is_empty() {
      issues.push(Issue::at("data", "must not be empty"));
    }
    if !issues.is_empty() {
      return Err(Error::DocCreation(issues.into()));
    }

    let spec = self.resolve_schema(schema_name).await?;
    if !spec.active {
      return Err(Error::creation(format!(
        "schema `{schema_name}` is inactive and accepts no new documents"
      )));
    }

    // Edges are recomputed by the graph subsystem before validation: node
    // criteria resolve to ids and the constraint rules decide the stored
    // node order.
    let data = if schema_name == EDGE_KIND {
      self.normalize_edge_data(&data, None).await?
    } else {
      data
    };
    let data = self.check_data(&spec.schema, data, "data")?;

    let meta_updates = match meta {
      Some(m) => self.check_data(&editable_meta_schema(), m, "meta")?,
      None => Map::new(),
    };
    if let Some(wanted) = meta_updates.get("link").and_then(Value::as_str) {
      if self.link_taken(wanted, None).await? {
        return Err(Error::creation(format!("link `{wanted}` is already taken")));
      }
    }

    // A schema document describes future validation rules, so it gets the
    // dedicated structural check on top of the meta-schema pass above.
    if schema_name == SCHEMA_KIND {
      let candidate = SchemaSpec::from_data(&data)?;
      schema_rules::meta_validate(&candidate)?;
    }

    if self.primary_key_taken(&spec, &data, None).await? {
      return Err(Error::creation(format!(
        "a `{schema_name}` document with the same primary key already exists"
      )));
    }

    let data = self.encrypt_fields(&spec, data)?;

    let assigned_link = match meta_updates.get("link").and_then(Value::as_str) {
      Some(wanted) => wanted.to_owned(),
      None => self.generate_link().await?,
    };
    let mut doc = Document::blank(schema_name, assigned_link);
    doc.data = data;
    if let Some(tags) = meta_updates.get("tags") {
      doc.meta.tags = serde_json::from_value(tags.clone())?;
    }
    if let Some(title) = meta_updates.get("title").and_then(Value::as_str) {
      doc.meta.title = Some(title.to_owned());
    }
    if let Some(app) = app {
      for (namespace, value) in &app {
        if !value.is_object() {
          return Err(Error::validation(Issue::at(
            format!("app.{namespace}"),
            "app namespace values must be objects",
          )));
        }
      }
      doc.app = app;
    }

    let handle = self.backend.insert(doc.clone()).await.map_err(Error::backend)?;
    doc.id = Some(handle.id.clone());
    doc.rev = handle.rev;
    tracing::debug!(schema = schema_name, id = %handle.id, "document created");
    Ok(doc)
  }

  // ── Pipeline helpers (shared with update/bootstrap) ───────────────────

  /// Validate `data` against `schema`, returning the object with defaults
  /// applied. Issue paths are prefixed with `prefix` ("data" / "meta").
  pub(crate) fn check_data(
    &self,
    schema: &Value,
    data: Map<String, Value>,
    prefix: &str,
  ) -> Result<Map<String, Value>> {
    let report = self.validator.validate(schema, &Value::Object(data));
    if !report.valid {
      let issues: Vec<Issue> = report
        .issues
        .into_iter()
        .map(|i| match i.path {
          Some(p) => Issue::at(format!("{prefix}.{p}"), i.message),
          None => Issue::at(prefix, i.message),
        })
        .collect();
      return Err(Error::Validation(issues.into()));
    }
    match report.data {
      Value::Object(map) => Ok(map),
      _ => Err(Error::validation(Issue::at(prefix, "must be an object"))),
    }
  }

  /// Whether any document other than `exclude` already owns `link`.
  pub(crate) async fn link_taken(
    &self,
    wanted: &str,
    exclude: Option<&str>,
  ) -> Result<bool> {
    let query = Query::with_selector(json!({ "meta.link": wanted }));
    let docs = self.backend.search(&query).await.map_err(Error::backend)?;
    Ok(docs.iter().any(|d| d.id.as_deref() != exclude))
  }

  /// Whether another document of `spec`'s kind already holds the primary
  /// key values present in `data`. Always false for schemas without
  /// primary keys.
  pub(crate) async fn primary_key_taken(
    &self,
    spec: &SchemaSpec,
    data: &Map<String, Value>,
    exclude: Option<&str>,
  ) -> Result<bool> {
    if spec.settings.primary_keys.is_empty() {
      return Ok(false);
    }
    let mut selector = Map::new();
    selector.insert("schema".into(), Value::String(spec.name.clone()));
    for pk in &spec.settings.primary_keys {
      selector.insert(
        format!("data.{pk}"),
        data.get(pk).cloned().unwrap_or(Value::Null),
      );
    }
    let query = Query { selector, limit: None, fields: None };
    let docs = self.backend.search(&query).await.map_err(Error::backend)?;
    Ok(docs.iter().any(|d| d.id.as_deref() != exclude))
  }

  /// Replace each encrypted field's plaintext with ciphertext.
  pub(crate) fn encrypt_fields(
    &self,
    spec: &SchemaSpec,
    mut data: Map<String, Value>,
  ) -> Result<Map<String, Value>> {
    for field in &spec.settings.encrypted_fields {
      let Some(value) = data.get(field) else { continue };
      let plain = value.as_str().ok_or_else(|| {
        Error::validation(Issue::at(
          format!("data.{field}"),
          "encrypted fields must be strings",
        ))
      })?;
      let sealed = self
        .crypto
        .encrypt(plain, &self.config.encryption_key)
        .map_err(|e| {
          Error::Encryption(Issue::at(format!("data.{field}"), e.to_string()).into())
        })?;
      data.insert(field.clone(), Value::String(sealed));
    }
    Ok(data)
  }

  /// Inverse of [`Self::encrypt_fields`]; reads always return plaintext.
  pub(crate) fn decrypt_fields(
    &self,
    spec: &SchemaSpec,
    mut data: Map<String, Value>,
  ) -> Result<Map<String, Value>> {
    for field in &spec.settings.encrypted_fields {
      let Some(value) = data.get(field) else { continue };
      let sealed = value.as_str().ok_or_else(|| {
        Error::encryption(format!("data.{field} is not a string ciphertext"))
      })?;
      let plain = self
        .crypto
        .decrypt(sealed, &self.config.encryption_key)
        .map_err(|e| {
          Error::Encryption(Issue::at(format!("data.{field}"), e.to_string()).into())
        })?;
      data.insert(field.clone(), Value::String(plain));
    }
    Ok(data)
  }

  /// A fresh, globally unique link slug. Collisions are rare, so a few
  /// retries suffice; the suffixed fallback handles the pathological case.
  pub(crate) async fn generate_link(&self) -> Result<String> {
    for _ in 0..8 {
      let candidate = link::random_slug();
      if !self.link_taken(&candidate, None).await? {
        return Ok(candidate);
      }
    }
    let candidate = format!("{}-{}", link::random_slug(), link::random_suffix());
    if self.link_taken(&candidate, None).await? {
      return Err(Error::creation("could not generate a unique link"));
    }
    Ok(candidate)
  }
}
