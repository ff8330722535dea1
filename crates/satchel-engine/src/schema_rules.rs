//! Schema lookup and the meta-validation of schema documents.
//!
//! A schema document describes the rules that will later validate other
//! documents, so it gets a dedicated structural check on top of ordinary
//! JSON-Schema validation against the meta-schema.

use satchel_core::{
  Error, Issue, Result,
  backend::{DocumentBackend, Query},
  document::Document,
  provider::{FieldCrypto, SchemaValidator},
  schema::SchemaSpec,
};
use serde_json::{Value, json};

use crate::{Satchel, system::SCHEMA_KIND};

impl<B, C, V> Satchel<B, C, V>
where
  B: DocumentBackend,
  C: FieldCrypto,
  V: SchemaValidator,
{
  /// Look up the schema document governing `name`. Not-found is
  /// [`Error::SchemaNotFound`] — never a silent `None` — so callers can
  /// distinguish "needs install" from a real error.
  pub async fn resolve_schema(&self, name: &str) -> Result<SchemaSpec> {
    match self.find_schema_doc(name).await? {
      Some((_, spec)) => Ok(spec),
      None => Err(Error::SchemaNotFound(name.to_owned())),
    }
  }

  /// The raw schema document and its typed view, when it exists.
  pub(crate) async fn find_schema_doc(
    &self,
    name: &str,
  ) -> Result<Option<(Document, SchemaSpec)>> {
    let query = Query::with_selector(json!({
      "schema": SCHEMA_KIND,
      "data.name": name,
    }))
    .limit(1);
    let mut docs = self.backend.search(&query).await.map_err(Error::backend)?;
    match docs.pop() {
      Some(doc) => {
        let spec = SchemaSpec::from_data(&doc.data)?;
        Ok(Some((doc, spec)))
      }
      None => Ok(None),
    }
  }
}

/// Structural rules every schema document must satisfy beyond the
/// meta-schema: settings may only reference fields that exist, primary
/// keys must be scalar, encrypted fields must be strings and must not
/// double as primary keys.
pub(crate) fn meta_validate(spec: &SchemaSpec) -> Result<()> {
  let mut issues = Vec::new();

  if spec.schema.get("type").and_then(Value::as_str) != Some("object") {
    issues.push(Issue::at("data.schema.type", "must be \"object\""));
  }

  let properties = spec.properties().cloned().unwrap_or_default();
  if properties.is_empty() {
    issues.push(Issue::at(
      "data.schema.properties",
      "must declare at least one property",
    ));
  }

  let field_type = |field: &str| -> Option<&str> {
    properties
      .get(field)
      .and_then(|p| p.get("type"))
      .and_then(Value::as_str)
  };

  for pk in &spec.settings.primary_keys {
    if !properties.contains_key(pk) {
      issues.push(Issue::at(
        "data.settings.primary_keys",
        format!("`{pk}` is not a schema property"),
      ));
    } else if matches!(field_type(pk), Some("object" | "array")) {
      issues.push(Issue::at(
        "data.settings.primary_keys",
        format!("`{pk}` must not be object- or array-typed"),
      ));
    }
  }

  for field in &spec.settings.non_editable_fields {
    if !properties.contains_key(field) {
      issues.push(Issue::at(
        "data.settings.non_editable_fields",
        format!("`{field}` is not a schema property"),
      ));
    }
  }

  for field in &spec.settings.encrypted_fields {
    if !properties.contains_key(field) {
      issues.push(Issue::at(
        "data.settings.encrypted_fields",
        format!("`{field}` is not a schema property"),
      ));
    } else if field_type(field) != Some("string") {
      issues.push(Issue::at(
        "data.settings.encrypted_fields",
        format!("`{field}` must be string-typed"),
      ));
    }
    if spec.settings.primary_keys.contains(field) {
      issues.push(Issue::at(
        "data.settings.encrypted_fields",
        format!("`{field}` cannot be both encrypted and a primary key"),
      ));
    }
  }

  if issues.is_empty() {
    Ok(())
  } else {
    Err(Error::Validation(issues.into()))
  }
}
