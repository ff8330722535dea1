//! Updating and deleting documents.
//!
//! Updates are merges, not replacements: data payloads are filtered to the
//! schema's editable fields, shallow-merged over the stored values and
//! re-validated; metadata goes through the editable-meta schema; the `app`
//! section is edited per-namespace with explicit modes. An update that
//! changes nothing is refused so callers notice ineffective requests.

use std::collections::BTreeMap;

use satchel_core::{
  Error, Result,
  backend::DocumentBackend,
  document::Document,
  provider::{FieldCrypto, SchemaValidator},
  schema::{SchemaSpec, editable_meta_schema},
};
use serde_json::{Map, Value};

use crate::{
  ConflictPolicy, Satchel,
  read::DocRef,
  schema_rules,
  system::{EDGE_KIND, PROTECTED_KINDS, SCHEMA_KIND},
  unix_now,
};

// ─── Request types ───────────────────────────────────────────────────────────

/// One namespace's worth of `app` edits. Modes: `"update"` shallow-merges,
/// `"replace"` swaps the whole namespace object, `"append"` pushes each
/// value onto the named array fields, `"remove"` drops the namespace.
#[derive(Debug, Clone)]
pub struct AppUpdate {
  pub mode:  String,
  pub value: Value,
}

/// Everything an update may carry; all sections optional.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
  pub data:          Option<Map<String, Value>>,
  pub meta:          Option<Map<String, Value>>,
  pub app:           Option<BTreeMap<String, AppUpdate>>,
  /// Revision token the caller last saw; a mismatch triggers the
  /// configured [`ConflictPolicy`].
  pub expected_rev:  Option<String>,
  /// Recorded in `meta.updated_by`.
  pub update_source: Option<String>,
}

// ─── Engine methods ──────────────────────────────────────────────────────────

impl<B, C, V> Satchel<B, C, V>
where
  B: DocumentBackend,
  C: FieldCrypto,
  V: SchemaValidator,
{
  /// Merge `request` into the addressed document and persist it. Returns
  /// the updated document with encrypted fields as plaintext.
  pub async fn update(
    &self,
    target: &DocRef,
    request: UpdateRequest,
  ) -> Result<Document> {
    self.guard_active()?;
    let (mut doc, spec) = self.locate(target).await?;

    if let Some(expected) = &request.expected_rev {
      if doc.rev.as_deref() != Some(expected.as_str()) {
        match self.config.conflict_policy {
          ConflictPolicy::Reject => {
            return Err(Error::StaleRevision {
              id:       doc.id.clone().unwrap_or_default(),
              expected: expected.clone(),
              stored:   doc.rev.clone().unwrap_or_default(),
            });
          }
          ConflictPolicy::LastWriteWins => {
            tracing::warn!(
              id = doc.id.as_deref().unwrap_or(""),
              "stale revision ignored, overwriting"
            );
          }
        }
      }
    }

    if doc.schema == SCHEMA_KIND
      && doc.data.get("system_generated").and_then(Value::as_bool)
        == Some(true)
    {
      return Err(Error::update("system-generated schemas cannot be edited"));
    }

    doc.data = self.decrypt_fields(&spec, doc.data)?;
    let before = (doc.data.clone(), doc.meta.clone(), doc.app.clone());

    if let Some(updates) = request.data {
      self.apply_data_updates(&mut doc, &spec, updates).await?;
    }
    if let Some(updates) = request.meta {
      self.apply_meta_updates(&mut doc, updates).await?;
    }
    if let Some(updates) = request.app {
      apply_app_updates(&mut doc.app, updates)?;
    }

    if (&doc.data, &doc.meta, &doc.app) == (&before.0, &before.1, &before.2) {
      return Err(Error::update("nothing to update"));
    }

    doc.meta.updated_on = Some(unix_now());
    doc.meta.updated_by = request.update_source;

    doc.data = self.encrypt_fields(&spec, doc.data)?;
    let handle =
      self.backend.update(doc.clone()).await.map_err(Error::backend)?;
    doc.rev = handle.rev;
    tracing::debug!(
      schema = %doc.schema,
      id = doc.id.as_deref().unwrap_or(""),
      "document updated"
    );
    doc.data = self.decrypt_fields(&spec, doc.data)?;
    Ok(doc)
  }

  /// Delete the addressed document. Registry and audit kinds are refused.
  pub async fn delete(&self, target: &DocRef) -> Result<()> {
    self.guard_active()?;
    let (doc, _) = self.locate(target).await?;
    if PROTECTED_KINDS.contains(&doc.schema.as_str()) {
      return Err(Error::Guard(doc.schema));
    }
    let id = doc
      .id
      .ok_or_else(|| Error::not_found("document has no id to delete by"))?;
    self.backend.delete(&id).await.map_err(Error::backend)?;
    tracing::debug!(id = %id, "document deleted");
    Ok(())
  }

  async fn apply_data_updates(
    &self,
    doc: &mut Document,
    spec: &SchemaSpec,
    updates: Map<String, Value>,
  ) -> Result<()> {
    // Non-editable fields are dropped, not rejected, so callers can echo a
    // whole document back with small changes.
    let editable = spec.edit_fields();
    let filtered: Map<String, Value> = updates
      .into_iter()
      .filter(|(k, _)| editable.contains(k))
      .collect();
    if filtered.is_empty() {
      return Ok(());
    }

    let mut merged = doc.data.clone();
    for (k, v) in filtered {
      merged.insert(k, v);
    }
    let merged = self.check_data(&spec.schema, merged, "data")?;

    if doc.schema == SCHEMA_KIND {
      let candidate = SchemaSpec::from_data(&merged)?;
      schema_rules::meta_validate(&candidate)?;
    }
    let merged = if doc.schema == EDGE_KIND {
      self.normalize_edge_data(&merged, doc.id.as_deref()).await?
    } else {
      merged
    };

    let pk_changed = spec
      .settings
      .primary_keys
      .iter()
      .any(|pk| merged.get(pk) != doc.data.get(pk));
    if pk_changed
      && self.primary_key_taken(spec, &merged, doc.id.as_deref()).await?
    {
      return Err(Error::update(format!(
        "another `{}` document already holds this primary key",
        spec.name
      )));
    }

    doc.data = merged;
    Ok(())
  }

  async fn apply_meta_updates(
    &self,
    doc: &mut Document,
    updates: Map<String, Value>,
  ) -> Result<()> {
    let updates = self.check_data(&editable_meta_schema(), updates, "meta")?;
    if let Some(wanted) = updates.get("link").and_then(Value::as_str) {
      if wanted != doc.meta.link {
        if self.link_taken(wanted, doc.id.as_deref()).await? {
          return Err(Error::update(format!(
            "link `{wanted}` is already taken"
          )));
        }
        doc.meta.link = wanted.to_owned();
      }
    }
    if let Some(tags) = updates.get("tags") {
      doc.meta.tags = serde_json::from_value(tags.clone())?;
    }
    if let Some(title) = updates.get("title").and_then(Value::as_str) {
      doc.meta.title = Some(title.to_owned());
    }
    Ok(())
  }
}

fn apply_app_updates(
  app: &mut Map<String, Value>,
  updates: BTreeMap<String, AppUpdate>,
) -> Result<()> {
  for (namespace, update) in updates {
    match update.mode.as_str() {
      "replace" => {
        if !update.value.is_object() {
          return Err(Error::update(format!(
            "app.{namespace}: replacement value must be an object"
          )));
        }
        app.insert(namespace, update.value);
      }
      "update" => {
        let Value::Object(incoming) = update.value else {
          return Err(Error::update(format!(
            "app.{namespace}: update value must be an object"
          )));
        };
        let entry = app
          .entry(namespace.clone())
          .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(existing) = entry else {
          return Err(Error::update(format!(
            "app.{namespace}: existing value is not an object"
          )));
        };
        for (k, v) in incoming {
          existing.insert(k, v);
        }
      }
      "append" => {
        let Value::Object(incoming) = update.value else {
          return Err(Error::update(format!(
            "app.{namespace}: append value must be an object of arrays"
          )));
        };
        let entry = app
          .entry(namespace.clone())
          .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(existing) = entry else {
          return Err(Error::update(format!(
            "app.{namespace}: existing value is not an object"
          )));
        };
        for (field, item) in incoming {
          match existing.get_mut(&field) {
            None => {
              existing.insert(field, Value::Array(vec![item]));
            }
            Some(Value::Array(arr)) => arr.push(item),
            Some(_) => {
              return Err(Error::update(format!(
                "app.{namespace}.{field}: cannot append to a non-array"
              )));
            }
          }
        }
      }
      "remove" => {
        app.remove(&namespace);
      }
      other => {
        return Err(Error::update(format!(
          "app.{namespace}: unknown update mode `{other}`"
        )));
      }
    }
  }
  Ok(())
}
