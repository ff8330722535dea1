//! Typed view of a schema document's `data`.
//!
//! A schema document is an ordinary [`Document`](crate::document::Document)
//! whose kind is `"schema"` and whose `data` deserializes into
//! [`SchemaSpec`]: a JSON-Schema body plus the settings that drive the
//! lifecycle engine (primary keys, editability, encryption).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{Issue, Result, error::Error};

// ─── Settings ────────────────────────────────────────────────────────────────

/// A named text template declared by a schema, rendered on read when the
/// caller asks for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
  /// Name of the registered template engine; `"plain"` is built in.
  #[serde(default = "default_engine")]
  pub engine: String,
  pub text:   String,
}

fn default_engine() -> String { "plain".into() }

/// Lifecycle settings attached to a schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaSettings {
  /// Field names whose combined values must be unique within this schema's
  /// documents. Empty means no uniqueness constraint.
  #[serde(default)]
  pub primary_keys:        Vec<String>,
  /// Fields silently dropped from update payloads.
  #[serde(default)]
  pub non_editable_fields: Vec<String>,
  /// String-typed fields stored encrypted; must not overlap primary keys.
  #[serde(default)]
  pub encrypted_fields:    Vec<String>,
  /// Hint for consumers rendering lists; the core does not interpret it.
  #[serde(default)]
  pub display_fields:      Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub install_source:      Option<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub templates:           BTreeMap<String, TemplateSpec>,
}

// ─── SchemaSpec ──────────────────────────────────────────────────────────────

/// The `data` of a schema document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSpec {
  /// Immutable, pattern-constrained identifier (`^[a-z][a-z0-9_]*$`).
  pub name:             String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title:            Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description:      Option<String>,
  /// Bumped on every shape change; summed across built-in schemas to form
  /// the aggregate database version.
  #[serde(default = "default_version")]
  pub version:          u32,
  /// Gates creation of new documents only — inactive schemas still accept
  /// edits of existing documents.
  #[serde(default = "default_true")]
  pub active:           bool,
  /// Set on schemas installed by bootstrap; such schemas cannot be edited
  /// through the ordinary update path.
  #[serde(default)]
  pub system_generated: bool,
  /// JSON-Schema object validating documents of this kind.
  pub schema:           Value,
  #[serde(default)]
  pub settings:         SchemaSettings,
}

fn default_version() -> u32 { 1 }
fn default_true() -> bool { true }

impl SchemaSpec {
  /// Deserialize from a schema document's `data`.
  pub fn from_data(data: &Map<String, Value>) -> Result<Self> {
    serde_json::from_value(Value::Object(data.clone())).map_err(|e| {
      Error::Validation(
        Issue::at("data", format!("not a valid schema document: {e}")).into(),
      )
    })
  }

  /// Serialize back into a document `data` map.
  pub fn to_data(&self) -> Result<Map<String, Value>> {
    match serde_json::to_value(self)? {
      Value::Object(map) => Ok(map),
      _ => unreachable!("SchemaSpec serializes to an object"),
    }
  }

  /// The `properties` map of the JSON-Schema body.
  pub fn properties(&self) -> Option<&Map<String, Value>> {
    self.schema.get("properties").and_then(Value::as_object)
  }

  /// The declared JSON-Schema `type` of one property, if any.
  pub fn property_type(&self, field: &str) -> Option<&str> {
    self
      .properties()
      .and_then(|p| p.get(field))
      .and_then(|f| f.get("type"))
      .and_then(Value::as_str)
  }

  /// All property names minus `non_editable_fields` — the keys an update
  /// payload is allowed to touch.
  pub fn edit_fields(&self) -> Vec<String> {
    let Some(props) = self.properties() else {
      return Vec::new();
    };
    props
      .keys()
      .filter(|k| !self.settings.non_editable_fields.contains(k))
      .cloned()
      .collect()
  }
}

// ─── Editable metadata ───────────────────────────────────────────────────────

/// The fixed JSON-Schema for caller-editable metadata. `created_on` and the
/// update stamps are engine-owned and deliberately absent.
pub fn editable_meta_schema() -> Value {
  json!({
    "type": "object",
    "additionalProperties": false,
    "properties": {
      "tags":  { "type": "array", "items": { "type": "string" } },
      "link":  { "type": "string", "minLength": 2, "maxLength": 500 },
      "title": { "type": "string", "maxLength": 500 }
    }
  })
}
