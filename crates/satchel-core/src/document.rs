//! The universal document envelope.
//!
//! Every record — ordinary data, schema documents, edges, settings, logs —
//! is stored in the same envelope: a backend-assigned identity, the name of
//! the governing schema, the schema-shaped `data` payload, bookkeeping
//! `meta`, and an opaque per-app `app` section.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bookkeeping metadata carried by every document.
///
/// `link` is a globally unique human-memorable slug, assigned at creation
/// and usable as an alternate lookup key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMeta {
  /// Unix timestamp (seconds), set once at creation.
  pub created_on: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_on: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_by: Option<String>,
  #[serde(default)]
  pub tags:       Vec<String>,
  pub link:       String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title:      Option<String>,
}

/// A stored document. Field names on the wire follow the Mango convention
/// (`_id`, `_rev`); both are backend-assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
  pub id:     Option<String>,
  /// Opaque concurrency token. Best-effort: backends without revisions may
  /// leave it `None`.
  #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
  pub rev:    Option<String>,
  /// Name of the governing schema document, e.g. `"book"` or `"schema"`.
  pub schema: String,
  pub data:   Map<String, Value>,
  pub meta:   DocMeta,
  /// External-app namespace → opaque object. The core only requires the
  /// values to be objects; consumers layer their own features here.
  #[serde(default, skip_serializing_if = "Map::is_empty")]
  pub app:    Map<String, Value>,
}

impl Document {
  /// A blank envelope for `schema_name`: empty data, empty tags, creation
  /// timestamp set to now, the given link slug.
  pub fn blank(schema_name: impl Into<String>, link: impl Into<String>) -> Self {
    Self {
      id:     None,
      rev:    None,
      schema: schema_name.into(),
      data:   Map::new(),
      meta:   DocMeta {
        created_on: Utc::now().timestamp(),
        updated_on: None,
        updated_by: None,
        tags:       Vec::new(),
        link:       link.into(),
        title:      None,
      },
      app:    Map::new(),
    }
  }

  /// The full document as a JSON value (templates, selector matching).
  pub fn to_value(&self) -> crate::Result<Value> {
    Ok(serde_json::to_value(self)?)
  }
}
