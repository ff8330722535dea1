//! The built-in schema set installed at bootstrap.
//!
//! Each carries a `version`; the sum of all versions is the aggregate
//! database version used as the single dirty-check for upgrade detection.

use satchel_core::schema::{SchemaSettings, SchemaSpec};
use serde_json::json;

pub const SCHEMA_KIND: &str = "schema";
pub const KEY_KIND: &str = "system_key";
pub const SETTING_KIND: &str = "system_setting";
pub const EDGE_CONSTRAINT_KIND: &str = "system_edge_constraint";
pub const EDGE_KIND: &str = "system_edge";
pub const MEDIA_KIND: &str = "system_media";
pub const LOG_KIND: &str = "system_log";
pub const SCRIPT_KIND: &str = "system_script";

/// Name of the `system_setting` document recording the last-applied
/// aggregate version.
pub const VERSION_SETTING: &str = "satchel_version";

/// Kinds the delete path refuses to remove: losing them would corrupt the
/// registry or the audit trail.
pub const PROTECTED_KINDS: &[&str] = &[SCHEMA_KIND, SETTING_KIND, LOG_KIND];

fn builtin(
  name: &str,
  title: &str,
  description: &str,
  version: u32,
  schema: serde_json::Value,
  settings: SchemaSettings,
) -> SchemaSpec {
  SchemaSpec {
    name: name.into(),
    title: Some(title.into()),
    description: Some(description.into()),
    version,
    active: true,
    system_generated: true,
    schema,
    settings,
  }
}

/// The meta-schema: validates the `data` of every schema document,
/// including its own.
fn schema_schema() -> SchemaSpec {
  builtin(
    SCHEMA_KIND,
    "Schema",
    "Meta-schema describing every other document kind's shape and settings.",
    1,
    json!({
      "type": "object",
      "additionalProperties": false,
      "properties": {
        "name": {
          "type": "string",
          "minLength": 2,
          "maxLength": 50,
          "pattern": "^[a-z][a-z0-9_]*$"
        },
        "title":       { "type": "string", "maxLength": 200 },
        "description": { "type": "string", "maxLength": 2000 },
        "version":     { "type": "integer", "minimum": 1, "default": 1 },
        "active":           { "type": "boolean", "default": true },
        "system_generated": { "type": "boolean", "default": false },
        "schema": {
          "type": "object",
          "minProperties": 1,
          "maxProperties": 50
        },
        "settings": {
          "type": "object",
          "default": {},
          "properties": {
            "primary_keys": {
              "type": "array", "default": [], "maxItems": 10,
              "items": { "type": "string" }
            },
            "non_editable_fields": {
              "type": "array", "default": [], "maxItems": 50,
              "items": { "type": "string" }
            },
            "encrypted_fields": {
              "type": "array", "default": [], "maxItems": 10,
              "items": { "type": "string" }
            },
            "display_fields": {
              "type": "array", "default": [],
              "items": { "type": "string" }
            },
            "install_source": { "type": "string" },
            "templates":      { "type": "object" }
          }
        }
      },
      "required": ["name", "schema", "settings"]
    }),
    SchemaSettings {
      primary_keys: vec!["name".into()],
      non_editable_fields: vec!["name".into(), "system_generated".into()],
      ..SchemaSettings::default()
    },
  )
}

fn key_schema() -> SchemaSpec {
  builtin(
    KEY_KIND,
    "Secret key",
    "User-defined secrets (API tokens and the like); values are encrypted at rest.",
    1,
    json!({
      "type": "object",
      "additionalProperties": false,
      "properties": {
        "name": {
          "type": "string",
          "minLength": 2,
          "maxLength": 50,
          "pattern": "^[a-z][a-z0-9_]*$"
        },
        "value": { "type": "string", "minLength": 1, "maxLength": 5000 },
        "note":  { "type": "string", "maxLength": 2000 }
      },
      "required": ["name", "value"]
    }),
    SchemaSettings {
      primary_keys: vec!["name".into()],
      non_editable_fields: vec!["name".into()],
      encrypted_fields: vec!["value".into()],
      ..SchemaSettings::default()
    },
  )
}

fn setting_schema() -> SchemaSpec {
  builtin(
    SETTING_KIND,
    "Setting",
    "Named, arbitrarily-typed settings the system and apps rely on.",
    1,
    json!({
      "type": "object",
      "additionalProperties": false,
      "properties": {
        "name": {
          "type": "string",
          "minLength": 2,
          "maxLength": 250,
          "pattern": "^[a-z][a-z0-9_]*$"
        },
        "value": {},
        "user_editable": { "type": "boolean", "default": true }
      },
      "required": ["name", "value"]
    }),
    SchemaSettings {
      primary_keys: vec!["name".into()],
      non_editable_fields: vec!["name".into()],
      ..SchemaSettings::default()
    },
  )
}

fn edge_constraint_schema() -> SchemaSpec {
  builtin(
    EDGE_CONSTRAINT_KIND,
    "Edge constraint",
    "Which node-schema pairs an edge name may connect, and how many times.",
    1,
    json!({
      "type": "object",
      "additionalProperties": false,
      "properties": {
        "name":  { "type": "string", "minLength": 1, "maxLength": 100 },
        "node1": { "type": "string", "minLength": 1 },
        "node2": { "type": "string", "minLength": 1 },
        "max_from_node1": { "type": "integer", "minimum": -1, "default": -1 },
        "max_to_node2":   { "type": "integer", "minimum": -1, "default": -1 },
        "label": { "type": "string", "maxLength": 200 },
        "note":  { "type": "string", "maxLength": 2000 }
      },
      "required": ["name", "node1", "node2"]
    }),
    SchemaSettings {
      primary_keys: vec!["name".into()],
      non_editable_fields: vec!["name".into()],
      ..SchemaSettings::default()
    },
  )
}

fn edge_schema() -> SchemaSpec {
  builtin(
    EDGE_KIND,
    "Edge",
    "One directed, named edge between two documents.",
    1,
    json!({
      "type": "object",
      "additionalProperties": false,
      "properties": {
        "node1":     { "type": "string", "minLength": 1 },
        "node2":     { "type": "string", "minLength": 1 },
        "edge_name": { "type": "string", "minLength": 1, "maxLength": 100 },
        "note":      { "type": "string", "maxLength": 2000 }
      },
      "required": ["node1", "node2", "edge_name"]
    }),
    SchemaSettings {
      primary_keys: vec!["node1".into(), "node2".into(), "edge_name".into()],
      non_editable_fields: vec![
        "node1".into(),
        "node2".into(),
        "edge_name".into(),
      ],
      ..SchemaSettings::default()
    },
  )
}

fn media_schema() -> SchemaSpec {
  builtin(
    MEDIA_KIND,
    "Media",
    "References to externally stored media; no binary data lives in documents.",
    1,
    json!({
      "type": "object",
      "additionalProperties": false,
      "properties": {
        "name":       { "type": "string", "minLength": 1, "maxLength": 250 },
        "source":     { "type": "string", "minLength": 1, "maxLength": 2000 },
        "media_type": { "type": "string", "maxLength": 100 },
        "size":       { "type": "integer", "minimum": 0 },
        "note":       { "type": "string", "maxLength": 2000 }
      },
      "required": ["name", "source"]
    }),
    SchemaSettings {
      primary_keys: vec!["name".into()],
      ..SchemaSettings::default()
    },
  )
}

fn log_schema() -> SchemaSpec {
  builtin(
    LOG_KIND,
    "Log entry",
    "Append-only audit entries written by the engine.",
    1,
    json!({
      "type": "object",
      "additionalProperties": true,
      "properties": {
        "message": { "type": "string", "minLength": 1 },
        "on":      { "type": "integer" }
      },
      "required": ["message"]
    }),
    SchemaSettings::default(),
  )
}

fn script_schema() -> SchemaSpec {
  builtin(
    SCRIPT_KIND,
    "Script",
    "User-stored scripts; the engine stores but never executes them.",
    1,
    json!({
      "type": "object",
      "additionalProperties": false,
      "properties": {
        "name": {
          "type": "string",
          "minLength": 2,
          "maxLength": 100,
          "pattern": "^[a-z][a-z0-9_]*$"
        },
        "script":   { "type": "string", "minLength": 1 },
        "language": { "type": "string", "maxLength": 50 },
        "note":     { "type": "string", "maxLength": 2000 }
      },
      "required": ["name", "script"]
    }),
    SchemaSettings {
      primary_keys: vec!["name".into()],
      ..SchemaSettings::default()
    },
  )
}

/// Every built-in schema, meta-schema first.
pub fn builtin_schemas() -> Vec<SchemaSpec> {
  vec![
    schema_schema(),
    key_schema(),
    setting_schema(),
    edge_constraint_schema(),
    edge_schema(),
    media_schema(),
    log_schema(),
    script_schema(),
  ]
}

/// Sum of all built-in schema versions — the expected database version.
pub fn aggregate_version() -> u32 {
  builtin_schemas().iter().map(|s| s.version).sum()
}
