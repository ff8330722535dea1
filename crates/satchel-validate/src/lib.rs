//! Reference [`SchemaValidator`] implementation.
//!
//! Covers the JSON-Schema subset the system schemas and typical app schemas
//! use: `type`, `properties`, `required`, `additionalProperties`, `enum`,
//! `pattern`, `minLength`/`maxLength`, `minimum`/`maximum`,
//! `minItems`/`maxItems`, `minProperties`/`maxProperties`, `items`, and
//! `default` injection for missing object properties. Unknown keywords
//! (e.g. `format`) are ignored rather than rejected.

mod validate;

use satchel_core::provider::{SchemaValidator, ValidationReport};
use serde_json::Value;

pub use validate::validate_value;

/// Stateless validator; schemas are interpreted on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubsetValidator;

impl SchemaValidator for SubsetValidator {
  fn validate(&self, schema: &Value, data: &Value) -> ValidationReport {
    let mut out = data.clone();
    let issues = validate_value(schema, &mut out, "");
    if issues.is_empty() {
      ValidationReport::ok(out)
    } else {
      ValidationReport::failed(issues, out)
    }
  }
}
