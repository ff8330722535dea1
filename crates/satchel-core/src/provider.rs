//! Injected capability traits: field encryption and JSON-Schema validation.
//!
//! Both are CPU-bound, so the traits are synchronous; only the storage
//! backend does I/O.

use serde_json::Value;
use thiserror::Error;

use crate::error::Issue;

/// Failure inside a provider implementation (wrong key, corrupt
/// ciphertext). The engine wraps this into [`crate::Error::Encryption`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

// ─── Crypto ──────────────────────────────────────────────────────────────────

/// Symmetric field-level encryption. Implementations must be authenticated:
/// decrypting with the wrong key is an error, never garbage plaintext.
pub trait FieldCrypto: Send + Sync {
  fn encrypt(&self, plaintext: &str, key: &str) -> Result<String, ProviderError>;
  fn decrypt(&self, ciphertext: &str, key: &str) -> Result<String, ProviderError>;
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// The outcome of validating `data` against a JSON-Schema.
#[derive(Debug, Clone)]
pub struct ValidationReport {
  pub valid:  bool,
  pub issues: Vec<Issue>,
  /// The input with schema-declared defaults applied. Meaningful only when
  /// `valid` is true.
  pub data:   Value,
}

impl ValidationReport {
  pub fn ok(data: Value) -> Self {
    Self { valid: true, issues: Vec::new(), data }
  }

  pub fn failed(issues: Vec<Issue>, data: Value) -> Self {
    Self { valid: false, issues, data }
  }
}

/// A JSON-Schema validation engine. The engine never compiles or interprets
/// schemas itself; everything goes through this seam.
pub trait SchemaValidator: Send + Sync {
  fn validate(&self, schema: &Value, data: &Value) -> ValidationReport;
}
