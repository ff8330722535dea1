//! Named secret storage on top of the `system_key` schema.
//!
//! Values live encrypted at rest (the schema marks `value` as an encrypted
//! field); these helpers are thin wrappers over the ordinary create/read
//! paths.

use satchel_core::{
  Error, Result,
  backend::DocumentBackend,
  document::Document,
  provider::{FieldCrypto, SchemaValidator},
};
use serde_json::{Map, Value};

use crate::{Satchel, read::DocRef, system::KEY_KIND};

impl<B, C, V> Satchel<B, C, V>
where
  B: DocumentBackend,
  C: FieldCrypto,
  V: SchemaValidator,
{
  /// Store a named secret. Fails if the name is already taken.
  pub async fn put_key(
    &self,
    name: &str,
    value: &str,
    note: Option<&str>,
  ) -> Result<Document> {
    let mut data = Map::new();
    data.insert("name".into(), Value::String(name.to_owned()));
    data.insert("value".into(), Value::String(value.to_owned()));
    if let Some(note) = note {
      data.insert("note".into(), Value::String(note.to_owned()));
    }
    self.create(KEY_KIND, data, None, None).await
  }

  /// Fetch a named secret's plaintext value.
  pub async fn get_key(&self, name: &str) -> Result<String> {
    let mut values = Map::new();
    values.insert("name".into(), Value::String(name.to_owned()));
    let doc = self
      .read(&DocRef::PrimaryKey { schema: KEY_KIND.into(), values })
      .await?;
    doc
      .data
      .get("value")
      .and_then(Value::as_str)
      .map(str::to_owned)
      .ok_or_else(|| Error::not_found(format!("key `{name}` has no value")))
  }
}
