//! Selector-based search, forwarded to the backend.

use std::collections::BTreeSet;

use satchel_core::{
  Error, Issue, Result,
  backend::{DocumentBackend, Query},
  document::Document,
  provider::{FieldCrypto, SchemaValidator},
};

use crate::Satchel;

/// Searches cap at this many documents unless the query says otherwise.
const DEFAULT_LIMIT: usize = 1000;

/// Extras for [`Satchel::search_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
  /// Decrypt encrypted fields in the results. Off by default because it
  /// costs a schema lookup per distinct kind in the result set.
  pub decrypt_docs: bool,
}

impl<B, C, V> Satchel<B, C, V>
where
  B: DocumentBackend,
  C: FieldCrypto,
  V: SchemaValidator,
{
  /// Run a selector query. Encrypted fields come back as stored.
  pub async fn search(&self, query: Query) -> Result<Vec<Document>> {
    self.guard_active()?;
    if query.selector.is_empty() {
      return Err(Error::validation(Issue::at(
        "selector",
        "must not be empty; match everything explicitly if you mean to",
      )));
    }
    let query = match query.limit {
      Some(_) => query,
      None => query.limit(DEFAULT_LIMIT),
    };
    self.backend.search(&query).await.map_err(Error::backend)
  }

  /// [`Satchel::search`] with optional decryption of the results.
  pub async fn search_with(
    &self,
    query: Query,
    options: SearchOptions,
  ) -> Result<Vec<Document>> {
    let mut docs = self.search(query).await?;
    if !options.decrypt_docs {
      return Ok(docs);
    }
    let kinds: BTreeSet<String> =
      docs.iter().map(|d| d.schema.clone()).collect();
    for kind in kinds {
      let spec = self.resolve_schema(&kind).await?;
      if spec.settings.encrypted_fields.is_empty() {
        continue;
      }
      for doc in docs.iter_mut().filter(|d| d.schema == kind) {
        doc.data = self.decrypt_fields(&spec, std::mem::take(&mut doc.data))?;
      }
    }
    Ok(docs)
  }
}
