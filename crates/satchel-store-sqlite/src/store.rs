//! [`SqliteBackend`] — the SQLite implementation of [`DocumentBackend`].

use satchel_core::{
  backend::{DocHandle, DocumentBackend, Query},
  document::Document,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;

use crate::{Error, Result, schema::SCHEMA, selector};

// ─── Revisions ───────────────────────────────────────────────────────────────

fn body_digest(body: &str) -> String {
  hex::encode(&Sha256::digest(body.as_bytes())[..8])
}

/// CouchDB-style `N-digest` revision token.
fn next_rev(previous: Option<&str>, body: &str) -> String {
  let generation = previous
    .and_then(|r| r.split('-').next())
    .and_then(|n| n.parse::<u64>().ok())
    .unwrap_or(0);
  format!("{}-{}", generation + 1, body_digest(body))
}

// ─── Backend ─────────────────────────────────────────────────────────────────

/// A document backend backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteBackend {
  conn: tokio_rusqlite::Connection,
}

impl SqliteBackend {
  /// Open (or create) a backend at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let backend = Self { conn };
    backend.init_schema().await?;
    Ok(backend)
  }

  /// Open an in-memory backend — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let backend = Self { conn };
    backend.init_schema().await?;
    Ok(backend)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Serialise `doc` with `rev` already assigned and return `(rev, body)`.
  fn finalise(mut doc: Document, previous_rev: Option<&str>) -> Result<(String, String)> {
    doc.rev = None;
    let seed = serde_json::to_string(&doc)?;
    let rev = next_rev(previous_rev, &seed);
    doc.rev = Some(rev.clone());
    let body = serde_json::to_string(&doc)?;
    Ok((rev, body))
  }

  async fn stored_rev(&self, id: String) -> Result<Option<String>> {
    let rev = self
      .conn
      .call(move |conn| {
        use rusqlite::OptionalExtension as _;
        Ok(
          conn
            .query_row(
              "SELECT rev FROM documents WHERE doc_id = ?1",
              rusqlite::params![id],
              |row| row.get::<_, String>(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(rev)
  }
}

// ─── DocumentBackend impl ────────────────────────────────────────────────────

impl DocumentBackend for SqliteBackend {
  type Error = Error;

  async fn insert(&self, mut doc: Document) -> Result<DocHandle> {
    let id = doc.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    doc.id = Some(id.clone());
    let schema = doc.schema.clone();
    let (rev, body) = Self::finalise(doc, None)?;

    let id_param = id.clone();
    let rev_param = rev.clone();
    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT OR IGNORE INTO documents (doc_id, rev, schema, body)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_param, rev_param, schema, body],
        )?;
        Ok(n)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::DuplicateId(id));
    }
    Ok(DocHandle { id, rev: Some(rev) })
  }

  async fn update(&self, doc: Document) -> Result<DocHandle> {
    let id = doc.id.clone().ok_or(Error::MissingId)?;
    let Some(old_rev) = self.stored_rev(id.clone()).await? else {
      return Err(Error::NotFound(id));
    };

    let schema = doc.schema.clone();
    let (rev, body) = Self::finalise(doc, Some(&old_rev))?;

    let id_param = id.clone();
    let rev_param = rev.clone();
    let changed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE documents SET rev = ?2, schema = ?3, body = ?4 WHERE doc_id = ?1",
          rusqlite::params![id_param, rev_param, schema, body],
        )?;
        Ok(n)
      })
      .await?;

    if changed == 0 {
      return Err(Error::NotFound(id));
    }
    Ok(DocHandle { id, rev: Some(rev) })
  }

  async fn delete(&self, id: &str) -> Result<()> {
    let id_param = id.to_owned();
    let removed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "DELETE FROM documents WHERE doc_id = ?1",
          rusqlite::params![id_param],
        )?;
        Ok(n)
      })
      .await?;

    if removed == 0 {
      return Err(Error::NotFound(id.to_owned()));
    }
    Ok(())
  }

  async fn get(&self, id: &str) -> Result<Option<Document>> {
    let id_param = id.to_owned();
    let body: Option<String> = self
      .conn
      .call(move |conn| {
        use rusqlite::OptionalExtension as _;
        Ok(
          conn
            .query_row(
              "SELECT body FROM documents WHERE doc_id = ?1",
              rusqlite::params![id_param],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    body
      .map(|b| serde_json::from_str(&b).map_err(Error::Json))
      .transpose()
  }

  async fn search(&self, query: &Query) -> Result<Vec<Document>> {
    // Push the schema-equality clause (the engine's most common filter)
    // down to SQL; everything else is matched in Rust.
    let schema_filter = query
      .selector
      .get("schema")
      .and_then(Value::as_str)
      .map(str::to_owned);

    let bodies: Vec<String> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(schema) = schema_filter {
          let mut stmt =
            conn.prepare("SELECT body FROM documents WHERE schema = ?1")?;
          stmt
            .query_map(rusqlite::params![schema], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare("SELECT body FROM documents")?;
          stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    let mut docs = Vec::new();
    for body in bodies {
      let mut value: Value = serde_json::from_str(&body)?;
      if !selector::matches(&value, &query.selector) {
        continue;
      }
      if let Some(fields) = &query.fields {
        selector::project_data(&mut value, fields);
      }
      docs.push(serde_json::from_value(value)?);
      if query.limit.is_some_and(|limit| docs.len() >= limit) {
        break;
      }
    }
    Ok(docs)
  }

  async fn create_index(&self, fields: &[String]) -> Result<()> {
    let fields_json = serde_json::to_string(fields)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO index_requests (fields, requested_on)
           VALUES (?1, datetime('now'))",
          rusqlite::params![fields_json],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn ping(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
