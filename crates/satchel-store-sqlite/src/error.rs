//! Error type for `satchel-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// `update` or `delete` was asked to act on a document without an id.
  #[error("document carries no id")]
  MissingId,

  #[error("document not found: {0}")]
  NotFound(String),

  #[error("document id already taken: {0}")]
  DuplicateId(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
