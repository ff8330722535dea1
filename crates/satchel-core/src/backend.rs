//! The `DocumentBackend` trait and supporting query types.
//!
//! The trait is implemented by storage adapters (e.g.
//! `satchel-store-sqlite`). The lifecycle engine depends on this
//! abstraction, not on any concrete backend. Each method is assumed atomic
//! for a single document; no cross-document transactions exist.

use std::future::Future;

use serde_json::{Map, Value};

use crate::document::Document;

// ─── Query types ─────────────────────────────────────────────────────────────

/// A Mango-style search query. The engine composes selectors (dotted-path
/// equality objects) but never interprets them — they are passed to the
/// backend verbatim.
#[derive(Debug, Clone, Default)]
pub struct Query {
  pub selector: Map<String, Value>,
  pub limit:    Option<usize>,
  /// Optional projection; adapters may apply it after matching.
  pub fields:   Option<Vec<String>>,
}

impl Query {
  /// Build a query from a `json!` selector object. Non-object values yield
  /// an empty selector (match nothing useful), which backends treat as a
  /// full scan.
  pub fn with_selector(selector: Value) -> Self {
    Self {
      selector: selector.as_object().cloned().unwrap_or_default(),
      limit:    None,
      fields:   None,
    }
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }
}

/// The backend's acknowledgement of a write: the assigned id and, for
/// backends that track revisions, the new revision token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocHandle {
  pub id:  String,
  pub rev: Option<String>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a document storage engine.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait DocumentBackend: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a new document; the backend assigns id and revision.
  fn insert(
    &self,
    doc: Document,
  ) -> impl Future<Output = Result<DocHandle, Self::Error>> + Send + '_;

  /// Replace the stored document carrying `doc.id`; bumps the revision.
  fn update(
    &self,
    doc: Document,
  ) -> impl Future<Output = Result<DocHandle, Self::Error>> + Send + '_;

  fn delete<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Fetch by id. Returns `None` when no such document exists.
  fn get<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + 'a;

  /// Evaluate a Mango-style query and return the matching documents.
  fn search<'a>(
    &'a self,
    query: &'a Query,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + 'a;

  /// Ask the backend to index the given dotted field paths. Advisory —
  /// adapters without secondary indexes may acknowledge and do nothing.
  fn create_index<'a>(
    &'a self,
    fields: &'a [String],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Connectivity probe; run before bootstrap.
  fn ping(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
