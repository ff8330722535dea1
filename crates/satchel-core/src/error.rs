//! Error taxonomy for the Satchel document store.
//!
//! Every business error carries an [`IssueList`] of `{path?, message}`
//! items; its `Display` form concatenates them so callers can show the
//! error directly without a translation layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Issues ──────────────────────────────────────────────────────────────────

/// One problem found while validating or applying an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
  /// Dotted path into the offending document, e.g. `data.title`.
  pub path:    Option<String>,
  pub message: String,
}

impl Issue {
  pub fn new(message: impl Into<String>) -> Self {
    Self { path: None, message: message.into() }
  }

  pub fn at(path: impl Into<String>, message: impl Into<String>) -> Self {
    Self { path: Some(path.into()), message: message.into() }
  }
}

impl fmt::Display for Issue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.path {
      Some(p) => write!(f, "{p}: {}", self.message),
      None => write!(f, "{}", self.message),
    }
  }
}

/// A non-empty list of [`Issue`]s attached to a single error.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IssueList(pub Vec<Issue>);

impl IssueList {
  pub fn one(message: impl Into<String>) -> Self {
    Self(vec![Issue::new(message)])
  }
}

impl fmt::Display for IssueList {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let joined = self
      .0
      .iter()
      .map(Issue::to_string)
      .collect::<Vec<_>>()
      .join("; ");
    write!(f, "{joined}")
  }
}

impl From<Vec<Issue>> for IssueList {
  fn from(issues: Vec<Issue>) -> Self { Self(issues) }
}

impl From<Issue> for IssueList {
  fn from(issue: Issue) -> Self { Self(vec![issue]) }
}

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum Error {
  /// Data or metadata fails JSON-Schema validation, or a schema document
  /// itself is structurally invalid.
  #[error("validation failed: {0}")]
  Validation(IssueList),

  #[error("document creation refused: {0}")]
  DocCreation(IssueList),

  #[error("document update refused: {0}")]
  DocUpdate(IssueList),

  #[error("document not found: {0}")]
  DocNotFound(IssueList),

  /// Distinct from [`Error::DocNotFound`] so callers can tell "this schema
  /// needs installing" apart from a missing ordinary document.
  #[error("schema not found: {0}")]
  SchemaNotFound(String),

  #[error("encryption failure: {0}")]
  Encryption(IssueList),

  #[error("relation constraint violated: {0}")]
  Relation(IssueList),

  /// Raised by every operation other than bootstrap until the registry has
  /// reached its `Active` state.
  #[error("database not ready: run initialize() first")]
  NotReady,

  /// The caller supplied a revision token that no longer matches the stored
  /// document (optimistic concurrency, `ConflictPolicy::Reject`).
  #[error("stale revision for {id}: expected {expected}, stored {stored}")]
  StaleRevision {
    id:       String,
    expected: String,
    stored:   String,
  },

  /// Deleting this document kind would corrupt the registry or audit trail.
  /// Deliberately not one of the business kinds above.
  #[error("refusing to delete a `{0}` document")]
  Guard(String),

  #[error("invalid configuration: {0}")]
  Config(IssueList),

  #[error("backend error: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn validation(issues: impl Into<IssueList>) -> Self {
    Self::Validation(issues.into())
  }

  pub fn creation(message: impl Into<String>) -> Self {
    Self::DocCreation(IssueList::one(message))
  }

  pub fn update(message: impl Into<String>) -> Self {
    Self::DocUpdate(IssueList::one(message))
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    Self::DocNotFound(IssueList::one(message))
  }

  pub fn encryption(message: impl Into<String>) -> Self {
    Self::Encryption(IssueList::one(message))
  }

  pub fn relation(message: impl Into<String>) -> Self {
    Self::Relation(IssueList::one(message))
  }

  /// Wrap a concrete backend's error at the engine boundary.
  pub fn backend<E>(err: E) -> Self
  where E: std::error::Error + Send + Sync + 'static {
    Self::Backend(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
