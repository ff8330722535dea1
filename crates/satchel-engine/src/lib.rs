//! The Satchel document lifecycle engine.
//!
//! Layers schema validation, primary-key uniqueness, field-level
//! encryption, metadata management and a constrained directed-graph
//! relation model on top of any [`DocumentBackend`]. The engine owns no
//! storage and no crypto of its own — those arrive as trait
//! implementations at construction time.
//!
//! # Lifecycle
//!
//! A freshly constructed engine is `Uninitialized`; every operation other
//! than [`Satchel::initialize`] fails with `Error::NotReady` until
//! bootstrap has installed (or upgraded) the built-in schema set and moved
//! the engine to `Active`.

mod bootstrap;
mod create;
mod graph;
mod keys;
mod link;
mod read;
mod schema_rules;
mod search;
mod system;
mod template;
mod update;

#[cfg(test)]
mod tests;

use std::{collections::HashMap, sync::RwLock};

use satchel_core::{
  Error, Issue, Result,
  backend::DocumentBackend,
  provider::{FieldCrypto, SchemaValidator},
};

pub use bootstrap::{AppBundle, InitReport};
pub use graph::{EdgeConstraint, EdgeInput, NodeRule};
pub use read::{DocRef, ReadOptions, ReadResult};
pub use search::SearchOptions;
pub use system::{
  EDGE_CONSTRAINT_KIND, EDGE_KIND, KEY_KIND, LOG_KIND, MEDIA_KIND,
  PROTECTED_KINDS, SCHEMA_KIND, SCRIPT_KIND, SETTING_KIND, VERSION_SETTING,
};
pub use template::{PlainTemplate, TemplateEngine};
pub use update::{AppUpdate, UpdateRequest};

// ─── Configuration ───────────────────────────────────────────────────────────

/// What to do when an update carries a stale revision token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
  /// Raise [`Error::StaleRevision`].
  #[default]
  Reject,
  /// Ignore the stale token and overwrite.
  LastWriteWins,
}

/// Construction-time configuration. All string fields are required; the
/// encryption key must be at least 20 characters.
#[derive(Debug, Clone)]
pub struct Config {
  /// Display name for this store instance.
  pub name:            String,
  /// Name of the underlying database (passed through to logs only — the
  /// backend was already opened against it).
  pub db_name:         String,
  pub encryption_key:  String,
  pub conflict_policy: ConflictPolicy,
}

impl Config {
  pub fn new(
    name: impl Into<String>,
    db_name: impl Into<String>,
    encryption_key: impl Into<String>,
  ) -> Self {
    Self {
      name:            name.into(),
      db_name:         db_name.into(),
      encryption_key:  encryption_key.into(),
      conflict_policy: ConflictPolicy::default(),
    }
  }

  /// Enumerates every missing or invalid field rather than failing on the
  /// first one.
  fn validate(&self) -> Result<()> {
    let mut issues = Vec::new();
    if self.name.trim().is_empty() {
      issues.push(Issue::at("name", "is required"));
    }
    if self.db_name.trim().is_empty() {
      issues.push(Issue::at("db_name", "is required"));
    }
    if self.encryption_key.trim().is_empty() {
      issues.push(Issue::at("encryption_key", "is required"));
    } else if self.encryption_key.len() < 20 {
      issues.push(Issue::at(
        "encryption_key",
        "must be at least 20 characters",
      ));
    }
    if issues.is_empty() {
      Ok(())
    } else {
      Err(Error::Config(issues.into()))
    }
  }
}

// ─── State machine ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Uninitialized,
  Bootstrapping,
  /// Carries the aggregate schema version bootstrap reconciled against.
  Active(u32),
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// The lifecycle engine, generic over backend, field cipher and validator.
pub struct Satchel<B, C, V> {
  pub(crate) config:    Config,
  pub(crate) backend:   B,
  pub(crate) crypto:    C,
  pub(crate) validator: V,
  state:                RwLock<State>,
  pub(crate) templates: HashMap<String, Box<dyn TemplateEngine>>,
}

impl<B, C, V> Satchel<B, C, V>
where
  B: DocumentBackend,
  C: FieldCrypto,
  V: SchemaValidator,
{
  /// Validate `config` and assemble an engine. The returned engine is not
  /// usable until [`Satchel::initialize`] has run.
  pub fn new(config: Config, backend: B, crypto: C, validator: V) -> Result<Self> {
    config.validate()?;
    let mut templates: HashMap<String, Box<dyn TemplateEngine>> = HashMap::new();
    templates.insert("plain".into(), Box::new(PlainTemplate));
    Ok(Self {
      config,
      backend,
      crypto,
      validator,
      state: RwLock::new(State::Uninitialized),
      templates,
    })
  }

  /// Register a named template engine. Must happen before activation so
  /// the available engine set is fixed once traffic starts.
  pub fn register_template_engine(
    &mut self,
    name: impl Into<String>,
    engine: Box<dyn TemplateEngine>,
  ) -> Result<()> {
    if matches!(self.state(), State::Active(_)) {
      return Err(Error::Config(
        Issue::new("template engines must be registered before initialize()")
          .into(),
      ));
    }
    self.templates.insert(name.into(), engine);
    Ok(())
  }

  /// The aggregate schema version bootstrap reconciled against, once
  /// active.
  pub fn active_version(&self) -> Option<u32> {
    match self.state() {
      State::Active(v) => Some(v),
      _ => None,
    }
  }

  /// Connectivity probe, forwarded to the backend. Usable in any state.
  pub async fn ping(&self) -> Result<()> {
    self.backend.ping().await.map_err(Error::backend)
  }

  // ── State plumbing ────────────────────────────────────────────────────

  fn state(&self) -> State {
    // A poisoned lock means a writer panicked mid-transition; treat the
    // engine as unusable rather than guessing.
    *self.state.read().unwrap_or_else(|e| e.into_inner())
  }

  pub(crate) fn set_state_bootstrapping(&self) {
    *self.state.write().unwrap_or_else(|e| e.into_inner()) =
      State::Bootstrapping;
  }

  pub(crate) fn set_state_active(&self, version: u32) {
    *self.state.write().unwrap_or_else(|e| e.into_inner()) =
      State::Active(version);
  }

  pub(crate) fn set_state_uninitialized(&self) {
    *self.state.write().unwrap_or_else(|e| e.into_inner()) =
      State::Uninitialized;
  }

  pub(crate) fn is_active(&self) -> bool {
    matches!(self.state(), State::Active(_))
  }

  /// The gate every lifecycle operation passes before touching the
  /// backend.
  pub(crate) fn guard_active(&self) -> Result<()> {
    if self.is_active() { Ok(()) } else { Err(Error::NotReady) }
  }
}

pub(crate) fn unix_now() -> i64 {
  chrono::Utc::now().timestamp()
}
