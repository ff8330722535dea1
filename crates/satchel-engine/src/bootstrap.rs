//! Bootstrap: install or upgrade the built-in schema set and move the
//! engine to `Active`.
//!
//! The single dirty-check is the aggregate version: the sum of every
//! built-in schema's version, recorded in a `system_setting` document.
//! When the stored marker equals the expected sum the whole reconciliation
//! is skipped, so calling [`Satchel::initialize`] on every startup is cheap
//! and idempotent.

use satchel_core::{
  Error, Result,
  backend::{DocumentBackend, Query},
  document::Document,
  provider::{FieldCrypto, SchemaValidator},
  schema::SchemaSpec,
};
use serde_json::{Map, Value, json};

use crate::{
  Satchel, schema_rules,
  system::{self, LOG_KIND, SCHEMA_KIND, SETTING_KIND, VERSION_SETTING},
  unix_now,
};

/// What bootstrap (or an app install) did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
  pub installed: Vec<String>,
  pub upgraded:  Vec<String>,
  /// The aggregate version now recorded in the marker.
  pub version:   u32,
  /// False when the marker was already current and nothing ran.
  pub changed:   bool,
}

/// A packaged set of schemas, default records and settings an external app
/// ships. Installed through [`Satchel::install_app`]; its own version
/// marker (`satchel_app_<name>_version`) makes reinstallation idempotent.
#[derive(Debug, Clone)]
pub struct AppBundle {
  pub name:     String,
  pub schemas:  Vec<SchemaSpec>,
  /// `(schema name, data)` pairs created on install; duplicates of already
  /// present records are skipped.
  pub records:  Vec<(String, Map<String, Value>)>,
  /// `(name, value)` settings upserted on install.
  pub settings: Vec<(String, Value)>,
}

enum EnsureOutcome {
  Installed,
  Upgraded,
  Current,
}

impl<B, C, V> Satchel<B, C, V>
where
  B: DocumentBackend,
  C: FieldCrypto,
  V: SchemaValidator,
{
  /// Reconcile the built-in schema set and activate the engine. Safe to
  /// call on every startup.
  pub async fn initialize(&self) -> Result<InitReport> {
    self.ping().await?;
    self.set_state_bootstrapping();
    match self.reconcile().await {
      Ok(report) => Ok(report),
      Err(e) => {
        self.set_state_uninitialized();
        Err(e)
      }
    }
  }

  async fn reconcile(&self) -> Result<InitReport> {
    let expected = system::aggregate_version();
    if let Some(marker) = self.find_setting(VERSION_SETTING).await? {
      let current = marker.data.get("value").and_then(Value::as_u64);
      if current == Some(u64::from(expected)) {
        self.set_state_active(expected);
        tracing::debug!(version = expected, "database already current");
        return Ok(InitReport {
          installed: Vec::new(),
          upgraded:  Vec::new(),
          version:   expected,
          changed:   false,
        });
      }
    }

    let mut installed = Vec::new();
    let mut upgraded = Vec::new();
    let mut failures = 0usize;
    for spec in system::builtin_schemas() {
      // One broken built-in must not block the rest; the marker is
      // withheld below, so the next initialize retries it.
      match self.ensure_schema(&spec).await {
        Ok(EnsureOutcome::Installed) => installed.push(spec.name.clone()),
        Ok(EnsureOutcome::Upgraded) => upgraded.push(spec.name.clone()),
        Ok(EnsureOutcome::Current) => {}
        Err(e) => {
          failures += 1;
          tracing::warn!(schema = %spec.name, error = %e, "schema install failed");
        }
      }
    }

    let core_fields: Vec<String> =
      ["schema", "meta.link"].map(String::from).to_vec();
    if let Err(e) = self.backend.create_index(&core_fields).await {
      tracing::warn!(error = %e, "core index creation failed");
    }

    // The marker is what lets the next initialize short-circuit, so it is
    // only written once every built-in actually made it in. A partial run
    // stays unmarked and the next initialize re-runs the loop.
    if failures == 0 {
      self.put_setting(VERSION_SETTING, json!(expected), false).await?;
    } else {
      tracing::warn!(
        failures,
        "version marker withheld after partial bootstrap"
      );
    }
    self
      .append_log(format!("database initialized at version {expected}"))
      .await?;
    self.set_state_active(expected);
    tracing::info!(
      version = expected,
      installed = installed.len(),
      upgraded = upgraded.len(),
      "database bootstrapped"
    );
    Ok(InitReport { installed, upgraded, version: expected, changed: true })
  }

  /// Install an app bundle. Requires an active engine; idempotent per
  /// bundle version.
  pub async fn install_app(&self, bundle: &AppBundle) -> Result<InitReport> {
    self.guard_active()?;
    if bundle.name.trim().is_empty() {
      return Err(Error::creation("app bundles need a name"));
    }
    let version: u32 = bundle.schemas.iter().map(|s| s.version).sum();
    let marker_name = format!("satchel_app_{}_version", bundle.name);
    if let Some(marker) = self.find_setting(&marker_name).await? {
      if marker.data.get("value").and_then(Value::as_u64)
        == Some(u64::from(version))
      {
        return Ok(InitReport {
          installed: Vec::new(),
          upgraded:  Vec::new(),
          version,
          changed: false,
        });
      }
    }

    let mut installed = Vec::new();
    let mut upgraded = Vec::new();
    for schema in &bundle.schemas {
      let mut spec = schema.clone();
      spec.settings.install_source = Some(bundle.name.clone());
      schema_rules::meta_validate(&spec)?;
      // App schemas are user data; unlike built-ins, a failure here aborts
      // the install.
      match self.ensure_schema(&spec).await? {
        EnsureOutcome::Installed => installed.push(spec.name.clone()),
        EnsureOutcome::Upgraded => upgraded.push(spec.name.clone()),
        EnsureOutcome::Current => {}
      }
    }

    for (kind, data) in &bundle.records {
      match self.create(kind, data.clone(), None, None).await {
        Ok(_) => {}
        // Already present from a previous install.
        Err(Error::DocCreation(_)) => {}
        Err(e) => return Err(e),
      }
    }
    for (name, value) in &bundle.settings {
      self.put_setting(name, value.clone(), true).await?;
    }

    self.put_setting(&marker_name, json!(version), false).await?;
    self
      .append_log(format!(
        "app `{}` installed at version {version}",
        bundle.name
      ))
      .await?;
    tracing::info!(app = %bundle.name, version, "app bundle installed");
    Ok(InitReport { installed, upgraded, version, changed: true })
  }

  /// Ask the backend to index the data fields of every stored schema.
  pub async fn update_indexes(&self) -> Result<()> {
    self.guard_active()?;
    let query = Query::with_selector(json!({ "schema": SCHEMA_KIND }));
    let docs = self.backend.search(&query).await.map_err(Error::backend)?;
    for doc in docs {
      let spec = SchemaSpec::from_data(&doc.data)?;
      let fields: Vec<String> = spec
        .properties()
        .map(|props| props.keys().map(|k| format!("data.{k}")).collect())
        .unwrap_or_default();
      if fields.is_empty() {
        continue;
      }
      if let Err(e) = self.backend.create_index(&fields).await {
        tracing::warn!(schema = %spec.name, error = %e, "index creation failed");
      }
    }
    Ok(())
  }

  /// The stored value of a named setting, if any.
  pub async fn get_setting(&self, name: &str) -> Result<Option<Value>> {
    self.guard_active()?;
    Ok(
      self
        .find_setting(name)
        .await?
        .and_then(|doc| doc.data.get("value").cloned()),
    )
  }

  // ── Internals (also used mid-bootstrap, so no active guard) ───────────

  async fn ensure_schema(&self, spec: &SchemaSpec) -> Result<EnsureOutcome> {
    match self.find_schema_doc(&spec.name).await? {
      None => {
        let mut doc =
          Document::blank(SCHEMA_KIND, self.generate_link().await?);
        doc.data = spec.to_data()?;
        self.backend.insert(doc).await.map_err(Error::backend)?;
        Ok(EnsureOutcome::Installed)
      }
      Some((mut doc, stored)) if stored.version != spec.version => {
        doc.data = spec.to_data()?;
        doc.meta.updated_on = Some(unix_now());
        doc.meta.updated_by = Some("bootstrap".into());
        self.backend.update(doc).await.map_err(Error::backend)?;
        Ok(EnsureOutcome::Upgraded)
      }
      Some(_) => Ok(EnsureOutcome::Current),
    }
  }

  pub(crate) async fn find_setting(
    &self,
    name: &str,
  ) -> Result<Option<Document>> {
    let query = Query::with_selector(json!({
      "schema": SETTING_KIND,
      "data.name": name,
    }))
    .limit(1);
    let mut docs = self.backend.search(&query).await.map_err(Error::backend)?;
    Ok(docs.pop())
  }

  pub(crate) async fn put_setting(
    &self,
    name: &str,
    value: Value,
    user_editable: bool,
  ) -> Result<()> {
    match self.find_setting(name).await? {
      Some(mut doc) => {
        if doc.data.get("value") == Some(&value) {
          return Ok(());
        }
        doc.data.insert("value".into(), value);
        doc.meta.updated_on = Some(unix_now());
        self.backend.update(doc).await.map_err(Error::backend)?;
      }
      None => {
        let mut doc =
          Document::blank(SETTING_KIND, self.generate_link().await?);
        doc.data.insert("name".into(), Value::String(name.to_owned()));
        doc.data.insert("value".into(), value);
        doc
          .data
          .insert("user_editable".into(), Value::Bool(user_editable));
        self.backend.insert(doc).await.map_err(Error::backend)?;
      }
    }
    Ok(())
  }

  async fn append_log(&self, message: String) -> Result<()> {
    let mut doc = Document::blank(LOG_KIND, self.generate_link().await?);
    doc.data.insert("message".into(), Value::String(message));
    doc.data.insert("on".into(), json!(unix_now()));
    self.backend.insert(doc).await.map_err(Error::backend)?;
    Ok(())
  }
}
