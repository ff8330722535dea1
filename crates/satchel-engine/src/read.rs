//! Reading documents by id, link or primary-key criteria.

use std::fmt;

use satchel_core::{
  Error, Issue, Result,
  backend::{DocumentBackend, Query},
  document::Document,
  provider::{FieldCrypto, SchemaValidator},
  schema::SchemaSpec,
};
use serde_json::{Map, Value, json};

use crate::Satchel;

// ─── DocRef ──────────────────────────────────────────────────────────────────

/// The three ways to address a stored document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocRef {
  /// Backend-assigned `_id`.
  Id(String),
  /// Globally unique `meta.link` slug.
  Link(String),
  /// A schema name plus the values of every one of its primary-key fields.
  PrimaryKey {
    schema: String,
    values: Map<String, Value>,
  },
}

impl DocRef {
  pub fn id(id: impl Into<String>) -> Self { Self::Id(id.into()) }

  pub fn link(link: impl Into<String>) -> Self { Self::Link(link.into()) }

  /// Parse a node criterion from edge data: a bare string is an id, an
  /// object is `{ "schema": ..., <primary-key fields>... }`.
  pub(crate) fn from_criteria(value: &Value) -> Result<Self> {
    match value {
      Value::String(id) => Ok(Self::Id(id.clone())),
      Value::Object(obj) => {
        let schema =
          obj.get("schema").and_then(Value::as_str).ok_or_else(|| {
            Error::validation(Issue::at(
              "schema",
              "node criteria objects need a `schema` field",
            ))
          })?;
        let mut values = obj.clone();
        values.remove("schema");
        Ok(Self::PrimaryKey { schema: schema.to_owned(), values })
      }
      _ => Err(Error::validation(Issue::new(
        "node criteria must be an id string or a criteria object",
      ))),
    }
  }
}

impl fmt::Display for DocRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Id(id) => write!(f, "id `{id}`"),
      Self::Link(link) => write!(f, "link `{link}`"),
      Self::PrimaryKey { schema, .. } => {
        write!(f, "primary key of `{schema}`")
      }
    }
  }
}

// ─── Read options / result ───────────────────────────────────────────────────

/// Extras for [`Satchel::read_with`].
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
  /// Also return the governing [`SchemaSpec`].
  pub include_schema: bool,
  /// Render this named template from the schema's settings.
  pub text_template:  Option<String>,
}

/// A document plus whatever [`ReadOptions`] asked for.
#[derive(Debug, Clone)]
pub struct ReadResult {
  pub doc:      Document,
  pub schema:   Option<SchemaSpec>,
  pub rendered: Option<String>,
}

// ─── Engine methods ──────────────────────────────────────────────────────────

impl<B, C, V> Satchel<B, C, V>
where
  B: DocumentBackend,
  C: FieldCrypto,
  V: SchemaValidator,
{
  /// Fetch one document; encrypted fields come back as plaintext.
  pub async fn read(&self, target: &DocRef) -> Result<Document> {
    self.guard_active()?;
    let (mut doc, spec) = self.locate(target).await?;
    doc.data = self.decrypt_fields(&spec, doc.data)?;
    Ok(doc)
  }

  /// [`Satchel::read`] plus optional schema and template rendering.
  pub async fn read_with(
    &self,
    target: &DocRef,
    options: &ReadOptions,
  ) -> Result<ReadResult> {
    self.guard_active()?;
    let (mut doc, spec) = self.locate(target).await?;
    doc.data = self.decrypt_fields(&spec, doc.data)?;
    let rendered = match &options.text_template {
      Some(name) => Some(self.render_template(&doc, &spec, name)?),
      None => None,
    };
    Ok(ReadResult {
      schema: options.include_schema.then(|| spec),
      doc,
      rendered,
    })
  }

  /// Resolve a [`DocRef`] to the stored document and its governing schema.
  /// Data is returned as stored (encrypted fields still sealed).
  pub(crate) async fn locate(
    &self,
    target: &DocRef,
  ) -> Result<(Document, SchemaSpec)> {
    let doc = match target {
      DocRef::Id(id) => self
        .backend
        .get(id)
        .await
        .map_err(Error::backend)?
        .ok_or_else(|| Error::not_found(format!("no document with id `{id}`")))?,
      DocRef::Link(wanted) => {
        let query =
          Query::with_selector(json!({ "meta.link": wanted })).limit(1);
        let mut docs =
          self.backend.search(&query).await.map_err(Error::backend)?;
        docs.pop().ok_or_else(|| {
          Error::not_found(format!("no document with link `{wanted}`"))
        })?
      }
      DocRef::PrimaryKey { schema, values } => {
        self.locate_by_primary_key(schema, values).await?
      }
    };
    let spec = self.resolve_schema(&doc.schema).await?;
    Ok((doc, spec))
  }

  async fn locate_by_primary_key(
    &self,
    schema: &str,
    values: &Map<String, Value>,
  ) -> Result<Document> {
    let spec = self.resolve_schema(schema).await?;
    if spec.settings.primary_keys.is_empty() {
      return Err(Error::not_found(format!(
        "schema `{schema}` declares no primary keys to look up by"
      )));
    }
    let missing: Vec<Issue> = spec
      .settings
      .primary_keys
      .iter()
      .filter(|pk| !values.contains_key(*pk))
      .map(|pk| {
        Issue::at(format!("data.{pk}"), "primary-key field missing from criteria")
      })
      .collect();
    if !missing.is_empty() {
      return Err(Error::Validation(missing.into()));
    }

    let mut selector = Map::new();
    selector.insert("schema".into(), Value::String(schema.to_owned()));
    for pk in &spec.settings.primary_keys {
      selector.insert(
        format!("data.{pk}"),
        values.get(pk).cloned().unwrap_or(Value::Null),
      );
    }
    let query = Query { selector, limit: Some(1), fields: None };
    let mut docs = self.backend.search(&query).await.map_err(Error::backend)?;
    docs.pop().ok_or_else(|| {
      Error::not_found(format!(
        "no `{schema}` document matches the given primary key"
      ))
    })
  }

  /// Render one of the schema's named templates. Template problems render
  /// inline rather than failing the read, so a broken template never makes
  /// a document unreadable.
  fn render_template(
    &self,
    doc: &Document,
    spec: &SchemaSpec,
    name: &str,
  ) -> Result<String> {
    let Some(tpl) = spec.settings.templates.get(name) else {
      return Ok(format!(
        "[template error: no template `{name}` on schema `{}`]",
        spec.name
      ));
    };
    let Some(engine) = self.templates.get(&tpl.engine) else {
      return Ok(format!("[template error: unknown engine `{}`]", tpl.engine));
    };
    let context = json!({
      "doc":    doc.to_value()?,
      "schema": spec.to_data()?,
    });
    match engine.render(&tpl.text, &context) {
      Ok(text) => Ok(text),
      Err(e) => Ok(format!("[template error: {e}]")),
    }
  }
}
