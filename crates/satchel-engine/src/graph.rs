//! The directed-graph relation subsystem.
//!
//! Edges are ordinary `system_edge` documents; before one is stored its node
//! criteria are resolved to ids and checked against the named
//! `system_edge_constraint`, which pins which schema pairs the edge name may
//! connect and how many edges may leave or arrive at a node. An edge whose
//! nodes match the constraint in the opposite orientation is stored swapped,
//! so `node1 -> node2` always reads in the constraint's direction.

use satchel_core::{
  Error, Issue, Result,
  backend::{DocumentBackend, Query},
  document::Document,
  provider::{FieldCrypto, SchemaValidator},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::{
  Satchel,
  read::DocRef,
  system::{EDGE_CONSTRAINT_KIND, EDGE_KIND},
};

// ─── Node rules ──────────────────────────────────────────────────────────────

/// One side of a constraint: which node schemas are acceptable.
///
/// Grammar: `"*"` allows any schema, `"*-a,b"` allows any schema except the
/// listed ones, `"a,b"` allows exactly the listed ones.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeRule {
  Any,
  AnyExcept(Vec<String>),
  OneOf(Vec<String>),
}

impl NodeRule {
  pub fn parse(text: &str) -> Result<Self> {
    let text = text.trim();
    if text == "*" {
      return Ok(Self::Any);
    }
    if let Some(rest) = text.strip_prefix("*-") {
      return Ok(Self::AnyExcept(split_names(rest)?));
    }
    Ok(Self::OneOf(split_names(text)?))
  }

  pub fn matches(&self, schema: &str) -> bool {
    match self {
      Self::Any => true,
      Self::AnyExcept(excluded) => !excluded.iter().any(|n| n == schema),
      Self::OneOf(allowed) => allowed.iter().any(|n| n == schema),
    }
  }
}

fn split_names(text: &str) -> Result<Vec<String>> {
  let names: Vec<String> = text
    .split(',')
    .map(|s| s.trim().to_owned())
    .filter(|s| !s.is_empty())
    .collect();
  if names.is_empty() {
    return Err(Error::relation(format!("invalid node rule `{text}`")));
  }
  Ok(names)
}

// ─── Constraint / input ──────────────────────────────────────────────────────

/// Typed view of a `system_edge_constraint` document's data. A negative
/// maximum means unbounded.
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeConstraint {
  pub name:           String,
  pub node1:          String,
  pub node2:          String,
  #[serde(default = "unbounded")]
  pub max_from_node1: i64,
  #[serde(default = "unbounded")]
  pub max_to_node2:   i64,
  #[serde(default)]
  pub label:          Option<String>,
  #[serde(default)]
  pub note:           Option<String>,
}

fn unbounded() -> i64 { -1 }

impl EdgeConstraint {
  fn from_data(data: &Map<String, Value>) -> Result<Self> {
    serde_json::from_value(Value::Object(data.clone())).map_err(|e| {
      Error::relation(format!("not a valid edge constraint: {e}"))
    })
  }
}

/// Caller-facing edge description for [`Satchel::create_edge`].
#[derive(Debug, Clone)]
pub struct EdgeInput {
  pub node1:     DocRef,
  pub node2:     DocRef,
  pub edge_name: String,
  pub note:      Option<String>,
}

// ─── Engine methods ──────────────────────────────────────────────────────────

impl<B, C, V> Satchel<B, C, V>
where
  B: DocumentBackend,
  C: FieldCrypto,
  V: SchemaValidator,
{
  /// Connect two documents with a named edge. Equivalent to creating a
  /// `system_edge` document directly; this is the typed front door.
  pub async fn create_edge(&self, input: EdgeInput) -> Result<Document> {
    self.guard_active()?;
    let (id1, _) = self.resolve_node_id(&input.node1).await?;
    let (id2, _) = self.resolve_node_id(&input.node2).await?;
    let mut data = Map::new();
    data.insert("node1".into(), Value::String(id1));
    data.insert("node2".into(), Value::String(id2));
    data.insert("edge_name".into(), Value::String(input.edge_name));
    if let Some(note) = input.note {
      data.insert("note".into(), Value::String(note));
    }
    self.create(EDGE_KIND, data, None, None).await
  }

  /// Resolve node criteria, enforce the constraint and return the edge data
  /// as it should be stored. `exclude` drops one edge id from the
  /// cardinality counts (the edge being updated).
  pub(crate) async fn normalize_edge_data(
    &self,
    data: &Map<String, Value>,
    exclude: Option<&str>,
  ) -> Result<Map<String, Value>> {
    let edge_name = data
      .get("edge_name")
      .and_then(Value::as_str)
      .ok_or_else(|| Error::relation("edges need an `edge_name`"))?;
    let node1 = node_criterion(data, "node1")?;
    let node2 = node_criterion(data, "node2")?;

    let (id1, schema1) = self.resolve_node_id(&node1).await?;
    let (id2, schema2) = self.resolve_node_id(&node2).await?;
    if id1 == id2 {
      return Err(Error::relation(
        "an edge cannot connect a document to itself",
      ));
    }
    if schema1 == EDGE_KIND || schema2 == EDGE_KIND {
      return Err(Error::relation("edges cannot connect other edges"));
    }

    let constraint = match self.find_edge_constraint(edge_name).await? {
      Some(c) => c,
      None => self.install_permissive_constraint(edge_name).await?,
    };
    let rule1 = NodeRule::parse(&constraint.node1)?;
    let rule2 = NodeRule::parse(&constraint.node2)?;

    // Try the given orientation first, then the swap.
    let (from, to) = if rule1.matches(&schema1) && rule2.matches(&schema2) {
      (id1, id2)
    } else if rule1.matches(&schema2) && rule2.matches(&schema1) {
      (id2, id1)
    } else {
      return Err(Error::Relation(
        vec![
          Issue::at(
            "data.node1",
            format!("`{schema1}` does not fit edge `{edge_name}`"),
          ),
          Issue::at(
            "data.node2",
            format!("`{schema2}` does not fit edge `{edge_name}`"),
          ),
        ]
        .into(),
      ));
    };

    if constraint.max_from_node1 >= 0 {
      let outgoing =
        self.count_edges(edge_name, "node1", &from, exclude).await?;
      if outgoing as i64 >= constraint.max_from_node1 {
        return Err(Error::relation(format!(
          "node `{from}` already has {outgoing} outgoing `{edge_name}` edge(s); \
           the constraint allows {}",
          constraint.max_from_node1
        )));
      }
    }
    if constraint.max_to_node2 >= 0 {
      let incoming = self.count_edges(edge_name, "node2", &to, exclude).await?;
      if incoming as i64 >= constraint.max_to_node2 {
        return Err(Error::relation(format!(
          "node `{to}` already has {incoming} incoming `{edge_name}` edge(s); \
           the constraint allows {}",
          constraint.max_to_node2
        )));
      }
    }

    let mut normalized = Map::new();
    normalized.insert("node1".into(), Value::String(from));
    normalized.insert("node2".into(), Value::String(to));
    normalized.insert("edge_name".into(), Value::String(edge_name.to_owned()));
    if let Some(note) = data.get("note").and_then(Value::as_str) {
      normalized.insert("note".into(), Value::String(note.to_owned()));
    }
    Ok(normalized)
  }

  async fn resolve_node_id(&self, node: &DocRef) -> Result<(String, String)> {
    let (doc, _) = self.locate(node).await?;
    let id = doc
      .id
      .ok_or_else(|| Error::relation(format!("{node} resolved to a document without an id")))?;
    Ok((id, doc.schema))
  }

  async fn find_edge_constraint(
    &self,
    edge_name: &str,
  ) -> Result<Option<EdgeConstraint>> {
    let query = Query::with_selector(json!({
      "schema": EDGE_CONSTRAINT_KIND,
      "data.name": edge_name,
    }))
    .limit(1);
    let mut docs = self.backend.search(&query).await.map_err(Error::backend)?;
    match docs.pop() {
      Some(doc) => Ok(Some(EdgeConstraint::from_data(&doc.data)?)),
      None => Ok(None),
    }
  }

  /// First use of an unconstrained edge name installs an any-to-any,
  /// unbounded constraint, so later tightening has a document to edit.
  /// Written directly rather than through `create` because this runs inside
  /// the create pipeline.
  async fn install_permissive_constraint(
    &self,
    edge_name: &str,
  ) -> Result<EdgeConstraint> {
    let spec = self.resolve_schema(EDGE_CONSTRAINT_KIND).await?;
    let raw = json!({ "name": edge_name, "node1": "*", "node2": "*" });
    let Value::Object(raw) = raw else {
      return Err(Error::relation("constraint data must be an object"));
    };
    let data = self.check_data(&spec.schema, raw, "data")?;
    let mut doc =
      Document::blank(EDGE_CONSTRAINT_KIND, self.generate_link().await?);
    doc.data = data.clone();
    self.backend.insert(doc).await.map_err(Error::backend)?;
    tracing::debug!(edge_name, "installed permissive edge constraint");
    EdgeConstraint::from_data(&data)
  }

  async fn count_edges(
    &self,
    edge_name: &str,
    side: &str,
    id: &str,
    exclude: Option<&str>,
  ) -> Result<usize> {
    let mut selector = Map::new();
    selector.insert("schema".into(), Value::String(EDGE_KIND.into()));
    selector.insert("data.edge_name".into(), Value::String(edge_name.into()));
    selector.insert(format!("data.{side}"), Value::String(id.into()));
    let query = Query { selector, limit: None, fields: None };
    let docs = self.backend.search(&query).await.map_err(Error::backend)?;
    Ok(docs.iter().filter(|d| d.id.as_deref() != exclude).count())
  }
}

fn node_criterion(data: &Map<String, Value>, field: &str) -> Result<DocRef> {
  let value = data
    .get(field)
    .ok_or_else(|| Error::relation(format!("edges need a `{field}`")))?;
  DocRef::from_criteria(value)
    .map_err(|_| Error::relation(format!("`{field}` must be an id string or a criteria object")))
}
