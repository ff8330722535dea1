//! Mango-selector evaluation over document JSON.
//!
//! Supports the subset the lifecycle engine composes — dotted-path equality
//! — plus the common comparison operators (`$eq`, `$ne`, `$exists`, `$gt`,
//! `$gte`, `$lt`, `$lte`) for callers querying through the engine's
//! pass-through `search`.

use serde_json::{Map, Value};

/// Resolve a dotted path (`"data.title"`, `"meta.link"`) inside a document.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
  path.split('.').try_fold(doc, |v, key| v.get(key))
}

fn compare(actual: &Value, operand: &Value) -> Option<std::cmp::Ordering> {
  match (actual, operand) {
    (Value::Number(a), Value::Number(b)) => {
      a.as_f64()?.partial_cmp(&b.as_f64()?)
    }
    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
    _ => None,
  }
}

fn apply_op(actual: Option<&Value>, op: &str, operand: &Value) -> bool {
  use std::cmp::Ordering::{Greater, Less};
  match op {
    "$eq" => actual == Some(operand),
    "$ne" => actual != Some(operand),
    "$exists" => actual.is_some() == (operand == &Value::Bool(true)),
    "$gt" | "$gte" | "$lt" | "$lte" => {
      let Some(ord) = actual.and_then(|a| compare(a, operand)) else {
        return false;
      };
      match op {
        "$gt" => ord == Greater,
        "$gte" => ord != Less,
        "$lt" => ord == Less,
        _ => ord != Greater,
      }
    }
    // Unknown operators never match; surfacing them as empty result sets
    // is how CouchDB-style backends behave for unindexable clauses.
    _ => false,
  }
}

/// Whether `doc` satisfies every clause of `selector`.
pub fn matches(doc: &Value, selector: &Map<String, Value>) -> bool {
  selector.iter().all(|(path, cond)| {
    let actual = lookup(doc, path);
    match cond.as_object() {
      Some(ops) if ops.keys().any(|k| k.starts_with('$')) => {
        ops.iter().all(|(op, operand)| apply_op(actual, op, operand))
      }
      _ => actual == Some(cond),
    }
  })
}

/// Restrict a document's `data` to the requested `data.*` projection paths.
/// Envelope fields (`_id`, `_rev`, `schema`, `meta`) are always kept so the
/// result still parses as a document.
pub fn project_data(doc: &mut Value, fields: &[String]) {
  let keep: Vec<&str> = fields
    .iter()
    .filter_map(|f| f.strip_prefix("data."))
    .collect();
  if keep.is_empty() {
    return;
  }
  if let Some(data) = doc.get_mut("data").and_then(Value::as_object_mut) {
    data.retain(|k, _| keep.contains(&k.as_str()));
  }
}
