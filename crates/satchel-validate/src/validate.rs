//! The recursive schema walk.

use regex::Regex;
use satchel_core::Issue;
use serde_json::Value;

fn child_path(path: &str, key: &str) -> String {
  if path.is_empty() { key.to_owned() } else { format!("{path}.{key}") }
}

fn issue(path: &str, message: impl Into<String>) -> Issue {
  if path.is_empty() {
    Issue::new(message)
  } else {
    Issue::at(path, message)
  }
}

fn json_type(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

fn type_matches(expected: &str, value: &Value) -> bool {
  match expected {
    // Every integer is also a number.
    "number" => value.is_number(),
    "integer" => value.is_i64() || value.is_u64(),
    other => json_type(value) == other,
  }
}

/// Validate `value` against `schema`, applying `default`s into `value` for
/// missing object properties. Returns all problems found; an empty list
/// means the (possibly amended) value conforms.
pub fn validate_value(schema: &Value, value: &mut Value, path: &str) -> Vec<Issue> {
  let mut issues = Vec::new();
  let Some(schema) = schema.as_object() else {
    // A non-object schema constrains nothing.
    return issues;
  };

  // type — a string or a list of admissible type names
  if let Some(expected) = schema.get("type") {
    let ok = match expected {
      Value::String(t) => type_matches(t, value),
      Value::Array(ts) => ts
        .iter()
        .filter_map(Value::as_str)
        .any(|t| type_matches(t, value)),
      _ => true,
    };
    if !ok {
      issues.push(issue(
        path,
        format!("expected type {expected}, got {}", json_type(value)),
      ));
      return issues;
    }
  }

  if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
    if !allowed.contains(value) {
      issues.push(issue(path, format!("value not one of {allowed:?}")));
    }
  }

  match value {
    Value::String(s) => check_string(schema, s, path, &mut issues),
    Value::Number(_) => check_number(schema, value, path, &mut issues),
    Value::Array(items) => {
      check_bound(schema, "minItems", items.len(), false, path, &mut issues);
      check_bound(schema, "maxItems", items.len(), true, path, &mut issues);
      if let Some(item_schema) = schema.get("items") {
        for (i, item) in items.iter_mut().enumerate() {
          issues.extend(validate_value(
            item_schema,
            item,
            &child_path(path, &i.to_string()),
          ));
        }
      }
    }
    Value::Object(obj) => check_object(schema, obj, path, &mut issues),
    _ => {}
  }

  issues
}

fn check_string(
  schema: &serde_json::Map<String, Value>,
  s: &str,
  path: &str,
  issues: &mut Vec<Issue>,
) {
  let len = s.chars().count();
  check_bound(schema, "minLength", len, false, path, issues);
  check_bound(schema, "maxLength", len, true, path, issues);

  if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
    match Regex::new(pattern) {
      Ok(re) => {
        if !re.is_match(s) {
          issues.push(issue(path, format!("does not match pattern {pattern:?}")));
        }
      }
      Err(_) => {
        issues.push(issue(path, format!("schema pattern {pattern:?} is invalid")));
      }
    }
  }
}

fn check_number(
  schema: &serde_json::Map<String, Value>,
  value: &Value,
  path: &str,
  issues: &mut Vec<Issue>,
) {
  let Some(n) = value.as_f64() else { return };
  if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
    if n < min {
      issues.push(issue(path, format!("{n} is below minimum {min}")));
    }
  }
  if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
    if n > max {
      issues.push(issue(path, format!("{n} is above maximum {max}")));
    }
  }
}

fn check_object(
  schema: &serde_json::Map<String, Value>,
  obj: &mut serde_json::Map<String, Value>,
  path: &str,
  issues: &mut Vec<Issue>,
) {
  let properties = schema.get("properties").and_then(Value::as_object).cloned();

  if let Some(props) = &properties {
    // Recurse into present properties; inject defaults for missing ones.
    for (name, prop_schema) in props {
      match obj.get_mut(name) {
        Some(field) => {
          issues.extend(validate_value(prop_schema, field, &child_path(path, name)));
        }
        None => {
          if let Some(default) = prop_schema.get("default") {
            obj.insert(name.clone(), default.clone());
          }
        }
      }
    }

    if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
      for key in obj.keys() {
        if !props.contains_key(key) {
          issues.push(issue(&child_path(path, key), "unknown property"));
        }
      }
    }
  }

  // required is checked after default injection
  if let Some(required) = schema.get("required").and_then(Value::as_array) {
    for key in required.iter().filter_map(Value::as_str) {
      if !obj.contains_key(key) {
        issues.push(issue(&child_path(path, key), "is required"));
      }
    }
  }

  check_bound(schema, "minProperties", obj.len(), false, path, issues);
  check_bound(schema, "maxProperties", obj.len(), true, path, issues);
}

fn check_bound(
  schema: &serde_json::Map<String, Value>,
  keyword: &str,
  actual: usize,
  is_max: bool,
  path: &str,
  issues: &mut Vec<Issue>,
) {
  let Some(bound) = schema.get(keyword).and_then(Value::as_u64) else {
    return;
  };
  let violated = if is_max {
    actual as u64 > bound
  } else {
    (actual as u64) < bound
  };
  if violated {
    issues.push(issue(path, format!("{keyword} {bound} violated (got {actual})")));
  }
}
