//! Pluggable text rendering for documents.
//!
//! Schemas declare named templates in their settings; each names an engine,
//! and `"plain"` ships with the crate. More capable engines register through
//! [`Satchel::register_template_engine`](crate::Satchel::register_template_engine)
//! before bootstrap.

use serde_json::Value;

/// A named rendering engine. `context` is `{ "doc": ..., "schema": ... }`;
/// the error string is shown to the caller inline, so keep it short.
pub trait TemplateEngine: Send + Sync {
  fn render(&self, template: &str, context: &Value) -> Result<String, String>;
}

/// The built-in engine: replaces `{{dotted.path}}` placeholders with the
/// value at that path in the context. Missing paths render as empty strings.
pub struct PlainTemplate;

impl TemplateEngine for PlainTemplate {
  fn render(&self, template: &str, context: &Value) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
      out.push_str(&rest[..start]);
      let after = &rest[start + 2..];
      let Some(end) = after.find("}}") else {
        return Err("unterminated `{{` placeholder".into());
      };
      out.push_str(&placeholder_text(context, after[..end].trim()));
      rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
  }
}

fn placeholder_text(context: &Value, path: &str) -> String {
  let mut current = context;
  for part in path.split('.') {
    match current.get(part) {
      Some(next) => current = next,
      None => return String::new(),
    }
  }
  match current {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}
