/// Placeholder variable resolver
///
/// Substitutes {{dotted.path}} tokens in handler configuration strings
/// using the current run context. The first path segment selects the
/// namespace: "contact" reads the acting contact, "trigger" walks the
/// trigger payload. A path that does not resolve leaves the token
/// verbatim, braces included - partial configuration never fails a run
/// here (fail open). Pure functions, no I/O.

use crate::contact::Contact;
use serde_json::Value;

/// Lookup context for one resolution pass
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Acting contact, when the trigger resolved one
    pub contact: Option<&'a Contact>,
    /// Opaque trigger payload, when the run was event-started
    pub trigger_payload: Option<&'a Value>,
}

impl<'a> ResolveContext<'a> {
    /// Resolve a dotted path against the context namespaces
    ///
    /// Returns None for unknown namespaces, missing segments and JSON
    /// null - all three read as "unresolved" to the substitution pass.
    /// Also used directly by the logic handlers to fetch predicate
    /// operands.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let namespace = segments.next()?;
        let rest: Vec<&str> = segments.collect();

        let value = match namespace {
            "contact" => self.lookup_contact(&rest)?,
            "trigger" => walk_json(self.trigger_payload?, &rest)?,
            _ => return None,
        };

        if value.is_null() {
            None
        } else {
            Some(value)
        }
    }

    fn lookup_contact(&self, segments: &[&str]) -> Option<Value> {
        let contact = self.contact?;

        match segments {
            ["id"] => Some(Value::String(contact.id.clone())),
            ["name"] => Some(Value::String(contact.name.clone())),
            ["phone"] => Some(Value::String(contact.phone.clone())),
            ["tags"] => Some(Value::String(contact.tags.join(", "))),
            ["custom_fields", rest @ ..] if !rest.is_empty() => {
                walk_json(&Value::Object(contact.custom_fields.clone()), rest)
            }
            // Shorthand: {{contact.city}} falls through to custom fields
            [field] => contact.custom_fields.get(*field).cloned(),
            _ => None,
        }
    }
}

/// Walk a dotted path through a JSON value
///
/// Objects are indexed by key, arrays by numeric segment; anything else
/// ends the walk unresolved.
fn walk_json(root: &Value, segments: &[&str]) -> Option<Value> {
    let mut current = root;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current.clone())
}

/// Render a resolved value for plain-text substitution
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        // Arrays/objects substitute as compact JSON
        other => other.to_string(),
    }
}

/// Substitute {{dotted.path}} placeholders in a plain string
///
/// Unresolvable tokens stay verbatim, including braces.
pub fn resolve_template(template: &str, ctx: &ResolveContext<'_>) -> String {
    substitute(template, ctx, stringify)
}

/// Substitute placeholders inside a raw JSON text blob
///
/// Substituted values are JSON-string-escaped so that a token sitting
/// inside a string literal keeps the blob syntactically valid. The
/// caller validates that the result parses.
pub fn resolve_json_template(raw: &str, ctx: &ResolveContext<'_>) -> String {
    substitute(raw, ctx, |value| {
        let rendered = stringify(value);
        // serde_json turns the fragment into a quoted literal; strip the quotes
        match serde_json::to_string(&rendered) {
            Ok(quoted) => quoted[1..quoted.len() - 1].to_string(),
            Err(_) => rendered,
        }
    })
}

fn substitute(template: &str, ctx: &ResolveContext<'_>, render: impl Fn(&Value) -> String) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            break;
        };

        output.push_str(&rest[..open]);

        let token = &rest[open..open + 2 + close + 2];
        let path = after_open[..close].trim();

        match ctx.lookup(path) {
            Some(value) => output.push_str(&render(&value)),
            None => output.push_str(token),
        }

        rest = &after_open[close + 2..];
    }

    output.push_str(rest);
    output
}
