//! `{{name}}` placeholder rendering for `prompt` and `http` nodes.

use serde_json::Value as JsonValue;

/// Stringifies a value for substitution: strings verbatim, everything
/// else as JSON text.
#[must_use]
pub fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replaces `{{name}}` placeholders using the resolver. Unresolved
/// placeholders render as the empty string.
fn replace_placeholders(template: &str, resolve: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                if let Some(value) = resolve(name) {
                    out.push_str(&value);
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated placeholder; keep the text verbatim.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Renders a prompt template: `{{input}}` becomes the stringified
/// input, and each name listed in `variables` substitutes the matching
/// input-record field. Missing variables render as the empty string.
#[must_use]
pub fn render_prompt(template: &str, input: &JsonValue, variables: &[String]) -> String {
    replace_placeholders(template, |name| {
        if name == "input" {
            return Some(stringify(input));
        }
        if !variables.iter().any(|v| v == name) {
            return None;
        }
        Some(
            input
                .get(name)
                .map(stringify)
                .unwrap_or_default(),
        )
    })
}

/// Interpolates `{{name}}` placeholders from input-record fields, as
/// `http` nodes do for their URL and body. Missing fields render as the
/// empty string.
#[must_use]
pub fn interpolate(template: &str, input: &JsonValue) -> String {
    replace_placeholders(template, |name| {
        Some(input.get(name).map(stringify).unwrap_or_default())
    })
}
