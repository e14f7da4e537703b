//! Template text processing
//!
//! Two-pass substitution: named variables first, then dynamic context.
//! The dynamic pass runs unconditionally, so a `{datetime}` token that
//! survives (or is produced by) variable substitution is always
//! replaced with the real current time.

use std::collections::HashMap;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

/// Matches `{identifier}` placeholders (word characters only)
static VARIABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("valid regex"));

/// Replace `{name}` placeholders with values from `variables`
///
/// Placeholders with no matching key are left verbatim. Required
/// compatibility behavior: callers rely on unresolved tokens surviving
/// the pass untouched.
pub fn substitute_variables(
    content: &str,
    variables: &HashMap<String, serde_json::Value>,
) -> String {
    VARIABLE_RE
        .replace_all(content, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value_to_string(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Replace the literal `{datetime}` with the current UTC time
///
/// Format: `YYYY-MM-DD HH:MM:SS UTC`.
pub fn apply_dynamic_context(content: &str) -> String {
    if content.contains("{datetime}") {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        content.replace("{datetime}", &now)
    } else {
        content.to_string()
    }
}

/// String form of a variable value; JSON strings lose their quotes
fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Result of validating a template's text
#[derive(Debug, Clone, Serialize)]
pub struct TemplateValidation {
    pub valid: bool,
    pub variables: Vec<String>,
    pub errors: Vec<String>,
}

/// Validate a template: brace counts must match
///
/// Also extracts the de-duplicated variable names, in first-occurrence
/// order.
pub fn validate_template(content: &str) -> TemplateValidation {
    let mut variables: Vec<String> = Vec::new();
    for caps in VARIABLE_RE.captures_iter(content) {
        let name = caps[1].to_string();
        if !variables.contains(&name) {
            variables.push(name);
        }
    }

    let open_braces = content.matches('{').count();
    let close_braces = content.matches('}').count();
    let valid = open_braces == close_braces;

    let errors = if valid {
        Vec::new()
    } else {
        vec!["Mismatched braces in template".to_string()]
    };

    TemplateValidation {
        valid,
        variables,
        errors,
    }
}
