// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template variable resolution
//!
//! Step parameters reference member data with `{{name}}` placeholders.
//! Lookup is case-sensitive against the merged context, falling back to the
//! `_`-prefixed name so `{{batch_id}}` finds the special `_batch_id`.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

/// Regex pattern for `{{identifier}}` placeholders.
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
pub static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("constant regex pattern is valid")
});

/// A template that could not be fully resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unresolved placeholder(s) {} in template: {template}", missing.join(", "))]
    Unresolved {
        template: String,
        missing: Vec<String>,
    },
}

fn lookup<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a String> {
    vars.get(name).or_else(|| vars.get(&format!("_{}", name)))
}

/// Resolve every `{{name}}` placeholder, erroring with the full list of
/// missing names if any cannot be found.
pub fn resolve(template: &str, vars: &HashMap<String, String>) -> Result<String, TemplateError> {
    let mut missing = Vec::new();
    let resolved = VAR_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            match lookup(vars, name) {
                Some(val) => val.clone(),
                None => {
                    if !missing.iter().any(|m| m == name) {
                        missing.push(name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        })
        .to_string();

    if missing.is_empty() {
        Ok(resolved)
    } else {
        Err(TemplateError::Unresolved {
            template: template.to_string(),
            missing,
        })
    }
}

/// Resolve what the context can, leaving unknown placeholders in place.
///
/// Used at step-creation time, where placeholders filled by earlier steps'
/// `output_params` are expected to still be unresolved.
pub fn resolve_lenient(template: &str, vars: &HashMap<String, String>) -> String {
    VAR_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            match lookup(vars, &caps[1]) {
                Some(val) => val.clone(),
                None => caps[0].to_string(),
            }
        })
        .to_string()
}

/// All identifiers referenced by a template, in order of first appearance.
pub fn references(template: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in VAR_PATTERN.captures_iter(template) {
        let name = caps[1].to_string();
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Check that `{{` and `}}` markers pair up left to right.
pub fn check_balanced(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut open = false;
    let mut i = 0;
    while i + 1 < bytes.len() {
        match &bytes[i..i + 2] {
            b"{{" => {
                if open {
                    return false;
                }
                open = true;
                i += 2;
            }
            b"}}" => {
                if !open {
                    return false;
                }
                open = false;
                i += 2;
            }
            _ => i += 1,
        }
    }
    // A trailing single brace after an opener also counts as unbalanced.
    !open
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
