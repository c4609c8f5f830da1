// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template resolution contexts
//!
//! A member step resolves against the member's frozen source snapshot
//! merged with its accumulated worker data (worker wins), overlaid with
//! the special `_batch_id` / `_batch_start_time` names. Init steps see
//! only the specials.

use convoy_core::{format_utc, Batch, BatchMember};
use convoy_runbook::{resolve, resolve_lenient, StepDef, TemplateError};
use serde_json::Value;
use std::collections::HashMap;

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn overlay_specials(vars: &mut HashMap<String, String>, batch: &Batch) {
    vars.insert("_batch_id".to_string(), batch.id.to_string());
    if let Some(start) = batch.batch_start_time {
        vars.insert("_batch_start_time".to_string(), format_utc(start));
    }
}

/// Resolution context for a member step.
pub fn member_context(member: &BatchMember, batch: &Batch) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = member
        .merged_data()
        .iter()
        .map(|(k, v)| (k.clone(), stringify(v)))
        .collect();
    overlay_specials(&mut vars, batch);
    vars
}

/// Resolution context for an init step: special names only.
pub fn init_context(batch: &Batch) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    overlay_specials(&mut vars, batch);
    vars
}

/// Best-effort pre-resolution at step-creation time.
///
/// Values the context cannot resolve keep their raw `{{…}}` templates;
/// the dispatch path re-resolves them once earlier steps have produced
/// their outputs.
pub fn precreate_params(
    step: &StepDef,
    vars: &HashMap<String, String>,
) -> HashMap<String, String> {
    step.params
        .iter()
        .map(|(k, v)| (k.clone(), resolve_lenient(v, vars)))
        .collect()
}

/// Strict resolution at dispatch time.
///
/// The first unresolvable value fails the whole map with its missing-name
/// list; the caller marks the step `failed` with that list.
pub fn resolve_params(
    params: &HashMap<String, String>,
    vars: &HashMap<String, String>,
) -> Result<HashMap<String, String>, TemplateError> {
    let mut resolved = HashMap::with_capacity(params.len());
    let mut names: Vec<&String> = params.keys().collect();
    names.sort();
    for name in names {
        if let Some(value) = params.get(name) {
            resolved.insert(name.clone(), resolve(value, vars)?);
        }
    }
    Ok(resolved)
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
