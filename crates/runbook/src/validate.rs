// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structural validation of parsed runbooks

use crate::offset::{parse_duration_secs, parse_offset};
use crate::parser::{RunbookDef, ValidationError};
use crate::source::SourceType;
use crate::step::StepDef;
use crate::template::check_balanced;
use std::collections::HashSet;

/// Run the full validation contract against a parsed runbook.
///
/// Field paths in errors name the offending location, e.g.
/// `phases[1](cutover).step[0](set-guids).params.Guid`.
pub(crate) fn validate_runbook(runbook: &RunbookDef) -> Result<(), ValidationError> {
    // 1. Required top-level fields
    if runbook.name.is_empty() {
        return Err(ValidationError::invalid("name", "runbook name is required"));
    }

    // 2. Data source
    let src = &runbook.data_source;
    if src.connection.is_empty() {
        return Err(ValidationError::invalid(
            "data_source.connection",
            "connection is required",
        ));
    }
    if src.query.is_empty() {
        return Err(ValidationError::invalid(
            "data_source.query",
            "query is required",
        ));
    }
    if src.primary_key.is_empty() {
        return Err(ValidationError::invalid(
            "data_source.primary_key",
            "primary_key is required",
        ));
    }
    match src.source_type {
        SourceType::Databricks if src.warehouse_id.is_none() => {
            return Err(ValidationError::invalid(
                "data_source.warehouse_id",
                "warehouse_id is required for databricks sources",
            ));
        }
        _ => {}
    }

    // 3. Batch timing: exactly one of batch_time_column / batch_time="immediate"
    match (&src.batch_time_column, &src.batch_time) {
        (Some(_), Some(_)) => {
            return Err(ValidationError::invalid(
                "data_source.batch_time",
                "batch_time_column and batch_time are mutually exclusive",
            ));
        }
        (None, None) => {
            return Err(ValidationError::invalid(
                "data_source.batch_time",
                "one of batch_time_column or batch_time = \"immediate\" is required",
            ));
        }
        (None, Some(v)) if v != "immediate" => {
            return Err(ValidationError::invalid(
                "data_source.batch_time",
                format!("only \"immediate\" is supported, got \"{}\"", v),
            ));
        }
        _ => {}
    }

    // 4. Phases: at least one, unique names, parseable offsets, non-empty steps
    if runbook.phases.is_empty() {
        return Err(ValidationError::invalid(
            "phases",
            "at least one phase is required",
        ));
    }
    let mut phase_names = HashSet::new();
    for (i, phase) in runbook.phases.iter().enumerate() {
        let field = format!("phases[{}]({})", i, phase.name);
        if !phase_names.insert(phase.name.as_str()) {
            return Err(ValidationError::invalid(
                field,
                format!("duplicate phase name '{}'", phase.name),
            ));
        }
        parse_offset(&phase.offset)
            .map_err(|e| ValidationError::invalid(format!("{}.offset", field), e))?;
        if phase.steps.is_empty() {
            return Err(ValidationError::invalid(
                format!("{}.steps", field),
                "at least one step is required",
            ));
        }
        let mut step_names = HashSet::new();
        for (j, step) in phase.steps.iter().enumerate() {
            if !step_names.insert(step.name.as_str()) {
                return Err(ValidationError::invalid(
                    format!("{}.step[{}]({})", field, j, step.name),
                    format!("duplicate step name '{}'", step.name),
                ));
            }
        }
    }

    // 5. Runbook-wide retry default
    validate_retry_default(runbook)?;

    // 6. Per-step checks, over every step list in the document
    for (field, step) in all_steps(runbook) {
        validate_step(runbook, &field, step)?;
    }

    Ok(())
}

/// Every step in the document with its field path: init, phase steps,
/// on_member_removed, and rollback sequences.
fn all_steps(runbook: &RunbookDef) -> Vec<(String, &StepDef)> {
    let mut out = Vec::new();
    for (i, step) in runbook.init.iter().enumerate() {
        out.push((format!("init[{}]({})", i, step.name), step));
    }
    for (i, phase) in runbook.phases.iter().enumerate() {
        for (j, step) in phase.steps.iter().enumerate() {
            out.push((
                format!("phases[{}]({}).step[{}]({})", i, phase.name, j, step.name),
                step,
            ));
        }
    }
    for (i, step) in runbook.on_member_removed.iter().enumerate() {
        out.push((format!("on_member_removed[{}]({})", i, step.name), step));
    }
    let mut rollback_names: Vec<&String> = runbook.rollbacks.keys().collect();
    rollback_names.sort();
    for name in rollback_names {
        if let Some(steps) = runbook.rollbacks.get(name) {
            for (j, step) in steps.iter().enumerate() {
                out.push((format!("rollbacks.{}[{}]({})", name, j, step.name), step));
            }
        }
    }
    out
}

fn validate_step(
    runbook: &RunbookDef,
    field: &str,
    step: &StepDef,
) -> Result<(), ValidationError> {
    if step.name.is_empty() {
        return Err(ValidationError::invalid(
            format!("{}.name", field),
            "step name is required",
        ));
    }
    if step.worker_id.is_empty() {
        return Err(ValidationError::invalid(
            format!("{}.worker_id", field),
            "worker_id is required",
        ));
    }
    if step.function.is_empty() {
        return Err(ValidationError::invalid(
            format!("{}.function", field),
            "function is required",
        ));
    }

    if let Some(poll) = &step.poll {
        parse_duration_secs(&poll.interval)
            .map_err(|e| ValidationError::invalid(format!("{}.poll.interval", field), e))?;
        parse_duration_secs(&poll.timeout)
            .map_err(|e| ValidationError::invalid(format!("{}.poll.timeout", field), e))?;
    }

    if let Some(retry) = &step.retry {
        if retry.max_retries < 0 {
            return Err(ValidationError::invalid(
                format!("{}.retry.max_retries", field),
                "max_retries must not be negative",
            ));
        }
        parse_duration_secs(&retry.interval)
            .map_err(|e| ValidationError::invalid(format!("{}.retry.interval", field), e))?;
    }

    if let Some(rollback) = &step.on_failure {
        if !runbook.rollbacks.contains_key(rollback) {
            let mut available: Vec<&str> =
                runbook.rollbacks.keys().map(|k| k.as_str()).collect();
            available.sort_unstable();
            return Err(ValidationError::invalid(
                format!("{}.on_failure", field),
                format!(
                    "references unknown rollback '{}'; available rollbacks: {}",
                    rollback,
                    available.join(", "),
                ),
            ));
        }
    }

    let mut param_names: Vec<&String> = step.params.keys().collect();
    param_names.sort();
    for name in param_names {
        if let Some(value) = step.params.get(name) {
            if !check_balanced(value) {
                return Err(ValidationError::invalid(
                    format!("{}.params.{}", field, name),
                    format!("unbalanced '{{{{' / '}}}}' in value: {}", value),
                ));
            }
        }
    }

    Ok(())
}

// Runbook-wide retry defaults share the step schema, so their interval is
// validated here too.
pub(crate) fn validate_retry_default(runbook: &RunbookDef) -> Result<(), ValidationError> {
    if let Some(retry) = &runbook.retry {
        if retry.max_retries < 0 {
            return Err(ValidationError::invalid(
                "retry.max_retries",
                "max_retries must not be negative",
            ));
        }
        parse_duration_secs(&retry.interval)
            .map_err(|e| ValidationError::invalid("retry.interval", e))?;
    }
    Ok(())
}
