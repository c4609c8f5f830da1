// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runbook parsing (TOML, HCL, and JSON)

use crate::source::DataSourceDef;
use crate::step::{deserialize_phases, deserialize_steps, PhaseDef, RetryDef, StepDef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Runbook document format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Hcl,
    Json,
}

/// Errors surfaced to the publisher when a document fails to parse or
/// violates the structural contract. Nothing is written on failure.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HCL parse error: {0}")]
    Hcl(#[from] hcl::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ValidationError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A parsed runbook document.
///
/// Unknown fields are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunbookDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub data_source: DataSourceDef,
    /// Batch-level one-shot steps, executed strictly in order before any
    /// phase.
    #[serde(default, deserialize_with = "deserialize_steps")]
    pub init: Vec<StepDef>,
    #[serde(default, alias = "phase", deserialize_with = "deserialize_phases")]
    pub phases: Vec<PhaseDef>,
    /// Fire-and-forget steps dispatched when a member is removed.
    #[serde(default, deserialize_with = "deserialize_steps")]
    pub on_member_removed: Vec<StepDef>,
    /// Runbook-wide retry default, overridden per step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryDef>,
    /// Named rollback sequences referenced by steps' `on_failure`.
    #[serde(default, alias = "rollback", deserialize_with = "deserialize_rollbacks")]
    pub rollbacks: HashMap<String, Vec<StepDef>>,
}

impl RunbookDef {
    /// Get a phase definition by name
    pub fn get_phase(&self, name: &str) -> Option<&PhaseDef> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Get a rollback sequence by name
    pub fn get_rollback(&self, name: &str) -> Option<&[StepDef]> {
        self.rollbacks.get(name).map(|s| s.as_slice())
    }

    /// The effective retry config for a step: its own, else the
    /// runbook-wide default, else no retries.
    pub fn effective_retry(&self, step: &StepDef) -> RetryDef {
        step.retry
            .clone()
            .or_else(|| self.retry.clone())
            .unwrap_or(RetryDef {
                max_retries: 0,
                interval: "0s".to_string(),
            })
    }
}

/// Deserialize a rollback sequence from either a bare step list
/// (TOML `[[rollbacks.cleanup]]`, JSON arrays) or a labeled block wrapping
/// `step` blocks (HCL `rollback "cleanup" { step "undo" { … } }`).
fn deserialize_rollbacks<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, Vec<StepDef>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    #[derive(Deserialize)]
    struct RollbackBlock {
        #[serde(default, alias = "step", deserialize_with = "deserialize_steps")]
        steps: Vec<StepDef>,
    }

    struct Sequence(Vec<StepDef>);

    impl<'de> Deserialize<'de> for Sequence {
        fn deserialize<D2: serde::Deserializer<'de>>(d: D2) -> Result<Self, D2::Error> {
            struct SequenceVisitor;

            impl<'de> de::Visitor<'de> for SequenceVisitor {
                type Value = Sequence;

                fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                    f.write_str("a sequence of steps or a block of labeled step blocks")
                }

                fn visit_seq<S: de::SeqAccess<'de>>(
                    self,
                    seq: S,
                ) -> Result<Sequence, S::Error> {
                    Vec::deserialize(de::value::SeqAccessDeserializer::new(seq)).map(Sequence)
                }

                fn visit_map<M: de::MapAccess<'de>>(
                    self,
                    map: M,
                ) -> Result<Sequence, M::Error> {
                    let block =
                        RollbackBlock::deserialize(de::value::MapAccessDeserializer::new(map))?;
                    Ok(Sequence(block.steps))
                }
            }

            d.deserialize_any(SequenceVisitor)
        }
    }

    let raw: HashMap<String, Sequence> = HashMap::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, Sequence(v))| (k, v)).collect())
}

/// Parse and validate a runbook from TOML content (convenience wrapper)
pub fn parse_runbook(content: &str) -> Result<RunbookDef, ValidationError> {
    parse_runbook_with_format(content, Format::Toml)
}

/// Parse a runbook in the given format, then run the full validation
/// contract.
pub fn parse_runbook_with_format(
    content: &str,
    format: Format,
) -> Result<RunbookDef, ValidationError> {
    // 1. Serde does the heavy lifting
    let runbook: RunbookDef = match format {
        Format::Toml => toml::from_str(content)?,
        Format::Hcl => hcl::from_str(content)?,
        Format::Json => serde_json::from_str(content)?,
    };

    // 2. Name fixups are handled inside the seq-or-map deserializers;
    //    rollback steps named by key only exist in HCL, so nothing to do.
    for (i, phase) in runbook.phases.iter().enumerate() {
        if phase.name.is_empty() {
            return Err(ValidationError::invalid(
                format!("phases[{}].name", i),
                "phase name is required",
            ));
        }
    }

    // 3. Structural and referential checks
    crate::validate::validate_runbook(&runbook)?;

    Ok(runbook)
}

#[cfg(test)]
#[path = "parser_tests/mod.rs"]
mod tests;
