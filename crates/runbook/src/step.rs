// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step and phase definitions

use indexmap::IndexMap;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Polling configuration for long-running functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollDef {
    /// Duration string, e.g. `"5m"`.
    pub interval: String,
    /// Duration string; wall-clock budget from the first poll response.
    pub timeout: String,
}

/// Retry configuration, either per step or as the runbook-wide default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryDef {
    pub max_retries: i32,
    /// Duration string, e.g. `"30s"`.
    pub interval: String,
}

/// One function call executed on a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
    /// Step name (injected from the map key in HCL format)
    #[serde(default)]
    pub name: String,
    pub worker_id: String,
    pub function: String,
    /// Parameter templates; values may reference `{{member_data}}` names.
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Mapping from template variable name to result field; on success the
    /// picked values are merged into the member's worker data.
    #[serde(default)]
    pub output_params: HashMap<String, String>,
    /// Rollback sequence fired when this step terminally fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryDef>,
}

/// One ordered segment of a batch, firing at `offset` before batch start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDef {
    /// Phase name (injected from the map key in HCL format)
    #[serde(default)]
    pub name: String,
    /// Offset string, e.g. `"T-1h"`.
    pub offset: String,
    #[serde(default, alias = "step", deserialize_with = "deserialize_steps")]
    pub steps: Vec<StepDef>,
}

/// Deserialize steps from either a sequence (TOML) or a map (HCL labeled
/// blocks).
///
/// - TOML `[[phase.step]]` produces a `Vec<StepDef>`
/// - HCL `step "name" { }` produces an `IndexMap<String, StepDef>`
///   (preserves insertion order); the key is injected as the step name
pub(crate) fn deserialize_steps<'de, D>(deserializer: D) -> Result<Vec<StepDef>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StepsVisitor;

    impl<'de> Visitor<'de> for StepsVisitor {
        type Value = Vec<StepDef>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a sequence of steps or a map of labeled step blocks")
        }

        fn visit_seq<S>(self, seq: S) -> Result<Vec<StepDef>, S::Error>
        where
            S: SeqAccess<'de>,
        {
            Vec::deserialize(de::value::SeqAccessDeserializer::new(seq))
        }

        fn visit_map<M>(self, map: M) -> Result<Vec<StepDef>, M::Error>
        where
            M: MapAccess<'de>,
        {
            let index_map: IndexMap<String, StepDef> =
                IndexMap::deserialize(de::value::MapAccessDeserializer::new(map))?;
            Ok(index_map
                .into_iter()
                .map(|(key, mut step)| {
                    if step.name.is_empty() {
                        step.name = key;
                    }
                    step
                })
                .collect())
        }
    }

    deserializer.deserialize_any(StepsVisitor)
}

/// Deserialize phases from either a sequence (TOML) or a map (HCL labeled
/// blocks), mirroring [`deserialize_steps`].
pub(crate) fn deserialize_phases<'de, D>(deserializer: D) -> Result<Vec<PhaseDef>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PhasesVisitor;

    impl<'de> Visitor<'de> for PhasesVisitor {
        type Value = Vec<PhaseDef>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a sequence of phases or a map of labeled phase blocks")
        }

        fn visit_seq<S>(self, seq: S) -> Result<Vec<PhaseDef>, S::Error>
        where
            S: SeqAccess<'de>,
        {
            Vec::deserialize(de::value::SeqAccessDeserializer::new(seq))
        }

        fn visit_map<M>(self, map: M) -> Result<Vec<PhaseDef>, M::Error>
        where
            M: MapAccess<'de>,
        {
            let index_map: IndexMap<String, PhaseDef> =
                IndexMap::deserialize(de::value::MapAccessDeserializer::new(map))?;
            Ok(index_map
                .into_iter()
                .map(|(key, mut phase)| {
                    if phase.name.is_empty() {
                        phase.name = key;
                    }
                    phase
                })
                .collect())
        }
    }

    deserializer.deserialize_any(PhasesVisitor)
}

impl PhaseDef {
    /// Get a step by name
    pub fn get_step(&self, name: &str) -> Option<&StepDef> {
        self.steps.iter().find(|s| s.name == name)
    }
}
