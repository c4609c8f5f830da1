// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the engine
//!
//! Inside a handler every error ends up in exactly one of three places:
//! a terminal state on the affected row, a dead-letter with a reason
//! string, or an abandoned delivery that the bus will redeliver.

use convoy_bus::{BusError, Disposition};
use convoy_core::message::MessageDecodeError;
use convoy_runbook::{TemplateError, ValidationError};
use convoy_storage::{LockError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("runbook validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Unrecoverable message corruption; the delivery is parked with this
    /// reason string.
    #[error("{reason}")]
    DeadLetter { reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<MessageDecodeError> for EngineError {
    fn from(e: MessageDecodeError) -> Self {
        EngineError::DeadLetter {
            reason: e.to_string(),
        }
    }
}

impl EngineError {
    pub fn dead_letter(reason: impl Into<String>) -> Self {
        EngineError::DeadLetter {
            reason: reason.into(),
        }
    }

    /// How the runtime settles the in-flight delivery for this error.
    pub fn disposition(&self) -> Disposition {
        match self {
            EngineError::DeadLetter { reason } => Disposition::dead_letter(reason.clone()),
            // Transient faults: let the bus redeliver. Deterministic job
            // ids keep redelivery from double-dispatching.
            _ => Disposition::Abandon,
        }
    }
}
