// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine.

use thiserror::Error;
use tq_adapters::{RunnerError, SessionError};
use tq_storage::StoreError;

/// Errors that can occur while driving tasks.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("runner error: {0}")]
    Runner(#[from] RunnerError),
    #[error("provisioning failed: {0}")]
    Provision(String),
    #[error("template error: {0}")]
    Template(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl EngineError {
    /// Machine-readable reason recorded on failed tasks and in
    /// `task.failed` events.
    pub fn reason(&self) -> String {
        match self {
            EngineError::Store(StoreError::NoPortsAvailable(..)) => "no_ports".to_string(),
            EngineError::Store(StoreError::ProjectNotFound(_)) => "project_not_found".to_string(),
            EngineError::Store(_) => "store_error".to_string(),
            EngineError::Session(_) => "spawn_failed".to_string(),
            EngineError::Runner(_) => "exec_failed".to_string(),
            EngineError::Provision(_) => "provision_failed".to_string(),
            EngineError::Template(_) => "template_error".to_string(),
            EngineError::InvalidState(_) => "invalid_state".to_string(),
        }
    }
}
