//! Typed error hierarchy for cairn.
//!
//! One enum per subsystem:
//! - `SessionError`: state machine transitions and the session store
//! - `ArtifactError`: artifact parsing, validation and storage
//! - `CapsuleError`: capsule document codec and store
//! - `OrchestratorError`: phase pipeline failures, wrapping the three above
//!
//! Interruption has no variant: a paused run is a normal outcome.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionStatus;

/// Errors from the session state machine and session store.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session {id} is {status} and can no longer change state")]
    Terminal { id: String, status: SessionStatus },

    #[error("Session {id} is paused; resume it before transitioning")]
    Paused { id: String },

    #[error("Invalid transition for session {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Session {id} is paused but has no recorded previous status")]
    MissingPreviousStatus { id: String },

    #[error("Session {id} has no execution attempts to update")]
    NoExecutionAttempt { id: String },

    #[error("Session {id} not found")]
    NotFound { id: String },

    #[error("A session needs at least one repository")]
    NoRepos,

    #[error("Session {id} is locked by another cairn process")]
    Locked { id: String },

    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt session record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from parsing, validating and storing phase artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Unterminated artifact header: no closing '---' line")]
    UnterminatedHeader,

    #[error("Invalid artifact header: {0}")]
    InvalidHeader(#[source] serde_yaml::Error),

    #[error("Unknown phase '{0}'")]
    UnknownPhase(String),

    #[error("Artifact for phase {phase} is missing required sections (expected one of: {})", expected.join(", "))]
    MissingSections {
        phase: String,
        expected: Vec<String>,
    },

    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    /// Validation failures are warnings for the caller; everything else is fatal.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingSections { .. })
    }
}

/// Errors from the capsule store.
#[derive(Debug, Error)]
pub enum CapsuleError {
    #[error("Capsule {id} not found")]
    NotFound { id: String },

    #[error("Invalid capsule document header in {path}: {source}")]
    InvalidHeader {
        path: PathBuf,
        #[source]
        source: ArtifactError,
    },

    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the phase orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Capsule(#[from] CapsuleError),

    #[error("Failed to spawn agent '{command}': {source}")]
    AgentSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent failed during {phase}: {message}")]
    AgentFailed { phase: String, message: String },

    #[error("Repository {repo} not found at {path}")]
    RepoNotFound { repo: String, path: PathBuf },

    #[error("Phase {phase} is not part of the {mode} sequence")]
    PhaseNotInSequence { phase: String, mode: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
