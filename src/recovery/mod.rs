//! Crash recovery.
//!
//! A session is stuck when it sits in an active phase status (not paused, not
//! terminal) and the agent left an artifact in that phase's `.work` directory
//! that nobody ingested. Recovery feeds the artifact through the same ingest
//! path a live run uses, then advances the status as far as the phase allows.

use std::fmt;
use std::path::PathBuf;

use crate::errors::{OrchestratorError, SessionError};
use crate::ingest::{Stores, ingest_phase_output};
use crate::phase::Phase;
use crate::session::{Session, SessionLock, SessionStatus, next_status_after, status_for_phase};

/// What recovery did (or would do) for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Dry run: the orphaned artifact that would be ingested
    Found { artifact: PathBuf },
    Recovered {
        stored_at: PathBuf,
        /// `None` when the phase needs an operator before moving on
        advanced_to: Option<SessionStatus>,
    },
    /// Another process holds the session lock
    Locked,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub session_id: String,
    pub phase: Phase,
    pub status: SessionStatus,
    pub action: RecoveryAction,
}

impl fmt::Display for RecoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {}): ", self.session_id, self.status, self.phase)?;
        match &self.action {
            RecoveryAction::Found { artifact } => {
                write!(f, "would ingest {}", artifact.display())
            }
            RecoveryAction::Recovered {
                stored_at,
                advanced_to: Some(next),
            } => write!(f, "ingested {} and moved to {}", stored_at.display(), next),
            RecoveryAction::Recovered {
                stored_at,
                advanced_to: None,
            } => write!(f, "ingested {}; waiting for operator", stored_at.display()),
            RecoveryAction::Locked => write!(f, "skipped, session is in use"),
            RecoveryAction::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// Phase whose agent was running while the session sat in `status`.
///
/// Unlike [`crate::session::current_phase`] this keeps verify apart from
/// execute, since each writes to its own work directory.
fn running_phase(status: SessionStatus) -> Option<Phase> {
    Phase::ALL
        .into_iter()
        .find(|&phase| status_for_phase(phase) == status)
}

/// Sessions with an orphaned artifact, paired with the phase that left it.
pub fn find_stuck(stores: &Stores) -> Vec<(Session, Phase, PathBuf)> {
    stores
        .sessions
        .list()
        .into_iter()
        .filter(|s| !s.is_terminal() && !s.is_paused())
        .filter_map(|session| {
            let phase = running_phase(session.status)?;
            let work_dir = stores.sessions.work_dir(&session.id, phase.name());
            let located = stores.artifacts.locate(&work_dir, None, &session.id, phase.name())?;
            Some((session, phase, located.path))
        })
        .collect()
}

/// Recover every stuck session. Per-session failures are reported, not returned.
pub fn recover_all(stores: &Stores, dry_run: bool) -> Vec<RecoveryReport> {
    let stuck = find_stuck(stores);
    tracing::info!(count = stuck.len(), dry_run, "scanned for stuck sessions");

    stuck
        .into_iter()
        .map(|(session, phase, artifact)| {
            let session_id = session.id.clone();
            let status = session.status;
            let action = match recover_session(stores, session, phase, artifact, dry_run) {
                Ok(action) => action,
                Err(OrchestratorError::Session(SessionError::Locked { .. })) => {
                    tracing::info!(session = %session_id, "session locked, skipping recovery");
                    RecoveryAction::Locked
                }
                Err(e) => {
                    tracing::warn!(session = %session_id, error = %e, "recovery failed");
                    RecoveryAction::Failed {
                        error: e.to_string(),
                    }
                }
            };
            RecoveryReport {
                session_id,
                phase,
                status,
                action,
            }
        })
        .collect()
}

fn recover_session(
    stores: &Stores,
    mut session: Session,
    phase: Phase,
    artifact: PathBuf,
    dry_run: bool,
) -> Result<RecoveryAction, OrchestratorError> {
    let _lock = SessionLock::acquire(&stores.sessions.session_dir(&session.id), &session.id)?;
    if dry_run {
        return Ok(RecoveryAction::Found { artifact });
    }

    let version = match phase {
        Phase::Execute | Phase::Verify => session.last_attempt().map(|a| a.attempt),
        _ => None,
    };
    let work_dir = stores.sessions.work_dir(&session.id, phase.name());
    let Some(report) = ingest_phase_output(stores, &session, phase, &work_dir, None, version)?
    else {
        return Ok(RecoveryAction::Failed {
            error: format!("artifact in {} disappeared", work_dir.display()),
        });
    };

    let advanced_to = next_status_after(phase, session.mode);
    if let Some(next) = advanced_to {
        session.transition(next)?;
        stores.sessions.save(&session)?;
        if next == SessionStatus::Completed {
            stores.artifacts.purge_session_artifacts(&session.id)?;
        }
    }
    tracing::info!(
        session = %session.id,
        %phase,
        advanced_to = ?advanced_to,
        "recovered orphaned artifact"
    );

    Ok(RecoveryAction::Recovered {
        stored_at: report.stored_at,
        advanced_to,
    })
}
