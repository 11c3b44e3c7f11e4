//! Session state machine.
//!
//! The transition table is static configuration; every mutation below
//! validates against it before touching the session. A failed call leaves the
//! session exactly as it was.

use chrono::Utc;

use super::{AttemptOutcome, ExecutionAttempt, Session, SessionMode, SessionStatus};
use crate::errors::SessionError;
use crate::phase::Phase;

use SessionStatus as S;

/// Allowed forward moves for each active status.
const TRANSITIONS: &[(SessionStatus, &[SessionStatus])] = &[
    (S::Started, &[S::Investigating]),
    (S::Investigating, &[S::Planning, S::Concluding]),
    (S::Planning, &[S::Reviewing]),
    (S::Reviewing, &[S::Approved]),
    (S::Approved, &[S::Executing]),
    (S::Executing, &[S::Verifying]),
    (S::Verifying, &[S::Simplifying, S::Executing]),
    (S::Simplifying, &[S::Recording]),
    (S::Concluding, &[S::Recording]),
    (S::Recording, &[S::Completed]),
];

/// Statuses reachable from `status` in one step (excluding the idempotent self-move).
pub fn allowed_transitions(status: SessionStatus) -> &'static [SessionStatus] {
    TRANSITIONS
        .iter()
        .find(|(from, _)| *from == status)
        .map(|(_, to)| *to)
        .unwrap_or(&[])
}

/// Status the session carries while `phase` is running.
pub fn status_for_phase(phase: Phase) -> SessionStatus {
    match phase {
        Phase::Investigate => S::Investigating,
        Phase::Plan => S::Planning,
        Phase::Review => S::Reviewing,
        Phase::Execute => S::Executing,
        Phase::Verify => S::Verifying,
        Phase::Simplify => S::Simplifying,
        Phase::Conclude => S::Concluding,
        Phase::Record => S::Recording,
    }
}

/// Map a status back to the phase that was in progress.
///
/// Verification is folded into the execute loop, so `verifying` maps to
/// `Execute`. Terminal and paused statuses have no current phase.
pub fn current_phase(status: SessionStatus) -> Option<Phase> {
    match status {
        S::Started | S::Investigating => Some(Phase::Investigate),
        S::Planning => Some(Phase::Plan),
        S::Reviewing => Some(Phase::Review),
        S::Approved | S::Executing | S::Verifying => Some(Phase::Execute),
        S::Simplifying => Some(Phase::Simplify),
        S::Concluding => Some(Phase::Conclude),
        S::Recording => Some(Phase::Record),
        S::Completed | S::Abandoned | S::Paused => None,
    }
}

/// Status a session should move to once `phase` has durably finished.
///
/// `None` means the next step needs an operator (verify) or there is no
/// further step for this mode.
pub fn next_status_after(phase: Phase, mode: SessionMode) -> Option<SessionStatus> {
    match phase {
        Phase::Investigate => match mode {
            SessionMode::Research => Some(S::Concluding),
            _ => Some(S::Planning),
        },
        Phase::Plan => Some(S::Reviewing),
        Phase::Review => Some(S::Approved),
        Phase::Execute => Some(S::Verifying),
        Phase::Verify => None,
        Phase::Simplify | Phase::Conclude => Some(S::Recording),
        Phase::Record => Some(S::Completed),
    }
}

impl Session {
    fn ensure_not_terminal(&self) -> Result<(), SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::Terminal {
                id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    /// Move to `target`.
    ///
    /// Moving to the current status is an idempotent no-op so an interrupted
    /// phase can be retried. Terminal and paused sessions reject every move.
    pub fn transition(&mut self, target: SessionStatus) -> Result<(), SessionError> {
        self.ensure_not_terminal()?;
        if self.status == S::Paused {
            return Err(SessionError::Paused {
                id: self.id.clone(),
            });
        }
        if self.status == target {
            return Ok(());
        }
        if !allowed_transitions(self.status).contains(&target) {
            return Err(SessionError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: target,
            });
        }

        let now = Utc::now();
        self.status = target;
        self.updated_at = now;
        if target == S::Completed {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Park the session, remembering where it was.
    ///
    /// Pausing an already-paused session keeps the original previous status.
    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.ensure_not_terminal()?;
        if self.status == S::Paused {
            return Ok(());
        }
        let now = Utc::now();
        self.previous_status = Some(self.status);
        self.status = S::Paused;
        self.paused_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Leave the paused side-state.
    ///
    /// An active session is left untouched: that is the crash-recovery path,
    /// where the orchestrator simply picks up from the recorded status.
    pub fn resume(&mut self) -> Result<(), SessionError> {
        self.ensure_not_terminal()?;
        if self.status != S::Paused {
            return Ok(());
        }
        let previous = self
            .previous_status
            .ok_or_else(|| SessionError::MissingPreviousStatus {
                id: self.id.clone(),
            })?;
        self.status = previous;
        self.previous_status = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Give up on the session. Allowed from any non-terminal status, including paused.
    pub fn abandon(&mut self) -> Result<(), SessionError> {
        self.ensure_not_terminal()?;
        self.status = S::Abandoned;
        self.previous_status = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Append a new in-progress execution attempt and return its number.
    pub fn add_execution_attempt(&mut self) -> u32 {
        let attempt = self.execution_attempts.len() as u32 + 1;
        self.execution_attempts.push(ExecutionAttempt {
            attempt,
            started_at: Utc::now(),
            outcome: AttemptOutcome::InProgress,
            reason: None,
        });
        self.updated_at = Utc::now();
        attempt
    }

    /// Record the outcome of the most recent attempt.
    pub fn update_last_execution_outcome(
        &mut self,
        outcome: AttemptOutcome,
        reason: Option<String>,
    ) -> Result<(), SessionError> {
        let last = self
            .execution_attempts
            .last_mut()
            .ok_or_else(|| SessionError::NoExecutionAttempt {
                id: self.id.clone(),
            })?;
        last.outcome = outcome;
        last.reason = reason;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(mode: SessionMode) -> Session {
        Session::new("2026-01-01-test-abc123", "test", mode, vec!["repo".into()])
    }

    fn session_in(status: SessionStatus) -> Session {
        let mut s = session(SessionMode::Standard);
        s.status = status;
        s
    }

    #[test]
    fn test_standard_scenario_started_to_investigating() {
        let mut s = session(SessionMode::Standard);
        assert_eq!(s.status, S::Started);
        s.transition(S::Investigating).unwrap();
        assert_eq!(s.status, S::Investigating);
    }

    #[test]
    fn test_started_cannot_jump_to_approved() {
        let mut s = session(SessionMode::Standard);
        let err = s.transition(S::Approved).unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
        assert_eq!(s.status, S::Started);
    }

    #[test]
    fn test_transition_succeeds_iff_allowed_or_self() {
        for from in SessionStatus::ALL {
            for to in SessionStatus::ALL {
                let mut s = session_in(from);
                let result = s.transition(to);
                let expected = !from.is_terminal()
                    && from != S::Paused
                    && (from == to || allowed_transitions(from).contains(&to));
                assert_eq!(
                    result.is_ok(),
                    expected,
                    "transition {} -> {} expected ok={}",
                    from,
                    to,
                    expected
                );
                if result.is_err() {
                    assert_eq!(s.status, from, "failed transition must not mutate");
                }
            }
        }
    }

    #[test]
    fn test_self_transition_is_noop() {
        let mut s = session_in(S::Executing);
        let before = s.updated_at;
        s.transition(S::Executing).unwrap();
        assert_eq!(s.status, S::Executing);
        assert_eq!(s.updated_at, before);
    }

    #[test]
    fn test_verifying_loops_back_to_executing() {
        let mut s = session_in(S::Verifying);
        s.transition(S::Executing).unwrap();
        assert_eq!(s.status, S::Executing);
    }

    #[test]
    fn test_completion_stamps_timestamp() {
        let mut s = session_in(S::Recording);
        assert!(s.completed_at.is_none());
        s.transition(S::Completed).unwrap();
        assert!(s.completed_at.is_some());
    }

    #[test]
    fn test_terminal_rejects_everything_including_abandon() {
        for terminal in [S::Completed, S::Abandoned] {
            let mut s = session_in(terminal);
            assert!(matches!(
                s.transition(S::Investigating),
                Err(SessionError::Terminal { .. })
            ));
            assert!(s.pause().is_err());
            assert!(s.resume().is_err());
            assert!(s.abandon().is_err());
            assert_eq!(s.status, terminal);
        }
    }

    #[test]
    fn test_paused_rejects_transition() {
        let mut s = session_in(S::Planning);
        s.pause().unwrap();
        assert!(matches!(
            s.transition(S::Reviewing),
            Err(SessionError::Paused { .. })
        ));
    }

    #[test]
    fn test_pause_then_resume_restores_prior_status() {
        for status in SessionStatus::ALL {
            if status.is_terminal() || status == S::Paused {
                continue;
            }
            let mut s = session_in(status);
            s.pause().unwrap();
            assert_eq!(s.status, S::Paused);
            assert_eq!(s.previous_status, Some(status));
            assert!(s.paused_at.is_some());
            s.resume().unwrap();
            assert_eq!(s.status, status);
            assert!(s.previous_status.is_none());
        }
    }

    #[test]
    fn test_double_pause_keeps_original_previous_status() {
        let mut s = session_in(S::Reviewing);
        s.pause().unwrap();
        s.pause().unwrap();
        s.resume().unwrap();
        assert_eq!(s.status, S::Reviewing);
    }

    #[test]
    fn test_resume_on_active_session_is_noop() {
        let mut s = session_in(S::Executing);
        s.resume().unwrap();
        assert_eq!(s.status, S::Executing);
    }

    #[test]
    fn test_resume_without_previous_status_fails() {
        let mut s = session_in(S::Paused);
        assert!(matches!(
            s.resume(),
            Err(SessionError::MissingPreviousStatus { .. })
        ));
    }

    #[test]
    fn test_abandon_from_paused() {
        let mut s = session_in(S::Planning);
        s.pause().unwrap();
        s.abandon().unwrap();
        assert_eq!(s.status, S::Abandoned);
        assert!(s.previous_status.is_none());
    }

    #[test]
    fn test_execution_attempts_are_numbered_sequentially() {
        let mut s = session_in(S::Executing);
        assert_eq!(s.add_execution_attempt(), 1);
        s.update_last_execution_outcome(
            AttemptOutcome::FailedVerification,
            Some("failed verification".into()),
        )
        .unwrap();
        assert_eq!(s.add_execution_attempt(), 2);
        assert_eq!(s.execution_attempts.len(), 2);
        assert_eq!(
            s.execution_attempts[0].outcome,
            AttemptOutcome::FailedVerification
        );
        assert_eq!(s.execution_attempts[1].outcome, AttemptOutcome::InProgress);
        for (i, a) in s.execution_attempts.iter().enumerate() {
            assert_eq!(a.attempt as usize, i + 1);
        }
    }

    #[test]
    fn test_update_outcome_targets_last_attempt() {
        let mut s = session_in(S::Executing);
        s.add_execution_attempt();
        s.add_execution_attempt();
        s.update_last_execution_outcome(AttemptOutcome::Completed, None)
            .unwrap();
        assert_eq!(s.execution_attempts[0].outcome, AttemptOutcome::InProgress);
        assert_eq!(s.execution_attempts[1].outcome, AttemptOutcome::Completed);
    }

    #[test]
    fn test_update_outcome_without_attempt_fails() {
        let mut s = session_in(S::Executing);
        assert!(matches!(
            s.update_last_execution_outcome(AttemptOutcome::Completed, None),
            Err(SessionError::NoExecutionAttempt { .. })
        ));
    }

    #[test]
    fn test_current_phase_mapping() {
        assert_eq!(current_phase(S::Started), Some(Phase::Investigate));
        assert_eq!(current_phase(S::Approved), Some(Phase::Execute));
        assert_eq!(current_phase(S::Verifying), Some(Phase::Execute));
        assert_eq!(current_phase(S::Concluding), Some(Phase::Conclude));
        assert_eq!(current_phase(S::Recording), Some(Phase::Record));
        assert_eq!(current_phase(S::Completed), None);
        assert_eq!(current_phase(S::Paused), None);
    }

    #[test]
    fn test_phase_status_round_trip_except_verify() {
        for phase in Phase::ALL {
            let status = status_for_phase(phase);
            let back = current_phase(status).unwrap();
            if phase == Phase::Verify {
                assert_eq!(back, Phase::Execute);
            } else {
                assert_eq!(back, phase);
            }
        }
    }

    #[test]
    fn test_next_status_after_is_always_a_legal_move() {
        for mode in [
            SessionMode::Standard,
            SessionMode::Quickfix,
            SessionMode::Research,
        ] {
            for phase in Phase::ALL {
                if let Some(next) = next_status_after(phase, mode) {
                    let from = status_for_phase(phase);
                    assert!(
                        allowed_transitions(from).contains(&next),
                        "{} -> {} should be allowed",
                        from,
                        next
                    );
                }
            }
        }
    }
}
