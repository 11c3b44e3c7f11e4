//! The session pipeline and its execute/verify loop.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::agent::{AgentOutcome, AgentRequest, AgentRunner};
use super::interrupt::InterruptFlag;
use super::phases::{self, ExecutionMode};
use super::{PauseReason, RunOutcome, prompts};
use crate::config::Config;
use crate::errors::{ArtifactError, OrchestratorError, SessionError};
use crate::gates::{OperatorPrompt, VerifyDecision};
use crate::ingest::{Stores, ingest_phase_output};
use crate::phase::Phase;
use crate::session::{
    AttemptOutcome, Session, SessionLock, SessionMode, SessionStatus, current_phase,
    status_for_phase,
};
use crate::ui::{ActivityIndicator, SessionUI};

const FAILED_VERIFICATION: &str = "failed verification";

type Step = Result<Option<RunOutcome>, OrchestratorError>;

pub struct Orchestrator {
    config: Config,
    stores: Stores,
    agent: Arc<dyn AgentRunner>,
    operator: Arc<dyn OperatorPrompt>,
    interrupt: InterruptFlag,
    ui: SessionUI,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        agent: Arc<dyn AgentRunner>,
        operator: Arc<dyn OperatorPrompt>,
        interrupt: InterruptFlag,
    ) -> Self {
        let stores = Stores::new(config.sessions_dir.clone());
        let ui = SessionUI::new(config.verbose);
        Self {
            config,
            stores,
            agent,
            operator,
            interrupt,
            ui,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Run a session from its recorded status. Paused sessions need [`Self::resume`].
    pub async fn run(&self, id: &str) -> Result<RunOutcome, OrchestratorError> {
        let session = self.stores.sessions.load(id)?;
        if session.is_paused() {
            return Err(SessionError::Paused { id: id.to_string() }.into());
        }
        self.drive(session, None).await
    }

    /// Resume a paused or crashed session, optionally from a named phase.
    pub async fn resume(&self, id: &str, from: Option<Phase>) -> Result<RunOutcome, OrchestratorError> {
        let mut session = self.stores.sessions.load(id)?;
        if session.is_terminal() {
            return Err(SessionError::Terminal {
                id: session.id.clone(),
                status: session.status,
            }
            .into());
        }
        if session.is_paused() {
            session.resume()?;
            self.save(&session)?;
            tracing::info!(session = %session.id, status = %session.status, "resumed session");
        }
        self.drive(session, from).await
    }

    async fn drive(&self, mut session: Session, from: Option<Phase>) -> Result<RunOutcome, OrchestratorError> {
        if session.is_terminal() {
            return Err(SessionError::Terminal {
                id: session.id.clone(),
                status: session.status,
            }
            .into());
        }
        let _lock = SessionLock::acquire(&self.stores.sessions.session_dir(&session.id), &session.id)?;
        let repo_root = self.check_repos(&session)?;
        self.stores.sessions.ensure_layout(&session)?;

        let sequence = phases::sequence(session.mode);
        let start_phase = match from {
            Some(phase) => phase,
            None => current_phase(session.status).unwrap_or(sequence[0]),
        };
        let start = phases::position(session.mode, start_phase).ok_or_else(|| {
            OrchestratorError::PhaseNotInSequence {
                phase: start_phase.to_string(),
                mode: session.mode.to_string(),
            }
        })?;

        self.ui.session_banner(&session);

        for &phase in &sequence[start..] {
            let stop = if phase == Phase::Execute {
                self.execute_loop(&mut session, &repo_root).await?
            } else {
                self.run_phase(&mut session, phase, &repo_root, None).await?
            };
            if let Some(outcome) = stop {
                return Ok(outcome);
            }

            if phases::profile(phase).approval_gate && !self.config.is_auto_continue(phase) {
                let next = phases::next_in_sequence(session.mode, phase);
                match self.operator.confirm_continue(&session, phase, next)? {
                    Some(true) => {}
                    Some(false) => {
                        return self.pause(&mut session, PauseReason::Declined { phase }, next);
                    }
                    None => return self.pause(&mut session, PauseReason::Interrupted, next),
                }
            }
            if phase == Phase::Review {
                self.approve(&mut session)?;
            }
        }

        session.transition(SessionStatus::Completed)?;
        self.save(&session)?;
        let purged = self.stores.artifacts.purge_session_artifacts(&session.id)?;
        tracing::info!(session = %session.id, purged, "session completed");
        self.ui.completed(&session, purged);
        Ok(RunOutcome::Completed)
    }

    /// Every repo must exist on disk; the first one is where the agent runs.
    fn check_repos(&self, session: &Session) -> Result<PathBuf, OrchestratorError> {
        let mut primary = None;
        for repo in &session.repos {
            let path = self.config.resolve_repo(repo);
            if !path.is_dir() {
                return Err(OrchestratorError::RepoNotFound {
                    repo: repo.clone(),
                    path,
                });
            }
            primary.get_or_insert(path);
        }
        primary.ok_or_else(|| SessionError::NoRepos.into())
    }

    fn save(&self, session: &Session) -> Result<(), OrchestratorError> {
        self.stores.sessions.save(session)?;
        Ok(())
    }

    fn approve(&self, session: &mut Session) -> Result<(), OrchestratorError> {
        if session.status == SessionStatus::Reviewing {
            session.transition(SessionStatus::Approved)?;
            self.save(session)?;
        }
        Ok(())
    }

    /// Move into the status `phase` runs under.
    fn enter(&self, session: &mut Session, phase: Phase) -> Result<(), OrchestratorError> {
        let target = status_for_phase(phase);
        if session.status == target {
            return Ok(());
        }
        if phase == Phase::Execute {
            self.approve(session)?;
        }
        // quickfix has no simplify phase but the table only reaches
        // recording through simplifying
        if phase == Phase::Record
            && session.mode == SessionMode::Quickfix
            && session.status == SessionStatus::Verifying
        {
            session.transition(SessionStatus::Simplifying)?;
        }
        session.transition(target)?;
        self.save(session)
    }

    fn pause(
        &self,
        session: &mut Session,
        reason: PauseReason,
        resume_from: Option<Phase>,
    ) -> Result<RunOutcome, OrchestratorError> {
        session.pause()?;
        self.save(session)?;
        self.interrupt.clear();
        tracing::info!(session = %session.id, %reason, "session paused");
        self.ui.paused(&session.id, &reason.to_string(), resume_from);
        Ok(RunOutcome::Paused {
            reason,
            resume_from,
        })
    }

    /// One phase: enter its status, run the agent, ingest what it wrote.
    async fn run_phase(
        &self,
        session: &mut Session,
        phase: Phase,
        repo_root: &Path,
        attempt: Option<u32>,
    ) -> Step {
        if self.interrupt.is_raised() {
            // nothing has moved yet; name the phase unless the status already points at it
            let pending = current_phase(status_for_phase(phase));
            let resume_from = pending.filter(|p| current_phase(session.status) != Some(*p));
            return self.pause(session, PauseReason::Interrupted, resume_from).map(Some);
        }
        self.enter(session, phase)?;

        let profile = phases::profile(phase);
        let work_dir = self.stores.sessions.work_dir(&session.id, phase.name());
        fs::create_dir_all(&work_dir).map_err(|source| ArtifactError::Io {
            action: "create directory",
            path: work_dir.clone(),
            source,
        })?;

        let request = AgentRequest {
            phase,
            system_prompt: prompts::system_prompt(&self.config, session, phase, &work_dir),
            message: prompts::initial_message(
                &self.config,
                &self.stores.artifacts,
                session,
                phase,
                attempt,
            ),
            working_dir: repo_root.to_path_buf(),
            output_dir: work_dir.clone(),
            allowed_tools: profile.allowed_tools(),
            mode: profile.execution_mode,
        };

        self.ui.phase_start(phase, attempt);
        tracing::info!(session = %session.id, %phase, ?attempt, "phase started");

        let indicator = (profile.execution_mode == ExecutionMode::NonInteractive)
            .then(|| ActivityIndicator::start(format!("{} in progress", phase)));
        let outcome = self.agent.run(&request).await;
        if let Some(indicator) = indicator {
            indicator.finish().await;
        }

        match outcome? {
            AgentOutcome::Success => {}
            AgentOutcome::Interrupted => {
                return self.pause(session, PauseReason::Interrupted, None).map(Some);
            }
            AgentOutcome::Failed(message) => {
                return Err(OrchestratorError::AgentFailed {
                    phase: phase.to_string(),
                    message,
                });
            }
        }

        let report = if profile.produces_artifact {
            let version = if profile.versioned { attempt } else { None };
            let report = ingest_phase_output(
                &self.stores,
                session,
                phase,
                &work_dir,
                Some(repo_root),
                version,
            )?;
            if report.is_none() {
                self.ui.warn(&format!("{} produced no artifact", phase));
            }
            report
        } else {
            self.stores.artifacts.cleanup_work_dir(&work_dir)?;
            None
        };
        self.ui.phase_done(phase, report.as_ref());
        Ok(None)
    }

    /// Execute, verify, ask the operator; repeat until accepted or paused.
    async fn execute_loop(&self, session: &mut Session, repo_root: &Path) -> Step {
        let last = session.last_attempt().map(|a| a.outcome);
        if session.status == SessionStatus::Verifying && last == Some(AttemptOutcome::Completed) {
            // accepted before the previous run stopped
            return Ok(None);
        }

        let mut skip_execute = session.status == SessionStatus::Verifying
            && last == Some(AttemptOutcome::InProgress);
        if !skip_execute && last == Some(AttemptOutcome::InProgress) {
            session.update_last_execution_outcome(
                AttemptOutcome::Interrupted,
                Some("run stopped before verification".to_string()),
            )?;
            self.save(session)?;
        }

        loop {
            if self.interrupt.is_raised() {
                return self.pause(session, PauseReason::Interrupted, None).map(Some);
            }

            let attempt = match session.last_attempt() {
                Some(a) if skip_execute => {
                    skip_execute = false;
                    a.attempt
                }
                _ => {
                    self.enter(session, Phase::Execute)?;
                    let n = session.add_execution_attempt();
                    self.save(session)?;
                    if let Some(stop) = self.run_phase(session, Phase::Execute, repo_root, Some(n)).await? {
                        return Ok(Some(stop));
                    }
                    n
                }
            };

            if let Some(stop) = self.run_phase(session, Phase::Verify, repo_root, Some(attempt)).await? {
                return Ok(Some(stop));
            }

            let Some(decision) = self.operator.verification_decision(session, attempt)? else {
                return self.pause(session, PauseReason::Interrupted, None).map(Some);
            };
            tracing::info!(session = %session.id, attempt, %decision, "verification decision");
            match decision {
                VerifyDecision::Accept => {
                    let verified = self
                        .stores
                        .capsules
                        .verify_session_capsules(&session.id, Phase::Execute.name())?;
                    tracing::debug!(session = %session.id, verified, "verified execute capsules");
                    session.update_last_execution_outcome(AttemptOutcome::Completed, None)?;
                    self.save(session)?;
                    return Ok(None);
                }
                VerifyDecision::Reexecute => {
                    self.stores.capsules.challenge_session_capsules(
                        &session.id,
                        Phase::Execute.name(),
                        FAILED_VERIFICATION,
                    )?;
                    session.update_last_execution_outcome(
                        AttemptOutcome::FailedVerification,
                        Some(FAILED_VERIFICATION.to_string()),
                    )?;
                    self.save(session)?;
                    self.ui.reexecuting(attempt);
                }
                VerifyDecision::Pause => {
                    return self.pause(session, PauseReason::OperatorPaused, None).map(Some);
                }
            }
        }
    }
}
