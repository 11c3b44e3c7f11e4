//! Phase orchestration.
//!
//! The [`Orchestrator`] drives one session through its mode's phase sequence,
//! delegating the work of each phase to an [`AgentRunner`] and the decisions
//! to an [`OperatorPrompt`](crate::gates::OperatorPrompt).

pub mod agent;
pub mod interrupt;
pub mod phases;
pub mod pipeline;
pub mod prompts;

use std::fmt;

use crate::phase::Phase;

pub use agent::{AgentOutcome, AgentRequest, AgentRunner, ClaudeAgent};
pub use interrupt::InterruptFlag;
pub use phases::{ExecutionMode, PhaseProfile};
pub use pipeline::Orchestrator;

/// Why a run stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Ctrl-C, or the agent reported it was interrupted
    Interrupted,
    /// The operator declined to continue after `phase`
    Declined { phase: Phase },
    /// The operator chose pause at the verification decision
    OperatorPaused,
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseReason::Interrupted => write!(f, "interrupted"),
            PauseReason::Declined { phase } => write!(f, "stopped after {}", phase),
            PauseReason::OperatorPaused => write!(f, "paused at verification"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Paused {
        reason: PauseReason,
        /// Phase to pass to `resume --from`, when resuming should not simply
        /// continue from the recorded status
        resume_from: Option<Phase>,
    },
}

impl RunOutcome {
    pub fn is_paused(&self) -> bool {
        matches!(self, RunOutcome::Paused { .. })
    }
}
