//! Operator decision points.
//!
//! The orchestrator asks two kinds of questions: whether to continue after a
//! gated phase, and what to do once a verification pass finishes.

use anyhow::Result;
use dialoguer::{Confirm, Select, theme::ColorfulTheme};
use std::fmt;
use std::io;

use crate::phase::Phase;
use crate::session::Session;

/// Operator's call after a verification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyDecision {
    /// Changes are good; mark the execute decisions verified
    Accept,
    /// Run execute again
    Reexecute,
    /// Stop here and persist the session as paused
    Pause,
}

impl fmt::Display for VerifyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyDecision::Accept => write!(f, "accept"),
            VerifyDecision::Reexecute => write!(f, "reexecute"),
            VerifyDecision::Pause => write!(f, "pause"),
        }
    }
}

/// Answers are `None` when the operator pressed Ctrl-C at the prompt.
pub trait OperatorPrompt: Send + Sync {
    /// Continue past `completed`? `Some(false)` pauses the session.
    fn confirm_continue(
        &self,
        session: &Session,
        completed: Phase,
        next: Option<Phase>,
    ) -> Result<Option<bool>>;

    fn verification_decision(&self, session: &Session, attempt: u32) -> Result<Option<VerifyDecision>>;
}

/// Terminal prompts via `dialoguer`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialoguerPrompt;

impl DialoguerPrompt {
    pub fn new() -> Self {
        Self
    }
}

impl OperatorPrompt for DialoguerPrompt {
    fn confirm_continue(
        &self,
        _session: &Session,
        completed: Phase,
        next: Option<Phase>,
    ) -> Result<Option<bool>> {
        let question = match next {
            Some(next) => format!("{} finished. Continue to {}?", completed, next),
            None => format!("{} finished. Continue?", completed),
        };
        let answer = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .default(true)
            .interact();
        unless_interrupted(answer)
    }

    fn verification_decision(&self, _session: &Session, attempt: u32) -> Result<Option<VerifyDecision>> {
        let options = &[
            "Accept the changes",
            "Re-execute (verification failed)",
            "Pause the session",
        ];
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Verification of attempt {} finished. What next?", attempt))
            .items(options)
            .default(0)
            .interact();

        Ok(unless_interrupted(selection)?.map(|selection| match selection {
            0 => VerifyDecision::Accept,
            1 => VerifyDecision::Reexecute,
            _ => VerifyDecision::Pause,
        }))
    }
}

/// Ctrl-C in raw mode surfaces as an `Interrupted` I/O error; that is an answer, not a failure.
fn unless_interrupted<T>(result: dialoguer::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(dialoguer::Error::IO(e)) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctrl_c_at_prompt_is_an_answer() {
        let interrupted: dialoguer::Result<bool> =
            Err(io::Error::new(io::ErrorKind::Interrupted, "read interrupted").into());
        assert_eq!(unless_interrupted(interrupted).unwrap(), None);
        assert_eq!(unless_interrupted(Ok(3)).unwrap(), Some(3));
    }

    #[test]
    fn test_other_prompt_errors_propagate() {
        let broken: dialoguer::Result<bool> = Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone").into());
        assert!(unless_interrupted(broken).is_err());
    }

    #[test]
    fn test_verify_decision_display() {
        assert_eq!(VerifyDecision::Reexecute.to_string(), "reexecute");
    }
}
