//! Per-phase run profiles and the phase sequence of each session mode.

use crate::phase::Phase;
use crate::session::SessionMode;

const STANDARD: &[Phase] = &[
    Phase::Investigate,
    Phase::Plan,
    Phase::Review,
    Phase::Execute,
    Phase::Simplify,
    Phase::Record,
];
const QUICKFIX: &[Phase] = &[Phase::Execute, Phase::Record];
const RESEARCH: &[Phase] = &[Phase::Investigate, Phase::Conclude, Phase::Record];

/// Tools for phases that only read the codebase and write their artifact.
const READ_AND_WRITE_ARTIFACT: &[&str] = &["Read", "Glob", "Grep", "WebSearch", "WebFetch", "Write"];
/// Tools for phases that also run commands (tests, git).
const READ_AND_RUN: &[&str] = &["Read", "Glob", "Grep", "Bash", "Write"];

/// How the agent is attached to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Operator converses with the agent directly
    Interactive,
    /// Agent runs to completion on its own
    NonInteractive,
}

#[derive(Debug, Clone, Copy)]
pub struct PhaseProfile {
    pub phase: Phase,
    pub execution_mode: ExecutionMode,
    /// `None` leaves the agent unrestricted
    pub allowed_tools: Option<&'static [&'static str]>,
    pub produces_artifact: bool,
    /// Keep numbered copies of the artifact across attempts
    pub versioned: bool,
    /// Ask the operator before moving on
    pub approval_gate: bool,
}

impl PhaseProfile {
    pub fn allowed_tools(&self) -> Option<Vec<String>> {
        self.allowed_tools
            .map(|tools| tools.iter().map(|t| t.to_string()).collect())
    }
}

pub fn profile(phase: Phase) -> PhaseProfile {
    use ExecutionMode::*;
    let (execution_mode, allowed_tools, produces_artifact, versioned, approval_gate) = match phase {
        Phase::Investigate => (Interactive, Some(READ_AND_WRITE_ARTIFACT), true, false, true),
        Phase::Plan => (Interactive, Some(READ_AND_WRITE_ARTIFACT), true, false, true),
        Phase::Review => (NonInteractive, Some(READ_AND_WRITE_ARTIFACT), true, false, true),
        Phase::Execute => (NonInteractive, None, true, true, false),
        Phase::Verify => (NonInteractive, Some(READ_AND_RUN), true, true, false),
        Phase::Simplify => (NonInteractive, None, false, false, false),
        Phase::Conclude => (Interactive, Some(READ_AND_WRITE_ARTIFACT), true, false, true),
        Phase::Record => (NonInteractive, Some(READ_AND_RUN), true, false, false),
    };
    PhaseProfile {
        phase,
        execution_mode,
        allowed_tools,
        produces_artifact,
        versioned,
        approval_gate,
    }
}

/// Phases a session of `mode` walks through. Verify runs inside the execute loop.
pub fn sequence(mode: SessionMode) -> &'static [Phase] {
    match mode {
        SessionMode::Standard => STANDARD,
        SessionMode::Quickfix => QUICKFIX,
        SessionMode::Research => RESEARCH,
    }
}

/// Index of `phase` in the sequence; verify resolves to its execute loop.
pub fn position(mode: SessionMode, phase: Phase) -> Option<usize> {
    let phase = if phase == Phase::Verify {
        Phase::Execute
    } else {
        phase
    };
    sequence(mode).iter().position(|p| *p == phase)
}

pub fn next_in_sequence(mode: SessionMode, phase: Phase) -> Option<Phase> {
    let idx = position(mode, phase)?;
    sequence(mode).get(idx + 1).copied()
}
