//! Required-section checks per phase.
//!
//! A body passes when its lower-cased text contains at least one marker for
//! the phase. Failing validation is reported to the caller, which treats it as
//! a warning.

use super::Artifact;
use crate::errors::ArtifactError;

const REQUIRED_MARKERS: &[(&str, &[&str])] = &[
    ("investigate", &["executive summary", "investigation summary"]),
    ("plan", &["implementation guide", "implementation plan", "## plan"]),
    ("review", &["review summary", "review notes", "implementation guide"]),
    ("execute", &["execution log", "execution summary"]),
    ("verify", &["verification", "validation"]),
    ("simplify", &[]),
    ("conclude", &["conclusion", "recommendation"]),
    ("record", &["summary", "file manifest"]),
];

/// Markers for a phase, or `None` when the phase is unknown.
pub fn required_markers(phase: &str) -> Option<&'static [&'static str]> {
    REQUIRED_MARKERS
        .iter()
        .find(|(p, _)| *p == phase)
        .map(|(_, markers)| *markers)
}

pub fn validate(artifact: &Artifact, phase: &str) -> Result<(), ArtifactError> {
    let markers =
        required_markers(phase).ok_or_else(|| ArtifactError::UnknownPhase(phase.to_string()))?;

    // simplify edits code in place and owes no artifact
    if markers.is_empty() {
        return Ok(());
    }

    let body = artifact.body.to_lowercase();
    if markers.iter().any(|m| body.contains(m)) {
        Ok(())
    } else {
        Err(ArtifactError::MissingSections {
            phase: phase.to_string(),
            expected: markers.iter().map(|m| m.to_string()).collect(),
        })
    }
}
