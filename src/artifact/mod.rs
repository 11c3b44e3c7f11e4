//! Phase artifacts: a YAML header block plus a free-text markdown body.
//!
//! ```text
//! ---
//! session: 2026-03-01-fix-login-bug-a1b2c3
//! repos:
//! - api
//! phase: investigate
//! timestamp: 2026-03-01T10:00:00Z
//! status: draft
//! ---
//!
//! ## Executive Summary
//! ...
//! ```
//!
//! A document that does not start with `---` is all body. A document that does
//! start with `---` must close its header, otherwise parsing fails.

pub mod store;
pub mod validate;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::errors::ArtifactError;

pub use store::{ArtifactStore, LocateSource, LocatedArtifact};
pub use validate::{required_markers, validate};

pub const HEADER_DELIMITER: &str = "---";

const PHASE_FILENAMES: &[(&str, &str)] = &[
    ("investigate", "investigation_summary.md"),
    ("plan", "implementation_guide.md"),
    ("review", "implementation_guide.md"),
    ("execute", "execution_log.md"),
    ("verify", "verification_notes.md"),
    ("conclude", "research_conclusions.md"),
    ("record", "milestone_ledger.md"),
];

/// Filename a phase's artifact is expected under. Unknown phases map to `<phase>.md`.
pub fn phase_filename(phase: &str) -> String {
    PHASE_FILENAMES
        .iter()
        .find(|(p, _)| *p == phase)
        .map(|(_, f)| f.to_string())
        .unwrap_or_else(|| format!("{}.md", phase))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    #[default]
    Draft,
    Final,
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactStatus::Draft => write!(f, "draft"),
            ArtifactStatus::Final => write!(f, "final"),
        }
    }
}

/// Structured header block. Every field is optional on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repos: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ArtifactStatus>,
    /// Document kind tag, used by the capsule document
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ArtifactHeader {
    pub fn is_empty(&self) -> bool {
        self == &ArtifactHeader::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifact {
    pub header: ArtifactHeader,
    pub body: String,
    /// Where this artifact was last loaded from or stored to
    pub path: Option<PathBuf>,
}

impl Artifact {
    pub fn new(header: ArtifactHeader, body: impl Into<String>) -> Self {
        Self {
            header,
            body: body.into(),
            path: None,
        }
    }

    /// Parse raw text into header and body.
    pub fn parse(raw: &str) -> Result<Self, ArtifactError> {
        let trimmed = raw.trim();
        let Some(after_open) = trimmed.strip_prefix(HEADER_DELIMITER) else {
            return Ok(Self::new(ArtifactHeader::default(), raw));
        };

        // Skip the remainder of the opening delimiter line.
        let after_open = match after_open.find('\n') {
            Some(i) => &after_open[i + 1..],
            None => return Err(ArtifactError::UnterminatedHeader),
        };

        let mut offset = 0;
        let mut close = None;
        for line in after_open.split_inclusive('\n') {
            if line.starts_with(HEADER_DELIMITER) {
                close = Some((offset, offset + line.len()));
                break;
            }
            offset += line.len();
        }
        let (header_end, body_start) = close.ok_or(ArtifactError::UnterminatedHeader)?;

        let yaml = &after_open[..header_end];
        let header = if yaml.trim().is_empty() {
            ArtifactHeader::default()
        } else {
            serde_yaml::from_str(yaml).map_err(ArtifactError::InvalidHeader)?
        };
        let body = after_open[body_start..].trim_start_matches(['\n', '\r']);

        Ok(Self::new(header, body))
    }

    /// Serialize back to the on-disk form: header, delimiter, blank line, body.
    pub fn to_markdown(&self) -> Result<String, ArtifactError> {
        let yaml = serde_yaml::to_string(&self.header).map_err(ArtifactError::InvalidHeader)?;
        Ok(format!(
            "{delim}\n{yaml}{delim}\n\n{body}",
            delim = HEADER_DELIMITER,
            yaml = yaml,
            body = self.body
        ))
    }

    /// True when the raw text carried a header block.
    pub fn has_header(&self) -> bool {
        !self.header.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_without_header_keeps_raw_body() {
        for raw in ["Nothing relevant here.", "", "  leading space\n\n", "# Title\n--- not a header"] {
            let artifact = Artifact::parse(raw).unwrap();
            assert_eq!(artifact.body, raw);
            assert!(artifact.header.is_empty());
        }
    }

    #[test]
    fn test_parse_with_header() {
        let raw = "---\nsession: s1\nrepos:\n  - api\nphase: investigate\nstatus: final\n---\n\n\n## Executive Summary\nFindings here.";
        let artifact = Artifact::parse(raw).unwrap();
        assert_eq!(artifact.header.session, "s1");
        assert_eq!(artifact.header.repos, vec!["api".to_string()]);
        assert_eq!(artifact.header.phase, "investigate");
        assert_eq!(artifact.header.status, Some(ArtifactStatus::Final));
        assert_eq!(artifact.body, "## Executive Summary\nFindings here.");
    }

    #[test]
    fn test_parse_unterminated_header_fails() {
        for raw in [
            "---",
            "---\nsession: s1\n",
            "---\nsession: s1\nphase: plan\n\nbody without close",
            "\n\n---\nsession: s1",
        ] {
            assert!(
                matches!(Artifact::parse(raw), Err(ArtifactError::UnterminatedHeader)),
                "expected unterminated header for {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_parse_invalid_yaml_fails() {
        let raw = "---\nrepos: [unclosed\n---\nbody";
        assert!(matches!(
            Artifact::parse(raw),
            Err(ArtifactError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_parse_empty_header_block() {
        let artifact = Artifact::parse("---\n---\nbody").unwrap();
        assert!(artifact.header.is_empty());
        assert_eq!(artifact.body, "body");
    }

    #[test]
    fn test_parse_ignores_unknown_header_keys() {
        let artifact = Artifact::parse("---\nsession: s1\nauthor: someone\n---\nbody").unwrap();
        assert_eq!(artifact.header.session, "s1");
    }

    #[test]
    fn test_to_markdown_then_parse_preserves_content() {
        let header = ArtifactHeader {
            session: "s1".into(),
            repos: vec!["api".into(), "web".into()],
            phase: "execute".into(),
            timestamp: "2026-03-01T10:00:00Z".into(),
            status: Some(ArtifactStatus::Draft),
            kind: None,
        };
        let artifact = Artifact::new(header.clone(), "## Execution Log\n- step one\n\n---\n\ntrailing rule");
        let text = artifact.to_markdown().unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.contains("---\n\n## Execution Log"));

        let back = Artifact::parse(&text).unwrap();
        assert_eq!(back.header, header);
        assert_eq!(back.body, artifact.body);
    }

    #[test]
    fn test_phase_filename_table() {
        assert_eq!(phase_filename("investigate"), "investigation_summary.md");
        assert_eq!(phase_filename("plan"), "implementation_guide.md");
        assert_eq!(phase_filename("review"), "implementation_guide.md");
        assert_eq!(phase_filename("execute"), "execution_log.md");
        assert_eq!(phase_filename("verify"), "verification_notes.md");
        assert_eq!(phase_filename("conclude"), "research_conclusions.md");
        assert_eq!(phase_filename("record"), "milestone_ledger.md");
        assert_eq!(phase_filename("simplify"), "simplify.md");
        assert_eq!(phase_filename("deploy"), phase_filename("deploy"));
    }
}
