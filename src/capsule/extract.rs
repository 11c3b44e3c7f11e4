//! Pull decision blocks out of a phase artifact body.
//!
//! A block starts at a `Decision:` heading (levels 2-4) and runs until the
//! next heading. Within it, bold-labelled lines set fields:
//!
//! ```text
//! ### Decision: Which retry policy?
//! - **Choice**: Exponential backoff
//! - **Rationale**: Spreads load across retries
//! - **Alternatives**: Fixed delay; No retry
//! - **Tags**: net, http
//! ```

use regex::Regex;
use std::sync::LazyLock;

use super::format::{FIELD_LINE, field_key, split_alternatives, split_list};
use super::{Capsule, CapsuleType};
use crate::artifact::Artifact;

static DECISION_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{2,4}\s*Decision:\s*(.+?)\s*$").expect("valid regex"));

/// Extract capsules from an artifact body.
///
/// Ids derive from `(session_id, phase, question)`, so a question repeated in
/// the same artifact collapses to one capsule; the later block wins.
pub fn extract_from_artifact(
    artifact: &Artifact,
    session_id: &str,
    phase: &str,
    repos: &[String],
) -> Vec<Capsule> {
    let mut blocks: Vec<(String, Vec<(String, String)>)> = Vec::new();
    let mut in_block = false;

    for line in artifact.body.lines() {
        if let Some(caps) = DECISION_BLOCK.captures(line) {
            blocks.push((caps[1].to_string(), Vec::new()));
            in_block = true;
        } else if line.trim_start().starts_with('#') {
            in_block = false;
        } else if in_block
            && let Some(caps) = FIELD_LINE.captures(line)
            && let Some((_, fields)) = blocks.last_mut()
        {
            fields.push((field_key(&caps[1]), caps[2].to_string()));
        }
    }

    let repos = if artifact.header.repos.is_empty() {
        repos.to_vec()
    } else {
        artifact.header.repos.clone()
    };

    let mut capsules: Vec<Capsule> = Vec::new();
    for (question, fields) in blocks {
        let capsule = build(session_id, phase, &question, &fields, &repos);
        if let Some(pos) = capsules.iter().position(|c| c.id == capsule.id) {
            tracing::warn!(
                session = session_id,
                phase,
                question = %capsule.question,
                "duplicate decision in artifact, keeping the later block"
            );
            capsules.remove(pos);
        }
        capsules.push(capsule);
    }

    tracing::debug!(session = session_id, phase, count = capsules.len(), "extracted capsules");
    capsules
}

fn build(
    session_id: &str,
    phase: &str,
    question: &str,
    fields: &[(String, String)],
    repos: &[String],
) -> Capsule {
    let mut c = Capsule::new(session_id, phase, question).with_repos(repos.to_vec());
    let mut explicit_type = None;

    for (key, value) in fields {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "choice" => c.choice = value.to_string(),
            "rationale" => c.rationale = value.to_string(),
            "source" | "origin" => {
                if let Ok(origin) = value.parse() {
                    c.origin = origin;
                }
            }
            "alternatives" => c.alternatives = split_alternatives(value),
            "tags" => {
                for tag in split_list(value) {
                    c.add_tag(&tag);
                }
            }
            "status" => {
                if let Ok(status) = value.parse() {
                    c.status = status;
                }
            }
            "type" => explicit_type = value.parse::<CapsuleType>().ok(),
            "significance" => {
                if let Ok(significance) = value.parse() {
                    c.significance = significance;
                }
            }
            "confirmation" => {
                if let Ok(confirmation) = value.parse() {
                    c.confirmation = confirmation;
                }
            }
            "enables" => c.enables = split_list(value),
            "enabledby" => c.enabled_by = Some(value.to_string()),
            "constrains" => c.constrains = split_list(value),
            "patternid" => c.pattern_id = Some(value.to_string()),
            "commits" => c.commits = split_list(value),
            _ => {}
        }
    }

    c.capsule_type = explicit_type.unwrap_or(if c.alternatives.is_empty() {
        CapsuleType::Finding
    } else {
        CapsuleType::Decision
    });
    c
}
