//! Encode/decode for the consolidated capsule document.
//!
//! ```text
//! ---
//! session: 2026-03-01-fix-login-bug-a1b2c3
//! type: capsules
//! ---
//!
//! # Decision Capsules
//!
//! ## Execute
//!
//! ### Decision: Which retry policy?
//! **ID**: 3f9a0c1d2b4e5f60
//! **Choice**: Exponential backoff
//! **Alternatives**: Fixed delay; No retry
//! **Status**: hypothesis
//! ...
//! ```
//!
//! Only fields with a value are written. Decoding accepts any subset of
//! fields and falls back to the older `Source` and `Timestamp` labels when
//! `Origin` and `CreatedAt` are absent.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::LazyLock;

use super::{Capsule, CapsuleType, Challenge, compute_id};
use crate::artifact::{Artifact, ArtifactHeader};
use crate::errors::ArtifactError;
use crate::phase::ordered_phase_names;

pub const DOCUMENT_KIND: &str = "capsules";
pub const DOCUMENT_TITLE: &str = "# Decision Capsules";

static SECTION_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s+(.+?)\s*$").expect("valid regex"));

static DECISION_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^###\s+Decision:\s*(.+?)\s*$").expect("valid regex"));

/// `**Label**: value`, `**Label:** value`, optionally as a list item.
pub(crate) static FIELD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*]\s+)?\*\*([A-Za-z][A-Za-z ]*?)(?::\*\*|\*\*:)\s*(.*?)\s*$")
        .expect("valid regex")
});

/// Canonical lookup key for a field label: lowercase, no spaces.
pub(crate) fn field_key(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// `execute` -> `Execute`, `quickfix-seed` -> `Quickfix Seed`.
pub fn section_title(phase: &str) -> String {
    phase
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Inverse of [`section_title`].
pub fn section_phase(title: &str) -> String {
    title.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
}

/// Render a session's capsules as the consolidated document.
pub fn encode(session_id: &str, capsules: &[Capsule]) -> Result<String, ArtifactError> {
    let mut phases: Vec<String> = ordered_phase_names().map(str::to_string).collect();
    let mut extra: Vec<String> = capsules
        .iter()
        .map(|c| c.phase.clone())
        .filter(|p| !phases.contains(p))
        .collect();
    extra.sort();
    extra.dedup();
    phases.extend(extra);

    let mut body = String::new();
    body.push_str(DOCUMENT_TITLE);
    body.push('\n');

    for phase in &phases {
        let in_phase: Vec<&Capsule> = capsules.iter().filter(|c| &c.phase == phase).collect();
        if in_phase.is_empty() {
            continue;
        }
        let _ = write!(body, "\n## {}\n", section_title(phase));
        for capsule in in_phase {
            body.push('\n');
            encode_capsule(&mut body, capsule);
        }
    }

    let header = ArtifactHeader {
        session: session_id.to_string(),
        kind: Some(DOCUMENT_KIND.to_string()),
        ..Default::default()
    };
    Artifact::new(header, body).to_markdown()
}

fn encode_capsule(out: &mut String, c: &Capsule) {
    let _ = writeln!(out, "### Decision: {}", single_line(&c.question));

    let mut field = |label: &str, value: &str| {
        let value = single_line(value);
        if !value.is_empty() {
            let _ = writeln!(out, "**{}**: {}", label, value);
        }
    };

    field("ID", &c.id);
    field("Choice", &c.choice);
    field("Alternatives", &c.alternatives.join("; "));
    field("Rationale", &c.rationale);
    field("Origin", c.origin.as_str());
    field("Status", c.status.as_str());
    field("Type", c.capsule_type.as_str());
    field("Significance", c.significance.as_str());
    field("Confirmation", c.confirmation.as_str());
    field("PatternID", c.pattern_id.as_deref().unwrap_or_default());
    field("Tags", &c.tags.join(", "));
    field("Timestamp", &timestamp(c.updated_at));
    field("CreatedAt", &timestamp(c.created_at));
    field("InvalidatedAt", &timestamp(c.invalidated_at));
    field("Repos", &c.repos.join(", "));
    field("Commits", &c.commits.join(", "));
    field("EnabledBy", c.enabled_by.as_deref().unwrap_or_default());
    field("Enables", &c.enables.join(", "));
    field("Constrains", &c.constrains.join(", "));
    field("SupersededBy", c.superseded_by.as_deref().unwrap_or_default());
    field("Supersedes", &c.supersedes.join(", "));
    field(
        "InvalidationReason",
        c.invalidation_reason.as_deref().unwrap_or_default(),
    );
    field("Learned", c.learned.as_deref().unwrap_or_default());
    if !c.challenges.is_empty()
        && let Ok(json) = serde_json::to_string(&c.challenges)
    {
        field("Challenges", &json);
    }
}

fn single_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map(|t| t.to_rfc3339()).unwrap_or_default()
}

/// Parse a consolidated document back into its session id and capsules.
pub fn decode(raw: &str) -> Result<(String, Vec<Capsule>), ArtifactError> {
    let doc = Artifact::parse(raw)?;
    let session_id = doc.header.session.clone();

    let mut capsules = Vec::new();
    let mut section = String::new();
    let mut current: Option<(String, String, HashMap<String, String>)> = None;

    for line in doc.body.lines() {
        if let Some(caps) = DECISION_HEADING.captures(line) {
            if let Some((phase, question, fields)) = current.take() {
                capsules.push(from_fields(&session_id, phase, question, &fields));
            }
            current = Some((section.clone(), caps[1].to_string(), HashMap::new()));
        } else if let Some(caps) = SECTION_HEADING.captures(line) {
            if let Some((phase, question, fields)) = current.take() {
                capsules.push(from_fields(&session_id, phase, question, &fields));
            }
            section = section_phase(&caps[1]);
        } else if let Some(caps) = FIELD_LINE.captures(line)
            && let Some((_, _, fields)) = current.as_mut()
        {
            fields.insert(field_key(&caps[1]), caps[2].to_string());
        }
    }
    if let Some((phase, question, fields)) = current.take() {
        capsules.push(from_fields(&session_id, phase, question, &fields));
    }

    Ok((session_id, capsules))
}

fn parse_enum<T: FromStr>(fields: &HashMap<String, String>, key: &str) -> Option<T> {
    fields
        .get(key)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
}

fn from_fields(
    session_id: &str,
    phase: String,
    question: String,
    fields: &HashMap<String, String>,
) -> Capsule {
    let get = |key: &str| fields.get(key).map(String::as_str).filter(|v| !v.is_empty());

    let mut c = Capsule::new(session_id, phase, question);
    if let Some(id) = get("id") {
        c.id = id.to_string();
    } else {
        c.id = compute_id(session_id, &c.phase, &c.question);
    }
    c.choice = get("choice").unwrap_or_default().to_string();
    c.rationale = get("rationale").unwrap_or_default().to_string();
    c.alternatives = get("alternatives").map(split_alternatives).unwrap_or_default();
    c.origin = get("origin")
        .or_else(|| get("source"))
        .and_then(|v| v.parse().ok())
        .unwrap_or_default();
    c.status = parse_enum(fields, "status").unwrap_or_default();
    c.capsule_type = parse_enum(fields, "type").unwrap_or(if c.alternatives.is_empty() {
        CapsuleType::Finding
    } else {
        CapsuleType::Decision
    });
    c.significance = parse_enum(fields, "significance").unwrap_or_default();
    c.confirmation = parse_enum(fields, "confirmation").unwrap_or_default();
    c.pattern_id = get("patternid").map(str::to_string);
    c.tags = get("tags").map(split_list).unwrap_or_default();
    c.repos = get("repos").map(split_list).unwrap_or_default();
    c.commits = get("commits").map(split_list).unwrap_or_default();
    c.enabled_by = get("enabledby").map(str::to_string);
    c.enables = get("enables").map(split_list).unwrap_or_default();
    c.constrains = get("constrains").map(split_list).unwrap_or_default();
    c.superseded_by = get("supersededby").map(str::to_string);
    c.supersedes = get("supersedes").map(split_list).unwrap_or_default();
    c.invalidation_reason = get("invalidationreason").map(str::to_string);
    c.learned = get("learned").map(str::to_string);

    let created = get("createdat").or_else(|| get("timestamp"));
    let updated = get("timestamp").or_else(|| get("createdat"));
    c.created_at = created.and_then(parse_time);
    c.updated_at = updated.and_then(parse_time);
    c.invalidated_at = get("invalidatedat").and_then(parse_time);

    if let Some(json) = get("challenges") {
        match serde_json::from_str::<Vec<Challenge>>(json) {
            Ok(challenges) => c.challenges = challenges,
            Err(e) => tracing::warn!(capsule = %c.id, error = %e, "ignoring unreadable challenge history"),
        }
    }
    c
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Comma-separated list, trimmed, empties dropped.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Alternatives separate on `;` when present, otherwise on `,`.
pub(crate) fn split_alternatives(value: &str) -> Vec<String> {
    let sep = if value.contains(';') { ';' } else { ',' };
    value
        .split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capsule::{CapsuleStatus, Confirmation, Origin, Significance};

    fn sample() -> Vec<Capsule> {
        let mut a = Capsule::new("s1", "execute", "Which retry policy?")
            .with_choice("Exponential backoff")
            .with_rationale("Spreads load\nacross retries")
            .with_alternatives(vec!["Fixed delay".into(), "No retry".into()])
            .with_significance(Significance::Architectural)
            .with_tags(vec!["net".into(), "http".into()]);
        a.add_challenge("failed verification", None);
        a.supersedes.push("0000aaaa1111bbbb".into());
        let b = Capsule::new("s1", "investigate", "Where is the bug?")
            .with_type(CapsuleType::Finding)
            .with_choice("In the session cookie parser");
        let c = Capsule::new("s1", "quickfix-seed", "Scope?").with_origin(Origin::Human);
        vec![a, b, c]
    }

    #[test]
    fn test_encode_groups_by_phase_in_fixed_order() {
        let text = encode("s1", &sample()).unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.contains("type: capsules"));
        assert!(text.contains(DOCUMENT_TITLE));
        let seed = text.find("## Quickfix Seed").unwrap();
        let inv = text.find("## Investigate").unwrap();
        let exec = text.find("## Execute").unwrap();
        assert!(seed < inv && inv < exec);
        assert!(!text.contains("## Plan"));
        assert!(text.contains("**Alternatives**: Fixed delay; No retry"));
        assert!(text.contains("**Rationale**: Spreads load across retries"));
        assert!(!text.contains("**PatternID**"));
    }

    #[test]
    fn test_decode_restores_encoded_capsules() {
        let capsules = sample();
        let text = encode("s1", &capsules).unwrap();
        let (session, decoded) = decode(&text).unwrap();
        assert_eq!(session, "s1");
        assert_eq!(decoded.len(), 3);

        let exec = decoded.iter().find(|c| c.phase == "execute").unwrap();
        let original = &capsules[0];
        assert_eq!(exec.id, original.id);
        assert_eq!(exec.alternatives, original.alternatives);
        assert_eq!(exec.tags, original.tags);
        assert_eq!(exec.significance, Significance::Architectural);
        assert_eq!(exec.challenges.len(), 1);
        assert_eq!(exec.supersedes, original.supersedes);
        assert_eq!(
            exec.created_at.map(|t| t.timestamp()),
            original.created_at.map(|t| t.timestamp())
        );

        let seed = decoded.iter().find(|c| c.phase == "quickfix-seed").unwrap();
        assert_eq!(seed.origin, Origin::Human);
    }

    #[test]
    fn test_decode_tolerates_partial_and_legacy_fields() {
        let raw = "---\nsession: s9\ntype: capsules\n---\n\n# Decision Capsules\n\n## Plan\n\n### Decision: Use sqlite?\n**Choice**: yes\n**Source**: human\n**Timestamp**: 2026-01-02T03:04:05Z\n**Status**: verified\n";
        let (_, decoded) = decode(raw).unwrap();
        assert_eq!(decoded.len(), 1);
        let c = &decoded[0];
        assert_eq!(c.phase, "plan");
        assert_eq!(c.id, compute_id("s9", "plan", "Use sqlite?"));
        assert_eq!(c.origin, Origin::Human);
        assert_eq!(c.status, CapsuleStatus::Verified);
        assert_eq!(c.capsule_type, CapsuleType::Finding);
        assert_eq!(
            c.created_at.unwrap().to_rfc3339(),
            "2026-01-02T03:04:05+00:00"
        );
    }

    #[test]
    fn test_decode_reads_each_label_field() {
        let raw = "---\nsession: s9\ntype: capsules\n---\n\n## Execute\n\n### Decision: Pool size?\n**Status**: invalidated\n**Type**: decision\n**Significance**: context\n**Confirmation**: explicit\n**Origin**: agent\n";
        let (_, decoded) = decode(raw).unwrap();
        let c = &decoded[0];
        assert_eq!(c.status, CapsuleStatus::Invalidated);
        assert_eq!(c.capsule_type, CapsuleType::Decision);
        assert_eq!(c.significance, Significance::Context);
        assert_eq!(c.confirmation, Confirmation::Explicit);
        assert_eq!(c.origin, Origin::Agent);
    }

    #[test]
    fn test_decode_rejects_unterminated_header() {
        assert!(decode("---\nsession: s1\n# Decision Capsules").is_err());
    }

    #[test]
    fn test_section_titles_are_reversible() {
        for phase in ordered_phase_names() {
            assert_eq!(section_phase(&section_title(phase)), phase);
        }
    }

    #[test]
    fn test_field_line_accepts_both_colon_placements() {
        let a = FIELD_LINE.captures("**Choice**: x").unwrap();
        let b = FIELD_LINE.captures("- **Enabled By:** y").unwrap();
        assert_eq!(field_key(&a[1]), "choice");
        assert_eq!(&a[2], "x");
        assert_eq!(field_key(&b[1]), "enabledby");
        assert_eq!(&b[2], "y");
    }
}
