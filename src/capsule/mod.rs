//! Decision capsules: decisions and findings recorded during a session.
//!
//! Capsules are extracted from phase artifacts or recorded directly, then kept
//! in one consolidated markdown document per session (see [`format`]). They
//! are never deleted; invalidation flips the status and links the replacement.
//!
//! ## Types
//!
//! - [`Capsule`]: one decision or finding with provenance and graph edges
//! - [`Challenge`]: a timestamped objection raised against a capsule
//! - [`CapsuleType`], [`CapsuleStatus`], [`Significance`], [`Origin`],
//!   [`Confirmation`]: classification enums

pub mod extract;
pub mod format;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::phase::phase_rank;

pub use extract::extract_from_artifact;
pub use store::{CapsuleChain, CapsuleFilter, CapsuleStore};

/// Name of the consolidated capsule document inside a session directory.
pub const CAPSULE_FILE: &str = "capsules.md";

/// Length of the hex id prefix kept from the digest.
const ID_HEX_LEN: usize = 16;

/// Deterministic capsule id derived from session, phase and question text.
pub fn compute_id(session_id: &str, phase: &str, question: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(b"|");
    hasher.update(phase.as_bytes());
    hasher.update(b"|");
    hasher.update(question.trim().as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..ID_HEX_LEN].to_string()
}

/// Lowercase string enums shared by the capsule document and the CLI.
macro_rules! label_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($label => Ok($name::$variant),)+
                    _ => anyhow::bail!(
                        "Invalid {} '{}'. Valid values: {}",
                        stringify!($name),
                        s,
                        [$($label),+].join(", ")
                    ),
                }
            }
        }
    };
}

label_enum!(
    /// A decision weighs alternatives; a finding records an observation.
    CapsuleType {
        Decision => "decision",
        Finding => "finding",
    }
);

label_enum!(
    CapsuleStatus {
        Hypothesis => "hypothesis",
        Verified => "verified",
        Invalidated => "invalidated",
    }
);

label_enum!(
    /// Impact tier of a decision.
    Significance {
        Architectural => "architectural",
        Implementation => "implementation",
        Context => "context",
    }
);

label_enum!(
    Origin {
        Human => "human",
        Agent => "agent",
    }
);

label_enum!(
    /// Whether a human confirmed the decision explicitly.
    Confirmation {
        Explicit => "explicit",
        Implicit => "implicit",
    }
);

impl Default for CapsuleStatus {
    fn default() -> Self {
        CapsuleStatus::Hypothesis
    }
}

impl Default for Significance {
    fn default() -> Self {
        Significance::Implementation
    }
}

impl Default for Origin {
    fn default() -> Self {
        Origin::Agent
    }
}

impl Default for Confirmation {
    fn default() -> Self {
        Confirmation::Implicit
    }
}

/// An objection raised against a capsule, e.g. a failed verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Capsule {
    pub id: String,
    pub session_id: String,
    pub phase: String,
    pub capsule_type: CapsuleType,
    pub status: CapsuleStatus,
    pub significance: Significance,
    pub origin: Origin,
    pub confirmation: Confirmation,
    pub question: String,
    pub choice: String,
    pub rationale: String,
    pub alternatives: Vec<String>,
    pub pattern_id: Option<String>,
    pub tags: Vec<String>,
    pub repos: Vec<String>,
    pub commits: Vec<String>,
    pub enables: Vec<String>,
    pub enabled_by: Option<String>,
    pub constrains: Vec<String>,
    pub superseded_by: Option<String>,
    pub supersedes: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub invalidated_at: Option<DateTime<Utc>>,
    pub invalidation_reason: Option<String>,
    pub learned: Option<String>,
    pub challenges: Vec<Challenge>,
}

impl Capsule {
    /// Start a capsule for a question raised in `phase` of `session_id`.
    pub fn new(
        session_id: impl Into<String>,
        phase: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        let session_id = session_id.into();
        let phase = phase.into();
        let question = question.into().trim().to_string();
        let now = Utc::now();
        Self {
            id: compute_id(&session_id, &phase, &question),
            session_id,
            phase,
            capsule_type: CapsuleType::Decision,
            status: CapsuleStatus::default(),
            significance: Significance::default(),
            origin: Origin::default(),
            confirmation: Confirmation::default(),
            question,
            choice: String::new(),
            rationale: String::new(),
            alternatives: Vec::new(),
            pattern_id: None,
            tags: Vec::new(),
            repos: Vec::new(),
            commits: Vec::new(),
            enables: Vec::new(),
            enabled_by: None,
            constrains: Vec::new(),
            superseded_by: None,
            supersedes: Vec::new(),
            created_at: Some(now),
            updated_at: Some(now),
            invalidated_at: None,
            invalidation_reason: None,
            learned: None,
            challenges: Vec::new(),
        }
    }

    pub fn with_choice(mut self, choice: impl Into<String>) -> Self {
        self.choice = choice.into();
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_alternatives(mut self, alternatives: Vec<String>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn with_type(mut self, capsule_type: CapsuleType) -> Self {
        self.capsule_type = capsule_type;
        self
    }

    pub fn with_status(mut self, status: CapsuleStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_significance(mut self, significance: Significance) -> Self {
        self.significance = significance;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_confirmation(mut self, confirmation: Confirmation) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn with_repos(mut self, repos: Vec<String>) -> Self {
        self.repos = repos;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        for tag in tags {
            self.add_tag(&tag);
        }
        self
    }

    /// Phase ordinal used when deduplicating.
    pub fn rank(&self) -> u8 {
        phase_rank(&self.phase)
    }

    pub fn is_invalidated(&self) -> bool {
        self.status == CapsuleStatus::Invalidated
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Add a tag unless already present. Returns whether it was added.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.has_tag(tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn add_challenge(&mut self, reason: impl Into<String>, resolution: Option<String>) {
        let now = Utc::now();
        self.challenges.push(Challenge {
            timestamp: now,
            reason: reason.into(),
            resolution,
        });
        self.updated_at = Some(now);
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

/// Merge a fresh extraction into a stored capsule with the same id.
///
/// Content comes from `incoming`; history (creation time, status once it has
/// moved past hypothesis, challenges, supersession links) is kept from
/// `existing`. Tags and commits are unioned.
pub fn merge(existing: &Capsule, incoming: Capsule) -> Capsule {
    let mut merged = incoming;
    merged.created_at = existing.created_at.or(merged.created_at);
    if existing.status != CapsuleStatus::Hypothesis {
        merged.status = existing.status;
        merged.invalidated_at = existing.invalidated_at;
        merged.invalidation_reason = existing.invalidation_reason.clone();
        merged.learned = existing.learned.clone();
    }
    if merged.superseded_by.is_none() {
        merged.superseded_by = existing.superseded_by.clone();
    }
    for id in &existing.supersedes {
        if !merged.supersedes.contains(id) {
            merged.supersedes.push(id.clone());
        }
    }
    for tag in &existing.tags {
        merged.add_tag(tag);
    }
    for commit in &existing.commits {
        if !merged.commits.contains(commit) {
            merged.commits.push(commit.clone());
        }
    }
    let mut challenges = existing.challenges.clone();
    challenges.extend(merged.challenges);
    merged.challenges = challenges;
    merged.touch();
    merged
}
