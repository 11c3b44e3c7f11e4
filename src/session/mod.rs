//! Session entity and lifecycle.
//!
//! A session is the unit of work the orchestrator drives through a sequence of
//! phases. This module owns the record itself; the transition rules live in
//! [`state`], id generation in [`id`], persistence in [`store`] and the
//! advisory run lock in [`lock`].

pub mod id;
pub mod lock;
pub mod state;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use id::{generate_id, slugify};
pub use lock::SessionLock;
pub use state::{allowed_transitions, current_phase, next_status_after, status_for_phase};
pub use store::{NewSession, SessionStore};

/// Pipeline variant selected when a session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Standard,
    Quickfix,
    Research,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Standard => write!(f, "standard"),
            SessionMode::Quickfix => write!(f, "quickfix"),
            SessionMode::Research => write!(f, "research"),
        }
    }
}

impl FromStr for SessionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(SessionMode::Standard),
            "quickfix" => Ok(SessionMode::Quickfix),
            "research" => Ok(SessionMode::Research),
            _ => anyhow::bail!(
                "Invalid session mode '{}'. Valid values: standard, quickfix, research",
                s
            ),
        }
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Started,
    Investigating,
    Planning,
    Reviewing,
    Approved,
    Executing,
    Verifying,
    Simplifying,
    Recording,
    Concluding,
    Completed,
    Abandoned,
    Paused,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 13] = [
        SessionStatus::Started,
        SessionStatus::Investigating,
        SessionStatus::Planning,
        SessionStatus::Reviewing,
        SessionStatus::Approved,
        SessionStatus::Executing,
        SessionStatus::Verifying,
        SessionStatus::Simplifying,
        SessionStatus::Recording,
        SessionStatus::Concluding,
        SessionStatus::Completed,
        SessionStatus::Abandoned,
        SessionStatus::Paused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Started => "started",
            SessionStatus::Investigating => "investigating",
            SessionStatus::Planning => "planning",
            SessionStatus::Reviewing => "reviewing",
            SessionStatus::Approved => "approved",
            SessionStatus::Executing => "executing",
            SessionStatus::Verifying => "verifying",
            SessionStatus::Simplifying => "simplifying",
            SessionStatus::Recording => "recording",
            SessionStatus::Concluding => "concluding",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
            SessionStatus::Paused => "paused",
        }
    }

    /// `completed` and `abandoned` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Abandoned)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        SessionStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == lower)
            .ok_or_else(|| anyhow::anyhow!("Invalid session status '{}'", s))
    }
}

/// Outcome of one pass through the execute/verify loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    InProgress,
    Completed,
    FailedVerification,
    Interrupted,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::InProgress => write!(f, "in_progress"),
            AttemptOutcome::Completed => write!(f, "completed"),
            AttemptOutcome::FailedVerification => write!(f, "failed_verification"),
            AttemptOutcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    /// 1-based; always equals the ledger length at insertion time
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Where an imported session came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProvenance {
    pub source: String,
    pub imported_at: DateTime<Utc>,
}

/// Persistent session record (`session.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub description: String,
    /// Operator-supplied free-text context handed to every phase
    #[serde(default)]
    pub context: String,
    pub mode: SessionMode,
    pub status: SessionStatus,
    /// Status to restore on resume; set only while paused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<SessionStatus>,
    pub repos: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_from: Option<ImportProvenance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supersedes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<String>,
    #[serde(default)]
    pub execution_attempts: Vec<ExecutionAttempt>,
}

impl Session {
    /// Build a fresh session record. Quickfix sessions skip straight to `approved`.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        mode: SessionMode,
        repos: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        let status = match mode {
            SessionMode::Quickfix => SessionStatus::Approved,
            _ => SessionStatus::Started,
        };
        let mut session = Self {
            id: id.into(),
            description: description.into(),
            context: String::new(),
            mode,
            status,
            previous_status: None,
            repos: Vec::new(),
            created_at: now,
            updated_at: now,
            paused_at: None,
            completed_at: None,
            author: None,
            imported_from: None,
            supersedes: Vec::new(),
            extends: Vec::new(),
            execution_attempts: Vec::new(),
        };
        for repo in repos {
            session.add_repo(&repo);
        }
        session
    }

    /// Add a repository to the session. Membership only ever grows.
    pub fn add_repo(&mut self, repo: &str) -> bool {
        let repo = repo.trim();
        if repo.is_empty() || self.repos.iter().any(|r| r == repo) {
            return false;
        }
        self.repos.push(repo.to_string());
        true
    }

    pub fn primary_repo(&self) -> Option<&str> {
        self.repos.first().map(String::as_str)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_paused(&self) -> bool {
        self.status == SessionStatus::Paused
    }

    /// The status the session is effectively in, looking through a pause.
    pub fn effective_status(&self) -> SessionStatus {
        match (self.status, self.previous_status) {
            (SessionStatus::Paused, Some(prev)) => prev,
            (status, _) => status,
        }
    }

    pub fn last_attempt(&self) -> Option<&ExecutionAttempt> {
        self.execution_attempts.last()
    }
}
