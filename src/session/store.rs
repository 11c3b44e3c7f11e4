//! File-backed session persistence.
//!
//! ```text
//! <sessions>/
//! └── 2026-03-01-fix-login-bug-a1b2c3/
//!     ├── session.json         # Session record
//!     ├── capsules.md          # Consolidated capsule document
//!     ├── execution_log.md     # Per-phase artifacts (+ .vN.md history)
//!     ├── changes/<repo>/      # Per-repo change notes
//!     └── .work/<phase>/       # Ephemeral agent output, removed after ingest
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{Session, SessionMode, id::generate_id};
use crate::errors::SessionError;

pub const SESSION_FILE: &str = "session.json";
pub const CHANGES_DIR: &str = "changes";
pub const WORK_DIR: &str = ".work";

/// Parameters for opening a new session.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub description: String,
    pub context: String,
    pub mode: SessionMode,
    pub repos: Vec<String>,
    pub author: Option<String>,
    pub supersedes: Vec<String>,
    pub extends: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions_dir: PathBuf,
}

impl SessionStore {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    pub fn session_dir(&self, id: &str) -> PathBuf {
        self.sessions_dir.join(id)
    }

    /// Ephemeral directory the agent writes into while `phase` runs.
    pub fn work_dir(&self, id: &str, phase: &str) -> PathBuf {
        self.session_dir(id).join(WORK_DIR).join(phase)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.session_dir(id).join(SESSION_FILE).exists()
    }

    /// Create and persist a new session.
    pub fn create(&self, params: NewSession) -> Result<Session, SessionError> {
        let repos: Vec<String> = params
            .repos
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if repos.is_empty() {
            return Err(SessionError::NoRepos);
        }

        fs::create_dir_all(&self.sessions_dir).map_err(|source| SessionError::Io {
            action: "create sessions directory",
            path: self.sessions_dir.clone(),
            source,
        })?;

        let id = generate_id(&params.description, &self.sessions_dir);
        let mut session = Session::new(id, params.description, params.mode, repos);
        session.context = params.context;
        session.author = params.author;
        session.supersedes = params.supersedes;
        session.extends = params.extends;

        self.ensure_layout(&session)?;
        self.save(&session)?;
        tracing::info!(session = %session.id, mode = %session.mode, "created session");
        Ok(session)
    }

    /// Make sure the session directory and one change directory per repo exist.
    pub fn ensure_layout(&self, session: &Session) -> Result<(), SessionError> {
        let dir = self.session_dir(&session.id);
        for repo in &session.repos {
            let changes = dir.join(CHANGES_DIR).join(repo_dir_name(repo));
            fs::create_dir_all(&changes).map_err(|source| SessionError::Io {
                action: "create directory",
                path: changes.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<Session, SessionError> {
        let path = self.session_dir(id).join(SESSION_FILE);
        if !path.exists() {
            return Err(SessionError::NotFound { id: id.to_string() });
        }
        let content = fs::read_to_string(&path).map_err(|source| SessionError::Io {
            action: "read",
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SessionError::Corrupt { path, source })
    }

    /// Persist the session record, replacing the previous file in one rename.
    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        let dir = self.session_dir(&session.id);
        fs::create_dir_all(&dir).map_err(|source| SessionError::Io {
            action: "create directory",
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(SESSION_FILE);
        let tmp = dir.join(format!("{}.tmp", SESSION_FILE));
        let json = serde_json::to_string_pretty(session).map_err(|source| {
            SessionError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;
        fs::write(&tmp, json).map_err(|source| SessionError::Io {
            action: "write",
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| SessionError::Io {
            action: "replace",
            path: path.clone(),
            source,
        })
    }

    /// Ids of every directory that holds a session record.
    pub fn ids(&self) -> Vec<String> {
        if !self.sessions_dir.exists() {
            return Vec::new();
        }
        let mut ids: Vec<String> = WalkDir::new(&self.sessions_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir() && e.path().join(SESSION_FILE).exists())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        ids.sort();
        ids
    }

    /// All readable sessions, newest first. Corrupt records are skipped with a warning.
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .ids()
            .iter()
            .filter_map(|id| match self.load(id) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!(session = %id, error = %e, "skipping unreadable session");
                    None
                }
            })
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }
}

/// Directory name for a repo id; path-like ids use their last component.
pub fn repo_dir_name(repo: &str) -> String {
    Path::new(repo)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| repo.replace(['/', '\\'], "_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;
    use tempfile::tempdir;

    fn params(description: &str, mode: SessionMode) -> NewSession {
        NewSession {
            description: description.to_string(),
            context: "ctx".to_string(),
            mode,
            repos: vec!["api".to_string(), "web".to_string()],
            author: Some("dev".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_persists_and_builds_layout() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.create(params("Fix login", SessionMode::Standard)).unwrap();

        assert_eq!(session.status, SessionStatus::Started);
        assert!(store.exists(&session.id));
        let session_dir = store.session_dir(&session.id);
        assert!(session_dir.join("changes/api").is_dir());
        assert!(session_dir.join("changes/web").is_dir());

        let loaded = store.load(&session.id).unwrap();
        assert_eq!(loaded, session);
    }

    #[test]
    fn test_create_quickfix_is_approved() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.create(params("hotfix", SessionMode::Quickfix)).unwrap();
        assert_eq!(session.status, SessionStatus::Approved);
    }

    #[test]
    fn test_create_rejects_empty_repo_list() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let mut p = params("x", SessionMode::Standard);
        p.repos = vec!["  ".to_string()];
        assert!(matches!(store.create(p), Err(SessionError::NoRepos)));
    }

    #[test]
    fn test_load_missing_session_is_not_found() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let err = store.load("nope").unwrap_err();
        assert!(matches!(err, SessionError::NotFound { ref id } if id == "nope"));
    }

    #[test]
    fn test_save_overwrites_and_leaves_no_tmp_file() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let mut session = store.create(params("x", SessionMode::Standard)).unwrap();
        session.transition(SessionStatus::Investigating).unwrap();
        store.save(&session).unwrap();

        let loaded = store.load(&session.id).unwrap();
        assert_eq!(loaded.status, SessionStatus::Investigating);
        assert!(!store
            .session_dir(&session.id)
            .join("session.json.tmp")
            .exists());
    }

    #[test]
    fn test_list_skips_corrupt_records() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let good = store.create(params("good", SessionMode::Standard)).unwrap();
        let bad_dir = dir.path().join("broken");
        fs::create_dir_all(&bad_dir).unwrap();
        fs::write(bad_dir.join(SESSION_FILE), "{ not json").unwrap();

        let sessions = store.list();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, good.id);
        assert_eq!(store.ids().len(), 2);
    }

    #[test]
    fn test_repo_dir_name_uses_last_component() {
        assert_eq!(repo_dir_name("/home/me/src/api"), "api");
        assert_eq!(repo_dir_name("web"), "web");
    }
}
