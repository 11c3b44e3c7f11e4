//! Artifact persistence: ephemeral discovery, session-scoped storage,
//! numbered history copies and end-of-session purge.

use chrono::Utc;
use glob::glob;
use std::fs;
use std::path::{Path, PathBuf};

use super::{Artifact, ArtifactStatus, phase_filename};
use crate::errors::ArtifactError;

/// Artifacts that survive the end-of-session purge.
pub const PERMANENT_RECORD: &[&str] = &[
    "milestone_ledger.md",
    "research_conclusions.md",
    crate::capsule::CAPSULE_FILE,
];

/// Which rule of the fallback search found an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateSource {
    /// Expected filename in the working directory
    WorkDir,
    /// Expected filename in the primary repository root
    RepoRoot,
    /// Some other markdown file with a header in the working directory
    WorkDirScan,
    /// Some other markdown file with a header in the repository root
    RepoRootScan,
}

impl LocateSource {
    /// The agent ignored the requested filename.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::WorkDirScan | Self::RepoRootScan)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocatedArtifact {
    pub path: PathBuf,
    pub source: LocateSource,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    sessions_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(session_id)
    }

    /// Path of the durable artifact for a phase.
    pub fn session_artifact_path(&self, session_id: &str, phase: &str) -> PathBuf {
        self.session_dir(session_id).join(phase_filename(phase))
    }

    /// Path of the numbered history copy for a phase.
    pub fn version_path(&self, session_id: &str, phase: &str, version: u32) -> PathBuf {
        let filename = phase_filename(phase);
        let stem = filename.strip_suffix(".md").unwrap_or(&filename);
        self.session_dir(session_id)
            .join(format!("{}.v{}.md", stem, version))
    }

    /// Write an artifact into `dir/filename` and record the path on it.
    pub fn store(
        &self,
        artifact: &mut Artifact,
        dir: &Path,
        filename: &str,
    ) -> Result<PathBuf, ArtifactError> {
        fs::create_dir_all(dir).map_err(|source| ArtifactError::Io {
            action: "create directory",
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(filename);
        write_artifact(artifact, &path)?;
        artifact.path = Some(path.clone());
        Ok(path)
    }

    /// Promote an artifact to the session directory under its phase filename.
    pub fn store_session_level(
        &self,
        session_id: &str,
        artifact: &mut Artifact,
    ) -> Result<PathBuf, ArtifactError> {
        let filename = phase_filename(&artifact.header.phase);
        let dir = self.session_dir(session_id);
        self.store(artifact, &dir, &filename)
    }

    /// Keep a numbered copy so retries do not erase earlier iterations.
    pub fn store_version(
        &self,
        session_id: &str,
        artifact: &Artifact,
        version: u32,
    ) -> Result<PathBuf, ArtifactError> {
        let path = self.version_path(session_id, &artifact.header.phase, version);
        write_artifact(artifact, &path)?;
        Ok(path)
    }

    pub fn load(&self, path: &Path) -> Result<Artifact, ArtifactError> {
        load_artifact(path)
    }

    /// Load the durable artifact for a phase if one has been stored.
    pub fn load_session_artifact(
        &self,
        session_id: &str,
        phase: &str,
    ) -> Result<Option<Artifact>, ArtifactError> {
        let path = self.session_artifact_path(session_id, phase);
        if !path.exists() {
            return Ok(None);
        }
        load_artifact(&path).map(Some)
    }

    /// Find what the agent produced for `phase`.
    ///
    /// Search order: the expected filename in `work_dir`, then in `repo_root`,
    /// then any markdown file with a header in `work_dir`, then in `repo_root`.
    /// The repository scan only accepts headers that name this session or
    /// this phase, so the operator's own front-matter documents are ignored.
    pub fn locate(
        &self,
        work_dir: &Path,
        repo_root: Option<&Path>,
        session_id: &str,
        phase: &str,
    ) -> Option<LocatedArtifact> {
        let filename = phase_filename(phase);

        let exact = work_dir.join(&filename);
        if exact.is_file() {
            return Some(LocatedArtifact {
                path: exact,
                source: LocateSource::WorkDir,
            });
        }

        if let Some(root) = repo_root {
            let in_repo = root.join(&filename);
            if in_repo.is_file() {
                return Some(LocatedArtifact {
                    path: in_repo,
                    source: LocateSource::RepoRoot,
                });
            }
        }

        if let Some(path) = scan_for_headed_markdown(work_dir, phase, None) {
            tracing::warn!(
                phase,
                path = %path.display(),
                expected = %filename,
                "agent wrote artifact under an unexpected name in the working directory"
            );
            return Some(LocatedArtifact {
                path,
                source: LocateSource::WorkDirScan,
            });
        }

        if let Some(root) = repo_root
            && let Some(path) = scan_for_headed_markdown(root, phase, Some(session_id))
        {
            tracing::warn!(
                phase,
                path = %path.display(),
                expected = %filename,
                "agent wrote artifact into the repository root instead of the working directory"
            );
            return Some(LocatedArtifact {
                path,
                source: LocateSource::RepoRootScan,
            });
        }

        None
    }

    /// Fill header fields the agent left out from session context.
    pub fn normalize(&self, artifact: &mut Artifact, session_id: &str, repos: &[String], phase: &str) {
        let header = &mut artifact.header;
        if header.session.is_empty() {
            header.session = session_id.to_string();
        }
        if header.repos.is_empty() {
            header.repos = repos.to_vec();
        }
        if header.phase.is_empty() {
            header.phase = phase.to_string();
        }
        if header.timestamp.is_empty() {
            header.timestamp = Utc::now().to_rfc3339();
        }
        if header.status.is_none() {
            header.status = Some(ArtifactStatus::Draft);
        }
    }

    /// Remove an ephemeral working directory. Missing directories are fine.
    pub fn cleanup_work_dir(&self, work_dir: &Path) -> Result<(), ArtifactError> {
        if !work_dir.exists() {
            return Ok(());
        }
        fs::remove_dir_all(work_dir).map_err(|source| ArtifactError::Io {
            action: "remove",
            path: work_dir.to_path_buf(),
            source,
        })
    }

    /// Delete per-phase artifacts and history copies, keeping the permanent record.
    ///
    /// Returns how many files were removed.
    pub fn purge_session_artifacts(&self, session_id: &str) -> Result<usize, ArtifactError> {
        let dir = self.session_dir(session_id);
        let mut removed = 0;
        for path in markdown_files(&dir) {
            let keep = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| PERMANENT_RECORD.contains(&name));
            if keep {
                continue;
            }
            fs::remove_file(&path).map_err(|source| ArtifactError::Io {
                action: "remove",
                path: path.clone(),
                source,
            })?;
            removed += 1;
        }
        self.cleanup_work_dir(&dir.join(crate::session::store::WORK_DIR))?;
        tracing::debug!(session = session_id, removed, "purged session artifacts");
        Ok(removed)
    }
}

fn write_artifact(artifact: &Artifact, path: &Path) -> Result<(), ArtifactError> {
    let content = artifact.to_markdown()?;
    fs::write(path, content).map_err(|source| ArtifactError::Io {
        action: "write",
        path: path.to_path_buf(),
        source,
    })
}

fn load_artifact(path: &Path) -> Result<Artifact, ArtifactError> {
    let raw = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        action: "read",
        path: path.to_path_buf(),
        source,
    })?;
    let mut artifact = Artifact::parse(&raw)?;
    artifact.path = Some(path.to_path_buf());
    Ok(artifact)
}

fn markdown_files(dir: &Path) -> Vec<PathBuf> {
    let pattern = dir.join("*.md");
    let Some(pattern) = pattern.to_str() else {
        return Vec::new();
    };
    match glob(pattern) {
        Ok(paths) => paths.filter_map(|p| p.ok()).filter(|p| p.is_file()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Pick a markdown file with a parseable header, preferring one whose header
/// names `phase`, then the most recently modified.
///
/// With `owner` set, only headers naming that session or `phase` qualify.
fn scan_for_headed_markdown(dir: &Path, phase: &str, owner: Option<&str>) -> Option<PathBuf> {
    let mut candidates: Vec<(bool, Option<std::time::SystemTime>, PathBuf)> = markdown_files(dir)
        .into_iter()
        .filter_map(|path| {
            let artifact = load_artifact(&path).ok()?;
            if !artifact.has_header() {
                return None;
            }
            let same_phase = artifact.header.phase == phase;
            if let Some(session_id) = owner
                && !same_phase
                && artifact.header.session != session_id
            {
                return None;
            }
            let modified = path.metadata().and_then(|m| m.modified()).ok();
            Some((same_phase, modified, path))
        })
        .collect();

    candidates.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    candidates.into_iter().next().map(|(_, _, path)| path)
}
