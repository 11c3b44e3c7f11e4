//! Turning what an agent left on disk into durable session state.
//!
//! Live runs and crash recovery share this path: locate the artifact, fill in
//! its header, validate it, promote it to the session directory, extract
//! capsules and clear the ephemeral working directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::{self, ArtifactStore, LocateSource};
use crate::capsule::{self, CapsuleStore};
use crate::errors::OrchestratorError;
use crate::phase::Phase;
use crate::session::{Session, SessionStore};

/// The three stores rooted at one sessions directory.
#[derive(Debug, Clone)]
pub struct Stores {
    pub sessions: SessionStore,
    pub artifacts: ArtifactStore,
    pub capsules: CapsuleStore,
}

impl Stores {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        let dir = sessions_dir.into();
        Self {
            sessions: SessionStore::new(dir.clone()),
            artifacts: ArtifactStore::new(dir.clone()),
            capsules: CapsuleStore::new(dir),
        }
    }
}

/// What one ingest did.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub phase: Phase,
    pub found_at: PathBuf,
    pub source: LocateSource,
    pub stored_at: PathBuf,
    pub version_path: Option<PathBuf>,
    /// Set when the artifact lacked its required sections
    pub validation_warning: Option<String>,
    pub capsules_extracted: usize,
    pub capsules_added: usize,
}

/// Ingest the output of `phase` for `session`.
///
/// Returns `Ok(None)` when no artifact could be found. `version` requests a
/// numbered history copy (execute/verify attempts).
pub fn ingest_phase_output(
    stores: &Stores,
    session: &Session,
    phase: Phase,
    work_dir: &Path,
    repo_root: Option<&Path>,
    version: Option<u32>,
) -> Result<Option<IngestReport>, OrchestratorError> {
    let Some(located) = stores
        .artifacts
        .locate(work_dir, repo_root, &session.id, phase.name())
    else {
        tracing::warn!(session = %session.id, %phase, work_dir = %work_dir.display(), "no artifact found");
        return Ok(None);
    };

    let mut doc = stores.artifacts.load(&located.path)?;
    stores
        .artifacts
        .normalize(&mut doc, &session.id, &session.repos, phase.name());
    // A fallback scan may hand back another phase's file; store it under ours.
    doc.header.phase = phase.name().to_string();

    let validation_warning = match artifact::validate(&doc, phase.name()) {
        Ok(()) => None,
        Err(e) if e.is_validation() => {
            tracing::warn!(session = %session.id, %phase, "{}", e);
            Some(e.to_string())
        }
        Err(e) => return Err(e.into()),
    };

    let stored_at = stores.artifacts.store_session_level(&session.id, &mut doc)?;
    let version_path = match version {
        Some(n) => Some(stores.artifacts.store_version(&session.id, &doc, n)?),
        None => None,
    };

    let extracted = capsule::extract_from_artifact(&doc, &session.id, phase.name(), &session.repos);
    let capsules_extracted = extracted.len();
    let capsules_added = if extracted.is_empty() {
        0
    } else {
        stores.capsules.ingest(extracted)?
    };

    if phase == Phase::Record {
        let tagged = stores.capsules.enrich_tags_from_manifest(&session.id, &doc)?;
        tracing::debug!(session = %session.id, tagged, "enriched capsule tags from file manifest");
    }

    // Only a file under the expected name is ours to move out of the repository.
    match located.source {
        LocateSource::RepoRoot => {
            if let Err(e) = fs::remove_file(&located.path) {
                tracing::warn!(path = %located.path.display(), error = %e, "could not remove stray artifact from repository");
            }
        }
        LocateSource::RepoRootScan | LocateSource::WorkDir | LocateSource::WorkDirScan => {}
    }
    stores.artifacts.cleanup_work_dir(work_dir)?;

    tracing::info!(
        session = %session.id,
        %phase,
        path = %stored_at.display(),
        capsules = capsules_extracted,
        "ingested artifact"
    );

    Ok(Some(IngestReport {
        phase,
        found_at: located.path,
        source: located.source,
        stored_at,
        version_path,
        validation_warning,
        capsules_extracted,
        capsules_added,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capsule::CapsuleFilter;
    use crate::session::{NewSession, SessionMode};
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Stores, Session) {
        let dir = tempdir().unwrap();
        let stores = Stores::new(dir.path().join("sessions"));
        let session = stores
            .sessions
            .create(NewSession {
                description: "Fix login".into(),
                mode: SessionMode::Standard,
                repos: vec!["api".into()],
                ..Default::default()
            })
            .unwrap();
        (dir, stores, session)
    }

    #[test]
    fn test_ingest_promotes_artifact_and_extracts_capsules() {
        let (_dir, stores, session) = setup();
        let work = stores.sessions.work_dir(&session.id, "execute");
        fs::create_dir_all(&work).unwrap();
        fs::write(
            work.join("execution_log.md"),
            "## Execution Log\nChanged things.\n\n### Decision: Retry?\n- **Choice**: yes\n",
        )
        .unwrap();

        let report = ingest_phase_output(&stores, &session, Phase::Execute, &work, None, Some(1))
            .unwrap()
            .unwrap();
        assert_eq!(report.source, LocateSource::WorkDir);
        assert!(report.validation_warning.is_none());
        assert_eq!(report.capsules_added, 1);
        assert!(report.stored_at.ends_with("execution_log.md"));
        assert!(report.version_path.unwrap().ends_with("execution_log.v1.md"));
        assert!(!work.exists());

        let stored = stores.artifacts.load(&report.stored_at).unwrap();
        assert_eq!(stored.header.session, session.id);
        assert_eq!(stored.header.repos, vec!["api".to_string()]);

        let capsules = stores
            .capsules
            .list(&CapsuleFilter {
                session: Some(session.id.clone()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(capsules.len(), 1);
        assert_eq!(capsules[0].phase, "execute");
    }

    #[test]
    fn test_ingest_warns_but_stores_invalid_artifact() {
        let (_dir, stores, session) = setup();
        let work = stores.sessions.work_dir(&session.id, "investigate");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("investigation_summary.md"), "Nothing relevant here.").unwrap();

        let report = ingest_phase_output(&stores, &session, Phase::Investigate, &work, None, None)
            .unwrap()
            .unwrap();
        assert!(report.validation_warning.is_some());
        assert!(report.stored_at.exists());
        assert!(report.version_path.is_none());
    }

    #[test]
    fn test_ingest_without_artifact_is_none() {
        let (_dir, stores, session) = setup();
        let work = stores.sessions.work_dir(&session.id, "plan");
        assert!(
            ingest_phase_output(&stores, &session, Phase::Plan, &work, None, None)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_ingest_rejects_broken_header() {
        let (_dir, stores, session) = setup();
        let work = stores.sessions.work_dir(&session.id, "plan");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("implementation_guide.md"), "---\nphase: plan\n## Plan").unwrap();
        let err = ingest_phase_output(&stores, &session, Phase::Plan, &work, None, None).unwrap_err();
        assert!(matches!(err, OrchestratorError::Artifact(_)));
    }

    #[test]
    fn test_ingest_moves_stray_repo_root_artifact() {
        let (dir, stores, session) = setup();
        let repo = dir.path().join("api");
        fs::create_dir_all(&repo).unwrap();
        fs::write(repo.join("milestone_ledger.md"), "## Summary\n## File Manifest\n- src/auth/a.rs\n").unwrap();
        stores
            .capsules
            .store(&capsule::Capsule::new(&session.id, "plan", "Q"))
            .unwrap();

        let work = stores.sessions.work_dir(&session.id, "record");
        let report = ingest_phase_output(&stores, &session, Phase::Record, &work, Some(&repo), None)
            .unwrap()
            .unwrap();
        assert_eq!(report.source, LocateSource::RepoRoot);
        assert!(!repo.join("milestone_ledger.md").exists());
        let c = &stores.capsules.load_session(&session.id).unwrap()[0];
        assert!(c.has_tag("auth"));
    }

    #[test]
    fn test_ingest_leaves_repository_documents_in_place() {
        let (dir, stores, session) = setup();
        let repo = dir.path().join("api");
        fs::create_dir_all(&repo).unwrap();
        fs::write(repo.join("_index.md"), "---\ntype: docs\n---\n# Project docs").unwrap();

        let work = stores.sessions.work_dir(&session.id, "plan");
        let report = ingest_phase_output(&stores, &session, Phase::Plan, &work, Some(&repo), None).unwrap();
        assert!(report.is_none());
        assert!(repo.join("_index.md").exists());
    }

    #[test]
    fn test_ingest_keeps_scanned_repo_file_after_storing_it() {
        let (dir, stores, session) = setup();
        let repo = dir.path().join("api");
        fs::create_dir_all(&repo).unwrap();
        fs::write(repo.join("guide.md"), "---\nphase: plan\n---\n## Implementation Steps\n").unwrap();

        let work = stores.sessions.work_dir(&session.id, "plan");
        let report = ingest_phase_output(&stores, &session, Phase::Plan, &work, Some(&repo), None)
            .unwrap()
            .unwrap();
        assert_eq!(report.source, LocateSource::RepoRootScan);
        assert!(report.stored_at.exists());
        assert!(repo.join("guide.md").exists());
    }
}
