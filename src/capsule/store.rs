//! Capsule persistence and queries over the per-session documents.
//!
//! Every write is a whole-document read-modify-write of
//! `<sessions>/<id>/capsules.md`. Runs hold the session lock, so there is one
//! writer per session.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use walkdir::WalkDir;

use super::{CAPSULE_FILE, Capsule, CapsuleStatus, CapsuleType, Significance, format, merge};
use crate::artifact::Artifact;
use crate::errors::CapsuleError;

/// Resolution recorded on the challenge appended by `invalidate`.
const INVALIDATED_RESOLUTION: &str = "invalidated";

/// Bullet or ordinal marker opening a manifest list item: `-`, `*`, `1.`, `2)`.
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*|]\s*|\d+[.)]\s+)+").expect("valid regex"));

/// Predicates for [`CapsuleStore::list`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct CapsuleFilter {
    pub session: Option<String>,
    pub repo: Option<String>,
    pub phase: Option<String>,
    pub tag: Option<String>,
    pub status: Option<CapsuleStatus>,
    pub capsule_type: Option<CapsuleType>,
    pub significance: Option<Significance>,
    pub include_invalidated: bool,
    /// Keep every phase's version of a question instead of the latest one
    pub show_evolution: bool,
}

impl CapsuleFilter {
    fn matches(&self, c: &Capsule) -> bool {
        let include_invalidated =
            self.include_invalidated || self.status == Some(CapsuleStatus::Invalidated);
        if c.is_invalidated() && !include_invalidated {
            return false;
        }
        self.session.as_ref().is_none_or(|s| &c.session_id == s)
            && self.repo.as_ref().is_none_or(|r| c.repos.contains(r))
            && self.phase.as_ref().is_none_or(|p| &c.phase == p)
            && self.tag.as_ref().is_none_or(|t| c.has_tag(t))
            && self.status.is_none_or(|s| c.status == s)
            && self.capsule_type.is_none_or(|t| c.capsule_type == t)
            && self.significance.is_none_or(|s| c.significance == s)
    }
}

/// One-hop view of a capsule's supersession neighbourhood.
#[derive(Debug, Clone)]
pub struct CapsuleChain {
    pub capsule: Capsule,
    pub superseded_by: Option<Capsule>,
    pub supersedes: Vec<Capsule>,
}

#[derive(Debug, Clone)]
pub struct CapsuleStore {
    sessions_dir: PathBuf,
}

impl CapsuleStore {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }

    pub fn document_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(session_id).join(CAPSULE_FILE)
    }

    /// Capsules of one session. A session without a document has none.
    pub fn load_session(&self, session_id: &str) -> Result<Vec<Capsule>, CapsuleError> {
        let path = self.document_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path).map_err(|source| CapsuleError::Io {
            action: "read",
            path: path.clone(),
            source,
        })?;
        let (doc_session, mut capsules) =
            format::decode(&raw).map_err(|source| CapsuleError::InvalidHeader {
                path: path.clone(),
                source,
            })?;
        if doc_session.is_empty() {
            for c in &mut capsules {
                c.session_id = session_id.to_string();
            }
        }
        Ok(capsules)
    }

    fn save_session(&self, session_id: &str, capsules: &[Capsule]) -> Result<(), CapsuleError> {
        let path = self.document_path(session_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| CapsuleError::Io {
                action: "create directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = format::encode(session_id, capsules).map_err(|source| {
            CapsuleError::InvalidHeader {
                path: path.clone(),
                source,
            }
        })?;
        fs::write(&path, text).map_err(|source| CapsuleError::Io {
            action: "write",
            path,
            source,
        })
    }

    /// Replace the capsule with the same id, or append it.
    pub fn store(&self, capsule: &Capsule) -> Result<(), CapsuleError> {
        let mut capsules = self.load_session(&capsule.session_id)?;
        match capsules.iter_mut().find(|c| c.id == capsule.id) {
            Some(slot) => *slot = capsule.clone(),
            None => capsules.push(capsule.clone()),
        }
        self.save_session(&capsule.session_id, &capsules)
    }

    /// Store freshly extracted capsules, merging into any with the same id.
    ///
    /// Returns how many were new.
    pub fn ingest(&self, incoming: Vec<Capsule>) -> Result<usize, CapsuleError> {
        let mut by_session: HashMap<String, Vec<Capsule>> = HashMap::new();
        for c in incoming {
            by_session.entry(c.session_id.clone()).or_default().push(c);
        }

        let mut added = 0;
        for (session_id, batch) in by_session {
            let mut capsules = self.load_session(&session_id)?;
            for c in batch {
                match capsules.iter_mut().find(|e| e.id == c.id) {
                    Some(existing) => {
                        tracing::debug!(capsule = %c.id, "merging re-extracted capsule");
                        *existing = merge(existing, c);
                    }
                    None => {
                        capsules.push(c);
                        added += 1;
                    }
                }
            }
            self.save_session(&session_id, &capsules)?;
        }
        Ok(added)
    }

    fn session_ids(&self) -> Vec<String> {
        if !self.sessions_dir.exists() {
            return Vec::new();
        }
        let mut ids: Vec<String> = WalkDir::new(&self.sessions_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir() && e.path().join(CAPSULE_FILE).exists())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        ids.sort();
        ids
    }

    fn load_all(&self) -> Result<Vec<Capsule>, CapsuleError> {
        let mut all = Vec::new();
        for id in self.session_ids() {
            all.extend(self.load_session(&id)?);
        }
        Ok(all)
    }

    /// Find a capsule by id across all sessions.
    pub fn get(&self, id: &str) -> Result<Capsule, CapsuleError> {
        self.load_all()?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| CapsuleError::NotFound { id: id.to_string() })
    }

    pub fn list(&self, filter: &CapsuleFilter) -> Result<Vec<Capsule>, CapsuleError> {
        let pool = match &filter.session {
            Some(session) => self.load_session(session)?,
            None => self.load_all()?,
        };
        let matched: Vec<Capsule> = pool.into_iter().filter(|c| filter.matches(c)).collect();
        if filter.show_evolution {
            Ok(matched)
        } else {
            Ok(dedup_latest(matched))
        }
    }

    /// Mark a capsule invalidated and optionally link its replacement.
    pub fn invalidate(
        &self,
        id: &str,
        reason: &str,
        learned: Option<&str>,
        superseded_by: Option<&str>,
    ) -> Result<Capsule, CapsuleError> {
        let mut capsule = self.get(id)?;
        let now = Utc::now();
        capsule.status = CapsuleStatus::Invalidated;
        capsule.invalidated_at = Some(now);
        capsule.invalidation_reason = Some(reason.to_string());
        if let Some(learned) = learned {
            capsule.learned = Some(learned.to_string());
        }
        if let Some(successor) = superseded_by {
            capsule.superseded_by = Some(successor.to_string());
        }
        capsule.add_challenge(reason, Some(INVALIDATED_RESOLUTION.to_string()));
        self.store(&capsule)?;

        if let Some(successor) = superseded_by
            && let Err(e) = self.link_supersedes(successor, id)
        {
            tracing::warn!(
                capsule = id,
                successor,
                error = %e,
                "could not record reciprocal supersession link"
            );
        }

        tracing::info!(capsule = id, reason, "invalidated capsule");
        Ok(capsule)
    }

    fn link_supersedes(&self, successor: &str, predecessor: &str) -> Result<(), CapsuleError> {
        let mut target = self.get(successor)?;
        if !target.supersedes.iter().any(|s| s == predecessor) {
            target.supersedes.push(predecessor.to_string());
            target.touch();
            self.store(&target)?;
        }
        Ok(())
    }

    /// Mark every hypothesis capsule of `phase` verified. Invalidated ones keep
    /// their status. Returns the count.
    pub fn verify_session_capsules(
        &self,
        session_id: &str,
        phase: &str,
    ) -> Result<usize, CapsuleError> {
        self.update_phase(session_id, phase, |c| {
            if c.status == CapsuleStatus::Verified || c.is_invalidated() {
                return false;
            }
            c.status = CapsuleStatus::Verified;
            c.touch();
            true
        })
    }

    /// Attach a challenge to every capsule of `phase`. Returns the count.
    pub fn challenge_session_capsules(
        &self,
        session_id: &str,
        phase: &str,
        reason: &str,
    ) -> Result<usize, CapsuleError> {
        self.update_phase(session_id, phase, |c| {
            c.add_challenge(reason, None);
            true
        })
    }

    fn update_phase<F>(&self, session_id: &str, phase: &str, mut f: F) -> Result<usize, CapsuleError>
    where
        F: FnMut(&mut Capsule) -> bool,
    {
        let mut capsules = self.load_session(session_id)?;
        let mut changed = 0;
        for c in capsules.iter_mut().filter(|c| c.phase == phase) {
            if f(c) {
                changed += 1;
            }
        }
        if changed > 0 {
            self.save_session(session_id, &capsules)?;
        }
        Ok(changed)
    }

    /// The capsule, what replaced it and what it replaced. One hop each way.
    pub fn get_chain(&self, id: &str) -> Result<CapsuleChain, CapsuleError> {
        let all = self.load_all()?;
        let find = |wanted: &str| all.iter().find(|c| c.id == wanted).cloned();

        let capsule = find(id).ok_or_else(|| CapsuleError::NotFound { id: id.to_string() })?;
        let superseded_by = capsule.superseded_by.as_deref().and_then(find);
        let supersedes = capsule
            .supersedes
            .iter()
            .filter_map(|s| find(s))
            .collect();
        Ok(CapsuleChain {
            capsule,
            superseded_by,
            supersedes,
        })
    }

    /// Full supersession lineage through `id`, oldest first.
    ///
    /// Walks `supersedes` backwards (first link at each step) and
    /// `superseded_by` forwards; ids already visited end the walk.
    pub fn get_chain_transitive(&self, id: &str) -> Result<Vec<Capsule>, CapsuleError> {
        let all = self.load_all()?;
        let index: HashMap<&str, &Capsule> = all.iter().map(|c| (c.id.as_str(), c)).collect();
        let start = *index
            .get(id)
            .ok_or_else(|| CapsuleError::NotFound { id: id.to_string() })?;

        let mut seen: HashSet<&str> = HashSet::from([start.id.as_str()]);

        let mut older = Vec::new();
        let mut cursor = start;
        while let Some(prev) = cursor
            .supersedes
            .iter()
            .find_map(|s| index.get(s.as_str()).copied())
        {
            if !seen.insert(prev.id.as_str()) {
                break;
            }
            older.push(prev.clone());
            cursor = prev;
        }
        older.reverse();

        let mut chain = older;
        chain.push(start.clone());

        let mut cursor = start;
        while let Some(next) = cursor
            .superseded_by
            .as_deref()
            .and_then(|s| index.get(s).copied())
        {
            if !seen.insert(next.id.as_str()) {
                break;
            }
            chain.push(next.clone());
            cursor = next;
        }
        Ok(chain)
    }

    /// Tag every capsule in the session with the areas a ledger's file
    /// manifest touched. Returns how many tags were added.
    pub fn enrich_tags_from_manifest(
        &self,
        session_id: &str,
        ledger: &Artifact,
    ) -> Result<usize, CapsuleError> {
        let tags = manifest_tags(&ledger.body);
        if tags.is_empty() {
            return Ok(0);
        }
        let mut capsules = self.load_session(session_id)?;
        let mut added = 0;
        for c in &mut capsules {
            for tag in &tags {
                if c.add_tag(tag) {
                    added += 1;
                }
            }
        }
        if added > 0 {
            self.save_session(session_id, &capsules)?;
        }
        Ok(added)
    }
}

/// One capsule per (session, question): the highest phase rank wins, ties
/// go to the later entry. Output keeps first-seen order.
fn dedup_latest(capsules: Vec<Capsule>) -> Vec<Capsule> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut best: HashMap<(String, String), Capsule> = HashMap::new();
    for c in capsules {
        let key = (c.session_id.clone(), c.question.clone());
        match best.get(&key) {
            Some(current) if current.rank() > c.rank() => {}
            Some(_) => {
                best.insert(key, c);
            }
            None => {
                order.push(key.clone());
                best.insert(key, c);
            }
        }
    }
    order.into_iter().filter_map(|k| best.remove(&k)).collect()
}

/// Tags derived from path-like entries in a `File Manifest` section.
fn manifest_tags(body: &str) -> Vec<String> {
    let mut in_manifest = false;
    let mut tags: Vec<String> = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            in_manifest = trimmed.to_lowercase().contains("file manifest");
            continue;
        }
        if !in_manifest {
            continue;
        }
        let Some(path) = manifest_path(trimmed) else {
            continue;
        };
        if let Some(tag) = tag_for_path(path)
            && !tags.contains(&tag)
        {
            tags.push(tag);
        }
    }
    tags
}

/// First path-looking token of a manifest line: `- src/auth/login.rs (modified)`.
fn manifest_path(line: &str) -> Option<&str> {
    let marker_len = LIST_MARKER.find(line).map_or(0, |m| m.end());
    let token = line[marker_len..]
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| matches!(c, '`' | '|' | ',' | ':' | '*'));
    let looks_like_path = token.contains('/') || token.contains('.');
    (looks_like_path && !token.starts_with("http")).then_some(token)
}

/// Parent directory name, or the file stem for root-level files.
fn tag_for_path(path: &str) -> Option<String> {
    let p = Path::new(path);
    let parent = p
        .parent()
        .and_then(|d| d.file_name())
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty());
    let tag = match parent {
        Some(dir) => dir.to_string(),
        None => p.file_stem()?.to_str()?.to_string(),
    };
    let tag = tag.to_lowercase();
    (!tag.is_empty()).then_some(tag)
}
