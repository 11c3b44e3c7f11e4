//! Advisory per-session run lock.
//!
//! The stores do whole-document read-modify-write, so two orchestrators on the
//! same session would lose updates. A run holds an exclusive `fs2` lock on
//! `<session>/.lock` for its lifetime; the lock is released when dropped.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::errors::SessionError;

pub const LOCK_FILE: &str = ".lock";

#[derive(Debug)]
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl SessionLock {
    /// Try to take the lock without blocking.
    pub fn acquire(session_dir: &Path, session_id: &str) -> Result<Self, SessionError> {
        let path = session_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| SessionError::Io {
                action: "open lock file",
                path: path.clone(),
                source,
            })?;

        file.try_lock_exclusive()
            .map_err(|_| SessionError::Locked {
                id: session_id.to_string(),
            })?;

        tracing::debug!(path = %path.display(), "acquired session lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
