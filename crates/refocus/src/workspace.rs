//! Workspace collaborators: where a run's files live.
//!
//! The run loop only ever sees a path. A [`WorkspaceProvider`] decides how
//! that path is populated and what happens to it afterwards. The
//! [`PreparedWorkspace`] it returns owns any scratch directory, which is
//! removed when the value is dropped.
//!
//! Preparing a scratch copy is blocking filesystem work. Inside an async
//! context, and especially in a pool of concurrent runs, go through
//! [`prepare_blocking`] so sibling runs keep being polled.

use crate::error::WorkspaceError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Prepares a filesystem root for one run.
pub trait WorkspaceProvider: Send + Sync {
    fn prepare(&self) -> Result<PreparedWorkspace, WorkspaceError>;
}

/// A workspace ready for a run. Scratch directories are deleted on drop.
#[derive(Debug)]
pub struct PreparedWorkspace {
    path: PathBuf,
    scratch: Option<TempDir>,
}

impl PreparedWorkspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this workspace is a temporary copy.
    pub fn is_scratch(&self) -> bool {
        self.scratch.is_some()
    }
}

impl AsRef<Path> for PreparedWorkspace {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

// ── ExistingDir ────────────────────────────────────────────────────

/// Use a directory in place. Nothing is copied and nothing is removed.
#[derive(Debug, Clone)]
pub struct ExistingDir {
    path: PathBuf,
}

impl ExistingDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WorkspaceProvider for ExistingDir {
    fn prepare(&self) -> Result<PreparedWorkspace, WorkspaceError> {
        if !self.path.is_dir() {
            return Err(WorkspaceError::NotADirectory(self.path.display().to_string()));
        }
        Ok(PreparedWorkspace {
            path: self.path.clone(),
            scratch: None,
        })
    }
}

// ── ScratchCopy ────────────────────────────────────────────────────

/// Copy a seed directory (or nothing) into a fresh temporary directory.
#[derive(Debug, Clone, Default)]
pub struct ScratchCopy {
    seed: Option<PathBuf>,
}

impl ScratchCopy {
    /// Scratch copy of `seed`.
    pub fn of(seed: impl Into<PathBuf>) -> Self {
        Self {
            seed: Some(seed.into()),
        }
    }

    /// An empty scratch directory.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl WorkspaceProvider for ScratchCopy {
    fn prepare(&self) -> Result<PreparedWorkspace, WorkspaceError> {
        if let Some(seed) = &self.seed
            && !seed.is_dir()
        {
            return Err(WorkspaceError::NotADirectory(seed.display().to_string()));
        }

        let dir = tempfile::Builder::new().prefix("refocus-").tempdir()?;
        let copied = match &self.seed {
            Some(seed) => copy_tree(seed, dir.path())?,
            None => 0,
        };
        info!(
            "Scratch workspace at {} ({copied} file(s) copied)",
            dir.path().display()
        );

        Ok(PreparedWorkspace {
            path: dir.path().to_path_buf(),
            scratch: Some(dir),
        })
    }
}

/// Run `provider.prepare()` on tokio's blocking thread pool.
pub async fn prepare_blocking<P>(provider: P) -> Result<PreparedWorkspace, WorkspaceError>
where
    P: WorkspaceProvider + 'static,
{
    tokio::task::spawn_blocking(move || provider.prepare())
        .await
        .map_err(|e| WorkspaceError::Io(std::io::Error::other(e)))?
}

/// Recursively copy `src` into `dst`. Returns the number of files copied.
///
/// Symbolic links are recreated on Unix and skipped elsewhere.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize, WorkspaceError> {
    let mut files = 0;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            files += 1;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        }
    }
    debug!("Copied {files} file(s) from {}", src.display());
    Ok(files)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<(), WorkspaceError> {
    let points_to = fs::read_link(link)?;
    std::os::unix::fs::symlink(points_to, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, _target: &Path) -> Result<(), WorkspaceError> {
    debug!("Skipping symlink {}", link.display());
    Ok(())
}
