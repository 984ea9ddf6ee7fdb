//! Scratch directory the browser downloads into.

use crate::error::{HarvestError, HarvestResult};
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Owns the staging directory for the length of a run.
///
/// [`StagingArea::prepare`] wipes and recreates the directory; dropping the
/// guard removes it again, so the directory is gone on every exit path,
/// including early returns and panics.
#[derive(Debug)]
pub struct StagingArea {
    path: PathBuf,
    removed: bool,
}

impl StagingArea {
    /// Empty (or create) the staging directory.
    ///
    /// Refuses a directory whose wipe would take the filesystem root, the
    /// home directory or the working directory with it.
    pub fn prepare(path: &Path) -> HarvestResult<Self> {
        let resolved = resolve(path)
            .and_then(|p| ensure_disposable(&p).map(|()| p))
            .map_err(|source| HarvestError::Staging {
                path: path.to_path_buf(),
                source,
            })?;
        let path = resolved.as_path();
        remove_dir_if_present(path).map_err(|source| HarvestError::Staging {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::create_dir_all(path).map_err(|source| HarvestError::Staging {
            path: path.to_path_buf(),
            source,
        })?;
        // Chromium only honours absolute download paths.
        let path = path.canonicalize().map_err(|source| HarvestError::Staging {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("staging directory ready at {}", path.display());
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now and report failures.
    pub fn cleanup(mut self) -> HarvestResult<()> {
        self.removed = true;
        remove_dir_if_present(&self.path).map_err(|source| HarvestError::Staging {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = remove_dir_if_present(&self.path) {
            warn!("failed to remove staging directory {}: {e}", self.path.display());
        }
    }
}

/// Delete whatever is still in `dir` and return what was removed.
///
/// Runs between pages so that late or half-finished downloads from one page
/// are never routed against the next page's schema.
pub fn clear_leftovers(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let result = if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Ok(()) => {
                warn!("discarding leftover download {}", path.display());
                removed.push(path);
            }
            // Finished or renamed by the browser since the listing.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(removed)
}

/// Absolute form of `path` with `.` and `..` folded away and symlinks in the
/// longest existing prefix resolved. The path itself need not exist.
pub fn resolve(path: &Path) -> io::Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in std::path::absolute(path)?.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other),
        }
    }

    let mut missing: Vec<OsString> = Vec::new();
    let mut existing = clean.as_path();
    loop {
        if let Ok(mut real) = existing.canonicalize() {
            real.extend(missing.iter().rev());
            return Ok(real);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(clean),
        }
    }
}

/// Fail if wiping `resolved` would also remove the filesystem root, the
/// home directory or the working directory.
pub fn ensure_disposable(resolved: &Path) -> io::Result<()> {
    if resolved.parent().is_none() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "refusing to use a filesystem root as staging directory",
        ));
    }
    let protected = [
        ("working directory", std::env::current_dir().ok()),
        ("home directory", dirs::home_dir()),
    ];
    for (label, dir) in protected {
        let Some(dir) = dir else { continue };
        let dir = resolve(&dir).unwrap_or(dir);
        if dir.starts_with(resolved) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("staging directory would contain the {label} {}", dir.display()),
            ));
        }
    }
    Ok(())
}

fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
