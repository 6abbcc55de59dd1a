//! Sandbox check for every path a tool touches.
//!
//! A [`PathGuard`] owns the canonical knowledge root. `resolve` is the only
//! way the rest of the crate turns an agent-supplied string into a
//! filesystem path; anything that would land outside the root is rejected
//! before a single byte is read or written.

use crate::core::error::HandoffError;
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Canonicalizes `root` once. The directory must already exist.
    pub fn new(root: &Path) -> Result<Self, HandoffError> {
        let root = fs::canonicalize(root).map_err(|e| {
            HandoffError::NotFound(format!("knowledge root {}: {}", root.display(), e))
        })?;
        if !root.is_dir() {
            return Err(HandoffError::InvalidInput(format!(
                "knowledge root is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `candidate` to an absolute path inside the root.
    ///
    /// The empty string and `.` mean the root itself. Absolute candidates are
    /// accepted only if they already sit under the root.
    pub fn resolve(&self, candidate: &str) -> Result<PathBuf, HandoffError> {
        let reject = || HandoffError::InvalidPath(candidate.to_string());

        if candidate.contains('\0') {
            return Err(reject());
        }

        let requested = Path::new(candidate);
        let relative = if requested.is_absolute() {
            requested.strip_prefix(&self.root).map_err(|_| reject())?
        } else {
            requested
        };

        let mut joined = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => joined.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(reject());
                }
            }
        }

        let resolved = self.resolve_links(&joined).map_err(|_| reject())?;
        if !resolved.starts_with(&self.root) {
            return Err(reject());
        }
        Ok(resolved)
    }

    /// Path of `abs` relative to the root, `/`-separated.
    pub fn relative(&self, abs: &Path) -> String {
        abs.strip_prefix(&self.root)
            .unwrap_or(abs)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// True when `abs` (which may be a link) ends up inside the root.
    pub fn contains(&self, abs: &Path) -> bool {
        match fs::canonicalize(abs) {
            Ok(real) => real.starts_with(&self.root),
            Err(_) => false,
        }
    }

    // Canonicalize the longest existing prefix, then re-append the missing
    // tail. The tail holds only normal components, so it cannot climb.
    fn resolve_links(&self, joined: &Path) -> std::io::Result<PathBuf> {
        let mut existing = joined.to_path_buf();
        let mut tail = Vec::new();
        loop {
            if fs::symlink_metadata(&existing).is_ok() {
                break;
            }
            match existing.file_name() {
                Some(name) => tail.push(name.to_os_string()),
                None => break,
            }
            if !existing.pop() {
                break;
            }
        }

        // A dangling link has metadata but no canonical form; treat as escape.
        let mut resolved = fs::canonicalize(&existing)?;
        for part in tail.into_iter().rev() {
            resolved.push(part);
        }
        Ok(resolved)
    }
}
