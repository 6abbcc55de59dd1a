//! Knowledge store: the file layer behind every knowledge tool.
//!
//! All paths arrive as agent-supplied strings and go through [`PathGuard`]
//! before anything touches the disk. Content is UTF-8 text; files above
//! the configured ceiling are refused rather than truncated.

use crate::core::error::HandoffError;
use crate::core::path_guard::PathGuard;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// One immediate child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    /// Root-relative, `/`-separated.
    pub path: String,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// One matching line found by [`KnowledgeStore::search`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub path: String,
    pub line_number: usize,
    pub line: String,
}

/// Receipt for a completed write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteReceipt {
    pub path: String,
    pub bytes: usize,
    pub sha256: String,
}

/// Decides whether a line matches a query.
pub trait LineMatcher {
    fn is_match(&self, line: &str) -> bool;
}

/// Case-sensitive substring matcher.
#[derive(Debug, Clone)]
pub struct Substring(pub String);

impl LineMatcher for Substring {
    fn is_match(&self, line: &str) -> bool {
        line.contains(self.0.as_str())
    }
}

/// Sandboxed read/write/list/search over the knowledge root.
#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    guard: PathGuard,
    max_file_bytes: u64,
}

impl KnowledgeStore {
    pub fn new(guard: PathGuard, max_file_bytes: u64) -> Self {
        Self {
            guard,
            max_file_bytes,
        }
    }

    pub fn open(root: &Path) -> Result<Self, HandoffError> {
        Ok(Self::new(PathGuard::new(root)?, DEFAULT_MAX_FILE_BYTES))
    }

    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    pub fn read(&self, path: &str) -> Result<String, HandoffError> {
        let target = self.guard.resolve(path)?;
        let meta = match fs::metadata(&target) {
            Ok(m) => m,
            // `a.md/b.md` with `a.md` a file is just as absent.
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Err(HandoffError::NotFound(format!("File not found: {}", path)));
            }
            Err(e) => return Err(HandoffError::IoError(e)),
        };
        if meta.is_dir() {
            return Err(HandoffError::PathKind(format!(
                "{} is a directory, not a file",
                path
            )));
        }
        if meta.len() > self.max_file_bytes {
            return Err(HandoffError::UnsupportedContent(format!(
                "{} is {} bytes; the limit is {}",
                path,
                meta.len(),
                self.max_file_bytes
            )));
        }
        let bytes = fs::read(&target).map_err(HandoffError::IoError)?;
        String::from_utf8(bytes)
            .map_err(|_| HandoffError::UnsupportedContent(format!("{} is not valid UTF-8", path)))
    }

    /// Overwrites `path` atomically, creating parent directories.
    pub fn write(&self, path: &str, content: &str) -> Result<WriteReceipt, HandoffError> {
        let target = self.writable_target(path, content)?;
        let tmp = self.stage(&target, content)?;
        tmp.persist(&target)
            .map_err(|e| HandoffError::IoError(e.error))?;
        Ok(self.receipt(&target, content))
    }

    /// Like [`write`](Self::write) but fails if `path` already exists.
    pub fn write_new(&self, path: &str, content: &str) -> Result<WriteReceipt, HandoffError> {
        let target = self.writable_target(path, content)?;
        let tmp = self.stage(&target, content)?;
        tmp.persist_noclobber(&target).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                HandoffError::InvalidInput(format!("{} already exists", path))
            } else {
                HandoffError::IoError(e.error)
            }
        })?;
        Ok(self.receipt(&target, content))
    }

    /// Immediate entries of a directory, sorted by name.
    pub fn list(&self, path: &str) -> Result<Vec<Entry>, HandoffError> {
        let dir = self.guard.resolve(path)?;
        if !dir.is_dir() {
            return Err(HandoffError::NotFound(format!("Directory not found: {}", path)));
        }

        let mut entries = Vec::new();
        for item in fs::read_dir(&dir).map_err(HandoffError::IoError)? {
            let item = item.map_err(HandoffError::IoError)?;
            let item_path = item.path();
            // Links that leave the root are invisible to the agent.
            if !self.guard.contains(&item_path) {
                continue;
            }
            let meta = fs::metadata(&item_path).map_err(HandoffError::IoError)?;
            let (kind, size) = if meta.is_dir() {
                (EntryKind::Directory, None)
            } else {
                (EntryKind::File, Some(meta.len()))
            };
            entries.push(Entry {
                name: item.file_name().to_string_lossy().into_owned(),
                path: self.guard.relative(&item_path),
                kind,
                size,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Case-sensitive substring search under `scope`.
    pub fn search(&self, query: &str, scope: &str) -> Result<SearchIter<'_, Substring>, HandoffError> {
        if query.is_empty() {
            return Err(HandoffError::InvalidInput(
                "search query must not be empty".to_string(),
            ));
        }
        self.search_with(Substring(query.to_string()), scope)
    }

    /// Search with a caller-supplied matcher.
    pub fn search_with<M: LineMatcher>(
        &self,
        matcher: M,
        scope: &str,
    ) -> Result<SearchIter<'_, M>, HandoffError> {
        let start = self.guard.resolve(scope)?;
        if !start.exists() {
            return Err(HandoffError::NotFound(format!("Search path not found: {}", scope)));
        }
        Ok(SearchIter {
            store: self,
            matcher,
            pending: VecDeque::from([start]),
            visited: HashSet::new(),
            current: None,
        })
    }

    fn writable_target(&self, path: &str, content: &str) -> Result<PathBuf, HandoffError> {
        let target = self.guard.resolve(path)?;
        if target == self.guard.root() || target.is_dir() {
            return Err(HandoffError::PathKind(format!(
                "{} is a directory, not a file",
                path
            )));
        }
        // The nearest existing ancestor has to be a directory for the
        // parent chain to be creatable.
        for ancestor in target.ancestors().skip(1) {
            if !ancestor.starts_with(self.guard.root()) {
                break;
            }
            if let Ok(meta) = fs::metadata(ancestor) {
                if !meta.is_dir() {
                    return Err(HandoffError::PathKind(format!(
                        "{} is a file, not a directory",
                        self.guard.relative(ancestor)
                    )));
                }
                break;
            }
        }
        if content.len() as u64 > self.max_file_bytes {
            return Err(HandoffError::UnsupportedContent(format!(
                "content is {} bytes; the limit is {}",
                content.len(),
                self.max_file_bytes
            )));
        }
        Ok(target)
    }

    // Temp file lives next to the target so the final rename stays on one
    // filesystem.
    fn stage(&self, target: &Path, content: &str) -> Result<NamedTempFile, HandoffError> {
        let parent = target.parent().ok_or_else(|| {
            HandoffError::InvalidPath(target.display().to_string())
        })?;
        fs::create_dir_all(parent).map_err(HandoffError::IoError)?;
        let mut tmp = NamedTempFile::new_in(parent).map_err(HandoffError::IoError)?;
        tmp.write_all(content.as_bytes())
            .map_err(HandoffError::IoError)?;
        tmp.as_file().sync_all().map_err(HandoffError::IoError)?;
        Ok(tmp)
    }

    fn receipt(&self, target: &Path, content: &str) -> WriteReceipt {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        WriteReceipt {
            path: self.guard.relative(target),
            bytes: content.len(),
            sha256: format!("{:x}", hasher.finalize()),
        }
    }

    // None for anything search should silently pass over.
    fn searchable_text(&self, file: &Path) -> Option<String> {
        let meta = fs::metadata(file).ok()?;
        if meta.len() > self.max_file_bytes {
            tracing::debug!(path = %file.display(), "search: skipping oversized file");
            return None;
        }
        let bytes = fs::read(file).ok()?;
        match String::from_utf8(bytes) {
            Ok(text) => Some(text),
            Err(_) => {
                tracing::debug!(path = %file.display(), "search: skipping non-UTF-8 file");
                None
            }
        }
    }
}

/// Lazy walk over the search scope. Directories are visited in name order;
/// files are read one at a time as the iterator advances.
pub struct SearchIter<'a, M> {
    store: &'a KnowledgeStore,
    matcher: M,
    pending: VecDeque<PathBuf>,
    // Canonical directories already expanded; in-root links can form cycles.
    visited: HashSet<PathBuf>,
    current: Option<OpenFile>,
}

struct OpenFile {
    rel: String,
    lines: std::vec::IntoIter<(usize, String)>,
}

impl<M: LineMatcher> SearchIter<'_, M> {
    fn expand(&mut self, dir: &Path) {
        let Ok(real) = fs::canonicalize(dir) else {
            return;
        };
        if !self.visited.insert(real) {
            return;
        }
        let Ok(read) = fs::read_dir(dir) else {
            return;
        };
        let mut children: Vec<PathBuf> = read
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| self.store.guard.contains(p))
            .collect();
        children.sort();
        // Depth-first, keeping name order among siblings.
        for child in children.into_iter().rev() {
            self.pending.push_front(child);
        }
    }

    fn open(&mut self, file: &Path) {
        let Some(text) = self.store.searchable_text(file) else {
            return;
        };
        let lines: Vec<(usize, String)> = text
            .lines()
            .enumerate()
            .filter(|(_, line)| self.matcher.is_match(line))
            .map(|(i, line)| (i + 1, line.to_string()))
            .collect();
        if !lines.is_empty() {
            self.current = Some(OpenFile {
                rel: self.store.guard.relative(file),
                lines: lines.into_iter(),
            });
        }
    }
}

impl<M: LineMatcher> Iterator for SearchIter<'_, M> {
    type Item = SearchMatch;

    fn next(&mut self) -> Option<SearchMatch> {
        loop {
            if let Some(open) = self.current.as_mut() {
                if let Some((line_number, line)) = open.lines.next() {
                    return Some(SearchMatch {
                        path: open.rel.clone(),
                        line_number,
                        line,
                    });
                }
                self.current = None;
            }

            let next = self.pending.pop_front()?;
            if next.is_dir() {
                self.expand(&next);
            } else {
                self.open(&next);
            }
        }
    }
}
