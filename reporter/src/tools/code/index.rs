//! File index over a local code base directory.
//!
//! Paths are exposed to the model as `/`-rooted strings relative to the code
//! base root. Every lookup goes through the index, so nothing outside the
//! root is ever opened.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;
use walkdir::WalkDir;

pub const MAX_OUTPUT_SIZE: usize = 32 * 1024;
pub const LINE_TRUNCATE_LENGTH: usize = 1024;
/// Files larger than this are skipped by content search.
pub const MAX_SEARCH_FILE_SIZE: u64 = 128 * 1024;
/// Files larger than this are never loaded by `read_file`.
pub const MAX_READ_FILE_SIZE: u64 = 512 * 1024;

const SKIPPED_DIRS: &[&str] = &[".git", ".hg", ".svn"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFile {
    pub path: String,
    pub size: u64,
}

/// Directories and files under one root, sorted by path.
#[derive(Debug, Clone)]
pub struct CodeIndex {
    root: PathBuf,
    dirs: Vec<String>,
    files: Vec<IndexedFile>,
}

impl CodeIndex {
    pub fn build(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("code base root {} is not a directory", root.display());
        }
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| SKIPPED_DIRS.contains(&name)))
            });
        for entry in walker {
            let entry = entry.with_context(|| format!("walk {}", root.display()))?;
            let Some(path) = index_path(root, entry.path()) else {
                continue;
            };
            if entry.file_type().is_dir() {
                dirs.push(path);
            } else if entry.file_type().is_file() {
                let size = entry
                    .metadata()
                    .with_context(|| format!("stat {}", entry.path().display()))?
                    .len();
                files.push(IndexedFile { path, size });
            }
        }
        debug!(root = %root.display(), dirs = dirs.len(), files = files.len(), "indexed code base");
        Ok(Self {
            root: root.to_path_buf(),
            dirs,
            files,
        })
    }

    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }

    pub fn files(&self) -> &[IndexedFile] {
        &self.files
    }

    pub fn file(&self, path: &str) -> Option<&IndexedFile> {
        self.files.iter().find(|file| file.path == path)
    }

    /// Read an indexed file. `path` must come from the index.
    pub fn read(&self, file: &IndexedFile) -> Result<Vec<u8>> {
        let full = self.root.join(file.path.trim_start_matches('/'));
        fs::read(&full).with_context(|| format!("read {}", full.display()))
    }
}

/// `/`-rooted path of `path` relative to `root`; `None` for non-UTF-8 names.
fn index_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in relative.components() {
        out.push('/');
        out.push_str(component.as_os_str().to_str()?);
    }
    Some(out)
}

/// Normalize a model-supplied path: resolve `.`/`..` without leaving `/`.
pub fn sanitize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Parent directory of an index path (`/` for top-level entries).
pub fn parent_of(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

/// Cap line length and total size of text returned to the model.
pub fn sanitize_output(output: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut size = 0;
    for line in output.lines() {
        let line = match line.char_indices().nth(LINE_TRUNCATE_LENGTH) {
            Some((cut, _)) => format!("{}...TRUNCATED", &line[..cut]),
            None => line.to_string(),
        };
        size += line.len();
        if size > MAX_OUTPUT_SIZE {
            lines.push("...FILE TRUNCATED...".to_string());
            return lines.join("\n");
        }
        lines.push(line);
    }
    lines.join("\n")
}
