//! File discovery.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::{DirEntry, WalkDir};

use super::FileDescriptor;
use crate::analysis::Language;

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &["vendor", "node_modules", "target", "testdata"];

/// Directories holding tests, skipped unless tests are included.
const TEST_DIRS: &[&str] = &["tests"];

/// What the walker collects.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Glob patterns matched against paths relative to each root.
    pub exclude: Vec<String>,
    /// Extensions without the dot.
    pub extensions: Vec<String>,
    pub include_tests: bool,
    /// Larger files are skipped.
    pub max_file_size: u64,
    pub follow_links: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            extensions: vec!["go".to_string(), "rs".to_string()],
            include_tests: false,
            max_file_size: 10 * 1024 * 1024,
            follow_links: false,
        }
    }
}

/// Walk `roots` and describe every file worth scanning, ordered by path.
pub fn discover(roots: &[PathBuf], options: &WalkOptions) -> anyhow::Result<Vec<FileDescriptor>> {
    let excludes = build_globset(&options.exclude)?;
    let mut found: BTreeMap<PathBuf, FileDescriptor> = BTreeMap::new();

    for root in roots {
        if !root.exists() {
            anyhow::bail!("path does not exist: {}", root.display());
        }

        let walker = WalkDir::new(root)
            .follow_links(options.follow_links)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !skip_dir(e, options.include_tests));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable path");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if excludes.is_match(relative) || excludes.is_match(path) {
                continue;
            }
            if let Some(descriptor) = describe(&entry, options) {
                found.insert(path.to_path_buf(), descriptor);
            }
        }
    }

    tracing::debug!(files = found.len(), "discovered files");
    Ok(found.into_values().collect())
}

fn skip_dir(entry: &DirEntry, include_tests: bool) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.')
        || SKIPPED_DIRS.contains(&name.as_ref())
        || (!include_tests && TEST_DIRS.contains(&name.as_ref()))
}

fn describe(entry: &DirEntry, options: &WalkOptions) -> Option<FileDescriptor> {
    let path = entry.path();
    let extension = path.extension().and_then(|e| e.to_str())?.to_string();
    if !options.extensions.iter().any(|e| e == &extension) {
        return None;
    }
    let language = Language::from_extension(&extension)?;

    let name = path.file_name()?.to_string_lossy().to_string();
    if !options.include_tests && name.ends_with("_test.go") {
        return None;
    }

    let metadata = match entry.metadata() {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot stat file");
            return None;
        }
    };
    if metadata.len() > options.max_file_size {
        tracing::debug!(path = %path.display(), size = metadata.len(), "skipping large file");
        return None;
    }
    let modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Some(FileDescriptor {
        path: path.to_path_buf(),
        name,
        extension,
        size: metadata.len(),
        lines: 0,
        modified,
        language,
        scanned: false,
        error: None,
    })
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).with_context(|| format!("invalid exclude pattern: {}", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Convenience for a single root with default options.
pub fn discover_path(root: &Path) -> anyhow::Result<Vec<FileDescriptor>> {
    discover(&[root.to_path_buf()], &WalkOptions::default())
}
