//! Source file discovery for `mrag ingest`.
//!
//! Accepts a mix of files and directories. Explicit files are always
//! taken; directories are walked and filtered through include and
//! exclude globs matched against the path relative to the directory.
//!
//! Files found in a walk are named by that relative path (`/`-separated);
//! explicit files by their file name. Names double as fragment titles, so
//! a name produced twice is reported.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Globs applied to directory walks when none are given.
pub const DEFAULT_INCLUDE_GLOBS: &[&str] = &["**/*.txt", "**/*.md"];

const DEFAULT_EXCLUDE_GLOBS: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// A discovered text file and the source name it is indexed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub source_name: String,
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn relative_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Expand `paths` into source files, sorted by path within each directory.
pub fn collect_sources(
    paths: &[PathBuf],
    include_globs: &[String],
    exclude_globs: &[String],
) -> Result<Vec<SourceFile>> {
    let include: Vec<String> = if include_globs.is_empty() {
        DEFAULT_INCLUDE_GLOBS.iter().map(|s| s.to_string()).collect()
    } else {
        include_globs.to_vec()
    };
    let include_set = build_globset(&include)?;

    let mut excludes: Vec<String> = DEFAULT_EXCLUDE_GLOBS.iter().map(|s| s.to_string()).collect();
    excludes.extend(exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for root in paths {
        if root.is_file() {
            files.push(SourceFile {
                path: root.clone(),
                source_name: source_name(root),
            });
            continue;
        }
        if !root.is_dir() {
            bail!("No such file or directory: {}", root.display());
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }
            found.push(SourceFile {
                path: path.to_path_buf(),
                source_name: relative_name(relative),
            });
        }
        found.sort_by(|a, b| a.path.cmp(&b.path));
        files.extend(found);
    }

    for name in duplicate_names(&files) {
        warn!(source = %name, "duplicate source name, fragments will share a title");
    }

    Ok(files)
}

/// Source names produced more than once, in first-duplicate order.
pub fn duplicate_names(files: &[SourceFile]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut dups = Vec::new();
    for file in files {
        if !seen.insert(file.source_name.as_str()) && !dups.contains(&file.source_name) {
            dups.push(file.source_name.clone());
        }
    }
    dups
}
