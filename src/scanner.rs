//! Discovery of files to map.
//!
//! Recursively walks directories to collect Dockerfiles and Helm values
//! files. Entries whose names start with `.` or `_` are skipped unless
//! default excludes are disabled, and extra glob patterns can exclude more.

use anyhow::{Context, Result};
use glob::Pattern;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The kind of document a discovered file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileKind {
    Dockerfile,
    Values,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileKind::Dockerfile => "dockerfile",
            FileKind::Values => "values",
        })
    }
}

/// A file found by [`collect_files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanTarget {
    pub path: PathBuf,
    pub kind: FileKind,
}

/// Recognises a file by name.
///
/// Dockerfiles are `Dockerfile`, `Containerfile`, `Dockerfile.<suffix>` and
/// `<prefix>.Dockerfile`. Values files are `values*.yaml` / `values*.yml`.
pub fn classify(path: &Path) -> Option<FileKind> {
    let name = path.file_name()?.to_str()?;

    if name == "Dockerfile"
        || name == "Containerfile"
        || name.starts_with("Dockerfile.")
        || name.ends_with(".Dockerfile")
        || name.ends_with(".dockerfile")
    {
        return Some(FileKind::Dockerfile);
    }

    let is_yaml = path
        .extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml");
    if is_yaml && name.starts_with("values") {
        return Some(FileKind::Values);
    }

    None
}

/// Collects Dockerfiles and values files under `paths`.
///
/// `exclude` holds glob patterns matched against each entry's name and its
/// path relative to the scan root; a matching directory is not descended.
/// With `default_excludes`, entries starting with `.` or `_` are skipped.
/// A path naming a file is classified directly. Results are sorted per root.
pub fn collect_files(
    paths: &[PathBuf],
    exclude: &[String],
    default_excludes: bool,
) -> Result<Vec<ScanTarget>> {
    let patterns = exclude
        .iter()
        .map(|p| Pattern::new(p).with_context(|| format!("Invalid exclude pattern '{}'", p)))
        .collect::<Result<Vec<_>>>()?;

    let mut files = Vec::new();

    for root in paths {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !((default_excludes && is_hidden_or_underscore(e))
                        || is_excluded(e, root, &patterns))
            });

        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(kind) = classify(entry.path()) {
                files.push(ScanTarget {
                    path: entry.into_path(),
                    kind,
                });
            }
        }
    }

    Ok(files)
}

fn is_hidden_or_underscore(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|s| s.starts_with('.') || s.starts_with('_'))
}

fn is_excluded(entry: &walkdir::DirEntry, root: &Path, patterns: &[Pattern]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
    patterns
        .iter()
        .any(|p| p.matches(&name) || p.matches_path(relative))
}
