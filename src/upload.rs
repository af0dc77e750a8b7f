//! Turning command-line paths into upload documents.
//!
//! Files are taken as given. Directories are walked recursively and only
//! files with a supported extension are picked up.
//!
//! Documents are named for display and attribution: an explicit file by its
//! file name, a walked file by its path relative to the directory given.
//! When two files would still share a name, both fall back to their full
//! path.

use anyhow::{Context, Result};
use docchat_core::models::Document;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::extract::{extension, SUPPORTED_EXTENSIONS};

/// A file found by [`expand_paths`] and the name its document will carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundFile {
    pub path: PathBuf,
    pub name: String,
}

/// Expand `paths` into a sorted, de-duplicated file list with unique names.
pub fn expand_paths(paths: &[PathBuf]) -> Result<Vec<FoundFile>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(true) {
                let entry = entry
                    .with_context(|| format!("Failed to walk directory: {}", path.display()))?;
                if entry.file_type().is_file() && is_supported(entry.path()) {
                    let name = entry
                        .path()
                        .strip_prefix(path)
                        .map(display_name)
                        .unwrap_or_else(|_| file_name(entry.path()));
                    files.push(FoundFile {
                        path: entry.into_path(),
                        name,
                    });
                }
            }
        } else if path.is_file() {
            files.push(FoundFile {
                path: path.clone(),
                name: file_name(path),
            });
        } else {
            anyhow::bail!("No such file or directory: {}", path.display());
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);

    let mut seen: HashMap<String, usize> = HashMap::new();
    for f in &files {
        *seen.entry(f.name.clone()).or_default() += 1;
    }
    for f in &mut files {
        if seen.get(&f.name).is_some_and(|&n| n > 1) {
            f.name = display_name(&f.path);
        }
    }

    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(extension)
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| display_name(path))
}

/// `/`-separated on every platform so names are stable in prompts and logs.
fn display_name(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
        .replace("//", "/")
}

/// Read one file as a document called `name`.
pub fn read_document(path: &Path, name: impl Into<String>) -> Result<Document> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Document::new(name, bytes))
}

/// Expand `paths` and read every file.
pub fn load_documents(paths: &[PathBuf]) -> Result<Vec<Document>> {
    expand_paths(paths)?
        .into_iter()
        .map(|f| read_document(&f.path, f.name))
        .collect()
}
