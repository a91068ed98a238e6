//! Filesystem discovery for input documents and previously rendered artifacts.

use std::{
    io,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(extension)
}

fn is_underscored(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('_'))
}

/// Candidate documents under `workdir`: files with the given extension that
/// sit directly inside a chapter directory (a directory whose name starts
/// with `chapter_prefix`) and whose name does not start with an underscore.
/// Returned sorted so runs enumerate documents deterministically.
pub fn documents(
    workdir: &Path,
    chapter_prefix: &str,
    extension: &str,
) -> Result<Vec<PathBuf>, io::Error> {
    let mut found = Vec::new();
    for entry in WalkDir::new(workdir).min_depth(2).max_depth(2) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let in_chapter = path
            .parent()
            .and_then(|dir| dir.file_name())
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(chapter_prefix));
        if in_chapter && !is_underscored(path) && has_extension(path, extension) {
            found.push(path.to_owned());
        }
    }
    found.sort();
    Ok(found)
}

/// Previously rendered artifacts: files with the given extension under any
/// subdirectory of `root`, excluding underscore-prefixed names. A missing
/// root is the first-ever run and yields an empty list.
pub fn artifacts(root: &Path, extension: &str) -> Result<Vec<PathBuf>, io::Error> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(root).min_depth(2) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !is_underscored(path) && has_extension(path, extension) {
            found.push(path.to_owned());
        }
    }
    found.sort();
    Ok(found)
}
