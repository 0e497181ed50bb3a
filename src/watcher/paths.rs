//! Mapping between unit definition files and the directories to watch.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::units::UnitId;

/// Directories that must be watched to see changes to unit definitions.
///
/// Each definition file contributes its parent directory; loader roots are
/// watched too so that a definition created for a builtin unit is noticed.
#[derive(Debug, Default, Clone)]
pub struct WatchPaths {
    dirs: BTreeSet<PathBuf>,
}

impl WatchPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the parent directories of `files`. Returns the newly added ones.
    pub fn add_files(&mut self, files: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
        let mut new_dirs = Vec::new();

        for file in files {
            if let Some(parent) = file.parent() {
                let dir = if parent.as_os_str().is_empty() {
                    PathBuf::from(".")
                } else {
                    parent.to_path_buf()
                };
                if self.dirs.insert(dir.clone()) {
                    new_dirs.push(dir);
                }
            }
        }

        new_dirs
    }

    /// Add directories as-is.
    pub fn add_dirs(&mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
        dirs.into_iter()
            .filter(|dir| self.dirs.insert(dir.clone()))
            .collect()
    }

    pub fn dirs(&self) -> impl Iterator<Item = &Path> {
        self.dirs.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

/// Map a changed path back to the unit it defines.
///
/// The file must carry one of `extensions`. Its stem is matched against the
/// last segment of each id; the first match in `ids` order wins.
pub fn resolve_unit<'a>(
    path: &Path,
    extensions: &[String],
    ids: impl IntoIterator<Item = &'a UnitId>,
) -> Option<UnitId> {
    let extension = path.extension().and_then(OsStr::to_str)?;
    if !extensions.iter().any(|e| e == extension) {
        return None;
    }

    let stem = path.file_stem().and_then(OsStr::to_str)?;
    ids.into_iter().find(|id| id.ends_with_stem(stem)).cloned()
}
