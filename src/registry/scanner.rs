//! Object file scanning
//!
//! Walks the registry roots for object files and records a `(mtime, size)`
//! stamp per path. Comparing two snapshots classifies files as added,
//! changed or removed.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::{DirEntry, WalkDir};

/// Modification time and size of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileStamp {
    pub mtime_ms: u64,
    pub size: u64,
}

/// Every matching file found by one scan
pub type Snapshot = BTreeMap<PathBuf, FileStamp>;

/// Result of scanning all roots
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub snapshot: Snapshot,
    /// Paths that could not be read, with the reason
    pub errors: Vec<(PathBuf, String)>,
}

/// Files that differ between two snapshots, each list in path order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<PathBuf>,
    pub changed: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Scan roots for files whose name ends with one of `extensions`
pub fn scan(roots: &[PathBuf], extensions: &[String], ignore_directories: &[String]) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    for root in roots {
        if !root.exists() {
            log::debug!("Registry root does not exist: {}", root.display());
            continue;
        }

        let walker = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| should_enter(e, ignore_directories));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    log::debug!("Error walking registry root: {}", e);
                    outcome.errors.push((path, e.to_string()));
                    continue;
                }
            };

            if !entry.file_type().is_file() || !matches_extension(entry.path(), extensions) {
                continue;
            }

            match entry.metadata() {
                Ok(meta) => {
                    let mtime_ms = meta
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                        .map(|d| d.as_millis() as u64)
                        .unwrap_or(0);
                    outcome.snapshot.insert(
                        entry.into_path(),
                        FileStamp {
                            mtime_ms,
                            size: meta.len(),
                        },
                    );
                }
                Err(e) => outcome.errors.push((entry.into_path(), e.to_string())),
            }
        }
    }

    outcome
}

/// Classify every path that differs between `previous` and `current`
pub fn diff(previous: &Snapshot, current: &Snapshot) -> SnapshotDiff {
    let mut result = SnapshotDiff::default();

    for (path, stamp) in current {
        match previous.get(path) {
            None => result.added.push(path.clone()),
            Some(old) if old != stamp => result.changed.push(path.clone()),
            Some(_) => {}
        }
    }
    result.removed = previous
        .keys()
        .filter(|path| !current.contains_key(*path))
        .cloned()
        .collect();

    result
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
        return false;
    };
    extensions.iter().any(|ext| name.ends_with(&ext.to_lowercase()))
}

fn should_enter(entry: &DirEntry, ignore_directories: &[String]) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }

    let name = entry.file_name().to_string_lossy();
    !name.starts_with('.') && !ignore_directories.iter().any(|ignored| ignored == name.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn extensions() -> Vec<String> {
        vec![".object.yaml".into(), ".object.json".into()]
    }

    #[test]
    fn test_scan_matches_extensions_and_skips_ignored() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("nested")).unwrap();
        fs::create_dir_all(temp.path().join("node_modules")).unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        fs::write(temp.path().join("A.object.yaml"), "x").unwrap();
        fs::write(temp.path().join("nested/B.Object.JSON"), "x").unwrap();
        fs::write(temp.path().join("C.trait.yaml"), "x").unwrap();
        fs::write(temp.path().join("node_modules/D.object.yaml"), "x").unwrap();
        fs::write(temp.path().join(".git/E.object.yaml"), "x").unwrap();

        let outcome = scan(&[temp.path().to_path_buf()], &extensions(), &["node_modules".into()]);
        let names: Vec<_> = outcome
            .snapshot
            .keys()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["A.object.yaml", "B.Object.JSON"]);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_missing_root_is_empty() {
        let outcome = scan(&[PathBuf::from("/definitely/not/here")], &extensions(), &[]);
        assert!(outcome.snapshot.is_empty());
    }

    #[test]
    fn test_diff_classifies_paths() {
        let stamp = |size| FileStamp { mtime_ms: 1, size };
        let previous: Snapshot = [(PathBuf::from("a"), stamp(1)), (PathBuf::from("b"), stamp(1))].into_iter().collect();
        let current: Snapshot = [(PathBuf::from("b"), stamp(2)), (PathBuf::from("c"), stamp(1))].into_iter().collect();

        let d = diff(&previous, &current);
        assert_eq!(d.added, vec![PathBuf::from("c")]);
        assert_eq!(d.changed, vec![PathBuf::from("b")]);
        assert_eq!(d.removed, vec![PathBuf::from("a")]);
        assert!(diff(&current, &current).is_empty());
    }
}
