//! Trait library discovery
//!
//! Walks one or more directory trees for `*.trait.{json,yaml,yml}` files and
//! parses every one of them. The resulting library feeds the dependency
//! graph, which checks consistency across all traits rather than one object.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::{DirEntry, WalkDir};

use super::TraitDefinition;
use super::loader::TRAIT_EXTENSIONS;
use super::normalize_name;
use super::parser::parse_trait_file;
use crate::source::ParseError;

/// A trait file that failed to parse
#[derive(Debug, Clone)]
pub struct LibraryFailure {
    pub path: PathBuf,
    pub errors: Vec<ParseError>,
}

/// Every trait found under a set of roots
#[derive(Debug, Default)]
pub struct TraitLibrary {
    /// Definitions in discovery order (roots in order, paths sorted per root)
    pub traits: Vec<(PathBuf, Arc<TraitDefinition>)>,
    /// Files that could not be parsed
    pub failures: Vec<LibraryFailure>,
    /// Names declared by more than one file, with every declaring path
    pub duplicates: Vec<(String, Vec<PathBuf>)>,
}

impl TraitLibrary {
    /// Scan roots and parse every trait file found
    pub fn load(roots: &[PathBuf]) -> Self {
        let mut library = TraitLibrary::default();
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut duplicate_paths: HashMap<String, Vec<PathBuf>> = HashMap::new();

        for root in roots {
            for path in discover_trait_files(root) {
                match parse_trait_file(&path) {
                    Ok(definition) => {
                        let key = normalize_name(&definition.qualified_name());
                        if let Some(&index) = seen.get(&key) {
                            log::warn!("Duplicate trait \"{}\" at {}", definition.name(), path.display());
                            duplicate_paths
                                .entry(key)
                                .or_insert_with(|| vec![library.traits[index].0.clone()])
                                .push(path);
                            continue;
                        }
                        seen.insert(key, library.traits.len());
                        library.traits.push((path, Arc::new(definition)));
                    }
                    Err(errors) => {
                        log::warn!("Failed to parse trait at {}: {} error(s)", path.display(), errors.len());
                        library.failures.push(LibraryFailure { path, errors });
                    }
                }
            }
        }

        let mut duplicates: Vec<_> = duplicate_paths.into_iter().collect();
        duplicates.sort_by(|a, b| a.0.cmp(&b.0));
        library.duplicates = duplicates;

        log::info!(
            "Loaded trait library: {} traits, {} failures",
            library.traits.len(),
            library.failures.len()
        );
        library
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Arc<TraitDefinition>> {
        self.traits.iter().map(|(_, def)| def)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TraitDefinition>> {
        let key = normalize_name(name);
        self.definitions()
            .find(|def| normalize_name(def.name()) == key || normalize_name(&def.qualified_name()) == key)
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }
}

/// Find trait files under a root, sorted by path for determinism
pub fn discover_trait_files(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(should_enter)
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                log::debug!("Error walking trait directory: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_trait_file(e.path()))
        .map(|e| e.into_path())
        .collect();

    files.sort();
    files
}

fn is_trait_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    TRAIT_EXTENSIONS
        .iter()
        .any(|ext| name.ends_with(&format!(".trait.{}", ext)))
}

fn should_enter(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    !(entry.file_type().is_dir() && (name.starts_with('.') || name == "node_modules" || name == "target"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn trait_yaml(name: &str) -> String {
        format!("trait:\n  name: {}\n  version: 1.0.0\nschema: {{}}\n", name)
    }

    #[test]
    fn test_load_nested_library() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "core/Identifiable.trait.yaml", &trait_yaml("Identifiable"));
        write(temp.path(), "core/audit/Auditable.trait.yml", &trait_yaml("Auditable"));
        write(temp.path(), "README.md", "not a trait");

        let library = TraitLibrary::load(&[temp.path().to_path_buf()]);
        assert_eq!(library.len(), 2);
        assert!(library.get("auditable").is_some());
        assert!(library.failures.is_empty());
    }

    #[test]
    fn test_failures_are_collected() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "Good.trait.yaml", &trait_yaml("Good"));
        write(temp.path(), "Bad.trait.yaml", "trait: [oops]\n");

        let library = TraitLibrary::load(&[temp.path().to_path_buf()]);
        assert_eq!(library.len(), 1);
        assert_eq!(library.failures.len(), 1);
        assert!(library.failures[0].path.ends_with("Bad.trait.yaml"));
    }

    #[test]
    fn test_duplicates_keep_first() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a/Shared.trait.yaml", &trait_yaml("Shared"));
        write(temp.path(), "b/Shared.trait.yaml", &trait_yaml("Shared"));

        let library = TraitLibrary::load(&[temp.path().to_path_buf()]);
        assert_eq!(library.len(), 1);
        assert_eq!(library.duplicates.len(), 1);
        assert_eq!(library.duplicates[0].1.len(), 2);
    }

    #[test]
    fn test_hidden_directories_skipped() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), ".cache/Hidden.trait.yaml", &trait_yaml("Hidden"));
        assert!(discover_trait_files(temp.path()).is_empty());
    }
}
