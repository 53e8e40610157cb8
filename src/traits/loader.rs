//! Trait loading and caching
//!
//! Resolves a trait request (name + optional namespace/version) to a file by
//! probing every root directory with every supported extension, parses the
//! first candidate that exists, and caches the outcome per request key.
//!
//! The cache stores a once-cell per key rather than a finished value, so
//! concurrent requests for the same key wait on a single in-flight load.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::TraitDefinition;
use super::parser::parse_trait_file;
use crate::source::{ParseErrorCode, SourceFormat};

/// Extensions probed for each candidate, in priority order
pub const TRAIT_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// A request to load one trait
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TraitRequest {
    /// Trait name, optionally prefixed with `/`-separated directory segments
    pub name: String,
    pub namespace: Option<String>,
    pub version: Option<String>,
}

impl TraitRequest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn at_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// `namespace/name`, or the bare name outside a namespace
    pub fn schema_key(&self) -> String {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => format!("{}/{}", ns, self.name),
            _ => self.name.clone(),
        }
    }

    /// Normalized `namespace::name::version` cache key
    pub fn cache_key(&self) -> String {
        format!(
            "{}::{}::{}",
            self.namespace.as_deref().unwrap_or("").trim().to_lowercase(),
            self.name.trim().to_lowercase(),
            self.version.as_deref().unwrap_or("").trim().to_lowercase()
        )
    }

    /// Directory segments (namespace first) and the leaf trait name
    pub fn path_segments(&self) -> (Vec<String>, String) {
        let mut segments: Vec<String> = self
            .namespace
            .iter()
            .flat_map(|ns| split_segments(ns))
            .collect();

        let mut name_parts = split_segments(&self.name);
        let leaf = name_parts.pop().unwrap_or_default();
        segments.extend(name_parts);
        (segments, leaf)
    }
}

fn split_segments(value: &str) -> Vec<String> {
    value
        .split(['/', '\\'])
        .flat_map(|s| s.split("::"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// A successfully loaded trait
#[derive(Debug, Clone)]
pub struct LoadedTrait {
    pub definition: Arc<TraitDefinition>,
    pub path: PathBuf,
    pub format: SourceFormat,
}

/// Why a trait could not be loaded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("Trait \"{name}\" not found. Searched:\n{}", format_paths(.searched))]
    NotFound { name: String, searched: Vec<PathBuf> },

    #[error("Trait \"{name}\" at {} is invalid:\n{}", .path.display(), format_lines(.messages))]
    Invalid {
        name: String,
        path: PathBuf,
        messages: Vec<String>,
    },

    #[error("Failed to read trait \"{name}\" at {}: {message}", .path.display())]
    Io {
        name: String,
        path: PathBuf,
        message: String,
    },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_lines(lines: &[String]) -> String {
    lines.iter().map(|l| format!("  - {}", l)).collect::<Vec<_>>().join("\n")
}

impl LoadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound { .. })
    }
}

type LoadSlot = Arc<OnceCell<Result<LoadedTrait, LoadError>>>;

/// Trait loader with a per-request cache
pub struct TraitLoader {
    roots: Vec<PathBuf>,
    cache: Mutex<HashMap<String, LoadSlot>>,
    parses: AtomicUsize,
}

impl TraitLoader {
    /// Create a loader probing the given roots in order
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            cache: Mutex::new(HashMap::new()),
            parses: AtomicUsize::new(0),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Load a trait, reusing any in-flight or completed load for the same key
    pub fn load(&self, request: &TraitRequest) -> Result<LoadedTrait, LoadError> {
        let key = request.cache_key();

        let slot = {
            let mut cache = self.cache.lock();
            match cache.get(&key) {
                Some(slot) => {
                    log::debug!("Trait cache hit: {}", key);
                    Arc::clone(slot)
                }
                None => {
                    log::debug!("Trait cache miss: {}", key);
                    let slot = LoadSlot::default();
                    cache.insert(key, Arc::clone(&slot));
                    slot
                }
            }
        };

        slot.get_or_init(|| self.load_uncached(request)).clone()
    }

    /// Every candidate path for a request, in probe order
    pub fn candidates(&self, request: &TraitRequest) -> Vec<PathBuf> {
        let (segments, leaf) = request.path_segments();
        let mut candidates = Vec::with_capacity(self.roots.len() * TRAIT_EXTENSIONS.len());

        for root in &self.roots {
            let dir = segments.iter().fold(root.clone(), |dir, segment| dir.join(segment));
            for ext in TRAIT_EXTENSIONS {
                candidates.push(dir.join(format!("{}.trait.{}", leaf, ext)));
            }
        }

        candidates
    }

    fn load_uncached(&self, request: &TraitRequest) -> Result<LoadedTrait, LoadError> {
        let candidates = self.candidates(request);

        let Some(path) = candidates.iter().find(|p| p.is_file()) else {
            return Err(LoadError::NotFound {
                name: request.name.clone(),
                searched: candidates,
            });
        };

        self.parses.fetch_add(1, Ordering::SeqCst);
        let definition = parse_trait_file(path).map_err(|errors| {
            if let [only] = errors.as_slice()
                && only.code == ParseErrorCode::ReadError
            {
                return LoadError::Io {
                    name: request.name.clone(),
                    path: path.clone(),
                    message: only.message.clone(),
                };
            }
            LoadError::Invalid {
                name: request.name.clone(),
                path: path.clone(),
                messages: errors.iter().map(|e| e.to_string()).collect(),
            }
        })?;

        if let Some(ref wanted) = request.version
            && wanted != definition.version()
        {
            log::warn!(
                "Trait \"{}\" requested at version {} but {} declares {}",
                request.name,
                wanted,
                path.display(),
                definition.version()
            );
        }

        log::debug!("Loaded trait \"{}\" from {}", definition.name(), path.display());

        Ok(LoadedTrait {
            definition: Arc::new(definition),
            format: SourceFormat::from_path(path).unwrap_or(SourceFormat::Yaml),
            path: path.clone(),
        })
    }

    /// Number of trait files parsed so far (cache hits do not count)
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::SeqCst)
    }

    /// Drop every cached result
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Whether a request key currently has a cache slot
    pub fn is_cached(&self, request: &TraitRequest) -> bool {
        self.cache.lock().contains_key(&request.cache_key())
    }
}

/// Resolve a request relative to an explicit file (used by tooling that already knows the path)
pub fn load_trait_at(path: &Path) -> Result<LoadedTrait, LoadError> {
    let definition = parse_trait_file(path).map_err(|errors| LoadError::Invalid {
        name: path.display().to_string(),
        path: path.to_path_buf(),
        messages: errors.iter().map(|e| e.to_string()).collect(),
    })?;

    Ok(LoadedTrait {
        definition: Arc::new(definition),
        format: SourceFormat::from_path(path).unwrap_or(SourceFormat::Yaml),
        path: path.to_path_buf(),
    })
}
