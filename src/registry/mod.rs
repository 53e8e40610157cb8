//! Object registry
//!
//! Keeps an index of object definitions synchronized with one or more
//! directory trees. Each refresh scans the roots, diffs the file snapshot
//! against the previous one and applies the changes:
//!
//! 1. Removed files drop their records
//! 2. Pending duplicates whose name became free are retried
//! 3. Added and changed files are parsed and indexed, in path order
//! 4. Duplicates whose name was released by step 3 are promoted
//!
//! Lifecycle changes are published to subscribers as [`RegistryEvent`]s.
//! An optional background poll thread repeats the refresh on an interval.

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

pub mod indexer;
pub mod scanner;
pub mod watcher;

pub use indexer::{DEFAULT_DOMAIN, MatchMode, ObjectIndexer, Query, RecordSource, RegistryRecord};
pub use scanner::{FileStamp, Snapshot, SnapshotDiff};

use crate::compose::{ComposedObject, ObjectComposer, ResolutionContext, ResolutionError, TraitResolver};
use crate::object::parser::parse_object_file;
use crate::source::render_errors;
use crate::traits::normalize_name;
use watcher::WatchHandle;

/// Default poll interval for the watcher
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 750;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryOptions {
    pub roots: Vec<PathBuf>,
    pub extensions: Vec<String>,
    pub ignore_directories: Vec<String>,
    pub watch: bool,
    pub polling_interval_ms: u64,
    /// Run the initial refresh when the registry is opened
    pub auto_load: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            extensions: vec![".object.yaml".into(), ".object.yml".into(), ".object.json".into()],
            ignore_directories: vec![
                "node_modules".into(),
                ".git".into(),
                "target".into(),
                "dist".into(),
                "build".into(),
            ],
            watch: false,
            polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
            auto_load: true,
        }
    }
}

impl RegistryOptions {
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("Object registry requires at least one root directory")]
    NoRoots,

    #[error("Object \"{name}\" not found in registry")]
    NotFound { name: String },

    #[error("Circular extends chain: {}", .stack.join(" -> "))]
    CircularExtends { stack: Vec<String> },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Failed to start registry watcher: {0}")]
    Watch(String),

    #[error("Object registry is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    ParseError,
    Duplicate,
    WatchError,
}

/// A problem recorded against one file (or a root, for watch errors)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Diagnostic {
    fn new(kind: DiagnosticKind, path: PathBuf, name: Option<String>, message: String) -> Self {
        Self {
            kind,
            path,
            name,
            message,
            at: Utc::now(),
        }
    }
}

/// Registry lifecycle notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RegistryEvent {
    Ready { records: usize },
    Added(RegistryRecord),
    Updated(RegistryRecord),
    Removed(RegistryRecord),
    Error(Diagnostic),
}

/// What one refresh did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    /// Another refresh was already running; nothing was done
    pub skipped: bool,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub errors: usize,
    pub total: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    indexer: ObjectIndexer,
    snapshot: Snapshot,
    /// Path -> normalized name the file currently holds
    path_names: HashMap<PathBuf, String>,
    diagnostics: BTreeMap<PathBuf, Diagnostic>,
    /// Duplicate file -> normalized name it is waiting for
    pending: BTreeMap<PathBuf, String>,
}

/// Resets the refresh flag when a refresh ends, even on panic
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ObjectRegistry {
    options: RegistryOptions,
    resolver: TraitResolver,
    composer: ObjectComposer,
    state: Mutex<RegistryState>,
    refreshing: AtomicBool,
    closed: AtomicBool,
    ready: Mutex<bool>,
    ready_changed: Condvar,
    subscribers: Mutex<Vec<Sender<RegistryEvent>>>,
    watcher: Mutex<Option<WatchHandle>>,
}

impl ObjectRegistry {
    /// Create a registry; runs the initial refresh when `auto_load` is set
    /// and starts polling when `watch` is set.
    pub fn open(
        options: RegistryOptions,
        resolver: TraitResolver,
        composer: ObjectComposer,
    ) -> Result<Arc<Self>, RegistryError> {
        if options.roots.is_empty() {
            return Err(RegistryError::NoRoots);
        }

        let registry = Arc::new(Self {
            options,
            resolver,
            composer,
            state: Mutex::new(RegistryState::default()),
            refreshing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            ready: Mutex::new(false),
            ready_changed: Condvar::new(),
            subscribers: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
        });

        if registry.options.auto_load {
            registry.refresh()?;
        }
        if registry.options.watch {
            registry.start_watching()?;
        }

        Ok(registry)
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Receive every lifecycle event from now on
    pub fn subscribe(&self) -> Receiver<RegistryEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    fn emit(&self, events: Vec<RegistryEvent>) {
        if events.is_empty() {
            return;
        }
        let mut subscribers = self.subscribers.lock();
        for event in events {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Scan the roots and apply every change since the last refresh
    pub fn refresh(&self) -> Result<RefreshSummary, RegistryError> {
        if self.is_closed() {
            return Err(RegistryError::Closed);
        }
        if self.refreshing.swap(true, Ordering::SeqCst) {
            log::debug!("Refresh already in progress; skipping");
            return Ok(RefreshSummary {
                skipped: true,
                ..RefreshSummary::default()
            });
        }
        let _guard = RefreshGuard(&self.refreshing);

        let outcome = scanner::scan(
            &self.options.roots,
            &self.options.extensions,
            &self.options.ignore_directories,
        );

        let mut summary = RefreshSummary::default();
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            let changes = scanner::diff(&state.snapshot, &outcome.snapshot);

            for path in &changes.removed {
                self.remove_path(&mut state, path, &mut summary, &mut events);
            }

            let mut queue = free_pending(&state);
            queue.extend(changes.added.iter().cloned());
            queue.extend(changes.changed.iter().cloned());

            let mut seen = BTreeSet::new();
            for path in queue {
                if !seen.insert(path.clone()) {
                    continue;
                }
                if let Some(stamp) = outcome.snapshot.get(&path).copied() {
                    self.index_path(&mut state, path, stamp, &mut summary, &mut events);
                }
            }

            // Names released by renames or parse failures above
            loop {
                let free = free_pending(&state);
                if free.is_empty() {
                    break;
                }
                let before = state.pending.len();
                for path in free {
                    if let Some(stamp) = outcome.snapshot.get(&path).copied() {
                        self.index_path(&mut state, path, stamp, &mut summary, &mut events);
                    } else {
                        state.pending.remove(&path);
                    }
                }
                if state.pending.len() >= before {
                    break;
                }
            }

            let failing: BTreeSet<&PathBuf> = outcome.errors.iter().map(|(path, _)| path).collect();
            state
                .diagnostics
                .retain(|path, d| d.kind != DiagnosticKind::WatchError || failing.contains(path));

            for (path, message) in &outcome.errors {
                summary.errors += 1;
                if let Some(diagnostic) = record_watch_error(&mut state, path.clone(), message.clone()) {
                    events.push(RegistryEvent::Error(diagnostic));
                }
            }

            state.snapshot = outcome.snapshot;
            summary.total = state.indexer.len();
        }

        let became_ready = {
            let mut ready = self.ready.lock();
            let first = !*ready;
            *ready = true;
            first
        };
        if became_ready {
            self.ready_changed.notify_all();
            events.push(RegistryEvent::Ready { records: summary.total });
        }
        self.emit(events);

        log::info!(
            "Registry refresh: {} added, {} updated, {} removed, {} errors ({} objects)",
            summary.added,
            summary.updated,
            summary.removed,
            summary.errors,
            summary.total
        );
        Ok(summary)
    }

    fn remove_path(
        &self,
        state: &mut RegistryState,
        path: &PathBuf,
        summary: &mut RefreshSummary,
        events: &mut Vec<RegistryEvent>,
    ) {
        state.diagnostics.remove(path);
        state.pending.remove(path);
        if let Some(record) = release(state, path) {
            log::debug!("Removed object \"{}\" ({})", record.name, path.display());
            summary.removed += 1;
            events.push(RegistryEvent::Removed(record));
        }
    }

    fn index_path(
        &self,
        state: &mut RegistryState,
        path: PathBuf,
        stamp: FileStamp,
        summary: &mut RefreshSummary,
        events: &mut Vec<RegistryEvent>,
    ) {
        let definition = match parse_object_file(&path) {
            Ok(definition) => definition,
            Err(errors) => {
                log::warn!("Failed to parse object file {}: {}", path.display(), render_errors(&errors));
                state.pending.remove(&path);
                if let Some(record) = release(state, &path) {
                    summary.removed += 1;
                    events.push(RegistryEvent::Removed(record));
                }
                let diagnostic =
                    Diagnostic::new(DiagnosticKind::ParseError, path.clone(), None, render_errors(&errors));
                state.diagnostics.insert(path, diagnostic.clone());
                summary.errors += 1;
                events.push(RegistryEvent::Error(diagnostic));
                return;
            }
        };

        let record = indexer::RegistryRecord::new(definition, path.clone(), stamp);
        let key = record.key();

        // A file that now declares a different name gives up the old one
        if state.path_names.get(&path).is_some_and(|held| *held != key)
            && let Some(old) = release(state, &path)
        {
            summary.removed += 1;
            events.push(RegistryEvent::Removed(old));
        }

        if let Some(existing) = state.indexer.get(&key)
            && existing.source.path != path
        {
            let message = format!(
                "Object \"{}\" is already defined in {}",
                record.name,
                existing.source.path.display()
            );
            log::warn!("Duplicate object at {}: {}", path.display(), message);
            let diagnostic = Diagnostic::new(DiagnosticKind::Duplicate, path.clone(), Some(record.name), message);
            state.diagnostics.insert(path.clone(), diagnostic.clone());
            state.pending.insert(path, key);
            summary.errors += 1;
            events.push(RegistryEvent::Error(diagnostic));
            return;
        }

        state.diagnostics.remove(&path);
        state.pending.remove(&path);
        state.path_names.insert(path, key);
        match state.indexer.insert(record.clone()) {
            Some(_) => {
                summary.updated += 1;
                events.push(RegistryEvent::Updated(record));
            }
            None => {
                summary.added += 1;
                events.push(RegistryEvent::Added(record));
            }
        }
    }

    /// Block until the first refresh completes, running it if nobody has
    fn wait_ready(&self) -> Result<(), RegistryError> {
        if self.is_ready() {
            return Ok(());
        }
        if !self.refresh()?.skipped {
            return Ok(());
        }

        let mut ready = self.ready.lock();
        while !*ready {
            if self.is_closed() {
                return Err(RegistryError::Closed);
            }
            self.ready_changed.wait_for(&mut ready, Duration::from_millis(50));
        }
        Ok(())
    }

    /// All records, sorted by name
    pub fn list(&self) -> Vec<RegistryRecord> {
        self.state.lock().indexer.list()
    }

    pub fn get(&self, name: &str) -> Option<RegistryRecord> {
        self.state.lock().indexer.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.state.lock().indexer.contains(name)
    }

    pub fn find_by_trait(&self, traits: &[String], mode: MatchMode) -> Vec<RegistryRecord> {
        self.state.lock().indexer.find_by_trait(traits, mode)
    }

    pub fn filter_by_tags(&self, tags: &[String], mode: MatchMode) -> Vec<RegistryRecord> {
        self.state.lock().indexer.filter_by_tags(tags, mode)
    }

    pub fn filter_by_domains(&self, domains: &[String]) -> Vec<RegistryRecord> {
        self.state.lock().indexer.filter_by_domains(domains)
    }

    pub fn query(&self, query: &Query) -> Vec<RegistryRecord> {
        self.state.lock().indexer.query(query)
    }

    /// Per-file diagnostics, in path order
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.state.lock().diagnostics.values().cloned().collect()
    }

    /// Compose an object, resolving its `extends` chain first
    pub fn resolve(&self, name: &str) -> Result<ComposedObject, RegistryError> {
        self.wait_ready()?;
        let mut stack = Vec::new();
        self.resolve_chain(name, &mut stack)
    }

    fn resolve_chain(&self, name: &str, stack: &mut Vec<String>) -> Result<ComposedObject, RegistryError> {
        let key = normalize_name(name);
        if stack.iter().any(|seen| normalize_name(seen) == key) {
            let mut cycle = stack.clone();
            cycle.push(name.to_string());
            return Err(RegistryError::CircularExtends { stack: cycle });
        }

        let record = self.get(name).ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
        })?;
        stack.push(record.name.clone());

        let base = match record.definition.extends() {
            Some(parent) => Some(self.resolve_chain(parent, stack)?),
            None => None,
        };

        let context = ResolutionContext::for_object(record.name.clone(), Some(record.source.path.clone()));
        let resolved = self.resolver.resolve_object(&record.definition.traits, &context)?;
        stack.pop();

        Ok(self.composer.compose(&record.definition, &resolved, base.as_ref()))
    }

    /// Start the background poll thread (no-op if already running)
    pub fn start_watching(self: &Arc<Self>) -> Result<(), RegistryError> {
        if self.is_closed() {
            return Err(RegistryError::Closed);
        }
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }

        let interval = Duration::from_millis(self.options.polling_interval_ms.max(1));
        let handle = watcher::spawn(Arc::downgrade(self), interval).map_err(|e| RegistryError::Watch(e.to_string()))?;
        *slot = Some(handle);
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Stop polling and detach subscribers; in-flight resolutions finish
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.watcher.lock().take() {
            handle.stop();
        }
        self.subscribers.lock().clear();
        *self.state.lock() = RegistryState::default();
        self.ready_changed.notify_all();
        log::info!("Object registry closed");
    }

    pub(crate) fn report_watch_error(&self, message: String) {
        log::error!("Registry watch failed: {}", message);
        let root = self.options.roots.first().cloned().unwrap_or_default();
        let recorded = record_watch_error(&mut self.state.lock(), root, message);
        if let Some(diagnostic) = recorded {
            self.emit(vec![RegistryEvent::Error(diagnostic)]);
        }
    }
}

impl Drop for ObjectRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.get_mut().take() {
            handle.stop();
        }
    }
}

/// Pending duplicates whose name is no longer held, in path order
fn free_pending(state: &RegistryState) -> Vec<PathBuf> {
    state
        .pending
        .iter()
        .filter(|(_, key)| !state.indexer.contains(key))
        .map(|(path, _)| path.clone())
        .collect()
}

/// Store a watch error; returns the diagnostic only when it is new or its message changed
fn record_watch_error(state: &mut RegistryState, path: PathBuf, message: String) -> Option<Diagnostic> {
    if let Some(existing) = state.diagnostics.get(&path)
        && existing.kind == DiagnosticKind::WatchError
        && existing.message == message
    {
        return None;
    }
    let diagnostic = Diagnostic::new(DiagnosticKind::WatchError, path.clone(), None, message);
    state.diagnostics.insert(path, diagnostic.clone());
    Some(diagnostic)
}

/// Drop the record a path currently holds, if it still owns it
fn release(state: &mut RegistryState, path: &PathBuf) -> Option<RegistryRecord> {
    let key = state.path_names.remove(path)?;
    let owned = state.indexer.get(&key).is_some_and(|r| &r.source.path == path);
    if owned { state.indexer.remove(&key) } else { None }
}
