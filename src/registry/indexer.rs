//! In-memory object index
//!
//! Records are keyed by normalized object name, with inverted indexes from
//! trait, tag and domain (all case-insensitive) to record keys.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use super::scanner::FileStamp;
use crate::object::ObjectDefinition;
use crate::traits::normalize_name;

/// Domain assigned to objects that declare none
pub const DEFAULT_DOMAIN: &str = "core";

/// Backing file of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSource {
    pub path: PathBuf,
    pub mtime_ms: u64,
    pub size: u64,
}

/// The indexed form of one object file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryRecord {
    pub name: String,
    pub definition: ObjectDefinition,
    pub traits: Vec<String>,
    pub tags: Vec<String>,
    pub domains: Vec<String>,
    pub source: RecordSource,
}

impl RegistryRecord {
    pub fn new(definition: ObjectDefinition, path: PathBuf, stamp: FileStamp) -> Self {
        let mut domains = definition.domains();
        if domains.is_empty() {
            domains.push(DEFAULT_DOMAIN.to_string());
        }

        Self {
            name: definition.name().trim().to_string(),
            traits: definition.active_traits().map(|r| r.name.clone()).collect(),
            tags: definition.tags(),
            domains,
            source: RecordSource {
                path,
                mtime_ms: stamp.mtime_ms,
                size: stamp.size,
            },
            definition,
        }
    }

    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }

    /// Every name a trait query may use to reach this record
    fn trait_keys(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        for reference in self.definition.active_traits() {
            keys.insert(normalize_name(&reference.name));
            if let Some(leaf) = reference.name.rsplit('/').next() {
                keys.insert(normalize_name(leaf));
            }
            if let Some(ref alias) = reference.alias {
                keys.insert(normalize_name(alias));
            }
        }
        keys
    }
}

/// Whether a multi-value filter needs any or all of its values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Any,
    All,
}

/// Combined registry query; empty lists do not filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub trait_match: MatchMode,
    #[serde(default)]
    pub tag_match: MatchMode,
}

type InvertedIndex = HashMap<String, BTreeSet<String>>;

#[derive(Debug, Default)]
pub struct ObjectIndexer {
    records: BTreeMap<String, RegistryRecord>,
    by_trait: InvertedIndex,
    by_tag: InvertedIndex,
    by_domain: InvertedIndex,
}

impl ObjectIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, returning the one it replaced
    pub fn insert(&mut self, record: RegistryRecord) -> Option<RegistryRecord> {
        let key = record.key();
        let previous = self.remove(&key);

        for t in record.trait_keys() {
            self.by_trait.entry(t).or_default().insert(key.clone());
        }
        for tag in &record.tags {
            self.by_tag.entry(normalize_name(tag)).or_default().insert(key.clone());
        }
        for domain in &record.domains {
            self.by_domain.entry(normalize_name(domain)).or_default().insert(key.clone());
        }

        self.records.insert(key, record);
        previous
    }

    pub fn remove(&mut self, name: &str) -> Option<RegistryRecord> {
        let key = normalize_name(name);
        let record = self.records.remove(&key)?;

        let unlink = |index: &mut InvertedIndex, values: &mut dyn Iterator<Item = String>| {
            for value in values {
                if let Some(keys) = index.get_mut(&value) {
                    keys.remove(&key);
                    if keys.is_empty() {
                        index.remove(&value);
                    }
                }
            }
        };
        unlink(&mut self.by_trait, &mut record.trait_keys().into_iter());
        unlink(&mut self.by_tag, &mut record.tags.iter().map(|t| normalize_name(t)));
        unlink(&mut self.by_domain, &mut record.domains.iter().map(|d| normalize_name(d)));

        Some(record)
    }

    pub fn get(&self, name: &str) -> Option<&RegistryRecord> {
        self.records.get(&normalize_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// All records, sorted by name
    pub fn list(&self) -> Vec<RegistryRecord> {
        self.records.values().cloned().collect()
    }

    pub fn find_by_trait(&self, traits: &[String], mode: MatchMode) -> Vec<RegistryRecord> {
        self.collect(lookup(&self.by_trait, traits, mode))
    }

    pub fn filter_by_tags(&self, tags: &[String], mode: MatchMode) -> Vec<RegistryRecord> {
        self.collect(lookup(&self.by_tag, tags, mode))
    }

    pub fn filter_by_domains(&self, domains: &[String]) -> Vec<RegistryRecord> {
        self.collect(lookup(&self.by_domain, domains, MatchMode::Any))
    }

    pub fn query(&self, query: &Query) -> Vec<RegistryRecord> {
        let mut keys: BTreeSet<String> = self.records.keys().cloned().collect();

        if !query.traits.is_empty() {
            keys = &keys & &lookup(&self.by_trait, &query.traits, query.trait_match);
        }
        if !query.tags.is_empty() {
            keys = &keys & &lookup(&self.by_tag, &query.tags, query.tag_match);
        }
        if !query.domains.is_empty() {
            keys = &keys & &lookup(&self.by_domain, &query.domains, MatchMode::Any);
        }

        self.collect(keys)
    }

    fn collect(&self, keys: BTreeSet<String>) -> Vec<RegistryRecord> {
        keys.iter().filter_map(|k| self.records.get(k)).cloned().collect()
    }
}

fn lookup(index: &InvertedIndex, values: &[String], mode: MatchMode) -> BTreeSet<String> {
    let mut sets = values
        .iter()
        .map(|v| index.get(&normalize_name(v)).cloned().unwrap_or_default());

    match mode {
        MatchMode::Any => sets.fold(BTreeSet::new(), |acc, set| &acc | &set),
        MatchMode::All => match sets.next() {
            Some(first) => sets.fold(first, |acc, set| &acc & &set),
            None => BTreeSet::new(),
        },
    }
}
