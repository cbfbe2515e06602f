//! The derived-data cache table.
//!
//! Generations come from one table-wide counter, so a key that is pruned
//! and later re-created never reuses an old generation. A fetch remembers
//! the generation it started under and may only write back if nothing
//! bumped it meanwhile.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::behavior::{ClassBehavior, StudentBehavior};
use crate::model::{RankingEntry, StudentScoreSet, Transcript};
use crate::ranking::Ranking;
use crate::scope::{CacheKey, Fingerprint};
use crate::statistics::ClassStatistics;

/// A value the coordinator caches. Large payloads sit behind `Arc` so a
/// cache hit is a pointer copy.
#[derive(Debug, Clone, PartialEq)]
pub enum DerivedValue {
    ScoreSets(Arc<Vec<StudentScoreSet>>),
    Statistics(ClassStatistics),
    Ranking(Arc<Ranking>),
    /// A student's entry in the class ranking; `None` if unranked.
    Rank(Option<RankingEntry>),
    Transcript(Arc<Transcript>),
    StudentBehavior(Arc<StudentBehavior>),
    ClassBehavior(Arc<ClassBehavior>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Empty,
    Fetching,
    Fresh,
    Stale,
    Evicted,
}

#[derive(Debug, Clone, Default)]
struct CacheEntry {
    value: Option<DerivedValue>,
    fetched_at: Option<Instant>,
    generation: u64,
    evicted: bool,
}

impl CacheEntry {
    fn settled_state(&self, now: Instant, freshness: Duration) -> EntryState {
        match (&self.value, self.fetched_at) {
            (None, _) if self.evicted => EntryState::Evicted,
            (None, _) => EntryState::Empty,
            (Some(_), Some(at)) if now.saturating_duration_since(at) < freshness => {
                EntryState::Fresh
            }
            (Some(_), _) => EntryState::Stale,
        }
    }
}

/// Observable view of one entry, used to assert rollback restores state.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
    pub state: EntryState,
    pub value: Option<DerivedValue>,
    pub fetched_at: Option<Instant>,
}

/// Outcome of a read-side lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Fresh(DerivedValue),
    Stale(DerivedValue),
    Miss,
}

/// Saved contents of an entry, restored on rollback.
#[derive(Debug, Clone)]
pub struct SavedEntry {
    value: Option<DerivedValue>,
    fetched_at: Option<Instant>,
    evicted: bool,
}

#[derive(Debug, Default)]
pub struct CacheTable {
    entries: HashMap<CacheKey, CacheEntry>,
    next_generation: u64,
}

impl CacheTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Current generation of `key`; 0 if it was never touched.
    pub fn generation(&self, key: &CacheKey) -> u64 {
        self.entries.get(key).map_or(0, |e| e.generation)
    }

    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| e.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.entries.keys()
    }

    pub fn lookup(&self, key: &CacheKey, now: Instant, freshness: Duration) -> Lookup {
        let Some(entry) = self.entries.get(key) else {
            return Lookup::Miss;
        };
        match (entry.settled_state(now, freshness), &entry.value) {
            (EntryState::Fresh, Some(v)) => Lookup::Fresh(v.clone()),
            (EntryState::Stale, Some(v)) => Lookup::Stale(v.clone()),
            _ => Lookup::Miss,
        }
    }

    /// Make sure `key` has an entry and return the generation a fetch
    /// started now must still see when it finishes.
    pub fn begin_fetch(&mut self, key: &CacheKey) -> u64 {
        if !self.entries.contains_key(key) {
            let generation = self.bump();
            self.entries.insert(
                key.clone(),
                CacheEntry {
                    generation,
                    ..CacheEntry::default()
                },
            );
        }
        self.generation(key)
    }

    /// Write a fetched value. Returns `false` and leaves the entry untouched
    /// when the generation moved since the fetch began.
    pub fn complete_fetch(
        &mut self,
        key: &CacheKey,
        value: DerivedValue,
        now: Instant,
        started_generation: u64,
    ) -> bool {
        if started_generation == 0 || self.generation(key) != started_generation {
            return false;
        }
        let generation = self.bump();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.value = Some(value);
                entry.fetched_at = Some(now);
                entry.evicted = false;
                entry.generation = generation;
                true
            }
            None => false,
        }
    }

    /// Drop the value of `key` and bump its generation.
    pub fn evict(&mut self, key: &CacheKey) -> bool {
        let generation = self.bump();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.value = None;
                entry.fetched_at = None;
                entry.evicted = true;
                entry.generation = generation;
                true
            }
            None => false,
        }
    }

    /// Remove entries that hold no value, except those `keep` names.
    /// Returns how many were removed.
    pub fn prune<F>(&mut self, keep: F) -> usize
    where
        F: Fn(&CacheKey) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|key, entry| entry.value.is_some() || keep(key));
        before - self.entries.len()
    }

    /// Evict every entry whose scope depends on `fingerprint`, whatever its
    /// variant or state. Returns the affected keys.
    pub fn evict_matching(&mut self, fingerprint: &Fingerprint) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .entries
            .keys()
            .filter(|k| fingerprint.invalidates(&k.scope))
            .cloned()
            .collect();
        keys.sort();
        for key in &keys {
            self.evict(key);
        }
        keys
    }

    pub fn save(&self, key: &CacheKey) -> SavedEntry {
        match self.entries.get(key) {
            Some(e) => SavedEntry {
                value: e.value.clone(),
                fetched_at: e.fetched_at,
                evicted: e.evicted,
            },
            None => SavedEntry {
                value: None,
                fetched_at: None,
                evicted: false,
            },
        }
    }

    pub fn value(&self, key: &CacheKey) -> Option<&DerivedValue> {
        self.entries.get(key).and_then(|e| e.value.as_ref())
    }

    /// Overwrite a cached value in place (optimistic write). `fetched_at`
    /// is kept so the entry ages as the value it replaces would have.
    /// Returns the new generation.
    pub fn overwrite(&mut self, key: &CacheKey, value: DerivedValue) -> u64 {
        let generation = self.bump();
        let entry = self.entries.entry(key.clone()).or_default();
        entry.value = Some(value);
        entry.evicted = false;
        entry.generation = generation;
        generation
    }

    /// Put `saved` back if the entry is still at `expected_generation`.
    pub fn restore(&mut self, key: &CacheKey, saved: &SavedEntry, expected_generation: u64) -> bool {
        if self.generation(key) != expected_generation {
            return false;
        }
        let generation = self.bump();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.value = saved.value.clone();
            entry.fetched_at = saved.fetched_at;
            entry.evicted = saved.evicted;
            entry.generation = generation;
        }
        true
    }

    pub fn snapshot(
        &self,
        key: &CacheKey,
        now: Instant,
        freshness: Duration,
        fetching: bool,
    ) -> EntrySnapshot {
        let entry = self.entries.get(key);
        let state = if fetching {
            EntryState::Fetching
        } else {
            entry.map_or(EntryState::Empty, |e| e.settled_state(now, freshness))
        };
        EntrySnapshot {
            state,
            value: entry.and_then(|e| e.value.clone()),
            fetched_at: entry.and_then(|e| e.fetched_at),
        }
    }
}
