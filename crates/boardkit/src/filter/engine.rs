//! Named filter groups over the cached record set
//!
//! Values under one key are ORed, keys are ANDed. A key whose value list is
//! empty imposes no constraint.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use boardkit_api::ApiError;
use boardkit_core::{Predicate, Record};

use super::search::{SEARCH_KEY, SearchIndex, normalize};

/// How a new value combines with the values already under its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Add the value if absent, remove it if present (multi-select)
    Toggle,
    /// Discard every other value under the key (single-select, tabs)
    Replace,
    /// Add the value if absent, never remove
    Add,
}

/// Per-key flags, taken from the latest update of that key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOptions {
    /// Stored with the user's preferences
    pub persistent: bool,
    /// Cleared by `reset_filters`
    pub resettable: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            persistent: true,
            resettable: true,
        }
    }
}

impl FilterOptions {
    pub fn transient() -> Self {
        Self {
            persistent: false,
            resettable: true,
        }
    }
}

/// Builds the predicate for a filter value selected by name.
pub type Matcher<R> = Arc<dyn Fn(&str) -> Arc<dyn Predicate<R>> + Send + Sync>;

#[derive(Clone)]
enum Criterion<R> {
    Predicate(Arc<dyn Predicate<R>>),
    /// Normalized search term, evaluated against the search index
    Search(String),
}

#[derive(Clone)]
struct FilterEntry<R> {
    value: String,
    criterion: Criterion<R>,
}

#[derive(Clone)]
struct FilterGroup<R> {
    entries: Vec<FilterEntry<R>>,
    options: FilterOptions,
}

pub struct FilterEngine<R> {
    groups: BTreeMap<String, FilterGroup<R>>,
    matchers: HashMap<String, Matcher<R>>,
    revision: u64,
}

impl<R> Default for FilterEngine<R> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
            matchers: HashMap::new(),
            revision: 0,
        }
    }
}

impl<R: Clone> Clone for FilterEngine<R> {
    fn clone(&self) -> Self {
        Self {
            groups: self.groups.clone(),
            matchers: self.matchers.clone(),
            revision: self.revision,
        }
    }
}

impl<R: Record> fmt::Debug for FilterEngine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEngine")
            .field("active", &self.active_values())
            .field("revision", &self.revision)
            .finish()
    }
}

impl<R: Record> FilterEngine<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped on every change to the active filter set.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn register_matcher<F>(&mut self, key: impl Into<String>, matcher: F)
    where
        F: Fn(&str) -> Arc<dyn Predicate<R>> + Send + Sync + 'static,
    {
        self.matchers.insert(key.into(), Arc::new(matcher));
    }

    pub fn has_matcher(&self, key: &str) -> bool {
        self.matchers.contains_key(key)
    }

    /// Register or toggle `predicate` under `key`, identified by `value`.
    ///
    /// Returns whether the active filter set changed.
    pub fn update_filter(
        &mut self,
        key: &str,
        mode: FilterMode,
        value: impl Into<String>,
        predicate: Arc<dyn Predicate<R>>,
        options: FilterOptions,
    ) -> bool {
        let entry = FilterEntry {
            value: value.into(),
            criterion: Criterion::Predicate(predicate),
        };
        self.apply_update(key, mode, entry, options)
    }

    /// Like [`FilterEngine::update_filter`], with the predicate built by the
    /// matcher registered for `key`.
    pub fn select(
        &mut self,
        key: &str,
        mode: FilterMode,
        value: &str,
        options: FilterOptions,
    ) -> Result<bool, ApiError> {
        let matcher = self
            .matchers
            .get(key)
            .cloned()
            .ok_or_else(|| ApiError::UnknownField {
                field: key.to_string(),
            })?;
        Ok(self.update_filter(key, mode, value, matcher(value), options))
    }

    /// Install the search term, or remove the search filter when the term is
    /// blank after normalization.
    pub fn set_search(&mut self, term: &str) -> bool {
        let normalized = normalize(term.trim());
        if normalized.trim().is_empty() {
            return self.remove_filter(SEARCH_KEY);
        }
        let entry = FilterEntry {
            value: term.trim().to_string(),
            criterion: Criterion::Search(normalized.trim().to_string()),
        };
        self.apply_update(SEARCH_KEY, FilterMode::Replace, entry, FilterOptions::transient())
    }

    pub fn search_term(&self) -> Option<&str> {
        self.groups
            .get(SEARCH_KEY)
            .and_then(|g| g.entries.first())
            .map(|e| e.value.as_str())
    }

    pub fn remove_filter(&mut self, key: &str) -> bool {
        let removed = self.groups.remove(key).is_some();
        if removed {
            self.revision += 1;
        }
        removed
    }

    /// Clear every key except the non-resettable ones.
    pub fn reset_filters(&mut self) -> bool {
        let before = self.groups.len();
        self.groups.retain(|_, group| !group.options.resettable);
        let changed = self.groups.len() != before;
        if changed {
            self.revision += 1;
        }
        changed
    }

    pub fn values(&self, key: &str) -> Vec<String> {
        self.groups
            .get(key)
            .map(|g| g.entries.iter().map(|e| e.value.clone()).collect())
            .unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.groups.values().any(|g| !g.entries.is_empty())
    }

    /// Active values of every key, search included.
    pub fn active_values(&self) -> BTreeMap<String, Vec<String>> {
        self.groups
            .iter()
            .filter(|(_, g)| !g.entries.is_empty())
            .map(|(k, g)| (k.clone(), g.entries.iter().map(|e| e.value.clone()).collect()))
            .collect()
    }

    /// Active values of keys that should survive a restart.
    pub fn persistent_values(&self) -> BTreeMap<String, Vec<String>> {
        self.groups
            .iter()
            .filter(|(_, g)| g.options.persistent && !g.entries.is_empty())
            .map(|(k, g)| (k.clone(), g.entries.iter().map(|e| e.value.clone()).collect()))
            .collect()
    }

    /// Rebuild filters from stored values through the registered matchers.
    /// Keys without a matcher are skipped.
    pub fn restore(&mut self, stored: &BTreeMap<String, Vec<String>>) {
        for (key, values) in stored {
            if !self.has_matcher(key) {
                tracing::warn!("no matcher registered for stored filter '{}', skipping", key);
                continue;
            }
            for value in values {
                if let Err(e) = self.select(key, FilterMode::Add, value, FilterOptions::default()) {
                    tracing::warn!("could not restore filter '{}': {}", key, e);
                }
            }
        }
    }

    /// Whether `record` passes every active key.
    pub fn matches(&self, record: &R, index: &SearchIndex) -> bool {
        self.groups.values().all(|group| {
            group.entries.is_empty()
                || group.entries.iter().any(|entry| match &entry.criterion {
                    Criterion::Predicate(p) => p.test(record),
                    Criterion::Search(term) => index.matches(record.id(), term),
                })
        })
    }

    /// Single pass over `records`, keeping order.
    pub fn apply<'a>(&self, records: &'a [R], index: &SearchIndex) -> Vec<&'a R> {
        if !self.is_active() {
            return records.iter().collect();
        }
        records.iter().filter(|r| self.matches(r, index)).collect()
    }

    /// Positions in `records` of the records passing every active key.
    pub fn matching_positions(&self, records: &[R], index: &SearchIndex) -> Vec<usize> {
        records
            .iter()
            .enumerate()
            .filter(|(_, r)| !self.is_active() || self.matches(r, index))
            .map(|(i, _)| i)
            .collect()
    }

    fn apply_update(
        &mut self,
        key: &str,
        mode: FilterMode,
        entry: FilterEntry<R>,
        options: FilterOptions,
    ) -> bool {
        let group = self
            .groups
            .entry(key.to_string())
            .or_insert_with(|| FilterGroup {
                entries: Vec::new(),
                options,
            });
        group.options = options;

        let existing = group.entries.iter().position(|e| e.value == entry.value);
        let changed = match (mode, existing) {
            (FilterMode::Toggle, Some(pos)) => {
                group.entries.remove(pos);
                true
            }
            (FilterMode::Toggle | FilterMode::Add, None) => {
                group.entries.push(entry);
                true
            }
            (FilterMode::Add, Some(_)) => false,
            (FilterMode::Replace, _) => {
                let same = group.entries.len() == 1 && existing == Some(0);
                group.entries = vec![entry];
                !same
            }
        };

        if group.entries.is_empty() {
            self.groups.remove(key);
        }
        if changed {
            self.revision += 1;
        }
        changed
    }
}
