//! Free-text search index
//!
//! Each record is indexed once per fetched page as a list of normalized
//! fragments; a term matches when any fragment contains it.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Locale, Utc};
use unicode_normalization::UnicodeNormalization;

use boardkit_core::Searchable;

/// Filter key under which the debounced search term is installed.
pub const SEARCH_KEY: &str = "search";

/// Lowercase, strip diacritics, drop everything but `[a-z0-9]` and whitespace.
pub fn normalize(input: &str) -> String {
    input
        .to_lowercase()
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect()
}

/// Textual forms a user might type for `date`, already normalized.
///
/// Numeric dates in US and Spanish order, short and long month names in
/// English and Spanish, and the year.
pub fn date_representations(date: DateTime<Utc>) -> Vec<String> {
    let forms = [
        format!("{}/{}/{}", date.month(), date.day(), date.year()),
        format!("{}/{}/{}", date.day(), date.month(), date.year()),
        date.format_localized("%b", Locale::en_US).to_string(),
        date.format_localized("%b", Locale::es_ES).to_string(),
        date.format_localized("%B", Locale::en_US).to_string(),
        date.format_localized("%B", Locale::es_ES).to_string(),
        date.year().to_string(),
    ];
    forms.iter().map(|f| normalize(f)).collect()
}

/// Normalized search fragments per record id.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    entries: HashMap<String, Vec<String>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<R: Searchable>(records: &[R]) -> Self {
        let mut index = Self::new();
        for record in records {
            index.refresh(record);
        }
        index
    }

    /// Re-index a single record after a realtime or optimistic change.
    pub fn refresh<R: Searchable>(&mut self, record: &R) {
        let mut fragments: Vec<String> = record
            .search_text()
            .iter()
            .map(|text| normalize(text))
            .filter(|text| !text.is_empty())
            .collect();
        for date in record.search_dates() {
            fragments.extend(date_representations(date));
        }
        self.entries.insert(record.id().to_string(), fragments);
    }

    pub fn remove(&mut self, id: &str) {
        self.entries.remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `term` must already be normalized. Unindexed ids never match.
    pub fn matches(&self, id: &str, term: &str) -> bool {
        self.entries
            .get(id)
            .is_some_and(|fragments| fragments.iter().any(|f| f.contains(term)))
    }
}
