//! In-memory copy of the current page
//!
//! Owned by a single controller. Every write bumps `revision`, which the view
//! layer uses to decide whether projections must be recomputed.

use boardkit_api::ApiError;
use boardkit_core::Record;

/// Result of an upsert by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

#[derive(Debug, Clone)]
pub struct PageCache<R> {
    records: Vec<R>,
    revision: u64,
    loaded: bool,
    load_error: Option<ApiError>,
}

impl<R> Default for PageCache<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            revision: 0,
            loaded: false,
            load_error: None,
        }
    }
}

impl<R: Record> PageCache<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether any page has been committed yet.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn load_error(&self) -> Option<&ApiError> {
        self.load_error.as_ref()
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    /// Replace the page wholesale with a fresh fetch result.
    pub fn replace(&mut self, records: Vec<R>) {
        self.records = records;
        self.loaded = true;
        self.load_error = None;
        self.bump();
    }

    /// Append a continuation page. Records already cached are replaced in place.
    pub fn append(&mut self, records: Vec<R>) {
        for record in records {
            self.upsert_quiet(record);
        }
        self.load_error = None;
        self.bump();
    }

    /// Keep the data, remember the failure.
    pub fn mark_error(&mut self, error: ApiError) {
        self.load_error = Some(error);
        self.bump();
    }

    /// Insert or replace by id, preserving position of existing records.
    pub fn upsert(&mut self, record: R) -> Upsert {
        let outcome = self.upsert_quiet(record);
        self.bump();
        outcome
    }

    /// Mutate a cached record in place. `Ok(false)` when the id is not cached.
    pub fn update<F>(&mut self, id: &str, f: F) -> Result<bool, ApiError>
    where
        F: FnOnce(&mut R) -> Result<(), ApiError>,
    {
        let Some(record) = self.records.iter_mut().find(|r| r.id() == id) else {
            return Ok(false);
        };
        f(record)?;
        self.bump();
        Ok(true)
    }

    pub fn remove(&mut self, id: &str) -> Option<R> {
        let pos = self.position(id)?;
        let removed = self.records.remove(pos);
        self.bump();
        Some(removed)
    }

    fn upsert_quiet(&mut self, record: R) -> Upsert {
        match self.position(record.id()) {
            Some(pos) => {
                self.records[pos] = record;
                Upsert::Replaced
            }
            None => {
                self.records.push(record);
                Upsert::Inserted
            }
        }
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}
