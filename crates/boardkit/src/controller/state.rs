//! Functional core of the controller
//!
//! `ListState` owns every piece of controller state and never performs I/O.
//! Each operation mutates the state synchronously and returns the
//! [`Effect`]s (fetches, remote mutations, preference writes) the caller has
//! to run. Results of those effects are fed back through
//! [`ListState::commit_fetch`] and [`ListState::complete_mutation`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;

use boardkit_api::{
    ApiError, ChangeEvent, PageAddress, PageParams, PageResult, QueryKey, Row, Value, ViewKind,
};
use boardkit_core::{Predicate, Record, Searchable};

use crate::cache::PageCache;
use crate::config::{ControllerConfig, ViewsConfig};
use crate::filter::{Debouncer, FilterEngine, FilterMode, FilterOptions, SEARCH_KEY, SearchIndex};
use crate::merger::{ChangeFeedMerger, MergeOutcome};
use crate::notifications::Notification;
use crate::optimistic::{MutationCoordinator, MutationId, MutationKind, MutationTicket};
use crate::pagination::PaginationState;
use crate::preferences::StoredPreferences;
use crate::view::{self, CalendarWindow, MemoKey, ViewMemo, ViewModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FetchMode {
    /// Page navigation: the result replaces the cached page
    Replace,
    /// Infinite scroll: the result is appended to the cached page
    Append,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Query key current when the request was issued
    pub key: QueryKey,
    pub params: PageParams,
    pub mode: FetchMode,
}

/// Work the caller must perform on behalf of the state.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Fetch(FetchRequest),
    Mutate(MutationTicket),
    Persist(StoredPreferences),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Committed,
    Failed,
    /// Issued for a query that is no longer current; discarded
    Stale,
}

/// Immutable view of the controller published to renderers.
#[derive(Debug, Clone)]
pub struct ViewSnapshot<R> {
    pub view: ViewKind,
    pub model: Arc<ViewModel>,
    /// Visible records (filters applied), in display order
    pub records: Vec<R>,
    pub pagination: PaginationState,
    pub filters: BTreeMap<String, Vec<String>>,
    pub search: Option<String>,
    pub loading: bool,
    pub loaded: bool,
    /// Set when the last fetch failed; the previous data stays visible
    pub load_error: Option<ApiError>,
    pub pending_mutations: usize,
    pub query_key: QueryKey,
}

impl<R> ViewSnapshot<R> {
    pub fn record_ids(&self) -> Vec<&str>
    where
        R: Record,
    {
        self.records.iter().map(|r| r.id()).collect()
    }
}

pub struct ListState<R> {
    scope: String,
    server_side_filtering: bool,
    views: ViewsConfig,
    view: ViewKind,
    calendar_window: CalendarWindow,
    pagination: PaginationState,
    cache: PageCache<R>,
    index: SearchIndex,
    filters: FilterEngine<R>,
    search_debounce: Debouncer<String>,
    mutations: MutationCoordinator,
    merger: ChangeFeedMerger<R>,
    query_key: QueryKey,
    loading: bool,
    persisted: StoredPreferences,
    memo: ViewMemo,
}

impl<R: Searchable> ListState<R> {
    pub fn new(
        config: &ControllerConfig,
        filters: FilterEngine<R>,
        merger: ChangeFeedMerger<R>,
    ) -> Self {
        let today = Utc::now().date_naive();
        let mut state = Self {
            scope: config.scope.clone(),
            server_side_filtering: config.server_side_filtering,
            views: config.views.clone(),
            view: config.view,
            calendar_window: CalendarWindow::month(today, today),
            pagination: PaginationState::new(config.rows_per_page),
            cache: PageCache::new(),
            index: SearchIndex::new(),
            filters,
            search_debounce: Debouncer::new(Duration::from_millis(config.search_debounce_ms)),
            mutations: MutationCoordinator::new(),
            merger,
            query_key: QueryKey::new(config.scope.clone(), config.view, PageParams::all()),
            loading: false,
            persisted: StoredPreferences::default(),
            memo: ViewMemo::new(),
        };
        state.query_key = state.compute_key();
        state.persisted = state.preferences();
        state
    }

    pub fn view(&self) -> ViewKind {
        self.view
    }

    pub fn pagination(&self) -> &PaginationState {
        &self.pagination
    }

    pub fn cache(&self) -> &PageCache<R> {
        &self.cache
    }

    pub fn filters(&self) -> &FilterEngine<R> {
        &self.filters
    }

    pub fn mutations(&self) -> &MutationCoordinator {
        &self.mutations
    }

    pub fn query_key(&self) -> &QueryKey {
        &self.query_key
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn calendar_window(&self) -> CalendarWindow {
        self.calendar_window
    }

    pub fn watched_tables(&self) -> Vec<String> {
        self.merger.watched_tables()
    }

    /// Apply stored preferences. Meant to be called before [`ListState::start`].
    pub fn restore(&mut self, prefs: &StoredPreferences) {
        if let Some(view) = prefs.view {
            self.view = view;
        }
        if let Some(rows) = prefs.rows_per_page {
            self.pagination.update_limit(rows);
        }
        self.filters.restore(&prefs.filters);
        self.query_key = self.compute_key();
        self.persisted = self.preferences();
    }

    pub fn preferences(&self) -> StoredPreferences {
        StoredPreferences {
            view: Some(self.view),
            rows_per_page: Some(self.pagination.limit()),
            filters: self.filters.persistent_values(),
        }
    }

    /// Show already available data for the current query before the first
    /// fetch resolves.
    pub fn seed(&mut self, page: PageResult<R>) {
        self.pagination.observe(&page);
        self.cache.replace(page.data);
        self.index = SearchIndex::build(self.cache.records());
    }

    /// Initial fetch.
    pub fn start(&mut self) -> Vec<Effect> {
        vec![self.fetch_current()]
    }

    pub fn refresh(&mut self) -> Vec<Effect> {
        vec![self.fetch_current()]
    }

    pub fn go_to_page(&mut self, page: u32) -> Vec<Effect> {
        if !self.view.is_paginated() || !self.pagination.go_to_page(page) {
            tracing::debug!(page, "go_to_page ignored");
            return Vec::new();
        }
        self.after_change()
    }

    pub fn update_limit(&mut self, limit: u32) -> Vec<Effect> {
        if !self.pagination.update_limit(limit) {
            tracing::debug!(limit, "update_limit ignored");
            return Vec::new();
        }
        self.after_change()
    }

    pub fn load_next_page(&mut self) -> Vec<Effect> {
        let Some(address) = self.pagination.next_address() else {
            tracing::debug!("load_next_page ignored: no further cursor page");
            return Vec::new();
        };
        self.loading = true;
        let mut params = self.query_key.params.clone();
        params.address = address;
        vec![Effect::Fetch(FetchRequest {
            key: self.query_key.clone(),
            params,
            mode: FetchMode::Append,
        })]
    }

    pub fn set_view(&mut self, view: ViewKind) -> Vec<Effect> {
        if view == self.view {
            return Vec::new();
        }
        self.view = view;
        self.pagination.reset();
        self.after_change()
    }

    pub fn set_calendar_window(&mut self, window: CalendarWindow) -> bool {
        if window == self.calendar_window {
            return false;
        }
        self.calendar_window = window;
        true
    }

    pub fn update_filter(
        &mut self,
        key: &str,
        mode: FilterMode,
        value: impl Into<String>,
        predicate: Arc<dyn Predicate<R>>,
        options: FilterOptions,
    ) -> Vec<Effect> {
        if !self.filters.update_filter(key, mode, value, predicate, options) {
            return Vec::new();
        }
        self.after_filter_change()
    }

    pub fn select(
        &mut self,
        key: &str,
        mode: FilterMode,
        value: &str,
        options: FilterOptions,
    ) -> Result<Vec<Effect>, ApiError> {
        if !self.filters.select(key, mode, value, options)? {
            return Ok(Vec::new());
        }
        Ok(self.after_filter_change())
    }

    pub fn remove_filter(&mut self, key: &str) -> Vec<Effect> {
        if !self.filters.remove_filter(key) {
            return Vec::new();
        }
        self.after_filter_change()
    }

    pub fn reset_filters(&mut self) -> Vec<Effect> {
        self.search_debounce.cancel();
        if !self.filters.reset_filters() {
            return Vec::new();
        }
        self.after_filter_change()
    }

    /// Register a keystroke; the term is installed once the input has been
    /// quiet for the debounce delay.
    pub fn type_search(&mut self, term: impl Into<String>, now: Instant) {
        self.search_debounce.push(term.into(), now);
    }

    pub fn search_deadline(&self) -> Option<Instant> {
        self.search_debounce.deadline()
    }

    /// Install the debounced term if its quiet period is over.
    pub fn flush_search(&mut self, now: Instant) -> Vec<Effect> {
        match self.search_debounce.take_ready(now) {
            Some(term) => self.search(&term),
            None => Vec::new(),
        }
    }

    /// Install `term` immediately. A blank term removes the search filter.
    pub fn search(&mut self, term: &str) -> Vec<Effect> {
        if !self.filters.set_search(term) {
            return Vec::new();
        }
        tracing::debug!(term, "search filter updated");
        self.after_filter_change()
    }

    /// Patch scalar fields optimistically and request the remote mutation.
    pub fn set_fields(
        &mut self,
        record_id: &str,
        patch: Row,
        action: impl Into<String>,
    ) -> Result<Vec<Effect>, ApiError> {
        self.begin_mutation(record_id, MutationKind::Fields(patch), action)
    }

    /// Replace a whole relationship list optimistically.
    pub fn replace_relationship(
        &mut self,
        record_id: &str,
        relationship: impl Into<String>,
        replacement: Vec<Value>,
        action: impl Into<String>,
    ) -> Result<Vec<Effect>, ApiError> {
        let kind = MutationKind::Relationship {
            name: relationship.into(),
            replacement,
        };
        self.begin_mutation(record_id, kind, action)
    }

    fn begin_mutation(
        &mut self,
        record_id: &str,
        kind: MutationKind,
        action: impl Into<String>,
    ) -> Result<Vec<Effect>, ApiError> {
        let ticket = self.mutations.begin(&mut self.cache, record_id, kind, action)?;
        self.reindex(record_id);
        Ok(vec![Effect::Mutate(ticket)])
    }

    /// Resolve a remote mutation. Returns the error notification of a
    /// rolled-back mutation.
    pub fn complete_mutation(
        &mut self,
        ticket: &MutationTicket,
        result: Result<Option<R>, ApiError>,
    ) -> Option<Notification> {
        let notification = match result {
            Ok(server_record) => {
                self.mutations.commit(&mut self.cache, ticket.id, server_record);
                None
            }
            Err(e) => self.mutations.rollback(&mut self.cache, ticket.id, &e),
        };
        self.reindex(&ticket.record_id);
        notification
    }

    pub fn mutation_pending(&self, id: MutationId) -> bool {
        self.mutations.state(id) == Some(crate::optimistic::MutationState::Pending)
    }

    /// Commit a fetch result if it still belongs to the current query.
    pub fn commit_fetch(
        &mut self,
        request: &FetchRequest,
        result: Result<PageResult<R>, ApiError>,
    ) -> FetchOutcome {
        if request.key != self.query_key {
            tracing::debug!(
                requested = ?request.params.address,
                current = ?self.query_key.params.address,
                "discarding stale page response"
            );
            return FetchOutcome::Stale;
        }
        if request.mode == FetchMode::Append {
            let expected = self.pagination.cursor().map(|cursor| PageAddress::Cursor {
                cursor: cursor.to_string(),
            });
            if expected.as_ref() != Some(&request.params.address) {
                tracing::debug!("discarding append for an outdated cursor");
                return FetchOutcome::Stale;
            }
        }
        self.loading = false;

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(scope = %self.scope, "page fetch failed: {}", e);
                self.cache.mark_error(e);
                return FetchOutcome::Failed;
            }
        };

        self.pagination.observe(&page);
        let mut records = page.data;
        for record in &mut records {
            if self.mutations.has_pending_for(record.id()) {
                self.mutations.rebase(record);
            }
        }
        match request.mode {
            FetchMode::Replace => {
                self.cache.replace(records);
                self.index = SearchIndex::build(self.cache.records());
            }
            FetchMode::Append => {
                for record in &records {
                    self.index.refresh(record);
                }
                self.cache.append(records);
            }
        }
        tracing::debug!(
            scope = %self.scope,
            records = self.cache.len(),
            page = self.pagination.current_page(),
            "page committed"
        );
        FetchOutcome::Committed
    }

    /// Merge one realtime event into the cached page.
    pub fn apply_change(&mut self, event: ChangeEvent) -> MergeOutcome {
        let outcome = self.merger.apply(event, &mut self.cache, &mut self.mutations);
        match &outcome {
            MergeOutcome::Removed(id) => self.index.remove(id),
            MergeOutcome::Ignored(reason) => tracing::debug!(?reason, "change event ignored"),
            other => {
                if let Some(id) = other.changed_id() {
                    let id = id.to_string();
                    self.reindex(&id);
                }
            }
        }
        outcome
    }

    /// Visible records: the cached page through the active filters.
    pub fn visible(&mut self) -> Vec<&R> {
        let positions = self.visible_positions();
        let records = self.cache.records();
        positions.iter().filter_map(|&i| records.get(i)).collect()
    }

    fn visible_positions(&mut self) -> Arc<[usize]> {
        let (cache, filters, index) = (&self.cache, &self.filters, &self.index);
        self.memo
            .visible_positions(cache.revision(), filters.revision(), || {
                filters.matching_positions(cache.records(), index)
            })
    }

    pub fn view_model(&mut self) -> Arc<ViewModel> {
        let key = MemoKey {
            cache_revision: self.cache.revision(),
            filter_revision: self.filters.revision(),
            view: self.view,
            window: (self.view == ViewKind::Calendar).then_some(self.calendar_window),
        };
        let positions = self.visible_positions();
        let records = self.cache.records();
        let (view, views, window) = (self.view, &self.views, self.calendar_window);
        self.memo.get_or_project(key, || {
            let visible: Vec<&R> = positions.iter().filter_map(|&i| records.get(i)).collect();
            view::project(view, &visible, views, window)
        })
    }

    pub fn memo(&self) -> &ViewMemo {
        &self.memo
    }

    pub fn snapshot(&mut self) -> ViewSnapshot<R> {
        let model = self.view_model();
        let records = self.visible().into_iter().cloned().collect();
        ViewSnapshot {
            view: self.view,
            model,
            records,
            pagination: self.pagination.clone(),
            filters: self.filters.active_values(),
            search: self.filters.search_term().map(str::to_string),
            loading: self.loading,
            loaded: self.cache.is_loaded(),
            load_error: self.cache.load_error().cloned(),
            pending_mutations: self.mutations.pending_count(),
            query_key: self.query_key.clone(),
        }
    }

    /// Effects of a change to filters: a new query when filters are sent to
    /// the server, and a preference write when persistent values changed.
    fn after_filter_change(&mut self) -> Vec<Effect> {
        if self.server_side_filtering {
            self.pagination.reset();
        }
        self.after_change()
    }

    fn after_change(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        let key = self.compute_key();
        if key != self.query_key {
            self.query_key = key;
            effects.push(self.fetch_current());
        }
        let prefs = self.preferences();
        if prefs != self.persisted {
            self.persisted = prefs.clone();
            effects.push(Effect::Persist(prefs));
        }
        effects
    }

    fn fetch_current(&mut self) -> Effect {
        self.loading = true;
        Effect::Fetch(FetchRequest {
            key: self.query_key.clone(),
            params: self.query_key.params.clone(),
            mode: FetchMode::Replace,
        })
    }

    fn compute_key(&self) -> QueryKey {
        let mut params = if self.view.is_paginated() {
            PageParams {
                address: self.pagination.address(),
                limit: Some(self.pagination.limit()),
                ..PageParams::all()
            }
        } else {
            PageParams::all()
        };
        if self.server_side_filtering {
            params.search = self.filters.search_term().map(str::to_string);
            params.filters = self.filters.active_values();
            params.filters.remove(SEARCH_KEY);
        }
        QueryKey::new(self.scope.clone(), self.view, params)
    }

    fn reindex(&mut self, id: &str) {
        match self.cache.get(id) {
            Some(record) => self.index.refresh(record),
            None => self.index.remove(id),
        }
    }
}
