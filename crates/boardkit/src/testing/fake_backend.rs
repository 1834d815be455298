//! In-memory backend implementing every remote seam of the controller
//!
//! Serves pages out of a `Vec` of records, applies mutations in place and
//! pushes the resulting change events to its subscribers. Gates and one-shot
//! failures let tests reorder responses and exercise rollbacks
//! deterministically.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use boardkit_api::{
    ApiError, ChangeEvent, ChangeOperation, PageAddress, PageParams, PageResult, Row, Value,
};
use boardkit_core::{ChangeFeed, PageSource, Record, RecordMutations, Searchable, Subscription};

use crate::context::{SessionContext, SessionTarget};
use crate::filter::{FilterEngine, SearchIndex};

/// How the fake answers paginated requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PagingMode {
    #[default]
    Offset,
    /// Opaque cursors; the cursor is the index of the next record
    Cursor,
}

/// Holds back responses until released. Dropping the gate releases it too.
#[derive(Debug)]
pub struct Gate {
    open: watch::Sender<bool>,
}

impl Gate {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (open, rx) = watch::channel(false);
        (Self { open }, rx)
    }

    pub fn release(self) {
        let _ = self.open.send(true);
    }
}

async fn pass(gate: Option<watch::Receiver<bool>>) {
    if let Some(mut gate) = gate {
        // Err means the gate was dropped, which also lets the call through
        let _ = gate.wait_for(|open| *open).await;
    }
}

struct Subscriber {
    id: u64,
    tables: Vec<String>,
    sink: mpsc::Sender<ChangeEvent>,
}

struct Inner<R> {
    records: Vec<R>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    page_gates: HashMap<u32, watch::Receiver<bool>>,
    mutation_gate: Option<watch::Receiver<bool>>,
    fail_fetch: Option<ApiError>,
    fail_mutation: Option<ApiError>,
    fetch_log: Vec<PageParams>,
}

pub struct FakeBackend<R> {
    session: SessionContext,
    table: String,
    paging: PagingMode,
    latency: Duration,
    filters: Option<FilterEngine<R>>,
    inner: Arc<Mutex<Inner<R>>>,
}

impl<R: Searchable> FakeBackend<R> {
    pub fn new(session: SessionContext, table: impl Into<String>) -> Self {
        Self {
            session,
            table: table.into(),
            paging: PagingMode::Offset,
            latency: Duration::ZERO,
            filters: None,
            inner: Arc::new(Mutex::new(Inner {
                records: Vec::new(),
                subscribers: Vec::new(),
                next_subscriber: 0,
                page_gates: HashMap::new(),
                mutation_gate: None,
                fail_fetch: None,
                fail_mutation: None,
                fetch_log: Vec::new(),
            })),
        }
    }

    pub fn with_records(self, records: Vec<R>) -> Self {
        self.lock().records = records;
        self
    }

    pub fn with_paging(mut self, paging: PagingMode) -> Self {
        self.paging = paging;
        self
    }

    /// Delay applied to every fetch and mutation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Evaluate filter and search parameters server side with the matchers
    /// of `filters`.
    pub fn with_filters(mut self, filters: FilterEngine<R>) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Hold every fetch of offset page `page` until the gate is released.
    pub fn hold_page(&self, page: u32) -> Gate {
        let (gate, rx) = Gate::new();
        self.lock().page_gates.insert(page, rx);
        gate
    }

    /// Hold every mutation until the gate is released.
    pub fn hold_mutations(&self) -> Gate {
        let (gate, rx) = Gate::new();
        self.lock().mutation_gate = Some(rx);
        gate
    }

    pub fn fail_next_fetch(&self, error: ApiError) {
        self.lock().fail_fetch = Some(error);
    }

    pub fn fail_next_mutation(&self, error: ApiError) {
        self.lock().fail_mutation = Some(error);
    }

    /// Parameters of every fetch received so far, in arrival order.
    pub fn fetch_log(&self) -> Vec<PageParams> {
        self.lock().fetch_log.clone()
    }

    pub fn records(&self) -> Vec<R> {
        self.lock().records.clone()
    }

    pub fn record(&self, id: &str) -> Option<R> {
        self.lock().records.iter().find(|r| r.id() == id).cloned()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Insert a row as a new record, generating an id when it has none, and
    /// notify subscribers.
    pub async fn insert(&self, mut row: Row) -> Result<R, ApiError> {
        if !row.get("id").is_some_and(|id| !id.is_null()) {
            row.insert(
                "id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        let record = R::from_row(&row)?;
        self.emit(ChangeEvent::insert(self.table.clone(), row)).await;
        Ok(record)
    }

    /// Apply `event` to the stored records (when it targets the primary
    /// table) and deliver it to every subscriber watching its table.
    pub async fn emit(&self, event: ChangeEvent) {
        let sinks = {
            let mut inner = self.lock();
            if event.table == self.table {
                if let Err(e) = apply_event(&mut inner.records, &event) {
                    tracing::warn!("fake backend could not apply {:?}: {}", event.operation, e);
                }
            }
            inner
                .subscribers
                .iter()
                .filter(|s| s.tables.contains(&event.table))
                .map(|s| s.sink.clone())
                .collect::<Vec<_>>()
        };
        for sink in sinks {
            let _ = sink.send(event.clone()).await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Records the session may see, in storage order.
    fn visible(&self, records: &[R]) -> Vec<R> {
        match self.session.target() {
            SessionTarget::Agency => records.to_vec(),
            SessionTarget::Client => records
                .iter()
                .filter(|r| {
                    r.field("client_organization")
                        .and_then(|v| v.as_key())
                        .is_some_and(|org| org == self.session.organization_id)
                })
                .cloned()
                .collect(),
        }
    }

    fn filtered(&self, records: Vec<R>, params: &PageParams) -> Vec<R> {
        let Some(template) = &self.filters else {
            return records;
        };
        if params.filters.is_empty() && params.search.is_none() {
            return records;
        }
        let mut engine = template.clone();
        engine.restore(&params.filters);
        if let Some(term) = &params.search {
            engine.set_search(term);
        }
        let index = SearchIndex::build(&records);
        engine.apply(&records, &index).into_iter().cloned().collect()
    }
}

fn apply_event<R: Record>(records: &mut Vec<R>, event: &ChangeEvent) -> Result<(), ApiError> {
    let id = event.record_id().ok_or_else(|| ApiError::Decode {
        message: "change event without id".to_string(),
    })?;
    match event.operation {
        ChangeOperation::Insert => {
            let record = R::from_row(&event.record)?;
            match records.iter_mut().find(|r| r.id() == id) {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
        }
        ChangeOperation::Update => {
            let record = records
                .iter_mut()
                .find(|r| r.id() == id)
                .ok_or(ApiError::RecordNotFound { id })?;
            record.merge_row(&event.record)?;
        }
        ChangeOperation::Delete => records.retain(|r| r.id() != id),
    }
    Ok(())
}

#[async_trait]
impl<R: Searchable> PageSource<R> for FakeBackend<R> {
    async fn fetch_page(&self, params: PageParams) -> Result<PageResult<R>, ApiError> {
        let gate = {
            let mut inner = self.lock();
            inner.fetch_log.push(params.clone());
            match &params.address {
                PageAddress::Offset { page } => inner.page_gates.get(page).cloned(),
                _ => None,
            }
        };
        self.delay().await;
        pass(gate).await;

        let (failure, records) = {
            let mut inner = self.lock();
            (inner.fail_fetch.take(), self.visible(&inner.records))
        };
        if let Some(error) = failure {
            return Err(error);
        }
        let records = self.filtered(records, &params);
        let limit = params.limit.unwrap_or(u32::MAX).max(1);

        match (&params.address, self.paging) {
            (PageAddress::All, _) => Ok(PageResult::unpaginated(records)),
            (PageAddress::Offset { page }, PagingMode::Offset) => {
                Ok(PageResult::paginate_local(records, *page, limit))
            }
            (PageAddress::Offset { page }, PagingMode::Cursor) => {
                let start = ((*page).max(1) - 1) as usize * limit as usize;
                Ok(cursor_page(records, start, limit))
            }
            (PageAddress::Cursor { cursor }, _) => {
                let start = cursor.parse::<usize>().map_err(|_| ApiError::InvalidValue {
                    field: "cursor".to_string(),
                    message: format!("unknown cursor '{}'", cursor),
                })?;
                Ok(cursor_page(records, start, limit))
            }
        }
    }
}

fn cursor_page<R>(records: Vec<R>, start: usize, limit: u32) -> PageResult<R> {
    let total = records.len();
    let end = start.saturating_add(limit as usize).min(total);
    let next_cursor = (end < total).then(|| end.to_string());
    let data = records.into_iter().skip(start).take(limit as usize).collect();
    PageResult::cursor(data, limit, next_cursor)
}

#[async_trait]
impl<R: Searchable> RecordMutations<R> for FakeBackend<R> {
    async fn mutate(&self, id: &str, patch: Row) -> Result<Option<R>, ApiError> {
        let gate = self.lock().mutation_gate.clone();
        self.delay().await;
        pass(gate).await;

        let stored = {
            let mut inner = self.lock();
            if let Some(error) = inner.fail_mutation.take() {
                return Err(error);
            }
            let record = inner
                .records
                .iter_mut()
                .find(|r| r.id() == id)
                .ok_or_else(|| ApiError::RecordNotFound { id: id.to_string() })?;
            record.merge_row(&patch)?;
            record.clone()
        };

        let mut row = patch;
        row.insert("id".to_string(), Value::String(id.to_string()));
        self.emit(ChangeEvent::update(self.table.clone(), row)).await;
        Ok(Some(stored))
    }

    async fn mutate_relationship(
        &self,
        id: &str,
        relationship: &str,
        replacement: Vec<Value>,
    ) -> Result<(), ApiError> {
        let mut patch = Row::new();
        patch.insert(relationship.to_string(), Value::Array(replacement));
        self.mutate(id, patch).await.map(|_| ())
    }
}

impl<R: Searchable> ChangeFeed for FakeBackend<R> {
    fn subscribe(
        &self,
        tables: &[String],
        sink: mpsc::Sender<ChangeEvent>,
    ) -> Result<Subscription, ApiError> {
        let id = {
            let mut inner = self.lock();
            let id = inner.next_subscriber;
            inner.next_subscriber += 1;
            inner.subscribers.push(Subscriber {
                id,
                tables: tables.to_vec(),
                sink,
            });
            id
        };
        tracing::debug!(id, ?tables, "fake backend subscriber added");

        let inner = Arc::clone(&self.inner);
        Ok(Subscription::new(move || {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.subscribers.retain(|s| s.id != id);
        }))
    }
}
