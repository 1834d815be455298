//! Capability traits at the controller's seams
//!
//! The controller is generic over any record type that can report its id and
//! read/write individual fields. Remote collaborators (page fetching,
//! mutations, realtime subscriptions) are expressed as traits so that a real
//! backend and the in-memory fake are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use tokio::sync::mpsc;

use boardkit_api::{ApiError, ChangeEvent, PageParams, PageResult, Row, Value};

// Define MaybeSendSync trait alias for WASM compatibility
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSendSync: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync + ?Sized> MaybeSendSync for T {}

#[cfg(target_arch = "wasm32")]
pub trait MaybeSendSync {}
#[cfg(target_arch = "wasm32")]
impl<T: ?Sized> MaybeSendSync for T {}

/// Minimal capability every cached entity must provide.
pub trait Record: Clone + fmt::Debug + MaybeSendSync + 'static {
    /// Stable unique identifier
    fn id(&self) -> &str;

    /// Read a single field as a dynamic value. `None` for unknown fields.
    fn field(&self, name: &str) -> Option<Value>;

    /// Overwrite a single field.
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), ApiError>;

    /// Return a field to its absent state. Typed records have no notion of
    /// absence and store `Null`.
    fn clear_field(&mut self, name: &str) -> Result<(), ApiError> {
        self.set_field(name, Value::Null)
    }

    /// Build a record from a backend row (e.g. a realtime insert).
    fn from_row(row: &Row) -> Result<Self, ApiError>;

    /// Merge every column of `row` except `id` onto this record.
    ///
    /// Columns the record does not know are skipped so that a row carrying
    /// backend-only columns still merges.
    fn merge_row(&mut self, row: &Row) -> Result<(), ApiError> {
        for (column, value) in row {
            if column == "id" {
                continue;
            }
            match self.set_field(column, value.clone()) {
                Ok(()) => {}
                Err(ApiError::UnknownField { field }) => {
                    tracing::trace!("skipping unknown column {} on {}", field, self.id());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Records that can be indexed for free-text search.
pub trait Searchable: Record {
    /// Raw text fragments to index (titles, names, emails, ...).
    fn search_text(&self) -> Vec<String>;

    /// Dates that should match when the user types them in any supported
    /// locale format.
    fn search_dates(&self) -> Vec<DateTime<Utc>> {
        Vec::new()
    }
}

/// Fetch contract: one page of records for the given parameters.
///
/// Implementations must be idempotent and free of side effects.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait PageSource<R>: MaybeSendSync
where
    R: Record,
{
    async fn fetch_page(&self, params: PageParams) -> Result<PageResult<R>, ApiError>;
}

/// Mutate contract.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait RecordMutations<R>: MaybeSendSync
where
    R: Record,
{
    /// Apply a partial update. Backends that echo the stored record return it
    /// so the cache can reconcile with server-computed fields.
    async fn mutate(&self, id: &str, patch: Row) -> Result<Option<R>, ApiError>;

    /// Replace a whole relationship list (e.g. assignees) in one step.
    async fn mutate_relationship(
        &self,
        id: &str,
        relationship: &str,
        replacement: Vec<Value>,
    ) -> Result<(), ApiError>;
}

/// Subscribe contract: deliver change events for `tables` into `sink` until
/// the returned [`Subscription`] is dropped or unsubscribed.
pub trait ChangeFeed: MaybeSendSync {
    fn subscribe(
        &self,
        tables: &[String],
        sink: mpsc::Sender<ChangeEvent>,
    ) -> Result<Subscription, ApiError>;
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// Handle for an active change-feed subscription.
///
/// Cancels exactly once, either through [`Subscription::unsubscribe`] or on drop.
pub struct Subscription {
    cancel: Option<CancelFn>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription with nothing to release.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
