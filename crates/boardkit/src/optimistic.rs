//! Optimistic mutation coordinator
//!
//! Every user mutation is a small state machine `Pending -> Committed |
//! RolledBack`. The patch is applied to the cache synchronously in
//! [`MutationCoordinator::begin`], together with a snapshot of the fields it
//! overwrote. Rollback restores exactly those fields, so concurrent mutations
//! of other fields on the same record are untouched.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};

use boardkit_api::{ApiError, Row, Value};
use boardkit_core::Record;

use crate::cache::PageCache;
use crate::notifications::Notification;

pub type MutationId = u64;

const RESOLVED_LOG_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    /// Partial update of scalar/reference fields
    Fields(Row),
    /// Whole-list replacement of a relationship (e.g. assignees)
    Relationship {
        name: String,
        replacement: Vec<Value>,
    },
}

impl MutationKind {
    /// Field writes this mutation performs on the cached record.
    pub fn patch(&self) -> Vec<(String, Value)> {
        match self {
            MutationKind::Fields(row) => {
                let mut fields: Vec<_> = row.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                fields.sort_by(|a, b| a.0.cmp(&b.0));
                fields
            }
            MutationKind::Relationship { name, replacement } => {
                vec![(name.clone(), Value::Array(replacement.clone()))]
            }
        }
    }

    fn touches(&self, field: &str) -> bool {
        match self {
            MutationKind::Fields(row) => row.contains_key(field),
            MutationKind::Relationship { name, .. } => name == field,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MutationState {
    Pending,
    Committed,
    RolledBack,
}

/// Everything the remote side of a mutation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationTicket {
    pub id: MutationId,
    pub record_id: String,
    pub kind: MutationKind,
    /// Human-readable action name used in notifications
    pub action: String,
}

#[derive(Debug, Clone)]
struct PendingMutation {
    ticket: MutationTicket,
    /// Field values before this mutation's patch was applied; `None` for a
    /// field the record did not have
    snapshot: HashMap<String, Option<Value>>,
}

#[derive(Debug, Default)]
pub struct MutationCoordinator {
    next_id: MutationId,
    pending: BTreeMap<MutationId, PendingMutation>,
    resolved: VecDeque<(MutationId, MutationState)>,
}

impl MutationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending_for(&self, record_id: &str) -> bool {
        self.pending
            .values()
            .any(|m| m.ticket.record_id == record_id)
    }

    pub fn state(&self, id: MutationId) -> Option<MutationState> {
        if self.pending.contains_key(&id) {
            return Some(MutationState::Pending);
        }
        self.resolved
            .iter()
            .find(|(resolved, _)| *resolved == id)
            .map(|(_, state)| *state)
    }

    /// Apply the patch to the cached record and register the mutation.
    ///
    /// The patch is applied to a copy first so that a rejected field leaves
    /// the cache untouched.
    pub fn begin<R: Record>(
        &mut self,
        cache: &mut PageCache<R>,
        record_id: &str,
        kind: MutationKind,
        action: impl Into<String>,
    ) -> Result<MutationTicket, ApiError> {
        let current = cache.get(record_id).ok_or_else(|| ApiError::RecordNotFound {
            id: record_id.to_string(),
        })?;

        let mut patched = current.clone();
        let mut snapshot = HashMap::new();
        for (field, value) in kind.patch() {
            let previous = patched.field(&field);
            patched.set_field(&field, value)?;
            snapshot.insert(field, previous);
        }
        cache.upsert(patched);

        self.next_id += 1;
        let ticket = MutationTicket {
            id: self.next_id,
            record_id: record_id.to_string(),
            kind,
            action: action.into(),
        };
        self.pending.insert(
            ticket.id,
            PendingMutation {
                ticket: ticket.clone(),
                snapshot,
            },
        );
        tracing::debug!(mutation = ticket.id, record = record_id, "optimistic patch applied");
        Ok(ticket)
    }

    /// Mark a mutation as confirmed by the backend.
    ///
    /// When the backend returned the stored record it replaces the cached one,
    /// with the still-pending mutations re-applied on top. Otherwise the
    /// committed values become the rollback base of earlier pending mutations
    /// of the same fields.
    pub fn commit<R: Record>(
        &mut self,
        cache: &mut PageCache<R>,
        id: MutationId,
        server_record: Option<R>,
    ) -> Option<MutationState> {
        let mutation = self.pending.remove(&id)?;
        self.resolve(id, MutationState::Committed);

        match server_record {
            Some(mut record) => {
                if record.id() == mutation.ticket.record_id && cache.get(record.id()).is_some() {
                    self.rebase(&mut record);
                    cache.upsert(record);
                }
            }
            None => {
                let record_id = &mutation.ticket.record_id;
                for (field, value) in mutation.ticket.kind.patch() {
                    for earlier in self
                        .pending
                        .range_mut(..id)
                        .map(|(_, m)| m)
                        .filter(|m| &m.ticket.record_id == record_id)
                    {
                        if let Some(previous) = earlier.snapshot.get_mut(&field) {
                            *previous = Some(value.clone());
                        }
                    }
                }
            }
        }
        tracing::debug!(mutation = id, "mutation committed");
        Some(MutationState::Committed)
    }

    /// Revert a failed mutation and produce its error notification.
    ///
    /// Returns `None` when `id` is not pending, so a mutation is reported at
    /// most once.
    pub fn rollback<R: Record>(
        &mut self,
        cache: &mut PageCache<R>,
        id: MutationId,
        error: &ApiError,
    ) -> Option<Notification> {
        let mutation = self.pending.remove(&id)?;
        self.resolve(id, MutationState::RolledBack);
        let record_id = mutation.ticket.record_id.clone();

        let mut restore = Vec::new();
        for (field, previous) in mutation.snapshot {
            // A later pending mutation of the same field owns the visible value;
            // it inherits this snapshot as its own rollback base.
            let heir = self
                .pending
                .range_mut(id..)
                .map(|(_, m)| m)
                .find(|m| m.ticket.record_id == record_id && m.ticket.kind.touches(&field));
            match heir {
                Some(later) => {
                    later.snapshot.insert(field, previous);
                }
                None => restore.push((field, previous)),
            }
        }

        if !restore.is_empty() {
            let result = cache.update(&record_id, |record| {
                for (field, previous) in restore {
                    restore_field(record, &field, previous)?;
                }
                Ok(())
            });
            match result {
                Ok(true) => {}
                Ok(false) => tracing::debug!(record = %record_id, "rolled back record no longer cached"),
                Err(e) => tracing::warn!(record = %record_id, "rollback could not restore fields: {}", e),
            }
        }

        tracing::warn!(mutation = id, record = %record_id, "mutation rolled back: {}", error);
        Some(Notification::error(
            mutation.ticket.action.clone(),
            format!("Failed to {}: {}", mutation.ticket.action, error),
        ))
    }

    /// Undo every pending patch on `record`, leaving the last server state.
    pub fn strip<R: Record>(&self, record: &mut R) {
        let record_id = record.id().to_string();
        for mutation in self
            .pending
            .values()
            .rev()
            .filter(|m| m.ticket.record_id == record_id)
        {
            for (field, previous) in &mutation.snapshot {
                if let Err(e) = restore_field(record, field, previous.clone()) {
                    tracing::warn!("could not strip {} from {}: {}", field, record_id, e);
                }
            }
        }
    }

    /// Re-apply pending patches on top of a fresh server version of a record.
    ///
    /// Snapshots are re-captured from `record`, which becomes the new rollback
    /// base.
    pub fn rebase<R: Record>(&mut self, record: &mut R) {
        let record_id = record.id().to_string();
        for mutation in self
            .pending
            .values_mut()
            .filter(|m| m.ticket.record_id == record_id)
        {
            for (field, value) in mutation.ticket.kind.patch() {
                let previous = record.field(&field);
                if let Err(e) = record.set_field(&field, value) {
                    tracing::warn!("could not rebase {} on {}: {}", field, record_id, e);
                    continue;
                }
                mutation.snapshot.insert(field, previous);
            }
        }
    }

    /// Forget every pending mutation of a record removed from the backend.
    pub fn discard_record(&mut self, record_id: &str) {
        let ids: Vec<MutationId> = self
            .pending
            .iter()
            .filter(|(_, m)| m.ticket.record_id == record_id)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.pending.remove(&id);
            self.resolve(id, MutationState::RolledBack);
        }
    }

    fn resolve(&mut self, id: MutationId, state: MutationState) {
        if self.resolved.len() == RESOLVED_LOG_CAPACITY {
            self.resolved.pop_front();
        }
        self.resolved.push_back((id, state));
    }
}

fn restore_field<R: Record>(
    record: &mut R,
    field: &str,
    previous: Option<Value>,
) -> Result<(), ApiError> {
    match previous {
        Some(value) => record.set_field(field, value),
        None => record.clear_field(field),
    }
}
