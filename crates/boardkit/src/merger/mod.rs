//! Change-feed merger
//!
//! Applies realtime change events to the cached page in arrival order. Events
//! for the primary table upsert/remove records by id; events for registered
//! join tables are translated into relationship updates of the owning record.
//! The merger never triggers a refetch.

#[cfg(test)]
mod merger_pbt;
pub mod relationship;

use std::collections::HashMap;
use std::marker::PhantomData;

use boardkit_api::{ChangeEvent, ChangeOperation};
use boardkit_core::Record;

use crate::cache::{PageCache, Upsert};
use crate::config::ControllerConfig;
use crate::optimistic::MutationCoordinator;

pub use relationship::{
    JoinTableTranslator, MemberChange, MemberDirectory, RelationshipChange, RelationshipLink,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted(String),
    Updated(String),
    Removed(String),
    RelationshipUpdated(String),
    Ignored(IgnoreReason),
}

impl MergeOutcome {
    /// Id of the record whose cached copy changed, if any.
    pub fn changed_id(&self) -> Option<&str> {
        match self {
            MergeOutcome::Inserted(id)
            | MergeOutcome::Updated(id)
            | MergeOutcome::RelationshipUpdated(id) => Some(id),
            MergeOutcome::Removed(_) | MergeOutcome::Ignored(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownTable(String),
    MissingId,
    /// Record not in the loaded page (e.g. another page or filtered out)
    NotCached(String),
    Untranslatable(String),
    Invalid(String),
}

pub struct ChangeFeedMerger<R> {
    primary_table: String,
    translators: HashMap<String, Box<dyn JoinTableTranslator>>,
    _phantom: PhantomData<fn(&R)>,
}

impl<R: Record> ChangeFeedMerger<R> {
    pub fn new(primary_table: impl Into<String>) -> Self {
        Self {
            primary_table: primary_table.into(),
            translators: HashMap::new(),
            _phantom: PhantomData,
        }
    }

    /// Merger for `config`, with every configured join table mapped through
    /// a [`RelationshipLink`] sharing `directory`.
    pub fn from_config(config: &ControllerConfig, directory: MemberDirectory) -> Self {
        let mut merger = Self::new(config.primary_table.clone());
        for join in &config.join_tables {
            merger.register_join_table(
                join.table.clone(),
                RelationshipLink::from_config(join, directory.clone()),
            );
        }
        merger
    }

    pub fn register_join_table(
        &mut self,
        table: impl Into<String>,
        translator: impl JoinTableTranslator + 'static,
    ) {
        self.translators.insert(table.into(), Box::new(translator));
    }

    pub fn primary_table(&self) -> &str {
        &self.primary_table
    }

    pub fn watched_tables(&self) -> Vec<String> {
        let mut tables = vec![self.primary_table.clone()];
        let mut joins: Vec<String> = self.translators.keys().cloned().collect();
        joins.sort();
        tables.extend(joins);
        tables
    }

    /// Apply one event. Pending optimistic patches stay on top of whatever
    /// server state the event brings.
    pub fn apply(
        &self,
        event: ChangeEvent,
        cache: &mut PageCache<R>,
        pending: &mut MutationCoordinator,
    ) -> MergeOutcome {
        if event.table == self.primary_table {
            return self.apply_primary(event, cache, pending);
        }
        match self.translators.get(&event.table) {
            Some(translator) => match translator.translate(&event) {
                Some(change) => Self::apply_relationship(change, cache, pending),
                None => MergeOutcome::Ignored(IgnoreReason::Untranslatable(event.table)),
            },
            None => MergeOutcome::Ignored(IgnoreReason::UnknownTable(event.table)),
        }
    }

    fn apply_primary(
        &self,
        event: ChangeEvent,
        cache: &mut PageCache<R>,
        pending: &mut MutationCoordinator,
    ) -> MergeOutcome {
        let Some(id) = event.record_id() else {
            return MergeOutcome::Ignored(IgnoreReason::MissingId);
        };

        match event.operation {
            ChangeOperation::Delete => match cache.remove(&id) {
                Some(_) => {
                    pending.discard_record(&id);
                    MergeOutcome::Removed(id)
                }
                None => MergeOutcome::Ignored(IgnoreReason::NotCached(id)),
            },
            ChangeOperation::Insert | ChangeOperation::Update => {
                if let Some(cached) = cache.get(&id) {
                    let mut merged = cached.clone();
                    pending.strip(&mut merged);
                    if let Err(e) = merged.merge_row(&event.record) {
                        return MergeOutcome::Ignored(IgnoreReason::Invalid(e.to_string()));
                    }
                    pending.rebase(&mut merged);
                    cache.upsert(merged);
                    return MergeOutcome::Updated(id);
                }
                if event.operation == ChangeOperation::Update {
                    return MergeOutcome::Ignored(IgnoreReason::NotCached(id));
                }
                match R::from_row(&event.record) {
                    Ok(record) => match cache.upsert(record) {
                        Upsert::Inserted => MergeOutcome::Inserted(id),
                        Upsert::Replaced => MergeOutcome::Updated(id),
                    },
                    Err(e) => MergeOutcome::Ignored(IgnoreReason::Invalid(e.to_string())),
                }
            }
        }
    }

    fn apply_relationship(
        change: RelationshipChange,
        cache: &mut PageCache<R>,
        pending: &mut MutationCoordinator,
    ) -> MergeOutcome {
        let Some(cached) = cache.get(&change.owner_id) else {
            return MergeOutcome::Ignored(IgnoreReason::NotCached(change.owner_id));
        };
        let mut merged = cached.clone();
        pending.strip(&mut merged);
        let list = change.apply_to(merged.field(&change.relationship));
        if let Err(e) = merged.set_field(&change.relationship, list) {
            return MergeOutcome::Ignored(IgnoreReason::Invalid(e.to_string()));
        }
        pending.rebase(&mut merged);
        cache.upsert(merged);
        MergeOutcome::RelationshipUpdated(change.owner_id)
    }
}
