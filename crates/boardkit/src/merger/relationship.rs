//! Join-table events as relationship changes
//!
//! A row inserted into or deleted from a join table (e.g. order assignations)
//! is translated into an upsert or removal of one member in the owning
//! primary record's relationship list.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use boardkit_api::{ChangeEvent, ChangeOperation, Value};

use crate::config::JoinTableConfig;

/// Change of one member in a primary record's relationship list.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberChange {
    /// Insert or replace the member (matched by its key)
    Upsert(Value),
    Remove(String),
}

/// A join-table event expressed against its owning primary record.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipChange {
    pub owner_id: String,
    pub relationship: String,
    pub change: MemberChange,
}

impl RelationshipChange {
    /// Apply to the current relationship list, keeping member order.
    pub fn apply_to(&self, current: Option<Value>) -> Value {
        let mut members = match current {
            Some(Value::Array(members)) => members,
            _ => Vec::new(),
        };
        match &self.change {
            MemberChange::Upsert(member) => {
                let key = member.as_key();
                match members.iter().position(|m| m.as_key() == key) {
                    Some(pos) => members[pos] = member.clone(),
                    None => members.push(member.clone()),
                }
            }
            MemberChange::Remove(key) => {
                members.retain(|m| m.as_key().as_deref() != Some(key.as_str()));
            }
        }
        Value::Array(members)
    }
}

/// Translates events of one join table into relationship changes.
pub trait JoinTableTranslator: Send + Sync {
    /// `None` when the event cannot be attributed to an owner.
    fn translate(&self, event: &ChangeEvent) -> Option<RelationshipChange>;
}

/// Shared lookup of related entities by id (e.g. agency members), used to
/// enrich a bare join row into a full member object.
#[derive(Debug, Clone, Default)]
pub struct MemberDirectory {
    members: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemberDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_members(members: impl IntoIterator<Item = Value>) -> Self {
        let directory = Self::new();
        for member in members {
            directory.insert(member);
        }
        directory
    }

    /// Add or replace a member object; members without an `id` are ignored.
    pub fn insert(&self, member: Value) {
        let Some(id) = member.as_key() else {
            return;
        };
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, member);
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

/// Declarative join-table mapping: `owner_column` names the primary record,
/// `member_column` the related entity placed into `relationship`.
#[derive(Debug, Clone)]
pub struct RelationshipLink {
    relationship: String,
    owner_column: String,
    member_column: String,
    directory: MemberDirectory,
}

impl RelationshipLink {
    pub fn new(
        relationship: impl Into<String>,
        owner_column: impl Into<String>,
        member_column: impl Into<String>,
    ) -> Self {
        Self {
            relationship: relationship.into(),
            owner_column: owner_column.into(),
            member_column: member_column.into(),
            directory: MemberDirectory::new(),
        }
    }

    pub fn from_config(config: &JoinTableConfig, directory: MemberDirectory) -> Self {
        Self::new(
            config.relationship.clone(),
            config.owner_column.clone(),
            config.member_column.clone(),
        )
        .with_directory(directory)
    }

    pub fn with_directory(mut self, directory: MemberDirectory) -> Self {
        self.directory = directory;
        self
    }

    fn member(&self, member_id: &str) -> Value {
        self.directory.get(member_id).unwrap_or_else(|| {
            Value::Object(
                [("id".to_string(), Value::String(member_id.to_string()))]
                    .into_iter()
                    .collect(),
            )
        })
    }
}

impl JoinTableTranslator for RelationshipLink {
    fn translate(&self, event: &ChangeEvent) -> Option<RelationshipChange> {
        let owner_id = event.column_key(&self.owner_column)?;
        let member_id = event.column_key(&self.member_column)?;
        let change = match event.operation {
            ChangeOperation::Insert | ChangeOperation::Update => {
                MemberChange::Upsert(self.member(&member_id))
            }
            ChangeOperation::Delete => MemberChange::Remove(member_id),
        };
        Some(RelationshipChange {
            owner_id,
            relationship: self.relationship.clone(),
            change,
        })
    }
}
