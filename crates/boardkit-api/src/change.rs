//! Row-level change notifications pushed by the realtime feed.

use serde::{Deserialize, Serialize};

use crate::{Row, Value};

/// Kind of row change reported by the realtime feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// A single change event `{table, operation, record}`.
///
/// Created by the change feed, consumed exactly once by the merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub operation: ChangeOperation,
    pub record: Row,
}

impl ChangeEvent {
    pub fn new(table: impl Into<String>, operation: ChangeOperation, record: Row) -> Self {
        Self {
            table: table.into(),
            operation,
            record,
        }
    }

    pub fn insert(table: impl Into<String>, record: Row) -> Self {
        Self::new(table, ChangeOperation::Insert, record)
    }

    pub fn update(table: impl Into<String>, record: Row) -> Self {
        Self::new(table, ChangeOperation::Update, record)
    }

    pub fn delete(table: impl Into<String>, record: Row) -> Self {
        Self::new(table, ChangeOperation::Delete, record)
    }

    /// The `id` column of the changed row, if present.
    pub fn record_id(&self) -> Option<String> {
        self.column_key("id")
    }

    /// Key form of an arbitrary column, used by join-table translators.
    pub fn column_key(&self, column: &str) -> Option<String> {
        self.record.get(column).and_then(Value::as_key)
    }
}
