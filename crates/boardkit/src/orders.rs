//! Orders: the reference domain of the controller
//!
//! A typed [`Record`] for agency orders, the filter matchers behind the
//! orders filter bar, the open/completed status tabs and a ready-made
//! controller configuration.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use boardkit_api::{ApiError, Row, Value, ViewKind, row_to_json};
use boardkit_core::{FieldContains, FieldEquals, Predicate, Record, Searchable, predicate_fn};

use crate::config::{
    ColumnConfig, ControllerConfig, GroupConfig, JoinTableConfig, KanbanConfig, TableConfig,
    ViewsConfig,
};
use crate::context::{SessionContext, SessionTarget};
use crate::controller::ControllerHandle;
use crate::filter::{FilterEngine, FilterMode, FilterOptions};

pub const ORDERS_TABLE: &str = "orders_v2";
pub const ASSIGNATIONS_TABLE: &str = "order_assignations";

/// Status names that close an order.
const CLOSED_STATUSES: [&str; 3] = ["completed", "anulled", "annulled"];

const LIST_FIELDS: [&str; 2] = ["tags", "assigned_to"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_id: Option<i64>,
    #[serde(default)]
    pub priority: Option<String>,
    /// Ordering inside a kanban column
    #[serde(default)]
    pub position: Option<i64>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub assigned_to: Vec<Member>,
    #[serde(default)]
    pub client_organization: Option<Member>,
    #[serde(default)]
    pub customer: Option<Member>,
    #[serde(default)]
    pub brief_id: Option<String>,
}

impl Order {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            status: None,
            status_id: None,
            priority: None,
            position: None,
            due_date: None,
            created_at: None,
            tags: Vec::new(),
            assigned_to: Vec::new(),
            client_organization: None,
            customer: None,
            brief_id: None,
        }
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ApiError {
    ApiError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

fn text(field: &str, value: Value) -> Result<Option<String>, ApiError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(invalid(field, format!("expected text, got {:?}", other))),
    }
}

fn integer(field: &str, value: Value) -> Result<Option<i64>, ApiError> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(i)),
        other => Err(invalid(field, format!("expected an integer, got {:?}", other))),
    }
}

/// Nested objects (members, tags) go through their serde representation.
fn nested<T: DeserializeOwned + Default>(field: &str, value: Value) -> Result<T, ApiError> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.into()).map_err(|e| invalid(field, e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok().map(Value::from_json_value)
}

impl Record for Order {
    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::from(self.id.as_str())),
            "title" => Some(Value::from(self.title.as_str())),
            "description" => Some(self.description.clone().into()),
            "status" => Some(self.status.clone().into()),
            "status_id" => Some(self.status_id.into()),
            "priority" => Some(self.priority.clone().into()),
            "position" => Some(self.position.into()),
            "due_date" => Some(self.due_date.clone().into()),
            "created_at" => Some(self.created_at.clone().into()),
            "brief_id" => Some(self.brief_id.clone().into()),
            "tags" => encode(&self.tags),
            "assigned_to" => encode(&self.assigned_to),
            "client_organization" => encode(&self.client_organization),
            "customer" => encode(&self.customer),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), ApiError> {
        match name {
            "id" => return Err(invalid("id", "id is immutable")),
            "title" => self.title = text(name, value)?.unwrap_or_default(),
            "description" => self.description = text(name, value)?,
            "status" => self.status = text(name, value)?,
            "status_id" => self.status_id = integer(name, value)?,
            "priority" => self.priority = text(name, value)?,
            "position" => self.position = integer(name, value)?,
            "due_date" => self.due_date = text(name, value)?,
            "created_at" => self.created_at = text(name, value)?,
            "brief_id" => self.brief_id = text(name, value)?,
            "tags" => self.tags = nested(name, value)?,
            "assigned_to" => self.assigned_to = nested(name, value)?,
            "client_organization" => self.client_organization = nested(name, value)?,
            "customer" => self.customer = nested(name, value)?,
            _ => {
                return Err(ApiError::UnknownField {
                    field: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn from_row(row: &Row) -> Result<Self, ApiError> {
        let id = row
            .get("id")
            .and_then(Value::as_key)
            .ok_or_else(|| ApiError::Decode {
                message: "order row has no id".to_string(),
            })?;
        let mut json = row_to_json(row);
        if let serde_json::Value::Object(map) = &mut json {
            map.insert("id".to_string(), serde_json::Value::String(id));
            for field in LIST_FIELDS {
                if map.get(field).is_some_and(serde_json::Value::is_null) {
                    map.remove(field);
                }
            }
        }
        serde_json::from_value(json).map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })
    }
}

impl Searchable for Order {
    fn search_text(&self) -> Vec<String> {
        let mut text = vec![self.id.clone(), self.title.clone()];
        text.extend(self.status.clone());
        text.extend(self.priority.clone());
        text.extend(self.tags.iter().map(|t| t.name.clone()));
        for member in self
            .assigned_to
            .iter()
            .chain(self.customer.iter())
            .chain(self.client_organization.iter())
        {
            text.push(member.name.clone());
            text.extend(member.email.clone());
        }
        text
    }

    fn search_dates(&self) -> Vec<DateTime<Utc>> {
        [&self.due_date, &self.created_at]
            .into_iter()
            .flatten()
            .filter_map(|raw| Value::String(raw.clone()).as_datetime())
            .collect()
    }
}

fn status_is(status: &'static str) -> impl Predicate<Order> {
    FieldEquals::new("status", status)
}

/// Predicate for a status filter value: a status id, a status name, or
/// one of the tab values `open` / `completed`.
fn status_predicate(value: &str) -> Arc<dyn Predicate<Order>> {
    match value {
        "open" => {
            let [completed, misspelled, annulled] = CLOSED_STATUSES;
            status_is(completed)
                .or(status_is(misspelled))
                .or(status_is(annulled))
                .not()
                .boxed()
        }
        "completed" => status_is("completed").boxed(),
        _ => {
            let value = value.to_string();
            predicate_fn(move |order: &Order| {
                order.status_id.map(|id| id.to_string()).as_deref() == Some(value.as_str())
                    || order.status.as_deref() == Some(value.as_str())
            })
            .boxed()
        }
    }
}

/// Filter engine with a matcher for every key of the orders filter bar.
pub fn order_filters() -> FilterEngine<Order> {
    let mut engine = FilterEngine::new();
    engine.register_matcher("status", status_predicate);
    engine.register_matcher("priority", |value: &str| -> Arc<dyn Predicate<Order>> {
        Arc::new(FieldEquals::new("priority", value))
    });
    for key in ["tags", "assigned_to", "client_organization", "customer"] {
        engine.register_matcher(key, move |value: &str| -> Arc<dyn Predicate<Order>> {
            Arc::new(FieldContains::new(key, value))
        });
    }
    engine
}

/// Tabs above the orders list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTab {
    Open,
    Completed,
    All,
}

impl StatusTab {
    pub fn filter_value(self) -> Option<&'static str> {
        match self {
            StatusTab::Open => Some("open"),
            StatusTab::Completed => Some("completed"),
            StatusTab::All => None,
        }
    }

    /// Install the tab's status filter, replacing any status selection.
    pub async fn apply(self, handle: &ControllerHandle<Order>) -> Result<(), ApiError> {
        match self.filter_value() {
            Some(value) => {
                handle
                    .select("status", FilterMode::Replace, value, FilterOptions::default())
                    .await
            }
            None => handle.remove_filter("status").await,
        }
    }
}

fn group(key: &str, name: &str, position: i64, color: &str) -> GroupConfig {
    GroupConfig {
        key: key.to_string(),
        name: name.to_string(),
        position,
        color: Some(color.to_string()),
        visible: true,
    }
}

fn column(field: &str, label: &str) -> ColumnConfig {
    ColumnConfig {
        field: field.to_string(),
        label: label.to_string(),
    }
}

/// Controller configuration for the orders list of `session`.
pub fn orders_config(session: &SessionContext) -> ControllerConfig {
    let mut config = ControllerConfig::new(session.scope("orders"), ORDERS_TABLE);
    config.view = ViewKind::Table;
    config.join_tables = vec![JoinTableConfig {
        table: ASSIGNATIONS_TABLE.to_string(),
        relationship: "assigned_to".to_string(),
        owner_column: "order_id".to_string(),
        member_column: "agency_member_id".to_string(),
    }];
    let mut columns = vec![
        column("id", "ID"),
        column("title", "Title"),
        column("status", "Status"),
        column("priority", "Priority"),
        column("due_date", "Due date"),
    ];
    if session.target() == SessionTarget::Agency {
        columns.insert(2, column("client_organization", "Client"));
    }
    config.views = ViewsConfig {
        table: TableConfig { columns },
        kanban: KanbanConfig {
            groups: vec![
                group("pending", "Pending", 0, "#fef3c7"),
                group("in_progress", "In Progress", 1, "#dbeafe"),
                group("in_review", "In Review", 2, "#ede9fe"),
                group("completed", "Completed", 3, "#dcfce7"),
            ],
            ..KanbanConfig::default()
        },
        ..ViewsConfig::default()
    };
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::SearchIndex;

    fn order(id: &str, status: &str, priority: &str) -> Order {
        Order {
            status: Some(status.to_string()),
            priority: Some(priority.to_string()),
            ..Order::new(id, format!("Order {}", id))
        }
    }

    #[test]
    fn test_field_roundtrip_and_unknown_field() {
        let mut o = order("1", "pending", "low");
        o.set_field("priority", Value::from("high")).unwrap();
        assert_eq!(o.priority.as_deref(), Some("high"));
        assert_eq!(o.field("priority"), Some(Value::from("high")));

        assert!(matches!(
            o.set_field("nonsense", Value::from(1)),
            Err(ApiError::UnknownField { .. })
        ));
        assert!(matches!(
            o.set_field("status_id", Value::from("not a number")),
            Err(ApiError::InvalidValue { .. })
        ));
        // rejected writes leave the record unchanged
        assert_eq!(o.status_id, None);

        o.set_field("assigned_to", Value::Null).unwrap();
        assert!(o.assigned_to.is_empty());
    }

    #[test]
    fn test_nested_fields_read_and_write() {
        let mut o = order("1", "pending", "low");
        let member = Value::Object(
            [
                ("id".to_string(), Value::from("u-2")),
                ("name".to_string(), Value::from("Grace")),
            ]
            .into_iter()
            .collect(),
        );
        o.set_field("assigned_to", Value::Array(vec![member.clone()]))
            .unwrap();
        assert_eq!(o.assigned_to[0].name, "Grace");
        assert_eq!(o.field("assigned_to"), Some(Value::Array(vec![member])));

        o.set_field("customer", Value::from("not an object"))
            .unwrap_err();
        assert_eq!(o.customer, None);

        assert_eq!(o.field("due_date"), Some(Value::Null));
        assert_eq!(o.field("status_id"), Some(Value::Null));
        o.set_field("position", Value::Integer(4)).unwrap();
        assert_eq!(o.field("position"), Some(Value::Integer(4)));
        assert_eq!(o.field("updated_at"), None);
    }

    #[test]
    fn test_from_row_accepts_numeric_id_and_extra_columns() {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Integer(42));
        row.insert("title".to_string(), Value::from("Logo"));
        row.insert("agency_id".to_string(), Value::from("a-1"));
        row.insert("tags".to_string(), Value::Null);
        let o = Order::from_row(&row).unwrap();
        assert_eq!(o.id, "42");
        assert_eq!(o.title, "Logo");
    }

    #[test]
    fn test_merge_row_keeps_relationships() {
        let mut o = order("1", "pending", "low");
        o.assigned_to.push(Member {
            id: "u-1".into(),
            name: "Ada".into(),
            email: None,
            picture_url: None,
        });
        let mut row = Row::new();
        row.insert("id".to_string(), Value::from("1"));
        row.insert("status".to_string(), Value::from("completed"));
        row.insert("updated_at".to_string(), Value::from("2024-01-01"));
        o.merge_row(&row).unwrap();
        assert_eq!(o.status.as_deref(), Some("completed"));
        assert_eq!(o.assigned_to.len(), 1);
    }

    #[test]
    fn test_status_tabs_and_matchers() {
        let mut engine = order_filters();
        let orders = vec![
            order("1", "pending", "low"),
            order("2", "completed", "high"),
            order("3", "anulled", "high"),
        ];
        let index = SearchIndex::build(&orders);

        engine
            .select("status", FilterMode::Replace, "open", FilterOptions::default())
            .unwrap();
        let ids: Vec<&str> = engine.apply(&orders, &index).iter().map(|o| o.id()).collect();
        assert_eq!(ids, vec!["1"]);

        engine
            .select("status", FilterMode::Replace, "completed", FilterOptions::default())
            .unwrap();
        engine
            .select("priority", FilterMode::Toggle, "high", FilterOptions::default())
            .unwrap();
        let ids: Vec<&str> = engine.apply(&orders, &index).iter().map(|o| o.id()).collect();
        assert_eq!(ids, vec!["2"]);
    }

    #[test]
    fn test_assignee_matcher() {
        let mut engine = order_filters();
        let mut assigned = order("1", "pending", "low");
        assigned.assigned_to.push(Member {
            id: "u-7".into(),
            name: "Grace".into(),
            email: Some("grace@example.com".into()),
            picture_url: None,
        });
        let orders = vec![assigned, order("2", "pending", "low")];
        let index = SearchIndex::build(&orders);
        engine
            .select("assigned_to", FilterMode::Toggle, "u-7", FilterOptions::default())
            .unwrap();
        assert_eq!(engine.apply(&orders, &index).len(), 1);

        engine.remove_filter("assigned_to");
        engine.set_search("GRACE@example");
        assert_eq!(engine.apply(&orders, &index)[0].id(), "1");
    }

    #[test]
    fn test_orders_config_for_session() {
        let session = SessionContext::new("org-1", "user-1", "agency_owner");
        let config = orders_config(&session);
        assert_eq!(config.primary_table, ORDERS_TABLE);
        assert_eq!(config.watched_tables().len(), 2);
        assert!(config.views.table.columns.iter().any(|c| c.field == "client_organization"));

        let client = SessionContext::new("org-2", "user-2", "client_member");
        assert!(!orders_config(&client)
            .views
            .table
            .columns
            .iter()
            .any(|c| c.field == "client_organization"));
    }
}
