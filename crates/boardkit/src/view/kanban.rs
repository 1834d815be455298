//! Kanban projection: records bucketed by the configured group field.

use serde::Serialize;
use std::collections::HashMap;

use boardkit_api::Value;
use boardkit_core::Record;

use crate::config::KanbanConfig;

const NO_VALUE_KEY: &str = "none";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanbanCard {
    pub id: String,
    pub title: String,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanbanColumn {
    pub key: String,
    pub name: String,
    pub position: i64,
    pub color: Option<String>,
    pub visible: bool,
    pub count: usize,
    pub cards: Vec<KanbanCard>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanbanBoard {
    pub group_by: String,
    pub columns: Vec<KanbanColumn>,
}

/// `in_progress` -> `In Progress`
pub fn format_display_name(value: &str) -> String {
    value
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bucket keys of a group value, with a display name for each.
///
/// Arrays of people (or any objects with an id) place the record in one
/// bucket per member. A value without any key lands in the `none` bucket.
fn group_keys(value: Option<Value>) -> Vec<(String, String)> {
    let keys = match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_key().map(|key| (key, member_name(item))))
            .collect(),
        Some(member @ Value::Object(_)) => member
            .as_key()
            .map(|key| vec![(key, member_name(&member))])
            .unwrap_or_default(),
        Some(Value::String(s)) if s.is_empty() => Vec::new(),
        Some(other) => other
            .as_key()
            .map(|key| {
                let name = format_display_name(&key);
                vec![(key, name)]
            })
            .unwrap_or_default(),
        None => Vec::new(),
    };
    if keys.is_empty() {
        return vec![(NO_VALUE_KEY.to_string(), "None".to_string())];
    }
    keys
}

fn member_name(member: &Value) -> String {
    match member {
        Value::Object(obj) => obj
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| member.as_key())
            .unwrap_or_default(),
        other => other.as_key().map(|k| format_display_name(&k)).unwrap_or_default(),
    }
}

struct Bucket {
    name: String,
    cards: Vec<KanbanCard>,
}

pub fn project_kanban<R: Record>(records: &[&R], config: &KanbanConfig) -> KanbanBoard {
    // discovered buckets in first-seen order
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Bucket> = HashMap::new();

    for record in records {
        let card = KanbanCard {
            id: record.id().to_string(),
            title: record
                .field(&config.title_field)
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            position: record.field("position").and_then(|v| v.as_i64()).unwrap_or(0),
        };
        for (key, name) in group_keys(record.field(&config.group_by)) {
            let bucket = buckets.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                Bucket {
                    name,
                    cards: Vec::new(),
                }
            });
            bucket.cards.push(card.clone());
        }
    }

    let mut columns = Vec::new();
    for group in &config.groups {
        let bucket = buckets.remove(&group.key);
        let cards = bucket.map(|b| b.cards).unwrap_or_default();
        columns.push(column(
            group.key.clone(),
            group.name.clone(),
            group.position,
            group.color.clone(),
            group.visible,
            cards,
        ));
    }

    let base = config.groups.iter().map(|g| g.position).max();
    let mut extra = 0i64;
    for key in order {
        let Some(bucket) = buckets.remove(&key) else {
            continue;
        };
        extra += 1;
        let position = match base {
            Some(max) => max + extra,
            None => extra,
        };
        columns.push(column(key, bucket.name, position, None, true, bucket.cards));
    }

    columns.sort_by_key(|c| c.position);
    KanbanBoard {
        group_by: config.group_by.clone(),
        columns,
    }
}

fn column(
    key: String,
    name: String,
    position: i64,
    color: Option<String>,
    visible: bool,
    mut cards: Vec<KanbanCard>,
) -> KanbanColumn {
    cards.sort_by_key(|c| c.position);
    KanbanColumn {
        key,
        name,
        position,
        color,
        visible,
        count: cards.len(),
        cards,
    }
}
