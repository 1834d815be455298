use std::collections::HashMap;

use boardkit_api::{ApiError, Row, Value};

use crate::traits::{Record, Searchable};

/// Schemaless record: an id plus arbitrary columns.
///
/// Lets the generic machinery run over entity kinds that have no dedicated
/// Rust type (briefs, invoices, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicRecord {
    id: String,
    fields: HashMap<String, Value>,
}

impl DynamicRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }
}

impl Record for DynamicRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, name: &str) -> Option<Value> {
        if name == "id" {
            return Some(Value::String(self.id.clone()));
        }
        self.fields.get(name).cloned()
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), ApiError> {
        if name == "id" {
            return Err(ApiError::InvalidValue {
                field: "id".to_string(),
                message: "id is immutable".to_string(),
            });
        }
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    fn clear_field(&mut self, name: &str) -> Result<(), ApiError> {
        self.fields.remove(name);
        Ok(())
    }

    fn from_row(row: &Row) -> Result<Self, ApiError> {
        let id = row
            .get("id")
            .and_then(Value::as_key)
            .ok_or_else(|| ApiError::Decode {
                message: "row has no id column".to_string(),
            })?;
        let fields = row
            .iter()
            .filter(|(k, _)| k.as_str() != "id")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Self { id, fields })
    }
}

impl Searchable for DynamicRecord {
    fn search_text(&self) -> Vec<String> {
        let mut text = vec![self.id.clone()];
        for value in self.fields.values() {
            collect_text(value, &mut text);
        }
        text
    }
}

fn collect_text(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Integer(i) => out.push(i.to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_text(v, out)),
        Value::Object(obj) => obj.values().for_each(|v| collect_text(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_row_and_merge() {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Integer(9));
        row.insert("title".to_string(), Value::from("Logo"));
        let mut record = DynamicRecord::from_row(&row).unwrap();
        assert_eq!(record.id(), "9");
        assert_eq!(record.field("title"), Some(Value::from("Logo")));

        let mut patch = Row::new();
        patch.insert("id".to_string(), Value::Integer(9));
        patch.insert("title".to_string(), Value::from("Logo v2"));
        record.merge_row(&patch).unwrap();
        assert_eq!(record.field("title"), Some(Value::from("Logo v2")));
    }

    #[test]
    fn test_clear_field_removes_column() {
        let mut record = DynamicRecord::new("1").with("due_date", "2024-05-01");
        record.clear_field("due_date").unwrap();
        assert_eq!(record.field("due_date"), None);
        assert!(record.fields().is_empty());
    }

    #[test]
    fn test_from_row_requires_id() {
        assert!(matches!(
            DynamicRecord::from_row(&Row::new()),
            Err(ApiError::Decode { .. })
        ));
    }

    #[test]
    fn test_search_text_flattens_nested_values() {
        let record = DynamicRecord::new("3").with(
            "customer",
            Value::Object([("name".to_string(), Value::from("Ana"))].into_iter().collect()),
        );
        let text = record.search_text();
        assert!(text.contains(&"Ana".to_string()));
        assert!(text.contains(&"3".to_string()));
    }
}
