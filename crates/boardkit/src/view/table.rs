use serde::Serialize;

use boardkit_api::Value;
use boardkit_core::Record;

use crate::config::ColumnConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDef {
    pub field: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub id: String,
    /// One cell per column, in column order; `Null` for missing fields
    pub cells: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<TableRow>,
}

pub fn project_table<R: Record>(records: &[&R], columns: &[ColumnConfig]) -> TableView {
    let columns: Vec<ColumnDef> = if columns.is_empty() {
        vec![ColumnDef {
            field: "id".to_string(),
            label: "ID".to_string(),
        }]
    } else {
        columns
            .iter()
            .map(|c| ColumnDef {
                field: c.field.clone(),
                label: c.label.clone(),
            })
            .collect()
    };

    let rows = records
        .iter()
        .map(|record| TableRow {
            id: record.id().to_string(),
            cells: columns
                .iter()
                .map(|c| record.field(&c.field).unwrap_or(Value::Null))
                .collect(),
        })
        .collect();

    TableView { columns, rows }
}
