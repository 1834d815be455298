use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use boardkit_api::ViewKind;

/// Configuration for one list/board controller instance
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Cache scope, e.g. the entity collection name ("orders")
    pub scope: String,
    /// Realtime table carrying the primary records
    pub primary_table: String,
    #[serde(default = "default_rows_per_page")]
    pub rows_per_page: u32,
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
    /// Capacity of the change-event queue between feed and controller
    #[serde(default = "default_change_buffer")]
    pub change_buffer: usize,
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    /// Send filters and search to the page source instead of only filtering locally
    #[serde(default)]
    pub server_side_filtering: bool,
    /// Where view preferences and persistent filters are stored
    #[serde(default)]
    pub preferences_path: Option<PathBuf>,
    #[serde(default)]
    pub view: ViewKind,
    #[serde(default)]
    pub join_tables: Vec<JoinTableConfig>,
    #[serde(default)]
    pub views: ViewsConfig,
}

/// Declarative mapping of a relationship join table onto the primary record
#[derive(Debug, Clone, Deserialize)]
pub struct JoinTableConfig {
    pub table: String,
    /// Relationship field on the primary record, e.g. "assigned_to"
    pub relationship: String,
    /// Join-table column holding the primary record id
    pub owner_column: String,
    /// Join-table column holding the related member id
    pub member_column: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewsConfig {
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub kanban: KanbanConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnConfig {
    pub field: String,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KanbanConfig {
    #[serde(default = "default_group_by")]
    pub group_by: String,
    #[serde(default = "default_title_field")]
    pub title_field: String,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

impl Default for KanbanConfig {
    fn default() -> Self {
        Self {
            group_by: default_group_by(),
            title_field: default_title_field(),
            groups: Vec::new(),
        }
    }
}

/// Predefined kanban column
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    pub key: String,
    pub name: String,
    pub position: i64,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_date_field")]
    pub date_field: String,
    #[serde(default = "default_title_field")]
    pub title_field: String,
    #[serde(default = "default_visible_days")]
    pub visible_days: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            date_field: default_date_field(),
            title_field: default_title_field(),
            visible_days: default_visible_days(),
        }
    }
}

fn default_rows_per_page() -> u32 {
    10
}

fn default_search_debounce_ms() -> u64 {
    500
}

fn default_change_buffer() -> usize {
    256
}

fn default_command_buffer() -> usize {
    64
}

fn default_group_by() -> String {
    "status".to_string()
}

fn default_title_field() -> String {
    "title".to_string()
}

fn default_date_field() -> String {
    "due_date".to_string()
}

fn default_visible_days() -> u32 {
    7
}

fn default_true() -> bool {
    true
}

impl ControllerConfig {
    /// Minimal configuration for a scope backed by a single table
    pub fn new(scope: impl Into<String>, primary_table: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            primary_table: primary_table.into(),
            rows_per_page: default_rows_per_page(),
            search_debounce_ms: default_search_debounce_ms(),
            change_buffer: default_change_buffer(),
            command_buffer: default_command_buffer(),
            server_side_filtering: false,
            preferences_path: None,
            view: ViewKind::default(),
            join_tables: Vec::new(),
            views: ViewsConfig::default(),
        }
    }

    /// Load controller configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read controller config {}: {}", path.display(), e)
        })?;
        Self::from_yaml(&content)
            .map_err(|e| anyhow::anyhow!("Invalid controller config {}: {}", path.display(), e))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: ControllerConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.rows_per_page == 0 {
            anyhow::bail!("rows_per_page must be greater than zero");
        }
        if self.change_buffer == 0 || self.command_buffer == 0 {
            anyhow::bail!("channel buffers must be greater than zero");
        }
        Ok(())
    }

    /// Every table the controller subscribes to
    pub fn watched_tables(&self) -> Vec<String> {
        std::iter::once(self.primary_table.clone())
            .chain(self.join_tables.iter().map(|j| j.table.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r##"
scope: orders
primary_table: orders_v2
rows_per_page: 20
view: kanban
join_tables:
  - table: order_assignations
    relationship: assigned_to
    owner_column: order_id
    member_column: agency_member_id
views:
  kanban:
    group_by: status
    groups:
      - key: pending
        name: Pending
        position: 0
        color: "#fbbf24"
      - key: completed
        name: Completed
        position: 1
        visible: false
"##;

    #[test]
    fn test_parse_yaml_with_defaults() {
        let config = ControllerConfig::from_yaml(YAML).unwrap();
        assert_eq!(config.rows_per_page, 20);
        assert_eq!(config.search_debounce_ms, 500);
        assert_eq!(config.view, ViewKind::Kanban);
        assert_eq!(config.views.kanban.groups.len(), 2);
        assert!(config.views.kanban.groups[0].visible);
        assert!(!config.views.kanban.groups[1].visible);
        assert_eq!(config.views.calendar.date_field, "due_date");
        assert_eq!(
            config.watched_tables(),
            vec!["orders_v2".to_string(), "order_assignations".to_string()]
        );
    }

    #[test]
    fn test_zero_rows_per_page_rejected() {
        let yaml = "scope: orders\nprimary_table: orders\nrows_per_page: 0\n";
        assert!(ControllerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.yaml");
        std::fs::write(&path, YAML).unwrap();
        let config = ControllerConfig::load_from_file(&path).unwrap();
        assert_eq!(config.scope, "orders");

        let missing = ControllerConfig::load_from_file(&dir.path().join("nope.yaml"));
        assert!(missing.is_err());
    }
}
