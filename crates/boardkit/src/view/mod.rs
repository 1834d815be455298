//! View model adapters
//!
//! Project the filtered cached records into the shape a table, kanban or
//! calendar renderer consumes. Projections are pure and memoized on the
//! revisions of their inputs.

pub mod calendar;
pub mod kanban;
pub mod memo;
pub mod table;

use async_trait::async_trait;
use serde::Serialize;

use boardkit_api::ViewKind;
use boardkit_core::{MaybeSendSync, Record};

use crate::config::ViewsConfig;
use crate::controller::{ControllerHandle, ViewSnapshot};

pub use calendar::{CalendarCell, CalendarHeader, CalendarItem, CalendarView, CalendarWindow};
pub use kanban::{KanbanBoard, KanbanCard, KanbanColumn, format_display_name};
pub use memo::{MemoKey, ViewMemo};
pub use table::{ColumnDef, TableRow, TableView};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum ViewModel {
    Table(TableView),
    Kanban(KanbanBoard),
    Calendar(CalendarView),
}

impl ViewModel {
    pub fn kind(&self) -> ViewKind {
        match self {
            ViewModel::Table(_) => ViewKind::Table,
            ViewModel::Kanban(_) => ViewKind::Kanban,
            ViewModel::Calendar(_) => ViewKind::Calendar,
        }
    }

    /// Number of distinct records shown
    pub fn record_count(&self) -> usize {
        match self {
            ViewModel::Table(t) => t.rows.len(),
            ViewModel::Kanban(k) => {
                let mut ids: Vec<&str> = k
                    .columns
                    .iter()
                    .flat_map(|c| c.cards.iter().map(|card| card.id.as_str()))
                    .collect();
                ids.sort_unstable();
                ids.dedup();
                ids.len()
            }
            ViewModel::Calendar(c) => c.cells.iter().map(|cell| cell.items.len()).sum(),
        }
    }
}

/// Project `records` (already filtered, in display order) for `view`.
pub fn project<R: Record>(
    view: ViewKind,
    records: &[&R],
    config: &ViewsConfig,
    window: CalendarWindow,
) -> ViewModel {
    match view {
        ViewKind::Table => ViewModel::Table(table::project_table(records, &config.table.columns)),
        ViewKind::Kanban => ViewModel::Kanban(kanban::project_kanban(records, &config.kanban)),
        ViewKind::Calendar => {
            ViewModel::Calendar(calendar::project_calendar(records, &config.calendar, window))
        }
    }
}

/// Presentation layer fed with controller snapshots.
///
/// User intents go back through `actions`; the renderer never touches
/// controller state directly.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait Renderer<R: Record>: MaybeSendSync {
    async fn render(&mut self, snapshot: &ViewSnapshot<R>, actions: &ControllerHandle<R>);
}
