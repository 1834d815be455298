use async_trait::async_trait;

use boardkit::orders::Order;
use boardkit::view::{CalendarView, KanbanBoard, TableView};
use boardkit::{ControllerHandle, Renderer, Value, ViewModel, ViewSnapshot};

/// Prints every snapshot to stdout as plain text.
pub struct ConsoleRenderer {
    frames: u64,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self { frames: 0 }
    }
}

#[async_trait]
impl Renderer<Order> for ConsoleRenderer {
    async fn render(&mut self, snapshot: &ViewSnapshot<Order>, _actions: &ControllerHandle<Order>) {
        self.frames += 1;
        let mut status = format!(
            "[{}] {:?} page {}",
            self.frames,
            snapshot.view,
            snapshot.pagination.current_page()
        );
        if let Some(total) = snapshot.pagination.total_pages() {
            status.push_str(&format!("/{}", total));
        }
        if snapshot.loading {
            status.push_str(" (loading)");
        }
        if snapshot.pending_mutations > 0 {
            status.push_str(&format!(" ({} saving)", snapshot.pending_mutations));
        }
        if let Some(error) = &snapshot.load_error {
            status.push_str(&format!(" error: {}", error));
        }
        println!("{}", status);
        if !snapshot.filters.is_empty() {
            println!("  filters: {:?}", snapshot.filters);
        }

        match snapshot.model.as_ref() {
            ViewModel::Table(table) => print_table(table),
            ViewModel::Kanban(board) => print_kanban(board),
            ViewModel::Calendar(calendar) => print_calendar(calendar),
        }
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_json_string()),
        other => other.to_json_string(),
    }
}

fn print_table(table: &TableView) {
    let header: Vec<&str> = table.columns.iter().map(|c| c.label.as_str()).collect();
    println!("  {}", header.join(" | "));
    for row in &table.rows {
        let cells: Vec<String> = row.cells.iter().map(cell).collect();
        println!("  {}", cells.join(" | "));
    }
}

fn print_kanban(board: &KanbanBoard) {
    for column in board.columns.iter().filter(|c| c.visible) {
        println!("  {} ({})", column.name, column.count);
        for card in &column.cards {
            println!("    #{} {}", card.id, card.title);
        }
    }
}

fn print_calendar(calendar: &CalendarView) {
    println!(
        "  {} .. {}",
        calendar.window.start.format("%Y-%m-%d"),
        calendar.window.end.format("%Y-%m-%d")
    );
    for cell in calendar.cells.iter().filter(|c| !c.items.is_empty()) {
        let titles: Vec<&str> = cell.items.iter().map(|i| i.title.as_str()).collect();
        println!("  {}: {}", cell.date.format("%a %d %b"), titles.join(", "));
    }
    if calendar.unscheduled > 0 {
        println!("  {} without a date", calendar.unscheduled);
    }
}
