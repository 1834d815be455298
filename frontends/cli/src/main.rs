mod renderer;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;

use boardkit::orders::{ORDERS_TABLE, Order, StatusTab, order_filters, orders_config};
use boardkit::testing::{FakeBackend, sample_orders};
use boardkit::view::CalendarWindow;
use boardkit::{
    ChangeEvent, ControllerConfig, ControllerHandle, FilterMode, FilterOptions, ListController,
    Renderer, Row, SessionContext, Value, ViewKind,
};

use renderer::ConsoleRenderer;

const HELP: &str = "\
commands:
  page <n> | limit <n> | next | refresh
  search <term> | tab open|completed|all | filter <key> <value> | reset
  view table|kanban|calendar | month <YYYY-MM-DD>
  set <id> <field> <value> | insert <title> | delete <id>
  help | quit";

struct Args {
    organization: String,
    role: String,
    view: Option<ViewKind>,
    config: Option<PathBuf>,
    orders: usize,
    latency: Duration,
}

fn parse_args() -> Result<Args> {
    let mut parsed = Args {
        organization: "org-a".to_string(),
        role: "agency_owner".to_string(),
        view: None,
        config: None,
        orders: 40,
        latency: Duration::from_millis(150),
    };

    // Simple argument parsing: --flag <value>
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = || args.next().with_context(|| format!("{} needs a value", arg));
        match arg.as_str() {
            "--org" => parsed.organization = value()?,
            "--role" => parsed.role = value()?,
            "--view" => parsed.view = Some(value()?.parse()?),
            "--config" | "-c" => parsed.config = Some(PathBuf::from(value()?)),
            "--orders" => parsed.orders = value()?.parse()?,
            "--latency-ms" => parsed.latency = Duration::from_millis(value()?.parse()?),
            other => anyhow::bail!("unknown argument '{}'\n{}", other, HELP),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    boardkit::logging::init("info");
    let args = parse_args()?;

    let session = SessionContext::new(&args.organization, "cli-user", &args.role);
    let mut config = match &args.config {
        Some(path) => ControllerConfig::load_from_file(path)?,
        None => orders_config(&session),
    };
    if let Some(view) = args.view {
        config.view = view;
    }

    tracing::info!(
        orders = args.orders,
        role = %args.role,
        "starting demo controller over the in-memory backend"
    );
    let backend = Arc::new(
        FakeBackend::new(session, ORDERS_TABLE)
            .with_records(sample_orders(args.orders))
            .with_latency(args.latency)
            .with_filters(order_filters()),
    );
    let (handle, task) =
        ListController::new(config, backend.clone(), backend.clone(), backend.clone())
            .with_filters(order_filters())
            .spawn();

    let render_handle = handle.clone();
    let render_task = tokio::spawn(async move {
        let mut renderer = ConsoleRenderer::new();
        let mut updates = render_handle.updates();
        while let Some(snapshot) = updates.next().await {
            renderer.render(&snapshot, &render_handle).await;
        }
    });

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match run_command(line.trim(), &handle, &backend).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("error: {:#}", e),
        }
    }

    handle.shutdown().await?;
    task.await?;
    render_task.abort();
    Ok(())
}

/// Execute one input line. Returns `false` when the user asked to quit.
async fn run_command(
    line: &str,
    handle: &ControllerHandle<Order>,
    backend: &FakeBackend<Order>,
) -> Result<bool> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match command {
        "" => {}
        "quit" | "exit" => return Ok(false),
        "help" => println!("{}", HELP),
        "page" => handle.go_to_page(rest.parse()?).await?,
        "limit" => handle.update_limit(rest.parse()?).await?,
        "next" => handle.load_next_page().await?,
        "refresh" => handle.refresh().await?,
        "search" => handle.search(rest).await?,
        "reset" => handle.reset_filters().await?,
        "tab" => {
            let tab = match rest {
                "open" => StatusTab::Open,
                "completed" => StatusTab::Completed,
                "all" => StatusTab::All,
                other => anyhow::bail!("unknown tab '{}'", other),
            };
            tab.apply(handle).await?;
        }
        "filter" => {
            let (key, value) = rest
                .split_once(' ')
                .context("usage: filter <key> <value>")?;
            handle
                .select(key, FilterMode::Toggle, value.trim(), FilterOptions::default())
                .await?;
        }
        "view" => handle.set_view(rest.parse()?).await?,
        "month" => {
            let reference = chrono::NaiveDate::parse_from_str(rest, "%Y-%m-%d")?;
            let today = chrono::Utc::now().date_naive();
            handle
                .set_calendar_window(CalendarWindow::month(reference, today))
                .await?;
        }
        "set" => {
            let mut parts = rest.splitn(3, ' ');
            let (Some(id), Some(field), Some(value)) = (parts.next(), parts.next(), parts.next())
            else {
                anyhow::bail!("usage: set <id> <field> <value>");
            };
            let action = format!("update {}", field);
            handle.set_field(id, field, value, action).await?;
        }
        "insert" => {
            let mut row = Row::new();
            row.insert("title".to_string(), Value::from(rest));
            row.insert("status".to_string(), Value::from("pending"));
            let order = backend.insert(row).await?;
            println!("inserted #{}", order.id);
        }
        "delete" => {
            let mut row = Row::new();
            row.insert("id".to_string(), Value::from(rest));
            backend.emit(ChangeEvent::delete(ORDERS_TABLE, row)).await;
        }
        other => anyhow::bail!("unknown command '{}', try 'help'", other),
    }
    Ok(true)
}
