use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use boardkit::notifications::{ChannelSink, RecordingSink};
use boardkit::orders::{
    ASSIGNATIONS_TABLE, ORDERS_TABLE, Order, StatusTab, order_filters, orders_config,
};
use boardkit::testing::{FakeBackend, PagingMode, sample_orders};
use boardkit::view::CalendarWindow;
use boardkit::{
    ApiError, ChangeEvent, ControllerConfig, ControllerHandle, ListController, PageResult, Row,
    Severity, SessionContext, Value, ViewKind, ViewModel,
};
use chrono::NaiveDate;
use boardkit_api::PageAddress;
use tokio::task::JoinHandle;

fn agency() -> SessionContext {
    SessionContext::new("org-1", "u-1", "agency_owner")
}

fn backend(n: usize) -> Arc<FakeBackend<Order>> {
    Arc::new(FakeBackend::new(agency(), ORDERS_TABLE).with_records(sample_orders(n)))
}

fn spawn_with(
    config: ControllerConfig,
    backend: &Arc<FakeBackend<Order>>,
    sink: Option<RecordingSink>,
) -> (ControllerHandle<Order>, JoinHandle<()>) {
    let mut controller =
        ListController::new(config, backend.clone(), backend.clone(), backend.clone())
            .with_filters(order_filters());
    if let Some(sink) = sink {
        controller = controller.with_notifications(Arc::new(sink));
    }
    controller.spawn()
}

fn spawn(backend: &Arc<FakeBackend<Order>>) -> (ControllerHandle<Order>, JoinHandle<()>) {
    spawn_with(orders_config(&agency()), backend, None)
}

fn ids(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
    range.map(|i| i.to_string()).collect()
}

fn owned_ids(handle: &ControllerHandle<Order>) -> Vec<String> {
    handle
        .snapshot()
        .record_ids()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn member(id: &str) -> Value {
    Value::Object([("id".to_string(), Value::from(id))].into_iter().collect())
}

fn assignees(handle: &ControllerHandle<Order>, id: &str) -> Vec<String> {
    handle
        .snapshot()
        .records
        .iter()
        .find(|o| o.id == id)
        .map(|o| o.assigned_to.iter().map(|m| m.id.clone()).collect())
        .unwrap_or_default()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_first_page_loads() -> Result<()> {
    let backend = backend(25);
    let (handle, _task) = spawn(&backend);

    let snapshot = handle.wait_for(|s| s.loaded && !s.loading).await?;
    assert_eq!(snapshot.records.len(), 10);
    assert_eq!(snapshot.pagination.total_pages(), Some(3));
    assert!(snapshot.pagination.has_next_page());
    assert!(matches!(snapshot.model.as_ref(), ViewModel::Table(_)));
    Ok(())
}

#[tokio::test]
async fn test_stale_page_response_is_discarded() -> Result<()> {
    let backend = backend(25);
    let gate = backend.hold_page(1);
    let (handle, _task) = spawn(&backend);

    handle.go_to_page(2).await?;
    handle
        .wait_for(|s| s.loaded && !s.loading && s.pagination.current_page() == 2)
        .await?;
    assert_eq!(owned_ids(&handle), ids(11..=20));

    // page 1 resolves after page 2 was committed
    gate.release();
    settle().await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.pagination.current_page(), 2);
    assert_eq!(owned_ids(&handle), ids(11..=20));
    assert_eq!(backend.fetch_log().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_out_of_range_page_is_ignored() -> Result<()> {
    let backend = backend(25);
    let (handle, _task) = spawn(&backend);
    handle.wait_for(|s| s.loaded && !s.loading).await?;

    handle.go_to_page(7).await?;
    handle.go_to_page(0).await?;
    settle().await;

    assert_eq!(handle.snapshot().pagination.current_page(), 1);
    assert_eq!(backend.fetch_log().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_fetch_keeps_previous_page() -> Result<()> {
    let backend = backend(25);
    let (handle, _task) = spawn(&backend);
    handle.wait_for(|s| s.loaded && !s.loading).await?;

    backend.fail_next_fetch(ApiError::NetworkError {
        message: "connection reset".to_string(),
    });
    handle.go_to_page(2).await?;
    let snapshot = handle.wait_for(|s| s.load_error.is_some()).await?;

    assert_eq!(owned_ids(&handle), ids(1..=10));
    assert!(!snapshot.loading);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_search_is_debounced() -> Result<()> {
    let backend = backend(12);
    let (handle, _task) = spawn(&backend);
    handle.wait_for(|s| s.loaded && !s.loading).await?;

    let mut seen = handle.subscribe();
    let observer = tokio::spawn(async move {
        let mut terms = Vec::new();
        while seen.changed().await.is_ok() {
            let term = seen.borrow_and_update().search.clone();
            if let Some(term) = term {
                let done = term == "grace";
                terms.push(term);
                if done {
                    break;
                }
            }
        }
        terms
    });

    handle.search("g").await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.search("gra").await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let last_keystroke = tokio::time::Instant::now();
    handle.search("grace").await?;

    let snapshot = handle.wait_for(|s| s.search.is_some()).await?;
    assert!(last_keystroke.elapsed() >= Duration::from_millis(500));
    assert_eq!(snapshot.search.as_deref(), Some("grace"));
    assert_eq!(observer.await?, vec!["grace".to_string()]);

    // Grace Hopper is assigned to every third order of the first page
    assert_eq!(snapshot.record_ids(), vec!["1", "4", "7", "10"]);
    Ok(())
}

#[tokio::test]
async fn test_rejected_mutation_rolls_back_with_one_notification() -> Result<()> {
    let backend = backend(10);
    let sink = RecordingSink::new();
    let (handle, _task) = spawn_with(orders_config(&agency()), &backend, Some(sink.clone()));
    handle.wait_for(|s| s.loaded && !s.loading).await?;

    let priority = |handle: &ControllerHandle<Order>| {
        handle
            .snapshot()
            .records
            .iter()
            .find(|o| o.id == "3")
            .and_then(|o| o.priority.clone())
    };
    assert_eq!(priority(&handle).as_deref(), Some("low"));

    let gate = backend.hold_mutations();
    backend.fail_next_mutation(ApiError::Rejected {
        message: "not allowed".to_string(),
    });
    handle.set_field("3", "priority", "high", "update priority").await?;

    // visible before the backend answers
    assert_eq!(priority(&handle).as_deref(), Some("high"));
    assert_eq!(handle.snapshot().pending_mutations, 1);

    gate.release();
    handle.wait_for(|s| s.pending_mutations == 0).await?;

    assert_eq!(priority(&handle).as_deref(), Some("low"));
    let notifications = sink.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].severity, Severity::Error);
    assert_eq!(notifications[0].action, "update priority");
    Ok(())
}

#[tokio::test]
async fn test_committed_mutation_reaches_backend() -> Result<()> {
    let backend = backend(10);
    let (handle, _task) = spawn(&backend);
    handle.wait_for(|s| s.loaded && !s.loading).await?;

    handle.set_field("4", "title", "Rebrand", "rename").await?;
    handle.wait_for(|s| s.pending_mutations == 0).await?;

    let stored = backend.record("4").map(|o| o.title);
    assert_eq!(stored.as_deref(), Some("Rebrand"));
    let cached = handle
        .snapshot()
        .records
        .iter()
        .find(|o| o.id == "4")
        .map(|o| o.title.clone());
    assert_eq!(cached.as_deref(), Some("Rebrand"));
    Ok(())
}

#[tokio::test]
async fn test_mutation_of_unknown_record_fails_fast() -> Result<()> {
    let backend = backend(3);
    let (handle, _task) = spawn(&backend);
    handle.wait_for(|s| s.loaded && !s.loading).await?;

    let err = handle
        .set_field("404", "priority", "high", "update priority")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::RecordNotFound { .. }));
    assert_eq!(handle.snapshot().pending_mutations, 0);
    Ok(())
}

#[tokio::test]
async fn test_delete_of_uncached_record_is_a_no_op() -> Result<()> {
    let backend = backend(25);
    let (handle, _task) = spawn(&backend);
    handle.wait_for(|s| s.loaded && !s.loading).await?;

    let mut row = Row::new();
    row.insert("id".to_string(), Value::from("42"));
    backend.emit(ChangeEvent::delete(ORDERS_TABLE, row)).await;
    settle().await;

    assert_eq!(owned_ids(&handle), ids(1..=10));
    Ok(())
}

#[tokio::test]
async fn test_realtime_insert_and_delete() -> Result<()> {
    let backend = backend(3);
    let (handle, _task) = spawn(&backend);
    handle.wait_for(|s| s.loaded && !s.loading).await?;

    let mut row = Row::new();
    row.insert("id".to_string(), Value::from("99"));
    row.insert("title".to_string(), Value::from("Landing page"));
    row.insert("tags".to_string(), Value::Null);
    backend.insert(row).await?;
    handle
        .wait_for(|s| s.record_ids().contains(&"99"))
        .await?;

    let mut row = Row::new();
    row.insert("id".to_string(), Value::Integer(2));
    backend.emit(ChangeEvent::delete(ORDERS_TABLE, row)).await;
    let snapshot = handle
        .wait_for(|s| !s.record_ids().contains(&"2"))
        .await?;
    assert_eq!(snapshot.records.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_kanban_view_fetches_everything() -> Result<()> {
    let backend = backend(25);
    let (handle, _task) = spawn(&backend);
    handle.wait_for(|s| s.loaded && !s.loading).await?;

    handle.set_view(ViewKind::Kanban).await?;
    let snapshot = handle
        .wait_for(|s| s.view == ViewKind::Kanban && !s.loading && s.records.len() == 25)
        .await?;

    let ViewModel::Kanban(board) = snapshot.model.as_ref() else {
        panic!("expected a kanban model");
    };
    let keys: Vec<&str> = board.columns.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(keys, vec!["pending", "in_progress", "in_review", "completed"]);
    assert_eq!(board.columns.iter().map(|c| c.count).sum::<usize>(), 25);
    assert_eq!(
        backend.fetch_log().last().map(|p| p.address.clone()),
        Some(PageAddress::All)
    );
    Ok(())
}

#[tokio::test]
async fn test_cursor_pages_append() -> Result<()> {
    let backend = Arc::new(
        FakeBackend::new(agency(), ORDERS_TABLE)
            .with_records(sample_orders(25))
            .with_paging(PagingMode::Cursor),
    );
    let (handle, _task) = spawn(&backend);
    handle.wait_for(|s| s.loaded && !s.loading).await?;
    assert!(handle.snapshot().pagination.has_next_page());

    handle.load_next_page().await?;
    handle.wait_for(|s| s.records.len() == 20).await?;
    handle.load_next_page().await?;
    let snapshot = handle.wait_for(|s| s.records.len() == 25).await?;

    assert!(!snapshot.pagination.has_next_page());
    assert_eq!(owned_ids(&handle), ids(1..=25));
    Ok(())
}

#[tokio::test]
async fn test_status_tab_filters_locally() -> Result<()> {
    let backend = backend(8);
    let (handle, _task) = spawn(&backend);
    handle.wait_for(|s| s.loaded && !s.loading).await?;

    StatusTab::Completed.apply(&handle).await?;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.record_ids(), vec!["3", "7"]);
    assert_eq!(backend.fetch_log().len(), 1);

    StatusTab::All.apply(&handle).await?;
    handle.wait_for(|s| s.records.len() == 8).await?;
    Ok(())
}

#[tokio::test]
async fn test_unknown_filter_key_is_rejected() -> Result<()> {
    let backend = backend(3);
    let (handle, _task) = spawn(&backend);

    let err = handle
        .select(
            "colour",
            boardkit::FilterMode::Toggle,
            "red",
            boardkit::FilterOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::UnknownField { .. }));
    Ok(())
}

#[tokio::test]
async fn test_shutdown_releases_subscription() -> Result<()> {
    let backend = backend(3);
    let (handle, task) = spawn(&backend);
    assert_eq!(backend.subscriber_count(), 1);

    handle.shutdown().await?;
    task.await?;

    assert_eq!(backend.subscriber_count(), 0);
    assert!(handle.refresh().await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_preferences_survive_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = orders_config(&agency());
    config.preferences_path = Some(dir.path().join("orders.json"));
    let backend = backend(30);

    let (handle, task) = spawn_with(config.clone(), &backend, None);
    handle.wait_for(|s| s.loaded && !s.loading).await?;
    handle.update_limit(20).await?;
    StatusTab::Open.apply(&handle).await?;
    handle.shutdown().await?;
    task.await?;

    let (handle, _task) = spawn_with(config, &backend, None);
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.pagination.limit(), 20);
    assert_eq!(
        snapshot.filters.get("status"),
        Some(&vec!["open".to_string()])
    );
    Ok(())
}

#[tokio::test]
async fn test_updates_stream_follows_view_switch() -> Result<()> {
    let backend = backend(5);
    let (handle, _task) = spawn(&backend);
    let mut updates = handle.updates();

    handle.set_view(ViewKind::Calendar).await?;
    let mut switched = None;
    while let Some(snapshot) = updates.next().await {
        if snapshot.view == ViewKind::Calendar && snapshot.loaded && !snapshot.loading {
            switched = Some(snapshot);
            break;
        }
    }

    let snapshot = switched.expect("stream ended before the calendar loaded");
    assert!(matches!(snapshot.model.as_ref(), ViewModel::Calendar(_)));
    assert_eq!(snapshot.records.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_relationship_replacement_reaches_backend() -> Result<()> {
    let backend = backend(10);
    let (handle, _task) = spawn(&backend);
    handle.wait_for(|s| s.loaded && !s.loading).await?;
    assert_eq!(assignees(&handle, "2"), vec!["m-3"]);

    handle
        .replace_relationship(
            "2",
            "assigned_to",
            vec![member("m-1"), member("m-2")],
            "reassign",
        )
        .await?;
    assert_eq!(assignees(&handle, "2"), vec!["m-1", "m-2"]);
    handle.wait_for(|s| s.pending_mutations == 0).await?;

    let stored: Vec<String> = backend
        .record("2")
        .map(|o| o.assigned_to.into_iter().map(|m| m.id).collect())
        .unwrap_or_default();
    assert_eq!(stored, vec!["m-1", "m-2"]);
    assert_eq!(assignees(&handle, "2"), vec!["m-1", "m-2"]);
    Ok(())
}

#[tokio::test]
async fn test_rejected_relationship_replacement_rolls_back() -> Result<()> {
    let backend = backend(10);
    let sink = RecordingSink::new();
    let (handle, _task) = spawn_with(orders_config(&agency()), &backend, Some(sink.clone()));
    handle.wait_for(|s| s.loaded && !s.loading).await?;

    let gate = backend.hold_mutations();
    backend.fail_next_mutation(ApiError::Rejected {
        message: "member left the agency".to_string(),
    });
    handle
        .replace_relationship("2", "assigned_to", Vec::new(), "unassign")
        .await?;
    assert!(assignees(&handle, "2").is_empty());

    gate.release();
    handle.wait_for(|s| s.pending_mutations == 0).await?;

    assert_eq!(assignees(&handle, "2"), vec!["m-3"]);
    let notifications = sink.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].action, "unassign");
    Ok(())
}

#[tokio::test]
async fn test_join_table_event_during_pending_replacement() -> Result<()> {
    let backend = backend(10);
    let (handle, _task) = spawn(&backend);
    handle.wait_for(|s| s.loaded && !s.loading).await?;

    let gate = backend.hold_mutations();
    backend.fail_next_mutation(ApiError::NetworkError {
        message: "timeout".to_string(),
    });
    handle
        .replace_relationship("2", "assigned_to", vec![member("m-1")], "reassign")
        .await?;

    // someone else assigns Grace while the replacement is in flight
    let mut link = Row::new();
    link.insert("order_id".to_string(), Value::from("2"));
    link.insert("agency_member_id".to_string(), Value::from("m-2"));
    backend.emit(ChangeEvent::insert(ASSIGNATIONS_TABLE, link)).await;
    settle().await;
    assert_eq!(assignees(&handle, "2"), vec!["m-1"]);

    gate.release();
    handle.wait_for(|s| s.pending_mutations == 0).await?;
    assert_eq!(assignees(&handle, "2"), vec!["m-3", "m-2"]);
    Ok(())
}

#[tokio::test]
async fn test_initial_page_shows_until_first_fetch() -> Result<()> {
    let backend = backend(25);
    let gate = backend.hold_page(1);
    let seed = PageResult::paginate_local(vec![Order::new("seed", "Cached order")], 1, 10);
    let (handle, _task) = ListController::new(
        orders_config(&agency()),
        backend.clone(),
        backend.clone(),
        backend.clone(),
    )
    .with_filters(order_filters())
    .with_initial_page(seed)
    .spawn();

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.record_ids(), vec!["seed"]);
    assert!(matches!(snapshot.model.as_ref(), ViewModel::Table(t) if t.rows.len() == 1));

    gate.release();
    let snapshot = handle
        .wait_for(|s| s.loaded && !s.loading && s.records.len() == 10)
        .await?;
    assert_eq!(owned_ids(&handle), ids(1..=10));
    assert_eq!(snapshot.pagination.total_pages(), Some(3));
    assert_eq!(backend.fetch_log().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_calendar_window_moves_without_refetch() -> Result<()> {
    let backend = backend(5);
    let (handle, _task) = spawn(&backend);
    handle.set_view(ViewKind::Calendar).await?;
    handle
        .wait_for(|s| s.view == ViewKind::Calendar && !s.loading && s.records.len() == 5)
        .await?;
    let fetches = backend.fetch_log().len();

    let may = |day| NaiveDate::from_ymd_opt(2024, 5, day).unwrap();
    let window = CalendarWindow::month(may(15), may(10));
    handle.set_calendar_window(window).await?;
    let snapshot = handle
        .wait_for(|s| matches!(s.model.as_ref(), ViewModel::Calendar(c) if c.window == window))
        .await?;

    let ViewModel::Calendar(calendar) = snapshot.model.as_ref() else {
        panic!("expected a calendar model");
    };
    let third = calendar
        .cells
        .iter()
        .find(|cell| cell.date == may(3))
        .expect("May 3rd is inside the window");
    let items: Vec<&str> = third.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(items, vec!["3"]);
    assert!(third.flags.is_within_current_month);
    assert_eq!(calendar.unscheduled, 0);
    assert_eq!(backend.fetch_log().len(), fetches);
    Ok(())
}

#[tokio::test]
async fn test_channel_sink_receives_rollback_notification() -> Result<()> {
    let backend = backend(10);
    let (sink, mut notifications) = ChannelSink::new();
    let (handle, _task) = ListController::new(
        orders_config(&agency()),
        backend.clone(),
        backend.clone(),
        backend.clone(),
    )
    .with_filters(order_filters())
    .with_notifications(Arc::new(sink))
    .spawn();
    handle.wait_for(|s| s.loaded && !s.loading).await?;

    backend.fail_next_mutation(ApiError::Rejected {
        message: "read only".to_string(),
    });
    handle.set_field("5", "priority", "low", "update priority").await?;

    let notification = tokio::time::timeout(Duration::from_secs(1), notifications.recv())
        .await?
        .expect("sink dropped before notifying");
    assert_eq!(notification.severity, Severity::Error);
    assert_eq!(notification.action, "update priority");
    assert!(notifications.try_recv().is_err());
    Ok(())
}
