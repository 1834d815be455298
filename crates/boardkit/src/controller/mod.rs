//! List/board controller actor
//!
//! One task exclusively owns the [`ListState`]. Renderers talk to it through
//! a cloneable [`ControllerHandle`]: intents go in over a bounded command
//! channel and snapshots come back over a `watch` channel. Change events
//! arrive on their own bounded channel; fetch and mutation results come back
//! as messages from spawned tasks, so the cache is only ever written by the
//! actor.

pub mod state;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_stream::wrappers::WatchStream;

use boardkit_api::{ApiError, PageResult, Row, Value, ViewKind};
use boardkit_core::{
    ChangeFeed, PageSource, Predicate, Record, RecordMutations, Searchable, Subscription,
};

use crate::config::ControllerConfig;
use crate::filter::{FilterEngine, FilterMode, FilterOptions};
use crate::merger::{ChangeFeedMerger, MemberDirectory};
use crate::notifications::{NotificationSink, TracingSink};
use crate::optimistic::{MutationKind, MutationTicket};
use crate::preferences::PreferenceStore;
use crate::view::CalendarWindow;

pub use state::{Effect, FetchMode, FetchOutcome, FetchRequest, ListState, ViewSnapshot};

type Respond = oneshot::Sender<Result<(), ApiError>>;

enum Command<R> {
    GoToPage(u32),
    UpdateLimit(u32),
    LoadNextPage,
    Refresh,
    UpdateFilter {
        key: String,
        mode: FilterMode,
        value: String,
        predicate: Arc<dyn Predicate<R>>,
        options: FilterOptions,
    },
    Select {
        key: String,
        mode: FilterMode,
        value: String,
        options: FilterOptions,
        respond: Respond,
    },
    RemoveFilter(String),
    ResetFilters,
    Search(String),
    SetFields {
        record_id: String,
        patch: Row,
        action: String,
        respond: Respond,
    },
    ReplaceRelationship {
        record_id: String,
        relationship: String,
        replacement: Vec<Value>,
        action: String,
        respond: Respond,
    },
    SetView(ViewKind),
    SetCalendarWindow(CalendarWindow),
    Shutdown,
}

enum Completion<R> {
    Fetch(FetchRequest, Result<PageResult<R>, ApiError>),
    Mutation(MutationTicket, Result<Option<R>, ApiError>),
}

fn stopped() -> ApiError {
    ApiError::InternalError {
        message: "controller stopped".to_string(),
    }
}

/// Wiring of a controller before it is spawned.
pub struct ListController<R: Searchable> {
    config: ControllerConfig,
    source: Arc<dyn PageSource<R>>,
    mutations: Arc<dyn RecordMutations<R>>,
    feed: Arc<dyn ChangeFeed>,
    filters: FilterEngine<R>,
    directory: MemberDirectory,
    notifications: Arc<dyn NotificationSink>,
    initial_page: Option<PageResult<R>>,
}

impl<R: Searchable> ListController<R> {
    pub fn new(
        config: ControllerConfig,
        source: Arc<dyn PageSource<R>>,
        mutations: Arc<dyn RecordMutations<R>>,
        feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        Self {
            config,
            source,
            mutations,
            feed,
            filters: FilterEngine::new(),
            directory: MemberDirectory::new(),
            notifications: Arc::new(TracingSink),
            initial_page: None,
        }
    }

    /// Filter engine with the domain's matchers registered.
    pub fn with_filters(mut self, filters: FilterEngine<R>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_directory(mut self, directory: MemberDirectory) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = sink;
        self
    }

    /// Data shown until the first fetch resolves.
    pub fn with_initial_page(mut self, page: PageResult<R>) -> Self {
        self.initial_page = Some(page);
        self
    }

    /// Start the actor. It runs until [`ControllerHandle::shutdown`] or until
    /// every handle is dropped, and releases the change-feed subscription on
    /// the way out.
    pub fn spawn(self) -> (ControllerHandle<R>, JoinHandle<()>) {
        let config = self.config;
        let merger = ChangeFeedMerger::from_config(&config, self.directory);
        let mut state = ListState::new(&config, self.filters, merger);

        let store = config.preferences_path.clone().map(PreferenceStore::new);
        if let Some(store) = &store {
            state.restore(&store.load());
        }
        if let Some(page) = self.initial_page {
            state.seed(page);
        }

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
        let (change_tx, change_rx) = mpsc::channel(config.change_buffer);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let tables = state.watched_tables();
        let subscription = match self.feed.subscribe(&tables, change_tx) {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!(scope = %config.scope, "realtime subscription failed: {}", e);
                Subscription::noop()
            }
        };

        let effects = state.start();
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(state.snapshot()));

        let mut actor = Actor {
            state,
            source: self.source,
            mutations: self.mutations,
            notifications: self.notifications,
            store,
            completions: completion_tx,
            snapshots: snapshot_tx,
        };
        actor.run_effects(effects);
        tracing::info!(scope = %config.scope, tables = ?tables, "controller started");

        let task = tokio::spawn(actor.run(command_rx, change_rx, completion_rx, subscription));
        let handle = ControllerHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        (handle, task)
    }
}

struct Actor<R: Searchable> {
    state: ListState<R>,
    source: Arc<dyn PageSource<R>>,
    mutations: Arc<dyn RecordMutations<R>>,
    notifications: Arc<dyn NotificationSink>,
    store: Option<PreferenceStore>,
    completions: mpsc::UnboundedSender<Completion<R>>,
    snapshots: watch::Sender<Arc<ViewSnapshot<R>>>,
}

impl<R: Searchable> Actor<R> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command<R>>,
        mut changes: mpsc::Receiver<boardkit_api::ChangeEvent>,
        mut completions: mpsc::UnboundedReceiver<Completion<R>>,
        subscription: Subscription,
    ) {
        loop {
            let deadline = self.state.search_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = changes.recv() => {
                    self.state.apply_change(event);
                }
                Some(completion) = completions.recv() => self.handle_completion(completion),
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let effects = self.state.flush_search(Instant::now());
                    self.run_effects(effects);
                }
            }
            self.publish();
        }

        subscription.unsubscribe();
        if let Some(store) = &self.store {
            store.save(&self.state.preferences());
        }
        tracing::info!(scope = %self.state.query_key().scope, "controller stopped");
    }

    fn handle_command(&mut self, command: Command<R>) {
        let effects = match command {
            Command::GoToPage(page) => self.state.go_to_page(page),
            Command::UpdateLimit(limit) => self.state.update_limit(limit),
            Command::LoadNextPage => self.state.load_next_page(),
            Command::Refresh => self.state.refresh(),
            Command::UpdateFilter {
                key,
                mode,
                value,
                predicate,
                options,
            } => self.state.update_filter(&key, mode, value, predicate, options),
            Command::Select {
                key,
                mode,
                value,
                options,
                respond,
            } => {
                let result = self.state.select(&key, mode, &value, options);
                self.respond(result, respond)
            }
            Command::RemoveFilter(key) => self.state.remove_filter(&key),
            Command::ResetFilters => self.state.reset_filters(),
            Command::Search(term) => {
                self.state.type_search(term, Instant::now());
                Vec::new()
            }
            Command::SetFields {
                record_id,
                patch,
                action,
                respond,
            } => {
                let result = self.state.set_fields(&record_id, patch, action);
                self.respond(result, respond)
            }
            Command::ReplaceRelationship {
                record_id,
                relationship,
                replacement,
                action,
                respond,
            } => {
                let result =
                    self.state
                        .replace_relationship(&record_id, relationship, replacement, action);
                self.respond(result, respond)
            }
            Command::SetView(view) => self.state.set_view(view),
            Command::SetCalendarWindow(window) => {
                self.state.set_calendar_window(window);
                Vec::new()
            }
            // handled by the run loop
            Command::Shutdown => Vec::new(),
        };
        self.run_effects(effects);
    }

    /// Publish before answering so the caller observes its own change.
    fn respond(&mut self, result: Result<Vec<Effect>, ApiError>, respond: Respond) -> Vec<Effect> {
        let (effects, reply) = match result {
            Ok(effects) => (effects, Ok(())),
            Err(e) => (Vec::new(), Err(e)),
        };
        self.publish();
        if respond.send(reply).is_err() {
            tracing::debug!("caller stopped waiting for the command result");
        }
        effects
    }

    fn handle_completion(&mut self, completion: Completion<R>) {
        match completion {
            Completion::Fetch(request, result) => {
                self.state.commit_fetch(&request, result);
            }
            Completion::Mutation(ticket, result) => {
                if let Some(notification) = self.state.complete_mutation(&ticket, result) {
                    self.notifications.notify(notification);
                }
            }
        }
    }

    fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Fetch(request) => self.spawn_fetch(request),
                Effect::Mutate(ticket) => self.spawn_mutation(ticket),
                Effect::Persist(prefs) => {
                    if let Some(store) = &self.store {
                        store.save(&prefs);
                    }
                }
            }
        }
    }

    fn spawn_fetch(&self, request: FetchRequest) {
        let source = Arc::clone(&self.source);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = fetch_page(source.as_ref(), &request).await;
            if completions.send(Completion::Fetch(request, result)).is_err() {
                tracing::debug!("controller stopped before the fetch completed");
            }
        });
    }

    fn spawn_mutation(&self, ticket: MutationTicket) {
        let mutations = Arc::clone(&self.mutations);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = run_mutation(mutations.as_ref(), &ticket).await;
            if completions.send(Completion::Mutation(ticket, result)).is_err() {
                tracing::debug!("controller stopped before the mutation completed");
            }
        });
    }

    fn publish(&mut self) {
        self.snapshots.send_replace(Arc::new(self.state.snapshot()));
    }
}

#[tracing::instrument(skip_all, fields(address = ?request.params.address, mode = ?request.mode))]
async fn fetch_page<R: Record>(
    source: &dyn PageSource<R>,
    request: &FetchRequest,
) -> Result<PageResult<R>, ApiError> {
    source.fetch_page(request.params.clone()).await
}

#[tracing::instrument(skip_all, fields(mutation = ticket.id, record = %ticket.record_id))]
async fn run_mutation<R: Record>(
    mutations: &dyn RecordMutations<R>,
    ticket: &MutationTicket,
) -> Result<Option<R>, ApiError> {
    match &ticket.kind {
        MutationKind::Fields(patch) => mutations.mutate(&ticket.record_id, patch.clone()).await,
        MutationKind::Relationship { name, replacement } => mutations
            .mutate_relationship(&ticket.record_id, name, replacement.clone())
            .await
            .map(|()| None),
    }
}

/// The `onAction` surface handed to renderers.
pub struct ControllerHandle<R> {
    commands: mpsc::Sender<Command<R>>,
    snapshots: watch::Receiver<Arc<ViewSnapshot<R>>>,
}

impl<R> Clone for ControllerHandle<R> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            snapshots: self.snapshots.clone(),
        }
    }
}

impl<R: Searchable> ControllerHandle<R> {
    async fn send(&self, command: Command<R>) -> Result<(), ApiError> {
        self.commands.send(command).await.map_err(|_| stopped())
    }

    async fn request<F>(&self, build: F) -> Result<(), ApiError>
    where
        F: FnOnce(Respond) -> Command<R>,
    {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await.map_err(|_| stopped())?
    }

    pub async fn go_to_page(&self, page: u32) -> Result<(), ApiError> {
        self.send(Command::GoToPage(page)).await
    }

    pub async fn update_limit(&self, limit: u32) -> Result<(), ApiError> {
        self.send(Command::UpdateLimit(limit)).await
    }

    pub async fn load_next_page(&self) -> Result<(), ApiError> {
        self.send(Command::LoadNextPage).await
    }

    pub async fn refresh(&self) -> Result<(), ApiError> {
        self.send(Command::Refresh).await
    }

    pub async fn update_filter(
        &self,
        key: impl Into<String>,
        mode: FilterMode,
        value: impl Into<String>,
        predicate: Arc<dyn Predicate<R>>,
        options: FilterOptions,
    ) -> Result<(), ApiError> {
        self.send(Command::UpdateFilter {
            key: key.into(),
            mode,
            value: value.into(),
            predicate,
            options,
        })
        .await
    }

    /// Select a value of a key with a registered matcher. Fails with
    /// `UnknownField` when no matcher exists for `key`.
    pub async fn select(
        &self,
        key: impl Into<String>,
        mode: FilterMode,
        value: impl Into<String>,
        options: FilterOptions,
    ) -> Result<(), ApiError> {
        let (key, value) = (key.into(), value.into());
        self.request(|respond| Command::Select {
            key,
            mode,
            value,
            options,
            respond,
        })
        .await
    }

    pub async fn remove_filter(&self, key: impl Into<String>) -> Result<(), ApiError> {
        self.send(Command::RemoveFilter(key.into())).await
    }

    pub async fn reset_filters(&self) -> Result<(), ApiError> {
        self.send(Command::ResetFilters).await
    }

    /// A keystroke in the search box. Installed after the debounce delay.
    pub async fn search(&self, term: impl Into<String>) -> Result<(), ApiError> {
        self.send(Command::Search(term.into())).await
    }

    pub async fn set_field(
        &self,
        record_id: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
        action: impl Into<String>,
    ) -> Result<(), ApiError> {
        let mut patch = Row::new();
        patch.insert(field.into(), value.into());
        self.set_fields(record_id, patch, action).await
    }

    /// Optimistically patch a record. Returns once the patch is visible in
    /// [`ControllerHandle::snapshot`]; the remote outcome is reported through
    /// the notification sink.
    pub async fn set_fields(
        &self,
        record_id: impl Into<String>,
        patch: Row,
        action: impl Into<String>,
    ) -> Result<(), ApiError> {
        let (record_id, action) = (record_id.into(), action.into());
        self.request(|respond| Command::SetFields {
            record_id,
            patch,
            action,
            respond,
        })
        .await
    }

    pub async fn replace_relationship(
        &self,
        record_id: impl Into<String>,
        relationship: impl Into<String>,
        replacement: Vec<Value>,
        action: impl Into<String>,
    ) -> Result<(), ApiError> {
        let (record_id, relationship, action) =
            (record_id.into(), relationship.into(), action.into());
        self.request(|respond| Command::ReplaceRelationship {
            record_id,
            relationship,
            replacement,
            action,
            respond,
        })
        .await
    }

    pub async fn set_view(&self, view: ViewKind) -> Result<(), ApiError> {
        self.send(Command::SetView(view)).await
    }

    pub async fn set_calendar_window(&self, window: CalendarWindow) -> Result<(), ApiError> {
        self.send(Command::SetCalendarWindow(window)).await
    }

    pub async fn shutdown(&self) -> Result<(), ApiError> {
        self.send(Command::Shutdown).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<ViewSnapshot<R>> {
        Arc::clone(&self.snapshots.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ViewSnapshot<R>>> {
        self.snapshots.clone()
    }

    /// Snapshots as a stream, starting with the current one.
    pub fn updates(&self) -> WatchStream<Arc<ViewSnapshot<R>>> {
        WatchStream::new(self.snapshots.clone())
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<Arc<ViewSnapshot<R>>, ApiError>
    where
        F: FnMut(&ViewSnapshot<R>) -> bool,
    {
        let mut rx = self.snapshots.clone();
        let snapshot = rx.wait_for(|s| predicate(s)).await.map_err(|_| stopped())?;
        Ok(Arc::clone(&snapshot))
    }
}
