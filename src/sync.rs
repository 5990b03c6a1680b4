use crate::config::SyncConfig;
use crate::integrations::google::{TasksApi, TasksError};
use crate::models::{FailureKind, SortOrder, SyncPhase, Task, TaskList, TaskStatus, TaskView, Timeframe};
use crate::policy::{ViewOptions, derive_view};
use crate::store::{SyncState, Transition};
use chrono::Local;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub refresh_interval: Duration,
    pub view: ViewOptions,
    pub fetch_completed_tasks: bool,
    pub complete_refresh_delay: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            refresh_interval: Duration::from_secs(config.effective_refresh_interval_secs()),
            view: ViewOptions {
                sort_order: SortOrder::parse(&config.task_sort_order),
                show_completed_tasks: config.show_completed_tasks,
                timeframe: Timeframe::parse(&config.task_timeframe),
            },
            fetch_completed_tasks: config.fetch_completed_tasks,
            complete_refresh_delay: Duration::from_millis(config.effective_complete_refresh_delay_ms()),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SelectList(String),
    Complete(Task),
    Uncomplete(Task),
    Edit {
        task: Task,
        title: String,
        notes: String,
    },
    Add {
        title: String,
        notes: String,
    },
    Refresh,
    Configure(SyncSettings),
}

pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    views: watch::Receiver<TaskView>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Starts the actor on the current runtime. `cancel` is the root token;
    /// the api should be built with one of its child tokens.
    pub fn spawn(
        api: Arc<dyn TasksApi>,
        settings: SyncSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (view_tx, views) = watch::channel(TaskView::default());

        let actor = Orchestrator {
            api,
            state: SyncState::default(),
            ticker: refresh_ticker(settings.refresh_interval),
            settings,
            phase: SyncPhase::Idle,
            view_tx,
            commands: receiver,
            pending_refresh: None,
            backlog: VecDeque::new(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(actor.run());

        Self {
            commands,
            views,
            cancel,
            task,
        }
    }

    /// Returns false once the actor has stopped.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<Command> {
        self.commands.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskView> {
        self.views.clone()
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            warn!(error = %err, "sync task ended abnormally");
        }
    }
}

fn refresh_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Owns the [`SyncState`]; the terminal loop only reaches it through [`Command`]s.
struct Orchestrator {
    api: Arc<dyn TasksApi>,
    state: SyncState,
    settings: SyncSettings,
    phase: SyncPhase,
    view_tx: watch::Sender<TaskView>,
    commands: mpsc::UnboundedReceiver<Command>,
    ticker: Interval,
    /// Single-shot refresh scheduled after a completion.
    pending_refresh: Option<Instant>,
    /// Commands read while coalescing refresh triggers.
    backlog: VecDeque<Command>,
    cancel: CancellationToken,
}

impl Orchestrator {
    async fn run(mut self) {
        info!("sync started");
        self.refresh().await;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if let Some(command) = self.backlog.pop_front() {
                self.handle(command).await;
                continue;
            }

            let pending = self.pending_refresh;
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = sleep_until_deadline(pending) => {
                    self.pending_refresh = None;
                    self.refresh().await;
                }
                _ = self.ticker.tick() => self.refresh().await,
            }
        }
        info!("sync stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::SelectList(id) => self.select_task_list(&id),
            Command::Complete(task) => self.complete_task(&task).await,
            Command::Uncomplete(task) => self.uncomplete_task(&task).await,
            Command::Edit { task, title, notes } => self.edit_task(&task, &title, &notes).await,
            Command::Add { title, notes } => self.add_task(&title, &notes).await,
            Command::Refresh => self.refresh().await,
            Command::Configure(settings) => self.configure(settings).await,
        }
    }

    async fn cancellable<T>(
        &self,
        call: impl Future<Output = Result<T, TasksError>>,
    ) -> Result<T, TasksError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TasksError::Cancelled),
            result = call => result,
        }
    }

    fn publish(&self) {
        let view = derive_view(
            &self.state,
            &self.settings.view,
            Local::now().date_naive(),
            self.phase,
        );
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }

    async fn fetch_snapshot(&self) -> Result<(Vec<TaskList>, Vec<Task>), TasksError> {
        let task_lists = self.cancellable(self.api.fetch_task_lists()).await?;
        let tasks = self
            .cancellable(
                self.api
                    .fetch_tasks_in(&task_lists, self.settings.fetch_completed_tasks),
            )
            .await?;
        Ok((task_lists, tasks))
    }

    async fn refresh(&mut self) {
        let previous = self.phase;
        self.phase = SyncPhase::Fetching;
        self.publish();

        match self.fetch_snapshot().await {
            Ok((task_lists, tasks)) => {
                debug!(lists = task_lists.len(), tasks = tasks.len(), "refreshed");
                self.state.apply(Transition::Replace { task_lists, tasks });
                self.phase = SyncPhase::Populated;
            }
            Err(err) if err.is_cancelled() => {
                self.phase = previous;
                return;
            }
            Err(err) => {
                let kind = if err.is_auth() {
                    FailureKind::Auth
                } else {
                    FailureKind::Transport
                };
                warn!(error = %err, "refresh failed, keeping previous snapshot");
                self.phase = SyncPhase::FetchFailed(kind);
            }
        }
        self.publish();
        self.coalesce_refreshes();
    }

    /// Refresh requests that queued up while a refresh was running are
    /// satisfied by it.
    fn coalesce_refreshes(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Refresh => debug!("coalesced refresh request"),
                other => self.backlog.push_back(other),
            }
        }
    }

    /// The list a mutation on `task` may target, if any.
    fn actionable_list(&self, task: &Task) -> Option<String> {
        if task.is_placeholder() {
            debug!("ignoring mutation on placeholder row");
            return None;
        }
        let task_list_id = task.task_list_id.as_deref()?;
        if !self.state.has_list(task_list_id) {
            debug!(list = task_list_id, "ignoring mutation on unknown list");
            return None;
        }
        Some(task_list_id.to_string())
    }

    fn select_task_list(&mut self, task_list_id: &str) {
        if self.state.select_task_list(task_list_id) {
            self.publish();
        } else {
            debug!(list = task_list_id, "cannot select unknown list");
        }
    }

    async fn complete_task(&mut self, task: &Task) {
        let Some(task_list_id) = self.actionable_list(task) else {
            return;
        };
        let result = self
            .cancellable(
                self.api
                    .set_task_status(&task_list_id, &task.id, TaskStatus::Completed),
            )
            .await;
        match result {
            Ok(()) => {
                self.pending_refresh = Some(Instant::now() + self.settings.complete_refresh_delay);
            }
            Err(err) if err.is_cancelled() => {}
            Err(err) => error!(task = %task.id, error = %err, "failed to complete task"),
        }
    }

    async fn uncomplete_task(&mut self, task: &Task) {
        let Some(task_list_id) = self.actionable_list(task) else {
            return;
        };
        if self.state.apply(Transition::OptimisticUncomplete {
            task_list_id: task_list_id.clone(),
            task_id: task.id.clone(),
        }) {
            self.publish();
        }

        let result = self
            .cancellable(
                self.api
                    .set_task_status(&task_list_id, &task.id, TaskStatus::NeedsAction),
            )
            .await;
        match result {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => return,
            Err(err) => error!(task = %task.id, error = %err, "failed to uncomplete task"),
        }
        self.refresh().await;
    }

    async fn add_task(&mut self, title: &str, notes: &str) {
        let title = title.trim();
        if title.is_empty() {
            debug!("ignoring task with blank title");
            return;
        }
        let notes = (!notes.is_empty()).then_some(notes);
        let task_list_id = self.state.selected_task_list_id().map(str::to_string);

        let result = self
            .cancellable(
                self.api
                    .create_task(title, notes, task_list_id.as_deref()),
            )
            .await;
        match result {
            Ok(()) => self.refresh().await,
            Err(err) if err.is_cancelled() => {}
            Err(err) => error!(error = %err, "failed to create task"),
        }
    }

    async fn edit_task(&mut self, task: &Task, title: &str, notes: &str) {
        let Some(task_list_id) = self.actionable_list(task) else {
            return;
        };
        let title = title.trim();
        if title.is_empty() {
            debug!(task = %task.id, "ignoring edit with blank title");
            return;
        }

        let result = self
            .cancellable(
                self.api
                    .update_task(&task_list_id, &task.id, title, Some(notes)),
            )
            .await;
        match result {
            Ok(()) => self.refresh().await,
            Err(err) if err.is_cancelled() => {}
            Err(err) => error!(task = %task.id, error = %err, "failed to update task"),
        }
    }

    async fn configure(&mut self, settings: SyncSettings) {
        let previous = std::mem::replace(&mut self.settings, settings);

        if previous.refresh_interval != self.settings.refresh_interval {
            debug!(interval = ?self.settings.refresh_interval, "restarting refresh timer");
            self.ticker = refresh_ticker(self.settings.refresh_interval);
        }
        if previous.fetch_completed_tasks != self.settings.fetch_completed_tasks {
            self.refresh().await;
        } else if previous.view != self.settings.view {
            self.publish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::oauth::AuthError;
    use crate::policy::NO_TASK_LISTS;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeApi {
        lists: Mutex<Vec<TaskList>>,
        tasks: Mutex<Vec<Task>>,
        failure: Mutex<Option<FailureKind>>,
        hang_fetches: AtomicBool,
        fail_mutations: AtomicBool,
        status_gate: Mutex<Option<Arc<Notify>>>,
        list_calls: AtomicUsize,
        include_completed: Mutex<Vec<bool>>,
        status_calls: Mutex<Vec<(String, String, TaskStatus)>>,
        creates: Mutex<Vec<(String, Option<String>, Option<String>)>>,
        updates: Mutex<Vec<(String, String, String, Option<String>)>>,
    }

    impl FakeApi {
        fn with_home_and_work() -> Arc<Self> {
            let fake = FakeApi::default();
            *fake.lists.lock().unwrap() =
                vec![TaskList::new("A", "Home"), TaskList::new("B", "Work")];
            *fake.tasks.lock().unwrap() = vec![
                Task {
                    id: "1".to_string(),
                    title: "Buy milk".to_string(),
                    task_list_id: Some("A".to_string()),
                    position: Some("001".to_string()),
                    ..Task::default()
                },
                Task {
                    id: "2".to_string(),
                    title: "Ship report".to_string(),
                    status: TaskStatus::Completed,
                    task_list_id: Some("B".to_string()),
                    ..Task::default()
                },
                Task {
                    id: "3".to_string(),
                    title: "Water plants".to_string(),
                    status: TaskStatus::Completed,
                    task_list_id: Some("A".to_string()),
                    ..Task::default()
                },
            ];
            Arc::new(fake)
        }

        fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        fn status_calls(&self) -> usize {
            self.status_calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TasksApi for FakeApi {
        async fn fetch_task_lists(&self) -> Result<Vec<TaskList>, TasksError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_fetches.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            match *self.failure.lock().unwrap() {
                Some(FailureKind::Auth) => return Err(AuthError::NoAccount.into()),
                Some(FailureKind::Transport) => {
                    return Err(TasksError::Transport {
                        status: 503,
                        reason: "Service Unavailable".to_string(),
                    });
                }
                None => {}
            }
            Ok(self.lists.lock().unwrap().clone())
        }

        async fn fetch_tasks_in(
            &self,
            task_lists: &[TaskList],
            include_completed: bool,
        ) -> Result<Vec<Task>, TasksError> {
            self.include_completed.lock().unwrap().push(include_completed);
            let tasks = self.tasks.lock().unwrap();
            let mut fetched = Vec::new();
            for list in task_lists {
                fetched.extend(
                    tasks
                        .iter()
                        .filter(|task| task.task_list_id.as_deref() == Some(list.id.as_str()))
                        .filter(|task| include_completed || !task.is_completed())
                        .cloned(),
                );
            }
            Ok(fetched)
        }

        async fn create_task(
            &self,
            title: &str,
            notes: Option<&str>,
            task_list_id: Option<&str>,
        ) -> Result<(), TasksError> {
            self.creates.lock().unwrap().push((
                title.to_string(),
                notes.map(str::to_string),
                task_list_id.map(str::to_string),
            ));
            let mut tasks = self.tasks.lock().unwrap();
            let id = format!("new-{}", tasks.len());
            tasks.push(Task {
                id,
                title: title.to_string(),
                notes: notes.map(str::to_string),
                task_list_id: task_list_id.map(str::to_string),
                ..Task::default()
            });
            Ok(())
        }

        async fn set_task_status(
            &self,
            task_list_id: &str,
            task_id: &str,
            status: TaskStatus,
        ) -> Result<(), TasksError> {
            self.status_calls.lock().unwrap().push((
                task_list_id.to_string(),
                task_id.to_string(),
                status,
            ));
            if self.fail_mutations.load(Ordering::SeqCst) {
                return Err(server_error());
            }
            let gate = self.status_gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            let mut tasks = self.tasks.lock().unwrap();
            if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
                task.status = status;
            }
            Ok(())
        }

        async fn update_task(
            &self,
            task_list_id: &str,
            task_id: &str,
            title: &str,
            notes: Option<&str>,
        ) -> Result<(), TasksError> {
            self.updates.lock().unwrap().push((
                task_list_id.to_string(),
                task_id.to_string(),
                title.to_string(),
                notes.map(str::to_string),
            ));
            if self.fail_mutations.load(Ordering::SeqCst) {
                return Err(server_error());
            }
            let mut tasks = self.tasks.lock().unwrap();
            if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
                task.title = title.to_string();
                task.notes = notes.map(str::to_string);
            }
            Ok(())
        }
    }

    fn server_error() -> TasksError {
        TasksError::Transport {
            status: 500,
            reason: "Internal Server Error".to_string(),
        }
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            view: ViewOptions {
                show_completed_tasks: true,
                ..ViewOptions::default()
            },
            ..SyncSettings::default()
        }
    }

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.title.as_str()).collect()
    }

    async fn until(condition: impl Fn() -> bool) {
        for _ in 0..10_000 {
            if condition() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition never became true");
    }

    async fn populated(handle: &SyncHandle) -> TaskView {
        handle
            .subscribe()
            .wait_for(|view| view.phase == SyncPhase::Populated)
            .await
            .unwrap()
            .clone()
    }

    #[tokio::test(start_paused = true)]
    async fn startup_refresh_publishes_first_list() {
        let fake = FakeApi::with_home_and_work();
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());

        let view = populated(&handle).await;

        assert_eq!(view.selected_task_list_id.as_deref(), Some("A"));
        assert_eq!(titles(&view.active_tasks), vec!["Buy milk"]);
        assert_eq!(titles(&view.completed_tasks), vec!["Water plants"]);
        assert_eq!(fake.list_calls(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_timer_refreshes() {
        let fake = FakeApi::with_home_and_work();
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());
        populated(&handle).await;

        tokio::time::sleep(Duration::from_secs(41)).await;

        assert_eq!(fake.list_calls(), 3);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_lists_shows_placeholder_that_is_never_dispatched() {
        let fake = Arc::new(FakeApi::default());
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());

        let view = populated(&handle).await;
        assert_eq!(view.active_tasks.len(), 1);
        let placeholder = view.active_tasks[0].clone();
        assert_eq!(placeholder.id, "");
        assert_eq!(placeholder.title, NO_TASK_LISTS);

        handle.send(Command::Complete(placeholder.clone()));
        handle.send(Command::Uncomplete(placeholder.clone()));
        handle.send(Command::Edit {
            task: placeholder,
            title: "Renamed".to_string(),
            notes: String::new(),
        });
        handle.send(Command::Refresh);
        until(|| fake.list_calls() >= 2).await;

        assert_eq!(fake.status_calls(), 0);
        assert!(fake.updates.lock().unwrap().is_empty());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn uncomplete_is_visible_before_the_server_answers() {
        let fake = FakeApi::with_home_and_work();
        let gate = Arc::new(Notify::new());
        *fake.status_gate.lock().unwrap() = Some(gate.clone());
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());
        let view = populated(&handle).await;
        let done = view.completed_tasks[0].clone();

        handle.send(Command::Uncomplete(done));
        let mut views = handle.subscribe();
        let optimistic = views
            .wait_for(|view| view.active_tasks.iter().any(|t| t.id == "3"))
            .await
            .unwrap()
            .clone();

        assert!(optimistic.completed_tasks.iter().all(|t| t.id != "3"));
        assert_eq!(fake.list_calls(), 1);

        gate.notify_one();
        until(|| fake.list_calls() >= 2).await;
        let calls = fake.status_calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![("A".to_string(), "3".to_string(), TaskStatus::NeedsAction)]
        );
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_uncomplete_still_refreshes_and_restores_the_task() {
        let fake = FakeApi::with_home_and_work();
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());
        let view = populated(&handle).await;
        let done = view.completed_tasks[0].clone();
        fake.fail_mutations.store(true, Ordering::SeqCst);

        handle.send(Command::Uncomplete(done));
        until(|| fake.list_calls() >= 2).await;
        let view = handle
            .subscribe()
            .wait_for(|view| {
                view.phase == SyncPhase::Populated
                    && view.completed_tasks.iter().any(|t| t.id == "3")
            })
            .await
            .unwrap()
            .clone();

        assert!(view.active_tasks.iter().all(|t| t.id != "3"));
        assert_eq!(fake.status_calls(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_complete_schedules_no_refresh() {
        let fake = FakeApi::with_home_and_work();
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());
        let view = populated(&handle).await;
        fake.fail_mutations.store(true, Ordering::SeqCst);

        handle.send(Command::Complete(view.active_tasks[0].clone()));
        until(|| fake.status_calls() == 1).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(fake.list_calls(), 1);
        let current = handle.subscribe().borrow().clone();
        assert_eq!(titles(&current.active_tasks), vec!["Buy milk"]);
        assert_eq!(current.phase, SyncPhase::Populated);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_edit_leaves_state_alone() {
        let fake = FakeApi::with_home_and_work();
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());
        let view = populated(&handle).await;
        fake.fail_mutations.store(true, Ordering::SeqCst);

        handle.send(Command::Edit {
            task: view.active_tasks[0].clone(),
            title: "Buy oat milk".to_string(),
            notes: String::new(),
        });
        until(|| fake.updates.lock().unwrap().len() == 1).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(fake.list_calls(), 1);
        let current = handle.subscribe().borrow().clone();
        assert_eq!(titles(&current.active_tasks), vec!["Buy milk"]);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn complete_refreshes_after_a_short_delay() {
        let fake = FakeApi::with_home_and_work();
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());
        let view = populated(&handle).await;
        let started = Instant::now();

        handle.send(Command::Complete(view.active_tasks[0].clone()));
        let after = handle
            .subscribe()
            .wait_for(|view| {
                view.phase == SyncPhase::Populated
                    && view.active_tasks.iter().all(|t| t.id != "1")
            })
            .await
            .unwrap()
            .clone();

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_secs(20));
        assert_eq!(fake.list_calls(), 2);
        assert!(after.completed_tasks.iter().any(|t| t.id == "1"));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_previous_snapshot() {
        let fake = FakeApi::with_home_and_work();
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());
        populated(&handle).await;

        *fake.failure.lock().unwrap() = Some(FailureKind::Transport);
        handle.send(Command::Refresh);
        let failed = handle
            .subscribe()
            .wait_for(|view| matches!(view.phase, SyncPhase::FetchFailed(_)))
            .await
            .unwrap()
            .clone();

        assert_eq!(failed.phase, SyncPhase::FetchFailed(FailureKind::Transport));
        assert_eq!(titles(&failed.active_tasks), vec!["Buy milk"]);
        assert_eq!(failed.task_lists.len(), 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn missing_account_is_reported_as_auth_failure() {
        let fake = FakeApi::with_home_and_work();
        *fake.failure.lock().unwrap() = Some(FailureKind::Auth);
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());

        let view = handle
            .subscribe()
            .wait_for(|view| matches!(view.phase, SyncPhase::FetchFailed(_)))
            .await
            .unwrap()
            .clone();

        assert_eq!(view.phase, SyncPhase::FetchFailed(FailureKind::Auth));
        assert_eq!(titles(&view.active_tasks), vec![NO_TASK_LISTS]);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn removed_list_falls_back_to_first() {
        let fake = FakeApi::with_home_and_work();
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());
        populated(&handle).await;

        handle.send(Command::SelectList("B".to_string()));
        let selected = handle
            .subscribe()
            .wait_for(|view| view.selected_task_list_id.as_deref() == Some("B"))
            .await
            .unwrap()
            .clone();
        assert_eq!(titles(&selected.completed_tasks), vec!["Ship report"]);

        fake.lists.lock().unwrap().retain(|list| list.id != "B");
        handle.send(Command::Refresh);
        let view = handle
            .subscribe()
            .wait_for(|view| view.task_lists.len() == 1)
            .await
            .unwrap()
            .clone();

        assert_eq!(view.selected_task_list_id.as_deref(), Some("A"));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn queued_refreshes_are_coalesced() {
        let fake = FakeApi::with_home_and_work();
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());
        populated(&handle).await;

        handle.send(Command::Refresh);
        handle.send(Command::Refresh);
        handle.send(Command::Refresh);
        handle.send(Command::SelectList("B".to_string()));
        handle
            .subscribe()
            .wait_for(|view| view.selected_task_list_id.as_deref() == Some("B"))
            .await
            .unwrap();

        assert_eq!(fake.list_calls(), 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn add_targets_selected_list_and_skips_blank_titles() {
        let fake = FakeApi::with_home_and_work();
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());
        populated(&handle).await;

        handle.send(Command::SelectList("B".to_string()));
        handle.send(Command::Add {
            title: "   ".to_string(),
            notes: "ignored".to_string(),
        });
        handle.send(Command::Add {
            title: "Groceries".to_string(),
            notes: String::new(),
        });
        let view = handle
            .subscribe()
            .wait_for(|view| view.active_tasks.iter().any(|t| t.title == "Groceries"))
            .await
            .unwrap()
            .clone();

        assert_eq!(view.selected_task_list_id.as_deref(), Some("B"));
        let creates = fake.creates.lock().unwrap().clone();
        assert_eq!(
            creates,
            vec![("Groceries".to_string(), None, Some("B".to_string()))]
        );
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn edit_passes_notes_verbatim_and_refreshes() {
        let fake = FakeApi::with_home_and_work();
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());
        let view = populated(&handle).await;

        handle.send(Command::Edit {
            task: view.active_tasks[0].clone(),
            title: "Buy oat milk".to_string(),
            notes: String::new(),
        });
        handle
            .subscribe()
            .wait_for(|view| titles(&view.active_tasks) == vec!["Buy oat milk"])
            .await
            .unwrap();

        let updates = fake.updates.lock().unwrap().clone();
        assert_eq!(
            updates,
            vec![(
                "A".to_string(),
                "1".to_string(),
                "Buy oat milk".to_string(),
                Some(String::new())
            )]
        );
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn configure_refetches_only_when_fetch_flag_changes() {
        let fake = FakeApi::with_home_and_work();
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());
        populated(&handle).await;

        let mut hidden = settings();
        hidden.view.show_completed_tasks = false;
        handle.send(Command::Configure(hidden.clone()));
        handle
            .subscribe()
            .wait_for(|view| view.completed_tasks.is_empty())
            .await
            .unwrap();
        assert_eq!(fake.list_calls(), 1);

        let mut not_fetched = hidden;
        not_fetched.fetch_completed_tasks = false;
        handle.send(Command::Configure(not_fetched));
        until(|| fake.list_calls() >= 2).await;
        until(|| fake.include_completed.lock().unwrap().last() == Some(&false)).await;
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_a_hanging_refresh() {
        let fake = FakeApi::with_home_and_work();
        fake.hang_fetches.store(true, Ordering::SeqCst);
        let handle = SyncHandle::spawn(fake.clone(), settings(), CancellationToken::new());
        until(|| fake.list_calls() == 1).await;

        let views = handle.subscribe();
        handle.shutdown().await;

        assert_eq!(views.borrow().phase, SyncPhase::Fetching);
    }

    #[test]
    fn settings_follow_config() {
        let config = SyncConfig {
            refresh_interval_secs: -5,
            task_sort_order: "deadline".to_string(),
            task_timeframe: "this-month".to_string(),
            ..SyncConfig::default()
        };
        let settings = SyncSettings::from_config(&config);

        assert_eq!(settings.refresh_interval, Duration::from_secs(20));
        assert_eq!(settings.view.sort_order, SortOrder::Deadline);
        assert_eq!(settings.view.timeframe, Timeframe::ThisMonth);
        assert_eq!(settings.complete_refresh_delay, Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_intervals_are_capped() {
        let config = SyncConfig {
            refresh_interval_secs: i64::MAX,
            complete_refresh_delay_ms: u64::MAX,
            ..SyncConfig::default()
        };
        let settings = SyncSettings::from_config(&config);

        assert_eq!(settings.refresh_interval, Duration::from_secs(24 * 60 * 60));
        assert_eq!(settings.complete_refresh_delay, Duration::from_secs(60));
        let _ticker = refresh_ticker(settings.refresh_interval);
        let _deadline = Instant::now() + settings.complete_refresh_delay;
    }
}
