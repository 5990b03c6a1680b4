use crate::config::{Config, SyncConfig};
use crate::models::{EditorField, SettingsField, SortOrder, SyncPhase, Task, TaskView, Timeframe};
use crate::sync::Command;
use chrono::{DateTime, Duration, Local};
use ratatui::widgets::ListState;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tracing::warn;
use tui_textarea::TextArea;

pub const PLACEHOLDER_TITLE: &str = "Title";
const PLACEHOLDER_NOTES: &str = "Notes (optional)";
const TOAST_SECONDS: i64 = 2;

/// One selectable line of the task panel.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Row {
    Active(usize),
    CompletedHeader,
    Completed(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub enum EditorMode {
    Add,
    Edit(Task),
}

pub struct TaskEditor<'a> {
    pub mode: EditorMode,
    pub title: TextArea<'a>,
    pub notes: TextArea<'a>,
    pub focus: EditorField,
}

impl<'a> TaskEditor<'a> {
    pub fn add() -> Self {
        Self::with_text(EditorMode::Add, "", "")
    }

    pub fn edit(task: Task) -> Self {
        let title = task.title.clone();
        let notes = task.notes.clone().unwrap_or_default();
        Self::with_text(EditorMode::Edit(task), &title, &notes)
    }

    fn with_text(mode: EditorMode, title: &str, notes: &str) -> Self {
        let mut title_area = TextArea::from([title.to_string()]);
        title_area.set_placeholder_text(PLACEHOLDER_TITLE);
        title_area.move_cursor(tui_textarea::CursorMove::End);

        let mut notes_area = if notes.is_empty() {
            TextArea::default()
        } else {
            TextArea::from(notes.lines().map(str::to_string).collect::<Vec<_>>())
        };
        notes_area.set_placeholder_text(PLACEHOLDER_NOTES);

        Self {
            mode,
            title: title_area,
            notes: notes_area,
            focus: EditorField::Title,
        }
    }

    pub fn title_text(&self) -> String {
        self.title.lines().join(" ")
    }

    pub fn notes_text(&self) -> String {
        self.notes.lines().join("\n")
    }

    pub fn focused_mut(&mut self) -> &mut TextArea<'a> {
        match self.focus {
            EditorField::Title => &mut self.title,
            EditorField::Notes => &mut self.notes,
        }
    }

    pub fn switch_field(&mut self) {
        self.focus = match self.focus {
            EditorField::Title => EditorField::Notes,
            EditorField::Notes => EditorField::Title,
        };
    }
}

/// Working copy of the `[sync]` settings while the settings popup is open.
#[derive(Clone, Debug, PartialEq)]
pub struct SettingsDraft {
    pub sort_order: SortOrder,
    pub show_completed_tasks: bool,
    pub fetch_completed_tasks: bool,
    pub timeframe: Timeframe,
    pub refresh_interval_secs: i64,
}

const REFRESH_INTERVAL_STEPS: [i64; 6] = [10, 20, 30, 60, 120, 300];

impl SettingsDraft {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            sort_order: SortOrder::parse(&config.task_sort_order),
            show_completed_tasks: config.show_completed_tasks,
            fetch_completed_tasks: config.fetch_completed_tasks,
            timeframe: Timeframe::parse(&config.task_timeframe),
            refresh_interval_secs: config.effective_refresh_interval_secs() as i64,
        }
    }

    pub fn apply_to(&self, config: &mut SyncConfig) {
        config.task_sort_order = self.sort_order.as_str().to_string();
        config.show_completed_tasks = self.show_completed_tasks;
        config.fetch_completed_tasks = self.fetch_completed_tasks;
        config.task_timeframe = self.timeframe.as_str().to_string();
        config.refresh_interval_secs = self.refresh_interval_secs;
    }

    pub fn value_label(&self, field: SettingsField) -> String {
        match field {
            SettingsField::SortOrder => self.sort_order.label().to_string(),
            SettingsField::ShowCompleted => on_off(self.show_completed_tasks).to_string(),
            SettingsField::FetchCompleted => on_off(self.fetch_completed_tasks).to_string(),
            SettingsField::Timeframe => self.timeframe.label().to_string(),
            SettingsField::RefreshInterval => self.refresh_interval_secs.to_string(),
        }
    }

    pub fn cycle(&mut self, field: SettingsField, forward: bool) {
        match field {
            SettingsField::SortOrder => {
                self.sort_order = step(&SortOrder::ALL, self.sort_order, forward);
            }
            SettingsField::ShowCompleted => self.show_completed_tasks = !self.show_completed_tasks,
            SettingsField::FetchCompleted => {
                self.fetch_completed_tasks = !self.fetch_completed_tasks;
            }
            SettingsField::Timeframe => {
                self.timeframe = step(&Timeframe::ALL, self.timeframe, forward);
            }
            SettingsField::RefreshInterval => {
                // Custom values from config.toml snap to the nearest step.
                let current = REFRESH_INTERVAL_STEPS
                    .iter()
                    .position(|secs| *secs >= self.refresh_interval_secs)
                    .unwrap_or(REFRESH_INTERVAL_STEPS.len() - 1);
                let snapped = REFRESH_INTERVAL_STEPS[current];
                self.refresh_interval_secs = if snapped != self.refresh_interval_secs {
                    snapped
                } else {
                    step(&REFRESH_INTERVAL_STEPS, snapped, forward)
                };
            }
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "On" } else { "Off" }
}

fn step<T: Copy + PartialEq>(values: &[T], current: T, forward: bool) -> T {
    let len = values.len();
    let index = values.iter().position(|v| *v == current).unwrap_or(0);
    let next = if forward {
        (index + 1) % len
    } else {
        (index + len - 1) % len
    };
    values[next]
}

pub struct App<'a> {
    pub config: Config,
    pub config_path: PathBuf,
    pub view: TaskView,
    /// Last phase other than `Fetching`, used to announce sync outcomes.
    pub settled_phase: SyncPhase,
    pub rows_state: ListState,
    pub completed_expanded: bool,

    pub show_help_popup: bool,
    pub show_list_popup: bool,
    pub list_popup_state: ListState,
    pub editor: Option<TaskEditor<'a>>,
    pub settings: Option<SettingsDraft>,
    pub settings_state: ListState,

    pub toast_message: Option<String>,
    pub toast_expiry: Option<DateTime<Local>>,
    pub should_quit: bool,

    commands: mpsc::UnboundedSender<Command>,
    views: watch::Receiver<TaskView>,
}

impl<'a> App<'a> {
    pub fn new(
        config: Config,
        config_path: PathBuf,
        commands: mpsc::UnboundedSender<Command>,
        mut views: watch::Receiver<TaskView>,
    ) -> App<'a> {
        let view = views.borrow_and_update().clone();
        let mut app = App {
            config,
            config_path,
            view: TaskView::default(),
            settled_phase: view.phase,
            rows_state: ListState::default(),
            completed_expanded: false,
            show_help_popup: false,
            show_list_popup: false,
            list_popup_state: ListState::default(),
            editor: None,
            settings: None,
            settings_state: ListState::default(),
            toast_message: None,
            toast_expiry: None,
            should_quit: false,
            commands,
            views,
        };
        app.apply_view(view);
        app
    }

    /// Pulls the latest view from the sync task, if it changed.
    pub fn sync_view(&mut self) -> bool {
        if !self.views.has_changed().unwrap_or(false) {
            return false;
        }
        let view = self.views.borrow_and_update().clone();
        self.apply_view(view);
        true
    }

    /// Replaces the view, keeping the cursor on the same task when it is
    /// still visible.
    pub fn apply_view(&mut self, view: TaskView) {
        let previous_id = self.selected_task().map(|task| task.id.clone());
        let previous_row = self.rows_state.selected();
        let list_changed = view.selected_task_list_id != self.view.selected_task_list_id;
        if list_changed {
            self.completed_expanded = false;
        }
        self.view = view;

        let rows = self.rows();
        if rows.is_empty() {
            self.rows_state.select(None);
            return;
        }
        let by_id = previous_id
            .filter(|id| !id.is_empty() && !list_changed)
            .and_then(|id| rows.iter().position(|row| self.task_at(*row).is_some_and(|t| t.id == id)));
        let index = match (by_id, previous_row) {
            (Some(index), _) => index,
            (None, Some(row)) if !list_changed => row.min(rows.len() - 1),
            _ => 0,
        };
        self.rows_state.select(Some(index));
    }

    pub fn rows(&self) -> Vec<Row> {
        let mut rows: Vec<Row> = (0..self.view.active_tasks.len()).map(Row::Active).collect();
        if !self.view.completed_tasks.is_empty() {
            rows.push(Row::CompletedHeader);
            if self.completed_expanded {
                rows.extend((0..self.view.completed_tasks.len()).map(Row::Completed));
            }
        }
        rows
    }

    pub fn task_at(&self, row: Row) -> Option<&Task> {
        match row {
            Row::Active(i) => self.view.active_tasks.get(i),
            Row::Completed(i) => self.view.completed_tasks.get(i),
            Row::CompletedHeader => None,
        }
    }

    pub fn selected_row(&self) -> Option<Row> {
        let index = self.rows_state.selected()?;
        self.rows().get(index).copied()
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.task_at(self.selected_row()?)
    }

    pub fn rows_up(&mut self) {
        if self.rows().is_empty() {
            return;
        }
        let i = self.rows_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.rows_state.select(Some(i));
    }

    pub fn rows_down(&mut self) {
        let len = self.rows().len();
        if len == 0 {
            return;
        }
        let i = self.rows_state.selected().map_or(0, |i| (i + 1).min(len - 1));
        self.rows_state.select(Some(i));
    }

    pub fn rows_top(&mut self) {
        if !self.rows().is_empty() {
            self.rows_state.select(Some(0));
        }
    }

    pub fn rows_bottom(&mut self) {
        let len = self.rows().len();
        if len > 0 {
            self.rows_state.select(Some(len - 1));
        }
    }

    pub fn set_completed_expanded(&mut self, expanded: bool) {
        self.completed_expanded = expanded;
        let len = self.rows().len();
        if let Some(i) = self.rows_state.selected()
            && i >= len
        {
            self.rows_state.select(len.checked_sub(1));
        }
    }

    pub fn is_popup_open(&self) -> bool {
        self.show_help_popup || self.show_list_popup || self.editor.is_some() || self.settings.is_some()
    }

    pub fn send(&mut self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("sync task is gone, command dropped");
            self.toast("Sync stopped. Restart taskpanel.");
        }
    }

    pub fn toast(&mut self, message: impl Into<String>) {
        self.toast_message = Some(message.into());
        self.toast_expiry = Some(Local::now() + Duration::seconds(TOAST_SECONDS));
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }
}
