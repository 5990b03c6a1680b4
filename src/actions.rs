use crate::{
    app::{App, EditorMode, Row, SettingsDraft, TaskEditor},
    models::TaskStatus,
    sync::{Command, SyncSettings},
    ui::components::UNTITLED,
};
use tracing::{debug, warn};

pub const TASKS_WEB_URL: &str = "https://tasks.google.com/";

pub fn toggle_selected_task(app: &mut App) {
    match app.selected_row() {
        Some(Row::CompletedHeader) => {
            let expanded = !app.completed_expanded;
            app.set_completed_expanded(expanded);
            return;
        }
        None => return,
        _ => {}
    }

    let Some(task) = app.selected_task().cloned() else {
        return;
    };
    if task.is_placeholder() {
        return;
    }
    match task.status {
        TaskStatus::Completed => {
            app.toast(format!("Reopened \"{}\"", display_title(&task.title)));
            app.send(Command::Uncomplete(task));
        }
        _ => {
            app.toast(format!("Completed \"{}\"", display_title(&task.title)));
            app.send(Command::Complete(task));
        }
    }
}

pub fn toggle_completed_section(app: &mut App) {
    if app.view.completed_tasks.is_empty() {
        app.toast("No completed tasks.");
        return;
    }
    let expanded = !app.completed_expanded;
    app.set_completed_expanded(expanded);
}

pub fn open_add_editor(app: &mut App) {
    if app.view.selected_task_list_id.is_none() {
        app.toast("No task list to add to.");
        return;
    }
    app.editor = Some(TaskEditor::add());
}

pub fn open_edit_editor(app: &mut App) {
    if app.selected_row() == Some(Row::CompletedHeader) {
        toggle_completed_section(app);
        return;
    }
    let Some(task) = app.selected_task().cloned() else {
        return;
    };
    if task.is_placeholder() {
        return;
    }
    app.editor = Some(TaskEditor::edit(task));
}

pub fn save_editor(app: &mut App) {
    let Some(editor) = app.editor.as_ref() else {
        return;
    };
    let title = editor.title_text();
    if title.trim().is_empty() {
        app.toast("Title cannot be empty.");
        return;
    }
    let notes = editor.notes_text();
    let command = match &editor.mode {
        EditorMode::Add => Command::Add { title, notes },
        EditorMode::Edit(task) => Command::Edit {
            task: task.clone(),
            title,
            notes,
        },
    };
    app.editor = None;
    app.send(command);
}

pub fn cancel_editor(app: &mut App) {
    app.editor = None;
}

pub fn select_next_list(app: &mut App) {
    cycle_list(app, true);
}

pub fn select_prev_list(app: &mut App) {
    cycle_list(app, false);
}

fn cycle_list(app: &mut App, forward: bool) {
    let len = app.view.task_lists.len();
    if len < 2 {
        return;
    }
    let current = app.view.selected_list_index().unwrap_or(0);
    let next = if forward {
        (current + 1) % len
    } else {
        (current + len - 1) % len
    };
    let id = app.view.task_lists[next].id.clone();
    app.send(Command::SelectList(id));
}

pub fn open_list_popup(app: &mut App) {
    if app.view.task_lists.is_empty() {
        app.toast("No task lists found.");
        return;
    }
    let index = app.view.selected_list_index().unwrap_or(0);
    app.list_popup_state.select(Some(index));
    app.show_list_popup = true;
}

pub fn choose_list_from_popup(app: &mut App) {
    app.show_list_popup = false;
    let Some(list) = app
        .list_popup_state
        .selected()
        .and_then(|i| app.view.task_lists.get(i))
    else {
        return;
    };
    let id = list.id.clone();
    app.send(Command::SelectList(id));
}

pub fn refresh(app: &mut App) {
    app.send(Command::Refresh);
    app.toast("Refreshing...");
}

pub fn open_web(app: &mut App) {
    match open::that(TASKS_WEB_URL) {
        Ok(()) => debug!("opened {TASKS_WEB_URL}"),
        Err(err) => {
            warn!(error = %err, "failed to open browser");
            app.toast(format!("Open {TASKS_WEB_URL} in your browser."));
        }
    }
}

pub fn open_settings(app: &mut App) {
    app.settings = Some(SettingsDraft::from_config(&app.config.sync));
    app.settings_state.select(Some(0));
}

/// Writes the draft into config.toml and hands the new settings to the sync task.
pub fn apply_settings(app: &mut App) {
    let Some(draft) = app.settings.take() else {
        return;
    };
    draft.apply_to(&mut app.config.sync);
    if let Err(err) = app.config.save_to_path(&app.config_path) {
        warn!(error = %err, "failed to save config");
        app.toast("Settings applied, but config.toml could not be saved.");
    } else {
        app.toast("Settings saved.");
    }
    let settings = SyncSettings::from_config(&app.config.sync);
    app.send(Command::Configure(settings));
}

fn display_title(title: &str) -> &str {
    if title.trim().is_empty() {
        UNTITLED
    } else {
        title
    }
}
