use crate::{
    actions,
    app::App,
    config::key_match,
    models::{EditorField, SettingsField},
};
use crossterm::event::{KeyCode, KeyEvent};

/// Routes keys to the topmost popup. Returns false when no popup is open.
pub fn handle_popup_events(app: &mut App, key: KeyEvent) -> bool {
    if app.editor.is_some() {
        handle_editor_popup(app, key);
        return true;
    }
    if app.settings.is_some() {
        handle_settings_popup(app, key);
        return true;
    }
    if app.show_list_popup {
        handle_list_popup(app, key);
        return true;
    }
    if app.show_help_popup {
        if key.code == KeyCode::Esc || key_match(&key, &app.config.keybindings.global.help) {
            app.show_help_popup = false;
        }
        return true;
    }
    false
}

fn handle_editor_popup(app: &mut App, key: KeyEvent) {
    let bindings = &app.config.keybindings.editor;
    if key_match(&key, &bindings.save) {
        actions::save_editor(app);
        return;
    }
    if key_match(&key, &bindings.cancel) {
        actions::cancel_editor(app);
        return;
    }
    let switch = key_match(&key, &bindings.switch_field);

    let Some(editor) = app.editor.as_mut() else {
        return;
    };
    if switch {
        editor.switch_field();
        return;
    }
    // The title is a single line; Enter moves on to the notes.
    if editor.focus == EditorField::Title && key.code == KeyCode::Enter {
        editor.switch_field();
        return;
    }
    editor.focused_mut().input(key);
}

fn handle_settings_popup(app: &mut App, key: KeyEvent) {
    let popup = &app.config.keybindings.popup;
    if key_match(&key, &popup.cancel) {
        app.settings = None;
        return;
    }
    if key_match(&key, &popup.confirm) {
        actions::apply_settings(app);
        return;
    }

    let len = SettingsField::ALL.len();
    let selected = app.settings_state.selected().unwrap_or(0).min(len - 1);
    if key_match(&key, &popup.up) {
        app.settings_state.select(Some(selected.saturating_sub(1)));
        return;
    }
    if key_match(&key, &popup.down) {
        app.settings_state.select(Some((selected + 1).min(len - 1)));
        return;
    }

    let forward = if key_match(&key, &popup.right) {
        true
    } else if key_match(&key, &popup.left) {
        false
    } else {
        return;
    };
    if let Some(draft) = app.settings.as_mut() {
        draft.cycle(SettingsField::ALL[selected], forward);
    }
}

fn handle_list_popup(app: &mut App, key: KeyEvent) {
    let popup = &app.config.keybindings.popup;
    if key_match(&key, &popup.cancel) {
        app.show_list_popup = false;
        return;
    }
    if key_match(&key, &popup.confirm) {
        actions::choose_list_from_popup(app);
        return;
    }

    let len = app.view.task_lists.len();
    if len == 0 {
        return;
    }
    let selected = app.list_popup_state.selected().unwrap_or(0);
    if key_match(&key, &popup.up) {
        app.list_popup_state.select(Some(selected.saturating_sub(1)));
    } else if key_match(&key, &popup.down) {
        app.list_popup_state.select(Some((selected + 1).min(len - 1)));
    }
}
