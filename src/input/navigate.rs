use crate::{actions, app::App, config::key_match};
use crossterm::event::KeyEvent;

pub fn handle_panel_keys(app: &mut App, key: KeyEvent) {
    let global = &app.config.keybindings.global;
    let tasks = &app.config.keybindings.tasks;

    if key_match(&key, &global.help) {
        app.show_help_popup = true;
    } else if key_match(&key, &global.quit) {
        app.quit();
    } else if key_match(&key, &global.refresh) {
        actions::refresh(app);
    } else if key_match(&key, &global.settings) {
        actions::open_settings(app);
    } else if key_match(&key, &global.list_picker) {
        actions::open_list_popup(app);
    } else if key_match(&key, &global.open_web) {
        actions::open_web(app);
    } else if key_match(&key, &tasks.up) {
        app.rows_up();
    } else if key_match(&key, &tasks.down) {
        app.rows_down();
    } else if key_match(&key, &tasks.top) {
        app.rows_top();
    } else if key_match(&key, &tasks.bottom) {
        app.rows_bottom();
    } else if key_match(&key, &tasks.next_list) {
        actions::select_next_list(app);
    } else if key_match(&key, &tasks.prev_list) {
        actions::select_prev_list(app);
    } else if key_match(&key, &tasks.toggle) {
        actions::toggle_selected_task(app);
    } else if key_match(&key, &tasks.edit) {
        actions::open_edit_editor(app);
    } else if key_match(&key, &tasks.add) {
        actions::open_add_editor(app);
    } else if key_match(&key, &tasks.toggle_completed) {
        actions::toggle_completed_section(app);
    }
}
