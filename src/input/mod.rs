pub(crate) mod navigate;
pub(crate) mod popups;

use crate::app::App;
use crossterm::event::{self, Event, KeyEventKind};

pub fn handle_event(app: &mut App, event: Event) {
    match event {
        Event::Mouse(mouse_event) if !app.is_popup_open() => match mouse_event.kind {
            event::MouseEventKind::ScrollUp => app.rows_up(),
            event::MouseEventKind::ScrollDown => app.rows_down(),
            _ => {}
        },
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            if popups::handle_popup_events(app, key) {
                return;
            }
            navigate::handle_panel_keys(app, key);
        }
        _ => {}
    }
}
