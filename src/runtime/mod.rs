use crate::{
    app::App,
    models::{FailureKind, SyncPhase},
};
use chrono::Local;

pub fn tick(app: &mut App) {
    if app.sync_view() {
        announce_phase_change(app);
    }

    if let Some(expiry) = app.toast_expiry
        && Local::now() >= expiry
    {
        app.toast_expiry = None;
        app.toast_message = None;
    }
}

/// Toasts only when a cycle settles in a different phase than the last one;
/// the `Fetching` in between is skipped.
fn announce_phase_change(app: &mut App) {
    let current = app.view.phase;
    if current == SyncPhase::Fetching || current == app.settled_phase {
        return;
    }
    let previous = std::mem::replace(&mut app.settled_phase, current);
    match current {
        SyncPhase::FetchFailed(FailureKind::Auth) => {
            app.toast("Google sign-in required. Run `taskpanel login`.");
        }
        SyncPhase::FetchFailed(FailureKind::Transport) => {
            app.toast("Sync failed. Showing last known tasks.");
        }
        SyncPhase::Populated if matches!(previous, SyncPhase::FetchFailed(_)) => {
            app.toast("Sync restored.");
        }
        _ => {}
    }
}
