use chrono::{Local, NaiveDate};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

use crate::app::{App, Row};
use crate::models::{FailureKind, SyncPhase, TaskView};

pub mod color_parser;
pub mod components;
pub mod popups;
pub mod theme;

use components::{task_lines, truncate};
use popups::{
    render_editor_popup, render_help_popup, render_list_popup, render_settings_popup,
    render_toast,
};
use theme::ThemeTokens;

pub fn ui(f: &mut Frame, app: &mut App) {
    let tokens = ThemeTokens::from_theme(&app.config.theme);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(f.area());

    render_task_panel(f, app, chunks[0], &tokens);
    render_status_bar(f, chunks[1], app, &tokens);

    if app.show_help_popup {
        render_help_popup(f, app, &tokens);
    }
    if app.show_list_popup {
        render_list_popup(f, app, &tokens);
    }
    if app.settings.is_some() {
        render_settings_popup(f, app, &tokens);
    }
    if app.editor.is_some() {
        render_editor_popup(f, app, &tokens);
    }
    if let Some(message) = app.toast_message.as_deref() {
        render_toast(f, chunks[0], message, &tokens);
    }
}

fn render_task_panel(f: &mut Frame, app: &mut App, area: Rect, tokens: &ThemeTokens) {
    if area.height == 0 || area.width == 0 {
        return;
    }

    let title = header_title(&app.view, area.width.saturating_sub(4) as usize);
    let border_color = match app.view.phase {
        SyncPhase::FetchFailed(_) => tokens.sync_error,
        _ => tokens.border_default,
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Line::from(Span::styled(
            title,
            Style::default()
                .fg(tokens.header)
                .add_modifier(Modifier::BOLD),
        )))
        .title(phase_indicator(app.view.phase, tokens).alignment(Alignment::Right));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let width = inner.width.saturating_sub(2).max(1) as usize;
    let today = Local::now().date_naive();
    let items = row_items(app, width, today, tokens);
    let list = List::new(items)
        .highlight_symbol("> ")
        .highlight_style(
            Style::default()
                .bg(tokens.highlight)
                .add_modifier(Modifier::BOLD),
        );
    f.render_stateful_widget(list, inner, &mut app.rows_state);
}

fn row_items(
    app: &App,
    width: usize,
    today: NaiveDate,
    tokens: &ThemeTokens,
) -> Vec<ListItem<'static>> {
    app.rows()
        .into_iter()
        .map(|row| match row {
            Row::CompletedHeader => {
                let arrow = if app.completed_expanded { "▾" } else { "▸" };
                ListItem::new(Line::from(Span::styled(
                    format!("{arrow} Completed ({})", app.view.completed_tasks.len()),
                    Style::default()
                        .fg(tokens.task_done)
                        .add_modifier(Modifier::BOLD),
                )))
            }
            Row::Active(_) | Row::Completed(_) => match app.task_at(row) {
                Some(task) => ListItem::new(task_lines(task, width, today, tokens)),
                None => ListItem::new(Line::from("")),
            },
        })
        .collect()
}

/// ` Home [1/3] `, or a bare title when there are no lists yet.
fn header_title(view: &TaskView, max_width: usize) -> String {
    let text = match (view.selected_list(), view.selected_list_index()) {
        (Some(list), Some(index)) => {
            format!(" {} [{}/{}] ", list.title, index + 1, view.task_lists.len())
        }
        _ => " Google Tasks ".to_string(),
    };
    truncate(&text, max_width)
}

fn phase_indicator(phase: SyncPhase, tokens: &ThemeTokens) -> Line<'static> {
    let (text, color) = match phase {
        SyncPhase::Idle => (" idle ", tokens.notes),
        SyncPhase::Fetching => (" syncing… ", tokens.header),
        SyncPhase::Populated => (" synced ", tokens.task_done),
        SyncPhase::FetchFailed(FailureKind::Auth) => (" sign-in needed ", tokens.sync_error),
        SyncPhase::FetchFailed(FailureKind::Transport) => (" offline ", tokens.sync_error),
    };
    Line::from(Span::styled(text, Style::default().fg(color)))
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App, tokens: &ThemeTokens) {
    if area.height == 0 || area.width == 0 {
        return;
    }

    let hint = match app.view.phase {
        SyncPhase::FetchFailed(FailureKind::Auth) => {
            Span::styled(
                " Run `taskpanel login` to connect your Google account. ",
                Style::default().fg(tokens.sync_error),
            )
        }
        _ => Span::styled(
            format!(
                " {} active · {} completed ",
                app.view.active_tasks.iter().filter(|t| !t.is_placeholder()).count(),
                app.view.completed_tasks.len()
            ),
            Style::default().fg(tokens.notes),
        ),
    };
    let help_key = app
        .config
        .keybindings
        .global
        .help
        .first()
        .cloned()
        .unwrap_or_else(|| "?".to_string());
    let right = Span::styled(
        format!("{help_key}: help "),
        Style::default().fg(tokens.notes),
    );

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(right.width() as u16)])
        .split(area);
    f.render_widget(Paragraph::new(Line::from(hint)), chunks[0]);
    f.render_widget(
        Paragraph::new(Line::from(right)).alignment(Alignment::Right),
        chunks[1],
    );
}
