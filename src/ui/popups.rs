use super::components::centered_rect;
use crate::app::{App, EditorMode};
use crate::config::KeyBindings;
use crate::models::{EditorField, SettingsField};
use crate::ui::theme::ThemeTokens;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

pub fn render_editor_popup(f: &mut Frame, app: &mut App, tokens: &ThemeTokens) {
    let save_hint = key_hint(&app.config.keybindings.editor.save);
    let switch_hint = key_hint(&app.config.keybindings.editor.switch_field);
    let Some(editor) = app.editor.as_mut() else {
        return;
    };
    let title = match editor.mode {
        EditorMode::Add => " Add task ",
        EditorMode::Edit(_) => " Edit task ",
    };

    let area = centered_rect(60, 50, f.area());
    f.render_widget(Clear, area);
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(tokens.border_popup));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(inner);

    let field_block = |label: &'static str, focused: bool| {
        let color = if focused {
            tokens.border_popup
        } else {
            tokens.border_default
        };
        Block::default()
            .title(label)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
    };

    let focus = editor.focus;
    let cursor_style = Style::default().add_modifier(Modifier::REVERSED);
    let hidden_cursor = Style::default();

    editor
        .title
        .set_block(field_block(" Title ", focus == EditorField::Title));
    editor.title.set_cursor_line_style(Style::default());
    editor.title.set_cursor_style(if focus == EditorField::Title {
        cursor_style
    } else {
        hidden_cursor
    });
    f.render_widget(&editor.title, chunks[0]);

    editor
        .notes
        .set_block(field_block(" Notes ", focus == EditorField::Notes));
    editor.notes.set_cursor_line_style(Style::default());
    editor.notes.set_cursor_style(if focus == EditorField::Notes {
        cursor_style
    } else {
        hidden_cursor
    });
    f.render_widget(&editor.notes, chunks[1]);

    let help = format!("({save_hint}) Save  ({switch_hint}) Switch field  (Esc) Cancel");
    f.render_widget(
        Paragraph::new(help).style(Style::default().fg(tokens.notes)),
        chunks[2],
    );
}

pub fn render_list_popup(f: &mut Frame, app: &mut App, tokens: &ThemeTokens) {
    let block = Block::default()
        .title(" Task lists ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(tokens.border_popup));
    let area = centered_rect(50, 50, f.area());
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .margin(1)
        .split(area);

    let current = app.view.selected_task_list_id.as_deref();
    let items: Vec<ListItem> = app
        .view
        .task_lists
        .iter()
        .map(|list| {
            let marker = if Some(list.id.as_str()) == current {
                "● "
            } else {
                "  "
            };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(tokens.header)),
                Span::raw(list.title.clone()),
            ]))
        })
        .collect();

    let list = List::new(items)
        .highlight_symbol("> ")
        .highlight_style(
            Style::default()
                .bg(tokens.highlight)
                .add_modifier(Modifier::BOLD),
        );
    f.render_stateful_widget(list, popup_layout[0], &mut app.list_popup_state);

    let help = Paragraph::new("(Up/Down) Move  (Enter) Select  (Esc) Cancel")
        .style(Style::default().fg(tokens.notes));
    f.render_widget(help, popup_layout[1]);
}

pub fn render_settings_popup(f: &mut Frame, app: &mut App, tokens: &ThemeTokens) {
    let Some(draft) = app.settings.as_ref() else {
        return;
    };
    let block = Block::default()
        .title(" Settings ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(tokens.border_popup));
    let area = centered_rect(60, 40, f.area());
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .margin(1)
        .split(area);

    let label_width = SettingsField::ALL
        .iter()
        .map(|field| field.label().len())
        .max()
        .unwrap_or(0);
    let items: Vec<ListItem> = SettingsField::ALL
        .iter()
        .map(|field| {
            ListItem::new(Line::from(vec![
                Span::raw(format!("{:<label_width$}  ", field.label())),
                Span::styled(
                    format!("< {} >", draft.value_label(*field)),
                    Style::default().fg(tokens.header),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .highlight_symbol("> ")
        .highlight_style(
            Style::default()
                .bg(tokens.highlight)
                .add_modifier(Modifier::BOLD),
        );
    f.render_stateful_widget(list, popup_layout[0], &mut app.settings_state);

    let help = Paragraph::new("(Up/Down) Move  (Left/Right) Change  (Enter) Save  (Esc) Cancel")
        .style(Style::default().fg(tokens.notes));
    f.render_widget(help, popup_layout[1]);
}

pub fn render_help_popup(f: &mut Frame, app: &App, tokens: &ThemeTokens) {
    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(tokens.border_default));
    let area = centered_rect(70, 80, f.area());
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let inner_area = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .margin(2)
        .split(area);

    let key_style = Style::default()
        .fg(tokens.header)
        .add_modifier(Modifier::BOLD);
    let mut lines = Vec::new();
    for (section, entries) in help_sections(&app.config.keybindings) {
        if !lines.is_empty() {
            lines.push(Line::from(""));
        }
        lines.push(Line::from(Span::styled(
            section,
            Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        )));
        let key_width = entries.iter().map(|(keys, _)| keys.len()).max().unwrap_or(0);
        for (keys, description) in entries {
            lines.push(Line::from(vec![
                Span::styled(format!("  {keys:<key_width$}  "), key_style),
                Span::raw(description),
            ]));
        }
    }
    f.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: false }),
        inner_area[0],
    );
    f.render_widget(
        Paragraph::new("Esc / ?: close").style(Style::default().fg(tokens.notes)),
        inner_area[1],
    );
}

pub fn render_toast(f: &mut Frame, area: Rect, message: &str, tokens: &ThemeTokens) {
    let width = (message.chars().count() as u16 + 4).min(area.width);
    let rect = Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(4),
        width,
        height: 3.min(area.height),
    };
    f.render_widget(Clear, rect);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(tokens.border_popup));
    f.render_widget(Paragraph::new(message.to_string()).block(block), rect);
}

fn key_hint(keys: &[String]) -> String {
    keys.first().cloned().unwrap_or_else(|| "-".to_string())
}

fn join_keys(keys: &[String]) -> String {
    let filtered: Vec<&str> = keys
        .iter()
        .map(|key| key.trim())
        .filter(|key| !key.is_empty())
        .collect();
    if filtered.is_empty() {
        "-".to_string()
    } else {
        filtered.join(" / ")
    }
}

fn help_sections(kb: &KeyBindings) -> Vec<(&'static str, Vec<(String, &'static str)>)> {
    vec![
        (
            "Tasks",
            vec![
                (join_keys(&kb.tasks.up), "Move up"),
                (join_keys(&kb.tasks.down), "Move down"),
                (join_keys(&kb.tasks.top), "First row"),
                (join_keys(&kb.tasks.bottom), "Last row"),
                (join_keys(&kb.tasks.toggle), "Complete / reopen task"),
                (join_keys(&kb.tasks.edit), "Edit task"),
                (join_keys(&kb.tasks.add), "Add task"),
                (join_keys(&kb.tasks.toggle_completed), "Show / hide completed"),
            ],
        ),
        (
            "Lists",
            vec![
                (join_keys(&kb.tasks.next_list), "Next list"),
                (join_keys(&kb.tasks.prev_list), "Previous list"),
                (join_keys(&kb.global.list_picker), "Pick a list"),
            ],
        ),
        (
            "General",
            vec![
                (join_keys(&kb.global.refresh), "Refresh now"),
                (join_keys(&kb.global.settings), "Settings"),
                (join_keys(&kb.global.open_web), "Open Google Tasks in browser"),
                (join_keys(&kb.global.help), "Help"),
                (join_keys(&kb.global.quit), "Quit"),
            ],
        ),
        (
            "Editor",
            vec![
                (join_keys(&kb.editor.save), "Save"),
                (join_keys(&kb.editor.switch_field), "Switch field"),
                (join_keys(&kb.editor.cancel), "Cancel"),
            ],
        ),
    ]
}
