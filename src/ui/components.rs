use crate::models::Task;
use crate::ui::theme::ThemeTokens;
use chrono::NaiveDate;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub const UNTITLED: &str = "(untitled)";

/// Helper function to calculate centered popup position
pub fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Cuts `text` to `max_width` display columns, ending with `…` when shortened.
pub fn truncate(text: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(text) <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut width = 0;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + w + 1 > max_width {
            break;
        }
        out.push(ch);
        width += w;
    }
    out.push('…');
    out
}

pub fn display_title(task: &Task) -> &str {
    if task.title.trim().is_empty() {
        UNTITLED
    } else {
        &task.title
    }
}

/// Lines for one task row: the wrapped title with a checkbox, then the first
/// notes line dimmed underneath.
pub fn task_lines(
    task: &Task,
    width: usize,
    today: NaiveDate,
    tokens: &ThemeTokens,
) -> Vec<Line<'static>> {
    if task.is_placeholder() {
        return vec![Line::from(Span::styled(
            truncate(&task.title, width),
            Style::default()
                .fg(tokens.placeholder)
                .add_modifier(Modifier::ITALIC),
        ))];
    }

    let (checkbox, title_style) = if task.is_completed() {
        (
            "[x] ",
            Style::default()
                .fg(tokens.task_done)
                .add_modifier(Modifier::CROSSED_OUT),
        )
    } else {
        ("[ ] ", Style::default())
    };
    let indent = " ".repeat(checkbox.len());
    let text_width = width.saturating_sub(checkbox.len()).max(1);

    let mut lines = Vec::new();
    let wrapped = textwrap::wrap(display_title(task), text_width);
    for (i, segment) in wrapped.iter().enumerate() {
        let prefix = if i == 0 { checkbox } else { indent.as_str() };
        let mut spans = vec![
            Span::styled(prefix.to_string(), Style::default().fg(tokens.task_done)),
            Span::styled(segment.to_string(), title_style),
        ];
        if i == 0
            && let Some(label) = due_label(task, today)
        {
            spans.push(Span::styled(
                format!("  {label}"),
                Style::default().fg(tokens.notes),
            ));
        }
        lines.push(Line::from(spans));
    }

    if let Some(first) = task
        .notes
        .as_deref()
        .and_then(|notes| notes.lines().find(|line| !line.trim().is_empty()))
    {
        lines.push(Line::from(vec![
            Span::raw(indent),
            Span::styled(
                truncate(first.trim(), text_width),
                Style::default().fg(tokens.notes),
            ),
        ]));
    }
    lines
}

/// Short due-date hint relative to `today`.
pub fn due_label(task: &Task, today: NaiveDate) -> Option<String> {
    let due = task.due.as_deref()?;
    let date = NaiveDate::parse_from_str(due.get(..10)?, "%Y-%m-%d").ok()?;
    let label = match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        -1 => "Yesterday".to_string(),
        _ => date.format("%b %-d").to_string(),
    };
    Some(label)
}
