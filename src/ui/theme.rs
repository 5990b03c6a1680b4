use crate::config::Theme;
use crate::ui::color_parser::parse_color;
use ratatui::style::Color;

/// Resolved colors for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeTokens {
    pub border_default: Color,
    pub border_popup: Color,
    pub header: Color,
    pub highlight: Color,
    pub task_done: Color,
    pub notes: Color,
    pub placeholder: Color,
    pub sync_error: Color,
}

impl ThemeTokens {
    pub fn from_theme(theme: &Theme) -> Self {
        Self {
            border_default: parse_color(&theme.border_default),
            border_popup: parse_color(&theme.border_popup),
            header: parse_color(&theme.header),
            highlight: parse_color(&theme.text_highlight),
            task_done: parse_color(&theme.task_done),
            notes: parse_color(&theme.notes),
            placeholder: parse_color(&theme.placeholder),
            sync_error: parse_color(&theme.sync_error),
        }
    }
}
