use crate::integrations::google::TASKS_API_BASE;
use crate::integrations::oauth::GOOGLE_TOKEN_URL;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_REFRESH_INTERVAL_SECS: i64 = 20;
pub const DEFAULT_COMPLETE_REFRESH_DELAY_MS: u64 = 50;
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 24 * 60 * 60;
pub const MAX_COMPLETE_REFRESH_DELAY_MS: u64 = 60_000;

pub fn key_match(key: &KeyEvent, bindings: &[String]) -> bool {
    bindings.iter().any(|binding| is_match(key, binding))
}

fn parse_binding(binding: &str) -> (KeyModifiers, KeyCode) {
    let mut modifiers = KeyModifiers::NONE;
    let mut code = KeyCode::Null;

    for part in binding.to_lowercase().split('+') {
        match part {
            "ctrl" => modifiers.insert(KeyModifiers::CONTROL),
            "opt" | "alt" => modifiers.insert(KeyModifiers::ALT),
            "shift" => modifiers.insert(KeyModifiers::SHIFT),
            "enter" => code = KeyCode::Enter,
            "esc" => code = KeyCode::Esc,
            "backspace" => code = KeyCode::Backspace,
            "tab" => code = KeyCode::Tab,
            "backtab" => code = KeyCode::BackTab,
            "space" => code = KeyCode::Char(' '),
            "up" => code = KeyCode::Up,
            "down" => code = KeyCode::Down,
            "left" => code = KeyCode::Left,
            "right" => code = KeyCode::Right,
            "home" => code = KeyCode::Home,
            "end" => code = KeyCode::End,
            "pageup" => code = KeyCode::PageUp,
            "pagedown" => code = KeyCode::PageDown,
            "delete" => code = KeyCode::Delete,
            "f5" => code = KeyCode::F(5),
            single if single.chars().count() == 1 => {
                if let Some(ch) = single.chars().next() {
                    code = KeyCode::Char(ch);
                }
            }
            // An empty part means the binding was literally "+".
            "" => code = KeyCode::Char('+'),
            _ => {}
        }
    }
    (modifiers, code)
}

fn is_match(key: &KeyEvent, binding: &str) -> bool {
    let (target_modifiers, target_code) = parse_binding(binding);
    if target_code == KeyCode::Null {
        return false;
    }

    let code_matches = match (key.code, target_code) {
        (KeyCode::Char(c), KeyCode::Char(tc)) => {
            c == tc
                || (target_modifiers.contains(KeyModifiers::SHIFT)
                    && c.to_lowercase().next() == Some(tc))
        }
        (code, target) => code == target,
    };
    if !code_matches {
        return false;
    }

    // Enter is matched exactly so `enter` and `ctrl+enter` can be bound separately.
    if target_code == KeyCode::Enter {
        return key.modifiers == target_modifiers;
    }

    // Shift is implied by characters like '?' or 'G' unless asked for explicitly.
    let mut key_mods = key.modifiers;
    if !target_modifiers.contains(KeyModifiers::SHIFT) {
        key_mods.remove(KeyModifiers::SHIFT);
    }
    key_mods == target_modifiers
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "meghendra", "taskpanel")
}

/// Directory for the stored Google credential and the log file.
pub fn data_dir() -> PathBuf {
    if let Some(path) = std::env::var_os("TASKPANEL_DATA_DIR") {
        return PathBuf::from(path);
    }
    if let Some(dirs) = project_dirs() {
        return dirs.data_dir().to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".taskpanel")
}

pub fn token_path() -> PathBuf {
    data_dir().join("google-token.json")
}

pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("TASKPANEL_CONFIG") {
        return PathBuf::from(path);
    }
    if let Some(dirs) = project_dirs() {
        return dirs.config_dir().join("config.toml");
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".taskpanel-config.toml")
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub google: GoogleConfig,
    pub keybindings: KeyBindings,
    pub theme: Theme,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between background refreshes; non-positive means the default.
    pub refresh_interval_secs: i64,
    pub task_sort_order: String,
    pub show_completed_tasks: bool,
    pub fetch_completed_tasks: bool,
    pub task_timeframe: String,
    pub complete_refresh_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            task_sort_order: "my-order".to_string(),
            show_completed_tasks: true,
            fetch_completed_tasks: true,
            task_timeframe: "all".to_string(),
            complete_refresh_delay_ms: DEFAULT_COMPLETE_REFRESH_DELAY_MS,
        }
    }
}

impl SyncConfig {
    /// Non-positive means the default; anything above a day is capped.
    pub fn effective_refresh_interval_secs(&self) -> u64 {
        if self.refresh_interval_secs <= 0 {
            DEFAULT_REFRESH_INTERVAL_SECS as u64
        } else {
            (self.refresh_interval_secs as u64).min(MAX_REFRESH_INTERVAL_SECS)
        }
    }

    pub fn effective_complete_refresh_delay_ms(&self) -> u64 {
        self.complete_refresh_delay_ms.min(MAX_COMPLETE_REFRESH_DELAY_MS)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_base_url: String,
    pub token_url: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_base_url: TASKS_API_BASE.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct KeyBindings {
    pub global: GlobalBindings,
    pub tasks: TasksBindings,
    pub popup: PopupBindings,
    pub editor: EditorBindings,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GlobalBindings {
    pub quit: Vec<String>,
    pub help: Vec<String>,
    pub refresh: Vec<String>,
    pub settings: Vec<String>,
    pub list_picker: Vec<String>,
    pub open_web: Vec<String>,
}

impl Default for GlobalBindings {
    fn default() -> Self {
        Self {
            quit: vec!["ctrl+q".to_string(), "q".to_string()],
            help: vec!["?".to_string()],
            refresh: vec!["r".to_string(), "f5".to_string()],
            settings: vec!["s".to_string()],
            list_picker: vec!["l".to_string()],
            open_web: vec!["o".to_string()],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TasksBindings {
    pub up: Vec<String>,
    pub down: Vec<String>,
    pub top: Vec<String>,
    pub bottom: Vec<String>,
    pub next_list: Vec<String>,
    pub prev_list: Vec<String>,
    pub toggle: Vec<String>,
    pub edit: Vec<String>,
    pub add: Vec<String>,
    pub toggle_completed: Vec<String>,
}

impl Default for TasksBindings {
    fn default() -> Self {
        Self {
            up: vec!["k".to_string(), "up".to_string()],
            down: vec!["j".to_string(), "down".to_string()],
            top: vec!["g".to_string(), "home".to_string()],
            bottom: vec!["shift+g".to_string(), "end".to_string()],
            next_list: vec!["tab".to_string(), "right".to_string()],
            prev_list: vec!["backtab".to_string(), "left".to_string()],
            toggle: vec!["space".to_string(), "x".to_string()],
            edit: vec!["e".to_string(), "enter".to_string()],
            add: vec!["a".to_string(), "n".to_string()],
            toggle_completed: vec!["c".to_string()],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PopupBindings {
    pub confirm: Vec<String>,
    pub cancel: Vec<String>,
    pub up: Vec<String>,
    pub down: Vec<String>,
    pub left: Vec<String>,
    pub right: Vec<String>,
}

impl Default for PopupBindings {
    fn default() -> Self {
        Self {
            confirm: vec!["enter".to_string()],
            cancel: vec!["esc".to_string(), "q".to_string()],
            up: vec!["k".to_string(), "up".to_string()],
            down: vec!["j".to_string(), "down".to_string()],
            left: vec!["h".to_string(), "left".to_string()],
            right: vec!["l".to_string(), "right".to_string(), "space".to_string()],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EditorBindings {
    pub save: Vec<String>,
    pub cancel: Vec<String>,
    pub switch_field: Vec<String>,
}

impl Default for EditorBindings {
    fn default() -> Self {
        Self {
            save: vec!["ctrl+s".to_string(), "shift+enter".to_string()],
            cancel: vec!["esc".to_string()],
            switch_field: vec!["tab".to_string(), "backtab".to_string()],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Theme {
    pub border_default: String,
    pub border_popup: String,
    pub header: String,
    pub text_highlight: String,
    pub task_done: String,
    pub notes: String,
    pub placeholder: String,
    pub sync_error: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            border_default: "Reset".to_string(),
            border_popup: "Cyan".to_string(),
            header: "Yellow".to_string(),
            text_highlight: "50,50,50".to_string(),
            task_done: "Green".to_string(),
            notes: "DarkGray".to_string(),
            placeholder: "Gray".to_string(),
            sync_error: "Red".to_string(),
        }
    }
}

impl Config {
    /// Unparsable files fall back to defaults; a missing file is created.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<Config>(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
                    Config::default()
                }
            },
            Err(_) => {
                let config = Config::default();
                if let Err(e) = config.save_to_path(path) {
                    warn!(path = %path.display(), error = %e, "failed to write default config");
                }
                config
            }
        }
    }

    pub fn save_to_path(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }
}
