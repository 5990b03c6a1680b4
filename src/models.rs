/// A named collection of tasks as returned by the task list endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskList {
    pub id: String,
    pub title: String,
}

impl TaskList {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStatus {
    #[default]
    NeedsAction,
    Completed,
    /// Marks the synthetic "nothing to show" row. Never sent to the server.
    Placeholder,
}

impl TaskStatus {
    /// Maps the wire value; anything unrecognised is treated as still open.
    pub fn from_remote(value: Option<&str>) -> Self {
        match value {
            Some("completed") => TaskStatus::Completed,
            _ => TaskStatus::NeedsAction,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NeedsAction => "needsAction",
            TaskStatus::Completed => "completed",
            TaskStatus::Placeholder => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub notes: Option<String>,
    pub status: TaskStatus,
    pub task_list_id: Option<String>,
    /// RFC 3339 due timestamp; Google only fills in the date part.
    pub due: Option<String>,
    /// RFC 3339 timestamp of the last modification.
    pub updated: Option<String>,
    /// Opaque, lexicographically ordered key for the manual order.
    pub position: Option<String>,
}

impl Task {
    pub fn placeholder(title: &str) -> Self {
        Self {
            title: title.to_string(),
            status: TaskStatus::Placeholder,
            ..Self::default()
        }
    }

    /// Placeholder rows have no identity and must not reach any mutation.
    pub fn is_placeholder(&self) -> bool {
        self.id.is_empty() || self.status == TaskStatus::Placeholder
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    MyOrder,
    Date,
    Deadline,
    StarredRecently,
    Title,
}

impl SortOrder {
    pub const ALL: [SortOrder; 5] = [
        SortOrder::MyOrder,
        SortOrder::Date,
        SortOrder::Deadline,
        SortOrder::StarredRecently,
        SortOrder::Title,
    ];

    /// Unknown values fall back to the manual order.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "date" => SortOrder::Date,
            "deadline" => SortOrder::Deadline,
            "starred-recently" => SortOrder::StarredRecently,
            "title" => SortOrder::Title,
            _ => SortOrder::MyOrder,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::MyOrder => "my-order",
            SortOrder::Date => "date",
            SortOrder::Deadline => "deadline",
            SortOrder::StarredRecently => "starred-recently",
            SortOrder::Title => "title",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortOrder::MyOrder => "My order",
            SortOrder::Date => "Date",
            SortOrder::Deadline => "Deadline",
            SortOrder::StarredRecently => "Starred recently",
            SortOrder::Title => "Title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeframe {
    #[default]
    All,
    Today,
    ThisWeek,
    ThisMonth,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::All,
        Timeframe::Today,
        Timeframe::ThisWeek,
        Timeframe::ThisMonth,
    ];

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "today" => Timeframe::Today,
            "this-week" => Timeframe::ThisWeek,
            "this-month" => Timeframe::ThisMonth,
            _ => Timeframe::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::All => "all",
            Timeframe::Today => "today",
            Timeframe::ThisWeek => "this-week",
            Timeframe::ThisMonth => "this-month",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::All => "All tasks",
            Timeframe::Today => "Today",
            Timeframe::ThisWeek => "This week",
            Timeframe::ThisMonth => "This month",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Auth,
    Transport,
}

/// Outcome of the most recent refresh cycle, shown in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    Populated,
    FetchFailed(FailureKind),
}

/// Everything the panel needs to draw one frame of task data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskView {
    pub task_lists: Vec<TaskList>,
    pub selected_task_list_id: Option<String>,
    pub active_tasks: Vec<Task>,
    pub completed_tasks: Vec<Task>,
    pub phase: SyncPhase,
}

impl TaskView {
    pub fn selected_list(&self) -> Option<&TaskList> {
        let id = self.selected_task_list_id.as_deref()?;
        self.task_lists.iter().find(|list| list.id == id)
    }

    pub fn selected_list_index(&self) -> Option<usize> {
        let id = self.selected_task_list_id.as_deref()?;
        self.task_lists.iter().position(|list| list.id == id)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EditorField {
    Title,
    Notes,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SettingsField {
    SortOrder,
    ShowCompleted,
    FetchCompleted,
    Timeframe,
    RefreshInterval,
}

impl SettingsField {
    pub const ALL: [SettingsField; 5] = [
        SettingsField::SortOrder,
        SettingsField::ShowCompleted,
        SettingsField::FetchCompleted,
        SettingsField::Timeframe,
        SettingsField::RefreshInterval,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SettingsField::SortOrder => "Sort by",
            SettingsField::ShowCompleted => "Show completed tasks",
            SettingsField::FetchCompleted => "Fetch completed tasks",
            SettingsField::Timeframe => "Timeframe",
            SettingsField::RefreshInterval => "Refresh interval (s)",
        }
    }
}
