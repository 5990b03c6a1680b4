use crate::models::{SortOrder, SyncPhase, Task, TaskView, Timeframe};
use crate::store::SyncState;
use chrono::{DateTime, Datelike, NaiveDate};
use std::cmp::Ordering;

pub const NO_TASK_LISTS: &str = "No task lists found";
pub const NO_TASKS: &str = "No tasks found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewOptions {
    pub sort_order: SortOrder,
    pub show_completed_tasks: bool,
    pub timeframe: Timeframe,
}

/// Returns a sorted copy. The sort is stable, so tasks that compare equal keep
/// their server order.
pub fn sort_tasks(tasks: &[Task], order: SortOrder) -> Vec<Task> {
    let mut sorted = tasks.to_vec();
    sorted.sort_by(|a, b| compare_tasks(a, b, order));
    sorted
}

pub fn compare_tasks(a: &Task, b: &Task, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Title => compare_titles(&a.title, &b.title),
        SortOrder::Date | SortOrder::StarredRecently => {
            updated_millis(b.updated.as_deref()).cmp(&updated_millis(a.updated.as_deref()))
        }
        SortOrder::Deadline => compare_deadline(a.due.as_deref(), b.due.as_deref()),
        SortOrder::MyOrder => compare_position(a.position.as_deref(), b.position.as_deref()),
    }
}

// Case-folded first so "apple" and "Banana" interleave the way people expect,
// then raw order to keep the comparison total.
fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn updated_millis(value: Option<&str>) -> i64 {
    parse_timestamp(value).unwrap_or(0)
}

fn compare_deadline(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_position(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a.filter(|p| !p.is_empty()), b.filter(|p| !p.is_empty())) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Milliseconds since the epoch for RFC 3339 values or bare `YYYY-MM-DD` dates.
fn parse_timestamp(value: Option<&str>) -> Option<i64> {
    let value = value?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.timestamp_millis());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Google stores due dates as midnight UTC, so the calendar date is read in the
/// value's own offset rather than converted to local time.
fn due_date(value: Option<&str>) -> Option<NaiveDate> {
    let value = value?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.date_naive());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

pub fn within_timeframe(task: &Task, timeframe: Timeframe, today: NaiveDate) -> bool {
    if timeframe == Timeframe::All {
        return true;
    }
    let Some(due) = due_date(task.due.as_deref()) else {
        return false;
    };
    match timeframe {
        Timeframe::All => true,
        Timeframe::Today => due == today,
        Timeframe::ThisWeek => due.iso_week() == today.iso_week(),
        Timeframe::ThisMonth => due.year() == today.year() && due.month() == today.month(),
    }
}

fn visible_tasks(
    tasks: &[Task],
    options: &ViewOptions,
    today: NaiveDate,
) -> Vec<Task> {
    let filtered: Vec<Task> = tasks
        .iter()
        .filter(|task| within_timeframe(task, options.timeframe, today))
        .cloned()
        .collect();
    sort_tasks(&filtered, options.sort_order)
}

/// Builds the view for the selected list. Empty results are represented by a
/// single placeholder row so the panel always has something to show.
pub fn derive_view(
    state: &SyncState,
    options: &ViewOptions,
    today: NaiveDate,
    phase: SyncPhase,
) -> TaskView {
    let task_lists = state.task_lists().to_vec();
    let selected = state
        .selected_task_list_id()
        .or_else(|| task_lists.first().map(|list| list.id.as_str()))
        .map(str::to_string);

    let Some(selected) = selected else {
        return TaskView {
            task_lists,
            selected_task_list_id: None,
            active_tasks: vec![Task::placeholder(NO_TASK_LISTS)],
            completed_tasks: Vec::new(),
            phase,
        };
    };

    // Active tasks without a title are not shown; completed ones are.
    let mut active_tasks = visible_tasks(state.active_tasks(&selected), options, today);
    active_tasks.retain(|task| !task.title.is_empty());
    let completed_tasks = if options.show_completed_tasks {
        visible_tasks(state.completed_tasks(&selected), options, today)
    } else {
        Vec::new()
    };

    if active_tasks.is_empty() && completed_tasks.is_empty() {
        active_tasks.push(Task::placeholder(NO_TASKS));
    }

    TaskView {
        task_lists,
        selected_task_list_id: Some(selected),
        active_tasks,
        completed_tasks,
        phase,
    }
}
