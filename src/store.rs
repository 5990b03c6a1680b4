use crate::models::{Task, TaskList, TaskStatus};
use std::collections::HashMap;

/// `OptimisticUncomplete` is speculative; the next `Replace` always overwrites it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Replace {
        task_lists: Vec<TaskList>,
        tasks: Vec<Task>,
    },
    OptimisticUncomplete {
        task_list_id: String,
        task_id: String,
    },
}

/// Fetched task lists, partitioned by list and completion status.
#[derive(Debug, Default, Clone)]
pub struct SyncState {
    task_lists: Vec<TaskList>,
    active_by_list: HashMap<String, Vec<Task>>,
    completed_by_list: HashMap<String, Vec<Task>>,
    selected_task_list_id: Option<String>,
}

impl SyncState {
    /// Returns whether the transition changed anything.
    pub fn apply(&mut self, transition: Transition) -> bool {
        match transition {
            Transition::Replace { task_lists, tasks } => {
                self.replace_all(task_lists, tasks);
                true
            }
            Transition::OptimisticUncomplete {
                task_list_id,
                task_id,
            } => self.apply_optimistic_uncomplete(&task_list_id, &task_id),
        }
    }

    pub fn replace_all(&mut self, task_lists: Vec<TaskList>, tasks: Vec<Task>) {
        let mut active: HashMap<String, Vec<Task>> = task_lists
            .iter()
            .map(|list| (list.id.clone(), Vec::new()))
            .collect();
        let mut completed = active.clone();

        for task in tasks {
            let Some(task_list_id) = task.task_list_id.as_deref() else {
                continue;
            };
            let bucket = if task.status == TaskStatus::Completed {
                completed.get_mut(task_list_id)
            } else {
                active.get_mut(task_list_id)
            };
            // Tasks pointing at a list we did not fetch are dropped.
            if let Some(bucket) = bucket {
                bucket.push(task);
            }
        }

        self.task_lists = task_lists;
        self.active_by_list = active;
        self.completed_by_list = completed;
        self.ensure_selection();
    }

    pub fn apply_optimistic_uncomplete(&mut self, task_list_id: &str, task_id: &str) -> bool {
        let Some(completed) = self.completed_by_list.get_mut(task_list_id) else {
            return false;
        };
        let Some(index) = completed.iter().position(|task| task.id == task_id) else {
            return false;
        };

        let mut task = completed.remove(index);
        task.status = TaskStatus::NeedsAction;
        self.active_by_list
            .entry(task_list_id.to_string())
            .or_default()
            .push(task);
        true
    }

    /// Keeps the selection pointing at an existing list, falling back to the
    /// first one. Returns whether the selection changed.
    pub fn ensure_selection(&mut self) -> bool {
        let still_valid = self
            .selected_task_list_id
            .as_deref()
            .is_some_and(|id| self.has_list(id));
        if still_valid {
            return false;
        }

        let fallback = self.task_lists.first().map(|list| list.id.clone());
        let changed = fallback != self.selected_task_list_id;
        self.selected_task_list_id = fallback;
        changed
    }

    pub fn select_task_list(&mut self, task_list_id: &str) -> bool {
        if !self.has_list(task_list_id) {
            return false;
        }
        self.selected_task_list_id = Some(task_list_id.to_string());
        true
    }

    pub fn has_list(&self, task_list_id: &str) -> bool {
        self.task_lists.iter().any(|list| list.id == task_list_id)
    }

    pub fn task_lists(&self) -> &[TaskList] {
        &self.task_lists
    }

    pub fn selected_task_list_id(&self) -> Option<&str> {
        self.selected_task_list_id.as_deref()
    }

    pub fn active_tasks(&self, task_list_id: &str) -> &[Task] {
        self.active_by_list
            .get(task_list_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn completed_tasks(&self, task_list_id: &str) -> &[Task] {
        self.completed_by_list
            .get(task_list_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn partition_keys(&self) -> (Vec<&str>, Vec<&str>) {
        let mut active: Vec<&str> = self.active_by_list.keys().map(String::as_str).collect();
        let mut completed: Vec<&str> = self
            .completed_by_list
            .keys()
            .map(String::as_str)
            .collect();
        active.sort_unstable();
        completed.sort_unstable();
        (active, completed)
    }
}
